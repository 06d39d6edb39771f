mod lru_table;
mod memory_cache;

pub use lru_table::*;
pub use memory_cache::*;
