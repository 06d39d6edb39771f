#![deny(
    rust_2018_compatibility,
    rust_2018_idioms,
    nonstandard_style,
    unused,
    future_incompatible
)]
#![warn(clippy::doc_markdown)]

//! Helpers shared by tests and benches: synthetic CVDS datasets on disk, and unsilenced printing.

pub mod data_sets;
pub mod test;
