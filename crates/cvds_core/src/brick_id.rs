use core::fmt;

/// Identifies one brick of one resolution level.
///
/// The resolution level lives in the top 6 bits and the linear brick index (within the level's brick grid, X fastest, then
/// Y, then Z) in the low 26 bits.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(transparent)]
pub struct BrickId(pub u32);

impl BrickId {
    pub const INDEX_BITS: u32 = 26;
    pub const INDEX_MASK: u32 = (1 << Self::INDEX_BITS) - 1;
    pub const MAX_RESOLUTION_LEVELS: u32 = 1 << (32 - Self::INDEX_BITS);

    #[inline]
    pub fn new(resolution_level: u32, index: u32) -> Self {
        debug_assert!(resolution_level < Self::MAX_RESOLUTION_LEVELS);
        debug_assert!(index <= Self::INDEX_MASK);

        BrickId(index | (resolution_level << Self::INDEX_BITS))
    }

    #[inline]
    pub fn resolution_level(self) -> u32 {
        self.0 >> Self::INDEX_BITS
    }

    #[inline]
    pub fn index(self) -> u32 {
        self.0 & Self::INDEX_MASK
    }
}

impl From<u32> for BrickId {
    #[inline]
    fn from(raw: u32) -> Self {
        BrickId(raw)
    }
}

impl From<BrickId> for u32 {
    #[inline]
    fn from(id: BrickId) -> Self {
        id.0
    }
}

impl fmt::Display for BrickId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "brick_{}_res_lvl_{}", self.index(), self.resolution_level())
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pack_and_unpack() {
        let id = BrickId::new(3, 12345);
        assert_eq!(id.resolution_level(), 3);
        assert_eq!(id.index(), 12345);
        assert_eq!(id.0, 12345 | (3 << 26));
    }

    #[test]
    fn extremes_do_not_bleed_into_each_other() {
        let id = BrickId::new(63, BrickId::INDEX_MASK);
        assert_eq!(id.0, u32::MAX);
        assert_eq!(id.resolution_level(), 63);
        assert_eq!(id.index(), BrickId::INDEX_MASK);

        let id = BrickId::new(1, 0);
        assert_eq!(id.index(), 0);
        assert_eq!(id.resolution_level(), 1);
    }

    #[test]
    fn display_names_index_and_level() {
        assert_eq!(BrickId::new(2, 7).to_string(), "brick_7_res_lvl_2");
    }
}
