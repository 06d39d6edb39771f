use bytemuck::Pod;
use serde::{Deserialize, Serialize};

/// The sample (voxel value) types a brick can hold.
pub trait Sample: 'static + Pod + Ord + Send + Sync + core::fmt::Debug {
    /// The color depth that stores samples of this type.
    const COLOR_DEPTH: ColorDepth;

    fn to_f32(self) -> f32;

    /// Converts with truncation toward zero, saturating at the type's bounds.
    fn from_f32(value: f32) -> Self;
}

impl Sample for u8 {
    const COLOR_DEPTH: ColorDepth = ColorDepth::Uint8;

    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }

    #[inline]
    fn from_f32(value: f32) -> Self {
        value as u8
    }
}

impl Sample for u16 {
    const COLOR_DEPTH: ColorDepth = ColorDepth::Uint16;

    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }

    #[inline]
    fn from_f32(value: f32) -> Self {
        value as u16
    }
}

/// Bits per sample of a dataset.
///
/// Only `Uint8` datasets pass descriptor validation. `Uint16` exists for caches of synthetic bricks.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum ColorDepth {
    Uint8,
    Uint16,
}

impl ColorDepth {
    /// Maps the descriptor's `color_depth` value onto a supported depth.
    pub fn from_bits(bits: i64) -> Option<Self> {
        match bits {
            8 => Some(ColorDepth::Uint8),
            _ => None,
        }
    }

    #[inline]
    pub fn bytes_per_sample(self) -> usize {
        match self {
            ColorDepth::Uint8 => 1,
            ColorDepth::Uint16 => 2,
        }
    }

    /// The texture format a GPU brick cache of this depth uses.
    #[inline]
    pub fn texture_format(self) -> TextureFormat {
        match self {
            ColorDepth::Uint8 => TextureFormat::R8Unorm,
            ColorDepth::Uint16 => TextureFormat::R16Unorm,
        }
    }
}

/// Single-channel formats accepted by the GPU upload primitive.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TextureFormat {
    R8Unorm,
    R16Unorm,
}

// ████████╗███████╗███████╗████████╗███████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝
//    ██║   █████╗  ███████╗   ██║   ███████╗
//    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║
//    ██║   ███████╗███████║   ██║   ███████║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝
