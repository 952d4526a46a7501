//! Signalled enumerations and stream-wide limits.
//!
//! Every enum here mirrors one coded field of the enhancement syntax;
//! `TryFrom<u32>` implementations reject reserved values with the error
//! the taxonomy assigns to them.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::Error;

pub const MAX_NUM_PLANES: usize = 3;
pub const MAX_NUM_LOQS: usize = 2;
/// Residual layers only; the temporal layer is carried separately.
pub const MAX_NUM_LAYERS: usize = 16;

pub const MIN_STEP_WIDTH: i32 = 1;
pub const MAX_STEP_WIDTH: i32 = 32767;

/// Enhancement sub-layer 1: between base and intermediate resolution.
pub const LOQ_LEVEL_1: usize = 0;
/// Enhancement sub-layer 2: between intermediate and output resolution.
pub const LOQ_LEVEL_2: usize = 1;

/// Temporal mask value: accumulate into the temporal buffer.
pub const TEMPORAL_PRED: u8 = 0;
/// Temporal mask value: reset the buffer block before accumulating.
pub const TEMPORAL_INTR: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Main,
    Main444,
}

impl TryFrom<u32> for Profile {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Error> {
        match value {
            0 => Ok(Self::Main),
            1 => Ok(Self::Main444),
            _ => Err(Error::UnsupportedConfiguration("profile_idc")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colourspace {
    Y,
    Yuv420,
    Yuv422,
    Yuv444,
}

impl Colourspace {
    /// Horizontal and vertical luma-to-chroma scale factors.
    pub fn chroma_scale(self) -> (usize, usize) {
        match self {
            Colourspace::Yuv420 => (2, 2),
            Colourspace::Yuv422 => (2, 1),
            Colourspace::Yuv444 | Colourspace::Y => (1, 1),
        }
    }

    pub fn num_image_planes(self) -> usize {
        match self {
            Colourspace::Y => 1,
            _ => 3,
        }
    }
}

impl TryFrom<u32> for Colourspace {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Error> {
        match value {
            0 => Ok(Self::Y),
            1 => Ok(Self::Yuv420),
            2 => Ok(Self::Yuv422),
            3 => Ok(Self::Yuv444),
            _ => Err(Error::UnsupportedConfiguration("chroma_sampling_type")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsample {
    Nearest,
    Linear,
    Cubic,
    ModifiedCubic,
    AdaptiveCubic,
}

impl TryFrom<u32> for Upsample {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Error> {
        match value {
            0 => Ok(Self::Nearest),
            1 => Ok(Self::Linear),
            2 => Ok(Self::Cubic),
            3 => Ok(Self::ModifiedCubic),
            4 => Ok(Self::AdaptiveCubic),
            _ => Err(Error::UnsupportedConfiguration("upsample_type")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingMode {
    None,
    OneD,
    TwoD,
}

impl TryFrom<u32> for ScalingMode {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::OneD),
            2 => Ok(Self::TwoD),
            _ => Err(Error::UnsupportedConfiguration("scaling_mode")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileDimensions {
    None,
    Tile512x256,
    Tile1024x512,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserDataMode {
    None,
    Bits2,
    Bits6,
}

impl UserDataMode {
    /// Embedded field width in bits.
    pub fn size(self) -> u32 {
        match self {
            UserDataMode::None => 0,
            UserDataMode::Bits2 => 2,
            UserDataMode::Bits6 => 6,
        }
    }
}

impl TryFrom<u32> for UserDataMode {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Bits2),
            2 => Ok(Self::Bits6),
            _ => Err(Error::MalformedBitstream("user_data_enabled")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    None,
    Prefix,
    PrefixOnDiff,
}

impl TryFrom<u32> for CompressionType {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Prefix),
            2 => Ok(Self::PrefixOnDiff),
            _ => Err(Error::MalformedBitstream("compression_type_size_per_tile")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantMatrixMode {
    BothPrevious,
    BothDefault,
    SameAndCustom,
    Level2CustomLevel1Default,
    Level2DefaultLevel1Custom,
    DifferentAndCustom,
}

impl TryFrom<u32> for QuantMatrixMode {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Error> {
        match value {
            0 => Ok(Self::BothPrevious),
            1 => Ok(Self::BothDefault),
            2 => Ok(Self::SameAndCustom),
            3 => Ok(Self::Level2CustomLevel1Default),
            4 => Ok(Self::Level2DefaultLevel1Custom),
            5 => Ok(Self::DifferentAndCustom),
            _ => Err(Error::UnsupportedConfiguration("quant_matrix_mode")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DequantOffsetMode {
    Default,
    ConstOffset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DitheringType {
    None,
    Uniform,
}

impl TryFrom<u32> for DitheringType {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Uniform),
            _ => Err(Error::MalformedBitstream("dithering_type")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictureType {
    Frame,
    Field,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Top,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodingType {
    Idr,
    NonIdr,
}

/// Clamp a value to a closed range.
#[inline]
pub(crate) fn clamp<T: PartialOrd>(val: T, lo: T, hi: T) -> T {
    if val < lo {
        lo
    } else if val > hi {
        hi
    } else {
        val
    }
}

/// Clamp to signed 16 bit integer range.
#[inline]
pub(crate) fn clamp_i16(v: i32) -> i16 {
    clamp(v, -32768, 32767) as i16
}
