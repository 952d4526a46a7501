//! Inverse quantization.
//!
//! Converts decoded symbols back to transform coefficients: the quant
//! matrix scales the picture step width per layer, a dead-zone-derived
//! offset recentres non-zero bins, and when temporal prediction is active
//! two step widths per layer are selected block-by-block from the
//! temporal mask. Also hosts the quant-matrix memory merge rules and
//! user-data stripping.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::config::PictureConfiguration;
use crate::surface::Surface;
use crate::types::{
    clamp, clamp_i16, DequantOffsetMode, QuantMatrixMode, UserDataMode, LOQ_LEVEL_2,
    MAX_STEP_WIDTH, MIN_STEP_WIDTH, TEMPORAL_PRED,
};
use crate::Result;

/// Per-layer, per-pass dequantization parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct LayerDequant {
    pub step_width: i32,
    pub applied_offset: i32,
}

/// Merge this picture's quant-matrix signalling with the stored
/// coefficient, returning the new stored value. Negative means "use the
/// default matrix".
pub fn find_quant_matrix_coeff(
    picture: &PictureConfiguration,
    loq: usize,
    layer: usize,
    is_idr: bool,
    previous: i32,
) -> i32 {
    match picture.quant_matrix_mode {
        QuantMatrixMode::BothPrevious => {
            if is_idr {
                -1
            } else {
                previous
            }
        }
        QuantMatrixMode::BothDefault => -1,
        QuantMatrixMode::SameAndCustom => picture.qm_coefficient_2[layer] as i32,
        QuantMatrixMode::Level2CustomLevel1Default => {
            if loq == LOQ_LEVEL_2 {
                picture.qm_coefficient_2[layer] as i32
            } else {
                -1
            }
        }
        QuantMatrixMode::Level2DefaultLevel1Custom => {
            if loq == LOQ_LEVEL_2 {
                -1
            } else {
                picture.qm_coefficient_1[layer] as i32
            }
        }
        QuantMatrixMode::DifferentAndCustom => {
            if loq == LOQ_LEVEL_2 {
                picture.qm_coefficient_2[layer] as i32
            } else {
                picture.qm_coefficient_1[layer] as i32
            }
        }
    }
}

/// Layer step width after the quant matrix: 64 is unity.
pub fn find_dirq_step_width(step_width: i32, quant_matrix_coeff: i32) -> i32 {
    if quant_matrix_coeff < 0 {
        step_width
    } else {
        clamp(
            (step_width * quant_matrix_coeff) >> 6,
            MIN_STEP_WIDTH,
            MAX_STEP_WIDTH,
        )
    }
}

/// Signalled dequantization offset scaled to the layer step width, or the
/// -1 sentinel meaning "derive from the dead zone".
pub fn find_invq_offset(
    picture: &PictureConfiguration,
    step_width: i32,
    dirq_step_width: i32,
) -> i32 {
    if !picture.dequant_offset_signalled || picture.dequant_offset == 0 {
        return -1;
    }
    (picture.dequant_offset as i32 * dirq_step_width) / step_width.max(1)
}

/// Reconstruction step width for the layer.
pub fn find_invq_step_width(
    _picture: &PictureConfiguration,
    dirq_step_width: i32,
    _invq_offset: i32,
) -> i32 {
    dirq_step_width
}

/// Dead zone grows with the layer step width.
pub fn find_layer_deadzone(_step_width: i32, invq_step_width: i32) -> i32 {
    (invq_step_width * 3) >> 4
}

/// The offset actually added to non-zero reconstructed coefficients.
pub fn find_invq_applied_offset(
    picture: &PictureConfiguration,
    invq_offset: i32,
    invq_deadzone: i32,
) -> i32 {
    if invq_offset < 0 {
        invq_deadzone
    } else if picture.dequant_offset_mode == DequantOffsetMode::ConstOffset {
        invq_offset
    } else {
        (invq_deadzone - invq_offset).max(0)
    }
}

/// Step width for chroma planes of sub-layer 2.
pub fn chroma_step_width(step_width: i32, chroma_step_width_multiplier: u32) -> i32 {
    clamp(
        (step_width * chroma_step_width_multiplier as i32) >> 6,
        MIN_STEP_WIDTH,
        MAX_STEP_WIDTH,
    )
}

/// Reduced step width for temporally predicted blocks:
/// `sw * (1 - clamp(modifier / 255, 0, 0.5))` in integer arithmetic.
pub fn temporal_step_width(step_width: i32, modifier: u32) -> i32 {
    let m = modifier.min(128) as i32;
    clamp(
        step_width - (step_width * m) / 255,
        MIN_STEP_WIDTH,
        MAX_STEP_WIDTH,
    )
}

#[inline]
fn dequant_one(coef: i16, dq: &LayerDequant) -> i16 {
    let c = i32::from(coef);
    let offset = if c > 0 {
        dq.applied_offset
    } else if c < 0 {
        -dq.applied_offset
    } else {
        0
    };
    clamp_i16(c * dq.step_width + offset)
}

/// Dequantize one layer with a single step width.
pub fn inverse_quantize(symbols: &Surface<i16>, dq: &LayerDequant) -> Result<Surface<i16>> {
    Ok(Surface::build()
        .generate(symbols.width(), symbols.height(), |x, y| {
            dequant_one(symbols.read(x, y), dq)
        })?
        .finish())
}

/// Dequantize one layer selecting between two step widths from the
/// temporal mask at transform-block granularity. The mask shares the
/// layer's coordinate space.
pub fn inverse_quantize_swm(
    symbols: &Surface<i16>,
    dq: &[LayerDequant; 2],
    temporal_mask: &Surface<u8>,
) -> Result<Surface<i16>> {
    Ok(Surface::build()
        .generate(symbols.width(), symbols.height(), |x, y| {
            let pass = if temporal_mask.read(x, y) == TEMPORAL_PRED {
                0
            } else {
                1
            };
            dequant_one(symbols.read(x, y), &dq[pass])
        })?
        .finish())
}

/// Strip embedded user data from a layer's symbols: the low bits carry
/// the payload, the next bit the sign, the rest the magnitude.
pub fn user_data_clear(symbols: &Surface<i16>, mode: UserDataMode) -> Result<Surface<i16>> {
    let size = mode.size();
    debug_assert!(size > 0);
    Ok(Surface::build()
        .generate(symbols.width(), symbols.height(), |x, y| {
            let mut value = symbols.read(x, y) as u16;
            value >>= size;
            let negative = value & 0x01 != 0;
            value >>= 1;
            if negative {
                -(value as i16)
            } else {
                value as i16
            }
        })?
        .finish())
}
