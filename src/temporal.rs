//! Temporal buffer maintenance.
//!
//! The per-plane temporal buffer persists reconstructed residuals across
//! pictures. Before each picture's residuals accumulate, the temporal
//! mask is applied at transform-block granularity: INTR blocks are reset,
//! PRED blocks carry their contents forward.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::surface::Surface;
use crate::types::TEMPORAL_INTR;
use crate::Result;

/// Zero every buffer block whose mask entry is INTR. The mask is in
/// layer coordinates; block `(x, y)` covers buffer pels
/// `(x*bs.., y*bs..)` clipped to the buffer extent.
pub fn apply_temporal_map(
    buffer: &Surface<i16>,
    mask: &Surface<u8>,
    block_size: usize,
) -> Result<Surface<i16>> {
    Surface::build()
        .generate(buffer.width(), buffer.height(), |x, y| {
            let bx = x / block_size;
            let by = y / block_size;
            if bx < mask.width() && by < mask.height() && mask.read(bx, by) == TEMPORAL_INTR {
                0
            } else {
                buffer.read(x, y)
            }
        })
        .map(|b| b.finish())
}

/// Element-wise saturating add of two equally sized surfaces.
pub fn add(a: &Surface<i16>, b: &Surface<i16>) -> Result<Surface<i16>> {
    debug_assert_eq!(a.width(), b.width());
    debug_assert_eq!(a.height(), b.height());
    Surface::build()
        .generate(a.width(), a.height(), |x, y| {
            a.read(x, y).saturating_add(b.read(x, y))
        })
        .map(|bld| bld.finish())
}
