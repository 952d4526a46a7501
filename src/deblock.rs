//! In-loop deblocking of sub-layer 1 residuals.
//!
//! Active only for the 4x4 transform when the picture signals level-1
//! filtering: corner and side pels of every block are attenuated by the
//! signalled coefficients, interior pels pass through.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::surface::Surface;
use crate::Result;

/// Apply the 4x4 deblocking filter with the signalled corner and side
/// strengths (0..=15).
pub fn deblock(src: &Surface<i16>, corner: u32, side: u32) -> Result<Surface<i16>> {
    let corner = 16 - corner as i32;
    let side = 16 - side as i32;

    #[rustfmt::skip]
    let coeffs: [[i32; 4]; 4] = [
        [corner, side, side, corner],
        [side,     16,   16,   side],
        [side,     16,   16,   side],
        [corner, side, side, corner],
    ];

    Surface::build()
        .generate(src.width(), src.height(), |x, y| {
            ((coeffs[x % 4][y % 4] * i32::from(src.read(x, y))) >> 4) as i16
        })
        .map(|b| b.finish())
}
