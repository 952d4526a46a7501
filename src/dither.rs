//! Optional additive dithering of the luma plane.
//!
//! A ring of uniformly distributed samples is generated once per stream
//! from a linear congruential generator; each transform-sized block then
//! adds consecutive ring entries starting at a random offset. The fixed
//! seed path is deterministic; the time-seeded path is not and is never
//! used in regression tests.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::surface::Surface;
use crate::types::clamp_i16;
use crate::Result;

const DITHER_BUFFER_SIZE: usize = 16384;
const FIXED_SEED: u32 = 45721;

// rand() in the reference C library sense: 15-bit output, modulus 2^31.
struct Lcg {
    state: u32,
}

impl Lcg {
    fn new(seed: u32) -> Lcg {
        Lcg { state: seed }
    }

    fn next(&mut self) -> i32 {
        self.state = self
            .state
            .wrapping_mul(1_103_515_245)
            .wrapping_add(12345)
            & 0x7fff_ffff;
        ((self.state >> 16) & 0x7fff) as i32
    }
}

/// Per-stream dithering state: the sample ring and its RNG.
pub struct Dithering {
    buffer: Box<[i32; DITHER_BUFFER_SIZE]>,
    rng: Lcg,
    initialised: bool,
}

impl Default for Dithering {
    fn default() -> Self {
        Dithering {
            buffer: Box::new([0; DITHER_BUFFER_SIZE]),
            rng: Lcg::new(FIXED_SEED),
            initialised: false,
        }
    }
}

impl Dithering {
    pub fn initialised(&self) -> bool {
        self.initialised
    }

    /// Fill the ring with samples uniform in `[-s, s]` where `s` is the
    /// signalled strength scaled to the internal 15-bit representation.
    pub fn make_buffer(&mut self, strength: u32, enhancement_depth: u32, fixed_seed: bool) {
        let scaled = (strength as i32) * (1 << (15 - enhancement_depth));
        let seed = if fixed_seed {
            FIXED_SEED
        } else {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as u32)
                .unwrap_or(FIXED_SEED)
        };
        self.rng = Lcg::new(seed);
        for v in self.buffer.iter_mut() {
            *v = self.rng.next() % (2 * scaled + 1) - scaled;
        }
        self.initialised = true;
    }

    /// Add ring samples to each `block_size` x `block_size` block,
    /// saturating to the signed 16-bit range.
    pub fn process(&mut self, src: &Surface<i16>, block_size: usize) -> Result<Surface<i16>> {
        let width = src.width();
        let height = src.height();
        let mut dst = Surface::build().reserve(width, height)?;

        let span = DITHER_BUFFER_SIZE - block_size * block_size;
        for y in (0..height).step_by(block_size) {
            for x in (0..width).step_by(block_size) {
                // a random position in the ring per block
                let mut offset = (self.rng.next() as usize) % span;
                for h in 0..block_size.min(height - y) {
                    for k in 0..block_size.min(width - x) {
                        let v = i32::from(src.read(x + k, y + h)) + self.buffer[offset];
                        dst.write(x + k, y + h, clamp_i16(v));
                        offset += 1;
                    }
                }
            }
        }

        Ok(dst.finish())
    }
}
