//! Separable four-tap upsampling and the predicted-residual adjustment.
//!
//! Each source sample produces two output samples, one from the kernel
//! and one from its mirror, with source indices clamped at the plane
//! edges. 2D upsampling applies the kernel vertically then horizontally;
//! 1D applies it horizontally only. The predicted-residual step then
//! nudges every output block so its mean returns to the base pel.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::surface::Surface;
use crate::types::{clamp, Upsample};
use crate::Result;

type UpsampleKernel = [i32; 4];

// Kernels are S1.14 fixed point, offset -1 (taps at s-1, s, s+1, s+2).
#[rustfmt::skip]
const UPSAMPLE_KERNELS: [UpsampleKernel; 4] = [
    [     0, 16384,    0,     0], // Nearest
    [     0, 12288, 4096,     0], // Linear
    [ -1382, 14285, 3942,  -461], // Cubic
    [ -2360, 15855, 4165, -1276], // ModifiedCubic
];

fn make_kernel(upsample: Upsample, coefficients: &[u32; 4]) -> UpsampleKernel {
    match upsample {
        Upsample::Nearest => UPSAMPLE_KERNELS[0],
        Upsample::Linear => UPSAMPLE_KERNELS[1],
        Upsample::Cubic => UPSAMPLE_KERNELS[2],
        Upsample::ModifiedCubic => UPSAMPLE_KERNELS[3],
        Upsample::AdaptiveCubic => [
            -(coefficients[0] as i32),
            coefficients[1] as i32,
            coefficients[2] as i32,
            -(coefficients[3] as i32),
        ],
    }
}

// Read with the index clamped into the source extent.
#[inline]
fn tap<S: Fn(isize) -> i32>(src: &S, index: isize, size: usize) -> i32 {
    src(clamp(index, 0, size as isize - 1))
}

// One pair of output samples per source sample: even outputs use the
// mirrored kernel, odd outputs the kernel itself. The 0x2000 seed rounds
// the 14-bit shift.
fn apply_kernel<S: Fn(isize) -> i32>(
    src: S,
    size: usize,
    kernel: &UpsampleKernel,
    mut emit: impl FnMut(i16),
) {
    for t in 0..size as isize {
        let mut even = 0x2000i32;
        let mut odd = 0x2000i32;
        for k in 0..4isize {
            even += kernel[(3 - k) as usize] * tap(&src, t + k - 2, size);
            odd += kernel[k as usize] * tap(&src, t + k - 1, size);
        }
        emit((even >> 14) as i16);
        emit((odd >> 14) as i16);
    }
}

/// 2D upsample to double width and height: vertical pass into an
/// intermediate, then horizontal.
pub fn upsample_2d(
    src: &Surface<i16>,
    upsample: Upsample,
    coefficients: &[u32; 4],
) -> Result<Surface<i16>> {
    let width = src.width();
    let height = src.height();
    let kernel = make_kernel(upsample, coefficients);

    // Intermediate is w, 2h
    let mut v_dest = Surface::build().reserve(width, height * 2)?;
    for x in 0..width {
        let mut y_out = 0;
        apply_kernel(
            |y| i32::from(src.read(x, y as usize)),
            height,
            &kernel,
            |v| {
                v_dest.write(x, y_out, v);
                y_out += 1;
            },
        );
    }
    let intermediate = v_dest.finish();

    // Final is 2w, 2h
    let mut h_dest = Surface::build().reserve(width * 2, height * 2)?;
    for y in 0..height * 2 {
        let mut x_out = 0;
        apply_kernel(
            |x| i32::from(intermediate.read(x as usize, y)),
            width,
            &kernel,
            |v| {
                h_dest.write(x_out, y, v);
                x_out += 1;
            },
        );
    }

    Ok(h_dest.finish())
}

/// 1D upsample to double width only.
pub fn upsample_1d(
    src: &Surface<i16>,
    upsample: Upsample,
    coefficients: &[u32; 4],
) -> Result<Surface<i16>> {
    let width = src.width();
    let height = src.height();
    let kernel = make_kernel(upsample, coefficients);

    let mut h_dest = Surface::build().reserve(width * 2, height)?;
    for y in 0..height {
        let mut x_out = 0;
        apply_kernel(
            |x| i32::from(src.read(x as usize, y)),
            width,
            &kernel,
            |v| {
                h_dest.write(x_out, y, v);
                x_out += 1;
            },
        );
    }

    Ok(h_dest.finish())
}

/// Sum each 2x2 block of pels.
pub fn predicted_residual_sum(src: &Surface<i16>) -> Result<Surface<i32>> {
    Surface::build()
        .generate(src.width() / 2, src.height() / 2, |x, y| {
            i32::from(src.read(x * 2, y * 2))
                + i32::from(src.read(x * 2, y * 2 + 1))
                + i32::from(src.read(x * 2 + 1, y * 2))
                + i32::from(src.read(x * 2 + 1, y * 2 + 1))
        })
        .map(|b| b.finish())
}

/// Sum each 2x1 block of pels.
pub fn predicted_residual_sum_1d(src: &Surface<i16>) -> Result<Surface<i32>> {
    Surface::build()
        .generate(src.width() / 2, src.height(), |x, y| {
            i32::from(src.read(x * 2, y)) + i32::from(src.read(x * 2 + 1, y))
        })
        .map(|b| b.finish())
}

/// Adjust each upsampled 2x2 block so it averages back to its base pel.
pub fn predicted_residual_adjust(
    base: &Surface<i16>,
    enhanced: &Surface<i16>,
    sum: &Surface<i32>,
) -> Result<Surface<i16>> {
    Surface::build()
        .generate(enhanced.width(), enhanced.height(), |x, y| {
            let adjust =
                i32::from(base.read(x / 2, y / 2)) - ((sum.read(x / 2, y / 2) + 2) >> 2);
            clamp(i32::from(enhanced.read(x, y)) + adjust, -32767, 32767) as i16
        })
        .map(|b| b.finish())
}

/// Adjust each upsampled 2x1 block so it averages back to its base pel.
pub fn predicted_residual_adjust_1d(
    base: &Surface<i16>,
    enhanced: &Surface<i16>,
    sum: &Surface<i32>,
) -> Result<Surface<i16>> {
    Surface::build()
        .generate(enhanced.width(), enhanced.height(), |x, y| {
            let adjust = i32::from(base.read(x / 2, y)) - ((sum.read(x / 2, y) + 1) >> 1);
            clamp(i32::from(enhanced.read(x, y)) + adjust, -32767, 32767) as i16
        })
        .map(|b| b.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface(values: &[&[i16]]) -> Surface<i16> {
        Surface::build()
            .generate(values[0].len(), values.len(), |x, y| values[y][x])
            .unwrap()
            .finish()
    }

    const NO_COEFFS: [u32; 4] = [0; 4];

    #[test]
    fn nearest_is_pixel_replication() {
        let src = surface(&[&[10, 20], &[30, 40]]);
        let out = upsample_2d(&src, Upsample::Nearest, &NO_COEFFS).unwrap();
        assert_eq!(out.row(0), &[10, 10, 20, 20]);
        assert_eq!(out.row(1), &[10, 10, 20, 20]);
        assert_eq!(out.row(2), &[30, 30, 40, 40]);
        assert_eq!(out.row(3), &[30, 30, 40, 40]);
    }

    #[test]
    fn nearest_1d_replicates_horizontally() {
        let src = surface(&[&[10, 20], &[30, 40]]);
        let out = upsample_1d(&src, Upsample::Nearest, &NO_COEFFS).unwrap();
        assert_eq!(out.row(0), &[10, 10, 20, 20]);
        assert_eq!(out.row(1), &[30, 30, 40, 40]);
    }

    #[test]
    fn linear_constant_plane_stays_constant() {
        let src = Surface::build().fill(100i16, 4, 4).unwrap().finish();
        let out = upsample_2d(&src, Upsample::Linear, &NO_COEFFS).unwrap();
        // 12288 + 4096 = 16384; constant input reproduces itself exactly
        // up to the rounding bias.
        for y in 0..8 {
            assert!(out.row(y).iter().all(|&v| (v - 100).abs() <= 1), "{:?}", out.row(y));
        }
    }

    #[test]
    fn cubic_kernel_taps_sum_to_unity() {
        for kernel in &UPSAMPLE_KERNELS {
            assert_eq!(kernel.iter().sum::<i32>(), 16384);
        }
    }

    #[test]
    fn adjusted_blocks_average_to_base() {
        let base = surface(&[&[100, -50], &[25, 7]]);
        let up = upsample_2d(&base, Upsample::Linear, &NO_COEFFS).unwrap();
        let sum = predicted_residual_sum(&up).unwrap();
        let adjusted = predicted_residual_adjust(&base, &up, &sum).unwrap();
        for by in 0..2 {
            for bx in 0..2 {
                let total: i32 = (0..2)
                    .flat_map(|j| (0..2).map(move |i| (i, j)))
                    .map(|(i, j)| i32::from(adjusted.read(bx * 2 + i, by * 2 + j)))
                    .sum();
                let mean = (total + 2) >> 2;
                let want = i32::from(base.read(bx, by));
                assert!((mean - want).abs() <= 1, "block ({bx},{by}): {mean} vs {want}");
            }
        }
    }

    #[test]
    fn adjusted_blocks_average_to_base_1d() {
        let base = surface(&[&[9, -9]]);
        let up = upsample_1d(&base, Upsample::Cubic, &NO_COEFFS).unwrap();
        let sum = predicted_residual_sum_1d(&up).unwrap();
        let adjusted = predicted_residual_adjust_1d(&base, &up, &sum).unwrap();
        for bx in 0..2 {
            let total =
                i32::from(adjusted.read(bx * 2, 0)) + i32::from(adjusted.read(bx * 2 + 1, 0));
            let mean = (total + 1) >> 1;
            assert!((mean - i32::from(base.read(bx, 0))).abs() <= 1);
        }
    }

    #[test]
    fn adaptive_kernel_from_signalled_coefficients() {
        let src = Surface::build().fill(64i16, 4, 1).unwrap().finish();
        // Signalled cubic coefficients reproduce the preset cubic kernel
        let coeffs = [1382, 14285, 3942, 461];
        let preset = upsample_1d(&src, Upsample::Cubic, &NO_COEFFS).unwrap();
        let adaptive = upsample_1d(&src, Upsample::AdaptiveCubic, &coeffs).unwrap();
        assert_eq!(preset, adaptive);
    }

    #[test]
    fn small_sources_upsample() {
        // Single-pel plane: every tap clamps to the one sample.
        let src = Surface::build().fill(42i16, 1, 1).unwrap().finish();
        let out = upsample_2d(&src, Upsample::ModifiedCubic, &NO_COEFFS).unwrap();
        assert_eq!(out.width(), 2);
        assert_eq!(out.height(), 2);
        for y in 0..2 {
            assert!(out.row(y).iter().all(|&v| (v - 42).abs() <= 1));
        }
    }
}
