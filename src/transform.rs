//! Inverse residual transforms.
//!
//! Small Hadamard-family transforms taking one coefficient per layer and
//! writing a `tbs x tbs` pel block: DD (2x2) and DDS (4x4), each with a
//! horizontal-only variant used when the sub-layer was scaled in one
//! dimension. Coefficients stay integer throughout; output is clamped to
//! the signed 16-bit range on write.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::surface::Surface;
use crate::types::clamp_i16;
use crate::Result;

// Basis for the inverse DD, indexed by y*2+x, layer.
#[rustfmt::skip]
const DD_BASIS: [[i32; 4]; 4] = [
    [ 1,  1,  1,  1], // 0,0
    [ 1, -1,  1, -1], // 1,0
    [ 1,  1, -1, -1], // 0,1
    [ 1, -1, -1,  1], // 1,1
];

// Horizontal-only DD: even rows are a 1D inverse of the first coefficient
// pair, odd rows of the second.
#[rustfmt::skip]
const DD_1D_BASIS: [[[i32; 4]; 2]; 2] = [
    [[ 1,  1,  0,  0], [ 1, -1,  0,  0]],
    [[ 0,  0,  1,  1], [ 0,  0,  1, -1]],
];

// Basis for the inverse DDS, indexed by y%4 * 4 + x%4, layer.
#[rustfmt::skip]
const DDS_BASIS: [[i32; 16]; 16] = [
    [ 1,  1,  1,  1,  1,  1,  1,  1,  1,  1,  1,  1,  1,  1,  1,  1], // 0,0
    [ 1,  1,  1,  1, -1, -1, -1, -1,  1,  1,  1,  1, -1, -1, -1, -1], // 1,0
    [ 1, -1,  1, -1,  1, -1,  1, -1,  1, -1,  1, -1,  1, -1,  1, -1], // 2,0
    [ 1, -1,  1, -1, -1,  1, -1,  1,  1, -1,  1, -1, -1,  1, -1,  1], // 3,0
    [ 1,  1,  1,  1,  1,  1,  1,  1, -1, -1, -1, -1, -1, -1, -1, -1], // 0,1
    [ 1,  1,  1,  1, -1, -1, -1, -1, -1, -1, -1, -1,  1,  1,  1,  1], // 1,1
    [ 1, -1,  1, -1,  1, -1,  1, -1, -1,  1, -1,  1, -1,  1, -1,  1], // 2,1
    [ 1, -1,  1, -1, -1,  1, -1,  1, -1,  1, -1,  1,  1, -1,  1, -1], // 3,1
    [ 1,  1, -1, -1,  1,  1, -1, -1,  1,  1, -1, -1,  1,  1, -1, -1], // 0,2
    [ 1,  1, -1, -1, -1, -1,  1,  1,  1,  1, -1, -1, -1, -1,  1,  1], // 1,2
    [ 1, -1, -1,  1,  1, -1, -1,  1,  1, -1, -1,  1,  1, -1, -1,  1], // 2,2
    [ 1, -1, -1,  1, -1,  1,  1, -1,  1, -1, -1,  1, -1,  1,  1, -1], // 3,2
    [ 1,  1, -1, -1,  1,  1, -1, -1, -1, -1,  1,  1, -1, -1,  1,  1], // 0,3
    [ 1,  1, -1, -1, -1, -1,  1,  1, -1, -1,  1,  1,  1,  1, -1, -1], // 1,3
    [ 1, -1, -1,  1,  1, -1, -1,  1, -1,  1,  1, -1, -1,  1,  1, -1], // 2,3
    [ 1, -1, -1,  1, -1,  1,  1, -1, -1,  1,  1, -1,  1, -1, -1,  1], // 3,3
];

// Horizontal-only DDS, indexed by y%4, x%4, layer.
#[rustfmt::skip]
const DDS_1D_BASIS: [[[i32; 16]; 4]; 4] = [
    [
        [ 1,  1,  1,  1,  1,  1,  1,  1,  0,  0,  0,  0,  1,  1,  1,  1],
        [ 1,  1,  1,  1, -1, -1, -1, -1,  0,  0,  0,  0, -1, -1, -1, -1],
        [ 1, -1,  1, -1,  1, -1,  1, -1,  0,  0,  0,  0,  1, -1,  1, -1],
        [ 1, -1,  1, -1, -1,  1, -1,  1,  0,  0,  0,  0, -1,  1, -1,  1],
    ],
    [
        [ 0,  0,  0,  0,  1,  1,  1,  1,  1,  1,  1,  1, -1, -1, -1, -1],
        [ 0,  0,  0,  0, -1, -1, -1, -1,  1,  1,  1,  1,  1,  1,  1,  1],
        [ 0,  0,  0,  0,  1, -1,  1, -1,  1, -1,  1, -1, -1,  1, -1,  1],
        [ 0,  0,  0,  0, -1,  1, -1,  1,  1, -1,  1, -1,  1, -1,  1, -1],
    ],
    [
        [ 1,  1, -1, -1,  1,  1, -1, -1,  0,  0,  0,  0,  1,  1, -1, -1],
        [ 1,  1, -1, -1, -1, -1,  1,  1,  0,  0,  0,  0, -1, -1,  1,  1],
        [ 1, -1, -1,  1,  1, -1, -1,  1,  0,  0,  0,  0,  1, -1, -1,  1],
        [ 1, -1, -1,  1, -1,  1,  1, -1,  0,  0,  0,  0, -1,  1,  1, -1],
    ],
    [
        [ 0,  0,  0,  0,  1,  1, -1, -1,  1,  1, -1, -1, -1, -1,  1,  1],
        [ 0,  0,  0,  0, -1, -1,  1,  1,  1,  1, -1, -1,  1,  1, -1, -1],
        [ 0,  0,  0,  0,  1, -1, -1,  1,  1, -1, -1,  1, -1,  1,  1, -1],
        [ 0,  0,  0,  0, -1,  1,  1, -1,  1, -1, -1,  1,  1, -1, -1,  1],
    ],
];

/// Inverse 2x2 transform, horizontal and vertical.
pub fn inverse_dd(width: usize, height: usize, layers: &[Surface<i16>]) -> Result<Surface<i16>> {
    debug_assert_eq!(layers.len(), 4);
    let mut dst = Surface::build().reserve(width, height)?;

    for by in 0..height / 2 {
        for bx in 0..width / 2 {
            let mut c = [0i32; 4];
            for (l, layer) in layers.iter().enumerate() {
                c[l] = i32::from(layer.read(bx, by));
            }
            for j in 0..2 {
                for i in 0..2 {
                    let basis = &DD_BASIS[j * 2 + i];
                    let mut acc = 0i32;
                    for l in 0..4 {
                        acc += basis[l] * c[l];
                    }
                    dst.write(bx * 2 + i, by * 2 + j, clamp_i16(acc));
                }
            }
        }
    }

    Ok(dst.finish())
}

/// Inverse 2x2 transform, horizontal only.
pub fn inverse_dd_1d(width: usize, height: usize, layers: &[Surface<i16>]) -> Result<Surface<i16>> {
    debug_assert_eq!(layers.len(), 4);
    let mut dst = Surface::build().reserve(width, height)?;

    for by in 0..height / 2 {
        for bx in 0..width / 2 {
            let mut c = [0i32; 4];
            for (l, layer) in layers.iter().enumerate() {
                c[l] = i32::from(layer.read(bx, by));
            }
            for j in 0..2 {
                for i in 0..2 {
                    let basis = &DD_1D_BASIS[j][i];
                    let mut acc = 0i32;
                    for l in 0..4 {
                        acc += basis[l] * c[l];
                    }
                    dst.write(bx * 2 + i, by * 2 + j, clamp_i16(acc));
                }
            }
        }
    }

    Ok(dst.finish())
}

/// Inverse 4x4 transform, horizontal and vertical.
pub fn inverse_dds(width: usize, height: usize, layers: &[Surface<i16>]) -> Result<Surface<i16>> {
    debug_assert_eq!(layers.len(), 16);
    let mut dst = Surface::build().reserve(width, height)?;

    for by in 0..height / 4 {
        for bx in 0..width / 4 {
            let mut c = [0i32; 16];
            for (l, layer) in layers.iter().enumerate() {
                c[l] = i32::from(layer.read(bx, by));
            }
            for j in 0..4 {
                for i in 0..4 {
                    let basis = &DDS_BASIS[j * 4 + i];
                    let mut acc = 0i32;
                    for l in 0..16 {
                        acc += basis[l] * c[l];
                    }
                    dst.write(bx * 4 + i, by * 4 + j, clamp_i16(acc));
                }
            }
        }
    }

    Ok(dst.finish())
}

/// Inverse 4x4 transform, horizontal only.
pub fn inverse_dds_1d(
    width: usize,
    height: usize,
    layers: &[Surface<i16>],
) -> Result<Surface<i16>> {
    debug_assert_eq!(layers.len(), 16);
    let mut dst = Surface::build().reserve(width, height)?;

    for by in 0..height / 4 {
        for bx in 0..width / 4 {
            let mut c = [0i32; 16];
            for (l, layer) in layers.iter().enumerate() {
                c[l] = i32::from(layer.read(bx, by));
            }
            for j in 0..4 {
                for i in 0..4 {
                    let basis = &DDS_1D_BASIS[j][i];
                    let mut acc = 0i32;
                    for l in 0..16 {
                        acc += basis[l] * c[l];
                    }
                    dst.write(bx * 4 + i, by * 4 + j, clamp_i16(acc));
                }
            }
        }
    }

    Ok(dst.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layers_dd(values: [i16; 4], w: usize, h: usize) -> Vec<Surface<i16>> {
        values
            .iter()
            .map(|&v| Surface::build().fill(v, w, h).unwrap().finish())
            .collect()
    }

    #[test]
    fn dd_dc_only() {
        let layers = layers_dd([5, 0, 0, 0], 2, 2);
        let out = inverse_dd(4, 4, &layers).unwrap();
        for y in 0..4 {
            assert_eq!(out.row(y), &[5, 5, 5, 5]);
        }
    }

    #[test]
    fn dd_basis_signs() {
        let layers = layers_dd([1, 2, 4, 8], 1, 1);
        let out = inverse_dd(2, 2, &layers).unwrap();
        assert_eq!(out.read(0, 0), 1 + 2 + 4 + 8);
        assert_eq!(out.read(1, 0), 1 - 2 + 4 - 8);
        assert_eq!(out.read(0, 1), 1 + 2 - 4 - 8);
        assert_eq!(out.read(1, 1), 1 - 2 - 4 + 8);
    }

    #[test]
    fn dd_1d_rows_are_independent() {
        let layers = layers_dd([3, 1, 7, 2], 1, 1);
        let out = inverse_dd_1d(2, 2, &layers).unwrap();
        // top row from (c0, c1), bottom row from (c2, c3)
        assert_eq!(out.read(0, 0), 4);
        assert_eq!(out.read(1, 0), 2);
        assert_eq!(out.read(0, 1), 9);
        assert_eq!(out.read(1, 1), 5);
    }

    #[test]
    fn dds_dc_only() {
        let mut layers = vec![Surface::build().fill(0i16, 1, 1).unwrap().finish(); 16];
        layers[0] = Surface::build().fill(9i16, 1, 1).unwrap().finish();
        let out = inverse_dds(4, 4, &layers).unwrap();
        for y in 0..4 {
            assert_eq!(out.row(y), &[9, 9, 9, 9]);
        }
    }

    #[test]
    fn dds_basis_rows_match_columns() {
        // Each basis row must be +-1 only and rows must be distinct.
        for (i, row) in DDS_BASIS.iter().enumerate() {
            assert!(row.iter().all(|&v| v == 1 || v == -1));
            for other in DDS_BASIS.iter().skip(i + 1) {
                assert_ne!(row, other);
            }
        }
        // The 16 rows are mutually orthogonal (Hadamard family).
        for (i, a) in DDS_BASIS.iter().enumerate() {
            for b in DDS_BASIS.iter().skip(i + 1) {
                let dot: i32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
                assert_eq!(dot, 0);
            }
        }
    }

    #[test]
    fn output_clamps() {
        let layers = layers_dd([i16::MAX, i16::MAX, i16::MAX, i16::MAX], 1, 1);
        let out = inverse_dd(2, 2, &layers).unwrap();
        assert_eq!(out.read(0, 0), 32767);
    }

    #[test]
    fn remainder_pels_stay_zero() {
        // A 6-wide plane with 2x2 blocks covers 3 blocks exactly; a
        // 5-wide plane leaves the last column untouched.
        let layers = layers_dd([1, 0, 0, 0], 2, 1);
        let out = inverse_dd(5, 2, &layers).unwrap();
        assert_eq!(out.read(3, 0), 1);
        assert_eq!(out.read(4, 0), 0);
    }
}
