//! Bit-depth conversion to and from the internal representation.
//!
//! Processing runs in signed 15-bit fixed point: external depth-`d`
//! samples shift up to 15 bits and recentre around zero on the way in,
//! and shift back with rounding and a clamp to the container range on
//! the way out. Base planes shallower than the enhancement depth are
//! promoted by plain left shift first when the stream asks for it.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::image::Plane;
use crate::surface::Surface;
use crate::types::clamp;
use crate::{Error, Result};

fn shift_for_depth(depth: u32) -> Result<u32> {
    match depth {
        8 => Ok(7),
        10 => Ok(5),
        12 => Ok(3),
        14 => Ok(1),
        _ => Err(Error::UnsupportedConfiguration("bit depth")),
    }
}

/// Convert one external plane of depth `depth` to the internal signed
/// representation.
pub fn to_internal(plane: &Plane, depth: u32) -> Result<Surface<i16>> {
    let shift = shift_for_depth(depth)?;
    match plane {
        Plane::U8(s) => Surface::build()
            .generate(s.width(), s.height(), |x, y| {
                ((i32::from(s.read(x, y)) << shift) - 0x4000) as i16
            })
            .map(|b| b.finish()),
        Plane::U16(s) => Surface::build()
            .generate(s.width(), s.height(), |x, y| {
                ((i32::from(s.read(x, y)) << shift) - 0x4000) as i16
            })
            .map(|b| b.finish()),
    }
}

/// Convert one internal plane back to external samples of depth `depth`.
pub fn from_internal(surface: &Surface<i16>, depth: u32) -> Result<Plane> {
    let shift = shift_for_depth(depth)?;
    let half = (1i32 << shift) / 2;
    if depth == 8 {
        Surface::build()
            .generate(surface.width(), surface.height(), |x, y| {
                clamp((i32::from(surface.read(x, y)) + 0x4000 + half) >> shift, 0, 255) as u8
            })
            .map(|b| Plane::U8(b.finish()))
    } else {
        let max = 32767 >> shift;
        Surface::build()
            .generate(surface.width(), surface.height(), |x, y| {
                clamp(
                    (i32::from(surface.read(x, y)) + 0x4000 + half) >> shift,
                    0,
                    max,
                ) as u16
            })
            .map(|b| Plane::U16(b.finish()))
    }
}

/// Promote a base plane to a deeper container by left shift.
pub fn bit_shift(plane: &Plane, depth_src: u32, depth_dst: u32) -> Result<Plane> {
    if depth_dst <= depth_src {
        return Ok(plane.clone());
    }
    let shift = depth_dst - depth_src;
    match plane {
        Plane::U8(s) => Surface::build()
            .generate(s.width(), s.height(), |x, y| u16::from(s.read(x, y)) << shift)
            .map(|b| Plane::U16(b.finish())),
        Plane::U16(s) => Surface::build()
            .generate(s.width(), s.height(), |x, y| s.read(x, y) << shift)
            .map(|b| Plane::U16(b.finish())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u8_plane(values: &[u8]) -> Plane {
        Plane::U8(
            Surface::build()
                .generate(values.len(), 1, |x, _| values[x])
                .unwrap()
                .finish(),
        )
    }

    #[test]
    fn eight_bit_roundtrip_is_exact() {
        let plane = u8_plane(&(0u8..=255).collect::<Vec<_>>());
        let internal = to_internal(&plane, 8).unwrap();
        match from_internal(&internal, 8).unwrap() {
            Plane::U8(out) => {
                for x in 0..256 {
                    assert_eq!(out.read(x, 0), x as u8);
                }
            }
            Plane::U16(_) => panic!("expected 8-bit plane"),
        }
    }

    #[test]
    fn ten_bit_roundtrip_within_one() {
        let src = Surface::build()
            .generate(1024, 1, |x, _| x as u16)
            .unwrap()
            .finish();
        let internal = to_internal(&Plane::U16(src), 10).unwrap();
        match from_internal(&internal, 10).unwrap() {
            Plane::U16(out) => {
                for x in 0..1024 {
                    let diff = i32::from(out.read(x, 0)) - x as i32;
                    assert!(diff.abs() <= 1, "{x}: {diff}");
                }
            }
            Plane::U8(_) => panic!("expected 16-bit plane"),
        }
    }

    #[test]
    fn internal_range_is_centred() {
        let plane = u8_plane(&[0, 128, 255]);
        let internal = to_internal(&plane, 8).unwrap();
        assert_eq!(internal.read(0, 0), -0x4000);
        assert_eq!(internal.read(1, 0), 0);
        assert_eq!(internal.read(2, 0), 255 * 128 - 0x4000);
    }

    #[test]
    fn from_internal_clamps() {
        let s = Surface::build()
            .generate(2, 1, |x, _| if x == 0 { i16::MIN } else { i16::MAX })
            .unwrap()
            .finish();
        match from_internal(&s, 8).unwrap() {
            Plane::U8(out) => {
                assert_eq!(out.read(0, 0), 0);
                assert_eq!(out.read(1, 0), 255);
            }
            Plane::U16(_) => panic!("expected 8-bit plane"),
        }
    }

    #[test]
    fn promotion_left_shifts() {
        let plane = u8_plane(&[1, 255]);
        match bit_shift(&plane, 8, 10).unwrap() {
            Plane::U16(out) => {
                assert_eq!(out.read(0, 0), 4);
                assert_eq!(out.read(1, 0), 1020);
            }
            Plane::U8(_) => panic!("expected promotion"),
        }
    }

    #[test]
    fn unknown_depth_fails() {
        let plane = u8_plane(&[0]);
        assert!(to_internal(&plane, 9).is_err());
    }
}
