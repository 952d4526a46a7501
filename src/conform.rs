//! Conformance-window cropping.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::surface::Surface;
use crate::{Error, Result};

/// Crop `left`/`top`/`right`/`bottom` pels from a plane; offsets are
/// already scaled by the plane's crop units.
pub fn conform(
    src: &Surface<i16>,
    left: usize,
    top: usize,
    right: usize,
    bottom: usize,
) -> Result<Surface<i16>> {
    if left + right >= src.width() || top + bottom >= src.height() {
        return Err(Error::DimensionMismatch("conformance window larger than plane"));
    }
    let width = src.width() - left - right;
    let height = src.height() - top - bottom;
    Surface::build()
        .generate(width, height, |x, y| src.read(x + left, y + top))
        .map(|b| b.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_keeps_interior() {
        let src = Surface::build()
            .generate(6, 4, |x, y| (10 * y + x) as i16)
            .unwrap()
            .finish();
        let out = conform(&src, 2, 1, 1, 0).unwrap();
        assert_eq!(out.width(), 3);
        assert_eq!(out.height(), 3);
        assert_eq!(out.read(0, 0), 12);
        assert_eq!(out.read(2, 2), 34);
    }

    #[test]
    fn zero_crop_is_identity() {
        let src = Surface::build().fill(5i16, 4, 4).unwrap().finish();
        let out = conform(&src, 0, 0, 0, 0).unwrap();
        assert_eq!(src, out);
    }

    #[test]
    fn oversized_window_fails() {
        let src = Surface::build().fill(0i16, 4, 4).unwrap().finish();
        assert!(conform(&src, 2, 0, 2, 0).is_err());
    }
}
