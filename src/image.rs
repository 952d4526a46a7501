//! Planar YUV images exchanged with the outside world.
//!
//! An [`Image`] bundles one picture's planes (8-bit or 16-bit container
//! samples) with its format description and the producer timestamp. The
//! base picture arrives as an `Image`; the decoded output leaves as one.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::surface::Surface;
use crate::types::Colourspace;
use crate::{Error, Result};

/// Planar image layout: colourspace and sample bit depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageFormat {
    pub colourspace: Colourspace,
    pub bit_depth: u32,
}

impl ImageFormat {
    pub fn new(colourspace: Colourspace, bit_depth: u32) -> Result<ImageFormat> {
        match bit_depth {
            8 | 10 | 12 | 14 | 16 => Ok(ImageFormat {
                colourspace,
                bit_depth,
            }),
            _ => Err(Error::UnsupportedConfiguration("bit depth")),
        }
    }

    pub fn num_planes(self) -> usize {
        self.colourspace.num_image_planes()
    }

    /// Bytes per sample in the container representation.
    pub fn bytes_per_sample(self) -> usize {
        if self.bit_depth > 8 {
            2
        } else {
            1
        }
    }
}

/// An [`ImageFormat`] at a concrete luma size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDescription {
    pub format: ImageFormat,
    pub width: usize,
    pub height: usize,
}

impl ImageDescription {
    pub fn new(format: ImageFormat, width: usize, height: usize) -> ImageDescription {
        ImageDescription {
            format,
            width,
            height,
        }
    }

    pub fn num_planes(&self) -> usize {
        self.format.num_planes()
    }

    pub fn bit_depth(&self) -> u32 {
        self.format.bit_depth
    }

    /// Width of `plane`, chroma subsampling applied (rounded up).
    pub fn plane_width(&self, plane: usize) -> usize {
        if plane == 0 {
            self.width
        } else {
            let (sx, _) = self.format.colourspace.chroma_scale();
            (self.width + sx - 1) / sx
        }
    }

    /// Height of `plane`, chroma subsampling applied (rounded up).
    pub fn plane_height(&self, plane: usize) -> usize {
        if plane == 0 {
            self.height
        } else {
            let (_, sy) = self.format.colourspace.chroma_scale();
            (self.height + sy - 1) / sy
        }
    }

    /// Total frame size in bytes when stored packed and planar.
    pub fn byte_size(&self) -> usize {
        (0..self.num_planes())
            .map(|p| self.plane_width(p) * self.plane_height(p) * self.format.bytes_per_sample())
            .sum()
    }
}

/// One plane's samples in their container type.
#[derive(Debug, Clone)]
pub enum Plane {
    U8(Surface<u8>),
    U16(Surface<u16>),
}

impl Plane {
    pub fn width(&self) -> usize {
        match self {
            Plane::U8(s) => s.width(),
            Plane::U16(s) => s.width(),
        }
    }

    pub fn height(&self) -> usize {
        match self {
            Plane::U8(s) => s.height(),
            Plane::U16(s) => s.height(),
        }
    }
}

/// A decoded picture: planes plus description and timestamp.
#[derive(Debug, Clone)]
pub struct Image {
    description: ImageDescription,
    timestamp: u64,
    planes: Vec<Plane>,
}

impl Image {
    /// The planes must match the description's count and sample width.
    pub fn new(description: ImageDescription, timestamp: u64, planes: Vec<Plane>) -> Result<Image> {
        if planes.len() != description.num_planes() {
            return Err(Error::DimensionMismatch("plane count"));
        }
        for (p, plane) in planes.iter().enumerate() {
            let depth_matches = match plane {
                Plane::U8(_) => description.format.bytes_per_sample() == 1,
                Plane::U16(_) => description.format.bytes_per_sample() == 2,
            };
            if !depth_matches
                || plane.width() != description.plane_width(p)
                || plane.height() != description.plane_height(p)
            {
                return Err(Error::DimensionMismatch("plane geometry"));
            }
        }
        Ok(Image {
            description,
            timestamp,
            planes,
        })
    }

    pub fn description(&self) -> &ImageDescription {
        &self.description
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn num_planes(&self) -> usize {
        self.planes.len()
    }

    pub fn plane(&self, plane: usize) -> &Plane {
        &self.planes[plane]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yuv420_plane_geometry() {
        let fmt = ImageFormat::new(Colourspace::Yuv420, 8).unwrap();
        let desc = ImageDescription::new(fmt, 9, 7);
        assert_eq!(desc.plane_width(0), 9);
        assert_eq!(desc.plane_height(0), 7);
        assert_eq!(desc.plane_width(1), 5);
        assert_eq!(desc.plane_height(2), 4);
        assert_eq!(desc.byte_size(), 9 * 7 + 2 * 5 * 4);
    }

    #[test]
    fn high_depth_uses_u16() {
        let fmt = ImageFormat::new(Colourspace::Y, 10).unwrap();
        assert_eq!(fmt.bytes_per_sample(), 2);
        assert_eq!(fmt.num_planes(), 1);
    }

    #[test]
    fn mismatched_planes_rejected() {
        let fmt = ImageFormat::new(Colourspace::Y, 8).unwrap();
        let desc = ImageDescription::new(fmt, 4, 4);
        let wrong = Surface::<u8>::build().fill(0, 2, 4).unwrap().finish();
        assert!(Image::new(desc, 0, vec![Plane::U8(wrong)]).is_err());
    }

    #[test]
    fn bad_depth_rejected() {
        assert!(ImageFormat::new(Colourspace::Y, 9).is_err());
    }
}
