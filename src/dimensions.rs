//! Plane, layer and tile size arithmetic.
//!
//! Derives every surface size from the signalled configuration: the
//! conformant plane sizes per LOQ (rounded up so the LOQ1 layer grid
//! covers the signalled resolution), the per-layer coefficient grid, the
//! tile grid in layer units, and the base/intermediate sizes implied by
//! the two scaling modes. Recomputed whenever a Global block is
//! re-signalled.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::config::SignaledConfiguration;
use crate::types::{ScalingMode, LOQ_LEVEL_1, LOQ_LEVEL_2, MAX_NUM_LOQS, MAX_NUM_PLANES};
use crate::{Error, Result};

/// Derived image dimensions, one instance per signalled configuration.
#[derive(Debug, Clone, Default)]
pub struct Dimensions {
    // Dimensions of LOQs per plane
    plane_width: [[usize; MAX_NUM_LOQS]; MAX_NUM_PLANES],
    plane_height: [[usize; MAX_NUM_LOQS]; MAX_NUM_PLANES],

    // Dimensions of layers
    layer_width: [[usize; MAX_NUM_LOQS]; MAX_NUM_PLANES],
    layer_height: [[usize; MAX_NUM_LOQS]; MAX_NUM_PLANES],

    // Dimensions of tiles
    tile_width: [[usize; MAX_NUM_LOQS]; MAX_NUM_PLANES],
    tile_height: [[usize; MAX_NUM_LOQS]; MAX_NUM_PLANES],

    intermediate_width: usize,
    intermediate_height: usize,

    base_width: usize,
    base_height: usize,

    chroma_scale_width: usize,
    chroma_scale_height: usize,
}

impl Dimensions {
    /// Work out all dimensions for the signalled `width` x `height`.
    pub fn set(
        &mut self,
        configuration: &SignaledConfiguration,
        width: usize,
        height: usize,
    ) -> Result<()> {
        let (sx, sy) = configuration.global.colourspace.chroma_scale();
        self.chroma_scale_width = sx;
        self.chroma_scale_height = sy;

        if configuration.global.num_image_planes < configuration.global.num_processed_planes {
            return Err(Error::UnsupportedConfiguration(
                "more processed planes than image planes",
            ));
        }

        // Try with given dimensions
        self.set_dimensions(configuration, width, height)?;

        // Figure the conformant size: start from the smallest enhanced
        // plane's layer grid in pels and double until it covers the
        // signalled resolution.
        let last_plane = configuration.global.num_processed_planes.max(1) - 1;
        let tbs = configuration.global.transform_block_size;

        let mut w = self.layer_width[last_plane][LOQ_LEVEL_1] * tbs;
        let mut h = self.layer_height[last_plane][LOQ_LEVEL_1] * tbs;

        while w < width {
            w *= 2;
        }
        while h < height {
            h *= 2;
        }

        // Use conforming dimensions
        self.set_dimensions(configuration, w, h)?;

        // Sizes of the scaling layers
        match configuration.global.scaling_mode[LOQ_LEVEL_2] {
            ScalingMode::OneD => w /= 2,
            ScalingMode::TwoD => {
                w /= 2;
                h /= 2;
            }
            ScalingMode::None => {}
        }
        self.intermediate_width = w;
        self.intermediate_height = h;

        match configuration.global.scaling_mode[LOQ_LEVEL_1] {
            ScalingMode::OneD => w /= 2,
            ScalingMode::TwoD => {
                w /= 2;
                h /= 2;
            }
            ScalingMode::None => {}
        }
        self.base_width = w;
        self.base_height = h;

        Ok(())
    }

    pub fn plane_width(&self, plane: usize, loq: usize) -> usize {
        self.plane_width[plane][loq]
    }

    pub fn plane_height(&self, plane: usize, loq: usize) -> usize {
        self.plane_height[plane][loq]
    }

    pub fn layer_width(&self, plane: usize, loq: usize) -> usize {
        self.layer_width[plane][loq]
    }

    pub fn layer_height(&self, plane: usize, loq: usize) -> usize {
        self.layer_height[plane][loq]
    }

    pub fn tile_width(&self, plane: usize, loq: usize) -> usize {
        self.tile_width[plane][loq]
    }

    pub fn tile_height(&self, plane: usize, loq: usize) -> usize {
        self.tile_height[plane][loq]
    }

    pub fn conformant_width(&self, plane: usize) -> usize {
        self.plane_width[plane][LOQ_LEVEL_2]
    }

    pub fn conformant_height(&self, plane: usize) -> usize {
        self.plane_height[plane][LOQ_LEVEL_2]
    }

    /// Conformance-window crop units: chroma subsampling for luma, 1 for
    /// chroma.
    pub fn crop_unit_width(&self, plane: usize) -> usize {
        if plane == 0 {
            self.chroma_scale_width
        } else {
            1
        }
    }

    pub fn crop_unit_height(&self, plane: usize) -> usize {
        if plane == 0 {
            self.chroma_scale_height
        } else {
            1
        }
    }

    pub fn intermediate_width(&self) -> usize {
        self.intermediate_width
    }

    pub fn intermediate_height(&self) -> usize {
        self.intermediate_height
    }

    pub fn base_width(&self) -> usize {
        self.base_width
    }

    pub fn base_height(&self) -> usize {
        self.base_height
    }

    // Set surface dimensions for all planes of both loqs
    fn set_dimensions(
        &mut self,
        configuration: &SignaledConfiguration,
        width: usize,
        height: usize,
    ) -> Result<()> {
        self.set_loq_dimensions(configuration, LOQ_LEVEL_2, width, height)?;

        match configuration.global.scaling_mode[LOQ_LEVEL_2] {
            ScalingMode::None => self.set_loq_dimensions(configuration, LOQ_LEVEL_1, width, height),
            ScalingMode::OneD => {
                self.set_loq_dimensions(configuration, LOQ_LEVEL_1, (width + 1) / 2, height)
            }
            ScalingMode::TwoD => self.set_loq_dimensions(
                configuration,
                LOQ_LEVEL_1,
                (width + 1) / 2,
                (height + 1) / 2,
            ),
        }
    }

    // Set surface dimensions for all planes in one loq
    fn set_loq_dimensions(
        &mut self,
        configuration: &SignaledConfiguration,
        loq: usize,
        width: usize,
        height: usize,
    ) -> Result<()> {
        // Figure out UV dimensions from Y dimensions
        let chroma_width = (width + self.chroma_scale_width - 1) / self.chroma_scale_width;
        let chroma_height = (height + self.chroma_scale_height - 1) / self.chroma_scale_height;

        if configuration.global.num_image_planes >= 1 {
            self.set_plane_dimensions(configuration, 0, loq, width, height, 1, 1)?;
        }

        if configuration.global.num_image_planes == 3 {
            for plane in 1..3 {
                self.set_plane_dimensions(
                    configuration,
                    plane,
                    loq,
                    chroma_width,
                    chroma_height,
                    self.chroma_scale_width,
                    self.chroma_scale_height,
                )?;
            }
        }

        Ok(())
    }

    // Set surface dimensions for one plane
    fn set_plane_dimensions(
        &mut self,
        configuration: &SignaledConfiguration,
        plane: usize,
        loq: usize,
        width: usize,
        height: usize,
        scale_tile_width: usize,
        scale_tile_height: usize,
    ) -> Result<()> {
        let tbs = configuration.global.transform_block_size;

        self.plane_width[plane][loq] = width;
        self.plane_height[plane][loq] = height;

        self.layer_width[plane][loq] = (width + tbs - 1) / tbs;
        self.layer_height[plane][loq] = (height + tbs - 1) / tbs;

        // Convert signalled tile size (in top level luma pels) into per
        // layer size
        if configuration.global.tile_width != 0 && configuration.global.tile_height != 0 {
            if configuration.global.tile_width % tbs != 0
                || configuration.global.tile_height % tbs != 0
            {
                return Err(Error::UnsupportedConfiguration(
                    "tile size not a multiple of the transform block",
                ));
            }
            self.tile_width[plane][loq] = configuration.global.tile_width / (tbs * scale_tile_width);
            self.tile_height[plane][loq] =
                configuration.global.tile_height / (tbs * scale_tile_height);
        } else {
            self.tile_width[plane][loq] = 0;
            self.tile_height[plane][loq] = 0;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SignaledConfiguration;
    use crate::types::Colourspace;

    fn config() -> SignaledConfiguration {
        let mut c = SignaledConfiguration::default();
        c.global.colourspace = Colourspace::Yuv420;
        c.global.num_image_planes = 3;
        c.global.num_processed_planes = 1;
        c.global.transform_block_size = 2;
        c
    }

    #[test]
    fn no_scaling_passthrough() {
        let mut d = Dimensions::default();
        d.set(&config(), 64, 48).unwrap();
        assert_eq!(d.plane_width(0, LOQ_LEVEL_2), 64);
        assert_eq!(d.plane_height(0, LOQ_LEVEL_2), 48);
        assert_eq!(d.base_width(), 64);
        assert_eq!(d.base_height(), 48);
        assert_eq!(d.layer_width(0, LOQ_LEVEL_2), 32);
        assert_eq!(d.plane_width(1, LOQ_LEVEL_2), 32);
        assert_eq!(d.plane_height(1, LOQ_LEVEL_2), 24);
    }

    #[test]
    fn two_d_scaling_halves_base() {
        let mut c = config();
        c.global.scaling_mode[LOQ_LEVEL_2] = ScalingMode::TwoD;
        let mut d = Dimensions::default();
        d.set(&c, 64, 48).unwrap();
        assert_eq!(d.intermediate_width(), 32);
        assert_eq!(d.intermediate_height(), 24);
        assert_eq!(d.base_width(), 32);
        assert_eq!(d.plane_width(0, LOQ_LEVEL_1), 32);
    }

    #[test]
    fn both_loqs_scaled() {
        let mut c = config();
        c.global.scaling_mode[LOQ_LEVEL_1] = ScalingMode::TwoD;
        c.global.scaling_mode[LOQ_LEVEL_2] = ScalingMode::TwoD;
        let mut d = Dimensions::default();
        d.set(&c, 64, 48).unwrap();
        assert_eq!(d.intermediate_width(), 32);
        assert_eq!(d.base_width(), 16);
        assert_eq!(d.base_height(), 12);
        // base scaled back up covers the signalled size
        assert!(d.base_width() * 4 >= 64);
    }

    #[test]
    fn conformance_rounds_up() {
        // 10x10 with a 4x4 transform and chroma 420: chroma LOQ1 grid
        // forces the luma plane up to a covering size.
        let mut c = config();
        c.global.transform_block_size = 4;
        c.global.num_residual_layers = 16;
        c.global.num_processed_planes = 3;
        let mut d = Dimensions::default();
        d.set(&c, 10, 10).unwrap();
        assert!(d.conformant_width(0) >= 10);
        assert!(d.conformant_height(0) >= 10);
        assert_eq!(d.conformant_width(0) % 4, 0);
    }

    #[test]
    fn crop_units() {
        let mut d = Dimensions::default();
        d.set(&config(), 16, 16).unwrap();
        assert_eq!(d.crop_unit_width(0), 2);
        assert_eq!(d.crop_unit_height(0), 2);
        assert_eq!(d.crop_unit_width(1), 1);
    }

    #[test]
    fn tile_grid_in_layer_units() {
        let mut c = config();
        c.global.tile_width = 512;
        c.global.tile_height = 256;
        let mut d = Dimensions::default();
        d.set(&c, 1920, 1080).unwrap();
        assert_eq!(d.tile_width(0, LOQ_LEVEL_2), 256);
        assert_eq!(d.tile_height(0, LOQ_LEVEL_2), 128);
        assert_eq!(d.tile_width(1, LOQ_LEVEL_2), 128);
        assert_eq!(d.tile_height(1, LOQ_LEVEL_2), 64);
    }
}
