//! Per-picture decode orchestration and cross-frame state.
//!
//! A [`Decoder`] owns everything that survives between pictures: the
//! signalled configuration, derived dimensions, quant-matrix memory, the
//! per-plane temporal buffers and the dithering generator. Each picture
//! is two calls: [`Decoder::initialize_decode`] parses the enhancement
//! packet into a [`SymbolTensor`], then [`Decoder::decode`] reconstructs
//! the output image from the base picture and those symbols.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::config::SignaledConfiguration;
use crate::conform::conform;
use crate::convert::{bit_shift, from_internal, to_internal};
use crate::deblock::deblock;
use crate::dequant::{
    self, chroma_step_width, find_quant_matrix_coeff, temporal_step_width, LayerDequant,
};
use crate::deserializer::{Deserializer, SyntaxBlock};
use crate::dimensions::Dimensions;
use crate::dither::Dithering;
use crate::image::{Image, ImageDescription, ImageFormat, Plane};
use crate::packet::Packet;
use crate::surface::Surface;
use crate::temporal::{add, apply_temporal_map};
use crate::transform;
use crate::types::*;
use crate::upsample::{
    predicted_residual_adjust, predicted_residual_adjust_1d, predicted_residual_sum,
    predicted_residual_sum_1d, upsample_1d, upsample_2d,
};
use crate::{Error, Result};

/// One picture's decoded symbols: residual coefficient layers per
/// (plane, loq) and the optional temporal layer per plane.
#[derive(Debug, Clone, Default)]
pub struct SymbolTensor {
    residuals: [[[Option<Surface<i16>>; MAX_NUM_LAYERS]; MAX_NUM_LOQS]; MAX_NUM_PLANES],
    temporal: [Option<Surface<u8>>; MAX_NUM_PLANES],
}

impl SymbolTensor {
    pub fn residual(&self, plane: usize, loq: usize, layer: usize) -> Option<&Surface<i16>> {
        self.residuals[plane][loq][layer].as_ref()
    }

    pub fn temporal(&self, plane: usize) -> Option<&Surface<u8>> {
        self.temporal[plane].as_ref()
    }

    pub(crate) fn set_residual(
        &mut self,
        plane: usize,
        loq: usize,
        layer: usize,
        surface: Surface<i16>,
    ) {
        self.residuals[plane][loq][layer] = Some(surface);
    }

    pub(crate) fn set_temporal(&mut self, plane: usize, surface: Surface<u8>) {
        self.temporal[plane] = Some(surface);
    }

    pub fn clear(&mut self) {
        *self = SymbolTensor::default();
    }
}

/// Driver switches mirroring the reference harness.
#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    /// Apply dithering when the bitstream asks for it.
    pub dithering_switch: bool,
    /// Seed the dither generator deterministically.
    pub dithering_fixed: bool,
    /// Apply residual layers; off reproduces the upsampled base.
    pub apply_enhancement: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions {
            dithering_switch: true,
            dithering_fixed: false,
            apply_enhancement: true,
        }
    }
}

/// The enhancement decoder; one instance per stream.
pub struct Decoder {
    configuration: SignaledConfiguration,
    dimensions: Dimensions,

    // Cross-frame state
    quant_matrix_coeffs: [[[i32; MAX_NUM_LAYERS]; MAX_NUM_LOQS]; MAX_NUM_PLANES],
    temporal_buffer: [Option<Surface<i16>>; MAX_NUM_PLANES],
    dithering: Dithering,
}

impl Default for Decoder {
    fn default() -> Self {
        Decoder::new()
    }
}

impl Decoder {
    pub fn new() -> Decoder {
        Decoder {
            configuration: SignaledConfiguration::default(),
            dimensions: Dimensions::default(),
            quant_matrix_coeffs: [[[-1; MAX_NUM_LAYERS]; MAX_NUM_LOQS]; MAX_NUM_PLANES],
            temporal_buffer: [None, None, None],
            dithering: Dithering::default(),
        }
    }

    pub fn configuration(&self) -> &SignaledConfiguration {
        &self.configuration
    }

    pub fn dimensions(&self) -> &Dimensions {
        &self.dimensions
    }

    fn transform_block_size(&self) -> usize {
        self.configuration.global.transform_block_size
    }

    fn num_residual_layers(&self) -> usize {
        self.configuration.global.num_residual_layers
    }

    // Does this layer have user_data embedded?
    fn is_user_data_layer(&self, loq: usize, layer: usize) -> bool {
        if loq == LOQ_LEVEL_1 && self.configuration.global.user_data_enabled != UserDataMode::None {
            if self.transform_block_size() == 4 {
                layer == 5
            } else {
                layer == 1
            }
        } else {
            false
        }
    }

    /// Parse one picture's enhancement packet. `is_idr` reflects the
    /// carriage (NAL type 29) and resets per-stream state.
    pub fn initialize_decode(
        &mut self,
        enhancement_data: &Packet,
        is_idr: bool,
        symbols: &mut SymbolTensor,
    ) -> Result<()> {
        self.configuration.picture.coding_type = if is_idr {
            CodingType::Idr
        } else {
            CodingType::NonIdr
        };
        symbols.clear();

        let mut saw_global = false;
        {
            let mut deserializer =
                Deserializer::new(enhancement_data, &mut self.configuration, symbols);
            while deserializer.has_more() {
                let block = deserializer.parse_block()?;
                if block == SyntaxBlock::Global {
                    // Surface sizes must track a re-signalled Global
                    // before the encoded data that follows it is parsed.
                    saw_global = true;
                    deserializer.refresh_surface_sizes()?;
                }
            }
        }

        if saw_global {
            self.dimensions.set(
                &self.configuration,
                self.configuration.global.resolution_width,
                self.configuration.global.resolution_height,
            )?;

            // (Re)allocate temporal buffers when the plane geometry moved
            if self.configuration.global.temporal_enabled {
                for plane in 0..self.configuration.global.num_processed_planes {
                    let width = self.dimensions.plane_width(plane, LOQ_LEVEL_2);
                    let height = self.dimensions.plane_height(plane, LOQ_LEVEL_2);
                    let stale = match &self.temporal_buffer[plane] {
                        Some(buffer) => buffer.width() != width || buffer.height() != height,
                        None => true,
                    };
                    if stale {
                        self.temporal_buffer[plane] =
                            Some(Surface::build().reserve(width, height)?.finish());
                    }
                }
            }
        }

        Ok(())
    }

    /// Decode one picture. The base image must match the signalled base
    /// dimensions; cross-frame state is untouched when an error returns.
    pub fn decode(
        &mut self,
        ext_base: &Image,
        symbols: &SymbolTensor,
        options: &DecodeOptions,
    ) -> Result<Image> {
        if !self.configuration.global_valid {
            return Err(Error::InvalidPicture("decode before configuration"));
        }

        let is_idr = self.configuration.picture.coding_type == CodingType::Idr;

        // Verify dimensions of the base image
        if ext_base.description().width != self.dimensions.base_width()
            || ext_base.description().height != self.dimensions.base_height()
        {
            return Err(Error::DimensionMismatch("base image size"));
        }

        if !self.dithering.initialised() {
            self.dithering.make_buffer(
                self.configuration.picture.dithering_strength,
                self.configuration.global.enhancement_depth,
                options.dithering_fixed,
            );
        }

        let num_planes = ext_base.num_planes();
        let global = &self.configuration.global;

        // Work out quantization matrices for this picture
        let mut quant_matrix_coeffs = self.quant_matrix_coeffs;
        for plane in 0..num_planes {
            for loq in 0..MAX_NUM_LOQS {
                for layer in 0..self.num_residual_layers() {
                    quant_matrix_coeffs[plane][loq][layer] = find_quant_matrix_coeff(
                        &self.configuration.picture,
                        loq,
                        layer,
                        is_idr,
                        quant_matrix_coeffs[plane][loq][layer],
                    );
                }
            }
        }

        //// Base + sub-layer 1 per plane
        let mut base_reco: Vec<Surface<i16>> = Vec::with_capacity(num_planes);
        for plane in 0..num_planes {
            let enhancement_enabled = self.configuration.picture.enhancement_enabled
                && plane < global.num_processed_planes;

            // Convert between base and enhancement bit depth
            let mut base_bit_depth = global.base_depth;
            let base_plane = if global.enhancement_depth > global.base_depth
                && global.level1_depth_flag
            {
                base_bit_depth = global.enhancement_depth;
                let promoted =
                    bit_shift(ext_base.plane(plane), global.base_depth, global.enhancement_depth)?;
                to_internal(&promoted, base_bit_depth)?
            } else {
                to_internal(ext_base.plane(plane), base_bit_depth)?
            };

            // Upsample from decoded base picture to the preliminary
            // intermediate picture
            let base_upsampled = self.upsample_plane(&base_plane, LOQ_LEVEL_1)?;

            if enhancement_enabled && options.apply_enhancement {
                let mut residuals = self.decode_residuals(
                    plane,
                    LOQ_LEVEL_1,
                    &quant_matrix_coeffs[plane][LOQ_LEVEL_1],
                    None,
                    symbols,
                )?;

                if self.configuration.picture.level_1_filtering_enabled
                    && self.transform_block_size() == 4
                {
                    residuals = deblock(
                        &residuals,
                        global.level_1_filtering_first_coefficient,
                        global.level_1_filtering_second_coefficient,
                    )?;
                }

                base_reco.push(add(&base_upsampled, &residuals)?);
            } else {
                base_reco.push(base_upsampled);
            }
        }

        //// Upsample to the preliminary output picture
        let mut upsampled_planes: Vec<Surface<i16>> = Vec::with_capacity(num_planes);
        for plane_reco in &base_reco {
            upsampled_planes.push(self.upsample_plane(plane_reco, LOQ_LEVEL_2)?);
        }

        //// Sub-layer 2 + temporal per plane
        let mut temporal_buffer_next: Vec<Option<Surface<i16>>> = vec![None; MAX_NUM_PLANES];
        let mut full_reco: Vec<Surface<i16>> = Vec::with_capacity(num_planes);
        for (plane, upsampled) in upsampled_planes.into_iter().enumerate() {
            let enhancement_enabled = self.configuration.picture.enhancement_enabled
                && plane < global.num_processed_planes;

            if enhancement_enabled && options.apply_enhancement {
                let temporal_mask = self.temporal_mask(plane, symbols)?;
                let residuals = self.decode_residuals(
                    plane,
                    LOQ_LEVEL_2,
                    &quant_matrix_coeffs[plane][LOQ_LEVEL_2],
                    temporal_mask.as_ref(),
                    symbols,
                )?;

                if global.temporal_enabled {
                    let mask = temporal_mask
                        .ok_or(Error::InvalidPicture("temporal mask unavailable"))?;
                    let buffer = self.temporal_plane_buffer(plane, &upsampled, is_idr)?;
                    let buffer =
                        apply_temporal_map(&buffer, &mask, self.transform_block_size())?;
                    let buffer = add(&buffer, &residuals)?;
                    full_reco.push(add(&upsampled, &buffer)?);
                    temporal_buffer_next[plane] = Some(buffer);
                } else {
                    full_reco.push(add(&upsampled, &residuals)?);
                }
            } else if plane < global.num_processed_planes && options.apply_enhancement {
                // No enhancement, but the temporal layer can still apply
                if global.temporal_enabled {
                    let mask = self
                        .temporal_mask(plane, symbols)?
                        .ok_or(Error::InvalidPicture("temporal mask unavailable"))?;
                    let buffer = self.temporal_plane_buffer(plane, &upsampled, is_idr)?;
                    let buffer =
                        apply_temporal_map(&buffer, &mask, self.transform_block_size())?;
                    full_reco.push(add(&upsampled, &buffer)?);
                    temporal_buffer_next[plane] = Some(buffer);
                } else {
                    full_reco.push(upsampled);
                }
            } else {
                full_reco.push(upsampled);
            }
        }

        //// Dithering (luma only)
        let block_size = self.transform_block_size();
        let mut outp_reco: Vec<Surface<i16>> = Vec::with_capacity(num_planes);
        for (plane, reco) in full_reco.into_iter().enumerate() {
            if options.dithering_switch
                && self.configuration.picture.dithering_control
                && self.configuration.picture.dithering_type != DitheringType::None
                && plane == 0
            {
                outp_reco.push(self.dithering.process(&reco, block_size)?);
            } else {
                outp_reco.push(reco);
            }
        }

        //// Conformance window and conversion out
        let mut output_planes: Vec<Plane> = Vec::with_capacity(num_planes);
        for (plane, reco) in outp_reco.into_iter().enumerate() {
            let cropped = if self.configuration.sequence.conformance_window {
                let cw = self.dimensions.crop_unit_width(plane);
                let ch = self.dimensions.crop_unit_height(plane);
                let sequence = &self.configuration.sequence;
                conform(
                    &reco,
                    sequence.conf_win_left_offset as usize * cw,
                    sequence.conf_win_top_offset as usize * ch,
                    sequence.conf_win_right_offset as usize * cw,
                    sequence.conf_win_bottom_offset as usize * ch,
                )?
            } else {
                reco
            };
            output_planes.push(from_internal(&cropped, global.enhancement_depth)?);
        }

        let output_description = ImageDescription::new(
            ImageFormat::new(global.colourspace, global.enhancement_depth)?,
            output_planes[0].width(),
            output_planes[0].height(),
        );
        let output = Image::new(output_description, ext_base.timestamp(), output_planes)?;

        // All stages succeeded: commit cross-frame state
        self.quant_matrix_coeffs = quant_matrix_coeffs;
        for (plane, buffer) in temporal_buffer_next.into_iter().enumerate() {
            if let Some(buffer) = buffer {
                self.temporal_buffer[plane] = Some(buffer);
            }
        }

        Ok(output)
    }

    // Upsample one plane by the loq's scaling mode, with the
    // predicted-residual adjustment when enabled.
    fn upsample_plane(&self, src: &Surface<i16>, loq: usize) -> Result<Surface<i16>> {
        let global = &self.configuration.global;
        match global.scaling_mode[loq] {
            ScalingMode::None => Ok(src.clone()),
            ScalingMode::OneD => {
                let up = upsample_1d(src, global.upsample, &global.upsampling_coefficients)?;
                if global.predicted_residual_enabled {
                    let sum = predicted_residual_sum_1d(&up)?;
                    predicted_residual_adjust_1d(src, &up, &sum)
                } else {
                    Ok(up)
                }
            }
            ScalingMode::TwoD => {
                let up = upsample_2d(src, global.upsample, &global.upsampling_coefficients)?;
                if global.predicted_residual_enabled {
                    let sum = predicted_residual_sum(&up)?;
                    predicted_residual_adjust(src, &up, &sum)
                } else {
                    Ok(up)
                }
            }
        }
    }

    // Derive the temporal mask for one plane, or None when temporal
    // processing is disabled.
    fn temporal_mask(&self, plane: usize, symbols: &SymbolTensor) -> Result<Option<Surface<u8>>> {
        if !self.configuration.global.temporal_enabled {
            return Ok(None);
        }
        if self.configuration.picture.temporal_signalling_present {
            let mask = symbols
                .temporal(plane)
                .ok_or(Error::InvalidPicture("missing temporal layer"))?;
            return Ok(Some(mask.clone()));
        }
        let value = if self.configuration.picture.temporal_refresh {
            TEMPORAL_INTR
        } else {
            TEMPORAL_PRED
        };
        let width = self.dimensions.layer_width(plane, LOQ_LEVEL_2);
        let height = self.dimensions.layer_height(plane, LOQ_LEVEL_2);
        Ok(Some(Surface::build().fill(value, width, height)?.finish()))
    }

    // The persistent buffer for one plane, lazily allocated to the
    // upsampled plane's size. An IDR starts from a zeroed buffer; the
    // stored state is only replaced once the whole picture succeeds.
    fn temporal_plane_buffer(
        &self,
        plane: usize,
        upsampled: &Surface<i16>,
        is_idr: bool,
    ) -> Result<Surface<i16>> {
        match &self.temporal_buffer[plane] {
            Some(buffer) if !is_idr => Ok(buffer.clone()),
            _ => Ok(Surface::build()
                .reserve(upsampled.width(), upsampled.height())?
                .finish()),
        }
    }

    // Decode one sub-layer's residual plane: inverse quantize every
    // layer, then inverse transform. At LOQ2 with temporal prediction
    // active and no refresh, each layer carries two step widths selected
    // by the mask.
    fn decode_residuals(
        &self,
        plane: usize,
        loq: usize,
        quant_matrix_coeffs: &[i32; MAX_NUM_LAYERS],
        temporal_mask: Option<&Surface<u8>>,
        symbols: &SymbolTensor,
    ) -> Result<Surface<i16>> {
        let global = &self.configuration.global;
        let picture = &self.configuration.picture;
        let horizontal_only = global.scaling_mode[loq] == ScalingMode::OneD;

        let mut calculated_step_width = picture.step_width_loq[loq] as i32;
        if loq == LOQ_LEVEL_2 && plane > 0 {
            calculated_step_width =
                chroma_step_width(calculated_step_width, global.chroma_step_width_multiplier);
        }

        let two_pass = loq == LOQ_LEVEL_2
            && global.temporal_enabled
            && !picture.temporal_refresh;
        let step_width = if two_pass {
            [
                temporal_step_width(calculated_step_width, global.temporal_step_width_modifier),
                calculated_step_width,
            ]
        } else {
            [calculated_step_width, calculated_step_width]
        };

        // Per layer, per pass dequantization parameters
        let mut layer_dequant = [[LayerDequant::default(); 2]; MAX_NUM_LAYERS];
        for layer in 0..self.num_residual_layers() {
            for pass in 0..if two_pass { 2 } else { 1 } {
                let sw = step_width[pass];
                let dirq = dequant::find_dirq_step_width(sw, quant_matrix_coeffs[layer]);
                let offset = dequant::find_invq_offset(picture, sw, dirq);
                let invq_sw = dequant::find_invq_step_width(picture, dirq, offset);
                let deadzone = dequant::find_layer_deadzone(sw, invq_sw);
                let applied = dequant::find_invq_applied_offset(picture, offset, deadzone);
                layer_dequant[layer][pass] = LayerDequant {
                    step_width: invq_sw,
                    applied_offset: applied,
                };
            }
        }

        // Dequantize every layer
        let mut coefficients: Vec<Surface<i16>> = Vec::with_capacity(self.num_residual_layers());
        for layer in 0..self.num_residual_layers() {
            let raw = symbols
                .residual(plane, loq, layer)
                .ok_or(Error::InvalidPicture("missing residual layer"))?;

            // Extract user data if it is embedded in the coefficients
            let cleared;
            let syms = if self.is_user_data_layer(loq, layer) {
                cleared = dequant::user_data_clear(raw, global.user_data_enabled)?;
                &cleared
            } else {
                raw
            };

            let dequantized = if two_pass {
                let mask = temporal_mask
                    .ok_or(Error::InvalidPicture("temporal mask unavailable"))?;
                dequant::inverse_quantize_swm(syms, &layer_dequant[layer], mask)?
            } else {
                dequant::inverse_quantize(syms, &layer_dequant[layer][0])?
            };
            coefficients.push(dequantized);
        }

        let width = self.dimensions.plane_width(plane, loq);
        let height = self.dimensions.plane_height(plane, loq);

        if !horizontal_only {
            if self.transform_block_size() == 4 {
                transform::inverse_dds(width, height, &coefficients)
            } else {
                transform::inverse_dd(width, height, &coefficients)
            }
        } else if self.transform_block_size() == 4 {
            transform::inverse_dds_1d(width, height, &coefficients)
        } else {
            transform::inverse_dd_1d(width, height, &coefficients)
        }
    }
}
