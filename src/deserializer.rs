//! Enhancement bitstream deserialization.
//!
//! The top level loop walks syntax blocks -- Sequence, Global, Picture,
//! EncodedData, EncodedDataTiled, AdditionalInfo, Filler -- each framed
//! by a `[payload_size_type:3, payload_type:5]` byte and an optional
//! varint length. Configuration records are filled in place; coefficient
//! layers are handed to the entropy decoders and land in the caller's
//! symbol tensor.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::bitio::BitstreamUnpacker;
use crate::config::{
    GlobalConfiguration, PictureConfiguration, SequenceConfiguration, SignaledConfiguration,
};
use crate::decoder::SymbolTensor;
use crate::dimensions::Dimensions;
use crate::entropy;
use crate::packet::Packet;
use crate::surface::Surface;
use crate::types::*;
use crate::{Error, Result, ToUsize};

/// Syntax block kinds, in payload-type order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxBlock {
    Sequence,
    Global,
    Picture,
    EncodedData,
    EncodedDataTiled,
    AdditionalInfo,
    Filler,
}

// Coded resolution table; index 0 is unused, 63 signals explicit fields.
#[rustfmt::skip]
const RESOLUTION_TABLE: [(usize, usize); 51] = [
    (0, 0),       (360, 200),   (400, 240),   (480, 320),   (640, 360),
    (640, 480),   (768, 480),   (800, 600),   (852, 480),   (854, 480),
    (856, 480),   (960, 540),   (960, 640),   (1024, 576),  (1024, 600),
    (1024, 768),  (1152, 864),  (1280, 720),  (1280, 800),  (1280, 1024),
    (1360, 768),  (1366, 768),  (1440, 1050), (1440, 900),  (1600, 1200),
    (1680, 1050), (1920, 1080), (1920, 1200), (2048, 1080), (2048, 1152),
    (2048, 1536), (2160, 1440), (2560, 1440), (2560, 1600), (2560, 2048),
    (3200, 1800), (3200, 2048), (3200, 2400), (3440, 1440), (3840, 1600),
    (3840, 2160), (3840, 3072), (4096, 2160), (4096, 3072), (5120, 2880),
    (5120, 3200), (5120, 4096), (6400, 4096), (6400, 4800), (7680, 4320),
    (7680, 4800),
];

static_assertions::const_assert_eq!(RESOLUTION_TABLE.len(), 51);

/// Parses one enhancement packet into configuration and symbols.
pub struct Deserializer<'a> {
    b: BitstreamUnpacker<'a>,
    configuration: &'a mut SignaledConfiguration,
    symbols: &'a mut SymbolTensor,
}

impl<'a> Deserializer<'a> {
    pub fn new(
        packet: &'a Packet,
        configuration: &'a mut SignaledConfiguration,
        symbols: &'a mut SymbolTensor,
    ) -> Deserializer<'a> {
        Deserializer {
            b: BitstreamUnpacker::new(packet),
            configuration,
            symbols,
        }
    }

    pub fn has_more(&self) -> bool {
        !self.b.is_empty()
    }

    /// Recompute the per-(plane, loq) coefficient surface sizes after a
    /// Global block; encoded data parsed later in the same packet uses
    /// them.
    pub fn refresh_surface_sizes(&mut self) -> Result<()> {
        let mut dimensions = Dimensions::default();
        dimensions.set(
            self.configuration,
            self.configuration.global.resolution_width,
            self.configuration.global.resolution_height,
        )?;
        for plane in 0..self.configuration.global.num_image_planes {
            for loq in 0..MAX_NUM_LOQS {
                self.configuration.surface[plane][loq].width = dimensions.layer_width(plane, loq);
                self.configuration.surface[plane][loq].height = dimensions.layer_height(plane, loq);
            }
        }
        Ok(())
    }

    /// Parse one syntax block and return its kind.
    pub fn parse_block(&mut self) -> Result<SyntaxBlock> {
        let payload_size_type = self.b.u(3, "payload_size_type")?;
        let payload_type = self.b.u(5, "payload_type")?;

        let payload_byte_size = match payload_size_type {
            0..=5 => payload_size_type.to_usize(),
            7 => self.b.multibyte("payload_byte_size")?.to_usize(),
            _ => return Err(Error::MalformedBitstream("reserved payload_size_type")),
        };

        // Read all payload into a packet, then parse from that
        let payload = self.b.bytes(payload_byte_size)?;
        let mut pb = BitstreamUnpacker::new(&payload);

        match payload_type {
            0 => {
                parse_sequence_config(&mut self.configuration.sequence, &mut pb)?;
                Ok(SyntaxBlock::Sequence)
            }
            1 => {
                parse_global_config(&mut self.configuration.global, &mut pb)?;
                self.configuration.global_valid = true;
                Ok(SyntaxBlock::Global)
            }
            2 => {
                if !self.configuration.global_valid {
                    return Err(Error::InvalidPicture("picture before global configuration"));
                }
                let num_residual_layers = self.configuration.global.num_residual_layers;
                let temporal_enabled = self.configuration.global.temporal_enabled;
                parse_picture_config(
                    &mut self.configuration.picture,
                    &mut pb,
                    num_residual_layers,
                    temporal_enabled,
                )?;
                Ok(SyntaxBlock::Picture)
            }
            3 => {
                if !self.configuration.global_valid {
                    return Err(Error::InvalidPicture("encoded data before global configuration"));
                }
                parse_encoded_data(self.configuration, &mut pb, self.symbols)?;
                Ok(SyntaxBlock::EncodedData)
            }
            4 => {
                if !self.configuration.global_valid {
                    return Err(Error::InvalidPicture("encoded data before global configuration"));
                }
                parse_encoded_data_tiled(self.configuration, &mut pb, self.symbols)?;
                Ok(SyntaxBlock::EncodedDataTiled)
            }
            5 => {
                parse_additional_info(&mut pb)?;
                Ok(SyntaxBlock::AdditionalInfo)
            }
            6 => {
                parse_filler(&mut pb)?;
                Ok(SyntaxBlock::Filler)
            }
            _ => Err(Error::MalformedBitstream("reserved payload_type")),
        }
    }
}

fn parse_sequence_config(
    sequence: &mut SequenceConfiguration,
    b: &mut BitstreamUnpacker<'_>,
) -> Result<()> {
    b.push_label("sequence_config");

    let profile_idc = b.u(4, "profile_idc")?;
    sequence.level_idc = b.u(4, "level_idc")?;
    sequence.sublevel_idc = b.u(2, "sublevel_idc")?;
    sequence.conformance_window = b.flag("conformance_window_flag")?;
    b.u(5, "reserved")?;
    if profile_idc == 15 || sequence.level_idc == 15 {
        b.u(3, "extended_profile_idc")?;
        b.u(3, "extended_level_idc")?;
        b.u(1, "reserved")?;
    }
    if sequence.conformance_window {
        sequence.conf_win_left_offset = b.multibyte("conf_win_left_offset")? as u32;
        sequence.conf_win_right_offset = b.multibyte("conf_win_right_offset")? as u32;
        sequence.conf_win_top_offset = b.multibyte("conf_win_top_offset")? as u32;
        sequence.conf_win_bottom_offset = b.multibyte("conf_win_bottom_offset")? as u32;
    }

    sequence.profile_idc = Profile::try_from(profile_idc)?;

    b.pop_label();
    Ok(())
}

fn parse_global_config(
    global: &mut GlobalConfiguration,
    b: &mut BitstreamUnpacker<'_>,
) -> Result<()> {
    b.push_label("global_config");

    let processed_planes_type = b.u(1, "processed_planes_type")?;
    let resolution_type = b.u(6, "resolution_type")?;
    let transform_type = b.u(1, "transform_type")?;
    let chroma_sampling_type = b.u(2, "chroma_sampling_type")?;
    let base_depth_type = b.u(2, "base_depth_type")?;
    let enhancement_depth_type = b.u(2, "enhancement_depth_type")?;
    let temporal_step_width_modifier_signalled = b.flag("temporal_step_width_modifier_signalled")?;
    global.predicted_residual_enabled = b.flag("predicted_residual_mode")?;
    global.temporal_tile_intra_signalling_enabled =
        b.flag("temporal_tile_intra_signalling_enabled")?;
    global.temporal_enabled = b.flag("temporal_enabled")?;
    let upsample_type = b.u(3, "upsample_type")?;
    let level_1_filtering_signalled = b.flag("level_1_filtering_signalled")?;
    let scaling_mode_level1 = b.u(2, "scaling_mode_level1")?;
    let scaling_mode_level2 = b.u(2, "scaling_mode_level2")?;
    let tile_dimensions_type = b.u(2, "tile_dimensions_type")?;
    let user_data_enabled = b.u(2, "user_data_enabled")?;
    global.user_data_enabled = UserDataMode::try_from(user_data_enabled)?;
    global.level1_depth_flag = b.flag("level1_depth_flag")?;
    let chroma_step_width_flag = b.flag("chroma_step_width_flag")?;

    if processed_planes_type == 0 {
        global.num_processed_planes = 1; // Y
    } else {
        let planes_type = b.u(4, "planes_type")?;
        b.u(4, "reserved")?;
        match planes_type {
            1 => global.num_processed_planes = 3, // YUV
            _ => return Err(Error::UnsupportedConfiguration("planes_type")),
        }
    }

    global.temporal_step_width_modifier = if temporal_step_width_modifier_signalled {
        b.u(8, "temporal_step_width_modifier")?
    } else {
        48
    };

    if upsample_type == 4 {
        for i in 0..4 {
            global.upsampling_coefficients[i] = b.u(16, "upsampling_coefficient")?;
        }
    }

    if level_1_filtering_signalled {
        global.level_1_filtering_first_coefficient = b.u(4, "level_1_filtering_first_coefficient")?;
        global.level_1_filtering_second_coefficient =
            b.u(4, "level_1_filtering_second_coefficient")?;
    } else {
        global.level_1_filtering_first_coefficient = 0;
        global.level_1_filtering_second_coefficient = 0;
    }

    match tile_dimensions_type {
        0 => {
            global.tile_dimensions_type = TileDimensions::None;
            global.tile_width = 0;
            global.tile_height = 0;
        }
        1 => {
            global.tile_dimensions_type = TileDimensions::Tile512x256;
            global.tile_width = 512;
            global.tile_height = 256;
        }
        2 => {
            global.tile_dimensions_type = TileDimensions::Tile1024x512;
            global.tile_width = 1024;
            global.tile_height = 512;
        }
        _ => {
            global.tile_dimensions_type = TileDimensions::Custom;
            global.tile_width = b.u(16, "custom_tile_width")?.to_usize();
            global.tile_height = b.u(16, "custom_tile_height")?.to_usize();
        }
    }

    if tile_dimensions_type > 0 {
        b.u(5, "reserved")?;
        global.compression_type_entropy_enabled_per_tile =
            b.flag("compression_type_entropy_enabled_per_tile")?;
        let compression_type_size_per_tile = b.u(2, "compression_type_size_per_tile")?;
        global.compression_type_size_per_tile =
            CompressionType::try_from(compression_type_size_per_tile)?;
    }

    if resolution_type > 0 && resolution_type < 51 {
        let (w, h) = RESOLUTION_TABLE[resolution_type.to_usize()];
        global.resolution_width = w;
        global.resolution_height = h;
    } else if resolution_type == 63 {
        global.resolution_width = b.u(16, "resolution_width")?.to_usize();
        global.resolution_height = b.u(16, "resolution_height")?.to_usize();
    } else {
        return Err(Error::UnsupportedConfiguration("resolution_type"));
    }

    global.chroma_step_width_multiplier = if chroma_step_width_flag {
        b.u(8, "chroma_step_width_multiplier")?
    } else {
        64
    };

    global.colourspace = Colourspace::try_from(chroma_sampling_type)?;
    global.num_image_planes = global.colourspace.num_image_planes();
    if global.num_image_planes < global.num_processed_planes {
        return Err(Error::UnsupportedConfiguration(
            "monochrome stream with chroma processing",
        ));
    }

    match transform_type {
        0 => {
            global.transform_block_size = 2;
            global.num_residual_layers = 4;
        }
        _ => {
            global.transform_block_size = 4;
            global.num_residual_layers = 16;
        }
    }

    global.base_depth = match base_depth_type {
        0 => 8,
        1 => 10,
        2 => 12,
        _ => 14,
    };
    global.enhancement_depth = match enhancement_depth_type {
        0 => 8,
        1 => 10,
        2 => 12,
        _ => 14,
    };

    global.upsample = Upsample::try_from(upsample_type)?;
    global.scaling_mode[LOQ_LEVEL_1] = ScalingMode::try_from(scaling_mode_level1)?;
    global.scaling_mode[LOQ_LEVEL_2] = ScalingMode::try_from(scaling_mode_level2)?;

    b.pop_label();
    Ok(())
}

fn parse_picture_config(
    picture: &mut PictureConfiguration,
    b: &mut BitstreamUnpacker<'_>,
    num_residual_layers: usize,
    temporal_enabled: bool,
) -> Result<()> {
    b.push_label("picture_config");

    let picture_type;

    picture.enhancement_enabled = !b.flag("no_enhancement_bit")?;
    if picture.enhancement_enabled {
        let quant_matrix_mode = b.u(3, "quant_matrix_mode")?;
        picture.dequant_offset_signalled = b.flag("dequant_offset_signalled")?;
        picture_type = b.u(1, "picture_type")?;
        picture.temporal_refresh = b.flag("temporal_refresh")?;
        picture.temporal_signalling_present = temporal_enabled && !picture.temporal_refresh;
        let step_width_level1_enabled = b.flag("step_width_level1_enabled")?;
        picture.step_width_loq[LOQ_LEVEL_2] = b.u(15, "step_width_level2")?;
        if picture.step_width_loq[LOQ_LEVEL_2] == 0 {
            return Err(Error::MalformedBitstream("zero step width"));
        }
        picture.dithering_control = b.flag("dithering_control")?;

        picture.quant_matrix_mode = QuantMatrixMode::try_from(quant_matrix_mode)?;

        if picture_type != 0 {
            let field_type = b.u(1, "field_type")?;
            picture.field_type = if field_type == 0 {
                FieldType::Top
            } else {
                FieldType::Bottom
            };
            b.u(7, "reserved")?;
        }

        if step_width_level1_enabled {
            picture.step_width_loq[LOQ_LEVEL_1] = b.u(15, "step_width_level1")?;
            if picture.step_width_loq[LOQ_LEVEL_1] == 0 {
                return Err(Error::MalformedBitstream("zero step width"));
            }
            picture.level_1_filtering_enabled = b.flag("level_1_filtering_enabled")?;
        } else {
            picture.step_width_loq[LOQ_LEVEL_1] = MAX_STEP_WIDTH as u32;
        }

        if matches!(
            picture.quant_matrix_mode,
            QuantMatrixMode::SameAndCustom
                | QuantMatrixMode::Level2CustomLevel1Default
                | QuantMatrixMode::DifferentAndCustom
        ) {
            for layer in 0..num_residual_layers {
                picture.qm_coefficient_2[layer] = b.u(8, "qm_coefficient_0")?;
            }
        }
        if matches!(
            picture.quant_matrix_mode,
            QuantMatrixMode::Level2DefaultLevel1Custom | QuantMatrixMode::DifferentAndCustom
        ) {
            for layer in 0..num_residual_layers {
                picture.qm_coefficient_1[layer] = b.u(8, "qm_coefficient_1")?;
            }
        }

        if picture.dequant_offset_signalled {
            let dequant_offset_mode = b.u(1, "dequant_offset_mode")?;
            picture.dequant_offset_mode = if dequant_offset_mode == 0 {
                DequantOffsetMode::Default
            } else {
                DequantOffsetMode::ConstOffset
            };
            picture.dequant_offset = b.u(7, "dequant_offset")?;
        }

        if picture.dithering_control {
            let dithering_type = b.u(2, "dithering_type")?;
            picture.dithering_type = DitheringType::try_from(dithering_type)?;
            b.u(1, "reserved")?;
            if picture.dithering_type != DitheringType::None {
                picture.dithering_strength = b.u(5, "dithering_strength")?;
            } else {
                b.u(5, "reserved")?;
            }
        }
    } else {
        b.u(4, "reserved")?;
        picture_type = b.u(1, "picture_type")?;
        picture.temporal_refresh = b.flag("temporal_refresh")?;
        picture.temporal_signalling_present = b.flag("temporal_signalling_present")?;
    }

    picture.picture_type = if picture_type == 0 {
        PictureType::Frame
    } else {
        PictureType::Field
    };

    b.pop_label();
    Ok(())
}

// Number of encoded layers in the bitstream: residual plus temporal.
fn total_layers(configuration: &SignaledConfiguration, loq: usize) -> usize {
    configuration.global.num_residual_layers
        + usize::from(loq == LOQ_LEVEL_2 && configuration.picture.temporal_signalling_present)
}

fn first_layer(configuration: &SignaledConfiguration) -> usize {
    if configuration.picture.enhancement_enabled {
        0
    } else {
        // Only the temporal layer is present
        configuration.global.num_residual_layers
    }
}

fn is_temporal_layer(configuration: &SignaledConfiguration, layer: usize) -> bool {
    layer == configuration.global.num_residual_layers
}

fn use_tiled_encoding_order(configuration: &SignaledConfiguration) -> bool {
    configuration.global.temporal_enabled
        || configuration.global.tile_dimensions_type != TileDimensions::None
}

// Decode one layer-sized slab of symbols from its own sub-bitstream.
fn decode_layer(
    configuration: &SignaledConfiguration,
    layer: usize,
    width: usize,
    height: usize,
    entropy_enabled: bool,
    rle_only: bool,
    b: &mut BitstreamUnpacker<'_>,
) -> Result<DecodedLayer> {
    if !is_temporal_layer(configuration, layer) {
        let surface = if use_tiled_encoding_order(configuration) {
            entropy::decode_residuals_tiled(
                width,
                height,
                entropy_enabled,
                rle_only,
                b,
                configuration.global.transform_block_size,
            )?
        } else {
            entropy::decode_residuals(width, height, entropy_enabled, rle_only, b)?
        };
        Ok(DecodedLayer::Residuals(surface))
    } else {
        let surface = entropy::decode_temporal(
            width,
            height,
            entropy_enabled,
            rle_only,
            b,
            configuration.global.transform_block_size,
            configuration.global.temporal_tile_intra_signalling_enabled,
        )?;
        Ok(DecodedLayer::Temporal(surface))
    }
}

enum DecodedLayer {
    Residuals(Surface<i16>),
    Temporal(Surface<u8>),
}

fn store_layer(
    symbols: &mut SymbolTensor,
    plane: usize,
    loq: usize,
    layer: usize,
    decoded: DecodedLayer,
) {
    match decoded {
        DecodedLayer::Residuals(s) => symbols.set_residual(plane, loq, layer, s),
        DecodedLayer::Temporal(s) => symbols.set_temporal(plane, s),
    }
}

fn parse_encoded_data(
    configuration: &SignaledConfiguration,
    b: &mut BitstreamUnpacker<'_>,
    symbols: &mut SymbolTensor,
) -> Result<()> {
    let num_planes = configuration.global.num_processed_planes;

    let mut entropy_enabled = [[[false; MAX_NUM_LAYERS + 1]; MAX_NUM_LOQS]; MAX_NUM_PLANES];
    let mut rle_only = [[[false; MAX_NUM_LAYERS + 1]; MAX_NUM_LOQS]; MAX_NUM_PLANES];

    for plane in 0..num_planes {
        for loq in 0..MAX_NUM_LOQS {
            for layer in first_layer(configuration)..total_layers(configuration, loq) {
                b.push_label("encoded_data");
                entropy_enabled[plane][loq][layer] = b.flag("entropy_enabled")?;
                rle_only[plane][loq][layer] = b.flag("rle_only")?;
                b.pop_label();
            }
        }
    }

    b.byte_align()?;

    if !configuration.picture.enhancement_enabled
        && !configuration.picture.temporal_signalling_present
    {
        return Ok(());
    }

    for plane in 0..num_planes {
        for loq in 0..MAX_NUM_LOQS {
            for layer in first_layer(configuration)..total_layers(configuration, loq) {
                let surface_configuration = configuration.surface[plane][loq];
                let data = if entropy_enabled[plane][loq][layer] {
                    let data_size = b.multibyte("data_size")?.to_usize();
                    b.bytes(data_size)?
                } else {
                    Packet::default()
                };

                let mut pb = BitstreamUnpacker::new(&data);
                let decoded = decode_layer(
                    configuration,
                    layer,
                    surface_configuration.width,
                    surface_configuration.height,
                    entropy_enabled[plane][loq][layer],
                    rle_only[plane][loq][layer],
                    &mut pb,
                )?;
                store_layer(symbols, plane, loq, layer, decoded);
            }
        }
    }

    Ok(())
}

// Per (plane, loq) tile grid derived from the layer dimensions.
#[derive(Debug, Clone, Copy, Default)]
struct TileGrid {
    width: usize,
    height: usize,
    tile_width: usize,
    tile_height: usize,
    tiles_x: usize,
    tiles_y: usize,
    num_tiles: usize,
}

fn parse_encoded_data_tiled(
    configuration: &SignaledConfiguration,
    b: &mut BitstreamUnpacker<'_>,
    symbols: &mut SymbolTensor,
) -> Result<()> {
    if configuration.global.tile_dimensions_type == TileDimensions::None {
        return Err(Error::MalformedBitstream("tiled data without tile dimensions"));
    }

    let num_planes = configuration.global.num_processed_planes;

    let mut dimensions = Dimensions::default();
    dimensions.set(
        configuration,
        configuration.global.resolution_width,
        configuration.global.resolution_height,
    )?;

    // Fill in layer sizes
    let mut sizes = [[TileGrid::default(); MAX_NUM_LOQS]; MAX_NUM_PLANES];
    let mut total_tiles = 0usize;

    for plane in 0..num_planes {
        for loq in 0..MAX_NUM_LOQS {
            let num_layers = total_layers(configuration, loq) - first_layer(configuration);

            let tile_width = dimensions.tile_width(plane, loq);
            let tile_height = dimensions.tile_height(plane, loq);
            if tile_width == 0 || tile_height == 0 {
                return Err(Error::MalformedBitstream("zero tile dimensions"));
            }

            let grid = &mut sizes[plane][loq];
            grid.width = dimensions.layer_width(plane, loq);
            grid.height = dimensions.layer_height(plane, loq);
            grid.tile_width = tile_width;
            grid.tile_height = tile_height;
            grid.tiles_x = (grid.width + tile_width - 1) / tile_width;
            grid.tiles_y = (grid.height + tile_height - 1) / tile_height;
            grid.num_tiles = grid.tiles_x * grid.tiles_y;

            total_tiles += grid.num_tiles * num_layers;
        }
    }

    // Per-layer rle_only flags
    let mut rle_only = [[[false; MAX_NUM_LAYERS + 1]; MAX_NUM_LOQS]; MAX_NUM_PLANES];
    for plane in 0..num_planes {
        for loq in 0..MAX_NUM_LOQS {
            if configuration.picture.enhancement_enabled {
                for layer in first_layer(configuration)..total_layers(configuration, loq) {
                    rle_only[plane][loq][layer] = b.flag("rle_only")?;
                }
            }
        }
    }

    b.byte_align()?;

    // Per-tile entropy_enabled flags, raw or run coded
    let mut entropy_enabled = vec![false; total_tiles];
    if !configuration.global.compression_type_entropy_enabled_per_tile {
        if configuration.picture.enhancement_enabled {
            for flag in entropy_enabled.iter_mut() {
                *flag = b.flag("entropy_enabled")?;
            }
        }
    } else if configuration.picture.enhancement_enabled {
        let flags = entropy::decode_flags(total_tiles, 1, b)?;
        for (i, flag) in entropy_enabled.iter_mut().enumerate() {
            *flag = flags.read(i, 0) != 0;
        }
    }

    b.byte_align()?;

    let mut idx = 0usize;
    for plane in 0..num_planes {
        for loq in 0..MAX_NUM_LOQS {
            for layer in first_layer(configuration)..total_layers(configuration, loq) {
                let grid = sizes[plane][loq];

                // Per-tile data sizes, inline or entropy coded
                let coded_sizes = if configuration.global.compression_type_size_per_tile
                    != CompressionType::None
                {
                    let any_tile_enabled =
                        entropy_enabled[idx..idx + grid.num_tiles].iter().any(|&e| e);
                    let sizes = if any_tile_enabled {
                        entropy::decode_sizes(
                            grid.num_tiles,
                            b,
                            &entropy_enabled,
                            idx,
                            configuration.global.compression_type_size_per_tile,
                        )?
                    } else {
                        vec![0u16; grid.num_tiles]
                    };
                    b.byte_align()?;
                    Some(sizes)
                } else {
                    None
                };

                let mut tiles = Vec::with_capacity(grid.num_tiles);
                for ty in 0..grid.tiles_y {
                    for tx in 0..grid.tiles_x {
                        // Extent of this tile, clipped to the layer
                        let tx0 = tx * grid.tile_width;
                        let ty0 = ty * grid.tile_height;
                        let tx1 = ((tx + 1) * grid.tile_width).min(grid.width);
                        let ty1 = ((ty + 1) * grid.tile_height).min(grid.height);

                        let data = if entropy_enabled[idx] {
                            let data_size = match &coded_sizes {
                                Some(sizes) => {
                                    let size = usize::from(sizes[ty * grid.tiles_x + tx]);
                                    if size == 0 {
                                        return Err(Error::MalformedBitstream(
                                            "zero size for coded tile",
                                        ));
                                    }
                                    size
                                }
                                None => b.multibyte("data_size")?.to_usize(),
                            };
                            b.bytes(data_size)?
                        } else {
                            Packet::default()
                        };

                        let mut pb = BitstreamUnpacker::new(&data);
                        tiles.push(decode_layer(
                            configuration,
                            layer,
                            tx1 - tx0,
                            ty1 - ty0,
                            entropy_enabled[idx],
                            rle_only[plane][loq][layer],
                            &mut pb,
                        )?);
                        idx += 1;
                    }
                }

                let decoded = assemble_layer(&grid, tiles)?;
                store_layer(symbols, plane, loq, layer, decoded);
            }
        }
    }

    Ok(())
}

// Stitch per-tile surfaces into one layer-sized surface by positional
// copy from each tile's origin.
fn assemble_layer(grid: &TileGrid, tiles: Vec<DecodedLayer>) -> Result<DecodedLayer> {
    let temporal = matches!(tiles.first(), Some(DecodedLayer::Temporal(_)));
    if temporal {
        let src: Vec<&Surface<u8>> = tiles
            .iter()
            .map(|t| match t {
                DecodedLayer::Temporal(s) => s,
                DecodedLayer::Residuals(_) => unreachable!("mixed tile kinds"),
            })
            .collect();
        let surface = Surface::build()
            .generate(grid.width, grid.height, |x, y| {
                let tx = x / grid.tile_width;
                let ty = y / grid.tile_height;
                src[ty * grid.tiles_x + tx].read(x % grid.tile_width, y % grid.tile_height)
            })?
            .finish();
        Ok(DecodedLayer::Temporal(surface))
    } else {
        let src: Vec<&Surface<i16>> = tiles
            .iter()
            .map(|t| match t {
                DecodedLayer::Residuals(s) => s,
                DecodedLayer::Temporal(_) => unreachable!("mixed tile kinds"),
            })
            .collect();
        let surface = Surface::build()
            .generate(grid.width, grid.height, |x, y| {
                let tx = x / grid.tile_width;
                let ty = y / grid.tile_height;
                src[ty * grid.tiles_x + tx].read(x % grid.tile_width, y % grid.tile_height)
            })?
            .finish();
        Ok(DecodedLayer::Residuals(surface))
    }
}

fn parse_additional_info(b: &mut BitstreamUnpacker<'_>) -> Result<()> {
    let additional_info_type = b.u(8, "additional_info_type")?;
    match additional_info_type {
        0 => {
            let payload_type = b.u(8, "payload_type")?;
            debug!("additional info: sei payload {payload_type}");
        }
        1 => {
            debug!("additional info: vui parameters");
        }
        _ => return Err(Error::MalformedBitstream("additional_info_type")),
    }
    // Remaining payload bytes are carried but not interpreted
    Ok(())
}

fn parse_filler(b: &mut BitstreamUnpacker<'_>) -> Result<()> {
    b.push_label("filler");
    while !b.is_empty() {
        if b.u(8, "filler")? != 0xaa {
            return Err(Error::MalformedBitstream("bad filler byte"));
        }
    }
    b.pop_label();
    Ok(())
}
