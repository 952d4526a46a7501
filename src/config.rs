//! Signalled decoder configuration.
//!
//! Four record groups populated by the deserializer: the per-sequence,
//! per-stream and per-picture records plus the derived per-surface sizes.
//! Fields keep the bitstream's names.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::types::*;

/// The constant per-sequence decoder configuration.
#[derive(Debug, Clone)]
pub struct SequenceConfiguration {
    pub profile_idc: Profile,
    pub level_idc: u32,
    pub sublevel_idc: u32,
    pub conformance_window: bool,
    pub conf_win_left_offset: u32,
    pub conf_win_right_offset: u32,
    pub conf_win_top_offset: u32,
    pub conf_win_bottom_offset: u32,
}

impl Default for SequenceConfiguration {
    fn default() -> Self {
        SequenceConfiguration {
            profile_idc: Profile::Main,
            level_idc: 0,
            sublevel_idc: 0,
            conformance_window: false,
            conf_win_left_offset: 0,
            conf_win_right_offset: 0,
            conf_win_top_offset: 0,
            conf_win_bottom_offset: 0,
        }
    }
}

/// The constant per-stream decoder configuration; may be re-signalled.
#[derive(Debug, Clone)]
pub struct GlobalConfiguration {
    pub base_depth: u32,
    pub enhancement_depth: u32,
    pub colourspace: Colourspace,
    pub num_image_planes: usize,
    pub num_processed_planes: usize,
    pub num_residual_layers: usize,
    pub transform_block_size: usize,
    pub predicted_residual_enabled: bool,
    pub resolution_width: usize,
    pub resolution_height: usize,
    pub temporal_enabled: bool,
    pub temporal_tile_intra_signalling_enabled: bool,
    pub temporal_step_width_modifier: u32,
    pub upsample: Upsample,
    pub upsampling_coefficients: [u32; 4],
    pub level_1_filtering_first_coefficient: u32,
    pub level_1_filtering_second_coefficient: u32,
    pub scaling_mode: [ScalingMode; MAX_NUM_LOQS],
    pub tile_dimensions_type: TileDimensions,
    pub tile_width: usize,
    pub tile_height: usize,
    pub compression_type_entropy_enabled_per_tile: bool,
    pub compression_type_size_per_tile: CompressionType,
    pub user_data_enabled: UserDataMode,
    pub level1_depth_flag: bool,
    pub chroma_step_width_multiplier: u32,
}

impl Default for GlobalConfiguration {
    fn default() -> Self {
        GlobalConfiguration {
            base_depth: 8,
            enhancement_depth: 8,
            colourspace: Colourspace::Yuv420,
            num_image_planes: 3,
            num_processed_planes: 1,
            num_residual_layers: 4,
            transform_block_size: 2,
            predicted_residual_enabled: false,
            resolution_width: 0,
            resolution_height: 0,
            temporal_enabled: false,
            temporal_tile_intra_signalling_enabled: false,
            temporal_step_width_modifier: 48,
            upsample: Upsample::Nearest,
            upsampling_coefficients: [0; 4],
            level_1_filtering_first_coefficient: 0,
            level_1_filtering_second_coefficient: 0,
            scaling_mode: [ScalingMode::None; MAX_NUM_LOQS],
            tile_dimensions_type: TileDimensions::None,
            tile_width: 0,
            tile_height: 0,
            compression_type_entropy_enabled_per_tile: false,
            compression_type_size_per_tile: CompressionType::None,
            user_data_enabled: UserDataMode::None,
            level1_depth_flag: false,
            chroma_step_width_multiplier: 64,
        }
    }
}

/// The per-picture decoder configuration.
#[derive(Debug, Clone)]
pub struct PictureConfiguration {
    pub enhancement_enabled: bool,
    pub temporal_refresh: bool,
    pub temporal_signalling_present: bool,
    pub picture_type: PictureType,
    pub field_type: FieldType,
    pub coding_type: CodingType,
    pub step_width_loq: [u32; MAX_NUM_LOQS],
    pub dithering_control: bool,
    pub dithering_type: DitheringType,
    pub dithering_strength: u32,
    pub dequant_offset_signalled: bool,
    pub dequant_offset_mode: DequantOffsetMode,
    pub dequant_offset: u32,
    pub level_1_filtering_enabled: bool,
    pub quant_matrix_mode: QuantMatrixMode,
    pub qm_coefficient_1: [u32; MAX_NUM_LAYERS],
    pub qm_coefficient_2: [u32; MAX_NUM_LAYERS],
}

impl Default for PictureConfiguration {
    fn default() -> Self {
        PictureConfiguration {
            enhancement_enabled: false,
            temporal_refresh: false,
            temporal_signalling_present: false,
            picture_type: PictureType::Frame,
            field_type: FieldType::Top,
            coding_type: CodingType::NonIdr,
            step_width_loq: [MAX_STEP_WIDTH as u32; MAX_NUM_LOQS],
            dithering_control: false,
            dithering_type: DitheringType::None,
            dithering_strength: 0,
            dequant_offset_signalled: false,
            dequant_offset_mode: DequantOffsetMode::Default,
            dequant_offset: 0,
            level_1_filtering_enabled: false,
            quant_matrix_mode: QuantMatrixMode::BothPrevious,
            qm_coefficient_1: [0; MAX_NUM_LAYERS],
            qm_coefficient_2: [0; MAX_NUM_LAYERS],
        }
    }
}

/// Derived size of one coefficient surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct SurfaceConfiguration {
    pub width: usize,
    pub height: usize,
}

/// Everything the bitstream has signalled so far.
#[derive(Debug, Clone, Default)]
pub struct SignaledConfiguration {
    pub sequence: SequenceConfiguration,
    pub global: GlobalConfiguration,
    pub picture: PictureConfiguration,
    /// Sized per (plane, loq); residual layers of one loq share a size.
    pub surface: [[SurfaceConfiguration; MAX_NUM_LOQS]; MAX_NUM_PLANES],
    /// A Global block has been seen; enhancement data is undecodable
    /// before it.
    pub global_valid: bool,
}
