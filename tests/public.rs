// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end decode scenarios over synthesized enhancement streams.

use lcevc_dec::bitio::BitstreamPacker;
use lcevc_dec::image::{Image, ImageDescription, ImageFormat, Plane};
use lcevc_dec::packet::Packet;
use lcevc_dec::surface::Surface;
use lcevc_dec::types::Colourspace;
use lcevc_dec::{DecodeOptions, Decoder, SymbolTensor};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ---- stream construction -------------------------------------------------

#[derive(Clone)]
struct GlobalParams {
    width: u32,
    height: u32,
    yuv420: bool,
    temporal_enabled: bool,
    predicted_residual: bool,
    upsample_type: u32,
    scaling_mode_level1: u32,
    scaling_mode_level2: u32,
}

impl Default for GlobalParams {
    fn default() -> Self {
        GlobalParams {
            width: 4,
            height: 4,
            yuv420: false,
            temporal_enabled: false,
            predicted_residual: false,
            upsample_type: 0,
            scaling_mode_level1: 0,
            scaling_mode_level2: 0,
        }
    }
}

fn block(w: &mut BitstreamPacker, payload_type: u32, body: &Packet) {
    let size = body.size();
    if size <= 5 {
        w.u(3, size as u32);
    } else {
        w.u(3, 7);
    }
    w.u(5, payload_type);
    if size > 5 {
        w.multibyte(size as u64);
    }
    w.bytes(body.view().data());
}

fn sequence_block(w: &mut BitstreamPacker, conf_win: Option<[u64; 4]>) {
    let mut body = BitstreamPacker::new();
    body.u(4, 0); // profile Main
    body.u(4, 1); // level
    body.u(2, 0); // sublevel
    body.u(1, u32::from(conf_win.is_some()));
    body.u(5, 0); // reserved
    if let Some(offsets) = conf_win {
        for offset in offsets {
            body.multibyte(offset);
        }
    }
    block(w, 0, &body.finish().unwrap());
}

fn global_block(w: &mut BitstreamPacker, p: &GlobalParams) {
    let mut body = BitstreamPacker::new();
    body.u(1, 0); // processed_planes_type: Y only
    body.u(6, 63); // explicit resolution
    body.u(1, 0); // transform type: 2x2
    body.u(2, u32::from(p.yuv420)); // chroma sampling
    body.u(2, 0); // base depth 8
    body.u(2, 0); // enhancement depth 8
    body.u(1, 0); // temporal step width modifier not signalled
    body.u(1, u32::from(p.predicted_residual));
    body.u(1, 0); // tile intra signalling off
    body.u(1, u32::from(p.temporal_enabled));
    body.u(3, p.upsample_type);
    body.u(1, 0); // level 1 filtering not signalled
    body.u(2, p.scaling_mode_level1);
    body.u(2, p.scaling_mode_level2);
    body.u(2, 0); // tiles: none
    body.u(2, 0); // user data: none
    body.u(1, 0); // level1 depth flag
    body.u(1, 0); // chroma step width flag
    body.u(16, p.width);
    body.u(16, p.height);
    block(w, 1, &body.finish().unwrap());
}

fn picture_block_no_enhancement(w: &mut BitstreamPacker) {
    let mut body = BitstreamPacker::new();
    body.u(1, 1); // no_enhancement_bit
    body.u(4, 0); // reserved
    body.u(1, 0); // picture_type frame
    body.u(1, 0); // temporal_refresh
    body.u(1, 0); // temporal_signalling_present
    block(w, 2, &body.finish().unwrap());
}

fn picture_block_enhancement(
    w: &mut BitstreamPacker,
    step_width_level2: u32,
    temporal_refresh: bool,
    step_width_level1: Option<u32>,
) {
    let mut body = BitstreamPacker::new();
    body.u(1, 0); // enhancement on
    body.u(3, 1); // quant matrices: both default
    body.u(1, 0); // dequant offset not signalled
    body.u(1, 0); // frame
    body.u(1, u32::from(temporal_refresh));
    body.u(1, u32::from(step_width_level1.is_some()));
    body.u(15, step_width_level2);
    body.u(1, 0); // dithering off
    if let Some(sw1) = step_width_level1 {
        body.u(15, sw1);
        body.u(1, 0); // level-1 filtering off
    }
    block(w, 2, &body.finish().unwrap());
}

/// One coded layer: disabled, or raw RLE bytes.
#[derive(Clone)]
enum Layer {
    Off,
    Raw(Vec<u8>),
}

fn encoded_data_block(w: &mut BitstreamPacker, layers: &[Layer]) {
    let mut body = BitstreamPacker::new();
    for layer in layers {
        match layer {
            Layer::Off => {
                body.u(1, 0);
                body.u(1, 0);
            }
            Layer::Raw(_) => {
                body.u(1, 1); // entropy_enabled
                body.u(1, 1); // rle_only
            }
        }
    }
    body.byte_align();
    for layer in layers {
        if let Layer::Raw(data) = layer {
            body.multibyte(data.len() as u64);
            body.bytes(data);
        }
    }
    block(w, 3, &body.finish().unwrap());
}

fn stream(build: impl FnOnce(&mut BitstreamPacker)) -> Packet {
    let mut w = BitstreamPacker::new();
    build(&mut w);
    w.finish().unwrap()
}

// ---- images --------------------------------------------------------------

fn y_image(width: usize, height: usize, f: impl Fn(usize, usize) -> u8) -> Image {
    let format = ImageFormat::new(Colourspace::Y, 8).unwrap();
    let description = ImageDescription::new(format, width, height);
    let surface = Surface::build().generate(width, height, |x, y| f(x, y)).unwrap().finish();
    Image::new(description, 0, vec![Plane::U8(surface)]).unwrap()
}

fn yuv420_image(width: usize, height: usize, fill: u8) -> Image {
    let format = ImageFormat::new(Colourspace::Yuv420, 8).unwrap();
    let description = ImageDescription::new(format, width, height);
    let mut planes = Vec::new();
    for p in 0..3 {
        let surface = Surface::build()
            .fill(fill, description.plane_width(p), description.plane_height(p))
            .unwrap()
            .finish();
        planes.push(Plane::U8(surface));
    }
    Image::new(description, 0, planes).unwrap()
}

fn luma(image: &Image) -> &Surface<u8> {
    match image.plane(0) {
        Plane::U8(s) => s,
        Plane::U16(_) => panic!("expected 8-bit luma"),
    }
}

fn decode_one(decoder: &mut Decoder, stream: &Packet, is_idr: bool, base: &Image) -> Image {
    let mut symbols = SymbolTensor::default();
    decoder
        .initialize_decode(stream, is_idr, &mut symbols)
        .expect("initialize_decode failed");
    decoder
        .decode(base, &symbols, &DecodeOptions::default())
        .expect("decode failed")
}

// 7-bit RLE pel byte, no run flag
fn pel7(value: i16) -> u8 {
    assert!((-32..=31).contains(&value));
    (((value << 1) + 0x40) & 0x7e) as u8
}

// 14-bit RLE pel pair
fn pel14(value: i16) -> [u8; 2] {
    let v = (i32::from(value) + 0x2000) as u16;
    [(((v << 1) & 0xfe) | 1) as u8, ((v >> 7) & 0x7f) as u8]
}

// ---- scenarios -----------------------------------------------------------

#[test]
fn minimal_identity() {
    init_logger();
    let stream = stream(|w| {
        sequence_block(w, None);
        global_block(w, &GlobalParams::default());
        picture_block_no_enhancement(w);
        encoded_data_block(w, &[]);
    });

    let base = y_image(4, 4, |x, y| (16 * y + x) as u8);
    let mut decoder = Decoder::new();
    let out = decode_one(&mut decoder, &stream, true, &base);

    assert_eq!(out.description().width, 4);
    assert_eq!(out.description().height, 4);
    assert_eq!(luma(&out), luma(&base));
}

#[test]
fn one_d_upscale_no_enhancement() {
    init_logger();
    let stream = stream(|w| {
        sequence_block(w, None);
        global_block(
            w,
            &GlobalParams {
                width: 4,
                height: 2,
                scaling_mode_level2: 1, // 1D
                upsample_type: 0,       // nearest
                ..GlobalParams::default()
            },
        );
        picture_block_no_enhancement(w);
        encoded_data_block(w, &[]);
    });

    let values = [[10u8, 20], [30, 40]];
    let base = y_image(2, 2, |x, y| values[y][x]);
    let mut decoder = Decoder::new();
    let out = decode_one(&mut decoder, &stream, true, &base);

    assert_eq!(out.description().width, 4);
    assert_eq!(out.description().height, 2);
    assert_eq!(luma(&out).row(0), &[10, 10, 20, 20]);
    assert_eq!(luma(&out).row(1), &[30, 30, 40, 40]);
}

#[test]
fn zero_residuals_reproduce_base() {
    init_logger();
    let stream = stream(|w| {
        sequence_block(w, None);
        global_block(
            w,
            &GlobalParams {
                width: 8,
                height: 8,
                ..GlobalParams::default()
            },
        );
        picture_block_enhancement(w, 800, false, None);
        // 4 layers per loq, all entropy disabled
        encoded_data_block(w, &vec![Layer::Off; 8]);
    });

    let base = y_image(8, 8, |_, _| 128);
    let mut decoder = Decoder::new();
    let out = decode_one(&mut decoder, &stream, true, &base);

    assert_eq!(luma(&out), luma(&base));
}

#[test]
fn temporal_refresh_resets_buffer() {
    init_logger();
    let global = GlobalParams {
        width: 4,
        height: 4,
        temporal_enabled: true,
        ..GlobalParams::default()
    };

    // P1: IDR, refresh, layer 0 of sub-layer 2 carries +1000 everywhere
    let layer0: Vec<u8> = (0..4).flat_map(|_| pel14(1000)).collect();
    let p1 = stream(|w| {
        sequence_block(w, None);
        global_block(w, &global);
        picture_block_enhancement(w, 1, true, None);
        let mut layers = vec![Layer::Off; 8];
        layers[4] = Layer::Raw(layer0.clone());
        encoded_data_block(w, &layers);
    });

    // P2: predicted picture, all layers empty, temporal layer all-PRED
    let p2 = stream(|w| {
        global_block(w, &global);
        picture_block_enhancement(w, 1, false, None);
        encoded_data_block(w, &vec![Layer::Off; 9]);
    });

    // P3: refresh again with no residuals
    let p3 = stream(|w| {
        global_block(w, &global);
        picture_block_enhancement(w, 1, true, None);
        encoded_data_block(w, &vec![Layer::Off; 8]);
    });

    let base = y_image(4, 4, |_, _| 128);
    let mut decoder = Decoder::new();

    // 128 maps to internal 0; +1000 comes back as 136
    let out1 = decode_one(&mut decoder, &p1, true, &base);
    assert!(luma(&out1).row(0).iter().all(|&v| v == 136), "{:?}", luma(&out1).row(0));

    // The buffer carries the residual forward
    let out2 = decode_one(&mut decoder, &p2, false, &base);
    assert_eq!(luma(&out1), luma(&out2));

    // A refresh zeroes the buffer regardless of prior state
    let out3 = decode_one(&mut decoder, &p3, false, &base);
    assert!(luma(&out3).row(0).iter().all(|&v| v == 128));
}

#[test]
fn temporal_buffer_zero_after_idr() {
    init_logger();
    let global = GlobalParams {
        width: 4,
        height: 4,
        temporal_enabled: true,
        ..GlobalParams::default()
    };

    let layer0: Vec<u8> = (0..4).flat_map(|_| pel14(1000)).collect();
    let p1 = stream(|w| {
        sequence_block(w, None);
        global_block(w, &global);
        picture_block_enhancement(w, 1, true, None);
        let mut layers = vec![Layer::Off; 8];
        layers[4] = Layer::Raw(layer0.clone());
        encoded_data_block(w, &layers);
    });
    // Same residuals again, but sent as an IDR with refresh: the buffer
    // must restart from zero rather than accumulate to +2000.
    let p2 = stream(|w| {
        global_block(w, &global);
        picture_block_enhancement(w, 1, true, None);
        let mut layers = vec![Layer::Off; 8];
        layers[4] = Layer::Raw(layer0.clone());
        encoded_data_block(w, &layers);
    });

    let base = y_image(4, 4, |_, _| 128);
    let mut decoder = Decoder::new();
    let out1 = decode_one(&mut decoder, &p1, true, &base);
    let out2 = decode_one(&mut decoder, &p2, true, &base);
    assert_eq!(luma(&out1), luma(&out2));
}

#[test]
fn conformance_window_crop() {
    init_logger();
    let stream = stream(|w| {
        sequence_block(w, Some([1, 1, 0, 0]));
        global_block(
            w,
            &GlobalParams {
                width: 8,
                height: 8,
                yuv420: true,
                ..GlobalParams::default()
            },
        );
        picture_block_no_enhancement(w);
        encoded_data_block(w, &[]);
    });

    let base = yuv420_image(8, 8, 90);
    let mut decoder = Decoder::new();
    let out = decode_one(&mut decoder, &stream, true, &base);

    // Luma crop unit is the chroma scale: 8 - (1 + 1) * 2 = 4
    assert_eq!(out.description().width, 4);
    assert_eq!(out.description().height, 8);
    assert_eq!(out.description().plane_width(1), 2);
    assert!(luma(&out).row(0).iter().all(|&v| v == 90));
}

#[test]
fn predicted_residual_preserves_block_means() {
    init_logger();
    let stream = stream(|w| {
        sequence_block(w, None);
        global_block(
            w,
            &GlobalParams {
                width: 4,
                height: 4,
                scaling_mode_level2: 2, // 2D
                upsample_type: 1,       // linear
                predicted_residual: true,
                ..GlobalParams::default()
            },
        );
        picture_block_no_enhancement(w);
        encoded_data_block(w, &[]);
    });

    let base = y_image(2, 2, |_, _| 100);
    let mut decoder = Decoder::new();
    let out = decode_one(&mut decoder, &stream, true, &base);

    assert_eq!(out.description().width, 4);
    for by in 0..2 {
        for bx in 0..2 {
            let total: u32 = (0..2)
                .flat_map(|j| (0..2).map(move |i| (i, j)))
                .map(|(i, j)| u32::from(luma(&out).read(bx * 2 + i, by * 2 + j)))
                .sum();
            assert_eq!(total, 400, "block ({bx},{by}) must average to 100");
        }
    }
}

#[test]
fn nonzero_residuals_shift_output() {
    init_logger();
    // Sub-layer 1 residuals on a non-scaled stream add directly.
    let layer0: Vec<u8> = (0..4).map(|_| pel7(16)).collect();
    let stream = stream(|w| {
        sequence_block(w, None);
        global_block(w, &GlobalParams::default());
        picture_block_enhancement(w, 1, false, Some(1));
        let mut layers = vec![Layer::Off; 8];
        layers[0] = Layer::Raw(layer0.clone());
        encoded_data_block(w, &layers);
    });

    let base = y_image(4, 4, |_, _| 128);
    let mut decoder = Decoder::new();
    let out = decode_one(&mut decoder, &stream, true, &base);
    // One 8-bit step is 128 internal units, so +16 rounds away
    assert!(luma(&out).row(0).iter().all(|&v| v == 128));

    // +640 internal is five 8-bit steps plus a rounding half
    let layer_big: Vec<u8> = (0..4).flat_map(|_| pel14(640)).collect();
    let stream = sublayer1_stream(&layer_big);
    let out = decode_one(&mut decoder, &stream, true, &base);
    assert!(luma(&out).row(0).iter().all(|&v| v == 133), "{:?}", luma(&out).row(0));
}

fn sublayer1_stream(layer: &[u8]) -> Packet {
    stream(|w| {
        sequence_block(w, None);
        global_block(w, &GlobalParams::default());
        picture_block_enhancement(w, 1, false, Some(1));
        let mut layers = vec![Layer::Off; 8];
        layers[0] = Layer::Raw(layer.to_vec());
        encoded_data_block(w, &layers);
    })
}

#[test]
fn malformed_stream_is_rejected() {
    init_logger();
    // Truncated global block: payload shorter than its syntax
    let mut w = BitstreamPacker::new();
    w.u(3, 2);
    w.u(5, 1);
    w.u(16, 0xffff);
    let p = w.finish().unwrap();

    let mut decoder = Decoder::new();
    let mut symbols = SymbolTensor::default();
    assert!(decoder.initialize_decode(&p, true, &mut symbols).is_err());
}

#[test]
fn base_dimension_mismatch_is_rejected() {
    init_logger();
    let stream = stream(|w| {
        sequence_block(w, None);
        global_block(w, &GlobalParams::default());
        picture_block_no_enhancement(w);
        encoded_data_block(w, &[]);
    });

    let base = y_image(8, 8, |_, _| 0);
    let mut decoder = Decoder::new();
    let mut symbols = SymbolTensor::default();
    decoder.initialize_decode(&stream, true, &mut symbols).unwrap();
    assert!(decoder
        .decode(&base, &symbols, &DecodeOptions::default())
        .is_err());
}
