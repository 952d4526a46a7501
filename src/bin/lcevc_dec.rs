//! Reference driver: decode an LCEVC enhancement stream over a
//! pre-decoded YUV base and write the reconstructed YUV.
//!
//! External AVC/HEVC/VVC/EVC base decoders are out of scope here; the
//! base must be supplied as raw frames via `--base_yuv`.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::process::ExitCode;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use clap::{Parser, ValueEnum};
use log::{error, info};

use lcevc_dec::image::{Image, ImageDescription, ImageFormat, Plane};
use lcevc_dec::nal::{scan_enhancement, EnhancementNal};
use lcevc_dec::packet::Packet;
use lcevc_dec::queue::TimestampQueue;
use lcevc_dec::surface::Surface;
use lcevc_dec::{DecodeOptions, Decoder, SymbolTensor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BaseCoding {
    Avc,
    Hevc,
    Vvc,
    Evc,
    Yuv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Encapsulation {
    Nal,
    Sei,
    #[value(name = "sei_reg")]
    SeiReg,
    None,
}

/// LCEVC enhancement decoder.
#[derive(Parser, Debug)]
#[command(name = "lcevc_dec", version)]
struct Args {
    /// Input elementary stream filename
    #[arg(short = 'i', long, default_value = "input.lvc")]
    input_file: String,

    /// Output filename for decoded YUV data
    #[arg(short = 'o', long, default_value = "output.yuv")]
    output_file: String,

    /// Base video coding
    #[arg(short = 'b', long, value_enum, default_value = "yuv")]
    base: BaseCoding,

    /// Prepared YUV data for base decode
    #[arg(short = 'y', long, default_value = "")]
    base_yuv: String,

    /// Wrap enhancement as SEI or NAL
    #[arg(long, value_enum, default_value = "nal")]
    encapsulation: Encapsulation,

    /// Number of frames to decode
    #[arg(short = 'l', long, default_value_t = 1_000_000)]
    limit: u32,

    /// Apply decoder dithering when the bitstream enables it
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    dithering_switch: bool,

    /// Seed the dither generator deterministically
    #[arg(long)]
    dithering_fixed: bool,

    /// Report per-picture decode statistics
    #[arg(long)]
    report: bool,

    /// Apply LCEVC enhancement data (residuals) on output YUV
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    apply_enhancement: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(frames) => {
            info!("decoded {frames} frames");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<u32, Box<dyn std::error::Error>> {
    if args.base != BaseCoding::Yuv {
        return Err("only --base yuv is supported by this driver; \
                    decode the base with an external codec first"
            .into());
    }
    if args.base_yuv.is_empty() {
        return Err("--base yuv requires --base_yuv".into());
    }

    let es = std::fs::read(&args.input_file)?;

    let units: Vec<(Packet, bool)> = match args.encapsulation {
        Encapsulation::Nal => scan_enhancement(&es, 0)?
            .into_iter()
            .enumerate()
            .map(|(n, EnhancementNal { packet, is_idr })| {
                // Stream order assigns presentation timestamps here;
                // container timing is outside this driver.
                Ok((
                    Packet::build()
                        .contents(packet.view().data())?
                        .timestamp(n as u64)
                        .finish(),
                    is_idr,
                ))
            })
            .collect::<Result<_, lcevc_dec::Error>>()?,
        Encapsulation::None => {
            // A bare enhancement stream carries no framing: the whole
            // file is one picture.
            vec![(Packet::build().contents(&es)?.timestamp(0).finish(), true)]
        }
        Encapsulation::Sei | Encapsulation::SeiReg => {
            return Err("SEI encapsulation is not supported by this driver".into());
        }
    };

    if units.is_empty() {
        return Err("no enhancement data found in input".into());
    }

    // Order enhancement payloads by timestamp, as the base bridge does.
    let queue = TimestampQueue::new(units.len());
    for (packet, is_idr) in units {
        let timestamp = packet.timestamp();
        queue.push(timestamp, (packet, is_idr));
    }
    queue.close();

    let mut base_file = BufReader::new(File::open(&args.base_yuv)?);
    let mut output_file = BufWriter::new(File::create(&args.output_file)?);

    let mut decoder = Decoder::new();
    let mut symbols = SymbolTensor::default();
    let options = DecodeOptions {
        dithering_switch: args.dithering_switch,
        dithering_fixed: args.dithering_fixed,
        apply_enhancement: args.apply_enhancement,
    };

    let mut frames = 0u32;
    while let Some((packet, is_idr)) = queue.pop() {
        if frames >= args.limit {
            break;
        }

        decoder.initialize_decode(&packet, is_idr, &mut symbols)?;

        let base = read_base_frame(&mut base_file, &decoder)?;
        let image = decoder.decode(&base, &symbols, &options)?;
        write_image(&mut output_file, &image)?;

        if args.report {
            info!(
                "pts {:4} idr {:5} enhancement {:6} bytes -> {}x{}",
                packet.timestamp(),
                is_idr,
                packet.size(),
                image.description().width,
                image.description().height,
            );
        }
        frames += 1;
    }

    output_file.flush()?;
    Ok(frames)
}

// One base frame, planar, at the signalled base dimensions and depth.
fn read_base_frame<R: Read>(
    reader: &mut R,
    decoder: &Decoder,
) -> Result<Image, Box<dyn std::error::Error>> {
    let global = &decoder.configuration().global;
    let format = ImageFormat::new(global.colourspace, global.base_depth)?;
    let description = ImageDescription::new(
        format,
        decoder.dimensions().base_width(),
        decoder.dimensions().base_height(),
    );

    let mut planes = Vec::with_capacity(description.num_planes());
    for p in 0..description.num_planes() {
        let width = description.plane_width(p);
        let height = description.plane_height(p);
        if format.bytes_per_sample() == 1 {
            let mut data = vec![0u8; width * height];
            reader.read_exact(&mut data)?;
            let surface = Surface::build()
                .generate(width, height, |x, y| data[y * width + x])?
                .finish();
            planes.push(Plane::U8(surface));
        } else {
            let mut data = vec![0u16; width * height];
            reader.read_u16_into::<LittleEndian>(&mut data)?;
            let surface = Surface::build()
                .generate(width, height, |x, y| data[y * width + x])?
                .finish();
            planes.push(Plane::U16(surface));
        }
    }

    Ok(Image::new(description, 0, planes)?)
}

fn write_image<W: Write>(writer: &mut W, image: &Image) -> std::io::Result<()> {
    for p in 0..image.num_planes() {
        match image.plane(p) {
            Plane::U8(surface) => {
                for y in 0..surface.height() {
                    writer.write_all(surface.row(y))?;
                }
            }
            Plane::U16(surface) => {
                for y in 0..surface.height() {
                    for &v in surface.row(y) {
                        writer.write_u16::<LittleEndian>(v)?;
                    }
                }
            }
        }
    }
    Ok(())
}
