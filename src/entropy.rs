//! Per-layer entropy decoding.
//!
//! Four run-length decoders share one symbol source abstraction:
//! residuals (raster or coding-unit order), the temporal mask, per-tile
//! flags and per-tile sizes. A source is selected per tile scope: a
//! constant when entropy is disabled, raw bytes when only RLE is used, or
//! one canonical Huffman table per RLE state.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use arrayvec::ArrayVec;

use crate::bitio::BitstreamUnpacker;
use crate::huffman::HuffmanDecoder;
use crate::surface::Surface;
use crate::types::{CompressionType, TEMPORAL_INTR, TEMPORAL_PRED};
use crate::Result;

// Residual RLE states
const STATE_LSB: usize = 0;
const STATE_MSB: usize = 1;
const STATE_ZERO: usize = 2;
const RESIDUAL_STATE_COUNT: usize = 3;

// Run coders (temporal, flags) and the size coder use two states
const STATE_ZERO_RUN: usize = 0;
const STATE_ONE_RUN: usize = 1;
const RUN_STATE_COUNT: usize = 2;
const SIZE_STATE_COUNT: usize = 2;

// Coding units are 32x32 pels regardless of transform size
const CODING_UNIT_PELS: usize = 32;

/// Where a tile's RLE symbols come from.
enum SymbolSource {
    /// Entropy disabled: every symbol is this constant.
    Constant(u8),
    /// `rle_only`: successive bytes from the bitstream.
    Raw,
    /// One canonical code table per RLE state.
    Huffman(ArrayVec<HuffmanDecoder, RESIDUAL_STATE_COUNT>),
}

impl SymbolSource {
    fn new(num_states: usize, entropy_enabled: bool, rle_only: bool, constant: u8) -> SymbolSource {
        if entropy_enabled {
            if rle_only {
                SymbolSource::Raw
            } else {
                let mut states = ArrayVec::new();
                for _ in 0..num_states {
                    states.push(HuffmanDecoder::default());
                }
                SymbolSource::Huffman(states)
            }
        } else {
            SymbolSource::Constant(constant)
        }
    }

    /// Read any Huffman tables preceding the symbol data.
    fn start(&mut self, b: &mut BitstreamUnpacker<'_>) -> Result<()> {
        if let SymbolSource::Huffman(states) = self {
            for state in states.iter_mut() {
                state.read_codes(b)?;
            }
        }
        Ok(())
    }

    fn get(&self, state: usize, b: &mut BitstreamUnpacker<'_>) -> Result<u8> {
        match self {
            SymbolSource::Constant(c) => Ok(*c),
            SymbolSource::Raw => b.byte(),
            SymbolSource::Huffman(states) => states[state].decode_symbol(b),
        }
    }

    /// The leading symbol of run coders is always a raw byte.
    fn get_byte(&self, b: &mut BitstreamUnpacker<'_>) -> Result<u8> {
        match self {
            SymbolSource::Constant(c) => Ok(*c),
            SymbolSource::Raw => b.byte(),
            SymbolSource::Huffman(_) => b.byte(),
        }
    }
}

// Current PEL/run value
#[derive(Clone, Copy, Default)]
struct RlePel {
    pel: i16,
    zero_runlength: u32,
}

// Decode one (pel, zero run) pair.
//
// Bit 0 of the first byte selects a 7-bit or 14-bit pel; bit 7 of the
// last pel byte flags a zero-run count in MSB-first 7-bit groups.
fn decode_pel(source: &SymbolSource, b: &mut BitstreamUnpacker<'_>) -> Result<RlePel> {
    let mut r = RlePel::default();

    let symbol = source.get(STATE_LSB, b)?;

    let run_flag_byte;
    if symbol & 0x01 != 0 {
        let lsb_symbol = symbol;
        let msb_symbol = source.get(STATE_MSB, b)?;
        r.pel = (((i32::from(msb_symbol & 0x7f) << 8) | i32::from(lsb_symbol & 0xfe)) >> 1) as i16
            - 0x2000;
        run_flag_byte = msb_symbol;
    } else {
        r.pel = ((i32::from(symbol & 0x7e) - 0x40) >> 1) as i16;
        run_flag_byte = symbol;
    }

    if run_flag_byte & 0x80 != 0 {
        loop {
            let symbol = source.get(STATE_ZERO, b)?;
            r.zero_runlength = (r.zero_runlength << 7) | u32::from(symbol & 0x7f);
            if symbol & 0x80 == 0 {
                break;
            }
        }
    }

    Ok(r)
}

/// Run-length coded residuals, decoded in full-frame raster order.
pub fn decode_residuals(
    width: usize,
    height: usize,
    entropy_enabled: bool,
    rle_only: bool,
    b: &mut BitstreamUnpacker<'_>,
) -> Result<Surface<i16>> {
    // Empty layers have a constant value of 0x40 (pel 0, no run)
    let mut source = SymbolSource::new(RESIDUAL_STATE_COUNT, entropy_enabled, rle_only, 0x40);

    let mut dest = Surface::build().reserve(width, height)?;
    let mut current = RlePel::default();

    source.start(b)?;

    for y in 0..height {
        let row = dest.row_mut(y);
        for pel in row.iter_mut() {
            if current.zero_runlength > 0 {
                // Extend the run of zeros
                *pel = 0;
                current.zero_runlength -= 1;
            } else {
                current = decode_pel(&source, b)?;
                *pel = current.pel;
            }
        }
    }

    Ok(dest.finish())
}

/// Run-length coded residuals in coding-unit order: 32x32-pel tiles in
/// raster order, rows raster scanned within each tile.
pub fn decode_residuals_tiled(
    width: usize,
    height: usize,
    entropy_enabled: bool,
    rle_only: bool,
    b: &mut BitstreamUnpacker<'_>,
    transform_block_size: usize,
) -> Result<Surface<i16>> {
    let mut source = SymbolSource::new(RESIDUAL_STATE_COUNT, entropy_enabled, rle_only, 0x40);

    let mut dest = Surface::build().reserve(width, height)?;

    // Divisor for block->tiles
    let d = CODING_UNIT_PELS / transform_block_size;

    let mut current = RlePel::default();

    source.start(b)?;

    for ty in (0..height).step_by(d) {
        for tx in (0..width).step_by(d) {
            for y in ty..(ty + d).min(height) {
                for x in tx..(tx + d).min(width) {
                    if current.zero_runlength > 0 {
                        dest.write(x, y, 0);
                        current.zero_runlength -= 1;
                    } else {
                        current = decode_pel(&source, b)?;
                        dest.write(x, y, current.pel);
                    }
                }
            }
        }
    }

    Ok(dest.finish())
}

// Run counts are MSB-first 7-bit groups; the state follows the symbol.
fn decode_run(source: &SymbolSource, b: &mut BitstreamUnpacker<'_>, symbol: bool) -> Result<u32> {
    let mut count = 0u32;
    loop {
        let c = source.get(if symbol { STATE_ONE_RUN } else { STATE_ZERO_RUN }, b)?;
        count = (count << 7) | u32::from(c & 0x7f);
        if c & 0x80 == 0 {
            break;
        }
    }
    Ok(count)
}

/// Run-length coded temporal mask bits.
///
/// With `use_reduced_signalling`, a one-symbol at a tile's top-left pel
/// marks the whole tile INTRA without consuming further run bits.
pub fn decode_temporal(
    width: usize,
    height: usize,
    entropy_enabled: bool,
    rle_only: bool,
    b: &mut BitstreamUnpacker<'_>,
    transform_block_size: usize,
    use_reduced_signalling: bool,
) -> Result<Surface<u8>> {
    let mut source = SymbolSource::new(RUN_STATE_COUNT, entropy_enabled, rle_only, 0);

    if !entropy_enabled {
        return Ok(Surface::build().fill(TEMPORAL_PRED, width, height)?.finish());
    }

    let mut dest = Surface::build().reserve(width, height)?;

    // Divisor for block->tiles
    let d = CODING_UNIT_PELS / transform_block_size;

    source.start(b)?;

    // Get the first symbol & count
    let mut symbol = source.get_byte(b)? != 0;
    let mut count = decode_run(&source, b, symbol)?;

    // A run coder that never yields a symbol is stuck, not sparse
    let mut flips = 0usize;
    let flip_limit = 2 * (width * height + 2);

    for ty in (0..height).step_by(d) {
        for tx in (0..width).step_by(d) {
            let mut intra_tile = false;
            for y in ty..(ty + d).min(height) {
                for x in tx..(tx + d).min(width) {
                    if use_reduced_signalling && intra_tile {
                        // The whole tile was flagged as intra
                        dest.write(x, y, TEMPORAL_INTR);
                    } else {
                        while count == 0 {
                            // Flip symbol and get next count
                            symbol = !symbol;
                            count = decode_run(&source, b, symbol)?;
                            flips += 1;
                            if flips > flip_limit {
                                return Err(crate::Error::MalformedBitstream(
                                    "empty temporal runs",
                                ));
                            }
                        }

                        if use_reduced_signalling && symbol && tx == x && ty == y {
                            intra_tile = true;
                        }

                        dest.write(x, y, if symbol { TEMPORAL_INTR } else { TEMPORAL_PRED });
                        count -= 1;
                    }
                }
            }
        }
    }

    Ok(dest.finish())
}

/// Run-length coded flag bits, emitted raster order as 0x00 / 0xFF.
///
/// Used for the compressed per-tile `entropy_enabled` table; the symbol
/// stream is always raw RLE.
pub fn decode_flags(
    width: usize,
    height: usize,
    b: &mut BitstreamUnpacker<'_>,
) -> Result<Surface<u8>> {
    let mut source = SymbolSource::new(RUN_STATE_COUNT, true, true, 0);

    let mut dest = Surface::build().reserve(width, height)?;

    source.start(b)?;

    let mut symbol = source.get_byte(b)? != 0;
    let mut count = decode_run(&source, b, symbol)?;

    let mut flips = 0usize;
    let flip_limit = 2 * (width * height + 2);

    for y in 0..height {
        let row = dest.row_mut(y);
        for flag in row.iter_mut() {
            while count == 0 {
                symbol = !symbol;
                count = decode_run(&source, b, symbol)?;
                flips += 1;
                if flips > flip_limit {
                    return Err(crate::Error::MalformedBitstream("empty flag runs"));
                }
            }
            *flag = if symbol { 0xff } else { 0x00 };
            count -= 1;
        }
    }

    Ok(dest.finish())
}

// One absolute size: 7 bits, or 15 when bit 0 of the first byte is set.
fn decode_size(source: &SymbolSource, b: &mut BitstreamUnpacker<'_>) -> Result<u16> {
    let l = source.get(STATE_LSB, b)?;
    if l & 0x01 != 0 {
        let m = source.get(STATE_MSB, b)?;
        Ok((u16::from(l) >> 1) + (u16::from(m) << 7))
    } else {
        Ok(u16::from(l) >> 1)
    }
}

// One size delta, sign extended from bit 6 (one byte) or bit 14 (two).
fn decode_size_delta(source: &SymbolSource, b: &mut BitstreamUnpacker<'_>) -> Result<i16> {
    let l = source.get(STATE_LSB, b)?;
    if l & 0x01 != 0 {
        let m = source.get(STATE_MSB, b)?;
        let mut r = (u16::from(l) >> 1) + (u16::from(m) << 7);
        if r & 0x4000 != 0 {
            r |= 0x8000;
        }
        Ok(r as i16)
    } else {
        let mut r = l >> 1;
        if r & 0x40 != 0 {
            r |= 0x80;
        }
        Ok(i16::from(r as i8))
    }
}

/// Entropy-coded per-tile data sizes for one layer.
///
/// Tiles with entropy disabled emit size 0 without consuming symbols;
/// `PrefixOnDiff` accumulates sign-extended deltas.
pub fn decode_sizes(
    num_tiles: usize,
    b: &mut BitstreamUnpacker<'_>,
    entropy_enabled: &[bool],
    tile_idx: usize,
    compression_type: CompressionType,
) -> Result<Vec<u16>> {
    let mut source = SymbolSource::new(SIZE_STATE_COUNT, true, false, 0);

    let mut sizes = Vec::with_capacity(num_tiles);

    source.start(b)?;

    match compression_type {
        CompressionType::Prefix => {
            for x in 0..num_tiles {
                if entropy_enabled[tile_idx + x] {
                    sizes.push(decode_size(&source, b)?);
                } else {
                    sizes.push(0);
                }
            }
        }
        CompressionType::PrefixOnDiff => {
            let mut p = 0u16;
            for x in 0..num_tiles {
                if entropy_enabled[tile_idx + x] {
                    let diff = decode_size_delta(&source, b)?;
                    p = p.wrapping_add(diff as u16);
                    sizes.push(p);
                } else {
                    sizes.push(0);
                }
            }
        }
        CompressionType::None => {
            // Caller reads uncompressed sizes inline with the tile data
            sizes.resize(num_tiles, 0);
        }
    }

    Ok(sizes)
}
