//! Canonical prefix-code decoding for the entropy layer.
//!
//! Each coded layer carries one table per RLE state: a 5-bit entry count
//! followed by (8-bit symbol, 5-bit code length) records. Codes are
//! assigned canonically in (length, symbol) order and decoded MSB-first,
//! one bit at a time.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use arrayvec::ArrayVec;

use crate::bitio::BitstreamUnpacker;
use crate::{Error, Result};

// 5-bit code lengths
const MAX_CODE_LENGTH: usize = 31;
// 5-bit entry count
const MAX_SYMBOLS: usize = 31;

/// One state's canonical prefix-code table.
#[derive(Debug, Default, Clone)]
pub struct HuffmanDecoder {
    // Symbols ordered by (code length, symbol)
    symbols: ArrayVec<u8, MAX_SYMBOLS>,
    lengths: ArrayVec<u8, MAX_SYMBOLS>,
    // Per length: canonical first code and index of its first symbol
    first_code: [u32; MAX_CODE_LENGTH + 1],
    first_index: [u16; MAX_CODE_LENGTH + 1],
    count: [u16; MAX_CODE_LENGTH + 1],
}

impl HuffmanDecoder {
    /// Read one table from the bitstream and rebuild the canonical codes.
    pub fn read_codes(&mut self, b: &mut BitstreamUnpacker<'_>) -> Result<()> {
        let n = b.u(5, "huffman_count")? as usize;

        let mut entries: ArrayVec<(u8, u8), MAX_SYMBOLS> = ArrayVec::new();
        for _ in 0..n {
            let symbol = b.u(8, "huffman_symbol")? as u8;
            let length = b.u(5, "huffman_length")? as u8;
            entries.push((symbol, length));
        }

        // Canonical order: shorter codes first, ties by symbol value
        entries.sort_unstable_by_key(|&(symbol, length)| (length, symbol));

        self.symbols.clear();
        self.lengths.clear();
        self.first_code = [0; MAX_CODE_LENGTH + 1];
        self.first_index = [0; MAX_CODE_LENGTH + 1];
        self.count = [0; MAX_CODE_LENGTH + 1];

        if entries.iter().any(|&(_, length)| length == 0) && entries.len() > 1 {
            return Err(Error::MalformedBitstream(
                "zero-length code in multi-symbol table",
            ));
        }

        let mut code = 0u32;
        let mut prev_length = 0u8;
        for (index, &(symbol, length)) in entries.iter().enumerate() {
            if length > prev_length {
                code <<= length - prev_length;
                prev_length = length;
            }
            // A canonical code must still fit in its own length
            if length > 0 && code >> length != 0 {
                return Err(Error::MalformedBitstream("inconsistent huffman lengths"));
            }
            if self.count[usize::from(length)] == 0 {
                self.first_code[usize::from(length)] = code;
                self.first_index[usize::from(length)] = index as u16;
            }
            self.count[usize::from(length)] += 1;
            self.symbols.push(symbol);
            self.lengths.push(length);
            code += 1;
        }

        Ok(())
    }

    /// Decode one symbol, consuming bits MSB-first.
    pub fn decode_symbol(&self, b: &mut BitstreamUnpacker<'_>) -> Result<u8> {
        if self.symbols.is_empty() {
            return Err(Error::MalformedBitstream("decode from empty huffman table"));
        }
        // Degenerate one-symbol alphabet consumes no bits
        if self.symbols.len() == 1 && self.lengths[0] == 0 {
            return Ok(self.symbols[0]);
        }

        let mut code = 0u32;
        for length in 1..=MAX_CODE_LENGTH {
            code = (code << 1) | b.u(1, "huffman_bit")?;
            let n = u32::from(self.count[length]);
            if n != 0 {
                let first = self.first_code[length];
                if code >= first && code < first + n {
                    let index = usize::from(self.first_index[length]) + (code - first) as usize;
                    return Ok(self.symbols[index]);
                }
            }
        }

        Err(Error::MalformedBitstream("huffman code out of range"))
    }
}
