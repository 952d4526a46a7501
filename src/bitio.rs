//! MSB-first bitstream reading and writing.
//!
//! [`BitstreamUnpacker`] wraps a [`bitreader::BitReader`] over one packet
//! and adds the syntax helpers the enhancement stream needs: exp-Golomb
//! codes, the big-endian base-128 varint, byte extraction into shared
//! sub-packets and alignment checks. [`BitstreamPacker`] is the mirror
//! image, used by tests and the NAL re-encapsulation path.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use bitreader::BitReader;

use crate::packet::Packet;
use crate::{Error, Result, ToUsize, TryVec};

// Varints longer than the canonical u64 encoding are rejected.
const MAX_MULTIBYTE_GROUPS: u32 = 10;

/// MSB-first bit reader over one [`Packet`].
pub struct BitstreamUnpacker<'a> {
    packet: &'a Packet,
    data: &'a [u8],
    reader: BitReader<'a>,
    // Stack of context labels for debugging trace
    context: Vec<&'static str>,
}

impl<'a> BitstreamUnpacker<'a> {
    /// The packet must outlive the unpacker; `bytes()` mints sub-packets
    /// over the same shared buffer.
    pub fn new(packet: &'a Packet) -> BitstreamUnpacker<'a> {
        let data = packet.view().data();
        BitstreamUnpacker {
            packet,
            data,
            reader: BitReader::new(data),
            context: Vec::new(),
        }
    }

    /// Read 0..=32 bits into an unsigned integer, with a debug label.
    pub fn u(&mut self, nbits: u8, label: &'static str) -> Result<u32> {
        debug_assert!(nbits <= 32);
        let v = if nbits == 0 { 0 } else { self.reader.read_u32(nbits)? };
        if log_enabled!(log::Level::Trace) {
            trace!("{}{}:{} = {}", self.trace_prefix(), label, nbits, v);
        }
        Ok(v)
    }

    /// Read a single flag bit.
    pub fn flag(&mut self, label: &'static str) -> Result<bool> {
        Ok(self.u(1, label)? != 0)
    }

    /// Read a single byte.
    pub fn byte(&mut self) -> Result<u8> {
        Ok(self.reader.read_u8(8)?)
    }

    /// Read a sequence of bytes as a sub-packet over the same buffer.
    ///
    /// The read position must be byte aligned.
    pub fn bytes(&mut self, nbytes: usize) -> Result<Packet> {
        if self.bit_offset() % 8 != 0 {
            return Err(Error::MalformedBitstream("unaligned byte extraction"));
        }
        let offset = self.bit_offset() / 8;
        if nbytes > self.data.len() - offset {
            return Err(Error::MalformedBitstream("read past end of buffer"));
        }
        self.reader.skip(nbytes as u64 * 8)?;
        Ok(self.packet.subpacket(offset, nbytes))
    }

    /// Unsigned exp-Golomb: a run of `k` zero bits, a one bit, then `k`
    /// further bits; the `k + 1` bits read after the run, minus one.
    pub fn ue(&mut self, label: &'static str) -> Result<u32> {
        let mut leading = 0u8;
        while !self.reader.read_bool()? {
            leading += 1;
            if leading > 31 {
                return Err(Error::MalformedBitstream("exp-Golomb prefix too long"));
            }
        }
        let tail = if leading == 0 { 0 } else { self.reader.read_u32(leading)? };
        let v = (1u32 << leading) + tail - 1;
        if log_enabled!(log::Level::Trace) {
            trace!("{}{}:ue = {}", self.trace_prefix(), label, v);
        }
        Ok(v)
    }

    /// Signed exp-Golomb: 0 maps to 0, odd codes to positive, even to
    /// negative.
    pub fn se(&mut self, label: &'static str) -> Result<i32> {
        let v = self.ue(label)?;
        Ok(if v % 2 == 1 {
            ((v + 1) / 2) as i32
        } else {
            -((v / 2) as i32)
        })
    }

    /// Read a multi-byte encoded u64: 7-bit groups, continuation bit
    /// leading each group, higher-order groups first.
    pub fn multibyte(&mut self, label: &'static str) -> Result<u64> {
        let mut result = 0u64;
        let mut groups = 0u32;
        loop {
            let more = self.u(1, "mb-more")? != 0;
            let bits = self.u(7, "mb-bits")?;
            result = (result << 7) | u64::from(bits);
            groups += 1;
            if groups > MAX_MULTIBYTE_GROUPS {
                return Err(Error::MalformedBitstream("over-long varint"));
            }
            if !more {
                break;
            }
        }
        if log_enabled!(log::Level::Trace) {
            trace!("{}{} = {}", self.trace_prefix(), label, result);
        }
        Ok(result)
    }

    /// Consume alignment bits up to the next byte boundary; they must be
    /// zero.
    pub fn byte_align(&mut self) -> Result<()> {
        while self.bit_offset() % 8 != 0 {
            if self.u(1, "alignment")? != 0 {
                return Err(Error::MalformedBitstream("non-zero alignment bit"));
            }
        }
        Ok(())
    }

    pub fn bit_offset(&self) -> usize {
        self.reader.position().to_usize()
    }

    pub fn bit_size(&self) -> usize {
        self.data.len() * 8
    }

    pub fn remaining_bits(&self) -> usize {
        self.bit_size() - self.bit_offset()
    }

    pub fn is_empty(&self) -> bool {
        self.remaining_bits() == 0
    }

    pub fn push_label(&mut self, label: &'static str) {
        self.context.push(label);
    }

    pub fn pop_label(&mut self) {
        self.context.pop();
    }

    fn trace_prefix(&self) -> String {
        let mut s = String::new();
        for label in &self.context {
            s.push_str(label);
            s.push('.');
        }
        s
    }
}

impl ToUsize for u64 {
    fn to_usize(self) -> usize {
        self.try_into().expect("u64 -> usize conversion failed")
    }
}

/// MSB-first bit writer producing a [`Packet`].
///
/// Mirrors [`BitstreamUnpacker`]; used to synthesize conformant streams in
/// tests and by the NAL re-encapsulation helpers.
#[derive(Default)]
pub struct BitstreamPacker {
    data: Vec<u8>,
    // Bits accumulated into the byte under construction, MSB first
    acc: u8,
    acc_bits: u8,
}

impl BitstreamPacker {
    pub fn new() -> BitstreamPacker {
        BitstreamPacker::default()
    }

    /// Write the low `nbits` of `v`, MSB first.
    pub fn u(&mut self, nbits: u8, v: u32) {
        debug_assert!(nbits <= 32);
        debug_assert!(nbits == 32 || v >> nbits == 0);
        for i in (0..nbits).rev() {
            let bit = ((v >> i) & 1) as u8;
            self.acc = (self.acc << 1) | bit;
            self.acc_bits += 1;
            if self.acc_bits == 8 {
                self.data.push(self.acc);
                self.acc = 0;
                self.acc_bits = 0;
            }
        }
    }

    /// Write a multi-byte encoded u64, matching
    /// [`BitstreamUnpacker::multibyte`].
    pub fn multibyte(&mut self, v: u64) {
        let mut groups = 1u32;
        while groups < 10 && (v >> (7 * groups)) != 0 {
            groups += 1;
        }
        for g in (0..groups).rev() {
            self.u(1, u32::from(g != 0));
            self.u(7, ((v >> (7 * g)) & 0x7f) as u32);
        }
    }

    /// Pad with zero bits to the next byte boundary.
    pub fn byte_align(&mut self) {
        while self.acc_bits != 0 {
            self.u(1, 0);
        }
    }

    /// Append whole bytes; the write position must be byte aligned.
    pub fn bytes(&mut self, data: &[u8]) {
        assert_eq!(self.acc_bits, 0, "unaligned byte append");
        self.data.extend_from_slice(data);
    }

    pub fn bit_offset(&self) -> usize {
        self.data.len() * 8 + usize::from(self.acc_bits)
    }

    /// Seal into a packet, zero-padding any trailing partial byte.
    pub fn finish(mut self) -> Result<Packet> {
        self.byte_align();
        let mut contents = TryVec::new();
        contents.extend_from_slice(&self.data)?;
        Ok(Packet::build().contents_vec(contents).finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(data: &[u8]) -> Packet {
        Packet::build().contents(data).unwrap().finish()
    }

    #[test]
    fn fixed_width_reads() {
        let p = packet(&[0b1011_0110, 0b0100_0000]);
        let mut b = BitstreamUnpacker::new(&p);
        assert_eq!(b.u(3, "a").unwrap(), 0b101);
        assert_eq!(b.u(5, "b").unwrap(), 0b10110);
        assert_eq!(b.u(2, "c").unwrap(), 0b01);
        assert_eq!(b.remaining_bits(), 6);
    }

    #[test]
    fn read_past_end_fails() {
        let p = packet(&[0xff]);
        let mut b = BitstreamUnpacker::new(&p);
        assert_eq!(b.u(8, "x").unwrap(), 0xff);
        assert!(matches!(b.u(1, "y"), Err(Error::MalformedBitstream(_))));
    }

    #[test]
    fn exp_golomb() {
        // 1 -> 0, 010 -> 1, 011 -> 2, 00100 -> 3
        let p = packet(&[0b1_010_011_0, 0b0100_0000]);
        let mut b = BitstreamUnpacker::new(&p);
        assert_eq!(b.ue("v").unwrap(), 0);
        assert_eq!(b.ue("v").unwrap(), 1);
        assert_eq!(b.ue("v").unwrap(), 2);
        assert_eq!(b.ue("v").unwrap(), 3);
    }

    #[test]
    fn signed_exp_golomb() {
        let mut w = BitstreamPacker::new();
        // ue codes 0..=4 map to se 0, 1, -1, 2, -2
        w.u(1, 1);
        w.u(3, 0b010);
        w.u(3, 0b011);
        w.u(5, 0b00100);
        w.u(5, 0b00101);
        let p = w.finish().unwrap();
        let mut b = BitstreamUnpacker::new(&p);
        for expected in [0, 1, -1, 2, -2] {
            assert_eq!(b.se("v").unwrap(), expected);
        }
    }

    #[test]
    fn multibyte_roundtrip() {
        let values = [
            0u64,
            1,
            127,
            128,
            300,
            16383,
            16384,
            u64::from(u32::MAX),
            u64::MAX,
        ];
        for &v in &values {
            let mut w = BitstreamPacker::new();
            w.multibyte(v);
            let p = w.finish().unwrap();
            let mut b = BitstreamUnpacker::new(&p);
            assert_eq!(b.multibyte("v").unwrap(), v, "value {v}");
        }
    }

    #[test]
    fn multibyte_too_long_fails() {
        // Eleven groups exceed any canonical u64 encoding
        let p = packet(&[
            0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x00,
        ]);
        let mut b = BitstreamUnpacker::new(&p);
        assert!(matches!(
            b.multibyte("v"),
            Err(Error::MalformedBitstream(_))
        ));
    }

    #[test]
    fn bytes_shares_buffer() {
        let p = packet(&[1, 2, 3, 4, 5]);
        let mut b = BitstreamUnpacker::new(&p);
        assert_eq!(b.byte().unwrap(), 1);
        let inner = b.bytes(3).unwrap();
        assert_eq!(inner.view().data(), &[2, 3, 4]);
        assert_eq!(b.byte().unwrap(), 5);
        assert!(b.is_empty());
    }

    #[test]
    fn alignment_checks() {
        let p = packet(&[0b1010_0000, 0xaa]);
        let mut b = BitstreamUnpacker::new(&p);
        b.u(3, "head").unwrap();
        b.byte_align().unwrap();
        assert_eq!(b.bit_offset(), 8);
        assert_eq!(b.byte().unwrap(), 0xaa);

        let p = packet(&[0b1010_1000]);
        let mut b = BitstreamUnpacker::new(&p);
        b.u(3, "head").unwrap();
        assert!(b.byte_align().is_err());
    }

    #[test]
    fn packer_bit_layout() {
        let mut w = BitstreamPacker::new();
        w.u(3, 0b101);
        w.u(5, 0b10110);
        let p = w.finish().unwrap();
        assert_eq!(p.view().data(), &[0b1011_0110]);
    }
}
