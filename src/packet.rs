//! Reference-counted immutable byte spans carrying bitstream data.
//!
//! All enhancement data flows between stages as [`Packet`]s: cheaply
//! clonable spans over a shared buffer, stamped with the producer
//! timestamp. A [`PacketView`] is a scoped read-only borrow of the span,
//! and [`PacketBuilder`] is the only place bytes are written before the
//! packet is sealed.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt::Write as _;
use std::sync::{Arc, OnceLock};

use crate::{Result, TryVec};

/// An immutable, reference-counted byte span with a producer timestamp.
#[derive(Clone)]
pub struct Packet {
    timestamp: u64,
    // Underlying shared buffer
    buffer: Arc<[u8]>,
    // Span within above buffer
    offset: usize,
    size: usize,
    // Cached checksum of contents
    checksum: Arc<OnceLock<u64>>,
}

impl Packet {
    /// Create a new builder.
    pub fn build() -> PacketBuilder {
        PacketBuilder::default()
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// CRC-64 of the packet contents, computed on first use.
    pub fn checksum(&self) -> u64 {
        *self
            .checksum
            .get_or_init(|| crc64(0, &self.buffer[self.offset..self.offset + self.size]))
    }

    /// Borrow the span for reading.
    pub fn view(&self) -> PacketView<'_> {
        PacketView {
            data: &self.buffer[self.offset..self.offset + self.size],
        }
    }

    /// A sub-span sharing this packet's buffer and timestamp.
    ///
    /// The requested range must lie inside the packet.
    pub(crate) fn subpacket(&self, offset: usize, size: usize) -> Packet {
        assert!(offset + size <= self.size);
        Packet {
            timestamp: self.timestamp,
            buffer: Arc::clone(&self.buffer),
            offset: self.offset + offset,
            size,
            checksum: Arc::new(OnceLock::new()),
        }
    }

    /// Hex dump of packet contents for diagnostics.
    pub fn dump(&self) -> String {
        let view = self.view();
        let mut out = String::new();
        for (i, chunk) in view.data().chunks(16).enumerate() {
            let _ = write!(out, "{:06x}:", i * 16);
            for b in chunk {
                let _ = write!(out, " {b:02x}");
            }
            out.push('\n');
        }
        out
    }
}

impl Default for Packet {
    fn default() -> Self {
        Packet {
            timestamp: 0,
            buffer: Arc::from(&[] as &[u8]),
            offset: 0,
            size: 0,
            checksum: Arc::new(OnceLock::new()),
        }
    }
}

impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packet")
            .field("timestamp", &self.timestamp)
            .field("size", &self.size)
            .finish()
    }
}

/// Scoped read-only view into a [`Packet`].
pub struct PacketView<'a> {
    data: &'a [u8],
}

impl<'a> PacketView<'a> {
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Accumulates packet contents, then seals them into an immutable [`Packet`].
#[derive(Default)]
pub struct PacketBuilder {
    timestamp: u64,
    data: TryVec<u8>,
}

impl PacketBuilder {
    /// Copy existing data into the packet under construction.
    pub fn contents(mut self, data: &[u8]) -> Result<Self> {
        self.data = TryVec::new();
        self.data.extend_from_slice(data)?;
        Ok(self)
    }

    /// Take an owned buffer as the packet contents.
    pub fn contents_vec(mut self, data: TryVec<u8>) -> Self {
        self.data = data;
        self
    }

    /// Reserve writable zeroed bytes.
    pub fn reserve(mut self, size: usize) -> Result<Self> {
        self.data = TryVec::new();
        self.data.resize_with(size, || 0)?;
        Ok(self)
    }

    pub fn timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Write access to reserved bytes.
    pub fn data(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Make the packet.
    pub fn finish(self) -> Packet {
        let size = self.data.len();
        Packet {
            timestamp: self.timestamp,
            buffer: Arc::from(&self.data[..]),
            offset: 0,
            size,
            checksum: Arc::new(OnceLock::new()),
        }
    }
}

// CRC-64/XZ, bitwise; packets are checksummed rarely enough that a table
// is not worth carrying.
fn crc64(crc: u64, data: &[u8]) -> u64 {
    const POLY: u64 = 0xC96C_5795_D787_0F42;
    let mut crc = !crc;
    for &b in data {
        crc ^= u64::from(b);
        for _ in 0..8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ POLY } else { crc >> 1 };
        }
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_roundtrip() {
        let p = Packet::build()
            .contents(&[1, 2, 3, 4])
            .unwrap()
            .timestamp(42)
            .finish();
        assert_eq!(p.size(), 4);
        assert_eq!(p.timestamp(), 42);
        assert_eq!(p.view().data(), &[1, 2, 3, 4]);
    }

    #[test]
    fn subpacket_shares_timestamp() {
        let p = Packet::build()
            .contents(&[9, 8, 7, 6, 5])
            .unwrap()
            .timestamp(7)
            .finish();
        let s = p.subpacket(1, 3);
        assert_eq!(s.view().data(), &[8, 7, 6]);
        assert_eq!(s.timestamp(), 7);
    }

    #[test]
    fn checksum_is_stable() {
        let p = Packet::build().contents(b"abc").unwrap().finish();
        let q = Packet::build().contents(b"abc").unwrap().finish();
        assert_eq!(p.checksum(), q.checksum());
        assert_eq!(p.checksum(), p.checksum());
        let r = Packet::build().contents(b"abd").unwrap().finish();
        assert_ne!(p.checksum(), r.checksum());
    }

    #[test]
    fn empty_packet() {
        let p = Packet::default();
        assert!(p.is_empty());
        assert_eq!(p.view().size(), 0);
    }
}
