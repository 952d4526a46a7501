//! NAL encapsulation of enhancement data.
//!
//! Inside AVC/HEVC-style elementary streams the enhancement payload
//! travels as NAL units of type 28 (non-IDR) and 29 (IDR). This module
//! handles the RBSP emulation-prevention escaping, the two-byte LCEVC
//! NAL header, and scanning an annex-B buffer for enhancement units.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::packet::Packet;
use crate::{Error, Result, TryVec};

/// LCEVC NAL unit types.
pub const NAL_TYPE_NON_IDR: u8 = 28;
pub const NAL_TYPE_IDR: u8 = 29;

/// One enhancement payload recovered from an elementary stream.
#[derive(Debug)]
pub struct EnhancementNal {
    pub packet: Packet,
    pub is_idr: bool,
}

// RBSP encapsulation:
// 00 00 0x (x <= 3) -> 00 00 03 0x, plus a trailing stop byte.
/// Insert emulation-prevention bytes and the trailing `0x80`.
pub fn rbsp_encapsulate(src: &[u8]) -> Result<TryVec<u8>> {
    let mut out = TryVec::new();

    let mut zeros = 0u32;
    for &b in src {
        if zeros == 2 && (b & !3) == 0 {
            out.push(0x03)?;
            zeros = 0;
        }

        if b == 0 {
            zeros += 1;
        } else {
            zeros = 0;
        }

        out.push(b)?;
    }

    out.push(0x80)?;
    Ok(out)
}

/// Strip emulation-prevention bytes and the trailing `0x80`.
pub fn rbsp_decapsulate(src: &[u8]) -> Result<TryVec<u8>> {
    // The stop byte is never part of an escape sequence
    let body = match src.split_last() {
        Some((&0x80, body)) => body,
        _ => return Err(Error::MalformedBitstream("missing rbsp stop byte")),
    };

    let mut out = TryVec::new();
    let mut zeros = 0u32;
    let mut i = 0;
    while i < body.len() {
        let b = body[i];
        if zeros == 2 && b == 0x03 && i + 1 < body.len() && (body[i + 1] & !3) == 0 {
            zeros = 0;
            i += 1;
            continue;
        }
        if b == 0 {
            zeros += 1;
        } else {
            zeros = 0;
        }
        out.push(b)?;
        i += 1;
    }

    Ok(out)
}

// Two-byte LCEVC NAL header: forbidden zero, forbidden one, 5-bit type,
// reserved bit; second byte all ones.
fn nal_header_type(byte: u8) -> Option<u8> {
    if byte & 0x80 != 0 || byte & 0x40 == 0 {
        return None;
    }
    Some((byte >> 1) & 0x1f)
}

/// Build the header + escaped payload for one enhancement NAL unit.
pub fn write_enhancement_nal(payload: &[u8], is_idr: bool) -> Result<TryVec<u8>> {
    let nal_type = if is_idr { NAL_TYPE_IDR } else { NAL_TYPE_NON_IDR };
    let mut out = TryVec::new();
    out.extend_from_slice(&[0x00, 0x00, 0x01, 0x41 | (nal_type << 1), 0xff])?;
    let rbsp = rbsp_encapsulate(payload)?;
    out.extend_from_slice(&rbsp)?;
    Ok(out)
}

/// Scan an annex-B buffer for LCEVC enhancement NAL units; payloads are
/// de-escaped and stamped with `timestamp`.
pub fn scan_enhancement(data: &[u8], timestamp: u64) -> Result<Vec<EnhancementNal>> {
    let mut found = Vec::new();

    for unit in split_nal_units(data) {
        if unit.len() < 2 {
            continue;
        }
        let nal_type = match nal_header_type(unit[0]) {
            Some(t) => t,
            None => continue,
        };
        if nal_type != NAL_TYPE_NON_IDR && nal_type != NAL_TYPE_IDR {
            continue;
        }
        let payload = rbsp_decapsulate(&unit[2..])?;
        let packet = Packet::build()
            .contents_vec(payload)
            .timestamp(timestamp)
            .finish();
        found.push(EnhancementNal {
            packet,
            is_idr: nal_type == NAL_TYPE_IDR,
        });
    }

    Ok(found)
}

// Split at 3- or 4-byte start codes; returns the unit bodies.
fn split_nal_units(data: &[u8]) -> Vec<&[u8]> {
    let mut starts = Vec::new();
    let mut i = 0;
    while i + 2 < data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            starts.push(i + 3);
            i += 3;
        } else {
            i += 1;
        }
    }

    let mut units = Vec::with_capacity(starts.len());
    for (n, &start) in starts.iter().enumerate() {
        let end = if n + 1 < starts.len() {
            // Back off over the next start code and its possible
            // leading zero byte
            let mut e = starts[n + 1] - 3;
            if e > start && data[e - 1] == 0 {
                e -= 1;
            }
            e
        } else {
            data.len()
        };
        units.push(&data[start..end]);
    }
    units
}
