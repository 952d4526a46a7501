//! Decoder core for LCEVC (MPEG-5 Part 2) enhancement streams.
//!
//! The crate consumes a decoded base-layer YUV picture produced by an
//! external codec together with a parsed enhancement bitstream, and
//! produces a reconstructed picture at the enhanced resolution. The two
//! public operations live on [`Decoder`]: [`Decoder::initialize_decode`]
//! parses one picture's enhancement data into a [`SymbolTensor`], and
//! [`Decoder::decode`] runs the reconstruction pipeline over it.
//!
//! Base video decoding, file I/O and reporting are external collaborators;
//! see the `lcevc_dec` driver binary for a raw-YUV harness.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#[macro_use]
extern crate log;

pub mod bitio;
pub mod config;
pub mod conform;
pub mod convert;
pub mod deblock;
pub mod decoder;
pub mod dequant;
pub mod deserializer;
pub mod dimensions;
pub mod dither;
pub mod entropy;
pub mod huffman;
pub mod image;
pub mod nal;
pub mod packet;
pub mod queue;
pub mod surface;
pub mod temporal;
pub mod transform;
pub mod types;
pub mod upsample;

pub use crate::decoder::{DecodeOptions, Decoder, SymbolTensor};
pub use crate::image::{Image, ImageDescription, ImageFormat};
pub use crate::packet::{Packet, PacketView};

/// A trait to indicate a type can be infallibly converted to `usize`.
/// This should only be implemented for infallible conversions, so only unsigned types are valid.
pub(crate) trait ToUsize {
    fn to_usize(self) -> usize;
}

/// Statically verify that the given type can fit within a `usize`.
/// If the size won't fit on the given platform, this will fail at compile time, but if a type
/// which can fail TryInto<usize> is used, it may panic.
macro_rules! impl_to_usize_from {
    ( $from_type:ty ) => {
        impl ToUsize for $from_type {
            fn to_usize(self) -> usize {
                static_assertions::const_assert!(
                    std::mem::size_of::<$from_type>() <= std::mem::size_of::<usize>()
                );
                self.try_into().expect(concat!(
                    stringify!($from_type),
                    " -> usize conversion failed"
                ))
            }
        }
    };
}

impl_to_usize_from!(u8);
impl_to_usize_from!(u16);
impl_to_usize_from!(u32);

pub type TryVec<T> = fallible_collections::TryVec<T>;

/// Describes decode failures.
///
/// This enum wraps the standard `io::Error` type, unified with
/// our own parser error states and those of crates we use.
#[derive(Debug)]
pub enum Error {
    /// An out-of-buffer read, reserved value, inconsistent Huffman table
    /// or over-long varint in the enhancement bitstream.
    MalformedBitstream(&'static str),
    /// Syntax is valid but signals a combination outside the decoder's
    /// supported profiles, resolutions or tool ranges.
    UnsupportedConfiguration(&'static str),
    /// Base plane dimensions disagree with the signalled configuration.
    DimensionMismatch(&'static str),
    /// Enhancement data arrived without the configuration needed to
    /// interpret it.
    InvalidPicture(&'static str),
    /// Propagate underlying errors from `std::io`.
    Io(std::io::Error),
    /// Out of memory
    OutOfMemory,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::MalformedBitstream(why) => write!(f, "malformed bitstream: {why}"),
            Error::UnsupportedConfiguration(why) => write!(f, "unsupported configuration: {why}"),
            Error::DimensionMismatch(why) => write!(f, "dimension mismatch: {why}"),
            Error::InvalidPicture(why) => write!(f, "invalid picture: {why}"),
            Error::Io(err) => write!(f, "{err}"),
            Error::OutOfMemory => write!(f, "out of memory"),
        }
    }
}

impl std::error::Error for Error {}

impl From<bitreader::BitReaderError> for Error {
    fn from(_: bitreader::BitReaderError) -> Error {
        Error::MalformedBitstream("read past end of buffer")
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<fallible_collections::TryReserveError> for Error {
    fn from(_: fallible_collections::TryReserveError) -> Error {
        Error::OutOfMemory
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        let kind = match err {
            Error::MalformedBitstream(_) => std::io::ErrorKind::InvalidData,
            Error::Io(io_err) => return io_err,
            _ => std::io::ErrorKind::Other,
        };
        Self::new(kind, err)
    }
}

/// Result shorthand using our Error enum.
pub type Result<T> = std::result::Result<T, Error>;
