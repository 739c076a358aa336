// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The error taxonomy for the PUT message iterator.
//!
//! Every variant here corresponds to a structural violation that sends the
//! iterator to its `Invalid` state (see [`crate::iterator::PutMessageIterator`]).
//! Propagation is local: there is no global error channel, and no exceptions
//! cross the API boundary -- every fallible operation returns a `Result`.

use core::fmt;
use wire_codec::DecoderError;

/// A structural decoding failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Fewer bytes remain than a header declares as its own length.
    TruncatedHeader,
    /// `total_message_words < header_words`, or `options_words` overruns
    /// the message.
    InvalidLength,
    /// The trailing padding byte was not in `[1, 4]`.
    InvalidPadding,
    /// The compression type is not recognized under the active policy. The
    /// raw on-wire compression type tag is preserved for diagnostics.
    UnsupportedCompression(u8),
    /// The codec reported failure, or the decompressed size exceeded the
    /// configured maximum.
    DecompressFailed,
    /// An option record's declared length overruns the options area.
    InvalidOption,
    /// A lower-level decode error from `wire-codec` (out-of-bounds read,
    /// length overflow, etc).
    Decoder(DecoderError),
}

impl Error {
    /// Maps each variant to a distinct negative integer, for callers that
    /// want the distilled wire protocol's "negative return code" framing
    /// (e.g. an FFI shim). Not used for internal control flow.
    pub fn code(&self) -> i32 {
        match self {
            Self::TruncatedHeader => -1,
            Self::InvalidLength => -2,
            Self::InvalidPadding => -3,
            Self::UnsupportedCompression(_) => -4,
            Self::DecompressFailed => -5,
            Self::InvalidOption => -6,
            Self::Decoder(_) => -7,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TruncatedHeader => write!(f, "truncated header"),
            Self::InvalidLength => write!(f, "invalid declared length"),
            Self::InvalidPadding => write!(f, "invalid padding byte"),
            Self::UnsupportedCompression(ty) => write!(f, "unsupported compression type: {ty}"),
            Self::DecompressFailed => write!(f, "decompression failed"),
            Self::InvalidOption => write!(f, "invalid option record"),
            Self::Decoder(e) => write!(f, "decoder error: {e}"),
        }
    }
}

impl From<DecoderError> for Error {
    fn from(e: DecoderError) -> Self {
        Self::Decoder(e)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct() {
        let variants = [
            Error::TruncatedHeader,
            Error::InvalidLength,
            Error::InvalidPadding,
            Error::UnsupportedCompression(9),
            Error::DecompressFailed,
            Error::InvalidOption,
            Error::Decoder(DecoderError::UnexpectedEof(0)),
        ];
        for (i, a) in variants.iter().enumerate() {
            for (j, b) in variants.iter().enumerate() {
                if i != j {
                    assert_ne!(a.code(), b.code());
                }
            }
        }
    }
}
