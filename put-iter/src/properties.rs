// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The outward-facing seam to the external `MessageProperties` decoder.
//!
//! This crate never interprets the properties payload beyond the single
//! discriminating bit that tells it whether the legacy compression rollout
//! applies (`DecompressPolicy::OnlyOldFormatProperties`). Everything else is
//! handed to the caller's own decoder, verbatim.

use crate::error::Error;

/// Whether a properties sub-header declares the legacy (pre-schema) layout
/// or the newer, schema-bearing one. Bit 7 of the sub-header's first byte
/// is the only part of the properties area this crate itself interprets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertiesFormat {
    Legacy,
    New,
}

impl PropertiesFormat {
    #[inline]
    pub fn is_legacy(self) -> bool {
        matches!(self, Self::Legacy)
    }
}

/// Peek the format discriminator out of the leading byte of a properties
/// sub-header without consuming or interpreting anything else.
///
/// `bytes` must be non-empty; an empty slice means the `MESSAGE_PROPERTIES`
/// flag was set but no bytes remain for the sub-header, which is a
/// structural error the iterator reports as [`Error::InvalidLength`].
pub fn peek_format(bytes: &[u8]) -> Result<PropertiesFormat, Error> {
    let first = *bytes.first().ok_or(Error::InvalidLength)?;
    if first & 0x80 != 0 {
        Ok(PropertiesFormat::New)
    } else {
        Ok(PropertiesFormat::Legacy)
    }
}

/// Implemented by callers' own `MessageProperties` decoders. The iterator
/// hands the raw properties byte range to `decode` and returns whatever
/// comes back (or propagates a decode failure as an opaque string, since
/// this crate has no visibility into the external decoder's own error
/// type).
pub trait Decode: Sized {
    /// Decode a value of `Self` from the raw properties bytes (including
    /// the sub-header and its internal padding).
    fn decode(bytes: &[u8]) -> Result<Self, PropertiesDecodeError>;
}

/// An opaque failure from an external `MessageProperties` decoder. This
/// crate does not know (and should not need to know) the decoder's own
/// error type; it only needs to report that decoding failed.
#[derive(Debug, Clone)]
pub struct PropertiesDecodeError(pub String);

impl core::fmt::Display for PropertiesDecodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "message properties decode failed: {}", self.0)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for PropertiesDecodeError {}
