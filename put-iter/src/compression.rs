// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The decompression stage (component C4): turns the on-wire bytes of a
//! message's options-excluded region into "application data", applying the
//! declared codec per the active [`DecompressPolicy`].

use crate::error::Error;
use std::io::Read;
use wire_codec::chain::View;

/// The compression codec tagged on a PUT header, dispatched by `match`
/// rather than a trait object -- there are exactly two variants today and a
/// closed sum is cheaper and easier to exhaust-check than `dyn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    None,
    Zlib,
}

impl CompressionType {
    /// Decode the 3-bit on-wire tag. Unrecognized values above 1 are
    /// preserved by the caller as raw bytes for the `UnsupportedCompression`
    /// error; this function itself never fails.
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::None),
            1 => Some(Self::Zlib),
            _ => None,
        }
    }
}

/// Selects when the decompression stage actually invokes a codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecompressPolicy {
    /// Never decompress; application data aliases the on-wire bytes
    /// verbatim (zero-copy).
    None,
    /// Always decompress per the header's declared compression type.
    Always,
    /// Decompress iff the message carries properties in the legacy
    /// (pre-schema) format. Supports in-place rollout of a new compression
    /// scope: new brokers compress the whole application data, but old
    /// frames with compressed legacy properties still need decompressing
    /// for readers that don't understand the new scope.
    OnlyOldFormatProperties,
}

/// The logically contiguous application-data buffer produced by this stage:
/// either a borrow straight into the chain (no allocation), or bytes owned
/// by the iterator because decompression ran.
#[derive(Debug, Clone)]
pub enum ApplicationData<'a> {
    Aliased(View<'a>),
    Owned(Vec<u8>),
}

impl<'a> ApplicationData<'a> {
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Self::Aliased(v) => v.as_slice(),
            Self::Owned(v) => v,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// Returns the borrowed, contiguous byte range within the chain, if
    /// this application data is zero-copy. `None` for gather-copied ranges
    /// *and* for decompressed (owned) data -- defined only in zero-copy
    /// mode, matching the distilled iterator's `loadApplicationDataPosition`
    /// precondition.
    #[inline]
    pub fn as_contiguous(&self) -> Option<&'a [u8]> {
        match self {
            Self::Aliased(v) => v.as_contiguous(),
            Self::Owned(_) => None,
        }
    }
}

/// A hard ceiling on decompressed size, guarding against a codec that would
/// otherwise happily expand a small compressed blob into an enormous
/// allocation (a classic "zip bomb" style amplification).
pub const DEFAULT_MAX_DECOMPRESSED_SIZE: usize = 64 * 1024 * 1024;

/// Run the decompression stage over a raw on-wire range.
///
/// `raw` is the options-excluded, padding-excluded byte range of a message
/// (properties concatenated with payload). `should_decompress` tells the
/// stage whether policy says to run the codec for *this* message (the
/// iterator resolves `OnlyOldFormatProperties` against the properties
/// sub-header before calling in).
pub fn apply<'a>(
    raw: View<'a>,
    compression: CompressionType,
    should_decompress: bool,
    max_decompressed_size: usize,
) -> Result<ApplicationData<'a>, Error> {
    if !should_decompress || compression == CompressionType::None {
        return Ok(ApplicationData::Aliased(raw));
    }

    match compression {
        CompressionType::None => unreachable!("handled above"),
        CompressionType::Zlib => {
            let mut decoder = flate2::read::ZlibDecoder::new(raw.as_slice());
            let mut out = Vec::new();
            let mut limited = (&mut decoder).take(max_decompressed_size as u64 + 1);
            limited
                .read_to_end(&mut out)
                .map_err(|_| Error::DecompressFailed)?;
            if out.len() > max_decompressed_size {
                return Err(Error::DecompressFailed);
            }
            Ok(ApplicationData::Owned(out))
        }
    }
}
