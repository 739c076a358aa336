// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Fixed-header decoders for the event header and the per-message PUT
//! header (component C2). These are pure functions: given a cursor, project
//! a typed view, validating only structural bounds -- never semantic
//! correctness of flags or enum values (that's the iterator's job).

use crate::error::Error;
use byteorder::{BigEndian, ByteOrder};
use wire_codec::Cursor;

/// The event type this iterator supports. Any other value in the event
/// header is rejected.
pub const EVENT_TYPE_PUT: u8 = 1;

/// Minimum supported event header length, in words.
pub const EVENT_HEADER_MIN_WORDS: u8 = 2;
pub const EVENT_HEADER_LEN: usize = EVENT_HEADER_MIN_WORDS as usize * 4;

/// Minimum supported PUT header length, in words.
pub const PUT_HEADER_MIN_WORDS: u8 = 10;
pub const PUT_HEADER_LEN: usize = PUT_HEADER_MIN_WORDS as usize * 4;

/// PUT header flag bits.
pub mod flags {
    pub const MESSAGE_PROPERTIES: u8 = 0b0000_0001;
    pub const OPTIONS: u8 = 0b0000_0010;
    pub const UNUSED: u8 = 0b0000_0100;
}

/// The fixed 8-byte header at the start of every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHeader {
    pub is_fragmented: bool,
    pub event_type: u8,
    pub header_words: u8,
    pub total_length: u32,
}

impl EventHeader {
    #[inline]
    pub fn header_len(&self) -> usize {
        self.header_words as usize * 4
    }

    /// Decode the event header at the cursor's current position.
    ///
    /// Validates that `header_words >= EVENT_HEADER_MIN_WORDS` and that
    /// `event_type == EVENT_TYPE_PUT`; does not validate `total_length`
    /// against the chain's actual length (the iterator does that against
    /// the blob it was given, since the header may describe a larger event
    /// than what's in hand during streamed assembly).
    pub fn decode<'a>(cursor: Cursor<'a>) -> Result<(Self, Cursor<'a>), Error> {
        if cursor.remaining() < EVENT_HEADER_LEN {
            return Err(Error::TruncatedHeader);
        }
        let (view, next) = cursor.range(EVENT_HEADER_LEN)?;
        let b = view.as_slice();

        let byte0 = b[0];
        let is_fragmented = byte0 & 0x80 != 0;
        let event_type = byte0 & 0x7F;
        let header_words = b[1];
        let total_length = BigEndian::read_u32(&b[4..8]);

        if header_words < EVENT_HEADER_MIN_WORDS {
            return Err(Error::InvalidLength);
        }
        if event_type != EVENT_TYPE_PUT {
            return Err(Error::InvalidLength);
        }

        Ok((
            Self {
                is_fragmented,
                event_type,
                header_words,
                total_length,
            },
            next,
        ))
    }
}

/// The compression type tag carried on the wire. Decoded here as a raw
/// 3-bit value; [`crate::compression::CompressionType`] interprets it.
pub type RawCompressionType = u8;

/// The fixed 40-byte header at the start of every PUT message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutHeader {
    pub flags: u8,
    pub header_words: u8,
    pub options_words: u32,
    pub compression_type: RawCompressionType,
    pub total_message_words: u32,
    pub queue_id: u32,
    pub message_guid: [u8; 16],
    pub crc32c: u32,
    pub schema_id: u16,
}

impl PutHeader {
    #[inline]
    pub fn header_len(&self) -> usize {
        self.header_words as usize * 4
    }

    #[inline]
    pub fn total_len(&self) -> usize {
        self.total_message_words as usize * 4
    }

    #[inline]
    pub fn options_len(&self) -> usize {
        self.options_words as usize * 4
    }

    #[inline]
    pub fn has_message_properties(&self) -> bool {
        self.flags & flags::MESSAGE_PROPERTIES != 0
    }

    #[inline]
    pub fn has_options(&self) -> bool {
        self.flags & flags::OPTIONS != 0 || self.options_words > 0
    }

    /// Returns a copy of this header with the compression flag cleared, for
    /// exposure once decompression has taken place. The on-wire bytes
    /// (accessible only through the cursor/chain) are never mutated.
    #[inline]
    pub fn with_compression_cleared(mut self) -> Self {
        self.compression_type = 0;
        self
    }

    /// Decode a PUT header at the cursor's current position.
    pub fn decode<'a>(cursor: Cursor<'a>) -> Result<(Self, Cursor<'a>), Error> {
        if cursor.remaining() < PUT_HEADER_LEN {
            return Err(Error::TruncatedHeader);
        }
        let (view, next) = cursor.range(PUT_HEADER_LEN)?;
        let b = view.as_slice();

        let flags = b[0];
        let header_words = b[1];
        let options_hi = BigEndian::read_u16(&b[2..4]) as u32;
        let options_lo = b[4] as u32;
        let options_words = (options_hi << 8) | options_lo;

        let compression_type = (b[5] >> 5) & 0b111;

        let total_message_words = BigEndian::read_u32(&b[8..12]);
        let queue_id = BigEndian::read_u32(&b[12..16]);

        let mut message_guid = [0u8; 16];
        message_guid.copy_from_slice(&b[16..32]);

        let crc32c = BigEndian::read_u32(&b[32..36]);
        let schema_id = BigEndian::read_u16(&b[36..38]);

        if header_words < PUT_HEADER_MIN_WORDS {
            return Err(Error::InvalidLength);
        }
        if total_message_words < header_words as u32 {
            return Err(Error::InvalidLength);
        }

        let header = Self {
            flags,
            header_words,
            options_words,
            compression_type,
            total_message_words,
            queue_id,
            message_guid,
            crc32c,
            schema_id,
        };

        let total_bytes = header.total_len();
        let header_bytes = header.header_len();
        if header.options_len() > total_bytes.saturating_sub(header_bytes) {
            return Err(Error::InvalidLength);
        }

        Ok((header, next))
    }
}
