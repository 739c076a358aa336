// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The lazy, typed view over one message's options area (component C3).
//!
//! `OptionsView` is constructed only on first access to an options-sensitive
//! accessor (`options_view()`, `extract_msg_group_id()`, `has_msg_group_id()`).
//! It never allocates itself; if the options area straddled a chain segment
//! seam, the gather-copy into an owned buffer already happened when the
//! iterator produced the `wire_codec::View` this type wraps.

use crate::error::Error;
use byteorder::{BigEndian, ByteOrder};
use wire_codec::chain::View;

/// Recognized option record types. Anything else is skipped by length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionType {
    MsgGroupId,
    Unknown(u8),
}

impl OptionType {
    const MSG_GROUP_ID_TAG: u8 = 1;

    fn from_raw(raw: u8) -> Self {
        if raw == Self::MSG_GROUP_ID_TAG {
            Self::MsgGroupId
        } else {
            Self::Unknown(raw)
        }
    }
}

/// The fixed-size sentinel in the 24-bit inline length that escapes to an
/// extended, 32-bit byte length carried in the following word.
const EXTENDED_LENGTH_SENTINEL: u32 = 0x7F_FFFF;

const OPTION_HEADER_LEN: usize = 4;

/// One decoded `(type, payload range)` entry. `payload` is already trimmed
/// to its true byte length -- see the inline-form padding note on
/// [`OptionsIter::next`].
#[derive(Debug, Clone, Copy)]
pub struct OptionEntry<'a> {
    pub packed: bool,
    pub option_type: OptionType,
    pub payload: &'a [u8],
}

/// A lazy view over the options area of a single PUT message. Options never
/// participate in decompression, but the area may still have been
/// gather-copied by the caller if it straddled a chain segment seam -- this
/// type wraps a [`View`] rather than a bare borrowed slice so that case is
/// representable.
#[derive(Debug, Clone)]
pub struct OptionsView<'a> {
    view: View<'a>,
}

impl<'a> OptionsView<'a> {
    #[inline]
    pub fn new(view: View<'a>) -> Self {
        Self { view }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.view.is_empty()
    }

    /// Iterate the options area, yielding one entry per record. Stops and
    /// yields `Err(Error::InvalidOption)` the first time a declared length
    /// would overrun the options area.
    pub fn iter(&self) -> OptionsIter<'_> {
        OptionsIter {
            remaining: self.view.as_slice(),
        }
    }

    /// Look up the first entry of the given type, walking the whole area.
    pub fn find(&self, ty: OptionType) -> Result<Option<OptionEntry<'_>>, Error> {
        for entry in self.iter() {
            let entry = entry?;
            if entry.option_type == ty {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }
}

pub struct OptionsIter<'a> {
    remaining: &'a [u8],
}

impl<'a> Iterator for OptionsIter<'a> {
    type Item = Result<OptionEntry<'a>, Error>;

    /// Decode one option record.
    ///
    /// The inline (24-bit words) length form always rounds the physical
    /// payload region up to a 4-byte boundary, so on its own it can't
    /// represent a non-word-aligned value exactly (e.g. a 2-byte group id).
    /// Mirroring the message-level padding convention (§6: "padding byte =
    /// last byte of each padded region, value in `[1,4]`"), the last byte
    /// of a non-empty inline payload region is a pad count in `[1,4]`; the
    /// true logical payload is everything before it. The extended form's
    /// 32-bit length field is already an exact byte count and carries no
    /// such trailer.
    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining.is_empty() {
            return None;
        }

        if self.remaining.len() < OPTION_HEADER_LEN {
            self.remaining = &[];
            return Some(Err(Error::InvalidOption));
        }

        let byte0 = self.remaining[0];
        let packed = byte0 & 0x80 != 0;
        let option_type = OptionType::from_raw(byte0 & 0x7F);

        let mut words_bytes = [0u8; 4];
        words_bytes[1..4].copy_from_slice(&self.remaining[1..4]);
        let words = BigEndian::read_u32(&words_bytes);

        let extended = words == EXTENDED_LENGTH_SENTINEL;
        let header_len = if extended {
            OPTION_HEADER_LEN + 4
        } else {
            OPTION_HEADER_LEN
        };

        if self.remaining.len() < header_len {
            self.remaining = &[];
            return Some(Err(Error::InvalidOption));
        }

        let physical_len = if extended {
            BigEndian::read_u32(&self.remaining[OPTION_HEADER_LEN..OPTION_HEADER_LEN + 4]) as usize
        } else {
            words as usize * 4
        };

        let record_len = header_len + physical_len;
        if record_len > self.remaining.len() {
            self.remaining = &[];
            return Some(Err(Error::InvalidOption));
        }

        let raw_payload = &self.remaining[header_len..record_len];

        let payload = if extended || raw_payload.is_empty() {
            raw_payload
        } else {
            let pad_count = *raw_payload.last().expect("checked non-empty above") as usize;
            if pad_count == 0 || pad_count > 4 || pad_count > raw_payload.len() {
                self.remaining = &[];
                return Some(Err(Error::InvalidOption));
            }
            &raw_payload[..raw_payload.len() - pad_count]
        };

        self.remaining = &self.remaining[record_len..];

        Some(Ok(OptionEntry {
            packed,
            option_type,
            payload,
        }))
    }
}

/// A bounded-length message-group identifier extracted from the
/// `MSG_GROUP_ID` option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsgGroupId(Vec<u8>);

impl MsgGroupId {
    /// The maximum number of identifier bytes this iterator will copy out;
    /// anything longer is treated as malformed.
    pub const MAX_LEN: usize = 64;

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl core::fmt::Display for MsgGroupId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Extract the `MSG_GROUP_ID` option's value, if present.
///
/// Returns `Ok(None)` if the option is absent; `Err(Error::InvalidOption)` if
/// it's malformed (options-area overrun) or exceeds `MsgGroupId::MAX_LEN`.
pub fn extract_msg_group_id(view: &OptionsView<'_>) -> Result<Option<MsgGroupId>, Error> {
    match view.find(OptionType::MsgGroupId)? {
        None => Ok(None),
        Some(entry) => {
            if entry.payload.len() > MsgGroupId::MAX_LEN {
                return Err(Error::InvalidOption);
            }
            Ok(Some(MsgGroupId(entry.payload.to_vec())))
        }
    }
}
