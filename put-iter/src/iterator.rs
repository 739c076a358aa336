// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The PUT message iterator (component C5): orchestrates C1-C4, advancing
//! through a PUT event's messages and exposing a cached, O(1) read API per
//! message.
//!
//! ## Properties sub-header and compression scope
//!
//! This crate resolves the distilled spec's open question (whether
//! properties are guaranteed to live inside the decompressed region) by
//! giving the properties sub-header a fixed, 5-byte, always-clear layout:
//! one format-discriminator byte (bit 7: legacy/new) followed by a 4-byte
//! declared *logical* length of the whole properties region (sub-header
//! included). That sub-header is never itself subject to compression --
//! only the bytes after it (the rest of the properties body, concatenated
//! with the payload) are, when the active policy says to decompress. This
//! sidesteps a read-before-decompress ordering problem: `OnlyOldFormatProperties`
//! must inspect the format bit *before* deciding whether to run a codec at
//! all, so that bit can't itself be behind the codec.

use crate::{
    compression::{self, CompressionType, DecompressPolicy},
    diagnostics::{debug_event, trace_event},
    error::Error,
    header::{flags, EventHeader, PutHeader},
    options::{self, MsgGroupId, OptionType, OptionsView},
    properties::{self, PropertiesFormat},
};
use byteorder::{BigEndian, ByteOrder};
use wire_codec::{Chain, View};

/// The MPA sub-header: 1 format byte + 4-byte big-endian declared length.
const MPA_HEADER_LEN: usize = 5;

/// The outcome of a successful call to [`PutMessageIterator::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// The iterator is now positioned on a message.
    HasMessage,
    /// The event is exhausted; the iterator is now `Invalid`.
    End,
}

#[derive(Debug, Clone)]
struct CurrentMessage {
    header: PutHeader,
    ph_offset: usize,
    options_offset: usize,
    options_size: usize,
    application_data: OwnedOrOffset,
    application_data_size: usize,
    message_properties_size: usize,
    next_offset: usize,
}

/// Either the application data is aliased into the chain at a known
/// `(offset, len)`, or it was decompressed into an owned buffer (possibly
/// with a clear properties sub-header prefix copied in front of it).
#[derive(Debug, Clone)]
enum OwnedOrOffset {
    Aliased { offset: usize, len: usize },
    Owned(Vec<u8>),
}

#[derive(Debug, Clone)]
enum State {
    Invalid,
    /// `reset` succeeded; positioned before the first message.
    Ready,
    OnMessage(CurrentMessage),
}

/// A read-only, forward-only cursor over the PUT messages packed into a
/// single PUT event.
pub struct PutMessageIterator<'a> {
    chain: Chain<'a>,
    policy: DecompressPolicy,
    max_decompressed_size: usize,
    event_header_len: usize,
    event_total_len: usize,
    state: State,
}

impl<'a> PutMessageIterator<'a> {
    /// Construct an iterator in its default, `Invalid` state. Call
    /// [`Self::reset`] before the first [`Self::advance`].
    pub fn new(policy: DecompressPolicy, max_decompressed_size: usize) -> Self {
        Self {
            chain: Chain::new(&[]),
            policy,
            max_decompressed_size,
            event_header_len: 0,
            event_total_len: 0,
            state: State::Invalid,
        }
    }

    /// Bind the iterator to `chain`, validate `event_header` against it,
    /// and position the iterator before the first message.
    ///
    /// `decompress_policy`, if given, overrides the policy the iterator was
    /// constructed with (mirroring the distilled API's `decompress_flag`
    /// argument overriding a constructor-set default).
    pub fn reset(
        &mut self,
        chain: Chain<'a>,
        event_header: EventHeader,
        decompress_policy: Option<DecompressPolicy>,
    ) -> Result<(), Error> {
        let total_length = event_header.total_length as usize;
        if total_length > chain.len() {
            debug_event!(total_length, chain_len = chain.len(), "reset: event length exceeds chain length");
            return Err(Error::InvalidLength);
        }
        if event_header.header_len() > total_length {
            debug_event!(header_len = event_header.header_len(), total_length, "reset: truncated event header");
            return Err(Error::TruncatedHeader);
        }

        self.chain = chain;
        self.event_header_len = event_header.header_len();
        self.event_total_len = total_length;
        if let Some(policy) = decompress_policy {
            self.policy = policy;
        }
        self.state = State::Ready;
        trace_event!(total_length, "reset: ok");
        Ok(())
    }

    /// Rebind the iterator to a new, logically identical chain while
    /// inheriting `other`'s cached offsets. Used when the original chain's
    /// lifetime is shorter than the cached state needs to live.
    ///
    /// Fails if `other`'s chain and `chain` don't report the same total
    /// length -- this crate has no other way to confirm the two chains
    /// describe the same bytes.
    pub fn reset_rebind<'b>(
        &mut self,
        chain: Chain<'a>,
        other: &PutMessageIterator<'b>,
    ) -> Result<(), Error> {
        if chain.len() != other.chain.len() {
            return Err(Error::InvalidLength);
        }

        self.chain = chain;
        self.event_header_len = other.event_header_len;
        self.event_total_len = other.event_total_len;
        self.policy = other.policy;
        self.max_decompressed_size = other.max_decompressed_size;
        self.state = match &other.state {
            State::Invalid => State::Invalid,
            State::Ready => State::Ready,
            State::OnMessage(m) => State::OnMessage(m.clone()),
        };
        Ok(())
    }

    /// Restore the default-constructed, `Invalid` state.
    pub fn clear(&mut self) {
        self.chain = Chain::new(&[]);
        self.event_header_len = 0;
        self.event_total_len = 0;
        self.state = State::Invalid;
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        matches!(self.state, State::OnMessage(_))
    }

    fn current(&self) -> Option<&CurrentMessage> {
        match &self.state {
            State::OnMessage(m) => Some(m),
            _ => None,
        }
    }

    fn invalidate(&mut self) {
        self.state = State::Invalid;
    }

    /// Advance to the next message.
    pub fn advance(&mut self) -> Result<Advance, Error> {
        let next_offset = match &self.state {
            State::Invalid => {
                // Mirrors the distilled spec: advancing an already-invalid
                // iterator is a no-op that reports `End`, not an error.
                return Ok(Advance::End);
            }
            State::Ready => self.event_header_len,
            State::OnMessage(m) => m.next_offset,
        };

        if next_offset >= self.event_total_len {
            self.invalidate();
            trace_event!(next_offset, "advance: end of event");
            return Ok(Advance::End);
        }

        match self.advance_at(next_offset) {
            Ok(message) => {
                trace_event!(ph_offset = next_offset, next_offset = message.next_offset, "advance: has message");
                self.state = State::OnMessage(message);
                Ok(Advance::HasMessage)
            }
            Err(e) => {
                self.invalidate();
                debug_event!(ph_offset = next_offset, error = ?e, "advance: structural error, iterator invalidated");
                Err(e)
            }
        }
    }

    fn advance_at(&self, ph_offset: usize) -> Result<CurrentMessage, Error> {
        let cursor = self.chain.cursor().advance(ph_offset)?;
        let event_remaining = self.event_total_len - ph_offset;

        let (ph, _after_header) = PutHeader::decode(cursor)?;

        let header_bytes = ph.header_len();
        let total_bytes = ph.total_len();
        let options_bytes = if ph.flags & flags::OPTIONS != 0 {
            ph.options_len()
        } else {
            0
        };

        if total_bytes > event_remaining {
            return Err(Error::TruncatedHeader);
        }
        if options_bytes > total_bytes.saturating_sub(header_bytes) {
            return Err(Error::InvalidLength);
        }
        if total_bytes == 0 {
            return Err(Error::InvalidLength);
        }

        let padding_byte = self
            .chain
            .cursor()
            .advance(ph_offset + total_bytes - 1)?
            .peek_byte(0)?;
        if !(1..=4).contains(&padding_byte) {
            return Err(Error::InvalidPadding);
        }

        let options_offset = ph_offset + header_bytes;
        let raw_ad_offset = options_offset + options_bytes;
        let raw_ad_size = total_bytes
            .checked_sub(header_bytes)
            .and_then(|v| v.checked_sub(options_bytes))
            .and_then(|v| v.checked_sub(padding_byte as usize))
            .ok_or(Error::InvalidLength)?;

        let mpa_header_len = if ph.has_message_properties() {
            MPA_HEADER_LEN
        } else {
            0
        };
        if mpa_header_len > raw_ad_size {
            return Err(Error::InvalidLength);
        }

        let mpa_header_bytes = {
            let mut buf = [0u8; MPA_HEADER_LEN];
            if mpa_header_len > 0 {
                self.chain
                    .cursor()
                    .advance(raw_ad_offset)?
                    .read_into(&mut buf[..mpa_header_len])?;
            }
            buf
        };

        let message_properties_size = if mpa_header_len > 0 {
            let declared = BigEndian::read_u32(&mpa_header_bytes[1..MPA_HEADER_LEN]) as usize;
            if declared < mpa_header_len {
                return Err(Error::InvalidLength);
            }
            declared
        } else {
            0
        };

        let format = if mpa_header_len > 0 {
            properties::peek_format(&mpa_header_bytes[..mpa_header_len])?
        } else {
            PropertiesFormat::New
        };

        let should_decompress = match self.policy {
            DecompressPolicy::None => false,
            DecompressPolicy::Always => true,
            DecompressPolicy::OnlyOldFormatProperties => {
                ph.has_message_properties() && format.is_legacy()
            }
        };

        let raw_compression_type = ph.compression_type;
        let compression_type = if should_decompress {
            CompressionType::from_raw(raw_compression_type).ok_or_else(|| {
                let err = Error::UnsupportedCompression(raw_compression_type);
                debug_event!(ph_offset, raw_compression_type, error = ?err, "advance: unsupported compression type");
                err
            })?
        } else {
            CompressionType::None
        };

        // message_properties_size must fit within the raw AD even though its
        // value is a logical (post-decompression) length: when compression
        // is in effect only the region past the clear sub-header can differ
        // in size between wire and logical form, and the sub-header's own
        // declared length is trusted as a constraint on the *logical* AD,
        // not the raw one. We still require at least the header bytes to be
        // physically present, checked above.

        let compressible_offset = raw_ad_offset + mpa_header_len;
        let compressible_raw_size = raw_ad_size - mpa_header_len;

        let (application_data, application_data_size) = if should_decompress
            && compression_type != CompressionType::None
        {
            let (view, _) = self
                .chain
                .cursor()
                .advance(compressible_offset)?
                .range(compressible_raw_size)?;
            let decompressed = compression::apply(
                view,
                compression_type,
                true,
                self.max_decompressed_size,
            )
            .map_err(|e| {
                debug_event!(ph_offset, compression_type = ?compression_type, error = ?e, "advance: decompression failed");
                e
            })?;
            let mut owned = Vec::with_capacity(mpa_header_len + decompressed.len());
            owned.extend_from_slice(&mpa_header_bytes[..mpa_header_len]);
            owned.extend_from_slice(decompressed.as_slice());
            let len = owned.len();
            (OwnedOrOffset::Owned(owned), len)
        } else {
            (
                OwnedOrOffset::Aliased {
                    offset: raw_ad_offset,
                    len: raw_ad_size,
                },
                raw_ad_size,
            )
        };

        let header = if matches!(application_data, OwnedOrOffset::Owned(_)) {
            ph.with_compression_cleared()
        } else {
            ph
        };

        Ok(CurrentMessage {
            header,
            ph_offset,
            options_offset,
            options_size: options_bytes,
            application_data,
            application_data_size,
            message_properties_size,
            next_offset: ph_offset + total_bytes,
        })
    }

    /// The current message's header. `None` unless [`Self::is_valid`].
    pub fn header(&self) -> Option<&PutHeader> {
        self.current().map(|m| &m.header)
    }

    #[inline]
    pub fn application_data_size(&self) -> usize {
        self.current().map(|m| m.application_data_size).unwrap_or(0)
    }

    /// Gather-copy `dst.len()` bytes of the logical application data
    /// starting at `start` into `dst`, without materializing the whole AD.
    fn read_application_data(
        &self,
        m: &CurrentMessage,
        start: usize,
        dst: &mut [u8],
    ) -> Result<(), Error> {
        match &m.application_data {
            OwnedOrOffset::Owned(v) => {
                dst.copy_from_slice(&v[start..start + dst.len()]);
                Ok(())
            }
            OwnedOrOffset::Aliased { offset, .. } => self
                .chain
                .cursor()
                .advance(*offset + start)?
                .read_into(dst),
        }
    }

    /// Gather-copy the application data bytes into `dst`.
    ///
    /// `dst` must be exactly [`Self::application_data_size`] bytes.
    pub fn load_application_data(&self, dst: &mut [u8]) -> Result<(), Error> {
        let m = self.current().ok_or(Error::InvalidLength)?;
        if dst.len() != m.application_data_size {
            return Err(Error::InvalidLength);
        }
        self.read_application_data(m, 0, dst)
    }

    /// The `(total_offset, len)` of the application data within the chain,
    /// defined only when application data is zero-copy (decompression did
    /// not run for this message and the range doesn't straddle a chain
    /// segment seam).
    pub fn application_data_position(&self) -> Option<(usize, usize)> {
        let m = self.current()?;
        match &m.application_data {
            OwnedOrOffset::Owned(_) => None,
            OwnedOrOffset::Aliased { offset, len } => {
                let (view, _) = self.chain.cursor().advance(*offset).ok()?.range(*len).ok()?;
                view.as_contiguous()?;
                Some((*offset, *len))
            }
        }
    }

    /// Size of the message-properties region, `0` if this message carries
    /// none (gated on `has_message_properties`, the conservative reading of
    /// the distilled spec's open question rather than a precondition that
    /// could otherwise be violated).
    #[inline]
    pub fn message_properties_size(&self) -> usize {
        self.current().map(|m| m.message_properties_size).unwrap_or(0)
    }

    /// Gather-copy the leading `message_properties_size` bytes of the
    /// application data into `dst`.
    pub fn load_message_properties(&self, dst: &mut [u8]) -> Result<(), Error> {
        let m = self.current().ok_or(Error::InvalidLength)?;
        if dst.len() != m.message_properties_size {
            return Err(Error::InvalidLength);
        }
        self.read_application_data(m, 0, dst)
    }

    /// Decode the message properties region via an external decoder.
    pub fn decode_message_properties<D: properties::Decode>(&self) -> Result<D, Error> {
        let size = self.message_properties_size();
        let mut buf = vec![0u8; size];
        self.load_message_properties(&mut buf)?;
        D::decode(&buf).map_err(|_| Error::InvalidLength)
    }

    /// Size of the message payload, `application_data_size -
    /// message_properties_size`.
    ///
    /// Saturates at zero: under [`DecompressPolicy::None`] the declared
    /// properties size is a *logical* (post-decompression) length and may
    /// legitimately exceed the raw, still-compressed application data size.
    #[inline]
    pub fn message_payload_size(&self) -> usize {
        self.application_data_size()
            .saturating_sub(self.message_properties_size())
    }

    /// Gather-copy the trailing payload bytes of the application data into
    /// `dst`.
    pub fn load_message_payload(&self, dst: &mut [u8]) -> Result<(), Error> {
        let m = self.current().ok_or(Error::InvalidLength)?;
        let props_size = m.message_properties_size;
        let payload_size = m.application_data_size.saturating_sub(props_size);
        if dst.len() != payload_size {
            return Err(Error::InvalidLength);
        }
        self.read_application_data(m, props_size, dst)
    }

    #[inline]
    pub fn options_size(&self) -> usize {
        self.current().map(|m| m.options_size).unwrap_or(0)
    }

    #[inline]
    pub fn has_options(&self) -> bool {
        self.options_size() > 0
    }

    /// Gather-copy the options area into `dst`.
    pub fn load_options(&self, dst: &mut [u8]) -> Result<(), Error> {
        let m = self.current().ok_or(Error::InvalidLength)?;
        if dst.len() != m.options_size {
            return Err(Error::InvalidLength);
        }
        if m.options_size == 0 {
            return Ok(());
        }
        self.chain.cursor().advance(m.options_offset)?.read_into(dst)
    }

    /// Build the lazy, typed view over the current message's options area.
    /// Construction is cheap (no allocation, no walk) -- the real laziness
    /// lives in the view's own `iter`/`find`. The options area is aliased
    /// into the chain when it sits inside one segment, and gather-copied
    /// into an owned buffer when it straddles a segment seam -- either way
    /// `OptionsView` wraps the resulting `wire_codec::View` directly, since
    /// options never participate in decompression but may still cross a
    /// seam like any other chain range.
    pub fn options_view(&self) -> Result<OptionsView<'a>, Error> {
        let m = self.current().ok_or(Error::InvalidLength)?;
        if m.options_size == 0 {
            return Ok(OptionsView::new(View::Borrowed(&[])));
        }
        let (view, _) = self.chain.cursor().advance(m.options_offset)?.range(m.options_size)?;
        Ok(OptionsView::new(view))
    }

    pub fn extract_msg_group_id(&self) -> Result<Option<MsgGroupId>, Error> {
        let view = self.options_view()?;
        options::extract_msg_group_id(&view)
    }

    #[inline]
    pub fn has_message_properties(&self) -> bool {
        self.current()
            .map(|m| m.header.has_message_properties())
            .unwrap_or(false)
    }

    pub fn has_msg_group_id(&self) -> Result<bool, Error> {
        let view = self.options_view()?;
        Ok(view.find(OptionType::MsgGroupId)?.is_some())
    }

    pub fn dump_blob(&self, out: &mut dyn core::fmt::Write, max_bytes: usize) -> core::fmt::Result {
        crate::diagnostics::dump_blob(&self.chain, out, max_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header;
    use byteorder::BigEndian;
    use std::io::Write;
    use wire_codec::{Encoder, EncoderBuffer};

    fn zlib_compress(data: &[u8]) -> Vec<u8> {
        let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::fast());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    /// Encode one inline-form option record with a trailing pad-count byte
    /// (mirroring the message-level padding convention), so `payload` round
    /// trips exactly regardless of its length mod 4. See
    /// `options::OptionsIter::next`.
    fn encode_option(ty: u8, payload: &[u8]) -> Vec<u8> {
        let rem = payload.len() % 4;
        let pad_count = if rem == 0 { 4 } else { 4 - rem };
        let words = ((payload.len() + pad_count) / 4) as u32;

        let mut out = vec![ty & 0x7F];
        let mut words_bytes = [0u8; 4];
        BigEndian::write_u32(&mut words_bytes, words);
        out.extend_from_slice(&words_bytes[1..4]);
        out.extend_from_slice(payload);
        for i in 0..pad_count {
            out.push(if i + 1 == pad_count { pad_count as u8 } else { 0 });
        }
        out
    }

    /// Everything needed to assemble one synthetic wire-format PUT message.
    struct MessageSpec<'a> {
        has_properties: bool,
        properties_legacy: bool,
        properties_extra: &'a [u8],
        payload: &'a [u8],
        options: &'a [u8],
        compression_type: u8,
        compress_wire: bool,
    }

    /// Assemble one PUT message's bytes per the layout documented in
    /// `header.rs` and this module's own header comment.
    fn build_message(spec: &MessageSpec<'_>) -> Vec<u8> {
        let mut compressible = Vec::new();
        compressible.extend_from_slice(spec.properties_extra);
        compressible.extend_from_slice(spec.payload);

        let compressible_wire = if spec.compress_wire {
            zlib_compress(&compressible)
        } else {
            compressible
        };

        let mut ad_wire = Vec::new();
        if spec.has_properties {
            let declared_len = (MPA_HEADER_LEN + spec.properties_extra.len()) as u32;
            ad_wire.push(if spec.properties_legacy { 0x00 } else { 0x80 });
            let mut len_bytes = [0u8; 4];
            BigEndian::write_u32(&mut len_bytes, declared_len);
            ad_wire.extend_from_slice(&len_bytes);
        }
        ad_wire.extend_from_slice(&compressible_wire);

        let options_bytes = spec.options.len();
        let wire_ad_len = ad_wire.len();
        let unpadded = header::PUT_HEADER_LEN + options_bytes + wire_ad_len;
        let rem = unpadded % 4;
        let pad = if rem == 0 { 4 } else { 4 - rem };
        let total_bytes = unpadded + pad;
        let total_message_words = (total_bytes / 4) as u32;
        let options_words = (options_bytes / 4) as u32;

        let mut flags_byte = 0u8;
        if spec.has_properties {
            flags_byte |= flags::MESSAGE_PROPERTIES;
        }
        if !spec.options.is_empty() {
            flags_byte |= flags::OPTIONS;
        }

        let mut header_buf = vec![0u8; header::PUT_HEADER_LEN];
        {
            let mut enc = EncoderBuffer::new(&mut header_buf);
            enc.encode(&flags_byte);
            enc.encode(&header::PUT_HEADER_MIN_WORDS);
            enc.encode(&((options_words >> 8) as u16));
            enc.encode(&((options_words & 0xFF) as u8));
            enc.encode(&((spec.compression_type & 0b111) << 5));
            enc.write_repeated(2, 0);
            enc.encode(&total_message_words);
            enc.encode(&0u32); // queue_id
            enc.write_repeated(16, 0); // message_guid
            enc.encode(&0u32); // crc32c
            enc.encode(&0u16); // schema_id
            enc.write_repeated(2, 0);
        }

        let mut out = header_buf;
        out.extend_from_slice(spec.options);
        out.extend_from_slice(&ad_wire);
        for i in 0..pad {
            out.push(if i + 1 == pad { pad as u8 } else { 0 });
        }
        out
    }

    fn build_event(messages: &[Vec<u8>]) -> Vec<u8> {
        let total_length =
            (header::EVENT_HEADER_LEN + messages.iter().map(Vec::len).sum::<usize>()) as u32;
        let mut event_header_buf = vec![0u8; header::EVENT_HEADER_LEN];
        {
            let mut enc = EncoderBuffer::new(&mut event_header_buf);
            enc.encode(&header::EVENT_TYPE_PUT);
            enc.encode(&header::EVENT_HEADER_MIN_WORDS);
            enc.write_repeated(2, 0);
            enc.encode(&total_length);
        }
        let mut out = event_header_buf;
        for m in messages {
            out.extend_from_slice(m);
        }
        out
    }

    fn no_options_no_properties(payload: &[u8]) -> MessageSpec<'_> {
        MessageSpec {
            has_properties: false,
            properties_legacy: false,
            properties_extra: &[],
            payload,
            options: &[],
            compression_type: 0,
            compress_wire: false,
        }
    }

    #[test]
    fn empty_event_yields_no_messages() {
        let bytes = build_event(&[]);
        let segs = [bytes.as_slice()];
        let chain = Chain::new(&segs);
        let (event_header, _) = EventHeader::decode(chain.cursor()).unwrap();
        let mut iter = PutMessageIterator::new(DecompressPolicy::None, compression::DEFAULT_MAX_DECOMPRESSED_SIZE);
        iter.reset(chain, event_header, None).unwrap();
        assert!(!iter.is_valid());
        assert_eq!(iter.advance().unwrap(), Advance::End);
        assert!(!iter.is_valid());
    }

    #[test]
    fn single_uncompressed_message_round_trips() {
        let payload = b"hello world".to_vec();
        let msg = build_message(&no_options_no_properties(&payload));
        let bytes = build_event(&[msg]);
        let segs = [bytes.as_slice()];
        let chain = Chain::new(&segs);
        let (event_header, _) = EventHeader::decode(chain.cursor()).unwrap();
        let mut iter = PutMessageIterator::new(DecompressPolicy::None, compression::DEFAULT_MAX_DECOMPRESSED_SIZE);
        iter.reset(chain, event_header, None).unwrap();

        assert_eq!(iter.advance().unwrap(), Advance::HasMessage);
        assert!(iter.is_valid());
        assert!(!iter.has_options());
        assert!(!iter.has_message_properties());
        assert_eq!(iter.application_data_size(), payload.len());

        let mut out = vec![0u8; payload.len()];
        iter.load_application_data(&mut out).unwrap();
        assert_eq!(out, payload);
        assert_eq!(iter.message_payload_size(), payload.len());
        assert_eq!(iter.message_properties_size(), 0);

        assert_eq!(iter.advance().unwrap(), Advance::End);
        assert!(!iter.is_valid());
    }

    #[test]
    fn two_messages_one_with_msg_group_id() {
        let group_id = b"g1".to_vec();
        let options1 = encode_option(1, &group_id);
        let msg1 = build_message(&MessageSpec {
            options: &options1,
            ..no_options_no_properties(b"first")
        });
        let msg2 = build_message(&no_options_no_properties(b"second message"));
        let event_bytes = build_event(&[msg1, msg2]);

        let segs = [event_bytes.as_slice()];
        let chain = Chain::new(&segs);
        let (event_header, _) = EventHeader::decode(chain.cursor()).unwrap();
        let mut iter = PutMessageIterator::new(DecompressPolicy::None, compression::DEFAULT_MAX_DECOMPRESSED_SIZE);
        iter.reset(chain, event_header, None).unwrap();

        assert_eq!(iter.advance().unwrap(), Advance::HasMessage);
        assert!(iter.has_options());
        assert!(iter.has_msg_group_id().unwrap());
        let id = iter.extract_msg_group_id().unwrap().unwrap();
        assert_eq!(id.as_bytes(), group_id.as_slice());
        let mut buf = vec![0u8; b"first".len()];
        iter.load_application_data(&mut buf).unwrap();
        assert_eq!(buf, b"first");

        assert_eq!(iter.advance().unwrap(), Advance::HasMessage);
        assert!(!iter.has_options());
        assert!(!iter.has_msg_group_id().unwrap());
        let mut buf2 = vec![0u8; b"second message".len()];
        iter.load_application_data(&mut buf2).unwrap();
        assert_eq!(buf2, b"second message");

        assert_eq!(iter.advance().unwrap(), Advance::End);
    }

    #[test]
    fn compressed_payload_decompresses_transparently_under_always_policy() {
        let plain = b"the quick brown fox jumps over the lazy dog, repeatedly".to_vec();
        let msg = build_message(&MessageSpec {
            compression_type: 1,
            compress_wire: true,
            ..no_options_no_properties(&plain)
        });
        let event_bytes = build_event(&[msg]);

        {
            let segs = [event_bytes.as_slice()];
            let chain = Chain::new(&segs);
            let (event_header, _) = EventHeader::decode(chain.cursor()).unwrap();
            let mut iter =
                PutMessageIterator::new(DecompressPolicy::Always, compression::DEFAULT_MAX_DECOMPRESSED_SIZE);
            iter.reset(chain, event_header, None).unwrap();
            assert_eq!(iter.advance().unwrap(), Advance::HasMessage);
            assert_eq!(iter.application_data_size(), plain.len());
            let mut out = vec![0u8; plain.len()];
            iter.load_application_data(&mut out).unwrap();
            assert_eq!(out, plain);
            assert!(iter.application_data_position().is_none());
            assert_eq!(iter.header().unwrap().compression_type, 0);
        }

        {
            let segs = [event_bytes.as_slice()];
            let chain = Chain::new(&segs);
            let (event_header, _) = EventHeader::decode(chain.cursor()).unwrap();
            let mut iter =
                PutMessageIterator::new(DecompressPolicy::None, compression::DEFAULT_MAX_DECOMPRESSED_SIZE);
            iter.reset(chain, event_header, None).unwrap();
            assert_eq!(iter.advance().unwrap(), Advance::HasMessage);
            assert_ne!(iter.application_data_size(), plain.len());
            assert!(iter.application_data_position().is_some());
            assert_eq!(iter.header().unwrap().compression_type, 1);
        }
    }

    #[test]
    fn legacy_properties_trigger_decompress_only_under_legacy_policy() {
        let properties_extra = b"properties-body".to_vec();
        let payload = b"payload-body-that-repeats-payload-body".to_vec();
        let msg = build_message(&MessageSpec {
            has_properties: true,
            properties_legacy: true,
            properties_extra: &properties_extra,
            payload: &payload,
            options: &[],
            compression_type: 1,
            compress_wire: true,
        });
        let event_bytes = build_event(&[msg]);
        let declared_properties_size = MPA_HEADER_LEN + properties_extra.len();

        // OnlyOldFormatProperties: legacy format bit forces decompression.
        {
            let segs = [event_bytes.as_slice()];
            let chain = Chain::new(&segs);
            let (event_header, _) = EventHeader::decode(chain.cursor()).unwrap();
            let mut iter = PutMessageIterator::new(
                DecompressPolicy::OnlyOldFormatProperties,
                compression::DEFAULT_MAX_DECOMPRESSED_SIZE,
            );
            iter.reset(chain, event_header, None).unwrap();
            assert_eq!(iter.advance().unwrap(), Advance::HasMessage);
            assert!(iter.has_message_properties());
            assert_eq!(iter.message_properties_size(), declared_properties_size);

            let mut props = vec![0u8; declared_properties_size];
            iter.load_message_properties(&mut props).unwrap();
            assert_eq!(props[0], 0x00);
            assert_eq!(&props[MPA_HEADER_LEN..], properties_extra.as_slice());

            let mut pl = vec![0u8; payload.len()];
            iter.load_message_payload(&mut pl).unwrap();
            assert_eq!(pl, payload);
            assert_eq!(iter.header().unwrap().compression_type, 0);
        }

        // None: wire bytes stay compressed; the declared (logical) properties
        // size is still reported, but no content equality is expected since
        // the raw bytes were never decompressed.
        {
            let segs = [event_bytes.as_slice()];
            let chain = Chain::new(&segs);
            let (event_header, _) = EventHeader::decode(chain.cursor()).unwrap();
            let mut iter =
                PutMessageIterator::new(DecompressPolicy::None, compression::DEFAULT_MAX_DECOMPRESSED_SIZE);
            iter.reset(chain, event_header, None).unwrap();
            assert_eq!(iter.advance().unwrap(), Advance::HasMessage);
            assert_eq!(iter.message_properties_size(), declared_properties_size);
            assert_eq!(iter.header().unwrap().compression_type, 1);
            // Must not panic even though the declared logical size may
            // exceed the still-compressed raw application data size.
            let _ = iter.message_payload_size();
        }
    }

    #[test]
    fn corrupt_total_length_invalidates_iterator_without_panicking() {
        let payload = b"payload".to_vec();
        let msg = build_message(&no_options_no_properties(&payload));
        let mut event_bytes = build_event(&[msg]);

        let ph_offset = header::EVENT_HEADER_LEN;
        BigEndian::write_u32(&mut event_bytes[ph_offset + 8..ph_offset + 12], 0xFFFF);

        let segs = [event_bytes.as_slice()];
        let chain = Chain::new(&segs);
        let (event_header, _) = EventHeader::decode(chain.cursor()).unwrap();
        let mut iter = PutMessageIterator::new(DecompressPolicy::None, compression::DEFAULT_MAX_DECOMPRESSED_SIZE);
        iter.reset(chain, event_header, None).unwrap();

        let err = iter.advance().unwrap_err();
        assert_eq!(err, Error::TruncatedHeader);
        assert!(!iter.is_valid());
        assert_eq!(iter.advance().unwrap(), Advance::End);
    }

    #[test]
    fn message_lengths_sum_to_event_length() {
        let msg1 = build_message(&no_options_no_properties(b"one"));
        let msg2 = build_message(&no_options_no_properties(b"two-two-two"));
        let msg3 = build_message(&no_options_no_properties(b"three"));
        let event_bytes = build_event(&[msg1, msg2, msg3]);

        let segs = [event_bytes.as_slice()];
        let chain = Chain::new(&segs);
        let (event_header, _) = EventHeader::decode(chain.cursor()).unwrap();
        let mut iter = PutMessageIterator::new(DecompressPolicy::None, compression::DEFAULT_MAX_DECOMPRESSED_SIZE);
        iter.reset(chain, event_header, None).unwrap();

        let mut consumed = 0usize;
        let mut count = 0;
        loop {
            match iter.advance().unwrap() {
                Advance::End => break,
                Advance::HasMessage => {
                    consumed += iter.header().unwrap().total_len();
                    count += 1;
                }
            }
        }
        assert_eq!(count, 3);
        assert_eq!(consumed, event_bytes.len() - header::EVENT_HEADER_LEN);
    }

    #[test]
    fn clear_then_reset_is_idempotent() {
        let payload = b"idempotent-payload".to_vec();
        let msg = build_message(&no_options_no_properties(&payload));
        let event_bytes = build_event(&[msg]);

        let segs = [event_bytes.as_slice()];
        let chain = Chain::new(&segs);
        let (event_header, _) = EventHeader::decode(chain.cursor()).unwrap();
        let mut iter = PutMessageIterator::new(DecompressPolicy::None, compression::DEFAULT_MAX_DECOMPRESSED_SIZE);
        iter.reset(chain, event_header, None).unwrap();
        assert_eq!(iter.advance().unwrap(), Advance::HasMessage);
        let first_size = iter.application_data_size();

        iter.clear();
        assert!(!iter.is_valid());
        assert_eq!(iter.advance().unwrap(), Advance::End);

        iter.reset(chain, event_header, None).unwrap();
        assert_eq!(iter.advance().unwrap(), Advance::HasMessage);
        assert_eq!(iter.application_data_size(), first_size);
    }

    #[test]
    fn options_presence_is_mutually_consistent() {
        let options = encode_option(9, b"abcd");
        let with_options = build_message(&MessageSpec {
            options: &options,
            ..no_options_no_properties(b"payload")
        });
        let without_options = build_message(&no_options_no_properties(b"payload"));

        for (msg, expect_options) in [(with_options, true), (without_options, false)] {
            let event_bytes = build_event(&[msg]);
            let segs = [event_bytes.as_slice()];
            let chain = Chain::new(&segs);
            let (event_header, _) = EventHeader::decode(chain.cursor()).unwrap();
            let mut iter =
                PutMessageIterator::new(DecompressPolicy::None, compression::DEFAULT_MAX_DECOMPRESSED_SIZE);
            iter.reset(chain, event_header, None).unwrap();
            assert_eq!(iter.advance().unwrap(), Advance::HasMessage);

            assert_eq!(iter.has_options(), expect_options);
            assert_eq!(iter.options_size() > 0, expect_options);
            assert_eq!(!iter.options_view().unwrap().is_empty(), expect_options);
        }
    }

    #[test]
    fn reset_rebind_inherits_cached_state_across_independent_buffers() {
        let payload = b"rebind-payload".to_vec();
        let msg = build_message(&no_options_no_properties(&payload));
        let bytes_a = build_event(&[msg.clone()]);
        let bytes_b = bytes_a.clone();

        let segs_a = [bytes_a.as_slice()];
        let chain_a = Chain::new(&segs_a);
        let (event_header_a, _) = EventHeader::decode(chain_a.cursor()).unwrap();
        let mut primary = PutMessageIterator::new(DecompressPolicy::None, compression::DEFAULT_MAX_DECOMPRESSED_SIZE);
        primary.reset(chain_a, event_header_a, None).unwrap();
        assert_eq!(primary.advance().unwrap(), Advance::HasMessage);

        let segs_b = [bytes_b.as_slice()];
        let chain_b = Chain::new(&segs_b);
        let mut secondary = PutMessageIterator::new(DecompressPolicy::None, compression::DEFAULT_MAX_DECOMPRESSED_SIZE);
        secondary.reset_rebind(chain_b, &primary).unwrap();

        assert!(secondary.is_valid());
        assert_eq!(secondary.application_data_size(), primary.application_data_size());
        let mut out = vec![0u8; payload.len()];
        secondary.load_application_data(&mut out).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn payload_round_trips_through_a_segment_seam() {
        let payload = b"seam-crossing-payload-bytes".to_vec();
        let msg = build_message(&no_options_no_properties(&payload));
        let event_bytes = build_event(&[msg]);

        // Split the event arbitrarily mid-message to exercise the chain's
        // gather-copy path rather than the common single-segment case.
        let midpoint = event_bytes.len() / 2;
        let (first, second) = event_bytes.split_at(midpoint);
        let segs = [first, second];
        let chain = Chain::new(&segs);
        let (event_header, _) = EventHeader::decode(chain.cursor()).unwrap();
        let mut iter = PutMessageIterator::new(DecompressPolicy::None, compression::DEFAULT_MAX_DECOMPRESSED_SIZE);
        iter.reset(chain, event_header, None).unwrap();

        assert_eq!(iter.advance().unwrap(), Advance::HasMessage);
        let mut out = vec![0u8; payload.len()];
        iter.load_application_data(&mut out).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn msg_group_id_round_trips_across_a_segment_seam_in_the_options_area() {
        let group_id = b"g1".to_vec();
        let options = encode_option(1, &group_id);
        let msg = build_message(&MessageSpec {
            options: &options,
            ..no_options_no_properties(b"payload")
        });
        let event_bytes = build_event(&[msg]);

        // The options area starts right after the first message's PUT
        // header; split inside it so the requested options range itself
        // straddles a chain segment seam, forcing `OptionsView` to wrap a
        // gather-copied (`View::Owned`) range instead of a borrowed one.
        let options_offset = header::EVENT_HEADER_LEN + header::PUT_HEADER_LEN;
        let split_at = options_offset + options.len() / 2;
        let (first, second) = event_bytes.split_at(split_at);
        let segs = [first, second];
        let chain = Chain::new(&segs);
        let (event_header, _) = EventHeader::decode(chain.cursor()).unwrap();
        let mut iter = PutMessageIterator::new(DecompressPolicy::None, compression::DEFAULT_MAX_DECOMPRESSED_SIZE);
        iter.reset(chain, event_header, None).unwrap();

        assert_eq!(iter.advance().unwrap(), Advance::HasMessage);
        assert!(iter.has_options());
        assert!(iter.has_msg_group_id().unwrap());
        let id = iter.extract_msg_group_id().unwrap().unwrap();
        assert_eq!(id.as_bytes(), group_id.as_slice());
    }

    #[test]
    fn bolero_single_message_payload_round_trips_for_arbitrary_bytes() {
        bolero::check!()
            .with_type()
            .for_each(|payload: &Vec<u8>| {
                if payload.len() > 4096 {
                    return;
                }
                let msg = build_message(&no_options_no_properties(payload));
                let event_bytes = build_event(&[msg]);
                let segs = [event_bytes.as_slice()];
                let chain = Chain::new(&segs);
                let (event_header, _) = EventHeader::decode(chain.cursor()).unwrap();
                let mut iter =
                    PutMessageIterator::new(DecompressPolicy::None, compression::DEFAULT_MAX_DECOMPRESSED_SIZE);
                iter.reset(chain, event_header, None).unwrap();

                assert_eq!(iter.advance().unwrap(), Advance::HasMessage);
                assert_eq!(iter.application_data_size(), payload.len());
                let mut out = vec![0u8; payload.len()];
                iter.load_application_data(&mut out).unwrap();
                assert_eq!(&out, payload);
                assert_eq!(iter.advance().unwrap(), Advance::End);
            });
    }
}
