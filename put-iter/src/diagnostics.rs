// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! `dumpBlob` and optional lifecycle tracing.
//!
//! Tracing is feature-gated (`tracing`), grounded in `s2n-quic-core`'s own
//! optional `*-tracing` feature flags: a library component has no business
//! emitting log lines unless its caller opted in.

use wire_codec::Chain;

/// Emit a bounded hex dump of the first `max_bytes` of `chain`, for
/// diagnostics when an iterator has gone `Invalid` and a caller wants to
/// understand why.
pub fn dump_blob(chain: &Chain<'_>, out: &mut dyn core::fmt::Write, max_bytes: usize) -> core::fmt::Result {
    let mut remaining = max_bytes.min(chain.len());
    let mut cursor = chain.cursor();
    let mut offset = 0usize;

    while remaining > 0 {
        let take = remaining.min(16);
        let (view, next) = match cursor.range(take) {
            Ok(pair) => pair,
            Err(_) => break,
        };

        write!(out, "{offset:08x}  ")?;
        for byte in view.as_slice() {
            write!(out, "{byte:02x} ")?;
        }
        writeln!(out)?;

        offset += take;
        remaining -= take;
        cursor = next;
    }

    Ok(())
}

#[cfg(feature = "tracing")]
macro_rules! trace_event {
    ($($tt:tt)*) => {
        tracing::trace!($($tt)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_event {
    ($($tt:tt)*) => {};
}

/// Like [`trace_event!`], at `tracing::debug!` level -- used on the
/// `reset`/`advance`/decompression failure paths so a caller who enables
/// the `tracing` feature sees why an iterator went `Invalid` without
/// reaching for `dump_blob` first.
#[cfg(feature = "tracing")]
macro_rules! debug_event {
    ($($tt:tt)*) => {
        tracing::debug!($($tt)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! debug_event {
    ($($tt:tt)*) => {};
}

pub(crate) use debug_event;
pub(crate) use trace_event;
