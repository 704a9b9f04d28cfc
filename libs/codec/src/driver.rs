//! # Serialization Driver - Message Dispatch and Context State Machine
//!
//! ## Purpose
//!
//! Maps each logical message to zero, one, or two frames and keeps the
//! serialization context in lock-step with the bytes on the wire. This is
//! where the timestamp-reset rule and the overflow recovery protocol live.
//!
//! ## Write Path
//!
//! ```text
//! message ──► [TIMESTAMP frame?] ──► encode payload ──► message frame
//!                                         │
//!                                     overflow?
//!                                         ▼
//!                          resolve snapshot_delay ──► SNAPSHOT frame
//!                                                        │
//!                                           (trades only) ▼
//!                                                    retry TRADE frame
//! ```
//!
//! A diff whose price or quantity overflows is *replaced* by the resolved
//! snapshot — the snapshot already reflects the state change — while an
//! overflowing trade is re-emitted after the snapshot under the widened
//! widths. Every payload a message needs — recovery snapshot and trade
//! retry included — is fully encoded before any byte goes out, and the
//! timestamp-reset frame is only committed alongside the frames it
//! covers: a failed write leaves both the stream and the context exactly
//! as they were.
//!
//! ## Writer State Machine
//!
//! ```text
//! Uninitialized ──first TIMESTAMP──► Timed ──first SNAPSHOT──► Ready
//! ```
//!
//! Disconnects need only Timed (the driver emits the TIMESTAMP itself);
//! diffs and trades need Ready and reach it on a fresh stream through
//! their `snapshot_delay`, or fail with `MissingSnapshot`.

use std::io::{Read, Write};

use rust_decimal::Decimal;
use tracing::{debug, warn};

use arthur_types::{BookDiff, BookSnapshot, Disconnect, Message, SnapshotDelay, Trade};

use crate::context::Context;
use crate::error::{ArthurError, ArthurResult};
use crate::frame::{
    decode_timestamp, read_frame, write_frame, write_timestamp_frame, FrameKind,
};
use crate::level::{decode_diff, decode_removal, encode_diff, encode_removal};
use crate::snapshot::{decode_snapshot, encode_snapshot, SnapshotEncoding};
use crate::trade::{decode_trade, encode_trade};

/// Placeholder body of a DISCONNECT frame (payload length must be ≥ 1).
const DISCONNECT_BODY: u8 = 0;

/// Serialize one message, frames included, onto `sink`.
pub fn write_message<W: Write>(
    context: &mut Context,
    sink: &mut W,
    message: Message,
) -> ArthurResult<()> {
    match message {
        Message::Snapshot(snapshot) => {
            let (reset, ts_off) = plan_timestamp(context, snapshot.timestamp);
            let encoding = encode_snapshot(&snapshot, Decimal::ZERO, Decimal::ZERO)?;
            commit_timestamp(context, sink, reset)?;
            emit_snapshot(context, sink, encoding, ts_off)
        }
        Message::Diff(diff) => write_diff(context, sink, diff),
        Message::Trade(trade) => write_trade(context, sink, trade),
        Message::Disconnect(disconnect) => {
            let (reset, ts_off) = plan_timestamp(context, disconnect.timestamp);
            commit_timestamp(context, sink, reset)?;
            write_frame(sink, FrameKind::Disconnect, ts_off, &[DISCONNECT_BODY])
        }
    }
}

/// Offset of `ts` under the current reference, plus the new reference to
/// establish first when the offset cannot carry it. Pure planning: the
/// TIMESTAMP frame is only written by [`commit_timestamp`], after the
/// message's payloads have all encoded.
fn plan_timestamp(context: &Context, ts: u64) -> (Option<u64>, u16) {
    match context.timestamp {
        Some(base) if ts >= base && ts - base <= u64::from(u16::MAX) => {
            (None, (ts - base) as u16)
        }
        _ => (Some(ts), 0),
    }
}

/// Emit the planned TIMESTAMP frame, if any, and advance the reference.
fn commit_timestamp<W: Write>(
    context: &mut Context,
    sink: &mut W,
    reset: Option<u64>,
) -> ArthurResult<()> {
    if let Some(ts) = reset {
        debug!(ts, "timestamp reset frame");
        write_timestamp_frame(sink, ts)?;
        context.timestamp = Some(ts);
    }
    Ok(())
}

/// Emit an already-encoded snapshot frame and install its widths as the
/// new context.
fn emit_snapshot<W: Write>(
    context: &mut Context,
    sink: &mut W,
    encoding: SnapshotEncoding,
    ts_off: u16,
) -> ArthurResult<()> {
    write_frame(sink, FrameKind::Snapshot, ts_off, &encoding.payload)?;
    debug!(
        pbits = encoding.params.pbits,
        qbits = encoding.params.qbits,
        "snapshot established new field widths"
    );
    context.book = Some(encoding.params);
    Ok(())
}

fn write_diff<W: Write>(context: &mut Context, sink: &mut W, diff: BookDiff) -> ArthurResult<()> {
    let (reset, ts_off) = plan_timestamp(context, diff.timestamp);
    let removal = diff.qty.is_zero();
    let encoded = match &context.book {
        Some(params) if removal => encode_removal(params, diff.price),
        Some(params) => encode_diff(params, diff.price, diff.qty),
        None => Err(ArthurError::NotReady),
    };
    match encoded {
        Ok(payload) => {
            commit_timestamp(context, sink, reset)?;
            write_frame(sink, FrameKind::for_level(diff.is_bid, removal), ts_off, &payload)
        }
        Err(err) if err.is_recoverable_overflow() => {
            warn!(%err, "diff does not fit current widths, writing in-line snapshot instead");
            let snapshot = resolve_delay(diff.snapshot_delay)?;
            let encoding = encode_snapshot(&snapshot, diff.price, diff.qty)?;
            commit_timestamp(context, sink, reset)?;
            // The snapshot already reflects this level change, so the diff
            // itself is dropped from the stream.
            emit_snapshot(context, sink, encoding, ts_off)
        }
        Err(err) => Err(err),
    }
}

fn write_trade<W: Write>(context: &mut Context, sink: &mut W, mut trade: Trade) -> ArthurResult<()> {
    let (reset, ts_off) = plan_timestamp(context, trade.timestamp);
    let encoded = match &context.book {
        Some(params) => encode_trade(params, &trade),
        None => Err(ArthurError::NotReady),
    };
    match encoded {
        Ok(payload) => {
            commit_timestamp(context, sink, reset)?;
            write_frame(sink, FrameKind::Trade, ts_off, &payload)
        }
        Err(err) if err.is_recoverable_overflow() => {
            warn!(%err, "trade does not fit current widths, writing in-line snapshot first");
            let snapshot = resolve_delay(trade.snapshot_delay.take())?;
            let encoding = encode_snapshot(&snapshot, trade.price, trade.qty)?;
            // Unlike a diff, the trade carries information the snapshot
            // does not; re-encode it under the widened widths before
            // anything reaches the sink.
            let payload = encode_trade(&encoding.params, &trade)?;
            commit_timestamp(context, sink, reset)?;
            emit_snapshot(context, sink, encoding, ts_off)?;
            write_frame(sink, FrameKind::Trade, ts_off, &payload)
        }
        Err(err) => Err(err),
    }
}

fn resolve_delay(delay: Option<SnapshotDelay>) -> ArthurResult<BookSnapshot> {
    delay
        .map(SnapshotDelay::resolve)
        .ok_or(ArthurError::MissingSnapshot)
}

/// Decode the next logical message from `source`, consuming TIMESTAMP
/// frames along the way. `None` means a clean end of stream.
pub fn read_message<R: Read>(
    context: &mut Context,
    source: &mut R,
) -> ArthurResult<Option<Message>> {
    loop {
        let Some(frame) = read_frame(source)? else {
            return Ok(None);
        };
        let kind = frame.header.kind;
        let ts_off = u64::from(frame.header.ts_off);

        match kind {
            FrameKind::Timestamp => {
                let ts = decode_timestamp(&frame.payload)?;
                debug!(ts, "timestamp reset");
                context.timestamp = Some(ts);
            }
            FrameKind::Snapshot => {
                // Legacy streams may open with a snapshot; its offset then
                // counts from zero.
                let base = *context.timestamp.get_or_insert(0);
                let (mut snapshot, params) = decode_snapshot(&frame.payload)?;
                snapshot.timestamp = base + ts_off;
                debug!(
                    pbits = params.pbits,
                    qbits = params.qbits,
                    "snapshot re-established field widths"
                );
                context.book = Some(params);
                return Ok(Some(Message::Snapshot(snapshot)));
            }
            FrameKind::Disconnect => {
                let Some(base) = context.timestamp else {
                    return Err(before_timestamp(kind));
                };
                return Ok(Some(Message::Disconnect(Disconnect::new(base + ts_off))));
            }
            FrameKind::Trade => {
                let Some(base) = context.timestamp else {
                    return Err(before_timestamp(kind));
                };
                let Some(params) = &context.book else {
                    return Err(before_snapshot(kind));
                };
                let decoded = decode_trade(params, &frame.payload)?;
                return Ok(Some(Message::Trade(Trade::new(
                    decoded.price,
                    decoded.qty,
                    decoded.maker_is_bid,
                    decoded.tid,
                    base + ts_off,
                ))));
            }
            FrameKind::AskDiff | FrameKind::AskRemoval | FrameKind::BidDiff
            | FrameKind::BidRemoval => {
                let Some(base) = context.timestamp else {
                    return Err(before_timestamp(kind));
                };
                let Some(params) = &context.book else {
                    return Err(before_snapshot(kind));
                };
                let is_bid = matches!(kind, FrameKind::BidDiff | FrameKind::BidRemoval);
                let (price, qty) = match kind {
                    FrameKind::AskRemoval | FrameKind::BidRemoval => {
                        (decode_removal(params, &frame.payload)?, Decimal::ZERO)
                    }
                    _ => decode_diff(params, &frame.payload)?,
                };
                return Ok(Some(Message::Diff(BookDiff::new(
                    price,
                    qty,
                    is_bid,
                    base + ts_off,
                ))));
            }
        }
    }
}

fn before_timestamp(kind: FrameKind) -> ArthurError {
    ArthurError::corrupt(
        "frame sequencing",
        format!("{} frame before any timestamp reference", kind.name()),
    )
}

fn before_snapshot(kind: FrameKind) -> ArthurError {
    ArthurError::corrupt(
        "frame sequencing",
        format!("{} frame before any snapshot established field widths", kind.name()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use arthur_types::PriceLevel;
    use rust_decimal_macros::dec;
    use std::io::Cursor;

    const T: u64 = 1_700_000_000_000;

    fn snapshot(ts: u64) -> BookSnapshot {
        BookSnapshot::new(
            vec![PriceLevel::new(dec!(100000.52), dec!(20.5))],
            vec![PriceLevel::new(dec!(102000.52), dec!(1.25))],
            ts,
            dec!(0.01),
            dec!(0.000001),
        )
    }

    fn write_all(messages: Vec<Message>) -> Vec<u8> {
        let mut context = Context::new();
        let mut sink = Vec::new();
        for message in messages {
            write_message(&mut context, &mut sink, message).unwrap();
        }
        sink
    }

    fn read_all(bytes: &[u8]) -> Vec<Message> {
        let mut context = Context::new();
        let mut source = Cursor::new(bytes);
        let mut out = Vec::new();
        while let Some(message) = read_message(&mut context, &mut source).unwrap() {
            out.push(message);
        }
        out
    }

    #[test]
    fn test_first_message_emits_timestamp_frame() {
        let bytes = write_all(vec![snapshot(T).into()]);
        // 4-byte TIMESTAMP header + 8-byte payload, then the snapshot frame.
        assert_eq!(bytes[0], 8); // kind 0, compact length 8
        let messages = read_all(&bytes);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].timestamp(), T);
    }

    #[test]
    fn test_large_gap_forces_new_reference() {
        let bytes = write_all(vec![
            snapshot(T).into(),
            Disconnect::new(T + 65_535).into(),
            Disconnect::new(T + 65_536).into(),
        ]);
        let timestamp_frames = bytes_kind_count(&bytes, FrameKind::Timestamp);
        assert_eq!(timestamp_frames, 2);
        let messages = read_all(&bytes);
        assert_eq!(messages[1].timestamp(), T + 65_535);
        assert_eq!(messages[2].timestamp(), T + 65_536);
    }

    #[test]
    fn test_backwards_timestamp_forces_new_reference() {
        let bytes = write_all(vec![
            snapshot(T).into(),
            Disconnect::new(T - 1).into(),
        ]);
        assert_eq!(bytes_kind_count(&bytes, FrameKind::Timestamp), 2);
        let messages = read_all(&bytes);
        assert_eq!(messages[1].timestamp(), T - 1);
    }

    #[test]
    fn test_data_frame_before_snapshot_is_corrupt_on_read() {
        let mut sink = Vec::new();
        crate::frame::write_timestamp_frame(&mut sink, T).unwrap();
        crate::frame::write_frame(&mut sink, FrameKind::Trade, 0, &[0; 8]).unwrap();
        let mut context = Context::new();
        let err = read_message(&mut context, &mut Cursor::new(&sink)).unwrap_err();
        assert!(matches!(err, ArthurError::CorruptStream { .. }));
    }

    #[test]
    fn test_data_frame_before_timestamp_is_corrupt_on_read() {
        let mut sink = Vec::new();
        crate::frame::write_frame(&mut sink, FrameKind::Disconnect, 0, &[0]).unwrap();
        let mut context = Context::new();
        let err = read_message(&mut context, &mut Cursor::new(&sink)).unwrap_err();
        assert!(matches!(err, ArthurError::CorruptStream { .. }));
    }

    #[test]
    fn test_failed_precision_write_leaves_stream_and_context_untouched() {
        let mut context = Context::new();
        let mut sink = Vec::new();
        write_message(&mut context, &mut sink, snapshot(T).into()).unwrap();
        let sink_before = sink.clone();
        let context_before = context.clone();

        // Needs a fresh reference frame (gap > 65535) and then fails with a
        // price off the tick grid; the planned TIMESTAMP frame must not
        // reach the sink.
        let diff = BookDiff::new(dec!(100.005), dec!(1), true, T + 100_000);
        let err = write_message(&mut context, &mut sink, diff.into()).unwrap_err();
        assert!(matches!(err, ArthurError::Precision(_)));
        assert_eq!(sink, sink_before);
        assert_eq!(context, context_before);
    }

    #[test]
    fn test_missing_snapshot_after_gap_writes_nothing() {
        let mut context = Context::new();
        let mut sink = Vec::new();
        write_message(&mut context, &mut sink, snapshot(T).into()).unwrap();
        let sink_before = sink.clone();
        let context_before = context.clone();

        // Overflows the 24-bit price field with no delay to resolve, across
        // a gap that would have needed a new reference frame.
        let diff = BookDiff::new(dec!(100000000000), dec!(1), false, T + 100_000);
        let err = write_message(&mut context, &mut sink, diff.into()).unwrap_err();
        assert!(matches!(err, ArthurError::MissingSnapshot));
        assert_eq!(sink, sink_before);
        assert_eq!(context, context_before);
    }

    #[test]
    fn test_failed_trade_write_leaves_stream_and_context_untouched() {
        let mut context = Context::new();
        let mut sink = Vec::new();
        write_message(&mut context, &mut sink, snapshot(T).into()).unwrap();
        let sink_before = sink.clone();
        let context_before = context.clone();

        let trade = Trade::new(dec!(100.005), dec!(0.52), true, 1u64, T + 100_000);
        let err = write_message(&mut context, &mut sink, trade.into()).unwrap_err();
        assert!(matches!(err, ArthurError::Precision(_)));
        assert_eq!(sink, sink_before);
        assert_eq!(context, context_before);
    }

    #[test]
    fn test_legacy_snapshot_first_stream_is_tolerated() {
        let encoding = encode_snapshot(&snapshot(0), Decimal::ZERO, Decimal::ZERO).unwrap();
        let mut sink = Vec::new();
        crate::frame::write_frame(&mut sink, FrameKind::Snapshot, 0, &encoding.payload).unwrap();
        let messages = read_all(&sink);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].timestamp(), 0);
    }

    fn bytes_kind_count(bytes: &[u8], kind: FrameKind) -> usize {
        let mut cursor = Cursor::new(bytes);
        let mut count = 0;
        while let Some(header) = crate::frame::read_frame_header(&mut cursor).unwrap() {
            crate::frame::skip_payload(&mut cursor, header.payload_len).unwrap();
            if header.kind == kind {
                count += 1;
            }
        }
        count
    }
}
