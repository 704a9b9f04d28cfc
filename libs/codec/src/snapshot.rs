//! # Snapshot Codec - Full Book State and Width Negotiation
//!
//! ## Purpose
//!
//! Encodes a complete book as a fixed header plus one packed group per
//! level, and computes the bit widths every following diff, removal, and
//! trade on the stream is encoded against. The header carries those widths
//! explicitly, so the reader rebuilds the exact same context without any
//! side channel.
//!
//! ## Payload Layout
//!
//! **CRITICAL**: the fixed header is exactly 9 bytes with no padding; all
//! fields are single bytes except the big-endian level count.
//!
//! ```text
//! ┌───────────┬───────┬───────┬──────┬────────────┬─────┬───────────┬─────────────┐
//! │ redundant │ pbits │ qbits │ tick │ tick_scale │ lot │ lot_scale │ nlevels:u16 │
//! └───────────┴───────┴───────┴──────┴────────────┴─────┴───────────┴─────────────┘
//! ```
//!
//! Each level follows as `pack([ticks, side, lots], [pbits, 1, qbits])`,
//! bids first (side = 1), then asks (side = 0). The side bit reconstructs
//! membership on read, preserving per-side order.

use num_bigint::BigUint;
use num_traits::Zero;
use rust_decimal::Decimal;
use zerocopy::byteorder::{BigEndian, U16};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use arthur_types::{
    dec_to_ints, ints_to_dec, max_price_bits, max_qty_bits, to_lots, to_ticks, BookSnapshot,
    PriceLevel,
};

use crate::bitpack::{pack, unpack};
use crate::context::BookParams;
use crate::error::{ArthurError, ArthurResult};

/// Width used when a snapshot has no levels and no overflow floors pin the
/// fields down; covers every tick/lot count up to `2^64 - 1`, so a fresh
/// stream can carry data messages before the first populated snapshot.
const DEFAULT_FIELD_BITS: u64 = 64;

/// Fixed portion of a snapshot payload (9 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes)]
pub struct SnapshotHeader {
    /// 1 when the snapshot restates book state the reader already holds.
    pub redundant: u8,
    /// Bits per price field in the levels below and in every following
    /// diff, removal, and trade.
    pub pbits: u8,
    /// Bits per quantity field, with one bit of headroom over the largest
    /// current lot count.
    pub qbits: u8,
    pub tick: u8,
    pub tick_scale: i8,
    pub lot: u8,
    pub lot_scale: i8,
    /// Total level count, bids and asks together.
    pub nlevels: U16<BigEndian>,
}

impl SnapshotHeader {
    /// Header size in bytes.
    pub const SIZE: usize = 9;
}

/// A snapshot payload together with the context it establishes.
#[derive(Debug, Clone)]
pub struct SnapshotEncoding {
    pub payload: Vec<u8>,
    pub params: BookParams,
}

/// Encode a snapshot payload and compute the stream's new field widths.
///
/// `min_price`/`min_qty` are zero for a caller-written snapshot; on
/// overflow recovery the driver passes the in-flight message's values so
/// the new widths accommodate it.
pub fn encode_snapshot(
    snapshot: &BookSnapshot,
    min_price: Decimal,
    min_qty: Decimal,
) -> ArthurResult<SnapshotEncoding> {
    let (tick, tick_scale) = dec_to_ints(snapshot.tick_size)?;
    let (lot, lot_scale) = dec_to_ints(snapshot.lot_size)?;

    let levels = || snapshot.bids.iter().chain(snapshot.asks.iter());
    let min_ticks = to_ticks(min_price, snapshot.tick_size)?;
    let min_lots = to_lots(min_qty, snapshot.lot_size)?;
    let has_levels = levels().next().is_some();

    let mut pbits = min_ticks
        .bits()
        .max(max_price_bits(snapshot.tick_size, levels())?);
    let mut qbits = min_lots.bits().max(if has_levels {
        1 + max_qty_bits(snapshot.lot_size, levels())?
    } else {
        0
    });
    if pbits == 0 {
        pbits = DEFAULT_FIELD_BITS;
    }
    if qbits == 0 {
        qbits = DEFAULT_FIELD_BITS;
    }
    if pbits > u64::from(u8::MAX) {
        return Err(ArthurError::overflow("snapshot price width", pbits, u8::MAX.into()));
    }
    if qbits > u64::from(u8::MAX) {
        return Err(ArthurError::overflow("snapshot qty width", qbits, u8::MAX.into()));
    }

    let nlevels = snapshot.bids.len() + snapshot.asks.len();
    if nlevels > usize::from(u16::MAX) {
        return Err(ArthurError::TooManyLevels { count: nlevels });
    }

    let header = SnapshotHeader {
        redundant: snapshot.redundant.into(),
        pbits: pbits as u8,
        qbits: qbits as u8,
        tick,
        tick_scale,
        lot,
        lot_scale,
        nlevels: U16::new(nlevels as u16),
    };

    let params = BookParams {
        pbits: pbits as u8,
        qbits: qbits as u8,
        tick_size: snapshot.tick_size,
        lot_size: snapshot.lot_size,
    };

    let widths = [pbits as u32, 1, qbits as u32];
    let mut payload = Vec::with_capacity(SnapshotHeader::SIZE + nlevels * params.level_len());
    payload.extend_from_slice(header.as_bytes());
    for (side, side_levels) in [(1u8, &snapshot.bids), (0u8, &snapshot.asks)] {
        for level in side_levels {
            let ticks = to_ticks(level.price, snapshot.tick_size)?;
            let lots = to_lots(level.qty, snapshot.lot_size)?;
            let group = pack(&[ticks, BigUint::from(side), lots], &widths)?;
            payload.extend_from_slice(&group);
        }
    }

    Ok(SnapshotEncoding { payload, params })
}

/// Decode a snapshot payload. The returned snapshot's timestamp is zero;
/// the driver fills it in from the frame.
pub fn decode_snapshot(payload: &[u8]) -> ArthurResult<(BookSnapshot, BookParams)> {
    let header = SnapshotHeader::read_from_prefix(payload)
        .ok_or_else(|| ArthurError::corrupt("snapshot header", "payload shorter than fixed header"))?;
    if header.tick == 0 || header.lot == 0 {
        return Err(ArthurError::corrupt("snapshot header", "zero tick or lot mantissa"));
    }
    let tick_size = ints_to_dec(header.tick, header.tick_scale)
        .map_err(|err| ArthurError::corrupt("snapshot header", err.to_string()))?;
    let lot_size = ints_to_dec(header.lot, header.lot_scale)
        .map_err(|err| ArthurError::corrupt("snapshot header", err.to_string()))?;

    let params = BookParams {
        pbits: header.pbits,
        qbits: header.qbits,
        tick_size,
        lot_size,
    };

    let nlevels = usize::from(header.nlevels.get());
    let level_len = params.level_len();
    let body = &payload[SnapshotHeader::SIZE..];
    if body.len() != nlevels * level_len {
        return Err(ArthurError::corrupt(
            "snapshot levels",
            format!(
                "{} levels of {} bytes each do not fill {} payload bytes",
                nlevels,
                level_len,
                body.len()
            ),
        ));
    }

    let widths = [u32::from(header.pbits), 1, u32::from(header.qbits)];
    let mut bids = Vec::new();
    let mut asks = Vec::new();
    for group in body.chunks_exact(level_len) {
        let fields = unpack(group, &widths);
        let level = PriceLevel::new(
            params.price_from_ticks(&fields[0])?,
            params.qty_from_lots(&fields[2])?,
        );
        if fields[1].is_zero() {
            asks.push(level);
        } else {
            bids.push(level);
        }
    }

    let snapshot = BookSnapshot {
        bids,
        asks,
        timestamp: 0,
        tick_size,
        lot_size,
        redundant: header.redundant != 0,
    };
    Ok((snapshot, params))
}
