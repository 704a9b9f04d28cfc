//! Logical message structures for the Arthur codec
//!
//! These are the shapes crossing the API boundary: a writer consumes them,
//! a reader yields them back. Prices and quantities are exact decimals;
//! every price must be an integer multiple of the book's tick size and
//! every quantity of its lot size.

use std::fmt;

use num_bigint::BigUint;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One aggregated price level: a price and the total resting quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub qty: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, qty: Decimal) -> Self {
        Self { price, qty }
    }
}

/// Complete view of the book at a moment.
///
/// Writing a snapshot establishes the tick/lot sizes and the bit widths
/// every following diff, removal, and trade is encoded against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub tick_size: Decimal,
    pub lot_size: Decimal,
    /// True when the snapshot carries no new information relative to a
    /// reader-reconstructed book and exists only so readers can verify
    /// their own state against it.
    pub redundant: bool,
}

impl BookSnapshot {
    pub fn new(
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
        timestamp: u64,
        tick_size: Decimal,
        lot_size: Decimal,
    ) -> Self {
        Self {
            bids,
            asks,
            timestamp,
            tick_size,
            lot_size,
            redundant: false,
        }
    }
}

/// Deferred snapshot supplier, resolved at most once.
///
/// Diffs and trades carry one of these so the writer can fall back to an
/// in-line snapshot when a price or quantity no longer fits the bit widths
/// established by the previous snapshot.
pub struct SnapshotDelay(Box<dyn FnOnce() -> BookSnapshot + Send>);

impl SnapshotDelay {
    pub fn new(supplier: impl FnOnce() -> BookSnapshot + Send + 'static) -> Self {
        Self(Box::new(supplier))
    }

    /// Consume the delay and produce the snapshot.
    pub fn resolve(self) -> BookSnapshot {
        (self.0)()
    }
}

impl fmt::Debug for SnapshotDelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SnapshotDelay(..)")
    }
}

impl From<BookSnapshot> for SnapshotDelay {
    fn from(snapshot: BookSnapshot) -> Self {
        Self::new(move || snapshot)
    }
}

/// A single level update. `qty == 0` removes the level.
#[derive(Debug, Serialize, Deserialize)]
pub struct BookDiff {
    pub price: Decimal,
    pub qty: Decimal,
    pub is_bid: bool,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Input-only: supplies the snapshot written in place of this diff when
    /// its price or quantity overflows the current widths. Never compared,
    /// serialized, or recovered on read.
    #[serde(skip)]
    pub snapshot_delay: Option<SnapshotDelay>,
}

impl BookDiff {
    pub fn new(price: Decimal, qty: Decimal, is_bid: bool, timestamp: u64) -> Self {
        Self {
            price,
            qty,
            is_bid,
            timestamp,
            snapshot_delay: None,
        }
    }

    pub fn with_snapshot_delay(mut self, delay: impl Into<SnapshotDelay>) -> Self {
        self.snapshot_delay = Some(delay.into());
        self
    }
}

// snapshot_delay is input-only metadata and takes no part in equality.
impl PartialEq for BookDiff {
    fn eq(&self, other: &Self) -> bool {
        self.price == other.price
            && self.qty == other.qty
            && self.is_bid == other.is_bid
            && self.timestamp == other.timestamp
    }
}

/// Exchange-assigned trade identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeId {
    /// Integer id of any magnitude; serialized as minimal little-endian bytes.
    Numeric(BigUint),
    /// Opaque string id (UUIDs and the like); serialized as raw UTF-8.
    Text(String),
}

impl From<u64> for TradeId {
    fn from(id: u64) -> Self {
        Self::Numeric(BigUint::from(id))
    }
}

impl From<&str> for TradeId {
    fn from(id: &str) -> Self {
        Self::Text(id.to_owned())
    }
}

/// An executed trade.
#[derive(Debug, Serialize, Deserialize)]
pub struct Trade {
    pub price: Decimal,
    pub qty: Decimal,
    /// True when the resting (maker) order was a bid.
    pub maker_is_bid: bool,
    pub tid: TradeId,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Input-only; see [`BookDiff::snapshot_delay`].
    #[serde(skip)]
    pub snapshot_delay: Option<SnapshotDelay>,
}

impl Trade {
    pub fn new(
        price: Decimal,
        qty: Decimal,
        maker_is_bid: bool,
        tid: impl Into<TradeId>,
        timestamp: u64,
    ) -> Self {
        Self {
            price,
            qty,
            maker_is_bid,
            tid: tid.into(),
            timestamp,
            snapshot_delay: None,
        }
    }

    pub fn with_snapshot_delay(mut self, delay: impl Into<SnapshotDelay>) -> Self {
        self.snapshot_delay = Some(delay.into());
        self
    }
}

impl PartialEq for Trade {
    fn eq(&self, other: &Self) -> bool {
        self.price == other.price
            && self.qty == other.qty
            && self.maker_is_bid == other.maker_is_bid
            && self.tid == other.tid
            && self.timestamp == other.timestamp
    }
}

/// A marker that the upstream feed disconnected at this point in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disconnect {
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl Disconnect {
    pub fn new(timestamp: u64) -> Self {
        Self { timestamp }
    }
}

/// Tagged sum of every logical message the codec carries.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Snapshot(BookSnapshot),
    Diff(BookDiff),
    Trade(Trade),
    Disconnect(Disconnect),
}

impl Message {
    /// Event time of the message, milliseconds since the Unix epoch.
    pub fn timestamp(&self) -> u64 {
        match self {
            Message::Snapshot(m) => m.timestamp,
            Message::Diff(m) => m.timestamp,
            Message::Trade(m) => m.timestamp,
            Message::Disconnect(m) => m.timestamp,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Message::Snapshot(_) => "snapshot",
            Message::Diff(_) => "diff",
            Message::Trade(_) => "trade",
            Message::Disconnect(_) => "disconnect",
        }
    }
}

impl From<BookSnapshot> for Message {
    fn from(m: BookSnapshot) -> Self {
        Message::Snapshot(m)
    }
}

impl From<BookDiff> for Message {
    fn from(m: BookDiff) -> Self {
        Message::Diff(m)
    }
}

impl From<Trade> for Message {
    fn from(m: Trade) -> Self {
        Message::Trade(m)
    }
}

impl From<Disconnect> for Message {
    fn from(m: Disconnect) -> Self {
        Message::Disconnect(m)
    }
}
