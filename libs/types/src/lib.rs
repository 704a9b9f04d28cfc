//! # Arthur Types - Pure Data Structures
//!
//! ## Purpose
//!
//! This crate contains the "Data" layer of the Arthur codec: the logical
//! message structures crossing the API boundary and the decimal ↔ integer
//! conversion helpers they depend on. No protocol logic lives here.
//!
//! ## Architecture Role
//!
//! ```text
//! arthur-types → arthur-codec → byte streams
//!     ↑               ↓              ↓
//! Pure Data      Protocol Rules   Transport
//! Structures     Framing/Codecs   Sink/Source
//! ```
//!
//! ## What This Crate Contains
//! - `BookSnapshot`, `BookDiff`, `Trade`, `Disconnect` and the `Message` sum type
//! - `SnapshotDelay`, the deferred snapshot supplier used for overflow recovery
//! - Exact decimal ↔ tick/lot conversions and width calculations
//!
//! ## What This Crate Does NOT Contain
//! - Frame layout, bit packing, or stream state (belongs in arthur-codec)
//! - Transport or storage logic

pub mod decimal;
pub mod messages;

pub use decimal::{
    dec_to_ints, ints_to_dec, max_price_bits, max_qty_bits, to_lots, to_ticks, PrecisionError,
};
pub use messages::{
    BookDiff, BookSnapshot, Disconnect, Message, PriceLevel, SnapshotDelay, Trade, TradeId,
};
