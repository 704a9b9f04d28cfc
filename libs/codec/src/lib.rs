//! # Arthur Codec - Bit-Packed L2 Order-Book Serialization
//!
//! ## Purpose
//!
//! A compact, seekable binary format for Level-2 order-book market data:
//! periodic full snapshots, per-level diffs and removals, trades, and
//! disconnect markers. Field widths adapt to live book state on the bit
//! rather than the byte level, and every message travels in a
//! self-delimiting frame so a scanner can skip whole messages without
//! decoding their bodies.
//!
//! ## Architecture Role
//!
//! ```text
//! arthur-types ──► [arthur-codec] ──► byte sink / source
//!      ↑                 ↓                   ↓
//!  Pure Data        Protocol Rules       Transport
//!  Structures       Frames + Codecs      (out of scope)
//! ```
//!
//! ## What This Crate Contains
//! - Bit packer for dynamic-width field groups (`bitpack`)
//! - The frame envelope and the TIMESTAMP reference frames (`frame`)
//! - Snapshot, diff/removal, and trade codecs (`snapshot`, `level`, `trade`)
//! - The serialization driver: dispatch, timestamp resets, overflow
//!   recovery via in-line snapshots (`driver`)
//! - `Writer`/`Reader` stream endpoints (`stream`)
//!
//! ## What This Crate Does NOT Contain
//! - Transport or storage (any `io::Write`/`io::Read` pair suffices)
//! - An order-book data structure; callers keep their own book
//!
//! ## Usage
//!
//! ```
//! use arthur_codec::{Reader, Writer};
//! use arthur_types::{BookDiff, BookSnapshot, PriceLevel};
//! use rust_decimal_macros::dec;
//!
//! let mut writer = Writer::new(Vec::new());
//! writer.write(BookSnapshot::new(
//!     vec![PriceLevel::new(dec!(100.25), dec!(3.5))],
//!     vec![PriceLevel::new(dec!(100.50), dec!(1.0))],
//!     1_700_000_000_000,
//!     dec!(0.01),
//!     dec!(0.1),
//! ))?;
//! writer.write(BookDiff::new(dec!(100.50), dec!(2.5), false, 1_700_000_000_100))?;
//! let bytes = writer.into_inner()?;
//!
//! let mut reader = Reader::new(std::io::Cursor::new(bytes));
//! while let Some(message) = reader.read()? {
//!     println!("{} @ {}", message.kind_name(), message.timestamp());
//! }
//! # Ok::<(), arthur_codec::ArthurError>(())
//! ```

pub mod bitpack;
pub mod context;
pub mod driver;
pub mod error;
pub mod frame;
pub mod level;
pub mod snapshot;
pub mod stream;
pub mod trade;

pub use context::{BookParams, Context};
pub use error::{ArthurError, ArthurResult};
pub use frame::{Frame, FrameHeader, FrameKind};
pub use snapshot::SnapshotHeader;
pub use stream::{Reader, Writer};
