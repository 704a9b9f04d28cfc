//! Codec-level errors for the Arthur stream protocol
//!
//! One unified error type covers both endpoints. Only [`ArthurError::Overflow`]
//! and [`ArthurError::NotReady`] are ever handled internally (the driver
//! converts them into an in-line snapshot for diffs and trades); every other
//! variant propagates to the caller unchanged.

use arthur_types::PrecisionError;
use thiserror::Error;

/// Result type for codec operations.
pub type ArthurResult<T> = std::result::Result<T, ArthurError>;

#[derive(Debug, Error)]
pub enum ArthurError {
    /// A price or quantity is inconsistent with the tick/lot sizes in force.
    /// Fatal for that message; the stream itself remains usable.
    #[error(transparent)]
    Precision(#[from] PrecisionError),

    /// A tick or lot count does not fit the bit width established by the
    /// most recent snapshot. Caught by the driver for diffs and trades,
    /// which recover by writing an in-line snapshot.
    #[error("{field} needs {bits} bits but the current context allows {width}")]
    Overflow {
        field: &'static str,
        bits: u64,
        width: u64,
    },

    /// A diff or trade arrived before any snapshot established field widths.
    /// Handled like an overflow: resolved through `snapshot_delay`.
    #[error("no field widths established yet; a snapshot must precede book data")]
    NotReady,

    /// Overflow occurred but the message carried no `snapshot_delay` to
    /// resolve into a recovery snapshot.
    #[error("field widths overflowed and no snapshot_delay was supplied")]
    MissingSnapshot,

    /// A snapshot holds more levels than the 16-bit count field can carry.
    #[error("snapshot has {count} levels, limit 65535")]
    TooManyLevels { count: usize },

    /// Operation on a closed writer or reader.
    #[error("stream is closed")]
    StreamClosed,

    /// The byte stream violates the wire format. Unusable past this point.
    #[error("corrupt stream while reading {context}: {detail}")]
    CorruptStream {
        context: &'static str,
        detail: String,
    },

    /// Underlying sink/source failure, surfaced unchanged. A clean EOF at a
    /// frame boundary is end-of-stream, not an error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ArthurError {
    pub fn overflow(field: &'static str, bits: u64, width: u64) -> Self {
        Self::Overflow { field, bits, width }
    }

    pub fn corrupt(context: &'static str, detail: impl Into<String>) -> Self {
        Self::CorruptStream {
            context,
            detail: detail.into(),
        }
    }

    /// True for the conditions the driver may repair with an in-line snapshot.
    pub fn is_recoverable_overflow(&self) -> bool {
        matches!(self, Self::Overflow { .. } | Self::NotReady)
    }
}
