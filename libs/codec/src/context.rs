//! Serialization context shared by the two endpoints of one stream
//!
//! The context is the explicit state value every codec function receives.
//! It is rebuilt from the stream itself on read: only TIMESTAMP and
//! SNAPSHOT frames mutate it, so the writer's copy and the reader's copy
//! stay in lock-step without any side channel.

use num_bigint::BigUint;
use num_traits::ToPrimitive;
use rust_decimal::Decimal;

use arthur_types::{to_lots, to_ticks};

use crate::bitpack::packed_len;
use crate::error::{ArthurError, ArthurResult};

/// Field widths and scales established by the most recent snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookParams {
    /// Bits for a price expressed in integer ticks.
    pub pbits: u8,
    /// Bits for a quantity expressed in integer lots.
    pub qbits: u8,
    pub tick_size: Decimal,
    pub lot_size: Decimal,
}

impl BookParams {
    /// Bytes per packed snapshot level under these widths.
    pub fn level_len(&self) -> usize {
        packed_len(&[u32::from(self.pbits), 1, u32::from(self.qbits)])
    }

    /// Tick count for `price`, checked against `pbits`.
    pub fn price_ticks_checked(&self, price: Decimal) -> ArthurResult<BigUint> {
        let ticks = to_ticks(price, self.tick_size)?;
        if ticks.bits() > u64::from(self.pbits) {
            return Err(ArthurError::overflow(
                "price",
                ticks.bits(),
                u64::from(self.pbits),
            ));
        }
        Ok(ticks)
    }

    /// Lot count for `qty`. No width check: diff payloads size the lot
    /// field from the value itself.
    pub fn qty_lots(&self, qty: Decimal) -> ArthurResult<BigUint> {
        Ok(to_lots(qty, self.lot_size)?)
    }

    /// Lot count for `qty`, checked against `qbits` (trade payloads carry
    /// the quantity in a fixed-width field).
    pub fn qty_lots_checked(&self, qty: Decimal) -> ArthurResult<BigUint> {
        let lots = self.qty_lots(qty)?;
        if lots.bits() > u64::from(self.qbits) {
            return Err(ArthurError::overflow(
                "qty",
                lots.bits(),
                u64::from(self.qbits),
            ));
        }
        Ok(lots)
    }

    /// Rescale a decoded tick count back into a price.
    pub fn price_from_ticks(&self, ticks: &BigUint) -> ArthurResult<Decimal> {
        units_to_decimal(ticks, self.tick_size, "price ticks")
    }

    /// Rescale a decoded lot count back into a quantity.
    pub fn qty_from_lots(&self, lots: &BigUint) -> ArthurResult<Decimal> {
        units_to_decimal(lots, self.lot_size, "qty lots")
    }
}

/// `units * unit_size`, failing when the product leaves the representable
/// decimal range (a stream carrying such a value did not come from a
/// well-formed writer).
fn units_to_decimal(
    units: &BigUint,
    unit_size: Decimal,
    what: &'static str,
) -> ArthurResult<Decimal> {
    let units = units
        .to_i128()
        .and_then(|n| Decimal::try_from_i128_with_scale(n, 0).ok())
        .ok_or_else(|| ArthurError::corrupt(what, "value outside the representable decimal range"))?;
    units
        .checked_mul(unit_size)
        .ok_or_else(|| ArthurError::corrupt(what, "rescaled value overflows a decimal"))
}

/// Live encoding state for one stream endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    /// Reference epoch (milliseconds) against which frame offsets are
    /// measured. Absent until the first TIMESTAMP frame crosses the stream.
    pub timestamp: Option<u64>,
    /// Absent until the first SNAPSHOT frame crosses the stream.
    pub book: Option<BookParams>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }
}
