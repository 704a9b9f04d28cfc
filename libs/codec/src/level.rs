//! Diff / removal codec
//!
//! A diff payload is one packed integer: the tick count in the low `pbits`
//! bits and the lot count in everything above. The lot field is sized from
//! the value itself rather than from `qbits`, so small quantities take
//! fewer bytes; the reader recovers the split from the payload length. A
//! removal is the tick count alone in `ceil(pbits / 8)` bytes.
//!
//! Side and diff-vs-removal are not in the payload at all: the frame kind
//! carries both.

use rust_decimal::Decimal;

use crate::bitpack::{pack, packed_len, unpack};
use crate::context::BookParams;
use crate::error::{ArthurError, ArthurResult};

/// Encode a level update with a nonzero quantity.
pub fn encode_diff(params: &BookParams, price: Decimal, qty: Decimal) -> ArthurResult<Vec<u8>> {
    debug_assert!(!qty.is_zero());
    let ticks = params.price_ticks_checked(price)?;
    let lots = params.qty_lots(qty)?;

    // Lot field absorbs every bit the payload has above pbits.
    let len = packed_len(&[lots.bits() as u32, u32::from(params.pbits)]);
    let lot_width = (len * 8) as u32 - u32::from(params.pbits);
    pack(&[lots, ticks], &[lot_width, u32::from(params.pbits)])
}

/// Encode a level removal (quantity zero).
pub fn encode_removal(params: &BookParams, price: Decimal) -> ArthurResult<Vec<u8>> {
    let ticks = params.price_ticks_checked(price)?;
    pack(&[ticks], &[u32::from(params.pbits)])
}

/// Decode a diff payload into `(price, qty)`.
pub fn decode_diff(params: &BookParams, payload: &[u8]) -> ArthurResult<(Decimal, Decimal)> {
    let total_bits = payload.len() * 8;
    if total_bits <= usize::from(params.pbits) {
        return Err(ArthurError::corrupt(
            "diff payload",
            format!(
                "{} bytes leave no room for a quantity above the {}-bit price field",
                payload.len(),
                params.pbits
            ),
        ));
    }
    let lot_width = total_bits as u32 - u32::from(params.pbits);
    let fields = unpack(payload, &[lot_width, u32::from(params.pbits)]);
    let price = params.price_from_ticks(&fields[1])?;
    let qty = params.qty_from_lots(&fields[0])?;
    Ok((price, qty))
}

/// Decode a removal payload into its price.
pub fn decode_removal(params: &BookParams, payload: &[u8]) -> ArthurResult<Decimal> {
    let expected = packed_len(&[u32::from(params.pbits)]);
    if payload.len() != expected {
        return Err(ArthurError::corrupt(
            "removal payload",
            format!("expected {} bytes, got {}", expected, payload.len()),
        ));
    }
    let fields = unpack(payload, &[u32::from(params.pbits)]);
    params.price_from_ticks(&fields[0])
}
