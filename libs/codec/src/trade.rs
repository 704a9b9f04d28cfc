//! Trade codec
//!
//! The fixed part packs `[ticks, lots, maker_side, numeric_id]` in
//! `[pbits, qbits, 1, 1]` bits; the trade id follows byte-aligned. A
//! numeric id travels as its minimal little-endian bytes, a string id as
//! raw UTF-8 — either way the frame's payload length tells the reader
//! where the id ends.

use crate::bitpack::{pack, packed_len, ubytes_to_uint, uint_to_ubytes, unpack};
use crate::context::BookParams;
use crate::error::{ArthurError, ArthurResult};
use arthur_types::{Trade, TradeId};
use num_bigint::BigUint;
use num_traits::Zero;
use rust_decimal::Decimal;

fn fixed_widths(params: &BookParams) -> [u32; 4] {
    [u32::from(params.pbits), u32::from(params.qbits), 1, 1]
}

/// Encode a trade against the current widths.
pub fn encode_trade(params: &BookParams, trade: &Trade) -> ArthurResult<Vec<u8>> {
    let ticks = params.price_ticks_checked(trade.price)?;
    let lots = params.qty_lots_checked(trade.qty)?;

    let (numeric, id_bytes) = match &trade.tid {
        TradeId::Numeric(id) => (1u8, uint_to_ubytes(id)),
        TradeId::Text(id) => (0u8, id.as_bytes().to_vec()),
    };

    let mut payload = pack(
        &[
            ticks,
            lots,
            BigUint::from(u8::from(trade.maker_is_bid)),
            BigUint::from(numeric),
        ],
        &fixed_widths(params),
    )?;
    payload.extend_from_slice(&id_bytes);
    Ok(payload)
}

/// Decoded trade fields; the driver supplies the timestamp.
#[derive(Debug)]
pub struct DecodedTrade {
    pub price: Decimal,
    pub qty: Decimal,
    pub maker_is_bid: bool,
    pub tid: TradeId,
}

/// Decode a trade payload.
pub fn decode_trade(params: &BookParams, payload: &[u8]) -> ArthurResult<DecodedTrade> {
    let widths = fixed_widths(params);
    let fixed_len = packed_len(&widths);
    if payload.len() < fixed_len {
        return Err(ArthurError::corrupt(
            "trade payload",
            format!("{} bytes, fixed part needs {}", payload.len(), fixed_len),
        ));
    }

    let fields = unpack(&payload[..fixed_len], &widths);
    let id_bytes = &payload[fixed_len..];
    let tid = if fields[3].is_zero() {
        TradeId::Text(
            String::from_utf8(id_bytes.to_vec())
                .map_err(|err| ArthurError::corrupt("trade id", err.to_string()))?,
        )
    } else {
        TradeId::Numeric(ubytes_to_uint(id_bytes))
    };

    Ok(DecodedTrade {
        price: params.price_from_ticks(&fields[0])?,
        qty: params.qty_from_lots(&fields[1])?,
        maker_is_bid: !fields[2].is_zero(),
        tid,
    })
}
