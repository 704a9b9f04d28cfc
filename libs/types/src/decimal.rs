//! Exact decimal ↔ integer conversions
//!
//! The codec never stores decimals directly: prices travel as integer
//! multiples of the tick size and quantities as integer multiples of the
//! lot size, while the tick/lot sizes themselves travel as a one-byte
//! mantissa with a signed one-byte power-of-ten scale. Every conversion in
//! this module is exact; anything that would lose precision is an error,
//! because a lossy write would silently corrupt the reconstructed book.

use num_bigint::{BigInt, BigUint};
use num_traits::{pow, Zero};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::messages::PriceLevel;

/// A decimal input is inconsistent with the tick/lot sizes in force.
///
/// Not recoverable at codec level: the caller supplied a price or quantity
/// the stream's scales cannot represent exactly.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PrecisionError {
    #[error("{what} {value} is not an integer multiple of {unit}")]
    NotAMultiple {
        what: &'static str,
        value: Decimal,
        unit: Decimal,
    },

    #[error("{what} must be positive, got {value}")]
    NotPositive { what: &'static str, value: Decimal },

    #[error("{what} {value} is negative")]
    Negative { what: &'static str, value: Decimal },

    #[error("mantissa of {value} does not fit one signed byte after stripping trailing zeros")]
    MantissaTooWide { value: Decimal },

    #[error("scale {scale} with mantissa {value} is outside the representable decimal range")]
    ScaleOutOfRange { value: u8, scale: i8 },
}

/// 10^exp as a big integer.
fn pow10(exp: u32) -> BigInt {
    pow(BigInt::from(10), exp as usize)
}

/// Exact `value / unit` as a nonnegative integer.
///
/// Works on the raw mantissa/scale pairs so the quotient may exceed what a
/// `Decimal` itself could carry (tick counts of extreme-priced books run to
/// well over 64 bits).
fn exact_units(value: Decimal, unit: Decimal, what: &'static str) -> Result<BigUint, PrecisionError> {
    if unit.is_sign_negative() || unit.is_zero() {
        return Err(PrecisionError::NotPositive {
            what: "tick/lot size",
            value: unit,
        });
    }
    if value.is_sign_negative() && !value.is_zero() {
        return Err(PrecisionError::Negative { what, value });
    }

    // value = vm * 10^-vs, unit = um * 10^-us, so
    // value / unit = (vm * 10^us) / (um * 10^vs).
    let numer = BigInt::from(value.mantissa()) * pow10(unit.scale());
    let denom = BigInt::from(unit.mantissa()) * pow10(value.scale());
    let quot = &numer / &denom;
    if !(&numer % &denom).is_zero() {
        return Err(PrecisionError::NotAMultiple { what, value, unit });
    }
    Ok(quot.magnitude().clone())
}

/// Exact number of ticks in `price`. Fails unless `price` is a nonnegative
/// integer multiple of `tick_size`.
pub fn to_ticks(price: Decimal, tick_size: Decimal) -> Result<BigUint, PrecisionError> {
    exact_units(price, tick_size, "price")
}

/// Exact number of lots in `qty`. Fails unless `qty` is a nonnegative
/// integer multiple of `lot_size`.
pub fn to_lots(qty: Decimal, lot_size: Decimal) -> Result<BigUint, PrecisionError> {
    exact_units(qty, lot_size, "qty")
}

/// Split a tick/lot size into `(value, scale)` with `d = value * 10^(-scale)`.
///
/// Trailing zeros are stripped from the mantissa first, so e.g. `500` becomes
/// `(5, -2)` and `0.01` becomes `(1, 2)`. The mantissa must fit one signed
/// byte; it is stored unsigned on the wire.
pub fn dec_to_ints(d: Decimal) -> Result<(u8, i8), PrecisionError> {
    if d.is_sign_negative() || d.is_zero() {
        return Err(PrecisionError::NotPositive {
            what: "tick/lot size",
            value: d,
        });
    }

    let normalized = d.normalize();
    let mut mantissa = normalized.mantissa();
    let mut scale = normalized.scale() as i32;
    while mantissa % 10 == 0 {
        mantissa /= 10;
        scale -= 1;
    }

    if mantissa > i8::MAX as i128 {
        return Err(PrecisionError::MantissaTooWide { value: d });
    }
    Ok((mantissa as u8, scale as i8))
}

/// Inverse of [`dec_to_ints`]: `value * 10^(-scale)`.
///
/// Fails for magnitudes a `Decimal` cannot carry; on the read path that
/// means the stream declared a tick/lot size outside the representable range.
pub fn ints_to_dec(value: u8, scale: i8) -> Result<Decimal, PrecisionError> {
    if scale >= 0 {
        Decimal::try_from_i128_with_scale(value as i128, scale as u32)
            .map_err(|_| PrecisionError::ScaleOutOfRange { value, scale })
    } else {
        let mut result = Decimal::from(value);
        for _ in scale..0 {
            result = result
                .checked_mul(Decimal::TEN)
                .ok_or(PrecisionError::ScaleOutOfRange { value, scale })?;
        }
        Ok(result)
    }
}

/// Bit length of the largest tick count across `levels` (0 over an empty set).
pub fn max_price_bits<'a>(
    tick_size: Decimal,
    levels: impl IntoIterator<Item = &'a PriceLevel>,
) -> Result<u64, PrecisionError> {
    let mut bits = 0;
    for level in levels {
        bits = bits.max(to_ticks(level.price, tick_size)?.bits());
    }
    Ok(bits)
}

/// Bit length of the largest lot count across `levels` (0 over an empty set).
pub fn max_qty_bits<'a>(
    lot_size: Decimal,
    levels: impl IntoIterator<Item = &'a PriceLevel>,
) -> Result<u64, PrecisionError> {
    let mut bits = 0;
    for level in levels {
        bits = bits.max(to_lots(level.qty, lot_size)?.bits());
    }
    Ok(bits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_to_ticks_exact() {
        assert_eq!(
            to_ticks(dec!(125000.01), dec!(0.01)).unwrap(),
            BigUint::from(12500001u64)
        );
        assert_eq!(
            to_lots(dec!(20.3045), dec!(0.000001)).unwrap(),
            BigUint::from(20304500u64)
        );
        assert_eq!(to_ticks(dec!(0), dec!(0.01)).unwrap(), BigUint::zero());
    }

    #[test]
    fn test_to_ticks_inexact_is_precision_error() {
        let err = to_ticks(dec!(100.005), dec!(0.01)).unwrap_err();
        assert!(matches!(err, PrecisionError::NotAMultiple { .. }));
    }

    #[test]
    fn test_to_ticks_rejects_bad_inputs() {
        assert!(matches!(
            to_ticks(dec!(-1), dec!(0.01)),
            Err(PrecisionError::Negative { .. })
        ));
        assert!(matches!(
            to_ticks(dec!(1), dec!(0)),
            Err(PrecisionError::NotPositive { .. })
        ));
    }

    #[test]
    fn test_to_ticks_exceeding_u64() {
        // Mantissa at full width against a tiny tick: the quotient cannot fit
        // a machine word and must come back as a big integer.
        let price = Decimal::from_i128_with_scale(79_228_162_514_264_337_593_543_950_335, 0);
        let ticks = to_ticks(price, dec!(0.0000000000000000000000000001)).unwrap();
        assert!(ticks.bits() > 64);
    }

    #[test]
    fn test_dec_to_ints_strips_trailing_zeros() {
        assert_eq!(dec_to_ints(dec!(0.01)).unwrap(), (1, 2));
        assert_eq!(dec_to_ints(dec!(0.000001)).unwrap(), (1, 6));
        assert_eq!(dec_to_ints(dec!(0.25)).unwrap(), (25, 2));
        assert_eq!(dec_to_ints(dec!(500)).unwrap(), (5, -2));
        assert_eq!(dec_to_ints(dec!(5)).unwrap(), (5, 0));
        assert_eq!(dec_to_ints(dec!(2.50)).unwrap(), (25, 1));
    }

    #[test]
    fn test_dec_to_ints_mantissa_limit() {
        assert_eq!(dec_to_ints(dec!(1.27)).unwrap(), (127, 2));
        assert!(matches!(
            dec_to_ints(dec!(1.29)),
            Err(PrecisionError::MantissaTooWide { .. })
        ));
    }

    #[test]
    fn test_ints_to_dec_round_trip() {
        for d in [dec!(0.01), dec!(0.000001), dec!(0.25), dec!(500), dec!(5)] {
            let (value, scale) = dec_to_ints(d).unwrap();
            assert_eq!(ints_to_dec(value, scale).unwrap(), d);
        }
    }

    #[test]
    fn test_ints_to_dec_unrepresentable_scale() {
        assert!(ints_to_dec(1, 100).is_err());
        assert!(ints_to_dec(1, -100).is_err());
    }

    #[test]
    fn test_max_bits_over_levels() {
        let levels = [
            PriceLevel::new(dec!(100000.52), dec!(20.5)),
            PriceLevel::new(dec!(102000.52), dec!(1.25)),
        ];
        // 10200052 needs 24 bits, 2050 lots of 0.01 need 12 bits.
        assert_eq!(max_price_bits(dec!(0.01), &levels).unwrap(), 24);
        assert_eq!(max_qty_bits(dec!(0.01), &levels).unwrap(), 12);
        assert_eq!(max_price_bits(dec!(0.01), &[]).unwrap(), 0);
    }
}
