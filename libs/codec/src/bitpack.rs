//! # Bit Packer - Dynamic-Width Field Groups
//!
//! ## Purpose
//!
//! Packs a sequence of unsigned integers of arbitrary bit widths into the
//! minimal byte group and back. This is what makes the wire format dynamic
//! on the bit rather than the byte level: a snapshot level or a trade's
//! fixed part is one packed group whose field widths were computed from
//! live book state.
//!
//! ## Layout
//!
//! A group is the concatenated integer — `values[0]` most significant,
//! each following value in its declared width below it — serialized as
//! exactly `ceil(sum(widths) / 8)` little-endian bytes. The unused pad
//! bits are the high bits of the integer and therefore land in the
//! trailing bytes of the group. Reading a group back as one little-endian
//! integer puts the right-most field in the low bits, which is what the
//! variable-length payloads rely on: the left-most field simply absorbs
//! every remaining high bit, so its declared width never needs to be
//! carried on the wire.
//!
//! Groups totalling at most 64 bits run on a machine-word accumulator;
//! wider groups (extreme-priced books) fall back to big integers.

use num_bigint::BigUint;
use num_traits::{One, ToPrimitive, Zero};

use crate::error::{ArthurError, ArthurResult};

/// Bytes needed for a group of packed fields.
pub fn packed_len(widths: &[u32]) -> usize {
    let bits: u64 = widths.iter().map(|w| u64::from(*w)).sum();
    ((bits + 7) / 8) as usize
}

/// Pack `values` into a minimal little-endian byte group.
///
/// Every value must fit its declared width; a value that does not is an
/// [`ArthurError::Overflow`]. Callers with a variable left-most field pass
/// a width wide enough for the value they hold — on unpack that width is
/// implicit.
pub fn pack(values: &[BigUint], widths: &[u32]) -> ArthurResult<Vec<u8>> {
    debug_assert_eq!(values.len(), widths.len());

    let mut total: u64 = 0;
    for (value, &width) in values.iter().zip(widths) {
        if value.bits() > u64::from(width) {
            return Err(ArthurError::overflow(
                "packed field",
                value.bits(),
                u64::from(width),
            ));
        }
        total += u64::from(width);
    }

    let len = packed_len(widths);
    if total <= 64 {
        let mut acc: u64 = 0;
        for (value, &width) in values.iter().zip(widths) {
            let v = value.to_u64().expect("width-checked value fits u64");
            acc = if width == 0 {
                acc
            } else if width >= 64 {
                v
            } else {
                (acc << width) | v
            };
        }
        return Ok(acc.to_le_bytes()[..len].to_vec());
    }

    let mut acc = BigUint::zero();
    for (value, &width) in values.iter().zip(widths) {
        acc = (acc << width) | value;
    }
    let mut bytes = acc.to_bytes_le();
    bytes.resize(len, 0);
    Ok(bytes)
}

/// Unpack a byte group produced by [`pack`].
///
/// Right-hand fields are extracted exactly in their declared widths from
/// the low bits; the left-most field consumes all remaining high bits, so
/// its declared width is ignored (pad bits are zero and vanish into it).
pub fn unpack(bytes: &[u8], widths: &[u32]) -> Vec<BigUint> {
    if widths.is_empty() {
        return Vec::new();
    }

    if bytes.len() <= 8 {
        let mut word = [0u8; 8];
        word[..bytes.len()].copy_from_slice(bytes);
        let mut acc = u64::from_le_bytes(word);
        let mut out = vec![BigUint::zero(); widths.len()];
        for i in (1..widths.len()).rev() {
            let width = widths[i];
            if width >= 64 {
                out[i] = BigUint::from(acc);
                acc = 0;
            } else {
                out[i] = BigUint::from(acc & ((1u64 << width) - 1));
                acc >>= width;
            }
        }
        out[0] = BigUint::from(acc);
        return out;
    }

    let mut acc = BigUint::from_bytes_le(bytes);
    let mut out = vec![BigUint::zero(); widths.len()];
    for i in (1..widths.len()).rev() {
        let width = widths[i];
        let mask = (BigUint::one() << width) - 1u32;
        out[i] = &acc & &mask;
        acc >>= width;
    }
    out[0] = acc;
    out
}

/// Minimal little-endian byte representation of `n` (one byte for zero).
pub fn uint_to_ubytes(n: &BigUint) -> Vec<u8> {
    n.to_bytes_le()
}

/// Inverse of [`uint_to_ubytes`]. An empty slice reads as zero.
pub fn ubytes_to_uint(bytes: &[u8]) -> BigUint {
    BigUint::from_bytes_le(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn big(n: u128) -> BigUint {
        BigUint::from(n)
    }

    #[test]
    fn test_pack_len_is_minimal() {
        assert_eq!(pack(&[big(1)], &[1]).unwrap().len(), 1);
        assert_eq!(pack(&[big(1)], &[8]).unwrap().len(), 1);
        assert_eq!(pack(&[big(1)], &[9]).unwrap().len(), 2);
        assert_eq!(pack(&[big(5), big(3)], &[3, 2]).unwrap().len(), 1);
        assert_eq!(packed_len(&[24, 1, 26]), 7);
    }

    #[test]
    fn test_pack_unpack_round_trip() {
        let values = [big(10200052), big(1), big(2050)];
        let widths = [24, 1, 12];
        let bytes = pack(&values, &widths).unwrap();
        assert_eq!(bytes.len(), 5);
        assert_eq!(unpack(&bytes, &widths), values);
    }

    #[test]
    fn test_pack_rejects_oversized_value() {
        let err = pack(&[big(8)], &[3]).unwrap_err();
        assert!(matches!(err, ArthurError::Overflow { bits: 4, width: 3, .. }));
    }

    #[test]
    fn test_pack_order_is_most_significant_first() {
        // [a:4 | b:4] over one byte: a sits in the high nibble.
        let bytes = pack(&[big(0xA), big(0x5)], &[4, 4]).unwrap();
        assert_eq!(bytes, vec![0xA5]);
    }

    #[test]
    fn test_pad_bits_are_high_bits() {
        // 3 bits of payload in one byte: value in the low bits, pad above.
        let bytes = pack(&[big(0b101)], &[3]).unwrap();
        assert_eq!(bytes, vec![0b101]);
    }

    #[test]
    fn test_leftmost_width_is_implicit_on_unpack() {
        let bytes = pack(&[big(300), big(9)], &[12, 4]).unwrap();
        assert_eq!(bytes.len(), 2);
        // Declared left-most width does not matter on the way back out.
        let fields = unpack(&bytes, &[0, 4]);
        assert_eq!(fields, [big(300), big(9)]);
    }

    #[test]
    fn test_wide_group_round_trip() {
        // A 203-bit price field forces the big-integer path.
        let ticks = BigUint::from(10u8).pow(61);
        let values = [ticks.clone(), big(1), big(20304500)];
        let widths = [203, 1, 26];
        let bytes = pack(&values, &widths).unwrap();
        assert_eq!(bytes.len(), packed_len(&widths));
        assert_eq!(unpack(&bytes, &widths), values);
    }

    #[test]
    fn test_boundary_64_bit_group() {
        let values = [big(u64::MAX as u128)];
        let bytes = pack(&values, &[64]).unwrap();
        assert_eq!(bytes.len(), 8);
        assert_eq!(unpack(&bytes, &[64]), values);
    }

    #[test]
    fn test_uint_ubytes_round_trip() {
        assert_eq!(uint_to_ubytes(&BigUint::zero()), vec![0]);
        assert_eq!(uint_to_ubytes(&big(255)), vec![255]);
        assert_eq!(uint_to_ubytes(&big(256)), vec![0, 1]);
        assert_eq!(ubytes_to_uint(&[]), BigUint::zero());
        let n = BigUint::from(10u8).pow(40);
        assert_eq!(ubytes_to_uint(&uint_to_ubytes(&n)), n);
    }
}
