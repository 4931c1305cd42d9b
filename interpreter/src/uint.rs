//! Signed 256-bit helpers and word conversions.
//!
//! Signed operations treat a word as two's complement: the sign lives in
//! bit 255, and magnitudes are recovered by negation. `-2^255` is its own
//! negation, which is exactly what lets the EVM's wrapping division fall
//! out of plain magnitude arithmetic below.

use primitive_types::{H160, H256, U256};

#[must_use]
pub fn u256_to_h256(value: U256) -> H256 {
	let mut bytes = [0u8; 32];
	value.to_big_endian(&mut bytes);
	H256(bytes)
}

#[must_use]
pub fn h256_to_u256(value: H256) -> U256 {
	U256::from_big_endian(&value[..])
}

/// Truncate a word to its low 20 bytes.
#[must_use]
pub fn u256_to_h160(value: U256) -> H160 {
	let mut bytes = [0u8; 32];
	value.to_big_endian(&mut bytes);
	H160::from_slice(&bytes[12..])
}

#[must_use]
pub fn h160_to_u256(value: H160) -> U256 {
	U256::from_big_endian(&value[..])
}

/// Two's-complement negation. Zero and `-2^255` are their own negations.
#[must_use]
pub fn twos_complement(value: U256) -> U256 {
	(!value).overflowing_add(U256::one()).0
}

/// Whether the word is negative when read as two's complement.
#[inline]
#[must_use]
pub fn is_negative(value: U256) -> bool {
	value.bit(255)
}

/// Magnitude of the word together with its sign bit.
fn abs_sign(value: U256) -> (U256, bool) {
	if is_negative(value) {
		(twos_complement(value), true)
	} else {
		(value, false)
	}
}

/// Signed division; division by zero yields zero.
///
/// The magnitude of `-2^255` is again `2^255`, so dividing it by `-1`
/// produces an unchanged magnitude with a positive sign and wraps back to
/// `-2^255` without a special case.
#[must_use]
pub fn sdiv(a: U256, b: U256) -> U256 {
	if b.is_zero() {
		return U256::zero();
	}
	let (dividend, dividend_negative) = abs_sign(a);
	let (divisor, divisor_negative) = abs_sign(b);
	let quotient = dividend / divisor;
	if dividend_negative != divisor_negative {
		twos_complement(quotient)
	} else {
		quotient
	}
}

/// Signed remainder; remainder by zero yields zero. The result carries
/// the dividend's sign.
#[must_use]
pub fn smod(a: U256, b: U256) -> U256 {
	if b.is_zero() {
		return U256::zero();
	}
	let (dividend, dividend_negative) = abs_sign(a);
	let (divisor, _) = abs_sign(b);
	let remainder = dividend % divisor;
	if dividend_negative {
		twos_complement(remainder)
	} else {
		remainder
	}
}

/// Signed less-than. Words of equal sign keep their unsigned order under
/// two's complement; otherwise the negative one is smaller.
#[must_use]
pub fn slt(a: U256, b: U256) -> bool {
	match (is_negative(a), is_negative(b)) {
		(true, false) => true,
		(false, true) => false,
		_ => a < b,
	}
}

#[must_use]
pub fn sgt(a: U256, b: U256) -> bool {
	slt(b, a)
}

/// Arithmetic right shift. Shifts of 256 or more saturate to 0 or all-ones
/// depending on the sign.
#[must_use]
pub fn sar(shift: U256, value: U256) -> U256 {
	let negative = is_negative(value);
	if shift >= U256::from(256u64) {
		if negative {
			return U256::MAX;
		}
		return U256::zero();
	}
	let shift = shift.as_u64() as usize;
	if negative {
		// Shift in ones from the top.
		(value >> shift) | (U256::MAX << (256 - shift))
	} else {
		value >> shift
	}
}

/// SIGNEXTEND: extend the sign of the low `byte_index + 1` bytes of `value`.
#[must_use]
pub fn sign_extend(byte_index: U256, value: U256) -> U256 {
	if byte_index >= U256::from(31u64) {
		return value;
	}
	let bit = byte_index.as_u64() as usize * 8 + 7;
	let mask = (U256::one() << bit) - U256::one();
	if value.bit(bit) {
		value | !mask
	} else {
		value & mask
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn negation_round_trips() {
		for value in [
			U256::zero(),
			U256::one(),
			U256::from(12_345u64),
			U256::MAX,
			U256::one() << 255,
		] {
			assert_eq!(twos_complement(twos_complement(value)), value);
		}
		// The two fixed points of negation.
		assert_eq!(twos_complement(U256::zero()), U256::zero());
		assert_eq!(twos_complement(U256::one() << 255), U256::one() << 255);
	}

	#[test]
	fn div_wraps_at_min_value() {
		let min = U256::one() << 255;
		let minus_one = U256::MAX;
		assert_eq!(sdiv(min, minus_one), min);
		assert_eq!(sdiv(min, U256::one()), min);
	}

	#[test]
	fn div_and_mod_by_zero_yield_zero() {
		assert_eq!(sdiv(U256::from(7u64), U256::zero()), U256::zero());
		assert_eq!(smod(U256::from(7u64), U256::zero()), U256::zero());
		assert_eq!(sdiv(U256::MAX, U256::zero()), U256::zero());
	}

	#[test]
	fn signed_division_matches_i8() {
		// Sanity checks against native signed arithmetic on small values.
		let to_u256 = |v: i8| {
			if v >= 0 {
				U256::from(v as u64)
			} else {
				twos_complement(U256::from(-(v as i64) as u64))
			}
		};
		for a in [-100i8, -3, -1, 0, 1, 3, 100] {
			for b in [-7i8, -1, 1, 7] {
				assert_eq!(
					sdiv(to_u256(a), to_u256(b)),
					to_u256(a.wrapping_div(b)),
					"{a} / {b}"
				);
				assert_eq!(
					smod(to_u256(a), to_u256(b)),
					to_u256(a.wrapping_rem(b)),
					"{a} % {b}"
				);
			}
		}
	}

	#[test]
	fn signed_comparison_orders_across_the_sign_boundary() {
		let minus_two = twos_complement(U256::from(2u64));
		let minus_one = U256::MAX;
		assert!(slt(minus_one, U256::zero()));
		assert!(slt(minus_two, minus_one));
		assert!(slt(U256::one() << 255, minus_one));
		assert!(!slt(U256::one(), minus_one));
		assert!(sgt(U256::one(), minus_one));
		assert!(!slt(U256::one(), U256::one()));
	}

	#[test]
	fn sar_saturates_past_255() {
		let minus_one = U256::MAX;
		assert_eq!(sar(U256::from(256u64), minus_one), U256::MAX);
		assert_eq!(sar(U256::from(300u64), U256::from(5u64)), U256::zero());
		assert_eq!(sar(U256::from(1u64), U256::from(4u64)), U256::from(2u64));
		// -4 >> 1 == -2 with the sign shifted in from the top.
		assert_eq!(
			sar(U256::from(1u64), twos_complement(U256::from(4u64))),
			twos_complement(U256::from(2u64))
		);
	}

	#[test]
	fn sign_extend_small_negative() {
		// 0xff as a signed byte is -1.
		assert_eq!(sign_extend(U256::zero(), U256::from(0xffu64)), U256::MAX);
		assert_eq!(
			sign_extend(U256::zero(), U256::from(0x7fu64)),
			U256::from(0x7fu64)
		);
		assert_eq!(
			sign_extend(U256::from(31u64), U256::from(0xffu64)),
			U256::from(0xffu64)
		);
	}

	#[test]
	fn word_conversions_round_trip() {
		let value = U256::from(0xdead_beefu64) << 96;
		assert_eq!(h256_to_u256(u256_to_h256(value)), value);
		let addr = u256_to_h160(value);
		assert_eq!(h160_to_u256(addr), value & ((U256::one() << 160) - 1));
	}
}
