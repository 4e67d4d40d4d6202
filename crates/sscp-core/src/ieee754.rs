//! Bit-level IEEE-754 single-precision conversion for type 13 variables.
//!
//! The PLC transmits floats as big-endian 32-bit words. Decoding rebuilds the
//! value from sign, biased exponent and significand bits; encoding walks the
//! significand greedily, so values that are not exactly representable are
//! truncated towards zero rather than rounded.

pub const SIGN: u32 = 0x8000_0000;
pub const EXPONENT: u32 = 0x7F80_0000;
pub const SIGNIFICAND: u32 = 0x007F_FFFF;
pub const EXPONENT_SHIFT: u32 = 23;
pub const EXPONENT_BIAS: i32 = 127;
pub const SIGNIFICAND_LEN: u32 = 23;

const MIN_EXPONENT: i32 = -126;
const MAX_EXPONENT: i32 = 127;

pub fn decode(word: u32) -> f64 {
    let negative = word & SIGN != 0;
    if word & !SIGN == 0 {
        return if negative { -0.0 } else { 0.0 };
    }

    let exponent = ((word & EXPONENT) >> EXPONENT_SHIFT) as i32 - EXPONENT_BIAS;
    let significand = word & SIGNIFICAND;
    let mut mult = 1.0f64;
    for i in 1..=SIGNIFICAND_LEN {
        if significand & (1 << (SIGNIFICAND_LEN - i)) != 0 {
            mult += 1.0 / 2f64.powi(i as i32);
        }
    }

    let value = 2f64.powi(exponent) * mult;
    if negative {
        -value
    } else {
        value
    }
}

pub fn encode(value: f64) -> u32 {
    if value.is_nan() {
        return EXPONENT | (1 << (SIGNIFICAND_LEN - 1));
    }
    let sign = if value.is_sign_negative() { SIGN } else { 0 };
    let magnitude = value.abs();
    if magnitude == 0.0 {
        return sign;
    }

    // Largest power of two not above the magnitude.
    let mut exponent = 0i32;
    while exponent > MIN_EXPONENT - 1 && 2f64.powi(exponent) > magnitude {
        exponent -= 1;
    }
    while exponent <= MAX_EXPONENT && 2f64.powi(exponent + 1) <= magnitude {
        exponent += 1;
    }
    if exponent < MIN_EXPONENT {
        return sign;
    }
    if exponent > MAX_EXPONENT {
        return sign | EXPONENT;
    }

    let mut remainder = magnitude / 2f64.powi(exponent) - 1.0;
    let mut significand = 0u32;
    for i in 1..=SIGNIFICAND_LEN {
        let step = 1.0 / 2f64.powi(i as i32);
        if step <= remainder {
            significand |= 1 << (SIGNIFICAND_LEN - i);
            remainder -= step;
        }
    }

    let biased = ((exponent + EXPONENT_BIAS) as u32) << EXPONENT_SHIFT;
    sign | biased | significand
}
