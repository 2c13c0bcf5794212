//! Signed fixed point at 18 ("Np") and 38 ("Xp") decimals.
//!
//! The `*_mag` helpers round away from or toward zero by magnitude, which is
//! what the elliptic pool needs to keep its error bounds one-sided regardless
//! of sign. Unchecked (`_u`) variants skip the int256 range check and are the
//! ones used on hot paths; the checked variants report overflow.

use std::sync::LazyLock;

use num_bigint::BigInt;
use num_traits::{One, Signed, Zero};

use crate::error::{Error, MathError, Result};
use crate::fixed_point::{pow10, ONE};

/// 1.0 at 38 decimals.
pub static ONE_XP: LazyLock<BigInt> = LazyLock::new(|| pow10(38));
static SPLIT: LazyLock<BigInt> = LazyLock::new(|| pow10(19));
static INT256_MAX: LazyLock<BigInt> = LazyLock::new(|| (BigInt::one() << 255u32) - 1u8);
static INT256_MIN: LazyLock<BigInt> = LazyLock::new(|| -(BigInt::one() << 255u32));

fn checked(value: BigInt) -> Result<BigInt> {
    if value > *INT256_MAX || value < *INT256_MIN {
        return Err(MathError::Overflow.into());
    }
    Ok(value)
}

fn nonzero(b: &BigInt) -> Result<()> {
    if b.is_zero() {
        return Err(MathError::ZeroDivision.into());
    }
    Ok(())
}

/// `a + b`, checked against the int256 range.
pub fn add(a: &BigInt, b: &BigInt) -> Result<BigInt> {
    checked(a + b)
}

/// `a - b`, checked against the int256 range.
pub fn sub(a: &BigInt, b: &BigInt) -> Result<BigInt> {
    checked(a - b)
}

/// `a * b` at 18 decimals, truncated toward zero.
pub fn mul_down_mag_u(a: &BigInt, b: &BigInt) -> BigInt {
    (a * b) / &*ONE
}

/// Checked [`mul_down_mag_u`].
pub fn mul_down_mag(a: &BigInt, b: &BigInt) -> Result<BigInt> {
    checked(mul_down_mag_u(a, b))
}

/// `a * b` at 18 decimals, rounded away from zero.
pub fn mul_up_mag_u(a: &BigInt, b: &BigInt) -> BigInt {
    let product = a * b;
    if product.is_positive() {
        (product - 1u8) / &*ONE + 1u8
    } else if product.is_negative() {
        (product + 1u8) / &*ONE - 1u8
    } else {
        product
    }
}

/// Checked [`mul_up_mag_u`].
pub fn mul_up_mag(a: &BigInt, b: &BigInt) -> Result<BigInt> {
    checked(mul_up_mag_u(a, b))
}

/// `a / b` at 18 decimals, truncated toward zero.
pub fn div_down_mag_u(a: &BigInt, b: &BigInt) -> Result<BigInt> {
    nonzero(b)?;
    Ok((a * &*ONE) / b)
}

/// Checked [`div_down_mag_u`].
pub fn div_down_mag(a: &BigInt, b: &BigInt) -> Result<BigInt> {
    checked(div_down_mag_u(a, b)?)
}

/// `a / b` at 18 decimals, rounded away from zero.
pub fn div_up_mag_u(a: &BigInt, b: &BigInt) -> Result<BigInt> {
    nonzero(b)?;
    let (a, b) = if b.is_negative() { (-a, -b) } else { (a.clone(), b.clone()) };
    if a.is_zero() {
        Ok(a)
    } else if a.is_positive() {
        Ok((a * &*ONE - 1u8) / b + 1u8)
    } else {
        Ok((a * &*ONE + 1u8) / b - 1u8)
    }
}

/// Checked [`div_up_mag_u`].
pub fn div_up_mag(a: &BigInt, b: &BigInt) -> Result<BigInt> {
    checked(div_up_mag_u(a, b)?)
}

/// `a * b` at 38 decimals.
pub fn mul_xp_u(a: &BigInt, b: &BigInt) -> BigInt {
    (a * b) / &*ONE_XP
}

/// Checked [`mul_xp_u`].
pub fn mul_xp(a: &BigInt, b: &BigInt) -> Result<BigInt> {
    checked(mul_xp_u(a, b))
}

/// `a / b` at 38 decimals.
pub fn div_xp_u(a: &BigInt, b: &BigInt) -> Result<BigInt> {
    nonzero(b)?;
    Ok((a * &*ONE_XP) / b)
}

/// Checked [`div_xp_u`].
pub fn div_xp(a: &BigInt, b: &BigInt) -> Result<BigInt> {
    checked(div_xp_u(a, b)?)
}

fn split_products(a: &BigInt, b: &BigInt) -> (BigInt, BigInt) {
    let b1 = b / &*SPLIT;
    let b2 = b % &*SPLIT;
    (a * b1, a * b2)
}

/// Multiplies an 18-decimal `a` by a 38-decimal `b`, returning 18 decimals
/// rounded toward negative infinity.
pub fn mul_down_xp_to_np_u(a: &BigInt, b: &BigInt) -> BigInt {
    let (prod1, prod2) = split_products(a, b);
    let split = &*SPLIT;
    if !prod1.is_negative() && !prod2.is_negative() {
        (prod1 + prod2 / split) / split
    } else {
        (prod1 + prod2 / split + 1u8) / split - 1u8
    }
}

/// Checked [`mul_down_xp_to_np_u`].
pub fn mul_down_xp_to_np(a: &BigInt, b: &BigInt) -> Result<BigInt> {
    checked(mul_down_xp_to_np_u(a, b))
}

/// Multiplies an 18-decimal `a` by a 38-decimal `b`, returning 18 decimals
/// rounded toward positive infinity.
pub fn mul_up_xp_to_np_u(a: &BigInt, b: &BigInt) -> BigInt {
    let (prod1, prod2) = split_products(a, b);
    let split = &*SPLIT;
    if !prod1.is_positive() && !prod2.is_positive() {
        (prod1 + prod2 / split) / split
    } else {
        (prod1 + prod2 / split - 1u8) / split + 1u8
    }
}

/// Checked [`mul_up_xp_to_np_u`].
pub fn mul_up_xp_to_np(a: &BigInt, b: &BigInt) -> Result<BigInt> {
    checked(mul_up_xp_to_np_u(a, b))
}

const SQRT_ITERATIONS: usize = 7;

/// Square root of an 18-decimal value.
///
/// Runs seven Newton steps from a bucketed initial guess and then checks
/// that `guess^2` is within `guess * tolerance` of `x`.
pub fn sqrt(x: &BigInt, tolerance: u64) -> Result<BigInt> {
    if x.is_zero() {
        return Ok(BigInt::zero());
    }
    if x.is_negative() {
        return Err(MathError::XOutOfBounds.into());
    }

    let mut guess = initial_guess(x);
    for _ in 0..SQRT_ITERATIONS {
        guess = (&guess + (x * &*ONE) / &guess) / 2u8;
    }

    let guess_squared = mul_down_mag(&guess, &guess)?;
    let margin = mul_up_mag(&guess, &BigInt::from(tolerance))?;
    let upper = add(x, &margin)?;
    let lower = crate::fixed_point::sub(x, &margin)?;
    if guess_squared > upper || guess_squared < lower {
        return Err(Error::convergence("sqrt", SQRT_ITERATIONS));
    }
    Ok(guess)
}

fn initial_guess(x: &BigInt) -> BigInt {
    if x >= &*ONE {
        let halved = int_log2_halved(&(x / &*ONE));
        return (BigInt::one() << halved) * &*ONE;
    }
    // sqrt(10^-k) at 18 decimals for odd k, exact powers of ten otherwise.
    const BUCKETS: [(u64, u64); 17] = [
        (10, 3_162_277_660),
        (100, 10_000_000_000),
        (1_000, 31_622_776_601),
        (10_000, 100_000_000_000),
        (100_000, 316_227_766_016),
        (1_000_000, 1_000_000_000_000),
        (10_000_000, 3_162_277_660_168),
        (100_000_000, 10_000_000_000_000),
        (1_000_000_000, 31_622_776_601_683),
        (10_000_000_000, 100_000_000_000_000),
        (100_000_000_000, 316_227_766_016_837),
        (1_000_000_000_000, 1_000_000_000_000_000),
        (10_000_000_000_000, 3_162_277_660_168_379),
        (100_000_000_000_000, 10_000_000_000_000_000),
        (1_000_000_000_000_000, 31_622_776_601_683_793),
        (10_000_000_000_000_000, 100_000_000_000_000_000),
        (100_000_000_000_000_000, 316_227_766_016_837_933),
    ];
    BUCKETS
        .iter()
        .find(|(bound, _)| x <= &BigInt::from(*bound))
        .map(|(_, guess)| BigInt::from(*guess))
        .unwrap_or_else(|| x.clone())
}

fn int_log2_halved(x: &BigInt) -> u32 {
    let mut x = x.clone();
    let mut n = 0u32;
    for (shift, increment) in [(128u32, 64u32), (64, 32), (32, 16), (16, 8), (8, 4), (4, 2), (2, 1)] {
        if x >= BigInt::one() << shift {
            x >>= shift;
            n += increment;
        }
    }
    n
}
