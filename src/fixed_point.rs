//! 18-decimal ("WAD") unsigned fixed point.
//!
//! Every operation rounds in an explicit direction so that quotes agree with
//! the contracts to the last unit. Values are carried as [`BigInt`] and are
//! expected to be non-negative; subtraction that would go negative is an
//! error rather than a wrap.

use std::sync::LazyLock;

use num_bigint::BigInt;
use num_traits::{One, Zero};

use crate::error::{MathError, Result};
use crate::log_exp;

/// `10^n` as a [`BigInt`].
pub fn pow10(n: u32) -> BigInt {
    BigInt::from(10u8).pow(n)
}

/// 1.0 in 18-decimal fixed point.
pub static ONE: LazyLock<BigInt> = LazyLock::new(|| pow10(18));
static TWO: LazyLock<BigInt> = LazyLock::new(|| &*ONE * 2u8);
static FOUR: LazyLock<BigInt> = LazyLock::new(|| &*ONE * 4u8);

/// Relative error budget applied around [`log_exp::pow`] (1e-14).
pub static MAX_POW_RELATIVE_ERROR: LazyLock<BigInt> = LazyLock::new(|| BigInt::from(10_000u32));

/// Checked unsigned subtraction.
pub fn sub(a: &BigInt, b: &BigInt) -> Result<BigInt> {
    if b > a {
        return Err(MathError::SubOverflow.into());
    }
    Ok(a - b)
}

/// Integer division rounding down.
pub fn div_down_int(a: &BigInt, b: &BigInt) -> Result<BigInt> {
    if b.is_zero() {
        return Err(MathError::ZeroDivision.into());
    }
    Ok(a / b)
}

/// Integer division rounding up.
pub fn div_up_int(a: &BigInt, b: &BigInt) -> Result<BigInt> {
    if b.is_zero() {
        return Err(MathError::ZeroDivision.into());
    }
    if a.is_zero() {
        return Ok(BigInt::zero());
    }
    Ok(BigInt::one() + (a - 1u8) / b)
}

/// `a * b`, rounded down.
pub fn mul_down(a: &BigInt, b: &BigInt) -> BigInt {
    (a * b) / &*ONE
}

/// `a * b`, rounded up.
pub fn mul_up(a: &BigInt, b: &BigInt) -> BigInt {
    let product = a * b;
    if product.is_zero() {
        product
    } else {
        (product - 1u8) / &*ONE + 1u8
    }
}

/// `a / b`, rounded down.
pub fn div_down(a: &BigInt, b: &BigInt) -> Result<BigInt> {
    if b.is_zero() {
        return Err(MathError::ZeroDivision.into());
    }
    if a.is_zero() {
        return Ok(BigInt::zero());
    }
    Ok((a * &*ONE) / b)
}

/// `a / b`, rounded up.
pub fn div_up(a: &BigInt, b: &BigInt) -> Result<BigInt> {
    if b.is_zero() {
        return Err(MathError::ZeroDivision.into());
    }
    if a.is_zero() {
        return Ok(BigInt::zero());
    }
    Ok((a * &*ONE - 1u8) / b + 1u8)
}

/// `max(1 - x, 0)`.
pub fn complement(x: &BigInt) -> BigInt {
    if x < &*ONE {
        &*ONE - x
    } else {
        BigInt::zero()
    }
}

/// `x^y` rounded up, with the integer-exponent shortcuts unless `version == 1`.
pub fn pow_up(x: &BigInt, y: &BigInt, version: u32) -> Result<BigInt> {
    if version != 1 {
        if y == &*ONE {
            return Ok(x.clone());
        } else if y == &*TWO {
            return Ok(mul_up(x, x));
        } else if y == &*FOUR {
            let square = mul_up(x, x);
            return Ok(mul_up(&square, &square));
        }
    }
    let raw = log_exp::pow(x, y)?;
    let max_error = mul_up(&raw, &MAX_POW_RELATIVE_ERROR) + 1u8;
    Ok(raw + max_error)
}

/// `x^y` rounded down, with the integer-exponent shortcuts unless `version == 1`.
pub fn pow_down(x: &BigInt, y: &BigInt, version: u32) -> Result<BigInt> {
    if version != 1 {
        if y == &*ONE {
            return Ok(x.clone());
        } else if y == &*TWO {
            return Ok(mul_down(x, x));
        } else if y == &*FOUR {
            let square = mul_down(x, x);
            return Ok(mul_down(&square, &square));
        }
    }
    let raw = log_exp::pow(x, y)?;
    let max_error = mul_up(&raw, &MAX_POW_RELATIVE_ERROR) + 1u8;
    if raw < max_error {
        Ok(BigInt::zero())
    } else {
        Ok(raw - max_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wad(x: u64) -> BigInt {
        BigInt::from(x) * &*ONE
    }

    #[test]
    fn rounding_gap_is_at_most_one_unit() {
        let a = BigInt::from(1_234_567_890_123_456_789u64);
        let b = BigInt::from(987_654_321_987_654_321u64);
        let down = mul_down(&a, &b);
        let up = mul_up(&a, &b);
        assert!(up >= down && &up - &down <= BigInt::one());
        let down = div_down(&a, &b).unwrap();
        let up = div_up(&a, &b).unwrap();
        assert!(up >= down && &up - &down <= BigInt::one());
    }

    #[test]
    fn sub_rejects_underflow() {
        assert!(sub(&BigInt::from(1), &BigInt::from(2)).is_err());
        assert_eq!(sub(&BigInt::from(5), &BigInt::from(2)).unwrap(), BigInt::from(3));
    }

    #[test]
    fn complement_saturates() {
        assert_eq!(complement(&wad(2)), BigInt::zero());
        assert_eq!(complement(&(&*ONE / 4u8)), &*ONE * 3u8 / 4u8);
    }

    #[test]
    fn integer_exponents_use_shortcuts_unless_v1() {
        let x = BigInt::from(1_500_000_000_000_000_000u64);
        assert_eq!(pow_up(&x, &wad(2), 2).unwrap(), mul_up(&x, &x));
        let v1 = pow_up(&x, &wad(2), 1).unwrap();
        assert!(v1 > mul_up(&x, &x));
    }

    #[test]
    fn div_up_int_rounds_up() {
        assert_eq!(div_up_int(&BigInt::from(7), &BigInt::from(2)).unwrap(), BigInt::from(4));
        assert_eq!(div_up_int(&BigInt::zero(), &BigInt::from(2)).unwrap(), BigInt::zero());
        assert!(div_up_int(&BigInt::from(1), &BigInt::zero()).is_err());
    }
}
