//! Natural logarithm, exponential and real power at 18 decimals.
//!
//! `exp` decomposes its argument into precomputed powers of e (`x0..x9`)
//! followed by a 12-term Taylor tail. `ln` divides out the same table
//! (`a0..a11`) and finishes with the atanh series. Arguments close to 1 use a
//! 36-decimal `ln` for extra accuracy. Division truncates toward zero, the
//! same as the EVM's signed division.

use std::sync::LazyLock;

use num_bigint::BigInt;
use num_traits::{One, Signed, Zero};

use crate::error::{MathError, Result};
use crate::fixed_point::pow10;

struct Tables {
    one_18: BigInt,
    one_20: BigInt,
    one_36: BigInt,
    max_natural_exponent: BigInt,
    min_natural_exponent: BigInt,
    ln_36_lower_bound: BigInt,
    ln_36_upper_bound: BigInt,
    mild_exponent_bound: BigInt,
    x_bound: BigInt,
    x0: BigInt,
    a0: BigInt,
    x1: BigInt,
    a1: BigInt,
    /// `(x_n, a_n)` for n in 2..=11; `x_n` at 18 decimals scaled by 100, `a_n` at 20 decimals.
    steps: Vec<(BigInt, BigInt)>,
}

static TABLES: LazyLock<Tables> = LazyLock::new(|| {
    let one_18 = pow10(18);
    let one_20 = pow10(20);
    let e18 = |n: u128| BigInt::from(n) * pow10(18);
    let steps = [
        (3200u128, 7_896_296_018_268_069_516_100_000_000_000_000u128),
        (1600, 888_611_052_050_787_263_676_000_000),
        (800, 298_095_798_704_172_827_474_000),
        (400, 5_459_815_003_314_423_907_810),
        (200, 738_905_609_893_065_022_723),
        (100, 271_828_182_845_904_523_536),
        (50, 164_872_127_070_012_814_685),
        (25, 128_402_541_668_774_148_407),
    ]
    .into_iter()
    .map(|(x, a)| (e18(x), BigInt::from(a)))
    .chain([
        (BigInt::from(125u8) * pow10(17), BigInt::from(113_314_845_306_682_631_683u128)),
        (BigInt::from(625u16) * pow10(16), BigInt::from(106_449_445_891_785_942_956u128)),
    ])
    .collect();
    Tables {
        max_natural_exponent: e18(130),
        min_natural_exponent: -e18(41),
        ln_36_lower_bound: &one_18 - pow10(17),
        ln_36_upper_bound: &one_18 + pow10(17),
        mild_exponent_bound: (BigInt::one() << 254u32) / &one_20,
        x_bound: BigInt::one() << 255u32,
        x0: e18(128),
        a0: BigInt::from(38_877_084_059_945_950_922_200u128) * pow10(33),
        x1: e18(64),
        a1: BigInt::from(6_235_149_080_811_616_882_910_000_000u128),
        one_36: pow10(36),
        one_18,
        one_20,
        steps,
    }
});

/// `x^y` for 18-decimal `x` and `y`.
pub fn pow(x: &BigInt, y: &BigInt) -> Result<BigInt> {
    let t = &*TABLES;
    if y.is_zero() {
        return Ok(t.one_18.clone());
    }
    if x.is_zero() {
        return Ok(BigInt::zero());
    }
    if x.is_negative() || x >= &t.x_bound {
        return Err(MathError::XOutOfBounds.into());
    }
    if y.is_negative() || y >= &t.mild_exponent_bound {
        return Err(MathError::YOutOfBounds.into());
    }

    let logx_times_y = if &t.ln_36_lower_bound < x && x < &t.ln_36_upper_bound {
        let ln_36_x = ln_36(x);
        (&ln_36_x / &t.one_18) * y + ((&ln_36_x % &t.one_18) * y) / &t.one_18
    } else {
        ln_inner(x)? * y
    };
    let logx_times_y = logx_times_y / &t.one_18;

    if logx_times_y < t.min_natural_exponent || logx_times_y > t.max_natural_exponent {
        return Err(MathError::ProductOutOfBounds.into());
    }
    exp(&logx_times_y)
}

/// `e^x` for 18-decimal `x` in `[-41, 130]`.
pub fn exp(x: &BigInt) -> Result<BigInt> {
    let t = &*TABLES;
    if x < &t.min_natural_exponent || x > &t.max_natural_exponent {
        return Err(MathError::InvalidExponent.into());
    }
    if x.is_negative() {
        let positive = exp(&-x)?;
        return Ok((&t.one_18 * &t.one_18) / positive);
    }

    let mut x = x.clone();
    let first_an = if x >= t.x0 {
        x -= &t.x0;
        t.a0.clone()
    } else if x >= t.x1 {
        x -= &t.x1;
        t.a1.clone()
    } else {
        BigInt::one()
    };

    x *= 100u8;

    let mut product = t.one_20.clone();
    for (xn, an) in &t.steps[..8] {
        if &x >= xn {
            x -= xn;
            product = (product * an) / &t.one_20;
        }
    }

    let mut series_sum = t.one_20.clone();
    let mut term = x.clone();
    series_sum += &term;
    for divisor in 2u8..=12 {
        term = ((&term * &x) / &t.one_20) / divisor;
        series_sum += &term;
    }

    Ok((((product * series_sum) / &t.one_20) * first_an) / 100u8)
}

/// Natural logarithm of a positive 18-decimal value.
pub fn ln(a: &BigInt) -> Result<BigInt> {
    let t = &*TABLES;
    if !a.is_positive() {
        return Err(MathError::XOutOfBounds.into());
    }
    if &t.ln_36_lower_bound < a && a < &t.ln_36_upper_bound {
        Ok(ln_36(a) / &t.one_18)
    } else {
        ln_inner(a)
    }
}

fn ln_inner(a: &BigInt) -> Result<BigInt> {
    let t = &*TABLES;
    if a.is_zero() {
        return Err(MathError::ZeroDivision.into());
    }
    if a < &t.one_18 {
        let inverse = (&t.one_18 * &t.one_18) / a;
        return Ok(-ln_inner(&inverse)?);
    }

    let mut a = a.clone();
    let mut sum = BigInt::zero();
    if a >= &t.a0 * &t.one_18 {
        a /= &t.a0;
        sum += &t.x0;
    }
    if a >= &t.a1 * &t.one_18 {
        a /= &t.a1;
        sum += &t.x1;
    }

    sum *= 100u8;
    a *= 100u8;

    for (xn, an) in &t.steps {
        if &a >= an {
            a = (a * &t.one_20) / an;
            sum += xn;
        }
    }

    let z = ((&a - &t.one_20) * &t.one_20) / (&a + &t.one_20);
    let z_squared = (&z * &z) / &t.one_20;

    let mut num = z.clone();
    let mut series_sum = num.clone();
    for divisor in [3u8, 5, 7, 9, 11] {
        num = (num * &z_squared) / &t.one_20;
        series_sum += &num / divisor;
    }
    series_sum *= 2u8;

    Ok((sum + series_sum) / 100u8)
}

/// `ln(x)` at 36 decimals for `x` close to 1.
fn ln_36(x: &BigInt) -> BigInt {
    let t = &*TABLES;
    let x = x * &t.one_18;

    let z = ((&x - &t.one_36) * &t.one_36) / (&x + &t.one_36);
    let z_squared = (&z * &z) / &t.one_36;

    let mut num = z.clone();
    let mut series_sum = num.clone();
    for divisor in [3u8, 5, 7, 9, 11, 13, 15] {
        num = (num * &z_squared) / &t.one_36;
        series_sum += &num / divisor;
    }
    series_sum * 2u8
}
