//! Signed 64.64 binary fixed point, as computed by the FX curve contract.
//!
//! Products are floored (arithmetic shift) and quotients truncate, so values
//! differ from a decimal model in the last bit exactly where the contract's
//! do.

use std::fmt;
use std::ops::Neg;

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Signed, Zero};

use crate::error::{MathError, Result};

const FRACTION_BITS: u32 = 64;

/// A signed 64.64 fixed-point number.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fixed64(i128);

impl Fixed64 {
    /// 0.0
    pub const ZERO: Fixed64 = Fixed64(0);
    /// 1.0
    pub const ONE: Fixed64 = Fixed64(1 << FRACTION_BITS);

    /// Wraps a raw 64.64 value.
    pub const fn from_raw(raw: i128) -> Self {
        Fixed64(raw)
    }

    /// The raw 64.64 representation.
    pub const fn raw(self) -> i128 {
        self.0
    }

    /// Converts an integer.
    pub fn from_int(value: i64) -> Self {
        Fixed64(i128::from(value) << FRACTION_BITS)
    }

    fn from_big(value: BigInt) -> Result<Self> {
        i128::try_from(&value)
            .map(Fixed64)
            .map_err(|_| MathError::Overflow.into())
    }

    /// Checked addition.
    pub fn add(self, other: Self) -> Result<Self> {
        self.0
            .checked_add(other.0)
            .map(Fixed64)
            .ok_or_else(|| MathError::Overflow.into())
    }

    /// Checked subtraction.
    pub fn sub(self, other: Self) -> Result<Self> {
        self.0
            .checked_sub(other.0)
            .map(Fixed64)
            .ok_or_else(|| MathError::Overflow.into())
    }

    /// `self * other`, floored.
    pub fn mul(self, other: Self) -> Result<Self> {
        let product = BigInt::from(self.0) * BigInt::from(other.0);
        Self::from_big(product.div_floor(&(BigInt::from(1u8) << FRACTION_BITS)))
    }

    /// `self / other`, truncated.
    pub fn div(self, other: Self) -> Result<Self> {
        if other.0 == 0 {
            return Err(MathError::ZeroDivision.into());
        }
        Self::from_big((BigInt::from(self.0) << FRACTION_BITS) / BigInt::from(other.0))
    }

    /// `x / y` for unsigned integers, returned as 64.64 (floored).
    pub fn divu(x: &BigInt, y: &BigInt) -> Result<Self> {
        if y.is_zero() {
            return Err(MathError::ZeroDivision.into());
        }
        if x.is_negative() || y.is_negative() {
            return Err(MathError::Overflow.into());
        }
        Self::from_big((x << FRACTION_BITS) / y)
    }

    /// `self * y` for an unsigned integer `y`, returned as an integer (floored).
    pub fn mulu(self, y: &BigInt) -> Result<BigInt> {
        if y.is_zero() {
            return Ok(BigInt::zero());
        }
        if self.0 < 0 || y.is_negative() {
            return Err(MathError::Overflow.into());
        }
        Ok((BigInt::from(self.0) * y) >> FRACTION_BITS)
    }

    /// Absolute value.
    pub fn abs(self) -> Result<Self> {
        self.0
            .checked_abs()
            .map(Fixed64)
            .ok_or_else(|| MathError::Overflow.into())
    }

    /// Checked negation.
    pub fn checked_neg(self) -> Result<Self> {
        self.0
            .checked_neg()
            .map(Fixed64)
            .ok_or_else(|| MathError::Overflow.into())
    }

    /// Whether the value is below zero.
    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl Neg for Fixed64 {
    type Output = Fixed64;

    fn neg(self) -> Fixed64 {
        Fixed64(self.0.wrapping_neg())
    }
}

impl fmt::Display for Fixed64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.18}", self.0 as f64 / (1u128 << FRACTION_BITS) as f64)
    }
}
