//! Pool tokens and precision conversion.
//!
//! Balances are held at the token's native precision. Calculators upscale to
//! 18 decimals on entry and downscale on exit, rounding in whichever
//! direction favours the pool.

use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use serde::{Deserialize, Serialize};

use crate::error::{InputError, Result};
use crate::fixed_point::{self, pow10, ONE};

/// Largest supported token precision.
pub const MAX_DECIMALS: u8 = 18;

/// Decimal shift past which a parsed value cannot fit in 256 bits.
const MAX_SHIFT: i64 = 78;

/// Oracle data attached to FX pool tokens.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FxOracle {
    /// Latest USD price at `decimals` precision.
    pub rate: BigInt,
    /// Precision of `rate`.
    pub decimals: u32,
}

/// A reserve held by a pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolToken {
    /// Lower-cased token address.
    pub address: String,
    /// Native precision.
    pub decimals: u8,
    /// Reserve balance at native precision.
    pub balance: BigInt,
    /// Normalised weight at 18 decimals (weighted pools only).
    pub weight: Option<BigInt>,
    /// Price rate at 18 decimals; 1.0 for plain tokens.
    pub price_rate: BigInt,
    /// Oracle data (FX pools only).
    pub fx: Option<FxOracle>,
}

impl PoolToken {
    /// Plain token with a balance and no extra metadata.
    pub fn new(address: impl AsRef<str>, decimals: u8, balance: BigInt) -> Result<Self> {
        if decimals > MAX_DECIMALS {
            return Err(InputError::InvalidParameter {
                name: "decimals",
                reason: format!("{decimals} exceeds {MAX_DECIMALS}"),
            }
            .into());
        }
        if balance.is_negative() {
            return Err(InputError::InvalidParameter {
                name: "balance",
                reason: "negative balance".to_owned(),
            }
            .into());
        }
        Ok(PoolToken {
            address: address.as_ref().to_lowercase(),
            decimals,
            balance,
            weight: None,
            price_rate: ONE.clone(),
            fx: None,
        })
    }

    /// Sets the 18-decimal weight.
    pub fn with_weight(mut self, weight: BigInt) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Sets the 18-decimal price rate.
    pub fn with_price_rate(mut self, rate: BigInt) -> Self {
        self.price_rate = rate;
        self
    }

    /// Attaches FX oracle data.
    pub fn with_fx_oracle(mut self, rate: BigInt, decimals: u32) -> Self {
        self.fx = Some(FxOracle { rate, decimals });
        self
    }

    /// `10^(18 - decimals)`.
    pub fn scaling_factor(&self) -> BigInt {
        pow10(u32::from(MAX_DECIMALS - self.decimals.min(MAX_DECIMALS)))
    }

    /// Native amount to 18 decimals.
    pub fn upscale(&self, amount: &BigInt) -> BigInt {
        amount * self.scaling_factor()
    }

    /// 18-decimal amount to native, rounding down.
    pub fn downscale_down(&self, amount: &BigInt) -> BigInt {
        amount / self.scaling_factor()
    }

    /// 18-decimal amount to native, rounding up.
    pub fn downscale_up(&self, amount: &BigInt) -> Result<BigInt> {
        fixed_point::div_up_int(amount, &self.scaling_factor())
    }

    /// Balance at 18 decimals.
    pub fn balance_scaled18(&self) -> BigInt {
        self.upscale(&self.balance)
    }

    /// Whether `address` names this token (case-insensitive).
    pub fn is(&self, address: &str) -> bool {
        self.address.eq_ignore_ascii_case(address)
    }
}

/// Parses a decimal string such as `"12.5"`, `"-0.3"` or `"1e-6"` into an
/// integer at `decimals` precision. Digits beyond the precision are dropped.
pub fn parse_fixed(value: &str, decimals: u32) -> Result<BigInt> {
    let invalid = || InputError::InvalidDecimal(value.to_owned());
    let trimmed = value.trim();
    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
        Some(at) => {
            let exp: i64 = unsigned[at + 1..].parse().map_err(|_| invalid())?;
            (&unsigned[..at], exp)
        }
        None => (unsigned, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid().into());
    }
    if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(invalid().into());
    }

    let digit_count = int_part.len() + frac_part.len();
    let digits = format!("{int_part}{frac_part}");
    let digits: BigInt = if digits.is_empty() { BigInt::zero() } else { digits.parse().map_err(|_| invalid())? };
    // value = digits * 10^(exponent - frac_len); scale by 10^decimals.
    let shift = i64::from(decimals)
        .saturating_add(exponent)
        .saturating_sub(frac_part.len() as i64);
    let magnitude = if shift > MAX_SHIFT {
        return Err(invalid().into());
    } else if shift >= 0 {
        digits * pow10(shift as u32)
    } else if shift.unsigned_abs() > digit_count as u64 {
        BigInt::zero()
    } else {
        digits / pow10(shift.unsigned_abs() as u32)
    };
    Ok(if negative { -magnitude } else { magnitude })
}

/// Parses a non-negative decimal string.
pub fn parse_unsigned(value: &str, decimals: u32) -> Result<BigInt> {
    let parsed = parse_fixed(value, decimals)?;
    if parsed.is_negative() {
        return Err(InputError::InvalidDecimal(value.to_owned()).into());
    }
    Ok(parsed)
}
