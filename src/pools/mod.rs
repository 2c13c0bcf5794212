//! Per-family swap calculators.
//!
//! Every family implements [`SwapMath`] over a [`SwapContext`]: the pool's
//! tokens at native precision, the trade's token indices and the swap fee.
//! Amounts in and out of the trait are native token units; each family
//! scales to its own working precision internally.

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::fixed_point::{complement, div_up, mul_down, mul_up, sub};
use crate::token::PoolToken;

pub mod fx;
pub mod gyro2;
pub mod gyro3;
pub mod gyro_e;
pub mod linear;
pub mod stable;
pub mod weighted;

/// Direction of a trade.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwapKind {
    /// The input amount is fixed; solve for the output.
    GivenIn,
    /// The output amount is fixed; solve for the input.
    GivenOut,
}

/// Pool state seen by a calculator for one trade.
#[derive(Clone, Copy, Debug)]
pub struct SwapContext<'a> {
    /// All pool tokens in contract order.
    pub tokens: &'a [PoolToken],
    /// Index of the token sent to the pool.
    pub token_in: usize,
    /// Index of the token taken from the pool.
    pub token_out: usize,
    /// Swap fee at 18 decimals.
    pub swap_fee: &'a BigInt,
}

impl<'a> SwapContext<'a> {
    /// The input token.
    pub fn tin(&self) -> &'a PoolToken {
        &self.tokens[self.token_in]
    }

    /// The output token.
    pub fn tout(&self) -> &'a PoolToken {
        &self.tokens[self.token_out]
    }
}

/// Swap and limit math for one pool family.
pub trait SwapMath {
    /// Family name used in logs.
    fn name(&self) -> &'static str;

    /// Output amount for an exact input, both in native units.
    fn out_given_in(&self, ctx: &SwapContext<'_>, amount_in: &BigInt) -> Result<BigInt>;

    /// Input amount for an exact output, both in native units.
    fn in_given_out(&self, ctx: &SwapContext<'_>, amount_out: &BigInt) -> Result<BigInt>;

    /// Largest amount accepted for `kind`: an input for `GivenIn`, an output
    /// for `GivenOut`. Native units of that token.
    fn swap_limit(&self, ctx: &SwapContext<'_>, kind: SwapKind) -> Result<BigInt>;
}

/// `amount - amount * fee`, fee rounded up.
pub(crate) fn subtract_fee_rounding_up(amount: &BigInt, fee: &BigInt) -> Result<BigInt> {
    sub(amount, &mul_up(amount, fee))
}

/// `amount - amount * fee`, fee rounded down.
pub(crate) fn subtract_fee_rounding_down(amount: &BigInt, fee: &BigInt) -> Result<BigInt> {
    sub(amount, &mul_down(amount, fee))
}

/// `amount / (1 - fee)`, rounded up.
pub(crate) fn add_fee(amount: &BigInt, fee: &BigInt) -> Result<BigInt> {
    div_up(amount, &complement(fee))
}
