//! Uniform quoting surface over every pool family.
//!
//! A [`Pool`] owns its token balances and a [`PoolKind`] carrying the
//! family's curve parameters. Quotes never touch the balances; only
//! [`Pool::execute`] does, after the whole trade has been computed.

use num_bigint::{BigInt, BigUint};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, InputError, MathError, Result};
use crate::fixed_point;
use crate::pools::fx::FxMath;
use crate::pools::gyro2::Gyro2Math;
use crate::pools::gyro3::Gyro3Math;
use crate::pools::gyro_e::GyroEMath;
use crate::pools::linear::LinearMath;
use crate::pools::stable::StableMath;
use crate::pools::weighted::WeightedMath;
use crate::pools::{SwapContext, SwapKind, SwapMath};
use crate::token::PoolToken;

/// Curve family and its parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PoolKind {
    /// Weighted constant product.
    Weighted(WeightedMath),
    /// Main / wrapped / BPT linear pool.
    Linear(LinearMath),
    /// StableSwap, with price rates for MetaStable.
    Stable(StableMath),
    /// Two-asset concentrated constant product.
    Gyro2(Gyro2Math),
    /// Three-asset concentrated constant product.
    Gyro3(Gyro3Math),
    /// Elliptic concentrated liquidity.
    GyroE(GyroEMath),
    /// Oracle-priced FX curve.
    Fx(FxMath),
}

macro_rules! dispatch {
    ($kind:expr, $m:ident => $call:expr) => {
        match $kind {
            PoolKind::Weighted($m) => $call,
            PoolKind::Linear($m) => $call,
            PoolKind::Stable($m) => $call,
            PoolKind::Gyro2($m) => $call,
            PoolKind::Gyro3($m) => $call,
            PoolKind::GyroE($m) => $call,
            PoolKind::Fx($m) => $call,
        }
    };
}

impl SwapMath for PoolKind {
    fn name(&self) -> &'static str {
        dispatch!(self, m => m.name())
    }

    fn out_given_in(&self, ctx: &SwapContext<'_>, amount_in: &BigInt) -> Result<BigInt> {
        dispatch!(self, m => m.out_given_in(ctx, amount_in))
    }

    fn in_given_out(&self, ctx: &SwapContext<'_>, amount_out: &BigInt) -> Result<BigInt> {
        dispatch!(self, m => m.in_given_out(ctx, amount_out))
    }

    fn swap_limit(&self, ctx: &SwapContext<'_>, kind: SwapKind) -> Result<BigInt> {
        dispatch!(self, m => m.swap_limit(ctx, kind))
    }
}

/// A trade to quote or execute.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRequest {
    /// Which leg `amount` fixes.
    pub kind: SwapKind,
    /// Address of the token sent to the pool.
    pub token_in: String,
    /// Address of the token taken from the pool.
    pub token_out: String,
    /// Fixed amount, native units of the token it refers to.
    pub amount: BigUint,
}

/// Both legs of a computed trade, native units.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapResult {
    /// Direction that was requested.
    pub kind: SwapKind,
    /// Input token address.
    pub token_in: String,
    /// Output token address.
    pub token_out: String,
    /// Amount sent to the pool.
    pub amount_in: BigUint,
    /// Amount taken from the pool.
    pub amount_out: BigUint,
}

/// A pool snapshot ready for quoting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pool {
    /// Chain the pool lives on.
    pub chain_id: u64,
    /// Pool id.
    pub id: String,
    /// Lower-cased pool address.
    pub address: String,
    /// Pool type as reported by the snapshot.
    pub pool_type: String,
    /// Swap fee at 18 decimals.
    pub swap_fee: BigInt,
    /// Tokens in contract order.
    pub tokens: Vec<PoolToken>,
    /// Curve family and parameters.
    pub kind: PoolKind,
}

fn to_unsigned(value: BigInt) -> Result<BigUint> {
    value.to_biguint().ok_or_else(|| MathError::Overflow.into())
}

impl Pool {
    /// Index of `address` among the pool tokens.
    pub fn token_index(&self, address: &str) -> Result<usize> {
        self.tokens
            .iter()
            .position(|t| t.is(address))
            .ok_or_else(|| InputError::UnknownToken(address.to_lowercase()).into())
    }

    fn context(&self, token_in: &str, token_out: &str) -> Result<SwapContext<'_>> {
        let (i, o) = (self.token_index(token_in)?, self.token_index(token_out)?);
        if i == o {
            return Err(InputError::UnsupportedPair {
                token_in: token_in.to_lowercase(),
                token_out: token_out.to_lowercase(),
            }
            .into());
        }
        Ok(SwapContext {
            tokens: &self.tokens,
            token_in: i,
            token_out: o,
            swap_fee: &self.swap_fee,
        })
    }

    /// Amount of `token_out` received for exactly `amount_in` of `token_in`.
    pub fn compute_out_given_in(&self, token_in: &str, token_out: &str, amount_in: &BigUint) -> Result<BigUint> {
        let ctx = self.context(token_in, token_out)?;
        let amount_out = self
            .kind
            .out_given_in(&ctx, &BigInt::from(amount_in.clone()))
            .inspect_err(|e| self.log_failure(e))?;
        debug!(pool = %self.id, family = self.kind.name(), %amount_in, %amount_out, "out given in");
        to_unsigned(amount_out)
    }

    /// Amount of `token_in` required to receive exactly `amount_out` of `token_out`.
    pub fn compute_in_given_out(&self, token_in: &str, token_out: &str, amount_out: &BigUint) -> Result<BigUint> {
        let ctx = self.context(token_in, token_out)?;
        let amount_out = BigInt::from(amount_out.clone());
        let balance = &ctx.tout().balance;
        if &amount_out > balance {
            return Err(Error::limit(amount_out, balance.clone()));
        }
        let amount_in = self
            .kind
            .in_given_out(&ctx, &amount_out)
            .inspect_err(|e| self.log_failure(e))?;
        debug!(pool = %self.id, family = self.kind.name(), %amount_out, %amount_in, "in given out");
        to_unsigned(amount_in)
    }

    /// Largest amount accepted for `kind`: of `token_in` for
    /// [`SwapKind::GivenIn`], of `token_out` for [`SwapKind::GivenOut`].
    pub fn get_swap_limit(&self, token_in: &str, token_out: &str, kind: SwapKind) -> Result<BigUint> {
        let ctx = self.context(token_in, token_out)?;
        let limit = self.kind.swap_limit(&ctx, kind)?;
        debug!(pool = %self.id, ?kind, %limit, "swap limit");
        to_unsigned(limit)
    }

    /// Computes both legs of `request` without touching balances.
    pub fn quote(&self, request: &SwapRequest) -> Result<SwapResult> {
        let (amount_in, amount_out) = match request.kind {
            SwapKind::GivenIn => {
                let out = self.compute_out_given_in(&request.token_in, &request.token_out, &request.amount)?;
                (request.amount.clone(), out)
            }
            SwapKind::GivenOut => {
                let amount_in = self.compute_in_given_out(&request.token_in, &request.token_out, &request.amount)?;
                (amount_in, request.amount.clone())
            }
        };
        Ok(SwapResult {
            kind: request.kind,
            token_in: request.token_in.to_lowercase(),
            token_out: request.token_out.to_lowercase(),
            amount_in,
            amount_out,
        })
    }

    /// Quotes `request` and applies it to the balances. On error the pool is
    /// left unchanged.
    pub fn execute(&mut self, request: &SwapRequest) -> Result<SwapResult> {
        let result = self.quote(request)?;
        let i = self.token_index(&result.token_in)?;
        let o = self.token_index(&result.token_out)?;
        let new_in = &self.tokens[i].balance + BigInt::from(result.amount_in.clone());
        let new_out = fixed_point::sub(&self.tokens[o].balance, &BigInt::from(result.amount_out.clone()))?;
        self.tokens[i].balance = new_in;
        self.tokens[o].balance = new_out;
        debug!(pool = %self.id, amount_in = %result.amount_in, amount_out = %result.amount_out, "executed swap");
        Ok(result)
    }

    fn log_failure(&self, error: &Error) {
        if let Error::InvariantViolation(violation) = error {
            warn!(pool = %self.id, family = self.kind.name(), %violation, "trade rejected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn pool_is_shareable() {
        assert_send_sync::<Pool>();
    }

    #[test]
    fn kind_forwards_to_its_family() {
        let stable = PoolKind::Stable(StableMath { amp: BigInt::from(200_000u32) });
        assert_eq!(stable.name(), "stable");
        let tokens = vec![
            PoolToken::new("0x10", 18, BigInt::from(0u8)).unwrap(),
            PoolToken::new("0x11", 18, fixed_point::pow10(24)).unwrap(),
        ];
        let fee = BigInt::from(0u8);
        let ctx = SwapContext { tokens: &tokens, token_in: 1, token_out: 0, swap_fee: &fee };
        assert_eq!(
            stable.out_given_in(&ctx, &fixed_point::pow10(18)),
            Err(Error::Math(MathError::ZeroDivision))
        );
    }
}
