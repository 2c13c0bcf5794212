//! Weighted constant-product pools.
//!
//! Invariant `prod(b_i ^ w_i)`. Trades are capped at 30% of the balance on
//! the side being solved for.

use std::sync::LazyLock;

use num_bigint::BigInt;
use tracing::trace;

use crate::error::{Error, InputError, Result};
use crate::fixed_point::{self, complement, div_down, div_up, mul_down, mul_up, pow_up, pow10, ONE};

use super::{add_fee, subtract_fee_rounding_up, SwapContext, SwapKind, SwapMath};

static MAX_IN_RATIO: LazyLock<BigInt> = LazyLock::new(|| BigInt::from(3u8) * pow10(17));
static MAX_OUT_RATIO: LazyLock<BigInt> = LazyLock::new(|| BigInt::from(3u8) * pow10(17));

/// Parameters of a weighted pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WeightedMath {
    /// Contract version; version 1 computes every power through `ln`/`exp`.
    pub version: u32,
}

/// `balance_out * (1 - (balance_in / (balance_in + amount_in)) ^ (w_in / w_out))`.
pub fn calc_out_given_in(
    balance_in: &BigInt,
    weight_in: &BigInt,
    balance_out: &BigInt,
    weight_out: &BigInt,
    amount_in: &BigInt,
    version: u32,
) -> Result<BigInt> {
    let max_in = mul_down(balance_in, &MAX_IN_RATIO);
    if amount_in > &max_in {
        return Err(Error::limit(amount_in.clone(), max_in));
    }
    let denominator = balance_in + amount_in;
    let base = div_up(balance_in, &denominator)?;
    let exponent = div_down(weight_in, weight_out)?;
    let power = pow_up(&base, &exponent, version)?;
    Ok(mul_down(balance_out, &complement(&power)))
}

/// `balance_in * ((balance_out / (balance_out - amount_out)) ^ (w_out / w_in) - 1)`.
pub fn calc_in_given_out(
    balance_in: &BigInt,
    weight_in: &BigInt,
    balance_out: &BigInt,
    weight_out: &BigInt,
    amount_out: &BigInt,
    version: u32,
) -> Result<BigInt> {
    let max_out = mul_down(balance_out, &MAX_OUT_RATIO);
    if amount_out > &max_out {
        return Err(Error::limit(amount_out.clone(), max_out));
    }
    let base = div_up(balance_out, &fixed_point::sub(balance_out, amount_out)?)?;
    let exponent = div_up(weight_out, weight_in)?;
    let power = pow_up(&base, &exponent, version)?;
    let ratio = fixed_point::sub(&power, &ONE)?;
    Ok(mul_up(balance_in, &ratio))
}

fn weight<'a>(ctx: &SwapContext<'a>, index: usize) -> Result<&'a BigInt> {
    let token = &ctx.tokens[index];
    token.weight.as_ref().ok_or_else(|| {
        InputError::InvalidParameter {
            name: "weight",
            reason: format!("token {} has no weight", token.address),
        }
        .into()
    })
}

impl SwapMath for WeightedMath {
    fn name(&self) -> &'static str {
        "weighted"
    }

    fn out_given_in(&self, ctx: &SwapContext<'_>, amount_in: &BigInt) -> Result<BigInt> {
        let (tin, tout) = (ctx.tin(), ctx.tout());
        let amount_in = subtract_fee_rounding_up(amount_in, ctx.swap_fee)?;
        let out = calc_out_given_in(
            &tin.balance_scaled18(),
            weight(ctx, ctx.token_in)?,
            &tout.balance_scaled18(),
            weight(ctx, ctx.token_out)?,
            &tin.upscale(&amount_in),
            self.version,
        )?;
        trace!(%amount_in, %out, "weighted out given in");
        Ok(tout.downscale_down(&out))
    }

    fn in_given_out(&self, ctx: &SwapContext<'_>, amount_out: &BigInt) -> Result<BigInt> {
        let (tin, tout) = (ctx.tin(), ctx.tout());
        let amount_in = calc_in_given_out(
            &tin.balance_scaled18(),
            weight(ctx, ctx.token_in)?,
            &tout.balance_scaled18(),
            weight(ctx, ctx.token_out)?,
            &tout.upscale(amount_out),
            self.version,
        )?;
        let amount_in = tin.downscale_up(&amount_in)?;
        trace!(%amount_out, %amount_in, "weighted in given out");
        add_fee(&amount_in, ctx.swap_fee)
    }

    fn swap_limit(&self, ctx: &SwapContext<'_>, kind: SwapKind) -> Result<BigInt> {
        Ok(match kind {
            SwapKind::GivenIn => ctx.tin().downscale_down(&mul_down(&ctx.tin().balance_scaled18(), &MAX_IN_RATIO)),
            SwapKind::GivenOut => ctx.tout().downscale_down(&mul_down(&ctx.tout().balance_scaled18(), &MAX_OUT_RATIO)),
        })
    }
}
