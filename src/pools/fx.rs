//! Oracle-priced two-token FX pools.
//!
//! Balances are valued in a USD numeraire through each token's oracle rate
//! and held as 64.64 fixed point. The curve is flat around the 50/50 ideal;
//! outside a `beta` band a slippage fee grows with the imbalance and trading
//! halts once a side leaves the `alpha` band.

use num_bigint::BigInt;
use num_traits::Signed;
use tracing::{debug, trace};

use crate::abdk::Fixed64;
use crate::error::{Error, InputError, Result, Violation};
use crate::fixed_point::ONE;
use crate::token::PoolToken;

use super::{SwapContext, SwapKind, SwapMath};

const MAX_ITERATIONS: usize = 32;
/// Cap on the per-unit slippage fee, 0.25.
const MAX_FEE: Fixed64 = Fixed64::from_raw(0x4000_0000_0000_0000);
/// Largest tolerated decrease of the fee-adjusted liquidity.
const MAX_DIFF: Fixed64 = Fixed64::from_raw(-0x10C6_F7A0_B5EE);
/// Output changes below this many raw units end the fee iteration.
const CONVERGENCE_UNIT: i128 = 10_000_000_000_000;

/// Curve parameters in 64.64 fixed point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FxParams {
    /// Halt band around the ideal weight.
    pub alpha: Fixed64,
    /// Fee-free band around the ideal weight.
    pub beta: Fixed64,
    /// Slope of the slippage fee.
    pub delta: Fixed64,
    /// Flat trading fee.
    pub epsilon: Fixed64,
    /// Share of a rebalancing fee refunded to the trader.
    pub lambda: Fixed64,
}

/// Converts an 18-decimal value the way the pool contract stores it.
pub fn from_wad(value: &BigInt) -> Result<Fixed64> {
    Fixed64::divu(&(value + 1u8), &ONE)
}

impl FxParams {
    /// Builds parameters from 18-decimal values.
    pub fn from_wads(alpha: &BigInt, beta: &BigInt, delta: &BigInt, epsilon: &BigInt, lambda: &BigInt) -> Result<Self> {
        Ok(FxParams {
            alpha: from_wad(alpha)?,
            beta: from_wad(beta)?,
            delta: from_wad(delta)?,
            epsilon: from_wad(epsilon)?,
            lambda: from_wad(lambda)?,
        })
    }
}

/// Parameters of an FX pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FxMath {
    /// Curve parameters.
    pub params: FxParams,
}

fn oracle(token: &PoolToken) -> Result<(&BigInt, BigInt)> {
    let fx = token.fx.as_ref().ok_or_else(|| InputError::InvalidParameter {
        name: "latestFXPrice",
        reason: format!("token {} has no oracle rate", token.address),
    })?;
    if !fx.rate.is_positive() {
        return Err(InputError::InvalidParameter {
            name: "latestFXPrice",
            reason: format!("token {} has a non-positive rate", token.address),
        }
        .into());
    }
    Ok((&fx.rate, BigInt::from(10u8).pow(fx.decimals)))
}

/// Native token amount to numeraire.
pub fn to_numeraire(token: &PoolToken, amount: &BigInt) -> Result<Fixed64> {
    let (rate, oracle_unit) = oracle(token)?;
    let unit = BigInt::from(10u8).pow(u32::from(token.decimals));
    Fixed64::divu(&(amount * rate / oracle_unit), &unit)
}

/// Numeraire amount to native token units, rounded down.
pub fn from_numeraire(token: &PoolToken, amount: Fixed64) -> Result<BigInt> {
    let (rate, oracle_unit) = oracle(token)?;
    let unit = BigInt::from(10u8).pow(u32::from(token.decimals));
    Ok(amount.mulu(&unit)? * oracle_unit / rate)
}

/// Fee owed by one token whose balance sits outside the `beta` band.
pub fn micro_fee(balance: Fixed64, ideal: Fixed64, beta: Fixed64, delta: Fixed64) -> Result<Fixed64> {
    let (threshold, margin) = if balance < ideal {
        let threshold = ideal.mul(Fixed64::ONE.sub(beta)?)?;
        if balance >= threshold {
            return Ok(Fixed64::ZERO);
        }
        (threshold, threshold.sub(balance)?)
    } else {
        let threshold = ideal.mul(Fixed64::ONE.add(beta)?)?;
        if balance <= threshold {
            return Ok(Fixed64::ZERO);
        }
        (threshold, balance.sub(threshold)?)
    };
    trace!(%threshold, %margin, "fx micro fee");
    let fee = margin.div(ideal)?.mul(delta)?.min(MAX_FEE);
    fee.mul(margin)
}

/// Total slippage fee of a pool state.
pub fn calculate_fee(liquidity: Fixed64, balances: &[Fixed64], weights: &[Fixed64], params: &FxParams) -> Result<Fixed64> {
    balances
        .iter()
        .zip(weights)
        .try_fold(Fixed64::ZERO, |psi, (&balance, &weight)| {
            psi.add(micro_fee(balance, liquidity.mul(weight)?, params.beta, params.delta)?)
        })
}

/// Fails if a trade pushes a balance further outside the `alpha` band.
pub fn enforce_halts(
    old_liquidity: Fixed64,
    new_liquidity: Fixed64,
    old_balances: &[Fixed64],
    new_balances: &[Fixed64],
    weights: &[Fixed64],
    alpha: Fixed64,
) -> Result<()> {
    for ((&old, &new), &weight) in old_balances.iter().zip(new_balances).zip(weights) {
        let ideal = new_liquidity.mul(weight)?;
        if new > ideal {
            let upper = Fixed64::ONE.add(alpha)?;
            let new_halt = ideal.mul(upper)?;
            if new > new_halt {
                let old_halt = old_liquidity.mul(weight)?.mul(upper)?;
                if old < old_halt || new.sub(new_halt)? > old.sub(old_halt)? {
                    return Err(Violation::UpperHalt.into());
                }
            }
        } else {
            let lower = Fixed64::ONE.sub(alpha)?;
            let new_halt = ideal.mul(lower)?;
            if new < new_halt {
                let old_halt = old_liquidity.mul(weight)?.mul(lower)?;
                if old > old_halt || new_halt.sub(new)? > old_halt.sub(old)? {
                    return Err(Violation::LowerHalt.into());
                }
            }
        }
    }
    Ok(())
}

/// Pool state before and after a trade, in numeraire.
#[derive(Clone, Debug)]
pub struct TradeState {
    /// Total liquidity before.
    pub old_liquidity: Fixed64,
    /// Total liquidity after, excluding the unknown leg.
    pub new_liquidity: Fixed64,
    /// Balances before.
    pub old_balances: Vec<Fixed64>,
    /// Balances after, excluding the unknown leg.
    pub new_balances: Vec<Fixed64>,
}

/// Solves for the unknown leg of a trade. `amount` is the known leg, signed
/// from the pool's side; the result carries the opposite sign.
pub fn calculate_trade(
    state: TradeState,
    amount: Fixed64,
    output_index: usize,
    weights: &[Fixed64],
    params: &FxParams,
) -> Result<Fixed64> {
    let TradeState {
        old_liquidity,
        mut new_liquidity,
        old_balances,
        mut new_balances,
    } = state;
    let mut output = amount.checked_neg()?;
    let omega = calculate_fee(old_liquidity, &old_balances, weights, params)?;

    for iteration in 0..MAX_ITERATIONS {
        let psi = calculate_fee(new_liquidity, &new_balances, weights, params)?;
        let previous = output;
        // A trade that worsens the imbalance pays the fee increase in full;
        // one that improves it earns back a `lambda` share.
        output = if omega < psi {
            amount.add(omega)?.sub(psi)?.checked_neg()?
        } else {
            amount.add(params.lambda.mul(omega.sub(psi)?)?)?.checked_neg()?
        };
        trace!(iteration, %output, %psi, "fx trade step");

        new_liquidity = old_liquidity.add(amount)?.add(output)?;
        new_balances[output_index] = old_balances[output_index].add(output)?;

        if output.raw() / CONVERGENCE_UNIT == previous.raw() / CONVERGENCE_UNIT {
            enforce_halts(old_liquidity, new_liquidity, &old_balances, &new_balances, weights, params.alpha)?;
            let diff = new_liquidity.sub(psi)?.sub(old_liquidity.sub(omega)?)?;
            if diff <= Fixed64::ZERO && diff < MAX_DIFF {
                return Err(Violation::SwapInvariant.into());
            }
            return Ok(output);
        }
    }
    Err(Error::convergence("fx trade", MAX_ITERATIONS))
}

impl FxMath {
    fn weights(ctx: &SwapContext<'_>) -> Result<Vec<Fixed64>> {
        let half = from_wad(&(&*ONE / 2u8))?;
        Ok(vec![half; ctx.tokens.len()])
    }

    fn balances(ctx: &SwapContext<'_>) -> Result<Vec<Fixed64>> {
        ctx.tokens.iter().map(|t| to_numeraire(t, &t.balance)).collect()
    }

    /// Builds the trade state for a known leg `amount` (pool's side) on
    /// token `known`, with `unknown` still to be solved.
    fn trade_state(ctx: &SwapContext<'_>, amount: Fixed64, known: usize, unknown: usize) -> Result<TradeState> {
        let old_balances = Self::balances(ctx)?;
        let mut new_balances = old_balances.clone();
        new_balances[known] = new_balances[known].add(amount)?;
        let old_liquidity = sum(&old_balances)?;
        let new_liquidity = sum(&new_balances)?.sub(amount)?;
        new_balances[unknown] = new_balances[unknown].sub(amount)?;
        Ok(TradeState {
            old_liquidity,
            new_liquidity,
            old_balances,
            new_balances,
        })
    }
}

fn sum(values: &[Fixed64]) -> Result<Fixed64> {
    values.iter().try_fold(Fixed64::ZERO, |acc, &v| acc.add(v))
}

impl SwapMath for FxMath {
    fn name(&self) -> &'static str {
        "fx"
    }

    fn out_given_in(&self, ctx: &SwapContext<'_>, amount_in: &BigInt) -> Result<BigInt> {
        let weights = Self::weights(ctx)?;
        let amount = to_numeraire(ctx.tin(), amount_in)?;
        let state = Self::trade_state(ctx, amount, ctx.token_in, ctx.token_out)?;
        let output = calculate_trade(state, amount, ctx.token_out, &weights, &self.params)?;
        let output = output.mul(Fixed64::ONE.sub(self.params.epsilon)?)?;
        debug!(%amount, %output, "fx out given in");
        from_numeraire(ctx.tout(), output.abs()?)
    }

    fn in_given_out(&self, ctx: &SwapContext<'_>, amount_out: &BigInt) -> Result<BigInt> {
        let weights = Self::weights(ctx)?;
        let amount = to_numeraire(ctx.tout(), amount_out)?.checked_neg()?;
        let state = Self::trade_state(ctx, amount, ctx.token_out, ctx.token_in)?;
        let input = calculate_trade(state, amount, ctx.token_in, &weights, &self.params)?;
        let input = input.mul(Fixed64::ONE.add(self.params.epsilon)?)?;
        debug!(%amount, %input, "fx in given out");
        from_numeraire(ctx.tin(), input.abs()?)
    }

    fn swap_limit(&self, ctx: &SwapContext<'_>, kind: SwapKind) -> Result<BigInt> {
        let weights = Self::weights(ctx)?;
        let balances = Self::balances(ctx)?;
        let liquidity = sum(&balances)?;
        let (token, headroom) = match kind {
            SwapKind::GivenIn => {
                let i = ctx.token_in;
                let upper = liquidity.mul(weights[i])?.mul(Fixed64::ONE.add(self.params.alpha)?)?;
                (ctx.tin(), upper.sub(balances[i])?)
            }
            SwapKind::GivenOut => {
                let o = ctx.token_out;
                let lower = liquidity.mul(weights[o])?.mul(Fixed64::ONE.sub(self.params.alpha)?)?;
                (ctx.tout(), balances[o].sub(lower)?)
            }
        };
        from_numeraire(token, headroom.max(Fixed64::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_point::pow10;

    fn params() -> FxParams {
        let wad = |n: u64, exp: u32| BigInt::from(n) * pow10(exp);
        FxParams::from_wads(&wad(8, 17), &wad(48, 16), &wad(175, 15), &wad(5, 14), &wad(3, 17)).unwrap()
    }

    #[test]
    fn micro_fee_is_zero_inside_the_band() {
        let p = params();
        let ideal = Fixed64::from_int(100);
        assert_eq!(micro_fee(Fixed64::from_int(60), ideal, p.beta, p.delta).unwrap(), Fixed64::ZERO);
        assert_eq!(micro_fee(Fixed64::from_int(140), ideal, p.beta, p.delta).unwrap(), Fixed64::ZERO);
        assert!(micro_fee(Fixed64::from_int(40), ideal, p.beta, p.delta).unwrap() > Fixed64::ZERO);
        assert!(micro_fee(Fixed64::from_int(160), ideal, p.beta, p.delta).unwrap() > Fixed64::ZERO);
    }

    #[test]
    fn halts_when_leaving_the_alpha_band() {
        let p = params();
        let half = from_wad(&(&*ONE / 2u8)).unwrap();
        let weights = [half, half];
        let old = [Fixed64::from_int(100), Fixed64::from_int(100)];
        let new = [Fixed64::from_int(195), Fixed64::from_int(5)];
        let err = enforce_halts(Fixed64::from_int(200), Fixed64::from_int(200), &old, &new, &weights, p.alpha)
            .unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(Violation::UpperHalt)));
    }
}
