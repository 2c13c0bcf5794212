//! Linear pools: a main token, its yield-bearing wrapper and the pool's own
//! share token (BPT).
//!
//! The invariant is `nominal(main) + wrapped * rate`. Inside the target band
//! the nominal main balance equals the real one; outside it a fee
//! proportional to the distance from the band is charged. BPT uses a virtual
//! supply: the maximum token balance minus what the pool itself holds.

use std::sync::LazyLock;

use num_bigint::BigInt;
use num_traits::{One, Zero};
use tracing::trace;

use crate::error::{InputError, Result};
use crate::fixed_point::{self, div_down, div_down_int, div_up, div_up_int, mul_down, mul_up, pow10, sub, ONE};

use super::{SwapContext, SwapKind, SwapMath};

/// Largest balance a pool can hold, `2^112 - 1`.
pub static MAX_TOKEN_BALANCE: LazyLock<BigInt> = LazyLock::new(|| (BigInt::one() << 112u32) - 1u8);
static ALMOST_ONE: LazyLock<BigInt> = LazyLock::new(|| BigInt::from(99u8) * pow10(16));

/// Curve parameters, all at 18 decimals.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinearParams {
    /// Fee charged outside the target band.
    pub fee: BigInt,
    /// Wrapped token rate.
    pub rate: BigInt,
    /// Lower edge of the target band.
    pub lower_target: BigInt,
    /// Upper edge of the target band.
    pub upper_target: BigInt,
}

/// Real main balance to nominal. Fees are always rounded down.
pub fn to_nominal(real: &BigInt, params: &LinearParams) -> Result<BigInt> {
    if real < &params.lower_target {
        let fees = mul_down(&(&params.lower_target - real), &params.fee);
        sub(real, &fees)
    } else if real <= &params.upper_target {
        Ok(real.clone())
    } else {
        let fees = mul_down(&(real - &params.upper_target), &params.fee);
        sub(real, &fees)
    }
}

/// Nominal main balance to real, rounded down.
pub fn from_nominal(nominal: &BigInt, params: &LinearParams) -> Result<BigInt> {
    if nominal < &params.lower_target {
        div_down(
            &(nominal + mul_down(&params.fee, &params.lower_target)),
            &(&*ONE + &params.fee),
        )
    } else if nominal <= &params.upper_target {
        Ok(nominal.clone())
    } else {
        div_down(
            &sub(nominal, &mul_down(&params.fee, &params.upper_target))?,
            &sub(&ONE, &params.fee)?,
        )
    }
}

fn invariant_up(nominal_main: &BigInt, wrapped: &BigInt, params: &LinearParams) -> BigInt {
    nominal_main + mul_up(wrapped, &params.rate)
}

fn invariant_down(nominal_main: &BigInt, wrapped: &BigInt, params: &LinearParams) -> BigInt {
    nominal_main + mul_down(wrapped, &params.rate)
}

/// BPT minted for `main_in`.
pub fn calc_bpt_out_per_main_in(
    main_in: &BigInt,
    main_balance: &BigInt,
    wrapped_balance: &BigInt,
    bpt_supply: &BigInt,
    params: &LinearParams,
) -> Result<BigInt> {
    if bpt_supply.is_zero() {
        return to_nominal(main_in, params);
    }
    let previous_nominal_main = to_nominal(main_balance, params)?;
    let after_nominal_main = to_nominal(&(main_balance + main_in), params)?;
    let delta_nominal_main = sub(&after_nominal_main, &previous_nominal_main)?;
    let invariant = invariant_up(&previous_nominal_main, wrapped_balance, params);
    div_down_int(&(bpt_supply * delta_nominal_main), &invariant)
}

/// BPT burned for `main_out`.
pub fn calc_bpt_in_per_main_out(
    main_out: &BigInt,
    main_balance: &BigInt,
    wrapped_balance: &BigInt,
    bpt_supply: &BigInt,
    params: &LinearParams,
) -> Result<BigInt> {
    let previous_nominal_main = to_nominal(main_balance, params)?;
    let after_nominal_main = to_nominal(&sub(main_balance, main_out)?, params)?;
    let delta_nominal_main = sub(&previous_nominal_main, &after_nominal_main)?;
    let invariant = invariant_down(&previous_nominal_main, wrapped_balance, params);
    div_up_int(&(bpt_supply * delta_nominal_main), &invariant)
}

/// Wrapped tokens paid out for `main_in`.
pub fn calc_wrapped_out_per_main_in(main_in: &BigInt, main_balance: &BigInt, params: &LinearParams) -> Result<BigInt> {
    let previous_nominal_main = to_nominal(main_balance, params)?;
    let after_nominal_main = to_nominal(&(main_balance + main_in), params)?;
    let delta_nominal_main = sub(&after_nominal_main, &previous_nominal_main)?;
    div_down(&delta_nominal_main, &params.rate)
}

/// Wrapped tokens required for `main_out`.
pub fn calc_wrapped_in_per_main_out(main_out: &BigInt, main_balance: &BigInt, params: &LinearParams) -> Result<BigInt> {
    let previous_nominal_main = to_nominal(main_balance, params)?;
    let after_nominal_main = to_nominal(&sub(main_balance, main_out)?, params)?;
    let delta_nominal_main = sub(&previous_nominal_main, &after_nominal_main)?;
    div_up(&delta_nominal_main, &params.rate)
}

/// Main tokens required to mint `bpt_out`.
pub fn calc_main_in_per_bpt_out(
    bpt_out: &BigInt,
    main_balance: &BigInt,
    wrapped_balance: &BigInt,
    bpt_supply: &BigInt,
    params: &LinearParams,
) -> Result<BigInt> {
    if bpt_supply.is_zero() {
        return from_nominal(bpt_out, params);
    }
    let previous_nominal_main = to_nominal(main_balance, params)?;
    let invariant = invariant_up(&previous_nominal_main, wrapped_balance, params);
    let delta_nominal_main = div_up_int(&(invariant * bpt_out), bpt_supply)?;
    let after_nominal_main = previous_nominal_main + delta_nominal_main;
    let new_main_balance = from_nominal(&after_nominal_main, params)?;
    sub(&new_main_balance, main_balance)
}

/// Main tokens paid out for burning `bpt_in`.
pub fn calc_main_out_per_bpt_in(
    bpt_in: &BigInt,
    main_balance: &BigInt,
    wrapped_balance: &BigInt,
    bpt_supply: &BigInt,
    params: &LinearParams,
) -> Result<BigInt> {
    let previous_nominal_main = to_nominal(main_balance, params)?;
    let invariant = invariant_down(&previous_nominal_main, wrapped_balance, params);
    let delta_nominal_main = div_down_int(&(invariant * bpt_in), bpt_supply)?;
    let after_nominal_main = sub(&previous_nominal_main, &delta_nominal_main)?;
    let new_main_balance = from_nominal(&after_nominal_main, params)?;
    sub(main_balance, &new_main_balance)
}

/// Main tokens paid out for `wrapped_in`.
pub fn calc_main_out_per_wrapped_in(wrapped_in: &BigInt, main_balance: &BigInt, params: &LinearParams) -> Result<BigInt> {
    let previous_nominal_main = to_nominal(main_balance, params)?;
    let delta_nominal_main = mul_down(wrapped_in, &params.rate);
    let after_nominal_main = sub(&previous_nominal_main, &delta_nominal_main)?;
    let new_main_balance = from_nominal(&after_nominal_main, params)?;
    sub(main_balance, &new_main_balance)
}

/// Main tokens required for `wrapped_out`.
pub fn calc_main_in_per_wrapped_out(wrapped_out: &BigInt, main_balance: &BigInt, params: &LinearParams) -> Result<BigInt> {
    let previous_nominal_main = to_nominal(main_balance, params)?;
    let delta_nominal_main = mul_up(wrapped_out, &params.rate);
    let after_nominal_main = previous_nominal_main + delta_nominal_main;
    let new_main_balance = from_nominal(&after_nominal_main, params)?;
    sub(&new_main_balance, main_balance)
}

/// BPT minted for `wrapped_in`.
pub fn calc_bpt_out_per_wrapped_in(
    wrapped_in: &BigInt,
    main_balance: &BigInt,
    wrapped_balance: &BigInt,
    bpt_supply: &BigInt,
    params: &LinearParams,
) -> Result<BigInt> {
    if bpt_supply.is_zero() {
        return Ok(mul_down(wrapped_in, &params.rate));
    }
    let nominal_main = to_nominal(main_balance, params)?;
    let previous_invariant = invariant_up(&nominal_main, wrapped_balance, params);
    let new_wrapped_balance = wrapped_balance + wrapped_in;
    let new_invariant = invariant_down(&nominal_main, &new_wrapped_balance, params);
    let new_bpt_balance = div_down_int(&(bpt_supply * new_invariant), &previous_invariant)?;
    sub(&new_bpt_balance, bpt_supply)
}

/// BPT burned for `wrapped_out`.
pub fn calc_bpt_in_per_wrapped_out(
    wrapped_out: &BigInt,
    main_balance: &BigInt,
    wrapped_balance: &BigInt,
    bpt_supply: &BigInt,
    params: &LinearParams,
) -> Result<BigInt> {
    let nominal_main = to_nominal(main_balance, params)?;
    let previous_invariant = invariant_up(&nominal_main, wrapped_balance, params);
    let new_wrapped_balance = sub(wrapped_balance, wrapped_out)?;
    let new_invariant = invariant_down(&nominal_main, &new_wrapped_balance, params);
    let new_bpt_balance = div_down_int(&(bpt_supply * new_invariant), &previous_invariant)?;
    sub(bpt_supply, &new_bpt_balance)
}

/// Wrapped tokens required to mint `bpt_out`.
pub fn calc_wrapped_in_per_bpt_out(
    bpt_out: &BigInt,
    main_balance: &BigInt,
    wrapped_balance: &BigInt,
    bpt_supply: &BigInt,
    params: &LinearParams,
) -> Result<BigInt> {
    if bpt_supply.is_zero() {
        return div_up(bpt_out, &params.rate);
    }
    let nominal_main = to_nominal(main_balance, params)?;
    let previous_invariant = invariant_up(&nominal_main, wrapped_balance, params);
    let new_bpt_balance = bpt_supply + bpt_out;
    let new_invariant = div_up_int(&(new_bpt_balance * previous_invariant), bpt_supply)?;
    let new_wrapped_balance = div_up(&sub(&new_invariant, &nominal_main)?, &params.rate)?;
    sub(&new_wrapped_balance, wrapped_balance)
}

/// Wrapped tokens paid out for burning `bpt_in`.
pub fn calc_wrapped_out_per_bpt_in(
    bpt_in: &BigInt,
    main_balance: &BigInt,
    wrapped_balance: &BigInt,
    bpt_supply: &BigInt,
    params: &LinearParams,
) -> Result<BigInt> {
    let nominal_main = to_nominal(main_balance, params)?;
    let previous_invariant = invariant_down(&nominal_main, wrapped_balance, params);
    let new_bpt_balance = sub(bpt_supply, bpt_in)?;
    let new_invariant = div_up_int(&(new_bpt_balance * previous_invariant), bpt_supply)?;
    let new_wrapped_balance = div_up(&sub(&new_invariant, &nominal_main)?, &params.rate)?;
    sub(wrapped_balance, &new_wrapped_balance)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Leg {
    Main,
    Wrapped,
    Bpt,
}

fn same_leg(a: Leg, b: Leg) -> crate::error::Error {
    InputError::UnsupportedPair {
        token_in: format!("{a:?}"),
        token_out: format!("{b:?}"),
    }
    .into()
}

/// A linear pool's layout and parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinearMath {
    /// Index of the main token.
    pub main_index: usize,
    /// Index of the wrapped token.
    pub wrapped_index: usize,
    /// Index of the pool's own share token.
    pub bpt_index: usize,
    /// Band and fee; `fee` is the pool swap fee, `rate` the wrapped token rate.
    pub params: LinearParams,
}

struct Balances {
    main: BigInt,
    wrapped: BigInt,
    bpt_supply: BigInt,
}

impl LinearMath {
    fn leg(&self, index: usize) -> Result<Leg> {
        if index == self.main_index {
            Ok(Leg::Main)
        } else if index == self.wrapped_index {
            Ok(Leg::Wrapped)
        } else if index == self.bpt_index {
            Ok(Leg::Bpt)
        } else {
            Err(InputError::InvalidParameter {
                name: "tokens",
                reason: format!("token index {index} is not part of the linear layout"),
            }
            .into())
        }
    }

    fn balances(&self, ctx: &SwapContext<'_>) -> Result<Balances> {
        let bpt_held = ctx.tokens[self.bpt_index].balance_scaled18();
        Ok(Balances {
            main: ctx.tokens[self.main_index].balance_scaled18(),
            wrapped: ctx.tokens[self.wrapped_index].balance_scaled18(),
            bpt_supply: fixed_point::sub(&MAX_TOKEN_BALANCE, &bpt_held)?,
        })
    }

    fn pair(&self, ctx: &SwapContext<'_>) -> Result<(Leg, Leg)> {
        let legs = (self.leg(ctx.token_in)?, self.leg(ctx.token_out)?);
        if legs.0 == legs.1 {
            return Err(InputError::UnsupportedPair {
                token_in: ctx.tin().address.clone(),
                token_out: ctx.tout().address.clone(),
            }
            .into());
        }
        Ok(legs)
    }

    fn out_given_in_scaled(&self, legs: (Leg, Leg), amount: &BigInt, b: &Balances) -> Result<BigInt> {
        let p = &self.params;
        match legs {
            (Leg::Main, Leg::Bpt) => calc_bpt_out_per_main_in(amount, &b.main, &b.wrapped, &b.bpt_supply, p),
            (Leg::Main, Leg::Wrapped) => calc_wrapped_out_per_main_in(amount, &b.main, p),
            (Leg::Wrapped, Leg::Main) => calc_main_out_per_wrapped_in(amount, &b.main, p),
            (Leg::Wrapped, Leg::Bpt) => calc_bpt_out_per_wrapped_in(amount, &b.main, &b.wrapped, &b.bpt_supply, p),
            (Leg::Bpt, Leg::Main) => calc_main_out_per_bpt_in(amount, &b.main, &b.wrapped, &b.bpt_supply, p),
            (Leg::Bpt, Leg::Wrapped) => calc_wrapped_out_per_bpt_in(amount, &b.main, &b.wrapped, &b.bpt_supply, p),
            (a, b) => Err(same_leg(a, b)),
        }
    }

    fn in_given_out_scaled(&self, legs: (Leg, Leg), amount: &BigInt, b: &Balances) -> Result<BigInt> {
        let p = &self.params;
        match legs {
            (Leg::Main, Leg::Bpt) => calc_main_in_per_bpt_out(amount, &b.main, &b.wrapped, &b.bpt_supply, p),
            (Leg::Main, Leg::Wrapped) => calc_main_in_per_wrapped_out(amount, &b.main, p),
            (Leg::Wrapped, Leg::Main) => calc_wrapped_in_per_main_out(amount, &b.main, p),
            (Leg::Wrapped, Leg::Bpt) => calc_wrapped_in_per_bpt_out(amount, &b.main, &b.wrapped, &b.bpt_supply, p),
            (Leg::Bpt, Leg::Main) => calc_bpt_in_per_main_out(amount, &b.main, &b.wrapped, &b.bpt_supply, p),
            (Leg::Bpt, Leg::Wrapped) => calc_bpt_in_per_wrapped_out(amount, &b.main, &b.wrapped, &b.bpt_supply, p),
            (a, b) => Err(same_leg(a, b)),
        }
    }
}

impl SwapMath for LinearMath {
    fn name(&self) -> &'static str {
        "linear"
    }

    fn out_given_in(&self, ctx: &SwapContext<'_>, amount_in: &BigInt) -> Result<BigInt> {
        let legs = self.pair(ctx)?;
        let balances = self.balances(ctx)?;
        let out = self.out_given_in_scaled(legs, &ctx.tin().upscale(amount_in), &balances)?;
        trace!(?legs, %out, "linear out given in");
        Ok(ctx.tout().downscale_down(&out))
    }

    fn in_given_out(&self, ctx: &SwapContext<'_>, amount_out: &BigInt) -> Result<BigInt> {
        let legs = self.pair(ctx)?;
        let balances = self.balances(ctx)?;
        let amount_in = self.in_given_out_scaled(legs, &ctx.tout().upscale(amount_out), &balances)?;
        trace!(?legs, %amount_in, "linear in given out");
        ctx.tin().downscale_up(&amount_in)
    }

    fn swap_limit(&self, ctx: &SwapContext<'_>, kind: SwapKind) -> Result<BigInt> {
        let legs = self.pair(ctx)?;
        let tout = ctx.tout();
        match kind {
            SwapKind::GivenOut => Ok(tout.balance.clone()),
            SwapKind::GivenIn => {
                let balances = self.balances(ctx)?;
                let almost_all = mul_down(&tout.balance_scaled18(), &ALMOST_ONE);
                let amount_in = self.in_given_out_scaled(legs, &almost_all, &balances)?;
                Ok(ctx.tin().downscale_down(&amount_in))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> LinearParams {
        LinearParams {
            fee: BigInt::from(10u8) * pow10(15),
            rate: BigInt::from(11u8) * pow10(17),
            lower_target: BigInt::from(1_000u32) * pow10(18),
            upper_target: BigInt::from(2_000u32) * pow10(18),
        }
    }

    #[test]
    fn nominal_is_identity_inside_band() {
        let p = params();
        let x = BigInt::from(1_500u32) * pow10(18);
        assert_eq!(to_nominal(&x, &p).unwrap(), x);
        assert_eq!(from_nominal(&x, &p).unwrap(), x);
    }

    #[test]
    fn nominal_charges_fee_outside_band() {
        let p = params();
        let below = BigInt::from(500u32) * pow10(18);
        // 500 - 1% of the 500 shortfall
        assert_eq!(to_nominal(&below, &p).unwrap(), BigInt::from(495u32) * pow10(18));
        let above = BigInt::from(2_500u32) * pow10(18);
        assert_eq!(to_nominal(&above, &p).unwrap(), BigInt::from(2_495u32) * pow10(18));
    }

    #[test]
    fn empty_supply_mints_nominal() {
        let p = params();
        let main_in = BigInt::from(1_500u32) * pow10(18);
        let zero = BigInt::zero();
        let out = calc_bpt_out_per_main_in(&main_in, &zero, &zero, &zero, &p).unwrap();
        assert_eq!(out, main_in);
    }
}
