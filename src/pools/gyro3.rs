//! Three-asset concentrated constant-product pools (Gyro 3-CLP).
//!
//! All three prices share the bounds `[alpha, 1/alpha]`, so a single
//! parameter `cbrt(alpha)` describes the pool. The invariant solves
//! `prod(b_i + L * cbrt(alpha)) = L^3`, a cubic handled by Newton iteration.

use std::sync::LazyLock;

use num_bigint::BigInt;
use num_traits::Zero;
use tracing::trace;

use crate::error::{Error, InputError, Result, Violation};
use crate::fixed_point::{complement, div_down, div_up, mul_down, mul_up, pow10, sub, ONE};
use crate::xp_math::sqrt;

use super::gyro2::SWAP_LIMIT_FACTOR;
use super::{add_fee, subtract_fee_rounding_down, SwapContext, SwapKind, SwapMath};

const MAX_ITERATIONS: usize = 255;

/// Largest Newton iterate whose cube still fits the plain `mul_down` chain.
/// Pools beyond it need split-precision arithmetic and are rejected.
static MAX_SIMPLE_INVARIANT: LazyLock<BigInt> = LazyLock::new(|| BigInt::from(2u8) * pow10(31));

/// Cube root of the lower price bound at 18 decimals.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Gyro3Math {
    /// `cbrt(alpha)`.
    pub root3_alpha: BigInt,
}

/// Coefficients of `a L^3 - mb L^2 - mc L - md = 0`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cubic {
    /// `1 - alpha`.
    pub a: BigInt,
    /// `-b`.
    pub mb: BigInt,
    /// `-c`.
    pub mc: BigInt,
    /// `-d`.
    pub md: BigInt,
    alpha: BigInt,
}

impl Cubic {
    /// Builds the cubic for balances `[x, y, z]`.
    pub fn new(balances: [&BigInt; 3], root3_alpha: &BigInt) -> Result<Self> {
        let [x, y, z] = balances;
        let r = root3_alpha;
        let alpha = mul_down(&mul_down(r, r), r);
        let a = sub(&ONE, &alpha)?;
        let mb = mul_down(&mul_down(&(x + y + z), r), r);
        let mc = mul_down(&(mul_down(x, y) + mul_down(y, z) + mul_down(z, x)), r);
        let md = mul_down(&mul_down(x, y), z);
        Ok(Cubic { a, mb, mc, md, alpha })
    }

    /// A point right of the largest root's local minimum, where Newton
    /// iteration descends monotonically.
    fn starting_point(&self) -> Result<BigInt> {
        let radicand = mul_up(&self.mb, &self.mb) + mul_up(&self.a, &(&self.mc * 3u8));
        let a3 = &self.a * 3u8;
        let local_min = div_up(&self.mb, &a3)? + div_up(&sqrt(&radicand, 5)?, &a3)?;
        let factor = if self.alpha >= &*ONE / 2u8 {
            &*ONE * 3u8 / 2u8
        } else {
            &*ONE * 2u8
        };
        Ok(mul_up(&local_min, &factor))
    }

    /// Newton step at `l` as `(|delta|, delta > 0)`.
    fn newton_delta(&self, l: &BigInt, r: &BigInt) -> Result<(BigInt, bool)> {
        if l > &*MAX_SIMPLE_INVARIANT {
            return Err(Violation::MaxInvariantExceeded.into());
        }
        let l2 = mul_down(l, l);
        let mut derivative = &l2 * 3u8;
        derivative -= mul_down(&mul_down(&mul_down(&derivative, r), r), r);
        let derivative = sub(&sub(&derivative, &(mul_down(l, &self.mb) * 2u8))?, &self.mc)?;

        let mut l3 = mul_down(&mul_down(l, l), l);
        l3 -= mul_down(&mul_down(&mul_down(&l3, r), r), r);
        let delta_minus = div_down(&l3, &derivative)?;
        let delta_plus =
            div_down(&(mul_down(&l2, &self.mb) + mul_down(l, &self.mc)), &derivative)? + div_down(&self.md, &derivative)?;

        Ok(if delta_plus >= delta_minus {
            (delta_plus - delta_minus, true)
        } else {
            (delta_minus - delta_plus, false)
        })
    }
}

/// Solves the invariant `L` for `[x, y, z]`.
pub fn calculate_invariant(balances: [&BigInt; 3], root3_alpha: &BigInt) -> Result<BigInt> {
    let cubic = Cubic::new(balances, root3_alpha)?;
    let mut root = cubic.starting_point()?;
    let mut previous = BigInt::zero();
    for iteration in 0..MAX_ITERATIONS {
        let (delta, positive) = cubic.newton_delta(&root, root3_alpha)?;
        trace!(iteration, %root, %delta, positive, "gyro3 newton step");
        // Past the first steps the iteration only moves down; an upward step
        // or a stalled decrease means rounding noise has taken over.
        if delta <= BigInt::from(1u8)
            || (iteration >= 2 && positive)
            || (iteration >= 2 && delta >= &previous / 8u8)
        {
            return Ok(root);
        }
        if positive {
            root += &delta;
        } else {
            root -= &delta;
        }
        previous = delta;
    }
    Err(Error::convergence("gyro3 invariant", MAX_ITERATIONS))
}

impl Gyro3Math {
    fn tertiary(ctx: &SwapContext<'_>) -> Result<usize> {
        (0..ctx.tokens.len())
            .find(|&i| i != ctx.token_in && i != ctx.token_out)
            .ok_or_else(|| {
                InputError::InvalidParameter {
                    name: "tokens",
                    reason: "gyro3 pools hold three tokens".to_owned(),
                }
                .into()
            })
    }

    /// Scaled `(balance_in, balance_out, balance_tertiary, L)`.
    fn state(&self, ctx: &SwapContext<'_>) -> Result<[BigInt; 4]> {
        let balance_in = ctx.tin().balance_scaled18();
        let balance_out = ctx.tout().balance_scaled18();
        let tertiary = ctx.tokens[Self::tertiary(ctx)?].balance_scaled18();
        let invariant = calculate_invariant([&balance_in, &balance_out, &tertiary], &self.root3_alpha)?;
        Ok([balance_in, balance_out, tertiary, invariant])
    }
}

fn virtual_balances(balance_in: &BigInt, balance_out: &BigInt, offset: &BigInt) -> (BigInt, BigInt) {
    (
        balance_in + mul_up(offset, &(&*ONE + 2u8)),
        balance_out + mul_down(offset, &(&*ONE - 1u8)),
    )
}

/// Output for `amount_in` given the shared virtual offset `L * cbrt(alpha)`.
pub fn calc_out_given_in(balance_in: &BigInt, balance_out: &BigInt, amount_in: &BigInt, offset: &BigInt) -> Result<BigInt> {
    let (in_over, out_under) = virtual_balances(balance_in, balance_out, offset);
    let amount_out = div_down(&mul_down(&out_under, amount_in), &(in_over + amount_in))?;
    if &amount_out > balance_out {
        return Err(Violation::AssetBoundsExceeded.into());
    }
    Ok(amount_out)
}

/// Input for `amount_out` given the shared virtual offset.
pub fn calc_in_given_out(balance_in: &BigInt, balance_out: &BigInt, amount_out: &BigInt, offset: &BigInt) -> Result<BigInt> {
    if amount_out > balance_out {
        return Err(Violation::AssetBoundsExceeded.into());
    }
    let (in_over, out_under) = virtual_balances(balance_in, balance_out, offset);
    div_up(&mul_up(&in_over, amount_out), &sub(&out_under, amount_out)?)
}

impl SwapMath for Gyro3Math {
    fn name(&self) -> &'static str {
        "gyro3"
    }

    fn out_given_in(&self, ctx: &SwapContext<'_>, amount_in: &BigInt) -> Result<BigInt> {
        let [balance_in, balance_out, _, invariant] = self.state(ctx)?;
        let offset = mul_down(&invariant, &self.root3_alpha);
        let amount_in = subtract_fee_rounding_down(amount_in, ctx.swap_fee)?;
        let out = calc_out_given_in(&balance_in, &balance_out, &ctx.tin().upscale(&amount_in), &offset)?;
        Ok(ctx.tout().downscale_down(&out))
    }

    fn in_given_out(&self, ctx: &SwapContext<'_>, amount_out: &BigInt) -> Result<BigInt> {
        let [balance_in, balance_out, _, invariant] = self.state(ctx)?;
        let offset = mul_down(&invariant, &self.root3_alpha);
        let amount_in = calc_in_given_out(&balance_in, &balance_out, &ctx.tout().upscale(amount_out), &offset)?;
        add_fee(&ctx.tin().downscale_up(&amount_in)?, ctx.swap_fee)
    }

    fn swap_limit(&self, ctx: &SwapContext<'_>, kind: SwapKind) -> Result<BigInt> {
        match kind {
            SwapKind::GivenIn => {
                let [balance_in, _, tertiary, invariant] = self.state(ctx)?;
                let offset = mul_down(&invariant, &self.root3_alpha);
                // The output side bottoms out at its virtual offset; the input
                // virtual balance there is L^3 / (offset * (z + offset)).
                let l3 = mul_down(&mul_down(&invariant, &invariant), &invariant);
                let in_at_bound = div_down(&l3, &mul_up(&offset, &(&tertiary + &offset)))?;
                let spent = &offset + &balance_in;
                let headroom = if in_at_bound > spent { in_at_bound - spent } else { BigInt::zero() };
                let limit = div_down(&headroom, &complement(ctx.swap_fee))?;
                Ok(ctx.tin().downscale_down(&limit))
            }
            SwapKind::GivenOut => {
                let tout = ctx.tout();
                Ok(tout.downscale_down(&mul_down(&tout.balance_scaled18(), &SWAP_LIMIT_FACTOR)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::PoolToken;

    #[test]
    fn balanced_pool_invariant_is_exact() {
        // L = x / (1 - cbrt(alpha)) when all balances are equal.
        let balance = BigInt::from(1_000u32) * pow10(18);
        let root3_alpha = BigInt::from(999_500_000_000_000_000u64);
        let invariant = calculate_invariant([&balance, &balance, &balance], &root3_alpha).unwrap();
        assert_eq!(invariant, BigInt::from(2_000_000u32) * pow10(18));
    }

    #[test]
    fn unbalanced_pool_converges() {
        let root3_alpha = BigInt::from(987_654_321_000_000_000u64);
        let balances = [pow10(24), BigInt::from(2u8) * pow10(24), BigInt::from(3u8) * pow10(23)];
        let invariant = calculate_invariant([&balances[0], &balances[1], &balances[2]], &root3_alpha).unwrap();
        assert_eq!(invariant, "88878482714764904702337568".parse::<BigInt>().unwrap());
    }

    #[test]
    fn swap_round_trip_recovers_the_input() {
        let tokens: Vec<PoolToken> = [(1u8, 10u8), (2, 10), (3, 1)]
            .into_iter()
            .map(|(id, scale)| PoolToken::new(format!("0x{id:02x}"), 18, BigInt::from(id) * pow10(23) * scale).unwrap())
            .collect();
        let fee = BigInt::from(3_000_000_000_000_000u64);
        let ctx = SwapContext {
            tokens: &tokens,
            token_in: 0,
            token_out: 1,
            swap_fee: &fee,
        };
        let math = Gyro3Math {
            root3_alpha: BigInt::from(987_654_321_000_000_000u64),
        };
        let amount = BigInt::from(1_000u32) * pow10(18);
        let out = math.out_given_in(&ctx, &amount).unwrap();
        assert_eq!(out, "1008218530610450643900".parse::<BigInt>().unwrap());
        assert_eq!(math.in_given_out(&ctx, &out).unwrap(), amount);
    }

    #[test]
    fn oversized_invariant_is_rejected() {
        let root3_alpha = BigInt::from(999_500_000_000_000_000u64);
        let balance = pow10(29);
        let err = calculate_invariant([&balance, &balance, &balance], &root3_alpha).unwrap_err();
        assert_eq!(err, Error::InvariantViolation(Violation::MaxInvariantExceeded));

        let balance = pow10(27);
        let invariant = calculate_invariant([&balance, &balance, &balance], &root3_alpha).unwrap();
        assert_eq!(invariant, BigInt::from(2_000u32) * pow10(27));
    }
}
