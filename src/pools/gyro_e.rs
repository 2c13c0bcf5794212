//! Elliptic concentrated liquidity pools (Gyro E-CLP).
//!
//! The trading curve is a circle stretched by `lambda` and rotated by the
//! angle `(c, s)`, clipped to prices in `[alpha, beta]`. Swaps work on
//! signed values mixing 18-decimal ("np") and 38-decimal ("xp") precision,
//! and every term rounds so that the pool never loses.

use std::sync::LazyLock;

use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{Result, Violation};
use crate::fixed_point::{complement, div_down, mul_down, pow10};
use crate::xp_math::{
    self as xp, div_down_mag_u, div_up_mag_u, div_xp_u, mul_down_mag_u, mul_down_xp_to_np_u, mul_up_mag_u,
    mul_up_xp_to_np_u, mul_xp_u, sqrt, ONE_XP,
};

use super::gyro2::SWAP_LIMIT_FACTOR;
use super::{add_fee, subtract_fee_rounding_down, SwapContext, SwapKind, SwapMath};

static MAX_BALANCES: LazyLock<BigInt> = LazyLock::new(|| pow10(34));
static MAX_INVARIANT: LazyLock<BigInt> = LazyLock::new(|| BigInt::from(3u8) * pow10(37));

/// A point or direction in the pool's price plane.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vector2 {
    /// First coordinate.
    pub x: BigInt,
    /// Second coordinate.
    pub y: BigInt,
}

impl Vector2 {
    /// A vector from its coordinates.
    pub fn new(x: BigInt, y: BigInt) -> Self {
        Vector2 { x, y }
    }
}

/// Curve shape at 18 decimals.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GyroEParams {
    /// Lower price bound.
    pub alpha: BigInt,
    /// Upper price bound.
    pub beta: BigInt,
    /// Cosine of the rotation angle.
    pub c: BigInt,
    /// Sine of the rotation angle.
    pub s: BigInt,
    /// Stretch factor.
    pub lambda: BigInt,
}

/// Values precomputed from [`GyroEParams`] off chain, at 38 decimals.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedGyroEParams {
    /// Unit tangent at the lower price bound.
    pub tau_alpha: Vector2,
    /// Unit tangent at the upper price bound.
    pub tau_beta: Vector2,
    /// Auxiliary term.
    pub u: BigInt,
    /// Auxiliary term.
    pub v: BigInt,
    /// Auxiliary term.
    pub w: BigInt,
    /// Auxiliary term.
    pub z: BigInt,
    /// Squared norm correction of `(c, s)`.
    pub d_sq: BigInt,
}

/// Parameters of an E-CLP pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GyroEMath {
    /// Curve shape.
    pub params: GyroEParams,
    /// Derived values.
    pub derived: DerivedGyroEParams,
}

/// `term_xp / d_sq^4`.
fn div_d_sq4(term_xp: &BigInt, d_sq: &BigInt) -> Result<BigInt> {
    let d_sq2 = mul_xp_u(d_sq, d_sq);
    div_xp_u(term_xp, &mul_xp_u(&d_sq2, &d_sq2))
}

/// `x` coordinate of the ellipse centre offset for invariant `r`.
pub fn virtual_offset0(p: &GyroEParams, d: &DerivedGyroEParams, r: &Vector2) -> Result<BigInt> {
    let term_xp = div_xp_u(&d.tau_beta.x, &d.d_sq)?;
    let a = if d.tau_beta.x.is_positive() {
        mul_up_xp_to_np_u(&mul_up_mag_u(&mul_up_mag_u(&r.x, &p.lambda), &p.c), &term_xp)
    } else {
        mul_up_xp_to_np_u(&mul_down_mag_u(&mul_down_mag_u(&r.y, &p.lambda), &p.c), &term_xp)
    };
    let b = mul_up_xp_to_np_u(&mul_up_mag_u(&r.x, &p.s), &div_xp_u(&d.tau_beta.y, &d.d_sq)?);
    xp::add(&a, &b)
}

/// `y` coordinate of the ellipse centre offset for invariant `r`.
pub fn virtual_offset1(p: &GyroEParams, d: &DerivedGyroEParams, r: &Vector2) -> Result<BigInt> {
    let term_xp = div_xp_u(&d.tau_alpha.x, &d.d_sq)?;
    let b = if d.tau_alpha.x.is_negative() {
        mul_up_xp_to_np_u(&mul_up_mag_u(&mul_up_mag_u(&r.x, &p.lambda), &p.s), &-term_xp)
    } else {
        mul_up_xp_to_np_u(&mul_down_mag_u(&mul_down_mag_u(&-&r.y, &p.lambda), &p.s), &term_xp)
    };
    let c = mul_up_xp_to_np_u(&mul_up_mag_u(&r.x, &p.c), &div_xp_u(&d.tau_alpha.y, &d.d_sq)?);
    xp::add(&b, &c)
}

/// Largest balance of token 0 on the curve.
pub fn max_balances0(p: &GyroEParams, d: &DerivedGyroEParams, r: &Vector2) -> Result<BigInt> {
    let term_xp1 = div_xp_u(&xp::sub(&d.tau_beta.x, &d.tau_alpha.x)?, &d.d_sq)?;
    let term_xp2 = div_xp_u(&xp::sub(&d.tau_beta.y, &d.tau_alpha.y)?, &d.d_sq)?;
    let xp0 = mul_down_xp_to_np_u(&mul_down_mag_u(&mul_down_mag_u(&r.y, &p.lambda), &p.c), &term_xp1);
    let term2 = if term_xp2.is_positive() {
        mul_down_mag_u(&r.y, &p.s)
    } else {
        mul_up_mag_u(&r.x, &p.s)
    };
    xp::add(&xp0, &mul_down_xp_to_np_u(&term2, &term_xp2))
}

/// Largest balance of token 1 on the curve.
pub fn max_balances1(p: &GyroEParams, d: &DerivedGyroEParams, r: &Vector2) -> Result<BigInt> {
    let term_xp1 = div_xp_u(&xp::sub(&d.tau_beta.x, &d.tau_alpha.x)?, &d.d_sq)?;
    let term_xp2 = div_xp_u(&xp::sub(&d.tau_alpha.y, &d.tau_beta.y)?, &d.d_sq)?;
    let yp = mul_down_xp_to_np_u(&mul_down_mag_u(&mul_down_mag_u(&r.y, &p.lambda), &p.s), &term_xp1);
    let term2 = if term_xp2.is_positive() {
        mul_down_mag_u(&r.y, &p.c)
    } else {
        mul_up_mag_u(&r.x, &p.c)
    };
    xp::add(&yp, &mul_down_xp_to_np_u(&term2, &term_xp2))
}

/// `(A t) . (A chi)` for balances `(x, y)`.
pub fn calc_at_a_chi(x: &BigInt, y: &BigInt, p: &GyroEParams, d: &DerivedGyroEParams) -> Result<BigInt> {
    let d_sq2 = mul_xp_u(&d.d_sq, &d.d_sq);
    let term_xp = div_xp_u(
        &div_down_mag_u(&xp::add(&div_down_mag_u(&d.w, &p.lambda)?, &d.z)?, &p.lambda)?,
        &d_sq2,
    )?;
    let mut value = mul_down_xp_to_np_u(&xp::sub(&mul_down_mag_u(x, &p.c), &mul_down_mag_u(y, &p.s))?, &term_xp);

    // (x lambda s + y lambda c) * u
    let term_np = xp::add(
        &mul_down_mag_u(&mul_down_mag_u(x, &p.lambda), &p.s),
        &mul_down_mag_u(&mul_down_mag_u(y, &p.lambda), &p.c),
    )?;
    value = xp::add(&value, &mul_down_xp_to_np_u(&term_np, &div_xp_u(&d.u, &d_sq2)?))?;

    // (x s + y c) * v
    let term_np = xp::add(&mul_down_mag_u(x, &p.s), &mul_down_mag_u(y, &p.c))?;
    xp::add(&value, &mul_down_xp_to_np_u(&term_np, &div_xp_u(&d.v, &d_sq2)?))
}

/// `(A chi) . (A chi)` at 38 decimals, rounded up.
pub fn calc_a_chi_a_chi_in_xp(p: &GyroEParams, d: &DerivedGyroEParams) -> Result<BigInt> {
    let d_sq3 = mul_xp_u(&mul_xp_u(&d.d_sq, &d.d_sq), &d.d_sq);
    let mut value = mul_up_mag_u(&p.lambda, &div_xp_u(&mul_xp_u(&(&d.u * 2u8), &d.v), &d_sq3)?);

    let u_up = xp::add(&d.u, &BigInt::from(1u8))?;
    let term = div_xp_u(&mul_xp_u(&u_up, &u_up), &d_sq3)?;
    value = xp::add(&value, &mul_up_mag_u(&mul_up_mag_u(&term, &p.lambda), &p.lambda))?;
    value = xp::add(&value, &div_xp_u(&mul_xp_u(&d.v, &d.v), &d_sq3)?)?;

    let term_xp = xp::add(&div_up_mag_u(&d.w, &p.lambda)?, &d.z)?;
    xp::add(&value, &div_xp_u(&mul_xp_u(&term_xp, &term_xp), &d_sq3)?)
}

/// `-(A_t x)^2 (A chi_y)^2 + (A_t x)^2`, rounded down.
pub fn calc_min_atx_a_chiy_sq_plus_atx_sq(
    x: &BigInt,
    y: &BigInt,
    p: &GyroEParams,
    d: &DerivedGyroEParams,
) -> Result<BigInt> {
    let x_sq = mul_up_mag_u(x, x);
    let y_sq = mul_up_mag_u(y, y);
    let xy = mul_down_mag_u(x, y);
    let mut term_np = xp::add(
        &mul_up_mag_u(&mul_up_mag_u(&x_sq, &p.c), &p.c),
        &mul_up_mag_u(&mul_up_mag_u(&y_sq, &p.s), &p.s),
    )?;
    term_np = xp::sub(&term_np, &mul_down_mag_u(&mul_down_mag_u(&xy, &(&p.c * 2u8)), &p.s))?;

    let term_xp = xp::add(
        &xp::add(
            &mul_xp_u(&d.u, &d.u),
            &div_down_mag_u(&mul_xp_u(&(&d.u * 2u8), &d.v), &p.lambda)?,
        )?,
        &div_down_mag_u(&div_down_mag_u(&mul_xp_u(&d.v, &d.v), &p.lambda)?, &p.lambda)?,
    )?;
    let term_xp = div_d_sq4(&term_xp, &d.d_sq)?;

    let value = mul_down_xp_to_np_u(&-&term_np, &term_xp);
    let tail = div_down_mag_u(&div_down_mag_u(&xp::sub(&term_np, &BigInt::from(9u8))?, &p.lambda)?, &p.lambda)?;
    xp::add(&value, &mul_down_xp_to_np_u(&tail, &div_xp_u(&ONE_XP, &d.d_sq)?))
}

/// `2 (A_t x)(A_t y)(A chi_x)(A chi_y)`, rounded down.
pub fn calc_2_atx_aty_a_chix_a_chiy(
    x: &BigInt,
    y: &BigInt,
    p: &GyroEParams,
    d: &DerivedGyroEParams,
) -> Result<BigInt> {
    let x_sq = mul_down_mag_u(x, x);
    let y_sq = mul_up_mag_u(y, y);
    let xy = mul_down_mag_u(y, &(x * 2u8));

    let mut term_np = mul_down_mag_u(&mul_down_mag_u(&xp::sub(&x_sq, &y_sq)?, &(&p.c * 2u8)), &p.s);
    term_np = xp::add(
        &term_np,
        &xp::sub(
            &mul_down_mag_u(&mul_down_mag_u(&xy, &p.c), &p.c),
            &mul_down_mag_u(&mul_down_mag_u(&xy, &p.s), &p.s),
        )?,
    )?;

    let mut term_xp = xp::add(
        &mul_xp_u(&d.z, &d.u),
        &div_down_mag_u(&div_down_mag_u(&mul_xp_u(&d.w, &d.v), &p.lambda)?, &p.lambda)?,
    )?;
    term_xp = xp::add(
        &term_xp,
        &div_down_mag_u(&xp::add(&mul_xp_u(&d.w, &d.u), &mul_xp_u(&d.z, &d.v))?, &p.lambda)?,
    )?;
    let term_xp = div_d_sq4(&term_xp, &d.d_sq)?;
    Ok(mul_down_xp_to_np_u(&term_np, &term_xp))
}

/// `-(A_t y)^2 (A chi_x)^2 + (A_t y)^2`, rounded down.
pub fn calc_min_aty_a_chix_sq_plus_aty_sq(
    x: &BigInt,
    y: &BigInt,
    p: &GyroEParams,
    d: &DerivedGyroEParams,
) -> Result<BigInt> {
    let mut term_np = xp::add(
        &mul_up_mag_u(&mul_up_mag_u(&mul_up_mag_u(x, x), &p.s), &p.s),
        &mul_up_mag_u(&mul_up_mag_u(&mul_up_mag_u(y, y), &p.c), &p.c),
    )?;
    term_np = xp::add(
        &term_np,
        &mul_up_mag_u(&mul_up_mag_u(&mul_up_mag_u(x, y), &(&p.s * 2u8)), &p.c),
    )?;

    let mut term_xp = xp::add(
        &mul_xp_u(&d.z, &d.z),
        &div_down_mag_u(&div_down_mag_u(&mul_xp_u(&d.w, &d.w), &p.lambda)?, &p.lambda)?,
    )?;
    term_xp = xp::add(&term_xp, &div_down_mag_u(&mul_xp_u(&(&d.z * 2u8), &d.w), &p.lambda)?)?;
    let term_xp = div_d_sq4(&term_xp, &d.d_sq)?;

    let value = mul_down_xp_to_np_u(&-&term_np, &term_xp);
    let tail = xp::sub(&term_np, &BigInt::from(9u8))?;
    xp::add(&value, &mul_down_xp_to_np_u(&tail, &div_xp_u(&ONE_XP, &d.d_sq)?))
}

/// Square-root part of the invariant and its error bound.
pub fn calc_invariant_sqrt(x: &BigInt, y: &BigInt, p: &GyroEParams, d: &DerivedGyroEParams) -> Result<(BigInt, BigInt)> {
    let value = xp::add(
        &xp::add(
            &calc_min_atx_a_chiy_sq_plus_atx_sq(x, y, p, d)?,
            &calc_2_atx_aty_a_chix_a_chiy(x, y, p, d)?,
        )?,
        &calc_min_aty_a_chix_sq_plus_aty_sq(x, y, p, d)?,
    )?;
    let err = (mul_up_mag_u(x, x) + mul_up_mag_u(y, y)) / &*ONE_XP;
    let root = if value.is_positive() { sqrt(&value, 5)? } else { BigInt::zero() };
    Ok((root, err))
}

/// The invariant `r` of balances `(x, y)` with its absolute error bound.
pub fn calculate_invariant_with_error(
    x: &BigInt,
    y: &BigInt,
    p: &GyroEParams,
    d: &DerivedGyroEParams,
) -> Result<(BigInt, BigInt)> {
    let sum = x + y;
    if sum > *MAX_BALANCES {
        return Err(Violation::MaxAssetsExceeded.into());
    }

    let at_a_chi = calc_at_a_chi(x, y, p, d)?;
    let (root, err) = calc_invariant_sqrt(x, y, p, d)?;
    let err = if root.is_positive() {
        div_up_mag_u(&(err + 1u8), &(&root * 2u8))?
    } else if err.is_positive() {
        sqrt(&err, 5)?
    } else {
        pow10(9)
    };
    // Error in the numerator, widened 20x to cover every dropped term.
    let err = (mul_up_mag_u(&p.lambda, &sum) / &*ONE_XP + err + 1u8) * 20u8;

    let a_chi_a_chi = calc_a_chi_a_chi_in_xp(p, d)?;
    let mul_denominator = div_xp_u(&ONE_XP, &xp::sub(&a_chi_a_chi, &ONE_XP)?)?;

    let invariant = mul_down_xp_to_np_u(&xp::sub(&xp::add(&at_a_chi, &root)?, &err)?, &mul_denominator);
    let mut err = mul_up_xp_to_np_u(&err, &mul_denominator);
    let lambda_sq = (&p.lambda * &p.lambda) / pow10(36);
    err += (mul_up_xp_to_np_u(&invariant, &mul_denominator) * lambda_sq * 40u8) / &*ONE_XP + 1u8;

    if &invariant + &err > *MAX_INVARIANT {
        return Err(Violation::MaxInvariantExceeded.into());
    }
    trace!(%invariant, %err, "gyro_e invariant");
    Ok((invariant, err))
}

/// Solves the rotated quadratic for the opposite coordinate.
#[allow(clippy::too_many_arguments)]
pub fn solve_quadratic_swap(
    lambda: &BigInt,
    x: &BigInt,
    s: &BigInt,
    c: &BigInt,
    r: &Vector2,
    ab: &Vector2,
    tau_beta: &Vector2,
    d_sq: &BigInt,
) -> Result<BigInt> {
    let lam_bar = Vector2::new(
        xp::sub(&ONE_XP, &div_down_mag_u(&div_down_mag_u(&ONE_XP, lambda)?, lambda)?)?,
        xp::sub(&ONE_XP, &div_up_mag_u(&div_up_mag_u(&ONE_XP, lambda)?, lambda)?)?,
    );
    let shifted = xp::sub(x, &ab.x)?;
    let q_b = if shifted.is_positive() {
        mul_up_xp_to_np_u(
            &mul_down_mag_u(&mul_down_mag_u(&-&shifted, s), c),
            &div_xp_u(&lam_bar.y, d_sq)?,
        )
    } else {
        mul_up_xp_to_np_u(
            &mul_up_mag_u(&mul_up_mag_u(&-&shifted, s), c),
            &xp::add(&div_xp_u(&lam_bar.x, d_sq)?, &BigInt::from(1u8))?,
        )
    };

    let s_term = Vector2::new(
        xp::sub(&ONE_XP, &div_xp_u(&mul_down_mag_u(&mul_down_mag_u(&lam_bar.y, s), s), d_sq)?)?,
        xp::sub(
            &ONE_XP,
            &xp::add(
                &div_xp_u(&mul_up_mag_u(&mul_up_mag_u(&lam_bar.x, s), s), &(d_sq + 1u8))?,
                &BigInt::from(1u8),
            )?,
        )?,
    );

    let mut q_c = -calc_xp_xp_div_lambda_lambda(x, r, lambda, s, c, tau_beta, d_sq)?;
    q_c = xp::add(&q_c, &mul_down_xp_to_np_u(&mul_down_mag_u(&r.y, &r.y), &s_term.y))?;
    let q_c = if q_c.is_positive() { sqrt(&q_c, 5)? } else { BigInt::zero() };

    let diff = xp::sub(&q_b, &q_c)?;
    let q_a = if diff.is_positive() {
        mul_up_xp_to_np_u(&diff, &xp::add(&div_xp_u(&ONE_XP, &s_term.y)?, &BigInt::from(1u8))?)
    } else {
        mul_up_xp_to_np_u(&diff, &div_xp_u(&ONE_XP, &s_term.x)?)
    };
    xp::add(&q_a, &ab.y)
}

/// `(x')^2 / lambda^2` term of the swap quadratic, rounded up.
pub fn calc_xp_xp_div_lambda_lambda(
    x: &BigInt,
    r: &Vector2,
    lambda: &BigInt,
    s: &BigInt,
    c: &BigInt,
    tau_beta: &Vector2,
    d_sq: &BigInt,
) -> Result<BigInt> {
    let d_sq2 = mul_xp_u(d_sq, d_sq);
    let r_sq = mul_up_mag_u(&r.x, &r.x);
    let seven = BigInt::from(7u8);

    let term_xp = div_xp_u(&mul_xp_u(&tau_beta.x, &tau_beta.y), &d_sq2)?;
    let mut q_a = if term_xp.is_positive() {
        let partial = mul_up_mag_u(&r_sq, &(s * 2u8));
        mul_up_xp_to_np_u(&mul_up_mag_u(&partial, c), &xp::add(&term_xp, &seven)?)
    } else {
        let partial = mul_down_mag_u(&mul_down_mag_u(&r.y, &r.y), &(s * 2u8));
        mul_up_xp_to_np_u(&mul_down_mag_u(&partial, c), &term_xp)
    };

    let q_b = if tau_beta.x.is_negative() {
        mul_up_xp_to_np_u(
            &mul_up_mag_u(&mul_up_mag_u(&r.x, x), &(c * 2u8)),
            &xp::add(&-div_xp_u(&tau_beta.x, d_sq)?, &BigInt::from(3u8))?,
        )
    } else {
        mul_up_xp_to_np_u(
            &mul_down_mag_u(&mul_down_mag_u(&-&r.y, x), &(c * 2u8)),
            &div_xp_u(&tau_beta.x, d_sq)?,
        )
    };
    q_a = xp::add(&q_a, &q_b)?;

    let term_xp = xp::add(&div_xp_u(&mul_xp_u(&tau_beta.y, &tau_beta.y), &d_sq2)?, &seven)?;
    let mut q_b = mul_up_xp_to_np_u(&mul_up_mag_u(&mul_up_mag_u(&r_sq, s), s), &term_xp);
    let q_c = mul_up_xp_to_np_u(
        &mul_down_mag_u(&mul_down_mag_u(&-&r.y, x), &(s * 2u8)),
        &div_xp_u(&tau_beta.y, d_sq)?,
    );
    q_b = xp::add(&xp::add(&q_b, &q_c)?, &mul_up_mag_u(x, x))?;
    q_b = if q_b.is_positive() {
        div_up_mag_u(&q_b, lambda)?
    } else {
        div_down_mag_u(&q_b, lambda)?
    };

    q_a = xp::add(&q_a, &q_b)?;
    q_a = if q_a.is_positive() {
        div_up_mag_u(&q_a, lambda)?
    } else {
        div_down_mag_u(&q_a, lambda)?
    };

    let term_xp = xp::add(&div_xp_u(&mul_xp_u(&tau_beta.x, &tau_beta.x), &d_sq2)?, &seven)?;
    let value = mul_up_mag_u(&mul_up_mag_u(&r_sq, c), c);
    xp::add(&mul_up_xp_to_np_u(&value, &term_xp), &q_a)
}

/// Token 1 balance on the curve for token 0 balance `x`.
pub fn calc_y_given_x(x: &BigInt, p: &GyroEParams, d: &DerivedGyroEParams, r: &Vector2) -> Result<BigInt> {
    let ab = Vector2::new(virtual_offset0(p, d, r)?, virtual_offset1(p, d, r)?);
    solve_quadratic_swap(&p.lambda, x, &p.s, &p.c, r, &ab, &d.tau_beta, &d.d_sq)
}

/// Token 0 balance on the curve for token 1 balance `y`.
pub fn calc_x_given_y(y: &BigInt, p: &GyroEParams, d: &DerivedGyroEParams, r: &Vector2) -> Result<BigInt> {
    let ba = Vector2::new(virtual_offset1(p, d, r)?, virtual_offset0(p, d, r)?);
    // Mirroring the plane swaps the roles of c and s and reflects tau_alpha.
    let tau = Vector2::new(-&d.tau_alpha.x, d.tau_alpha.y.clone());
    solve_quadratic_swap(&p.lambda, y, &p.c, &p.s, r, &ba, &tau, &d.d_sq)
}

/// Rejects a post-trade balance outside the curve's reach.
pub fn check_asset_bounds(
    p: &GyroEParams,
    d: &DerivedGyroEParams,
    invariant: &Vector2,
    balance: &BigInt,
    token_index: usize,
) -> Result<()> {
    let max = if token_index == 0 {
        max_balances0(p, d, invariant)?
    } else {
        max_balances1(p, d, invariant)?
    };
    if balance.is_negative() || balance > &*MAX_BALANCES || balance > &max {
        return Err(Violation::AssetBoundsExceeded.into());
    }
    Ok(())
}

impl GyroEMath {
    /// Scaled balances in pool order and the invariant vector
    /// `(r + 2 err, r)`, overestimated in `x` and underestimated in `y`.
    fn state(&self, ctx: &SwapContext<'_>) -> Result<([BigInt; 2], Vector2)> {
        let balances = [ctx.tokens[0].balance_scaled18(), ctx.tokens[1].balance_scaled18()];
        let (invariant, err) = calculate_invariant_with_error(&balances[0], &balances[1], &self.params, &self.derived)?;
        let r = Vector2::new(&invariant + &err * 2u8, invariant);
        Ok((balances, r))
    }

    /// Output for a scaled input, both at 18 decimals.
    pub fn calc_out_given_in(&self, balances: &[BigInt; 2], amount_in: &BigInt, token_in: usize, r: &Vector2) -> Result<BigInt> {
        let (ix_in, ix_out) = if token_in == 0 { (0, 1) } else { (1, 0) };
        let new_in = &balances[ix_in] + amount_in;
        check_asset_bounds(&self.params, &self.derived, r, &new_in, ix_in)?;
        let new_out = if ix_in == 0 {
            calc_y_given_x(&new_in, &self.params, &self.derived, r)?
        } else {
            calc_x_given_y(&new_in, &self.params, &self.derived, r)?
        };
        let amount_out = &balances[ix_out] - new_out;
        if amount_out.is_negative() {
            return Err(Violation::AssetBoundsExceeded.into());
        }
        Ok(amount_out)
    }

    /// Input for a scaled output, both at 18 decimals.
    pub fn calc_in_given_out(
        &self,
        balances: &[BigInt; 2],
        amount_out: &BigInt,
        token_in: usize,
        r: &Vector2,
    ) -> Result<BigInt> {
        let (ix_in, ix_out) = if token_in == 0 { (0, 1) } else { (1, 0) };
        if amount_out > &balances[ix_out] {
            return Err(Violation::AssetBoundsExceeded.into());
        }
        let new_out = &balances[ix_out] - amount_out;
        let new_in = if ix_in == 0 {
            calc_x_given_y(&new_out, &self.params, &self.derived, r)?
        } else {
            calc_y_given_x(&new_out, &self.params, &self.derived, r)?
        };
        check_asset_bounds(&self.params, &self.derived, r, &new_in, ix_in)?;
        let amount_in = new_in - &balances[ix_in];
        if amount_in.is_negative() {
            return Err(Violation::AssetBoundsExceeded.into());
        }
        Ok(amount_in)
    }
}

impl SwapMath for GyroEMath {
    fn name(&self) -> &'static str {
        "gyro_e"
    }

    fn out_given_in(&self, ctx: &SwapContext<'_>, amount_in: &BigInt) -> Result<BigInt> {
        let (balances, r) = self.state(ctx)?;
        let amount_in = subtract_fee_rounding_down(amount_in, ctx.swap_fee)?;
        let out = self.calc_out_given_in(&balances, &ctx.tin().upscale(&amount_in), ctx.token_in, &r)?;
        Ok(ctx.tout().downscale_down(&out))
    }

    fn in_given_out(&self, ctx: &SwapContext<'_>, amount_out: &BigInt) -> Result<BigInt> {
        let (balances, r) = self.state(ctx)?;
        let amount_in = self.calc_in_given_out(&balances, &ctx.tout().upscale(amount_out), ctx.token_in, &r)?;
        add_fee(&ctx.tin().downscale_up(&amount_in)?, ctx.swap_fee)
    }

    fn swap_limit(&self, ctx: &SwapContext<'_>, kind: SwapKind) -> Result<BigInt> {
        match kind {
            SwapKind::GivenIn => {
                let (balances, r) = self.state(ctx)?;
                let max = if ctx.token_in == 0 {
                    max_balances0(&self.params, &self.derived, &r)?
                } else {
                    max_balances1(&self.params, &self.derived, &r)?
                };
                let balance_in = &balances[ctx.token_in];
                let headroom = if &max > balance_in { max - balance_in } else { BigInt::zero() };
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
