//! Builds [`Pool`]s from raw snapshots.
//!
//! Each factory recognises one family by the snapshot's `poolType` and knows
//! which parameters that family needs and at what precision.

use num_traits::Signed;
use tracing::debug;

use crate::error::{InputError, Result};
use crate::pool::{Pool, PoolKind};
use crate::pools::fx::{FxMath, FxParams};
use crate::pools::gyro2::Gyro2Math;
use crate::pools::gyro3::Gyro3Math;
use crate::pools::gyro_e::{DerivedGyroEParams, GyroEMath, GyroEParams, Vector2};
use crate::pools::linear::{LinearMath, LinearParams};
use crate::pools::stable::StableMath;
use crate::pools::weighted::WeightedMath;
use crate::raw::RawPool;

const XP_DECIMALS: u32 = 38;
const WAD_DECIMALS: u32 = 18;
const AMP_DECIMALS: u32 = 3;

/// One constructor per supported pool family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PoolFactory {
    /// `Weighted`, `Investment` and `LiquidityBootstrapping` pools.
    Weighted,
    /// `Stable` and `MetaStable` pools.
    Stable,
    /// Every `*Linear` pool type.
    Linear,
    /// `Gyro2` pools.
    Gyro2,
    /// `Gyro3` pools.
    Gyro3,
    /// `GyroE` pools.
    GyroE,
    /// `FX` pools.
    Fx,
}

impl PoolFactory {
    /// Every factory, in selection order.
    pub const ALL: [PoolFactory; 7] = [
        PoolFactory::Weighted,
        PoolFactory::Stable,
        PoolFactory::Linear,
        PoolFactory::Gyro2,
        PoolFactory::Gyro3,
        PoolFactory::GyroE,
        PoolFactory::Fx,
    ];

    /// Whether this factory handles `raw`'s pool type.
    pub fn is_pool_for_factory(self, raw: &RawPool) -> bool {
        let pool_type = raw.pool_type.as_str();
        match self {
            PoolFactory::Weighted => matches!(pool_type, "Weighted" | "Investment" | "LiquidityBootstrapping"),
            PoolFactory::Stable => matches!(pool_type, "Stable" | "MetaStable"),
            PoolFactory::Linear => pool_type.ends_with("Linear"),
            PoolFactory::Gyro2 => pool_type == "Gyro2",
            PoolFactory::Gyro3 => pool_type == "Gyro3",
            PoolFactory::GyroE => pool_type == "GyroE",
            PoolFactory::Fx => pool_type == "FX",
        }
    }

    /// Builds a pool on `chain_id` from `raw`.
    pub fn create(self, chain_id: u64, raw: &RawPool) -> Result<Pool> {
        if !self.is_pool_for_factory(raw) {
            return Err(InputError::UnsupportedPoolType(raw.pool_type.clone()).into());
        }
        let kind = match self {
            PoolFactory::Weighted => weighted(raw)?,
            PoolFactory::Stable => stable(raw)?,
            PoolFactory::Linear => linear(raw)?,
            PoolFactory::Gyro2 => gyro2(raw)?,
            PoolFactory::Gyro3 => gyro3(raw)?,
            PoolFactory::GyroE => gyro_e(raw)?,
            PoolFactory::Fx => fx(raw)?,
        };
        let pool = Pool {
            chain_id,
            id: raw.id.clone(),
            address: raw.address.to_lowercase(),
            pool_type: raw.pool_type.clone(),
            swap_fee: raw.swap_fee()?,
            tokens: raw.pool_tokens()?,
            kind,
        };
        debug!(chain_id, pool = %pool.id, factory = ?self, tokens = pool.tokens.len(), "created pool");
        Ok(pool)
    }
}

/// Builds `raw` with the first factory that recognises its pool type.
pub fn create_pool(chain_id: u64, raw: &RawPool) -> Result<Pool> {
    PoolFactory::ALL
        .into_iter()
        .find(|f| f.is_pool_for_factory(raw))
        .ok_or_else(|| InputError::UnsupportedPoolType(raw.pool_type.clone()))?
        .create(chain_id, raw)
}

fn expect_tokens(raw: &RawPool, count: usize) -> Result<()> {
    if raw.tokens.len() != count {
        return Err(InputError::InvalidParameter {
            name: "tokens",
            reason: format!("{} pool {} has {} tokens, expected {count}", raw.pool_type, raw.id, raw.tokens.len()),
        }
        .into());
    }
    Ok(())
}

fn weighted(raw: &RawPool) -> Result<PoolKind> {
    if raw.tokens.len() < 2 {
        return Err(InputError::InvalidParameter {
            name: "tokens",
            reason: format!("weighted pool {} needs at least two tokens", raw.id),
        }
        .into());
    }
    if raw.tokens.iter().any(|t| t.weight.is_none()) {
        return Err(InputError::MissingParameter {
            pool: raw.id.clone(),
            name: "weight",
        }
        .into());
    }
    Ok(PoolKind::Weighted(WeightedMath {
        version: raw.pool_type_version.unwrap_or(1),
    }))
}

fn stable(raw: &RawPool) -> Result<PoolKind> {
    let amp = raw.param(&raw.amp, "amp", AMP_DECIMALS)?;
    if !amp.is_positive() {
        return Err(InputError::InvalidParameter {
            name: "amp",
            reason: "amplification must be positive".to_owned(),
        }
        .into());
    }
    Ok(PoolKind::Stable(StableMath { amp }))
}

fn linear(raw: &RawPool) -> Result<PoolKind> {
    expect_tokens(raw, 3)?;
    let missing = |name| InputError::MissingParameter {
        pool: raw.id.clone(),
        name,
    };
    let main_index = raw.main_index.ok_or_else(|| missing("mainIndex"))?;
    let wrapped_index = raw.wrapped_index.ok_or_else(|| missing("wrappedIndex"))?;
    if main_index >= 3 || wrapped_index >= 3 || main_index == wrapped_index {
        return Err(InputError::InvalidParameter {
            name: "mainIndex",
            reason: format!("main {main_index} and wrapped {wrapped_index} must be distinct token indices"),
        }
        .into());
    }
    // The share token is the pool itself; fall back to the remaining slot.
    let bpt_index = raw
        .tokens
        .iter()
        .position(|t| t.address.eq_ignore_ascii_case(&raw.address))
        .unwrap_or(3 - main_index - wrapped_index);

    let tokens = raw.pool_tokens()?;
    Ok(PoolKind::Linear(LinearMath {
        main_index,
        wrapped_index,
        bpt_index,
        params: LinearParams {
            fee: raw.swap_fee()?,
            rate: tokens[wrapped_index].price_rate.clone(),
            lower_target: raw.param(&raw.lower_target, "lowerTarget", WAD_DECIMALS)?,
            upper_target: raw.param(&raw.upper_target, "upperTarget", WAD_DECIMALS)?,
        },
    }))
}

fn gyro2(raw: &RawPool) -> Result<PoolKind> {
    expect_tokens(raw, 2)?;
    Ok(PoolKind::Gyro2(Gyro2Math {
        sqrt_alpha: raw.param(&raw.sqrt_alpha, "sqrtAlpha", WAD_DECIMALS)?,
        sqrt_beta: raw.param(&raw.sqrt_beta, "sqrtBeta", WAD_DECIMALS)?,
    }))
}

fn gyro3(raw: &RawPool) -> Result<PoolKind> {
    expect_tokens(raw, 3)?;
    Ok(PoolKind::Gyro3(Gyro3Math {
        root3_alpha: raw.param(&raw.root3_alpha, "root3Alpha", WAD_DECIMALS)?,
    }))
}

fn gyro_e(raw: &RawPool) -> Result<PoolKind> {
    expect_tokens(raw, 2)?;
    let wad = |field, name| raw.param(field, name, WAD_DECIMALS);
    let xp = |field, name| raw.param(field, name, XP_DECIMALS);
    Ok(PoolKind::GyroE(GyroEMath {
        params: GyroEParams {
            alpha: wad(&raw.alpha, "alpha")?,
            beta: wad(&raw.beta, "beta")?,
            c: wad(&raw.c, "c")?,
            s: wad(&raw.s, "s")?,
            lambda: wad(&raw.lambda, "lambda")?,
        },
        derived: DerivedGyroEParams {
            tau_alpha: Vector2::new(xp(&raw.tau_alpha_x, "tauAlphaX")?, xp(&raw.tau_alpha_y, "tauAlphaY")?),
            tau_beta: Vector2::new(xp(&raw.tau_beta_x, "tauBetaX")?, xp(&raw.tau_beta_y, "tauBetaY")?),
            u: xp(&raw.u, "u")?,
            v: xp(&raw.v, "v")?,
            w: xp(&raw.w, "w")?,
            z: xp(&raw.z, "z")?,
            d_sq: xp(&raw.d_sq, "dSq")?,
        },
    }))
}

fn fx(raw: &RawPool) -> Result<PoolKind> {
    expect_tokens(raw, 2)?;
    if let Some(token) = raw.tokens.iter().find(|t| t.latest_fx_price.is_none() || t.fx_oracle_decimals.is_none()) {
        return Err(InputError::InvalidParameter {
            name: "latestFXPrice",
            reason: format!("token {} has no oracle data", token.address),
        }
        .into());
    }
    let wad = |field, name| raw.param(field, name, WAD_DECIMALS);
    let params = FxParams::from_wads(
        &wad(&raw.alpha, "alpha")?,
        &wad(&raw.beta, "beta")?,
        &wad(&raw.delta, "delta")?,
        &wad(&raw.epsilon, "epsilon")?,
        &wad(&raw.lambda, "lambda")?,
    )?;
    Ok(PoolKind::Fx(FxMath { params }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn pool_types_select_a_single_factory() {
        for (pool_type, expected) in [
            ("Weighted", PoolFactory::Weighted),
            ("LiquidityBootstrapping", PoolFactory::Weighted),
            ("MetaStable", PoolFactory::Stable),
            ("AaveLinear", PoolFactory::Linear),
            ("ERC4626Linear", PoolFactory::Linear),
            ("GyroE", PoolFactory::GyroE),
            ("FX", PoolFactory::Fx),
        ] {
            let raw = RawPool {
                pool_type: pool_type.to_owned(),
                ..RawPool::default()
            };
            let matching: Vec<_> = PoolFactory::ALL.into_iter().filter(|f| f.is_pool_for_factory(&raw)).collect();
            assert_eq!(matching, vec![expected], "{pool_type}");
        }
    }

    #[test]
    fn unknown_type_is_unsupported() {
        let raw = RawPool {
            pool_type: "ComposableStable".to_owned(),
            ..RawPool::default()
        };
        let err = create_pool(1, &raw).unwrap_err();
        assert_eq!(err, Error::from(InputError::UnsupportedPoolType("ComposableStable".to_owned())));
    }
}
