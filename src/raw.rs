//! Pool snapshots as delivered by an indexer.
//!
//! Numeric fields are human-readable decimal strings (`"0.003"`, `"1250.5"`);
//! they are parsed at the precision each pool family needs when a [`Pool`]
//! is built.
//!
//! [`Pool`]: crate::pool::Pool

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use crate::error::{InputError, Result};
use crate::token::{parse_fixed, parse_unsigned, PoolToken};

/// One token entry of a [`RawPool`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPoolToken {
    /// Token address.
    pub address: String,
    /// Balance in whole tokens, e.g. `"1500.25"`.
    pub balance: String,
    /// Native precision.
    pub decimals: u8,
    /// Normalised weight for weighted pools, e.g. `"0.8"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<String>,
    /// Price rate for rate-bearing tokens, e.g. `"1.0123"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_rate: Option<String>,
    /// Latest oracle price for FX pool tokens.
    #[serde(default, rename = "latestFXPrice", skip_serializing_if = "Option::is_none")]
    pub latest_fx_price: Option<String>,
    /// Oracle precision for FX pool tokens.
    #[serde(default, rename = "fxOracleDecimals", skip_serializing_if = "Option::is_none")]
    pub fx_oracle_decimals: Option<u32>,
}

/// Per-pool snapshot: tokens plus every family's curve parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPool {
    /// Pool id.
    pub id: String,
    /// Pool contract address.
    pub address: String,
    /// Family name, e.g. `"Weighted"`, `"MetaStable"`, `"GyroE"`, `"FX"`.
    pub pool_type: String,
    /// Contract version within the family.
    #[serde(default)]
    pub pool_type_version: Option<u32>,
    /// Swap fee as a fraction, e.g. `"0.003"`.
    #[serde(default)]
    pub swap_fee: String,
    /// Pool tokens in contract order.
    pub tokens: Vec<RawPoolToken>,

    /// Stable amplification factor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amp: Option<String>,

    /// Linear main token index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_index: Option<usize>,
    /// Linear wrapped token index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrapped_index: Option<usize>,
    /// Linear lower target, in main token units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_target: Option<String>,
    /// Linear upper target, in main token units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_target: Option<String>,

    /// Gyro2 `sqrt(alpha)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqrt_alpha: Option<String>,
    /// Gyro2 `sqrt(beta)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqrt_beta: Option<String>,
    /// Gyro3 cube root of alpha.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root3_alpha: Option<String>,

    /// E-CLP lower price bound, or FX halt band width.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha: Option<String>,
    /// E-CLP upper price bound, or FX fee threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beta: Option<String>,
    /// E-CLP rotation cosine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c: Option<String>,
    /// E-CLP rotation sine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<String>,
    /// E-CLP stretch, or FX fee dampening.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lambda: Option<String>,
    /// E-CLP derived `tau(alpha).x`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tau_alpha_x: Option<String>,
    /// E-CLP derived `tau(alpha).y`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tau_alpha_y: Option<String>,
    /// E-CLP derived `tau(beta).x`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tau_beta_x: Option<String>,
    /// E-CLP derived `tau(beta).y`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tau_beta_y: Option<String>,
    /// E-CLP derived `u`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub u: Option<String>,
    /// E-CLP derived `v`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v: Option<String>,
    /// E-CLP derived `w`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w: Option<String>,
    /// E-CLP derived `z`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<String>,
    /// E-CLP derived `d^2`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d_sq: Option<String>,

    /// FX fee slope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<String>,
    /// FX flat fee.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epsilon: Option<String>,
}

impl RawPool {
    /// Decodes a single snapshot from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| InputError::Malformed(e.to_string()).into())
    }

    /// Decodes a JSON array of snapshots.
    pub fn list_from_json(json: &str) -> Result<Vec<Self>> {
        serde_json::from_str(json).map_err(|e| InputError::Malformed(e.to_string()).into())
    }

    /// Returns a required optional field, or a missing-parameter error.
    pub(crate) fn require<'a>(&self, field: &'a Option<String>, name: &'static str) -> Result<&'a str> {
        field.as_deref().ok_or_else(|| {
            InputError::MissingParameter {
                pool: self.id.clone(),
                name,
            }
            .into()
        })
    }

    /// Parses a required parameter at `decimals` precision.
    pub(crate) fn param(&self, field: &Option<String>, name: &'static str, decimals: u32) -> Result<BigInt> {
        parse_fixed(self.require(field, name)?, decimals)
    }

    /// Swap fee at 18 decimals; an empty string means no fee.
    pub(crate) fn swap_fee(&self) -> Result<BigInt> {
        if self.swap_fee.trim().is_empty() {
            return Ok(BigInt::default());
        }
        parse_unsigned(&self.swap_fee, 18)
    }

    /// Builds pool tokens with balances, weights and price rates.
    pub(crate) fn pool_tokens(&self) -> Result<Vec<PoolToken>> {
        self.tokens.iter().map(RawPoolToken::to_pool_token).collect()
    }
}

impl RawPoolToken {
    fn to_pool_token(&self) -> Result<PoolToken> {
        let balance = parse_unsigned(&self.balance, u32::from(self.decimals))?;
        let mut token = PoolToken::new(&self.address, self.decimals, balance)?;
        if let Some(weight) = &self.weight {
            token = token.with_weight(parse_unsigned(weight, 18)?);
        }
        if let Some(rate) = &self.price_rate {
            token = token.with_price_rate(parse_unsigned(rate, 18)?);
        }
        if let (Some(price), Some(decimals)) = (&self.latest_fx_price, self.fx_oracle_decimals) {
            token = token.with_fx_oracle(parse_unsigned(price, decimals)?, decimals);
        }
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_camel_case_snapshot() {
        let json = r#"{
            "id": "0xpool",
            "address": "0xPOOL",
            "poolType": "Weighted",
            "poolTypeVersion": 2,
            "swapFee": "0.003",
            "tokens": [
                {"address": "0xA", "balance": "10.5", "decimals": 6, "weight": "0.8"},
                {"address": "0xB", "balance": "2", "decimals": 18, "weight": "0.2", "priceRate": "1"}
            ]
        }"#;
        let raw = RawPool::from_json(json).unwrap();
        assert_eq!(raw.pool_type_version, Some(2));
        let tokens = raw.pool_tokens().unwrap();
        assert_eq!(tokens[0].balance, BigInt::from(10_500_000u32));
        assert_eq!(tokens[0].address, "0xa");
        assert_eq!(raw.swap_fee().unwrap(), BigInt::from(3_000_000_000_000_000u64));
    }

    #[test]
    fn missing_parameter_is_reported() {
        let raw = RawPool {
            id: "p".into(),
            ..RawPool::default()
        };
        assert!(raw.param(&raw.amp, "amp", 3).is_err());
    }

    #[test]
    fn bad_json_is_malformed() {
        assert!(RawPool::from_json("{").is_err());
    }
}
