use anyhow::Result;
use cfmm_quote::{
    create_pool, Error, ErrorKind, InputError, MathError, Pool, RawPool, SwapKind, SwapRequest, Violation,
};
use num_bigint::{BigInt, BigUint};

const USDC: &str = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";
const XSGD: &str = "0x70e8de73ce538da2beed35d14187f6959a8eca96";
const WETH: &str = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";
const DAI: &str = "0x6b175474e89094c44da98b954eedeac495271d0f";

fn fx_pool() -> Result<Pool> {
    let raw = RawPool::from_json(&format!(
        r#"{{
            "id": "0x55bec22f8f6c69137ceaf284d9b441db1b9bfedc000200000000000000000416",
            "address": "0x55bec22f8f6c69137ceaf284d9b441db1b9bfedc",
            "poolType": "FX",
            "alpha": "0.8",
            "beta": "0.48",
            "delta": "0.175",
            "epsilon": "0.0005",
            "lambda": "0.3",
            "tokens": [
                {{ "address": "{USDC}", "balance": "1000000", "decimals": 6, "latestFXPrice": "1", "fxOracleDecimals": 8 }},
                {{ "address": "{XSGD}", "balance": "1351351", "decimals": 6, "latestFXPrice": "0.74", "fxOracleDecimals": 8 }}
            ]
        }}"#
    ))?;
    Ok(create_pool(137, &raw)?)
}

/// Balanced pool with a narrow 5% band around the 50/50 split.
fn tight_fx_pool() -> Result<Pool> {
    let raw = RawPool::from_json(&format!(
        r#"{{
            "id": "usdc-xsgd-tight",
            "address": "0x0000000000000000000000000000000000000f0f",
            "poolType": "FX",
            "alpha": "0.05",
            "beta": "0.04",
            "delta": "0.175",
            "epsilon": "0.0005",
            "lambda": "0.3",
            "tokens": [
                {{ "address": "{USDC}", "balance": "1000000", "decimals": 6, "latestFXPrice": "1", "fxOracleDecimals": 8 }},
                {{ "address": "{XSGD}", "balance": "1000000", "decimals": 6, "latestFXPrice": "1", "fxOracleDecimals": 8 }}
            ]
        }}"#
    ))?;
    Ok(create_pool(137, &raw)?)
}

fn weighted_pool() -> Result<Pool> {
    let raw = RawPool::from_json(&format!(
        r#"{{
            "id": "weth-dai-80-20",
            "address": "0x0b09dea16768f0799065c475be02919503cb2a35",
            "poolType": "Weighted",
            "poolTypeVersion": 2,
            "swapFee": "0.003",
            "tokens": [
                {{ "address": "{WETH}", "balance": "1250.5", "decimals": 18, "weight": "0.8" }},
                {{ "address": "{DAI}", "balance": "790000", "decimals": 18, "weight": "0.2" }}
            ]
        }}"#
    ))?;
    Ok(create_pool(1, &raw)?)
}

fn units(whole: u64, decimals: u32) -> BigUint {
    BigUint::from(whole) * BigUint::from(10u8).pow(decimals)
}

fn given_in(token_in: &str, token_out: &str, amount: BigUint) -> SwapRequest {
    SwapRequest {
        kind: SwapKind::GivenIn,
        token_in: token_in.to_owned(),
        token_out: token_out.to_owned(),
        amount,
    }
}

#[test]
fn fx_quotes_match_known_vectors() -> Result<()> {
    let pool = fx_pool()?;
    assert_eq!(pool.compute_out_given_in(USDC, XSGD, &units(1_000, 6))?, BigUint::from(1_350_675_674u64));
    assert_eq!(pool.compute_out_given_in(XSGD, USDC, &units(1_000, 6))?, BigUint::from(739_629_999u64));
    assert_eq!(pool.compute_in_given_out(USDC, XSGD, &units(300_000, 6))?, BigUint::from(222_111_000_000u64));
    Ok(())
}

#[test]
fn fx_is_deterministic() -> Result<()> {
    let pool = fx_pool()?;
    let amount = units(100_000, 6);
    let first = pool.compute_out_given_in(USDC, XSGD, &amount)?;
    for _ in 0..5 {
        assert_eq!(pool.compute_out_given_in(USDC, XSGD, &amount)?, first);
    }
    assert_eq!(first, BigUint::from(135_067_567_566u64));
    Ok(())
}

#[test]
fn fx_round_trip_pays_epsilon_twice() -> Result<()> {
    let pool = fx_pool()?;
    let amount = units(1_000, 6);
    let out = pool.compute_out_given_in(USDC, XSGD, &amount)?;
    let back = pool.compute_in_given_out(USDC, XSGD, &out)?;
    assert_eq!(back, BigUint::from(999_999_747u64));
    assert!(back < amount);
    Ok(())
}

#[test]
fn fx_halts_instead_of_clamping() -> Result<()> {
    let pool = fx_pool()?;
    let err = pool.compute_out_given_in(USDC, XSGD, &units(900_000, 6)).unwrap_err();
    assert_eq!(err, Error::InvariantViolation(Violation::UpperHalt));
    let err = pool.compute_in_given_out(USDC, XSGD, &units(1_300_000, 6)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    // Halts compare against post-trade liquidity, so the limit is conservative.
    assert_eq!(pool.compute_out_given_in(USDC, XSGD, &units(800_000, 6))?, BigUint::from(1_039_347_747_950u64));
    Ok(())
}

#[test]
fn tight_fx_band_halts_on_both_sides() -> Result<()> {
    let pool = tight_fx_pool()?;
    assert_eq!(pool.get_swap_limit(USDC, XSGD, SwapKind::GivenIn)?, BigUint::from(50_000_000_000u64));
    assert_eq!(pool.get_swap_limit(USDC, XSGD, SwapKind::GivenOut)?, BigUint::from(49_999_999_999u64));

    // Inside the band the curve bends but still quotes.
    assert_eq!(pool.compute_out_given_in(USDC, XSGD, &units(49_000, 6))?, BigUint::from(48_947_257_022u64));
    assert_eq!(pool.compute_in_given_out(USDC, XSGD, &units(49_000, 6))?, BigUint::from(49_052_949_868u64));
    assert_eq!(pool.compute_out_given_in(USDC, XSGD, &units(50_000, 6))?, BigUint::from(49_940_144_865u64));

    let upper = Error::InvariantViolation(Violation::UpperHalt);
    assert_eq!(pool.compute_out_given_in(USDC, XSGD, &units(51_000, 6)).unwrap_err(), upper);
    assert_eq!(pool.compute_in_given_out(USDC, XSGD, &units(50_000, 6)).unwrap_err(), upper);

    // USDC is drained below its band, and it is checked first.
    let lower = Error::InvariantViolation(Violation::LowerHalt);
    assert_eq!(pool.compute_out_given_in(XSGD, USDC, &units(60_000, 6)).unwrap_err(), lower);
    assert_eq!(pool.compute_in_given_out(XSGD, USDC, &units(60_000, 6)).unwrap_err(), lower);
    assert_eq!(pool.compute_in_given_out(XSGD, USDC, &units(50_000, 6)).unwrap_err(), lower);
    Ok(())
}

#[test]
fn fx_limits_are_halt_headroom() -> Result<()> {
    let pool = fx_pool()?;
    assert_eq!(pool.get_swap_limit(USDC, XSGD, SwapKind::GivenIn)?, BigUint::from(799_999_766_000u64));
    assert_eq!(pool.get_swap_limit(USDC, XSGD, SwapKind::GivenOut)?, BigUint::from(1_081_080_764_864u64));
    Ok(())
}

#[test]
fn execute_moves_balances_by_the_quote() -> Result<()> {
    let mut pool = fx_pool()?;
    let request = given_in(USDC, XSGD, units(1_000, 6));
    let quoted = pool.quote(&request)?;
    let before = pool.clone();
    let executed = pool.execute(&request)?;
    assert_eq!(executed, quoted);
    assert_eq!(pool.tokens[0].balance, &before.tokens[0].balance + BigInt::from(executed.amount_in));
    assert_eq!(pool.tokens[1].balance, &before.tokens[1].balance - BigInt::from(executed.amount_out));
    Ok(())
}

#[test]
fn failed_execute_leaves_pool_untouched() -> Result<()> {
    let mut pool = fx_pool()?;
    let before = pool.clone();
    let err = pool.execute(&given_in(USDC, XSGD, units(900_000, 6))).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    assert_eq!(pool, before);

    let mut pool = weighted_pool()?;
    let before = pool.clone();
    let err = pool.execute(&given_in(WETH, DAI, units(1_000, 18))).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LimitExceeded);
    assert_eq!(pool, before);
    Ok(())
}

#[test]
fn quote_does_not_mutate() -> Result<()> {
    let pool = weighted_pool()?;
    let before = pool.clone();
    let result = pool.quote(&given_in(WETH, DAI, units(1, 18)))?;
    assert_eq!(pool, before);
    assert_eq!(result.token_in, WETH);
    assert!(result.amount_out > BigUint::default());
    Ok(())
}

#[test]
fn weighted_round_trip_covers_the_fee() -> Result<()> {
    let pool = weighted_pool()?;
    let amount = units(10, 18);
    let out = pool.compute_out_given_in(WETH, DAI, &amount)?;
    let back = pool.compute_in_given_out(WETH, DAI, &out)?;
    let gap = if back > amount { &back - &amount } else { &amount - &back };
    assert!(gap * 1_000_000_000u64 <= amount, "amount {amount} back {back}");
    Ok(())
}

#[test]
fn token_lookup_is_case_insensitive() -> Result<()> {
    let pool = weighted_pool()?;
    assert_eq!(pool.token_index(&WETH.to_uppercase())?, 0);
    assert_eq!(pool.token_index(DAI)?, 1);
    Ok(())
}

#[test]
fn bad_pairs_are_input_errors() -> Result<()> {
    let pool = weighted_pool()?;
    let one = units(1, 18);
    let err = pool.compute_out_given_in(WETH, USDC, &one).unwrap_err();
    assert_eq!(err, Error::from(InputError::UnknownToken(USDC.to_lowercase())));
    let err = pool.compute_out_given_in(WETH, WETH, &one).unwrap_err();
    assert!(matches!(err, Error::Input(InputError::UnsupportedPair { .. })));
    Ok(())
}

#[test]
fn oversized_trades_exceed_limits() -> Result<()> {
    let pool = weighted_pool()?;
    let limit = pool.get_swap_limit(WETH, DAI, SwapKind::GivenIn)?;
    assert!(pool.compute_out_given_in(WETH, DAI, &limit).is_ok());
    // The ratio cap applies after the fee is taken.
    let err = pool.compute_out_given_in(WETH, DAI, &(limit * 2u8)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LimitExceeded);

    let err = pool.compute_in_given_out(WETH, DAI, &units(800_000, 18)).unwrap_err();
    assert!(matches!(err, Error::LimitExceeded { .. }));
    Ok(())
}

#[test]
fn snapshot_list_builds_every_supported_pool() -> Result<()> {
    let raws = RawPool::list_from_json(
        r#"[
            { "id": "s", "address": "0x01", "poolType": "MetaStable", "swapFee": "0.0004", "amp": "200",
              "tokens": [
                { "address": "0x10", "balance": "1000", "decimals": 18, "priceRate": "1.05" },
                { "address": "0x11", "balance": "1100", "decimals": 18 } ] },
            { "id": "g", "address": "0x02", "poolType": "Gyro2", "swapFee": "0.001",
              "sqrtAlpha": "0.997496867163000167", "sqrtBeta": "1.002496882788171068",
              "tokens": [
                { "address": "0x20", "balance": "1000", "decimals": 18 },
                { "address": "0x21", "balance": "1200", "decimals": 6 } ] },
            { "id": "c", "address": "0x03", "poolType": "ComposableStable", "tokens": [] }
        ]"#,
    )?;
    let built: Vec<_> = raws.iter().map(|raw| create_pool(1, raw)).collect();
    assert!(built[0].is_ok());
    assert!(built[1].is_ok());
    assert_eq!(
        built[2].as_ref().unwrap_err(),
        &Error::from(InputError::UnsupportedPoolType("ComposableStable".to_owned()))
    );

    let stable = built[0].as_ref().unwrap();
    let out = stable.compute_out_given_in("0x10", "0x11", &units(10, 18))?;
    // The rate makes token 0 worth slightly more than token 1.
    assert!(out > units(10, 18) && out < units(11, 18));
    Ok(())
}

#[test]
fn missing_curve_parameter_is_reported() -> Result<()> {
    let raw = RawPool::from_json(
        r#"{ "id": "g3", "address": "0x04", "poolType": "Gyro3", "tokens": [
            { "address": "0x30", "balance": "1", "decimals": 18 },
            { "address": "0x31", "balance": "1", "decimals": 18 },
            { "address": "0x32", "balance": "1", "decimals": 18 } ] }"#,
    )?;
    let err = create_pool(1, &raw).unwrap_err();
    assert_eq!(
        err,
        Error::from(InputError::MissingParameter {
            pool: "g3".to_owned(),
            name: "root3Alpha",
        })
    );
    Ok(())
}

#[test]
fn drained_stable_token_is_a_math_error() -> Result<()> {
    let raw = RawPool::from_json(
        r#"{ "id": "s0", "address": "0x05", "poolType": "Stable", "swapFee": "0.0004", "amp": "200",
             "tokens": [
                { "address": "0x50", "balance": "0", "decimals": 18 },
                { "address": "0x51", "balance": "1000000", "decimals": 18 } ] }"#,
    )?;
    let pool = create_pool(1, &raw)?;
    let err = pool.compute_out_given_in("0x51", "0x50", &units(1, 18)).unwrap_err();
    assert_eq!(err, Error::Math(MathError::ZeroDivision));
    let err = pool.compute_out_given_in("0x50", "0x51", &units(1, 18)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Math);
    Ok(())
}
