use approx::assert_relative_eq;
use cfmm_quote::fixed_point::{div_down, div_up, mul_down, mul_up, pow10};
use cfmm_quote::log_exp;
use cfmm_quote::pools::gyro2::Gyro2Math;
use cfmm_quote::pools::gyro3::Gyro3Math;
use cfmm_quote::pools::gyro_e::{DerivedGyroEParams, GyroEMath, GyroEParams, Vector2};
use cfmm_quote::pools::linear::{self, LinearParams};
use cfmm_quote::pools::{stable, weighted};
use cfmm_quote::{Pool, PoolKind, PoolToken};
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use proptest::prelude::*;

fn wad(whole: u64, dust: u64) -> BigInt {
    BigInt::from(whole) * pow10(18) + dust
}

fn as_f64(x: &BigInt) -> f64 {
    x.to_f64().unwrap() / 1e18
}

fn test_pool(kind: PoolKind, balances: Vec<BigInt>, fee: BigInt) -> Pool {
    let tokens = balances
        .into_iter()
        .enumerate()
        .map(|(i, balance)| PoolToken::new(format!("0x{:040x}", 0xa0 + 0x10 * i), 18, balance).unwrap())
        .collect();
    Pool {
        chain_id: 1,
        id: "prop".to_owned(),
        address: "0x00000000000000000000000000000000000000ff".to_owned(),
        pool_type: "test".to_owned(),
        swap_fee: fee,
        tokens,
        kind,
    }
}

/// `|back - x| <= x * 1e-15 + 10`.
fn within_rounding(x: &BigInt, back: &BigInt) -> bool {
    (back - x).abs() <= x / 1_000_000_000_000_000u64 + 10u8
}

/// Round trip of one linear pair. Legs the pool rejects are skipped.
fn close(x: &BigInt, out: cfmm_quote::Result<BigInt>, back: impl FnOnce(&BigInt) -> cfmm_quote::Result<BigInt>) -> bool {
    match out {
        Ok(out) if !out.is_zero() => back(&out).map_or(true, |back| within_rounding(x, &back)),
        _ => true,
    }
}

/// Quotes `amount` of token `i` into token `o` and back; `None` when either
/// leg is rejected.
fn round_trip(pool: &Pool, i: usize, o: usize, amount: &BigInt) -> Option<(BigInt, BigInt)> {
    let (a, b) = (&pool.tokens[i].address, &pool.tokens[o].address);
    let out = pool.compute_out_given_in(a, b, &amount.to_biguint()?).ok()?;
    if out.is_zero() {
        return None;
    }
    let back = pool.compute_in_given_out(a, b, &out).ok()?;
    Some((BigInt::from(out), BigInt::from(back)))
}

fn gyro_e() -> GyroEMath {
    let n = |s: &str| s.parse::<BigInt>().unwrap();
    GyroEMath {
        params: GyroEParams {
            alpha: n("998502246630054917"),
            beta: n("1000200040008001600"),
            c: n("707106781186547524"),
            s: n("707106781186547524"),
            lambda: n("4000000000000000000000"),
        },
        derived: DerivedGyroEParams {
            tau_alpha: Vector2::new(
                n("-94861212813096057289512505574275160547"),
                n("31644119574235279926451292677567331630"),
            ),
            tau_beta: Vector2::new(
                n("37142269533113549537591131345643981951"),
                n("92846388265400743995957747409218517601"),
            ),
            u: n("66001741173104803338721745994955553010"),
            v: n("62245253919818011890633399060291020887"),
            w: n("30601134345582732000058913853921008022"),
            z: n("-28859471639991253843240999485797747790"),
            d_sq: n("99999999999999999886624093342106115200"),
        },
    }
}

proptest! {
    #[test]
    fn mul_and_div_bracket_the_exact_result(a in 0u64..u64::MAX, b in 1u64..u64::MAX) {
        let (a, b) = (BigInt::from(a), BigInt::from(b));
        let (lo, hi) = (mul_down(&a, &b), mul_up(&a, &b));
        prop_assert!(lo <= hi && &hi - &lo <= BigInt::from(1u8));
        let (lo, hi) = (div_down(&a, &b).unwrap(), div_up(&a, &b).unwrap());
        prop_assert!(lo <= hi && &hi - &lo <= BigInt::from(1u8));
    }

    #[test]
    fn pow_tracks_float_reference(x in 500_000_000_000_000_000u64..2_000_000_000_000_000_000, y in 100_000_000_000_000_000u64..4_000_000_000_000_000_000) {
        let (xb, yb) = (BigInt::from(x), BigInt::from(y));
        let got = as_f64(&log_exp::pow(&xb, &yb).unwrap());
        assert_relative_eq!(got, (x as f64 / 1e18).powf(y as f64 / 1e18), max_relative = 1e-9);
    }

    #[test]
    fn ln_tracks_float_reference(x in 1_000_000_000_000_000u64..u64::MAX) {
        let got = as_f64(&log_exp::ln(&BigInt::from(x)).unwrap());
        assert_relative_eq!(got, (x as f64 / 1e18).ln(), epsilon = 1e-12, max_relative = 1e-9);
    }

    #[test]
    fn linear_round_trips_stay_within_rounding(
        fee in prop::sample::select(vec![0u64, 1_000_000_000_000_000, 20_000_000_000_000_000]),
        rate in 1_000_000_000_000_000_000u64..1_300_000_000_000_000_000,
        lower in 0u64..1_000_000,
        width in 0u64..1_000_000,
        main in 0u64..3_000_000,
        wrapped in 0u64..3_000_000,
        extra in 1u64..1_000_000,
        amount in 1_000_000_000_000u64..u64::MAX,
    ) {
        let params = LinearParams {
            fee: BigInt::from(fee),
            rate: BigInt::from(rate),
            lower_target: wad(lower, 0),
            upper_target: wad(lower + width, 0),
        };
        let (m, w) = (wad(main, 7), wad(wrapped, 3));
        let supply = &m + &w + wad(extra, 0);
        let x = BigInt::from(amount);
        let p = &params;

        prop_assert!(close(&x, linear::calc_wrapped_out_per_main_in(&x, &m, p), |o| linear::calc_main_in_per_wrapped_out(o, &m, p)));
        prop_assert!(close(&x, linear::calc_main_out_per_wrapped_in(&x, &m, p), |o| linear::calc_wrapped_in_per_main_out(o, &m, p)));
        prop_assert!(close(
            &x,
            linear::calc_bpt_out_per_main_in(&x, &m, &w, &supply, p),
            |o| linear::calc_main_in_per_bpt_out(o, &m, &w, &supply, p),
        ));
        prop_assert!(close(
            &x,
            linear::calc_main_out_per_bpt_in(&x, &m, &w, &supply, p),
            |o| linear::calc_bpt_in_per_main_out(o, &m, &w, &supply, p),
        ));
        prop_assert!(close(
            &x,
            linear::calc_bpt_out_per_wrapped_in(&x, &m, &w, &supply, p),
            |o| linear::calc_wrapped_in_per_bpt_out(o, &m, &w, &supply, p),
        ));
        prop_assert!(close(
            &x,
            linear::calc_wrapped_out_per_bpt_in(&x, &m, &w, &supply, p),
            |o| linear::calc_bpt_in_per_wrapped_out(o, &m, &w, &supply, p),
        ));
    }

    #[test]
    fn weighted_round_trip_loses_at_most_pow_error(
        balance_in in 100u64..10_000_000_000,
        balance_out in 100u64..10_000_000_000,
        weight_in in prop::sample::select(vec![2u64, 5, 8]),
        share in 100u64..3_000,
        version in 1u32..=2,
    ) {
        let (bi, bo) = (wad(balance_in, 0), wad(balance_out, 0));
        let wi = BigInt::from(weight_in) * pow10(17);
        let wo = BigInt::from(10 - weight_in) * pow10(17);
        let x = &bi * share / 10_000u32;
        let out = weighted::calc_out_given_in(&bi, &wi, &bo, &wo, &x, version).unwrap();
        if out.is_zero() || out > &bo * 3u8 / 10u8 {
            return Ok(());
        }
        let back = weighted::calc_in_given_out(&bi, &wi, &bo, &wo, &out, version).unwrap();
        prop_assert!(&back * 10_000_000_000u64 >= &x * 9_999_999_999u64, "x {} back {}", x, back);
    }

    #[test]
    fn gyro2_round_trip_never_favours_the_trader(
        x in 1u64..1_000_000,
        ratio in 50u64..200,
        token_in in 0usize..2,
        share in 1u64..2_000,
        fee in prop::sample::select(vec![0u64, 3_000_000_000_000_000]),
    ) {
        let x = wad(x, 0);
        let y = &x * ratio / 100u8;
        let math = Gyro2Math {
            sqrt_alpha: BigInt::from(997_496_867_163_000_167u64),
            sqrt_beta: BigInt::from(1_002_496_882_788_171_068u64),
        };
        let pool = test_pool(PoolKind::Gyro2(math), vec![x, y], BigInt::from(fee));
        let amount = &pool.tokens[token_in].balance * share / 10_000u32;
        if let Some((_, back)) = round_trip(&pool, token_in, 1 - token_in, &amount) {
            prop_assert!(back >= amount, "amount {} back {}", amount, back);
        }
    }

    #[test]
    fn gyro3_round_trip_loses_at_most_one_wei(
        whole in prop::collection::vec(1_000u64..1_000_000, 3),
        dust in prop::collection::vec(0u64..1_000_000_000_000_000_000, 3),
        root3_alpha in prop::sample::select(vec![960_000_000_000_000_000u64, 987_654_321_000_000_000, 999_500_000_000_000_000]),
        fee in prop::sample::select(vec![0u64, 3_000_000_000_000_000]),
        share in 1u64..5_000,
    ) {
        let balances: Vec<BigInt> = whole.iter().zip(&dust).map(|(w, d)| wad(*w, *d)).collect();
        let math = Gyro3Math { root3_alpha: BigInt::from(root3_alpha) };
        let pool = test_pool(PoolKind::Gyro3(math), balances, BigInt::from(fee));
        let amount = &pool.tokens[0].balance * share / 10_000u32;
        if let Some((_, back)) = round_trip(&pool, 0, 1, &amount) {
            prop_assert!(&back + 1u8 >= amount, "amount {} back {}", amount, back);
        }
    }

    #[test]
    fn gyro_e_round_trip_loses_at_most_sqrt_error(
        b0 in 100u64..1_000_000,
        dust in prop::collection::vec(0u64..1_000_000_000_000_000_000, 2),
        ratio in 50u64..200,
        token_in in 0usize..2,
        share in 1u64..2_500,
    ) {
        let b0 = wad(b0, dust[0]);
        let b1 = &b0 * ratio / 100u8 + dust[1];
        // The invariant's sqrt error is absolute, so its effect on a quote
        // grows as the balances shrink.
        let slack = BigInt::from(20u8) + BigInt::from(3u8) * pow10(22) / (&b0).min(&b1);
        let pool = test_pool(PoolKind::GyroE(gyro_e()), vec![b0, b1], BigInt::default());
        let amount = &pool.tokens[token_in].balance * share / 10_000u32;
        if let Some((_, back)) = round_trip(&pool, token_in, 1 - token_in, &amount) {
            prop_assert!(&back + &slack >= amount, "amount {} back {}", amount, back);
        }
    }

    #[test]
    fn stable_solver_converges_and_round_trips(
        n in 2usize..=4,
        base in 100u64..100_000_000,
        skew in prop::collection::vec(50u64..200, 4),
        amp in 1u32..5_000,
        share in 1u64..2_000,
    ) {
        let balances: Vec<BigInt> = skew[..n].iter().map(|s| wad(base, 0) * *s / 100u8).collect();
        let amp = BigInt::from(amp * stable::AMP_PRECISION);
        let invariant = stable::calculate_invariant(&amp, &balances).unwrap();
        let amount = &balances[0] * share / 10_000u32;
        let out = stable::calc_out_given_in(&amp, &balances, 0, 1, &amount, &invariant).unwrap();
        let back = stable::calc_in_given_out(&amp, &balances, 0, 1, &out, &invariant).unwrap();
        prop_assert!(within_rounding(&amount, &back));
    }
}
