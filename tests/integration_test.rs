//! Integration tests.
//!
//! Cover the full pipeline from a data port through alignment, signal
//! precomputation, simulation and reporting, plus invariant properties of
//! the selection policy and the ledger.

mod common;

use common::*;
use proptest::prelude::*;
use rotrader::domain::backtest::BacktestEngine;
use rotrader::domain::ledger::PortfolioLedger;
use rotrader::domain::selection::{select_assets, SelectionParams};
use rotrader::domain::strategy::{
    Basket, MomentumStrategy, RotationParams, RotationStrategy, Strategy, TargetWeights,
};
use rotrader::ports::data_port::DataPort;
use std::collections::{HashMap, HashSet};

fn rotation_params(m: usize, n: usize, k: usize) -> RotationParams {
    RotationParams {
        max_assets: m,
        momentum_window: n,
        corr_window: k,
        corr_threshold: 0.8,
        stop_loss_pct: None,
        factor_floor: None,
        signal_lag: 1,
    }
}

mod full_pipeline {
    use super::*;

    #[test]
    fn data_port_to_metrics() {
        let port = MockDataPort::new()
            .with_series("513100", make_series(date(2024, 1, 1), &trending_closes(50.0, 30)))
            .with_series("510880", make_series(date(2024, 1, 1), &choppy_closes(100.0, 30)));

        let assets = vec![asset("nasdaq", "513100"), asset("dividend", "510880")];
        let data = port.load_all(&assets).unwrap();
        assert_eq!(data.len(), 2);

        let mut engine = BacktestEngine::new(&data, sample_config()).unwrap();
        let mut strategy = Strategy::Rotation(RotationStrategy::new(rotation_params(1, 5, 5)));
        let curve = engine.run(&mut strategy).unwrap();
        assert_eq!(curve.len(), 30);

        let metrics = engine.get_metrics();
        assert!(metrics.contains_key("Annualized Return"));
        assert!(metrics.contains_key("Sortino Ratio"));
        assert!(metrics["Total Return"] > 0.0);

        let pnl = engine.get_asset_pnl();
        assert_eq!(pnl[0].asset, "nasdaq");
        assert!(pnl[0].total_pnl > 0.0);
    }

    #[test]
    fn failing_asset_is_excluded_but_run_proceeds() {
        let port = MockDataPort::new()
            .with_series("513100", make_series(date(2024, 1, 1), &trending_closes(50.0, 30)))
            .with_error("518880", "source down");

        let assets = vec![asset("nasdaq", "513100"), asset("gold", "518880")];
        let data = port.load_all(&assets).unwrap();
        assert_eq!(data.len(), 1);

        let mut engine = BacktestEngine::new(&data, sample_config()).unwrap();
        let mut strategy = Strategy::Rotation(RotationStrategy::new(rotation_params(1, 5, 5)));
        assert!(engine.run(&mut strategy).is_ok());
    }

    #[test]
    fn update_failures_surface_as_retry_list() {
        let port = MockDataPort::new()
            .with_series("513100", make_series(date(2024, 1, 1), &trending_closes(50.0, 5)))
            .with_error("518880", "source down");

        let assets = vec![asset("nasdaq", "513100"), asset("gold", "518880")];
        let failed = port.update_all(&assets);

        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].name, "gold");
        assert_eq!(failed[0].code, "518880");
    }

    #[test]
    fn momentum_variant_runs_end_to_end() {
        let port = MockDataPort::new()
            .with_series("513100", make_series(date(2024, 1, 1), &trending_closes(50.0, 30)))
            .with_series("510880", make_series(date(2024, 1, 1), &choppy_closes(100.0, 30)));
        let assets = vec![asset("nasdaq", "513100"), asset("dividend", "510880")];
        let data = port.load_all(&assets).unwrap();

        let baskets = vec![
            Basket {
                key: "bull".into(),
                weights: [("nasdaq".to_string(), 1.0)].into_iter().collect(),
            },
            Basket {
                key: "bear".into(),
                weights: [("dividend".to_string(), 1.0)].into_iter().collect(),
            },
        ];
        let mut engine = BacktestEngine::new(&data, sample_config()).unwrap();
        let mut strategy = Strategy::Momentum(MomentumStrategy::new(baskets, 5, 1));
        engine.run(&mut strategy).unwrap();

        // the trending basket carries the curve up
        assert!(engine.get_metrics()["Total Return"] > 0.0);
    }
}

mod selection_scenarios {
    use super::*;

    #[test]
    fn momentum_selects_the_riser_at_first_eligible_date() {
        // asset A flat (tiny wobble), asset B up ~50% over the window
        let n = 5;
        let b: Vec<f64> = vec![50.0, 54.0, 59.0, 63.0, 69.0, 75.0, 81.0, 87.0, 94.0, 101.0];
        let port = MockDataPort::new()
            .with_series("a", make_series(date(2024, 1, 1), &choppy_closes(100.0, 10)))
            .with_series("b", make_series(date(2024, 1, 1), &b));
        let data = port
            .load_all(&[asset("a", "a"), asset("b", "b")])
            .unwrap();

        let mut engine = BacktestEngine::new(&data, sample_config()).unwrap();
        let mut strategy = RotationStrategy::new(rotation_params(1, n, n));
        strategy.attach(engine.close_table(), engine.calendar());

        let signals = strategy.signals();
        let first_eligible = date(2024, 1, 1 + n as u32);
        assert_eq!(signals[&first_eligible], vec!["b".to_string()]);

        let mut wrapped = Strategy::Rotation(strategy);
        engine.run(&mut wrapped).unwrap();
        assert!(engine.get_metrics()["Total Return"] > 0.0);
    }

    #[test]
    fn stop_loss_excludes_crashed_leader_next_day() {
        // "b" leads, crashes 15% on day 7, still has the best long-window
        // factor; it must not be selected on the crash date
        let mut b = trending_closes(50.0, 12);
        b[6] = b[5] * 0.85;
        for i in 7..12 {
            b[i] = b[i - 1] * 1.01;
        }
        let port = MockDataPort::new()
            .with_series("a", make_series(date(2024, 1, 1), &choppy_closes(100.0, 12)))
            .with_series("b", make_series(date(2024, 1, 1), &b));
        let data = port
            .load_all(&[asset("a", "a"), asset("b", "b")])
            .unwrap();

        let engine = BacktestEngine::new(&data, sample_config()).unwrap();
        let mut strategy = RotationStrategy::new(RotationParams {
            stop_loss_pct: Some(0.05),
            ..rotation_params(1, 4, 4)
        });
        strategy.attach(engine.close_table(), engine.calendar());

        let crash_date = date(2024, 1, 7);
        assert_eq!(
            strategy.stopped_assets_log().get(&crash_date),
            Some(&vec!["b".to_string()])
        );
        assert!(!strategy.signals()[&crash_date].contains(&"b".to_string()));
    }

    #[test]
    fn correlation_ceiling_diversifies_the_pair() {
        // twin trending assets plus an anti-correlated one: M=2 must not
        // hold both twins
        let twin_a = trending_closes(50.0, 20);
        let twin_b: Vec<f64> = twin_a.iter().map(|c| c * 0.5).collect();
        let inverse: Vec<f64> = {
            let steps = [-0.018, -0.011, -0.02, -0.013, -0.016, -0.009, -0.019, -0.012];
            let mut price = 200.0;
            (0..20)
                .map(|i| {
                    let p = price;
                    price *= 1.0 + steps[i % steps.len()];
                    p
                })
                .collect()
        };

        let port = MockDataPort::new()
            .with_series("ta", make_series(date(2024, 1, 1), &twin_a))
            .with_series("tb", make_series(date(2024, 1, 1), &twin_b))
            .with_series("inv", make_series(date(2024, 1, 1), &inverse));
        let data = port
            .load_all(&[asset("ta", "ta"), asset("tb", "tb"), asset("inv", "inv")])
            .unwrap();

        let engine = BacktestEngine::new(&data, sample_config()).unwrap();
        let mut strategy = RotationStrategy::new(rotation_params(2, 5, 5));
        strategy.attach(engine.close_table(), engine.calendar());

        for (_, selected) in strategy.signals() {
            let both_twins = selected.contains(&"ta".to_string())
                && selected.contains(&"tb".to_string());
            assert!(!both_twins, "correlated twins held together: {selected:?}");
        }
    }

    #[test]
    fn early_dates_have_no_selection() {
        let port = MockDataPort::new()
            .with_series("a", make_series(date(2024, 1, 1), &trending_closes(50.0, 10)));
        let data = port.load_all(&[asset("a", "a")]).unwrap();

        let engine = BacktestEngine::new(&data, sample_config()).unwrap();
        let mut strategy = RotationStrategy::new(rotation_params(1, 5, 5));
        strategy.attach(engine.close_table(), engine.calendar());

        let signals = strategy.signals();
        for i in 0..5u32 {
            assert!(signals[&date(2024, 1, 1 + i)].is_empty());
        }
    }
}

mod ledger_round_trips {
    use super::*;

    #[test]
    fn empty_targets_liquidate_everything() {
        let mut ledger = PortfolioLedger::new(100_000.0, 0.0);
        let prices: HashMap<String, f64> =
            [("a".to_string(), 10.0), ("b".to_string(), 20.0)].into_iter().collect();

        let targets: TargetWeights = [("a".to_string(), 0.6), ("b".to_string(), 0.4)]
            .into_iter()
            .collect();
        ledger.rebalance(date(2024, 1, 2), &targets, &prices);
        assert_eq!(ledger.position_count(), 2);

        ledger.rebalance(date(2024, 1, 3), &TargetWeights::new(), &prices);
        assert_eq!(ledger.position_count(), 0);
        assert!((ledger.cash - 100_000.0).abs() < 1e-9);
    }

    #[test]
    fn full_cash_strategy_keeps_equity_flat() {
        // factor floor so high that nothing is ever selected
        let port = MockDataPort::new()
            .with_series("a", make_series(date(2024, 1, 1), &trending_closes(50.0, 15)));
        let data = port.load_all(&[asset("a", "a")]).unwrap();

        let mut engine = BacktestEngine::new(&data, sample_config()).unwrap();
        let mut strategy = Strategy::Rotation(RotationStrategy::new(RotationParams {
            factor_floor: Some(1e9),
            ..rotation_params(1, 5, 5)
        }));
        engine.run(&mut strategy).unwrap();

        for point in engine.equity_curve() {
            assert!((point.equity - 100_000.0).abs() < 1e-9);
        }
        // all-cash run produces no per-asset P&L
        assert!(engine.get_asset_pnl().is_empty());
    }
}

mod invariant_properties {
    use super::*;

    proptest! {
        #[test]
        fn selection_never_exceeds_capacity(
            factors in prop::collection::vec(
                prop::option::of(-5.0f64..5.0), 1..12,
            ),
            m in 1usize..6,
        ) {
            let row: Vec<f64> = factors
                .iter()
                .map(|f| f.unwrap_or(f64::NAN))
                .collect();
            let selected = select_assets(
                &row,
                &HashSet::new(),
                None,
                &SelectionParams { max_assets: m, corr_threshold: 0.8 },
            );

            prop_assert!(selected.len() <= m);
            // every selected column had a defined factor
            for &col in &selected {
                prop_assert!(!row[col].is_nan());
            }
            // no duplicates
            let unique: HashSet<usize> = selected.iter().copied().collect();
            prop_assert_eq!(unique.len(), selected.len());
        }

        #[test]
        fn rebalance_conserves_equity_without_commission(
            w_a in 0.0f64..0.5,
            w_b in 0.0f64..0.5,
            price_a in 1.0f64..500.0,
            price_b in 1.0f64..500.0,
        ) {
            let mut ledger = PortfolioLedger::new(100_000.0, 0.0);
            let prices: HashMap<String, f64> = [
                ("a".to_string(), price_a),
                ("b".to_string(), price_b),
            ]
            .into_iter()
            .collect();
            let targets: TargetWeights = [
                ("a".to_string(), w_a),
                ("b".to_string(), w_b),
            ]
            .into_iter()
            .collect();

            ledger.rebalance(date(2024, 1, 2), &targets, &prices);

            let equity = ledger.total_equity(&prices);
            prop_assert!((equity - 100_000.0).abs() < 1e-6);
        }

        #[test]
        fn commission_only_ever_reduces_equity(
            w in 0.1f64..0.9,
            rate in 0.0001f64..0.01,
        ) {
            let mut ledger = PortfolioLedger::new(100_000.0, rate);
            let prices: HashMap<String, f64> = [("a".to_string(), 10.0)].into_iter().collect();
            let targets: TargetWeights = [("a".to_string(), w)].into_iter().collect();

            ledger.rebalance(date(2024, 1, 2), &targets, &prices);
            prop_assert!(ledger.total_equity(&prices) < 100_000.0);

            ledger.rebalance(date(2024, 1, 3), &TargetWeights::new(), &prices);
            prop_assert!(ledger.cash < 100_000.0);
            prop_assert_eq!(ledger.position_count(), 0);
        }
    }
}
