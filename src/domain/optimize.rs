//! Sequential grid search over rotation-strategy parameters.
//!
//! Each trial owns a fresh engine and ledger; nothing is shared across
//! trials, so a caller may cancel between trials at any point.

use std::collections::{BTreeMap, HashMap};

use super::backtest::{BacktestConfig, BacktestEngine};
use super::error::RotraderError;
use super::series::PriceSeries;
use super::strategy::{RotationParams, RotationStrategy, Strategy};

/// Score assigned to trials whose metric is unusable (empty run, or a
/// degenerate drawdown for Calmar).
pub const FAILED_SCORE: f64 = -999.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreMetric {
    Calmar,
    Sharpe,
    Return,
}

impl ScoreMetric {
    pub fn score(&self, metrics: &BTreeMap<String, f64>) -> f64 {
        if metrics.is_empty() {
            return FAILED_SCORE;
        }
        match self {
            ScoreMetric::Calmar => {
                let ann = metrics.get("Annualized Return").copied().unwrap_or(0.0);
                let max_dd = metrics.get("Max Drawdown").copied().unwrap_or(0.0).abs();
                if max_dd > 1e-4 {
                    ann / max_dd
                } else {
                    FAILED_SCORE
                }
            }
            ScoreMetric::Sharpe => metrics
                .get("Sharpe Ratio")
                .copied()
                .unwrap_or(FAILED_SCORE),
            ScoreMetric::Return => metrics
                .get("Annualized Return")
                .copied()
                .unwrap_or(FAILED_SCORE),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrialResult {
    pub params: RotationParams,
    pub score: f64,
    pub metrics: BTreeMap<String, f64>,
}

/// Axes of the search. Empty `stop_loss_pcts` means the stop-loss filter
/// keeps whatever the base parameters say.
#[derive(Debug, Clone)]
pub struct GridSearch {
    pub max_assets: Vec<usize>,
    pub momentum_windows: Vec<usize>,
    pub stop_loss_pcts: Vec<f64>,
    pub metric: ScoreMetric,
}

impl GridSearch {
    fn combinations(&self, base: &RotationParams) -> Vec<RotationParams> {
        let mut out = Vec::new();
        for &m in &self.max_assets {
            for &n in &self.momentum_windows {
                if self.stop_loss_pcts.is_empty() {
                    out.push(RotationParams {
                        max_assets: m,
                        momentum_window: n,
                        ..*base
                    });
                } else {
                    for &pct in &self.stop_loss_pcts {
                        out.push(RotationParams {
                            max_assets: m,
                            momentum_window: n,
                            stop_loss_pct: Some(pct),
                            ..*base
                        });
                    }
                }
            }
        }
        out
    }

    /// Run every combination, returning the best parameters (None when every
    /// trial failed) and all trial results in grid order.
    pub fn run(
        &self,
        data: &HashMap<String, PriceSeries>,
        base: &RotationParams,
        config: &BacktestConfig,
    ) -> Result<(Option<RotationParams>, Vec<TrialResult>), RotraderError> {
        let mut best: Option<(f64, RotationParams)> = None;
        let mut results = Vec::new();

        for params in self.combinations(base) {
            let mut engine = BacktestEngine::new(data, config.clone())?;
            let mut strategy = Strategy::Rotation(RotationStrategy::new(params));
            engine.run(&mut strategy)?;

            let metrics = engine.get_metrics();
            let score = self.metric.score(&metrics);

            if score > FAILED_SCORE && best.as_ref().map(|(b, _)| score > *b).unwrap_or(true) {
                best = Some((score, params));
            }
            results.push(TrialResult {
                params,
                score,
                metrics,
            });
        }

        Ok((best.map(|(_, p)| p), results))
    }
}
