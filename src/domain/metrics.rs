//! Performance metrics from a daily return series.

use std::collections::BTreeMap;

use super::ledger::EquityPoint;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// |max drawdown| below this counts as "no drawdown": Calmar is reported as
/// the 0.0 sentinel instead of exploding.
const DRAWDOWN_FLOOR: f64 = 1e-4;

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    /// Most negative peak-to-trough excursion; 0 for a curve that never dips.
    pub max_drawdown: f64,
    pub calmar_ratio: f64,
}

impl Metrics {
    /// Compute from daily simple returns. Returns None for an empty series.
    pub fn from_returns(returns: &[f64], risk_free_rate: f64) -> Option<Metrics> {
        if returns.is_empty() {
            return None;
        }

        let total_return: f64 = returns.iter().map(|r| 1.0 + r).product::<f64>() - 1.0;
        let n_days = returns.len() as f64;
        let annualized_return =
            (1.0 + total_return).powf(TRADING_DAYS_PER_YEAR / n_days) - 1.0;

        let volatility = sample_std(returns) * TRADING_DAYS_PER_YEAR.sqrt();
        let sharpe_ratio = if volatility > 0.0 {
            (annualized_return - risk_free_rate) / volatility
        } else {
            0.0
        };

        let downside: Vec<f64> = returns.iter().copied().filter(|&r| r < 0.0).collect();
        let downside_vol = sample_std(&downside) * TRADING_DAYS_PER_YEAR.sqrt();
        let sortino_ratio = if downside_vol > 0.0 {
            (annualized_return - risk_free_rate) / downside_vol
        } else {
            0.0
        };

        let max_drawdown = max_drawdown(returns);
        let calmar_ratio = if max_drawdown.abs() > DRAWDOWN_FLOOR {
            annualized_return / max_drawdown.abs()
        } else {
            0.0
        };

        Some(Metrics {
            total_return,
            annualized_return,
            volatility,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            calmar_ratio,
        })
    }

    /// Compute from an equity curve (needs at least two points for one
    /// return observation).
    pub fn from_equity_curve(curve: &[EquityPoint], risk_free_rate: f64) -> Option<Metrics> {
        let returns: Vec<f64> = curve
            .windows(2)
            .filter(|w| w[0].equity > 0.0)
            .map(|w| w[1].equity / w[0].equity - 1.0)
            .collect();
        Metrics::from_returns(&returns, risk_free_rate)
    }

    /// Descriptive-name map for reporting.
    pub fn named(&self) -> BTreeMap<String, f64> {
        [
            ("Total Return", self.total_return),
            ("Annualized Return", self.annualized_return),
            ("Volatility", self.volatility),
            ("Sharpe Ratio", self.sharpe_ratio),
            ("Sortino Ratio", self.sortino_ratio),
            ("Max Drawdown", self.max_drawdown),
            ("Calmar Ratio", self.calmar_ratio),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

fn sample_std(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    var.sqrt()
}

/// min over time of (wealth - running peak) / running peak; <= 0.
fn max_drawdown(returns: &[f64]) -> f64 {
    let mut wealth = 1.0;
    let mut peak = 1.0;
    let mut max_dd = 0.0f64;
    for r in returns {
        wealth *= 1.0 + r;
        if wealth > peak {
            peak = wealth;
        } else if peak > 0.0 {
            max_dd = max_dd.min((wealth - peak) / peak);
        }
    }
    max_dd
}
