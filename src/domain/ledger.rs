//! Portfolio ledger: cash, positions, cost basis, and P&L accounting.
//!
//! Mutated once per simulated day by `rebalance`. Held assets absent from the
//! target set are fully liquidated: full position turnover, not partial
//! trimming.

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

use super::strategy::TargetWeights;

/// Trades below this notional are skipped to avoid float-dust churn.
const MIN_TRADE_NOTIONAL: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    /// Share count; may be fractional.
    pub shares: f64,
    /// Volume-weighted average cost per share (commission excluded).
    pub cost_basis: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
    pub cash: f64,
    /// Snapshot of (asset, shares) held at the close.
    pub positions: Vec<(String, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssetPnl {
    pub asset: String,
    pub total_pnl: f64,
    /// P&L as a fraction of initial capital.
    pub contribution: f64,
}

#[derive(Debug, Clone)]
pub struct PortfolioLedger {
    pub cash: f64,
    initial_capital: f64,
    commission_rate: f64,
    positions: HashMap<String, Position>,
    realized_pnl: HashMap<String, f64>,
}

impl PortfolioLedger {
    pub fn new(initial_capital: f64, commission_rate: f64) -> Self {
        Self {
            cash: initial_capital,
            initial_capital,
            commission_rate,
            positions: HashMap::new(),
            realized_pnl: HashMap::new(),
        }
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    pub fn position(&self, asset: &str) -> Option<&Position> {
        self.positions.get(asset)
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Cash plus position value at the given prices. Positions without a
    /// price are skipped (unreachable once forward-fill has started).
    pub fn total_equity(&self, prices: &HashMap<String, f64>) -> f64 {
        let position_value: f64 = self
            .positions
            .iter()
            .filter_map(|(asset, pos)| prices.get(asset).map(|&p| pos.shares * p))
            .sum();
        self.cash + position_value
    }

    /// Rebalance toward `targets` at the given execution prices.
    ///
    /// Held assets absent from the target set are liquidated first, then each
    /// target is traded to its weight. A leg without a price is skipped and
    /// the stale position carries. With non-positive equity nothing trades.
    /// Returns the number of executed trades.
    pub fn rebalance(
        &mut self,
        date: NaiveDate,
        targets: &TargetWeights,
        prices: &HashMap<String, f64>,
    ) -> usize {
        let equity = self.total_equity(prices);
        if equity <= 0.0 {
            eprintln!("warning: non-positive equity on {date}, skipping rebalance");
            return 0;
        }

        let mut trades = 0usize;

        let to_liquidate: Vec<String> = self
            .positions
            .keys()
            .filter(|asset| !targets.contains_key(*asset))
            .cloned()
            .collect();
        for asset in to_liquidate {
            match prices.get(&asset) {
                Some(&price) => {
                    let shares = self.positions[&asset].shares;
                    self.sell(&asset, shares, price);
                    trades += 1;
                }
                None => {
                    eprintln!("warning: no price for {asset} on {date}, holding stale position");
                }
            }
        }

        for (asset, &weight) in targets {
            let Some(&price) = prices.get(asset) else {
                eprintln!("warning: no price for {asset} on {date}, skipping leg");
                continue;
            };
            if price <= 0.0 {
                continue;
            }

            let current = self.positions.get(asset).map(|p| p.shares).unwrap_or(0.0);
            let target_notional = equity * weight;
            let delta_notional = target_notional - current * price;
            if delta_notional.abs() < MIN_TRADE_NOTIONAL {
                continue;
            }

            if delta_notional > 0.0 {
                // size buys so that cost plus commission equals the target
                // notional; a full-weight entry cannot overdraw cash
                let shares = delta_notional / (price * (1.0 + self.commission_rate));
                self.buy(asset, shares, price);
            } else {
                self.sell(asset, -delta_notional / price, price);
            }
            trades += 1;
        }

        trades
    }

    fn buy(&mut self, asset: &str, shares: f64, price: f64) {
        let notional = shares * price;
        let commission = notional * self.commission_rate;
        self.cash -= notional + commission;

        let position = self.positions.entry(asset.to_string()).or_insert(Position {
            shares: 0.0,
            cost_basis: 0.0,
        });
        let total_cost = position.shares * position.cost_basis + notional;
        position.shares += shares;
        position.cost_basis = total_cost / position.shares;
    }

    fn sell(&mut self, asset: &str, shares: f64, price: f64) {
        let Some(position) = self.positions.get_mut(asset) else {
            return;
        };
        let shares = shares.min(position.shares);
        let notional = shares * price;
        let commission = notional * self.commission_rate;
        self.cash += notional - commission;

        let realized = (price - position.cost_basis) * shares - commission;
        *self.realized_pnl.entry(asset.to_string()).or_insert(0.0) += realized;

        position.shares -= shares;
        if position.shares * price < MIN_TRADE_NOTIONAL {
            self.positions.remove(asset);
        }
    }

    /// Snapshot of holdings for the equity curve, sorted by asset key.
    pub fn position_snapshot(&self) -> Vec<(String, f64)> {
        let mut snapshot: Vec<(String, f64)> = self
            .positions
            .iter()
            .map(|(asset, pos)| (asset.clone(), pos.shares))
            .collect();
        snapshot.sort_by(|a, b| a.0.cmp(&b.0));
        snapshot
    }

    /// Cumulative per-asset P&L with open positions marked at the given
    /// prices, sorted descending. Folds unrealized P&L into the realized
    /// totals for reporting.
    pub fn asset_pnl(&self, prices: &HashMap<String, f64>) -> Vec<AssetPnl> {
        let mut totals: BTreeMap<String, f64> = self
            .realized_pnl
            .iter()
            .map(|(a, &p)| (a.clone(), p))
            .collect();
        for (asset, pos) in &self.positions {
            if let Some(&price) = prices.get(asset) {
                *totals.entry(asset.clone()).or_insert(0.0) +=
                    (price - pos.cost_basis) * pos.shares;
            }
        }

        let mut out: Vec<AssetPnl> = totals
            .into_iter()
            .map(|(asset, total_pnl)| AssetPnl {
                asset,
                total_pnl,
                contribution: total_pnl / self.initial_capital,
            })
            .collect();
        out.sort_by(|a, b| {
            b.total_pnl
                .partial_cmp(&a.total_pnl)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        out
    }
}
