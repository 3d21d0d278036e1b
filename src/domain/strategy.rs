//! Strategy variants and the attach/query signal protocol.
//!
//! Every variant precomputes its full signal history once when data is
//! attached, then answers point-in-time weight queries. A query for date D
//! reads the signal of the trading day `signal_lag` sessions before D, so a
//! strategy never acts on same-day information.

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};

use super::align::AlignedTable;
use super::calendar::TradingCalendar;
use super::factor::{daily_returns, FactorEngine};
use super::selection::{select_assets, SelectionParams};

/// Asset key → fraction of equity. Weights sum to at most 1; the remainder
/// is cash.
pub type TargetWeights = BTreeMap<String, f64>;

/// Candidate filters applied, in order, before the greedy selection core.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterStage {
    /// Drop any prior-day pick whose daily return fell below `-pct`.
    StopLoss { pct: f64 },
    /// Drop any asset whose factor is below `floor`.
    FactorFloor { floor: f64 },
}

#[derive(Debug, Clone, Copy)]
pub struct RotationParams {
    /// Capacity M.
    pub max_assets: usize,
    /// Momentum lookback N.
    pub momentum_window: usize,
    /// Correlation lookback K.
    pub corr_window: usize,
    pub corr_threshold: f64,
    pub stop_loss_pct: Option<f64>,
    pub factor_floor: Option<f64>,
    /// Trading days between signal close and execution open.
    pub signal_lag: usize,
}

impl Default for RotationParams {
    fn default() -> Self {
        RotationParams {
            max_assets: 3,
            momentum_window: 20,
            corr_window: 20,
            corr_threshold: 0.8,
            stop_loss_pct: None,
            factor_floor: None,
            signal_lag: 1,
        }
    }
}

#[derive(Debug, Clone)]
struct RotationState {
    calendar: TradingCalendar,
    assets: Vec<String>,
    /// Selected column indices per calendar row; immutable once computed.
    signals: Vec<Vec<usize>>,
    factors: AlignedTable,
    stopped_log: BTreeMap<NaiveDate, Vec<String>>,
    filtered_log: BTreeMap<NaiveDate, Vec<String>>,
}

/// Multi-asset rotation: rank by momentum factor, pick a diversified subset
/// under the correlation ceiling.
#[derive(Debug, Clone)]
pub struct RotationStrategy {
    params: RotationParams,
    filters: Vec<FilterStage>,
    state: Option<RotationState>,
}

impl RotationStrategy {
    pub fn new(params: RotationParams) -> Self {
        let mut filters = Vec::new();
        if let Some(pct) = params.stop_loss_pct {
            filters.push(FilterStage::StopLoss { pct });
        }
        if let Some(floor) = params.factor_floor {
            filters.push(FilterStage::FactorFloor { floor });
        }
        Self {
            params,
            filters,
            state: None,
        }
    }

    pub fn params(&self) -> &RotationParams {
        &self.params
    }

    pub fn attach(&mut self, close: &AlignedTable, calendar: &TradingCalendar) {
        let engine = FactorEngine::new(self.params.momentum_window, self.params.corr_window);
        let returns = daily_returns(close);
        let factors = engine.momentum_factors(close, &returns);
        let corrs = engine.correlations(&returns);

        let assets = close.assets().to_vec();
        let sel_params = SelectionParams {
            max_assets: self.params.max_assets,
            corr_threshold: self.params.corr_threshold,
        };

        let n_dates = close.num_dates();
        let mut signals: Vec<Vec<usize>> = Vec::with_capacity(n_dates);
        let mut stopped_log: BTreeMap<NaiveDate, Vec<String>> = BTreeMap::new();
        let mut filtered_log: BTreeMap<NaiveDate, Vec<String>> = BTreeMap::new();

        for row in 0..n_dates {
            let date = close.dates()[row];
            let mut excluded: HashSet<usize> = HashSet::new();

            for stage in &self.filters {
                match *stage {
                    FilterStage::StopLoss { pct } => {
                        if row == 0 {
                            continue;
                        }
                        let mut stopped = Vec::new();
                        for &col in &signals[row - 1] {
                            let r = returns.value(row, col);
                            if !r.is_nan() && r < -pct {
                                excluded.insert(col);
                                stopped.push(assets[col].clone());
                            }
                        }
                        if !stopped.is_empty() {
                            stopped_log.insert(date, stopped);
                        }
                    }
                    FilterStage::FactorFloor { floor } => {
                        let mut filtered = Vec::new();
                        for (col, asset) in assets.iter().enumerate() {
                            let f = factors.value(row, col);
                            if !f.is_nan() && f < floor {
                                excluded.insert(col);
                                filtered.push(asset.clone());
                            }
                        }
                        if !filtered.is_empty() {
                            filtered_log.insert(date, filtered);
                        }
                    }
                }
            }

            signals.push(select_assets(
                factors.row(row),
                &excluded,
                corrs.at(row),
                &sel_params,
            ));
        }

        self.state = Some(RotationState {
            calendar: calendar.clone(),
            assets,
            signals,
            factors,
            stopped_log,
            filtered_log,
        });
    }

    pub fn target_weights(&self, date: NaiveDate) -> TargetWeights {
        let Some(state) = &self.state else {
            return TargetWeights::new();
        };
        let Some(pos) = state.calendar.position(date) else {
            return TargetWeights::new();
        };
        let Some(signal_pos) = pos.checked_sub(self.params.signal_lag) else {
            return TargetWeights::new();
        };

        let selected = &state.signals[signal_pos];
        if selected.is_empty() {
            return TargetWeights::new();
        }

        // factor-floor variant leaves unfilled slots as cash
        let weight = if self.params.factor_floor.is_some() {
            1.0 / self.params.max_assets as f64
        } else {
            1.0 / selected.len() as f64
        };

        selected
            .iter()
            .map(|&col| (state.assets[col].clone(), weight))
            .collect()
    }

    /// Selection history: date → ordered asset keys.
    pub fn signals(&self) -> BTreeMap<NaiveDate, Vec<String>> {
        match &self.state {
            Some(state) => state
                .calendar
                .dates()
                .iter()
                .zip(&state.signals)
                .map(|(&d, sel)| {
                    (d, sel.iter().map(|&c| state.assets[c].clone()).collect())
                })
                .collect(),
            None => BTreeMap::new(),
        }
    }

    /// Full factor history: date → asset → value, defined entries only.
    pub fn factors(&self) -> BTreeMap<NaiveDate, BTreeMap<String, f64>> {
        match &self.state {
            Some(state) => state
                .calendar
                .dates()
                .iter()
                .filter_map(|&d| self.factors_on(d).map(|f| (d, f)))
                .filter(|(_, f)| !f.is_empty())
                .collect(),
            None => BTreeMap::new(),
        }
    }

    /// Factor values for one date, defined assets only.
    pub fn factors_on(&self, date: NaiveDate) -> Option<BTreeMap<String, f64>> {
        let state = self.state.as_ref()?;
        let row = state.calendar.position(date)?;
        Some(
            state
                .assets
                .iter()
                .enumerate()
                .filter(|(col, _)| !state.factors.value(row, *col).is_nan())
                .map(|(col, a)| (a.clone(), state.factors.value(row, col)))
                .collect(),
        )
    }

    pub fn stopped_assets_log(&self) -> &BTreeMap<NaiveDate, Vec<String>> {
        static EMPTY: BTreeMap<NaiveDate, Vec<String>> = BTreeMap::new();
        self.state.as_ref().map(|s| &s.stopped_log).unwrap_or(&EMPTY)
    }

    pub fn filtered_assets_log(&self) -> &BTreeMap<NaiveDate, Vec<String>> {
        static EMPTY: BTreeMap<NaiveDate, Vec<String>> = BTreeMap::new();
        self.state.as_ref().map(|s| &s.filtered_log).unwrap_or(&EMPTY)
    }
}

/// A named fixed-weight basket for the momentum variant.
#[derive(Debug, Clone)]
pub struct Basket {
    pub key: String,
    pub weights: BTreeMap<String, f64>,
}

#[derive(Debug, Clone)]
struct MomentumState {
    calendar: TradingCalendar,
    /// Winning basket index per calendar row, None while no lookback return
    /// is defined.
    winners: Vec<Option<usize>>,
}

/// Portfolio-switch momentum: hold whichever named basket had the best
/// trailing-N wealth-index return.
#[derive(Debug, Clone)]
pub struct MomentumStrategy {
    pub lookback: usize,
    pub signal_lag: usize,
    baskets: Vec<Basket>,
    state: Option<MomentumState>,
}

impl MomentumStrategy {
    pub fn new(baskets: Vec<Basket>, lookback: usize, signal_lag: usize) -> Self {
        Self {
            lookback,
            signal_lag,
            baskets,
            state: None,
        }
    }

    pub fn attach(&mut self, close: &AlignedTable, calendar: &TradingCalendar) {
        let returns = daily_returns(close);
        let n_dates = close.num_dates();

        // wealth index per basket: cumprod(1 + basket return), gaps as 0
        let mut wealth: Vec<Vec<f64>> = Vec::with_capacity(self.baskets.len());
        for basket in &self.baskets {
            let mut curve = Vec::with_capacity(n_dates);
            let mut acc = 1.0;
            for row in 0..n_dates {
                let mut day_ret = 0.0;
                for (asset, &w) in &basket.weights {
                    if let Some(col) = close.asset_position(asset) {
                        let r = returns.value(row, col);
                        if !r.is_nan() {
                            day_ret += w * r;
                        }
                    } else {
                        eprintln!("warning: basket {} references unknown asset {}", basket.key, asset);
                    }
                }
                acc *= 1.0 + day_ret;
                curve.push(acc);
            }
            wealth.push(curve);
        }

        let n = self.lookback;
        let winners: Vec<Option<usize>> = (0..n_dates)
            .map(|row| {
                if row < n {
                    return None;
                }
                let mut best: Option<(usize, f64)> = None;
                for (i, curve) in wealth.iter().enumerate() {
                    let base = curve[row - n];
                    if base <= 0.0 {
                        continue;
                    }
                    let past_n = curve[row] / base - 1.0;
                    // strict > keeps the first basket on ties
                    if best.map(|(_, b)| past_n > b).unwrap_or(true) {
                        best = Some((i, past_n));
                    }
                }
                best.map(|(i, _)| i)
            })
            .collect();

        self.state = Some(MomentumState {
            calendar: calendar.clone(),
            winners,
        });
    }

    pub fn target_weights(&self, date: NaiveDate) -> TargetWeights {
        let Some(state) = &self.state else {
            return TargetWeights::new();
        };
        let Some(pos) = state.calendar.position(date) else {
            return TargetWeights::new();
        };
        let Some(signal_pos) = pos.checked_sub(self.signal_lag) else {
            return TargetWeights::new();
        };

        match state.winners[signal_pos] {
            Some(i) => self.baskets[i].weights.clone(),
            None => TargetWeights::new(),
        }
    }

    /// Winning basket key per date, where defined.
    pub fn signals(&self) -> BTreeMap<NaiveDate, String> {
        match &self.state {
            Some(state) => state
                .calendar
                .dates()
                .iter()
                .zip(&state.winners)
                .filter_map(|(&d, w)| w.map(|i| (d, self.baskets[i].key.clone())))
                .collect(),
            None => BTreeMap::new(),
        }
    }
}

/// Tagged strategy variants sharing the attach/query protocol.
#[derive(Debug, Clone)]
pub enum Strategy {
    Momentum(MomentumStrategy),
    Rotation(RotationStrategy),
}

impl Strategy {
    pub fn attach(&mut self, close: &AlignedTable, calendar: &TradingCalendar) {
        match self {
            Strategy::Momentum(s) => s.attach(close, calendar),
            Strategy::Rotation(s) => s.attach(close, calendar),
        }
    }

    pub fn target_weights(&self, date: NaiveDate) -> TargetWeights {
        match self {
            Strategy::Momentum(s) => s.target_weights(date),
            Strategy::Rotation(s) => s.target_weights(date),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Momentum(_) => "momentum",
            Strategy::Rotation(_) => "rotation",
        }
    }
}
