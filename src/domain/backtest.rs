//! Backtest engine: daily simulation loop and reporting surface.
//!
//! Per simulated day, in order: read open/close prices, ask the strategy for
//! target weights effective today, rebalance at the open, mark to market at
//! the close, append an equity point. The fold is inherently sequential:
//! each day's rebalance depends on the ledger state the previous day left.

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

use super::align::{align, AlignedTable, PriceField};
use super::calendar::TradingCalendar;
use super::error::RotraderError;
use super::ledger::{AssetPnl, EquityPoint, PortfolioLedger};
use super::metrics::Metrics;
use super::series::PriceSeries;
use super::strategy::Strategy;

#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub start_date: NaiveDate,
    pub initial_capital: f64,
    pub commission_rate: f64,
    pub risk_free_rate: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            start_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            initial_capital: 100_000.0,
            commission_rate: 0.0003,
            risk_free_rate: 0.02,
        }
    }
}

pub struct BacktestEngine {
    config: BacktestConfig,
    open: AlignedTable,
    close: AlignedTable,
    calendar: TradingCalendar,
    ledger: PortfolioLedger,
    equity_curve: Vec<EquityPoint>,
}

impl BacktestEngine {
    /// Align the price map once; fails fast when no asset has usable data.
    pub fn new(
        data: &HashMap<String, PriceSeries>,
        config: BacktestConfig,
    ) -> Result<Self, RotraderError> {
        let open = align(data, PriceField::Open, config.start_date)?;
        let close = align(data, PriceField::Close, config.start_date)?;
        let calendar = TradingCalendar::from_dates(close.dates().to_vec());
        let ledger = PortfolioLedger::new(config.initial_capital, config.commission_rate);

        Ok(Self {
            config,
            open,
            close,
            calendar,
            ledger,
            equity_curve: Vec::new(),
        })
    }

    /// Run a full simulation. Attaches the strategy (signal precomputation),
    /// then folds over the calendar. Ledger state is reset per run and
    /// retained afterwards for reporting.
    pub fn run(&mut self, strategy: &mut Strategy) -> Result<&[EquityPoint], RotraderError> {
        strategy.attach(&self.close, &self.calendar);

        self.ledger =
            PortfolioLedger::new(self.config.initial_capital, self.config.commission_rate);
        self.equity_curve = Vec::with_capacity(self.calendar.len());

        for row in 0..self.calendar.len() {
            let date = self.calendar.dates()[row];
            let open_prices = self.open.row_prices(row);
            let close_prices = self.close.row_prices(row);

            let targets = strategy.target_weights(date);
            self.ledger.rebalance(date, &targets, &open_prices);

            let equity = self.ledger.total_equity(&close_prices);
            self.equity_curve.push(EquityPoint {
                date,
                equity,
                cash: self.ledger.cash,
                positions: self.ledger.position_snapshot(),
            });
        }

        Ok(&self.equity_curve)
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    pub fn calendar(&self) -> &TradingCalendar {
        &self.calendar
    }

    pub fn close_table(&self) -> &AlignedTable {
        &self.close
    }

    /// Named performance metrics of the last run; empty before any run.
    pub fn get_metrics(&self) -> BTreeMap<String, f64> {
        Metrics::from_equity_curve(&self.equity_curve, self.config.risk_free_rate)
            .map(|m| m.named())
            .unwrap_or_default()
    }

    /// Per-asset cumulative P&L of the last run, open positions marked at the
    /// final close, sorted descending.
    pub fn get_asset_pnl(&self) -> Vec<AssetPnl> {
        let Some(last_row) = self.calendar.len().checked_sub(1) else {
            return Vec::new();
        };
        let final_close = self.close.row_prices(last_row);
        self.ledger.asset_pnl(&final_close)
    }
}
