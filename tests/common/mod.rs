#![allow(dead_code)]

use chrono::NaiveDate;
use rotrader::domain::backtest::BacktestConfig;
use rotrader::domain::error::RotraderError;
pub use rotrader::domain::series::{PriceBar, PriceSeries};
use rotrader::ports::data_port::{AssetSpec, DataPort, FailedUpdate};
use std::collections::HashMap;

pub struct MockDataPort {
    pub data: HashMap<String, PriceSeries>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_series(mut self, code: &str, series: PriceSeries) -> Self {
        self.data.insert(code.to_string(), series);
        self
    }

    pub fn with_error(mut self, code: &str, reason: &str) -> Self {
        self.errors.insert(code.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn load_series(&self, code: &str) -> Result<PriceSeries, RotraderError> {
        if let Some(reason) = self.errors.get(code) {
            return Err(RotraderError::Store {
                reason: reason.clone(),
            });
        }
        self.data
            .get(code)
            .cloned()
            .ok_or_else(|| RotraderError::Store {
                reason: format!("no data for {code}"),
            })
    }

    fn load_all(
        &self,
        assets: &[AssetSpec],
    ) -> Result<HashMap<String, PriceSeries>, RotraderError> {
        let mut map = HashMap::new();
        for asset in assets {
            if let Ok(series) = self.load_series(&asset.code) {
                map.insert(asset.key.clone(), series);
            }
        }
        Ok(map)
    }

    fn update_all(&self, assets: &[AssetSpec]) -> Vec<FailedUpdate> {
        assets
            .iter()
            .filter_map(|asset| {
                self.errors.get(&asset.code).map(|reason| FailedUpdate {
                    name: asset.key.clone(),
                    code: asset.code.clone(),
                    reason: reason.clone(),
                })
            })
            .collect()
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_bar(d: NaiveDate, close: f64) -> PriceBar {
    PriceBar {
        date: d,
        open: close,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 1000,
    }
}

/// Series of daily bars starting at `start`, one per calendar day.
pub fn make_series(start: NaiveDate, closes: &[f64]) -> PriceSeries {
    PriceSeries::from_bars(
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| make_bar(start + chrono::Duration::days(i as i64), c))
            .collect(),
    )
}

/// Uptrend with uneven daily steps (nonzero volatility).
pub fn trending_closes(start_price: f64, count: usize) -> Vec<f64> {
    let steps = [0.031, 0.024, 0.038, 0.027, 0.035, 0.022, 0.033, 0.029];
    let mut price = start_price;
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        out.push(price);
        price *= 1.0 + steps[i % steps.len()];
    }
    out
}

/// Mild oscillation around a level.
pub fn choppy_closes(level: f64, count: usize) -> Vec<f64> {
    let wobble = [0.0, 0.006, -0.004, 0.008, -0.006, 0.002, -0.008, 0.004];
    (0..count)
        .map(|i| level * (1.0 + wobble[i % wobble.len()]))
        .collect()
}

pub fn asset(key: &str, code: &str) -> AssetSpec {
    AssetSpec {
        key: key.to_string(),
        code: code.to_string(),
    }
}

pub fn sample_config() -> BacktestConfig {
    BacktestConfig {
        start_date: date(2024, 1, 1),
        initial_capital: 100_000.0,
        commission_rate: 0.0,
        risk_free_rate: 0.0,
    }
}
