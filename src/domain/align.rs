//! Calendar alignment of per-asset price series.
//!
//! Merges the series of every asset onto the union of their trading dates,
//! forward-filling gaps per column. Cells before an asset's first observation
//! stay NaN.

use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};

use super::error::RotraderError;
use super::series::PriceSeries;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceField {
    Open,
    Close,
}

/// A date × asset grid of values. Also used for derived grids (daily
/// returns, factor values) which share the same shape.
#[derive(Debug, Clone)]
pub struct AlignedTable {
    dates: Vec<NaiveDate>,
    assets: Vec<String>,
    date_index: HashMap<NaiveDate, usize>,
    asset_index: HashMap<String, usize>,
    /// Row-major: `values[row * assets.len() + col]`.
    values: Vec<f64>,
}

impl AlignedTable {
    /// Assemble a table from raw parts. `values` must be row-major with
    /// `dates.len() * assets.len()` entries.
    pub fn from_parts(dates: Vec<NaiveDate>, assets: Vec<String>, values: Vec<f64>) -> Self {
        debug_assert_eq!(values.len(), dates.len() * assets.len());
        let date_index = dates.iter().enumerate().map(|(i, &d)| (d, i)).collect();
        let asset_index = assets
            .iter()
            .enumerate()
            .map(|(i, a)| (a.clone(), i))
            .collect();
        Self {
            dates,
            assets,
            date_index,
            asset_index,
            values,
        }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn num_dates(&self) -> usize {
        self.dates.len()
    }

    pub fn num_assets(&self) -> usize {
        self.assets.len()
    }

    pub fn date_position(&self, date: NaiveDate) -> Option<usize> {
        self.date_index.get(&date).copied()
    }

    pub fn asset_position(&self, asset: &str) -> Option<usize> {
        self.asset_index.get(asset).copied()
    }

    pub fn value(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.assets.len() + col]
    }

    pub fn row(&self, row: usize) -> &[f64] {
        let n = self.assets.len();
        &self.values[row * n..(row + 1) * n]
    }

    pub fn value_at(&self, date: NaiveDate, asset: &str) -> Option<f64> {
        let row = self.date_position(date)?;
        let col = self.asset_position(asset)?;
        Some(self.value(row, col))
    }

    /// Prices of a row as an asset-keyed map, NaN cells omitted.
    pub fn row_prices(&self, row: usize) -> HashMap<String, f64> {
        self.row(row)
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_nan())
            .map(|(col, &v)| (self.assets[col].clone(), v))
            .collect()
    }
}

/// Align one price field of every series onto the shared date union.
///
/// Columns are ordered by sorted asset key, which fixes the deterministic
/// tie-break order used downstream. Forward-fill runs over the full history
/// before rows earlier than `start_date` are dropped, so the first kept row
/// is already filled.
pub fn align(
    data: &HashMap<String, PriceSeries>,
    field: PriceField,
    start_date: NaiveDate,
) -> Result<AlignedTable, RotraderError> {
    let mut assets: Vec<String> = data
        .iter()
        .filter(|(_, series)| !series.is_empty())
        .map(|(key, _)| key.clone())
        .collect();
    assets.sort();

    if assets.is_empty() {
        return Err(RotraderError::InsufficientData {
            reason: "no asset has any price data".into(),
        });
    }

    let all_dates: BTreeSet<NaiveDate> = assets
        .iter()
        .flat_map(|key| data[key].bars().iter().map(|b| b.date))
        .collect();
    let all_dates: Vec<NaiveDate> = all_dates.into_iter().collect();

    let n_assets = assets.len();
    let mut values = vec![f64::NAN; all_dates.len() * n_assets];

    for (col, key) in assets.iter().enumerate() {
        let series = &data[key];
        let mut bars = series.bars().iter().peekable();
        let mut last = f64::NAN;
        for (row, &date) in all_dates.iter().enumerate() {
            if bars.peek().is_some_and(|bar| bar.date == date) {
                let bar = bars.next().unwrap();
                last = match field {
                    PriceField::Open => bar.open,
                    PriceField::Close => bar.close,
                };
            }
            values[row * n_assets + col] = last;
        }
    }

    // truncate to the configured start date
    let first_kept = all_dates.partition_point(|&d| d < start_date);
    let kept_dates: Vec<NaiveDate> = all_dates[first_kept..].to_vec();
    let kept_values: Vec<f64> = values[first_kept * n_assets..].to_vec();

    if kept_dates.is_empty() {
        return Err(RotraderError::InsufficientData {
            reason: format!("no price rows on or after {start_date}"),
        });
    }

    Ok(AlignedTable::from_parts(kept_dates, assets, kept_values))
}
