//! Daily price bar and per-asset series.

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl PriceBar {
    /// Close-to-close return against a previous close.
    pub fn daily_return(&self, prev_close: f64) -> f64 {
        if prev_close > 0.0 {
            self.close / prev_close - 1.0
        } else {
            f64::NAN
        }
    }
}

/// Ordered daily bars for a single asset.
///
/// Invariant: dates strictly increasing, no duplicates. Construction and
/// merging enforce this with last-write-wins on duplicate dates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSeries {
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    /// Build a series from bars in any order. Duplicate dates are collapsed,
    /// keeping the bar that appeared last in the input.
    pub fn from_bars(bars: Vec<PriceBar>) -> Self {
        let mut bars = bars;
        // stable sort keeps input order within a date, so the last wins below
        bars.sort_by_key(|b| b.date);
        let mut deduped: Vec<PriceBar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match deduped.last_mut() {
                Some(last) if last.date == bar.date => *last = bar,
                _ => deduped.push(bar),
            }
        }
        Self { bars: deduped }
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    /// Merge freshly fetched bars into this series. Incoming bars replace
    /// stored bars on date collision.
    pub fn merge(&mut self, incoming: PriceSeries) {
        if incoming.is_empty() {
            return;
        }
        let mut combined = std::mem::take(&mut self.bars);
        combined.extend(incoming.bars);
        *self = PriceSeries::from_bars(combined);
    }
}
