//! Trading calendar built from the aligned date index.
//!
//! Passed by reference into whatever needs date arithmetic; there is no
//! process-global calendar cache.

use chrono::NaiveDate;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct TradingCalendar {
    dates: Vec<NaiveDate>,
    index: HashMap<NaiveDate, usize>,
}

impl TradingCalendar {
    /// `dates` must already be ascending (the aligned table's index is).
    pub fn from_dates(dates: Vec<NaiveDate>) -> Self {
        let index = dates.iter().enumerate().map(|(i, &d)| (d, i)).collect();
        Self { dates, index }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn position(&self, date: NaiveDate) -> Option<usize> {
        self.index.get(&date).copied()
    }

    pub fn date(&self, position: usize) -> Option<NaiveDate> {
        self.dates.get(position).copied()
    }

    /// The trading day `lag` sessions before `date`, or None if out of range.
    pub fn prior(&self, date: NaiveDate, lag: usize) -> Option<NaiveDate> {
        let pos = self.position(date)?;
        pos.checked_sub(lag).and_then(|p| self.date(p))
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }
}
