//! Fetch sources and the ordered fallback chain.
//!
//! A refresh tries each source in sequence until one returns data. Remote
//! retrieval plugs in behind [`FetchSource`]; the shipped implementation
//! imports drop-in CSV exports from a local directory.

use chrono::NaiveDate;
use std::fs;
use std::path::PathBuf;

use crate::domain::series::{PriceBar, PriceSeries};

#[derive(Debug, Clone, thiserror::Error)]
#[error("fetch failed: {reason}")]
pub struct FetchError {
    pub reason: String,
}

impl FetchError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

pub trait FetchSource {
    fn name(&self) -> &str;

    /// Bars for `code` within `[start, end]`, ascending. An empty result is
    /// a failure, not a success with no rows; it would silently stall the
    /// store otherwise.
    fn fetch(
        &self,
        code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, FetchError>;
}

/// Try each source in order; aggregate every failure reason if all fail.
pub fn fetch_with_fallback(
    sources: &[Box<dyn FetchSource>],
    code: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<PriceSeries, FetchError> {
    if sources.is_empty() {
        return Err(FetchError::new("no fetch sources configured"));
    }

    let mut reasons = Vec::new();
    for source in sources {
        match source.fetch(code, start, end) {
            Ok(series) => return Ok(series),
            Err(e) => reasons.push(format!("{}: {}", source.name(), e.reason)),
        }
    }
    Err(FetchError::new(reasons.join("; ")))
}

/// Reads `{code}.csv` drop-in exports (date,open,high,low,close,volume) from
/// an import directory.
pub struct CsvImportSource {
    import_dir: PathBuf,
}

impl CsvImportSource {
    pub fn new(import_dir: PathBuf) -> Self {
        Self { import_dir }
    }
}

impl FetchSource for CsvImportSource {
    fn name(&self) -> &str {
        "csv-import"
    }

    fn fetch(
        &self,
        code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, FetchError> {
        let path = self.import_dir.join(format!("{code}.csv"));
        let content = fs::read_to_string(&path)
            .map_err(|e| FetchError::new(format!("read {}: {e}", path.display())))?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();
        for result in rdr.records() {
            let record =
                result.map_err(|e| FetchError::new(format!("CSV parse error: {e}")))?;
            let bar = parse_bar(&record)
                .map_err(|reason| FetchError::new(format!("{}: {reason}", path.display())))?;
            if bar.date >= start && bar.date <= end {
                bars.push(bar);
            }
        }

        if bars.is_empty() {
            return Err(FetchError::new(format!(
                "no rows for {code} in {start}..{end}"
            )));
        }
        Ok(PriceSeries::from_bars(bars))
    }
}

pub(crate) fn parse_bar(record: &csv::StringRecord) -> Result<PriceBar, String> {
    let field = |i: usize, name: &str| -> Result<&str, String> {
        record.get(i).ok_or_else(|| format!("missing {name} column"))
    };

    let date = NaiveDate::parse_from_str(field(0, "date")?, "%Y-%m-%d")
        .map_err(|e| format!("invalid date: {e}"))?;
    let open: f64 = field(1, "open")?
        .parse()
        .map_err(|e| format!("invalid open: {e}"))?;
    let high: f64 = field(2, "high")?
        .parse()
        .map_err(|e| format!("invalid high: {e}"))?;
    let low: f64 = field(3, "low")?
        .parse()
        .map_err(|e| format!("invalid low: {e}"))?;
    let close: f64 = field(4, "close")?
        .parse()
        .map_err(|e| format!("invalid close: {e}"))?;
    let volume: i64 = field(5, "volume")?
        .parse()
        .map_err(|e| format!("invalid volume: {e}"))?;

    Ok(PriceBar {
        date,
        open,
        high,
        low,
        close,
        volume,
    })
}
