//! Local CSV price store.
//!
//! One `{code}.csv` per asset under the data directory, columns
//! `date,open,high,low,close,volume`, dates ascending. Updates merge fetched
//! rows into the stored series with last-write-wins on date collisions.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::domain::error::RotraderError;
use crate::domain::series::{PriceBar, PriceSeries};
use crate::ports::data_port::{AssetSpec, DataPort, FailedUpdate};

use super::fetch::{fetch_with_fallback, parse_bar, FetchSource};

/// How far back a first-time fetch reaches.
const DEFAULT_HISTORY_START: (i32, u32, u32) = (2015, 1, 1);

pub struct CsvStore {
    data_dir: PathBuf,
    sources: Vec<Box<dyn FetchSource>>,
    /// "Today" for update ranges; injected so tests are deterministic.
    today: NaiveDate,
}

impl CsvStore {
    pub fn new(data_dir: PathBuf, today: NaiveDate) -> Self {
        Self {
            data_dir,
            sources: Vec::new(),
            today,
        }
    }

    pub fn with_sources(mut self, sources: Vec<Box<dyn FetchSource>>) -> Self {
        self.sources = sources;
        self
    }

    fn csv_path(&self, code: &str) -> PathBuf {
        self.data_dir.join(format!("{code}.csv"))
    }

    pub fn has_series(&self, code: &str) -> bool {
        self.csv_path(code).exists()
    }

    pub fn save_series(&self, code: &str, series: &PriceSeries) -> Result<(), RotraderError> {
        fs::create_dir_all(&self.data_dir)?;

        let mut wtr = csv::Writer::from_writer(Vec::new());
        wtr.write_record(["date", "open", "high", "low", "close", "volume"])
            .map_err(|e| RotraderError::Store {
                reason: format!("CSV write error: {e}"),
            })?;
        for bar in series.bars() {
            wtr.write_record([
                bar.date.format("%Y-%m-%d").to_string(),
                bar.open.to_string(),
                bar.high.to_string(),
                bar.low.to_string(),
                bar.close.to_string(),
                bar.volume.to_string(),
            ])
            .map_err(|e| RotraderError::Store {
                reason: format!("CSV write error: {e}"),
            })?;
        }

        let bytes = wtr.into_inner().map_err(|e| RotraderError::Store {
            reason: format!("CSV flush error: {e}"),
        })?;
        fs::write(self.csv_path(code), bytes)?;
        Ok(())
    }

    fn default_start(&self) -> NaiveDate {
        let (y, m, d) = DEFAULT_HISTORY_START;
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }
}

impl DataPort for CsvStore {
    fn load_series(&self, code: &str) -> Result<PriceSeries, RotraderError> {
        let path = self.csv_path(code);
        let content = fs::read_to_string(&path).map_err(|e| RotraderError::Store {
            reason: format!("failed to read {}: {e}", path.display()),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars: Vec<PriceBar> = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| RotraderError::Store {
                reason: format!("CSV parse error in {}: {e}", path.display()),
            })?;
            let bar = parse_bar(&record).map_err(|reason| RotraderError::Store {
                reason: format!("{}: {reason}", path.display()),
            })?;
            bars.push(bar);
        }

        Ok(PriceSeries::from_bars(bars))
    }

    fn load_all(
        &self,
        assets: &[AssetSpec],
    ) -> Result<HashMap<String, PriceSeries>, RotraderError> {
        let mut map = HashMap::new();
        for asset in assets {
            if !self.has_series(&asset.code) {
                eprintln!(
                    "warning: no stored data for {} ({}), skipping",
                    asset.key, asset.code
                );
                continue;
            }
            map.insert(asset.key.clone(), self.load_series(&asset.code)?);
        }
        Ok(map)
    }

    fn update_all(&self, assets: &[AssetSpec]) -> Vec<FailedUpdate> {
        let mut failed = Vec::new();

        for asset in assets {
            // incremental from the day after the last stored bar
            let mut stored = if self.has_series(&asset.code) {
                match self.load_series(&asset.code) {
                    Ok(series) => series,
                    Err(e) => {
                        eprintln!("warning: unreadable store for {}: {e}", asset.code);
                        PriceSeries::default()
                    }
                }
            } else {
                PriceSeries::default()
            };

            let start = stored
                .last_date()
                .and_then(|d| d.succ_opt())
                .unwrap_or_else(|| self.default_start());
            if start > self.today {
                continue; // already current
            }

            match fetch_with_fallback(&self.sources, &asset.code, start, self.today) {
                Ok(fresh) => {
                    stored.merge(fresh);
                    if let Err(e) = self.save_series(&asset.code, &stored) {
                        failed.push(FailedUpdate {
                            name: asset.key.clone(),
                            code: asset.code.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
                Err(e) => failed.push(FailedUpdate {
                    name: asset.key.clone(),
                    code: asset.code.clone(),
                    reason: e.reason,
                }),
            }
        }

        failed
    }
}
