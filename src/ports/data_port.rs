//! Data provider port.

use crate::domain::error::RotraderError;
use crate::domain::series::PriceSeries;
use std::collections::HashMap;

/// A configured asset: human-readable key paired with its exchange code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetSpec {
    pub key: String,
    pub code: String,
}

/// An asset whose refresh failed after every fetch source was tried.
/// Returned to the caller for retry, never silently dropped.
#[derive(Debug, Clone)]
pub struct FailedUpdate {
    pub name: String,
    pub code: String,
    pub reason: String,
}

pub trait DataPort {
    fn load_series(&self, code: &str) -> Result<PriceSeries, RotraderError>;

    /// Load every configured asset, keyed by asset key. Assets without
    /// stored data are skipped with a warning; the caller decides whether
    /// the survivors are enough.
    fn load_all(
        &self,
        assets: &[AssetSpec],
    ) -> Result<HashMap<String, PriceSeries>, RotraderError>;

    /// Refresh every asset through the fetch chain, merging new rows into
    /// the local store. Returns the assets that still failed.
    fn update_all(&self, assets: &[AssetSpec]) -> Vec<FailedUpdate>;
}
