//! Greedy correlation-constrained asset selection.
//!
//! Candidates are ranked by factor descending and scanned once; an asset is
//! taken unless it correlates above the ceiling with something already taken.
//! Ties keep the table's column order (sorted asset keys) via stable sort.

use std::collections::HashSet;

use super::factor::CorrelationMatrix;

#[derive(Debug, Clone, Copy)]
pub struct SelectionParams {
    /// Capacity M.
    pub max_assets: usize,
    /// Correlation ceiling between any two simultaneously held assets.
    pub corr_threshold: f64,
}

/// Select up to `max_assets` column indices from one date's factor row.
///
/// `excluded` holds columns removed by upstream filter stages (stop-loss,
/// factor floor). Columns with NaN factors never rank. A NaN pairwise
/// correlation (window not yet full) passes the ceiling check.
pub fn select_assets(
    factor_row: &[f64],
    excluded: &HashSet<usize>,
    corr: Option<&CorrelationMatrix>,
    params: &SelectionParams,
) -> Vec<usize> {
    let mut ranked: Vec<(usize, f64)> = factor_row
        .iter()
        .enumerate()
        .filter(|(col, v)| !v.is_nan() && !excluded.contains(col))
        .map(|(col, &v)| (col, v))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut selected: Vec<usize> = Vec::with_capacity(params.max_assets);
    for (col, _) in ranked {
        if selected.len() == params.max_assets {
            break;
        }
        let clashes = selected.iter().any(|&held| {
            corr.map(|m| m.get(col, held) > params.corr_threshold)
                .unwrap_or(false)
        });
        if !clashes {
            selected.push(col);
        }
    }

    selected
}
