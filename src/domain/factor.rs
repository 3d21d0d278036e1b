//! Rolling momentum/volatility factor and pairwise return correlations.
//!
//! Everything is computed eagerly over the full date range so that selection
//! at any date only ever reads values that were well-defined with data on or
//! before that date.

use super::align::AlignedTable;

/// Symmetric correlation matrix for one date. Entries may be NaN where a
/// pair's return window was incomplete.
#[derive(Debug, Clone)]
pub struct CorrelationMatrix {
    n: usize,
    values: Vec<f64>,
}

impl CorrelationMatrix {
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.n + j]
    }

    pub fn size(&self) -> usize {
        self.n
    }
}

/// One optional matrix per aligned date row; None until the correlation
/// window is satisfied.
#[derive(Debug, Clone, Default)]
pub struct CorrelationSeries {
    mats: Vec<Option<CorrelationMatrix>>,
}

impl CorrelationSeries {
    pub fn at(&self, row: usize) -> Option<&CorrelationMatrix> {
        self.mats.get(row).and_then(|m| m.as_ref())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FactorEngine {
    pub momentum_window: usize,
    pub corr_window: usize,
}

/// Day-over-day simple returns per asset. Row 0 and cells without a prior
/// price are NaN.
pub fn daily_returns(close: &AlignedTable) -> AlignedTable {
    let n_dates = close.num_dates();
    let n_assets = close.num_assets();
    let mut values = vec![f64::NAN; n_dates * n_assets];

    for row in 1..n_dates {
        for col in 0..n_assets {
            let prev = close.value(row - 1, col);
            let curr = close.value(row, col);
            if prev.is_nan() || curr.is_nan() || prev <= 0.0 {
                continue;
            }
            values[row * n_assets + col] = curr / prev - 1.0;
        }
    }

    AlignedTable::from_parts(close.dates().to_vec(), close.assets().to_vec(), values)
}

fn sample_std(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return f64::NAN;
    }
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    var.sqrt()
}

fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x <= 0.0 || var_y <= 0.0 {
        return f64::NAN;
    }
    cov / (var_x.sqrt() * var_y.sqrt())
}

impl FactorEngine {
    pub fn new(momentum_window: usize, corr_window: usize) -> Self {
        Self {
            momentum_window,
            corr_window,
        }
    }

    /// Momentum factor per (date, asset):
    /// trailing-N price return divided by the sample stddev of the trailing
    /// N daily returns. NaN when the window is incomplete or volatility is
    /// zero; such assets drop out of ranking for that date.
    pub fn momentum_factors(&self, close: &AlignedTable, returns: &AlignedTable) -> AlignedTable {
        let n = self.momentum_window;
        let n_dates = close.num_dates();
        let n_assets = close.num_assets();
        let mut values = vec![f64::NAN; n_dates * n_assets];

        for row in n..n_dates {
            for col in 0..n_assets {
                let base = close.value(row - n, col);
                let curr = close.value(row, col);
                if base.is_nan() || curr.is_nan() || base <= 0.0 {
                    continue;
                }

                let window: Vec<f64> = (row - n + 1..=row)
                    .map(|r| returns.value(r, col))
                    .collect();
                if window.iter().any(|v| v.is_nan()) {
                    continue;
                }

                let vol = sample_std(&window);
                if !vol.is_finite() || vol <= 0.0 {
                    continue;
                }

                values[row * n_assets + col] = (curr / base - 1.0) / vol;
            }
        }

        AlignedTable::from_parts(close.dates().to_vec(), close.assets().to_vec(), values)
    }

    /// Pairwise Pearson correlation of trailing-K daily-return vectors.
    /// No matrix exists for a date until K return observations fit before it;
    /// individual pairs stay NaN while either asset's window has gaps.
    pub fn correlations(&self, returns: &AlignedTable) -> CorrelationSeries {
        let k = self.corr_window;
        let n_dates = returns.num_dates();
        let n_assets = returns.num_assets();
        let mut mats: Vec<Option<CorrelationMatrix>> = vec![None; n_dates];

        for (row, slot) in mats.iter_mut().enumerate() {
            if row + 1 <= k {
                continue; // row 0 has no return; need K returns ending here
            }

            let windows: Vec<Option<Vec<f64>>> = (0..n_assets)
                .map(|col| {
                    let w: Vec<f64> = (row + 1 - k..=row)
                        .map(|r| returns.value(r, col))
                        .collect();
                    if w.iter().any(|v| v.is_nan()) {
                        None
                    } else {
                        Some(w)
                    }
                })
                .collect();

            let mut values = vec![f64::NAN; n_assets * n_assets];
            for i in 0..n_assets {
                values[i * n_assets + i] = 1.0;
                for j in (i + 1)..n_assets {
                    let corr = match (&windows[i], &windows[j]) {
                        (Some(wi), Some(wj)) => pearson(wi, wj),
                        _ => f64::NAN,
                    };
                    values[i * n_assets + j] = corr;
                    values[j * n_assets + i] = corr;
                }
            }

            *slot = Some(CorrelationMatrix {
                n: n_assets,
                values,
            });
        }

        CorrelationSeries { mats }
    }
}
