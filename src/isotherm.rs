//! # Isotherm aggregation and baseline subtraction
//!
//! A sorption run holds the sample at a sequence of pressure setpoints; once
//! the change points of the setpoint channel are known, each equilibrium
//! plateau collapses to a single isotherm point by averaging pressure and
//! loading over a window at the end of the plateau (backed off from the
//! change point itself, where the next step's transient already shows).
//!
//! The windowed table can then be corrected against a reference baseline
//! isotherm (empty-crystal or empty-pan run) sampled at arbitrary pressures
//! via interpolation, and normalized by the dry mass.

use std::path::{Path, PathBuf};

use log::debug;

use crate::segment::ChangePointSet;
use crate::table::{DataTable, TableError};

/// Errors from isotherm aggregation and baseline handling.
#[derive(Debug, thiserror::Error)]
pub enum IsothermError {
    /// Change points and table disagree on the series length.
    #[error("change points cover {points} rows but the table has {table}")]
    LengthMismatch {
        /// Series length the change points were detected on.
        points: usize,
        /// Number of rows in the table.
        table: usize,
    },

    /// Column lookup or construction error.
    #[error(transparent)]
    Table(#[from] TableError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    /// A baseline file held fewer than two numeric points.
    #[error("baseline `{0}` does not contain two numeric pressure/loading columns")]
    BadBaseline(String),
}

/// Averaging window of [`average_at_change_points`], in samples.
///
/// For a change point at row `n`, the window is
/// `[n - offset_points - mean_points, n - offset_points)`.
#[derive(Debug, Clone, Copy)]
pub struct WindowConfig {
    /// Samples backed off from the change point before averaging starts.
    pub offset_points: usize,
    /// Number of samples averaged.
    pub mean_points: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            offset_points: 10,
            mean_points: 20,
        }
    }
}

/// Collapse each equilibrium plateau to one isotherm point.
///
/// Produces a table with columns `pressure`, `loading`, then one column per
/// entry of `extra_cols` (same name), each holding the window mean of the
/// corresponding input column at every change point. NaN samples are
/// excluded from the means. A window that starts before row 0 is clamped to
/// row 0; a window clamped to nothing yields NaN for that point.
pub fn average_at_change_points(
    table: &DataTable,
    pressure_col: &str,
    loading_col: &str,
    points: &ChangePointSet,
    extra_cols: &[&str],
    config: WindowConfig,
) -> Result<DataTable, IsothermError> {
    if points.series_len() != table.n_rows() {
        return Err(IsothermError::LengthMismatch {
            points: points.series_len(),
            table: table.n_rows(),
        });
    }

    let mut sources = vec![
        table.require_column(pressure_col)?,
        table.require_column(loading_col)?,
    ];
    for col in extra_cols {
        sources.push(table.require_column(col)?);
    }

    let mut names = vec!["pressure".to_string(), "loading".to_string()];
    names.extend(extra_cols.iter().map(|c| c.to_string()));
    let mut out = DataTable::new(names);

    for &n in points.indices() {
        let row: Vec<f64> = sources
            .iter()
            .map(|col| window_mean(col, n, &config))
            .collect();
        out.push_row(&row)?;
    }

    debug!(
        "aggregated {} isotherm points from {} rows",
        out.n_rows(),
        table.n_rows()
    );
    Ok(out)
}

/// NaN-skipping mean of the plateau-end window before row `n`.
fn window_mean(column: &[f64], n: usize, config: &WindowConfig) -> f64 {
    let end = n.saturating_sub(config.offset_points);
    let start = n.saturating_sub(config.offset_points + config.mean_points);
    let window = &column[start..end];

    let mut sum = 0.0;
    let mut count = 0usize;
    for &x in window {
        if !x.is_nan() {
            sum += x;
            count += 1;
        }
    }
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Interpolation scheme for sampling a baseline isotherm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    /// Piecewise-linear interpolation.
    Linear,
    /// Natural cubic spline.
    CubicSpline,
}

/// A reference isotherm: loading as a function of pressure.
///
/// Loaded from a two-column CSV (`pressure,loading`); non-numeric leading
/// rows (metadata, header) are skipped, and points are sorted by pressure.
#[derive(Debug, Clone)]
pub struct BaselineIsotherm {
    pressure: Vec<f64>,
    loading: Vec<f64>,
}

impl BaselineIsotherm {
    /// Build from `(pressure, loading)` pairs, in any order. Returns `None`
    /// for fewer than two points.
    pub fn new(points: Vec<(f64, f64)>) -> Option<Self> {
        if points.len() < 2 {
            return None;
        }
        let mut points = points;
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (pressure, loading) = points.into_iter().unzip();
        Some(Self { pressure, loading })
    }

    /// Load a baseline isotherm from a CSV file.
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self, IsothermError> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)?;

        let mut points = Vec::new();
        for record in reader.records() {
            let record = record?;
            let (Some(p), Some(l)) = (record.get(0), record.get(1)) else {
                continue;
            };
            if let (Ok(p), Ok(l)) = (p.parse::<f64>(), l.parse::<f64>()) {
                points.push((p, l));
            }
        }

        Self::new(points)
            .ok_or_else(|| IsothermError::BadBaseline(path.display().to_string()))
    }

    /// Pressure domain covered by the baseline points.
    pub fn domain(&self) -> (f64, f64) {
        (self.pressure[0], self.pressure[self.pressure.len() - 1])
    }

    /// Loading at pressure `p`, or `fill` outside the measured domain.
    pub fn loading_at(&self, p: f64, interpolation: Interpolation, fill: f64) -> f64 {
        let (lo, hi) = self.domain();
        if p.is_nan() || p < lo || p > hi {
            return fill;
        }
        match interpolation {
            Interpolation::Linear => linear_interp(&self.pressure, &self.loading, p),
            Interpolation::CubicSpline => {
                spline_interp(&self.pressure, &self.loading, p)
            }
        }
    }
}

fn linear_interp(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    let i = xs.partition_point(|&v| v < x).clamp(1, xs.len() - 1);
    let (x0, x1) = (xs[i - 1], xs[i]);
    let (y0, y1) = (ys[i - 1], ys[i]);
    if x1 == x0 {
        return y0;
    }
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}

/// Natural cubic spline: solve the tridiagonal system for the interior
/// second derivatives with the Thomas algorithm, then evaluate the segment
/// containing `x`.
fn spline_interp(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    let n = xs.len();
    if n == 2 {
        return linear_interp(xs, ys, x);
    }

    let h: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();

    // Interior equations: h[i-1]·m[i-1] + 2(h[i-1]+h[i])·m[i] + h[i]·m[i+1]
    // = 6·((y[i+1]-y[i])/h[i] - (y[i]-y[i-1])/h[i-1]); m[0] = m[n-1] = 0.
    let k = n - 2;
    let mut diag = vec![0.0; k];
    let mut rhs = vec![0.0; k];
    let mut lower = vec![0.0; k];
    let mut upper = vec![0.0; k];
    for i in 0..k {
        diag[i] = 2.0 * (h[i] + h[i + 1]);
        rhs[i] = 6.0 * ((ys[i + 2] - ys[i + 1]) / h[i + 1] - (ys[i + 1] - ys[i]) / h[i]);
        if i > 0 {
            lower[i] = h[i];
        }
        if i + 1 < k {
            upper[i] = h[i + 1];
        }
    }

    for i in 1..k {
        let w = lower[i] / diag[i - 1];
        diag[i] -= w * upper[i - 1];
        rhs[i] -= w * rhs[i - 1];
    }
    let mut m = vec![0.0; n];
    if k > 0 {
        m[k] = rhs[k - 1] / diag[k - 1];
        for i in (1..k).rev() {
            m[i] = (rhs[i - 1] - upper[i - 1] * m[i + 1]) / diag[i - 1];
        }
    }

    let i = xs.partition_point(|&v| v < x).clamp(1, n - 1);
    let (x0, x1) = (xs[i - 1], xs[i]);
    let (y0, y1) = (ys[i - 1], ys[i]);
    let hi = x1 - x0;
    let a = (x1 - x) / hi;
    let b = (x - x0) / hi;
    a * y0 + b * y1
        + ((a.powi(3) - a) * m[i - 1] + (b.powi(3) - b) * m[i]) * hi * hi / 6.0
}

/// Directory of reference isotherm CSV files, addressed by file name.
#[derive(Debug, Clone)]
pub struct BaselineLibrary {
    dir: PathBuf,
}

impl BaselineLibrary {
    /// Library rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Load the named baseline from the library directory.
    pub fn load(&self, name: &str) -> Result<BaselineIsotherm, IsothermError> {
        BaselineIsotherm::from_csv(self.dir.join(name))
    }
}

/// Subtract the baseline loading from an aggregated isotherm table.
///
/// Pressures outside the baseline's measured domain contribute `fill` as
/// the baseline value; pass `0.0` to leave such points uncorrected.
pub fn remove_baseline(
    isotherm: &DataTable,
    baseline: &BaselineIsotherm,
    interpolation: Interpolation,
    fill: f64,
) -> Result<Vec<f64>, IsothermError> {
    let pressure = isotherm.require_column("pressure")?;
    let loading = isotherm.require_column("loading")?;
    Ok(pressure
        .iter()
        .zip(loading)
        .map(|(&p, &l)| l - baseline.loading_at(p, interpolation, fill))
        .collect())
}

/// Normalize absolute loadings by the dry mass `m0`: `loading / m0 - 1`.
pub fn normalize_loading(loading: &[f64], m0: f64) -> Vec<f64> {
    loading.iter().map(|&l| l / m0 - 1.0).collect()
}

/// Activation temperature of a run: the maximum of its temperature channel.
pub fn activation_temperature(table: &DataTable, temp_col: &str) -> Result<f64, IsothermError> {
    Ok(table.column_max(temp_col)?)
}
