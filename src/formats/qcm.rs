//! # QCM trace and marker readers
//!
//! A quartz-crystal-microbalance acquisition produces two kinds of files:
//!
//! - **Trace files**: one file per scan, holding an amplitude-vs-frequency
//!   sweep. Two physical conventions exist ([`TraceVariant`]): *stamped*
//!   files carry their own frequency axis as a first CSV column and encode
//!   the scan time in the filename stem; *indexed* files hold amplitudes
//!   only, with the axis reconstructed as an even grid from acquisition
//!   parameters. Stamped scans are resampled by linear interpolation onto a
//!   common grid so all scans share one axis.
//! - **Marker files**: the instrument's own running log of the tracked
//!   resonance frequency, in a whitespace-delimited `.txt` or two-column
//!   `.csv` convention.
//!
//! Trace directories are read skip-and-continue: one corrupt scan is
//! recorded as a failure, not fatal to the batch (see [`crate::batch`]).

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use log::debug;

use crate::batch::{run_batch, BatchFailure};

use super::{display_path, parse_f64, parse_timestamp, ParseError};

/// Physical file convention of a trace directory.
#[derive(Debug, Clone, Copy)]
pub enum TraceVariant {
    /// Each file carries `frequency,amplitude` rows and a timestamp stem.
    ///
    /// Scans are resampled onto a shared `grid_points`-long axis spanning
    /// the union of all per-file axes.
    Stamped {
        /// Number of points in the common resampled axis.
        grid_points: usize,
    },

    /// Each file holds one amplitude per line; the axis is an even grid
    /// from `f0` to `f1` with `points` samples.
    Indexed {
        /// First axis frequency in Hz.
        f0: f64,
        /// Last axis frequency in Hz.
        f1: f64,
        /// Number of axis samples each file must contain.
        points: usize,
    },
}

impl Default for TraceVariant {
    fn default() -> Self {
        TraceVariant::Stamped { grid_points: 2000 }
    }
}

/// One scan: acquisition timestamp plus amplitudes over the shared axis.
#[derive(Debug, Clone)]
pub struct TraceScan {
    /// When the scan was acquired (from the filename).
    pub timestamp: NaiveDateTime,
    /// Amplitude per shared-axis sample.
    pub amplitude: Vec<f64>,
}

/// A set of scans over one shared frequency axis, ordered by timestamp.
#[derive(Debug, Clone, Default)]
pub struct TraceSet {
    /// Shared frequency axis in Hz.
    pub axis: Vec<f64>,
    /// Scans in acquisition order.
    pub scans: Vec<TraceScan>,
}

impl TraceSet {
    /// Number of scans.
    pub fn len(&self) -> usize {
        self.scans.len()
    }

    /// True when no scan was read.
    pub fn is_empty(&self) -> bool {
        self.scans.is_empty()
    }
}

/// The instrument's running resonance-frequency log.
#[derive(Debug, Clone, Default)]
pub struct MarkerTable {
    /// Per-entry timestamps.
    pub timestamps: Vec<NaiveDateTime>,
    /// Tracked resonance frequency in Hz.
    pub frequency: Vec<f64>,
}

impl MarkerTable {
    /// Number of entries.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// True when the log is empty.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

struct RawScan {
    timestamp: NaiveDateTime,
    axis: Vec<f64>,
    amplitude: Vec<f64>,
}

/// Read every trace file in a directory into a [`TraceSet`].
///
/// Unreadable files are skipped and reported in the returned failure list.
pub fn read_trace_dir(
    dir: impl AsRef<Path>,
    variant: TraceVariant,
) -> Result<(TraceSet, Vec<BatchFailure>), ParseError> {
    let dir = dir.as_ref();
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    let outcome = run_batch(&paths, |path| read_trace_file(path, variant));
    let mut raw = outcome.successes;
    raw.sort_by_key(|scan| scan.timestamp);
    debug!(
        "{}: {} scans read, {} skipped",
        dir.display(),
        raw.len(),
        outcome.failures.len()
    );

    let set = match variant {
        TraceVariant::Stamped { grid_points } => resample_to_common_grid(raw, grid_points),
        TraceVariant::Indexed { .. } => TraceSet {
            axis: raw.first().map(|scan| scan.axis.clone()).unwrap_or_default(),
            scans: raw
                .into_iter()
                .map(|scan| TraceScan {
                    timestamp: scan.timestamp,
                    amplitude: scan.amplitude,
                })
                .collect(),
        },
    };

    Ok((set, outcome.failures))
}

fn read_trace_file(path: &Path, variant: TraceVariant) -> Result<RawScan, ParseError> {
    let file = display_path(path);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let timestamp = parse_timestamp(&stem.replace('T', " "), &file)?;

    let text = std::fs::read_to_string(path)?;

    match variant {
        TraceVariant::Stamped { .. } => {
            let mut axis = Vec::new();
            let mut amplitude = Vec::new();
            for (idx, line) in text.lines().enumerate() {
                let line_no = idx + 1;
                if line.trim().is_empty() {
                    continue;
                }
                let Some((x, y)) = line.split_once(',') else {
                    return Err(ParseError::malformed(&file, line_no, "row", line.trim()));
                };
                axis.push(parse_f64(x, &file, line_no, "frequency")?);
                amplitude.push(parse_f64(y, &file, line_no, "amplitude")?);
            }
            Ok(RawScan {
                timestamp,
                axis,
                amplitude,
            })
        }
        TraceVariant::Indexed { f0, f1, points } => {
            let mut amplitude = Vec::new();
            for (idx, line) in text.lines().enumerate() {
                let line_no = idx + 1;
                if line.trim().is_empty() {
                    continue;
                }
                amplitude.push(parse_f64(line, &file, line_no, "amplitude")?);
            }
            if amplitude.len() != points {
                return Err(ParseError::malformed(
                    &file,
                    amplitude.len(),
                    "row count",
                    &format!("{} of {points} expected samples", amplitude.len()),
                ));
            }
            Ok(RawScan {
                timestamp,
                axis: linspace(f0, f1, points),
                amplitude,
            })
        }
    }
}

/// Resample stamped scans onto one grid spanning the union of their axes.
fn resample_to_common_grid(raw: Vec<RawScan>, grid_points: usize) -> TraceSet {
    let lo = raw
        .iter()
        .filter_map(|scan| scan.axis.first().copied())
        .fold(f64::INFINITY, f64::min);
    let hi = raw
        .iter()
        .filter_map(|scan| scan.axis.last().copied())
        .fold(f64::NEG_INFINITY, f64::max);
    if !lo.is_finite() || !hi.is_finite() {
        return TraceSet::default();
    }

    let axis = linspace(lo, hi, grid_points);
    let scans = raw
        .into_iter()
        .map(|scan| TraceScan {
            timestamp: scan.timestamp,
            amplitude: interp(&axis, &scan.axis, &scan.amplitude),
        })
        .collect();
    TraceSet { axis, scans }
}

/// Read a marker log; the convention is selected by file extension.
pub fn read_marker_file(path: impl AsRef<Path>) -> Result<MarkerTable, ParseError> {
    let path = path.as_ref();
    let file = display_path(path);
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "txt" => read_marker_txt(path, &file),
        "csv" => read_marker_csv(path, &file),
        other => Err(ParseError::unsupported("marker file extension", other)),
    }
}

/// Whitespace-delimited `day hour frequency` rows.
fn read_marker_txt(path: &Path, file: &str) -> Result<MarkerTable, ParseError> {
    let text = std::fs::read_to_string(path)?;
    let mut markers = MarkerTable::default();
    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [day, hour, freq] = fields[..] else {
            return Err(ParseError::malformed(file, line_no, "row", line.trim()));
        };
        markers
            .timestamps
            .push(parse_timestamp(&format!("{day} {hour}"), file)?);
        markers
            .frequency
            .push(parse_f64(freq, file, line_no, "frequency")?);
    }
    Ok(markers)
}

/// `time,frequency` rows.
fn read_marker_csv(path: &Path, file: &str) -> Result<MarkerTable, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut markers = MarkerTable::default();
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        let line_no = idx + 1;
        if record.len() < 2 {
            return Err(ParseError::malformed(
                file,
                line_no,
                "row",
                &record.iter().collect::<Vec<_>>().join(","),
            ));
        }
        markers.timestamps.push(parse_timestamp(&record[0], file)?);
        markers
            .frequency
            .push(parse_f64(&record[1], file, line_no, "frequency")?);
    }
    Ok(markers)
}

/// Evenly spaced grid from `start` to `stop` inclusive.
pub(crate) fn linspace(start: f64, stop: f64, points: usize) -> Vec<f64> {
    match points {
        0 => Vec::new(),
        1 => vec![start],
        n => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Piecewise-linear interpolation with endpoint clamping, `xp` ascending.
pub(crate) fn interp(x: &[f64], xp: &[f64], fp: &[f64]) -> Vec<f64> {
    x.iter()
        .map(|&xi| {
            if xp.is_empty() {
                return f64::NAN;
            }
            if xi <= xp[0] {
                return fp[0];
            }
            if xi >= xp[xp.len() - 1] {
                return fp[fp.len() - 1];
            }
            let j = xp.partition_point(|&p| p < xi);
            let (x0, x1) = (xp[j - 1], xp[j]);
            let (y0, y1) = (fp[j - 1], fp[j]);
            y0 + (y1 - y0) * (xi - x0) / (x1 - x0)
        })
        .collect()
}
