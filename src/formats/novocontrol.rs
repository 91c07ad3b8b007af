//! # Novocontrol (IDE) scan reader
//!
//! Dielectric-spectroscopy exports from the Novocontrol analyzer hold:
//!
//! 1. a first line `sample name, date, time` (date is day-first),
//! 2. free-form settings lines, terminated by a line starting with
//!    `Fixed value`,
//! 3. a tab-delimited table whose header row carries parameter names with
//!    erratic internal whitespace (normalized here by collapsing runs of
//!    whitespace), followed by numeric rows.
//!
//! Each row belongs to one `(time, frequency)` pair: the analyzer sweeps a
//! fixed frequency list over and over, so the row stream is a sequence of
//! complete sweeps. [`NovoRun::last_scan_before`] recovers the last complete
//! sweep before a cutoff time, which is what gets correlated against a
//! concurrently-running sorption experiment.

use std::path::Path;

use chrono::NaiveDateTime;

use crate::table::{DataTable, RunInfo, TimeUnit};

use super::{display_path, parse_f64, parse_timestamp, ParseError};

/// Normalized name of the elapsed-time column.
const TIME_COL: &str = "Time [s]";
/// Normalized name of the frequency column.
const FREQ_COL: &str = "Freq. [Hz]";

/// One parsed Novocontrol export.
#[derive(Debug, Clone)]
pub struct NovoRun {
    /// Header metadata: sample name and start time.
    pub info: RunInfo,
    /// Unique sweep frequencies in first-appearance order.
    pub frequencies: Vec<f64>,
    /// Per-row acquisition timestamps (start time + elapsed seconds).
    pub timestamps: Vec<NaiveDateTime>,
    /// Per-row sweep frequency in Hz.
    pub frequency: Vec<f64>,
    /// Measured parameter columns (everything except time and frequency),
    /// with normalized names.
    pub params: DataTable,
}

/// One row of the last complete sweep before a cutoff.
#[derive(Debug, Clone)]
pub struct Scan {
    /// Sweep frequency in Hz.
    pub frequency: f64,
    /// When the row was acquired.
    pub timestamp: NaiveDateTime,
    /// Parameter values, ordered as [`NovoRun::params`] columns.
    pub values: Vec<f64>,
}

impl NovoRun {
    /// Measured parameter names.
    pub fn parameters(&self) -> &[String] {
        self.params.names()
    }

    /// The last row per sweep frequency acquired strictly before `cutoff`.
    ///
    /// Frequencies with no row before the cutoff are omitted.
    pub fn last_scan_before(&self, cutoff: NaiveDateTime) -> Vec<Scan> {
        self.frequencies
            .iter()
            .filter_map(|&freq| {
                let row = (0..self.timestamps.len())
                    .filter(|&i| self.frequency[i] == freq && self.timestamps[i] < cutoff)
                    .next_back()?;
                Some(Scan {
                    frequency: freq,
                    timestamp: self.timestamps[row],
                    values: self.params.row(row).unwrap_or_default(),
                })
            })
            .collect()
    }
}

/// Read a Novocontrol output file.
pub fn read_novo_file(path: impl AsRef<Path>) -> Result<NovoRun, ParseError> {
    let path = path.as_ref();
    let file = display_path(path);
    let text = std::fs::read_to_string(path)?;
    let mut lines = text.lines().enumerate();

    let (_, first) = lines
        .next()
        .ok_or_else(|| ParseError::UnexpectedEof {
            file: file.clone(),
            context: "sample name line".to_string(),
        })?;
    let parts: Vec<&str> = first.split(',').map(str::trim).collect();
    let [name, date, time] = parts[..] else {
        return Err(ParseError::malformed(&file, 1, "sample name line", first.trim()));
    };
    let start = parse_timestamp(&format!("{date} {time}"), &file)?;

    // Skip the settings block; the `Fixed value` line closes it.
    let mut found_marker = false;
    for (_, line) in lines.by_ref() {
        if line.trim_start().starts_with("Fixed value") {
            found_marker = true;
            break;
        }
    }
    if !found_marker {
        return Err(ParseError::UnexpectedEof {
            file,
            context: "`Fixed value` settings terminator".to_string(),
        });
    }

    let (_, header) = lines.next().ok_or_else(|| ParseError::UnexpectedEof {
        file: file.clone(),
        context: "parameter header row".to_string(),
    })?;
    let names: Vec<String> = header.split('\t').map(normalize_name).collect();

    let time_idx = names
        .iter()
        .position(|n| n == TIME_COL)
        .ok_or_else(|| ParseError::missing(&file, TIME_COL))?;
    let freq_idx = names
        .iter()
        .position(|n| n == FREQ_COL)
        .ok_or_else(|| ParseError::missing(&file, FREQ_COL))?;

    let param_names: Vec<String> = names
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != time_idx && i != freq_idx)
        .map(|(_, n)| n.clone())
        .collect();

    let mut elapsed = Vec::new();
    let mut frequency = Vec::new();
    let mut params = DataTable::new(param_names);
    let mut row = vec![f64::NAN; params.n_cols()];

    for (idx, line) in lines {
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != names.len() {
            return Err(ParseError::malformed(
                &file,
                line_no,
                "row",
                &format!("{} of {} expected columns", fields.len(), names.len()),
            ));
        }
        elapsed.push(parse_f64(fields[time_idx], &file, line_no, TIME_COL)?);
        frequency.push(parse_f64(fields[freq_idx], &file, line_no, FREQ_COL)?);

        let mut slot = 0;
        for (i, raw) in fields.iter().enumerate() {
            if i == time_idx || i == freq_idx {
                continue;
            }
            row[slot] = if raw.trim().is_empty() {
                f64::NAN
            } else {
                parse_f64(raw, &file, line_no, &names[i])?
            };
            slot += 1;
        }
        params.push_row(&row)?;
    }

    let mut frequencies = Vec::new();
    for &f in &frequency {
        if !frequencies.contains(&f) {
            frequencies.push(f);
        }
    }

    // The timestamp index lives alongside the parameter table; elapsed time
    // is in seconds.
    params.set_time_index(start, &elapsed, TimeUnit::Seconds)?;
    let timestamps = params
        .timestamps()
        .map(<[NaiveDateTime]>::to_vec)
        .unwrap_or_default();

    let mut info = RunInfo::new();
    info.insert("novo_sample_name", name);
    info.start_time = Some(start);

    Ok(NovoRun {
        info,
        frequencies,
        timestamps,
        frequency,
        params,
    })
}

/// Trim and collapse internal whitespace runs in a header name.
fn normalize_name(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
