//! # DVS Advantage export reader
//!
//! Dynamic Vapor Sorption exports are Windows-1252 text files with three
//! sections:
//!
//! 1. a banner line (ignored),
//! 2. sixteen `key: value` header lines,
//! 3. a tab-delimited data section whose column-name row sits on line 42 and
//!    whose numeric rows start on line 43.
//!
//! The column-name row is not trusted; the 19 channels are resolved by the
//! fixed positional [`ChannelLayout::dvs`] map. Header keys are trimmed to a
//! recognized subset and renamed to canonical `dvs_*` names. Each row's
//! timestamp is the recorded file-creation time (plus a caller-supplied
//! correction offset in seconds) plus the row's elapsed minutes.

use std::path::Path;

use chrono::Duration;
use encoding_rs::WINDOWS_1252;
use log::debug;

use crate::table::{DataTable, InstrumentRun, RunInfo, TimeUnit};

use super::{display_path, parse_f64, parse_timestamp, ChannelLayout, ParseError};

/// Raw header keys recognized in a DVS export, with their canonical names.
const IMPORTANT_META: &[(&str, &str)] = &[
    ("Method Name", "dvs_method_name"),
    ("Sample Name", "dvs_sample_name"),
    ("Sample Description", "dvs_sample_description"),
    ("Initial Mass [mg]", "dvs_initial_mass [mg]"),
    ("Raw Data File Created", "dvs_method_date"),
    ("User Name", "dvs_user_name"),
    ("Vapour", "dvs_adsorbate"),
    ("Vapour Pressure [Torr]", "dvs_p0 [torr]"),
    ("Control Mode", "dvs_control_mode"),
];

/// Header key that must be present: without it no timestamp index exists.
const CREATED_KEY: &str = "Raw Data File Created";

/// Number of `key: value` header lines after the banner line.
const HEADER_LINES: usize = 16;

/// 1-based line number of the first numeric data row.
const FIRST_DATA_LINE: usize = 43;

/// Format-specific options for [`read_dvs_file`].
#[derive(Debug, Clone)]
pub struct DvsOptions {
    /// Correction added to the recorded file-creation time, in seconds.
    ///
    /// The instrument writes the header a short while before logging starts;
    /// 20 s matches the observed lag.
    pub start_offset_secs: i64,

    /// Positional channel map for the data section.
    pub layout: ChannelLayout,
}

impl Default for DvsOptions {
    fn default() -> Self {
        Self {
            start_offset_secs: 20,
            layout: ChannelLayout::dvs(),
        }
    }
}

/// Read a DVS export into header metadata plus a time-indexed channel table.
pub fn read_dvs_file(
    path: impl AsRef<Path>,
    options: DvsOptions,
) -> Result<InstrumentRun, ParseError> {
    let path = path.as_ref();
    let file = display_path(path);
    let bytes = std::fs::read(path)?;
    let (text, _, _) = WINDOWS_1252.decode(&bytes);
    let lines: Vec<&str> = text.lines().collect();

    let info = parse_header(&lines, &file)?;

    let start_raw = info
        .get("dvs_method_date")
        .ok_or_else(|| ParseError::missing(&file, CREATED_KEY))?;
    // The value carries a fractional-second tail the instrument never fills
    // consistently; only the first 19 characters are meaningful.
    let start_text: String = start_raw.chars().take(19).collect();
    let start = parse_timestamp(&start_text, &file)?;

    let mut info = info;
    info.start_time = Some(start + Duration::seconds(options.start_offset_secs));

    let mut data = DataTable::new(options.layout.names().iter().copied());
    let n_channels = options.layout.n_channels();
    let mut row = vec![f64::NAN; n_channels];

    for (idx, line) in lines.iter().enumerate().skip(FIRST_DATA_LINE - 1) {
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < n_channels {
            return Err(ParseError::malformed(
                &file,
                line_no,
                "row",
                &format!("{} of {} expected columns", fields.len(), n_channels),
            ));
        }
        for (i, raw) in fields.iter().take(n_channels).enumerate() {
            row[i] = if raw.trim().is_empty() {
                f64::NAN
            } else {
                parse_f64(raw, &file, line_no, options.layout.names()[i])?
            };
        }
        data.push_row(&row)?;
    }

    debug!("{file}: {} rows, {} channels", data.n_rows(), n_channels);

    let elapsed = data
        .column("time")
        .map(<[f64]>::to_vec)
        .unwrap_or_default();
    if let Some(start) = info.start_time {
        data.set_time_index(start, &elapsed, TimeUnit::Minutes)?;
    }

    Ok(InstrumentRun { info, data })
}

/// Parse and trim the `key: value` header block.
fn parse_header(lines: &[&str], file: &str) -> Result<RunInfo, ParseError> {
    let mut info = RunInfo::new();

    for (idx, line) in lines.iter().enumerate().skip(1).take(HEADER_LINES) {
        let line_no = idx + 1;
        let Some((key, value)) = line.split_once(':') else {
            return Err(ParseError::malformed(file, line_no, "header", line.trim()));
        };
        let key = key.trim();
        if let Some((_, canonical)) = IMPORTANT_META.iter().find(|(raw, _)| *raw == key) {
            info.insert(canonical, value.trim());
        }
    }

    if info.get("dvs_method_date").is_none() {
        return Err(ParseError::missing(file, CREATED_KEY));
    }
    Ok(info)
}
