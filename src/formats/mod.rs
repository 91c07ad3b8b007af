//! # Instrument file readers
//!
//! One submodule per instrument export format. Every reader follows the same
//! contract: given a file path (and format-specific options), produce header
//! metadata plus a tabular result, or a [`ParseError`] that identifies the
//! offending file, line, and field. There is no partial/best-effort output;
//! a malformed file fails as a whole.
//!
//! Column identities are **positional and fixed** per format. The source
//! files carry no column-name row reliable enough to parse, so each format's
//! known layout is encoded as a [`ChannelLayout`] value handed to the reader.
//! This is a deliberate simplification: readers never attempt to auto-detect
//! columns.

use std::path::Path;

pub mod dvs;
pub mod m41;
pub mod novocontrol;
pub mod pcr;
pub mod qcm;

use crate::table::TableError;

/// Errors that can occur while parsing an instrument export.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    /// An expected header metadata field is absent or unparsable.
    #[error("{file}: missing required header field `{field}`")]
    MissingField {
        /// File being parsed.
        file: String,
        /// Normalized name of the missing field.
        field: String,
    },

    /// A numeric body field failed to parse.
    #[error("{file}:{line}: malformed value `{value}` for field `{field}`")]
    MalformedRow {
        /// File being parsed.
        file: String,
        /// 1-based line number in the source file.
        line: usize,
        /// Name of the field that failed to convert.
        field: String,
        /// The raw text that failed to convert.
        value: String,
    },

    /// A timestamp (header value or trace filename) failed to parse.
    #[error("{file}: malformed timestamp `{value}`")]
    MalformedTimestamp {
        /// File being parsed.
        file: String,
        /// The raw text that failed to parse as a timestamp.
        value: String,
    },

    /// An unrecognized value for a format-selector flag.
    #[error("unsupported {what}: `{value}`")]
    UnsupportedVariant {
        /// What kind of selector was being interpreted.
        what: String,
        /// The unrecognized value.
        value: String,
    },

    /// The file ended before a required record.
    #[error("{file}: unexpected end of file while reading {context}")]
    UnexpectedEof {
        /// File being parsed.
        file: String,
        /// What record was being read when input ran out.
        context: String,
    },

    /// Table construction error.
    #[error(transparent)]
    Table(#[from] TableError),
}

impl ParseError {
    /// Build a [`ParseError::MalformedRow`] for a failed field conversion.
    pub fn malformed(file: &str, line: usize, field: &str, value: &str) -> Self {
        ParseError::MalformedRow {
            file: file.to_string(),
            line,
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    /// Build a [`ParseError::MissingField`].
    pub fn missing(file: &str, field: &str) -> Self {
        ParseError::MissingField {
            file: file.to_string(),
            field: field.to_string(),
        }
    }

    /// Build a [`ParseError::UnsupportedVariant`].
    pub fn unsupported(what: &str, value: impl ToString) -> Self {
        ParseError::UnsupportedVariant {
            what: what.to_string(),
            value: value.to_string(),
        }
    }
}

/// Parse one whitespace-trimmed `f64` field, reporting file/line/field on failure.
pub(crate) fn parse_f64(raw: &str, file: &str, line: usize, field: &str) -> Result<f64, ParseError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| ParseError::malformed(file, line, field, raw.trim()))
}

/// Display helper for paths in error messages.
pub(crate) fn display_path(path: &Path) -> String {
    path.display().to_string()
}

/// Timestamp formats seen in instrument headers and trace filenames.
///
/// Day-first variants come before month-first ones: every export this crate
/// reads was produced by European instrument software.
const TIMESTAMP_FORMATS: &[&str] = &[
    "%d/%m/%Y %H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H-%M-%S",
    "%Y-%m-%d_%H-%M-%S",
    "%Y%m%d-%H%M%S",
    "%Y%m%d_%H%M%S",
    "%m/%d/%Y %H:%M:%S",
];

/// Parse a timestamp trying each known instrument format in order.
pub(crate) fn parse_timestamp(
    raw: &str,
    file: &str,
) -> Result<chrono::NaiveDateTime, ParseError> {
    let trimmed = raw.trim();
    for format in TIMESTAMP_FORMATS {
        if let Ok(parsed) = chrono::NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(parsed);
        }
    }
    Err(ParseError::MalformedTimestamp {
        file: file.to_string(),
        value: trimmed.to_string(),
    })
}

/// Fixed positional channel map for one instrument format.
///
/// Maps canonical channel names to zero-based column offsets in the source
/// file's data section. Formats coexist as named constructor variants of
/// this one type; the map is an explicit configuration value passed to the
/// reader, never a shared mutable global.
#[derive(Debug, Clone)]
pub struct ChannelLayout {
    format: &'static str,
    channels: Vec<&'static str>,
}

impl ChannelLayout {
    /// The 19-channel layout of a DVS Advantage export data section.
    pub fn dvs() -> Self {
        Self {
            format: "dvs",
            channels: vec![
                "time",       // elapsed time [min]
                "mass",       // sample mass [mg]
                "dmass",      // mass change [%]
                "dmdt",       // mass derivative [mg/min]
                "t_inc_tgt",  // incubator target temperature [C]
                "t_inc",      // incubator temperature [C]
                "t_heat_tgt", // preheater target temperature [C]
                "t_heat",     // preheater temperature [C]
                "p_rel_tgt",  // relative pressure target [%]
                "p_rel",      // relative pressure [%]
                "p_abs_tgt",  // absolute pressure target [torr]
                "p_abs",      // absolute pressure [torr]
                "p_vac",      // vacuum gauge [torr]
                "p_low",      // low-range gauge [torr]
                "p_high",     // high-range gauge [torr]
                "v_flow_tgt", // vapour flow target [sccm]
                "v_flow",     // vapour flow [sccm]
                "g_flow_tgt", // carrier gas flow target [sccm]
                "g_flow",     // carrier gas flow [sccm]
            ],
        }
    }

    /// Format tag this layout belongs to.
    pub fn format(&self) -> &'static str {
        self.format
    }

    /// Number of columns the data section must have.
    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    /// Canonical channel names in positional order.
    pub fn names(&self) -> &[&'static str] {
        &self.channels
    }

    /// Column offset of a canonical channel name.
    pub fn index_of(&self, channel: &str) -> Option<usize> {
        self.channels.iter().position(|c| *c == channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dvs_layout_is_positional() {
        let layout = ChannelLayout::dvs();
        assert_eq!(layout.n_channels(), 19);
        assert_eq!(layout.index_of("time"), Some(0));
        assert_eq!(layout.index_of("mass"), Some(1));
        assert_eq!(layout.index_of("p_abs"), Some(11));
        assert_eq!(layout.index_of("g_flow"), Some(18));
        assert_eq!(layout.index_of("nonexistent"), None);
    }

    #[test]
    fn test_parse_f64_reports_location() {
        let err = parse_f64("abc", "run.dvs", 44, "mass").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("run.dvs:44"));
        assert!(msg.contains("mass"));
        assert!(msg.contains("abc"));
    }
}
