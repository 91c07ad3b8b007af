//! # Skip-and-continue batch driver
//!
//! Callers driving a reader over many files want one bad export to be
//! recorded, not fatal. [`run_batch`] applies a fallible per-file closure to
//! every path, collects the successes, and records each failure with the
//! path that caused it. With the `parallel` cargo feature the same contract
//! is available across threads via [`run_batch_parallel`]; batch file reads
//! are embarrassingly parallel and share no state.

use std::path::{Path, PathBuf};

use log::warn;

use crate::formats::ParseError;

/// One file that failed during a batch run, and why.
#[derive(Debug)]
pub struct BatchFailure {
    /// Path of the file that failed.
    pub path: PathBuf,
    /// The parse error that stopped it.
    pub error: ParseError,
}

/// Successes and recorded failures of a batch run.
#[derive(Debug, Default)]
pub struct BatchOutcome<T> {
    /// Per-file results, in input order (failed files omitted).
    pub successes: Vec<T>,
    /// Files that failed, with their errors, in input order.
    pub failures: Vec<BatchFailure>,
}

impl<T> BatchOutcome<T> {
    /// True when no file failed.
    pub fn all_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Apply `read` to every path, skipping and recording failures.
pub fn run_batch<P, T, F>(paths: &[P], read: F) -> BatchOutcome<T>
where
    P: AsRef<Path>,
    F: Fn(&Path) -> Result<T, ParseError>,
{
    let mut outcome = BatchOutcome {
        successes: Vec::with_capacity(paths.len()),
        failures: Vec::new(),
    };
    for path in paths {
        let path = path.as_ref();
        match read(path) {
            Ok(value) => outcome.successes.push(value),
            Err(error) => {
                warn!("skipping {}: {error}", path.display());
                outcome.failures.push(BatchFailure {
                    path: path.to_path_buf(),
                    error,
                });
            }
        }
    }
    outcome
}

/// Parallel variant of [`run_batch`]. Result order matches input order.
#[cfg(feature = "parallel")]
pub fn run_batch_parallel<P, T, F>(paths: &[P], read: F) -> BatchOutcome<T>
where
    P: AsRef<Path> + Sync,
    T: Send,
    F: Fn(&Path) -> Result<T, ParseError> + Sync,
{
    use rayon::prelude::*;

    let results: Vec<(usize, Result<T, ParseError>)> = paths
        .par_iter()
        .enumerate()
        .map(|(i, path)| (i, read(path.as_ref())))
        .collect();

    let mut outcome = BatchOutcome {
        successes: Vec::with_capacity(paths.len()),
        failures: Vec::new(),
    };
    for (i, result) in results {
        match result {
            Ok(value) => outcome.successes.push(value),
            Err(error) => {
                let path = paths[i].as_ref();
                warn!("skipping {}: {error}", path.display());
                outcome.failures.push(BatchFailure {
                    path: path.to_path_buf(),
                    error,
                });
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_records_failures_and_continues() {
        let paths = ["good1", "bad", "good2"];
        let outcome = run_batch(&paths, |path| {
            let name = path.to_string_lossy();
            if name.starts_with("bad") {
                Err(ParseError::missing(&name, "header"))
            } else {
                Ok(name.to_string())
            }
        });

        assert_eq!(outcome.successes, vec!["good1", "good2"]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].path, PathBuf::from("bad"));
        assert!(!outcome.all_ok());
    }

    #[test]
    fn test_empty_batch_is_ok() {
        let outcome = run_batch::<&str, (), _>(&[], |_| Ok(()));
        assert!(outcome.all_ok());
        assert!(outcome.successes.is_empty());
    }
}
