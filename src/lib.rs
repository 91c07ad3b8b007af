//! # labproc - Laboratory Instrument Data Processing
//!
//! `labproc` parses instrument output files from several materials-science
//! experimental techniques into tabular in-memory runs, computes derived
//! physical quantities, detects change points in step-wise time series, and
//! aggregates detected plateaus into sorption isotherm points.
//!
//! ## Supported formats
//!
//! - **DVS**: Dynamic Vapor Sorption exports (Windows-1252 text, `key: value`
//!   header block, 19 fixed positional channels) - [`formats::dvs`]
//! - **QCM**: Quartz Crystal Microbalance trace directories (two file-naming
//!   conventions) and marker files (`.txt`/`.csv`) - [`formats::qcm`]
//! - **Novocontrol**: dielectric spectroscopy (IDE) scan exports -
//!   [`formats::novocontrol`]
//! - **Rietveld**: FullProf multipattern `.pcr` control files and JANA `.m41`
//!   phase output - [`formats::pcr`], [`formats::m41`]
//!
//! ## Derived quantities
//!
//! - Sauerbrey frequency-to-mass conversion and its inverse - [`physics::sauerbrey`]
//! - Triclinic unit-cell volume with propagated uncertainty - [`physics::cell`]
//! - Birch-Murnaghan and Vinet equations of state - [`physics::eos`]
//!
//! ## Pipeline
//!
//! Data flows one direction: file → parsed table (+ header metadata) →
//! derived quantities → change-point indices → windowed isotherm points →
//! CSV/JSON export. There is no feedback and no persistence layer.
//!
//! ```rust,no_run
//! use labproc::formats::dvs;
//! use labproc::segment::{self, DetectionParams, Method};
//! use labproc::isotherm::{self, WindowConfig};
//!
//! let run = dvs::read_dvs_file("sample.dvs", dvs::DvsOptions::default())?;
//! let target = run.data.column("p_rel_tgt").expect("known layout");
//! let points = segment::detect(target, Method::Derivative, &DetectionParams::default())?;
//! let iso = isotherm::average_at_change_points(
//!     &run.data, "p_abs", "mass", &points, &[], WindowConfig::default(),
//! )?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Error policy
//!
//! Parsing errors are fatal to that file's read and identify the offending
//! file, line, and field. Derived-quantity functions are total over numeric
//! input (out-of-domain equation-of-state inputs yield NaN/inf, never an
//! error). Peak extraction reports a missing peak as an explicit
//! `Option`/sentinel, never a swallowed failure. Batch drivers skip failed
//! files and record which file failed and why - see [`batch`].

// Documentation lints - enforce complete documentation for publication
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

pub mod batch;
pub mod formats;
pub mod isotherm;
pub mod peaks;
pub mod physics;
pub mod segment;
pub mod table;

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::batch::{BatchFailure, BatchOutcome};
    pub use crate::formats::{dvs, m41, novocontrol, pcr, qcm, ChannelLayout, ParseError};
    pub use crate::isotherm::{
        BaselineIsotherm, BaselineLibrary, Interpolation, IsothermError, WindowConfig,
    };
    pub use crate::peaks::{PeakConfig, TracePeak, TraceResult};
    pub use crate::physics::cell::CrystalCell;
    pub use crate::physics::eos::{Eos, EosParams};
    pub use crate::physics::sauerbrey::Electrode;
    pub use crate::segment::{ChangePointSet, DetectionParams, Method, SegmentError};
    pub use crate::table::{DataTable, InstrumentRun, RunInfo, TableError, TimeUnit};
}
