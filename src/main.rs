//! # labproc CLI
//!
//! Command-line front end for the instrument readers and the isotherm
//! pipeline.
//!
//! ## Usage
//!
//! ```bash
//! # Show header metadata of an instrument file
//! labproc info run.dvs
//!
//! # Export the data table (with timestamps) to CSV
//! labproc export run.dvs run.csv
//!
//! # Detect equilibrium steps on the target-pressure channel
//! labproc changepoints run.dvs --column p_rel_tgt
//!
//! # Aggregate an isotherm, subtract a baseline, write CSV
//! labproc isotherm run.dvs iso.csv --baseline empty_pan.csv --baseline-dir baselines
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use std::path::{Path, PathBuf};

use labproc::formats::dvs::{read_dvs_file, DvsOptions};
use labproc::formats::{m41, novocontrol, pcr};
use labproc::isotherm::{
    average_at_change_points, normalize_loading, remove_baseline, BaselineLibrary, Interpolation,
    WindowConfig,
};
use labproc::segment::{detect, DetectionParams, Method};
use labproc::table::InstrumentRun;

/// labproc - Laboratory Instrument Data Processing
#[derive(Parser)]
#[command(name = "labproc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Input file format, when the extension is ambiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FileFormat {
    /// DVS Advantage sorption export
    Dvs,
    /// Novocontrol dielectric scan export
    Novo,
    /// FullProf `.pcr` control file
    Pcr,
    /// JANA `.m41` refinement result
    M41,
}

#[derive(Subcommand)]
enum Commands {
    /// Display header metadata of an instrument file
    Info {
        /// Input file path
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Force the input format (default: inferred from extension)
        #[arg(short, long)]
        format: Option<FileFormat>,

        /// Emit metadata as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export a sorption run's data table to CSV
    Export {
        /// Input DVS file path
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output CSV path (defaults to the input with a .csv extension)
        #[arg(value_name = "OUTPUT")]
        output: Option<PathBuf>,
    },

    /// Detect change points in one channel of a sorption run
    Changepoints {
        /// Input DVS file path
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Channel to segment
        #[arg(short, long, default_value = "p_rel_tgt")]
        column: String,

        /// Detection method: derivative, binseg or window
        #[arg(short, long, default_value = "derivative")]
        method: String,

        /// Penalty threshold for binseg/window
        #[arg(long, default_value = "0.5")]
        pen: f64,

        /// Minimum segment length in samples (binseg)
        #[arg(long, default_value = "2")]
        min_size: usize,

        /// Window width in samples (window)
        #[arg(long, default_value = "300")]
        width: usize,
    },

    /// Aggregate a sorption run into isotherm points
    Isotherm {
        /// Input DVS file path
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output CSV path
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,

        /// Channel whose steps define the equilibrium plateaus
        #[arg(long, default_value = "p_rel_tgt")]
        target_column: String,

        /// Pressure channel averaged into the isotherm
        #[arg(long, default_value = "p_abs")]
        pressure_column: String,

        /// Loading channel averaged into the isotherm
        #[arg(long, default_value = "mass")]
        loading_column: String,

        /// Baseline isotherm file name to subtract
        #[arg(short, long)]
        baseline: Option<String>,

        /// Directory holding baseline isotherm files
        #[arg(long, default_value = ".")]
        baseline_dir: PathBuf,

        /// Dry mass m0; when given, adds a `loading / m0 - 1` column
        #[arg(short, long)]
        mass: Option<f64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Info { file, format, json } => run_info(file, format, json),
        Commands::Export { input, output } => run_export(input, output),
        Commands::Changepoints {
            file,
            column,
            method,
            pen,
            min_size,
            width,
        } => run_changepoints(file, column, method, pen, min_size, width),
        Commands::Isotherm {
            input,
            output,
            target_column,
            pressure_column,
            loading_column,
            baseline,
            baseline_dir,
            mass,
        } => run_isotherm(
            input,
            output,
            target_column,
            pressure_column,
            loading_column,
            baseline,
            baseline_dir,
            mass,
        ),
    }
}

/// Pick the reader from the file extension unless overridden.
fn resolve_format(file: &Path, format: Option<FileFormat>) -> Result<FileFormat> {
    if let Some(format) = format {
        return Ok(format);
    }
    let ext = file
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "dvs" => Ok(FileFormat::Dvs),
        "pcr" => Ok(FileFormat::Pcr),
        "m41" => Ok(FileFormat::M41),
        "txt" | "dat" => Ok(FileFormat::Novo),
        other => anyhow::bail!(
            "cannot infer format from extension `{other}`; pass --format"
        ),
    }
}

/// Display header metadata of an instrument file
fn run_info(file: PathBuf, format: Option<FileFormat>, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("Input file does not exist: {}", file.display());
    }
    let format = resolve_format(&file, format)?;

    match format {
        FileFormat::Dvs => {
            let run = read_dvs_file(&file, DvsOptions::default())
                .with_context(|| format!("Failed to read {}", file.display()))?;
            print_run_info(&run, json)?;
        }
        FileFormat::Novo => {
            let run = novocontrol::read_novo_file(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            if json {
                println!("{}", run.info.to_json()?);
            } else {
                for (key, value) in &run.info.fields {
                    println!("{key}: {value}");
                }
                println!("frequencies: {:?}", run.frequencies);
                println!("parameters: {:?}", run.parameters());
                println!("rows: {}", run.params.n_rows());
            }
        }
        FileFormat::Pcr => {
            let parsed = pcr::read_pcr_file(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            println!("job: {}", parsed.name);
            println!("patterns: {}", parsed.patterns.len());
            for phase in &parsed.phases {
                println!(
                    "phase {}: {} ({} atoms), V = {:.4} A^3",
                    phase.name,
                    phase.space_group,
                    phase.atoms.len(),
                    phase.cell.volume()
                );
            }
        }
        FileFormat::M41 => {
            let parsed = m41::read_m41_file(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            for phase in &parsed.phases {
                match (&phase.values.cell, &phase.su.cell) {
                    (Some(cell), Some(su)) => println!(
                        "phase {}: V = {:.4} +/- {:.4} A^3",
                        phase.name,
                        cell.volume(),
                        cell.volume_esd(su)
                    ),
                    (Some(cell), None) => {
                        println!("phase {}: V = {:.4} A^3", phase.name, cell.volume());
                    }
                    _ => println!("phase {}: no cell refined", phase.name),
                }
            }
        }
    }
    Ok(())
}

fn print_run_info(run: &InstrumentRun, json: bool) -> Result<()> {
    if json {
        println!("{}", run.info.to_json()?);
    } else {
        for (key, value) in &run.info.fields {
            println!("{key}: {value}");
        }
        if let Some(start) = run.info.start_time {
            println!("start_time: {start}");
        }
        println!("rows: {}", run.data.n_rows());
    }
    Ok(())
}

/// Export a sorption run's data table to CSV
fn run_export(input: PathBuf, output: Option<PathBuf>) -> Result<()> {
    if !input.exists() {
        anyhow::bail!("Input file does not exist: {}", input.display());
    }
    let output = output.unwrap_or_else(|| input.with_extension("csv"));

    let run = read_dvs_file(&input, DvsOptions::default())
        .with_context(|| format!("Failed to read {}", input.display()))?;

    info!("Input:  {}", input.display());
    info!("Output: {}", output.display());

    let file = std::fs::File::create(&output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    run.data.write_csv(file).context("CSV export failed")?;

    info!("Exported {} rows", run.data.n_rows());
    Ok(())
}

/// Detect change points in one channel of a sorption run
fn run_changepoints(
    file: PathBuf,
    column: String,
    method: String,
    pen: f64,
    min_size: usize,
    width: usize,
) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("Input file does not exist: {}", file.display());
    }
    let method: Method = method.parse()?;
    let params = DetectionParams {
        pen,
        min_size,
        width,
    };

    let run = read_dvs_file(&file, DvsOptions::default())
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let series = run
        .data
        .require_column(&column)
        .with_context(|| format!("Channel `{column}` not present"))?;

    let points = detect(series, method, &params)?;
    info!("{} change points in {} rows", points.len(), series.len());
    for index in points.indices() {
        println!("{index}");
    }
    Ok(())
}

/// Aggregate a sorption run into isotherm points
#[allow(clippy::too_many_arguments)]
fn run_isotherm(
    input: PathBuf,
    output: PathBuf,
    target_column: String,
    pressure_column: String,
    loading_column: String,
    baseline: Option<String>,
    baseline_dir: PathBuf,
    mass: Option<f64>,
) -> Result<()> {
    if !input.exists() {
        anyhow::bail!("Input file does not exist: {}", input.display());
    }

    let run = read_dvs_file(&input, DvsOptions::default())
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let target = run
        .data
        .require_column(&target_column)
        .with_context(|| format!("Channel `{target_column}` not present"))?;

    let points = detect(target, Method::Derivative, &DetectionParams::default())?;
    info!("{} equilibrium plateaus detected", points.len());

    let iso = average_at_change_points(
        &run.data,
        &pressure_column,
        &loading_column,
        &points,
        &[],
        WindowConfig::default(),
    )?;

    // Assemble output columns: raw isotherm, then the optional corrections.
    let mut columns: Vec<(String, Vec<f64>)> = vec![
        ("pressure".to_string(), iso.require_column("pressure")?.to_vec()),
        ("loading".to_string(), iso.require_column("loading")?.to_vec()),
    ];

    if let Some(name) = baseline {
        let library = BaselineLibrary::new(baseline_dir);
        let reference = library
            .load(&name)
            .with_context(|| format!("Failed to load baseline `{name}`"))?;
        let corrected = remove_baseline(&iso, &reference, Interpolation::Linear, 0.0)?;
        columns.push(("loading_corrected".to_string(), corrected));
        info!("baseline `{name}` subtracted");
    }

    if let Some(m0) = mass {
        let source = columns.last().map(|(_, c)| c.clone()).unwrap_or_default();
        columns.push(("loading_normalized".to_string(), normalize_loading(&source, m0)));
    }

    let mut out = labproc::table::DataTable::new(columns.iter().map(|(n, _)| n.clone()));
    for i in 0..iso.n_rows() {
        let row: Vec<f64> = columns.iter().map(|(_, c)| c[i]).collect();
        out.push_row(&row)?;
    }

    let file = std::fs::File::create(&output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    out.write_csv(file).context("CSV export failed")?;
    info!("Wrote {} isotherm points to {}", out.n_rows(), output.display());
    Ok(())
}
