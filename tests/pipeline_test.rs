//! Integration test for the sorption pipeline: DVS export → change points →
//! isotherm aggregation → baseline subtraction → CSV export.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use tempfile::{tempdir, TempDir};

use labproc::batch::run_batch;
use labproc::formats::dvs::{read_dvs_file, DvsOptions};
use labproc::formats::ParseError;
use labproc::isotherm::{
    average_at_change_points, remove_baseline, BaselineLibrary, Interpolation, WindowConfig,
};
use labproc::segment::{detect, DetectionParams, Method};

/// One synthetic DVS data row: 19 tab-separated channels.
fn dvs_row(time_min: f64, mass: f64, p_rel_tgt: f64, p_abs: f64) -> String {
    let mut fields = vec!["0.0".to_string(); 19];
    fields[0] = time_min.to_string();
    fields[1] = mass.to_string();
    fields[8] = p_rel_tgt.to_string();
    fields[11] = p_abs.to_string();
    fields.join("\t")
}

/// Write a structurally complete DVS export with the given data rows.
fn write_dvs_fixture(dir: &TempDir, name: &str, rows: &[String]) -> PathBuf {
    let path = dir.path().join(name);
    let mut f = File::create(&path).unwrap();
    writeln!(f, "DVS-Advantage-Plus-Data-File").unwrap();
    writeln!(f, "Method Name: sorption_25C").unwrap();
    writeln!(f, "Sample Name: MOF-303").unwrap();
    writeln!(f, "Sample Description: activated").unwrap();
    writeln!(f, "Initial Mass [mg]: 12.345").unwrap();
    writeln!(f, "Raw Data File Created: 14/01/2021 09:30:15").unwrap();
    writeln!(f, "User Name: analyst").unwrap();
    writeln!(f, "Vapour: Water").unwrap();
    writeln!(f, "Vapour Pressure [Torr]: 23.76").unwrap();
    writeln!(f, "Control Mode: flow").unwrap();
    for i in 0..7 {
        writeln!(f, "Padding {i}: x").unwrap();
    }
    for i in 0..24 {
        writeln!(f, "step noise {i}").unwrap();
    }
    writeln!(f, "{}", vec!["col"; 19].join("\t")).unwrap();
    for row in rows {
        writeln!(f, "{row}").unwrap();
    }
    path
}

/// Two pressure plateaus with stable mass levels.
fn two_step_rows() -> Vec<String> {
    let mut rows = Vec::new();
    for i in 0..40 {
        rows.push(dvs_row(i as f64 * 0.5, 10.0, 10.0, 2.0));
    }
    for i in 40..80 {
        rows.push(dvs_row(i as f64 * 0.5, 12.0, 20.0, 4.0));
    }
    rows
}

#[test]
fn test_dvs_to_isotherm_pipeline() {
    let dir = tempdir().unwrap();
    let path = write_dvs_fixture(&dir, "run.dvs", &two_step_rows());

    let run = read_dvs_file(&path, DvsOptions::default()).unwrap();
    assert_eq!(run.info.get("dvs_sample_name"), Some("MOF-303"));
    assert_eq!(run.data.n_rows(), 80);

    // Setpoint channel steps exactly once, plus the mandatory final index.
    let target = run.data.require_column("p_rel_tgt").unwrap();
    let points = detect(target, Method::Derivative, &DetectionParams::default()).unwrap();
    assert_eq!(points.indices(), &[40, 79]);

    // Each plateau collapses to one (pressure, loading) point.
    let iso = average_at_change_points(
        &run.data,
        "p_abs",
        "mass",
        &points,
        &[],
        WindowConfig::default(),
    )
    .unwrap();
    assert_eq!(iso.column("pressure").unwrap(), &[2.0, 4.0]);
    assert_eq!(iso.column("loading").unwrap(), &[10.0, 12.0]);

    // CSV export writes plain numeric columns.
    let mut buffer = Vec::new();
    iso.write_csv(&mut buffer).unwrap();
    let text = String::from_utf8(buffer).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("pressure,loading"));
    assert_eq!(lines.next(), Some("2,10"));
    assert_eq!(lines.next(), Some("4,12"));
}

#[test]
fn test_pipeline_with_baseline_subtraction() {
    let dir = tempdir().unwrap();
    let path = write_dvs_fixture(&dir, "run.dvs", &two_step_rows());

    // Empty-pan reference spanning the measured pressure range.
    let baseline_path = dir.path().join("empty_pan.csv");
    std::fs::write(&baseline_path, "pressure,loading\n0.0,0.0\n10.0,5.0\n").unwrap();

    let run = read_dvs_file(&path, DvsOptions::default()).unwrap();
    let target = run.data.require_column("p_rel_tgt").unwrap();
    let points = detect(target, Method::Derivative, &DetectionParams::default()).unwrap();
    let iso = average_at_change_points(
        &run.data,
        "p_abs",
        "mass",
        &points,
        &[],
        WindowConfig::default(),
    )
    .unwrap();

    let library = BaselineLibrary::new(dir.path());
    let reference = library.load("empty_pan.csv").unwrap();
    let corrected = remove_baseline(&iso, &reference, Interpolation::Linear, 0.0).unwrap();

    // Baseline is loading = pressure / 2 on [0, 10].
    assert_eq!(corrected, vec![9.0, 10.0]);
}

#[test]
fn test_batch_skips_malformed_file_and_reads_the_rest() {
    let dir = tempdir().unwrap();
    let good1 = write_dvs_fixture(&dir, "a.dvs", &two_step_rows());

    let bad_rows = vec![dvs_row(0.0, 10.0, 10.0, 2.0), "garbage row".to_string()];
    let bad = write_dvs_fixture(&dir, "b.dvs", &bad_rows);

    let good2 = write_dvs_fixture(&dir, "c.dvs", &two_step_rows());

    let outcome = run_batch(&[good1, bad.clone(), good2], |path| {
        read_dvs_file(path, DvsOptions::default())
    });

    assert_eq!(outcome.successes.len(), 2);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].path, bad);
    assert!(matches!(
        outcome.failures[0].error,
        ParseError::MalformedRow { .. }
    ));
}

#[test]
fn test_extra_columns_are_carried_through() {
    let dir = tempdir().unwrap();
    let path = write_dvs_fixture(&dir, "run.dvs", &two_step_rows());
    let run = read_dvs_file(&path, DvsOptions::default()).unwrap();

    let target = run.data.require_column("p_rel_tgt").unwrap();
    let points = detect(target, Method::Derivative, &DetectionParams::default()).unwrap();

    let iso = average_at_change_points(
        &run.data,
        "p_abs",
        "mass",
        &points,
        &["p_rel_tgt"],
        WindowConfig::default(),
    )
    .unwrap();
    assert_eq!(iso.names(), &["pressure", "loading", "p_rel_tgt"]);
    assert_eq!(iso.column("p_rel_tgt").unwrap(), &[10.0, 20.0]);
}
