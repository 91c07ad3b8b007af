//! # JANA `.m41` refinement-result reader
//!
//! JANA2006 writes powder-refinement results to an `.m41` file laid out as
//! three blocks: a starred marker line opens the refined-values block, a
//! first dashed line opens the standard-uncertainty block, and a second
//! dashed line closes it. The two blocks have identical internal layout, so
//! the uncertainty of any value sits at the same offset from its block start
//! as the value itself.
//!
//! Within a block, keyword lines (`Cell`, `Gaussian`, `Lorentzian`) announce
//! that the following line carries the corresponding parameters. Value lines
//! end in a refinement-flag token that is dropped; uncertainty lines do not.

use std::path::Path;

use crate::physics::cell::CrystalCell;

use super::{display_path, ParseError};

/// Zero-point and systematic-shift corrections.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shifts {
    /// Zero-point shift [deg 2θ].
    pub zero: f64,
    /// Systematic cos-θ shift.
    pub sycos: f64,
    /// Systematic sin-2θ shift.
    pub sysin: f64,
}

/// Gaussian (Caglioti) profile parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianProfile {
    /// Caglioti U.
    pub u: f64,
    /// Caglioti V.
    pub v: f64,
    /// Caglioti W.
    pub w: f64,
    /// Peakedness parameter P.
    pub p: f64,
}

/// Lorentzian profile parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LorentzianProfile {
    /// Lorentzian strain LX.
    pub lx: f64,
    /// Anisotropic part LXe.
    pub lx_e: f64,
    /// Lorentzian size LY.
    pub ly: f64,
    /// Anisotropic part LYe.
    pub ly_e: f64,
}

/// The parameter groups found in one phase section of one block.
///
/// All groups are optional: JANA only writes the groups a refinement used.
#[derive(Debug, Clone, Default)]
pub struct PhaseValues {
    /// Unit-cell parameters.
    pub cell: Option<CrystalCell>,
    /// Gaussian profile parameters.
    pub gaussian: Option<GaussianProfile>,
    /// Lorentzian profile parameters.
    pub lorentzian: Option<LorentzianProfile>,
}

/// One phase: refined values and their standard uncertainties.
#[derive(Debug, Clone, Default)]
pub struct M41Phase {
    /// Phase name, or `base` for a single unnamed phase.
    pub name: String,
    /// Refined values.
    pub values: PhaseValues,
    /// Standard uncertainties, same layout as `values`.
    pub su: PhaseValues,
}

/// One parsed `.m41` file.
#[derive(Debug, Clone)]
pub struct M41File {
    /// Zero-point and systematic shifts.
    pub shifts: Shifts,
    /// Per-phase values and uncertainties.
    pub phases: Vec<M41Phase>,
}

impl M41File {
    /// Look up a phase by name.
    pub fn phase(&self, name: &str) -> Option<&M41Phase> {
        self.phases.iter().find(|p| p.name == name)
    }
}

/// Read a JANA `.m41` refinement-result file.
pub fn read_m41_file(path: impl AsRef<Path>) -> Result<M41File, ParseError> {
    let path = path.as_ref();
    let file = display_path(path);
    let text = std::fs::read_to_string(path)?;
    parse_m41(&file, &text)
}

/// Parse `.m41` content already in memory. See [`read_m41_file`].
pub fn parse_m41(file: &str, text: &str) -> Result<M41File, ParseError> {
    let lines: Vec<&str> = text.lines().collect();

    let blk1 = lines
        .iter()
        .position(|l| l.contains("*******"))
        .ok_or_else(|| eof(file, "starred values-block marker"))?;
    let mut dashed = lines
        .iter()
        .enumerate()
        .skip(blk1)
        .filter(|(_, l)| l.contains("------"))
        .map(|(n, _)| n);
    let blk2 = dashed
        .next()
        .ok_or_else(|| eof(file, "first dashed uncertainty-block marker"))?;
    let blk3 = dashed
        .next()
        .ok_or_else(|| eof(file, "second dashed uncertainty-block marker"))?;

    let shifts_line = lines
        .get(blk1 + 2)
        .ok_or_else(|| eof(file, "shifts line"))?;
    let shifts = parse_floats(file, blk1 + 3, shifts_line, "shifts", 3, true)?;
    let shifts = Shifts {
        zero: shifts[0],
        sycos: shifts[1],
        sysin: shifts[2],
    };

    // Phase section starts inside the values block. A file with no named
    // phase sections holds a single unnamed phase whose parameters start at
    // a fixed offset from the block marker.
    let mut sections: Vec<(String, usize)> = lines[blk1..blk2]
        .iter()
        .enumerate()
        .filter(|(_, l)| l.contains("phase"))
        .map(|(n, l)| {
            let name = l
                .split_whitespace()
                .next_back()
                .unwrap_or("base")
                .to_string();
            (name, n + blk1)
        })
        .collect();
    if sections.is_empty() {
        sections.push(("base".to_string(), blk1 + 5));
    }

    let mut phases = Vec::with_capacity(sections.len());
    for (i, (name, start)) in sections.iter().enumerate() {
        let end = sections
            .get(i + 1)
            .map(|(_, s)| *s)
            .unwrap_or(blk2);

        // The uncertainty block mirrors the values block line for line.
        let su_start = start - blk1 + blk2;
        let su_end = end - blk1 + blk2;

        phases.push(M41Phase {
            name: name.clone(),
            values: parse_section(file, &lines, *start, end, true)?,
            su: parse_section(file, &lines, su_start, su_end.min(blk3), false)?,
        });
    }

    Ok(M41File { shifts, phases })
}

/// Scan one phase section for keyword lines and parse the line after each.
fn parse_section(
    file: &str,
    lines: &[&str],
    start: usize,
    end: usize,
    drop_flag: bool,
) -> Result<PhaseValues, ParseError> {
    let mut values = PhaseValues::default();

    for n in start..end.min(lines.len()) {
        let line = lines[n];
        if !line.contains("Cell") && !line.contains("Gaussian") && !line.contains("Lorentzian") {
            continue;
        }
        let value_line = lines
            .get(n + 1)
            .ok_or_else(|| eof(file, "parameter line after keyword"))?;
        let line_no = n + 2;

        if line.contains("Cell") {
            let v = parse_floats(file, line_no, value_line, "cell", 6, drop_flag)?;
            values.cell = Some(CrystalCell {
                a: v[0],
                b: v[1],
                c: v[2],
                alpha: v[3],
                beta: v[4],
                gamma: v[5],
            });
        } else if line.contains("Gaussian") {
            let v = parse_floats(file, line_no, value_line, "profile_gaussian", 4, drop_flag)?;
            values.gaussian = Some(GaussianProfile {
                u: v[0],
                v: v[1],
                w: v[2],
                p: v[3],
            });
        } else if line.contains("Lorentzian") {
            let v = parse_floats(file, line_no, value_line, "profile_lorentzian", 4, drop_flag)?;
            values.lorentzian = Some(LorentzianProfile {
                lx: v[0],
                lx_e: v[1],
                ly: v[2],
                ly_e: v[3],
            });
        }
    }

    Ok(values)
}

/// Parse `count` floats from a line, optionally dropping a trailing flag token.
fn parse_floats(
    file: &str,
    line_no: usize,
    line: &str,
    field: &str,
    count: usize,
    drop_flag: bool,
) -> Result<Vec<f64>, ParseError> {
    let mut tokens: Vec<&str> = line.split_whitespace().collect();
    if drop_flag {
        tokens.pop();
    }
    if tokens.len() < count {
        return Err(ParseError::malformed(file, line_no, field, line.trim()));
    }
    tokens
        .iter()
        .take(count)
        .map(|raw| {
            raw.parse::<f64>()
                .map_err(|_| ParseError::malformed(file, line_no, field, raw))
        })
        .collect()
}

fn eof(file: &str, context: &str) -> ParseError {
    ParseError::UnexpectedEof {
        file: file.to_string(),
        context: context.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two named phases; the uncertainty block mirrors the values block.
    const FIXTURE: &str = "\
header noise
*******   Powder parameters   *******
shifts follow
  0.0412   -0.0031    0.0008   000
background
  1.0 2.0 3.0  000
Powder profile parameters of phase quartz
Cell parameters
  4.9137   4.9137   5.4047  90.0  90.0 120.0  111111
Gaussian profile parameters
  0.012   -0.004    0.006   0.0  1110
Powder profile parameters of phase nacl
Cell parameters
  5.6402   5.6402   5.6402  90.0  90.0  90.0  111000
Lorentzian profile parameters
  0.031    0.0      0.008   0.0  1010
------   standard uncertainties   ------
shifts follow
  0.0004    0.0002    0.0001
background
  0.1 0.1 0.1
Powder profile parameters of phase quartz
Cell parameters
  0.0002   0.0002   0.0003   0.0   0.0   0.0
Gaussian profile parameters
  0.001    0.001    0.001    0.0
Powder profile parameters of phase nacl
Cell parameters
  0.0001   0.0001   0.0001   0.0   0.0   0.0
Lorentzian profile parameters
  0.002    0.0      0.001    0.0
------   end   ------
";

    #[test]
    fn test_parse_two_phase_file() {
        let m41 = parse_m41("ref.m41", FIXTURE).unwrap();

        assert_eq!(
            m41.shifts,
            Shifts {
                zero: 0.0412,
                sycos: -0.0031,
                sysin: 0.0008
            }
        );
        assert_eq!(m41.phases.len(), 2);

        let quartz = m41.phase("quartz").unwrap();
        let cell = quartz.values.cell.as_ref().unwrap();
        assert_eq!(cell.a, 4.9137);
        assert_eq!(cell.gamma, 120.0);
        let gauss = quartz.values.gaussian.unwrap();
        assert_eq!(gauss.u, 0.012);
        assert!(quartz.values.lorentzian.is_none());
        // Uncertainties mirror the values layout.
        assert_eq!(quartz.su.cell.as_ref().unwrap().c, 0.0003);
        assert_eq!(quartz.su.gaussian.unwrap().w, 0.001);

        let nacl = m41.phase("nacl").unwrap();
        assert_eq!(nacl.values.cell.as_ref().unwrap().a, 5.6402);
        assert_eq!(nacl.values.lorentzian.unwrap().lx, 0.031);
        assert_eq!(nacl.su.lorentzian.unwrap().lx, 0.002);
    }

    #[test]
    fn test_unnamed_phase_becomes_base() {
        let text = "\
*******   Powder parameters   *******
shifts follow
  0.01   0.0   0.0   000
background
  1.0  000
Cell parameters
  5.0   5.0   5.0  90.0  90.0  90.0  111111
------   standard uncertainties   ------
shifts follow
  0.001  0.0  0.0
background
  0.1
Cell parameters
  0.001  0.001  0.001  0.0  0.0  0.0
------   end   ------
";
        let m41 = parse_m41("ref.m41", text).unwrap();
        assert_eq!(m41.phases.len(), 1);
        let base = m41.phase("base").unwrap();
        assert_eq!(base.values.cell.as_ref().unwrap().a, 5.0);
        assert_eq!(base.su.cell.as_ref().unwrap().a, 0.001);
    }

    #[test]
    fn test_missing_uncertainty_marker() {
        let text = "*******\nx\n 0.0 0.0 0.0 000\n";
        let err = parse_m41("ref.m41", text).unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedEof { .. }));
    }

    #[test]
    fn test_short_cell_line_is_malformed() {
        let broken = FIXTURE.replace(
            "  4.9137   4.9137   5.4047  90.0  90.0 120.0  111111",
            "  4.9137   4.9137  111111",
        );
        let err = parse_m41("ref.m41", &broken).unwrap_err();
        assert!(matches!(err, ParseError::MalformedRow { ref field, .. }
            if field == "cell"));
    }
}
