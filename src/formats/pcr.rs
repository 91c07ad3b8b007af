//! # FullProf `.pcr` control-file parser (multipattern layout)
//!
//! A `.pcr` file drives a Rietveld refinement: global job flags, one block
//! per diffraction pattern, then one block per crystallographic phase. The
//! format is strictly line-positional; after stripping `!` comment lines,
//! every record sits at a fixed offset determined by the counts declared in
//! earlier records. Only the multipattern layout is handled.
//!
//! Fields are parsed into typed structs rather than a string map, so a value
//! found at a wrong offset fails as a [`ParseError::MalformedRow`] naming
//! the line and field instead of silently landing in the wrong slot.
//!
//! Unsupported format selectors - a non-zero `scattering_unit`, a
//! non-polynomial background - fail as [`ParseError::UnsupportedVariant`].

use std::path::Path;

use crate::physics::cell::CrystalCell;

use super::{display_path, ParseError};

/// Global refinement flags (line 4 of the stripped file).
#[derive(Debug, Clone, Default)]
pub struct GlobalFlags {
    /// Number of phases in the file.
    pub n_phases: i64,
    /// Divergence-correction flag.
    pub divergence: i64,
    /// Reflection-reordering flag.
    pub reflection_reorder: i64,
    /// Single-crystal-job flag.
    pub single_crystal_job: i64,
    /// Optimisation flag.
    pub optimisations: i64,
    /// Automatic-refinement flag.
    pub automatic_refine: i64,
}

/// Global output flags.
#[derive(Debug, Clone, Default)]
pub struct OutputFlags {
    /// Write the correlation matrix.
    pub correlation_matrix: i64,
    /// Update the `.pcr` file after refinement.
    pub update_pcr: i64,
    /// NLI output flag.
    pub nli: i64,
    /// Write a symmetry file.
    pub sym_file: i64,
    /// RPa output flag.
    pub rpa: i64,
    /// Reduced-verbosity flag.
    pub reduced_verbose: i64,
}

/// Global refinement settings.
#[derive(Debug, Clone, Default)]
pub struct RefinementSettings {
    /// Number of refinement cycles.
    pub cycles: i64,
    /// Convergence criterion.
    pub convergence: f64,
    /// Relaxation factor for atomic parameters.
    pub r_atomic: f64,
    /// Relaxation factor for anisotropic parameters.
    pub r_anisotropic: f64,
    /// Relaxation factor for profile parameters.
    pub r_profile: f64,
    /// Relaxation factor for global parameters.
    pub r_global: f64,
}

/// The 14 job flags of one pattern.
#[derive(Debug, Clone, Default)]
pub struct PatternFlags {
    /// Job type (X-ray/neutron selector).
    pub job_type: i64,
    /// Peak-shape profile selector.
    pub profile_type: i64,
    /// Background model selector (0 = polynomial).
    pub background_type: i64,
    /// Number of excluded regions for this pattern.
    pub excluded_regions: i64,
    /// User-defined scattering-factor flag.
    pub scatter_factor_userdef: i64,
    /// Preferred-orientation model selector.
    pub preferred_orientation_type: i64,
    /// Refinement weighting scheme.
    pub refine_weighting_type: i64,
    /// Lorentz-polarization correction selector.
    pub lorentz_polar_corr: i64,
    /// Resolution-function selector.
    pub resolution_function_type: i64,
    /// Data-reduction factor.
    pub reduction_factor: i64,
    /// Scattering unit (0 = 2θ; other units unsupported).
    pub scattering_unit: i64,
    /// Intensity-correction selector.
    pub intensity_corr: i64,
    /// ANM flag.
    pub anm: i64,
    /// INT flag.
    pub int_corr: i64,
}

/// Per-pattern output flags (11 values).
#[derive(Debug, Clone, Default)]
pub struct PatternOutputFlags {
    /// Integrated-intensity output.
    pub integrated: i64,
    /// PPL output.
    pub ppl: i64,
    /// IOC output.
    pub ioc: i64,
    /// LS1 output.
    pub ls1: i64,
    /// LS2 output.
    pub ls2: i64,
    /// LS3 output.
    pub ls3: i64,
    /// PRF (observed/calculated profile) output.
    pub prf: i64,
    /// INS output.
    pub ins: i64,
    /// HKL list output.
    pub hkl: i64,
    /// Fourier-map output.
    pub fou: i64,
    /// Analysis output.
    pub ana: i64,
}

/// Per-pattern experiment settings (wavelengths and corrections).
#[derive(Debug, Clone, Default)]
pub struct ExperimentSettings {
    /// Primary wavelength [Å].
    pub lambda_1: f64,
    /// Secondary wavelength [Å].
    pub lambda_2: f64,
    /// Intensity ratio of the two wavelengths.
    pub lambda_ratio: f64,
    /// Angle below which background is not refined.
    pub background_start: f64,
    /// Profile cutoff in FWHM units.
    pub profile_cutoff: f64,
    /// Monochromator polarization correction.
    pub monochromator_polarization: f64,
    /// Absorption correction.
    pub absorption_corr: f64,
    /// Angular limit of the asymmetry correction.
    pub asymmetry_corr_limit: f64,
    /// Polarization factor.
    pub polarization_factor: f64,
    /// Second μR absorption parameter.
    pub mu_r: f64,
}

/// Per-pattern angular range.
#[derive(Debug, Clone, Default)]
pub struct PatternRange {
    /// First 2θ value [deg].
    pub theta_min: f64,
    /// Step width [deg].
    pub step: f64,
    /// Last 2θ value [deg].
    pub theta_max: f64,
    /// Incident beam angle.
    pub incident_angle: f64,
    /// Maximum beam angle.
    pub max_beam_angle: f64,
}

/// Instrument calibration block (scattering unit 0 only).
#[derive(Debug, Clone, Default)]
pub struct Calibration {
    /// Zero-point shift [deg].
    pub zero_point: f64,
    /// Refinement code of the zero point.
    pub zero_point_code: f64,
    /// Systematic cos-θ shift.
    pub shift_cos: f64,
    /// Refinement code of the cos shift.
    pub shift_cos_code: f64,
    /// Systematic sin-2θ shift.
    pub shift_sin: f64,
    /// Refinement code of the sin shift.
    pub shift_sin_code: f64,
    /// Wavelength [Å].
    pub wavelength: f64,
    /// Refinement code of the wavelength.
    pub wavelength_code: f64,
    /// The file carried (and the parser skipped) a microabsorption line.
    pub has_microabsorption: bool,
}

/// One diffraction pattern block.
#[derive(Debug, Clone, Default)]
pub struct PcrPattern {
    /// Whether the pattern participates in the refinement.
    pub is_refined: bool,
    /// Weight of the pattern in the combined refinement.
    pub weight: f64,
    /// The 14 job flags.
    pub flags: PatternFlags,
    /// Data file this pattern refines against.
    pub filename: String,
    /// Output flags.
    pub output: PatternOutputFlags,
    /// Wavelengths and corrections.
    pub experiment: ExperimentSettings,
    /// Angular range.
    pub range: PatternRange,
    /// Excluded 2θ regions as `(low, high)` pairs.
    pub excluded: Vec<(f64, f64)>,
    /// Calibration block (present for scattering unit 0).
    pub calibration: Option<Calibration>,
    /// Polynomial background coefficients.
    pub background_poly: Vec<f64>,
    /// Refinement codes of the background coefficients.
    pub background_code: Vec<f64>,
}

/// One atom site of a phase.
#[derive(Debug, Clone, Default)]
pub struct PcrAtom {
    /// Site label.
    pub label: String,
    /// Chemical species symbol.
    pub symbol: String,
    /// Fractional x coordinate.
    pub x: f64,
    /// Fractional y coordinate.
    pub y: f64,
    /// Fractional z coordinate.
    pub z: f64,
    /// Isotropic displacement parameter.
    pub biso: f64,
    /// Site occupancy.
    pub occupancy: f64,
    /// First symmetry-substitution index.
    pub symmetry_subs_in: i64,
    /// Last symmetry-substitution index.
    pub symmetry_subs_fin: i64,
    /// Isotropic-displacement type selector.
    pub isotropic_type: i64,
    /// Species index.
    pub specie: i64,
    /// Refinement codes for x, y, z, Biso, occupancy.
    pub codes: Vec<String>,
}

/// Per-phase, per-pattern profile parameters.
#[derive(Debug, Clone, Default)]
pub struct PhasePattern {
    /// Whether this phase contributes to this pattern.
    pub contributes: bool,
    /// Number of reflections.
    pub reflections: i64,
    /// Profile selector for this contribution.
    pub profile_type: i64,
    /// Job type for this contribution.
    pub job_type: i64,
    /// Nsp_Ref flag.
    pub nsp_ref: i64,
    /// Phase-shift flag.
    pub phase_shift: i64,
    /// Preferred-orientation direction (d1, d2, d3).
    pub preferred_orientation: [f64; 3],
    /// Brindley absorption coefficient.
    pub brindley_coeff: f64,
    /// Weight of integrated-intensity data.
    pub intensity_data_weight: f64,
    /// Integrated-intensity exclusion threshold.
    pub intensity_exclusion: f64,
    /// χ² weight of the intensity data.
    pub chi2_weight: f64,
    /// Scale factor.
    pub scale: f64,
    /// Peak-shape parameter.
    pub shape: f64,
    /// Overall isotropic displacement.
    pub biso_overall: f64,
    /// Strain parameters 1-3.
    pub strain: [f64; 3],
    /// Strain-model selector.
    pub strain_model: i64,
    /// Caglioti halfwidth U.
    pub halfwidth_u: f64,
    /// Caglioti halfwidth V.
    pub halfwidth_v: f64,
    /// Caglioti halfwidth W.
    pub halfwidth_w: f64,
    /// Lorentzian strain X.
    pub lorentzian_strain_x: f64,
    /// Lorentzian strain Y.
    pub lorentzian_strain_y: f64,
    /// Gaussian particle-size parameter.
    pub gaussian_size: f64,
    /// Lorentzian particle-size parameter.
    pub lorentzian_size: f64,
    /// Preferred-orientation parameters 1 and 2.
    pub orientation: [f64; 2],
    /// Asymmetry parameters 1-4.
    pub asymmetry: [f64; 4],
}

/// One crystallographic phase block.
#[derive(Debug, Clone, Default)]
pub struct PcrPhase {
    /// Phase name.
    pub name: String,
    /// Number of atom sites.
    pub n_atoms: i64,
    /// Number of distance constraints.
    pub n_distance_constraints: i64,
    /// Number of angle (or magnetic-moment) constraints.
    pub n_angle_constraints: i64,
    /// Job type of the phase.
    pub job_type: i64,
    /// Symmetry-reading mode.
    pub symmetry_reading_mode: i64,
    /// Size/strain model selector.
    pub size_strain_mode: i64,
    /// Number of user-defined parameters.
    pub n_userdef_parameters: i64,
    /// Weight coefficient of the phase.
    pub weight_coeff: f64,
    /// Number of propagation vectors.
    pub n_propagation_vectors: i64,
    /// Space-group symbol (first 21 columns of its line).
    pub space_group: String,
    /// Atom sites.
    pub atoms: Vec<PcrAtom>,
    /// Per-pattern contribution parameters.
    pub patterns: Vec<PhasePattern>,
    /// Unit-cell parameters.
    pub cell: CrystalCell,
    /// Refinement codes of the six cell parameters.
    pub cell_codes: Vec<f64>,
}

/// One parsed `.pcr` control file.
#[derive(Debug, Clone, Default)]
pub struct PcrFile {
    /// Job title (first non-comment line).
    pub name: String,
    /// Global refinement flags.
    pub flags: GlobalFlags,
    /// Global output flags.
    pub output: OutputFlags,
    /// Refinement settings.
    pub refinement: RefinementSettings,
    /// Number of refined parameters declared in the file.
    pub n_refined: i64,
    /// Diffraction patterns.
    pub patterns: Vec<PcrPattern>,
    /// Crystallographic phases.
    pub phases: Vec<PcrPhase>,
    /// Trailing plot-pattern selector values.
    pub plot_pattern: Vec<f64>,
}

/// Line cursor over the comment-stripped file, remembering source line numbers.
struct Cursor<'a> {
    file: &'a str,
    lines: Vec<(usize, &'a str)>,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(file: &'a str, text: &'a str) -> Self {
        let lines = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.starts_with('!'))
            .map(|(idx, line)| (idx + 1, line))
            .collect();
        Self {
            file,
            lines,
            pos: 0,
        }
    }

    fn next(&mut self, context: &str) -> Result<(usize, &'a str), ParseError> {
        let entry = self.lines.get(self.pos).copied();
        self.pos += 1;
        entry.ok_or_else(|| ParseError::UnexpectedEof {
            file: self.file.to_string(),
            context: context.to_string(),
        })
    }

    fn fields(&mut self, context: &str) -> Result<Fields<'a>, ParseError> {
        let (line_no, line) = self.next(context)?;
        Ok(Fields {
            file: self.file.to_string(),
            line_no,
            tokens: line.split_whitespace().collect(),
        })
    }
}

/// Whitespace-split tokens of one line, with positional typed accessors.
struct Fields<'a> {
    file: String,
    line_no: usize,
    tokens: Vec<&'a str>,
}

impl<'a> Fields<'a> {
    fn raw(&self, idx: usize, field: &str) -> Result<&'a str, ParseError> {
        self.tokens.get(idx).copied().ok_or_else(|| {
            ParseError::malformed(&self.file, self.line_no, field, "<absent>")
        })
    }

    fn f64(&self, idx: usize, field: &str) -> Result<f64, ParseError> {
        let raw = self.raw(idx, field)?;
        raw.parse::<f64>()
            .map_err(|_| ParseError::malformed(&self.file, self.line_no, field, raw))
    }

    fn i64(&self, idx: usize, field: &str) -> Result<i64, ParseError> {
        let raw = self.raw(idx, field)?;
        raw.parse::<i64>()
            .map_err(|_| ParseError::malformed(&self.file, self.line_no, field, raw))
    }

    fn string(&self, idx: usize, field: &str) -> Result<String, ParseError> {
        Ok(self.raw(idx, field)?.to_string())
    }

    fn all_f64(&self, field: &str) -> Result<Vec<f64>, ParseError> {
        self.tokens
            .iter()
            .map(|raw| {
                raw.parse::<f64>()
                    .map_err(|_| ParseError::malformed(&self.file, self.line_no, field, raw))
            })
            .collect()
    }
}

/// Parse a multipattern FullProf `.pcr` control file.
pub fn read_pcr_file(path: impl AsRef<Path>) -> Result<PcrFile, ParseError> {
    let path = path.as_ref();
    let file = display_path(path);
    let text = std::fs::read_to_string(path)?;
    parse_pcr(&file, &text)
}

/// Parse `.pcr` content already in memory. See [`read_pcr_file`].
pub fn parse_pcr(file: &str, text: &str) -> Result<PcrFile, ParseError> {
    let mut cursor = Cursor::new(file, text);
    let mut pcr = PcrFile::default();

    // Job title.
    let (_, name) = cursor.next("job title")?;
    pcr.name = name.trim().to_string();

    // Pattern count and per-pattern refinement flags.
    let patt = cursor.fields("pattern count line")?;
    let n_patterns = patt.i64(1, "npatt")? as usize;
    let mut patterns = vec![PcrPattern::default(); n_patterns];
    for (n, pattern) in patterns.iter_mut().enumerate() {
        pattern.is_refined = patt.i64(n + 2, "pattern refinement flag")? != 0;
    }

    // Pattern weights (first token is a label).
    let weights = cursor.fields("pattern weights")?;
    for (n, pattern) in patterns.iter_mut().enumerate() {
        pattern.weight = weights.f64(n + 1, "pattern weight")?;
    }

    // Global flags.
    let flags = cursor.fields("global flags")?;
    pcr.flags = GlobalFlags {
        n_phases: flags.i64(0, "n_phases")?,
        divergence: flags.i64(1, "divergence")?,
        reflection_reorder: flags.i64(2, "reflection_reorder")?,
        single_crystal_job: flags.i64(3, "single_crystal_job")?,
        optimisations: flags.i64(4, "optimisations")?,
        automatic_refine: flags.i64(5, "automatic_refine")?,
    };

    // Per-pattern job flags.
    for pattern in &mut patterns {
        let f = cursor.fields("pattern flags")?;
        pattern.flags = PatternFlags {
            job_type: f.i64(0, "job_type")?,
            profile_type: f.i64(1, "profile_type")?,
            background_type: f.i64(2, "background_type")?,
            excluded_regions: f.i64(3, "excluded_regions")?,
            scatter_factor_userdef: f.i64(4, "scatter_factor_userdef")?,
            preferred_orientation_type: f.i64(5, "preferred_orientation_type")?,
            refine_weighting_type: f.i64(6, "refine_weighting_type")?,
            lorentz_polar_corr: f.i64(7, "lorentz_polar_corr")?,
            resolution_function_type: f.i64(8, "resolution_function_type")?,
            reduction_factor: f.i64(9, "reduction_factor")?,
            scattering_unit: f.i64(10, "scattering_unit")?,
            intensity_corr: f.i64(11, "intensity_corr")?,
            anm: f.i64(12, "anm")?,
            int_corr: f.i64(13, "int_corr")?,
        };
    }

    // Per-pattern data filenames.
    for pattern in &mut patterns {
        let (_, line) = cursor.next("pattern data filename")?;
        pattern.filename = line.trim().to_string();
    }

    // Global output flags.
    let out = cursor.fields("output flags")?;
    pcr.output = OutputFlags {
        correlation_matrix: out.i64(0, "out_correlation_matrix")?,
        update_pcr: out.i64(1, "out_update_pcr")?,
        nli: out.i64(2, "out_nli")?,
        sym_file: out.i64(3, "out_sym_file")?,
        rpa: out.i64(4, "out_rpa")?,
        reduced_verbose: out.i64(5, "out_reduced_verbose")?,
    };

    // Per-pattern output flags.
    for pattern in &mut patterns {
        let f = cursor.fields("pattern output flags")?;
        pattern.output = PatternOutputFlags {
            integrated: f.i64(0, "out_integrated")?,
            ppl: f.i64(1, "out_ppl")?,
            ioc: f.i64(2, "out_ioc")?,
            ls1: f.i64(3, "out_ls1")?,
            ls2: f.i64(4, "out_ls2")?,
            ls3: f.i64(5, "out_ls3")?,
            prf: f.i64(6, "out_prf")?,
            ins: f.i64(7, "out_ins")?,
            hkl: f.i64(8, "out_hkl")?,
            fou: f.i64(9, "out_fou")?,
            ana: f.i64(10, "out_ana")?,
        };
    }

    // Per-pattern experiment settings.
    for pattern in &mut patterns {
        let f = cursor.fields("experiment settings")?;
        pattern.experiment = ExperimentSettings {
            lambda_1: f.f64(0, "lambda_1")?,
            lambda_2: f.f64(1, "lambda_2")?,
            lambda_ratio: f.f64(2, "lambda_ratio")?,
            background_start: f.f64(3, "background_start")?,
            profile_cutoff: f.f64(4, "profile_cutoff")?,
            monochromator_polarization: f.f64(5, "monochromator_polarization")?,
            absorption_corr: f.f64(6, "absorption_corr")?,
            asymmetry_corr_limit: f.f64(7, "asymmetry_corr_limit")?,
            polarization_factor: f.f64(8, "polarization_factor")?,
            mu_r: f.f64(9, "mu_r")?,
        };
    }

    // Refinement settings.
    let f = cursor.fields("refinement settings")?;
    pcr.refinement = RefinementSettings {
        cycles: f.i64(0, "ref_cycles")?,
        convergence: f.f64(1, "ref_convergence")?,
        r_atomic: f.f64(2, "ref_r_atomic")?,
        r_anisotropic: f.f64(3, "ref_r_anisotropic")?,
        r_profile: f.f64(4, "ref_r_profile")?,
        r_global: f.f64(5, "ref_r_global")?,
    };

    // Per-pattern angular ranges.
    for pattern in &mut patterns {
        let f = cursor.fields("pattern range")?;
        pattern.range = PatternRange {
            theta_min: f.f64(0, "theta_min")?,
            step: f.f64(1, "step")?,
            theta_max: f.f64(2, "theta_max")?,
            incident_angle: f.f64(3, "incident_angle")?,
            max_beam_angle: f.f64(4, "max_beam_angle")?,
        };
    }

    // Excluded regions. A pattern with none still reserves one line.
    for pattern in &mut patterns {
        let n_excluded = pattern.flags.excluded_regions;
        if n_excluded != 0 {
            for _ in 0..n_excluded {
                let f = cursor.fields("excluded region")?;
                pattern
                    .excluded
                    .push((f.f64(0, "excluded_low")?, f.f64(1, "excluded_high")?));
            }
        } else {
            cursor.next("excluded region placeholder")?;
        }
    }

    // Refined-parameter count.
    let f = cursor.fields("refined parameter count")?;
    pcr.n_refined = f.i64(0, "n_refined")?;

    // Per-pattern powder-data setup and background.
    for pattern in &mut patterns {
        match pattern.flags.scattering_unit {
            0 => {
                let f = cursor.fields("calibration")?;
                let mut calibration = Calibration {
                    zero_point: f.f64(0, "zero_point")?,
                    zero_point_code: f.f64(1, "zero_point_code")?,
                    shift_cos: f.f64(2, "shift_cos")?,
                    shift_cos_code: f.f64(3, "shift_cos_code")?,
                    shift_sin: f.f64(4, "shift_sin")?,
                    shift_sin_code: f.f64(5, "shift_sin_code")?,
                    wavelength: f.f64(6, "wavelength")?,
                    wavelength_code: f.f64(7, "wavelength_code")?,
                    has_microabsorption: false,
                };
                if f.f64(8, "more_flag")? != 0.0 {
                    // Microabsorption parameters are not interpreted.
                    calibration.has_microabsorption = true;
                    cursor.next("microabsorption line")?;
                }
                pattern.calibration = Some(calibration);
            }
            other => {
                return Err(ParseError::unsupported("scattering_unit", other));
            }
        }

        match pattern.flags.background_type {
            0 => {
                pattern.background_poly = cursor
                    .fields("background coefficients")?
                    .all_f64("background_poly")?;
                pattern.background_code = cursor
                    .fields("background codes")?
                    .all_f64("background_code")?;
            }
            other => {
                return Err(ParseError::unsupported("background_type", other));
            }
        }
    }

    // Phase blocks.
    for _ in 0..pcr.flags.n_phases {
        pcr.phases
            .push(parse_phase(&mut cursor, n_patterns)?);
    }

    // Trailing plot-pattern selector.
    pcr.plot_pattern = cursor.fields("plot pattern")?.all_f64("plot_pattern")?;

    pcr.patterns = patterns;
    Ok(pcr)
}

fn parse_phase(cursor: &mut Cursor<'_>, n_patterns: usize) -> Result<PcrPhase, ParseError> {
    let mut phase = PcrPhase::default();

    let (_, name) = cursor.next("phase name")?;
    phase.name = name.trim().to_string();

    let codes = cursor.fields("phase codes")?;
    phase.n_atoms = codes.i64(0, "n_atoms")?;
    phase.n_distance_constraints = codes.i64(1, "n_distance_constraints")?;
    phase.n_angle_constraints = codes.i64(2, "n_angle_constraints")?;
    phase.job_type = codes.i64(3, "phase_job_type")?;
    phase.symmetry_reading_mode = codes.i64(4, "symmetry_reading_mode")?;
    phase.size_strain_mode = codes.i64(5, "size_strain_mode")?;
    phase.n_userdef_parameters = codes.i64(6, "n_userdef_parameters")?;
    phase.weight_coeff = codes.f64(7, "weight_coeff")?;
    phase.n_propagation_vectors = codes.i64(8, "n_propagation_vectors")?;
    let more = codes.i64(9, "phase_more_flag")?;
    if more != 0 {
        return Err(ParseError::unsupported("phase continuation flag", more));
    }

    // Contribution line: one flag per pattern.
    let contrib = cursor.fields("phase contributions")?;
    let mut phase_patterns = vec![PhasePattern::default(); n_patterns];
    for (n, pp) in phase_patterns.iter_mut().enumerate() {
        pp.contributes = contrib.i64(n, "contributes")? != 0;
    }

    if phase_patterns.iter().any(|pp| pp.contributes) {
        for pp in &mut phase_patterns {
            let ints = cursor.fields("phase pattern flags")?;
            pp.reflections = ints.i64(0, "reflections")?;
            pp.profile_type = ints.i64(1, "phase_profile_type")?;
            pp.job_type = ints.i64(2, "phase_pattern_job_type")?;
            pp.nsp_ref = ints.i64(3, "nsp_ref")?;
            pp.phase_shift = ints.i64(4, "phase_shift")?;

            let floats = cursor.fields("phase pattern parameters")?;
            pp.preferred_orientation = [
                floats.f64(0, "preferred_orientation_d1")?,
                floats.f64(1, "preferred_orientation_d2")?,
                floats.f64(2, "preferred_orientation_d3")?,
            ];
            pp.brindley_coeff = floats.f64(3, "brindley_coeff")?;
            pp.intensity_data_weight = floats.f64(4, "intensity_data_weight")?;
            pp.intensity_exclusion = floats.f64(5, "intensity_exclusion")?;
            pp.chi2_weight = floats.f64(6, "chi2_weight")?;
        }
    } else {
        cursor.next("phase pattern placeholder")?;
    }

    // Space group lives in the first 21 columns of its line.
    let (_, sg_line) = cursor.next("space group")?;
    phase.space_group = sg_line.chars().take(21).collect::<String>().trim().to_string();

    // Atom sites: two lines each.
    for _ in 0..phase.n_atoms {
        let f = cursor.fields("atom site")?;
        let codes = cursor.fields("atom codes")?;
        phase.atoms.push(PcrAtom {
            label: f.string(0, "atom_label")?,
            symbol: f.string(1, "atom_symbol")?,
            x: f.f64(2, "atom_x")?,
            y: f.f64(3, "atom_y")?,
            z: f.f64(4, "atom_z")?,
            biso: f.f64(5, "atom_biso")?,
            occupancy: f.f64(6, "atom_occ")?,
            symmetry_subs_in: f.i64(7, "symmetry_subs_in")?,
            symmetry_subs_fin: f.i64(8, "symmetry_subs_fin")?,
            isotropic_type: f.i64(9, "isotropic_type")?,
            specie: f.i64(10, "specie")?,
            codes: (0..5)
                .map(|i| codes.string(i, "atom_code"))
                .collect::<Result<_, _>>()?,
        });
    }

    // Per-pattern profile, cell and orientation blocks.
    for pp in &mut phase_patterns {
        let profile_1 = cursor.fields("profile parameters")?;
        cursor.next("profile parameter codes")?;
        let profile_2 = cursor.fields("halfwidth parameters")?;
        cursor.next("halfwidth parameter codes")?;

        pp.scale = profile_1.f64(0, "scale")?;
        pp.shape = profile_1.f64(1, "shape")?;
        pp.biso_overall = profile_1.f64(2, "biso_overall")?;
        pp.strain = [
            profile_1.f64(3, "strain_param1")?,
            profile_1.f64(4, "strain_param2")?,
            profile_1.f64(5, "strain_param3")?,
        ];
        pp.strain_model = profile_1.i64(6, "strain_model")?;

        pp.halfwidth_u = profile_2.f64(0, "halfwidth_u")?;
        pp.halfwidth_v = profile_2.f64(1, "halfwidth_v")?;
        pp.halfwidth_w = profile_2.f64(2, "halfwidth_w")?;
        pp.lorentzian_strain_x = profile_2.f64(3, "lorentzian_strain_x")?;
        pp.lorentzian_strain_y = profile_2.f64(4, "lorentzian_strain_y")?;
        pp.gaussian_size = profile_2.f64(5, "gaussian_size")?;
        pp.lorentzian_size = profile_2.f64(6, "lorentzian_size")?;

        let cell = cursor.fields("cell parameters")?;
        let cell_codes = cursor.fields("cell parameter codes")?;
        phase.cell = CrystalCell {
            a: cell.f64(0, "cell_a")?,
            b: cell.f64(1, "cell_b")?,
            c: cell.f64(2, "cell_c")?,
            alpha: cell.f64(3, "cell_alpha")?,
            beta: cell.f64(4, "cell_beta")?,
            gamma: cell.f64(5, "cell_gamma")?,
        };
        phase.cell_codes = cell_codes.all_f64("cell_code")?;

        let orientation = cursor.fields("orientation parameters")?;
        cursor.next("orientation parameter codes")?;
        pp.orientation = [
            orientation.f64(0, "orientation_param1")?,
            orientation.f64(1, "orientation_param2")?,
        ];
        pp.asymmetry = [
            orientation.f64(2, "asymmetry_param1")?,
            orientation.f64(3, "asymmetry_param2")?,
            orientation.f64(4, "asymmetry_param3")?,
            orientation.f64(5, "asymmetry_param4")?,
        ];
    }

    phase.patterns = phase_patterns;
    Ok(phase)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One pattern, one phase, one atom; every field a distinct value.
    const FIXTURE: &str = "\
COMM  nacl_compression
! comment line to be stripped
NPATT 1 1
W_PAT 1.0
1 0 0 0 0 0
0 5 0 0 0 0 1 0 0 0 0 0 0 0
nacl_300K.dat
1 1 0 0 0 0
0 0 0 0 0 0 1 0 1 0 0
1.540560 1.544390 0.5 40.0 8.0 0.0 0.0 55.0 0.95 0.0
10 0.1 1.0 1.0 1.0 1.0
5.0 0.02 90.0 0.0 0.0
! no excluded regions, placeholder follows
0.00 0.00
12
0.0432 0.0 0.0 0.0 0.0 0.0 1.540560 0.0 0
12.5 -3.2 1.1 0.0 0.0 0.0
11.0 21.0 31.0 0.0 0.0 0.0
NaCl
1 0 0 0 0 0 0 1.0 0 0
1
0 7 0 0 0
1.0 0.0 0.0 0.0 1.0 0.0 1.0
F m -3 m              <- space group
Na1 NA 0.0 0.0 0.0 0.5 1.0 0 0 0 0
11.0 21.0 31.0 41.0 51.0
0.735 0.0 0.25 0.0 0.0 0.0 0
0.0 0.0 0.0 0.0 0.0 0.0 0.0
0.008 -0.004 0.006 0.011 0.0 0.0 0.0
0.0 0.0 0.0 0.0 0.0 0.0 0.0
5.6402 5.6402 5.6402 90.0 90.0 90.0
0.0 0.0 0.0 0.0 0.0 0.0
1.0 0.0 0.03 0.01 0.0 0.0
0.0 0.0 0.0 0.0 0.0 0.0
1
";

    #[test]
    fn test_parse_minimal_multipattern_fixture() {
        let pcr = parse_pcr("nacl.pcr", FIXTURE).unwrap();

        assert_eq!(pcr.name, "COMM  nacl_compression");
        assert_eq!(pcr.patterns.len(), 1);
        assert_eq!(pcr.flags.n_phases, 1);
        assert_eq!(pcr.n_refined, 12);

        let pattern = &pcr.patterns[0];
        assert!(pattern.is_refined);
        assert_eq!(pattern.weight, 1.0);
        assert_eq!(pattern.flags.profile_type, 5);
        assert_eq!(pattern.flags.scattering_unit, 0);
        assert_eq!(pattern.filename, "nacl_300K.dat");
        assert_eq!(pattern.output.prf, 1);
        assert_eq!(pattern.experiment.lambda_1, 1.540560);
        assert_eq!(pattern.experiment.asymmetry_corr_limit, 55.0);
        assert_eq!(pattern.range.theta_min, 5.0);
        assert_eq!(pattern.range.theta_max, 90.0);
        assert!(pattern.excluded.is_empty());
        let calibration = pattern.calibration.as_ref().unwrap();
        assert_eq!(calibration.zero_point, 0.0432);
        assert_eq!(calibration.wavelength, 1.540560);
        assert_eq!(pattern.background_poly, vec![12.5, -3.2, 1.1, 0.0, 0.0, 0.0]);

        let phase = &pcr.phases[0];
        assert_eq!(phase.name, "NaCl");
        assert_eq!(phase.space_group, "F m -3 m");
        assert_eq!(phase.n_atoms, 1);
        assert_eq!(phase.atoms[0].label, "Na1");
        assert_eq!(phase.atoms[0].biso, 0.5);
        assert_eq!(phase.atoms[0].codes, vec!["11.0", "21.0", "31.0", "41.0", "51.0"]);
        assert_eq!(phase.cell.a, 5.6402);
        assert_eq!(phase.cell.alpha, 90.0);

        let pp = &phase.patterns[0];
        assert!(pp.contributes);
        assert_eq!(pp.reflections, 0);
        assert_eq!(pp.profile_type, 7);
        assert_eq!(pp.scale, 0.735);
        assert_eq!(pp.biso_overall, 0.25);
        assert_eq!(pp.halfwidth_u, 0.008);
        assert_eq!(pp.halfwidth_w, 0.006);
        assert_eq!(pp.orientation, [1.0, 0.0]);
        assert_eq!(pp.asymmetry, [0.03, 0.01, 0.0, 0.0]);

        assert_eq!(pcr.plot_pattern, vec![1.0]);
    }

    #[test]
    fn test_malformed_numeric_field_is_flagged_not_misassigned() {
        // Corrupt the cell a parameter.
        let broken = FIXTURE.replace("5.6402 5.6402 5.6402", "oops 5.6402 5.6402");
        let err = parse_pcr("nacl.pcr", &broken).unwrap_err();
        assert!(matches!(err, ParseError::MalformedRow { ref field, ref value, .. }
            if field == "cell_a" && value == "oops"));
    }

    #[test]
    fn test_unsupported_scattering_unit() {
        // Flip the scattering_unit flag (11th of the 14 pattern flags).
        let broken = FIXTURE.replace(
            "0 5 0 0 0 0 1 0 0 0 0 0 0 0",
            "0 5 0 0 0 0 1 0 0 0 2 0 0 0",
        );
        let err = parse_pcr("nacl.pcr", &broken).unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedVariant { ref what, ref value }
            if what == "scattering_unit" && value == "2"));
    }

    #[test]
    fn test_truncated_file_reports_context() {
        let truncated: String = FIXTURE.lines().take(8).collect::<Vec<_>>().join("\n");
        let err = parse_pcr("nacl.pcr", &truncated).unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedEof { .. }));
    }
}
