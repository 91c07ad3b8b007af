//! # Change-point detection for step-wise time series
//!
//! Sorption experiments hold a setpoint constant, wait for equilibrium, and
//! step to the next setpoint. Everything downstream (isotherm aggregation,
//! scan alignment) consumes the step boundaries as a [`ChangePointSet`]:
//! sorted sample indices whose last entry is always the final index of the
//! series, so the points partition the series into half-open segments with
//! no special case for the tail.
//!
//! Three detectors cover the signals seen in practice:
//!
//! - [`Method::Derivative`] - exact, for setpoint channels that are
//!   genuinely piecewise constant (a target-pressure column).
//! - [`Method::Binseg`] - binary segmentation with an L2 cost, for measured
//!   channels with noise around stable levels.
//! - [`Method::Window`] - sliding-window L1 discrepancy, for drifting
//!   signals where a global L2 fit oversegments.
//!
//! NaN samples are treated as zero by all detectors.

use std::str::FromStr;

/// Errors from change-point detection.
#[derive(Debug, thiserror::Error)]
pub enum SegmentError {
    /// The input series has no samples.
    #[error("cannot detect change points in an empty series")]
    EmptySeries,

    /// A method name did not match any detector.
    #[error("unknown detection method `{0}` (expected derivative, binseg or window)")]
    UnknownMethod(String),

    /// A hand-built set of points failed validation.
    #[error("invalid change points: {0}")]
    InvalidPoints(String),
}

/// Validated change points of one series.
///
/// Indices are strictly increasing, in range, and always end with the final
/// index of the series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangePointSet {
    points: Vec<usize>,
    series_len: usize,
}

impl ChangePointSet {
    /// Validate a set of points against the series length.
    pub fn new(points: Vec<usize>, series_len: usize) -> Result<Self, SegmentError> {
        if series_len == 0 {
            return Err(SegmentError::EmptySeries);
        }
        if !points.windows(2).all(|w| w[0] < w[1]) {
            return Err(SegmentError::InvalidPoints(
                "indices must be strictly increasing".to_string(),
            ));
        }
        if points.last() != Some(&(series_len - 1)) {
            return Err(SegmentError::InvalidPoints(format!(
                "last index must be {} (series end)",
                series_len - 1
            )));
        }
        Ok(Self { points, series_len })
    }

    /// The change-point indices, ending with the final series index.
    pub fn indices(&self) -> &[usize] {
        &self.points
    }

    /// Length of the series the points were detected on.
    pub fn series_len(&self) -> usize {
        self.series_len
    }

    /// Number of change points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True when no points were detected (cannot happen for detector
    /// output, which always contains the final index).
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Detection method selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Exact first-difference detector for piecewise-constant input.
    Derivative,
    /// Binary segmentation with an L2 cost and penalty threshold.
    Binseg,
    /// Sliding-window L1 discrepancy detector.
    Window,
}

impl FromStr for Method {
    type Err = SegmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "derivative" | "diff" => Ok(Method::Derivative),
            "binseg" => Ok(Method::Binseg),
            "window" => Ok(Method::Window),
            other => Err(SegmentError::UnknownMethod(other.to_string())),
        }
    }
}

/// Tuning parameters shared by the detectors.
#[derive(Debug, Clone)]
pub struct DetectionParams {
    /// Penalty: minimum cost gain ([`Method::Binseg`]) or discrepancy score
    /// ([`Method::Window`]) a candidate must exceed.
    pub pen: f64,
    /// Minimum segment length in samples ([`Method::Binseg`]).
    pub min_size: usize,
    /// Sliding-window width in samples ([`Method::Window`]).
    pub width: usize,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            pen: 0.5,
            min_size: 2,
            width: 300,
        }
    }
}

/// Detect change points in `series` with the chosen method.
pub fn detect(
    series: &[f64],
    method: Method,
    params: &DetectionParams,
) -> Result<ChangePointSet, SegmentError> {
    if series.is_empty() {
        return Err(SegmentError::EmptySeries);
    }
    let clean: Vec<f64> = series
        .iter()
        .map(|&x| if x.is_nan() { 0.0 } else { x })
        .collect();

    let mut points = match method {
        Method::Derivative => derivative_change_points(&clean),
        Method::Binseg => binseg_change_points(&clean, params.pen, params.min_size.max(1)),
        Method::Window => window_change_points(&clean, params.width, params.pen),
    };

    let last = series.len() - 1;
    if points.last() != Some(&last) {
        points.push(last);
    }
    ChangePointSet::new(points, series.len())
}

/// Indices where the first difference is nonzero (each index is the first
/// sample of the new level).
fn derivative_change_points(series: &[f64]) -> Vec<usize> {
    series
        .windows(2)
        .enumerate()
        .filter(|(_, w)| w[1] - w[0] != 0.0)
        .map(|(i, _)| i + 1)
        .collect()
}

/// Prefix sums for O(1) L2 segment cost.
struct L2Cost {
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
}

impl L2Cost {
    fn new(series: &[f64]) -> Self {
        let mut sum = Vec::with_capacity(series.len() + 1);
        let mut sum_sq = Vec::with_capacity(series.len() + 1);
        sum.push(0.0);
        sum_sq.push(0.0);
        for &x in series {
            sum.push(sum.last().copied().unwrap_or(0.0) + x);
            sum_sq.push(sum_sq.last().copied().unwrap_or(0.0) + x * x);
        }
        Self { sum, sum_sq }
    }

    /// Sum of squared residuals around the mean of `series[a..b]`.
    fn cost(&self, a: usize, b: usize) -> f64 {
        let n = (b - a) as f64;
        let s = self.sum[b] - self.sum[a];
        let s2 = self.sum_sq[b] - self.sum_sq[a];
        (s2 - s * s / n).max(0.0)
    }
}

/// Recursive binary segmentation over `series[a..b)`.
fn binseg_change_points(series: &[f64], pen: f64, min_size: usize) -> Vec<usize> {
    let cost = L2Cost::new(series);
    let mut points = Vec::new();
    binseg_split(&cost, 0, series.len(), pen, min_size, &mut points);
    points.sort_unstable();
    points
}

fn binseg_split(
    cost: &L2Cost,
    a: usize,
    b: usize,
    pen: f64,
    min_size: usize,
    points: &mut Vec<usize>,
) {
    if b - a < 2 * min_size {
        return;
    }
    let whole = cost.cost(a, b);
    let mut best: Option<(usize, f64)> = None;
    for t in (a + min_size)..=(b - min_size) {
        let gain = whole - cost.cost(a, t) - cost.cost(t, b);
        if best.map_or(true, |(_, g)| gain > g) {
            best = Some((t, gain));
        }
    }
    if let Some((t, gain)) = best {
        if gain > pen {
            points.push(t);
            binseg_split(cost, a, t, pen, min_size, points);
            binseg_split(cost, t, b, pen, min_size, points);
        }
    }
}

/// Sum of absolute deviations from the median of `series[a..b]`.
fn l1_cost(series: &[f64], a: usize, b: usize) -> f64 {
    let mut window: Vec<f64> = series[a..b].to_vec();
    window.sort_by(|x, y| x.total_cmp(y));
    let n = window.len();
    let median = if n % 2 == 1 {
        window[n / 2]
    } else {
        (window[n / 2 - 1] + window[n / 2]) / 2.0
    };
    window.iter().map(|x| (x - median).abs()).sum()
}

/// Sliding-window discrepancy: cost of the full window minus the cost of its
/// halves. Local maxima above the penalty are kept greedily by score with a
/// minimum separation of half the window width.
fn window_change_points(series: &[f64], width: usize, pen: f64) -> Vec<usize> {
    let half = (width / 2).max(1);
    if series.len() < 2 * half + 1 {
        return Vec::new();
    }

    let lo = half;
    let hi = series.len() - half;
    let scores: Vec<f64> = (lo..hi)
        .map(|t| {
            l1_cost(series, t - half, t + half)
                - l1_cost(series, t - half, t)
                - l1_cost(series, t, t + half)
        })
        .collect();

    // Strict rise into the maximum, non-strict fall out of it, so the left
    // edge of a score plateau wins.
    let mut candidates: Vec<(usize, f64)> = (0..scores.len())
        .filter(|&i| {
            scores[i] > pen
                && (i == 0 || scores[i] > scores[i - 1])
                && (i + 1 == scores.len() || scores[i] >= scores[i + 1])
        })
        .map(|i| (i + lo, scores[i]))
        .collect();
    candidates.sort_by(|x, y| y.1.total_cmp(&x.1));

    let mut accepted: Vec<usize> = Vec::new();
    for (t, _) in candidates {
        if accepted.iter().all(|&s| t.abs_diff(s) >= half) {
            accepted.push(t);
        }
    }
    accepted.sort_unstable();
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps(levels: &[(f64, usize)]) -> Vec<f64> {
        levels
            .iter()
            .flat_map(|&(v, n)| std::iter::repeat(v).take(n))
            .collect()
    }

    #[test]
    fn test_derivative_finds_exact_steps() {
        let series = [1.0, 1.0, 1.0, 2.0, 2.0, 5.0, 5.0, 5.0];
        let cps = detect(&series, Method::Derivative, &DetectionParams::default()).unwrap();
        assert_eq!(cps.indices(), &[3, 5, 7]);
    }

    #[test]
    fn test_derivative_constant_series_yields_only_the_end() {
        let series = [2.0; 10];
        let cps = detect(&series, Method::Derivative, &DetectionParams::default()).unwrap();
        assert_eq!(cps.indices(), &[9]);
    }

    #[test]
    fn test_derivative_treats_nan_as_zero() {
        let series = [0.0, f64::NAN, 0.0, 1.0];
        let cps = detect(&series, Method::Derivative, &DetectionParams::default()).unwrap();
        assert_eq!(cps.indices(), &[3]);
    }

    #[test]
    fn test_binseg_finds_noise_free_steps() {
        let series = steps(&[(0.0, 10), (5.0, 10), (1.0, 10)]);
        let cps = detect(&series, Method::Binseg, &DetectionParams::default()).unwrap();
        assert_eq!(cps.indices(), &[10, 20, 29]);
    }

    #[test]
    fn test_binseg_penalty_suppresses_small_steps() {
        let series = steps(&[(0.0, 10), (0.001, 10)]);
        let params = DetectionParams {
            pen: 1.0,
            ..DetectionParams::default()
        };
        let cps = detect(&series, Method::Binseg, &params).unwrap();
        assert_eq!(cps.indices(), &[19]);
    }

    #[test]
    fn test_window_finds_steps() {
        let series = steps(&[(0.0, 10), (5.0, 10), (1.0, 10)]);
        let params = DetectionParams {
            pen: 0.5,
            width: 6,
            ..DetectionParams::default()
        };
        let cps = detect(&series, Method::Window, &params).unwrap();
        assert_eq!(cps.indices(), &[10, 20, 29]);
    }

    #[test]
    fn test_window_too_short_series_yields_only_the_end() {
        let series = [1.0, 2.0, 3.0];
        let params = DetectionParams {
            width: 100,
            ..DetectionParams::default()
        };
        let cps = detect(&series, Method::Window, &params).unwrap();
        assert_eq!(cps.indices(), &[2]);
    }

    #[test]
    fn test_empty_series_is_an_error() {
        let err = detect(&[], Method::Derivative, &DetectionParams::default()).unwrap_err();
        assert!(matches!(err, SegmentError::EmptySeries));
    }

    #[test]
    fn test_change_point_set_validation() {
        assert!(ChangePointSet::new(vec![3, 9], 10).is_ok());
        // Not ending at the series end.
        assert!(ChangePointSet::new(vec![3, 5], 10).is_err());
        // Not strictly increasing.
        assert!(ChangePointSet::new(vec![5, 3, 9], 10).is_err());
    }

    #[test]
    fn test_method_from_str() {
        assert_eq!("derivative".parse::<Method>().unwrap(), Method::Derivative);
        assert_eq!("Binseg".parse::<Method>().unwrap(), Method::Binseg);
        assert!(matches!(
            "rbf".parse::<Method>(),
            Err(SegmentError::UnknownMethod(_))
        ));
    }
}
