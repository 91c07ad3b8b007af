//! # Resonance-peak extraction from QCM traces
//!
//! Each trace scan is an amplitude-versus-frequency sweep with (ideally) one
//! resonance peak. Extraction reduces every scan to the peak position and
//! its width at half height; downstream the position series becomes a
//! frequency-shift series and the width series a damping indicator.
//!
//! When several local maxima qualify, the tallest wins. A scan with no
//! qualifying peak (crystal lost its resonance, sweep window drifted off the
//! peak) yields the explicit `(0.0, 0.0)` sentinel row rather than being
//! dropped, so the result stays index-aligned with the scan list.

use chrono::NaiveDateTime;

use crate::formats::qcm::TraceSet;

/// Peak acceptance thresholds.
#[derive(Debug, Clone)]
pub struct PeakConfig {
    /// Minimum amplitude a local maximum must reach.
    pub min_height: f64,
    /// Minimum width in samples at the evaluation level.
    pub min_width: f64,
    /// Fraction of the peak height at which the width is measured
    /// (0.5 = full width at half maximum, for a baseline near zero).
    pub rel_height: f64,
}

impl Default for PeakConfig {
    fn default() -> Self {
        Self {
            min_height: 0.1,
            min_width: 10.0,
            rel_height: 0.5,
        }
    }
}

/// One accepted peak.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TracePeak {
    /// Peak position in axis units (Hz for a frequency sweep).
    pub position: f64,
    /// Amplitude at the maximum.
    pub height: f64,
    /// Width at the evaluation level, in fractional samples.
    pub width: f64,
}

/// Peak summary of one scan.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceResult {
    /// When the scan was acquired.
    pub timestamp: NaiveDateTime,
    /// Peak position in axis units, or `0.0` when no peak qualified.
    pub frequency: f64,
    /// Peak width in samples, or `0.0` when no peak qualified.
    pub width: f64,
}

/// Find the tallest qualifying peak of one sweep.
///
/// A sample is a local maximum when it exceeds its left neighbour and is at
/// least its right neighbour (the left edge of a flat top wins). The width
/// is measured at `height * (1 - rel_height)` by walking outward from the
/// maximum and interpolating the crossings; a flank that never drops below
/// the level is clamped at the sweep edge.
pub fn find_tallest_peak(axis: &[f64], y: &[f64], config: &PeakConfig) -> Option<TracePeak> {
    let n = y.len().min(axis.len());
    let mut best: Option<TracePeak> = None;

    for i in 1..n.saturating_sub(1) {
        if !(y[i] > y[i - 1] && y[i] >= y[i + 1]) {
            continue;
        }
        let height = y[i];
        if height < config.min_height {
            continue;
        }

        let level = height * (1.0 - config.rel_height);
        let left = cross_left(y, i, level);
        let right = cross_right(y, i, level, n);
        let width = right - left;
        if width < config.min_width {
            continue;
        }

        if best.map_or(true, |b| height > b.height) {
            best = Some(TracePeak {
                position: axis[i],
                height,
                width,
            });
        }
    }

    best
}

/// Fractional index of the level crossing on the left flank.
fn cross_left(y: &[f64], peak: usize, level: f64) -> f64 {
    let mut j = peak;
    while j > 0 {
        if y[j - 1] <= level {
            // Interpolate between j-1 (below) and j (above).
            return (j - 1) as f64 + (level - y[j - 1]) / (y[j] - y[j - 1]);
        }
        j -= 1;
    }
    0.0
}

/// Fractional index of the level crossing on the right flank.
fn cross_right(y: &[f64], peak: usize, level: f64, n: usize) -> f64 {
    let mut j = peak;
    while j + 1 < n {
        if y[j + 1] <= level {
            return j as f64 + (y[j] - level) / (y[j] - y[j + 1]);
        }
        j += 1;
    }
    (n - 1) as f64
}

/// Reduce every scan of a trace set to a [`TraceResult`] row.
pub fn extract_trace_peaks(traces: &TraceSet, config: &PeakConfig) -> Vec<TraceResult> {
    traces
        .scans
        .iter()
        .map(|scan| {
            match find_tallest_peak(&traces.axis, &scan.amplitude, config) {
                Some(peak) => TraceResult {
                    timestamp: scan.timestamp,
                    frequency: peak.position,
                    width: peak.width,
                },
                None => TraceResult {
                    timestamp: scan.timestamp,
                    frequency: 0.0,
                    width: 0.0,
                },
            }
        })
        .collect()
}

/// Savitzky-Golay smoothing: fit a polynomial of degree `order` to a sliding
/// window of `window` samples (forced odd) and take its value at the centre.
/// Windows are clamped at the edges, so the output length equals the input
/// length.
pub fn denoise(signal: &[f64], window: usize, order: usize) -> Vec<f64> {
    let n = signal.len();
    if n == 0 {
        return Vec::new();
    }
    let window = window.max(order + 1).min(n) | 1;
    let window = window.min(n);
    let half = window / 2;

    (0..n)
        .map(|i| {
            let start = i.saturating_sub(half).min(n - window);
            fit_poly_at(&signal[start..start + window], i - start, order)
        })
        .collect()
}

/// Least-squares polynomial fit over one window, evaluated at offset `at`.
fn fit_poly_at(window: &[f64], at: usize, order: usize) -> f64 {
    let m = order + 1;
    // Normal equations over x = offset - at, evaluated at x = 0.
    let mut moments = vec![0.0; 2 * order + 1];
    let mut rhs = vec![0.0; m];
    for (j, &y) in window.iter().enumerate() {
        let x = j as f64 - at as f64;
        let mut xp = 1.0;
        for k in 0..=2 * order {
            moments[k] += xp;
            if k < m {
                rhs[k] += xp * y;
            }
            xp *= x;
        }
    }

    let mut a = vec![vec![0.0; m]; m];
    for (r, row) in a.iter_mut().enumerate() {
        for (c, cell) in row.iter_mut().enumerate() {
            *cell = moments[r + c];
        }
    }

    // Gaussian elimination with partial pivoting.
    for col in 0..m {
        let pivot = (col..m)
            .max_by(|&x, &y| a[x][col].abs().total_cmp(&a[y][col].abs()))
            .unwrap_or(col);
        a.swap(col, pivot);
        rhs.swap(col, pivot);
        if a[col][col] == 0.0 {
            return window.get(at).copied().unwrap_or(0.0);
        }
        for r in (col + 1)..m {
            let factor = a[r][col] / a[col][col];
            for c in col..m {
                a[r][c] -= factor * a[col][c];
            }
            rhs[r] -= factor * rhs[col];
        }
    }
    let mut coeffs = vec![0.0; m];
    for r in (0..m).rev() {
        let mut acc = rhs[r];
        for c in (r + 1)..m {
            acc -= a[r][c] * coeffs[c];
        }
        coeffs[r] = acc / a[r][r];
    }

    // Value at x = 0 is the constant term.
    coeffs[0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::qcm::TraceScan;
    use chrono::NaiveDate;

    fn axis(n: usize) -> Vec<f64> {
        (0..n).map(|i| 1000.0 + i as f64).collect()
    }

    fn config(min_width: f64) -> PeakConfig {
        PeakConfig {
            min_height: 0.5,
            min_width,
            rel_height: 0.5,
        }
    }

    #[test]
    fn test_triangular_peak_position_height_width() {
        let y = [0.0, 0.0, 1.0, 2.0, 3.0, 2.0, 1.0, 0.0, 0.0];
        let peak = find_tallest_peak(&axis(9), &y, &config(1.0)).unwrap();

        assert_eq!(peak.position, 1004.0);
        assert_eq!(peak.height, 3.0);
        // Half-height level 1.5 crosses at fractional samples 2.5 and 5.5.
        assert!((peak.width - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_tallest_of_several_peaks_wins() {
        let y = [0.0, 2.0, 0.0, 0.0, 5.0, 0.0, 0.0, 1.0, 0.0];
        let peak = find_tallest_peak(&axis(9), &y, &config(0.0)).unwrap();
        assert_eq!(peak.height, 5.0);
        assert_eq!(peak.position, 1004.0);
    }

    #[test]
    fn test_narrow_peak_rejected_by_min_width() {
        let y = [0.0, 0.0, 0.0, 0.0, 5.0, 0.0, 0.0, 0.0, 0.0];
        assert!(find_tallest_peak(&axis(9), &y, &config(4.0)).is_none());
    }

    #[test]
    fn test_flat_signal_yields_sentinel_row() {
        let stamp = NaiveDate::from_ymd_opt(2021, 1, 14)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let traces = TraceSet {
            axis: axis(5),
            scans: vec![TraceScan {
                timestamp: stamp,
                amplitude: vec![1.0; 5],
            }],
        };
        let results = extract_trace_peaks(&traces, &PeakConfig::default());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].timestamp, stamp);
        assert_eq!(results[0].frequency, 0.0);
        assert_eq!(results[0].width, 0.0);
    }

    #[test]
    fn test_denoise_preserves_polynomials_up_to_order() {
        // A degree-2 signal is a fixed point of an order-2 filter.
        let signal: Vec<f64> = (0..30).map(|i| {
            let x = i as f64;
            0.5 * x * x - 3.0 * x + 7.0
        }).collect();
        let smoothed = denoise(&signal, 7, 2);
        for (a, b) in signal.iter().zip(&smoothed) {
            assert!((a - b).abs() < 1e-8, "{a} vs {b}");
        }
    }

    #[test]
    fn test_denoise_flattens_impulse_noise() {
        let mut signal = vec![1.0; 21];
        signal[10] = 10.0;
        let smoothed = denoise(&signal, 7, 1);
        assert!(smoothed[10] < 4.0);
    }
}
