//! # Sauerbrey frequency-mass conversion
//!
//! A rigid thin film on a quartz crystal microbalance shifts the resonance
//! frequency in proportion to the deposited mass. The proportionality
//! constant depends only on the electrode area and the AT-cut quartz
//! material constants, so the conversion and its inverse are exact within
//! the rigid-film assumption.

use std::f64::consts::PI;

/// AT-cut quartz density [g/cm³].
pub const QUARTZ_DENSITY: f64 = 2.648;

/// AT-cut quartz shear modulus [g/(cm·s²)].
pub const QUARTZ_SHEAR_MODULUS: f64 = 3.947e11;

/// Circular QCM electrode, identified by its diameter. The area is computed
/// once at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Electrode {
    diameter_cm: f64,
    area_cm2: f64,
}

impl Electrode {
    /// Electrode of the given diameter in cm.
    pub fn new(diameter_cm: f64) -> Self {
        Self {
            diameter_cm,
            area_cm2: PI * (diameter_cm / 2.0).powi(2),
        }
    }

    /// Electrode diameter [cm].
    pub fn diameter_cm(&self) -> f64 {
        self.diameter_cm
    }

    /// Electrode area [cm²].
    pub fn area_cm2(&self) -> f64 {
        self.area_cm2
    }
}

impl Default for Electrode {
    /// The 0.51 cm electrode of the in-house crystals.
    fn default() -> Self {
        Self::new(0.51)
    }
}

/// Mass change [mg] for a resonance-frequency change `df` [Hz] on a crystal
/// with fundamental frequency `f0` [Hz].
///
/// A frequency drop (negative `df`) means mass was added, so the result is
/// positive for adsorption.
pub fn sauerbrey(df: f64, f0: f64, electrode: &Electrode) -> f64 {
    df * electrode.area_cm2() * (QUARTZ_DENSITY * QUARTZ_SHEAR_MODULUS).sqrt()
        / (-2.0 * f0.powi(2))
        * 1000.0
}

/// Resonance-frequency change [Hz] for a mass change `dm` [mg]. Inverse of
/// [`sauerbrey`].
pub fn reverse_sauerbrey(dm: f64, f0: f64, electrode: &Electrode) -> f64 {
    -2.0 * dm * f0.powi(2)
        / (electrode.area_cm2() * (QUARTZ_DENSITY * QUARTZ_SHEAR_MODULUS).sqrt() * 1000.0)
}

/// Apply [`sauerbrey`] to a slice of frequency changes.
pub fn sauerbrey_series(dfs: &[f64], f0: f64, electrode: &Electrode) -> Vec<f64> {
    dfs.iter().map(|&df| sauerbrey(df, f0, electrode)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sauerbrey_reference_values() {
        let e = Electrode::default();
        assert!((e.area_cm2() - 0.2042820622996763).abs() < 1e-15);
        assert_eq!(e.area_cm2(), PI * (e.diameter_cm() / 2.0).powi(2));
        // 100 Hz drop on a 5 MHz crystal is just under half a microgram.
        assert!((sauerbrey(-100.0, 5.0e6, &e) - 4.176887544650925e-4).abs() < 1e-16);
        assert!((sauerbrey(-1.0, 6.0e6, &e) - 2.9006163504520315e-6).abs() < 1e-18);
    }

    #[test]
    fn test_frequency_drop_means_mass_gain() {
        let e = Electrode::default();
        assert!(sauerbrey(-50.0, 5.0e6, &e) > 0.0);
        assert!(sauerbrey(50.0, 5.0e6, &e) < 0.0);
    }

    proptest! {
        #[test]
        fn test_reverse_sauerbrey_round_trips(
            df in -1.0e4f64..1.0e4,
            f0 in 1.0e6f64..1.0e7,
        ) {
            let e = Electrode::default();
            let back = reverse_sauerbrey(sauerbrey(df, f0, &e), f0, &e);
            prop_assert!((back - df).abs() <= 1e-9 * df.abs().max(1.0));
        }
    }
}
