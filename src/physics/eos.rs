//! # Isothermal equations of state
//!
//! Pressure as a function of unit-cell volume for the two pressure markers
//! used in the diamond-anvil-cell experiments: NaCl with a third-order
//! Birch-Murnaghan EOS and quartz with a Vinet EOS (parameters from Angel
//! et al., J. Appl. Cryst. 30, 461 (1997)). The analytic volume derivative
//! dP/dV is what error propagation from a volume uncertainty to a pressure
//! uncertainty needs: σP = |dP/dV|·σV.

/// Parameters of an isothermal equation of state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EosParams {
    /// Zero-pressure unit-cell volume [Å³].
    pub v0: f64,
    /// Isothermal bulk modulus at zero pressure [GPa].
    pub b0: f64,
    /// Pressure derivative of the bulk modulus.
    pub b0p: f64,
}

/// NaCl B1 phase, third-order Birch-Murnaghan.
pub const NACL_BM: EosParams = EosParams {
    v0: 179.425,
    b0: 23.83,
    b0p: 5.09,
};

/// α-quartz, Vinet (Angel et al. 1997).
pub const QUARTZ_VINET: EosParams = EosParams {
    v0: 112.981,
    b0: 37.12,
    b0p: 5.99,
};

/// Equation-of-state family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eos {
    /// Third-order Birch-Murnaghan.
    BirchMurnaghan,
    /// Vinet (universal) equation of state.
    Vinet,
}

impl Eos {
    /// Pressure [GPa] at unit-cell volume `v` [Å³].
    ///
    /// Total over `f64`: `v <= 0` yields NaN or infinity rather than an
    /// error.
    pub fn pressure(&self, v: f64, p: &EosParams) -> f64 {
        match self {
            Eos::BirchMurnaghan => {
                let vr = p.v0 / v;
                1.5 * p.b0
                    * (vr.powf(7.0 / 3.0) - vr.powf(5.0 / 3.0))
                    * (1.0 + 0.75 * (p.b0p - 4.0) * (vr.powf(2.0 / 3.0) - 1.0))
            }
            Eos::Vinet => {
                let n = (v / p.v0).powf(1.0 / 3.0);
                3.0 * p.b0 * (1.0 - n) / (n * n) * (1.5 * (p.b0p - 1.0) * (1.0 - n)).exp()
            }
        }
    }

    /// Analytic volume derivative dP/dV [GPa/Å³] at volume `v`.
    pub fn dpdv(&self, v: f64, p: &EosParams) -> f64 {
        match self {
            Eos::BirchMurnaghan => {
                let x = p.v0 / v;
                let x13 = x.powf(1.0 / 3.0);
                let x23 = x13 * x13;
                let core = (7.0 / 3.0 * x23 * x23 - 5.0 / 3.0 * x23)
                    * (1.0 + 0.75 * (p.b0p - 4.0) * (x23 - 1.0))
                    + (x * x - x23 * x23) * 0.5 * (p.b0p - 4.0);
                -(x / v) * 1.5 * p.b0 * core
            }
            Eos::Vinet => {
                let n = (v / p.v0).powf(1.0 / 3.0);
                let eta = 1.5 * (p.b0p - 1.0);
                p.b0 * (eta * (1.0 - n)).exp() * (n - 2.0 - eta * n * (1.0 - n)) / (v * n * n)
            }
        }
    }

    /// Apply [`Eos::pressure`] to a slice of volumes.
    pub fn pressure_series(&self, vs: &[f64], p: &EosParams) -> Vec<f64> {
        vs.iter().map(|&v| self.pressure(v, p)).collect()
    }
}

/// Shift to zero mean and scale by the peak-to-peak range.
pub fn normalize(xs: &[f64]) -> Vec<f64> {
    if xs.is_empty() {
        return Vec::new();
    }
    let mean = xs.iter().sum::<f64>() / xs.len() as f64;
    let max = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = xs.iter().copied().fold(f64::INFINITY, f64::min);
    let range = max - min;
    xs.iter().map(|&x| (x - mean) / range).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_pressures() {
        let p = Eos::BirchMurnaghan.pressure(170.0, &NACL_BM);
        assert!((p - 1.475337607516645).abs() < 1e-12);

        let p = Eos::Vinet.pressure(105.0, &QUARTZ_VINET);
        assert!((p - 3.3791655615500455).abs() < 1e-12);
    }

    #[test]
    fn test_zero_pressure_at_v0() {
        assert!(Eos::BirchMurnaghan.pressure(NACL_BM.v0, &NACL_BM).abs() < 1e-12);
        assert!(Eos::Vinet.pressure(QUARTZ_VINET.v0, &QUARTZ_VINET).abs() < 1e-12);
    }

    #[test]
    fn test_pressure_increases_under_compression() {
        let compressed = [0.85, 0.90, 0.95, 1.0];
        for eos in [Eos::BirchMurnaghan, Eos::Vinet] {
            let p = &NACL_BM;
            let pressures = eos.pressure_series(
                &compressed.map(|f| f * p.v0),
                p,
            );
            for pair in pressures.windows(2) {
                assert!(pair[0] > pair[1]);
            }
        }
    }

    /// dP/dV must agree with a central finite difference of the pressure.
    #[test]
    fn test_dpdv_matches_finite_difference() {
        for (eos, p) in [(Eos::BirchMurnaghan, &NACL_BM), (Eos::Vinet, &QUARTZ_VINET)] {
            for frac in [0.85, 0.92, 0.99, 1.05] {
                let v = frac * p.v0;
                let h = 1e-5 * p.v0;
                let numeric = (eos.pressure(v + h, p) - eos.pressure(v - h, p)) / (2.0 * h);
                let analytic = eos.dpdv(v, p);
                assert!(
                    (analytic - numeric).abs() < 1e-6 * numeric.abs().max(1e-6),
                    "{eos:?} at v={v}: analytic {analytic} vs numeric {numeric}"
                );
            }
        }
    }

    /// Pinned value well into compression, where a wrong product-rule term
    /// in the Birch-Murnaghan derivative would show up.
    #[test]
    fn test_dpdv_reference_value_under_compression() {
        let v = 0.85 * NACL_BM.v0;
        let d = Eos::BirchMurnaghan.dpdv(v, &NACL_BM);
        assert!((d - -0.33510755388390695).abs() < 1e-12);
    }

    #[test]
    fn test_dpdv_is_negative_in_compression() {
        assert!(Eos::BirchMurnaghan.dpdv(170.0, &NACL_BM) < 0.0);
        assert!(Eos::Vinet.dpdv(105.0, &QUARTZ_VINET) < 0.0);
    }

    #[test]
    fn test_normalize() {
        let out = normalize(&[1.0, 2.0, 3.0]);
        assert_eq!(out, vec![-0.5, 0.0, 0.5]);
        assert!(normalize(&[]).is_empty());
    }
}
