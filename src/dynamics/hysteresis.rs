/*
    MagLock, passive magnetic attitude and orbit control simulation
    Copyright (C) 2025 MagLock contributors

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use crate::cosmic::VACUUM_PERMEABILITY;
use crate::io::{ConfigError, InvalidParameterSnafu};
use crate::linalg::Vector3;
use serde::{Deserialize, Serialize};
use snafu::ensure;

/// Static-field suppression threshold on |dH/dt|, in A/m/s.
const EPS_DH_DT: f64 = 1e-9;
/// Denominator guard of the irreversible susceptibility, in A/m.
const EPS_DENOMINATOR: f64 = 1e-9;
/// Switch point between the Taylor and closed-form Langevin branches.
const EPS_LANGEVIN: f64 = 1e-6;
/// Tolerated rounding noise before the causality clamp triggers, in A/m/s.
const EPS_CAUSALITY: f64 = 1e-12;

/// Jiles-Atherton material parameters shared by every rod of a spacecraft.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct JaParameters {
    /// Saturation magnetization, in A/m.
    pub ms: f64,
    /// Anhysteretic shape parameter, in A/m.
    pub a: f64,
    /// Pinning energy density (sets the coercivity), in A/m.
    pub k: f64,
    /// Reversibility coefficient, in [0, 1].
    pub c: f64,
    /// Inter-domain coupling coefficient.
    pub alpha: f64,
}

impl JaParameters {
    /// HyMu-80 permalloy, the usual rod material of passive CubeSat AOCS.
    pub fn hymu80() -> Self {
        Self {
            ms: 6.0e5,
            a: 6.5,
            k: 4.0,
            c: 0.05,
            alpha: 1.0e-5,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(
            self.ms > 0.0,
            InvalidParameterSnafu {
                param: "hysteresis ms",
                reason: format!("saturation magnetization must be positive, got {}", self.ms),
            }
        );
        ensure!(
            self.a > 0.0,
            InvalidParameterSnafu {
                param: "hysteresis a",
                reason: format!("shape parameter must be positive, got {}", self.a),
            }
        );
        ensure!(
            self.k > 0.0,
            InvalidParameterSnafu {
                param: "hysteresis k",
                reason: format!("pinning energy density must be positive, got {}", self.k),
            }
        );
        ensure!(
            (0.0..=1.0).contains(&self.c),
            InvalidParameterSnafu {
                param: "hysteresis c",
                reason: format!("reversibility coefficient must be within [0, 1], got {}", self.c),
            }
        );
        ensure!(
            self.alpha >= 0.0,
            InvalidParameterSnafu {
                param: "hysteresis alpha",
                reason: format!("coupling coefficient must be non-negative, got {}", self.alpha),
            }
        );
        Ok(())
    }
}

/// One soft-magnetic hysteresis damping rod. The integration state of a rod
/// is the scalar irreversible magnetization M_irr; this type provides its
/// time derivative and the dipole moment it contributes to the torque.
#[derive(Clone, Debug)]
pub struct HysteresisRod {
    volume_m3: f64,
    orientation_body: Vector3<f64>,
    params: JaParameters,
    irreversible_moment_only: bool,
}

impl HysteresisRod {
    pub fn new(
        volume_m3: f64,
        orientation: Vector3<f64>,
        params: JaParameters,
    ) -> Result<Self, ConfigError> {
        ensure!(
            volume_m3 > 0.0,
            InvalidParameterSnafu {
                param: "rod volume",
                reason: format!("must be strictly positive, got {volume_m3}"),
            }
        );
        ensure!(
            orientation.norm() > f64::EPSILON,
            InvalidParameterSnafu {
                param: "rod orientation",
                reason: "must be a non-zero vector".to_string(),
            }
        );
        params.validate()?;
        Ok(Self {
            volume_m3,
            orientation_body: orientation.normalize(),
            params,
            irreversible_moment_only: false,
        })
    }

    /// Approximates the dipole moment with M_irr alone, skipping the
    /// reversible contribution. The full total magnetization is the contract;
    /// this shortcut only matters when c is small.
    pub fn with_irreversible_moment_only(mut self, enabled: bool) -> Self {
        self.irreversible_moment_only = enabled;
        self
    }

    pub fn params(&self) -> &JaParameters {
        &self.params
    }

    pub fn orientation_body(&self) -> Vector3<f64> {
        self.orientation_body
    }

    pub fn volume_m3(&self) -> f64 {
        self.volume_m3
    }

    /// Time derivative of the irreversible magnetization given the body-frame
    /// field and its body-frame rate, both in tesla.
    pub fn magnetization_derivative(
        &self,
        m_irr_am: f64,
        b_body_t: &Vector3<f64>,
        b_dot_body_t_s: &Vector3<f64>,
    ) -> f64 {
        let h_along_rod = b_body_t.dot(&self.orientation_body) / VACUUM_PERMEABILITY;
        let dh_dt = b_dot_body_t_s.dot(&self.orientation_body) / VACUUM_PERMEABILITY;
        self.magnetization_derivative_from_h(m_irr_am, h_along_rod, dh_dt)
    }

    /// Time derivative of the irreversible magnetization from the scalar
    /// field along the rod axis, in A/m and A/m/s.
    pub fn magnetization_derivative_from_h(&self, m_irr_am: f64, h_am: f64, dh_dt: f64) -> f64 {
        // A strictly static field cannot move domain walls.
        if dh_dt.abs() < EPS_DH_DT {
            return 0.0;
        }
        // A saturated rod driven further into saturation stays put.
        if (m_irr_am >= self.params.ms && dh_dt > 0.0)
            || (m_irr_am <= -self.params.ms && dh_dt < 0.0)
        {
            return 0.0;
        }

        // The invariant |M_irr| <= Ms is only restored at checkpoints; clamp
        // on input.
        let m_clamped = m_irr_am.clamp(-self.params.ms, self.params.ms);
        let h_eff = h_am + self.params.alpha * m_clamped;
        let (man, dman_dheff) = self.anhysteretic(h_eff);

        let delta = if dh_dt > 0.0 { 1.0 } else { -1.0 };
        let mut denominator = self.params.k * delta - self.params.alpha * (man - m_clamped);
        if denominator.abs() < EPS_DENOMINATOR {
            denominator = EPS_DENOMINATOR.copysign(denominator);
        }
        // The susceptibility magnitude stays bounded by Ms/k across the
        // denominator zero-crossing, which bounds the stiffness the stepper
        // has to resolve.
        let chi_limit = self.params.ms / self.params.k;
        let chi_irr = ((man - m_clamped) / denominator).clamp(-chi_limit, chi_limit);
        let chi = (1.0 - self.params.c) * chi_irr + self.params.c * dman_dheff;
        let rate = chi * dh_dt;

        // A passive rod cannot magnetize against the drive: suppress the
        // spurious negative-susceptibility regime outside rounding noise.
        if (dh_dt > 0.0 && rate < -EPS_CAUSALITY) || (dh_dt < 0.0 && rate > EPS_CAUSALITY) {
            return 0.0;
        }
        rate
    }

    /// Dipole moment the rod contributes to the torque, in A*m^2. The total
    /// magnetization combines the irreversible state with the reversible
    /// anhysteretic fraction at the current field.
    pub fn magnetic_moment(&self, m_irr_am: f64, b_body_t: &Vector3<f64>) -> Vector3<f64> {
        let m_clamped = m_irr_am.clamp(-self.params.ms, self.params.ms);
        let m_total = if self.irreversible_moment_only {
            m_clamped
        } else {
            let h_along_rod = b_body_t.dot(&self.orientation_body) / VACUUM_PERMEABILITY;
            let h_eff = h_along_rod + self.params.alpha * m_clamped;
            let (man, _) = self.anhysteretic(h_eff);
            (1.0 - self.params.c) * m_clamped + self.params.c * man
        };
        m_total * self.volume_m3 * self.orientation_body
    }

    /// Anhysteretic magnetization M_an(H_eff) and its derivative with respect
    /// to the effective field, through the Langevin function.
    fn anhysteretic(&self, h_eff_am: f64) -> (f64, f64) {
        let x = h_eff_am / self.params.a;
        let (langevin, dlangevin_dx) = langevin(x);
        (
            self.params.ms * langevin,
            self.params.ms / self.params.a * dlangevin_dx,
        )
    }
}

/// The Langevin function L(x) = coth(x) - 1/x and its derivative. The Taylor
/// branch takes over below |x| = 1e-6, where the closed form cancels
/// catastrophically.
fn langevin(x: f64) -> (f64, f64) {
    if x.abs() < EPS_LANGEVIN {
        (x / 3.0 - x.powi(3) / 45.0, 1.0 / 3.0 - x * x / 15.0)
    } else {
        // coth through 1/tanh and csch^2 through 1/sinh^2 saturate cleanly
        // for large |x| instead of overflowing to NaN.
        let coth = 1.0 / x.tanh();
        let csch_sq = 1.0 / (x.sinh() * x.sinh());
        (coth - 1.0 / x, 1.0 / (x * x) - csch_sq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_params() -> JaParameters {
        JaParameters {
            ms: 1.4e5,
            a: 2.0e3,
            k: 1.0e3,
            c: 0.2,
            alpha: 1.0e-3,
        }
    }

    fn test_rod() -> HysteresisRod {
        HysteresisRod::new(0.1, Vector3::new(1.0, 0.0, 0.0), test_params()).unwrap()
    }

    #[test]
    fn static_field_yields_zero_rate() {
        let rod = test_rod();
        assert_eq!(rod.magnetization_derivative_from_h(5.0e4, 1.5e3, 1e-10), 0.0);
        assert_eq!(rod.magnetization_derivative_from_h(5.0e4, 1.5e3, 0.0), 0.0);
    }

    #[test]
    fn saturated_rod_driven_further_stays_put() {
        let rod = test_rod();
        assert_eq!(rod.magnetization_derivative_from_h(1.4e5, 1.0e3, 10.0), 0.0);
        assert_eq!(
            rod.magnetization_derivative_from_h(-1.4e5, -1.0e3, -10.0),
            0.0
        );
        // Driven back out of saturation the rod must respond.
        assert!(rod.magnetization_derivative_from_h(1.4e5, 1.0e3, -10.0) != 0.0);
    }

    #[test]
    fn ascending_branch_drives_toward_anhysteretic() {
        let rod = test_rod();
        // Demagnetized rod, moderate positive field, field increasing: the
        // magnetization must grow.
        let rate = rod.magnetization_derivative_from_h(0.0, 1.0e3, 1.0e2);
        assert!(rate.is_finite());
        assert!(rate > 0.0);
    }

    #[test]
    fn causality_clamp_suppresses_active_behavior() {
        let rod = test_rod();
        // Magnetization far above the anhysteretic value while the field
        // still rises: the raw susceptibility turns negative, which the clamp
        // maps to zero rather than an energy-creating discharge.
        assert_eq!(rod.magnetization_derivative_from_h(5.0e4, 1.5e3, 1.0e2), 0.0);
    }

    #[test]
    fn near_zero_denominator_is_finite() {
        let rod = test_rod();
        // Values picked so k*delta ~ alpha*(Man - M).
        let rate = rod.magnetization_derivative_from_h(1.3e5, 2.5e3, 1.0);
        assert!(rate.is_finite());
    }

    #[test]
    fn near_zero_effective_field_is_finite() {
        let rod = test_rod();
        let rate = rod.magnetization_derivative_from_h(0.0, 0.0, 1.0e-2);
        assert!(rate.is_finite());
    }

    #[test]
    fn langevin_branches_agree_at_the_switch_point() {
        let x = EPS_LANGEVIN;
        let (taylor, _) = langevin(x * 0.999_999_9);
        let coth = 1.0 / x.tanh();
        let closed = coth - 1.0 / x;
        assert!((closed - taylor).abs() < 1e-9);

        let (taylor_neg, _) = langevin(-x * 0.999_999_9);
        let closed_neg = 1.0 / (-x).tanh() + 1.0 / x;
        assert!((closed_neg - taylor_neg).abs() < 1e-9);
    }

    #[test]
    fn langevin_saturates_without_overflow() {
        let (l_pos, dl_pos) = langevin(1.0e9);
        assert!((l_pos - 1.0).abs() < 1e-8);
        assert!(dl_pos.abs() < 1e-8);
        let (l_neg, _) = langevin(-1.0e9);
        assert!((l_neg + 1.0).abs() < 1e-8);
    }

    #[test]
    fn irreversible_only_moment_matches_simple_product() {
        let rod = test_rod().with_irreversible_moment_only(true);
        let moment = rod.magnetic_moment(1.0e4, &Vector3::zeros());
        assert!((moment.x - 1.0e3).abs() < 1e-9);
        assert!(moment.y.abs() < 1e-12 && moment.z.abs() < 1e-12);
    }

    #[test]
    fn total_moment_includes_reversible_fraction() {
        let rod = test_rod();
        let params = test_params();
        let m_irr = 1.0e4;
        let moment = rod.magnetic_moment(m_irr, &Vector3::zeros());
        // With B = 0 the effective field is alpha * M_irr.
        let h_eff = params.alpha * m_irr;
        let x = h_eff / params.a;
        let man = params.ms * (1.0 / x.tanh() - 1.0 / x);
        let expected = ((1.0 - params.c) * m_irr + params.c * man) * 0.1;
        assert!((moment.x - expected).abs() < 1e-9 * expected.abs());
    }

    #[test]
    fn moment_clamps_out_of_range_state() {
        let rod = test_rod().with_irreversible_moment_only(true);
        let moment = rod.magnetic_moment(5.0e5, &Vector3::zeros());
        assert!((moment.x - 1.4e5 * 0.1).abs() < 1e-9);
    }

    #[test]
    fn construction_normalizes_the_orientation() {
        let rod = HysteresisRod::new(0.2, Vector3::new(0.0, 3.0, 0.0), test_params()).unwrap();
        assert!((rod.orientation_body() - Vector3::y()).norm() < 1e-15);
        assert!((rod.volume_m3() - 0.2).abs() < f64::EPSILON);
        assert!((rod.params().k - 1.0e3).abs() < f64::EPSILON);
    }

    #[test]
    fn vector_projection_matches_scalar_form() {
        let rod = test_rod();
        let b_body = Vector3::new(2.0e-3, 1.0e-3, 0.0);
        let b_dot = Vector3::new(1.0e-4, -2.0e-4, 5.0e-5);
        let h = b_body.x / VACUUM_PERMEABILITY;
        let dh = b_dot.x / VACUUM_PERMEABILITY;
        let from_vec = rod.magnetization_derivative(3.0e4, &b_body, &b_dot);
        let from_scalar = rod.magnetization_derivative_from_h(3.0e4, h, dh);
        assert!((from_vec - from_scalar).abs() < 1e-12 * from_scalar.abs().max(1.0));
    }

    #[test]
    fn parameter_validation() {
        assert!(test_params().validate().is_ok());
        let mut bad = test_params();
        bad.c = 1.5;
        assert!(bad.validate().is_err());
        bad = test_params();
        bad.ms = 0.0;
        assert!(bad.validate().is_err());
        bad = test_params();
        bad.alpha = -1.0;
        assert!(bad.validate().is_err());
        assert!(HysteresisRod::new(0.0, Vector3::x(), test_params()).is_err());
        assert!(HysteresisRod::new(0.1, Vector3::zeros(), test_params()).is_err());
    }

    #[test]
    fn hymu80_preset() {
        let p = JaParameters::hymu80();
        assert!((p.ms - 6.0e5).abs() < f64::EPSILON);
        assert!((p.k - 4.0).abs() < f64::EPSILON);
        assert!(p.validate().is_ok());
    }
}
