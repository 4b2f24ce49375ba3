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

use super::{AstroError, KeplerNonConvergenceSnafu, EARTH_MU_M3_S2};
use crate::linalg::{Rotation3, Vector3};
use serde::{Deserialize, Serialize};

/// Convergence tolerance on the Kepler equation residual, in radians.
const KEPLER_TOL: f64 = 1e-9;
/// Newton-Raphson iteration cap for the Kepler equation.
const KEPLER_MAX_ITER: usize = 100;

/// The six classical orbital elements, frozen at the simulation epoch and
/// converted once into an inertial Cartesian state.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeplerianElements {
    /// Semi-major axis, in meters.
    pub semi_major_axis_m: f64,
    /// Eccentricity, in [0, 1).
    pub eccentricity: f64,
    /// Inclination, in radians.
    pub inclination_rad: f64,
    /// Right ascension of the ascending node, in radians.
    pub raan_rad: f64,
    /// Argument of periapsis, in radians.
    pub arg_of_periapsis_rad: f64,
    /// Mean anomaly at epoch, in radians.
    pub mean_anomaly_rad: f64,
}

impl KeplerianElements {
    /// Solves Kepler's equation M = E - e sin E for the eccentric anomaly by
    /// Newton-Raphson, starting from E = M.
    pub fn eccentric_anomaly(&self) -> Result<f64, AstroError> {
        let ecc = self.eccentricity;
        let mean = self.mean_anomaly_rad;
        let mut ecc_anom = mean;
        for _ in 0..KEPLER_MAX_ITER {
            let residual = ecc_anom - ecc * ecc_anom.sin() - mean;
            if residual.abs() < KEPLER_TOL {
                return Ok(ecc_anom);
            }
            // dM/dE = 1 - e cos E
            ecc_anom -= residual / (1.0 - ecc * ecc_anom.cos());
        }
        KeplerNonConvergenceSnafu {
            iterations: KEPLER_MAX_ITER,
            eccentricity: ecc,
        }
        .fail()
    }

    /// Converts these elements to an inertial Cartesian state, returning
    /// `(position, velocity)` in meters and meters per second.
    pub fn to_cartesian(&self) -> Result<(Vector3<f64>, Vector3<f64>), AstroError> {
        let ecc = self.eccentricity;
        let ecc_anom = self.eccentric_anomaly()?;

        // True anomaly: tan(nu/2) = sqrt((1+e)/(1-e)) tan(E/2)
        let sqrt_factor = ((1.0 + ecc) / (1.0 - ecc)).sqrt();
        let nu = 2.0 * (sqrt_factor * (ecc_anom / 2.0).tan()).atan();

        // Perifocal (PQW) state
        let p = self.semi_major_axis_m * (1.0 - ecc * ecc);
        let r = p / (1.0 + ecc * nu.cos());
        let h_factor = (EARTH_MU_M3_S2 / p).sqrt();

        let r_pqw = Vector3::new(r * nu.cos(), r * nu.sin(), 0.0);
        let v_pqw = Vector3::new(-h_factor * nu.sin(), h_factor * (ecc + nu.cos()), 0.0);

        // PQW -> ECI through the 3-1-3 sequence: periapsis argument about Z,
        // inclination about X, RAAN about Z.
        let pqw_to_eci = Rotation3::from_axis_angle(&Vector3::z_axis(), self.raan_rad)
            * Rotation3::from_axis_angle(&Vector3::x_axis(), self.inclination_rad)
            * Rotation3::from_axis_angle(&Vector3::z_axis(), self.arg_of_periapsis_rad);

        Ok((pqw_to_eci * r_pqw, pqw_to_eci * v_pqw))
    }

    /// Magnitude of the specific angular momentum these elements imply,
    /// sqrt(mu a (1 - e^2)).
    pub fn specific_angular_momentum(&self) -> f64 {
        (EARTH_MU_M3_S2 * self.semi_major_axis_m * (1.0 - self.eccentricity.powi(2))).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eccentricity_vector(r: &Vector3<f64>, v: &Vector3<f64>) -> Vector3<f64> {
        let h = r.cross(v);
        v.cross(&h) / EARTH_MU_M3_S2 - r / r.norm()
    }

    #[test]
    fn kepler_round_trip_circular_equatorial() {
        let elements = KeplerianElements {
            semi_major_axis_m: 6.778e6,
            eccentricity: 0.0,
            inclination_rad: 0.0,
            raan_rad: 0.0,
            arg_of_periapsis_rad: 0.0,
            mean_anomaly_rad: 0.0,
        };
        let (r, v) = elements.to_cartesian().unwrap();
        let h = r.cross(&v).norm();
        let h_expect = elements.specific_angular_momentum();
        assert!((h - h_expect).abs() / h_expect < 1e-9);
        assert!(eccentricity_vector(&r, &v).norm() < 1e-9);
        // Circular equatorial: starts on the +X axis with velocity along +Y.
        assert!((r.norm() - 6.778e6).abs() < 1e-3);
        assert!(r.x > 0.0 && v.y > 0.0);
    }

    #[test]
    fn kepler_round_trip_eccentric_inclined() {
        let elements = KeplerianElements {
            semi_major_axis_m: 6.818e6,
            eccentricity: 0.1,
            inclination_rad: 1.3963,
            raan_rad: 0.7,
            arg_of_periapsis_rad: 0.3,
            mean_anomaly_rad: 2.1,
        };
        let (r, v) = elements.to_cartesian().unwrap();
        let h = r.cross(&v).norm();
        let h_expect = elements.specific_angular_momentum();
        assert!((h - h_expect).abs() / h_expect < 1e-9);
        let e_vec = eccentricity_vector(&r, &v);
        assert!((e_vec.norm() - elements.eccentricity).abs() < 1e-9);
        // Orbit normal must be inclined by the requested angle.
        let h_vec = r.cross(&v);
        let inc = (h_vec.z / h_vec.norm()).acos();
        assert!((inc - elements.inclination_rad).abs() < 1e-9);
    }

    #[test]
    fn kepler_periapsis_at_zero_mean_anomaly() {
        let elements = KeplerianElements {
            semi_major_axis_m: 7.0e6,
            eccentricity: 0.2,
            inclination_rad: 0.5,
            raan_rad: 0.0,
            arg_of_periapsis_rad: 0.0,
            mean_anomaly_rad: 0.0,
        };
        let (r, _) = elements.to_cartesian().unwrap();
        let r_periapsis = 7.0e6 * (1.0 - 0.2);
        assert!((r.norm() - r_periapsis).abs() < 1e-3);
    }
}
