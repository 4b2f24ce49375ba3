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

use crate::cosmic::{
    EARTH_MU_M3_S2, GEOMAGNETIC_REFERENCE_RADIUS_M, NT_TO_T, SECONDS_PER_YEAR,
};
use crate::linalg::{Matrix3, Vector3};
use snafu::{ensure, Snafu};
use std::cell::Cell;
use std::path::Path;

/// Frame math: Earth rotation, geodetic conversions, local tangent bases.
pub mod frames;
pub use self::frames::*;

/// World Magnetic Model coefficient storage and field synthesis.
pub mod geomag;
pub use self::geomag::*;

/// Gravity potential storage and spherical-harmonics acceleration.
pub mod gravity;
pub use self::gravity::*;

/// Micro-step of the forward difference yielding the material derivative of
/// the geomagnetic field, in seconds.
const GRADIENT_STEP_S: f64 = 1.0;

/// Below this geocentric distance the environment is singular, in meters.
const POSITION_SINGULARITY_M: f64 = 1e-6;

/// Decimal-year validity range of the harmonic models. Evaluations outside
/// log a warning and proceed.
const YEAR_RANGE: (f64, f64) = (1900.0, 2100.0);

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum EnvironmentError {
    #[snafu(display("environment data file missing: {path}"))]
    DataFileMissing { path: String },

    #[snafu(display("environment data file {path} unreadable: {details}"))]
    DataFileUnreadable { path: String, details: String },

    #[snafu(display(
        "position singularity at t = {t_s} s: |r| = {radius_m} m is below the singularity bound"
    ))]
    PositionSingularity { t_s: f64, radius_m: f64 },
}

/// The environment quantities a dynamics evaluation consumes, all in ECI.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnvironmentFields {
    /// Geomagnetic field, in tesla.
    pub b_field_eci_t: Vector3<f64>,
    /// Material derivative of the geomagnetic field along the trajectory, in
    /// tesla per second.
    pub b_field_dot_eci_t_s: Vector3<f64>,
    /// Total gravity acceleration (central term included), in m/s^2.
    pub gravity_eci_m_s2: Vector3<f64>,
}

/// The capability the dynamics consume: geomagnetic field, its material
/// derivative and gravity at any inertial position and time.
pub trait EnvironmentModel {
    /// Computes the environment state at `t` seconds past the simulation
    /// epoch for a point at `r_eci_m` moving at `v_eci_m_s`.
    fn fields_at(
        &self,
        t_s: f64,
        r_eci_m: &Vector3<f64>,
        v_eci_m_s: &Vector3<f64>,
    ) -> Result<EnvironmentFields, EnvironmentError>;

    /// The gravitational parameter driving the gravity-gradient torque.
    /// Mocks may return zero to disable it.
    fn gravity_parameter(&self) -> f64 {
        EARTH_MU_M3_S2
    }
}

/// Geodetic point and rotation set shared by the field evaluations at one
/// (t, r) pair.
struct LocalFrame {
    r_ecef_m: Vector3<f64>,
    geodetic: GeodeticPoint,
    enu_to_ecef: Matrix3<f64>,
    ecef_to_eci: Matrix3<f64>,
}

/// The full environment: World Magnetic Model geomagnetic field and
/// spherical-harmonics gravity, both evaluated on the WGS-84 ellipsoid.
pub struct HarmonicEnvironment {
    epoch_year: f64,
    magnetic: MagneticModel,
    gravity: GravityField<CoefficientTable>,
    year_warned: Cell<bool>,
}

impl HarmonicEnvironment {
    pub fn new(
        epoch_year: f64,
        magnetic: MagneticModel,
        gravity: GravityField<CoefficientTable>,
    ) -> Self {
        Self {
            epoch_year,
            magnetic,
            gravity,
            year_warned: Cell::new(false),
        }
    }

    /// Loads both harmonic models from their coefficient files. The gravity
    /// file is assumed gunzipped when it carries a `.gz` extension.
    pub fn load<P: AsRef<Path>>(
        epoch_year: f64,
        magnetic_path: P,
        gravity_path: P,
        gravity_degree: usize,
    ) -> Result<Self, EnvironmentError> {
        let magnetic = MagneticModel::from_cof(&magnetic_path)?;
        info!(
            "geomagnetic model loaded from {} (epoch {}, degree {})",
            magnetic_path.as_ref().display(),
            magnetic.coeffs().epoch_year(),
            magnetic.coeffs().degree()
        );
        let gunzipped = gravity_path
            .as_ref()
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));
        let table =
            CoefficientTable::from_egm(&gravity_path, gravity_degree, gravity_degree, gunzipped)?;
        Ok(Self::new(epoch_year, magnetic, GravityField::new(table)))
    }

    fn local_frame(&self, t_s: f64, r_eci_m: &Vector3<f64>) -> LocalFrame {
        let ecef_to_eci = ecef_to_eci_rotation(t_s);
        let r_ecef_m = ecef_to_eci.transpose() * r_eci_m;
        let geodetic = geodetic_from_ecef(&r_ecef_m);
        let enu_to_ecef = enu_to_ecef_rotation(geodetic.latitude_rad, geodetic.longitude_rad);
        LocalFrame {
            r_ecef_m,
            geodetic,
            enu_to_ecef,
            ecef_to_eci,
        }
    }

    fn decimal_year(&self, t_s: f64) -> f64 {
        let year = self.epoch_year + t_s / SECONDS_PER_YEAR;
        if (year < YEAR_RANGE.0 || year > YEAR_RANGE.1) && !self.year_warned.get() {
            warn!(
                "evaluation year {year:.2} is outside the validity range [{}, {}] of the \
                 harmonic models; proceeding",
                YEAR_RANGE.0, YEAR_RANGE.1
            );
            self.year_warned.set(true);
        }
        year
    }

    fn magnetic_field_eci(&self, t_s: f64, frame: &LocalFrame) -> Vector3<f64> {
        let year = self.decimal_year(t_s);
        let b_enu_nt = self.magnetic.field_enu_nt(
            year,
            frame.geodetic.latitude_rad,
            frame.geodetic.longitude_rad,
            frame.geodetic.height_m,
        );
        let enu_to_eci = frame.ecef_to_eci * frame.enu_to_ecef;
        enu_to_eci * (b_enu_nt * NT_TO_T)
    }

    fn gravity_eci(&self, frame: &LocalFrame) -> Vector3<f64> {
        let r = frame.r_ecef_m.norm();
        let central_ecef = -EARTH_MU_M3_S2 / r.powi(3) * frame.r_ecef_m;
        let g_ecef = central_ecef + self.gravity.acceleration(&frame.r_ecef_m);
        // Through the local tangent frame, so gravity and the geomagnetic
        // field take the same ENU -> ECI path.
        let g_enu = frame.enu_to_ecef.transpose() * g_ecef;
        (frame.ecef_to_eci * frame.enu_to_ecef) * g_enu
    }
}

impl EnvironmentModel for HarmonicEnvironment {
    fn fields_at(
        &self,
        t_s: f64,
        r_eci_m: &Vector3<f64>,
        v_eci_m_s: &Vector3<f64>,
    ) -> Result<EnvironmentFields, EnvironmentError> {
        ensure!(
            r_eci_m.norm() >= POSITION_SINGULARITY_M,
            PositionSingularitySnafu {
                t_s,
                radius_m: r_eci_m.norm(),
            }
        );

        let frame = self.local_frame(t_s, r_eci_m);
        let b_now = self.magnetic_field_eci(t_s, &frame);

        // First-order forward difference along the trajectory: the point
        // advances with its velocity while the Earth rotates beneath it.
        let r_ahead = r_eci_m + v_eci_m_s * GRADIENT_STEP_S;
        let frame_ahead = self.local_frame(t_s + GRADIENT_STEP_S, &r_ahead);
        let b_ahead = self.magnetic_field_eci(t_s + GRADIENT_STEP_S, &frame_ahead);

        Ok(EnvironmentFields {
            b_field_eci_t: b_now,
            b_field_dot_eci_t_s: (b_ahead - b_now) / GRADIENT_STEP_S,
            gravity_eci_m_s2: self.gravity_eci(&frame),
        })
    }
}

/// A mock environment holding a constant inertial field. The gravitational
/// parameter is configurable so tests can disable the central pull and the
/// gravity-gradient torque together.
pub struct UniformFieldEnvironment {
    b_eci_t: Vector3<f64>,
    mu_m3_s2: f64,
}

impl UniformFieldEnvironment {
    pub fn new(b_eci_t: Vector3<f64>, mu_m3_s2: f64) -> Self {
        Self { b_eci_t, mu_m3_s2 }
    }

    /// Constant field, no gravity at all.
    pub fn field_only(b_eci_t: Vector3<f64>) -> Self {
        Self::new(b_eci_t, 0.0)
    }
}

impl EnvironmentModel for UniformFieldEnvironment {
    fn fields_at(
        &self,
        t_s: f64,
        r_eci_m: &Vector3<f64>,
        _v_eci_m_s: &Vector3<f64>,
    ) -> Result<EnvironmentFields, EnvironmentError> {
        ensure!(
            r_eci_m.norm() >= POSITION_SINGULARITY_M,
            PositionSingularitySnafu {
                t_s,
                radius_m: r_eci_m.norm(),
            }
        );
        let gravity = if self.mu_m3_s2 != 0.0 {
            -self.mu_m3_s2 / r_eci_m.norm().powi(3) * r_eci_m
        } else {
            Vector3::zeros()
        };
        Ok(EnvironmentFields {
            b_field_eci_t: self.b_eci_t,
            b_field_dot_eci_t_s: Vector3::zeros(),
            gravity_eci_m_s2: gravity,
        })
    }

    fn gravity_parameter(&self) -> f64 {
        self.mu_m3_s2
    }
}

/// A co-rotating tilted-dipole geomagnetic approximation over Newtonian
/// central gravity. Keeps multi-day test runs free of coefficient files.
pub struct DipoleEnvironment {
    equatorial_field_t: f64,
    dipole_axis_ecef: Vector3<f64>,
}

impl DipoleEnvironment {
    /// `tilt_rad` tips the dipole axis away from the -Z ECEF axis, towards
    /// +X at zero longitude.
    pub fn new(equatorial_field_t: f64, tilt_rad: f64) -> Self {
        let (sin_tilt, cos_tilt) = tilt_rad.sin_cos();
        Self {
            equatorial_field_t,
            dipole_axis_ecef: Vector3::new(sin_tilt, 0.0, -cos_tilt),
        }
    }

    /// Nominal Earth dipole: 31.2 uT equatorial strength, 11.5 deg tilt.
    pub fn earth() -> Self {
        Self::new(3.12e-5, 11.5_f64.to_radians())
    }

    fn field_eci(&self, t_s: f64, r_eci_m: &Vector3<f64>) -> Vector3<f64> {
        let ecef_to_eci = ecef_to_eci_rotation(t_s);
        let r_ecef = ecef_to_eci.transpose() * r_eci_m;
        let r = r_ecef.norm();
        let r_hat = r_ecef / r;
        let axis = self.dipole_axis_ecef;
        let scale = self.equatorial_field_t * (GEOMAGNETIC_REFERENCE_RADIUS_M / r).powi(3);
        let b_ecef = scale * (3.0 * axis.dot(&r_hat) * r_hat - axis);
        ecef_to_eci * b_ecef
    }
}

impl EnvironmentModel for DipoleEnvironment {
    fn fields_at(
        &self,
        t_s: f64,
        r_eci_m: &Vector3<f64>,
        v_eci_m_s: &Vector3<f64>,
    ) -> Result<EnvironmentFields, EnvironmentError> {
        ensure!(
            r_eci_m.norm() >= POSITION_SINGULARITY_M,
            PositionSingularitySnafu {
                t_s,
                radius_m: r_eci_m.norm(),
            }
        );
        let b_now = self.field_eci(t_s, r_eci_m);
        let r_ahead = r_eci_m + v_eci_m_s * GRADIENT_STEP_S;
        let b_ahead = self.field_eci(t_s + GRADIENT_STEP_S, &r_ahead);
        Ok(EnvironmentFields {
            b_field_eci_t: b_now,
            b_field_dot_eci_t_s: (b_ahead - b_now) / GRADIENT_STEP_S,
            gravity_eci_m_s2: -EARTH_MU_M3_S2 / r_eci_m.norm().powi(3) * r_eci_m,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_environment_rejects_singular_position() {
        let env = UniformFieldEnvironment::field_only(Vector3::zeros());
        let err = env
            .fields_at(0.0, &Vector3::new(1e-9, 0.0, 0.0), &Vector3::zeros())
            .unwrap_err();
        assert!(matches!(err, EnvironmentError::PositionSingularity { .. }));
    }

    #[test]
    fn uniform_environment_is_static() {
        let b = Vector3::new(1.0e-5, -2.0e-5, 3.0e-5);
        let env = UniformFieldEnvironment::field_only(b);
        let fields = env
            .fields_at(100.0, &Vector3::new(7.0e6, 0.0, 0.0), &Vector3::new(0.0, 7.5e3, 0.0))
            .unwrap();
        assert_eq!(fields.b_field_eci_t, b);
        assert_eq!(fields.b_field_dot_eci_t_s, Vector3::zeros());
        assert_eq!(fields.gravity_eci_m_s2, Vector3::zeros());
        assert_eq!(env.gravity_parameter(), 0.0);
    }

    #[test]
    fn dipole_points_north_at_the_equator() {
        let env = DipoleEnvironment::new(3.12e-5, 0.0);
        let r = Vector3::new(7.0e6, 0.0, 0.0);
        let fields = env.fields_at(0.0, &r, &Vector3::zeros()).unwrap();
        let b = fields.b_field_eci_t;
        let expected = 3.12e-5 * (GEOMAGNETIC_REFERENCE_RADIUS_M / 7.0e6).powi(3);
        assert!((b.z - expected).abs() < 1e-12);
        assert!(b.x.abs() < 1e-18 && b.y.abs() < 1e-18);
    }

    #[test]
    fn dipole_field_varies_along_an_orbit() {
        let env = DipoleEnvironment::earth();
        let r = Vector3::new(7.0e6, 0.0, 0.0);
        let v = Vector3::new(0.0, 7.5e3, 0.0);
        let fields = env.fields_at(0.0, &r, &v).unwrap();
        // The material derivative cannot vanish for a moving point in a
        // tilted dipole.
        assert!(fields.b_field_dot_eci_t_s.norm() > 0.0);
        // Central gravity points back at the Earth.
        assert!(fields.gravity_eci_m_s2.x < 0.0);
        assert!((env.gravity_parameter() - EARTH_MU_M3_S2).abs() < 1.0);
    }
}
