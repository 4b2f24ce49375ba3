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

use super::{AstroError, KeplerianElements, State};
use crate::linalg::{DVector, Quaternion, UnitQuaternion, Vector3};
use std::fmt;
use std::ops::{Add, Mul, Sub};

/// Number of scalar components ahead of the rod magnetizations in the packed
/// vector: position (3), velocity (3), attitude quaternion (4), angular
/// velocity (3).
const FIXED_LEN: usize = 13;

/// The compound integration state: inertial position and velocity, attitude
/// quaternion (inertial to body), body-frame angular velocity, and one
/// irreversible magnetization scalar per hysteresis rod.
///
/// Between checkpoints the quaternion coefficients are four plain reals: the
/// unit-norm constraint is a physical invariant restored by
/// [`AocsState::restore_invariants`], never during stepper sub-stages.
#[derive(Clone, Debug, PartialEq)]
pub struct AocsState {
    /// Seconds since the simulation epoch.
    pub epoch_s: f64,
    /// Inertial position, in meters.
    pub radius: Vector3<f64>,
    /// Inertial velocity, in m/s.
    pub velocity: Vector3<f64>,
    /// Attitude quaternion rotating inertial to body, unnormalized storage.
    pub attitude: Quaternion<f64>,
    /// Body-frame angular velocity, in rad/s.
    pub angular_velocity: Vector3<f64>,
    /// Irreversible magnetization of each rod, in A/m.
    pub rod_magnetizations: DVector<f64>,
}

impl AocsState {
    pub fn new(
        epoch_s: f64,
        radius: Vector3<f64>,
        velocity: Vector3<f64>,
        attitude: Quaternion<f64>,
        angular_velocity: Vector3<f64>,
        rod_magnetizations: DVector<f64>,
    ) -> Self {
        Self {
            epoch_s,
            radius,
            velocity,
            attitude,
            angular_velocity,
            rod_magnetizations,
        }
    }

    /// Builds the initial state of a run: Cartesian state from the orbital
    /// elements, identity attitude, the provided body rates, and demagnetized
    /// rods.
    pub fn from_initial_conditions(
        orbit: &KeplerianElements,
        angular_velocity: Vector3<f64>,
        num_rods: usize,
        t_start_s: f64,
    ) -> Result<Self, AstroError> {
        let (radius, velocity) = orbit.to_cartesian()?;
        Ok(Self {
            epoch_s: t_start_s,
            radius,
            velocity,
            attitude: Quaternion::identity(),
            angular_velocity,
            rod_magnetizations: DVector::zeros(num_rods),
        })
    }

    pub fn rod_count(&self) -> usize {
        self.rod_magnetizations.len()
    }

    /// Component-wise absolute value over every component of the state.
    pub fn abs(&self) -> Self {
        Self {
            epoch_s: self.epoch_s,
            radius: self.radius.abs(),
            velocity: self.velocity.abs(),
            attitude: Quaternion::new(
                self.attitude.scalar().abs(),
                self.attitude.imag().x.abs(),
                self.attitude.imag().y.abs(),
                self.attitude.imag().z.abs(),
            ),
            angular_velocity: self.angular_velocity.abs(),
            rod_magnetizations: self.rod_magnetizations.abs(),
        }
    }

    /// Infinity norm across position, velocity, quaternion coefficients,
    /// angular velocity and, when rods are present, the magnetizations.
    pub fn inf_norm(&self) -> f64 {
        let mut max = 0.0_f64;
        for component in self.to_vector().iter() {
            max = max.max(component.abs());
        }
        max
    }

    /// Matches the rod count of a reference state, zero-filling new entries.
    pub fn resize_like(&mut self, other: &Self) {
        if self.rod_count() != other.rod_count() {
            self.rod_magnetizations =
                self.rod_magnetizations.clone().resize_vertically(other.rod_count(), 0.0);
        }
    }

    /// Restores the physical invariants at a checkpoint boundary: the
    /// attitude quaternion is renormalized and every rod magnetization is
    /// clamped to the saturation bound.
    pub fn restore_invariants(&mut self, saturation_magnetization: f64) {
        self.attitude = UnitQuaternion::from_quaternion(self.attitude).into_inner();
        for m_irr in self.rod_magnetizations.iter_mut() {
            *m_irr = m_irr.clamp(-saturation_magnetization, saturation_magnetization);
        }
    }

    /// The attitude as a unit quaternion (normalized copy).
    pub fn orientation(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::from_quaternion(self.attitude)
    }
}

impl State for AocsState {
    fn to_vector(&self) -> DVector<f64> {
        let n = self.rod_count();
        let mut vector = DVector::zeros(FIXED_LEN + n);
        vector.fixed_rows_mut::<3>(0).copy_from(&self.radius);
        vector.fixed_rows_mut::<3>(3).copy_from(&self.velocity);
        vector[6] = self.attitude.scalar();
        vector[7] = self.attitude.imag().x;
        vector[8] = self.attitude.imag().y;
        vector[9] = self.attitude.imag().z;
        vector
            .fixed_rows_mut::<3>(10)
            .copy_from(&self.angular_velocity);
        vector.rows_mut(FIXED_LEN, n).copy_from(&self.rod_magnetizations);
        vector
    }

    fn set(&mut self, epoch_s: f64, vector: &DVector<f64>) {
        let n = vector.len() - FIXED_LEN;
        self.epoch_s = epoch_s;
        self.radius = Vector3::new(vector[0], vector[1], vector[2]);
        self.velocity = Vector3::new(vector[3], vector[4], vector[5]);
        self.attitude = Quaternion::new(vector[6], vector[7], vector[8], vector[9]);
        self.angular_velocity = Vector3::new(vector[10], vector[11], vector[12]);
        self.rod_magnetizations = vector.rows(FIXED_LEN, n).into_owned();
    }

    fn epoch_s(&self) -> f64 {
        self.epoch_s
    }

    fn set_epoch_s(&mut self, epoch_s: f64) {
        self.epoch_s = epoch_s;
    }
}

impl Add for AocsState {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            epoch_s: self.epoch_s,
            radius: self.radius + other.radius,
            velocity: self.velocity + other.velocity,
            attitude: Quaternion::from(self.attitude.coords + other.attitude.coords),
            angular_velocity: self.angular_velocity + other.angular_velocity,
            rod_magnetizations: self.rod_magnetizations + other.rod_magnetizations,
        }
    }
}

impl Sub for AocsState {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self {
            epoch_s: self.epoch_s,
            radius: self.radius - other.radius,
            velocity: self.velocity - other.velocity,
            attitude: Quaternion::from(self.attitude.coords - other.attitude.coords),
            angular_velocity: self.angular_velocity - other.angular_velocity,
            rod_magnetizations: self.rod_magnetizations - other.rod_magnetizations,
        }
    }
}

impl Add<f64> for AocsState {
    type Output = Self;

    fn add(self, scalar: f64) -> Self {
        Self {
            epoch_s: self.epoch_s,
            radius: self.radius.add_scalar(scalar),
            velocity: self.velocity.add_scalar(scalar),
            attitude: Quaternion::from(self.attitude.coords.add_scalar(scalar)),
            angular_velocity: self.angular_velocity.add_scalar(scalar),
            rod_magnetizations: self.rod_magnetizations.add_scalar(scalar),
        }
    }
}

impl Mul<f64> for AocsState {
    type Output = Self;

    fn mul(self, scalar: f64) -> Self {
        Self {
            epoch_s: self.epoch_s,
            radius: self.radius * scalar,
            velocity: self.velocity * scalar,
            attitude: Quaternion::from(self.attitude.coords * scalar),
            angular_velocity: self.angular_velocity * scalar,
            rod_magnetizations: self.rod_magnetizations * scalar,
        }
    }
}

impl Mul<AocsState> for f64 {
    type Output = AocsState;

    fn mul(self, state: AocsState) -> AocsState {
        state * self
    }
}

impl fmt::Display for AocsState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "t = {:.3} s\tr = {:.3} m\tv = {:.3} m/s\t|w| = {:.6} rad/s\t{} rod(s)",
            self.epoch_s,
            self.radius.norm(),
            self.velocity.norm(),
            self.angular_velocity.norm(),
            self.rod_count()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state(num_rods: usize) -> AocsState {
        AocsState::new(
            0.0,
            Vector3::new(7.0e6, -1.0e5, 3.0e4),
            Vector3::new(10.0, 7.5e3, -20.0),
            Quaternion::new(0.9, 0.1, -0.2, 0.3),
            Vector3::new(0.1, -0.05, 0.08),
            DVector::from_vec((0..num_rods).map(|i| (i as f64) * 100.0 - 150.0).collect()),
        )
    }

    #[test]
    fn vector_round_trip() {
        let state = sample_state(4);
        let vector = state.to_vector();
        assert_eq!(vector.len(), 17);
        let mut rebuilt = sample_state(4);
        rebuilt.set(42.0, &vector);
        assert_eq!(rebuilt.radius, state.radius);
        assert_eq!(rebuilt.velocity, state.velocity);
        assert_eq!(rebuilt.attitude, state.attitude);
        assert_eq!(rebuilt.angular_velocity, state.angular_velocity);
        assert_eq!(rebuilt.rod_magnetizations, state.rod_magnetizations);
        assert!((rebuilt.epoch_s - 42.0).abs() < f64::EPSILON);
    }

    #[test]
    fn set_adopts_rod_count_of_vector() {
        let mut state = sample_state(0);
        let vector = sample_state(3).to_vector();
        state.set(0.0, &vector);
        assert_eq!(state.rod_count(), 3);
    }

    #[test]
    fn algebra_is_componentwise() {
        let a = sample_state(2);
        let b = sample_state(2);
        let sum = a.clone() + b.clone();
        assert_eq!(sum.radius, a.radius * 2.0);
        assert_eq!(sum.attitude.coords, a.attitude.coords * 2.0);
        assert_eq!(sum.rod_magnetizations, a.rod_magnetizations.clone() * 2.0);

        let diff = sum.clone() - b.clone();
        assert!((diff.to_vector() - a.to_vector()).abs().max() < 1e-12);

        let scaled = 2.0 * a.clone();
        assert_eq!(scaled.to_vector(), a.to_vector() * 2.0);

        let shifted = a.clone() + 1.5;
        assert!((shifted.velocity.x - (a.velocity.x + 1.5)).abs() < 1e-12);
    }

    #[test]
    fn inf_norm_spans_all_components() {
        let state = sample_state(2);
        assert!((state.inf_norm() - 7.0e6).abs() < 1e-6);

        let rodless = sample_state(0);
        assert!((rodless.inf_norm() - 7.0e6).abs() < 1e-6);

        // A rod magnetization dominating every other component must win.
        let mut hot = sample_state(1);
        hot.rod_magnetizations[0] = -9.9e7;
        assert!((hot.inf_norm() - 9.9e7).abs() < 1e-6);
    }

    #[test]
    fn abs_is_componentwise() {
        let state = sample_state(2).abs();
        assert!(state.attitude.imag().y > 0.0);
        assert!(state.rod_magnetizations.iter().all(|m| *m >= 0.0));
    }

    #[test]
    fn resize_matches_reference() {
        let mut state = sample_state(0);
        let reference = sample_state(4);
        state.resize_like(&reference);
        assert_eq!(state.rod_count(), 4);
        assert!(state.rod_magnetizations.iter().all(|m| *m == 0.0));
    }

    #[test]
    fn restore_invariants_normalizes_and_clamps() {
        let mut state = sample_state(2);
        state.rod_magnetizations[0] = 9.0e5;
        state.rod_magnetizations[1] = -9.0e5;
        state.restore_invariants(6.0e5);
        assert!((state.attitude.norm() - 1.0).abs() < 1e-12);
        assert!((state.rod_magnetizations[0] - 6.0e5).abs() < 1e-12);
        assert!((state.rod_magnetizations[1] + 6.0e5).abs() < 1e-12);
    }
}
