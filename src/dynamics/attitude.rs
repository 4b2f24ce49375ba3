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

use super::{Dynamics, DynamicsError};
use crate::cosmic::{AocsState, Spacecraft, State};
use crate::environment::EnvironmentModel;
use crate::linalg::{DVector, Matrix3, Quaternion, UnitQuaternion, Vector3};

/// The coupled equations of motion of a passively stabilized spacecraft:
/// Keplerian translation under the environment's gravity, quaternion attitude
/// kinematics, rigid-body rotation under magnetic, gravity-gradient and
/// gyroscopic torques, and the Jiles-Atherton state of every rod.
#[derive(Clone)]
pub struct AocsDynamics<'a> {
    spacecraft: &'a Spacecraft,
    environment: &'a dyn EnvironmentModel,
}

/// Inputs of the net-torque assembly. The members are easily confused by
/// position; keep them named.
pub struct TorqueInputs<'a> {
    pub omega_body_rad_s: &'a Vector3<f64>,
    pub b_body_t: &'a Vector3<f64>,
    pub rod_torque_nm: &'a Vector3<f64>,
    pub r_eci_m: &'a Vector3<f64>,
    pub attitude: &'a UnitQuaternion<f64>,
}

impl<'a> AocsDynamics<'a> {
    pub fn new(spacecraft: &'a Spacecraft, environment: &'a dyn EnvironmentModel) -> Self {
        Self {
            spacecraft,
            environment,
        }
    }

    /// Per-rod effects: writes each dM_irr/dt into the derivative slots and
    /// returns the accumulated rod torque.
    fn compute_rod_effects(
        &self,
        rod_magnetizations: &[f64],
        b_body: &Vector3<f64>,
        b_dot_body: &Vector3<f64>,
        dm_dt_out: &mut [f64],
    ) -> Vector3<f64> {
        let mut total_torque = Vector3::zeros();
        let rods = self.spacecraft.rods().iter().zip(rod_magnetizations.iter());
        for (i, (rod, m_irr)) in rods.enumerate() {
            dm_dt_out[i] = rod.magnetization_derivative(*m_irr, b_body, b_dot_body);
            total_torque += rod.magnetic_moment(*m_irr, b_body).cross(b_body);
        }
        total_torque
    }

    fn compute_net_torque(&self, inputs: &TorqueInputs) -> Vector3<f64> {
        let mut torque = Vector3::zeros();

        // permanent magnet
        torque += self
            .spacecraft
            .magnet()
            .magnetic_moment()
            .cross(inputs.b_body_t);

        // hysteresis rods
        torque += inputs.rod_torque_nm;

        // gyroscopic coupling: -omega x (I omega)
        torque -= inputs
            .omega_body_rad_s
            .cross(&(self.spacecraft.inertia_tensor() * inputs.omega_body_rad_s));

        // gravity gradient
        torque += self.compute_gravity_gradient_torque(inputs.r_eci_m, inputs.attitude);

        torque
    }

    /// tau_gg = (3 mu / r^5) * r_body x (I r_body)
    fn compute_gravity_gradient_torque(
        &self,
        r_eci: &Vector3<f64>,
        attitude: &UnitQuaternion<f64>,
    ) -> Vector3<f64> {
        let mu = self.environment.gravity_parameter();
        if mu == 0.0 {
            return Vector3::zeros();
        }
        let r_body = attitude.to_rotation_matrix().matrix().transpose() * r_eci;
        let r_sq = r_body.norm_squared();
        let coefficient = 3.0 * mu / (r_sq * r_sq * r_sq.sqrt());
        coefficient * r_body.cross(&(self.spacecraft.inertia_tensor() * r_body))
    }

    /// dq/dt = 1/2 q (x) [0, omega]
    fn attitude_derivative(attitude: &Quaternion<f64>, omega: &Vector3<f64>) -> Quaternion<f64> {
        let omega_q = Quaternion::new(0.0, omega.x, omega.y, omega.z);
        (*attitude * omega_q) * 0.5
    }
}

impl<'a> Dynamics for AocsDynamics<'a> {
    type StateType = AocsState;

    fn eom(
        &self,
        delta_t: f64,
        state_vec: &DVector<f64>,
        state_ctx: &AocsState,
    ) -> Result<DVector<f64>, DynamicsError> {
        let num_rods = state_vec.len() - 13;
        let t_global = state_ctx.epoch_s() + delta_t;

        let r_eci = Vector3::new(state_vec[0], state_vec[1], state_vec[2]);
        let v_eci = Vector3::new(state_vec[3], state_vec[4], state_vec[5]);
        // Normalized local copy; the raw coefficients in the stepper's vector
        // are left untouched.
        let attitude = UnitQuaternion::from_quaternion(Quaternion::new(
            state_vec[6],
            state_vec[7],
            state_vec[8],
            state_vec[9],
        ));
        let omega_body = Vector3::new(state_vec[10], state_vec[11], state_vec[12]);

        let env = self.environment.fields_at(t_global, &r_eci, &v_eci)?;

        let r_eci_to_body: Matrix3<f64> = attitude.to_rotation_matrix().matrix().transpose();
        let b_body = r_eci_to_body * env.b_field_eci_t;
        // Material derivative seen from the rotating body frame: transport
        // theorem adds -omega x B to the rotated inertial rate.
        let b_dot_body = r_eci_to_body * env.b_field_dot_eci_t_s - omega_body.cross(&b_body);

        let mut derivative = DVector::zeros(state_vec.len());

        // Orbit
        derivative.fixed_rows_mut::<3>(0).copy_from(&v_eci);
        derivative
            .fixed_rows_mut::<3>(3)
            .copy_from(&env.gravity_eci_m_s2);

        // Rods
        let mut dm_dt = vec![0.0; num_rods];
        let rod_torque = self.compute_rod_effects(
            state_vec.as_slice().get(13..).unwrap_or(&[]),
            &b_body,
            &b_dot_body,
            &mut dm_dt,
        );

        // Rotational dynamics
        let net_torque = self.compute_net_torque(&TorqueInputs {
            omega_body_rad_s: &omega_body,
            b_body_t: &b_body,
            rod_torque_nm: &rod_torque,
            r_eci_m: &r_eci,
            attitude: &attitude,
        });
        let omega_dot = self.spacecraft.inertia_tensor_inverse() * net_torque;
        derivative.fixed_rows_mut::<3>(10).copy_from(&omega_dot);

        // Attitude kinematics
        let q_dot = Self::attitude_derivative(attitude.quaternion(), &omega_body);
        derivative[6] = q_dot.scalar();
        derivative[7] = q_dot.imag().x;
        derivative[8] = q_dot.imag().y;
        derivative[9] = q_dot.imag().z;

        for (i, dm) in dm_dt.iter().enumerate() {
            derivative[13 + i] = *dm;
        }

        Ok(derivative)
    }

    fn at_checkpoint(&self, mut state: AocsState) -> Result<AocsState, DynamicsError> {
        let saturation = self
            .spacecraft
            .rods()
            .first()
            .map(|rod| rod.params().ms)
            .unwrap_or(f64::INFINITY);
        state.restore_invariants(saturation);
        Ok(state)
    }
}
