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

use super::error_ctrl::{ErrorCtrl, ScaledInfNorm};
use super::{Dormand45, Fehlberg78, IntegrationDetails, PropInstance, RK};
use crate::cosmic::State;
use crate::dynamics::Dynamics;
use crate::linalg::DVector;
use crate::propagators::PropOpts;

/// A Propagator allows propagating a set of dynamics forward in time. It
/// includes the options, and the set of Butcher-table coefficients of the
/// monomorphic instance.
#[derive(Clone, Debug)]
pub struct Propagator<D: Dynamics, E: ErrorCtrl> {
    pub dynamics: D, // Stores the dynamics used. *Must* use this to get the latest values
    pub opts: PropOpts<E>, // Stores the integration options (tolerance, min/max step, init step, etc.)
    pub(crate) order: u8,  // Order of the integrator
    pub(crate) stages: usize, // Number of stages, i.e. how many times the derivatives will be called
    pub(crate) a_coeffs: &'static [f64],
    pub(crate) b_coeffs: &'static [f64],
}

impl<D: Dynamics, E: ErrorCtrl> Propagator<D, E> {
    /// Each propagator must be initialized with `new` which stores
    /// propagator information.
    pub fn new<T: RK>(dynamics: D, opts: PropOpts<E>) -> Self {
        Self {
            dynamics,
            opts,
            stages: T::STAGES,
            order: T::ORDER,
            a_coeffs: T::A_COEFFS,
            b_coeffs: T::B_COEFFS,
        }
    }

    /// A Dormand-Prince 5(4) propagator with custom options, the default
    /// stepper.
    pub fn dormand45(dynamics: D, opts: PropOpts<E>) -> Self {
        Self::new::<Dormand45>(dynamics, opts)
    }

    /// A Runge-Kutta-Fehlberg 7(8) propagator with custom options.
    pub fn fehlberg78(dynamics: D, opts: PropOpts<E>) -> Self {
        Self::new::<Fehlberg78>(dynamics, opts)
    }

    /// Creates a propagator instance from the provided initial state.
    pub fn with(&self, state: D::StateType) -> PropInstance<'_, D, E> {
        // Pre-allocate the k stage vectors used by the trial steps.
        let vec_len = state.to_vector().len();
        let mut k = Vec::with_capacity(self.stages);
        for _ in 0..self.stages {
            k.push(DVector::zeros(vec_len));
        }
        PropInstance {
            state,
            prop: self,
            details: IntegrationDetails {
                step: self.opts.init_step,
                error: 0.0,
                attempts: 1,
            },
            step_size: self.opts.init_step,
            fixed_step: self.opts.fixed_step,
            k,
        }
    }
}

impl<D: Dynamics> Propagator<D, ScaledInfNorm> {
    /// Default propagator is a Dormand-Prince 5(4) with the default options.
    pub fn default(dynamics: D) -> Self {
        Self::new::<Dormand45>(dynamics, PropOpts::default())
    }

    /// A default Fehlberg 7(8) propagator with the default options.
    pub fn default_fehlberg78(dynamics: D) -> Self {
        Self::new::<Fehlberg78>(dynamics, PropOpts::default())
    }
}
