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

use crate::environment::EnvironmentError;
use crate::linalg::DVector;
use crate::State;
use snafu::Snafu;

/// The Jiles-Atherton hysteresis rod model.
pub mod hysteresis;

/// The coupled orbit/attitude/hysteresis equations of motion.
pub mod attitude;
pub use self::attitude::*;

/// The `Dynamics` trait stores an equation of motion and is driven by the
/// propagators.
///
/// The state vector passed to `eom` is the stepper's intermediate vector and
/// changes for every sub-stage of a trial step; the state context is the
/// state being propagated and provides whatever the vector alone cannot
/// rebuild (the epoch and the rod count).
pub trait Dynamics: Clone {
    type StateType: State;

    /// Defines the equations of motion for these dynamics. The time
    /// `delta_t` is in seconds past the context epoch.
    fn eom(
        &self,
        delta_t: f64,
        state_vec: &DVector<f64>,
        state_ctx: &Self::StateType,
    ) -> Result<DVector<f64>, DynamicsError>;

    /// Optionally performs some final changes after each successful
    /// integration step. Also called once just before the first step.
    fn finally(&self, next_state: Self::StateType) -> Result<Self::StateType, DynamicsError> {
        Ok(next_state)
    }

    /// Restores the physical invariants of the state at a checkpoint
    /// boundary. This deliberately does not run on every accepted step:
    /// between checkpoints the state is allowed to drift within the stepper
    /// tolerance.
    fn at_checkpoint(&self, state: Self::StateType) -> Result<Self::StateType, DynamicsError> {
        Ok(state)
    }
}

/// Stores dynamical model errors
#[derive(Debug, Snafu)]
pub enum DynamicsError {
    #[snafu(
        display("dynamical model encountered an environment error: {source}"),
        context(false)
    )]
    DynamicsEnvironment { source: EnvironmentError },
}
