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

use crate::dynamics::DynamicsError;
use crate::io::observer::ObserverError;
use crate::time::Duration;
use snafu::Snafu;
use std::fmt;

/// Provides different methods for controlling the error computation of the
/// integrator.
pub mod error_ctrl;
pub use self::error_ctrl::*;

// Re-Export
mod propagator;
pub use self::propagator::*;
mod instance;
pub use self::instance::*;
mod rk_methods;
pub use self::rk_methods::*;
mod options;
pub use self::options::*;

/// Stores the details of the previous integration step of a given propagator.
#[derive(Copy, Clone, Debug)]
pub struct IntegrationDetails {
    /// step size used
    pub step: Duration,
    /// error in the previous integration step
    pub error: f64,
    /// number of attempts needed by an adaptive step size to be within the tolerance
    pub attempts: u8,
}

impl fmt::Display for IntegrationDetails {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "IntegrationDetails {{step: {}, error: {:.3e}, attempts: {}}}",
            self.step, self.error, self.attempts
        )
    }
}

#[derive(Debug, Snafu)]
pub enum PropagationError {
    #[snafu(display("encountered a dynamics error: {source}"), context(false))]
    Dynamics { source: DynamicsError },

    #[snafu(display(
        "step size underflow at t = {epoch_s} s: error {error:.3e} still above tolerance at the minimum step"
    ))]
    StepSizeUnderflow { epoch_s: f64, error: f64 },

    #[snafu(display(
        "step budget of {budget} accepted steps exhausted at t = {epoch_s} s: tolerances unreachable"
    ))]
    StepBudgetExhausted { budget: u64, epoch_s: f64 },

    #[snafu(display("observer failed during propagation: {source}"), context(false))]
    ObserverWrite { source: ObserverError },
}
