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

use super::error_ctrl::ErrorCtrl;
use super::{IntegrationDetails, PropagationError, Propagator};
use crate::cosmic::State;
use crate::dynamics::Dynamics;
use crate::io::observer::StateObserver;
use crate::linalg::DVector;
use crate::time::{Duration, Unit};

/// Accepted steps per second of span when no explicit budget is configured.
const DEFAULT_STEPS_PER_SECOND: f64 = 1000.0;

/// A propagator instance: the state being propagated, the setup it runs
/// under, and the details of the previous integration step.
#[derive(Debug)]
pub struct PropInstance<'a, D: Dynamics, E: ErrorCtrl> {
    /// The state of this propagator instance
    pub state: D::StateType,
    /// The propagator setup (kind, stages, etc.)
    pub prop: &'a Propagator<D, E>,
    /// Stores the details of the previous integration step
    pub details: IntegrationDetails,
    pub(crate) step_size: Duration, // Stores the adapted step for the _next_ call
    pub(crate) fixed_step: bool,
    // Allows us to do pre-allocation of the ki vectors
    pub(crate) k: Vec<DVector<f64>>,
}

impl<'a, D: Dynamics, E: ErrorCtrl> PropInstance<'a, D, E> {
    /// Allows setting the step size of the propagator
    pub fn set_step(&mut self, step_size: Duration, fixed: bool) {
        self.step_size = step_size;
        self.fixed_step = fixed;
    }

    /// This method propagates the provided Dynamics for the provided
    /// duration, without any observation.
    pub fn for_duration(&mut self, duration: Duration) -> Result<D::StateType, PropagationError> {
        self.for_duration_observer_option(duration, None)
    }

    /// Full-span run mode: propagates for the provided duration and hands
    /// every accepted step to the observer.
    pub fn for_duration_with_observer(
        &mut self,
        duration: Duration,
        observer: &mut dyn StateObserver<D::StateType>,
    ) -> Result<D::StateType, PropagationError> {
        self.for_duration_observer_option(duration, Some(observer))
    }

    /// Checkpointed run mode: repeatedly integrates a slice of up to
    /// `checkpoint` seconds, restores the physical invariants through the
    /// dynamics' checkpoint hook, and emits one observation per boundary.
    /// Bounds the output volume of multi-year runs.
    pub fn for_duration_checkpointed(
        &mut self,
        duration: Duration,
        checkpoint: Duration,
        observer: &mut dyn StateObserver<D::StateType>,
    ) -> Result<D::StateType, PropagationError> {
        let mut remaining = duration;
        while remaining > Duration::ZERO {
            let slice = if remaining > checkpoint {
                checkpoint
            } else {
                remaining
            };
            self.for_duration(slice)?;
            self.state = self.prop.dynamics.at_checkpoint(self.state.clone())?;
            observer.observe(self.state.epoch_s(), &self.state)?;
            remaining = remaining - slice;
        }
        Ok(self.state.clone())
    }

    fn for_duration_observer_option(
        &mut self,
        duration: Duration,
        mut maybe_observer: Option<&mut dyn StateObserver<D::StateType>>,
    ) -> Result<D::StateType, PropagationError> {
        if duration <= Duration::ZERO {
            return Ok(self.state.clone());
        }
        let stop_epoch_s = self.state.epoch_s() + duration.to_seconds();
        if duration > 2.0 * Unit::Minute {
            info!(
                "Propagating for {} until t = {} s",
                duration, stop_epoch_s
            );
        }
        // Call `finally` on the current state to set anything up.
        self.state = self.prop.dynamics.finally(self.state.clone())?;

        let budget = self.prop.opts.step_budget.unwrap_or_else(|| {
            (DEFAULT_STEPS_PER_SECOND * duration.to_seconds()).max(1000.0) as u64
        });
        let mut accepted: u64 = 0;

        loop {
            let epoch_s = self.state.epoch_s();
            if epoch_s + self.step_size.to_seconds() >= stop_epoch_s {
                let remaining = stop_epoch_s - epoch_s;
                if remaining <= 0.0 {
                    return Ok(self.state.clone());
                }
                // Take one final step of exactly the needed duration.
                let prev_step_size = self.step_size;
                let prev_step_kind = self.fixed_step;
                self.set_step(remaining * Unit::Second, true);

                self.single_step()?;
                if let Some(observer) = maybe_observer.as_mut() {
                    observer.observe(self.state.epoch_s(), &self.state)?;
                }

                // Restore the step size for subsequent calls.
                self.set_step(prev_step_size, prev_step_kind);
                return Ok(self.state.clone());
            } else {
                self.single_step()?;
                if let Some(observer) = maybe_observer.as_mut() {
                    observer.observe(self.state.epoch_s(), &self.state)?;
                }
                accepted += 1;
                if accepted > budget {
                    return Err(PropagationError::StepBudgetExhausted {
                        budget,
                        epoch_s: self.state.epoch_s(),
                    });
                }
            }
        }
    }

    /// Take a single propagator step.
    pub fn single_step(&mut self) -> Result<(), PropagationError> {
        let (step_taken, next_vector) = self.derive()?;
        let next_epoch = self.state.epoch_s() + step_taken.to_seconds();
        self.state.set(next_epoch, &next_vector);
        self.state = self.prop.dynamics.finally(self.state.clone())?;
        Ok(())
    }

    /// This method integrates the dynamics by one accepted step, adapting
    /// the step size until the error-control estimate is within tolerance.
    ///
    /// Returns the step size used and the new state vector as
    /// y_{n+1} = y_n + sum_i b_i k_i.
    fn derive(&mut self) -> Result<(Duration, DVector<f64>), PropagationError> {
        let state_vec = self.state.to_vector();
        let state_ctx = &self.state;
        // Reset the number of attempts used, not the error: it is set before
        // it is read.
        self.details.attempts = 1;
        // The step size in seconds is mutable: it may shrink below.
        let mut step_size_s = self.step_size.to_seconds();
        loop {
            let ki = self.prop.dynamics.eom(0.0, &state_vec, state_ctx)?;
            self.k[0] = ki;
            let mut a_idx: usize = 0;
            for i in 0..(self.prop.stages - 1) {
                // Compute the c_i by summing the relevant items of the A row:
                // c_i = sum_j a_ij for a consistent table.
                let mut ci: f64 = 0.0;
                // wi stores a_i1 * k_1 + a_i2 * k_2 + ... + a_i,i * k_i
                let mut wi = DVector::zeros(state_vec.len());
                for kj in &self.k[0..i + 1] {
                    let a_ij = self.prop.a_coeffs[a_idx];
                    ci += a_ij;
                    wi += a_ij * kj;
                    a_idx += 1;
                }

                let ki = self.prop.dynamics.eom(
                    ci * step_size_s,
                    &(&state_vec + step_size_s * wi),
                    state_ctx,
                )?;
                self.k[i + 1] = ki;
            }

            // Compute the next state and the embedded error estimate,
            // sum_i h (b_i - b*_i) k_i.
            let mut next_state = state_vec.clone();
            let mut error_est = DVector::zeros(state_vec.len());
            for (i, ki) in self.k.iter().enumerate() {
                let b_i = self.prop.b_coeffs[i];
                if !self.fixed_step {
                    let b_i_star = self.prop.b_coeffs[i + self.prop.stages];
                    error_est += step_size_s * (b_i - b_i_star) * ki;
                }
                next_state += step_size_s * b_i * ki;
            }

            if self.fixed_step {
                // Using a fixed step, no adaptive step necessary.
                self.details.step = self.step_size;
                return Ok((self.details.step, next_state));
            }

            self.details.error = self
                .prop
                .opts
                .error_ctrl
                .estimate(&error_est, &next_state, &state_vec);

            if self.details.error <= self.prop.opts.tolerance
                || self.details.attempts >= self.prop.opts.attempts
            {
                if self.details.attempts >= self.prop.opts.attempts {
                    warn!(
                        "Could not further decrease step size: maximum number of attempts reached ({})",
                        self.details.attempts
                    );
                }
                self.details.step = step_size_s * Unit::Second;
                if self.details.error < self.prop.opts.tolerance {
                    // Error below tolerance: grow the step for the next call.
                    let proposed_step = 0.9
                        * step_size_s
                        * (self.prop.opts.tolerance / self.details.error)
                            .powf(1.0 / f64::from(self.prop.order));
                    step_size_s = proposed_step.min(self.prop.opts.max_step.to_seconds());
                }
                // In all cases, update the step size to the adapted one.
                self.step_size = step_size_s * Unit::Second;
                return Ok((self.details.step, next_state));
            } else if step_size_s <= self.prop.opts.min_step.to_seconds() {
                // Error above tolerance at the smallest permitted step: a
                // smaller step cannot be taken, abort the run.
                return Err(PropagationError::StepSizeUnderflow {
                    epoch_s: self.state.epoch_s(),
                    error: self.details.error,
                });
            } else {
                // Error too high and the step can still shrink: adapt it.
                self.details.attempts += 1;
                let proposed_step = 0.9
                    * step_size_s
                    * (self.prop.opts.tolerance / self.details.error)
                        .powf(1.0 / f64::from(self.prop.order - 1));
                step_size_s = proposed_step.max(self.prop.opts.min_step.to_seconds());
            }
        }
    }

    /// Copy the details of the latest integration step.
    pub fn latest_details(&self) -> IntegrationDetails {
        self.details
    }
}
