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

use std::fmt;

use crate::time::{Duration, Unit};

use super::{ErrorCtrl, ScaledInfNorm};

/// PropOpts stores the integrator options: step-size bounds, the acceptance
/// tolerance on the error-control estimate, and the retry/budget limits.
///
/// With the default [`ScaledInfNorm`] controller the estimate is already
/// scaled by the absolute and relative tolerances, so the acceptance
/// threshold stays at unity.
#[derive(Clone, Copy, Debug)]
pub struct PropOpts<E: ErrorCtrl> {
    pub init_step: Duration,
    pub min_step: Duration,
    pub max_step: Duration,
    pub tolerance: f64,
    pub attempts: u8,
    pub fixed_step: bool,
    /// Cap on accepted steps per propagation span. `None` derives a budget
    /// of 1000 steps per second of span at run time.
    pub step_budget: Option<u64>,
    pub error_ctrl: E,
}

impl<E: ErrorCtrl> PropOpts<E> {
    /// `with_adaptive_step` initializes a `PropOpts` such that the integrator
    /// is used with an adaptive step size.
    pub fn with_adaptive_step(
        min_step: Duration,
        max_step: Duration,
        init_step: Duration,
        error_ctrl: E,
    ) -> Self {
        PropOpts {
            init_step,
            min_step,
            max_step,
            tolerance: 1.0,
            attempts: 50,
            fixed_step: false,
            step_budget: None,
            error_ctrl,
        }
    }

    pub fn with_adaptive_step_s(min_step: f64, max_step: f64, init_step: f64, error_ctrl: E) -> Self {
        Self::with_adaptive_step(
            min_step * Unit::Second,
            max_step * Unit::Second,
            init_step * Unit::Second,
            error_ctrl,
        )
    }

    /// Set the maximum step size and sets the initial step to that value if currently greater
    pub fn set_max_step(&mut self, max_step: Duration) {
        if self.init_step > max_step {
            self.init_step = max_step;
        }
        self.max_step = max_step;
    }

    /// Set the minimum step size and sets the initial step to that value if currently smaller
    pub fn set_min_step(&mut self, min_step: Duration) {
        if self.init_step < min_step {
            self.init_step = min_step;
        }
        self.min_step = min_step;
    }
}

impl<E: ErrorCtrl> fmt::Display for PropOpts<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fixed_step {
            write!(f, "fixed step: {:e}", self.min_step)
        } else {
            write!(
                f,
                "min_step: {:e}, max_step: {:e}, tol: {:e}, attempts: {}",
                self.min_step, self.max_step, self.tolerance, self.attempts,
            )
        }
    }
}

impl PropOpts<ScaledInfNorm> {
    /// `with_fixed_step` initializes a `PropOpts` such that the integrator
    /// is used with a fixed step size.
    pub fn with_fixed_step(step: Duration) -> Self {
        PropOpts {
            init_step: step,
            min_step: step,
            max_step: step,
            tolerance: 0.0,
            fixed_step: true,
            attempts: 0,
            step_budget: None,
            error_ctrl: ScaledInfNorm::default(),
        }
    }

    pub fn with_fixed_step_s(step: f64) -> Self {
        Self::with_fixed_step(step * Unit::Second)
    }

    /// Returns the default options with the provided absolute and relative
    /// tolerances.
    pub fn with_tolerances(abs_tol: f64, rel_tol: f64) -> Self {
        let mut opts = Self::default();
        opts.error_ctrl = ScaledInfNorm::new(abs_tol, rel_tol);
        opts
    }

    /// Creates options with the provided max step, and sets the initial step
    /// to that value as well.
    pub fn with_max_step(max_step: Duration) -> Self {
        let mut opts = Self::default();
        opts.set_max_step(max_step);
        opts
    }
}

impl Default for PropOpts<ScaledInfNorm> {
    fn default() -> PropOpts<ScaledInfNorm> {
        PropOpts {
            init_step: 0.1 * Unit::Second,
            min_step: 1e-6 * Unit::Second,
            max_step: 2700.0 * Unit::Second,
            tolerance: 1.0,
            attempts: 50,
            fixed_step: false,
            step_budget: None,
            error_ctrl: ScaledInfNorm::default(),
        }
    }
}

#[test]
fn test_options() {
    use super::UnscaledInfNorm;

    let opts = PropOpts::with_fixed_step_s(1e-1);
    assert_eq!(opts.min_step, 1e-1 * Unit::Second);
    assert_eq!(opts.max_step, 1e-1 * Unit::Second);
    assert!(opts.tolerance.abs() < f64::EPSILON);
    assert!(opts.fixed_step);

    let opts = PropOpts::with_adaptive_step_s(1e-2, 10.0, 0.1, UnscaledInfNorm);
    assert_eq!(opts.min_step, 1e-2 * Unit::Second);
    assert_eq!(opts.max_step, 10.0 * Unit::Second);
    assert!((opts.tolerance - 1.0).abs() < f64::EPSILON);
    assert!(!opts.fixed_step);

    let opts: PropOpts<ScaledInfNorm> = Default::default();
    assert_eq!(opts.init_step, 0.1 * Unit::Second);
    assert_eq!(opts.min_step, 1e-6 * Unit::Second);
    assert_eq!(opts.max_step, 2700.0 * Unit::Second);
    assert!((opts.tolerance - 1.0).abs() < f64::EPSILON);
    assert_eq!(opts.attempts, 50);
    assert!(!opts.fixed_step);

    let opts = PropOpts::with_max_step(1.0 * Unit::Second);
    assert_eq!(opts.init_step, 0.1 * Unit::Second);
    assert_eq!(opts.max_step, 1.0 * Unit::Second);

    let mut opts: PropOpts<ScaledInfNorm> = Default::default();
    opts.set_min_step(1.0 * Unit::Second);
    assert_eq!(opts.min_step, 1.0 * Unit::Second);
    // The initial step follows the raised floor.
    assert_eq!(opts.init_step, 1.0 * Unit::Second);

    let opts = PropOpts::with_tolerances(1e-9, 1e-9);
    assert!((opts.error_ctrl.abs_tol - 1e-9).abs() < 1e-24);
    assert!((opts.error_ctrl.rel_tol - 1e-9).abs() < 1e-24);
}
