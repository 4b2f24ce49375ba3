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

use crate::linalg::DVector;
use std::fmt;

/// Computes the scalar error measure of an embedded-pair step, compared by
/// the propagator against its acceptance tolerance.
pub trait ErrorCtrl: Copy + fmt::Debug {
    /// Estimates the error of the trial step from the embedded error vector,
    /// the candidate state and the state at the start of the step.
    fn estimate(
        &self,
        prop_err: &DVector<f64>,
        candidate: &DVector<f64>,
        cur_state: &DVector<f64>,
    ) -> f64;
}

/// Infinity norm of the component-wise error scaled by the mixed
/// absolute/relative tolerance: max_i |e_i| / (atol + rtol * |y_i|).
///
/// The result is unity-normalized: a step is acceptable when the estimate is
/// at most one, so the propagator tolerance stays at its default of 1.0.
#[derive(Clone, Copy, Debug)]
pub struct ScaledInfNorm {
    pub abs_tol: f64,
    pub rel_tol: f64,
}

impl ScaledInfNorm {
    pub fn new(abs_tol: f64, rel_tol: f64) -> Self {
        Self { abs_tol, rel_tol }
    }
}

impl Default for ScaledInfNorm {
    fn default() -> Self {
        Self {
            abs_tol: 1e-6,
            rel_tol: 1e-6,
        }
    }
}

impl ErrorCtrl for ScaledInfNorm {
    fn estimate(
        &self,
        prop_err: &DVector<f64>,
        candidate: &DVector<f64>,
        cur_state: &DVector<f64>,
    ) -> f64 {
        let mut max_err = 0.0_f64;
        for (i, err) in prop_err.iter().enumerate() {
            let magnitude = cur_state[i].abs().max(candidate[i].abs());
            let scale = self.abs_tol + self.rel_tol * magnitude;
            max_err = max_err.max(err.abs() / scale);
        }
        max_err
    }
}

/// Raw infinity norm of the embedded error vector, for use with an explicit
/// propagator tolerance.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnscaledInfNorm;

impl ErrorCtrl for UnscaledInfNorm {
    fn estimate(
        &self,
        prop_err: &DVector<f64>,
        _candidate: &DVector<f64>,
        _cur_state: &DVector<f64>,
    ) -> f64 {
        let mut max_err = 0.0_f64;
        for err in prop_err.iter() {
            max_err = max_err.max(err.abs());
        }
        max_err
    }
}
