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

mod dormand;
pub use self::dormand::*;
mod fehlberg;
pub use self::fehlberg::*;

/// The `RK` trait defines an embedded Runge Kutta pair.
#[allow(clippy::upper_case_acronyms)]
pub trait RK
where
    Self: Sized,
{
    /// Returns the order of this integrator, used by the adaptive step
    /// control to compute the growth and shrink exponents.
    const ORDER: u8;

    /// Returns the number of stages, i.e. how many times the derivatives
    /// will be called per trial step.
    const STAGES: usize;

    /// The A coefficients of the Butcher table, flattened row by row over the
    /// strictly lower triangle: `STAGES * (STAGES - 1) / 2` entries.
    /// The node coefficients c_i are not stored: this trait supposes a
    /// consistent table, c_i = sum_j a_ij.
    const A_COEFFS: &'static [f64];

    /// The b_i coefficients of the propagated solution followed by the
    /// embedded b*_i coefficients: `2 * STAGES` entries.
    const B_COEFFS: &'static [f64];
}
