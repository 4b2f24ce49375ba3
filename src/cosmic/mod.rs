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
use snafu::Snafu;
use std::fmt;

/// A trait for states driven by the propagators.
///
/// The propagator only manipulates the packed vector representation; the
/// state itself re-interprets that vector. No physical invariant (quaternion
/// norm, magnetization bounds) may be enforced inside `set`: the stepper owns
/// the intermediate vectors and restoring invariants there would corrupt the
/// embedded error estimates.
pub trait State: Clone + PartialEq + fmt::Debug + fmt::Display {
    /// Return this state as a packed vector for the propagation.
    fn to_vector(&self) -> DVector<f64>;

    /// Set this state from a packed vector at the provided epoch.
    fn set(&mut self, epoch_s: f64, vector: &DVector<f64>);

    /// Seconds elapsed since the simulation epoch.
    fn epoch_s(&self) -> f64;

    /// Set the seconds elapsed since the simulation epoch.
    fn set_epoch_s(&mut self, epoch_s: f64);
}

#[derive(Debug, PartialEq, Snafu)]
pub enum AstroError {
    #[snafu(display(
        "Kepler equation did not converge within {iterations} iterations (e = {eccentricity})"
    ))]
    KeplerNonConvergence {
        iterations: usize,
        eccentricity: f64,
    },
}

// Re-Export orbital elements
mod orbit;
pub use self::orbit::*;

// Re-Export the integration state
mod state;
pub use self::state::*;

// Re-Export spacecraft
mod spacecraft;
pub use self::spacecraft::*;

/// Earth gravitational parameter, in m^3/s^2.
pub const EARTH_MU_M3_S2: f64 = 3.986004418e14;

/// Earth rotation rate, in rad/s.
pub const EARTH_ROTATION_RATE_RAD_S: f64 = 7.2921150e-5;

/// WGS-84 ellipsoid semi-major axis, in meters.
pub const WGS84_SEMI_MAJOR_AXIS_M: f64 = 6_378_137.0;

/// WGS-84 ellipsoid flattening.
pub const WGS84_FLATTENING: f64 = 1.0 / 298.257_223_563;

/// Geomagnetic reference radius used by the World Magnetic Model, in meters.
pub const GEOMAGNETIC_REFERENCE_RADIUS_M: f64 = 6_371_200.0;

/// Vacuum permeability, in T*m/A.
pub const VACUUM_PERMEABILITY: f64 = 1.256_637_062_12e-6;

/// Julian-year length used for decimal-year conversions, in seconds.
pub const SECONDS_PER_YEAR: f64 = 365.25 * 24.0 * 3600.0;

/// Nanotesla to tesla.
pub const NT_TO_T: f64 = 1e-9;
