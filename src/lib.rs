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

/*! # maglock

Simulates the long-duration attitude and orbital evolution of small spacecraft
equipped with a passive magnetic attitude control system: one permanent dipole
magnet and an arbitrary number of soft-magnetic hysteresis damping rods
(Jiles-Atherton model). Predicts detumbling from arbitrary initial rates and
capture into a magnetic lock tracking the geomagnetic field.
*/

/// Provides the adaptive integrators driving the simulation.
pub mod propagators;

/// Provides the equations of motion: attitude dynamics, magnetic torques and
/// the Jiles-Atherton hysteresis model.
pub mod dynamics;

/// Provides the states, orbital element conversions, and spacecraft definition.
pub mod cosmic;

/// Provides the geomagnetic and gravity field models and the frame math they
/// rely on.
pub mod environment;

mod errors;
pub use self::errors::SimError;

/// All the input/output needs of the simulator: configuration, observers and
/// CSV emission.
pub mod io;

/// Assembles a configured simulation run end to end.
pub mod simulation;

/// Isolated verification drivers (B-H loop, orbit-only, attitude-only).
pub mod verify;

#[macro_use]
extern crate log;

/// Re-export of hifitime
pub mod time {
    pub use hifitime::{Duration, Unit};
}

/// Re-export of the nalgebra types used throughout the crate
pub mod linalg {
    pub use nalgebra::{
        DMatrix, DVector, Matrix3, Quaternion, Rotation3, UnitQuaternion, Vector3, Vector4,
    };
}

/// Re-export some useful things
pub use self::cosmic::{AocsState, Spacecraft, State};
