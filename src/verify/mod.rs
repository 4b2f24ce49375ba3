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

//! Isolated verification drivers.
//!
//! Each mode replaces the mission entry point with a stripped-down
//! integration whose output can be checked against textbook behavior: a
//! closed B-H hysteresis loop, a Keplerian orbit under the harmonic gravity
//! field, and the attitude capture transient from rest.

use crate::cosmic::{AocsState, Spacecraft, State, VACUUM_PERMEABILITY};
use crate::dynamics::hysteresis::HysteresisRod;
use crate::dynamics::{AocsDynamics, Dynamics, DynamicsError};
use crate::errors::SimError;
use crate::io::observer::{
    csv_writer_for, format_value, AttitudeObserver, ObserverError, OrbitObserver, StateObserver,
};
use crate::io::SimulationParams;
use crate::linalg::{DVector, Vector3};
use crate::propagators::{PropOpts, Propagator};
use crate::simulation;
use crate::time::Unit;
use csv::Writer;
use std::f64::consts::TAU;
use std::fmt;
use std::fs::File;
use std::path::Path;

/// Peak of the prescribed field sweep, in A/m. Larger than the coercivity of
/// any soft rod material so the full loop is exercised.
pub const H_MAX_AM: f64 = 100.0;
/// Frequency of the prescribed field sweep, in Hz.
pub const FREQUENCY_HZ: f64 = 1.0;
/// Cycles to integrate; the loop closes after the first.
const CYCLES: f64 = 2.0;

/// A one-component state: the irreversible magnetization of a single rod
/// under a prescribed field.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScalarState {
    pub epoch_s: f64,
    pub value: f64,
}

impl State for ScalarState {
    fn to_vector(&self) -> DVector<f64> {
        DVector::from_element(1, self.value)
    }

    fn set(&mut self, epoch_s: f64, vector: &DVector<f64>) {
        self.epoch_s = epoch_s;
        self.value = vector[0];
    }

    fn epoch_s(&self) -> f64 {
        self.epoch_s
    }

    fn set_epoch_s(&mut self, epoch_s: f64) {
        self.epoch_s = epoch_s;
    }
}

impl fmt::Display for ScalarState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "t = {:.3} s\tM = {:.3} A/m", self.epoch_s, self.value)
    }
}

/// Dynamics of the B-H loop test: a single rod driven by
/// H(t) = H_max sin(2 pi f t).
#[derive(Clone)]
pub struct HysteresisLoopDynamics<'a> {
    rod: &'a HysteresisRod,
}

impl<'a> HysteresisLoopDynamics<'a> {
    pub fn new(rod: &'a HysteresisRod) -> Self {
        Self { rod }
    }

    pub fn applied_field(t_s: f64) -> (f64, f64) {
        let phase = TAU * FREQUENCY_HZ * t_s;
        (
            H_MAX_AM * phase.sin(),
            H_MAX_AM * TAU * FREQUENCY_HZ * phase.cos(),
        )
    }
}

impl<'a> Dynamics for HysteresisLoopDynamics<'a> {
    type StateType = ScalarState;

    fn eom(
        &self,
        delta_t: f64,
        state_vec: &DVector<f64>,
        state_ctx: &ScalarState,
    ) -> Result<DVector<f64>, DynamicsError> {
        let (h_am, dh_dt) = Self::applied_field(state_ctx.epoch_s() + delta_t);
        let dm_dt = self
            .rod
            .magnetization_derivative_from_h(state_vec[0], h_am, dh_dt);
        Ok(DVector::from_element(1, dm_dt))
    }
}

/// Writes one `time,H_Am,M_Am,B_T` row per accepted step, with
/// B = mu_0 (H + M).
pub struct BhObserver {
    writer: Writer<File>,
    precision: usize,
}

impl BhObserver {
    pub fn create<P: AsRef<Path>>(path: P, precision: usize) -> Result<Self, ObserverError> {
        let mut writer = csv_writer_for(path)?;
        writer.write_record(["time", "H_Am", "M_Am", "B_T"])?;
        Ok(Self { writer, precision })
    }

    pub fn flush(&mut self) -> Result<(), ObserverError> {
        self.writer.flush().map_err(|err| ObserverError::WriteRow {
            source: csv::Error::from(err),
        })
    }
}

impl StateObserver<ScalarState> for BhObserver {
    fn observe(&mut self, t_s: f64, state: &ScalarState) -> Result<(), ObserverError> {
        let (h_am, _) = HysteresisLoopDynamics::applied_field(t_s);
        let b_t = VACUUM_PERMEABILITY * (h_am + state.value);
        self.writer.write_record([
            format_value(t_s, self.precision),
            format_value(h_am, self.precision),
            format_value(state.value, self.precision),
            // Tesla needs more digits than the A/m columns.
            format!("{b_t:.10e}"),
        ])?;
        Ok(())
    }
}

/// Integrates the isolated Jiles-Atherton model through two full cycles of
/// the prescribed sweep and emits the B-H trace.
pub fn verify_hysteresis<P: AsRef<Path>>(
    output: P,
    params: &SimulationParams,
) -> Result<(), SimError> {
    params.spacecraft.hysteresis.validate()?;
    // Volume and orientation do not enter the scalar loop.
    let rod = HysteresisRod::new(1.0, Vector3::x(), params.spacecraft.hysteresis)?;
    let dynamics = HysteresisLoopDynamics::new(&rod);

    let mut opts = PropOpts::with_tolerances(params.absolute_error, params.relative_error);
    opts.init_step = 1e-3 * Unit::Second;
    opts.set_max_step(0.01 * Unit::Second);

    let setup = Propagator::dormand45(dynamics, opts);
    let mut instance = setup.with(ScalarState::default());

    let mut observer = BhObserver::create(output, params.observer.precision)?;
    observer.observe(0.0, &instance.state)?;
    instance.for_duration_with_observer(
        CYCLES / FREQUENCY_HZ * Unit::Second,
        &mut observer,
    )?;
    observer.flush()?;
    info!("hysteresis verification finished: {}", instance.state);
    Ok(())
}

/// Integrates the full dynamics from the configured elements and emits the
/// orbit trace, to visualize the harmonic-gravity perturbations.
pub fn verify_orbit<P: AsRef<Path>>(output: P, params: &SimulationParams) -> Result<(), SimError> {
    params.validate()?;
    let spacecraft = Spacecraft::from_params(&params.spacecraft)?;
    let environment = simulation::load_environment(params)?;
    let dynamics = AocsDynamics::new(&spacecraft, &environment);
    let initial = AocsState::from_initial_conditions(
        &params.orbit,
        params.initial_angular_velocity_rad_s,
        params.num_rods(),
        params.t_start_s,
    )?;

    let mut observer = OrbitObserver::create(output, params.observer.precision)?;
    simulation::propagate(dynamics, initial, params, &mut observer)?;
    observer.flush()?;
    Ok(())
}

/// Integrates the full dynamics from rest and emits the attitude trace: the
/// capture transient into the magnetic lock.
pub fn verify_attitude<P: AsRef<Path>>(
    output: P,
    params: &SimulationParams,
) -> Result<(), SimError> {
    params.validate()?;
    let spacecraft = Spacecraft::from_params(&params.spacecraft)?;
    let environment = simulation::load_environment(params)?;
    let dynamics = AocsDynamics::new(&spacecraft, &environment);
    let initial = AocsState::from_initial_conditions(
        &params.orbit,
        Vector3::zeros(),
        params.num_rods(),
        params.t_start_s,
    )?;

    let mut observer = AttitudeObserver::create(output, params.observer.precision)?;
    simulation::propagate(dynamics, initial, params, &mut observer)?;
    observer.flush()?;
    Ok(())
}
