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

use crate::cosmic::{AocsState, Spacecraft};
use crate::dynamics::AocsDynamics;
use crate::environment::HarmonicEnvironment;
use crate::errors::SimError;
use crate::io::observer::{CsvStateObserver, StateObserver};
use crate::io::{self, SimulationParams};
use crate::propagators::{PropOpts, Propagator};
use crate::time::Unit;
use std::path::Path;

/// Runs the full mission simulation described by the parameter bundle and
/// streams the observations into the CSV file at `output`.
pub fn run_simulation<P: AsRef<Path>>(
    output: P,
    params: &SimulationParams,
) -> Result<(), SimError> {
    params.validate()?;
    let spacecraft = Spacecraft::from_params(&params.spacecraft)?;
    let environment = load_environment(params)?;
    let dynamics = AocsDynamics::new(&spacecraft, &environment);
    let initial = AocsState::from_initial_conditions(
        &params.orbit,
        params.initial_angular_velocity_rad_s,
        params.num_rods(),
        params.t_start_s,
    )?;

    let mut observer = CsvStateObserver::create(output, params.num_rods(), params.observer)?;
    let end_state = propagate(dynamics, initial, params, &mut observer)?;
    observer.flush()?;
    info!("simulation finished: {end_state}");
    Ok(())
}

/// Loads the harmonic environment from the conventional coefficient-file
/// locations.
pub fn load_environment(params: &SimulationParams) -> Result<HarmonicEnvironment, SimError> {
    Ok(HarmonicEnvironment::load(
        params.simulation_year,
        io::magnetic_model_path(),
        io::gravity_model_path(),
        params.gravity_model_degree,
    )?)
}

/// Builds the configured propagator, emits the initial observation, and
/// drives the state over the full span in the configured run mode.
pub fn propagate<O: StateObserver<AocsState>>(
    dynamics: AocsDynamics,
    initial: AocsState,
    params: &SimulationParams,
    observer: &mut O,
) -> Result<AocsState, SimError> {
    let mut opts = PropOpts::with_tolerances(params.absolute_error, params.relative_error);
    opts.init_step = params.dt_initial_s * Unit::Second;

    let setup = if params.higher_order {
        Propagator::fehlberg78(dynamics, opts)
    } else {
        Propagator::dormand45(dynamics, opts)
    };
    let mut instance = setup.with(initial);

    observer.observe(instance.state.epoch_s, &instance.state)?;

    let span = (params.t_end_s - params.t_start_s) * Unit::Second;
    let end_state = match params.checkpoint_interval_s {
        Some(interval) => {
            instance.for_duration_checkpointed(span, interval * Unit::Second, observer)?
        }
        None => instance.for_duration_with_observer(span, observer)?,
    };
    Ok(end_state)
}
