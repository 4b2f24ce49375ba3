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

use crate::cosmic::AstroError;
use crate::environment::EnvironmentError;
use crate::io::observer::ObserverError;
use crate::io::ConfigError;
use crate::propagators::PropagationError;
use snafu::Snafu;

/// Top-level error of a simulation run. Every failure aborts the run: the
/// recovery path is a re-run with different parameters.
#[derive(Debug, Snafu)]
pub enum SimError {
    #[snafu(display("configuration error: {source}"), context(false))]
    InvalidConfig { source: ConfigError },

    #[snafu(display("environment error: {source}"), context(false))]
    Environment { source: EnvironmentError },

    #[snafu(display("astrodynamics error: {source}"), context(false))]
    Astro { source: AstroError },

    #[snafu(display("propagation error: {source}"), context(false))]
    Propagation { source: PropagationError },

    #[snafu(display("observer error: {source}"), context(false))]
    Observer { source: ObserverError },
}
