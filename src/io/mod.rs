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

use crate::cosmic::KeplerianElements;
use crate::dynamics::hysteresis::JaParameters;
use crate::linalg::Vector3;
use serde::{Deserialize, Serialize};
use snafu::{ensure, ResultExt, Snafu};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Observers and CSV emission.
pub mod observer;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    #[snafu(display("invalid value for {param}: {reason}"))]
    InvalidParameter { param: &'static str, reason: String },

    #[snafu(display("could not read scenario file {}: {source}", path.display()))]
    ScenarioUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("could not parse scenario file {}: {source}", path.display()))]
    ScenarioUnparseable {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// Spacecraft definition: mass properties, permanent magnet and rod set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpacecraftParams {
    /// Spacecraft mass, in grams.
    pub mass_g: f64,
    /// Outer dimensions, in meters.
    pub dimensions_m: Vector3<f64>,
    /// Body-frame mounting direction of the permanent magnet.
    pub magnet_orientation: Vector3<f64>,
    /// Permanent magnet remanence, in tesla.
    pub magnet_remanence_t: f64,
    /// Permanent magnet length, in meters.
    pub magnet_length_m: f64,
    /// Permanent magnet diameter, in meters.
    pub magnet_diameter_m: f64,
    /// Common volume of every hysteresis rod, in m^3.
    pub rod_volume_m3: f64,
    /// Body-frame mounting direction of each rod; empty disables the rods.
    pub rod_orientations: Vec<Vector3<f64>>,
    /// Jiles-Atherton parameters shared by the rods.
    pub hysteresis: JaParameters,
}

impl SpacecraftParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(
            self.mass_g > 0.0,
            InvalidParameterSnafu {
                param: "mass",
                reason: format!("must be strictly positive, got {} g", self.mass_g),
            }
        );
        ensure!(
            self.dimensions_m.iter().all(|d| *d > 0.0),
            InvalidParameterSnafu {
                param: "dimensions",
                reason: "every dimension must be strictly positive".to_string(),
            }
        );
        ensure!(
            self.magnet_orientation.norm() > f64::EPSILON,
            InvalidParameterSnafu {
                param: "magnet orientation",
                reason: "must be a non-zero vector".to_string(),
            }
        );
        if !self.rod_orientations.is_empty() {
            ensure!(
                self.rod_volume_m3 > 0.0,
                InvalidParameterSnafu {
                    param: "rod volume",
                    reason: format!("must be strictly positive, got {}", self.rod_volume_m3),
                }
            );
            ensure!(
                self.rod_orientations
                    .iter()
                    .all(|o| o.norm() > f64::EPSILON),
                InvalidParameterSnafu {
                    param: "rod orientation",
                    reason: "every rod orientation must be a non-zero vector".to_string(),
                }
            );
        }
        self.hysteresis.validate()
    }
}

/// Column selection and precision of the state observer.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ObserverParams {
    /// Emit the r/v/w magnitude columns.
    pub include_magnitudes: bool,
    /// Emit the per-element state columns.
    pub include_elements: bool,
    /// Fixed-point digits after the decimal separator.
    pub precision: usize,
}

impl Default for ObserverParams {
    fn default() -> Self {
        Self {
            include_magnitudes: true,
            include_elements: true,
            precision: 3,
        }
    }
}

/// The parameter bundle of one simulation run, populated by the CLI layer or
/// loaded from a YAML scenario.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationParams {
    pub spacecraft: SpacecraftParams,
    pub orbit: KeplerianElements,
    /// Initial body-frame angular velocity, in rad/s.
    pub initial_angular_velocity_rad_s: Vector3<f64>,
    /// Decimal year of the simulation epoch.
    pub simulation_year: f64,
    /// Truncation degree of the gravity harmonic model.
    pub gravity_model_degree: usize,
    /// Simulation start offset, in seconds.
    pub t_start_s: f64,
    /// Simulation end time, in seconds.
    pub t_end_s: f64,
    /// Initial integrator step, in seconds.
    pub dt_initial_s: f64,
    /// Absolute tolerance of the step-size controller.
    pub absolute_error: f64,
    /// Relative tolerance of the step-size controller.
    pub relative_error: f64,
    /// Select the Fehlberg 7(8) pair instead of Dormand-Prince 5(4).
    pub higher_order: bool,
    /// Checkpointed run mode interval, in seconds; `None` runs full-span.
    pub checkpoint_interval_s: Option<f64>,
    pub observer: ObserverParams,
}

impl Default for SimulationParams {
    /// A 1U CubeSat with an N35 magnet along +Z and two rod pairs along
    /// +/-X and +/-Y, on a slightly eccentric 80-degree-inclined orbit.
    fn default() -> Self {
        Self {
            spacecraft: SpacecraftParams {
                mass_g: 1300.0,
                dimensions_m: Vector3::new(0.1, 0.1, 0.1),
                magnet_orientation: Vector3::new(0.0, 0.0, 1.0),
                magnet_remanence_t: 1.21,
                magnet_length_m: 0.05,
                magnet_diameter_m: 0.01,
                rod_volume_m3: 0.005 * 0.005 * std::f64::consts::PI * 0.1,
                rod_orientations: vec![
                    Vector3::new(1.0, 0.0, 0.0),
                    Vector3::new(-1.0, 0.0, 0.0),
                    Vector3::new(0.0, 1.0, 0.0),
                    Vector3::new(0.0, -1.0, 0.0),
                ],
                hysteresis: JaParameters::hymu80(),
            },
            orbit: KeplerianElements {
                semi_major_axis_m: 6.818e6,
                eccentricity: 0.001,
                inclination_rad: 1.3963,
                raan_rad: 0.0,
                arg_of_periapsis_rad: 0.0,
                mean_anomaly_rad: 0.0,
            },
            initial_angular_velocity_rad_s: Vector3::new(0.1, -0.05, 0.08),
            simulation_year: 2025.0,
            gravity_model_degree: 4,
            t_start_s: 0.0,
            t_end_s: 2.0 * 7.0 * 24.0 * 3600.0,
            dt_initial_s: 0.1,
            absolute_error: 1e-6,
            relative_error: 1e-6,
            higher_order: false,
            checkpoint_interval_s: None,
            observer: ObserverParams::default(),
        }
    }
}

impl SimulationParams {
    /// Loads a parameter bundle from a YAML scenario file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let file = File::open(&path).context(ScenarioUnreadableSnafu {
            path: path.as_ref().to_path_buf(),
        })?;
        let params: Self = serde_yaml::from_reader(file).context(ScenarioUnparseableSnafu {
            path: path.as_ref().to_path_buf(),
        })?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.spacecraft.validate()?;
        ensure!(
            self.orbit.semi_major_axis_m > 0.0,
            InvalidParameterSnafu {
                param: "orbit semi-major axis",
                reason: format!("must be strictly positive, got {}", self.orbit.semi_major_axis_m),
            }
        );
        ensure!(
            (0.0..1.0).contains(&self.orbit.eccentricity),
            InvalidParameterSnafu {
                param: "orbit eccentricity",
                reason: format!("must be within [0, 1), got {}", self.orbit.eccentricity),
            }
        );
        ensure!(
            self.t_end_s > self.t_start_s,
            InvalidParameterSnafu {
                param: "t-end",
                reason: format!(
                    "end time {} must exceed start time {}",
                    self.t_end_s, self.t_start_s
                ),
            }
        );
        ensure!(
            self.dt_initial_s > 0.0,
            InvalidParameterSnafu {
                param: "dt",
                reason: format!("initial step must be strictly positive, got {}", self.dt_initial_s),
            }
        );
        ensure!(
            self.absolute_error > 0.0 && self.relative_error > 0.0,
            InvalidParameterSnafu {
                param: "error tolerances",
                reason: "absolute and relative tolerances must be strictly positive".to_string(),
            }
        );
        if let Some(interval) = self.checkpoint_interval_s {
            ensure!(
                interval >= 1.0,
                InvalidParameterSnafu {
                    param: "checkpoint-interval",
                    reason: format!("must be at least 1 s, got {interval}"),
                }
            );
        }
        Ok(())
    }

    pub fn num_rods(&self) -> usize {
        self.spacecraft.rod_orientations.len()
    }
}

/// Path of the World Magnetic Model coefficient file, overridable through
/// `MAGLOCK_WMM_PATH`.
pub fn magnetic_model_path() -> PathBuf {
    std::env::var_os("MAGLOCK_WMM_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data/WMM.COF"))
}

/// Path of the gravity model coefficient file, overridable through
/// `MAGLOCK_EGM_PATH`.
pub fn gravity_model_path() -> PathBuf {
    std::env::var_os("MAGLOCK_EGM_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data/EGM96.cof.gz"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_are_valid() {
        let params = SimulationParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.num_rods(), 4);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut params = SimulationParams::default();
        params.spacecraft.mass_g = 0.0;
        assert!(params.validate().is_err());

        params = SimulationParams::default();
        params.orbit.eccentricity = 1.0;
        assert!(params.validate().is_err());

        params = SimulationParams::default();
        params.t_end_s = params.t_start_s;
        assert!(params.validate().is_err());

        params = SimulationParams::default();
        params.checkpoint_interval_s = Some(0.5);
        assert!(params.validate().is_err());

        params = SimulationParams::default();
        params.spacecraft.rod_orientations = vec![Vector3::zeros()];
        assert!(params.validate().is_err());

        params = SimulationParams::default();
        params.spacecraft.hysteresis.c = 2.0;
        assert!(params.validate().is_err());
    }

    #[test]
    fn no_rods_skips_rod_validation() {
        let mut params = SimulationParams::default();
        params.spacecraft.rod_orientations.clear();
        params.spacecraft.rod_volume_m3 = 0.0;
        assert!(params.validate().is_ok());
        assert_eq!(params.num_rods(), 0);
    }

    #[test]
    fn yaml_round_trip() {
        let params = SimulationParams::default();
        let serialized = serde_yaml::to_string(&params).unwrap();
        let parsed: SimulationParams = serde_yaml::from_str(&serialized).unwrap();
        assert!((parsed.orbit.semi_major_axis_m - params.orbit.semi_major_axis_m).abs() < 1e-9);
        assert_eq!(parsed.num_rods(), params.num_rods());
        assert_eq!(parsed.observer.precision, params.observer.precision);
    }
}
