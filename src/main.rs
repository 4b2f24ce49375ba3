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

use clap::error::ErrorKind;
use clap::Parser;
use maglock::io::SimulationParams;
use maglock::linalg::Vector3;
use maglock::simulation::run_simulation;
use maglock::verify::{verify_attitude, verify_hysteresis, verify_orbit};
use maglock::SimError;
use std::path::PathBuf;

/// Attitude and orbit simulator for passively magnetically stabilized
/// spacecraft.
#[derive(Debug, Parser)]
#[command(name = "maglock", version, about)]
struct Cli {
    /// Output CSV file; directories are created on demand
    #[arg(short, long, default_value = "output.csv")]
    output: PathBuf,

    /// YAML scenario file providing the base parameter bundle
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Spacecraft mass [g]
    #[arg(long)]
    mass: Option<f64>,

    /// Spacecraft width (x) [m]
    #[arg(long)]
    width: Option<f64>,

    /// Spacecraft height (y) [m]
    #[arg(long)]
    height: Option<f64>,

    /// Spacecraft length (z) [m]
    #[arg(long)]
    length: Option<f64>,

    /// Permanent magnet remanence [T]
    #[arg(long)]
    magnet_remanence: Option<f64>,

    /// Permanent magnet length [m]
    #[arg(long)]
    magnet_length: Option<f64>,

    /// Permanent magnet diameter [m]
    #[arg(long)]
    magnet_diameter: Option<f64>,

    /// Volume of each hysteresis rod [m^3]
    #[arg(long)]
    rod_volume: Option<f64>,

    /// Hysteresis rod orientation (repeatable, format: x,y,z)
    #[arg(long = "rod-orientation", value_parser = parse_vec3)]
    rod_orientation: Vec<Vector3<f64>>,

    /// Do not mount any hysteresis rods
    #[arg(long)]
    no_rods: bool,

    /// Saturation magnetization [A/m]
    #[arg(long)]
    hysteresis_ms: Option<f64>,

    /// Anhysteretic shape parameter [A/m]
    #[arg(long)]
    hysteresis_a: Option<f64>,

    /// Pinning energy density [A/m]
    #[arg(long)]
    hysteresis_k: Option<f64>,

    /// Reversibility coefficient [0-1]
    #[arg(long)]
    hysteresis_c: Option<f64>,

    /// Inter-domain coupling coefficient
    #[arg(long)]
    hysteresis_alpha: Option<f64>,

    /// Orbit semi-major axis [m]
    #[arg(long)]
    orbit_semi_major_axis: Option<f64>,

    /// Orbit eccentricity [0-1)
    #[arg(long)]
    orbit_eccentricity: Option<f64>,

    /// Orbit inclination [rad]
    #[arg(long)]
    orbit_inclination: Option<f64>,

    /// Orbit right ascension of the ascending node [rad]
    #[arg(long)]
    orbit_raan: Option<f64>,

    /// Orbit argument of periapsis [rad]
    #[arg(long)]
    orbit_arg_periapsis: Option<f64>,

    /// Orbit mean anomaly at epoch [rad]
    #[arg(long)]
    orbit_mean_anomaly: Option<f64>,

    /// Initial angular velocity [rad/s] (format: x,y,z)
    #[arg(long, value_parser = parse_vec3)]
    angular_velocity: Option<Vector3<f64>>,

    /// Simulation start year (decimal, e.g. 2025.0)
    #[arg(long)]
    simulation_year: Option<f64>,

    /// Gravity model truncation degree
    #[arg(long)]
    gravity_model_degree: Option<usize>,

    /// Simulation start time offset [s]
    #[arg(long)]
    t_start: Option<f64>,

    /// Simulation end time [s]
    #[arg(long)]
    t_end: Option<f64>,

    /// Initial integrator step [s]
    #[arg(long)]
    dt: Option<f64>,

    /// Absolute error tolerance of the step-size controller
    #[arg(long)]
    absolute_error: Option<f64>,

    /// Relative error tolerance of the step-size controller
    #[arg(long)]
    relative_error: Option<f64>,

    /// Use the higher-order stepper (Runge-Kutta-Fehlberg 7/8)
    #[arg(long)]
    higher_order: bool,

    /// Checkpoint interval instead of full-span observation [s] (at least 1.0)
    #[arg(long)]
    checkpoint_interval: Option<f64>,

    /// Exclude per-element values from the output
    #[arg(long)]
    no_observe_element: bool,

    /// Exclude magnitude values from the output
    #[arg(long)]
    no_observe_magnitude: bool,

    /// Trace the B-H loop of the configured rod material instead of running
    /// the simulation
    #[arg(long)]
    verify_hysteresis: bool,

    /// Run the orbit-focused verification output
    #[arg(long)]
    verify_orbit: bool,

    /// Run the attitude-focused verification output
    #[arg(long)]
    verify_attitude: bool,
}

fn parse_vec3(input: &str) -> Result<Vector3<f64>, String> {
    let tokens: Vec<&str> = input.split(',').collect();
    if tokens.len() != 3 {
        return Err(format!(
            "expected 3 comma-separated values (x,y,z), got {}",
            tokens.len()
        ));
    }
    let mut values = [0.0_f64; 3];
    for (i, token) in tokens.iter().enumerate() {
        values[i] = token
            .trim()
            .parse()
            .map_err(|_| format!("could not parse `{token}` as a number"))?;
    }
    Ok(Vector3::new(values[0], values[1], values[2]))
}

impl Cli {
    /// Builds the parameter bundle: the scenario file (or the built-in
    /// defaults) overridden by whichever flags were provided.
    fn into_params(self) -> Result<(PathBuf, SimulationParams, RunMode), SimError> {
        let mut params = match &self.scenario {
            Some(path) => SimulationParams::from_yaml(path)?,
            None => SimulationParams::default(),
        };

        macro_rules! apply {
            ($flag:expr, $target:expr) => {
                if let Some(value) = $flag {
                    $target = value;
                }
            };
        }

        apply!(self.mass, params.spacecraft.mass_g);
        apply!(self.width, params.spacecraft.dimensions_m.x);
        apply!(self.height, params.spacecraft.dimensions_m.y);
        apply!(self.length, params.spacecraft.dimensions_m.z);
        apply!(self.magnet_remanence, params.spacecraft.magnet_remanence_t);
        apply!(self.magnet_length, params.spacecraft.magnet_length_m);
        apply!(self.magnet_diameter, params.spacecraft.magnet_diameter_m);
        apply!(self.rod_volume, params.spacecraft.rod_volume_m3);
        apply!(self.hysteresis_ms, params.spacecraft.hysteresis.ms);
        apply!(self.hysteresis_a, params.spacecraft.hysteresis.a);
        apply!(self.hysteresis_k, params.spacecraft.hysteresis.k);
        apply!(self.hysteresis_c, params.spacecraft.hysteresis.c);
        apply!(self.hysteresis_alpha, params.spacecraft.hysteresis.alpha);
        apply!(self.orbit_semi_major_axis, params.orbit.semi_major_axis_m);
        apply!(self.orbit_eccentricity, params.orbit.eccentricity);
        apply!(self.orbit_inclination, params.orbit.inclination_rad);
        apply!(self.orbit_raan, params.orbit.raan_rad);
        apply!(self.orbit_arg_periapsis, params.orbit.arg_of_periapsis_rad);
        apply!(self.orbit_mean_anomaly, params.orbit.mean_anomaly_rad);
        apply!(self.angular_velocity, params.initial_angular_velocity_rad_s);
        apply!(self.simulation_year, params.simulation_year);
        apply!(self.gravity_model_degree, params.gravity_model_degree);
        apply!(self.t_start, params.t_start_s);
        apply!(self.t_end, params.t_end_s);
        apply!(self.dt, params.dt_initial_s);
        apply!(self.absolute_error, params.absolute_error);
        apply!(self.relative_error, params.relative_error);

        if self.no_rods {
            params.spacecraft.rod_orientations.clear();
        } else if !self.rod_orientation.is_empty() {
            params.spacecraft.rod_orientations = self.rod_orientation.clone();
        }
        if self.higher_order {
            params.higher_order = true;
        }
        if let Some(interval) = self.checkpoint_interval {
            params.checkpoint_interval_s = Some(interval);
        }
        if self.no_observe_element {
            params.observer.include_elements = false;
        }
        if self.no_observe_magnitude {
            params.observer.include_magnitudes = false;
        }

        let mode = if self.verify_hysteresis {
            RunMode::VerifyHysteresis
        } else if self.verify_orbit {
            RunMode::VerifyOrbit
        } else if self.verify_attitude {
            RunMode::VerifyAttitude
        } else {
            RunMode::Simulate
        };

        params.validate()?;
        Ok((self.output, params, mode))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum RunMode {
    Simulate,
    VerifyHysteresis,
    VerifyOrbit,
    VerifyAttitude,
}

fn main() {
    let _ = pretty_env_logger::try_init_custom_env("MAGLOCK_LOG");

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    let outcome = cli.into_params().and_then(|(output, params, mode)| {
        match mode {
            RunMode::VerifyHysteresis => verify_hysteresis(&output, &params),
            RunMode::VerifyOrbit => verify_orbit(&output, &params),
            RunMode::VerifyAttitude => verify_attitude(&output, &params),
            RunMode::Simulate => run_simulation(&output, &params),
        }
    });

    if let Err(err) = outcome {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
