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

use super::ObserverParams;
use crate::cosmic::AocsState;
use csv::Writer;
use snafu::{ResultExt, Snafu};
use std::fs::File;
use std::path::{Path, PathBuf};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ObserverError {
    #[snafu(display("could not create output file {}: {source}", path.display()))]
    CreateFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("could not write output row: {source}"), context(false))]
    WriteRow { source: csv::Error },
}

/// The sink of a propagation: receives every `(t, state)` sample the driver
/// emits. Calls arrive with monotone non-decreasing time; observers never
/// mutate the state.
pub trait StateObserver<S> {
    fn observe(&mut self, t_s: f64, state: &S) -> Result<(), ObserverError>;
}

/// Creates the parent directories of an output path on demand and opens a
/// CSV writer on it.
pub(crate) fn csv_writer_for<P: AsRef<Path>>(path: P) -> Result<Writer<File>, ObserverError> {
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context(CreateFileSnafu {
                path: path.as_ref().to_path_buf(),
            })?;
        }
    }
    let file = File::create(&path).context(CreateFileSnafu {
        path: path.as_ref().to_path_buf(),
    })?;
    Ok(Writer::from_writer(file))
}

pub(crate) fn format_value(value: f64, precision: usize) -> String {
    format!("{value:.precision$}")
}

/// Writes the full simulation state to a CSV file: time, optional r/v/w
/// magnitudes, optional per-element columns, then one magnetization column
/// per rod.
pub struct CsvStateObserver {
    writer: Writer<File>,
    num_rods: usize,
    params: ObserverParams,
}

impl CsvStateObserver {
    pub fn create<P: AsRef<Path>>(
        path: P,
        num_rods: usize,
        params: ObserverParams,
    ) -> Result<Self, ObserverError> {
        let mut writer = csv_writer_for(path)?;

        let mut header = vec!["time".to_string()];
        if params.include_magnitudes {
            header.extend(["r", "v", "w"].map(String::from));
        }
        if params.include_elements {
            header.extend(
                [
                    "r_x", "r_y", "r_z", "v_x", "v_y", "v_z", "q_w", "q_x", "q_y", "q_z", "w_x",
                    "w_y", "w_z",
                ]
                .map(String::from),
            );
        }
        for i in 0..num_rods {
            header.push(format!("M_{}", i + 1));
        }
        writer.write_record(&header)?;

        Ok(Self {
            writer,
            num_rods,
            params,
        })
    }

    pub fn flush(&mut self) -> Result<(), ObserverError> {
        self.writer.flush().map_err(|err| ObserverError::WriteRow {
            source: csv::Error::from(err),
        })
    }
}

impl StateObserver<AocsState> for CsvStateObserver {
    fn observe(&mut self, t_s: f64, state: &AocsState) -> Result<(), ObserverError> {
        let precision = self.params.precision;
        let mut record = vec![format_value(t_s, precision)];
        if self.params.include_magnitudes {
            record.push(format_value(state.radius.norm(), precision));
            record.push(format_value(state.velocity.norm(), precision));
            record.push(format_value(state.angular_velocity.norm(), precision));
        }
        if self.params.include_elements {
            for component in state.radius.iter().chain(state.velocity.iter()) {
                record.push(format_value(*component, precision));
            }
            record.push(format_value(state.attitude.scalar(), precision));
            let imag = state.attitude.imag();
            for component in [imag.x, imag.y, imag.z] {
                record.push(format_value(component, precision));
            }
            for component in state.angular_velocity.iter() {
                record.push(format_value(*component, precision));
            }
        }
        for i in 0..self.num_rods {
            record.push(format_value(state.rod_magnetizations[i], precision));
        }
        self.writer.write_record(&record)?;
        Ok(())
    }
}

/// Orbit-verification observer: position components and the r/v magnitudes.
pub struct OrbitObserver {
    writer: Writer<File>,
    precision: usize,
}

impl OrbitObserver {
    pub fn create<P: AsRef<Path>>(path: P, precision: usize) -> Result<Self, ObserverError> {
        let mut writer = csv_writer_for(path)?;
        writer.write_record(["time", "r_x", "r_y", "r_z", "r_mag", "v_mag"])?;
        Ok(Self { writer, precision })
    }

    pub fn flush(&mut self) -> Result<(), ObserverError> {
        self.writer.flush().map_err(|err| ObserverError::WriteRow {
            source: csv::Error::from(err),
        })
    }
}

impl StateObserver<AocsState> for OrbitObserver {
    fn observe(&mut self, t_s: f64, state: &AocsState) -> Result<(), ObserverError> {
        let record = [
            format_value(t_s, self.precision),
            format_value(state.radius.x, self.precision),
            format_value(state.radius.y, self.precision),
            format_value(state.radius.z, self.precision),
            format_value(state.radius.norm(), self.precision),
            format_value(state.velocity.norm(), self.precision),
        ];
        self.writer.write_record(&record)?;
        Ok(())
    }
}

/// Attitude-verification observer: quaternion, Euler angles, body rates and
/// the nadir pointing error of the body +Z axis.
pub struct AttitudeObserver {
    writer: Writer<File>,
    precision: usize,
}

impl AttitudeObserver {
    pub fn create<P: AsRef<Path>>(path: P, precision: usize) -> Result<Self, ObserverError> {
        let mut writer = csv_writer_for(path)?;
        writer.write_record([
            "time",
            "q_w",
            "q_x",
            "q_y",
            "q_z",
            "roll_deg",
            "pitch_deg",
            "yaw_deg",
            "w_x",
            "w_y",
            "w_z",
            "nadir_error_deg",
        ])?;
        Ok(Self { writer, precision })
    }

    pub fn flush(&mut self) -> Result<(), ObserverError> {
        self.writer.flush().map_err(|err| ObserverError::WriteRow {
            source: csv::Error::from(err),
        })
    }

    /// Angle between the body +Z axis and the nadir direction, in degrees.
    fn nadir_error_deg(state: &AocsState) -> f64 {
        let nadir_eci = -state.radius.normalize();
        let r_eci_to_body = state.orientation().to_rotation_matrix().matrix().transpose();
        let nadir_body = r_eci_to_body * nadir_eci;
        nadir_body.z.clamp(-1.0, 1.0).acos().to_degrees()
    }
}

impl StateObserver<AocsState> for AttitudeObserver {
    fn observe(&mut self, t_s: f64, state: &AocsState) -> Result<(), ObserverError> {
        let precision = self.precision;
        let orientation = state.orientation();
        let (roll, pitch, yaw) = orientation.euler_angles();
        let imag = state.attitude.imag();
        let record = [
            format_value(t_s, precision),
            format_value(state.attitude.scalar(), precision),
            format_value(imag.x, precision),
            format_value(imag.y, precision),
            format_value(imag.z, precision),
            format_value(roll.to_degrees(), precision),
            format_value(pitch.to_degrees(), precision),
            format_value(yaw.to_degrees(), precision),
            format_value(state.angular_velocity.x, precision),
            format_value(state.angular_velocity.y, precision),
            format_value(state.angular_velocity.z, precision),
            format_value(Self::nadir_error_deg(state), precision),
        ];
        self.writer.write_record(&record)?;
        Ok(())
    }
}
