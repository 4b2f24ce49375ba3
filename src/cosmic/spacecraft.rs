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

use super::VACUUM_PERMEABILITY;
use crate::dynamics::hysteresis::HysteresisRod;
use crate::io::{ConfigError, InvalidParameterSnafu, SpacecraftParams};
use crate::linalg::{Matrix3, Vector3};
use snafu::ensure;
use std::f64::consts::PI;

/// A body-fixed permanent dipole magnet. The dipole moment is fixed at
/// construction: remanence times volume over the vacuum permeability, along
/// the normalized mounting orientation.
#[derive(Clone, Debug)]
pub struct PermanentMagnet {
    remanence_t: f64,
    volume_m3: f64,
    magnetic_moment_body: Vector3<f64>,
}

impl PermanentMagnet {
    pub fn new(
        remanence_t: f64,
        volume_m3: f64,
        orientation: Vector3<f64>,
    ) -> Result<Self, ConfigError> {
        ensure!(
            volume_m3 > 0.0,
            InvalidParameterSnafu {
                param: "magnet volume",
                reason: format!("must be strictly positive, got {volume_m3}"),
            }
        );
        ensure!(
            orientation.norm() > f64::EPSILON,
            InvalidParameterSnafu {
                param: "magnet orientation",
                reason: "must be a non-zero vector".to_string(),
            }
        );
        let magnetization_am = remanence_t / VACUUM_PERMEABILITY;
        Ok(Self {
            remanence_t,
            volume_m3,
            magnetic_moment_body: magnetization_am * volume_m3 * orientation.normalize(),
        })
    }

    /// Builds a cylindrical magnet of the provided length and diameter.
    pub fn cylindrical(
        remanence_t: f64,
        length_m: f64,
        diameter_m: f64,
        orientation: Vector3<f64>,
    ) -> Result<Self, ConfigError> {
        Self::new(
            remanence_t,
            PI * (diameter_m / 2.0).powi(2) * length_m,
            orientation,
        )
    }

    /// Body-frame dipole moment, in A*m^2.
    pub fn magnetic_moment(&self) -> Vector3<f64> {
        self.magnetic_moment_body
    }

    pub fn remanence_t(&self) -> f64 {
        self.remanence_t
    }

    pub fn volume_m3(&self) -> f64 {
        self.volume_m3
    }
}

/// The rigid spacecraft: a homogeneous box inertia tensor (with its inverse
/// computed once), the permanent magnet, and the hysteresis rod set.
#[derive(Clone, Debug)]
pub struct Spacecraft {
    inertia_tensor: Matrix3<f64>,
    inertia_tensor_inverse: Matrix3<f64>,
    magnet: PermanentMagnet,
    rods: Vec<HysteresisRod>,
}

impl Spacecraft {
    /// Builds the spacecraft from validated parameters. The mass is provided
    /// in grams, the dimensions in meters.
    pub fn from_params(params: &SpacecraftParams) -> Result<Self, ConfigError> {
        params.validate()?;
        let inertia = Self::box_inertia_tensor(
            params.mass_g / 1000.0,
            params.dimensions_m.x,
            params.dimensions_m.y,
            params.dimensions_m.z,
        );
        let magnet = PermanentMagnet::cylindrical(
            params.magnet_remanence_t,
            params.magnet_length_m,
            params.magnet_diameter_m,
            params.magnet_orientation,
        )?;
        let mut rods = Vec::with_capacity(params.rod_orientations.len());
        for orientation in &params.rod_orientations {
            rods.push(HysteresisRod::new(
                params.rod_volume_m3,
                *orientation,
                params.hysteresis,
            )?);
        }
        Ok(Self::assemble(inertia, magnet, rods))
    }

    /// Builds a spacecraft from an explicit inertia tensor, bypassing the box
    /// formula. Used by tests and by callers with measured inertia.
    pub fn from_inertia_tensor(
        inertia_tensor: Matrix3<f64>,
        magnet: PermanentMagnet,
        rods: Vec<HysteresisRod>,
    ) -> Self {
        Self::assemble(inertia_tensor, magnet, rods)
    }

    fn assemble(
        inertia_tensor: Matrix3<f64>,
        magnet: PermanentMagnet,
        rods: Vec<HysteresisRod>,
    ) -> Self {
        let inertia_tensor_inverse = inertia_tensor
            .try_inverse()
            .expect("inertia tensor of a massive body is invertible");
        Self {
            inertia_tensor,
            inertia_tensor_inverse,
            magnet,
            rods,
        }
    }

    /// Inertia tensor of a homogeneous box: I_x = m (a_y^2 + a_z^2) / 12 and
    /// its cyclic permutations. Mass in kg, dimensions in meters.
    pub fn box_inertia_tensor(mass_kg: f64, a_x: f64, a_y: f64, a_z: f64) -> Matrix3<f64> {
        let i_x = mass_kg / 12.0 * (a_y * a_y + a_z * a_z);
        let i_y = mass_kg / 12.0 * (a_x * a_x + a_z * a_z);
        let i_z = mass_kg / 12.0 * (a_x * a_x + a_y * a_y);
        Matrix3::from_diagonal(&Vector3::new(i_x, i_y, i_z))
    }

    pub fn inertia_tensor(&self) -> &Matrix3<f64> {
        &self.inertia_tensor
    }

    pub fn inertia_tensor_inverse(&self) -> &Matrix3<f64> {
        &self.inertia_tensor_inverse
    }

    pub fn magnet(&self) -> &PermanentMagnet {
        &self.magnet
    }

    pub fn rods(&self) -> &[HysteresisRod] {
        &self.rods
    }
}
