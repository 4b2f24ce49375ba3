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

use crate::cosmic::{EARTH_ROTATION_RATE_RAD_S, WGS84_FLATTENING, WGS84_SEMI_MAJOR_AXIS_M};
use crate::linalg::{Matrix3, Vector3};

/// A point on the WGS-84 ellipsoid, from the reverse-geodetic conversion.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeodeticPoint {
    pub latitude_rad: f64,
    pub longitude_rad: f64,
    pub height_m: f64,
}

/// Rotation taking ECEF coordinates to ECI at `t` seconds past the
/// simulation epoch, where the two frames are assumed aligned. A plain
/// z-rotation by the Earth rotation angle; precession and nutation are out of
/// scope.
pub fn ecef_to_eci_rotation(t_s: f64) -> Matrix3<f64> {
    let theta = EARTH_ROTATION_RATE_RAD_S * t_s;
    let (sin_rot, cos_rot) = theta.sin_cos();
    Matrix3::new(
        cos_rot, -sin_rot, 0.0, //
        sin_rot, cos_rot, 0.0, //
        0.0, 0.0, 1.0,
    )
}

/// Reverse-geodetic conversion of an ECEF position onto the WGS-84
/// ellipsoid, by Bowring's method: a parametric-latitude seed sharpened by
/// his closed-form update, which lands at double precision within a few
/// rounds anywhere off the geocenter.
///
/// Reference: B. R. Bowring, "Transformation from spatial to geographical
/// coordinates", Survey Review 23(181), 1976.
pub fn geodetic_from_ecef(r_ecef_m: &Vector3<f64>) -> GeodeticPoint {
    const LATITUDE_TOL_RAD: f64 = 1e-11;
    const MAX_ROUNDS: usize = 8;

    let semi_minor = WGS84_SEMI_MAJOR_AXIS_M * (1.0 - WGS84_FLATTENING);
    let ecc_sq = WGS84_FLATTENING * (2.0 - WGS84_FLATTENING);
    let second_ecc_sq = ecc_sq / (1.0 - ecc_sq);

    let equatorial_dist = (r_ecef_m.x * r_ecef_m.x + r_ecef_m.y * r_ecef_m.y).sqrt();
    let longitude_rad = r_ecef_m.y.atan2(r_ecef_m.x);

    let mut parametric = (r_ecef_m.z * WGS84_SEMI_MAJOR_AXIS_M)
        .atan2(equatorial_dist * semi_minor);
    let mut latitude = 0.0;
    for round in 1..=MAX_ROUNDS {
        let (sin_par, cos_par) = parametric.sin_cos();
        let candidate = (r_ecef_m.z + second_ecc_sq * semi_minor * sin_par.powi(3))
            .atan2(equatorial_dist - ecc_sq * WGS84_SEMI_MAJOR_AXIS_M * cos_par.powi(3));
        let shift = (candidate - latitude).abs();
        latitude = candidate;
        if shift < LATITUDE_TOL_RAD {
            break;
        }
        if round == MAX_ROUNDS {
            warn!("geodetic latitude still shifting by {shift:.3e} rad after {MAX_ROUNDS} rounds");
            break;
        }
        parametric = ((1.0 - WGS84_FLATTENING) * latitude.tan()).atan();
    }

    let (sin_lat, cos_lat) = latitude.sin_cos();
    let prime_vertical = WGS84_SEMI_MAJOR_AXIS_M / (1.0 - ecc_sq * sin_lat.powi(2)).sqrt();
    // Near the poles the cosine formulation degenerates; use the sine form.
    let height_m = if cos_lat.abs() > 1e-2 {
        equatorial_dist / cos_lat - prime_vertical
    } else {
        r_ecef_m.z / sin_lat - prime_vertical * (1.0 - ecc_sq)
    };

    GeodeticPoint {
        latitude_rad: latitude,
        longitude_rad,
        height_m,
    }
}

/// Forward-geodetic conversion, the inverse of [`geodetic_from_ecef`]: the
/// standard ellipsoidal equations through the prime-vertical radius of
/// curvature.
pub fn ecef_from_geodetic(point: &GeodeticPoint) -> Vector3<f64> {
    let ecc_sq = WGS84_FLATTENING * (2.0 - WGS84_FLATTENING);
    let (sin_lat, cos_lat) = point.latitude_rad.sin_cos();
    let (sin_lon, cos_lon) = point.longitude_rad.sin_cos();
    let prime_vertical = WGS84_SEMI_MAJOR_AXIS_M / (1.0 - ecc_sq * sin_lat.powi(2)).sqrt();
    Vector3::new(
        (prime_vertical + point.height_m) * cos_lat * cos_lon,
        (prime_vertical + point.height_m) * cos_lat * sin_lon,
        (prime_vertical * (1.0 - ecc_sq) + point.height_m) * sin_lat,
    )
}

/// Rotation taking local East-North-Up components at the provided geodetic
/// point to ECEF. The columns are the ENU basis vectors expressed in ECEF.
pub fn enu_to_ecef_rotation(latitude_rad: f64, longitude_rad: f64) -> Matrix3<f64> {
    let (sin_lat, cos_lat) = latitude_rad.sin_cos();
    let (sin_lon, cos_lon) = longitude_rad.sin_cos();

    let east = Vector3::new(-sin_lon, cos_lon, 0.0);
    let north = Vector3::new(-sin_lat * cos_lon, -sin_lat * sin_lon, cos_lat);
    let up = Vector3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat);

    Matrix3::from_columns(&[east, north, up])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ecef_and_eci_are_aligned_at_epoch() {
        let rotation = ecef_to_eci_rotation(0.0);
        assert!((rotation - Matrix3::identity()).abs().max() < 1e-15);
    }

    #[test]
    fn ecef_to_eci_rotates_prograde() {
        // A quarter sidereal-ish turn later, the ECEF +X axis has moved
        // towards ECI +Y.
        let quarter = std::f64::consts::FRAC_PI_2 / EARTH_ROTATION_RATE_RAD_S;
        let rotation = ecef_to_eci_rotation(quarter);
        let x_eci = rotation * Vector3::x();
        assert!(x_eci.x.abs() < 1e-9);
        assert!((x_eci.y - 1.0).abs() < 1e-9);
    }

    #[test]
    fn geodetic_round_trip() {
        let point = GeodeticPoint {
            latitude_rad: 0.8,
            longitude_rad: 0.5,
            height_m: 500_000.0,
        };
        let r_ecef = ecef_from_geodetic(&point);
        let back = geodetic_from_ecef(&r_ecef);
        assert!((back.latitude_rad - point.latitude_rad).abs() < 1e-9);
        assert!((back.longitude_rad - point.longitude_rad).abs() < 1e-9);
        assert!((back.height_m - point.height_m).abs() < 1e-3);
    }

    #[test]
    fn geodetic_equator_and_pole() {
        let equator = geodetic_from_ecef(&Vector3::new(WGS84_SEMI_MAJOR_AXIS_M + 400e3, 0.0, 0.0));
        assert!(equator.latitude_rad.abs() < 1e-12);
        assert!((equator.height_m - 400e3).abs() < 1e-3);

        let polar_radius = WGS84_SEMI_MAJOR_AXIS_M * (1.0 - WGS84_FLATTENING);
        let pole = geodetic_from_ecef(&Vector3::new(0.0, 0.0, polar_radius + 400e3));
        assert!((pole.latitude_rad - std::f64::consts::FRAC_PI_2).abs() < 1e-6);
        assert!((pole.height_m - 400e3).abs() < 1.0);
    }

    #[test]
    fn enu_basis_is_orthonormal() {
        let rotation = enu_to_ecef_rotation(0.7, -1.2);
        let should_be_identity = rotation.transpose() * rotation;
        assert!((should_be_identity - Matrix3::identity()).abs().max() < 1e-14);
        // Up at the equator/prime-meridian is +X in ECEF.
        let up = enu_to_ecef_rotation(0.0, 0.0) * Vector3::z();
        assert!((up - Vector3::x()).norm() < 1e-14);
    }
}
