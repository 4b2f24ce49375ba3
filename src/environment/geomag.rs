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

use super::{DataFileMissingSnafu, EnvironmentError};
use crate::cosmic::{GEOMAGNETIC_REFERENCE_RADIUS_M, WGS84_FLATTENING, WGS84_SEMI_MAJOR_AXIS_M};
use crate::linalg::{DMatrix, Vector3};
use std::cell::RefCell;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

/// Guard on 1/cos(latitude) in the sectoral synthesis term. Polar passes of
/// near-polar orbits sit inside this band for a few milliseconds at most.
const POLE_EPSILON: f64 = 1e-10;

/// Spherical-harmonic main-field coefficients with their secular variation,
/// Schmidt semi-normalized, in nT. Loaded from the NOAA `WMM.COF` text
/// format: one header line with the model epoch and name, then one row
/// `n m g h gdot hdot` per coefficient, terminated by a row of nines.
#[derive(Clone, Debug)]
pub struct MagneticCoeffs {
    epoch_year: f64,
    degree: usize,
    g_nm: DMatrix<f64>,
    h_nm: DMatrix<f64>,
    g_dot_nm: DMatrix<f64>,
    h_dot_nm: DMatrix<f64>,
}

impl MagneticCoeffs {
    pub fn from_cof<P: AsRef<Path>>(path: P) -> Result<Self, EnvironmentError> {
        let path_str = path.as_ref().display().to_string();
        let mut file = File::open(&path).map_err(|_| {
            DataFileMissingSnafu {
                path: path_str.clone(),
            }
            .build()
        })?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|err| EnvironmentError::DataFileUnreadable {
                path: path_str.clone(),
                details: err.to_string(),
            })?;
        Self::parse(&contents).map_err(|details| EnvironmentError::DataFileUnreadable {
            path: path_str,
            details,
        })
    }

    fn parse(contents: &str) -> Result<Self, String> {
        let mut lines = contents.lines();
        let header = lines.next().ok_or("empty coefficient file")?;
        let mut header_items = header.split_whitespace();
        let epoch_year = header_items
            .next()
            .and_then(|item| f64::from_str(item).ok())
            .ok_or("could not parse the model epoch from the header")?;

        let mut rows = Vec::new();
        let mut max_degree = 0usize;
        for (lno, line) in lines.enumerate() {
            let items: Vec<&str> = line.split_whitespace().collect();
            if items.is_empty() {
                continue;
            }
            // The terminator is a row of nines.
            if items[0].starts_with("9999") {
                break;
            }
            if items.len() < 6 {
                return Err(format!("malformed coefficient row on line {}", lno + 2));
            }
            let n = usize::from_str(items[0])
                .map_err(|_| format!("could not parse degree on line {}", lno + 2))?;
            let m = usize::from_str(items[1])
                .map_err(|_| format!("could not parse order on line {}", lno + 2))?;
            let mut values = [0.0; 4];
            for (j, value) in values.iter_mut().enumerate() {
                *value = f64::from_str(items[2 + j])
                    .map_err(|_| format!("could not parse coefficient on line {}", lno + 2))?;
            }
            if m > n {
                return Err(format!("order exceeds degree on line {}", lno + 2));
            }
            max_degree = max_degree.max(n);
            rows.push((n, m, values));
        }
        if max_degree == 0 {
            return Err("coefficient file holds no harmonic rows".to_string());
        }

        let size = max_degree + 1;
        let mut g_nm = DMatrix::zeros(size, size);
        let mut h_nm = DMatrix::zeros(size, size);
        let mut g_dot_nm = DMatrix::zeros(size, size);
        let mut h_dot_nm = DMatrix::zeros(size, size);
        for (n, m, values) in rows {
            g_nm[(n, m)] = values[0];
            h_nm[(n, m)] = values[1];
            g_dot_nm[(n, m)] = values[2];
            h_dot_nm[(n, m)] = values[3];
        }

        Ok(Self {
            epoch_year,
            degree: max_degree,
            g_nm,
            h_nm,
            g_dot_nm,
            h_dot_nm,
        })
    }

    /// Builds a pure-dipole coefficient set. Used by the tests and by the
    /// simplified environment variants.
    pub fn dipole(epoch_year: f64, g10_nt: f64, g11_nt: f64, h11_nt: f64) -> Self {
        let mut g_nm = DMatrix::zeros(2, 2);
        let mut h_nm = DMatrix::zeros(2, 2);
        g_nm[(1, 0)] = g10_nt;
        g_nm[(1, 1)] = g11_nt;
        h_nm[(1, 1)] = h11_nt;
        Self {
            epoch_year,
            degree: 1,
            g_nm,
            h_nm,
            g_dot_nm: DMatrix::zeros(2, 2),
            h_dot_nm: DMatrix::zeros(2, 2),
        }
    }

    pub fn epoch_year(&self) -> f64 {
        self.epoch_year
    }

    pub fn degree(&self) -> usize {
        self.degree
    }
}

/// Scratch storage of the Legendre recursion, reused across evaluations.
/// Interior mutability only: no value computed here survives as an input to
/// a later call.
#[derive(Debug)]
struct LegendreWorkspace {
    p_nm: DMatrix<f64>,
    dp_nm: DMatrix<f64>,
}

/// World Magnetic Model field synthesis.
#[derive(Debug)]
pub struct MagneticModel {
    coeffs: MagneticCoeffs,
    workspace: RefCell<LegendreWorkspace>,
}

impl MagneticModel {
    pub fn new(coeffs: MagneticCoeffs) -> Self {
        let size = coeffs.degree + 1;
        Self {
            coeffs,
            workspace: RefCell::new(LegendreWorkspace {
                p_nm: DMatrix::zeros(size, size),
                dp_nm: DMatrix::zeros(size, size),
            }),
        }
    }

    pub fn from_cof<P: AsRef<Path>>(path: P) -> Result<Self, EnvironmentError> {
        Ok(Self::new(MagneticCoeffs::from_cof(path)?))
    }

    pub fn coeffs(&self) -> &MagneticCoeffs {
        &self.coeffs
    }

    /// Evaluates the geomagnetic field at the provided decimal year and
    /// geodetic point, returning local (east, north, up) components in nT.
    pub fn field_enu_nt(
        &self,
        year: f64,
        latitude_rad: f64,
        longitude_rad: f64,
        height_m: f64,
    ) -> Vector3<f64> {
        let degree = self.coeffs.degree;
        let dt_years = year - self.coeffs.epoch_year;

        // Geodetic to geocentric spherical coordinates.
        let (sin_lat, cos_lat) = latitude_rad.sin_cos();
        let e2 = WGS84_FLATTENING * (2.0 - WGS84_FLATTENING);
        let curvature = WGS84_SEMI_MAJOR_AXIS_M / (1.0 - e2 * sin_lat * sin_lat).sqrt();
        let rho = (curvature + height_m) * cos_lat;
        let z_gc = (curvature * (1.0 - e2) + height_m) * sin_lat;
        let r_gc = (rho * rho + z_gc * z_gc).sqrt();
        let lat_gc = z_gc.atan2(rho);

        let (sin_gc, cos_gc) = lat_gc.sin_cos();
        let u = GEOMAGNETIC_REFERENCE_RADIUS_M / r_gc;

        let mut workspace = self.workspace.borrow_mut();
        Self::legendre_schmidt(degree, sin_gc, cos_gc, &mut workspace);

        // Gradient of the internal potential in the geocentric frame:
        // north (X'), east (Y'), down (Z').
        let mut b_north_gc = 0.0;
        let mut b_east_gc = 0.0;
        let mut b_down_gc = 0.0;
        for n in 1..=degree {
            let radial = u.powi(n as i32 + 2);
            for m in 0..=n {
                let g = self.coeffs.g_nm[(n, m)] + dt_years * self.coeffs.g_dot_nm[(n, m)];
                let h = self.coeffs.h_nm[(n, m)] + dt_years * self.coeffs.h_dot_nm[(n, m)];
                let (sin_ml, cos_ml) = (m as f64 * longitude_rad).sin_cos();
                let in_phase = g * cos_ml + h * sin_ml;

                b_north_gc -= radial * in_phase * workspace.dp_nm[(n, m)];
                if m > 0 && cos_gc.abs() > POLE_EPSILON {
                    b_east_gc +=
                        radial / cos_gc * m as f64 * (g * sin_ml - h * cos_ml) * workspace.p_nm[(n, m)];
                }
                b_down_gc -= (n as f64 + 1.0) * radial * in_phase * workspace.p_nm[(n, m)];
            }
        }
        // The synthesis above sits in the geocentric latitude frame; rotate
        // the meridional components back to the geodetic vertical.
        let psi = lat_gc - latitude_rad;
        let (sin_psi, cos_psi) = psi.sin_cos();
        let b_north = b_north_gc * cos_psi - b_down_gc * sin_psi;
        let b_down = b_north_gc * sin_psi + b_down_gc * cos_psi;

        Vector3::new(b_east_gc, b_north, -b_down)
    }

    /// Schmidt semi-normalized associated Legendre functions of sin(latitude)
    /// and their latitude derivatives, filled into the workspace.
    fn legendre_schmidt(degree: usize, s: f64, c: f64, workspace: &mut LegendreWorkspace) {
        let p = &mut workspace.p_nm;
        let dp = &mut workspace.dp_nm;
        p[(0, 0)] = 1.0;
        dp[(0, 0)] = 0.0;
        for n in 1..=degree {
            for m in 0..=n {
                if n == m {
                    if n == 1 {
                        p[(1, 1)] = c;
                        dp[(1, 1)] = -s;
                    } else {
                        let factor =
                            ((2.0 * n as f64 - 1.0) / (2.0 * n as f64)).sqrt();
                        p[(n, n)] = factor * c * p[(n - 1, n - 1)];
                        dp[(n, n)] = factor * (c * dp[(n - 1, n - 1)] - s * p[(n - 1, n - 1)]);
                    }
                } else {
                    let n2_m2 = ((n * n - m * m) as f64).sqrt();
                    let k1 = (2.0 * n as f64 - 1.0) / n2_m2;
                    let k2 = if n >= m + 2 {
                        (((n - 1) * (n - 1) - m * m) as f64).sqrt() / n2_m2
                    } else {
                        0.0
                    };
                    let (p_prev2, dp_prev2) = if n >= 2 {
                        (p[(n - 2, m)], dp[(n - 2, m)])
                    } else {
                        (0.0, 0.0)
                    };
                    p[(n, m)] = k1 * s * p[(n - 1, m)] - k2 * p_prev2;
                    dp[(n, m)] = k1 * (c * p[(n - 1, m)] + s * dp[(n - 1, m)]) - k2 * dp_prev2;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Closed-form field of a pure axial+equatorial dipole, derived from the
    /// n = 1 terms of the potential.
    fn dipole_enu(
        g10: f64,
        g11: f64,
        h11: f64,
        lat_gc: f64,
        lon: f64,
        r_gc: f64,
    ) -> Vector3<f64> {
        let u = GEOMAGNETIC_REFERENCE_RADIUS_M / r_gc;
        let u3 = u.powi(3);
        let (s, c) = lat_gc.sin_cos();
        let (sin_l, cos_l) = lon.sin_cos();
        let north = -u3 * ((g10 * c) + (g11 * cos_l + h11 * sin_l) * (-s));
        // The sectoral 1/cos(lat) cancels against P11 = cos(lat).
        let east = u3 * (g11 * sin_l - h11 * cos_l);
        let down = -2.0 * u3 * (g10 * s + (g11 * cos_l + h11 * sin_l) * c);
        Vector3::new(east, north, -down)
    }

    #[test]
    fn axial_dipole_at_poles_and_equator() {
        // Spherical geometry (height chosen on the geocentric sphere is not
        // needed: we only check signs and magnitudes loosely at the equator
        // where geodetic and geocentric latitudes coincide).
        let g10 = -29404.0;
        let model = MagneticModel::new(MagneticCoeffs::dipole(2025.0, g10, 0.0, 0.0));

        let field = model.field_enu_nt(2025.0, 0.0, 0.0, 0.0);
        // At the equator of an axial dipole the field points north with
        // magnitude |g10| (a/r)^3 and has no vertical component.
        let u3 = (GEOMAGNETIC_REFERENCE_RADIUS_M / WGS84_SEMI_MAJOR_AXIS_M).powi(3);
        assert!((field.y - (-g10) * u3).abs() < 1e-6 * field.y.abs());
        assert!(field.x.abs() < 1e-9);
        assert!(field.z.abs() < 1e-6 * field.y.abs());
    }

    #[test]
    fn tilted_dipole_matches_closed_form() {
        let (g10, g11, h11) = (-29404.0, -1450.0, 4653.0);
        let model = MagneticModel::new(MagneticCoeffs::dipole(2025.0, g10, g11, h11));

        // Compare on the geocentric sphere at the equator, where the
        // geodetic-geocentric rotation vanishes.
        for lon_deg in [-120.0_f64, -30.0, 0.0, 45.0, 160.0] {
            let lon = lon_deg.to_radians();
            let field = model.field_enu_nt(2025.0, 0.0, lon, 500e3);
            let r_gc = WGS84_SEMI_MAJOR_AXIS_M + 500e3;
            let expected = dipole_enu(g10, g11, h11, 0.0, lon, r_gc);
            assert!((field - expected).norm() < 1e-6 * expected.norm());
        }
    }

    #[test]
    fn secular_variation_moves_the_field() {
        let mut coeffs = MagneticCoeffs::dipole(2025.0, -29404.0, 0.0, 0.0);
        coeffs.g_dot_nm[(1, 0)] = 10.0;
        let model = MagneticModel::new(coeffs);
        let field_epoch = model.field_enu_nt(2025.0, 0.3, 0.1, 500e3);
        let field_later = model.field_enu_nt(2027.0, 0.3, 0.1, 500e3);
        assert!((field_later - field_epoch).norm() > 1.0);
    }

    #[test]
    fn repeated_calls_are_pure() {
        let model = MagneticModel::new(MagneticCoeffs::dipole(2025.0, -29404.0, -1450.0, 4653.0));
        let first = model.field_enu_nt(2025.5, 0.7, -1.1, 450e3);
        let again = model.field_enu_nt(2025.5, 0.7, -1.1, 450e3);
        assert_eq!(first, again);
    }

    #[test]
    fn parses_cof_format() {
        let contents = "\
    2025.0            WMM-2025     11/13/2024
  1  0  -29351.8       0.0       12.6        0.0
  1  1   -1410.8    4545.4        9.7      -21.5
  2  0   -2556.6       0.0      -11.6        0.0
  2  1    2951.1   -3133.6       -5.2      -27.7
  2  2    1649.3    -815.1       -8.0      -12.1
999999999999999999999999999999999999999999999999
999999999999999999999999999999999999999999999999
";
        let coeffs = MagneticCoeffs::parse(contents).unwrap();
        assert_eq!(coeffs.degree(), 2);
        assert!((coeffs.epoch_year() - 2025.0).abs() < f64::EPSILON);
        assert!((coeffs.g_nm[(1, 0)] + 29351.8).abs() < 1e-9);
        assert!((coeffs.h_nm[(2, 1)] + 3133.6).abs() < 1e-9);
        assert!((coeffs.g_dot_nm[(1, 0)] - 12.6).abs() < 1e-9);
    }

    #[test]
    fn rejects_malformed_cof() {
        assert!(MagneticCoeffs::parse("").is_err());
        assert!(MagneticCoeffs::parse("2025.0 WMM\n  1  0  bad\n").is_err());
        // Missing harmonic rows.
        assert!(MagneticCoeffs::parse("2025.0 WMM\n9999999\n").is_err());
    }

    #[test]
    fn missing_file_is_reported() {
        let err = MagneticModel::from_cof("/nonexistent/WMM.COF").unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
