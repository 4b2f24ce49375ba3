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
use crate::cosmic::{EARTH_MU_M3_S2, WGS84_SEMI_MAJOR_AXIS_M};
use crate::linalg::{DMatrix, Vector3};
use flate2::read::GzDecoder;
use std::cell::RefCell;
use std::cmp::min;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Guard on 1/cos(latitude) in the eastward synthesis term.
const POLE_EPSILON: f64 = 1e-10;

/// Read access to a set of normalized spherical-harmonic gravity
/// coefficients. A backend other than the in-memory table (a database, a
/// memory-mapped archive) only needs to satisfy this trait.
pub trait GravityCoefficients: Clone {
    /// Highest degree held by this backend.
    fn degree(&self) -> usize;
    /// Highest order held by this backend.
    fn order(&self) -> usize;
    /// The normalized (C_nm, S_nm) pair at the provided degree and order.
    fn value(&self, degree: usize, order: usize) -> (f64, f64);
}

/// An in-memory table of normalized gravity coefficients, truncated at load
/// time to whatever degree and order the run asks for.
#[derive(Clone, Debug)]
pub struct CoefficientTable {
    degree: usize,
    order: usize,
    c_nm: DMatrix<f64>,
    s_nm: DMatrix<f64>,
}

/// One `n m C [S]` coefficient row. Blank lines yield `None`; trailing
/// columns (sigmas in the published files) are ignored.
fn parse_coefficient_row(line: &str) -> Result<Option<(usize, usize, f64, f64)>, String> {
    let cleaned = line.replace(',', " ");
    let mut tokens = cleaned.split_whitespace();
    let Some(first) = tokens.next() else {
        return Ok(None);
    };
    let n = first
        .parse::<usize>()
        .map_err(|_| format!("bad degree token `{first}`"))?;
    let order_token = tokens
        .next()
        .ok_or_else(|| "row ends before the order".to_string())?;
    let m = order_token
        .parse::<usize>()
        .map_err(|_| format!("bad order token `{order_token}`"))?;
    let c = parse_fortran_float(
        tokens
            .next()
            .ok_or_else(|| "row ends before C_nm".to_string())?,
    )?;
    let s = match tokens.next() {
        Some(token) => parse_fortran_float(token)?,
        None => 0.0,
    };
    Ok(Some((n, m, c, s)))
}

/// Published coefficient files sometimes carry FORTRAN `D` exponents.
fn parse_fortran_float(token: &str) -> Result<f64, String> {
    token
        .replace(['D', 'd'], "E")
        .parse::<f64>()
        .map_err(|_| format!("bad coefficient token `{token}`"))
}

impl CoefficientTable {
    /// A table holding nothing but the provided normalized J2 value.
    pub fn from_j2(j2_normalized: f64) -> Self {
        let mut c_nm = DMatrix::zeros(3, 3);
        c_nm[(2, 0)] = j2_normalized;
        Self {
            degree: 2,
            order: 0,
            c_nm,
            s_nm: DMatrix::zeros(3, 3),
        }
    }

    /// Earth J2 only, EGM2008 value.
    pub fn j2_egm2008() -> Self {
        Self::from_j2(-0.484_165_143_790_815e-3)
    }

    /// Loads an EGM-format file: one coefficient per row, comma or
    /// whitespace separated, optionally gunzipped.
    pub fn from_egm<P: AsRef<Path>>(
        path: P,
        degree: usize,
        order: usize,
        gunzipped: bool,
    ) -> Result<Self, EnvironmentError> {
        Self::from_rows(path, degree, order, gunzipped, 0)
    }

    /// Loads a SHADR-format file, which opens with one header line.
    pub fn from_shadr<P: AsRef<Path>>(
        path: P,
        degree: usize,
        order: usize,
        gunzipped: bool,
    ) -> Result<Self, EnvironmentError> {
        Self::from_rows(path, degree, order, gunzipped, 1)
    }

    fn read_text<P: AsRef<Path>>(path: P, gunzipped: bool) -> Result<String, EnvironmentError> {
        let label = path.as_ref().display().to_string();
        let file = File::open(&path).map_err(|_| {
            DataFileMissingSnafu {
                path: label.clone(),
            }
            .build()
        })?;
        let mut buffer = Vec::new();
        let outcome = if gunzipped {
            GzDecoder::new(file).read_to_end(&mut buffer)
        } else {
            let mut file = file;
            file.read_to_end(&mut buffer)
        };
        outcome.map_err(|err| EnvironmentError::DataFileUnreadable {
            path: label.clone(),
            details: err.to_string(),
        })?;
        String::from_utf8(buffer).map_err(|_| EnvironmentError::DataFileUnreadable {
            path: label,
            details: "contents are not valid utf-8".to_string(),
        })
    }

    /// Shared loading path: parse every row, keep those within the requested
    /// truncation, and report what the file actually offered.
    fn from_rows<P: AsRef<Path>>(
        path: P,
        degree: usize,
        order: usize,
        gunzipped: bool,
        header_lines: usize,
    ) -> Result<Self, EnvironmentError> {
        let label = path.as_ref().display().to_string();
        let text = Self::read_text(&path, gunzipped)?;

        let mut c_nm = DMatrix::zeros(degree + 1, degree + 1);
        let mut s_nm = DMatrix::zeros(degree + 1, degree + 1);
        let mut offered = (0_usize, 0_usize);
        let mut kept = (0_usize, 0_usize);

        for (lineno, line) in text.lines().enumerate() {
            if lineno < header_lines {
                continue;
            }
            let parsed = parse_coefficient_row(line).map_err(|why| {
                EnvironmentError::DataFileUnreadable {
                    path: label.clone(),
                    details: format!("line {}: {why}", lineno + 1),
                }
            })?;
            let Some((n, m, c, s)) = parsed else {
                continue;
            };
            offered = (offered.0.max(n), offered.1.max(m));
            if n > degree || m > order {
                continue;
            }
            c_nm[(n, m)] = c;
            s_nm[(n, m)] = s;
            kept = (kept.0.max(n), kept.1.max(m));
        }

        if kept.0 < degree || kept.1 < order {
            warn!(
                "{label} tops out at degree {} / order {}, short of the requested {degree}/{order}",
                kept.0, kept.1
            );
        } else {
            info!(
                "{label}: gravity coefficients ready at degree {degree}, order {order} \
                 (file offers {}/{})",
                offered.0, offered.1
            );
        }
        Ok(Self {
            degree: kept.0,
            order: kept.1,
            c_nm,
            s_nm,
        })
    }
}

impl GravityCoefficients for CoefficientTable {
    fn degree(&self) -> usize {
        self.degree
    }

    fn order(&self) -> usize {
        self.order
    }

    fn value(&self, degree: usize, order: usize) -> (f64, f64) {
        (self.c_nm[(degree, order)], self.s_nm[(degree, order)])
    }
}

/// Scratch storage of the Legendre recursion, reused across evaluations.
/// Interior mutability only: every entry read is rewritten first.
#[derive(Debug)]
struct NormalizedLegendre {
    p_bar: DMatrix<f64>,
    dp_bar: DMatrix<f64>,
}

/// The non-central gravity acceleration, synthesized as the gradient of the
/// disturbing potential in geocentric spherical components and rotated to
/// ECEF Cartesian. The central Newtonian term is the caller's to add.
///
/// Reference: O. Montenbruck and E. Gill, "Satellite Orbits", section 3.2.
#[derive(Debug)]
pub struct GravityField<S: GravityCoefficients> {
    coefficients: S,
    /// sqrt((2n+1)/2n), the sectorial step of the recursion.
    diagonal_factors: Vec<f64>,
    alpha_nm: DMatrix<f64>,
    beta_nm: DMatrix<f64>,
    workspace: RefCell<NormalizedLegendre>,
}

impl<S: GravityCoefficients> GravityField<S> {
    /// Builds the evaluator, pre-computing every input-independent recursion
    /// factor of the fully normalized associated Legendre functions.
    pub fn new(coefficients: S) -> Self {
        let size = coefficients.degree() + 1;
        let mut diagonal_factors = vec![0.0; size];
        let mut alpha_nm = DMatrix::zeros(size, size);
        let mut beta_nm = DMatrix::zeros(size, size);
        for n in 2..size {
            let nf = n as f64;
            diagonal_factors[n] = ((2.0 * nf + 1.0) / (2.0 * nf)).sqrt();
            for m in 0..n {
                let mf = m as f64;
                alpha_nm[(n, m)] =
                    ((2.0 * nf - 1.0) * (2.0 * nf + 1.0) / ((nf - mf) * (nf + mf))).sqrt();
                if n >= m + 2 {
                    beta_nm[(n, m)] = ((2.0 * nf + 1.0) * (nf + mf - 1.0) * (nf - mf - 1.0)
                        / ((nf - mf) * (nf + mf) * (2.0 * nf - 3.0)))
                        .sqrt();
                }
            }
        }
        Self {
            coefficients,
            diagonal_factors,
            alpha_nm,
            beta_nm,
            workspace: RefCell::new(NormalizedLegendre {
                p_bar: DMatrix::zeros(size, size),
                dp_bar: DMatrix::zeros(size, size),
            }),
        }
    }

    pub fn coefficients(&self) -> &S {
        &self.coefficients
    }

    /// Fully normalized associated Legendre functions of the geocentric
    /// latitude and their latitude derivatives, filled into the workspace.
    /// Entries above the diagonal are never written and stay zero, which the
    /// recursion relies on for its m = n - 1 column.
    fn legendre(&self, sin_lat: f64, cos_lat: f64, tables: &mut NormalizedLegendre) {
        let degree = self.coefficients.degree();
        let p = &mut tables.p_bar;
        let dp = &mut tables.dp_bar;
        p[(0, 0)] = 1.0;
        dp[(0, 0)] = 0.0;
        if degree == 0 {
            return;
        }
        let sqrt3 = 3.0_f64.sqrt();
        p[(1, 0)] = sqrt3 * sin_lat;
        dp[(1, 0)] = sqrt3 * cos_lat;
        p[(1, 1)] = sqrt3 * cos_lat;
        dp[(1, 1)] = -sqrt3 * sin_lat;
        for n in 2..=degree {
            let diag = self.diagonal_factors[n];
            p[(n, n)] = diag * cos_lat * p[(n - 1, n - 1)];
            dp[(n, n)] = diag * (cos_lat * dp[(n - 1, n - 1)] - sin_lat * p[(n - 1, n - 1)]);
            for m in 0..n {
                let alpha = self.alpha_nm[(n, m)];
                let beta = self.beta_nm[(n, m)];
                p[(n, m)] = alpha * sin_lat * p[(n - 1, m)] - beta * p[(n - 2, m)];
                dp[(n, m)] = alpha * (cos_lat * p[(n - 1, m)] + sin_lat * dp[(n - 1, m)])
                    - beta * dp[(n - 2, m)];
            }
        }
    }

    /// Disturbing acceleration at the provided ECEF position, in m/s^2,
    /// expressed in ECEF.
    pub fn acceleration(&self, r_ecef_m: &Vector3<f64>) -> Vector3<f64> {
        let degree = self.coefficients.degree();
        if degree < 2 {
            return Vector3::zeros();
        }

        let r = r_ecef_m.norm();
        let rho_xy = (r_ecef_m.x * r_ecef_m.x + r_ecef_m.y * r_ecef_m.y).sqrt();
        let lat_gc = r_ecef_m.z.atan2(rho_xy);
        let lon = r_ecef_m.y.atan2(r_ecef_m.x);
        let (sin_lat, cos_lat) = lat_gc.sin_cos();

        let mut tables = self.workspace.borrow_mut();
        self.legendre(sin_lat, cos_lat, &mut tables);

        // Gradient of the disturbing potential R = (mu/r) sum (a/r)^n P (C,S)
        // in the local (radial, northward, eastward) geocentric basis.
        let ratio = WGS84_SEMI_MAJOR_AXIS_M / r;
        let mut radial = 0.0;
        let mut northward = 0.0;
        let mut eastward = 0.0;
        for n in 2..=degree {
            let attenuation = ratio.powi(n as i32);
            for m in 0..=min(n, self.coefficients.order()) {
                let (c, s) = self.coefficients.value(n, m);
                if c == 0.0 && s == 0.0 {
                    continue;
                }
                let (sin_ml, cos_ml) = (m as f64 * lon).sin_cos();
                let in_phase = c * cos_ml + s * sin_ml;
                radial -= (n as f64 + 1.0) * attenuation * tables.p_bar[(n, m)] * in_phase;
                northward += attenuation * tables.dp_bar[(n, m)] * in_phase;
                if m > 0 && cos_lat.abs() > POLE_EPSILON {
                    eastward += attenuation / cos_lat
                        * m as f64
                        * tables.p_bar[(n, m)]
                        * (s * cos_ml - c * sin_ml);
                }
            }
        }
        let scale = EARTH_MU_M3_S2 / (r * r);

        let (sin_lon, cos_lon) = lon.sin_cos();
        let radial_hat = Vector3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat);
        let north_hat = Vector3::new(-sin_lat * cos_lon, -sin_lat * sin_lon, cos_lat);
        let east_hat = Vector3::new(-sin_lon, cos_lon, 0.0);
        scale * (radial * radial_hat + northward * north_hat + eastward * east_hat)
    }
}
