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

pub use super::RK;

/// `Fehlberg78` is the 13-stage Runge-Kutta-Fehlberg 7(8) embedded pair,
/// selected for long spans where the higher order pays off.
///
/// Coefficients from NASA TR R-287 (Fehlberg, 1968). The propagated solution
/// is the eighth-order row.
pub struct Fehlberg78 {}

impl RK for Fehlberg78 {
    const ORDER: u8 = 8;
    const STAGES: usize = 13;
    const A_COEFFS: &'static [f64] = &[
        2.0 / 27.0,
        //
        1.0 / 36.0,
        1.0 / 12.0,
        //
        1.0 / 24.0,
        0.0,
        1.0 / 8.0,
        //
        5.0 / 12.0,
        0.0,
        -25.0 / 16.0,
        25.0 / 16.0,
        //
        1.0 / 20.0,
        0.0,
        0.0,
        1.0 / 4.0,
        1.0 / 5.0,
        //
        -25.0 / 108.0,
        0.0,
        0.0,
        125.0 / 108.0,
        -65.0 / 27.0,
        125.0 / 54.0,
        //
        31.0 / 300.0,
        0.0,
        0.0,
        0.0,
        61.0 / 225.0,
        -2.0 / 9.0,
        13.0 / 900.0,
        //
        2.0,
        0.0,
        0.0,
        -53.0 / 6.0,
        704.0 / 45.0,
        -107.0 / 9.0,
        67.0 / 90.0,
        3.0,
        //
        -91.0 / 108.0,
        0.0,
        0.0,
        23.0 / 108.0,
        -976.0 / 135.0,
        311.0 / 54.0,
        -19.0 / 60.0,
        17.0 / 6.0,
        -1.0 / 12.0,
        //
        2_383.0 / 4_100.0,
        0.0,
        0.0,
        -341.0 / 164.0,
        4_496.0 / 1_025.0,
        -301.0 / 82.0,
        2_133.0 / 4_100.0,
        45.0 / 82.0,
        45.0 / 164.0,
        18.0 / 41.0,
        //
        3.0 / 205.0,
        0.0,
        0.0,
        0.0,
        0.0,
        -6.0 / 41.0,
        -3.0 / 205.0,
        -3.0 / 41.0,
        3.0 / 41.0,
        6.0 / 41.0,
        0.0,
        //
        -1_777.0 / 4_100.0,
        0.0,
        0.0,
        -341.0 / 164.0,
        4_496.0 / 1_025.0,
        -289.0 / 82.0,
        2_193.0 / 4_100.0,
        51.0 / 82.0,
        33.0 / 164.0,
        12.0 / 41.0,
        0.0,
        1.0,
    ];
    const B_COEFFS: &'static [f64] = &[
        // Eighth-order solution weights.
        0.0,
        0.0,
        0.0,
        0.0,
        0.0,
        34.0 / 105.0,
        9.0 / 35.0,
        9.0 / 35.0,
        9.0 / 280.0,
        9.0 / 280.0,
        0.0,
        41.0 / 840.0,
        41.0 / 840.0,
        // Embedded seventh-order weights.
        41.0 / 840.0,
        0.0,
        0.0,
        0.0,
        0.0,
        34.0 / 105.0,
        9.0 / 35.0,
        9.0 / 35.0,
        9.0 / 280.0,
        9.0 / 280.0,
        41.0 / 840.0,
        0.0,
        0.0,
    ];
}
