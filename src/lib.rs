/*
    Nyx, blazing fast astrodynamics
    Copyright (C) 2018-onwards Christopher Rabotin <christopher.rabotin@gmail.com>

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

/*! # nyx-iekf

Offline (batch) nonlinear state estimation: the Extended Kalman Filter and its iterated variant,
where the measurement update is solved as a maximum a posteriori problem with a damped Gauss-Newton search.

Given an initial estimate, a history of control inputs, a history of measurements and the noise covariances,
the filters produce the full history of a posteriori estimates, covariances and normalized innovation statistics.
*/

/// Provides the dynamics and measurement model interfaces, and a linear implementation of both.
pub mod dynamics;

/// Provides the fixed step Runge Kutta discretizer of continuous time dynamics.
pub mod propagators;

/// Configuration loading.
pub mod io;

/// All of the filtering tools: estimates, filter engines, filter context and batch processing.
pub mod estimation;

/// Monte Carlo module: truth simulation and parallel consistency runs.
pub mod mc;

#[macro_use]
extern crate log;
extern crate hifitime;
extern crate nalgebra as na;

/// Re-export of hifitime
pub mod time {
    pub use hifitime::*;
}

/// Re-export nalgebra
pub mod linalg {
    pub use na::base::*;
}

pub use self::estimation::FilterError;

/// Matrix utilities shared by the filters and the Monte Carlo module.
pub mod utils;
