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

use crate::dynamics::DynamicsError;
use crate::io::ConfigError;
use crate::propagators::PropagationError;
use snafu::prelude::*;

/// Provides the estimate and residual structures.
pub mod estimate;

/// Provides the filter engines (EKF and iterated EKF).
pub mod filter;
pub use filter::Filter;

/// Provides the configuration, the filter context and the batch filtering process.
pub mod process;

#[allow(unused_imports)]
pub mod prelude {
    pub use super::estimate::*;
    pub use super::filter::*;
    pub use super::process::*;
    pub use super::FilterError;
    pub use crate::dynamics::{
        Derivative, DynamicsError, DynamicsModel, LinearDynamics, LinearMeasurement,
        MeasurementModel, Propagation,
    };
    pub use crate::io::{ConfigError, ConfigRepr};

    pub use crate::time::{Duration, Epoch, TimeUnits, Unit};
}

#[derive(Debug, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum FilterError {
    #[snafu(display("filter configuration is invalid: {source}"))]
    ConfigFailure { source: ConfigError },
    #[snafu(display("expected {expected} {what} but got {got}"))]
    InputLength {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    #[snafu(display("epochs must be strictly increasing, but epoch #{k} is not after the previous one"))]
    NonIncreasingEpochs { k: usize },
    #[snafu(display("initial step {k_init} is after the last step {k_max}"))]
    InvalidInitialStep { k_init: usize, k_max: usize },
    #[snafu(display("{which} is invalid: {reason}"))]
    InvalidMatrix {
        which: &'static str,
        reason: &'static str,
    },
    #[snafu(display("time update from step {k} failed: {source}"))]
    FilterPropagation { k: usize, source: PropagationError },
    #[snafu(display("model evaluation for step {k} failed: {source}"))]
    FilterDynamics { k: usize, source: DynamicsError },
    #[snafu(display("innovation covariance is singular at step {k}"))]
    SingularInnovation { k: usize },
    #[snafu(display("predicted covariance is singular at step {k}"))]
    SingularPredictedCovar { k: usize },
    #[snafu(display("measurement noise is singular at step {k}"))]
    SingularMeasurementNoise { k: usize },
    #[snafu(display("information matrix is singular at step {k}"))]
    SingularInformation { k: usize },
    #[snafu(display("estimate covariance is singular at step {k}"))]
    SingularCovariance { k: usize },
    #[snafu(display("history slot {k} cannot be written, expected slot {expected}"))]
    HistoryWrite { k: usize, expected: usize },
    #[snafu(display("not enough residuals to {action}"))]
    NoResiduals { action: &'static str },
    #[snafu(display("statistics computation failed: {reason}"))]
    Statistics { reason: String },
}
