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

use crate::io::{
    ConfigError, ConfigRepr, MapIterationsSnafu, StepFloorSnafu, SubstepsSnafu,
    UnknownCouplingSnafu,
};
use serde_derive::{Deserialize, Serialize};
use snafu::prelude::*;
use std::convert::TryFrom;
use std::default::Default;
use std::fmt;
use std::str::FromStr;
use typed_builder::TypedBuilder;

/// Minimum number of Runge Kutta substeps between two filter steps
pub const MIN_SUBSTEPS: usize = 5;
/// Maximum number of MAP iterations, including the EKF seed
pub const MAX_MAP_ITERATIONS: usize = 1000;

/// Defines how the dynamics model is coupled to the filter.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CouplingMode {
    /// Continuous time dynamics, discretized between filter steps with a fixed step RK4
    #[default]
    ContinuousDiscrete,
    /// Discrete time dynamics, evaluated once per filter step
    FullyDiscrete,
}

impl fmt::Display for CouplingMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ContinuousDiscrete => write!(f, "continuous-discrete"),
            Self::FullyDiscrete => write!(f, "fully discrete"),
        }
    }
}

impl FromStr for CouplingMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s
            .trim()
            .to_lowercase()
            .replace([' ', '_'], "-")
            .as_str()
        {
            "continuous-discrete" | "continuous" | "cd" => Ok(Self::ContinuousDiscrete),
            "fully-discrete" | "discrete" | "dd" => Ok(Self::FullyDiscrete),
            _ => UnknownCouplingSnafu { name: s }.fail(),
        }
    }
}

impl TryFrom<String> for CouplingMode {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CouplingMode> for String {
    fn from(mode: CouplingMode) -> Self {
        mode.to_string()
    }
}

/// Configuration of the filters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, TypedBuilder)]
#[builder(doc)]
#[serde(default)]
pub struct FilterConfig {
    /// Number of RK4 substeps between two filter steps, only used with continuous dynamics
    #[builder(default = 10)]
    pub n_rk: usize,
    /// Maximum number of MAP iterations of the iterated EKF, where 1 means a plain EKF update
    #[builder(default = 5)]
    pub map_iterations: usize,
    /// The damped Gauss-Newton search stops halving the step length once it falls below this floor
    #[builder(default = 0.01)]
    pub step_floor: f64,
    #[builder(default)]
    pub coupling: CouplingMode,
}

impl FilterConfig {
    /// Checks that all of the parameters are within their valid ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(
            self.n_rk >= MIN_SUBSTEPS,
            SubstepsSnafu {
                n_rk: self.n_rk,
                min: MIN_SUBSTEPS
            }
        );
        ensure!(
            (1..=MAX_MAP_ITERATIONS).contains(&self.map_iterations),
            MapIterationsSnafu {
                iterations: self.map_iterations,
                min: 1_usize,
                max: MAX_MAP_ITERATIONS
            }
        );
        // Written so that NaN is rejected
        ensure!(
            self.step_floor > 0.0 && self.step_floor < 1.0,
            StepFloorSnafu {
                floor: self.step_floor
            }
        );
        Ok(())
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            n_rk: 10,
            map_iterations: 5,
            step_floor: 0.01,
            coupling: CouplingMode::default(),
        }
    }
}

impl fmt::Display for FilterConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} coupling with {} RK4 substeps, up to {} MAP iterations with a step floor of {}",
            self.coupling, self.n_rk, self.map_iterations, self.step_floor
        )
    }
}

impl ConfigRepr for FilterConfig {}
