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

use serde::de::DeserializeOwned;
use serde::Serialize;
use snafu::prelude::*;
use std::fmt::Debug;
use std::fs::File;
use std::io;
use std::io::BufReader;
use std::path::Path;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    #[snafu(display("failed to read configuration file: {source}"))]
    ReadError { source: io::Error },
    #[snafu(display("failed to parse YAML configuration: {source}"))]
    ParseError { source: serde_yaml::Error },
    #[snafu(display("integration substep count must be at least {min}, got {n_rk}"))]
    Substeps { n_rk: usize, min: usize },
    #[snafu(display("MAP iteration count must be in [{min}, {max}], got {iterations}"))]
    MapIterations {
        iterations: usize,
        min: usize,
        max: usize,
    },
    #[snafu(display("Gauss-Newton step floor must be in (0, 1), got {floor}"))]
    StepFloor { floor: f64 },
    #[snafu(display("unrecognized model coupling `{name}`"))]
    UnknownCoupling { name: String },
}

impl PartialEq for ConfigError {
    /// I/O and parsing errors never match, the validation errors match on their content
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Substeps { n_rk, min },
                Self::Substeps {
                    n_rk: n_rk_o,
                    min: min_o,
                },
            ) => n_rk == n_rk_o && min == min_o,
            (
                Self::MapIterations { iterations, .. },
                Self::MapIterations {
                    iterations: iterations_o,
                    ..
                },
            ) => iterations == iterations_o,
            (Self::StepFloor { floor }, Self::StepFloor { floor: floor_o }) => floor == floor_o,
            (Self::UnknownCoupling { name }, Self::UnknownCoupling { name: name_o }) => {
                name == name_o
            }
            _ => false,
        }
    }
}

pub trait ConfigRepr: Debug + Sized + Serialize + DeserializeOwned {
    /// Builds the configuration representation from the path to a yaml
    fn load<P>(path: P) -> Result<Self, ConfigError>
    where
        P: AsRef<Path>,
    {
        let file = File::open(path).context(ReadSnafu)?;
        let reader = BufReader::new(file);

        serde_yaml::from_reader(reader).context(ParseSnafu)
    }

    /// Builds the configuration representation from the provided string of a yaml
    fn loads(data: &str) -> Result<Self, ConfigError> {
        debug!("Loading YAML:\n{data}");
        serde_yaml::from_str(data).context(ParseSnafu)
    }

    /// Builds a sequence of "Selves" from the provided string of a yaml
    fn loads_many(data: &str) -> Result<Vec<Self>, ConfigError> {
        debug!("Loading YAML:\n{data}");
        serde_yaml::from_str(data).context(ParseSnafu)
    }
}
