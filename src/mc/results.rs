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

use crate::estimation::process::solution::stats::chi_square_bounds;
use crate::estimation::FilterError;
use std::fmt;

/// The summary of a single Monte Carlo run
#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    /// The index of this run
    pub index: usize,
    /// Seed of the noise realizations of this run
    pub seed: u64,
    /// Normalized innovation statistic of every measurement update
    pub ratios: Vec<f64>,
    /// Normalized innovation squared of the prefit residual of every measurement update
    pub prefit_ratios: Vec<f64>,
    /// Normalized estimation error squared of every updated estimate
    pub nees: Vec<f64>,
    /// Number of MAP searches which stopped on the step floor
    pub floor_exits: usize,
}

/// A structure of Monte Carlo results
#[derive(Clone, Debug)]
pub struct Results {
    /// Raw data from each run, sorted by run index
    pub runs: Vec<RunSummary>,
    /// Name of this scenario
    pub scenario: String,
    /// Number of degrees of freedom of each prefit ratio
    pub msr_size: usize,
    /// Number of degrees of freedom of each NEES
    pub state_size: usize,
}

impl Results {
    /// Average of the normalized innovation statistic over all of the runs and all of the steps
    pub fn average_ratio(&self) -> Result<f64, FilterError> {
        average(self.runs.iter().flat_map(|run| run.ratios.iter()), "average the residual ratios")
    }

    /// Average of the prefit normalized innovation squared over all of the runs and all of the steps
    pub fn average_prefit_ratio(&self) -> Result<f64, FilterError> {
        average(
            self.runs.iter().flat_map(|run| run.prefit_ratios.iter()),
            "average the prefit residual ratios",
        )
    }

    /// Average of the normalized estimation error squared over all of the runs and all of the steps
    pub fn average_nees(&self) -> Result<f64, FilterError> {
        average(self.runs.iter().flat_map(|run| run.nees.iter()), "average the NEES")
    }

    /// Average of the normalized innovation statistic of each step, across the runs
    pub fn average_ratio_per_step(&self) -> Vec<f64> {
        let num_steps = self.runs.iter().map(|run| run.ratios.len()).min().unwrap_or(0);
        (0..num_steps)
            .map(|step| {
                self.runs.iter().map(|run| run.ratios[step]).sum::<f64>() / (self.runs.len() as f64)
            })
            .collect()
    }

    /// Two sided acceptance interval of the average prefit ratio at the significance level `alpha`
    pub fn prefit_ratio_bounds(&self, alpha: f64) -> Result<(f64, f64), FilterError> {
        let num = self.runs.iter().map(|run| run.prefit_ratios.len()).sum::<usize>();
        average_bounds(num, self.msr_size, alpha)
    }

    /// Two sided acceptance interval of the average NEES at the significance level `alpha`
    pub fn nees_bounds(&self, alpha: f64) -> Result<(f64, f64), FilterError> {
        let num = self.runs.iter().map(|run| run.nees.len()).sum::<usize>();
        average_bounds(num, self.state_size, alpha)
    }

    /// Total number of MAP searches which stopped on the step floor
    pub fn floor_exits(&self) -> usize {
        self.runs.iter().map(|run| run.floor_exits).sum()
    }
}

impl fmt::Display for Results {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} runs", self.scenario, self.runs.len())?;
        if let (Ok(ratio), Ok(nis), Ok(nees)) = (
            self.average_ratio(),
            self.average_prefit_ratio(),
            self.average_nees(),
        ) {
            write!(
                f,
                ", average ratio {ratio:.3}, average prefit ratio {nis:.3}, average NEES {nees:.3}"
            )?;
        }
        Ok(())
    }
}

fn average<'a, I>(values: I, action: &'static str) -> Result<f64, FilterError>
where
    I: Iterator<Item = &'a f64>,
{
    let (sum, count) = values.fold((0.0, 0_usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        Err(FilterError::NoResiduals { action })
    } else {
        Ok(sum / (count as f64))
    }
}

fn average_bounds(num: usize, dof: usize, alpha: f64) -> Result<(f64, f64), FilterError> {
    if num == 0 {
        return Err(FilterError::NoResiduals {
            action: "compute the acceptance interval",
        });
    }
    let (lower, upper) = chi_square_bounds((num * dof) as f64, alpha)?;
    Ok((lower / num as f64, upper / num as f64))
}
