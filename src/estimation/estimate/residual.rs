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

use crate::linalg::allocator::Allocator;
use crate::linalg::{DefaultAllocator, DimName, OMatrix, OVector};
use crate::time::Epoch;
use std::fmt;

/// Stores the residual of the measurement update at a given step.
#[derive(Debug, Clone, PartialEq)]
pub struct Residual<Z>
where
    Z: DimName,
    DefaultAllocator: Allocator<Z> + Allocator<Z, Z>,
{
    /// Step index of the measurement
    pub k: usize,
    pub epoch: Epoch,
    /// The prefit residual, i.e. the innovation `z - h(x_bar)`
    pub prefit: OVector<f64, Z>,
    /// The postfit residual, at the updated state
    pub postfit: OVector<f64, Z>,
    /// The normalized innovation statistic of the update, `r' S^-1 r`, always positive.
    /// For the EKF, `r` is the prefit residual and `S = H P_bar H' + R`, so this is the prefit ratio.
    /// For the iterated EKF, `r = z - h(x)` and `S = H P H' + R` at the accepted state and covariance,
    /// which is smaller than the prefit ratio and does not follow a Chi Square distribution.
    pub ratio: f64,
    /// The normalized innovation squared of the prefit residual, `r' S^-1 r` with `S = H P_bar H' + R`.
    /// For a consistent filter, it follows a Chi Square distribution with as many degrees of freedom as measurement components.
    pub prefit_ratio: f64,
    /// The innovation covariance used to compute the ratio
    pub innovation_covar: OMatrix<f64, Z, Z>,
    /// The real observation
    pub real_obs: OVector<f64, Z>,
    /// The computed observation at the predicted state
    pub computed_obs: OVector<f64, Z>,
    /// Summary of the MAP refinement, only set by the iterated EKF
    pub map: Option<MapSummary>,
}

impl<Z> Residual<Z>
where
    Z: DimName,
    DefaultAllocator: Allocator<Z> + Allocator<Z, Z>,
{
    /// Returns the number of degrees of freedom of the prefit ratio
    pub fn dof(&self) -> usize {
        Z::dim()
    }
}

impl<Z> fmt::Display for Residual<Z>
where
    Z: DimName,
    DefaultAllocator: Allocator<Z> + Allocator<Z, Z>,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Residual #{} @ {}: prefit = {:?} postfit = {:?} ratio = {:.3} (prefit ratio = {:.3})",
            self.k,
            self.epoch,
            self.prefit.as_slice(),
            self.postfit.as_slice(),
            self.ratio,
            self.prefit_ratio
        )?;
        if let Some(map) = &self.map {
            write!(f, " ({map})")?;
        }
        Ok(())
    }
}

/// One accepted step of the damped Gauss-Newton search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapStep {
    /// Step length of the accepted trial, 1.0 if no damping was needed
    pub alpha: f64,
    /// MAP cost of the previously accepted state
    pub prev_cost: f64,
    /// MAP cost of the accepted trial
    pub cost: f64,
    /// Number of trials evaluated in this search
    pub trials: usize,
    /// Set if the search stopped on the step length floor, in which case the trial was accepted without reducing the cost
    pub floor_exit: bool,
}

/// Summary of the MAP refinement of a measurement update.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MapSummary {
    /// MAP cost of the EKF solution which seeded the refinement
    pub seed_cost: f64,
    /// Accepted steps, in order
    pub steps: Vec<MapStep>,
    /// Set if the refinement stopped early because the state stopped changing
    pub converged: bool,
}

impl MapSummary {
    /// Number of outer iterations performed
    pub fn iterations(&self) -> usize {
        self.steps.len()
    }

    /// Number of searches which stopped on the step length floor
    pub fn floor_exits(&self) -> usize {
        self.steps.iter().filter(|step| step.floor_exit).count()
    }

    /// MAP cost of the accepted state
    pub fn cost(&self) -> f64 {
        self.steps
            .last()
            .map(|step| step.cost)
            .unwrap_or(self.seed_cost)
    }
}

impl fmt::Display for MapSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} MAP iterations, cost {:.6e} -> {:.6e}, converged: {}, floor exits: {}",
            self.iterations(),
            self.seed_cost,
            self.cost(),
            self.converged,
            self.floor_exits()
        )
    }
}
