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

use super::FilterConfig;
use crate::estimation::estimate::{KfEstimate, Residual};
use crate::linalg::allocator::Allocator;
use crate::linalg::{DefaultAllocator, DimName, OMatrix, OVector};
use std::fmt;

pub(crate) mod stats;

/// The result of a batch filtering run: the estimates from the initial step to the last one,
/// and the residuals of every measurement update.
#[derive(Clone, Debug)]
pub struct FilterSolution<X, Z>
where
    X: DimName,
    Z: DimName,
    DefaultAllocator: Allocator<X> + Allocator<X, X> + Allocator<Z> + Allocator<Z, Z>,
{
    pub config: FilterConfig,
    /// Step of the initial estimate
    pub k_init: usize,
    /// Estimates of steps `k_init..=k_max`, the first one being the initial estimate
    pub estimates: Vec<KfEstimate<X>>,
    /// Residuals of steps `k_init+1..=k_max`
    pub residuals: Vec<Residual<Z>>,
}

impl<X, Z> FilterSolution<X, Z>
where
    X: DimName,
    Z: DimName,
    DefaultAllocator: Allocator<X> + Allocator<X, X> + Allocator<Z> + Allocator<Z, Z>,
{
    /// Step of the last estimate
    pub fn k_max(&self) -> usize {
        self.k_init + self.estimates.len() - 1
    }

    /// Returns the estimate of step `k`, if it was computed
    pub fn estimate(&self, k: usize) -> Option<&KfEstimate<X>> {
        k.checked_sub(self.k_init)
            .and_then(|idx| self.estimates.get(idx))
    }

    /// Returns the residual of the measurement of step `k`, if it was processed
    pub fn residual(&self, k: usize) -> Option<&Residual<Z>> {
        k.checked_sub(self.k_init + 1)
            .and_then(|idx| self.residuals.get(idx))
    }

    pub fn final_estimate(&self) -> &KfEstimate<X> {
        &self.estimates[self.estimates.len() - 1]
    }

    /// Returns the state of every step of the arc, `k_max + 1` slots indexed by step, empty before the initial step
    pub fn states(&self) -> Vec<Option<OVector<f64, X>>> {
        (0..=self.k_max())
            .map(|k| self.estimate(k).map(|est| est.state.clone()))
            .collect()
    }

    /// Returns the covariance of every step of the arc, `k_max + 1` slots indexed by step, empty before the initial step
    pub fn covariances(&self) -> Vec<Option<OMatrix<f64, X, X>>> {
        (0..=self.k_max())
            .map(|k| self.estimate(k).map(|est| est.covar.clone()))
            .collect()
    }

    /// Returns the normalized innovation statistic of every measurement of the arc: `k_max` slots,
    /// where slot `k - 1` is that of the measurement of step `k`, like the measurement history.
    /// Measurements up to the initial step are not processed and their slots are empty.
    pub fn ratios(&self) -> Vec<Option<f64>> {
        (1..=self.k_max())
            .map(|k| self.residual(k).map(|resid| resid.ratio))
            .collect()
    }

    /// Same as `ratios` for the normalized innovation squared of the prefit residuals
    pub fn prefit_ratios(&self) -> Vec<Option<f64>> {
        (1..=self.k_max())
            .map(|k| self.residual(k).map(|resid| resid.prefit_ratio))
            .collect()
    }
}

impl<X, Z> fmt::Display for FilterSolution<X, Z>
where
    X: DimName,
    Z: DimName,
    DefaultAllocator: Allocator<X> + Allocator<X, X> + Allocator<Z> + Allocator<Z, Z>,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "Filter solution from step {} to {} ({} residuals) with {}",
            self.k_init,
            self.k_max(),
            self.residuals.len(),
            self.config
        )?;
        write!(f, "{}", self.final_estimate())
    }
}
