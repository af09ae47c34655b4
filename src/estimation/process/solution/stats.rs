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

use super::FilterSolution;
use crate::estimation::FilterError;
use crate::linalg::allocator::Allocator;
use crate::linalg::{DefaultAllocator, DimName};
use statrs::distribution::{ChiSquared, ContinuousCDF};

impl<X, Z> FilterSolution<X, Z>
where
    X: DimName,
    Z: DimName,
    DefaultAllocator: Allocator<X> + Allocator<X, X> + Allocator<Z> + Allocator<Z, Z>,
{
    /// Returns the root mean square of the prefit residuals
    pub fn rms_prefit_residuals(&self) -> Result<f64, FilterError> {
        self.ensure_residuals("compute the RMS of the prefit residuals")?;
        let sum: f64 = self
            .residuals
            .iter()
            .map(|resid| resid.prefit.dot(&resid.prefit))
            .sum();
        Ok((sum / (self.residuals.len() as f64)).sqrt())
    }

    /// Returns the root mean square of the postfit residuals
    pub fn rms_postfit_residuals(&self) -> Result<f64, FilterError> {
        self.ensure_residuals("compute the RMS of the postfit residuals")?;
        let sum: f64 = self
            .residuals
            .iter()
            .map(|resid| resid.postfit.dot(&resid.postfit))
            .sum();
        Ok((sum / (self.residuals.len() as f64)).sqrt())
    }

    /// Returns the average normalized innovation statistic of the updates.
    pub fn average_ratio(&self) -> Result<f64, FilterError> {
        self.ensure_residuals("average the residual ratios")?;
        let sum: f64 = self.residuals.iter().map(|resid| resid.ratio).sum();
        Ok(sum / (self.residuals.len() as f64))
    }

    /// Returns the average normalized innovation squared of the prefit residuals, which is close to the measurement size for a consistent filter.
    pub fn average_prefit_ratio(&self) -> Result<f64, FilterError> {
        self.ensure_residuals("average the prefit residual ratios")?;
        let sum: f64 = self.residuals.iter().map(|resid| resid.prefit_ratio).sum();
        Ok(sum / (self.residuals.len() as f64))
    }

    /// Computes the fraction of residual ratios that are below the threshold.
    pub fn residual_ratio_within_threshold(&self, threshold: f64) -> Result<f64, FilterError> {
        self.ensure_residuals("compute the percentage of residuals within threshold")?;
        let count_within = self
            .residuals
            .iter()
            .filter(|resid| resid.ratio <= threshold)
            .count();
        Ok(count_within as f64 / self.residuals.len() as f64)
    }

    /// Returns the two sided acceptance interval of the average prefit ratio at the provided significance level, e.g. 0.05.
    ///
    /// For N residuals of size m, the sum of the prefit ratios of a consistent filter follows a Chi Square distribution
    /// with N*m degrees of freedom, so the bounds are the alpha/2 and 1 - alpha/2 quantiles of that distribution divided by N.
    /// The ratios of the iterated EKF are evaluated at the posterior and are not tested.
    pub fn prefit_ratio_bounds(&self, alpha: f64) -> Result<(f64, f64), FilterError> {
        self.ensure_residuals("compute the bounds of the average prefit residual ratio")?;
        let num = self.residuals.len() as f64;
        let dof = num * (Z::dim() as f64);
        chi_square_bounds(dof, alpha).map(|(lower, upper)| (lower / num, upper / num))
    }

    /// Returns whether the average prefit ratio is within its acceptance interval at the provided significance level.
    pub fn is_consistent(&self, alpha: f64) -> Result<bool, FilterError> {
        let (lower, upper) = self.prefit_ratio_bounds(alpha)?;
        let avg = self.average_prefit_ratio()?;
        info!("average prefit ratio {avg:.3} with acceptance interval [{lower:.3}, {upper:.3}]");
        Ok(lower <= avg && avg <= upper)
    }

    /// Number of MAP searches which stopped on the step floor over the whole arc, zero for the EKF.
    pub fn map_floor_exits(&self) -> usize {
        self.residuals
            .iter()
            .filter_map(|resid| resid.map.as_ref())
            .map(|map| map.floor_exits())
            .sum()
    }

    fn ensure_residuals(&self, action: &'static str) -> Result<(), FilterError> {
        if self.residuals.is_empty() {
            Err(FilterError::NoResiduals { action })
        } else {
            Ok(())
        }
    }
}

/// Returns the alpha/2 and 1 - alpha/2 quantiles of a Chi Square distribution.
pub(crate) fn chi_square_bounds(dof: f64, alpha: f64) -> Result<(f64, f64), FilterError> {
    if !(alpha > 0.0 && alpha < 1.0) {
        return Err(FilterError::Statistics {
            reason: format!("significance level must be in (0, 1), got {alpha}"),
        });
    }
    let chi2 = ChiSquared::new(dof).map_err(|e| FilterError::Statistics {
        reason: e.to_string(),
    })?;
    Ok((
        chi2.inverse_cdf(alpha / 2.0),
        chi2.inverse_cdf(1.0 - alpha / 2.0),
    ))
}
