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

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::estimation::FilterError;
use crate::utils::psd_factor;
use crate::linalg::allocator::Allocator;
use crate::linalg::{DefaultAllocator, DimName, OMatrix, OVector};

/// A multivariate normal distribution, used to disperse the initial state and to sample the noises.
#[derive(Clone, Debug)]
pub struct MultivariateNormal<D>
where
    D: DimName,
    DefaultAllocator: Allocator<D> + Allocator<D, D>,
{
    /// The mean of the multivariate normal distribution
    pub mean: OVector<f64, D>,
    /// Lower triangular square root of the covariance, such that `sqrt_cov * sqrt_cov' = cov`
    pub sqrt_cov: OMatrix<f64, D, D>,
    /// The standard normal distribution used to seed the multivariate normal distribution
    pub std_norm_distr: Normal<f64>,
}

impl<D> MultivariateNormal<D>
where
    D: DimName,
    DefaultAllocator: Allocator<D> + Allocator<D, D>,
{
    /// Creates a new distribution from a mean and a covariance.
    /// The covariance must be positive semi definite: null variances are allowed, e.g. noise on a subset of the states.
    pub fn new(mean: OVector<f64, D>, cov: OMatrix<f64, D, D>) -> Result<Self, FilterError> {
        let sqrt_cov = psd_factor(&cov).ok_or(FilterError::InvalidMatrix {
            which: "dispersion covariance",
            reason: "not positive semi definite",
        })?;

        Ok(Self {
            mean,
            sqrt_cov,
            std_norm_distr: Normal::new(0.0, 1.0).map_err(|e| FilterError::Statistics {
                reason: e.to_string(),
            })?,
        })
    }

    /// Same as `new` but with a zero mean
    pub fn zero_mean(cov: OMatrix<f64, D, D>) -> Result<Self, FilterError> {
        Self::new(OVector::<f64, D>::zeros(), cov)
    }
}

impl<D> Distribution<OVector<f64, D>> for MultivariateNormal<D>
where
    D: DimName,
    DefaultAllocator: Allocator<D> + Allocator<D, D>,
{
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> OVector<f64, D> {
        let std_norm = OVector::<f64, D>::from_fn(|_, _| self.std_norm_distr.sample(&mut *rng));
        &self.mean + &self.sqrt_cov * std_norm
    }
}
