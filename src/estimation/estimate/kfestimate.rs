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

/// Kalman filter estimate at a given step.
#[derive(Debug, Clone, PartialEq)]
pub struct KfEstimate<X>
where
    X: DimName,
    DefaultAllocator: Allocator<X> + Allocator<X, X>,
{
    /// Step index of this estimate in the arc
    pub k: usize,
    pub epoch: Epoch,
    /// The estimated state
    pub state: OVector<f64, X>,
    /// The Covariance of this estimate
    pub covar: OMatrix<f64, X, X>,
    /// The predicted covariance of this estimate, i.e. before the measurement update
    pub covar_bar: OMatrix<f64, X, X>,
    /// Whether or not this is a predicted estimate from a time update, or an estimate from a measurement
    pub predicted: bool,
}

impl<X> KfEstimate<X>
where
    X: DimName,
    DefaultAllocator: Allocator<X> + Allocator<X, X>,
{
    /// Initializes a new filter estimate from the full covariance matrix.
    /// The predicted covariance is set to the provided covariance.
    pub fn from_covar(k: usize, epoch: Epoch, state: OVector<f64, X>, covar: OMatrix<f64, X, X>) -> Self {
        Self {
            k,
            epoch,
            state,
            covar_bar: covar.clone(),
            covar,
            predicted: true,
        }
    }

    /// Initializes a new filter estimate from the diagonal of the covariance matrix.
    pub fn from_diag(k: usize, epoch: Epoch, state: OVector<f64, X>, diag: OVector<f64, X>) -> Self {
        Self::from_covar(k, epoch, state, OMatrix::<f64, X, X>::from_diagonal(&diag))
    }

    /// Returns the standard deviation of each component of the state.
    pub fn sigmas(&self) -> OVector<f64, X> {
        self.covar.diagonal().map(|var| var.sqrt())
    }

    /// Returns whether the estimation error with respect to the provided truth is within `sigma` standard deviations on every component.
    pub fn within_sigma(&self, truth: &OVector<f64, X>, sigma: f64) -> bool {
        (truth - &self.state)
            .iter()
            .zip(self.sigmas().iter())
            .all(|(err, std_dev)| err.abs() <= sigma * std_dev)
    }

    /// Returns whether the estimation error with respect to the provided truth is within 3 standard deviations
    pub fn within_3sigma(&self, truth: &OVector<f64, X>) -> bool {
        self.within_sigma(truth, 3.0)
    }

    /// Normalized estimation error squared with respect to the provided truth, `e' P^-1 e`.
    /// Returns None if the covariance is not positive definite.
    pub fn nees(&self, truth: &OVector<f64, X>) -> Option<f64> {
        let err = truth - &self.state;
        let chol = self.covar.clone().cholesky()?;
        Some(err.dot(&chol.solve(&err)))
    }
}

impl<X> fmt::Display for KfEstimate<X>
where
    X: DimName,
    DefaultAllocator: Allocator<X> + Allocator<X, X>,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let word = if self.predicted {
            "Prediction"
        } else {
            "Estimate"
        };
        let fmt_sigmas = self
            .sigmas()
            .iter()
            .map(|sigma| format!("{sigma:e}"))
            .collect::<Vec<String>>();
        write!(
            f,
            "=== {} #{} @ {} ===\nstate {}\nsigmas [{}]\n",
            word,
            self.k,
            self.epoch,
            self.state,
            fmt_sigmas.join(",")
        )
    }
}
