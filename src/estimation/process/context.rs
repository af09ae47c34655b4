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

use super::solution::FilterSolution;
use super::FilterConfig;
use crate::estimation::estimate::{KfEstimate, Residual};
use crate::estimation::{
    ConfigFailureSnafu, FilterError, HistoryWriteSnafu, InputLengthSnafu, InvalidInitialStepSnafu,
    InvalidMatrixSnafu, NonIncreasingEpochsSnafu,
};
use crate::linalg::allocator::Allocator;
use crate::linalg::{DefaultAllocator, DimName, OMatrix, OVector};
use crate::time::{Duration, Epoch};
use crate::utils::{is_symmetric, psd_factor};
use snafu::prelude::*;

/// The inputs of a batch filtering run: the epochs, the control inputs and the measurements.
///
/// With `k_max` measurements, there are `k_max + 1` epochs (one per step, from 0 to `k_max`),
/// `k_max` control inputs (the input `u_k` drives the transition from step `k` to `k+1`),
/// and the measurement of step `k` (for `k` in `1..=k_max`) is the `k-1`-th measurement.
#[derive(Clone, Debug, PartialEq)]
pub struct InputArc<U, Z>
where
    U: DimName,
    Z: DimName,
    DefaultAllocator: Allocator<U> + Allocator<Z>,
{
    epochs: Vec<Epoch>,
    inputs: Vec<OVector<f64, U>>,
    measurements: Vec<OVector<f64, Z>>,
}

impl<U, Z> InputArc<U, Z>
where
    U: DimName,
    Z: DimName,
    DefaultAllocator: Allocator<U> + Allocator<Z>,
{
    /// Builds a new arc, checking the consistency of the lengths and that the epochs are strictly increasing.
    pub fn new(
        epochs: Vec<Epoch>,
        inputs: Vec<OVector<f64, U>>,
        measurements: Vec<OVector<f64, Z>>,
    ) -> Result<Self, FilterError> {
        let k_max = measurements.len();
        ensure!(
            epochs.len() == k_max + 1,
            InputLengthSnafu {
                what: "epochs",
                expected: k_max + 1,
                got: epochs.len()
            }
        );
        ensure!(
            inputs.len() == k_max,
            InputLengthSnafu {
                what: "control inputs",
                expected: k_max,
                got: inputs.len()
            }
        );
        if let Some(k) = epochs
            .windows(2)
            .position(|pair| pair[1] <= pair[0])
            .map(|pos| pos + 1)
        {
            return NonIncreasingEpochsSnafu { k }.fail();
        }
        ensure!(
            inputs.iter().all(|u| u.iter().all(|v| v.is_finite())),
            InvalidMatrixSnafu {
                which: "control input history",
                reason: "not all components are finite"
            }
        );
        ensure!(
            measurements.iter().all(|z| z.iter().all(|v| v.is_finite())),
            InvalidMatrixSnafu {
                which: "measurement history",
                reason: "not all components are finite"
            }
        );

        Ok(Self {
            epochs,
            inputs,
            measurements,
        })
    }

    /// Builds a new arc whose epochs are evenly spaced by `step`, starting at `start`.
    pub fn with_fixed_step(
        start: Epoch,
        step: Duration,
        inputs: Vec<OVector<f64, U>>,
        measurements: Vec<OVector<f64, Z>>,
    ) -> Result<Self, FilterError> {
        let epochs = (0..=measurements.len())
            .map(|k| start + step * (k as i64))
            .collect();
        Self::new(epochs, inputs, measurements)
    }

    /// Index of the last step
    pub fn k_max(&self) -> usize {
        self.measurements.len()
    }

    pub fn epoch(&self, k: usize) -> Epoch {
        self.epochs[k]
    }

    pub fn epochs(&self) -> &[Epoch] {
        &self.epochs
    }

    /// Control input driving the transition from step `k` to step `k+1`
    pub fn input(&self, k: usize) -> &OVector<f64, U> {
        &self.inputs[k]
    }

    /// Measurement taken at step `k`, which must be in `1..=k_max`
    pub fn measurement(&self, k: usize) -> &OVector<f64, Z> {
        &self.measurements[k - 1]
    }
}

/// The history of a filtering run, written once per step from the initial step onward.
#[derive(Clone, Debug)]
pub struct FilterHistory<X, Z>
where
    X: DimName,
    Z: DimName,
    DefaultAllocator: Allocator<X> + Allocator<X, X> + Allocator<Z> + Allocator<Z, Z>,
{
    k_init: usize,
    k_max: usize,
    estimates: Vec<KfEstimate<X>>,
    residuals: Vec<Residual<Z>>,
}

impl<X, Z> FilterHistory<X, Z>
where
    X: DimName,
    Z: DimName,
    DefaultAllocator: Allocator<X> + Allocator<X, X> + Allocator<Z> + Allocator<Z, Z>,
{
    fn new(initial: KfEstimate<X>, k_max: usize) -> Self {
        let k_init = initial.k;
        let mut estimates = Vec::with_capacity(k_max - k_init + 1);
        estimates.push(initial);
        Self {
            k_init,
            k_max,
            estimates,
            residuals: Vec::with_capacity(k_max - k_init),
        }
    }

    /// Step index of the latest estimate
    pub fn k(&self) -> usize {
        self.k_init + self.estimates.len() - 1
    }

    /// Latest estimate, which is the initial estimate until the first step is recorded
    pub fn latest(&self) -> &KfEstimate<X> {
        &self.estimates[self.estimates.len() - 1]
    }

    pub fn is_complete(&self) -> bool {
        self.k() == self.k_max
    }

    /// Records the estimate and residual of the next step. Slots are written exactly once, in order.
    pub fn record(
        &mut self,
        estimate: KfEstimate<X>,
        residual: Residual<Z>,
    ) -> Result<(), FilterError> {
        let expected = self.k() + 1;
        ensure!(
            expected <= self.k_max,
            HistoryWriteSnafu {
                k: estimate.k,
                expected
            }
        );
        ensure!(
            estimate.k == expected,
            HistoryWriteSnafu {
                k: estimate.k,
                expected
            }
        );
        ensure!(
            residual.k == expected,
            HistoryWriteSnafu {
                k: residual.k,
                expected
            }
        );
        self.estimates.push(estimate);
        self.residuals.push(residual);
        Ok(())
    }
}

/// Everything a filter needs to process an arc: its configuration, the noise covariances, the arc and the history so far.
///
/// X is the size of the state, U the size of the control input, V the size of the process noise, and Z the size of the measurement.
#[derive(Clone, Debug)]
pub struct FilterContext<X, U, V, Z>
where
    X: DimName,
    U: DimName,
    V: DimName,
    Z: DimName,
    DefaultAllocator: Allocator<X>
        + Allocator<X, X>
        + Allocator<U>
        + Allocator<V, V>
        + Allocator<Z>
        + Allocator<Z, Z>,
{
    pub config: FilterConfig,
    /// Process noise covariance (Q)
    pub process_noise: OMatrix<f64, V, V>,
    /// Measurement noise covariance (R)
    pub measurement_noise: OMatrix<f64, Z, Z>,
    pub arc: InputArc<U, Z>,
    pub(crate) history: FilterHistory<X, Z>,
}

impl<X, U, V, Z> FilterContext<X, U, V, Z>
where
    X: DimName,
    U: DimName,
    V: DimName,
    Z: DimName,
    DefaultAllocator: Allocator<X>
        + Allocator<X, X>
        + Allocator<U>
        + Allocator<V, V>
        + Allocator<Z>
        + Allocator<Z, Z>,
{
    /// Initializes a new context, where the initial estimate is that of step `k_init` of the arc.
    pub fn new(
        config: FilterConfig,
        arc: InputArc<U, Z>,
        k_init: usize,
        initial_state: OVector<f64, X>,
        initial_covar: OMatrix<f64, X, X>,
        process_noise: OMatrix<f64, V, V>,
        measurement_noise: OMatrix<f64, Z, Z>,
    ) -> Result<Self, FilterError> {
        config.validate().context(ConfigFailureSnafu)?;

        ensure!(
            k_init <= arc.k_max(),
            InvalidInitialStepSnafu {
                k_init,
                k_max: arc.k_max()
            }
        );

        ensure!(
            initial_state.iter().all(|v| v.is_finite()),
            InvalidMatrixSnafu {
                which: "initial state",
                reason: "not all components are finite"
            }
        );
        check_covariance(&initial_covar, "initial covariance")?;
        check_covariance(&process_noise, "process noise covariance")?;
        check_covariance(&measurement_noise, "measurement noise covariance")?;

        let initial = KfEstimate::from_covar(k_init, arc.epoch(k_init), initial_state, initial_covar);

        Ok(Self {
            config,
            process_noise,
            measurement_noise,
            history: FilterHistory::new(initial, arc.k_max()),
            arc,
        })
    }

    pub fn k_init(&self) -> usize {
        self.history.k_init
    }

    pub fn k_max(&self) -> usize {
        self.arc.k_max()
    }

    pub fn history(&self) -> &FilterHistory<X, Z> {
        &self.history
    }

    /// Consumes this context to build the solution from its history.
    pub fn into_solution(self) -> FilterSolution<X, Z> {
        FilterSolution {
            config: self.config,
            k_init: self.history.k_init,
            estimates: self.history.estimates,
            residuals: self.history.residuals,
        }
    }
}

/// A covariance must be finite, symmetric and positive semi definite.
fn check_covariance<D>(mat: &OMatrix<f64, D, D>, which: &'static str) -> Result<(), FilterError>
where
    D: DimName,
    DefaultAllocator: Allocator<D, D>,
{
    ensure!(
        mat.iter().all(|v| v.is_finite()),
        InvalidMatrixSnafu {
            which,
            reason: "not all components are finite"
        }
    );
    ensure!(
        is_symmetric(mat, 1e-12),
        InvalidMatrixSnafu {
            which,
            reason: "not symmetric"
        }
    );
    ensure!(
        psd_factor(mat).is_some(),
        InvalidMatrixSnafu {
            which,
            reason: "not positive semi definite"
        }
    );
    Ok(())
}
