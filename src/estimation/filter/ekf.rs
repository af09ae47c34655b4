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

use super::{normalized_squared, observe, predict, symmetrize, Filter};
use crate::dynamics::{DynamicsModel, MeasurementModel};
use crate::estimation::estimate::{KfEstimate, Residual};
use crate::estimation::process::FilterContext;
use crate::estimation::{FilterError, SingularInnovationSnafu};
use crate::linalg::allocator::Allocator;
use crate::linalg::{DefaultAllocator, DimName};
use snafu::prelude::*;

/// The Extended Kalman Filter: the dynamics and the measurement are linearized about the current estimate.
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Debug)]
pub struct EKF<D, M> {
    pub dynamics: D,
    pub measurement: M,
}

impl<D, M> EKF<D, M> {
    pub fn new(dynamics: D, measurement: M) -> Self {
        Self {
            dynamics,
            measurement,
        }
    }
}

impl<D, M, X, U, V, Z> Filter<X, U, V, Z> for EKF<D, M>
where
    D: DynamicsModel<X, U, V>,
    M: MeasurementModel<X, Z>,
    X: DimName,
    U: DimName,
    V: DimName,
    Z: DimName,
    DefaultAllocator: Allocator<X>
        + Allocator<U>
        + Allocator<V>
        + Allocator<Z>
        + Allocator<X, X>
        + Allocator<X, V>
        + Allocator<V, X>
        + Allocator<V, V>
        + Allocator<Z, X>
        + Allocator<X, Z>
        + Allocator<Z, Z>,
{
    fn name(&self) -> &'static str {
        "EKF"
    }

    fn time_update(
        &self,
        ctx: &FilterContext<X, U, V, Z>,
        previous: &KfEstimate<X>,
    ) -> Result<KfEstimate<X>, FilterError> {
        predict(&self.dynamics, ctx, previous)
    }

    fn measurement_update(
        &self,
        ctx: &FilterContext<X, U, V, Z>,
        prediction: KfEstimate<X>,
    ) -> Result<(KfEstimate<X>, Residual<Z>), FilterError> {
        extended_update(&self.measurement, ctx, prediction)
    }
}

/// The EKF measurement update, linearized about the predicted state.
pub(crate) fn extended_update<M, X, U, V, Z>(
    measurement: &M,
    ctx: &FilterContext<X, U, V, Z>,
    prediction: KfEstimate<X>,
) -> Result<(KfEstimate<X>, Residual<Z>), FilterError>
where
    M: MeasurementModel<X, Z>,
    X: DimName,
    U: DimName,
    V: DimName,
    Z: DimName,
    DefaultAllocator: Allocator<X>
        + Allocator<U>
        + Allocator<V>
        + Allocator<Z>
        + Allocator<X, X>
        + Allocator<V, V>
        + Allocator<Z, X>
        + Allocator<X, Z>
        + Allocator<Z, Z>,
{
    let k = prediction.k;
    let real_obs = ctx.arc.measurement(k);
    let (computed_obs, h_tilde) = observe(measurement, &prediction.state, k)?;

    let h_tilde_t = h_tilde.transpose();
    let s_k = &h_tilde * &prediction.covar_bar * &h_tilde_t + &ctx.measurement_noise;
    let s_chol = s_k.clone().cholesky().context(SingularInnovationSnafu { k })?;

    // Compute the Kalman gain
    let gain = &prediction.covar_bar * &h_tilde_t * s_chol.inverse();

    let prefit = real_obs - &computed_obs;
    let ratio = normalized_squared(&s_chol, &prefit, k)?;

    let state_hat = &gain * &prefit;
    let postfit = &prefit - &h_tilde * &state_hat;

    let covar = symmetrize(&prediction.covar_bar - &gain * &s_k * gain.transpose());

    trace!(
        "step {k}: prefit {:?} with ratio {ratio:.3}",
        prefit.as_slice()
    );

    let estimate = KfEstimate {
        k,
        epoch: prediction.epoch,
        state: prediction.state + state_hat,
        covar,
        covar_bar: prediction.covar_bar,
        predicted: false,
    };

    let residual = Residual {
        k,
        epoch: prediction.epoch,
        prefit,
        postfit,
        ratio,
        prefit_ratio: ratio,
        innovation_covar: s_k,
        real_obs: real_obs.clone(),
        computed_obs,
        map: None,
    };

    Ok((estimate, residual))
}
