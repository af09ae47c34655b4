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

use super::estimate::{KfEstimate, Residual};
use super::process::{CouplingMode, FilterContext};
use super::{
    FilterDynamicsSnafu, FilterError, FilterPropagationSnafu, SingularInnovationSnafu,
};
use crate::dynamics::{ensure_finite, DynamicsModel, MeasurementModel};
use crate::linalg::allocator::Allocator;
use crate::linalg::{DefaultAllocator, DimName, OMatrix, OVector};
use crate::propagators::Discretizer;
use nalgebra::linalg::Cholesky;
use snafu::prelude::*;

mod ekf;
pub use ekf::EKF;

mod iekf;
pub use iekf::IEKF;

/// Defines a Filter trait where X is the size of the estimated state, U the size of the control input,
/// V the size of the process noise, and Z the size of the measurements.
///
/// Filters are stateless: the estimate of the previous step is provided by the caller, and the
/// filter context holds the configuration, the noise covariances and the input arc.
pub trait Filter<X, U, V, Z>
where
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
    /// Name of this filter, used in the logs
    fn name(&self) -> &'static str;

    /// Computes the time update from the estimate at step `k` to the prediction at step `k+1`.
    fn time_update(
        &self,
        ctx: &FilterContext<X, U, V, Z>,
        previous: &KfEstimate<X>,
    ) -> Result<KfEstimate<X>, FilterError>;

    /// Computes the measurement update of the prediction with the measurement of the same step.
    fn measurement_update(
        &self,
        ctx: &FilterContext<X, U, V, Z>,
        prediction: KfEstimate<X>,
    ) -> Result<(KfEstimate<X>, Residual<Z>), FilterError>;

    /// Advances the filter by one step: from the estimate at step `k` to the estimate and residual at step `k+1`.
    fn advance(
        &self,
        ctx: &FilterContext<X, U, V, Z>,
        previous: &KfEstimate<X>,
    ) -> Result<(KfEstimate<X>, Residual<Z>), FilterError> {
        let prediction = self.time_update(ctx, previous)?;
        self.measurement_update(ctx, prediction)
    }
}

impl<F, X, U, V, Z> Filter<X, U, V, Z> for &F
where
    F: Filter<X, U, V, Z> + ?Sized,
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
        (**self).name()
    }

    fn time_update(
        &self,
        ctx: &FilterContext<X, U, V, Z>,
        previous: &KfEstimate<X>,
    ) -> Result<KfEstimate<X>, FilterError> {
        (**self).time_update(ctx, previous)
    }

    fn measurement_update(
        &self,
        ctx: &FilterContext<X, U, V, Z>,
        prediction: KfEstimate<X>,
    ) -> Result<(KfEstimate<X>, Residual<Z>), FilterError> {
        (**self).measurement_update(ctx, prediction)
    }
}

/// Propagates the estimate and its covariance: `P_bar = F P F' + Γ Q Γ'`, with a zero noise realization.
pub(crate) fn predict<D, X, U, V, Z>(
    dynamics: &D,
    ctx: &FilterContext<X, U, V, Z>,
    previous: &KfEstimate<X>,
) -> Result<KfEstimate<X>, FilterError>
where
    D: DynamicsModel<X, U, V>,
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
        + Allocator<Z, Z>,
{
    let k = previous.k;
    let input = ctx.arc.input(k);
    let noise = OVector::<f64, V>::zeros();

    let prop = match ctx.config.coupling {
        CouplingMode::FullyDiscrete => dynamics
            .propagate(&previous.state, input, &noise, k)
            .context(FilterDynamicsSnafu { k })?,
        CouplingMode::ContinuousDiscrete => Discretizer::rk4(ctx.config.n_rk)
            .discretize(
                dynamics,
                &previous.state,
                input,
                &noise,
                ctx.arc.epoch(k),
                ctx.arc.epoch(k + 1),
            )
            .context(FilterPropagationSnafu { k })?,
    };

    ensure_finite(&prop.state, "propagated state", k).context(FilterDynamicsSnafu { k })?;
    ensure_finite(&prop.stm, "state transition matrix", k).context(FilterDynamicsSnafu { k })?;
    ensure_finite(&prop.gamma, "noise input matrix", k).context(FilterDynamicsSnafu { k })?;

    let covar_bar = symmetrize(
        &prop.stm * &previous.covar * prop.stm.transpose()
            + &prop.gamma * &ctx.process_noise * prop.gamma.transpose(),
    );

    Ok(KfEstimate {
        k: k + 1,
        epoch: ctx.arc.epoch(k + 1),
        state: prop.state,
        covar: covar_bar.clone(),
        covar_bar,
        predicted: true,
    })
}

/// Evaluates the measurement model and checks that its outputs are finite.
pub(crate) fn observe<M, X, Z>(
    model: &M,
    state: &OVector<f64, X>,
    k: usize,
) -> Result<(OVector<f64, Z>, OMatrix<f64, Z, X>), FilterError>
where
    M: MeasurementModel<X, Z>,
    X: DimName,
    Z: DimName,
    DefaultAllocator: Allocator<X> + Allocator<Z> + Allocator<Z, X>,
{
    let (computed_obs, h_tilde) = model.measure(state, k).context(FilterDynamicsSnafu { k })?;
    ensure_finite(&computed_obs, "computed observation", k).context(FilterDynamicsSnafu { k })?;
    ensure_finite(&h_tilde, "sensitivity matrix", k).context(FilterDynamicsSnafu { k })?;
    Ok((computed_obs, h_tilde))
}

/// Returns `r' S^-1 r` from the Cholesky factorization of S, which is non-negative by construction.
pub(crate) fn normalized_squared<Z>(
    s_chol: &Cholesky<f64, Z>,
    resid: &OVector<f64, Z>,
    k: usize,
) -> Result<f64, FilterError>
where
    Z: DimName,
    DefaultAllocator: Allocator<Z> + Allocator<Z, Z>,
{
    let whitened = s_chol
        .l()
        .solve_lower_triangular(resid)
        .context(SingularInnovationSnafu { k })?;
    Ok(whitened.norm_squared())
}

pub(crate) fn symmetrize<D>(mat: OMatrix<f64, D, D>) -> OMatrix<f64, D, D>
where
    D: DimName,
    DefaultAllocator: Allocator<D, D>,
{
    (&mat + mat.transpose()) * 0.5
}
