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

use super::ekf::extended_update;
use super::{normalized_squared, observe, predict, symmetrize, Filter};
use crate::dynamics::{DynamicsModel, MeasurementModel};
use crate::estimation::estimate::{KfEstimate, MapStep, MapSummary, Residual};
use crate::estimation::process::FilterContext;
use crate::estimation::{
    FilterError, SingularInformationSnafu, SingularInnovationSnafu,
    SingularMeasurementNoiseSnafu, SingularPredictedCovarSnafu,
};
use crate::linalg::allocator::Allocator;
use crate::linalg::{DefaultAllocator, DimName, OMatrix, OVector};
use snafu::prelude::*;

/// The refinement stops once the state changes by less than this fraction of its norm.
pub const MAP_RELATIVE_TOL: f64 = 1e-12;

/// The iterated Extended Kalman Filter.
///
/// The time update is that of the EKF. The measurement update starts from the EKF update and
/// refines it by solving the maximum a posteriori problem
///
/// `min_x (x - x_bar)' P_bar^-1 (x - x_bar) + (z - h(x))' R^-1 (z - h(x))`
///
/// with a Gauss-Newton method, where each step is halved until the cost decreases or the step
/// length falls below the configured floor. The posterior covariance is the information form
/// `(P_bar^-1 + H' R^-1 H)^-1`, evaluated at the accepted state.
///
/// With a single MAP iteration, this filter is exactly the EKF.
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Debug)]
pub struct IEKF<D, M> {
    pub dynamics: D,
    pub measurement: M,
}

impl<D, M> IEKF<D, M> {
    pub fn new(dynamics: D, measurement: M) -> Self {
        Self {
            dynamics,
            measurement,
        }
    }
}

impl<D, M, X, U, V, Z> Filter<X, U, V, Z> for IEKF<D, M>
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
        "iEKF"
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
        let k = prediction.k;
        let (seed_est, seed_resid) = extended_update(&self.measurement, ctx, prediction.clone())?;
        if ctx.config.map_iterations <= 1 {
            return Ok((seed_est, seed_resid));
        }

        let real_obs = ctx.arc.measurement(k);
        let problem = MapProblem::new(&prediction, real_obs, &ctx.measurement_noise)?;

        let (seed_obs, seed_h) = observe(&self.measurement, &seed_est.state, k)?;
        let mut current = Candidate {
            cost: problem.cost(&seed_est.state, &seed_obs),
            state: seed_est.state,
            computed_obs: seed_obs,
            sensitivity: seed_h,
            covar: seed_est.covar,
            innovation_covar: seed_resid.innovation_covar,
            ratio: seed_resid.ratio,
        };

        let mut summary = MapSummary {
            seed_cost: current.cost,
            ..Default::default()
        };

        for iteration in 1..ctx.config.map_iterations {
            let target = problem.gauss_newton(&current)?;
            let (next, step) =
                problem.damped_search(&self.measurement, &current, &target, ctx.config.step_floor)?;

            if step.floor_exit {
                warn!(
                    "step {k}: MAP iteration {iteration} reached the step floor at alpha = {}, accepting a cost increase from {:.6e} to {:.6e}",
                    step.alpha, step.prev_cost, step.cost
                );
            } else {
                debug!(
                    "step {k}: MAP iteration {iteration} alpha = {} cost {:.6e} -> {:.6e} ({} trials)",
                    step.alpha, step.prev_cost, step.cost, step.trials
                );
            }
            summary.steps.push(step);

            let delta = (&next.state - &current.state).norm();
            let converged = delta <= MAP_RELATIVE_TOL * current.state.norm();
            current = next;

            if converged {
                summary.converged = true;
                break;
            }
        }

        debug!("step {k}: {summary}");

        let estimate = KfEstimate {
            k,
            epoch: prediction.epoch,
            state: current.state,
            covar: current.covar,
            covar_bar: prediction.covar_bar.clone(),
            predicted: false,
        };
        let residual = Residual {
            k,
            epoch: prediction.epoch,
            prefit: seed_resid.prefit,
            postfit: real_obs - &current.computed_obs,
            ratio: current.ratio,
            prefit_ratio: seed_resid.prefit_ratio,
            innovation_covar: current.innovation_covar,
            real_obs: seed_resid.real_obs,
            computed_obs: seed_resid.computed_obs,
            map: Some(summary),
        };

        Ok((estimate, residual))
    }
}

/// A point of the MAP refinement, along with all of the quantities evaluated at that point.
#[derive(Clone, Debug)]
struct Candidate<X, Z>
where
    X: DimName,
    Z: DimName,
    DefaultAllocator: Allocator<X> + Allocator<Z> + Allocator<X, X> + Allocator<Z, X> + Allocator<Z, Z>,
{
    state: OVector<f64, X>,
    computed_obs: OVector<f64, Z>,
    sensitivity: OMatrix<f64, Z, X>,
    covar: OMatrix<f64, X, X>,
    innovation_covar: OMatrix<f64, Z, Z>,
    ratio: f64,
    cost: f64,
}

/// The MAP problem of a single measurement update. The prior and the measurement are fixed for all of the iterations.
struct MapProblem<'a, X, Z>
where
    X: DimName,
    Z: DimName,
    DefaultAllocator: Allocator<X> + Allocator<Z> + Allocator<X, X> + Allocator<Z, Z>,
{
    k: usize,
    state_bar: &'a OVector<f64, X>,
    covar_bar: &'a OMatrix<f64, X, X>,
    info_bar: OMatrix<f64, X, X>,
    real_obs: &'a OVector<f64, Z>,
    msr_noise: &'a OMatrix<f64, Z, Z>,
    msr_info: OMatrix<f64, Z, Z>,
}

impl<'a, X, Z> MapProblem<'a, X, Z>
where
    X: DimName,
    Z: DimName,
    DefaultAllocator: Allocator<X>
        + Allocator<Z>
        + Allocator<X, X>
        + Allocator<Z, X>
        + Allocator<X, Z>
        + Allocator<Z, Z>,
{
    fn new(
        prediction: &'a KfEstimate<X>,
        real_obs: &'a OVector<f64, Z>,
        msr_noise: &'a OMatrix<f64, Z, Z>,
    ) -> Result<Self, FilterError> {
        let k = prediction.k;
        let info_bar = prediction
            .covar_bar
            .clone()
            .cholesky()
            .context(SingularPredictedCovarSnafu { k })?
            .inverse();
        let msr_info = msr_noise
            .clone()
            .cholesky()
            .context(SingularMeasurementNoiseSnafu { k })?
            .inverse();

        Ok(Self {
            k,
            state_bar: &prediction.state,
            covar_bar: &prediction.covar_bar,
            info_bar,
            real_obs,
            msr_noise,
            msr_info,
        })
    }

    /// The MAP cost at the provided state: `dx' P_bar^-1 dx + dz' R^-1 dz`
    fn cost(&self, state: &OVector<f64, X>, computed_obs: &OVector<f64, Z>) -> f64 {
        let dx = state - self.state_bar;
        let dz = self.real_obs - computed_obs;
        dx.dot(&(&self.info_bar * &dx)) + dz.dot(&(&self.msr_info * &dz))
    }

    /// The Gauss-Newton point from the measurement linearized about the candidate.
    fn gauss_newton(&self, current: &Candidate<X, Z>) -> Result<OVector<f64, X>, FilterError> {
        let h_tilde = &current.sensitivity;
        let h_tilde_t = h_tilde.transpose();
        let s_k = h_tilde * self.covar_bar * &h_tilde_t + self.msr_noise;
        let s_k_inv = s_k
            .cholesky()
            .context(SingularInnovationSnafu { k: self.k })?
            .inverse();
        let gain = self.covar_bar * &h_tilde_t * s_k_inv;

        let linearized = self.real_obs
            - &current.computed_obs
            - h_tilde * (self.state_bar - &current.state);

        Ok(self.state_bar + gain * linearized)
    }

    /// Relinearizes the measurement at the provided state, and computes the information form covariance there.
    fn evaluate<M>(&self, model: &M, state: OVector<f64, X>) -> Result<Candidate<X, Z>, FilterError>
    where
        M: MeasurementModel<X, Z>,
    {
        let k = self.k;
        let (computed_obs, h_tilde) = observe(model, &state, k)?;
        let h_tilde_t = h_tilde.transpose();

        let info = &self.info_bar + &h_tilde_t * &self.msr_info * &h_tilde;
        let covar = symmetrize(
            info.cholesky()
                .context(SingularInformationSnafu { k })?
                .inverse(),
        );

        let innovation_covar = &h_tilde * &covar * &h_tilde_t + self.msr_noise;
        let s_chol = innovation_covar
            .clone()
            .cholesky()
            .context(SingularInnovationSnafu { k })?;
        let ratio = normalized_squared(&s_chol, &(self.real_obs - &computed_obs), k)?;

        Ok(Candidate {
            cost: self.cost(&state, &computed_obs),
            state,
            computed_obs,
            sensitivity: h_tilde,
            covar,
            innovation_covar,
            ratio,
        })
    }

    /// Searches along the direction from the current candidate to the Gauss-Newton point, halving the step
    /// until the cost does not increase. Once the step would fall below the floor, the last trial is accepted as is.
    fn damped_search<M>(
        &self,
        model: &M,
        current: &Candidate<X, Z>,
        target: &OVector<f64, X>,
        step_floor: f64,
    ) -> Result<(Candidate<X, Z>, MapStep), FilterError>
    where
        M: MeasurementModel<X, Z>,
    {
        let direction = target - &current.state;
        let mut alpha = 1.0;
        let mut trials = 0;

        loop {
            trials += 1;
            let trial = self.evaluate(model, &current.state + &direction * alpha)?;
            trace!(
                "step {}: trial #{trials} alpha = {alpha} cost = {:.6e} (previous {:.6e})",
                self.k,
                trial.cost,
                current.cost
            );

            let improved = trial.cost <= current.cost;
            let floor_exit = !improved && alpha * 0.5 < step_floor;

            if improved || floor_exit {
                let step = MapStep {
                    alpha,
                    prev_cost: current.cost,
                    cost: trial.cost,
                    trials,
                    floor_exit,
                };
                return Ok((trial, step));
            }

            alpha *= 0.5;
        }
    }
}
