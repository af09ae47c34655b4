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
use rand_distr::Distribution;

use super::MultivariateNormal;
use crate::dynamics::{DynamicsModel, MeasurementModel};
use crate::estimation::filter::observe;
use crate::estimation::process::{CouplingMode, FilterConfig, FilterContext, InputArc};
use crate::estimation::{
    FilterDynamicsSnafu, FilterError, FilterPropagationSnafu, InputLengthSnafu,
};
use crate::linalg::allocator::Allocator;
use crate::linalg::{DefaultAllocator, DimName, OMatrix, OVector};
use crate::propagators::Discretizer;
use crate::time::Epoch;
use snafu::prelude::*;

/// Everything needed to simulate and filter an arc, apart from the measurements themselves.
#[derive(Clone, Debug)]
pub struct Scenario<X, U, V, Z>
where
    X: DimName,
    U: DimName,
    V: DimName,
    Z: DimName,
    DefaultAllocator: Allocator<X> + Allocator<X, X> + Allocator<U> + Allocator<V, V> + Allocator<Z, Z>,
{
    /// Initial estimate of the filter, also the mean of the initial truth state
    pub initial_state: OVector<f64, X>,
    /// Initial covariance of the filter, also the covariance of the initial truth state
    pub initial_covar: OMatrix<f64, X, X>,
    pub process_noise: OMatrix<f64, V, V>,
    pub measurement_noise: OMatrix<f64, Z, Z>,
    /// Epochs of steps 0 to k_max
    pub epochs: Vec<Epoch>,
    /// Control inputs of steps 0 to k_max - 1
    pub inputs: Vec<OVector<f64, U>>,
}

impl<X, U, V, Z> Scenario<X, U, V, Z>
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
    /// Builds the filter context of this scenario on the provided arc, starting at step 0.
    pub fn context(
        &self,
        config: FilterConfig,
        arc: InputArc<U, Z>,
    ) -> Result<FilterContext<X, U, V, Z>, FilterError> {
        FilterContext::new(
            config,
            arc,
            0,
            self.initial_state.clone(),
            self.initial_covar.clone(),
            self.process_noise.clone(),
            self.measurement_noise.clone(),
        )
    }
}

/// A simulated arc: the true state at every step and the noisy measurements of it.
#[derive(Clone, Debug)]
pub struct TruthArc<X, U, Z>
where
    X: DimName,
    U: DimName,
    Z: DimName,
    DefaultAllocator: Allocator<X> + Allocator<U> + Allocator<Z>,
{
    /// True states of steps 0 to k_max
    pub states: Vec<OVector<f64, X>>,
    pub arc: InputArc<U, Z>,
}

/// Simulates the truth of a scenario with the same models as the filter, including the process and measurement noises.
#[derive(Clone, Debug)]
pub struct Simulator<D, M> {
    pub dynamics: D,
    pub measurement: M,
    /// Used for the model coupling and the number of integration substeps
    pub config: FilterConfig,
}

impl<D, M> Simulator<D, M> {
    pub fn new(dynamics: D, measurement: M, config: FilterConfig) -> Self {
        Self {
            dynamics,
            measurement,
            config,
        }
    }

    /// Simulates the arc of the scenario from the provided initial truth state.
    ///
    /// At each step, a process noise realization is drawn and held over the transition to the next step,
    /// and the measurement of the new state is corrupted by a measurement noise realization.
    pub fn generate<X, U, V, Z, R>(
        &self,
        scenario: &Scenario<X, U, V, Z>,
        initial_truth: OVector<f64, X>,
        rng: &mut R,
    ) -> Result<TruthArc<X, U, Z>, FilterError>
    where
        D: DynamicsModel<X, U, V>,
        M: MeasurementModel<X, Z>,
        R: Rng + ?Sized,
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
            + Allocator<V, V>
            + Allocator<Z, X>
            + Allocator<Z, Z>,
    {
        let k_max = scenario.inputs.len();
        ensure!(
            scenario.epochs.len() == k_max + 1,
            InputLengthSnafu {
                what: "epochs",
                expected: k_max + 1,
                got: scenario.epochs.len()
            }
        );

        let process_noise = MultivariateNormal::zero_mean(scenario.process_noise.clone())?;
        let msr_noise = MultivariateNormal::zero_mean(scenario.measurement_noise.clone())?;

        let mut states = Vec::with_capacity(k_max + 1);
        let mut measurements = Vec::with_capacity(k_max);
        let mut state = initial_truth;

        for k in 0..k_max {
            let noise: OVector<f64, V> = process_noise.sample(rng);
            let input = &scenario.inputs[k];

            let next = match self.config.coupling {
                CouplingMode::FullyDiscrete => {
                    self.dynamics
                        .propagate(&state, input, &noise, k)
                        .context(FilterDynamicsSnafu { k })?
                        .state
                }
                CouplingMode::ContinuousDiscrete => {
                    Discretizer::rk4(self.config.n_rk)
                        .discretize(
                            &self.dynamics,
                            &state,
                            input,
                            &noise,
                            scenario.epochs[k],
                            scenario.epochs[k + 1],
                        )
                        .context(FilterPropagationSnafu { k })?
                        .state
                }
            };

            let (computed_obs, _) = observe(&self.measurement, &next, k + 1)?;
            let msr_err: OVector<f64, Z> = msr_noise.sample(rng);
            measurements.push(computed_obs + msr_err);

            states.push(std::mem::replace(&mut state, next));
        }
        states.push(state);

        trace!("simulated {k_max} steps");

        Ok(TruthArc {
            states,
            arc: InputArc::new(scenario.epochs.clone(), scenario.inputs.clone(), measurements)?,
        })
    }
}
