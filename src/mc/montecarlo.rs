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

use super::{MultivariateNormal, Pcg64Mcg, Results, RunSummary, Scenario, Simulator};
use crate::dynamics::{DynamicsModel, MeasurementModel};
use crate::estimation::filter::Filter;
use crate::estimation::process::FilterProcess;
use crate::estimation::FilterError;
use crate::linalg::allocator::Allocator;
use crate::linalg::{DefaultAllocator, DimName, OVector};
use crate::time::Unit;
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rand::{Rng, SeedableRng};
use rand_distr::Distribution;
use rayon::prelude::*;
use std::fmt;
use std::time::Instant as StdInstant;

/// A Monte Carlo framework for filter consistency analyses, automatically running on all threads via a thread pool.
///
/// Each run disperses the initial truth state about the initial estimate, simulates a noisy arc,
/// filters it, and summarizes the normalized innovation and estimation errors.
pub struct MonteCarlo<D, M> {
    /// Seed of the [64bit PCG random number generator](https://www.pcg-random.org/index.html)
    pub seed: u64,
    /// Simulator of the truth, which shares its models and configuration with the filter
    pub simulator: Simulator<D, M>,
    /// Name of this run, will be reflected in the progress bar and in the output structure
    pub scenario: String,
}

impl<D, M> MonteCarlo<D, M> {
    pub fn new(simulator: Simulator<D, M>, scenario: String, seed: u64) -> Self {
        Self {
            seed,
            simulator,
            scenario,
        }
    }

    // Just the template for the progress bar
    fn progress_bar(&self, num_runs: usize) -> ProgressBar {
        let pb = ProgressBar::new(num_runs as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:100.cyan/blue} {pos:>7}/{len:7} {msg}")
        {
            pb.set_style(style.progress_chars("##-"));
        }
        pb.set_message(format!("{self}"));
        pb
    }

    /// Set up the seed and generate the initial truth states, along with the seed of each run.
    /// The generation is sequential so that the runs do not depend on the thread scheduling.
    #[must_use = "Generated states for a Monte Carlo run must be used"]
    pub fn generate_states<X>(
        &self,
        dispersion: &MultivariateNormal<X>,
        num_runs: usize,
    ) -> Vec<(usize, u64, OVector<f64, X>)>
    where
        X: DimName,
        DefaultAllocator: Allocator<X> + Allocator<X, X>,
    {
        let mut rng = Pcg64Mcg::new(self.seed.into());
        (0..num_runs)
            .map(|index| {
                let state = dispersion.sample(&mut rng);
                (index, rng.gen::<u64>(), state)
            })
            .collect()
    }

    /// Runs the filter on `num_runs` independent simulations of the scenario.
    ///
    /// Returns the first error encountered, if any run fails.
    pub fn run<K, X, U, V, Z>(
        &self,
        filter: &K,
        scenario: &Scenario<X, U, V, Z>,
        num_runs: usize,
    ) -> Result<Results, FilterError>
    where
        K: Filter<X, U, V, Z> + Sync,
        D: DynamicsModel<X, U, V> + Sync,
        M: MeasurementModel<X, Z> + Sync,
        X: DimName,
        U: DimName,
        V: DimName,
        Z: DimName,
        Scenario<X, U, V, Z>: Sync,
        OVector<f64, X>: Send + Sync,
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
        let dispersion = MultivariateNormal::new(
            scenario.initial_state.clone(),
            scenario.initial_covar.clone(),
        )?;
        let init_states = self.generate_states(&dispersion, num_runs);

        info!("{self}: running {num_runs} filters");
        let pb = self.progress_bar(num_runs);
        let start = StdInstant::now();

        let runs = init_states
            .par_iter()
            .progress_with(pb)
            .map(|(index, seed, truth_init)| {
                self.run_one(filter, scenario, *index, *seed, truth_init.clone())
            })
            .collect::<Result<Vec<RunSummary>, FilterError>>()?;

        let clock_time = StdInstant::now() - start;
        info!(
            "{self}: ran {num_runs} filters in {}",
            clock_time.as_secs_f64() * Unit::Second
        );

        Ok(Results {
            runs,
            scenario: self.scenario.clone(),
            msr_size: Z::dim(),
            state_size: X::dim(),
        })
    }

    fn run_one<K, X, U, V, Z>(
        &self,
        filter: &K,
        scenario: &Scenario<X, U, V, Z>,
        index: usize,
        seed: u64,
        truth_init: OVector<f64, X>,
    ) -> Result<RunSummary, FilterError>
    where
        K: Filter<X, U, V, Z>,
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
        let mut rng = Pcg64Mcg::seed_from_u64(seed);
        let truth = self.simulator.generate(scenario, truth_init, &mut rng)?;
        let ctx = scenario.context(self.simulator.config, truth.arc)?;
        let solution = FilterProcess::new(ctx, filter).process()?;

        let nees = solution
            .estimates
            .iter()
            .skip(1)
            .map(|est| {
                est.nees(&truth.states[est.k])
                    .ok_or(FilterError::SingularCovariance { k: est.k })
            })
            .collect::<Result<Vec<f64>, FilterError>>()?;

        Ok(RunSummary {
            index,
            seed,
            ratios: solution.residuals.iter().map(|resid| resid.ratio).collect(),
            prefit_ratios: solution
                .residuals
                .iter()
                .map(|resid| resid.prefit_ratio)
                .collect(),
            nees,
            floor_exits: solution.map_floor_exits(),
        })
    }
}

impl<D, M> fmt::Display for MonteCarlo<D, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - Monte Carlo - seed: {}",
            self.scenario, self.seed
        )
    }
}
