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

use super::filter::Filter;
use super::FilterError;
use crate::linalg::allocator::Allocator;
use crate::linalg::{DefaultAllocator, DimName};

mod conf;
pub use conf::*;

mod context;
pub use context::*;

pub mod solution;
pub use solution::FilterSolution;

/// A batch filtering process, which runs a filter over a whole arc.
pub struct FilterProcess<K, X, U, V, Z>
where
    K: Filter<X, U, V, Z>,
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
    /// Filter run at every step
    pub kf: K,
    pub context: FilterContext<X, U, V, Z>,
}

impl<K, X, U, V, Z> FilterProcess<K, X, U, V, Z>
where
    K: Filter<X, U, V, Z>,
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
    pub fn new(context: FilterContext<X, U, V, Z>, kf: K) -> Self {
        Self { kf, context }
    }

    /// Processes every step of the arc, from the initial step to the last one, and returns the full history.
    ///
    /// The filtering stops at the first failure, and that error is returned.
    pub fn process(mut self) -> Result<FilterSolution<X, Z>, FilterError> {
        let k_init = self.context.k_init();
        let k_max = self.context.k_max();
        let num_steps = k_max - k_init;

        info!(
            "Processing {num_steps} steps ({k_init} to {k_max}) with the {} ({})",
            self.kf.name(),
            self.context.config
        );

        let mut reported = [false; 11];

        for step_cnt in 1..=num_steps {
            let (estimate, residual) = {
                let previous = self.context.history.latest();
                self.kf.advance(&self.context, previous)?
            };

            debug!("{residual}");
            self.context.history.record(estimate, residual)?;

            let step_prct = (10.0 * (step_cnt as f64) / (num_steps as f64)) as usize;
            if !reported[step_prct] {
                info!("{:>3}% done ({step_cnt:.0} steps processed)", 10 * step_prct);
                reported[step_prct] = true;
            }
        }

        // Always report the 100% mark
        if !reported[10] {
            info!("100% done ({num_steps:.0} steps processed)");
        }

        Ok(self.context.into_solution())
    }
}
