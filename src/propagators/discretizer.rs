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

use std::marker::PhantomData;

use snafu::prelude::*;

use super::{DynamicsSnafu, InvalidIntervalSnafu, NoSubstepsSnafu, PropagationError, RK4Fixed, RK};
use crate::dynamics::{DynamicsError, DynamicsModel, Propagation};
use crate::linalg::allocator::Allocator;
use crate::linalg::{DefaultAllocator, DimName, OMatrix, OVector};
use crate::time::{Epoch, Unit};

/// Converts continuous time dynamics into a discrete time propagation by integrating the state,
/// the state transition matrix and the process noise input matrix with a fixed step Runge Kutta.
///
/// The control input and the process noise are held constant over the integration interval.
#[derive(Clone, Debug)]
pub struct Discretizer<R: RK = RK4Fixed> {
    /// Number of equal integration substeps between two filter steps
    pub substeps: usize,
    _rk: PhantomData<R>,
}

impl Discretizer<RK4Fixed> {
    /// Initializes a discretizer using the classical fourth order Runge Kutta.
    pub fn rk4(substeps: usize) -> Self {
        Self::new(substeps)
    }
}

impl<R: RK> Discretizer<R> {
    pub fn new(substeps: usize) -> Self {
        Self {
            substeps,
            _rk: PhantomData,
        }
    }

    /// Integrates the dynamics from `start` to `end` and returns the propagated state with F and Γ.
    #[allow(clippy::too_many_arguments)]
    pub fn discretize<D, X, U, V>(
        &self,
        dynamics: &D,
        state: &OVector<f64, X>,
        input: &OVector<f64, U>,
        noise: &OVector<f64, V>,
        start: Epoch,
        end: Epoch,
    ) -> Result<Propagation<X, V>, PropagationError>
    where
        D: DynamicsModel<X, U, V>,
        X: DimName,
        U: DimName,
        V: DimName,
        DefaultAllocator:
            Allocator<X> + Allocator<U> + Allocator<V> + Allocator<X, X> + Allocator<X, V>,
    {
        ensure!(self.substeps > 0, NoSubstepsSnafu);
        ensure!(end > start, InvalidIntervalSnafu { start, end });

        let step_size = (end - start).to_seconds() / (self.substeps as f64);

        let mut current = Sensitivities::<X, V> {
            state: state.clone(),
            stm: OMatrix::<f64, X, X>::identity(),
            gamma: OMatrix::<f64, X, V>::zeros(),
        };

        let mut k: Vec<Sensitivities<X, V>> = Vec::with_capacity(R::STAGES);

        for step in 0..self.substeps {
            let t_s = (step as f64) * step_size;
            k.clear();
            k.push(
                current
                    .rates(dynamics, start + t_s * Unit::Second, input, noise)
                    .context(DynamicsSnafu)?,
            );

            let mut a_idx: usize = 0;
            for i in 0..(R::STAGES - 1) {
                // c_i is the sum of the a_ij of this row of the Butcher table
                let mut ci: f64 = 0.0;
                let mut wi = Sensitivities::<X, V>::zeros();
                for kj in &k[0..i + 1] {
                    let a_ij = R::A_COEFFS[a_idx];
                    ci += a_ij;
                    wi.accumulate(a_ij, kj);
                    a_idx += 1;
                }

                let mut stage = current.clone();
                stage.accumulate(step_size, &wi);
                let ki = stage
                    .rates(
                        dynamics,
                        start + (t_s + ci * step_size) * Unit::Second,
                        input,
                        noise,
                    )
                    .context(DynamicsSnafu)?;
                k.push(ki);
            }

            for (i, ki) in k.iter().enumerate() {
                current.accumulate(step_size * R::B_COEFFS[i], ki);
            }
        }

        trace!(
            "discretized {} -> {} with {} substeps of {} s",
            start,
            end,
            self.substeps,
            step_size
        );

        Ok(Propagation {
            state: current.state,
            stm: current.stm,
            gamma: current.gamma,
        })
    }
}

/// The integrated quantities: the state, its partials with respect to the initial state, and with respect to the noise.
#[derive(Clone, Debug)]
struct Sensitivities<X, V>
where
    X: DimName,
    V: DimName,
    DefaultAllocator: Allocator<X> + Allocator<X, X> + Allocator<X, V>,
{
    state: OVector<f64, X>,
    stm: OMatrix<f64, X, X>,
    gamma: OMatrix<f64, X, V>,
}

impl<X, V> Sensitivities<X, V>
where
    X: DimName,
    V: DimName,
    DefaultAllocator: Allocator<X> + Allocator<X, X> + Allocator<X, V>,
{
    fn zeros() -> Self {
        Self {
            state: OVector::<f64, X>::zeros(),
            stm: OMatrix::<f64, X, X>::zeros(),
            gamma: OMatrix::<f64, X, V>::zeros(),
        }
    }

    /// self += scale * other
    fn accumulate(&mut self, scale: f64, other: &Self) {
        self.state += &other.state * scale;
        self.stm += &other.stm * scale;
        self.gamma += &other.gamma * scale;
    }

    /// Time derivative of the state, of the STM (dΦ/dt = A Φ) and of Γ (dΓ/dt = A Γ + D)
    fn rates<D, U>(
        &self,
        dynamics: &D,
        epoch: Epoch,
        input: &OVector<f64, U>,
        noise: &OVector<f64, V>,
    ) -> Result<Self, DynamicsError>
    where
        D: DynamicsModel<X, U, V>,
        U: DimName,
        DefaultAllocator: Allocator<U> + Allocator<V>,
    {
        let deriv = dynamics.eom(epoch, &self.state, input, noise)?;
        Ok(Self {
            state: deriv.state_dot,
            stm: &deriv.jac_state * &self.stm,
            gamma: &deriv.jac_state * &self.gamma + deriv.jac_noise,
        })
    }
}
