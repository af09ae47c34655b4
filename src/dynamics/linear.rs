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

use super::{Derivative, DynamicsError, DynamicsModel, MeasurementModel, Propagation};
use crate::linalg::allocator::Allocator;
use crate::linalg::{DefaultAllocator, DimName, OMatrix, OVector};
use crate::time::Epoch;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum LinearKind {
    Discrete,
    Continuous,
}

/// Linear time invariant dynamics.
///
/// In discrete time: `x_{k+1} = F x_k + B u_k + Γ v_k`.
/// In continuous time: `dx/dt = A x + B u + D v`.
#[derive(Clone, Debug)]
pub struct LinearDynamics<X, U, V>
where
    X: DimName,
    U: DimName,
    V: DimName,
    DefaultAllocator: Allocator<X, X> + Allocator<X, U> + Allocator<X, V>,
{
    /// F in discrete time, A in continuous time
    pub state_matrix: OMatrix<f64, X, X>,
    pub input_matrix: OMatrix<f64, X, U>,
    /// Γ in discrete time, D in continuous time
    pub noise_matrix: OMatrix<f64, X, V>,
    kind: LinearKind,
}

impl<X, U, V> LinearDynamics<X, U, V>
where
    X: DimName,
    U: DimName,
    V: DimName,
    DefaultAllocator: Allocator<X, X> + Allocator<X, U> + Allocator<X, V>,
{
    /// Initializes discrete time dynamics from the transition, input and noise input matrices.
    pub fn discrete(
        stm: OMatrix<f64, X, X>,
        input_matrix: OMatrix<f64, X, U>,
        gamma: OMatrix<f64, X, V>,
    ) -> Self {
        Self {
            state_matrix: stm,
            input_matrix,
            noise_matrix: gamma,
            kind: LinearKind::Discrete,
        }
    }

    /// Initializes continuous time dynamics from the system, input and noise input matrices.
    pub fn continuous(
        system_matrix: OMatrix<f64, X, X>,
        input_matrix: OMatrix<f64, X, U>,
        noise_matrix: OMatrix<f64, X, V>,
    ) -> Self {
        Self {
            state_matrix: system_matrix,
            input_matrix,
            noise_matrix,
            kind: LinearKind::Continuous,
        }
    }

    pub fn is_discrete(&self) -> bool {
        self.kind == LinearKind::Discrete
    }
}

impl<X, U, V> DynamicsModel<X, U, V> for LinearDynamics<X, U, V>
where
    X: DimName,
    U: DimName,
    V: DimName,
    DefaultAllocator: Allocator<X>
        + Allocator<U>
        + Allocator<V>
        + Allocator<X, X>
        + Allocator<X, U>
        + Allocator<X, V>,
{
    fn propagate(
        &self,
        state: &OVector<f64, X>,
        input: &OVector<f64, U>,
        noise: &OVector<f64, V>,
        _k: usize,
    ) -> Result<Propagation<X, V>, DynamicsError> {
        if self.kind != LinearKind::Discrete {
            return Err(DynamicsError::CouplingUnsupported {
                model: "continuous linear dynamics",
                coupling: "fully discrete",
            });
        }

        Ok(Propagation {
            state: &self.state_matrix * state
                + &self.input_matrix * input
                + &self.noise_matrix * noise,
            stm: self.state_matrix.clone(),
            gamma: self.noise_matrix.clone(),
        })
    }

    fn eom(
        &self,
        _epoch: Epoch,
        state: &OVector<f64, X>,
        input: &OVector<f64, U>,
        noise: &OVector<f64, V>,
    ) -> Result<Derivative<X, V>, DynamicsError> {
        if self.kind != LinearKind::Continuous {
            return Err(DynamicsError::CouplingUnsupported {
                model: "discrete linear dynamics",
                coupling: "continuous dynamics",
            });
        }

        Ok(Derivative {
            state_dot: &self.state_matrix * state
                + &self.input_matrix * input
                + &self.noise_matrix * noise,
            jac_state: self.state_matrix.clone(),
            jac_noise: self.noise_matrix.clone(),
        })
    }
}

/// Linear measurement model, `z = H x`.
#[derive(Clone, Debug)]
pub struct LinearMeasurement<X, Z>
where
    X: DimName,
    Z: DimName,
    DefaultAllocator: Allocator<Z, X>,
{
    pub sensitivity: OMatrix<f64, Z, X>,
}

impl<X, Z> LinearMeasurement<X, Z>
where
    X: DimName,
    Z: DimName,
    DefaultAllocator: Allocator<Z, X>,
{
    pub fn new(sensitivity: OMatrix<f64, Z, X>) -> Self {
        Self { sensitivity }
    }
}

impl<X, Z> MeasurementModel<X, Z> for LinearMeasurement<X, Z>
where
    X: DimName,
    Z: DimName,
    DefaultAllocator: Allocator<X> + Allocator<Z> + Allocator<Z, X>,
{
    fn measure(
        &self,
        state: &OVector<f64, X>,
        _k: usize,
    ) -> Result<(OVector<f64, Z>, OMatrix<f64, Z, X>), DynamicsError> {
        Ok((&self.sensitivity * state, self.sensitivity.clone()))
    }
}
