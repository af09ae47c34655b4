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
use snafu::prelude::*;

/// Linear dynamics and measurement models, mostly useful as a reference for the nonlinear filters.
pub mod linear;
pub use linear::{LinearDynamics, LinearMeasurement};

/// The result of a discrete time propagation of the dynamics, i.e. the next state and the Jacobians needed by the time update.
#[derive(Clone, Debug, PartialEq)]
pub struct Propagation<X, V>
where
    X: DimName,
    V: DimName,
    DefaultAllocator: Allocator<X> + Allocator<X, X> + Allocator<X, V>,
{
    /// Propagated state
    pub state: OVector<f64, X>,
    /// State transition matrix, i.e. the partials of the propagated state with respect to the initial state (usually noted F or Φ)
    pub stm: OMatrix<f64, X, X>,
    /// Partials of the propagated state with respect to the process noise (usually noted Γ)
    pub gamma: OMatrix<f64, X, V>,
}

/// The time derivative of the state and its partials, as returned by continuous time dynamics.
#[derive(Clone, Debug, PartialEq)]
pub struct Derivative<X, V>
where
    X: DimName,
    V: DimName,
    DefaultAllocator: Allocator<X> + Allocator<X, X> + Allocator<X, V>,
{
    pub state_dot: OVector<f64, X>,
    /// Partials of the state derivative with respect to the state (usually noted A)
    pub jac_state: OMatrix<f64, X, X>,
    /// Partials of the state derivative with respect to the process noise (usually noted D)
    pub jac_noise: OMatrix<f64, X, V>,
}

/// The dynamics of the system being estimated.
///
/// X is the size of the state, U the size of the control input, and V the size of the process noise.
///
/// A model only needs to implement the coupling it supports: the filter calls `propagate` when configured
/// for fully discrete models and `eom` (through the discretizer) when configured for continuous dynamics.
/// Calling the other one returns a `DynamicsError::CouplingUnsupported`.
pub trait DynamicsModel<X, U, V>
where
    X: DimName,
    U: DimName,
    V: DimName,
    DefaultAllocator: Allocator<X> + Allocator<U> + Allocator<V> + Allocator<X, X> + Allocator<X, V>,
{
    /// Propagates the state from step `k` to step `k+1` given the control input and a realization of the process noise.
    fn propagate(
        &self,
        _state: &OVector<f64, X>,
        _input: &OVector<f64, U>,
        _noise: &OVector<f64, V>,
        _k: usize,
    ) -> Result<Propagation<X, V>, DynamicsError> {
        Err(DynamicsError::CouplingUnsupported {
            model: std::any::type_name::<Self>(),
            coupling: "fully discrete",
        })
    }

    /// Defines the continuous time equations of motion, with the input and noise held constant over the integration interval.
    fn eom(
        &self,
        _epoch: Epoch,
        _state: &OVector<f64, X>,
        _input: &OVector<f64, U>,
        _noise: &OVector<f64, V>,
    ) -> Result<Derivative<X, V>, DynamicsError> {
        Err(DynamicsError::CouplingUnsupported {
            model: std::any::type_name::<Self>(),
            coupling: "continuous dynamics",
        })
    }
}

/// The measurement model: X is the size of the state, and Z the size of the measurement.
pub trait MeasurementModel<X, Z>
where
    X: DimName,
    Z: DimName,
    DefaultAllocator: Allocator<X> + Allocator<Z> + Allocator<Z, X>,
{
    /// Returns the computed observation at the provided state and its sensitivity matrix (usually noted H).
    fn measure(
        &self,
        state: &OVector<f64, X>,
        k: usize,
    ) -> Result<(OVector<f64, Z>, OMatrix<f64, Z, X>), DynamicsError>;
}

/// Dynamics and measurement model errors.
#[derive(Debug, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DynamicsError {
    #[snafu(display("{model} does not support {coupling} coupling"))]
    CouplingUnsupported {
        model: &'static str,
        coupling: &'static str,
    },
    /// Reported by user models which cannot be evaluated at the requested point.
    #[snafu(display("model evaluation failed at step {k}: {reason}"))]
    ModelEvaluation { k: usize, reason: String },
    #[snafu(display("model returned a non-finite {what} at step {k}"))]
    NonFinite { what: &'static str, k: usize },
}

/// Ensures that all of the components of the provided matrix are finite.
pub(crate) fn ensure_finite<R, C>(
    mat: &OMatrix<f64, R, C>,
    what: &'static str,
    k: usize,
) -> Result<(), DynamicsError>
where
    R: DimName,
    C: DimName,
    DefaultAllocator: Allocator<R, C>,
{
    ensure!(mat.iter().all(|v| v.is_finite()), NonFiniteSnafu { what, k });
    Ok(())
}
