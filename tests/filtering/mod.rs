use nyx::estimation::prelude::*;
use nyx::linalg::allocator::Allocator;
use nyx::linalg::{DefaultAllocator, DimName, Matrix1, OMatrix, OVector, Vector1, U1};
use nyx::mc::Scenario;

mod ekf;
mod iekf;

/// Scalar random walk `x_{k+1} = x_k + u_k + w_k`, directly measured: Q = 0.01, R = 0.1 and P0 = 1
pub fn random_walk_scenario(k_max: usize) -> Scenario<U1, U1, U1, U1> {
    let start = Epoch::from_gregorian_tai_at_midnight(2024, 1, 1);
    Scenario {
        initial_state: Vector1::new(0.0),
        initial_covar: Matrix1::new(1.0),
        process_noise: Matrix1::new(0.01),
        measurement_noise: Matrix1::new(0.1),
        epochs: (0..=k_max).map(|k| start + (k as f64) * Unit::Second).collect(),
        inputs: vec![Vector1::zeros(); k_max],
    }
}

pub fn random_walk() -> (LinearDynamics<U1, U1, U1>, LinearMeasurement<U1, U1>) {
    (
        LinearDynamics::discrete(Matrix1::new(1.0), Matrix1::new(1.0), Matrix1::new(1.0)),
        LinearMeasurement::new(Matrix1::new(1.0)),
    )
}

pub fn discrete_config() -> FilterConfig {
    FilterConfig::builder()
        .coupling(CouplingMode::FullyDiscrete)
        .build()
}

/// Checks the invariants which hold for any run: complete history, finite and symmetric covariances, non-negative ratios.
pub fn assert_well_formed<X, Z>(sol: &FilterSolution<X, Z>, k_init: usize, k_max: usize)
where
    X: DimName,
    Z: DimName,
    DefaultAllocator: Allocator<X> + Allocator<X, X> + Allocator<Z> + Allocator<Z, Z>,
{
    assert_eq!(sol.k_init, k_init);
    assert_eq!(sol.k_max(), k_max);
    assert_eq!(sol.estimates.len(), k_max - k_init + 1);
    assert_eq!(sol.residuals.len(), k_max - k_init);

    for (i, est) in sol.estimates.iter().enumerate() {
        assert_eq!(est.k, k_init + i);
        assert!(est.state.iter().all(|v| v.is_finite()), "{est}");
        assert!(est.covar.iter().all(|v| v.is_finite()), "{est}");
        assert!(
            (&est.covar - est.covar.transpose()).norm() <= 1e-9 * est.covar.norm(),
            "covariance of step {} is not symmetric",
            est.k
        );
        assert!(est.covar.diagonal().iter().all(|v| *v >= 0.0), "{est}");
    }

    for (i, resid) in sol.residuals.iter().enumerate() {
        assert_eq!(resid.k, k_init + 1 + i);
        assert!(resid.ratio >= 0.0, "{resid}");
        assert!(resid.ratio.is_finite(), "{resid}");
        assert!(resid.prefit_ratio >= 0.0, "{resid}");
    }
}

/// Returns the MAP cost of the provided state, as minimized by the iterated EKF.
pub fn map_cost<X, Z>(
    state: &OVector<f64, X>,
    prediction: &KfEstimate<X>,
    real_obs: &OVector<f64, Z>,
    computed_obs: &OVector<f64, Z>,
    msr_noise: &OMatrix<f64, Z, Z>,
) -> f64
where
    X: DimName,
    Z: DimName,
    DefaultAllocator: Allocator<X> + Allocator<X, X> + Allocator<Z> + Allocator<Z, Z>,
{
    let dx = state - &prediction.state;
    let dz = real_obs - computed_obs;
    let p_inv = prediction.covar_bar.clone().try_inverse().unwrap();
    let r_inv = msr_noise.clone().try_inverse().unwrap();
    dx.dot(&(p_inv * &dx)) + dz.dot(&(r_inv * &dz))
}
