use super::{assert_well_formed, discrete_config, random_walk, random_walk_scenario};
use crate::init_logger;
use approx::{abs_diff_eq, relative_eq};
use nyx::estimation::prelude::*;
use nyx::linalg::{Matrix1, Matrix1x2, Matrix2, Matrix2x1, OMatrix, OVector, Vector1, Vector2, U1, U2};
use nyx::mc::{MultivariateNormal, Pcg64Mcg, Simulator};
use rand::SeedableRng;
use rand_distr::Distribution;

/// Constant velocity model sampled every `dt` seconds, with an acceleration input and an acceleration noise.
fn constant_velocity(dt: f64) -> LinearDynamics<U2, U1, U1> {
    let gamma = Matrix2x1::new(0.5 * dt.powi(2), dt);
    LinearDynamics::discrete(Matrix2::new(1.0, dt, 0.0, 1.0), gamma, gamma)
}

fn position_arc(k_max: usize, dt: f64) -> InputArc<U1, U1> {
    InputArc::with_fixed_step(
        Epoch::from_gregorian_tai_at_midnight(2024, 1, 1),
        dt * Unit::Second,
        vec![Vector1::new(0.05); k_max],
        (1..=k_max)
            .map(|k| Vector1::new(0.5 * (k as f64) + 0.3 * (k as f64).sin()))
            .collect(),
    )
    .unwrap()
}

#[test]
fn ekf_linear_matches_kalman_filter() {
    init_logger();

    let dt = 0.5;
    let k_max = 40;
    let dynamics = constant_velocity(dt);
    let h_tilde = Matrix1x2::new(1.0, 0.0);
    let q = Matrix1::new(0.01);
    let r = Matrix1::new(0.25);
    let x0 = Vector2::new(0.0, 0.4);
    let p0 = Matrix2::new(2.0, 0.1, 0.1, 1.0);

    let arc = position_arc(k_max, dt);
    let ctx = FilterContext::new(discrete_config(), arc.clone(), 0, x0, p0, q, r).unwrap();
    let kf = EKF::new(dynamics.clone(), LinearMeasurement::new(h_tilde));
    let sol = FilterProcess::new(ctx, kf).process().unwrap();
    assert_well_formed(&sol, 0, k_max);

    // Textbook linear Kalman filter
    let mut x = x0;
    let mut p = p0;
    for k in 1..=k_max {
        let x_bar = dynamics.state_matrix * x + dynamics.input_matrix * arc.input(k - 1);
        let p_bar = dynamics.state_matrix * p * dynamics.state_matrix.transpose()
            + dynamics.noise_matrix * q * dynamics.noise_matrix.transpose();
        let s = h_tilde * p_bar * h_tilde.transpose() + r;
        let gain = p_bar * h_tilde.transpose() * s.try_inverse().unwrap();
        let innov = arc.measurement(k) - h_tilde * x_bar;
        x = x_bar + gain * innov;
        p = (Matrix2::identity() - gain * h_tilde) * p_bar;

        let est = sol.estimate(k).unwrap();
        let resid = sol.residual(k).unwrap();
        assert!(
            abs_diff_eq!(est.state, x, epsilon = 1e-9),
            "step {k}: {} vs {x}",
            est.state
        );
        assert!(abs_diff_eq!(est.covar, p, epsilon = 1e-9), "step {k}");
        assert!(abs_diff_eq!(est.covar_bar, p_bar, epsilon = 1e-9), "step {k}");
        assert!(abs_diff_eq!(resid.prefit, innov, epsilon = 1e-9));
        let ratio = innov[0].powi(2) / s[(0, 0)];
        assert!(relative_eq!(resid.ratio, ratio, max_relative = 1e-9), "step {k}");
        assert!(resid.map.is_none());
    }
}

#[test]
fn ekf_continuous_matches_discrete() {
    init_logger();

    // The double integrator is integrated exactly by RK4, so both couplings must agree
    let dt = 0.5;
    let k_max = 20;
    let arc = position_arc(k_max, dt);
    let x0 = Vector2::new(0.0, 0.4);
    let p0 = Matrix2::new(2.0, 0.1, 0.1, 1.0);
    let q = Matrix1::new(0.01);
    let r = Matrix1::new(0.25);
    let msr = LinearMeasurement::new(Matrix1x2::new(1.0, 0.0));

    let continuous = LinearDynamics::continuous(
        Matrix2::new(0.0, 1.0, 0.0, 0.0),
        Matrix2x1::new(0.0, 1.0),
        Matrix2x1::new(0.0, 1.0),
    );
    let conf = FilterConfig::builder()
        .coupling(CouplingMode::ContinuousDiscrete)
        .n_rk(5)
        .build();
    let ctx = FilterContext::new(conf, arc.clone(), 0, x0, p0, q, r).unwrap();
    let sol_cd = FilterProcess::new(ctx, EKF::new(continuous, msr.clone()))
        .process()
        .unwrap();

    let ctx = FilterContext::new(discrete_config(), arc, 0, x0, p0, q, r).unwrap();
    let sol_dd = FilterProcess::new(ctx, EKF::new(constant_velocity(dt), msr))
        .process()
        .unwrap();

    for (est_cd, est_dd) in sol_cd.estimates.iter().zip(sol_dd.estimates.iter()) {
        assert_eq!(est_cd.epoch, est_dd.epoch);
        assert!(abs_diff_eq!(est_cd.state, est_dd.state, epsilon = 1e-9));
        assert!(abs_diff_eq!(est_cd.covar, est_dd.covar, epsilon = 1e-9));
    }
}

#[test]
fn ekf_scalar_random_walk() {
    init_logger();

    let k_max = 50;
    let scenario = random_walk_scenario(k_max);
    let (dynamics, msr) = random_walk();

    let simulator = Simulator::new(dynamics.clone(), msr.clone(), discrete_config());
    let mut rng = Pcg64Mcg::seed_from_u64(0xC0FFEE);
    let truth_init =
        MultivariateNormal::new(scenario.initial_state, scenario.initial_covar)
            .unwrap()
            .sample(&mut rng);
    let truth = simulator
        .generate(&scenario, truth_init, &mut rng)
        .unwrap();

    let ctx = scenario.context(discrete_config(), truth.arc).unwrap();
    let sol = FilterProcess::new(ctx, EKF::new(dynamics, msr))
        .process()
        .unwrap();
    println!("{sol}");
    assert_well_formed(&sol, 0, k_max);

    // Steady state of the Riccati recursion: P^2 + Q P - Q R = 0
    let (q, r) = (0.01_f64, 0.1_f64);
    let p_ss = 0.5 * (-q + (q * q + 4.0 * q * r).sqrt());
    let last = sol.final_estimate();
    assert!(abs_diff_eq!(last.covar[(0, 0)], p_ss, epsilon = 1e-9), "{last}");
    assert!(abs_diff_eq!(last.covar_bar[(0, 0)], p_ss + q, epsilon = 1e-9));

    // The covariance decreases monotonically from P0 = 1 towards the steady state
    for pair in sol.estimates.windows(2) {
        assert!(pair[1].covar[(0, 0)] <= pair[0].covar[(0, 0)]);
    }

    assert!(sol.is_consistent(1e-4).unwrap());
    assert!(sol.rms_postfit_residuals().unwrap() < sol.rms_prefit_residuals().unwrap());
    // With 50 Chi Square samples of one degree of freedom, hardly any exceed 15
    assert!(sol.residual_ratio_within_threshold(15.0).unwrap() > 0.9);
    assert_eq!(sol.map_floor_exits(), 0);
}

#[test]
fn ekf_runs_are_deterministic() {
    let k_max = 30;
    let scenario = random_walk_scenario(k_max);
    let (dynamics, msr) = random_walk();
    let simulator = Simulator::new(dynamics.clone(), msr.clone(), discrete_config());
    let truth = simulator
        .generate(&scenario, Vector1::new(0.3), &mut Pcg64Mcg::seed_from_u64(42))
        .unwrap();

    let run = || {
        let ctx = scenario
            .context(discrete_config(), truth.arc.clone())
            .unwrap();
        FilterProcess::new(ctx, EKF::new(dynamics.clone(), msr.clone()))
            .process()
            .unwrap()
    };

    let first = run();
    let second = run();
    assert_eq!(first.estimates, second.estimates);
    assert_eq!(first.residuals, second.residuals);
}

#[test]
fn ekf_initial_step_offsets() {
    let k_max = 20;
    let scenario = random_walk_scenario(k_max);
    let (dynamics, msr) = random_walk();
    let arc = InputArc::new(
        scenario.epochs.clone(),
        scenario.inputs.clone(),
        vec![Vector1::new(0.25); k_max],
    )
    .unwrap();

    let context = |k_init: usize| {
        FilterContext::new(
            discrete_config(),
            arc.clone(),
            k_init,
            scenario.initial_state,
            scenario.initial_covar,
            scenario.process_noise,
            scenario.measurement_noise,
        )
        .unwrap()
    };

    // Starting mid-arc only fills the history from the initial step onward
    let sol = FilterProcess::new(context(12), EKF::new(dynamics.clone(), msr.clone()))
        .process()
        .unwrap();
    assert_well_formed(&sol, 12, k_max);
    assert!(sol.estimate(11).is_none());
    assert!(sol.residual(12).is_none());
    assert_eq!(sol.estimate(12).unwrap().epoch, scenario.epochs[12]);
    assert_eq!(sol.residual(13).unwrap().epoch, scenario.epochs[13]);

    // The histories are indexed like the arc, with empty slots before the initial step
    let states = sol.states();
    let covars = sol.covariances();
    assert_eq!(states.len(), k_max + 1);
    assert_eq!(covars.len(), k_max + 1);
    assert!(states[..12].iter().all(|state| state.is_none()));
    assert!(covars[..12].iter().all(|covar| covar.is_none()));
    for k in 12..=k_max {
        assert_eq!(states[k], Some(sol.estimate(k).unwrap().state));
        assert_eq!(covars[k], Some(sol.estimate(k).unwrap().covar));
    }

    let ratios = sol.ratios();
    let prefit_ratios = sol.prefit_ratios();
    assert_eq!(ratios.len(), k_max);
    assert_eq!(prefit_ratios.len(), k_max);
    // Slot k - 1 holds the ratio of the measurement of step k, as in the measurement history
    assert!(ratios[..12].iter().all(|ratio| ratio.is_none()));
    for k in 13..=k_max {
        assert_eq!(ratios[k - 1], Some(sol.residual(k).unwrap().ratio));
        assert_eq!(prefit_ratios[k - 1], ratios[k - 1]);
    }

    // Starting on the last step processes nothing
    let sol = FilterProcess::new(context(k_max), EKF::new(dynamics, msr))
        .process()
        .unwrap();
    assert_well_formed(&sol, k_max, k_max);
    assert_eq!(sol.final_estimate().state, scenario.initial_state);
    assert_eq!(
        sol.average_ratio(),
        Err(FilterError::NoResiduals {
            action: "average the residual ratios"
        })
    );
}

/// Direct measurement which cannot be evaluated from the provided step onward
struct FailsFrom {
    step: usize,
}

impl MeasurementModel<U1, U1> for FailsFrom {
    fn measure(
        &self,
        state: &OVector<f64, U1>,
        k: usize,
    ) -> Result<(OVector<f64, U1>, OMatrix<f64, U1, U1>), DynamicsError> {
        if k >= self.step {
            Err(DynamicsError::ModelEvaluation {
                k,
                reason: "sensor offline".to_string(),
            })
        } else {
            Ok((*state, Matrix1::identity()))
        }
    }
}

#[test]
fn ekf_failures() {
    let k_max = 5;
    let scenario = random_walk_scenario(k_max);
    let (dynamics, msr) = random_walk();
    let arc = InputArc::new(
        scenario.epochs.clone(),
        scenario.inputs.clone(),
        vec![Vector1::new(0.25); k_max],
    )
    .unwrap();

    // A discrete model cannot be used with the continuous-discrete coupling
    let ctx = scenario
        .context(FilterConfig::default(), arc.clone())
        .unwrap();
    let err = FilterProcess::new(ctx, EKF::new(dynamics.clone(), msr.clone()))
        .process()
        .unwrap_err();
    assert!(
        matches!(
            err,
            FilterError::FilterPropagation {
                k: 0,
                source: nyx::propagators::PropagationError::Dynamics {
                    source: DynamicsError::CouplingUnsupported { .. }
                }
            }
        ),
        "{err}"
    );

    // The first model failure stops the run
    let ctx = scenario
        .context(discrete_config(), arc.clone())
        .unwrap();
    let err = FilterProcess::new(ctx, EKF::new(dynamics.clone(), FailsFrom { step: 3 }))
        .process()
        .unwrap_err();
    assert_eq!(
        err,
        FilterError::FilterDynamics {
            k: 3,
            source: DynamicsError::ModelEvaluation {
                k: 3,
                reason: "sensor offline".to_string()
            }
        }
    );

    // Without any measurement noise nor sensitivity, the innovation covariance is singular
    let ctx = FilterContext::new(
        discrete_config(),
        arc,
        0,
        scenario.initial_state,
        scenario.initial_covar,
        scenario.process_noise,
        Matrix1::zeros(),
    )
    .unwrap();
    let err = FilterProcess::new(ctx, EKF::new(dynamics, LinearMeasurement::new(Matrix1::zeros())))
        .process()
        .unwrap_err();
    assert_eq!(err, FilterError::SingularInnovation { k: 1 });
}
