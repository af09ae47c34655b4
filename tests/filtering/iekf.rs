use super::{assert_well_formed, discrete_config, map_cost, random_walk, random_walk_scenario};
use crate::{init_logger, BobPosition, Pendulum, TwoBeacons};
use approx::{abs_diff_eq, relative_eq};
use nyx::estimation::prelude::*;
use nyx::linalg::{Matrix1, Matrix2, Matrix2x1, Vector1, Vector2, U1, U2};
use nyx::mc::{Pcg64Mcg, Scenario, Simulator};
use rand::SeedableRng;

fn map_config(map_iterations: usize) -> FilterConfig {
    FilterConfig::builder()
        .coupling(CouplingMode::FullyDiscrete)
        .map_iterations(map_iterations)
        .build()
}

fn simulated_random_walk(k_max: usize, seed: u64) -> InputArc<U1, U1> {
    let scenario = random_walk_scenario(k_max);
    let (dynamics, msr) = random_walk();
    Simulator::new(dynamics, msr, discrete_config())
        .generate(&scenario, Vector1::new(0.5), &mut Pcg64Mcg::seed_from_u64(seed))
        .unwrap()
        .arc
}

#[test]
fn iekf_single_iteration_is_ekf() {
    init_logger();

    let k_max = 25;
    let scenario = random_walk_scenario(k_max);
    let arc = simulated_random_walk(k_max, 7);
    let (dynamics, msr) = random_walk();

    let ekf_sol = FilterProcess::new(
        scenario.context(map_config(1), arc.clone()).unwrap(),
        EKF::new(dynamics.clone(), msr.clone()),
    )
    .process()
    .unwrap();

    let iekf_sol = FilterProcess::new(
        scenario.context(map_config(1), arc).unwrap(),
        IEKF::new(dynamics, msr),
    )
    .process()
    .unwrap();

    assert_eq!(ekf_sol.estimates, iekf_sol.estimates);
    assert_eq!(ekf_sol.residuals, iekf_sol.residuals);
    assert!(iekf_sol.residuals.iter().all(|resid| resid.map.is_none()));
}

#[test]
fn iekf_linear_matches_ekf() {
    init_logger();

    let k_max = 25;
    let scenario = random_walk_scenario(k_max);
    let arc = simulated_random_walk(k_max, 11);
    let (dynamics, msr) = random_walk();

    let ekf_sol = FilterProcess::new(
        scenario.context(map_config(5), arc.clone()).unwrap(),
        EKF::new(dynamics.clone(), msr.clone()),
    )
    .process()
    .unwrap();

    let iekf_sol = FilterProcess::new(
        scenario.context(map_config(5), arc).unwrap(),
        IEKF::new(dynamics, msr),
    )
    .process()
    .unwrap();
    assert_well_formed(&iekf_sol, 0, k_max);

    for (ekf_est, iekf_est) in ekf_sol.estimates.iter().zip(iekf_sol.estimates.iter()) {
        assert!(
            abs_diff_eq!(ekf_est.state, iekf_est.state, epsilon = 1e-9),
            "{iekf_est}"
        );
        // Covariance and information forms of the same posterior covariance
        assert!(
            abs_diff_eq!(ekf_est.covar, iekf_est.covar, epsilon = 1e-9),
            "{iekf_est}"
        );
    }

    for (ekf_resid, iekf_resid) in ekf_sol.residuals.iter().zip(iekf_sol.residuals.iter()) {
        // The earlier posteriors only agree to round-off
        assert!(abs_diff_eq!(ekf_resid.prefit, iekf_resid.prefit, epsilon = 1e-9));
        assert!(relative_eq!(
            ekf_resid.ratio,
            iekf_resid.prefit_ratio,
            epsilon = 1e-12,
            max_relative = 1e-9
        ));
        assert!(iekf_resid.ratio <= iekf_resid.prefit_ratio + 1e-12);

        // A linear measurement is solved by the first Gauss-Newton step
        let summary = iekf_resid.map.as_ref().unwrap();
        assert!(summary.converged, "{summary}");
        assert_eq!(summary.iterations(), 1);
        assert!(summary.cost() <= summary.seed_cost + 1e-12);

        // The ratio is evaluated with the posterior covariance and the postfit residual
        let s = iekf_resid.innovation_covar[(0, 0)];
        let ratio = iekf_resid.postfit[0].powi(2) / s;
        assert!(relative_eq!(iekf_resid.ratio, ratio, max_relative = 1e-9));
        assert!(iekf_resid.ratio >= 0.0);
    }
}

#[test]
fn iekf_two_beacons() {
    init_logger();

    let truth = Vector2::new(1.5, 1.0);
    let beacons = TwoBeacons {
        beacons: [Vector2::new(5.0, 0.0), Vector2::new(0.0, 5.0)],
    };
    let (true_ranges, _) = beacons.measure(&truth, 1).unwrap();

    let arc = InputArc::with_fixed_step(
        Epoch::from_gregorian_tai_at_midnight(2024, 1, 1),
        1 * Unit::Second,
        vec![Vector1::zeros()],
        vec![true_ranges],
    )
    .unwrap();

    // Static position: the prediction is the prior
    let dynamics = LinearDynamics::<U2, U1, U1>::discrete(
        Matrix2::identity(),
        Matrix2x1::zeros(),
        Matrix2x1::zeros(),
    );

    let context = |map_iterations: usize| {
        FilterContext::new(
            map_config(map_iterations),
            arc.clone(),
            0,
            Vector2::zeros(),
            Matrix2::from_diagonal_element(4.0),
            Matrix1::zeros(),
            Matrix2::from_diagonal_element(1e-4),
        )
        .unwrap()
    };

    let ekf_sol = FilterProcess::new(context(10), EKF::new(dynamics.clone(), beacons.clone()))
        .process()
        .unwrap();
    let iekf_sol = FilterProcess::new(context(10), IEKF::new(dynamics, beacons.clone()))
        .process()
        .unwrap();
    assert_well_formed(&iekf_sol, 0, 1);

    let ekf_err = (ekf_sol.final_estimate().state - truth).norm();
    let iekf_err = (iekf_sol.final_estimate().state - truth).norm();
    println!("EKF error {ekf_err:.3e}\tiEKF error {iekf_err:.3e}");
    assert!(iekf_err < 0.01);
    assert!(iekf_err < ekf_err);

    let resid = iekf_sol.residual(1).unwrap();
    let summary = resid.map.as_ref().unwrap();
    println!("{summary}");
    assert!(summary.cost() < summary.seed_cost);
    assert!(summary.iterations() >= 2);
    // Single step from the same prior: the seed is bitwise the EKF update
    assert_eq!(resid.prefit, ekf_sol.residual(1).unwrap().prefit);
    assert_eq!(resid.prefit_ratio, ekf_sol.residual(1).unwrap().ratio);

    // The reported cost is that of the final state
    let prior = KfEstimate::from_covar(
        1,
        arc.epoch(1),
        Vector2::zeros(),
        Matrix2::from_diagonal_element(4.0),
    );
    let (final_obs, _) = beacons.measure(&iekf_sol.final_estimate().state, 1).unwrap();
    let cost = map_cost(
        &iekf_sol.final_estimate().state,
        &prior,
        &true_ranges,
        &final_obs,
        &Matrix2::from_diagonal_element(1e-4),
    );
    assert!((cost - summary.cost()).abs() < 1e-9 * cost.max(1.0));

    // The posterior is much tighter than the prior
    assert!(iekf_sol.final_estimate().covar.trace() < 1e-3);
}

#[test]
fn iekf_pendulum() {
    init_logger();

    let dt = 0.1;
    let k_max = 100;
    let start = Epoch::from_gregorian_tai_at_midnight(2024, 1, 1);
    let scenario = Scenario::<U2, U1, U1, U1> {
        initial_state: Vector2::new(0.4, 0.1),
        initial_covar: Matrix2::from_diagonal_element(0.05),
        process_noise: Matrix1::new(0.01),
        measurement_noise: Matrix1::new(0.01),
        epochs: (0..=k_max)
            .map(|k| start + (k as f64 * dt) * Unit::Second)
            .collect(),
        inputs: vec![Vector1::zeros(); k_max],
    };

    let pendulum = Pendulum { omega_sq: 9.81 };
    let bob = BobPosition { length: 1.0 };
    let conf = FilterConfig::builder().n_rk(10).map_iterations(5).build();
    assert_eq!(conf.coupling, CouplingMode::ContinuousDiscrete);

    let truth = Simulator::new(pendulum.clone(), bob.clone(), conf)
        .generate(&scenario, Vector2::new(0.5, 0.0), &mut Pcg64Mcg::seed_from_u64(2024))
        .unwrap();

    let ekf_sol = FilterProcess::new(
        scenario.context(conf, truth.arc.clone()).unwrap(),
        EKF::new(pendulum.clone(), bob.clone()),
    )
    .process()
    .unwrap();
    let iekf_sol = FilterProcess::new(
        scenario.context(conf, truth.arc.clone()).unwrap(),
        IEKF::new(pendulum, bob),
    )
    .process()
    .unwrap();

    for sol in [&ekf_sol, &iekf_sol] {
        assert_well_formed(sol, 0, k_max);
        let last = sol.final_estimate();
        assert!(last.within_sigma(&truth.states[k_max], 5.0), "{last}");
        for (est, epoch) in sol.estimates.iter().zip(scenario.epochs.iter()) {
            assert_eq!(est.epoch, *epoch);
        }
    }

    // Every accepted step decreases the cost, unless the search stopped on the floor
    for resid in &iekf_sol.residuals {
        let summary = resid.map.as_ref().unwrap();
        assert!(summary.iterations() >= 1);
        for step in &summary.steps {
            if !step.floor_exit {
                assert!(step.cost <= step.prev_cost, "{summary}");
            }
            assert!(step.alpha <= 1.0);
            assert!(step.trials >= 1);
        }
    }
}

#[test]
fn iekf_singular_prediction() {
    let k_max = 3;
    let mut scenario = random_walk_scenario(k_max);
    scenario.initial_covar = Matrix1::zeros();
    scenario.process_noise = Matrix1::zeros();
    let arc = simulated_random_walk(k_max, 3);
    let (dynamics, msr) = random_walk();

    // The EKF handles a perfectly known state
    let sol = FilterProcess::new(
        scenario.context(map_config(3), arc.clone()).unwrap(),
        EKF::new(dynamics.clone(), msr.clone()),
    )
    .process()
    .unwrap();
    assert_eq!(sol.final_estimate().covar, Matrix1::zeros());
    assert!(sol.residuals.iter().all(|resid| resid.postfit == resid.prefit));

    // But the MAP cost needs the inverse of the predicted covariance
    let err = FilterProcess::new(
        scenario.context(map_config(3), arc).unwrap(),
        IEKF::new(dynamics, msr),
    )
    .process()
    .unwrap_err();
    assert_eq!(err, FilterError::SingularPredictedCovar { k: 1 });
}
