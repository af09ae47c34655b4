use crate::filtering::{discrete_config, random_walk, random_walk_scenario};
use crate::init_logger;
use nyx::estimation::prelude::*;
use nyx::mc::{MonteCarlo, MultivariateNormal, Simulator};

#[test]
fn mc_random_walk_consistency() {
    init_logger();

    let num_runs = 200;
    let k_max = 50;
    let scenario = random_walk_scenario(k_max);
    let (dynamics, msr) = random_walk();
    let ekf = EKF::new(dynamics.clone(), msr.clone());

    let mc = MonteCarlo::new(
        Simulator::new(dynamics, msr, discrete_config()),
        "random walk".to_string(),
        0x5EED,
    );
    println!("{mc}");

    let results = mc.run(&ekf, &scenario, num_runs).unwrap();
    println!("{results}");

    assert_eq!(results.runs.len(), num_runs);
    assert_eq!(results.msr_size, 1);
    assert_eq!(results.state_size, 1);
    for (index, run) in results.runs.iter().enumerate() {
        assert_eq!(run.index, index);
        assert_eq!(run.ratios.len(), k_max);
        assert_eq!(run.nees.len(), k_max);
        assert_eq!(run.floor_exits, 0);
    }
    assert_eq!(results.average_ratio_per_step().len(), k_max);

    // The ratios of independent runs are independent, so the Chi Square test is sharp
    let avg_ratio = results.average_prefit_ratio().unwrap();
    let (lower, upper) = results.prefit_ratio_bounds(1e-4).unwrap();
    assert!(
        lower <= avg_ratio && avg_ratio <= upper,
        "average prefit ratio {avg_ratio} not in [{lower}, {upper}]"
    );
    // The EKF ratio is the prefit one
    assert_eq!(results.average_ratio().unwrap(), avg_ratio);

    // The estimation errors are correlated in time, so only check that the NEES is about the state size
    let avg_nees = results.average_nees().unwrap();
    assert!((avg_nees - 1.0).abs() < 0.2, "average NEES {avg_nees}");
}

#[test]
fn mc_random_walk_iterated_consistency() {
    init_logger();

    let num_runs = 200;
    let k_max = 50;
    let scenario = random_walk_scenario(k_max);
    let (dynamics, msr) = random_walk();
    let conf = FilterConfig::builder()
        .coupling(CouplingMode::FullyDiscrete)
        .map_iterations(5)
        .build();
    let iekf = IEKF::new(dynamics.clone(), msr.clone());

    let results = MonteCarlo::new(
        Simulator::new(dynamics, msr, conf),
        "iterated random walk".to_string(),
        0x5EED,
    )
    .run(&iekf, &scenario, num_runs)
    .unwrap();
    println!("{results}");

    // The consistency test applies to the prefit ratios, which the iterated filter keeps from its seed
    let avg_prefit = results.average_prefit_ratio().unwrap();
    let (lower, upper) = results.prefit_ratio_bounds(1e-4).unwrap();
    assert!(
        lower <= avg_prefit && avg_prefit <= upper,
        "average prefit ratio {avg_prefit} not in [{lower}, {upper}]"
    );

    // The ratio at the posterior is systematically smaller, so it is not a Chi Square variable
    let avg_ratio = results.average_ratio().unwrap();
    assert!(avg_ratio < avg_prefit, "{avg_ratio} >= {avg_prefit}");
    for run in &results.runs {
        for (ratio, prefit) in run.ratios.iter().zip(run.prefit_ratios.iter()) {
            assert!(*ratio <= *prefit + 1e-12);
        }
    }
}

#[test]
fn mc_runs_are_reproducible() {
    let num_runs = 20;
    let scenario = random_walk_scenario(15);
    let (dynamics, msr) = random_walk();
    let conf = FilterConfig::builder()
        .coupling(CouplingMode::FullyDiscrete)
        .map_iterations(3)
        .build();
    let iekf = IEKF::new(dynamics.clone(), msr.clone());
    let simulator = Simulator::new(dynamics, msr, conf);

    let mc = MonteCarlo::new(simulator.clone(), "reproducibility".to_string(), 1234);
    let first = mc.run(&iekf, &scenario, num_runs).unwrap();
    let second = mc.run(&iekf, &scenario, num_runs).unwrap();
    assert_eq!(first.runs, second.runs);

    let other = MonteCarlo::new(simulator, "reproducibility".to_string(), 4321)
        .run(&iekf, &scenario, num_runs)
        .unwrap();
    assert_ne!(first.runs, other.runs);

    // The initial truth states only depend on the seed
    let dispersion =
        MultivariateNormal::new(scenario.initial_state, scenario.initial_covar).unwrap();
    let states = mc.generate_states(&dispersion, num_runs);
    assert_eq!(states, mc.generate_states(&dispersion, num_runs));
    assert_eq!(states.len(), num_runs);
}
