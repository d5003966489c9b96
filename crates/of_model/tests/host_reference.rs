// crates/of_model/tests/host_reference.rs

//! 主机参考求解器的精度与轨迹形状

use of_model::{DeviceInfo, HostSolver, OdeSolver, OdeSystem, StepperKind};

fn exponential_decay() -> OdeSystem {
    OdeSystem::builder("exponential_decay", 1, |_t, y| vec![-2.0 * y[0]])
        .initial_conditions(vec![1.0])
        .time_span(0.0, 1.0)
        .parameter("lambda", 2.0)
        .analytical(|t| vec![(-2.0 * t).exp()])
        .device(DeviceInfo::builtin("exponential").with_uniforms(vec![2.0]))
        .build()
        .unwrap()
}

fn harmonic() -> OdeSystem {
    OdeSystem::builder("harmonic", 2, |_t, y| vec![y[1], -4.0 * y[0]])
        .initial_conditions(vec![1.0, 0.0])
        .time_span(0.0, 2.0)
        .parameter("omega_sq", 4.0)
        .analytical(|t| vec![(2.0 * t).cos(), -2.0 * (2.0 * t).sin()])
        .build()
        .unwrap()
}

#[test]
fn rk45_matches_exponential_decay() {
    let sys = exponential_decay();
    let mut solver = HostSolver::with_kind(StepperKind::Rk45);
    let traj = solver.solve(&sys, 0.0, 1.0, 0.01, &sys.initial_conditions);

    assert_eq!(traj.len(), 101);
    let exact = sys.analytical(1.0).unwrap()[0];
    let last = traj.last().unwrap()[0];
    assert!((last - exact).abs() < 1e-6, "RK45 终值 {} vs {}", last, exact);
}

#[test]
fn euler_matches_closed_form_product() {
    // y_n = (1 - 2dt)^n
    let sys = exponential_decay();
    let mut solver = HostSolver::with_kind(StepperKind::ExplicitEuler);
    let traj = solver.solve(&sys, 0.0, 1.0, 0.01, &[1.0]);

    let last = traj.last().unwrap()[0];
    assert!((last - 0.98f64.powi(100)).abs() < 1e-12);
    assert!((last - (-2.0f64).exp()).abs() < 3e-3);
}

#[test]
fn first_element_is_initial_condition() {
    let sys = harmonic();
    for kind in [StepperKind::ExplicitEuler, StepperKind::Rk45] {
        let mut solver = HostSolver::with_kind(kind);
        let traj = solver.solve(&sys, 0.0, 2.0, 0.05, &[1.0, 0.0]);
        assert_eq!(traj[0], vec![1.0, 0.0]);
        assert_eq!(traj.len(), of_model::step_count(0.0, 2.0, 0.05).unwrap());
        assert!(traj.iter().all(|row| row.len() == 2));
    }
}

#[test]
fn rk45_tracks_harmonic_oscillator() {
    let sys = harmonic();
    let mut solver = HostSolver::from_method("dopri5").unwrap();
    let traj = solver.solve(&sys, 0.0, 2.0, 0.01, &[1.0, 0.0]);

    let exact = sys.analytical(2.0).unwrap();
    let last = traj.last().unwrap();
    for (a, b) in last.iter().zip(&exact) {
        assert!((a - b).abs() < 1e-8);
    }
}

#[test]
fn host_solve_is_deterministic() {
    let sys = harmonic();
    let mut solver = HostSolver::with_kind(StepperKind::Rk45);
    let a = solver.solve(&sys, 0.0, 2.0, 0.1, &[1.0, 0.0]);
    let b = solver.solve(&sys, 0.0, 2.0, 0.1, &[1.0, 0.0]);
    assert_eq!(a, b);
}

#[test]
fn unknown_method_is_rejected() {
    assert!(HostSolver::from_method("leapfrog").is_err());
}
