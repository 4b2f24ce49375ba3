use maglock::cosmic::{AocsState, PermanentMagnet, Spacecraft, State};
use maglock::dynamics::AocsDynamics;
use maglock::environment::{DipoleEnvironment, UniformFieldEnvironment};
use maglock::io::observer::{ObserverError, StateObserver};
use maglock::io::SimulationParams;
use maglock::propagators::{PropOpts, PropagationError, Propagator, UnscaledInfNorm};
use maglock::time::Unit;
use nalgebra::{DVector, Matrix3, Quaternion, Vector3};

/// Collects every observation for later inspection.
#[derive(Default)]
struct RecordingObserver {
    samples: Vec<(f64, AocsState)>,
}

impl StateObserver<AocsState> for RecordingObserver {
    fn observe(&mut self, t_s: f64, state: &AocsState) -> Result<(), ObserverError> {
        self.samples.push((t_s, state.clone()));
        Ok(())
    }
}

fn rigid_body() -> Spacecraft {
    let inertia = Matrix3::from_diagonal(&Vector3::new(0.1, 0.2, 0.3));
    let magnet = PermanentMagnet::cylindrical(1.21, 0.05, 0.01, Vector3::z()).unwrap();
    Spacecraft::from_inertia_tensor(inertia, magnet, vec![])
}

fn tumbling_state() -> AocsState {
    AocsState::new(
        0.0,
        Vector3::new(6.778e6, 0.0, 0.0),
        Vector3::new(0.0, 7.5e3, 0.0),
        Quaternion::identity(),
        Vector3::new(0.1, 0.5, 0.3),
        DVector::zeros(0),
    )
}

#[test]
fn torque_free_motion_conserves_energy_and_momentum() {
    let spacecraft = rigid_body();
    let environment = UniformFieldEnvironment::field_only(Vector3::zeros());
    let dynamics = AocsDynamics::new(&spacecraft, &environment);

    let initial = tumbling_state();
    let inertia = *spacecraft.inertia_tensor();
    let energy_init = initial.angular_velocity.dot(&(inertia * initial.angular_velocity));
    let momentum_init = (inertia * initial.angular_velocity).norm();

    let setup = Propagator::dormand45(dynamics, PropOpts::with_tolerances(1e-9, 1e-9));
    let mut instance = setup.with(initial);
    let end = instance.for_duration(100.0 * Unit::Second).unwrap();

    assert!((end.epoch_s() - 100.0).abs() < 1e-9);
    let energy = end.angular_velocity.dot(&(inertia * end.angular_velocity));
    let momentum = (inertia * end.angular_velocity).norm();
    assert!(
        ((energy - energy_init) / energy_init).abs() < 1e-6,
        "rotational energy drifted by {:e}",
        ((energy - energy_init) / energy_init).abs()
    );
    assert!(((momentum - momentum_init) / momentum_init).abs() < 1e-6);
    // Between checkpoints the quaternion norm may drift, but only within the
    // stepper tolerance.
    assert!((end.attitude.norm() - 1.0).abs() < 1e-3);
}

#[test]
fn fixed_and_adaptive_steps_agree() {
    let spacecraft = rigid_body();
    let environment = UniformFieldEnvironment::field_only(Vector3::zeros());

    let adaptive_end = {
        let dynamics = AocsDynamics::new(&spacecraft, &environment);
        let setup = Propagator::dormand45(dynamics, PropOpts::with_tolerances(1e-10, 1e-10));
        let mut instance = setup.with(tumbling_state());
        instance.for_duration(30.0 * Unit::Second).unwrap()
    };
    let fixed_end = {
        let dynamics = AocsDynamics::new(&spacecraft, &environment);
        let setup = Propagator::dormand45(dynamics, PropOpts::with_fixed_step_s(0.01));
        let mut instance = setup.with(tumbling_state());
        instance.for_duration(30.0 * Unit::Second).unwrap()
    };

    let delta = (adaptive_end.angular_velocity - fixed_end.angular_velocity).norm();
    assert!(delta < 1e-6, "angular velocity mismatch: {delta:e}");
}

#[test]
fn both_steppers_converge_to_the_same_motion() {
    let spacecraft = rigid_body();
    let environment = UniformFieldEnvironment::field_only(Vector3::zeros());

    let dormand_end = {
        let dynamics = AocsDynamics::new(&spacecraft, &environment);
        let setup = Propagator::dormand45(dynamics, PropOpts::with_tolerances(1e-10, 1e-10));
        setup.with(tumbling_state()).for_duration(60.0 * Unit::Second).unwrap()
    };
    let fehlberg_end = {
        let dynamics = AocsDynamics::new(&spacecraft, &environment);
        let setup = Propagator::fehlberg78(dynamics, PropOpts::with_tolerances(1e-10, 1e-10));
        setup.with(tumbling_state()).for_duration(60.0 * Unit::Second).unwrap()
    };

    let delta = (dormand_end.angular_velocity - fehlberg_end.angular_velocity).norm();
    assert!(delta < 1e-7, "stepper disagreement: {delta:e}");
}

#[test]
fn checkpointed_run_restores_invariants_and_observes_monotonically() {
    let params = SimulationParams::default();
    let spacecraft = Spacecraft::from_params(&params.spacecraft).unwrap();
    let environment = DipoleEnvironment::earth();
    let dynamics = AocsDynamics::new(&spacecraft, &environment);
    let saturation = params.spacecraft.hysteresis.ms;

    let initial = AocsState::from_initial_conditions(
        &params.orbit,
        Vector3::new(0.23, -0.23, 0.0),
        params.num_rods(),
        0.0,
    )
    .unwrap();

    let setup = Propagator::dormand45(dynamics, PropOpts::with_tolerances(1e-6, 1e-6));
    let mut instance = setup.with(initial);
    let mut observer = RecordingObserver::default();
    let end = instance
        .for_duration_checkpointed(400.0 * Unit::Second, 100.0 * Unit::Second, &mut observer)
        .unwrap();

    // One observation per checkpoint boundary.
    assert_eq!(observer.samples.len(), 4);
    let mut previous_t = f64::NEG_INFINITY;
    for (t_s, state) in &observer.samples {
        assert!(*t_s >= previous_t);
        previous_t = *t_s;
        // The boundary invariants: unit quaternion, bounded magnetizations.
        assert!((state.attitude.norm() - 1.0).abs() < 1e-12);
        for m_irr in state.rod_magnetizations.iter() {
            assert!(m_irr.abs() <= saturation);
        }
    }
    assert!((end.epoch_s() - 400.0).abs() < 1e-9);

    // The geomagnetic field must have worked the rods by now.
    let deepest = observer
        .samples
        .iter()
        .map(|(_, state)| state.rod_magnetizations.abs().max())
        .fold(0.0_f64, f64::max);
    assert!(deepest > 10.0, "rods barely magnetized: {deepest}");
    // No spin-up beyond the magnet potential-energy swing: the rates stay
    // bounded while the rods dissipate.
    assert!(end.angular_velocity.norm() < 0.6);
}

#[test]
fn default_propagators_run_with_default_options() {
    let spacecraft = rigid_body();
    let environment = UniformFieldEnvironment::field_only(Vector3::zeros());

    let dynamics = AocsDynamics::new(&spacecraft, &environment);
    let setup = Propagator::default(dynamics);
    let mut instance = setup.with(tumbling_state());
    let end = instance.for_duration(1.0 * Unit::Second).unwrap();
    assert!((end.epoch_s() - 1.0).abs() < 1e-12);
    let details = instance.latest_details();
    assert!(details.error <= 1.0);

    let dynamics = AocsDynamics::new(&spacecraft, &environment);
    let setup = Propagator::default_fehlberg78(dynamics);
    let mut instance = setup.with(tumbling_state());
    let end = instance.for_duration(1.0 * Unit::Second).unwrap();
    assert!((end.epoch_s() - 1.0).abs() < 1e-12);
}

#[test]
fn step_budget_exhaustion_is_fatal() {
    let spacecraft = rigid_body();
    let environment = UniformFieldEnvironment::field_only(Vector3::zeros());
    let dynamics = AocsDynamics::new(&spacecraft, &environment);

    let mut opts = PropOpts::with_tolerances(1e-9, 1e-9);
    opts.set_max_step(0.01 * Unit::Second);
    opts.step_budget = Some(5);
    let setup = Propagator::dormand45(dynamics, opts);
    let mut instance = setup.with(tumbling_state());

    match instance.for_duration(10.0 * Unit::Second) {
        Err(PropagationError::StepBudgetExhausted { budget, .. }) => assert_eq!(budget, 5),
        other => panic!("expected step budget exhaustion, got {other:?}"),
    }
}

#[test]
fn step_size_underflow_is_fatal() {
    let spacecraft = rigid_body();
    let environment = UniformFieldEnvironment::field_only(Vector3::zeros());
    let dynamics = AocsDynamics::new(&spacecraft, &environment);

    // Pin the step to one second and demand an impossible raw error.
    let mut opts = PropOpts::with_adaptive_step_s(1.0, 1.0, 1.0, UnscaledInfNorm);
    opts.tolerance = 1e-20;
    let setup = Propagator::dormand45(dynamics, opts);
    let mut instance = setup.with(tumbling_state());

    match instance.for_duration(10.0 * Unit::Second) {
        Err(PropagationError::StepSizeUnderflow { .. }) => {}
        other => panic!("expected step size underflow, got {other:?}"),
    }
}

#[test]
fn position_singularity_aborts_the_run() {
    let spacecraft = rigid_body();
    let environment = UniformFieldEnvironment::new(Vector3::zeros(), 3.986004418e14);
    let dynamics = AocsDynamics::new(&spacecraft, &environment);

    let mut state = tumbling_state();
    state.radius = Vector3::new(1e-9, 0.0, 0.0);
    state.velocity = Vector3::zeros();

    let setup = Propagator::dormand45(dynamics, PropOpts::with_tolerances(1e-6, 1e-6));
    let mut instance = setup.with(state);
    match instance.for_duration(1.0 * Unit::Second) {
        Err(PropagationError::Dynamics { .. }) => {}
        other => panic!("expected a dynamics abort, got {other:?}"),
    }
}
