use maglock::cosmic::{
    AocsState, KeplerianElements, PermanentMagnet, Spacecraft, EARTH_MU_M3_S2,
};
use maglock::dynamics::AocsDynamics;
use maglock::environment::{DipoleEnvironment, UniformFieldEnvironment};
use maglock::io::observer::{ObserverError, StateObserver};
use maglock::io::SimulationParams;
use maglock::propagators::{PropOpts, Propagator};
use maglock::time::Unit;
use nalgebra::{Matrix3, Vector3};

fn point_mass_spacecraft() -> Spacecraft {
    let inertia = Matrix3::from_diagonal(&Vector3::new(0.002, 0.002, 0.002));
    let magnet = PermanentMagnet::cylindrical(1.21, 0.05, 0.01, Vector3::z()).unwrap();
    Spacecraft::from_inertia_tensor(inertia, magnet, vec![])
}

fn leo_elements() -> KeplerianElements {
    KeplerianElements {
        semi_major_axis_m: 6.778e6,
        eccentricity: 0.001,
        inclination_rad: 0.5,
        raan_rad: 0.3,
        arg_of_periapsis_rad: 0.2,
        mean_anomaly_rad: 0.1,
    }
}

/// Propagated Cartesian state against the analytic Kepler solution: under a
/// purely central field the mean anomaly advances linearly.
#[test]
fn propagation_matches_analytic_kepler_motion() {
    let spacecraft = point_mass_spacecraft();
    let environment = UniformFieldEnvironment::new(Vector3::zeros(), EARTH_MU_M3_S2);
    let dynamics = AocsDynamics::new(&spacecraft, &environment);

    let elements = leo_elements();
    let initial =
        AocsState::from_initial_conditions(&elements, Vector3::zeros(), 0, 0.0).unwrap();

    let setup = Propagator::dormand45(dynamics, PropOpts::with_tolerances(1e-9, 1e-9));
    let mut instance = setup.with(initial);
    let span_s = 1000.0;
    let end = instance.for_duration(span_s * Unit::Second).unwrap();

    let mean_motion = (EARTH_MU_M3_S2 / elements.semi_major_axis_m.powi(3)).sqrt();
    let mut advanced = elements;
    advanced.mean_anomaly_rad += mean_motion * span_s;
    let (r_expected, v_expected) = advanced.to_cartesian().unwrap();

    let r_error = (end.radius - r_expected).norm();
    let v_error = (end.velocity - v_expected).norm();
    assert!(r_error < 1.0, "position error {r_error} m after {span_s} s");
    assert!(v_error < 1e-3, "velocity error {v_error} m/s");
}

#[test]
fn orbit_closes_after_one_period() {
    let spacecraft = point_mass_spacecraft();
    let environment = UniformFieldEnvironment::new(Vector3::zeros(), EARTH_MU_M3_S2);
    let dynamics = AocsDynamics::new(&spacecraft, &environment);

    let elements = leo_elements();
    let initial =
        AocsState::from_initial_conditions(&elements, Vector3::zeros(), 0, 0.0).unwrap();
    let r_start = initial.radius;

    let period_s =
        2.0 * std::f64::consts::PI * (elements.semi_major_axis_m.powi(3) / EARTH_MU_M3_S2).sqrt();
    let setup = Propagator::dormand45(dynamics, PropOpts::with_tolerances(1e-9, 1e-9));
    let mut instance = setup.with(initial);
    let end = instance.for_duration(period_s * Unit::Second).unwrap();

    let closure = (end.radius - r_start).norm();
    assert!(closure < 5.0, "orbit failed to close: {closure} m");
    // Specific angular momentum is a first integral of central-field motion.
    let h_start = elements.specific_angular_momentum();
    let h_end = end.radius.cross(&end.velocity).norm();
    assert!(((h_end - h_start) / h_start).abs() < 1e-9);
}

/// Checkpoint boundaries restore the invariants the stepper let drift, even
/// over coupled attitude/orbit/hysteresis dynamics.
#[test]
fn coupled_dynamics_survive_checkpointed_propagation() {
    let params = SimulationParams::default();
    let spacecraft = Spacecraft::from_params(&params.spacecraft).unwrap();
    let environment = DipoleEnvironment::earth();
    let dynamics = AocsDynamics::new(&spacecraft, &environment);

    let initial = AocsState::from_initial_conditions(
        &params.orbit,
        params.initial_angular_velocity_rad_s,
        params.num_rods(),
        0.0,
    )
    .unwrap();
    let radius_start = initial.radius.norm();

    let setup = Propagator::dormand45(dynamics, PropOpts::with_tolerances(1e-6, 1e-6));
    let mut instance = setup.with(initial);
    let end = instance
        .for_duration_checkpointed(600.0 * Unit::Second, 300.0 * Unit::Second, &mut Discard)
        .unwrap();

    assert!((end.attitude.norm() - 1.0).abs() < 1e-12);
    // The orbit altitude is not visibly perturbed by attitude dynamics.
    assert!((end.radius.norm() - radius_start).abs() / radius_start < 0.05);
}

struct Discard;

impl StateObserver<AocsState> for Discard {
    fn observe(&mut self, _t_s: f64, _state: &AocsState) -> Result<(), ObserverError> {
        Ok(())
    }
}

/// The two-year reference mission: a 1U CubeSat detumbling from
/// 0.325 rad/s into the magnetic lock. Runs for hours; execute with
/// `cargo test -- --ignored` when the full scenario is needed.
#[test]
#[ignore = "multi-hour two-year detumbling scenario"]
fn two_year_mission_detumbles_into_magnetic_lock() {
    let mut params = SimulationParams::default();
    params.initial_angular_velocity_rad_s = Vector3::new(0.23, -0.23, 0.0);
    params.t_end_s = 6.3072e7;
    params.checkpoint_interval_s = Some(600.0);

    let spacecraft = Spacecraft::from_params(&params.spacecraft).unwrap();
    let environment = DipoleEnvironment::earth();
    let dynamics = AocsDynamics::new(&spacecraft, &environment);
    let initial = AocsState::from_initial_conditions(
        &params.orbit,
        params.initial_angular_velocity_rad_s,
        params.num_rods(),
        params.t_start_s,
    )
    .unwrap();

    let setup = Propagator::dormand45(
        dynamics,
        PropOpts::with_tolerances(params.absolute_error, params.relative_error),
    );
    let mut instance = setup.with(initial);
    let end = instance
        .for_duration_checkpointed(
            params.t_end_s * Unit::Second,
            600.0 * Unit::Second,
            &mut Discard,
        )
        .unwrap();

    // Fuzzy acceptance: the tumble must have collapsed into the equilibrium
    // oscillation envelope.
    assert!(
        end.angular_velocity.norm() < 0.01,
        "final rate {} rad/s",
        end.angular_velocity.norm()
    );
}
