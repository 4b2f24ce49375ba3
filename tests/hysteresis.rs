use maglock::dynamics::hysteresis::{HysteresisRod, JaParameters};
use maglock::io::observer::{ObserverError, StateObserver};
use maglock::io::SimulationParams;
use maglock::propagators::{PropOpts, Propagator};
use maglock::time::Unit;
use maglock::verify::{verify_hysteresis, HysteresisLoopDynamics, ScalarState};
use nalgebra::Vector3;

/// Records (t, M_irr) at every accepted step.
#[derive(Default)]
struct LoopRecorder {
    samples: Vec<(f64, f64)>,
}

impl StateObserver<ScalarState> for LoopRecorder {
    fn observe(&mut self, t_s: f64, state: &ScalarState) -> Result<(), ObserverError> {
        self.samples.push((t_s, state.value));
        Ok(())
    }
}

/// Integrates the HyMu-80 loop for two cycles of the prescribed sweep.
/// Returns M at t = T, M at t = 2T, and the second-cycle trace.
fn integrate_two_cycles() -> (f64, f64, Vec<(f64, f64)>) {
    let rod = HysteresisRod::new(1.0, Vector3::x(), JaParameters::hymu80()).unwrap();
    let dynamics = HysteresisLoopDynamics::new(&rod);

    let mut opts = PropOpts::with_tolerances(1e-6, 1e-6);
    opts.init_step = 1e-3 * Unit::Second;
    opts.set_max_step(0.01 * Unit::Second);

    let setup = Propagator::dormand45(dynamics, opts);
    let mut instance = setup.with(ScalarState::default());

    let m_at_one = instance.for_duration(1.0 * Unit::Second).unwrap().value;
    let mut recorder = LoopRecorder::default();
    let m_at_two = instance
        .for_duration_with_observer(1.0 * Unit::Second, &mut recorder)
        .unwrap()
        .value;
    (m_at_one, m_at_two, recorder.samples)
}

#[test]
fn loop_closes_after_the_first_cycle() {
    let (m_at_one, m_at_two, _) = integrate_two_cycles();
    let ms = JaParameters::hymu80().ms;
    assert!(
        (m_at_one - m_at_two).abs() < 1e-4 * ms,
        "loop did not close: M(T) = {m_at_one}, M(2T) = {m_at_two}"
    );
    // The loop sits on the negative remanence at the ascending zero crossing.
    assert!(m_at_one < 0.0);
}

#[test]
fn loop_saturates_near_the_material_bound() {
    let (_, _, trace) = integrate_two_cycles();
    let ms = JaParameters::hymu80().ms;
    let peak = trace
        .iter()
        .map(|(_, m)| m.abs())
        .fold(0.0_f64, f64::max);
    assert!(
        peak > 0.85 * ms && peak <= 1.001 * ms,
        "unexpected saturation level: {peak} vs Ms = {ms}"
    );
}

#[test]
fn coercivity_matches_the_pinning_parameter() {
    let (_, _, trace) = integrate_two_cycles();
    let k = JaParameters::hymu80().k;

    // Descending branch of the second cycle: t in (1.25, 1.75). The loop
    // crosses M = 0 at H = -Hc.
    let mut crossing_h = None;
    for window in trace.windows(2) {
        let (t_a, m_a) = window[0];
        let (t_b, m_b) = window[1];
        if t_a > 1.25 && t_b < 1.75 && m_a > 0.0 && m_b <= 0.0 {
            let (h_a, _) = HysteresisLoopDynamics::applied_field(t_a);
            let (h_b, _) = HysteresisLoopDynamics::applied_field(t_b);
            crossing_h = Some(h_a + (h_b - h_a) * m_a / (m_a - m_b));
            break;
        }
    }
    let h_c = -crossing_h.expect("descending branch never crossed M = 0");
    assert!(
        (h_c - k).abs() < 0.1 * k,
        "coercivity {h_c} deviates from k = {k} by more than 10%"
    );
}

#[test]
fn static_drive_leaves_the_rod_frozen() {
    let rod = HysteresisRod::new(1.0, Vector3::x(), JaParameters::hymu80()).unwrap();
    // Arbitrary magnetization, field held constant.
    for m_irr in [-3.0e5, 0.0, 4.5e5] {
        assert_eq!(rod.magnetization_derivative_from_h(m_irr, 50.0, 0.0), 0.0);
    }
}

#[test]
fn verification_mode_emits_the_bh_trace() {
    let path = std::env::temp_dir()
        .join("maglock_hysteresis_tests")
        .join("bh.csv");
    let params = SimulationParams::default();
    verify_hysteresis(&path, &params).unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    let mut lines = contents.lines();
    assert_eq!(lines.next().unwrap(), "time,H_Am,M_Am,B_T");
    let rows: Vec<&str> = lines.collect();
    assert!(rows.len() > 100, "only {} rows emitted", rows.len());
    // Every row carries four columns.
    assert!(rows.iter().all(|row| row.split(',').count() == 4));
}
