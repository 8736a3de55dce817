//! Closed-loop scenarios for the parameter-estimating controller and the
//! controller bank, run against noise-free simulated vessels.

use turbctl::bank::{ControllerBank, StepTiming};
use turbctl::config::{ControllerConfig, Limits};
use turbctl::control::Controller;
use turbctl::sim::SimVessel;

const CYCLE: f64 = 900.0;

struct Trace {
    readings: Vec<f64>,
    ks: Vec<f64>,
    outputs: Vec<f64>,
}

/// Grow, read, step, dilute; `spike_at` multiplies that step's reading by 100.
fn closed_loop(
    c: &mut Controller,
    vessel: &mut SimVessel,
    steps: usize,
    spike_at: Option<usize>,
) -> Trace {
    let mut trace = Trace {
        readings: Vec::new(),
        ks: Vec::new(),
        outputs: Vec::new(),
    };
    for i in 0..steps {
        vessel.grow(CYCLE);
        let reading = if spike_at == Some(i) {
            vessel.od * 100.0
        } else {
            vessel.od
        };
        let out = c.step(Some(CYCLE), Some(reading), None);
        vessel.dilute(out);
        trace.readings.push(reading);
        trace.ks.push(c.k_estimate());
        trace.outputs.push(out);
    }
    trace
}

fn controller(setpoint: f64, output_limits: Limits) -> Controller {
    let cfg = ControllerConfig {
        output_limits,
        ..ControllerConfig::with_setpoint(setpoint)
    };
    Controller::new("scenario", &cfg).unwrap()
}

fn within(value: f64, target: f64, rel: f64) -> bool {
    (value - target).abs() <= target * rel
}

// ── Convergence ───────────────────────────────────────────────

#[test]
fn converges_on_true_growth_rate_and_setpoint() {
    for start_od in [0.1, 0.3, 0.6] {
        for limits in [Limits::at_least(0.0), Limits::new(0.05, 0.68)] {
            let mut c = controller(0.45, limits);
            let mut vessel = SimVessel::new(start_od, 1.0);
            let trace = closed_loop(&mut c, &mut vessel, 70, None);

            for i in 49..70 {
                assert!(
                    within(trace.ks[i], 1.0, 0.10),
                    "start {start_od}, {limits:?}: k at step {} = {}",
                    i + 1,
                    trace.ks[i]
                );
                assert!(
                    within(trace.readings[i], 0.45, 0.10),
                    "start {start_od}, {limits:?}: od at step {} = {}",
                    i + 1,
                    trace.readings[i]
                );
            }
        }
    }
}

#[test]
fn first_step_with_a_reading_is_conservative() {
    let mut c = controller(0.45, Limits::at_least(0.0));
    let mut vessel = SimVessel::new(0.2, 1.0);
    let trace = closed_loop(&mut c, &mut vessel, 1, None);
    assert_eq!(trace.outputs[0], 0.0);
    assert_eq!(trace.ks[0], 0.5);
}

// ── Extreme readings ──────────────────────────────────────────

#[test]
fn spike_stays_inside_limits_and_the_loop_recovers() {
    let k_limits = ControllerConfig::default().k_limits;
    for limits in [Limits::at_least(0.0), Limits::new(0.05, 0.68)] {
        let mut c = controller(0.45, limits);
        let mut vessel = SimVessel::new(0.3, 1.0);
        let trace = closed_loop(&mut c, &mut vessel, 70, Some(10));

        assert!(trace.ks.iter().all(|&k| k_limits.contains(k)));
        assert!(trace.outputs.iter().all(|&o| limits.contains(o)));
        assert!(trace.outputs[11].is_finite());
        assert!(within(trace.ks[69], 1.0, 0.10));
        assert!(within(trace.readings[69], 0.45, 0.10));
    }
}

#[test]
fn nan_reading_does_not_poison_the_estimate() {
    let mut c = controller(0.45, Limits::new(0.05, 0.68));
    let mut vessel = SimVessel::new(0.3, 1.0);
    closed_loop(&mut c, &mut vessel, 20, None);
    let out = c.step(Some(CYCLE), Some(f64::NAN), None);
    assert!(out.is_finite() && (0.05..=0.68).contains(&out));
    assert!(c.k_estimate().is_finite());
}

// ── Bank ──────────────────────────────────────────────────────

#[test]
fn bank_channels_match_standalone_controllers() {
    let setpoints = [0.3, 0.5, 0.8];
    let limits = Limits::new(0.05, 0.68);
    let mut bank = ControllerBank::build(setpoints.iter().enumerate().map(|(i, &sp)| {
        let cfg = ControllerConfig {
            output_limits: limits,
            ..ControllerConfig::with_setpoint(sp)
        };
        (i.to_string(), Ok(cfg))
    }))
    .bank;
    let mut solo: Vec<Controller> = setpoints.iter().map(|&sp| controller(sp, limits)).collect();
    let mut vessels = [
        SimVessel::new(0.2, 0.6),
        SimVessel::new(0.2, 0.9),
        SimVessel::new(0.2, 1.2),
    ];

    for _ in 0..40 {
        let readings: Vec<f64> = vessels
            .iter_mut()
            .map(|v| {
                v.grow(CYCLE);
                v.od
            })
            .collect();
        let batched = bank.step_all(StepTiming::Elapsed(CYCLE), &readings).unwrap();
        for (ch, c) in solo.iter_mut().enumerate() {
            let alone = c.step(Some(CYCLE), Some(readings[ch]), None);
            assert_eq!(batched[ch], alone, "channel {ch}");
            vessels[ch].dilute(alone);
        }
    }
    assert_eq!(bank.len(), 3);
    assert_eq!(bank.k_estimates(), solo.iter().map(Controller::k_estimate).collect::<Vec<_>>());
}

#[test]
fn parallel_and_sequential_steps_agree() {
    let cfg = ControllerConfig {
        output_limits: Limits::new(0.05, 0.68),
        ..ControllerConfig::with_setpoint(0.45)
    };
    let mut a = ControllerBank::uniform(32, &cfg).unwrap();
    let mut b = a.clone();
    let mut vessels: Vec<SimVessel> = (0..32)
        .map(|i| SimVessel::new(0.05 + i as f64 * 0.01, 0.3 + i as f64 * 0.03))
        .collect();

    for _ in 0..25 {
        let readings: Vec<f64> = vessels
            .iter_mut()
            .map(|v| {
                v.grow(CYCLE);
                v.od
            })
            .collect();
        let pa = a.step_all(StepTiming::Elapsed(CYCLE), &readings).unwrap();
        let pb = b
            .step_all_sequential(StepTiming::Elapsed(CYCLE), &readings)
            .unwrap();
        assert_eq!(pa, pb);
        for (v, f) in vessels.iter_mut().zip(&pa) {
            v.dilute(*f);
        }
    }
    for (ca, cb) in a.iter().zip(b.iter()) {
        assert_eq!(ca.log(), cb.log());
    }
}
