//! Integration tests for the CycleService → bank → actuator pipeline, with
//! mock instruments and with the simulated rig.

use tempfile::TempDir;

use crate::mock_hw::{MockHardware, RecordingSink};

use turbctl::adapters::fs_store::FsHistoryStore;
use turbctl::adapters::memory_store::MemoryStore;
use turbctl::app::commands::AppCommand;
use turbctl::app::events::AppEvent;
use turbctl::app::service::CycleService;
use turbctl::bank::{ControllerBank, StepTiming};
use turbctl::config::{Limits, SystemConfig};
use turbctl::manifest::{self, Manifest};
use turbctl::sim::{NoiseModel, SimRig, SimVessel, staggered_growth};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn make_service(channels: usize) -> (CycleService, SystemConfig) {
    let config = SystemConfig::default();
    let keys = manifest::channel_keys(1, channels);
    let build = ControllerBank::build(
        keys.into_iter()
            .map(|k| (k, Ok(config.channel_config()))),
    );
    let mut sink = RecordingSink::new();
    let service = CycleService::start(build, &config, &mut sink)
        .with_timing(StepTiming::Elapsed(config.cycle_secs));
    (service, config)
}

#[test]
fn tick_reads_steps_and_actuates_every_channel() {
    init_logs();
    let (mut service, config) = make_service(4);
    let limits = config.vessel.output_limits();
    let mut hw = MockHardware::new(4, 0.3)
        .script(0, &[0.01, 0.02, 0.04])
        .script(3, &[2.0, 3.0, 4.0]);
    let mut sink = RecordingSink::new();

    for cycle in 1..=3 {
        let report = service.tick(&mut hw, &mut sink).unwrap();
        assert_eq!(report.cycle, cycle);
        assert_eq!(report.outputs.len(), 4);
    }
    assert_eq!(hw.reads, 12);
    assert_eq!(hw.calls.len(), 12);
    assert!(hw.calls.iter().all(|c| limits.contains(c.fraction)));
    // A thin culture is diluted as little as possible, a dense one as much as allowed.
    assert_eq!(hw.fractions(0).last(), Some(&limits.min));
    assert_eq!(hw.fractions(3).last(), Some(&limits.max));
    assert_eq!(
        sink.count(|e| matches!(e, AppEvent::CycleCompleted(_))),
        3
    );
}

#[test]
fn report_volumes_follow_the_vessel() {
    let (mut service, config) = make_service(2);
    let mut hw = MockHardware::new(2, 0.3);
    let mut sink = RecordingSink::new();
    let report = service.tick(&mut hw, &mut sink).unwrap();
    for (f, v) in report.outputs.iter().zip(&report.volumes_ul) {
        assert!((f * config.vessel.volume_ul - v).abs() < 1e-9);
    }
    assert_eq!(report.readings, vec![0.3, 0.3]);
    assert!(report.k_estimates.iter().all(|k| *k == Some(0.5)));
}

#[test]
fn manifest_decides_which_channels_start() {
    let config = SystemConfig::default();
    let manifest = Manifest::parse(b"\"plate0,A1\",0.4\n\"plate0,B1\",\n\"plate0,C1\",0.7\n").unwrap();
    let keys = manifest::channel_keys(1, 4);
    let build = ControllerBank::build(manifest.channel_configs(&keys, &config.channel_config()));
    let mut sink = RecordingSink::new();
    let service = CycleService::start(build, &config, &mut sink);

    assert_eq!(service.bank().names(), vec!["plate0,A1", "plate0,C1"]);
    assert_eq!(
        sink.count(|e| matches!(e, AppEvent::ChannelRejected { .. })),
        2
    );
    assert_eq!(
        sink.events.last(),
        Some(&AppEvent::Started {
            channels: 2,
            rejected: 2
        })
    );
    let c1 = service.bank().position("plate0,C1").unwrap();
    assert_eq!(service.bank().get(c1).unwrap().setpoint(), 0.7);
}

#[test]
fn commands_change_live_channels() {
    let (mut service, _) = make_service(2);
    let store = MemoryStore::new();
    let mut sink = RecordingSink::new();

    service
        .handle_command(
            AppCommand::SetOutputLimits {
                name: "plate0,B1".into(),
                limits: Limits::new(0.2, 0.3),
            },
            &store,
            &mut sink,
        )
        .unwrap();
    service
        .handle_command(
            AppCommand::SetKLimits {
                name: "plate0,A1".into(),
                limits: Limits::new(0.1, 2.0),
            },
            &store,
            &mut sink,
        )
        .unwrap();

    let updated = Manifest::parse(b"\"plate0,A1\",0.35\n\"plate0,B1\",0.55\n").unwrap();
    let targets = updated.setpoints(service.bank().names());
    service
        .handle_command(AppCommand::ApplySetpoints(targets), &store, &mut sink)
        .unwrap();

    let bank = service.bank();
    assert_eq!(bank.get(0).unwrap().setpoint(), 0.35);
    assert_eq!(bank.get(1).unwrap().setpoint(), 0.55);
    assert_eq!(bank.get(1).unwrap().output_limits(), Limits::new(0.2, 0.3));
    assert_eq!(bank.get(0).unwrap().strategy().k_limits(), Limits::new(0.1, 2.0));
    assert_eq!(
        sink.count(|e| matches!(e, AppEvent::SetpointChanged { .. })),
        2
    );

    let mut hw = MockHardware::new(2, 0.3);
    service.tick(&mut hw, &mut sink).unwrap();
    assert!((0.2..=0.3).contains(&hw.fractions(1)[0]));
}

#[test]
fn checkpoint_and_restore_across_service_instances() {
    let dir = TempDir::new().unwrap();
    let store = FsHistoryStore::new(dir.path());
    let mut sink = RecordingSink::new();

    let (mut first, _) = make_service(3);
    let mut hw = MockHardware::new(3, 0.25);
    for _ in 0..5 {
        first.tick(&mut hw, &mut sink).unwrap();
    }
    assert_eq!(first.checkpoint(&store, &mut sink).unwrap(), 3);

    let (mut second, _) = make_service(4);
    sink.clear();
    assert_eq!(second.restore(&store, &mut sink), 3);
    assert_eq!(
        sink.count(|e| matches!(e, AppEvent::HistoryRestored { steps: 5, .. })),
        3
    );
    assert_eq!(
        sink.events.last(),
        Some(&AppEvent::HistoryMissing {
            name: "plate0,D1".into()
        })
    );
    for ch in 0..3 {
        assert_eq!(
            second.bank().get(ch).unwrap().log(),
            first.bank().get(ch).unwrap().log()
        );
    }
}

#[test]
fn history_dir_that_is_a_file_is_reported_not_skipped() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("history");
    std::fs::write(&root, b"not a directory").unwrap();
    let store = FsHistoryStore::new(&root).with_max_attempts(Some(1));
    let (mut service, _) = make_service(2);
    let mut sink = RecordingSink::new();

    assert_eq!(service.restore(&store, &mut sink), 0);
    assert_eq!(sink.count(|e| matches!(e, AppEvent::HistoryMissing { .. })), 0);
    assert_eq!(sink.count(|e| matches!(e, AppEvent::RestoreFailed { .. })), 2);
    assert!(service.checkpoint(&store, &mut sink).is_err());
}

#[test]
fn simulated_rig_converges_on_every_vessel() {
    init_logs();
    let config = SystemConfig {
        vessel: turbctl::config::VesselConfig {
            volume_ul: 150.0,
            min_transfer_ul: 7.5,
            max_transfer_ul: 102.0,
        },
        ..SystemConfig::default()
    };
    let mut template = config.channel_config();
    template.setpoint = Some(0.45);
    template.initial_k = 0.45;

    let growth = [0.3, 0.5, 1.1, 1.3];
    let build = ControllerBank::build((0..growth.len()).map(|i| (i.to_string(), Ok(template.clone()))));
    let mut sink = RecordingSink::new();
    let mut service = CycleService::start(build, &config, &mut sink)
        .with_timing(StepTiming::Elapsed(config.cycle_secs));
    let vessels = growth.iter().map(|&k| SimVessel::new(0.3, k)).collect();
    let mut rig = SimRig::new(vessels, config.cycle_secs, NoiseModel::none(), 0);

    for _ in 0..150 {
        service.tick(&mut rig, &mut sink).unwrap();
    }
    for (c, k_true) in service.bank().iter().zip(growth) {
        assert!(
            (c.k_estimate() - k_true).abs() <= 0.1 * k_true,
            "{}: k {} vs {k_true}",
            c.name(),
            c.k_estimate()
        );
        // Readings are taken before dilution, so they sit on the setpoint.
        assert!(
            (c.last_known_od() - 0.45).abs() <= 0.045,
            "{}: od {}",
            c.name(),
            c.last_known_od()
        );
    }
}

#[test]
fn noisy_rig_keeps_every_command_in_bounds() {
    let config = SystemConfig::default();
    let limits = config.vessel.output_limits();
    let k_limits = config.controller.k_limits;
    let growth = staggered_growth(24);
    let bank = ControllerBank::uniform(24, &config.channel_config()).unwrap();
    let mut service =
        CycleService::new(bank, &config).with_timing(StepTiming::Elapsed(config.cycle_secs));
    let mut rig = SimRig::random_start(&growth, (0.0002, 0.5), config.cycle_secs, NoiseModel::default(), 42);
    let mut sink = RecordingSink::new();

    for _ in 0..100 {
        let report = service.tick(&mut rig, &mut sink).unwrap();
        assert!(report.outputs.iter().all(|&f| limits.contains(f)));
        assert!(report.k_estimates.iter().flatten().all(|&k| k_limits.contains(k)));
    }
}
