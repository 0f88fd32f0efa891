use psd_driver_core::{ConstraintTable, MeshTable, ShapeKeySlot};
use psd_orchestrator::{EngineConfig, PsdEngine, ScheduleMode, SimpleHost};
use psd_test_fixtures::{configs, engines, pose_drivers, shape_drivers};
use psd_weights_core::SimpleRig;

fn approx(a: f64, b: f64, eps: f64) {
    assert!((a - b).abs() <= eps, "left={a} right={b} eps={eps}");
}

fn slots(names: &[&str]) -> Vec<ShapeKeySlot> {
    names.iter().map(|n| ShapeKeySlot::new(*n)).collect()
}

fn arm_host() -> SimpleHost {
    let rig = SimpleRig::new("Rig")
        .with_joint("Upper", None, [0.0, 0.0, 0.0])
        .with_joint("Lower", Some("Upper"), [0.0, 1.0, 0.0])
        .with_joint("Hand", Some("Lower"), [0.0, 1.0, 0.0])
        .with_joint("Chin", None, [0.1, 2.0, 0.0]);
    SimpleHost::new()
        .with_rig(rig)
        .with_meshes(
            MeshTable::new()
                .with_mesh("Body", slots(&["Basis", "Smile", "Frown"]))
                .with_mesh("Sleeve", slots(&["Basis", "Bulge"])),
        )
        .with_constraints(
            "Rig",
            ConstraintTable::new("Rig").with_constraint("Hand", "Damped Track", &[("influence", 0.0)]),
        )
}

fn engine_with_drivers() -> (PsdEngine, psd_orchestrator::OwnerId) {
    let mut engine = PsdEngine::default();
    let id = engine.register_owner("Rig").unwrap();
    engine
        .import_config(id, configs::path("arm-rig").unwrap())
        .unwrap();
    engine
        .add_shape_driver_file(id, shape_drivers::path("arm-body").unwrap())
        .unwrap();
    engine
        .add_pose_driver_file(id, pose_drivers::path("arm-hand").unwrap())
        .unwrap();
    (engine, id)
}

#[test]
fn weights_drive_shape_keys_and_constraints() {
    let (mut engine, id) = engine_with_drivers();
    let mut host = arm_host();
    host.rig_mut("Rig").unwrap().set_rotation("Lower", [45.0, 0.0, 0.0]);
    host.rig_mut("Rig").unwrap().set_location("Hand", [0.0, 0.1, 0.0]);

    let report = engine.compute_pass(&mut host);
    let owner = report.owner(id).unwrap();
    assert_eq!(owner.shape.batch_writes, 1);
    assert_eq!(owner.shape.applied, 2);
    assert_eq!(owner.pose.applied, 1);

    approx(host.meshes.value("Body", "Smile").unwrap(), 0.25, 1e-9);
    approx(host.meshes.value("Body", "Frown").unwrap(), 0.5, 1e-9);
    approx(host.meshes.value("Sleeve", "Bulge").unwrap(), 0.0, 1e-12);
    assert_eq!(host.meshes.batch_writes, 1);
    let track = host.constraints["Rig"]
        .constraint("Hand", "Damped Track")
        .unwrap();
    approx(track.properties["influence"], 1.0, 1e-9);

    // nothing moved: drivers neither recalculate nor write
    let report = engine.compute_pass(&mut host);
    let owner = report.owner(id).unwrap();
    assert_eq!(owner.shape.batch_writes, 0);
    assert_eq!(owner.pose.applied, 0);
    assert_eq!(host.meshes.batch_writes, 1);
}

#[test]
fn later_driver_file_overrides_earlier_targets() {
    let (mut engine, id) = engine_with_drivers();
    engine
        .add_shape_driver_file(id, shape_drivers::path("arm-body-override").unwrap())
        .unwrap();
    let report = engine.reload_drivers(id).unwrap();
    assert_eq!(report.files, 2);
    assert!(report.errors.is_empty());

    let mut host = arm_host();
    host.rig_mut("Rig").unwrap().set_rotation("Lower", [45.0, 0.0, 0.0]);
    engine.compute_pass(&mut host);
    approx(host.meshes.value("Body", "Frown").unwrap(), 0.125, 1e-9);
    approx(host.meshes.value("Body", "Smile").unwrap(), 0.25, 1e-9);
}

#[test]
fn removing_driver_files_stops_driving() {
    let (mut engine, id) = engine_with_drivers();
    let path = shape_drivers::path("arm-body").unwrap();
    assert!(engine.remove_shape_driver_file(id, &path).unwrap());
    assert!(!engine.remove_shape_driver_file(id, &path).unwrap());
    engine.clear_driver_files(id).unwrap();

    let mut host = arm_host();
    host.rig_mut("Rig").unwrap().set_rotation("Lower", [45.0, 0.0, 0.0]);
    let report = engine.compute_pass(&mut host);
    assert_eq!(report.owner(id).unwrap().shape.batch_writes, 0);
    assert_eq!(host.meshes.value("Body", "Frown"), Some(0.0));
}

#[test]
fn forced_timer_runs_at_the_idle_rate() {
    let config: EngineConfig = engines::load("write-through").unwrap();
    let mut engine = PsdEngine::new(EngineConfig {
        idle_hz: 10.0,
        ..config
    });
    engine.register_owner("Rig").unwrap();
    let mut host = arm_host();

    let subs = engine.start();
    assert!(!subs.frame_hook);
    approx(subs.timer_interval.unwrap(), 0.1, 1e-12);

    let first = engine.on_timer(0.0, &mut host);
    assert!(first.report.is_some());
    approx(first.reschedule.unwrap(), 0.1, 1e-12);
    assert!(engine.on_timer(0.05, &mut host).report.is_none());
    assert!(engine.on_timer(0.1, &mut host).report.is_some());
    assert!(engine.on_frame(0.5, &mut host).is_none());
    assert!(engine.on_graph_update(0.5, &mut host).is_none());

    assert_eq!(engine.stop().timer_interval, None);
    assert_eq!(engine.on_timer(1.0, &mut host).reschedule, None);
}

#[test]
fn auto_mode_follows_playback() {
    let mut engine = PsdEngine::default();
    engine.register_owner("Rig").unwrap();
    let mut host = arm_host();
    engine.start();

    // idle: the frame hook is throttled to the idle rate, graph updates are ignored
    assert!(engine.on_frame(0.0, &mut host).is_some());
    assert!(engine.on_frame(0.02, &mut host).is_none());
    assert!(engine.on_graph_update(0.5, &mut host).is_none());

    let subs = engine.on_playback_changed(true);
    assert_eq!(subs.timer_interval, None);
    assert!(engine.on_frame(0.03, &mut host).is_some());
    assert!(engine.on_graph_update(0.031, &mut host).is_some());
    assert_eq!(engine.on_timer(0.5, &mut host).reschedule, None);

    let subs = engine.set_mode(ScheduleMode::ForcePlayback);
    assert!(subs.graph_update_hook);
    assert_eq!(subs.timer_interval, None);
    engine.on_playback_changed(false);
    assert!(engine.on_graph_update(0.2, &mut host).is_some());
    assert!(engine.on_graph_update(0.25, &mut host).is_none());

    let subs = engine.set_idle_hz(1000.0);
    assert_eq!(engine.scheduler().idle_hz(), 240.0);
    assert_eq!(subs.timer_interval, None);
}
