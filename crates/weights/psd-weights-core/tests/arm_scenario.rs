use std::f64::consts::FRAC_PI_4;

use psd_api_core::{ResultKey, ResultKind, WriteBatch};
use psd_test_fixtures::configs;
use psd_weights_core::{
    evaluate_entry, merge_document, trigger_weight, ConfigDocument, JointSampler, PoseLibrary,
    SimpleRig,
};

fn approx(a: f64, b: f64, eps: f64) {
    assert!((a - b).abs() <= eps, "left={a} right={b} eps={eps}");
}

fn rig() -> SimpleRig {
    SimpleRig::new("Rig")
        .with_joint("Upper", None, [0.0, 0.0, 0.0])
        .with_joint("Lower", Some("Upper"), [0.0, 1.0, 0.0])
        .with_joint("Hand", Some("Lower"), [0.0, 1.0, 0.0])
        .with_joint("Chin", None, [0.1, 2.0, 0.0])
}

fn library() -> PoseLibrary {
    let doc: ConfigDocument = configs::load("arm-rig").unwrap();
    let mut lib = PoseLibrary::new();
    merge_document(&mut lib, &doc);
    lib
}

fn run(rig: &SimpleRig, lib: &PoseLibrary) -> WriteBatch {
    let sampler = JointSampler::new(rig);
    let mut out = WriteBatch::new();
    for joint in lib.effective_joints() {
        let sample = sampler.sample(&joint).unwrap();
        for entry in lib.entries.iter().filter(|e| e.joint == joint) {
            evaluate_entry(entry, &sample, &mut out);
        }
    }
    out
}

fn key(kind: ResultKind, joint: &str, name: &str) -> ResultKey {
    ResultKey::for_entry(kind, joint, name)
}

#[test]
fn rest_pose_gives_zero_weights() {
    let out = run(&rig(), &library());
    // bend, record_X, twist, cone, reach, nudge, puff
    assert_eq!(out.len(), 7);
    for op in out.iter() {
        approx(op.value, 0.0, 1e-9);
    }
    // the orphan on Upper is outside the joint filter
    assert!(out.get(&key(ResultKind::Rotation, "Upper", "lift")).is_none());
}

#[test]
fn elbow_half_bend() {
    let mut rig = rig();
    rig.set_rotation("Lower", [45.0, 0.0, 0.0]);
    let out = run(&rig, &library());
    approx(out.get(&key(ResultKind::Rotation, "Lower", "bend")).unwrap(), 0.5, 1e-9);
    approx(
        out.get(&key(ResultKind::Rotation, "Lower", "record_X")).unwrap(),
        FRAC_PI_4,
        1e-9,
    );
    approx(out.get(&key(ResultKind::Rotation, "Lower", "twist")).unwrap(), 0.0, 1e-9);
    // the hand inherits the elbow's rotation but its local delta stays at rest
    approx(out.get(&key(ResultKind::Rotation, "Hand", "cone")).unwrap(), 0.0, 1e-9);
}

#[test]
fn hand_channels_halfway() {
    let mut rig = rig();
    rig.set_rotation("Hand", [0.0, 0.0, 60.0]);
    rig.set_location("Hand", [0.0, 0.1, 0.0]);
    rig.set_scale("Hand", [1.25, 1.25, 1.25]);
    let out = run(&rig, &library());
    approx(out.get(&key(ResultKind::Rotation, "Hand", "cone")).unwrap(), 0.5, 1e-9);
    approx(out.get(&key(ResultKind::Location, "Hand", "reach")).unwrap(), 0.5, 1e-9);
    approx(out.get(&key(ResultKind::Location, "Hand", "nudge")).unwrap(), 0.0, 1e-9);
    approx(out.get(&key(ResultKind::Scale, "Hand", "puff")).unwrap(), 0.5, 1e-9);
}

#[test]
fn twist_about_forearm() {
    let mut rig = rig();
    rig.set_rotation("Lower", [0.0, 30.0, 0.0]);
    let out = run(&rig, &library());
    approx(out.get(&key(ResultKind::Rotation, "Lower", "twist")).unwrap(), 0.5, 1e-9);
    approx(out.get(&key(ResultKind::Rotation, "Lower", "bend")).unwrap(), 0.0, 1e-9);
}

#[test]
fn touch_trigger_from_world_heads() {
    let lib = library();
    let rig = rig();
    let sampler = JointSampler::new(&rig);
    let t = &lib.triggers[0];
    let d = sampler.world_distance(&t.source_joint, &t.target_joint).unwrap();
    approx(d, 0.1, 1e-12);
    approx(trigger_weight(d, t.radius, t.falloff), 0.5, 1e-9);
}
