use psd_test_fixtures::configs;
use psd_weights_core::{
    export_document, merge_document, Axis, ConfigDocument, DirectChannel, Falloff,
    LocationChannel, PoseLibrary, RotationChannel,
};

fn arm_library() -> PoseLibrary {
    let doc = ConfigDocument::from_json_str(&configs::json("arm-rig").unwrap()).unwrap();
    let mut lib = PoseLibrary::new();
    let report = merge_document(&mut lib, &doc);
    assert_eq!(report.added, 8);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.triggers_added, 1);
    lib
}

#[test]
fn fixture_imports_typed_channels() {
    let lib = arm_library();
    assert_eq!(lib.filter.joints(), &["Lower".to_string(), "Hand".to_string()]);

    let record = lib.find("Lower", "record_X").unwrap();
    assert_eq!(record.direct, DirectChannel::EulerPassthrough { axis: Axis::X });
    assert_eq!(record.rotation, RotationChannel::None);

    let twist = lib.find("Lower", "twist").unwrap();
    assert!(matches!(
        twist.rotation,
        RotationChannel::SwingTwist {
            twist_axis: Axis::Y,
            ..
        }
    ));

    let cone = lib.find("Hand", "cone").unwrap();
    assert!(matches!(
        cone.rotation,
        RotationChannel::ConeFalloff { axis: Axis::X, angle_deg, .. } if angle_deg == 60.0
    ));

    let nudge = lib.find("Hand", "nudge").unwrap();
    assert!(matches!(nudge.location, LocationChannel::AxisFalloff { .. }));

    let lift = lib.find("Upper", "lift").unwrap();
    assert_eq!(lift.extra["note"], "authored by hand");

    let touch = &lib.triggers[0];
    assert_eq!(touch.source_joint, "Hand");
    assert_eq!(touch.target_joint, "Chin");
    assert_eq!(touch.falloff, Falloff::Linear);
    assert_eq!(touch.key().as_str(), "psd_loc_Chin_touch_w");
}

#[test]
fn export_then_import_preserves_library() {
    let lib = arm_library();
    let doc = export_document(&lib);
    assert_eq!(doc.saved_by_bone["Lower"].len(), 3);
    assert_eq!(doc.saved_by_bone["Hand"].len(), 4);
    assert_eq!(doc.orphan_saved_poses.len(), 1);

    let text = doc.to_json_string().unwrap();
    let reread = ConfigDocument::from_json_str(&text).unwrap();
    let mut fresh = PoseLibrary::new();
    merge_document(&mut fresh, &reread);
    assert_eq!(fresh.filter, lib.filter);
    assert_eq!(fresh.entries, lib.entries);
    assert_eq!(fresh.triggers, lib.triggers);
}

#[test]
fn second_import_skips_everything() {
    let mut lib = arm_library();
    let doc = export_document(&lib);
    let report = merge_document(&mut lib, &doc);
    assert_eq!(report.added, 0);
    assert_eq!(report.skipped, 8);
    assert_eq!(report.filters_added, 0);
    assert_eq!(report.triggers_skipped, 1);
    assert_eq!(lib.entries.len(), 8);
}

#[test]
fn legacy_file_without_direct_fields_loads() {
    let doc: ConfigDocument = configs::load("legacy-minimal").unwrap();
    let mut lib = PoseLibrary::new();
    let report = merge_document(&mut lib, &doc);
    assert!(report.added >= 1);
    assert!(lib.entries.iter().all(|e| e.direct == DirectChannel::None));
}

#[test]
fn direct_fields_are_written_on_export() {
    let lib = arm_library();
    let doc = export_document(&lib);
    let json: serde_json::Value = serde_json::from_str(&doc.to_json_string().unwrap()).unwrap();
    let record = json["saved_by_bone"]["Lower"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["name"] == "record_X")
        .unwrap();
    assert_eq!(record["is_direct_channel"], true);
    assert_eq!(record["channel_axis"], "X");
    assert_eq!(record["record_rot_channel_mode"], "NONE");
}
