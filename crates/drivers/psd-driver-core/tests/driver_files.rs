use hashbrown::HashMap;
use psd_api_core::ResultKey;
use psd_driver_core::{
    ConstraintTable, DriverLoadError, ExprError, MeshTable, PoseDriver, PoseTarget, ShapeDriver,
    ShapeKeySlot,
};
use psd_test_fixtures::{pose_drivers, shape_drivers};

fn store(pairs: &[(&str, f64)]) -> HashMap<ResultKey, f64> {
    pairs
        .iter()
        .map(|(k, v)| (ResultKey::parse(k).unwrap(), *v))
        .collect()
}

fn approx(a: f64, b: f64) {
    assert!((a - b).abs() < 1e-9, "left={a} right={b}");
}

fn meshes() -> MeshTable {
    MeshTable::new()
        .with_mesh(
            "Body",
            vec![
                ShapeKeySlot::new("Basis"),
                ShapeKeySlot::new("Smile"),
                ShapeKeySlot::new("Frown"),
            ],
        )
        .with_mesh(
            "Sleeve",
            vec![ShapeKeySlot::new("Basis"), ShapeKeySlot::new("Bulge")],
        )
}

#[test]
fn later_files_replace_earlier_entries() {
    let paths = [
        shape_drivers::path("arm-body").unwrap(),
        shape_drivers::path("arm-body-override").unwrap(),
    ];
    let (mut driver, report) = ShapeDriver::load_files(&paths);
    assert!(report.is_clean(), "{:?}", report.errors);
    assert_eq!(report.files, 2);
    assert_eq!(report.loaded, 4);
    let names: Vec<_> = driver.entries().keys().cloned().collect();
    assert_eq!(names, vec!["Smile", "Frown", "Bulge"]);

    let mut host = meshes();
    let weights = store(&[
        ("psd_rot_Lower_bend", 0.4),
        ("psd_loc_Chin_touch_w", 0.5),
        ("psd_sca_Hand_puff", 0.25),
    ]);
    let r = driver.process(&weights, &mut host);
    assert_eq!(r.recalculated, 3);
    assert_eq!(r.batch_writes, 2);
    approx(host.value("Body", "Smile").unwrap(), 0.5);
    approx(host.value("Body", "Frown").unwrap(), 0.1);
    approx(host.value("Sleeve", "Bulge").unwrap(), 0.25);
}

#[test]
fn broken_entries_are_reported_individually() {
    let (mut driver, report) = ShapeDriver::load_files(&[shape_drivers::path("broken").unwrap()]);
    assert_eq!(report.loaded, 1);
    assert_eq!(report.errors.len(), 3);
    assert!(report.errors.iter().any(|e| matches!(
        e,
        DriverLoadError::Expression { target, source: ExprError::UnexpectedEnd { .. } } if target == "BadSyntax"
    )));
    assert!(report.errors.iter().any(|e| matches!(
        e,
        DriverLoadError::Expression { source: ExprError::UnknownFunction(name), .. } if name == "__import__"
    )));
    assert!(report
        .errors
        .iter()
        .any(|e| matches!(e, DriverLoadError::DataPath { target, .. } if target == "BadPath")));

    let mut host = MeshTable::new().with_mesh(
        "Body",
        vec![ShapeKeySlot::new("Basis"), ShapeKeySlot::new("Good")],
    );
    driver.process(&store(&[("psd_rot_Lower_bend", 0.7)]), &mut host);
    approx(host.value("Body", "Good").unwrap(), 0.7);
}

#[test]
fn missing_file_is_an_io_error() {
    let (driver, report) = ShapeDriver::load_files(&["/nonexistent/drivers.json"]);
    assert!(driver.is_empty());
    assert!(matches!(report.errors[..], [DriverLoadError::Io { .. }]));
}

#[test]
fn pose_fixture_respects_skeleton_name() {
    let json = pose_drivers::json("arm-hand").unwrap();
    let mut driver = PoseDriver::new();
    let report = driver.merge_json(&json, "arm-hand");
    assert_eq!(report.loaded, 3);

    let mut host = ConstraintTable::new("Rig")
        .with_constraint("Hand", "Damped Track", &[("influence", 0.0)])
        .with_constraint("Hand", "Copy Rotation", &[("influence", 0.25)]);
    let r = driver.process(&store(&[("psd_loc_Hand_reach", 0.75)]), &mut host);
    // Ghost joint is absent, Copy Rotation belongs to another skeleton
    assert_eq!(r.recalculated, 1);
    assert_eq!(r.applied, 1);
    approx(
        host.constraint("Hand", "Damped Track").unwrap().properties["influence"],
        1.5,
    );
    approx(
        host.constraint("Hand", "Copy Rotation").unwrap().properties["influence"],
        0.25,
    );
    approx(
        driver
            .value(&PoseTarget::new("Hand", "Damped Track", "influence"))
            .unwrap(),
        1.5,
    );
}
