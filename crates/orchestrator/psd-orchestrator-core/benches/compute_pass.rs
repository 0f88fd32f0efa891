use criterion::{black_box, criterion_group, criterion_main, Criterion};
use psd_orchestrator::{CacheScope, PsdEngine, SimpleHost};
use psd_test_fixtures::configs;
use psd_weights_core::SimpleRig;

fn arm_host(owners: usize) -> SimpleHost {
    let mut host = SimpleHost::new();
    for i in 0..owners {
        host = host.with_rig(
            SimpleRig::new(format!("Rig{i}"))
                .with_joint("Upper", None, [0.0, 0.0, 0.0])
                .with_joint("Lower", Some("Upper"), [0.0, 1.0, 0.0])
                .with_joint("Hand", Some("Lower"), [0.0, 1.0, 0.0])
                .with_joint("Chin", None, [0.1, 2.0, 0.0]),
        );
    }
    host
}

fn arm_engine(owners: usize) -> PsdEngine {
    let path = configs::path("arm-rig").expect("arm-rig fixture");
    let mut engine = PsdEngine::default();
    for i in 0..owners {
        let id = engine.register_owner(format!("Rig{i}")).expect("owner");
        engine.import_config(id, &path).expect("import");
    }
    engine
}

fn bench_compute_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute_pass");
    for owners in [1usize, 16] {
        let mut engine = arm_engine(owners);
        let mut host = arm_host(owners);
        group.bench_function(format!("cold/{owners}"), |b| {
            b.iter(|| {
                engine.invalidate_cache(CacheScope::All);
                black_box(engine.compute_pass(&mut host));
            })
        });
        group.bench_function(format!("unchanged/{owners}"), |b| {
            b.iter(|| black_box(engine.compute_pass(&mut host)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compute_pass);
criterion_main!(benches);
