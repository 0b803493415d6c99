use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fleet_core::geo::Viewport;
use fleet_core::live::LiveTracker;
use fleet_core::map_host::HeadlessMap;
use fleet_core::notice;
use fleet_core::types::{LatLng, VehicleSnapshot};
use fleet_core::EngineConfig;

const CENTER: LatLng = LatLng::new(12.97, 77.59);

fn make_batch(n: usize, t: i64) -> Vec<VehicleSnapshot> {
    (0..n)
        .map(|i| {
            let angle = i as f64 * std::f64::consts::TAU / n as f64;
            let r = 0.05 + 0.0005 * t as f64;
            let pos = LatLng::new(CENTER.lat + r * angle.sin(), CENTER.lng + r * angle.cos());
            VehicleSnapshot::new(format!("v{i}"), pos, t)
        })
        .collect()
}

fn bench_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile");

    for n in [100, 1000, 5000] {
        group.bench_function(format!("{n}_vehicles"), |b| {
            b.iter(|| {
                let (notifier, _rx) = notice::channel();
                let mut tracker = LiveTracker::new(EngineConfig::default(), notifier);
                let mut map = HeadlessMap::new(Viewport::new(CENTER, 12.0, 1920.0, 1080.0));
                // First batch creates the markers
                tracker.reconcile(make_batch(n, 0), &mut map);
                // Measure an update of an established fleet
                black_box(tracker.reconcile(make_batch(n, 1), &mut map));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_reconcile);
criterion_main!(benches);
