//! Matrix multiply kernel comparison
//!
//! Element-per-work-item against the tiled kernel at a few orders.
//!
//! Run with: cargo bench --bench matmul_variants

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use handson::config::MatmulConfig;
use handson::matmul::{MatmulSession, MatmulVariant};
use handson_backend::{DeviceSelector, GpuContext};
use std::time::Duration;

fn bench_matmul_variants(c: &mut Criterion) {
    let ctx = match GpuContext::new(&DeviceSelector::from_env()) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("skipping matmul benchmarks: {}", e);
            return;
        }
    };

    let mut group = c.benchmark_group("matmul_variants");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(10);

    for order in [256usize, 512] {
        let session = match MatmulSession::new(&ctx, order) {
            Ok(session) => session,
            Err(e) => {
                eprintln!("skipping order {}: {}", order, e);
                continue;
            }
        };
        let cfg = MatmulConfig {
            order,
            ..MatmulConfig::default()
        };
        group.throughput(Throughput::Elements(2 * (order as u64).pow(3)));

        for variant in [MatmulVariant::Element, MatmulVariant::Blocked] {
            group.bench_with_input(BenchmarkId::new(variant.name(), order), &order, |b, _| {
                b.iter(|| session.run(variant, &cfg))
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_matmul_variants);
criterion_main!(benches);
