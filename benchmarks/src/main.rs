//! handson GPU Performance Benchmarks
//!
//! MFLOPS for every matrix-multiply kernel and end-to-end vector add
//! throughput on the selected device.
//! Run with: cargo run -p handson-benchmarks --release

use std::time::Instant;

use handson::config::MatmulConfig;
use handson::matmul::{MatmulSession, MatmulVariant};
use handson::matrix::mflops;
use handson::vadd::{add_vectors, random_vector};
use handson::{open_context, LabResult};
use handson_backend::{DeviceSelector, GpuContext};

const WARMUP_ITERS: usize = 2;
const BENCH_ITERS: usize = 10;

fn main() {
    env_logger::init();

    println!("======================================================================");
    println!("                  HANDSON - GPU BENCHMARKS                            ");
    println!("======================================================================");
    println!();

    let ctx = match open_context(&DeviceSelector::from_env()) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("[ERROR] {}", e);
            std::process::exit(1);
        }
    };
    println!("[GPU] Information:");
    println!("{}", ctx.device_info());

    println!();
    println!("[BENCH] Running benchmarks...");
    println!();
    println!("----------------------------------------------------------------------");

    for order in [256, 512, 1024] {
        if let Err(e) = bench_matmul(&ctx, order) {
            println!("  MatMul order {:>4}: skipped ({})", order, e);
        }
    }

    println!("----------------------------------------------------------------------");

    for (len, label) in [(1 << 20, "1M"), (1 << 24, "16M")] {
        if let Err(e) = bench_vadd(&ctx, len, label) {
            println!("  Vadd [{:>4}]: skipped ({})", label, e);
        }
    }

    println!();
    println!("======================================================================");
    println!("                     BENCHMARK COMPLETE                               ");
    println!("======================================================================");
    println!();
}

fn bench_matmul(ctx: &GpuContext, order: usize) -> LabResult<()> {
    let session = MatmulSession::new(ctx, order)?;
    let cfg = MatmulConfig {
        order,
        count: WARMUP_ITERS + BENCH_ITERS,
        ..MatmulConfig::default()
    };

    for variant in MatmulVariant::ALL {
        if variant == MatmulVariant::Sequential {
            continue;
        }
        let results = match session.run(variant, &cfg) {
            Ok(results) => results,
            Err(e) => {
                println!("  MatMul {:<15} [{:>4}]: skipped ({})", variant, order, e);
                continue;
            }
        };
        let timed = &results[WARMUP_ITERS..];
        let total: std::time::Duration = timed.iter().map(|r| r.run_time).sum();
        let avg = total / timed.len() as u32;
        let ok = timed.iter().all(|r| r.is_ok());

        println!(
            "  MatMul {:<15} [{:>4}]:  {:>8.3} ms  |  {:>10.1} MFLOPS{}",
            variant,
            order,
            avg.as_secs_f64() * 1000.0,
            mflops(order, avg),
            if ok { "" } else { "  (WRONG RESULT)" }
        );
    }
    Ok(())
}

fn bench_vadd(ctx: &GpuContext, len: usize, label: &str) -> LabResult<()> {
    let a = random_vector(len);
    let b = random_vector(len);

    for _ in 0..WARMUP_ITERS {
        add_vectors(ctx, &a, &b)?;
    }

    let start = Instant::now();
    for _ in 0..BENCH_ITERS {
        add_vectors(ctx, &a, &b)?;
    }
    let avg_ms = start.elapsed().as_secs_f64() * 1000.0 / BENCH_ITERS as f64;

    // 2 reads + 1 write, including host transfers
    let bytes = 3.0 * len as f64 * 4.0;
    let gb_s = bytes / (avg_ms / 1000.0) / 1e9;

    println!(
        "  Vadd [{:>4} elements]:    {:>8.3} ms  |  {:>8.2} GB/s",
        label, avg_ms, gb_s
    );
    Ok(())
}
