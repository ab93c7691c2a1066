//! Device round trips. Every test returns early when no adapter is present.

use handson_backend::pool::MAX_FREE_PER_SIZE;
use handson_backend::{
    grid_1d, BackendError, DeviceBuffer, DeviceSelector, GpuContext, Launch, Program,
};

fn context() -> Option<GpuContext> {
    let _ = env_logger::builder().is_test(true).try_init();
    match GpuContext::new(&DeviceSelector::default()) {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            eprintln!("skipping: {}", e);
            None
        }
    }
}

const DOUBLE_WGSL: &str = r#"
@group(0) @binding(0) var<storage, read_write> data: array<u32>;

@compute @workgroup_size(64)
fn double(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x < arrayLength(&data)) {
        data[gid.x] = data[gid.x] * 2u;
    }
}
"#;

#[test]
fn buffer_round_trip() {
    let Some(ctx) = context() else { return };
    let data: Vec<f32> = (0..1000).map(|i| i as f32 * 0.5).collect();
    let buf = DeviceBuffer::from_slice(&ctx, "round trip", &data);
    assert_eq!(buf.len(), 1000);
    assert_eq!(buf.read(&ctx).unwrap(), data);

    let other: Vec<f32> = vec![3.0; 1000];
    buf.write(&ctx, &other).unwrap();
    assert_eq!(buf.read(&ctx).unwrap(), other);

    let too_long = vec![0.0f32; 1001];
    assert!(matches!(
        buf.write(&ctx, &too_long),
        Err(BackendError::InvalidLaunch(_))
    ));
}

#[test]
fn pooled_buffers_are_reused() {
    let Some(ctx) = context() else { return };
    let size = {
        let buf = DeviceBuffer::<u32>::empty(&ctx, 256);
        buf.size_in_bytes()
    };
    assert_eq!(ctx.pool.available(size), 1);
    let _again = DeviceBuffer::<u32>::empty(&ctx, 256);
    assert_eq!(ctx.pool.available(size), 0);
}

#[test]
fn pool_keeps_a_bounded_number_per_size() {
    let Some(ctx) = context() else { return };
    let len = 1000;
    let held: Vec<_> = (0..MAX_FREE_PER_SIZE + 2)
        .map(|_| DeviceBuffer::<f32>::empty(&ctx, len))
        .collect();
    let size = held[0].size_in_bytes();
    drop(held);

    assert_eq!(ctx.pool.available(size), MAX_FREE_PER_SIZE);
    let stats = ctx.pool.stats();
    assert!(stats.bytes >= size * MAX_FREE_PER_SIZE as u64);

    ctx.pool.clear();
    assert_eq!(ctx.pool.available(size), 0);
    assert_eq!(ctx.pool.stats().buffers, 0);
}

#[test]
fn kernel_runs_in_place() {
    let Some(ctx) = context() else { return };
    let program = Program::build(&ctx, "double", DOUBLE_WGSL).unwrap();
    let kernel = program.kernel(&ctx, "double").unwrap();

    let data: Vec<u32> = (0..100).collect();
    let buf = DeviceBuffer::from_slice(&ctx, "data", &data);
    let bind_group = kernel.bind(&ctx, &[buf.buffer()]);
    let (x, y) = grid_1d(100, 64, ctx.limits().max_compute_workgroups_per_dimension);
    assert_eq!((x, y), (2, 1));

    // Two launches in one submission: every value is multiplied by four.
    ctx.enqueue(&[
        Launch::new(&kernel, &bind_group, (x, y, 1)),
        Launch::new(&kernel, &bind_group, (x, y, 1)),
    ]);
    let out = buf.read(&ctx).unwrap();
    assert_eq!(out, data.iter().map(|v| v * 4).collect::<Vec<_>>());
}

#[test]
fn bad_wgsl_reports_build_log() {
    let Some(ctx) = context() else { return };
    match Program::build(&ctx, "broken", "fn oops( {") {
        Err(BackendError::KernelBuild { label, log }) => {
            assert_eq!(label, "broken");
            assert!(!log.is_empty());
        }
        other => panic!("expected a build error, got {:?}", other.map(|p| p.label().to_string())),
    }
}

#[test]
fn out_of_range_device_index() {
    let _ = env_logger::builder().is_test(true).try_init();
    let selector = DeviceSelector::default().with_index(Some(usize::MAX));
    match GpuContext::new(&selector) {
        Err(BackendError::DeviceIndexOutOfRange { index, .. }) => assert_eq!(index, usize::MAX),
        Err(e) => panic!("unexpected error {}", e),
        Ok(_) => panic!("index {} cannot exist", usize::MAX),
    }
}
