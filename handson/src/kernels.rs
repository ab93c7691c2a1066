//! Device kernels (WGSL)
//!
//! Kernels whose shapes must be known at compile time (work-group sizes,
//! work-group arrays, private arrays) are templates: `{{NAME}}` tokens are
//! substituted by [`render`] before the program is built.

/// Work-group size of the element-wise kernels.
pub const VADD_WORKGROUP: u32 = 64;

/// Substitutes every `{{KEY}}` in `template`.
pub fn render(template: &str, values: &[(&str, u32)]) -> String {
    let mut source = template.to_string();
    for (key, value) in values {
        source = source.replace(&format!("{{{{{}}}}}", key), &value.to_string());
    }
    source
}

// ============================================================================
// VECTOR ADDITION
// ============================================================================

pub const VADD_WGSL: &str = r#"
@group(0) @binding(0) var<storage, read> a: array<f32>;
@group(0) @binding(1) var<storage, read> b: array<f32>;
@group(0) @binding(2) var<storage, read_write> c: array<f32>;
@group(0) @binding(3) var<uniform> params: vec4<u32>; // count, -, -, -

@compute @workgroup_size(64)
fn vadd(@builtin(global_invocation_id) gid: vec3<u32>,
        @builtin(num_workgroups) nwg: vec3<u32>) {
    let i = gid.y * nwg.x * 64u + gid.x;
    if (i < params.x) {
        c[i] = a[i] + b[i];
    }
}
"#;

pub const VADD3_WGSL: &str = r#"
@group(0) @binding(0) var<storage, read> a: array<f32>;
@group(0) @binding(1) var<storage, read> b: array<f32>;
@group(0) @binding(2) var<storage, read> c: array<f32>;
@group(0) @binding(3) var<storage, read_write> r: array<f32>;
@group(0) @binding(4) var<uniform> params: vec4<u32>; // count, -, -, -

@compute @workgroup_size(64)
fn vadd(@builtin(global_invocation_id) gid: vec3<u32>,
        @builtin(num_workgroups) nwg: vec3<u32>) {
    let i = gid.y * nwg.x * 64u + gid.x;
    if (i < params.x) {
        r[i] = a[i] + b[i] + c[i];
    }
}
"#;

// ============================================================================
// MATRIX MULTIPLICATION  (C = A * B, square order n, row-major)
// ============================================================================

const MMUL_BINDINGS: &str = r#"
@group(0) @binding(0) var<storage, read> a: array<f32>;
@group(0) @binding(1) var<storage, read> b: array<f32>;
@group(0) @binding(2) var<storage, read_write> c: array<f32>;
@group(0) @binding(3) var<uniform> params: vec4<u32>; // n, -, -, -
"#;

/// One work-item per element of C.
pub const MMUL_ELEMENT_WGSL: &str = r#"
@compute @workgroup_size(16, 16)
fn mmul(@builtin(global_invocation_id) gid: vec3<u32>) {
    let n = params.x;
    let i = gid.y;
    let j = gid.x;
    if (i < n && j < n) {
        var tmp = 0.0;
        for (var k = 0u; k < n; k++) {
            tmp += a[i * n + k] * b[k * n + j];
        }
        c[i * n + j] = tmp;
    }
}
"#;

/// One work-item per row of C.
pub const MMUL_ROW_WGSL: &str = r#"
@compute @workgroup_size({{WG}})
fn mmul(@builtin(global_invocation_id) gid: vec3<u32>) {
    let n = params.x;
    let i = gid.x;
    if (i < n) {
        for (var j = 0u; j < n; j++) {
            var tmp = 0.0;
            for (var k = 0u; k < n; k++) {
                tmp += a[i * n + k] * b[k * n + j];
            }
            c[i * n + j] = tmp;
        }
    }
}
"#;

/// Row of C per work-item, row of A held in private memory.
pub const MMUL_ROW_PRIV_WGSL: &str = r#"
@compute @workgroup_size({{WG}})
fn mmul(@builtin(global_invocation_id) gid: vec3<u32>) {
    let n = params.x;
    let i = gid.x;
    if (i < n) {
        var awrk: array<f32, {{N}}>;
        for (var k = 0u; k < n; k++) {
            awrk[k] = a[i * n + k];
        }
        for (var j = 0u; j < n; j++) {
            var tmp = 0.0;
            for (var k = 0u; k < n; k++) {
                tmp += awrk[k] * b[k * n + j];
            }
            c[i * n + j] = tmp;
        }
    }
}
"#;

/// As the private-row kernel, with each column of B staged in work-group
/// memory by the whole group. Barriers sit outside the `in_range` branch.
pub const MMUL_ROW_PRIV_LOCAL_WGSL: &str = r#"
var<workgroup> bwrk: array<f32, {{N}}>;

@compute @workgroup_size({{WG}})
fn mmul(@builtin(global_invocation_id) gid: vec3<u32>,
        @builtin(local_invocation_id) lid: vec3<u32>) {
    let n = params.x;
    let i = gid.x;
    let in_range = i < n;
    var awrk: array<f32, {{N}}>;
    if (in_range) {
        for (var k = 0u; k < n; k++) {
            awrk[k] = a[i * n + k];
        }
    }
    for (var j = 0u; j < n; j++) {
        for (var k = lid.x; k < n; k += {{WG}}u) {
            bwrk[k] = b[k * n + j];
        }
        workgroupBarrier();
        if (in_range) {
            var tmp = 0.0;
            for (var k = 0u; k < n; k++) {
                tmp += awrk[k] * bwrk[k];
            }
            c[i * n + j] = tmp;
        }
        workgroupBarrier();
    }
}
"#;

/// Blocked product: each work-group computes a BS x BS block of C,
/// marching tiles of A and B through work-group memory.
pub const MMUL_BLOCKED_WGSL: &str = r#"
const BS: u32 = {{BS}}u;

var<workgroup> a_block: array<f32, {{BS2}}>;
var<workgroup> b_block: array<f32, {{BS2}}>;

@compute @workgroup_size({{BS}}, {{BS}})
fn mmul(@builtin(local_invocation_id) lid: vec3<u32>,
        @builtin(workgroup_id) wid: vec3<u32>) {
    let n = params.x;
    let row = wid.y * BS + lid.y;
    let col = wid.x * BS + lid.x;
    let tiles = (n + BS - 1u) / BS;

    var acc = 0.0;
    for (var t = 0u; t < tiles; t++) {
        let a_col = t * BS + lid.x;
        if (row < n && a_col < n) {
            a_block[lid.y * BS + lid.x] = a[row * n + a_col];
        } else {
            a_block[lid.y * BS + lid.x] = 0.0;
        }

        let b_row = t * BS + lid.y;
        if (b_row < n && col < n) {
            b_block[lid.y * BS + lid.x] = b[b_row * n + col];
        } else {
            b_block[lid.y * BS + lid.x] = 0.0;
        }

        workgroupBarrier();
        for (var k = 0u; k < BS; k++) {
            acc += a_block[lid.y * BS + k] * b_block[k * BS + lid.x];
        }
        workgroupBarrier();
    }

    if (row < n && col < n) {
        c[row * n + col] = acc;
    }
}
"#;

/// Full source for one of the matmul kernels.
pub fn mmul_source(kernel: &str) -> String {
    format!("{}{}", MMUL_BINDINGS, kernel)
}

// ============================================================================
// PI (midpoint rule for the integral of 4 / (1 + x^2) on [0, 1])
// ============================================================================

/// One partial sum per work-group. Groups are laid out on a 2-D grid when
/// there are more than one dimension allows; the surplus groups of the last
/// row compute but never store.
pub const PI_WGSL: &str = r#"
struct PiParams {
    niters: u32,
    step_size: f32,
    groups: u32,
    _pad: u32,
}

@group(0) @binding(0) var<storage, read_write> partial_sums: array<f32>;
@group(0) @binding(1) var<uniform> params: PiParams;

var<workgroup> local_sums: array<f32, {{WG}}>;

@compute @workgroup_size({{WG}})
fn pi(@builtin(local_invocation_id) lid: vec3<u32>,
      @builtin(workgroup_id) wid: vec3<u32>,
      @builtin(num_workgroups) nwg: vec3<u32>) {
    let niters = params.niters;
    let dx = params.step_size;
    let group_index = wid.y * nwg.x + wid.x;
    let first = (group_index * {{WG}}u + lid.x) * niters * {{WIDTH}}u;

    var accum = 0.0;
{{BODY}}
    local_sums[lid.x] = accum;
    workgroupBarrier();

    if (lid.x == 0u && group_index < params.groups) {
        var sum = 0.0;
        for (var j = 0u; j < {{WG}}u; j++) {
            sum += local_sums[j];
        }
        partial_sums[group_index] = sum;
    }
}
"#;

pub const PI_BODY_SCALAR: &str = r#"
    for (var i = 0u; i < niters; i++) {
        let x = (f32(first + i) + 0.5) * dx;
        accum += 4.0 / (1.0 + x * x);
    }
"#;

pub const PI_BODY_VEC4: &str = r#"
    let lanes = vec4<f32>(0.5, 1.5, 2.5, 3.5);
    var acc = vec4<f32>(0.0);
    for (var i = 0u; i < niters; i++) {
        let x = (vec4<f32>(f32(first + i * 4u)) + lanes) * dx;
        acc += 4.0 / (1.0 + x * x);
    }
    accum = acc.x + acc.y + acc.z + acc.w;
"#;

// No vec8 in WGSL: two vec4 lanes side by side.
pub const PI_BODY_VEC8: &str = r#"
    let lanes_lo = vec4<f32>(0.5, 1.5, 2.5, 3.5);
    let lanes_hi = vec4<f32>(4.5, 5.5, 6.5, 7.5);
    var acc_lo = vec4<f32>(0.0);
    var acc_hi = vec4<f32>(0.0);
    for (var i = 0u; i < niters; i++) {
        let base = vec4<f32>(f32(first + i * 8u));
        let x_lo = (base + lanes_lo) * dx;
        let x_hi = (base + lanes_hi) * dx;
        acc_lo += 4.0 / (1.0 + x_lo * x_lo);
        acc_hi += 4.0 / (1.0 + x_hi * x_hi);
    }
    let acc = acc_lo + acc_hi;
    accum = acc.x + acc.y + acc.z + acc.w;
"#;

// ============================================================================
// GAME OF LIFE (torus, one generation per launch)
// ============================================================================

pub const LIFE_WGSL: &str = r#"
const BX: u32 = {{BX}}u;
const BY: u32 = {{BY}}u;
const TW: u32 = {{TW}}u; // BX + 2

@group(0) @binding(0) var<storage, read> tick: array<u32>;
@group(0) @binding(1) var<storage, read_write> tock: array<u32>;
@group(0) @binding(2) var<uniform> dims: vec4<u32>; // nx, ny, -, -

// Block of cells plus a one-cell halo on every side.
var<workgroup> tile: array<u32, {{TILE}}>;

@compute @workgroup_size({{BX}}, {{BY}})
fn accelerate_life(@builtin(global_invocation_id) gid: vec3<u32>,
                   @builtin(local_invocation_id) lid: vec3<u32>) {
    let nx = dims.x;
    let ny = dims.y;
    let x = gid.x;
    let y = gid.y;

    let x_l = (x + nx - 1u) % nx;
    let x_r = (x + 1u) % nx;
    let y_u = (y + ny - 1u) % ny;
    let y_d = (y + 1u) % ny;

    let tx = lid.x + 1u;
    let ty = lid.y + 1u;

    tile[ty * TW + tx] = tick[y * nx + x];

    if (lid.x == 0u) {
        tile[ty * TW] = tick[y * nx + x_l];
    }
    if (lid.x == BX - 1u) {
        tile[ty * TW + BX + 1u] = tick[y * nx + x_r];
    }
    if (lid.y == 0u) {
        tile[tx] = tick[y_u * nx + x];
    }
    if (lid.y == BY - 1u) {
        tile[(BY + 1u) * TW + tx] = tick[y_d * nx + x];
    }

    if (lid.x == 0u && lid.y == 0u) {
        tile[0] = tick[y_u * nx + x_l];
    }
    if (lid.x == BX - 1u && lid.y == 0u) {
        tile[BX + 1u] = tick[y_u * nx + x_r];
    }
    if (lid.x == 0u && lid.y == BY - 1u) {
        tile[(BY + 1u) * TW] = tick[y_d * nx + x_l];
    }
    if (lid.x == BX - 1u && lid.y == BY - 1u) {
        tile[(BY + 1u) * TW + BX + 1u] = tick[y_d * nx + x_r];
    }

    workgroupBarrier();

    let up = (ty - 1u) * TW;
    let mid = ty * TW;
    let down = (ty + 1u) * TW;
    let neighbours = tile[up + tx - 1u] + tile[up + tx] + tile[up + tx + 1u]
                   + tile[mid + tx - 1u] + tile[mid + tx + 1u]
                   + tile[down + tx - 1u] + tile[down + tx] + tile[down + tx + 1u];

    let alive = tile[mid + tx] == 1u;
    var next = 0u;
    if (neighbours == 3u || (alive && neighbours == 2u)) {
        next = 1u;
    }
    tock[y * nx + x] = next;
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_replaces_every_occurrence() {
        let src = render("a {{WG}} b {{WG}} c {{N}}", &[("WG", 64), ("N", 1024)]);
        assert_eq!(src, "a 64 b 64 c 1024");
    }

    #[test]
    fn rendered_templates_have_no_tokens_left() {
        let row = render(MMUL_ROW_PRIV_LOCAL_WGSL, &[("WG", 64), ("N", 128)]);
        assert!(!row.contains("{{"));
        let blocked = render(MMUL_BLOCKED_WGSL, &[("BS", 16), ("BS2", 256)]);
        assert!(!blocked.contains("{{"));
        let life = render(LIFE_WGSL, &[("BX", 8), ("BY", 8), ("TW", 10), ("TILE", 100)]);
        assert!(!life.contains("{{"));
    }

    fn assert_valid_wgsl(label: &str, source: &str) {
        let module = naga::front::wgsl::parse_str(source)
            .unwrap_or_else(|e| panic!("{} does not parse:\n{}", label, e.emit_to_string(source)));
        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        )
        .validate(&module)
        .unwrap_or_else(|e| panic!("{} does not validate: {:?}", label, e));
    }

    #[test]
    fn every_kernel_compiles_without_a_device() {
        assert_valid_wgsl("vadd", VADD_WGSL);
        assert_valid_wgsl("vadd3", VADD3_WGSL);

        let sizes = [("WG", 64), ("N", 100), ("BS", 16), ("BS2", 256)];
        for (label, kernel) in [
            ("element", MMUL_ELEMENT_WGSL),
            ("row", MMUL_ROW_WGSL),
            ("row private", MMUL_ROW_PRIV_WGSL),
            ("row private local", MMUL_ROW_PRIV_LOCAL_WGSL),
            ("blocked", MMUL_BLOCKED_WGSL),
        ] {
            assert_valid_wgsl(label, &render(&mmul_source(kernel), &sizes));
        }

        for (label, body, width) in [
            ("pi scalar", PI_BODY_SCALAR, 1),
            ("pi vec4", PI_BODY_VEC4, 4),
            ("pi vec8", PI_BODY_VEC8, 8),
        ] {
            let source = render(&PI_WGSL.replace("{{BODY}}", body), &[("WG", 256), ("WIDTH", width)]);
            assert_valid_wgsl(label, &source);
        }

        let life = render(LIFE_WGSL, &[("BX", 8), ("BY", 8), ("TW", 10), ("TILE", 100)]);
        assert_valid_wgsl("life", &life);
    }

    #[test]
    fn mmul_source_prepends_bindings() {
        let src = mmul_source(MMUL_ELEMENT_WGSL);
        assert!(src.starts_with(MMUL_BINDINGS));
        assert!(src.contains("fn mmul"));
    }
}
