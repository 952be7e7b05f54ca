/// WGSL program for the warp pass.
///
/// `params` = (time, warp scale k, grid size, unused). UVs have their origin
/// at the bottom-left; the image texture is stored top row first, hence the
/// flip on lookup.
pub const WARP_SHADER: &str = r#"
struct Uniforms {
    view_proj: mat4x4<f32>,
    params: vec4<f32>,
};

@group(0) @binding(0)
var<uniform> uniforms: Uniforms;
@group(0) @binding(1)
var image_tex: texture_2d<f32>;
@group(0) @binding(2)
var image_sampler: sampler;
@group(0) @binding(3)
var field_tex: texture_2d<f32>;

struct VertexInput {
    @location(0) position: vec2<f32>,
    @location(1) uv: vec2<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(vertex: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = uniforms.view_proj * vec4<f32>(vertex.position, 0.0, 1.0);
    out.uv = vertex.uv;
    return out;
}

fn field_at(uv: vec2<f32>) -> vec2<f32> {
    let dims = vec2<i32>(textureDimensions(field_tex));
    let cell = clamp(
        vec2<i32>(floor(uv * vec2<f32>(dims))),
        vec2<i32>(0, 0),
        dims - vec2<i32>(1, 1),
    );
    return textureLoad(field_tex, cell, 0).rg;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let offset = field_at(in.uv);
    let uv = in.uv - uniforms.params.y * offset;
    return textureSample(image_tex, image_sampler, vec2<f32>(uv.x, 1.0 - uv.y));
}
"#;

/// WGSL program for the static image blit.
pub const BLIT_SHADER: &str = r#"
struct Uniforms {
    view_proj: mat4x4<f32>,
    params: vec4<f32>,
};

@group(0) @binding(0)
var<uniform> uniforms: Uniforms;
@group(0) @binding(1)
var image_tex: texture_2d<f32>;
@group(0) @binding(2)
var image_sampler: sampler;

struct VertexInput {
    @location(0) position: vec2<f32>,
    @location(1) uv: vec2<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(vertex: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = uniforms.view_proj * vec4<f32>(vertex.position, 0.0, 1.0);
    out.uv = vertex.uv;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(image_tex, image_sampler, vec2<f32>(in.uv.x, 1.0 - in.uv.y));
}
"#;
