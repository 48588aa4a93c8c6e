//! WGSL module layout: resource declarations, per-property material functions and the entry points
//! that call them.

use std::fmt::Write as _;

use crate::types::{BlendMode, MaterialProperty, MaterialSettings, ShaderFrequency, ValueType};
use crate::uniform::UniformExpressionSet;

use super::utils::{comment_safe, fmt_f32};

/// Bind group 0 holds the view uniforms followed by one uniform block per stage.
const VIEW_BINDING: u32 = 0;
/// Textures and samplers live in bind group 1.
const TEXTURE_GROUP: u32 = 1;

pub fn scalar_uniform_access(frequency: ShaderFrequency, slot: usize) -> String {
    let lane = ['x', 'y', 'z', 'w'][slot % 4];
    format!("{}_uniforms.scalars[{}].{lane}", frequency.name(), slot / 4)
}

pub fn vector_uniform_access(frequency: ShaderFrequency, slot: usize, ty: ValueType) -> String {
    let mask = match ty {
        ValueType::Float1 => ".r",
        ValueType::Float2 => ".rg",
        ValueType::Float3 => ".rgb",
        _ => "",
    };
    format!("{}_uniforms.vectors[{slot}]{mask}", frequency.name())
}

pub fn texture_2d_binding(frequency: ShaderFrequency, slot: usize) -> String {
    format!("{}_texture_2d_{slot}", frequency.name())
}

pub fn texture_cube_binding(slot: usize) -> String {
    format!("texture_cube_{slot}")
}

pub fn sampler_name(texture_binding: &str) -> String {
    format!("{texture_binding}_sampler")
}

fn uniform_struct_name(frequency: ShaderFrequency) -> &'static str {
    match frequency {
        ShaderFrequency::Vertex => "VertexUniforms",
        ShaderFrequency::Hull => "HullUniforms",
        ShaderFrequency::Domain => "DomainUniforms",
        ShaderFrequency::Pixel => "PixelUniforms",
    }
}

/// Body of one generated property function.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PropertyCode {
    /// `(symbol, type, definition)` for every temporary, in dependency order.
    pub locals: Vec<(String, ValueType, String)>,
    pub result: String,
}

const VIEW_DECLARATIONS: &str = r#"struct ViewUniforms {
    world_to_clip: mat4x4f,
    local_to_world: mat4x4f,
    world_to_local: mat4x4f,
    world_to_view: mat4x4f,
    view_to_world: mat4x4f,
    camera_position: vec4f,
    // x: game time, y: real time
    time: vec4f,
}
"#;

const MATERIAL_PARAMETERS: &str = r#"
struct MaterialParameters {
    world_position: vec3f,
    world_normal: vec3f,
    tangent_to_world: mat3x3f,
    uv0: vec2f,
    uv1: vec2f,
    vertex_color: vec4f,
}

struct VertexInput {
    @location(0) position: vec3f,
    @location(1) normal: vec3f,
    @location(2) uv0: vec2f,
    @location(3) uv1: vec2f,
    @location(4) color: vec4f,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4f,
    @location(0) world_position: vec3f,
    @location(1) world_normal: vec3f,
    @location(2) uv0: vec2f,
    @location(3) uv1: vec2f,
    @location(4) vertex_color: vec4f,
}

fn tangent_basis(n: vec3f) -> mat3x3f {
    var up = vec3f(0.0, 1.0, 0.0);
    if (abs(n.y) > 0.999) {
        up = vec3f(1.0, 0.0, 0.0);
    }
    let t = normalize(cross(up, n));
    let b = cross(n, t);
    return mat3x3f(t, b, n);
}
"#;

const VERTEX_ENTRY: &str = r#"
@vertex
fn vs_main(vin: VertexInput) -> VertexOutput {
    var p: MaterialParameters;
    p.world_position = (view.local_to_world * vec4f(vin.position, 1.0)).xyz;
    p.world_normal = normalize((view.local_to_world * vec4f(vin.normal, 0.0)).xyz);
    p.tangent_to_world = tangent_basis(p.world_normal);
    p.uv0 = vin.uv0;
    p.uv1 = vin.uv1;
    p.vertex_color = vin.color;

    let world_position = p.world_position + material_world_position_offset(p);

    var out: VertexOutput;
    out.clip_position = view.world_to_clip * vec4f(world_position, 1.0);
    out.world_position = world_position;
    out.world_normal = p.world_normal;
    out.uv0 = vin.uv0;
    out.uv1 = vin.uv1;
    out.vertex_color = vin.color;
    return out;
}
"#;

fn push_uniform_declarations(out: &mut String, set: &UniformExpressionSet) {
    let _ = writeln!(
        out,
        "@group(0) @binding({VIEW_BINDING}) var<uniform> view: ViewUniforms;"
    );
    for frequency in ShaderFrequency::ALL {
        let stage = set.stage(frequency);
        let registers = stage.scalar_register_count();
        if registers == 0 && stage.vectors.is_empty() {
            continue;
        }
        let name = uniform_struct_name(frequency);
        let _ = writeln!(out, "\nstruct {name} {{");
        if registers > 0 {
            let _ = writeln!(out, "    scalars: array<vec4f, {registers}>,");
        }
        if !stage.vectors.is_empty() {
            let _ = writeln!(out, "    vectors: array<vec4f, {}>,", stage.vectors.len());
        }
        out.push_str("}\n");
        let _ = writeln!(
            out,
            "@group(0) @binding({}) var<uniform> {}_uniforms: {name};",
            VIEW_BINDING + 1 + frequency.index() as u32,
            frequency.name()
        );
    }
}

fn push_texture_declarations(out: &mut String, set: &UniformExpressionSet) {
    let mut binding = 0u32;
    let mut declare = |out: &mut String, name: String, ty: &str, comment: String| {
        let _ = writeln!(out, "// {comment}");
        let _ = writeln!(
            out,
            "@group({TEXTURE_GROUP}) @binding({binding}) var {name}: {ty};"
        );
        let _ = writeln!(
            out,
            "@group({TEXTURE_GROUP}) @binding({}) var {}: sampler;",
            binding + 1,
            sampler_name(&name)
        );
        binding += 2;
    };

    let mut any = false;
    for frequency in ShaderFrequency::ALL {
        for (slot, expr) in set.stage(frequency).textures_2d.iter().enumerate() {
            if !any {
                out.push('\n');
                any = true;
            }
            declare(
                out,
                texture_2d_binding(frequency, slot),
                ValueType::Texture2D.wgsl(),
                comment_safe(&expr.describe()),
            );
        }
    }
    for (slot, expr) in set.cube_textures().iter().enumerate() {
        if !any {
            out.push('\n');
            any = true;
        }
        declare(
            out,
            texture_cube_binding(slot),
            ValueType::TextureCube.wgsl(),
            comment_safe(&expr.describe()),
        );
    }
}

fn push_property_function(out: &mut String, property: MaterialProperty, code: &PropertyCode) {
    let ty = property.output_type().wgsl();
    let _ = writeln!(
        out,
        "\nfn {}(p: MaterialParameters) -> {ty} {{",
        property.function_name()
    );
    for (symbol, local_ty, definition) in &code.locals {
        let _ = writeln!(out, "    let {symbol}: {} = {definition};", local_ty.wgsl());
    }
    let _ = writeln!(out, "    return {};", code.result);
    out.push_str("}\n");
}

fn push_fragment_entry(out: &mut String, settings: &MaterialSettings) {
    let front_facing = if settings.two_sided {
        ", @builtin(front_facing) front_facing: bool"
    } else {
        ""
    };
    let _ = writeln!(
        out,
        "\n@fragment\nfn fs_main(v: VertexOutput{front_facing}) -> @location(0) vec4f {{"
    );
    out.push_str(
        r#"    var p: MaterialParameters;
    p.world_position = v.world_position;
    p.world_normal = normalize(v.world_normal);
    p.tangent_to_world = tangent_basis(p.world_normal);
    p.uv0 = v.uv0;
    p.uv1 = v.uv1;
    p.vertex_color = v.vertex_color;
"#,
    );
    if settings.blend_mode == BlendMode::Masked {
        out.push_str("    let opacity_mask = material_opacity_mask(p);\n");
    }
    out.push_str("\n    var normal = normalize(p.tangent_to_world * material_normal(p));\n");
    if settings.two_sided {
        out.push_str("    if (!front_facing) {\n        normal = -normal;\n    }\n");
    }
    out.push_str(
        r#"    let light_dir = normalize(vec3f(0.3, 0.8, 0.5));
    let view_dir = normalize(view.camera_position.xyz - p.world_position);
    let half_dir = normalize(light_dir + view_dir);
    let n_dot_l = max(dot(normal, light_dir), 0.0);
    let n_dot_h = max(dot(normal, half_dir), 0.0);
    let diffuse = material_diffuse_color(p) * pow(n_dot_l, material_diffuse_power(p));
    let specular = material_specular_color(p) * pow(n_dot_h, max(material_specular_power(p), 1.0));
    let color = material_emissive_color(p) + diffuse + specular;
"#,
    );
    match settings.blend_mode {
        BlendMode::Opaque => out.push_str("    return vec4f(color, 1.0);\n"),
        BlendMode::Masked => {
            let _ = writeln!(
                out,
                "    if (opacity_mask < {}) {{\n        discard;\n    }}\n    return vec4f(color, 1.0);",
                fmt_f32(settings.opacity_mask_clip_value)
            );
        }
        BlendMode::Translucent | BlendMode::Additive => {
            out.push_str("    return vec4f(color, material_opacity(p));\n")
        }
    }
    out.push_str("}\n");
}

/// Assemble the full module. `properties` is indexed by [`MaterialProperty::index`].
pub fn assemble(
    friendly_name: &str,
    settings: &MaterialSettings,
    set: &UniformExpressionSet,
    properties: &[PropertyCode],
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "// Material: {}", comment_safe(friendly_name));
    let _ = writeln!(out, "// Uniforms: {}\n", comment_safe(&set.summary()));
    out.push_str(VIEW_DECLARATIONS);
    push_uniform_declarations(&mut out, set);
    push_texture_declarations(&mut out, set);
    out.push_str(MATERIAL_PARAMETERS);
    for property in MaterialProperty::ALL {
        if let Some(code) = properties.get(property.index()) {
            push_property_function(&mut out, property, code);
        }
    }
    out.push_str(VERTEX_ENTRY);
    push_fragment_entry(&mut out, settings);
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::uniform::UniformExpression;

    #[test]
    fn scalar_slots_pack_into_lanes() {
        assert_eq!(scalar_uniform_access(ShaderFrequency::Pixel, 0), "pixel_uniforms.scalars[0].x");
        assert_eq!(scalar_uniform_access(ShaderFrequency::Pixel, 5), "pixel_uniforms.scalars[1].y");
        assert_eq!(
            vector_uniform_access(ShaderFrequency::Vertex, 2, ValueType::Float3),
            "vertex_uniforms.vectors[2].rgb"
        );
        assert_eq!(
            vector_uniform_access(ShaderFrequency::Pixel, 0, ValueType::Float4),
            "pixel_uniforms.vectors[0]"
        );
    }

    #[test]
    fn empty_stages_declare_no_block() {
        let mut set = UniformExpressionSet::new();
        set.add_scalar(
            ShaderFrequency::Pixel,
            &Arc::new(UniformExpression::ScalarParameter {
                name: "Dissolve".to_string(),
                default_value: 1.0,
            }),
        );
        let mut out = String::new();
        push_uniform_declarations(&mut out, &set);
        assert!(out.contains("struct PixelUniforms {\n    scalars: array<vec4f, 1>,\n}"));
        assert!(out.contains("@group(0) @binding(4) var<uniform> pixel_uniforms: PixelUniforms;"));
        assert!(!out.contains("VertexUniforms"));
    }

    #[test]
    fn masked_materials_discard_below_clip() {
        let settings = MaterialSettings {
            blend_mode: BlendMode::Masked,
            opacity_mask_clip_value: 0.5,
            ..Default::default()
        };
        let mut out = String::new();
        push_fragment_entry(&mut out, &settings);
        assert!(out.contains("if (opacity_mask < 0.5) {\n        discard;\n    }"));
        assert!(out.contains("let opacity_mask = material_opacity_mask(p);"));
    }
}
