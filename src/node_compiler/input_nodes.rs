//! Compilers for constants, parameters and built-in inputs.

use super::{NodeRef, select_output};
use crate::translator::{Code, MaterialCompiler};

pub fn compile_constant(node: &NodeRef<'_>, compiler: &mut dyn MaterialCompiler) -> Code {
    compiler.constant(node.f32_param("value", 0.0))
}

/// Constant2Vector, Constant3Vector and Constant4Vector. Components come from params r, g, b, a.
pub fn compile_constant_vector(node: &NodeRef<'_>, compiler: &mut dyn MaterialCompiler) -> Code {
    let [r, g, b, a] = ["r", "g", "b", "a"].map(|c| node.f32_param(c, 0.0));
    match node.node.node_type.as_str() {
        "Constant2Vector" => compiler.constant2(r, g),
        "Constant3Vector" => compiler.constant3(r, g, b),
        _ => compiler.constant4(r, g, b, a),
    }
}

pub fn compile_scalar_parameter(node: &NodeRef<'_>, compiler: &mut dyn MaterialCompiler) -> Code {
    let name = node.str_param("name").unwrap_or_default();
    compiler.scalar_parameter(name, node.f32_param("default", 0.0))
}

/// Outputs rgba, rgb, r, g, b and a all come from one parameter slot.
pub fn compile_vector_parameter(
    node: &NodeRef<'_>,
    output: &str,
    compiler: &mut dyn MaterialCompiler,
) -> Code {
    if output != "rgba" {
        let rgba = node.sibling_output("rgba", compiler);
        return select_output(compiler, rgba, output);
    }
    let name = node.str_param("name").unwrap_or_default();
    compiler.vector_parameter(name, node.vec4_param("default"))
}

pub fn compile_texture_coordinate(node: &NodeRef<'_>, compiler: &mut dyn MaterialCompiler) -> Code {
    compiler.texture_coordinate(
        node.u32_param("index", 0),
        node.f32_param("uTiling", 1.0),
        node.f32_param("vTiling", 1.0),
    )
}

pub fn compile_vertex_color(node: &NodeRef<'_>, output: &str, compiler: &mut dyn MaterialCompiler) -> Code {
    if output != "rgba" {
        let rgba = node.sibling_output("rgba", compiler);
        return select_output(compiler, rgba, output);
    }
    compiler.vertex_color()
}

/// Game or real time. A positive `period` wraps the value into `[0, period)`.
pub fn compile_time(node: &NodeRef<'_>, compiler: &mut dyn MaterialCompiler) -> Code {
    let time = if node.bool_param("realTime", false) {
        compiler.real_time()
    } else {
        compiler.game_time()
    };
    let period = node.f32_param("period", 0.0);
    if period <= 0.0 {
        return time;
    }
    let period = compiler.constant(period);
    let wrapped = compiler.fmod(time, period);
    compiler.periodic_hint(wrapped)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::super::test_utils::*;
    use crate::types::{MaterialProperty, ShaderFrequency};
    use crate::uniform::UniformExpression;

    #[test]
    fn vector_parameter_outputs_share_one_slot() {
        let graph = test_graph(
            vec![
                test_node("tint", "VectorParameter", json!({ "name": "Tint", "default": [1.0, 0.5, 0.25, 1.0] })),
                test_node("add", "Add", json!({})),
            ],
            vec![
                test_connection("tint", "r", "add", "a"),
                test_connection("tint", "a", "add", "b"),
            ],
            vec![(MaterialProperty::Opacity, "add", "result")],
        );
        let out = translate(graph);
        assert!(out.succeeded(), "{:?}", out.diagnostics);
        let pixel = out.uniform_expression_set.stage(ShaderFrequency::Pixel);
        assert_eq!(pixel.vectors.len(), 1);
        assert!(pixel.scalars.is_empty());
    }

    #[test]
    fn periodic_time_folds_into_a_uniform() {
        let graph = test_graph(
            vec![test_node("t", "Time", json!({ "period": 4.0 }))],
            vec![],
            vec![(MaterialProperty::Opacity, "t", "value")],
        );
        let out = translate(graph);
        assert!(out.succeeded(), "{:?}", out.diagnostics);
        let pixel = out.uniform_expression_set.stage(ShaderFrequency::Pixel);
        assert_eq!(pixel.scalars.len(), 1);
        assert!(matches!(*pixel.scalars[0], UniformExpression::Periodic { .. }));
    }

    #[test]
    fn constant_vector_uses_scheme_sized_literal() {
        let graph = test_graph(
            vec![test_node("c", "Constant2Vector", json!({ "r": 0.5, "g": 2.0 }))],
            vec![],
            vec![(MaterialProperty::Distortion, "c", "value")],
        );
        let out = translate(graph);
        let text = out.shader_text.unwrap();
        assert!(text.contains("vec2f(0.5, 2.0)"), "{text}");
    }
}
