//! Compilers for arithmetic and math function nodes.

use std::f32::consts::TAU;

use super::NodeRef;
use crate::translator::{Code, MaterialCompiler};

/// Two-operand nodes with inputs `a` and `b`.
pub fn compile_binary(node: &NodeRef<'_>, compiler: &mut dyn MaterialCompiler) -> Code {
    let a = node.input("a", compiler);
    let b = node.input("b", compiler);
    match node.node.node_type.as_str() {
        "Add" => compiler.add(a, b),
        "Subtract" => compiler.sub(a, b),
        "Multiply" => compiler.mul(a, b),
        "Divide" => compiler.div(a, b),
        "Dot" => compiler.dot(a, b),
        "Cross" => compiler.cross(a, b),
        "Min" => compiler.min(a, b),
        "Max" => compiler.max(a, b),
        _ => compiler.fmod(a, b),
    }
}

pub fn compile_power(node: &NodeRef<'_>, compiler: &mut dyn MaterialCompiler) -> Code {
    let base = node.input("base", compiler);
    let exponent = node.input("exponent", compiler);
    compiler.power(base, exponent)
}

pub fn compile_lerp(node: &NodeRef<'_>, compiler: &mut dyn MaterialCompiler) -> Code {
    let a = node.input("a", compiler);
    let b = node.input("b", compiler);
    let alpha = node.input("alpha", compiler);
    compiler.lerp(a, b, alpha)
}

pub fn compile_clamp(node: &NodeRef<'_>, compiler: &mut dyn MaterialCompiler) -> Code {
    let value = node.input("value", compiler);
    let min = node.input("min", compiler);
    let max = node.input("max", compiler);
    compiler.clamp(value, min, max)
}

/// One-operand nodes with input `value`.
pub fn compile_unary(node: &NodeRef<'_>, compiler: &mut dyn MaterialCompiler) -> Code {
    let x = node.input("value", compiler);
    match node.node.node_type.as_str() {
        "Abs" => compiler.abs(x),
        "Floor" => compiler.floor(x),
        "Ceil" => compiler.ceil(x),
        "Frac" => compiler.frac(x),
        "SquareRoot" => compiler.square_root(x),
        "Length" => compiler.length(x),
        "Normalize" => compiler.normalize(x),
        _ => {
            let one = compiler.constant(1.0);
            compiler.sub(one, x)
        }
    }
}

/// Sine and Cosine. A positive `period` rescales the input so one period spans a full cycle.
pub fn compile_periodic(node: &NodeRef<'_>, compiler: &mut dyn MaterialCompiler) -> Code {
    let mut x = node.input("value", compiler);
    let period = node.f32_param("period", 1.0);
    if period > 0.0 {
        let scale = compiler.constant(TAU / period);
        x = compiler.mul(x, scale);
    }
    if node.node.node_type == "Sine" {
        compiler.sine(x)
    } else {
        compiler.cosine(x)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::super::test_utils::*;
    use crate::types::{MaterialProperty, ShaderFrequency};

    #[test]
    fn one_minus_of_a_parameter_stays_shader_arithmetic() {
        let graph = test_graph(
            vec![
                test_node("p", "ScalarParameter", json!({ "name": "Fade", "default": 0.25 })),
                test_node("inv", "OneMinus", json!({})),
            ],
            vec![test_connection("p", "value", "inv", "value")],
            vec![(MaterialProperty::Opacity, "inv", "result")],
        );
        let out = translate(graph);
        assert!(out.succeeded(), "{:?}", out.diagnostics);
        let text = out.shader_text.unwrap();
        assert!(text.contains("(1.0 - pixel_uniforms.scalars[0].x)"), "{text}");
        let pixel = out.uniform_expression_set.stage(ShaderFrequency::Pixel);
        assert_eq!(pixel.scalars.len(), 1);
    }

    #[test]
    fn missing_operand_is_reported_against_the_node() {
        let graph = test_graph(
            vec![
                test_node("c", "Constant", json!({ "value": 2.0 })),
                test_node("mul", "Multiply", json!({})),
            ],
            vec![test_connection("c", "value", "mul", "a")],
            vec![(MaterialProperty::Opacity, "mul", "result")],
        );
        let out = translate(graph);
        assert!(out.shader_text.is_none());
        assert_eq!(out.diagnostics.len(), 1);
        let d = &out.diagnostics[0];
        assert_eq!(d.error.to_string(), "Missing Multiply input b");
        assert_eq!(d.offending_node_id.as_deref(), Some("mul"));
    }

    #[test]
    fn constant_sine_folds_to_a_literal() {
        let graph = test_graph(
            vec![
                test_node("c", "Constant", json!({ "value": 0.0 })),
                test_node("s", "Cosine", json!({ "period": 1.0 })),
            ],
            vec![test_connection("c", "value", "s", "value")],
            vec![(MaterialProperty::Opacity, "s", "result")],
        );
        let out = translate(graph);
        assert!(out.succeeded(), "{:?}", out.diagnostics);
        assert!(out.uniform_expression_set.stage(ShaderFrequency::Pixel).is_empty());
        assert!(out.shader_text.unwrap().contains("return 1.0;"));
    }
}
