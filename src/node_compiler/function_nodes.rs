//! Compilers for material function calls.
//!
//! A FunctionCall inlines the named function's body in a fresh function scope. A FunctionInput
//! inside that body steps back out to the caller's scope to compile whatever feeds the matching
//! port on the call node.

use super::{GraphScope, NodeRef, compile_endpoint};
use crate::dsl::{parse_f32, parse_vec4};
use crate::error::TranslationError;
use crate::translator::{Code, FunctionCallSite, MaterialCompiler};

pub fn compile_function_call(node: &NodeRef<'_>, output: &str, compiler: &mut dyn MaterialCompiler) -> Code {
    let graph = node.scope.graph;
    let name = node.str_param("function").unwrap_or_default();
    let Some(function) = graph.function(name) else {
        return compiler.error(TranslationError::invalid(format!("Unknown function {name}")));
    };
    let Some(output_node) = function.output_node(output) else {
        return compiler.error(TranslationError::invalid(format!(
            "Function {name} has no output {output}"
        )));
    };

    let site = FunctionCallSite {
        function: function.name.clone(),
        node_id: node.node.id.clone(),
        class_name: node.node.node_type.clone(),
    };
    if !compiler.begin_function_call(site) {
        return None;
    }
    let scope = GraphScope::function(graph, function, node.scope.clone(), node.node);
    let result = compiler.call_expression(&NodeRef::new(scope, output_node), "value");
    compiler.end_function_call();
    result
}

/// Resolves in the caller's scope, falling back to the `default` param when the call node leaves
/// the input unconnected.
pub fn compile_function_input(node: &NodeRef<'_>, compiler: &mut dyn MaterialCompiler) -> Code {
    let name = node.str_param("name").unwrap_or_default();
    let Some((caller_scope, call_node)) = node.scope.caller() else {
        return compiler.error(TranslationError::invalid(format!(
            "Function input {name} used outside a function"
        )));
    };

    let Some(conn) = caller_scope.incoming(&call_node.id, name) else {
        return default_input(node, name, compiler);
    };
    let suspended = compiler.suspend_function();
    let result = compile_endpoint(caller_scope, &conn.from.node_id, &conn.from.port_id, compiler);
    if let Some(state) = suspended {
        compiler.resume_function(state);
    }
    result
}

fn default_input(node: &NodeRef<'_>, name: &str, compiler: &mut dyn MaterialCompiler) -> Code {
    let params = &node.node.params;
    if let Some(v) = parse_f32(params, "default") {
        return compiler.constant(v);
    }
    let len = params
        .get("default")
        .and_then(|v| v.as_array())
        .map_or(0, |a| a.len());
    match (parse_vec4(params, "default"), len) {
        (Some([x, y, _, _]), 2) => compiler.constant2(x, y),
        (Some([x, y, z, _]), 3) => compiler.constant3(x, y, z),
        (Some([x, y, z, w]), 4) => compiler.constant4(x, y, z, w),
        _ => compiler.error(TranslationError::invalid(format!("Missing function input {name}"))),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::super::test_utils::*;
    use crate::error::TranslationError;
    use crate::types::MaterialProperty;

    fn double_function() -> crate::dsl::MaterialFunction {
        test_function(
            "Double",
            vec![
                test_node("in", "FunctionInput", json!({ "name": "x" })),
                test_node("two", "Constant", json!({ "value": 2.0 })),
                test_node("mul", "Multiply", json!({})),
                test_node("out", "FunctionOutput", json!({ "name": "result" })),
            ],
            vec![
                test_connection("in", "value", "mul", "a"),
                test_connection("two", "value", "mul", "b"),
                test_connection("mul", "result", "out", "value"),
            ],
        )
    }

    #[test]
    fn nested_calls_of_the_same_function_are_not_recursion() {
        let mut graph = test_graph(
            vec![
                test_node("p", "ScalarParameter", json!({ "name": "Base", "default": 1.0 })),
                test_node("inner", "FunctionCall", json!({ "function": "Double" })),
                test_node("outer", "FunctionCall", json!({ "function": "Double" })),
            ],
            vec![
                test_connection("p", "value", "inner", "x"),
                test_connection("inner", "result", "outer", "x"),
            ],
            vec![(MaterialProperty::Opacity, "outer", "result")],
        );
        graph.functions.push(double_function());
        let out = translate(graph);
        assert!(out.succeeded(), "{:?}", out.diagnostics);
        let text = out.shader_text.unwrap();
        assert!(text.contains("(pixel_uniforms.scalars[0].x * 2.0)"), "{text}");
    }

    #[test]
    fn self_recursion_is_reported_with_function_context() {
        let mut graph = test_graph(
            vec![test_node("call", "FunctionCall", json!({ "function": "Loop" }))],
            vec![],
            vec![(MaterialProperty::Opacity, "call", "result")],
        );
        graph.functions.push(test_function(
            "Loop",
            vec![
                test_node("again", "FunctionCall", json!({ "function": "Loop" })),
                test_node("out", "FunctionOutput", json!({ "name": "result" })),
            ],
            vec![test_connection("again", "result", "out", "value")],
        ));
        let out = translate(graph);
        assert_eq!(out.diagnostics.len(), 1);
        let d = &out.diagnostics[0];
        assert!(matches!(d.error, TranslationError::CyclicReference(_)));
        assert_eq!(d.function_context.as_deref(), Some("Function Loop"));
    }

    #[test]
    fn unconnected_input_uses_its_default() {
        let mut graph = test_graph(
            vec![test_node("call", "FunctionCall", json!({ "function": "Double" }))],
            vec![],
            vec![(MaterialProperty::Opacity, "call", "result")],
        );
        let mut function = double_function();
        function.nodes[0] = test_node("in", "FunctionInput", json!({ "name": "x", "default": 0.25 }));
        graph.functions.push(function);
        let out = translate(graph);
        assert!(out.succeeded(), "{:?}", out.diagnostics);
        assert!(out.shader_text.unwrap().contains("return 0.5;"));

        let mut graph = test_graph(
            vec![test_node("call", "FunctionCall", json!({ "function": "Double" }))],
            vec![],
            vec![(MaterialProperty::Opacity, "call", "result")],
        );
        graph.functions.push(double_function());
        let out = translate(graph);
        assert_eq!(out.diagnostics[0].error.to_string(), "Missing function input x");
    }
}
