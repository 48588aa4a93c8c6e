//! Node compiler infrastructure: resolving graph connections and dispatching on node type.
//!
//! Each node kind is compiled by a function in one of the submodules. They all receive a
//! [`NodeRef`] (the node plus the graph body it lives in) and build code through the
//! [`MaterialCompiler`] interface, pulling upstream values with [`NodeRef::input`].

pub mod function_nodes;
pub mod input_nodes;
pub mod math_nodes;
pub mod switch_nodes;
pub mod texture_nodes;
pub mod vector_nodes;

use std::collections::HashMap;
use std::rc::Rc;

use crate::dsl::{
    Connection, MaterialFunction, MaterialGraph, Node, incoming_connection, parse_bool, parse_f32,
    parse_str, parse_u32, parse_vec4,
};
use crate::error::TranslationError;
use crate::translator::{Code, Compilable, ExpressionKey, MaterialCompiler};

/// Scope name of the material's own graph body.
pub const ROOT_SCOPE: &str = "material";

/// One graph body: the material's root graph or an inlined function.
pub struct GraphScope<'a> {
    pub name: String,
    pub graph: &'a MaterialGraph,
    nodes_by_id: HashMap<&'a str, &'a Node>,
    connections: &'a [Connection],
    /// The scope and FunctionCall node this function body was entered from.
    caller: Option<(Rc<GraphScope<'a>>, &'a Node)>,
}

impl<'a> GraphScope<'a> {
    pub fn root(graph: &'a MaterialGraph) -> Rc<Self> {
        Rc::new(Self {
            name: ROOT_SCOPE.to_string(),
            graph,
            nodes_by_id: graph.nodes.iter().map(|n| (n.id.as_str(), n)).collect(),
            connections: &graph.connections,
            caller: None,
        })
    }

    pub fn function(
        graph: &'a MaterialGraph,
        function: &'a MaterialFunction,
        caller: Rc<GraphScope<'a>>,
        call_node: &'a Node,
    ) -> Rc<Self> {
        Rc::new(Self {
            name: function.name.clone(),
            graph,
            nodes_by_id: function.nodes.iter().map(|n| (n.id.as_str(), n)).collect(),
            connections: &function.connections,
            caller: Some((caller, call_node)),
        })
    }

    pub fn node(&self, node_id: &str) -> Option<&'a Node> {
        self.nodes_by_id.get(node_id).copied()
    }

    pub fn caller(&self) -> Option<(&Rc<GraphScope<'a>>, &'a Node)> {
        self.caller.as_ref().map(|(scope, node)| (scope, *node))
    }

    pub(crate) fn incoming(&self, node_id: &str, port_id: &str) -> Option<&'a Connection> {
        incoming_connection(self.connections, node_id, port_id)
    }
}

/// A node together with the graph body it belongs to.
#[derive(Clone)]
pub struct NodeRef<'a> {
    pub scope: Rc<GraphScope<'a>>,
    pub node: &'a Node,
}

impl<'a> NodeRef<'a> {
    pub fn new(scope: Rc<GraphScope<'a>>, node: &'a Node) -> Self {
        Self { scope, node }
    }

    /// Compile whatever feeds `port`, or record a diagnostic if nothing does.
    pub fn input(&self, port: &str, compiler: &mut dyn MaterialCompiler) -> Code {
        match self.optional_input(port, compiler) {
            Some(code) => code,
            None => compiler.error(TranslationError::invalid(format!(
                "Missing {} input {port}",
                self.node.node_type
            ))),
        }
    }

    /// `None` when the port is unconnected.
    pub fn optional_input(&self, port: &str, compiler: &mut dyn MaterialCompiler) -> Option<Code> {
        let conn = self.scope.incoming(&self.node.id, port)?;
        Some(compile_endpoint(&self.scope, &conn.from.node_id, &conn.from.port_id, compiler))
    }

    /// Compile another output of this same node through the expression cache.
    pub fn sibling_output(&self, output: &str, compiler: &mut dyn MaterialCompiler) -> Code {
        compiler.call_expression(self, output)
    }

    pub fn f32_param(&self, key: &str, default: f32) -> f32 {
        parse_f32(&self.node.params, key).unwrap_or(default)
    }

    pub fn u32_param(&self, key: &str, default: u32) -> u32 {
        parse_u32(&self.node.params, key).unwrap_or(default)
    }

    pub fn bool_param(&self, key: &str, default: bool) -> bool {
        parse_bool(&self.node.params, key).unwrap_or(default)
    }

    pub fn str_param(&self, key: &str) -> Option<&'a str> {
        parse_str(&self.node.params, key)
    }

    pub fn vec4_param(&self, key: &str) -> [f32; 4] {
        parse_vec4(&self.node.params, key).unwrap_or([0.0; 4])
    }

    pub fn mask_param(&self) -> [bool; 4] {
        ["r", "g", "b", "a"].map(|c| self.bool_param(c, false))
    }

    /// Deserialize an enum-valued param, recording a diagnostic when it does not parse.
    pub fn enum_param<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
        compiler: &mut dyn MaterialCompiler,
    ) -> Option<T> {
        let value = self.node.params.get(key).cloned().unwrap_or_default();
        match serde_json::from_value(value.clone()) {
            Ok(v) => Some(v),
            Err(_) => {
                compiler.error(TranslationError::invalid(format!(
                    "{} param {key} has unsupported value {value}",
                    self.node.node_type
                )));
                None
            }
        }
    }
}

impl Compilable for NodeRef<'_> {
    fn compile(&self, compiler: &mut dyn MaterialCompiler, output: &str) -> Code {
        compile_node(self, compiler, output)
    }

    fn class_name(&self) -> &str {
        &self.node.node_type
    }

    fn node_id(&self) -> &str {
        &self.node.id
    }

    fn expression_key(&self, output: &str) -> ExpressionKey {
        ExpressionKey {
            scope: self.scope.name.clone(),
            node_id: self.node.id.clone(),
            output: output.to_string(),
        }
    }
}

/// Compile `output` of the node `node_id` in `scope` through the expression cache.
pub fn compile_endpoint(
    scope: &Rc<GraphScope<'_>>,
    node_id: &str,
    output: &str,
    compiler: &mut dyn MaterialCompiler,
) -> Code {
    let Some(node) = scope.node(node_id) else {
        return compiler.error(TranslationError::invalid(format!(
            "node not found: {}/{node_id}",
            scope.name
        )));
    };
    compiler.call_expression(&NodeRef::new(scope.clone(), node), output)
}

/// Main dispatch for compiling one output of one node.
pub fn compile_node(node: &NodeRef<'_>, compiler: &mut dyn MaterialCompiler, output: &str) -> Code {
    match node.node.node_type.as_str() {
        // Input nodes
        "Constant" => input_nodes::compile_constant(node, compiler),
        "Constant2Vector" | "Constant3Vector" | "Constant4Vector" => {
            input_nodes::compile_constant_vector(node, compiler)
        }
        "ScalarParameter" => input_nodes::compile_scalar_parameter(node, compiler),
        "VectorParameter" => input_nodes::compile_vector_parameter(node, output, compiler),
        "TextureCoordinate" => input_nodes::compile_texture_coordinate(node, compiler),
        "VertexColor" => input_nodes::compile_vertex_color(node, output, compiler),
        "WorldPosition" => compiler.world_position(),
        "CameraWorldPosition" => compiler.camera_world_position(),
        "CameraVector" => compiler.camera_vector(),
        "Time" => input_nodes::compile_time(node, compiler),
        "PeriodicHint" => {
            let x = node.input("value", compiler);
            compiler.periodic_hint(x)
        }

        // Math nodes
        "Add" | "Subtract" | "Multiply" | "Divide" | "Dot" | "Cross" | "Min" | "Max" | "Fmod" => {
            math_nodes::compile_binary(node, compiler)
        }
        "Power" => math_nodes::compile_power(node, compiler),
        "Lerp" => math_nodes::compile_lerp(node, compiler),
        "Clamp" => math_nodes::compile_clamp(node, compiler),
        "Abs" | "Floor" | "Ceil" | "Frac" | "SquareRoot" | "Length" | "Normalize" | "OneMinus" => {
            math_nodes::compile_unary(node, compiler)
        }
        "Sine" | "Cosine" => math_nodes::compile_periodic(node, compiler),

        // Vector nodes
        "ComponentMask" => vector_nodes::compile_component_mask(node, compiler),
        "AppendVector" => vector_nodes::compile_append_vector(node, compiler),
        "Transform" => vector_nodes::compile_transform(node, compiler),
        "DDX" | "DDY" => vector_nodes::compile_derivative(node, compiler),

        // Texture nodes
        "TextureObject" => texture_nodes::compile_texture_object(node, compiler),
        "TextureParameter" => texture_nodes::compile_texture_parameter(node, compiler),
        "TextureSample" => texture_nodes::compile_texture_sample(node, output, compiler),

        // Static switch nodes
        "StaticBool" => switch_nodes::compile_static_bool(node, compiler),
        "StaticBoolParameter" => switch_nodes::compile_static_bool_parameter(node, compiler),
        "StaticSwitch" => switch_nodes::compile_static_switch(node, compiler),
        "StaticSwitchParameter" => switch_nodes::compile_static_switch_parameter(node, compiler),
        "StaticComponentMaskParameter" => {
            switch_nodes::compile_static_component_mask_parameter(node, compiler)
        }
        "QualitySwitch" => switch_nodes::compile_quality_switch(node, compiler),

        // Function nodes
        "FunctionCall" => function_nodes::compile_function_call(node, output, compiler),
        "FunctionInput" => function_nodes::compile_function_input(node, compiler),
        "FunctionOutput" => node.input("value", compiler),

        other => compiler.error(TranslationError::invalid(format!(
            "unsupported material node type: {other}"
        ))),
    }
}

/// Pick a channel group out of a four-component value by output port name.
pub fn select_output(compiler: &mut dyn MaterialCompiler, rgba: Code, output: &str) -> Code {
    let mask = match output {
        "rgba" | "value" | "result" => return rgba,
        "rgb" => [true, true, true, false],
        "r" => [true, false, false, false],
        "g" => [false, true, false, false],
        "b" => [false, false, true, false],
        "a" => [false, false, false, true],
        other => {
            return compiler.error(TranslationError::invalid(format!("unknown output port {other}")));
        }
    };
    let [r, g, b, a] = mask;
    compiler.component_mask(rgba, r, g, b, a)
}
