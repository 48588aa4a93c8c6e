use std::{borrow::Cow, collections::HashMap, collections::HashSet};

use anyhow::{Result, anyhow, bail};
use serde::Deserialize;

use crate::dsl::{Connection, MaterialFunction, MaterialGraph, Node, parse_str};

const DEFAULT_NODE_SCHEME_JSON: &str = include_str!("../assets/material-node-scheme.json");

#[derive(Debug, Clone)]
pub struct NodeScheme {
    pub nodes: HashMap<String, NodeTypeScheme>,
    pub port_type_compatibility: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawNodeScheme {
    #[serde(rename = "schemaVersion")]
    #[allow(dead_code)]
    pub schema_version: u32,
    #[serde(rename = "portTypeCompatibility", default)]
    pub port_type_compatibility: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub nodes: Vec<RawNodeDef>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawNodeDef {
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub inputs: Vec<RawPort>,
    #[serde(default)]
    pub outputs: Vec<RawPort>,
    #[serde(rename = "defaultParams", default)]
    pub default_params: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawPort {
    pub id: String,
    #[serde(rename = "type")]
    pub port_type: String,
}

#[derive(Debug, Clone)]
pub struct NodeTypeScheme {
    pub category: Option<String>,
    pub inputs: HashMap<String, String>,
    pub outputs: HashMap<String, String>,
    pub default_params: HashMap<String, serde_json::Value>,
}

/// Port type given to the instance-defined ports of FunctionCall nodes.
const DYNAMIC_PORT_TYPE: &str = "any";

/// Compatibility is keyed by the *input* type; `any` is a wildcard on either side.
pub(crate) fn port_types_compatible(scheme: &NodeScheme, from: &str, to: &str) -> bool {
    if from == "any" || to == "any" || from == to {
        return true;
    }
    scheme
        .port_type_compatibility
        .get(to)
        .is_some_and(|allowed| allowed.iter().any(|s| s == from))
}

pub fn load_default_scheme() -> Result<NodeScheme> {
    let scheme: RawNodeScheme = serde_json::from_str(DEFAULT_NODE_SCHEME_JSON)
        .map_err(|e| anyhow!("failed to parse assets/material-node-scheme.json: {e}"))?;
    let mut nodes: HashMap<String, NodeTypeScheme> = HashMap::new();
    for n in scheme.nodes {
        let inputs = n.inputs.into_iter().map(|p| (p.id, p.port_type)).collect();
        let outputs = n.outputs.into_iter().map(|p| (p.id, p.port_type)).collect();
        nodes.insert(
            n.node_type,
            NodeTypeScheme {
                category: n.category,
                inputs,
                outputs,
                default_params: n.default_params,
            },
        );
    }
    Ok(NodeScheme {
        nodes,
        port_type_compatibility: scheme.port_type_compatibility,
    })
}

pub fn validate_material(graph: &MaterialGraph) -> Result<()> {
    let scheme = load_default_scheme()?;
    validate_material_against(graph, &scheme)
}

/// Nodes and connections of one graph body: the material itself or a function.
struct Body<'a> {
    label: Cow<'a, str>,
    nodes: &'a [Node],
    connections: &'a [Connection],
}

pub fn validate_material_against(graph: &MaterialGraph, scheme: &NodeScheme) -> Result<()> {
    let mut errors: Vec<String> = Vec::new();

    let mut function_names: HashSet<&str> = HashSet::new();
    for f in &graph.functions {
        if !function_names.insert(f.name.as_str()) {
            errors.push(format!("duplicate function '{}'", f.name));
        }
    }

    let root = Body {
        label: Cow::Borrowed(""),
        nodes: &graph.nodes,
        connections: &graph.connections,
    };
    let functions = graph.functions.iter().map(|f| Body {
        label: Cow::Owned(format!("{}/", f.name)),
        nodes: &f.nodes,
        connections: &f.connections,
    });

    for body in std::iter::once(root).chain(functions) {
        let nodes_by_id = validate_nodes(graph, &body, scheme, &mut errors);
        for c in body.connections {
            validate_connection(graph, &body, c, &nodes_by_id, scheme, &mut errors);
        }
    }

    let root_nodes: HashMap<&str, &Node> =
        graph.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
    for (property, endpoint) in &graph.properties {
        let Some(node) = root_nodes.get(endpoint.node_id.as_str()).copied() else {
            errors.push(format!(
                "property {property} references missing node '{}'",
                endpoint.node_id
            ));
            continue;
        };
        if output_port_type(graph, node, &endpoint.port_id, scheme).is_none() {
            errors.push(format!(
                "property {property} uses unknown output port '{}.{}' (type {})",
                node.id, endpoint.port_id, node.node_type
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!(
            "material failed scheme validation ({} error(s)):\n- {}",
            errors.len(),
            errors.join("\n- ")
        )
    }
}

fn validate_nodes<'a>(
    graph: &MaterialGraph,
    body: &Body<'a>,
    scheme: &NodeScheme,
    errors: &mut Vec<String>,
) -> HashMap<&'a str, &'a Node> {
    let mut nodes_by_id: HashMap<&str, &Node> = HashMap::new();
    for n in body.nodes {
        if nodes_by_id.insert(n.id.as_str(), n).is_some() {
            errors.push(format!("duplicate node id '{}{}'", body.label, n.id));
        }
        if !scheme.nodes.contains_key(&n.node_type) {
            errors.push(format!(
                "unknown node type '{}' at node '{}{}'",
                n.node_type, body.label, n.id
            ));
            continue;
        }
        if n.node_type == "FunctionCall" {
            match parse_str(&n.params, "function") {
                Some(name) if graph.function(name).is_some() => {}
                Some(name) => errors.push(format!(
                    "FunctionCall '{}{}' references unknown function '{name}'",
                    body.label, n.id
                )),
                None => errors.push(format!(
                    "FunctionCall '{}{}' is missing param 'function'",
                    body.label, n.id
                )),
            }
        }
    }
    nodes_by_id
}

fn called_function<'g>(graph: &'g MaterialGraph, node: &Node) -> Option<&'g MaterialFunction> {
    parse_str(&node.params, "function").and_then(|name| graph.function(name))
}

fn output_port_type<'s>(
    graph: &MaterialGraph,
    node: &Node,
    port_id: &str,
    scheme: &'s NodeScheme,
) -> Option<&'s str> {
    if node.node_type == "FunctionCall" {
        let function = called_function(graph, node)?;
        return function
            .output_names()
            .contains(&port_id)
            .then_some(DYNAMIC_PORT_TYPE);
    }
    scheme
        .nodes
        .get(&node.node_type)?
        .outputs
        .get(port_id)
        .map(String::as_str)
}

fn input_port_type<'s>(
    graph: &MaterialGraph,
    node: &Node,
    port_id: &str,
    scheme: &'s NodeScheme,
) -> Option<&'s str> {
    if node.node_type == "FunctionCall" {
        let function = called_function(graph, node)?;
        return function
            .input_names()
            .contains(&port_id)
            .then_some(DYNAMIC_PORT_TYPE);
    }
    scheme
        .nodes
        .get(&node.node_type)?
        .inputs
        .get(port_id)
        .map(String::as_str)
}

fn validate_connection(
    graph: &MaterialGraph,
    body: &Body<'_>,
    c: &Connection,
    nodes_by_id: &HashMap<&str, &Node>,
    scheme: &NodeScheme,
    errors: &mut Vec<String>,
) {
    let Some(from_node) = nodes_by_id.get(c.from.node_id.as_str()).copied() else {
        errors.push(format!(
            "connection '{}{}' references missing from.nodeId '{}'",
            body.label, c.id, c.from.node_id
        ));
        return;
    };
    let Some(to_node) = nodes_by_id.get(c.to.node_id.as_str()).copied() else {
        errors.push(format!(
            "connection '{}{}' references missing to.nodeId '{}'",
            body.label, c.id, c.to.node_id
        ));
        return;
    };
    if !scheme.nodes.contains_key(&from_node.node_type) || !scheme.nodes.contains_key(&to_node.node_type) {
        // Unknown node type already reported in node loop.
        return;
    }

    let Some(from_ty) = output_port_type(graph, from_node, &c.from.port_id, scheme) else {
        errors.push(format!(
            "connection '{}{}' uses unknown from port '{}.{}' (type {})",
            body.label, c.id, c.from.node_id, c.from.port_id, from_node.node_type
        ));
        return;
    };
    let Some(to_ty) = input_port_type(graph, to_node, &c.to.port_id, scheme) else {
        errors.push(format!(
            "connection '{}{}' uses unknown to port '{}.{}' (type {})",
            body.label, c.id, c.to.node_id, c.to.port_id, to_node.node_type
        ));
        return;
    };

    if !port_types_compatible(scheme, from_ty, to_ty) {
        errors.push(format!(
            "connection '{}{}' type mismatch: '{}.{}' ({from_ty}) -> '{}.{}' ({to_ty})",
            body.label, c.id, c.from.node_id, c.from.port_id, c.to.node_id, c.to.port_id
        ));
    }
}
