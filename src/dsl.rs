use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::schema;
use crate::shader_map::key::MaterialId;
use crate::types::{MaterialProperty, MaterialSettings};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MaterialGraph {
    pub version: String,
    pub metadata: Metadata,
    /// Base content identity. Derived from the material name when absent.
    #[serde(default)]
    pub id: Option<MaterialId>,
    #[serde(default)]
    pub settings: MaterialSettings,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    /// Root expression output feeding each material property.
    #[serde(default)]
    pub properties: BTreeMap<MaterialProperty, Endpoint>,
    #[serde(default)]
    pub functions: Vec<MaterialFunction>,
}

impl MaterialGraph {
    pub fn material_id(&self) -> MaterialId {
        self.id
            .unwrap_or_else(|| MaterialId::from_name(&self.metadata.name))
    }

    pub fn function(&self, name: &str) -> Option<&MaterialFunction> {
        self.functions.iter().find(|f| f.name == name)
    }
}

/// A reusable sub-graph inlined at each FunctionCall node that names it.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MaterialFunction {
    pub name: String,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl MaterialFunction {
    /// Names of the FunctionInput nodes, which become the call site's input ports.
    pub fn input_names(&self) -> Vec<&str> {
        self.named_nodes("FunctionInput")
    }

    /// Names of the FunctionOutput nodes, which become the call site's output ports.
    pub fn output_names(&self) -> Vec<&str> {
        self.named_nodes("FunctionOutput")
    }

    pub fn output_node(&self, name: &str) -> Option<&Node> {
        self.nodes
            .iter()
            .find(|n| n.node_type == "FunctionOutput" && parse_str(&n.params, "name") == Some(name))
    }

    fn named_nodes(&self, node_type: &str) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|n| n.node_type == node_type)
            .filter_map(|n| parse_str(&n.params, "name"))
            .collect()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Metadata {
    pub name: String,
    pub created: Option<String>,
    pub modified: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Connection {
    pub id: String,
    pub from: Endpoint,
    pub to: Endpoint,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Endpoint {
    #[serde(rename = "nodeId")]
    pub node_id: String,
    #[serde(rename = "portId")]
    pub port_id: String,
}

/// The bundled material substituted when another material fails to compile.
pub fn load_default_material() -> Result<MaterialGraph> {
    parse_material_str(include_str!("../assets/default-material.json"))
        .context("failed to load bundled default material")
}

pub fn load_material_from_path(path: impl AsRef<std::path::Path>) -> Result<MaterialGraph> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read material json at {}", path.display()))?;
    parse_material_str(&text).with_context(|| format!("invalid material {}", path.display()))
}

/// Parse a material document, fill in scheme default params and validate it against the scheme.
pub fn parse_material_str(text: &str) -> Result<MaterialGraph> {
    let mut graph: MaterialGraph =
        serde_json::from_str(text).context("failed to parse material json")?;

    // Hand-written documents may omit params that have scheme defaults.
    let scheme = schema::load_default_scheme()?;
    apply_node_default_params(&mut graph, &scheme);
    schema::validate_material_against(&graph, &scheme)?;
    Ok(graph)
}

fn apply_node_default_params(graph: &mut MaterialGraph, scheme: &schema::NodeScheme) {
    let function_nodes = graph.functions.iter_mut().flat_map(|f| f.nodes.iter_mut());
    for node in graph.nodes.iter_mut().chain(function_nodes) {
        let Some(node_scheme) = scheme.nodes.get(&node.node_type) else {
            continue;
        };
        if node_scheme.default_params.is_empty() {
            continue;
        }

        let mut merged = node_scheme.default_params.clone();
        for (k, v) in std::mem::take(&mut node.params) {
            merged.insert(k, v);
        }
        node.params = merged;
    }
}

pub fn incoming_connection<'a>(
    connections: &'a [Connection],
    to_node_id: &str,
    to_port_id: &str,
) -> Option<&'a Connection> {
    connections
        .iter()
        .find(|c| c.to.node_id == to_node_id && c.to.port_id == to_port_id)
}

pub fn parse_u32(params: &HashMap<String, serde_json::Value>, key: &str) -> Option<u32> {
    params
        .get(key)
        .and_then(|v| v.as_u64())
        .and_then(|v| u32::try_from(v).ok())
}

pub fn parse_f32(params: &HashMap<String, serde_json::Value>, key: &str) -> Option<f32> {
    match params.get(key) {
        Some(v) => v
            .as_f64()
            .map(|x| x as f32)
            .or_else(|| v.as_u64().map(|x| x as f32))
            .or_else(|| v.as_i64().map(|x| x as f32)),
        None => None,
    }
}

pub fn parse_str<'a>(params: &'a HashMap<String, serde_json::Value>, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

pub fn parse_bool(params: &HashMap<String, serde_json::Value>, key: &str) -> Option<bool> {
    params.get(key).and_then(|v| v.as_bool())
}

/// Up to four numbers from an array param, zero-filled.
pub fn parse_vec4(params: &HashMap<String, serde_json::Value>, key: &str) -> Option<[f32; 4]> {
    let items = params.get(key)?.as_array()?;
    let mut out = [0.0; 4];
    for (slot, v) in out.iter_mut().zip(items) {
        *slot = v.as_f64()? as f32;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "version": "1.0",
        "metadata": { "name": "Minimal" },
        "nodes": [
            { "id": "c", "type": "Constant3Vector", "params": { "r": 1.0 } },
            { "id": "orphan", "type": "Constant" }
        ],
        "properties": { "EmissiveColor": { "nodeId": "c", "portId": "value" } }
    }"#;

    #[test]
    fn defaults_are_merged_from_the_scheme() {
        let graph = parse_material_str(MINIMAL).unwrap();
        let c = graph.nodes.iter().find(|n| n.id == "c").unwrap();
        assert_eq!(parse_f32(&c.params, "r"), Some(1.0));
        assert_eq!(parse_f32(&c.params, "g"), Some(0.0));
        assert_eq!(graph.material_id(), MaterialId::from_name("Minimal"));
    }

    #[test]
    fn vec4_params_zero_fill() {
        let mut params = HashMap::new();
        params.insert("default".to_string(), serde_json::json!([1.0, 2.0]));
        assert_eq!(parse_vec4(&params, "default"), Some([1.0, 2.0, 0.0, 0.0]));
        assert_eq!(parse_vec4(&params, "missing"), None);
    }

    #[test]
    fn bundled_default_material_loads() {
        let graph = load_default_material().unwrap();
        assert!(graph.settings.fallback_of_last_resort);
    }
}
