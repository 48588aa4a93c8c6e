//! A loaded material graph, ready to be handed to the translator.

use std::path::Path;

use anyhow::Result;

use crate::dsl::{self, MaterialGraph};
use crate::error::TranslationError;
use crate::node_compiler::{GraphScope, compile_endpoint};
use crate::shader_map::key::MaterialId;
use crate::translator::{Code, MaterialCompiler, MaterialSource};
use crate::types::{MaterialProperty, MaterialSettings};

#[derive(Debug, Clone)]
pub struct Material {
    graph: MaterialGraph,
    id: MaterialId,
}

impl Material {
    pub fn new(graph: MaterialGraph) -> Self {
        let id = graph.material_id();
        Self { graph, id }
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        dsl::load_material_from_path(path).map(Self::new)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        dsl::parse_material_str(text).map(Self::new)
    }

    /// The bundled material substituted for materials that fail to compile.
    pub fn default_material() -> Result<Self> {
        dsl::load_default_material().map(Self::new)
    }

    pub fn id(&self) -> MaterialId {
        self.id
    }

    pub fn graph(&self) -> &MaterialGraph {
        &self.graph
    }

    pub fn is_fallback_of_last_resort(&self) -> bool {
        self.graph.settings.fallback_of_last_resort
    }
}

impl MaterialSource for Material {
    fn friendly_name(&self) -> &str {
        &self.graph.metadata.name
    }

    fn settings(&self) -> &MaterialSettings {
        &self.graph.settings
    }

    fn is_property_connected(&self, property: MaterialProperty) -> bool {
        self.graph.properties.contains_key(&property)
    }

    fn compile_property(&self, property: MaterialProperty, compiler: &mut dyn MaterialCompiler) -> Code {
        let Some(endpoint) = self.graph.properties.get(&property) else {
            return compiler.error(TranslationError::invalid(format!("{property} is not connected")));
        };
        let scope = GraphScope::root(&self.graph);
        compile_endpoint(&scope, &endpoint.node_id, &endpoint.port_id, compiler)
    }
}
