//! Intermediate code-chunk table: per-property typed code fragments plus the material-wide pool of
//! uniform expressions.

use std::sync::Arc;

use bitflags::bitflags;

use crate::error::TranslationError;
use crate::types::{MaterialProperty, ShaderFrequency, TextureCompression, ValueType};
use crate::uniform::{UniformExprRef, UniformExpression, UniformExpressionSet};

use super::template;

bitflags! {
    /// Storage hints carried by texture chunks and applied when the texture is sampled.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ChunkFlags: u8 {
        const NORMAL_MAP = 1 << 0;
        const RGBE_ENCODED = 1 << 1;
        const GREYSCALE = 1 << 2;
    }
}

impl ChunkFlags {
    pub fn for_compression(compression: TextureCompression) -> ChunkFlags {
        match compression {
            TextureCompression::Default => ChunkFlags::empty(),
            TextureCompression::NormalMap => ChunkFlags::NORMAL_MAP,
            TextureCompression::Grayscale => ChunkFlags::GREYSCALE,
            TextureCompression::Rgbe => ChunkFlags::RGBE_ENCODED,
        }
    }
}

/// Index of a chunk within the property currently being translated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId(u32);

impl ChunkId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug)]
pub struct CodeChunk {
    pub definition: String,
    /// Set only for chunks materialized as a named temporary.
    pub symbol_name: Option<String>,
    pub value_type: ValueType,
    pub flags: ChunkFlags,
    pub texture_dependency_length: u32,
    pub uniform_expression: Option<UniformExprRef>,
    pub is_inline: bool,
}

impl CodeChunk {
    /// Constant value when this chunk wraps a constant uniform expression.
    pub fn constant_value(&self) -> Option<[f32; 4]> {
        let expr = self.uniform_expression.as_ref()?;
        if !expr.is_constant() {
            return None;
        }
        Some(expr.evaluate(&Default::default(), &crate::uniform::NoOverrides))
    }
}

#[derive(Clone, Debug)]
struct PooledUniform {
    expression: UniformExprRef,
    value_type: ValueType,
}

#[derive(Debug)]
pub struct ChunkTable {
    per_property: Vec<Vec<CodeChunk>>,
    pool: Vec<PooledUniform>,
    current: MaterialProperty,
}

impl Default for ChunkTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkTable {
    pub fn new() -> Self {
        Self {
            per_property: vec![Vec::new(); MaterialProperty::COUNT],
            pool: Vec::new(),
            current: MaterialProperty::EmissiveColor,
        }
    }

    pub fn set_property(&mut self, property: MaterialProperty) {
        self.current = property;
    }

    pub fn current_property(&self) -> MaterialProperty {
        self.current
    }

    pub fn chunks(&self, property: MaterialProperty) -> &[CodeChunk] {
        &self.per_property[property.index()]
    }

    pub fn get(&self, id: ChunkId) -> &CodeChunk {
        &self.per_property[self.current.index()][id.index()]
    }

    /// Uniform expressions registered across all properties, in registration order.
    pub fn pool(&self) -> impl Iterator<Item = &UniformExprRef> {
        self.pool.iter().map(|p| &p.expression)
    }

    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    fn push(&mut self, chunk: CodeChunk) -> ChunkId {
        let chunks = &mut self.per_property[self.current.index()];
        chunks.push(chunk);
        ChunkId((chunks.len() - 1) as u32)
    }

    fn next_symbol(&self) -> String {
        format!("local{}", self.per_property[self.current.index()].len())
    }

    /// Materialize `definition` as a named temporary.
    pub fn add_code_chunk(
        &mut self,
        value_type: ValueType,
        definition: String,
        texture_dependency_length: u32,
        flags: ChunkFlags,
    ) -> Result<ChunkId, TranslationError> {
        if !value_type.is_float() {
            return Err(TranslationError::type_mismatch(format!(
                "A {value_type} value cannot be stored in a temporary."
            )));
        }
        let symbol = self.next_symbol();
        Ok(self.push(CodeChunk {
            definition,
            symbol_name: Some(symbol),
            value_type,
            flags,
            texture_dependency_length,
            uniform_expression: None,
            is_inline: false,
        }))
    }

    /// Record a chunk whose definition is substituted verbatim wherever it is referenced.
    pub fn add_inline_chunk(
        &mut self,
        value_type: ValueType,
        definition: String,
        texture_dependency_length: u32,
        flags: ChunkFlags,
    ) -> ChunkId {
        self.push(CodeChunk {
            definition,
            symbol_name: None,
            value_type,
            flags,
            texture_dependency_length,
            uniform_expression: None,
            is_inline: true,
        })
    }

    /// Register a uniform expression, reusing an identical one from the material-wide pool and
    /// an existing local chunk for it when this property already references it.
    pub fn add_uniform_expression(
        &mut self,
        expression: UniformExpression,
        value_type: ValueType,
        definition: String,
    ) -> Result<ChunkId, TranslationError> {
        if value_type.is_texture() && expression.texture().is_none() {
            return Err(TranslationError::type_mismatch("Operation not supported on a Texture"));
        }

        let pooled = self
            .pool
            .iter()
            .find(|p| p.value_type == value_type && p.expression.structural_equals(&expression))
            .map(|p| p.expression.clone());

        let shared = match pooled {
            Some(shared) => {
                let local = self.per_property[self.current.index()]
                    .iter()
                    .position(|c| {
                        c.value_type == value_type
                            && c.uniform_expression
                                .as_ref()
                                .is_some_and(|e| Arc::ptr_eq(e, &shared))
                    });
                if let Some(index) = local {
                    return Ok(ChunkId(index as u32));
                }
                shared
            }
            None => {
                let shared = Arc::new(expression);
                self.pool.push(PooledUniform {
                    expression: shared.clone(),
                    value_type,
                });
                shared
            }
        };

        let flags = shared
            .texture()
            .map(|t| ChunkFlags::for_compression(t.compression))
            .unwrap_or_default();
        Ok(self.push(CodeChunk {
            definition,
            symbol_name: None,
            value_type,
            flags,
            texture_dependency_length: 0,
            uniform_expression: Some(shared),
            is_inline: true,
        }))
    }

    /// Lower a non-constant uniform chunk to binding syntax for `frequency`, recording the
    /// expression in that stage's slot list.
    pub fn access_uniform_expression(
        &mut self,
        id: ChunkId,
        frequency: ShaderFrequency,
        set: &mut UniformExpressionSet,
    ) -> Result<ChunkId, TranslationError> {
        let chunk = self.get(id);
        let (value_type, flags) = (chunk.value_type, chunk.flags);
        let Some(expression) = chunk.uniform_expression.clone() else {
            return Err(TranslationError::invalid(
                "Attempted to access a chunk without a uniform expression",
            ));
        };

        let code = match value_type {
            ValueType::Float => {
                let slot = set.add_scalar(frequency, &expression);
                template::scalar_uniform_access(frequency, slot)
            }
            ValueType::Float1 | ValueType::Float2 | ValueType::Float3 | ValueType::Float4 => {
                let slot = set.add_vector(frequency, &expression);
                template::vector_uniform_access(frequency, slot, value_type)
            }
            ValueType::Texture2D => {
                let slot = set.add_texture_2d(frequency, &expression);
                template::texture_2d_binding(frequency, slot)
            }
            ValueType::TextureCube => {
                let slot = set.add_cube_texture(&expression);
                template::texture_cube_binding(slot)
            }
            other => {
                return Err(TranslationError::type_mismatch(format!(
                    "User input of unknown type: {other}"
                )));
            }
        };
        Ok(self.add_inline_chunk(value_type, code, 0, flags))
    }

    /// Text that references chunk `id` from other code.
    pub fn parameter_code(
        &mut self,
        id: ChunkId,
        frequency: ShaderFrequency,
        set: &mut UniformExpressionSet,
    ) -> Result<String, TranslationError> {
        let chunk = self.get(id);
        let constant_uniform = chunk
            .uniform_expression
            .as_ref()
            .is_some_and(|e| e.is_constant());
        if constant_uniform {
            return Ok(chunk.definition.clone());
        }
        if chunk.uniform_expression.is_some() {
            let accessed = self.access_uniform_expression(id, frequency, set)?;
            return Ok(self.get(accessed).definition.clone());
        }
        if chunk.is_inline {
            return Ok(chunk.definition.clone());
        }
        Ok(chunk.symbol_name.clone().unwrap_or_else(|| chunk.definition.clone()))
    }
}
