//! Per-stage uniform expression tables and their packing into constant registers.

use serde::{Deserialize, Serialize};

use super::context::{ParameterSource, RenderContext};
use super::expression::UniformExprRef;
use crate::types::{ShaderFrequency, TextureRef};

/// Uniform expressions read by one shader stage. The index in each list is the binding slot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageUniformExpressions {
    /// Packed four per `vec4f` register.
    pub scalars: Vec<UniformExprRef>,
    /// One register each.
    pub vectors: Vec<UniformExprRef>,
    pub textures_2d: Vec<UniformExprRef>,
}

impl StageUniformExpressions {
    pub fn is_empty(&self) -> bool {
        self.scalars.is_empty() && self.vectors.is_empty() && self.textures_2d.is_empty()
    }

    pub fn scalar_register_count(&self) -> usize {
        self.scalars.len().div_ceil(4)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniformExpressionSet {
    /// Indexed by [`ShaderFrequency::index`].
    per_stage: [StageUniformExpressions; 4],
    cube_textures: Vec<UniformExprRef>,
}

/// Append `expr` unless an identical expression is already present. Returns its slot.
fn add_unique(list: &mut Vec<UniformExprRef>, expr: &UniformExprRef) -> usize {
    if let Some(slot) = list.iter().position(|e| e.structural_equals(expr)) {
        return slot;
    }
    list.push(expr.clone());
    list.len() - 1
}

impl UniformExpressionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self, frequency: ShaderFrequency) -> &StageUniformExpressions {
        &self.per_stage[frequency.index()]
    }

    pub fn cube_textures(&self) -> &[UniformExprRef] {
        &self.cube_textures
    }

    pub fn add_scalar(&mut self, frequency: ShaderFrequency, expr: &UniformExprRef) -> usize {
        add_unique(&mut self.per_stage[frequency.index()].scalars, expr)
    }

    pub fn add_vector(&mut self, frequency: ShaderFrequency, expr: &UniformExprRef) -> usize {
        add_unique(&mut self.per_stage[frequency.index()].vectors, expr)
    }

    pub fn add_texture_2d(&mut self, frequency: ShaderFrequency, expr: &UniformExprRef) -> usize {
        add_unique(&mut self.per_stage[frequency.index()].textures_2d, expr)
    }

    pub fn add_cube_texture(&mut self, expr: &UniformExprRef) -> usize {
        add_unique(&mut self.cube_textures, expr)
    }

    pub fn is_empty(&self) -> bool {
        self.per_stage.iter().all(StageUniformExpressions::is_empty) && self.cube_textures.is_empty()
    }

    /// Number of texture samplers bound by `frequency`, counting the shared cube textures.
    pub fn sampler_count(&self, frequency: ShaderFrequency) -> usize {
        self.stage(frequency).textures_2d.len() + self.cube_textures.len()
    }

    pub fn summary(&self) -> String {
        let mut parts: Vec<String> = ShaderFrequency::ALL
            .iter()
            .filter(|f| !self.stage(**f).is_empty())
            .map(|f| {
                let s = self.stage(*f);
                format!(
                    "{}: {} scalars, {} vectors, {} textures",
                    f.name(),
                    s.scalars.len(),
                    s.vectors.len(),
                    s.textures_2d.len()
                )
            })
            .collect();
        if !self.cube_textures.is_empty() {
            parts.push(format!("cube textures: {}", self.cube_textures.len()));
        }
        if parts.is_empty() {
            return "no uniform expressions".to_string();
        }
        parts.join("; ")
    }

    /// Evaluate every expression into the register layout the generated shader declares.
    pub fn evaluate(&self, ctx: &RenderContext, params: &dyn ParameterSource) -> UniformValues {
        let mut values = UniformValues::default();
        for frequency in ShaderFrequency::ALL {
            let stage = self.stage(frequency);
            let out = &mut values.per_stage[frequency.index()];

            out.scalar_registers = vec![[0.0; 4]; stage.scalar_register_count()];
            for (i, expr) in stage.scalars.iter().enumerate() {
                out.scalar_registers[i / 4][i % 4] = expr.evaluate(ctx, params)[0];
            }
            out.vector_registers = stage
                .vectors
                .iter()
                .map(|expr| expr.evaluate(ctx, params))
                .collect();
            out.textures_2d = stage
                .textures_2d
                .iter()
                .map(|expr| expr.resolve_texture(params))
                .collect();
        }
        values.cube_textures = self
            .cube_textures
            .iter()
            .map(|expr| expr.resolve_texture(params))
            .collect();
        values
    }
}

/// Register contents for one stage, ready for upload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StageUniformValues {
    pub scalar_registers: Vec<[f32; 4]>,
    pub vector_registers: Vec<[f32; 4]>,
    pub textures_2d: Vec<Option<TextureRef>>,
}

impl StageUniformValues {
    /// Bytes matching the stage's uniform struct: scalar registers followed by vector registers.
    pub fn uniform_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity((self.scalar_registers.len() + self.vector_registers.len()) * 16);
        bytes.extend_from_slice(bytemuck::cast_slice(&self.scalar_registers));
        bytes.extend_from_slice(bytemuck::cast_slice(&self.vector_registers));
        bytes
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct UniformValues {
    per_stage: [StageUniformValues; 4],
    pub cube_textures: Vec<Option<TextureRef>>,
}

impl UniformValues {
    pub fn stage(&self, frequency: ShaderFrequency) -> &StageUniformValues {
        &self.per_stage[frequency.index()]
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::types::ValueType;
    use crate::uniform::context::{NoOverrides, ParameterOverrides};
    use crate::uniform::expression::UniformExpression;

    fn scalar_param(name: &str) -> UniformExprRef {
        Arc::new(UniformExpression::ScalarParameter {
            name: name.to_string(),
            default_value: 1.0,
        })
    }

    #[test]
    fn add_unique_is_first_seen_wins() {
        let mut set = UniformExpressionSet::new();
        let a = set.add_scalar(ShaderFrequency::Pixel, &scalar_param("A"));
        let b = set.add_scalar(ShaderFrequency::Pixel, &scalar_param("B"));
        let a_again = set.add_scalar(ShaderFrequency::Pixel, &scalar_param("A"));
        assert_eq!((a, b, a_again), (0, 1, 0));
        assert_eq!(set.stage(ShaderFrequency::Pixel).scalars.len(), 2);
        assert!(set.stage(ShaderFrequency::Vertex).is_empty());
    }

    #[test]
    fn equality_is_structural_and_order_sensitive() {
        let mut a = UniformExpressionSet::new();
        a.add_scalar(ShaderFrequency::Pixel, &scalar_param("A"));
        a.add_scalar(ShaderFrequency::Pixel, &scalar_param("B"));

        let mut same = UniformExpressionSet::new();
        same.add_scalar(ShaderFrequency::Pixel, &scalar_param("A"));
        same.add_scalar(ShaderFrequency::Pixel, &scalar_param("B"));

        let mut swapped = UniformExpressionSet::new();
        swapped.add_scalar(ShaderFrequency::Pixel, &scalar_param("B"));
        swapped.add_scalar(ShaderFrequency::Pixel, &scalar_param("A"));

        assert_eq!(a, same);
        assert_ne!(a, swapped);
        assert_ne!(a, UniformExpressionSet::new());
    }

    #[test]
    fn scalars_pack_four_per_register() {
        let mut set = UniformExpressionSet::new();
        for i in 0..5 {
            let expr = Arc::new(UniformExpression::scalar(i as f32));
            set.add_scalar(ShaderFrequency::Pixel, &expr);
        }
        set.add_vector(
            ShaderFrequency::Pixel,
            &Arc::new(UniformExpression::constant([1.0, 2.0, 3.0, 4.0], ValueType::Float4)),
        );

        let values = set.evaluate(&RenderContext::default(), &NoOverrides);
        let pixel = values.stage(ShaderFrequency::Pixel);
        assert_eq!(pixel.scalar_registers, vec![[0.0, 1.0, 2.0, 3.0], [4.0, 0.0, 0.0, 0.0]]);
        assert_eq!(pixel.vector_registers, vec![[1.0, 2.0, 3.0, 4.0]]);
        assert_eq!(pixel.uniform_bytes().len(), 3 * 16);
    }

    #[test]
    fn texture_parameters_resolve_through_overrides() {
        let mut set = UniformExpressionSet::new();
        set.add_texture_2d(
            ShaderFrequency::Pixel,
            &Arc::new(UniformExpression::TextureParameter {
                name: "Albedo".to_string(),
                default_texture: TextureRef::new("textures/default.png"),
            }),
        );
        let mut overrides = ParameterOverrides::new();
        overrides.set_texture("Albedo", TextureRef::new("textures/brick.png"));

        let values = set.evaluate(&RenderContext::default(), &overrides);
        assert_eq!(
            values.stage(ShaderFrequency::Pixel).textures_2d,
            vec![Some(TextureRef::new("textures/brick.png"))]
        );
        assert_eq!(set.sampler_count(ShaderFrequency::Pixel), 1);
    }

    #[test]
    fn summary_lists_non_empty_stages() {
        let mut set = UniformExpressionSet::new();
        assert_eq!(set.summary(), "no uniform expressions");
        set.add_scalar(ShaderFrequency::Pixel, &scalar_param("A"));
        assert_eq!(set.summary(), "pixel: 1 scalars, 0 vectors, 0 textures");
    }
}
