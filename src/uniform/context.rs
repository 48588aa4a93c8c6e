//! Render-time inputs consumed when evaluating uniform expressions.

use std::collections::HashMap;

use crate::types::TextureRef;

/// Time values supplied by the renderer for one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RenderContext {
    /// Game time in seconds. Stops while the game is paused.
    pub game_time: f32,
    /// Wall-clock time in seconds.
    pub real_time: f32,
}

impl RenderContext {
    pub fn new(game_time: f32, real_time: f32) -> Self {
        Self {
            game_time,
            real_time,
        }
    }
}

/// Named parameter lookup provided by the material instance chain.
///
/// Only consulted when evaluating parameter expressions for a draw, never while translating.
pub trait ParameterSource {
    fn lookup_scalar(&self, name: &str) -> Option<f32>;
    fn lookup_vector(&self, name: &str) -> Option<[f32; 4]>;
    fn lookup_texture(&self, name: &str) -> Option<TextureRef>;
}

/// Parameter source that never overrides anything; every parameter evaluates to its default.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOverrides;

impl ParameterSource for NoOverrides {
    fn lookup_scalar(&self, _name: &str) -> Option<f32> {
        None
    }

    fn lookup_vector(&self, _name: &str) -> Option<[f32; 4]> {
        None
    }

    fn lookup_texture(&self, _name: &str) -> Option<TextureRef> {
        None
    }
}

/// Flat map of parameter overrides.
#[derive(Clone, Debug, Default)]
pub struct ParameterOverrides {
    scalars: HashMap<String, f32>,
    vectors: HashMap<String, [f32; 4]>,
    textures: HashMap<String, TextureRef>,
}

impl ParameterOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_scalar(&mut self, name: impl Into<String>, value: f32) -> &mut Self {
        self.scalars.insert(name.into(), value);
        self
    }

    pub fn set_vector(&mut self, name: impl Into<String>, value: [f32; 4]) -> &mut Self {
        self.vectors.insert(name.into(), value);
        self
    }

    pub fn set_texture(&mut self, name: impl Into<String>, value: TextureRef) -> &mut Self {
        self.textures.insert(name.into(), value);
        self
    }
}

impl ParameterSource for ParameterOverrides {
    fn lookup_scalar(&self, name: &str) -> Option<f32> {
        self.scalars.get(name).copied()
    }

    fn lookup_vector(&self, name: &str) -> Option<[f32; 4]> {
        self.vectors.get(name).copied()
    }

    fn lookup_texture(&self, name: &str) -> Option<TextureRef> {
        self.textures.get(name).cloned()
    }
}
