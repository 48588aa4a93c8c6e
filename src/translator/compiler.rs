//! The contract between expression nodes and the translator.
//!
//! Nodes call back into a [`MaterialCompiler`] to build code. Every operation takes and returns a
//! [`Code`], where `None` is the sentinel for "an error was already recorded". Operations that
//! receive a sentinel input return a sentinel without recording anything further.

use std::fmt;

use crate::error::TranslationError;
use crate::shader_map::key::StaticSwitchSet;
use crate::types::{
    CoordinateSpace, MaterialProperty, MaterialSettings, Platform, Quality, ShaderFrequency,
    TextureRef, ValueType,
};

use super::chunk::ChunkId;

pub type Code = Option<ChunkId>;

/// Identity of one output of one expression, qualified by the scope it lives in.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExpressionKey {
    pub scope: String,
    pub node_id: String,
    pub output: String,
}

impl fmt::Display for ExpressionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.scope, self.node_id, self.output)
    }
}

/// An expression node that can compile one of its outputs.
pub trait Compilable {
    fn compile(&self, compiler: &mut dyn MaterialCompiler, output: &str) -> Code;

    /// Node kind, used when attributing diagnostics.
    fn class_name(&self) -> &str;

    fn node_id(&self) -> &str;

    fn expression_key(&self, output: &str) -> ExpressionKey;
}

/// A material the translator can run over: one root expression per connected property.
pub trait MaterialSource {
    fn friendly_name(&self) -> &str;

    fn settings(&self) -> &MaterialSettings;

    fn is_property_connected(&self, property: MaterialProperty) -> bool;

    /// Compile the root expression of `property`. Only called for connected properties.
    fn compile_property(&self, property: MaterialProperty, compiler: &mut dyn MaterialCompiler) -> Code;
}

/// Per-property translation state, replaced wholesale at each property boundary.
#[derive(Clone, Debug, PartialEq)]
pub struct TranslationContext {
    pub property: MaterialProperty,
    pub frequency: ShaderFrequency,
    pub platform: Platform,
    pub quality: Quality,
    pub static_switches: StaticSwitchSet,
}

impl TranslationContext {
    pub fn new(platform: Platform, quality: Quality, static_switches: StaticSwitchSet) -> Self {
        Self {
            property: MaterialProperty::EmissiveColor,
            frequency: ShaderFrequency::Pixel,
            platform,
            quality,
            static_switches,
        }
    }

    pub fn for_property(&self, property: MaterialProperty) -> Self {
        Self {
            property,
            frequency: property.frequency(),
            ..self.clone()
        }
    }
}

/// Where a reusable function body is being inlined from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionCallSite {
    pub function: String,
    pub node_id: String,
    pub class_name: String,
}

pub trait MaterialCompiler {
    fn context(&self) -> &TranslationContext;

    /// Record a diagnostic against the node being compiled. Always returns the sentinel.
    fn error(&mut self, error: TranslationError) -> Code;

    /// Compile `output` of `expression`, reusing an earlier result for the same key within the
    /// current property and function scope.
    fn call_expression(&mut self, expression: &dyn Compilable, output: &str) -> Code;

    /// Enter a function body. Returns false, after recording a diagnostic, when the function is
    /// already being inlined further up the call chain.
    fn begin_function_call(&mut self, site: FunctionCallSite) -> bool;
    fn end_function_call(&mut self);

    /// Step out to the caller's scope while a function input is resolved.
    fn suspend_function(&mut self) -> Option<FunctionCompileState>;
    fn resume_function(&mut self, state: FunctionCompileState);

    fn value_type(&self, code: ChunkId) -> ValueType;
    fn static_bool_value(&mut self, code: Code) -> Option<bool>;
    fn valid_cast(&mut self, code: Code, dest: ValueType) -> Code;
    fn force_cast(&mut self, code: Code, dest: ValueType, exact: bool, replicate: bool) -> Code;

    fn constant(&mut self, x: f32) -> Code;
    fn constant2(&mut self, x: f32, y: f32) -> Code;
    fn constant3(&mut self, x: f32, y: f32, z: f32) -> Code;
    fn constant4(&mut self, x: f32, y: f32, z: f32, w: f32) -> Code;

    fn scalar_parameter(&mut self, name: &str, default_value: f32) -> Code;
    fn vector_parameter(&mut self, name: &str, default_value: [f32; 4]) -> Code;
    fn texture_parameter(&mut self, name: &str, default_texture: TextureRef) -> Code;
    fn texture(&mut self, texture: TextureRef) -> Code;

    fn static_bool(&mut self, value: bool) -> Code;
    fn static_switch_parameter(&mut self, name: &str, default_value: bool) -> Code;
    fn static_component_mask(&mut self, vector: Code, name: &str, default_mask: [bool; 4]) -> Code;

    fn game_time(&mut self) -> Code;
    fn real_time(&mut self) -> Code;
    fn periodic_hint(&mut self, x: Code) -> Code;

    fn sine(&mut self, x: Code) -> Code;
    fn cosine(&mut self, x: Code) -> Code;
    fn square_root(&mut self, x: Code) -> Code;
    fn length(&mut self, x: Code) -> Code;
    fn abs(&mut self, x: Code) -> Code;
    fn floor(&mut self, x: Code) -> Code;
    fn ceil(&mut self, x: Code) -> Code;
    fn frac(&mut self, x: Code) -> Code;
    fn normalize(&mut self, x: Code) -> Code;

    fn fmod(&mut self, a: Code, b: Code) -> Code;
    fn power(&mut self, base: Code, exponent: Code) -> Code;
    fn add(&mut self, a: Code, b: Code) -> Code;
    fn sub(&mut self, a: Code, b: Code) -> Code;
    fn mul(&mut self, a: Code, b: Code) -> Code;
    fn div(&mut self, a: Code, b: Code) -> Code;
    fn dot(&mut self, a: Code, b: Code) -> Code;
    fn cross(&mut self, a: Code, b: Code) -> Code;
    fn min(&mut self, a: Code, b: Code) -> Code;
    fn max(&mut self, a: Code, b: Code) -> Code;
    fn lerp(&mut self, a: Code, b: Code, alpha: Code) -> Code;
    fn clamp(&mut self, x: Code, min: Code, max: Code) -> Code;

    fn component_mask(&mut self, vector: Code, r: bool, g: bool, b: bool, a: bool) -> Code;
    fn append_vector(&mut self, a: Code, b: Code) -> Code;
    fn transform_vector(&mut self, source: CoordinateSpace, dest: CoordinateSpace, x: Code) -> Code;

    fn texture_coordinate(&mut self, index: u32, u_tiling: f32, v_tiling: f32) -> Code;
    fn texture_sample(&mut self, texture: Code, coordinate: Code) -> Code;

    fn vertex_color(&mut self) -> Code;
    fn world_position(&mut self) -> Code;
    fn camera_world_position(&mut self) -> Code;
    fn camera_vector(&mut self) -> Code;

    fn ddx(&mut self, x: Code) -> Code;
    fn ddy(&mut self, x: Code) -> Code;
}

/// One frame of the function inlining stack: its call site, the expressions currently being
/// compiled in it and the results already produced in it.
#[derive(Debug, Default)]
pub struct FunctionCompileState {
    pub(crate) call: Option<FunctionCallSite>,
    pub(crate) expression_stack: Vec<StackEntry>,
    pub(crate) code_map: std::collections::HashMap<(MaterialProperty, ExpressionKey), ChunkId>,
}

impl FunctionCompileState {
    pub fn call(&self) -> Option<&FunctionCallSite> {
        self.call.as_ref()
    }
}

#[derive(Clone, Debug)]
pub(crate) struct StackEntry {
    pub key: ExpressionKey,
    pub class_name: String,
    pub node_id: String,
}
