//! [`MaterialCompiler`] implementation that emits WGSL.

use std::collections::BTreeMap;

use log::debug;

use crate::error::{Diagnostic, TranslationError};
use crate::shader_map::key::StaticSwitchSet;
use crate::types::{
    CoordinateSpace, MaterialProperty, Platform, Quality, ShaderFrequency, TextureRef, ValueType,
};
use crate::uniform::{
    FoldedOp, NoOverrides, RenderContext, UniformExprRef, UniformExpression, UniformExpressionSet,
};

use super::chunk::{ChunkFlags, ChunkId, ChunkTable, CodeChunk};
use super::coercion::{CastPlan, plan_force_cast, plan_valid_cast};
use super::compiler::{
    Code, Compilable, FunctionCallSite, FunctionCompileState, MaterialCompiler, MaterialSource,
    StackEntry, TranslationContext,
};
use super::template::{self, PropertyCode};
use super::utils::{fmt_f32, literal, swizzle};

/// Result of translating one material.
#[derive(Clone, Debug)]
pub struct TranslationOutput {
    pub friendly_name: String,
    /// Present only when translation produced no diagnostics.
    pub shader_text: Option<String>,
    pub uniform_expression_set: UniformExpressionSet,
    pub diagnostics: Vec<Diagnostic>,
    /// Longest chain of dependent texture samples feeding each property.
    pub texture_dependency_lengths: BTreeMap<MaterialProperty, u32>,
    pub max_texture_dependency_length: u32,
}

impl TranslationOutput {
    pub fn succeeded(&self) -> bool {
        self.diagnostics.is_empty() && self.shader_text.is_some()
    }
}

/// Result type of a component-wise binary operation.
///
/// Equal types keep their type. A scalar against a vector takes the vector's type and is splatted
/// in the emitted code. Anything else is a mismatch.
pub fn resolve_arithmetic(a: ValueType, b: ValueType) -> Result<ValueType, TranslationError> {
    let undefined =
        || TranslationError::type_mismatch(format!("Arithmetic between types {a} and {b} are undefined"));
    if !(a.is_float() && b.is_float()) {
        return Err(undefined());
    }
    if a == b {
        return Ok(a);
    }
    match (a.num_components(), b.num_components()) {
        (1, 1) => Ok(ValueType::Float1),
        (1, _) => Ok(b),
        (_, 1) => Ok(a),
        _ => Err(undefined()),
    }
}

pub struct WgslTranslator {
    context: TranslationContext,
    chunks: ChunkTable,
    uniforms: UniformExpressionSet,
    root: FunctionCompileState,
    functions: Vec<FunctionCompileState>,
    /// Every call site being inlined, outermost first. Unlike `functions`, frames stay here while
    /// their function is suspended to resolve a caller-side input.
    call_sites: Vec<FunctionCallSite>,
    diagnostics: Vec<Diagnostic>,
    texture_dependency_lengths: BTreeMap<MaterialProperty, u32>,
}

impl WgslTranslator {
    pub fn new(platform: Platform, quality: Quality, static_switches: StaticSwitchSet) -> Self {
        Self {
            context: TranslationContext::new(platform, quality, static_switches),
            chunks: ChunkTable::new(),
            uniforms: UniformExpressionSet::new(),
            root: FunctionCompileState::default(),
            functions: Vec::new(),
            call_sites: Vec::new(),
            diagnostics: Vec::new(),
            texture_dependency_lengths: BTreeMap::new(),
        }
    }

    /// Switch to translating `property`. Chunks already produced for other properties are kept.
    pub fn begin_property(&mut self, property: MaterialProperty) {
        self.context = self.context.for_property(property);
        self.chunks.set_property(property);
        self.functions.clear();
        self.root.expression_stack.clear();
    }

    pub fn chunk(&self, id: ChunkId) -> &CodeChunk {
        self.chunks.get(id)
    }

    pub fn chunk_table(&self) -> &ChunkTable {
        &self.chunks
    }

    /// Value of a constant chunk, folded through any casts and masks applied to it.
    pub fn constant_value(&self, code: Code) -> Option<[f32; 4]> {
        self.chunks.get(code?).constant_value()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn uniform_expression_set(&self) -> &UniformExpressionSet {
        &self.uniforms
    }

    pub fn translate(mut self, source: &dyn MaterialSource) -> TranslationOutput {
        let mut properties = Vec::with_capacity(MaterialProperty::COUNT);
        for property in MaterialProperty::ALL {
            let code = self.translate_property(source, property);
            properties.push(code.unwrap_or_default());
        }

        let shader_text = self.diagnostics.is_empty().then(|| {
            template::assemble(
                source.friendly_name(),
                source.settings(),
                &self.uniforms,
                &properties,
            )
        });
        let max_texture_dependency_length = self
            .texture_dependency_lengths
            .values()
            .copied()
            .max()
            .unwrap_or(0);

        debug!(
            "Translated material '{}': {} diagnostic(s), {}",
            source.friendly_name(),
            self.diagnostics.len(),
            self.uniforms.summary()
        );

        TranslationOutput {
            friendly_name: source.friendly_name().to_string(),
            shader_text,
            uniform_expression_set: self.uniforms,
            diagnostics: self.diagnostics,
            texture_dependency_lengths: self.texture_dependency_lengths,
            max_texture_dependency_length,
        }
    }

    fn translate_property(
        &mut self,
        source: &dyn MaterialSource,
        property: MaterialProperty,
    ) -> Option<PropertyCode> {
        self.begin_property(property);
        let code = if source.is_property_connected(property) {
            source.compile_property(property, self)
        } else {
            self.property_default(property)
        };
        if code.is_none() && self.diagnostics.is_empty() {
            self.record(TranslationError::invalid(format!("{property} produced no value")));
        }

        let result = self.force_cast(code, property.output_type(), true, true)?;
        let text = self.text(result)?;
        let dep = self.dep(result);
        self.texture_dependency_lengths.insert(property, dep);

        let locals = self
            .chunks
            .chunks(property)
            .iter()
            .filter_map(|c| {
                c.symbol_name
                    .clone()
                    .map(|symbol| (symbol, c.value_type, c.definition.clone()))
            })
            .collect();
        Some(PropertyCode {
            locals,
            result: text,
        })
    }

    fn property_default(&mut self, property: MaterialProperty) -> Code {
        let v = property.default_value();
        match property.output_type().num_components() {
            1 => self.constant(v[0]),
            2 => self.constant2(v[0], v[1]),
            3 => self.constant3(v[0], v[1], v[2]),
            _ => self.constant4(v[0], v[1], v[2], v[3]),
        }
    }

    fn state_mut(&mut self) -> &mut FunctionCompileState {
        self.functions.last_mut().unwrap_or(&mut self.root)
    }

    fn record(&mut self, error: TranslationError) {
        let current = self
            .functions
            .iter()
            .rev()
            .chain(std::iter::once(&self.root))
            .find_map(|s| s.expression_stack.last());
        let function_context = self
            .call_sites
            .first()
            .map(|call| format!("Function {}", call.function));

        let diagnostic = Diagnostic {
            error,
            offending_node_class: current.map(|e| e.class_name.clone()),
            offending_node_id: current.map(|e| e.node_id.clone()),
            function_context,
        };
        if !self.diagnostics.contains(&diagnostic) {
            self.diagnostics.push(diagnostic);
        }
    }

    fn dep(&self, id: ChunkId) -> u32 {
        self.chunks.get(id).texture_dependency_length
    }

    /// Text that references `id` from the current stage.
    fn text(&mut self, id: ChunkId) -> Option<String> {
        let frequency = self.context.frequency;
        match self.chunks.parameter_code(id, frequency, &mut self.uniforms) {
            Ok(text) => Some(text),
            Err(e) => {
                self.record(e);
                None
            }
        }
    }

    /// Text for `id` used as an operand of a `ty`-typed operation, splatting scalars.
    fn operand_text(&mut self, id: ChunkId, ty: ValueType) -> Option<String> {
        let text = self.text(id)?;
        if self.value_type(id).num_components() == 1 && ty.num_components() > 1 {
            return Some(format!("{}({text})", ty.wgsl()));
        }
        Some(text)
    }

    /// Uniform expression of `id` when it may be folded into a composite uniform expression.
    /// Only parameter-free, non-texture expressions fold, so every parameter owns exactly one slot.
    fn foldable(&self, id: ChunkId) -> Option<UniformExprRef> {
        let expr = self.chunks.get(id).uniform_expression.as_ref()?;
        (!expr.references_parameters() && expr.texture().is_none()).then(|| expr.clone())
    }

    fn add_uniform(&mut self, expression: UniformExpression, ty: ValueType) -> Code {
        let definition = if expression.is_constant() {
            literal(expression.evaluate(&RenderContext::default(), &NoOverrides), ty)
        } else {
            String::new()
        };
        match self.chunks.add_uniform_expression(expression, ty, definition) {
            Ok(id) => Some(id),
            Err(e) => self.error(e),
        }
    }

    fn emit(&mut self, ty: ValueType, definition: String, dep: u32) -> Code {
        self.emit_with_flags(ty, definition, dep, ChunkFlags::empty())
    }

    fn emit_with_flags(&mut self, ty: ValueType, definition: String, dep: u32, flags: ChunkFlags) -> Code {
        match self.chunks.add_code_chunk(ty, definition, dep, flags) {
            Ok(id) => Some(id),
            Err(e) => self.error(e),
        }
    }

    fn inline(&mut self, ty: ValueType, definition: String, dep: u32) -> Code {
        Some(self.chunks.add_inline_chunk(ty, definition, dep, ChunkFlags::empty()))
    }

    fn require_float(&mut self, id: ChunkId, operation: &str) -> Option<ValueType> {
        let ty = self.value_type(id);
        if ty.is_float() {
            return Some(ty);
        }
        self.record(TranslationError::type_mismatch(format!(
            "{operation} requires a numeric input, got {ty}"
        )));
        None
    }

    fn arithmetic_type(&mut self, a: ChunkId, b: ChunkId) -> Option<ValueType> {
        match resolve_arithmetic(self.value_type(a), self.value_type(b)) {
            Ok(ty) => Some(ty),
            Err(e) => {
                self.record(e);
                None
            }
        }
    }

    fn unary(
        &mut self,
        x: Code,
        operation: &str,
        function: &str,
        fold: Option<fn(UniformExprRef) -> UniformExpression>,
    ) -> Code {
        let x = x?;
        let ty = self.require_float(x, operation)?;
        if let (Some(fold), Some(u)) = (fold, self.foldable(x)) {
            return self.add_uniform(fold(u), ty);
        }
        let code = self.text(x)?;
        let dep = self.dep(x);
        self.emit(ty, format!("{function}({code})"), dep)
    }

    fn binary(
        &mut self,
        a: Code,
        b: Code,
        fold: Option<&dyn Fn(UniformExprRef, UniformExprRef, u8) -> UniformExpression>,
        emit: &dyn Fn(&str, &str) -> String,
    ) -> Code {
        let (a, b) = (a?, b?);
        let ty = self.arithmetic_type(a, b)?;
        if let (Some(fold), Some(ua), Some(ub)) = (fold, self.foldable(a), self.foldable(b)) {
            return self.add_uniform(fold(ua, ub, ty.num_components() as u8), ty);
        }
        let ca = self.operand_text(a, ty)?;
        let cb = self.operand_text(b, ty)?;
        let dep = self.dep(a).max(self.dep(b));
        self.emit(ty, emit(&ca, &cb), dep)
    }

    fn folded_op(&mut self, a: Code, b: Code, op: FoldedOp, symbol: &'static str) -> Code {
        let fold = move |a: UniformExprRef, b: UniformExprRef, components: u8| UniformExpression::Folded {
            op,
            a,
            b,
            components,
        };
        self.binary(a, b, Some(&fold), &|a: &str, b: &str| format!("({a} {symbol} {b})"))
    }

    fn apply_cast(&mut self, id: ChunkId, plan: CastPlan, dest: ValueType) -> Code {
        let source = self.value_type(id);
        if plan == CastPlan::Identity && source == dest {
            return Some(id);
        }
        if let Some(value) = self.chunks.get(id).constant_value() {
            let value = plan.apply_to_value(value, dest);
            return self.add_uniform(UniformExpression::constant(value, dest), dest);
        }
        let text = self.text(id)?;
        let dep = self.dep(id);
        self.inline(dest, plan.apply_to_code(&text, dest), dep)
    }

    fn derivative(&mut self, x: Code, operation: &str, function: &str) -> Code {
        let x = x?;
        let stage = self.context.frequency;
        if stage != ShaderFrequency::Pixel {
            return self.error(TranslationError::UnsupportedInStage {
                operation: operation.to_string(),
                stage,
            });
        }
        self.unary(Some(x), operation, function, None)
    }

    fn decode_sample(&mut self, raw: ChunkId, flags: ChunkFlags, dep: u32) -> Code {
        if flags.is_empty() {
            return Some(raw);
        }
        let s = self.text(raw)?;
        let definition = if flags.contains(ChunkFlags::NORMAL_MAP) {
            format!("vec4f({s}.rgb * 2.0 - 1.0, 1.0)")
        } else if flags.contains(ChunkFlags::RGBE_ENCODED) {
            format!("vec4f({s}.rgb * exp2({s}.a * 255.0 - 128.0), 1.0)")
        } else {
            format!("vec4f({s}.rrr, 1.0)")
        };
        self.emit(ValueType::Float4, definition, dep)
    }
}

impl MaterialCompiler for WgslTranslator {
    fn context(&self) -> &TranslationContext {
        &self.context
    }

    fn error(&mut self, error: TranslationError) -> Code {
        self.record(error);
        None
    }

    fn call_expression(&mut self, expression: &dyn Compilable, output: &str) -> Code {
        let key = expression.expression_key(output);
        let map_key = (self.context.property, key.clone());

        let state = self.state_mut();
        if let Some(id) = state.code_map.get(&map_key) {
            return Some(*id);
        }
        if state.expression_stack.iter().any(|e| e.key == key) {
            return self.error(TranslationError::CyclicReference(format!(
                "Reentrant expression {} '{}'",
                expression.class_name(),
                expression.node_id()
            )));
        }
        state.expression_stack.push(StackEntry {
            key,
            class_name: expression.class_name().to_string(),
            node_id: expression.node_id().to_string(),
        });

        let result = expression.compile(self, output);

        let state = self.state_mut();
        state.expression_stack.pop();
        if let Some(id) = result {
            state.code_map.insert(map_key, id);
        }
        result
    }

    fn begin_function_call(&mut self, site: FunctionCallSite) -> bool {
        let recursive = self
            .functions
            .iter()
            .filter_map(|s| s.call())
            .any(|call| call.function == site.function);
        if recursive {
            self.record(TranslationError::CyclicReference(format!(
                "Function {} recursively calls itself",
                site.function
            )));
            return false;
        }
        self.call_sites.push(site.clone());
        self.functions.push(FunctionCompileState {
            call: Some(site),
            ..Default::default()
        });
        true
    }

    fn end_function_call(&mut self) {
        self.functions.pop();
        self.call_sites.pop();
    }

    fn suspend_function(&mut self) -> Option<FunctionCompileState> {
        self.functions.pop()
    }

    fn resume_function(&mut self, state: FunctionCompileState) {
        self.functions.push(state);
    }

    fn value_type(&self, code: ChunkId) -> ValueType {
        self.chunks.get(code).value_type
    }

    fn static_bool_value(&mut self, code: Code) -> Option<bool> {
        let id = code?;
        let chunk = self.chunks.get(id);
        if chunk.value_type != ValueType::StaticBool {
            let ty = chunk.value_type;
            self.record(TranslationError::type_mismatch(format!(
                "Expected a static bool input, got {ty}"
            )));
            return None;
        }
        Some(chunk.definition == "true")
    }

    fn valid_cast(&mut self, code: Code, dest: ValueType) -> Code {
        let id = code?;
        match plan_valid_cast(self.value_type(id), dest) {
            Ok(plan) => self.apply_cast(id, plan, dest),
            Err(e) => self.error(e),
        }
    }

    fn force_cast(&mut self, code: Code, dest: ValueType, exact: bool, replicate: bool) -> Code {
        let id = code?;
        match plan_force_cast(self.value_type(id), dest, exact, replicate) {
            Ok(plan) => self.apply_cast(id, plan, dest),
            Err(e) => self.error(e),
        }
    }

    fn constant(&mut self, x: f32) -> Code {
        self.add_uniform(UniformExpression::scalar(x), ValueType::Float)
    }

    fn constant2(&mut self, x: f32, y: f32) -> Code {
        self.add_uniform(
            UniformExpression::constant([x, y, 0.0, 0.0], ValueType::Float2),
            ValueType::Float2,
        )
    }

    fn constant3(&mut self, x: f32, y: f32, z: f32) -> Code {
        self.add_uniform(
            UniformExpression::constant([x, y, z, 0.0], ValueType::Float3),
            ValueType::Float3,
        )
    }

    fn constant4(&mut self, x: f32, y: f32, z: f32, w: f32) -> Code {
        self.add_uniform(
            UniformExpression::constant([x, y, z, w], ValueType::Float4),
            ValueType::Float4,
        )
    }

    fn scalar_parameter(&mut self, name: &str, default_value: f32) -> Code {
        if name.is_empty() {
            return self.error(TranslationError::invalid("Scalar parameter has no name"));
        }
        self.add_uniform(
            UniformExpression::ScalarParameter {
                name: name.to_string(),
                default_value,
            },
            ValueType::Float,
        )
    }

    fn vector_parameter(&mut self, name: &str, default_value: [f32; 4]) -> Code {
        if name.is_empty() {
            return self.error(TranslationError::invalid("Vector parameter has no name"));
        }
        self.add_uniform(
            UniformExpression::VectorParameter {
                name: name.to_string(),
                default_value,
            },
            ValueType::Float4,
        )
    }

    fn texture_parameter(&mut self, name: &str, default_texture: TextureRef) -> Code {
        if name.is_empty() {
            return self.error(TranslationError::invalid("Texture parameter has no name"));
        }
        let ty = default_texture.value_type();
        self.add_uniform(
            UniformExpression::TextureParameter {
                name: name.to_string(),
                default_texture,
            },
            ty,
        )
    }

    fn texture(&mut self, texture: TextureRef) -> Code {
        let ty = texture.value_type();
        self.add_uniform(UniformExpression::Texture { texture }, ty)
    }

    fn static_bool(&mut self, value: bool) -> Code {
        let definition = if value { "true" } else { "false" };
        Some(self.chunks.add_inline_chunk(
            ValueType::StaticBool,
            definition.to_string(),
            0,
            ChunkFlags::empty(),
        ))
    }

    fn static_switch_parameter(&mut self, name: &str, default_value: bool) -> Code {
        let value = self
            .context
            .static_switches
            .get_bool(name)
            .unwrap_or(default_value);
        self.static_bool(value)
    }

    fn static_component_mask(&mut self, vector: Code, name: &str, default_mask: [bool; 4]) -> Code {
        let [r, g, b, a] = self
            .context
            .static_switches
            .get_mask(name)
            .unwrap_or(default_mask);
        self.component_mask(vector, r, g, b, a)
    }

    fn game_time(&mut self) -> Code {
        self.add_uniform(UniformExpression::GameTime, ValueType::Float)
    }

    fn real_time(&mut self) -> Code {
        self.add_uniform(UniformExpression::RealTime, ValueType::Float)
    }

    fn periodic_hint(&mut self, x: Code) -> Code {
        let x = x?;
        match self.foldable(x) {
            Some(u) => {
                let ty = self.value_type(x);
                self.add_uniform(UniformExpression::Periodic { x: u }, ty)
            }
            None => Some(x),
        }
    }

    fn sine(&mut self, x: Code) -> Code {
        self.unary(x, "Sine", "sin", Some(|x| UniformExpression::Sine { x }))
    }

    fn cosine(&mut self, x: Code) -> Code {
        self.unary(x, "Cosine", "cos", Some(|x| UniformExpression::Cosine { x }))
    }

    fn square_root(&mut self, x: Code) -> Code {
        self.unary(x, "SquareRoot", "sqrt", Some(|x| UniformExpression::SquareRoot { x }))
    }

    fn length(&mut self, x: Code) -> Code {
        let x = x?;
        let ty = self.require_float(x, "Length")?;
        if let Some(u) = self.foldable(x) {
            return self.add_uniform(
                UniformExpression::Length {
                    x: u,
                    components: ty.num_components() as u8,
                },
                ValueType::Float,
            );
        }
        let code = self.text(x)?;
        let dep = self.dep(x);
        self.emit(ValueType::Float, format!("length({code})"), dep)
    }

    fn abs(&mut self, x: Code) -> Code {
        self.unary(x, "Abs", "abs", Some(|x| UniformExpression::Abs { x }))
    }

    fn floor(&mut self, x: Code) -> Code {
        self.unary(x, "Floor", "floor", Some(|x| UniformExpression::Floor { x }))
    }

    fn ceil(&mut self, x: Code) -> Code {
        self.unary(x, "Ceil", "ceil", Some(|x| UniformExpression::Ceil { x }))
    }

    fn frac(&mut self, x: Code) -> Code {
        self.unary(x, "Frac", "fract", Some(|x| UniformExpression::Frac { x }))
    }

    fn normalize(&mut self, x: Code) -> Code {
        let id = x?;
        let ty = self.require_float(id, "Normalize")?;
        if ty.num_components() < 2 {
            return self.error(TranslationError::type_mismatch(format!(
                "Normalize requires a vector input, got {ty}"
            )));
        }
        self.unary(x, "Normalize", "normalize", None)
    }

    fn fmod(&mut self, a: Code, b: Code) -> Code {
        self.binary(
            a,
            b,
            Some(&|a: UniformExprRef, b: UniformExprRef, _: u8| UniformExpression::Fmod { a, b }),
            &|a: &str, b: &str| format!("({a} % {b})"),
        )
    }

    fn power(&mut self, base: Code, exponent: Code) -> Code {
        self.binary(base, exponent, None, &|a: &str, b: &str| format!("pow({a}, {b})"))
    }

    fn add(&mut self, a: Code, b: Code) -> Code {
        self.folded_op(a, b, FoldedOp::Add, "+")
    }

    fn sub(&mut self, a: Code, b: Code) -> Code {
        self.folded_op(a, b, FoldedOp::Sub, "-")
    }

    fn mul(&mut self, a: Code, b: Code) -> Code {
        self.folded_op(a, b, FoldedOp::Mul, "*")
    }

    fn div(&mut self, a: Code, b: Code) -> Code {
        self.folded_op(a, b, FoldedOp::Div, "/")
    }

    fn dot(&mut self, a: Code, b: Code) -> Code {
        let (a, b) = (a?, b?);
        let ta = self.require_float(a, "Dot")?;
        let tb = self.require_float(b, "Dot")?;
        let n = ta.num_components();
        if n != tb.num_components() {
            return self.error(TranslationError::type_mismatch(format!(
                "Dot product requires inputs of equal size ({ta}, {tb})"
            )));
        }
        if let (Some(ua), Some(ub)) = (self.foldable(a), self.foldable(b)) {
            return self.add_uniform(
                UniformExpression::Folded {
                    op: FoldedOp::Dot,
                    a: ua,
                    b: ub,
                    components: n as u8,
                },
                ValueType::Float,
            );
        }
        let ca = self.text(a)?;
        let cb = self.text(b)?;
        let dep = self.dep(a).max(self.dep(b));
        let code = if n == 1 {
            format!("({ca} * {cb})")
        } else {
            format!("dot({ca}, {cb})")
        };
        self.emit(ValueType::Float, code, dep)
    }

    fn cross(&mut self, a: Code, b: Code) -> Code {
        let (a, b) = (a?, b?);
        let (ta, tb) = (self.value_type(a), self.value_type(b));
        if ta != ValueType::Float3 || tb != ValueType::Float3 {
            return self.error(TranslationError::type_mismatch(format!(
                "Cross product requires float3 inputs, got {ta} and {tb}"
            )));
        }
        let ca = self.text(a)?;
        let cb = self.text(b)?;
        let dep = self.dep(a).max(self.dep(b));
        self.emit(ValueType::Float3, format!("cross({ca}, {cb})"), dep)
    }

    fn min(&mut self, a: Code, b: Code) -> Code {
        self.binary(
            a,
            b,
            Some(&|a: UniformExprRef, b: UniformExprRef, _: u8| UniformExpression::Min { a, b }),
            &|a: &str, b: &str| format!("min({a}, {b})"),
        )
    }

    fn max(&mut self, a: Code, b: Code) -> Code {
        self.binary(
            a,
            b,
            Some(&|a: UniformExprRef, b: UniformExprRef, _: u8| UniformExpression::Max { a, b }),
            &|a: &str, b: &str| format!("max({a}, {b})"),
        )
    }

    fn lerp(&mut self, a: Code, b: Code, alpha: Code) -> Code {
        let (a, b, alpha) = (a?, b?, alpha?);
        let ty = self.arithmetic_type(a, b)?;
        let alpha_ty = self.require_float(alpha, "Lerp")?;
        if alpha_ty.num_components() != 1 && alpha_ty.num_components() != ty.num_components() {
            return self.error(TranslationError::type_mismatch(format!(
                "Lerp alpha of type {alpha_ty} does not match {ty}"
            )));
        }
        let ca = self.operand_text(a, ty)?;
        let cb = self.operand_text(b, ty)?;
        let calpha = self.operand_text(alpha, ty)?;
        let dep = self.dep(a).max(self.dep(b)).max(self.dep(alpha));
        self.emit(ty, format!("mix({ca}, {cb}, {calpha})"), dep)
    }

    fn clamp(&mut self, x: Code, min: Code, max: Code) -> Code {
        let (x, lo, hi) = (x?, min?, max?);
        let ty = match resolve_arithmetic(self.value_type(x), self.value_type(lo))
            .and_then(|t| resolve_arithmetic(t, self.value_type(hi)))
        {
            Ok(ty) => ty,
            Err(e) => return self.error(e),
        };
        if let (Some(ux), Some(ulo), Some(uhi)) = (self.foldable(x), self.foldable(lo), self.foldable(hi)) {
            return self.add_uniform(
                UniformExpression::Clamp {
                    input: ux,
                    min: ulo,
                    max: uhi,
                },
                ty,
            );
        }
        let cx = self.operand_text(x, ty)?;
        let clo = self.operand_text(lo, ty)?;
        let chi = self.operand_text(hi, ty)?;
        let dep = self.dep(x).max(self.dep(lo)).max(self.dep(hi));
        self.emit(ty, format!("clamp({cx}, {clo}, {chi})"), dep)
    }

    fn component_mask(&mut self, vector: Code, r: bool, g: bool, b: bool, a: bool) -> Code {
        let id = vector?;
        let ty = self.require_float(id, "ComponentMask")?;
        let mask = [r, g, b, a];
        let selected = mask.iter().filter(|m| **m).count();
        if selected == 0 {
            return self.error(TranslationError::invalid(
                "Component mask must select at least one component",
            ));
        }
        let n = ty.num_components();
        if (g && n < 2) || (b && n < 3) || (a && n < 4) {
            return self.error(TranslationError::type_mismatch(format!(
                "Not enough components in {ty} value for component mask {}",
                swizzle(mask)
            )));
        }
        if n == 1 {
            return Some(id);
        }

        let result_ty = ValueType::from_components(selected);
        if let Some(value) = self.chunks.get(id).constant_value() {
            let mut lanes = [0.0; 4];
            for (slot, (v, _)) in value.iter().zip(mask).filter(|(_, on)| *on).enumerate() {
                lanes[slot] = *v;
            }
            return self.add_uniform(UniformExpression::constant(lanes, result_ty), result_ty);
        }
        let code = self.text(id)?;
        let dep = self.dep(id);
        self.inline(result_ty, format!("{code}.{}", swizzle(mask)), dep)
    }

    fn append_vector(&mut self, a: Code, b: Code) -> Code {
        let (a, b) = (a?, b?);
        let ta = self.require_float(a, "AppendVector")?;
        let tb = self.require_float(b, "AppendVector")?;
        let (na, nb) = (ta.num_components(), tb.num_components());
        if na + nb > 4 {
            return self.error(TranslationError::type_mismatch(format!(
                "Can't append {tb} to {ta}: the result would have more than 4 components"
            )));
        }
        let ty = ValueType::from_components(na + nb);
        if let (Some(ua), Some(ub)) = (self.foldable(a), self.foldable(b)) {
            return self.add_uniform(
                UniformExpression::AppendVector {
                    a: ua,
                    b: ub,
                    a_components: na as u8,
                },
                ty,
            );
        }
        let ca = self.text(a)?;
        let cb = self.text(b)?;
        let dep = self.dep(a).max(self.dep(b));
        self.emit(ty, format!("{}({ca}, {cb})", ty.wgsl()), dep)
    }

    fn transform_vector(&mut self, source: CoordinateSpace, dest: CoordinateSpace, x: Code) -> Code {
        let x = self.valid_cast(x, ValueType::Float3)?;
        if source == dest {
            return Some(x);
        }
        let v = self.text(x)?;
        let world = match source {
            CoordinateSpace::World => v,
            CoordinateSpace::Tangent => format!("(p.tangent_to_world * {v})"),
            CoordinateSpace::Local => format!("(view.local_to_world * vec4f({v}, 0.0)).xyz"),
            CoordinateSpace::View => format!("(view.view_to_world * vec4f({v}, 0.0)).xyz"),
        };
        let code = match dest {
            CoordinateSpace::World => world,
            CoordinateSpace::Tangent => format!("(transpose(p.tangent_to_world) * {world})"),
            CoordinateSpace::Local => format!("(view.world_to_local * vec4f({world}, 0.0)).xyz"),
            CoordinateSpace::View => format!("(view.world_to_view * vec4f({world}, 0.0)).xyz"),
        };
        let dep = self.dep(x);
        self.emit(ValueType::Float3, code, dep)
    }

    fn texture_coordinate(&mut self, index: u32, u_tiling: f32, v_tiling: f32) -> Code {
        let field = match index {
            0 => "p.uv0",
            1 => "p.uv1",
            _ => {
                return self.error(TranslationError::invalid(format!(
                    "Texture coordinate index {index} is not available (only 0 and 1)"
                )));
            }
        };
        if u_tiling == 1.0 && v_tiling == 1.0 {
            return self.inline(ValueType::Float2, field.to_string(), 0);
        }
        self.emit(
            ValueType::Float2,
            format!("({field} * vec2f({}, {}))", fmt_f32(u_tiling), fmt_f32(v_tiling)),
            0,
        )
    }

    fn texture_sample(&mut self, texture: Code, coordinate: Code) -> Code {
        let (texture, coordinate) = (texture?, coordinate?);
        let coordinate_ty = match self.value_type(texture) {
            ValueType::Texture2D => ValueType::Float2,
            ValueType::TextureCube => ValueType::Float3,
            other => {
                return self.error(TranslationError::type_mismatch(format!(
                    "Sampling requires a texture input, got {other}"
                )));
            }
        };
        let coordinate = self.valid_cast(Some(coordinate), coordinate_ty)?;
        let flags = self.chunks.get(texture).flags;
        let binding = self.text(texture)?;

        let frequency = self.context.frequency;
        let platform = self.context.platform;
        let samplers = self.uniforms.sampler_count(frequency);
        if samplers > platform.max_texture_samplers() {
            return self.error(TranslationError::invalid(format!(
                "Material uses {samplers} texture samplers in the {frequency} stage, {} allows {}",
                platform.name(),
                platform.max_texture_samplers()
            )));
        }

        let uv = self.text(coordinate)?;
        let sampler = template::sampler_name(&binding);
        let sample = if frequency == ShaderFrequency::Pixel {
            format!("textureSample({binding}, {sampler}, {uv})")
        } else {
            format!("textureSampleLevel({binding}, {sampler}, {uv}, 0.0)")
        };
        let dep = self.dep(coordinate) + 1;
        let raw = self.emit_with_flags(ValueType::Float4, sample, dep, flags)?;
        self.decode_sample(raw, flags, dep)
    }

    fn vertex_color(&mut self) -> Code {
        self.inline(ValueType::Float4, "p.vertex_color".to_string(), 0)
    }

    fn world_position(&mut self) -> Code {
        self.inline(ValueType::Float3, "p.world_position".to_string(), 0)
    }

    fn camera_world_position(&mut self) -> Code {
        self.inline(ValueType::Float3, "view.camera_position.xyz".to_string(), 0)
    }

    fn camera_vector(&mut self) -> Code {
        self.emit(
            ValueType::Float3,
            "normalize(view.camera_position.xyz - p.world_position)".to_string(),
            0,
        )
    }

    fn ddx(&mut self, x: Code) -> Code {
        self.derivative(x, "DDX", "dpdx")
    }

    fn ddy(&mut self, x: Code) -> Code {
        self.derivative(x, "DDY", "dpdy")
    }
}
