//! Core type definitions shared by the translator, the uniform expression tree and the shader map cache.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Value type carried by a code chunk.
///
/// `Float` is the unsized scalar produced by constants and scalar parameters. It unifies with
/// `Float1` but never broadcasts implicitly to wider vectors; widening always goes through an
/// explicit cast.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValueType {
    #[serde(rename = "float1")]
    Float1,
    #[serde(rename = "float2")]
    Float2,
    #[serde(rename = "float3")]
    Float3,
    #[serde(rename = "float4")]
    Float4,
    #[serde(rename = "float")]
    Float,
    #[serde(rename = "texture_2d")]
    Texture2D,
    #[serde(rename = "texture_cube")]
    TextureCube,
    #[serde(rename = "static_bool")]
    StaticBool,
    #[serde(rename = "unknown")]
    Unknown,
}

impl ValueType {
    pub fn is_float(self) -> bool {
        matches!(
            self,
            ValueType::Float | ValueType::Float1 | ValueType::Float2 | ValueType::Float3 | ValueType::Float4
        )
    }

    pub fn is_texture(self) -> bool {
        matches!(self, ValueType::Texture2D | ValueType::TextureCube)
    }

    /// Number of float components, or 0 for non-numeric types.
    pub fn num_components(self) -> usize {
        match self {
            ValueType::Float | ValueType::Float1 => 1,
            ValueType::Float2 => 2,
            ValueType::Float3 => 3,
            ValueType::Float4 => 4,
            _ => 0,
        }
    }

    /// Type of a value with `n` float components. A single component maps to the unsized scalar.
    pub fn from_components(n: usize) -> ValueType {
        match n {
            1 => ValueType::Float,
            2 => ValueType::Float2,
            3 => ValueType::Float3,
            4 => ValueType::Float4,
            _ => ValueType::Unknown,
        }
    }

    /// Identity relation used by non-exact casts: equal types, or the unsized scalar against `Float1`.
    pub fn is_compatible_with(self, other: ValueType) -> bool {
        self == other
            || matches!(
                (self, other),
                (ValueType::Float, ValueType::Float1) | (ValueType::Float1, ValueType::Float)
            )
    }

    /// Returns the WGSL type name for this value type.
    pub fn wgsl(self) -> &'static str {
        match self {
            ValueType::Float | ValueType::Float1 => "f32",
            ValueType::Float2 => "vec2f",
            ValueType::Float3 => "vec3f",
            ValueType::Float4 => "vec4f",
            ValueType::Texture2D => "texture_2d<f32>",
            ValueType::TextureCube => "texture_cube<f32>",
            ValueType::StaticBool => "bool",
            ValueType::Unknown => "unknown",
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            ValueType::Float1 => "float1",
            ValueType::Float2 => "float2",
            ValueType::Float3 => "float3",
            ValueType::Float4 => "float4",
            ValueType::Float => "float",
            ValueType::Texture2D => "texture2D",
            ValueType::TextureCube => "textureCube",
            ValueType::StaticBool => "static bool",
            ValueType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Shader stage a value is evaluated in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShaderFrequency {
    Vertex,
    Hull,
    Domain,
    Pixel,
}

impl ShaderFrequency {
    pub const ALL: [ShaderFrequency; 4] = [
        ShaderFrequency::Vertex,
        ShaderFrequency::Hull,
        ShaderFrequency::Domain,
        ShaderFrequency::Pixel,
    ];

    pub fn index(self) -> usize {
        match self {
            ShaderFrequency::Vertex => 0,
            ShaderFrequency::Hull => 1,
            ShaderFrequency::Domain => 2,
            ShaderFrequency::Pixel => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShaderFrequency::Vertex => "vertex",
            ShaderFrequency::Hull => "hull",
            ShaderFrequency::Domain => "domain",
            ShaderFrequency::Pixel => "pixel",
        }
    }
}

impl fmt::Display for ShaderFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A named shader output the material graph produces a value for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MaterialProperty {
    EmissiveColor,
    Opacity,
    OpacityMask,
    Distortion,
    DiffuseColor,
    DiffusePower,
    SpecularColor,
    SpecularPower,
    Normal,
    WorldPositionOffset,
    WorldDisplacement,
    TessellationMultiplier,
}

impl MaterialProperty {
    pub const COUNT: usize = 12;

    /// Translation order. Pixel properties first so pixel-stage slots are stable across materials.
    pub const ALL: [MaterialProperty; MaterialProperty::COUNT] = [
        MaterialProperty::EmissiveColor,
        MaterialProperty::Opacity,
        MaterialProperty::OpacityMask,
        MaterialProperty::Distortion,
        MaterialProperty::DiffuseColor,
        MaterialProperty::DiffusePower,
        MaterialProperty::SpecularColor,
        MaterialProperty::SpecularPower,
        MaterialProperty::Normal,
        MaterialProperty::WorldPositionOffset,
        MaterialProperty::WorldDisplacement,
        MaterialProperty::TessellationMultiplier,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn frequency(self) -> ShaderFrequency {
        match self {
            MaterialProperty::WorldPositionOffset => ShaderFrequency::Vertex,
            MaterialProperty::WorldDisplacement => ShaderFrequency::Domain,
            MaterialProperty::TessellationMultiplier => ShaderFrequency::Hull,
            _ => ShaderFrequency::Pixel,
        }
    }

    /// Type every property output is cast to before emission.
    pub fn output_type(self) -> ValueType {
        match self {
            MaterialProperty::Opacity
            | MaterialProperty::OpacityMask
            | MaterialProperty::DiffusePower
            | MaterialProperty::SpecularPower
            | MaterialProperty::TessellationMultiplier => ValueType::Float,
            MaterialProperty::Distortion => ValueType::Float2,
            _ => ValueType::Float3,
        }
    }

    /// Value used when the graph leaves the property unconnected.
    pub fn default_value(self) -> [f32; 4] {
        match self {
            MaterialProperty::Opacity
            | MaterialProperty::OpacityMask
            | MaterialProperty::DiffusePower
            | MaterialProperty::TessellationMultiplier => [1.0; 4],
            MaterialProperty::SpecularPower => [15.0; 4],
            MaterialProperty::Normal => [0.0, 0.0, 1.0, 0.0],
            _ => [0.0; 4],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MaterialProperty::EmissiveColor => "EmissiveColor",
            MaterialProperty::Opacity => "Opacity",
            MaterialProperty::OpacityMask => "OpacityMask",
            MaterialProperty::Distortion => "Distortion",
            MaterialProperty::DiffuseColor => "DiffuseColor",
            MaterialProperty::DiffusePower => "DiffusePower",
            MaterialProperty::SpecularColor => "SpecularColor",
            MaterialProperty::SpecularPower => "SpecularPower",
            MaterialProperty::Normal => "Normal",
            MaterialProperty::WorldPositionOffset => "WorldPositionOffset",
            MaterialProperty::WorldDisplacement => "WorldDisplacement",
            MaterialProperty::TessellationMultiplier => "TessellationMultiplier",
        }
    }

    /// Name of the generated WGSL function returning this property.
    pub fn function_name(self) -> &'static str {
        match self {
            MaterialProperty::EmissiveColor => "material_emissive_color",
            MaterialProperty::Opacity => "material_opacity",
            MaterialProperty::OpacityMask => "material_opacity_mask",
            MaterialProperty::Distortion => "material_distortion",
            MaterialProperty::DiffuseColor => "material_diffuse_color",
            MaterialProperty::DiffusePower => "material_diffuse_power",
            MaterialProperty::SpecularColor => "material_specular_color",
            MaterialProperty::SpecularPower => "material_specular_power",
            MaterialProperty::Normal => "material_normal",
            MaterialProperty::WorldPositionOffset => "material_world_position_offset",
            MaterialProperty::WorldDisplacement => "material_world_displacement",
            MaterialProperty::TessellationMultiplier => "material_tessellation_multiplier",
        }
    }
}

impl fmt::Display for MaterialProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureKind {
    #[default]
    #[serde(rename = "2d")]
    TwoD,
    Cube,
}

/// Storage format hint for a texture asset, applied as decoding when the texture is sampled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureCompression {
    #[default]
    Default,
    NormalMap,
    Grayscale,
    Rgbe,
}

/// Reference to a texture asset.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextureRef {
    pub asset: String,
    #[serde(default)]
    pub kind: TextureKind,
    #[serde(default)]
    pub compression: TextureCompression,
}

impl TextureRef {
    pub fn new(asset: impl Into<String>) -> Self {
        Self {
            asset: asset.into(),
            kind: TextureKind::TwoD,
            compression: TextureCompression::Default,
        }
    }

    pub fn cube(asset: impl Into<String>) -> Self {
        Self {
            kind: TextureKind::Cube,
            ..Self::new(asset)
        }
    }

    pub fn with_compression(mut self, compression: TextureCompression) -> Self {
        self.compression = compression;
        self
    }

    pub fn value_type(&self) -> ValueType {
        match self.kind {
            TextureKind::TwoD => ValueType::Texture2D,
            TextureKind::Cube => ValueType::TextureCube,
        }
    }
}

/// Space a direction vector is expressed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateSpace {
    Tangent,
    Local,
    World,
    View,
}

/// Target platform. Part of the shader map key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    #[default]
    Desktop,
    Mobile,
    Web,
}

impl Platform {
    /// Number of texture samplers one pixel shader may bind.
    pub fn max_texture_samplers(self) -> usize {
        match self {
            Platform::Desktop => 16,
            Platform::Web => 16,
            Platform::Mobile => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Platform::Desktop => "desktop",
            Platform::Mobile => "mobile",
            Platform::Web => "web",
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "desktop" => Ok(Platform::Desktop),
            "mobile" => Ok(Platform::Mobile),
            "web" => Ok(Platform::Web),
            other => Err(anyhow::anyhow!("unknown platform: {other} (expected desktop, mobile or web)")),
        }
    }
}

/// Quality tier. Part of the shader map key and read by quality switches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Low,
    #[default]
    High,
}

impl Quality {
    pub fn name(self) -> &'static str {
        match self {
            Quality::Low => "low",
            Quality::High => "high",
        }
    }
}

impl std::str::FromStr for Quality {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Quality::Low),
            "high" => Ok(Quality::High),
            other => Err(anyhow::anyhow!("unknown quality: {other} (expected low or high)")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    #[default]
    Opaque,
    Masked,
    Translucent,
    Additive,
}

/// Per-material settings that shape the generated entry points.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialSettings {
    pub blend_mode: BlendMode,
    pub two_sided: bool,
    pub opacity_mask_clip_value: f32,
    /// Set on the default material. A compile failure of this material has no substitute.
    pub fallback_of_last_resort: bool,
}

impl Default for MaterialSettings {
    fn default() -> Self {
        Self {
            blend_mode: BlendMode::Opaque,
            two_sided: false,
            opacity_mask_clip_value: 0.3333,
            fallback_of_last_resort: false,
        }
    }
}
