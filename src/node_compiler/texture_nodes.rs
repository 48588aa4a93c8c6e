//! Compilers for texture objects, texture parameters and texture samples.

use super::{NodeRef, select_output};
use crate::translator::{Code, MaterialCompiler};
use crate::types::{TextureCompression, TextureKind, TextureRef};

/// Texture reference described by params `texture`, `kind` and `compression`.
fn texture_ref(node: &NodeRef<'_>, compiler: &mut dyn MaterialCompiler) -> Option<TextureRef> {
    let kind: TextureKind = node.enum_param("kind", compiler)?;
    let compression: TextureCompression = node.enum_param("compression", compiler)?;
    Some(TextureRef {
        asset: node.str_param("texture").unwrap_or_default().to_string(),
        kind,
        compression,
    })
}

pub fn compile_texture_object(node: &NodeRef<'_>, compiler: &mut dyn MaterialCompiler) -> Code {
    let texture = texture_ref(node, compiler)?;
    compiler.texture(texture)
}

pub fn compile_texture_parameter(node: &NodeRef<'_>, compiler: &mut dyn MaterialCompiler) -> Code {
    let texture = texture_ref(node, compiler)?;
    let name = node.str_param("name").unwrap_or_default();
    compiler.texture_parameter(name, texture)
}

/// Samples `texture` at `uv`, defaulting to the first texture coordinate set. Channel outputs
/// reuse the single rgba sample.
pub fn compile_texture_sample(
    node: &NodeRef<'_>,
    output: &str,
    compiler: &mut dyn MaterialCompiler,
) -> Code {
    if output != "rgba" {
        let rgba = node.sibling_output("rgba", compiler);
        return select_output(compiler, rgba, output);
    }
    let texture = node.input("texture", compiler);
    let uv = match node.optional_input("uv", compiler) {
        Some(uv) => uv,
        None => compiler.texture_coordinate(0, 1.0, 1.0),
    };
    compiler.texture_sample(texture, uv)
}
