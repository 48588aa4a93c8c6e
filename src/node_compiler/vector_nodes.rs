//! Compilers for swizzles, vector construction, space transforms and derivatives.

use super::NodeRef;
use crate::translator::{Code, MaterialCompiler};
use crate::types::CoordinateSpace;

/// ComponentMask selects the channels flagged by params r, g, b, a.
pub fn compile_component_mask(node: &NodeRef<'_>, compiler: &mut dyn MaterialCompiler) -> Code {
    let x = node.input("value", compiler);
    let [r, g, b, a] = node.mask_param();
    compiler.component_mask(x, r, g, b, a)
}

pub fn compile_append_vector(node: &NodeRef<'_>, compiler: &mut dyn MaterialCompiler) -> Code {
    let a = node.input("a", compiler);
    let b = node.input("b", compiler);
    compiler.append_vector(a, b)
}

pub fn compile_transform(node: &NodeRef<'_>, compiler: &mut dyn MaterialCompiler) -> Code {
    let x = node.input("value", compiler);
    let source: CoordinateSpace = node.enum_param("source", compiler)?;
    let destination: CoordinateSpace = node.enum_param("destination", compiler)?;
    compiler.transform_vector(source, destination, x)
}

pub fn compile_derivative(node: &NodeRef<'_>, compiler: &mut dyn MaterialCompiler) -> Code {
    let x = node.input("value", compiler);
    if node.node.node_type == "DDX" {
        compiler.ddx(x)
    } else {
        compiler.ddy(x)
    }
}
