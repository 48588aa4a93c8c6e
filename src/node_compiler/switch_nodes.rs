//! Compilers for static switches and quality switches.
//!
//! Only the selected branch of a switch is compiled, so the other branch contributes no code,
//! uniforms or diagnostics.

use super::NodeRef;
use crate::error::TranslationError;
use crate::translator::{Code, MaterialCompiler};
use crate::types::Quality;

pub fn compile_static_bool(node: &NodeRef<'_>, compiler: &mut dyn MaterialCompiler) -> Code {
    compiler.static_bool(node.bool_param("value", false))
}

pub fn compile_static_bool_parameter(node: &NodeRef<'_>, compiler: &mut dyn MaterialCompiler) -> Code {
    let name = node.str_param("name").unwrap_or_default();
    compiler.static_switch_parameter(name, node.bool_param("default", false))
}

/// Picks `true` or `false` by the static bool on `value`, or by the `default` param when
/// `value` is unconnected.
pub fn compile_static_switch(node: &NodeRef<'_>, compiler: &mut dyn MaterialCompiler) -> Code {
    let selected = match node.optional_input("value", compiler) {
        Some(value) => compiler.static_bool_value(value)?,
        None => node.bool_param("default", false),
    };
    compile_branch(node, selected, compiler)
}

pub fn compile_static_switch_parameter(node: &NodeRef<'_>, compiler: &mut dyn MaterialCompiler) -> Code {
    let name = node.str_param("name").unwrap_or_default();
    let switch = compiler.static_switch_parameter(name, node.bool_param("default", false));
    let selected = compiler.static_bool_value(switch)?;
    compile_branch(node, selected, compiler)
}

fn compile_branch(node: &NodeRef<'_>, selected: bool, compiler: &mut dyn MaterialCompiler) -> Code {
    node.input(if selected { "true" } else { "false" }, compiler)
}

pub fn compile_static_component_mask_parameter(
    node: &NodeRef<'_>,
    compiler: &mut dyn MaterialCompiler,
) -> Code {
    let x = node.input("value", compiler);
    let Some(name) = node.str_param("name").filter(|n| !n.is_empty()) else {
        return compiler.error(TranslationError::invalid("Component mask parameter has no name"));
    };
    compiler.static_component_mask(x, name, node.mask_param())
}

/// Uses the input for the current quality level, falling back to `default`.
pub fn compile_quality_switch(node: &NodeRef<'_>, compiler: &mut dyn MaterialCompiler) -> Code {
    let port = match compiler.context().quality {
        Quality::Low => "low",
        Quality::High => "high",
    };
    match node.optional_input(port, compiler) {
        Some(code) => code,
        None => node.input("default", compiler),
    }
}
