//! WGSL validation using the naga library.

use anyhow::{Context, Result, anyhow};

/// Parse generated WGSL with naga's front end.
pub fn parse_wgsl(source: &str) -> Result<naga::Module> {
    naga::front::wgsl::parse_str(source)
        .map_err(|e| anyhow!("WGSL parse failed:\n{}", format_naga_error(source, &e.emit_to_string(source))))
}

/// Parse and fully validate WGSL, returning the module with its analysis.
///
/// # Arguments
/// * `source` - The WGSL source code to validate
///
/// # Returns
/// The naga module and its [`naga::valid::ModuleInfo`], or an error carrying the numbered source.
pub fn validate_wgsl(source: &str) -> Result<(naga::Module, naga::valid::ModuleInfo)> {
    let module = parse_wgsl(source)?;
    let info = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::empty(),
    )
    .validate(&module)
    .map_err(|e| {
        anyhow!(
            "WGSL validation failed:\n{}",
            format_naga_error(source, &e.emit_to_string(source))
        )
    })?;
    Ok((module, info))
}

/// Validate WGSL and name what produced it in the error chain.
///
/// # Arguments
/// * `source` - The WGSL source code to validate
/// * `context` - Description of what generated this WGSL (e.g., "material Foo")
pub fn validate_wgsl_with_context(
    source: &str,
    context: &str,
) -> Result<(naga::Module, naga::valid::ModuleInfo)> {
    validate_wgsl(source).with_context(|| format!("{context} generated invalid WGSL"))
}

/// Error message followed by the source with line numbers.
fn format_naga_error(source: &str, message: &str) -> String {
    let mut output = String::new();
    output.push_str(&format!("  {}\n", message.trim_end()));
    output.push_str("\nGenerated WGSL:\n");
    output.push_str("---\n");
    for (line_num, line) in source.lines().enumerate() {
        output.push_str(&format!("{:4} | {}\n", line_num + 1, line));
    }
    output.push_str("---\n");
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_minimal_entry_points() {
        let source = r#"
@vertex
fn vs_main(@location(0) position: vec3f) -> @builtin(position) vec4f {
    return vec4f(position, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4f {
    return vec4f(1.0, 0.0, 0.0, 1.0);
}
"#;
        let (module, _) = validate_wgsl(source).unwrap();
        assert_eq!(module.entry_points.len(), 2);
    }

    #[test]
    fn parse_errors_carry_numbered_source() {
        let source = "fn broken() -> f32 {\n    return vec3f(1.0);\n";
        let err = validate_wgsl_with_context(source, "material Broken").unwrap_err();
        let text = format!("{err:#}");
        assert!(text.contains("material Broken generated invalid WGSL"));
        assert!(text.contains("   1 | fn broken() -> f32 {"));
    }

    #[test]
    fn mismatched_return_type_is_rejected() {
        let source = "fn f() -> f32 {\n    let x: f32 = 1.0;\n    return x;\n}\n";
        assert!(validate_wgsl(source).is_ok());
        let bad = "fn f() -> f32 {\n    return vec2f(1.0, 2.0);\n}\n";
        assert!(validate_wgsl(bad).is_err());
    }
}
