//! Text helpers for WGSL emission.

use crate::types::ValueType;

/// Format an f32 as a WGSL float literal using the shortest digits that round-trip. Always keeps a
/// fractional digit so the literal is never read as an integer; negative values are parenthesized.
pub fn fmt_f32(v: f32) -> String {
    if !v.is_finite() || v == 0.0 {
        return "0.0".to_string();
    }
    let mut out = format!("{v}");
    if !out.contains('.') {
        out.push_str(".0");
    }
    if out.starts_with('-') {
        format!("({out})")
    } else {
        out
    }
}

/// WGSL literal for a constant of the given float type.
pub fn literal(value: [f32; 4], ty: ValueType) -> String {
    let n = ty.num_components();
    if n <= 1 {
        return fmt_f32(value[0]);
    }
    let parts: Vec<String> = value[..n].iter().map(|v| fmt_f32(*v)).collect();
    format!("{}({})", ty.wgsl(), parts.join(", "))
}

/// Swizzle suffix selecting the given lanes, e.g. `rg`.
pub fn swizzle(mask: [bool; 4]) -> String {
    ['r', 'g', 'b', 'a']
        .iter()
        .zip(mask)
        .filter(|(_, on)| *on)
        .map(|(c, _)| *c)
        .collect()
}

/// Swizzle suffix selecting the first `n` lanes.
pub fn prefix_swizzle(n: usize) -> &'static str {
    match n {
        1 => "r",
        2 => "rg",
        3 => "rgb",
        _ => "rgba",
    }
}

/// Keep a name safe to embed in a single-line WGSL comment.
pub fn comment_safe(s: &str) -> String {
    s.chars().map(|c| if c.is_control() { ' ' } else { c }).collect()
}
