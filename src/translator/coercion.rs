//! Numeric cast rules shared by code emission and constant folding.

use crate::error::TranslationError;
use crate::types::ValueType;
use crate::uniform::expression::canonical_constant;

use super::utils::prefix_swizzle;

/// How a value of one float type becomes another.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CastPlan {
    /// Same component count; at most the declared type changes.
    Identity,
    /// Keep the first `to` components.
    Truncate { to: usize },
    /// Broadcast a single component to `to` components.
    Replicate { to: usize },
    /// Append zero components up to `to`.
    ZeroPad { from: usize, to: usize },
}

/// Plan for `force_cast`. With `exact` the types must match exactly to be left alone; otherwise the
/// compatible relation applies. Replication is only chosen for single-component sources.
pub fn plan_force_cast(
    source: ValueType,
    dest: ValueType,
    exact: bool,
    replicate: bool,
) -> Result<CastPlan, TranslationError> {
    let matches = if exact {
        source == dest
    } else {
        source.is_compatible_with(dest)
    };
    if matches {
        return Ok(CastPlan::Identity);
    }
    if !(source.is_float() && dest.is_float()) {
        return Err(TranslationError::type_mismatch(format!(
            "Cannot force a cast between non-numeric types ({source} to {dest})."
        )));
    }

    let from = source.num_components();
    let to = dest.num_components();
    Ok(if from > to {
        CastPlan::Truncate { to }
    } else if from < to {
        if from == 1 && replicate {
            CastPlan::Replicate { to }
        } else {
            CastPlan::ZeroPad { from, to }
        }
    } else {
        CastPlan::Identity
    })
}

/// Plan for `valid_cast`: scalars broadcast, wider values truncate, anything else is an error.
pub fn plan_valid_cast(source: ValueType, dest: ValueType) -> Result<CastPlan, TranslationError> {
    if source.is_compatible_with(dest) {
        return Ok(CastPlan::Identity);
    }
    if !(source.is_float() && dest.is_float()) {
        return Err(TranslationError::type_mismatch(format!(
            "Cannot cast from {source} to {dest}."
        )));
    }

    let from = source.num_components();
    let to = dest.num_components();
    if from > to {
        Ok(CastPlan::Truncate { to })
    } else if from < to {
        if from == 1 {
            Ok(CastPlan::Replicate { to })
        } else {
            Err(TranslationError::type_mismatch(format!(
                "Cannot cast from {source} to {dest}."
            )))
        }
    } else {
        Ok(CastPlan::Identity)
    }
}

impl CastPlan {
    /// Apply the cast to a constant value, returning it in canonical storage for `dest`.
    pub fn apply_to_value(self, value: [f32; 4], dest: ValueType) -> [f32; 4] {
        let out = match self {
            CastPlan::Identity | CastPlan::Truncate { .. } => value,
            CastPlan::Replicate { .. } => [value[0]; 4],
            CastPlan::ZeroPad { from, .. } => {
                std::array::from_fn(|i| if i < from { value[i] } else { 0.0 })
            }
        };
        canonical_constant(out, dest)
    }

    /// Apply the cast to emitted code.
    pub fn apply_to_code(self, code: &str, dest: ValueType) -> String {
        match self {
            CastPlan::Identity => code.to_string(),
            CastPlan::Truncate { to } => format!("{code}.{}", prefix_swizzle(to)),
            CastPlan::Replicate { .. } => format!("{}({code})", dest.wgsl()),
            CastPlan::ZeroPad { from, to } => {
                let padding = ", 0.0".repeat(to - from);
                format!("{}({code}{padding})", dest.wgsl())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn compatible_types_are_identity_unless_exact() {
        assert_eq!(
            plan_force_cast(ValueType::Float, ValueType::Float1, false, false).unwrap(),
            CastPlan::Identity
        );
        // Same width, different declared type: still no code change.
        assert_eq!(
            plan_force_cast(ValueType::Float, ValueType::Float1, true, false).unwrap(),
            CastPlan::Identity
        );
    }

    #[test]
    fn replicate_only_from_single_component() {
        assert_eq!(
            plan_force_cast(ValueType::Float, ValueType::Float4, true, true).unwrap(),
            CastPlan::Replicate { to: 4 }
        );
        assert_eq!(
            plan_force_cast(ValueType::Float2, ValueType::Float4, true, true).unwrap(),
            CastPlan::ZeroPad { from: 2, to: 4 }
        );
        assert_eq!(
            plan_force_cast(ValueType::Float, ValueType::Float3, false, false).unwrap(),
            CastPlan::ZeroPad { from: 1, to: 3 }
        );
    }

    #[test]
    fn textures_never_coerce() {
        assert!(plan_force_cast(ValueType::Texture2D, ValueType::Float4, false, true).is_err());
        assert!(plan_force_cast(ValueType::Float4, ValueType::StaticBool, false, true).is_err());
        assert!(plan_valid_cast(ValueType::TextureCube, ValueType::Float3).is_err());
    }

    #[test]
    fn valid_cast_rejects_widening_vectors() {
        assert!(plan_valid_cast(ValueType::Float2, ValueType::Float3).is_err());
        assert_eq!(
            plan_valid_cast(ValueType::Float, ValueType::Float3).unwrap(),
            CastPlan::Replicate { to: 3 }
        );
        assert_eq!(
            plan_valid_cast(ValueType::Float4, ValueType::Float2).unwrap(),
            CastPlan::Truncate { to: 2 }
        );
    }

    #[test]
    fn code_forms() {
        assert_eq!(CastPlan::Truncate { to: 3 }.apply_to_code("c", ValueType::Float3), "c.rgb");
        assert_eq!(CastPlan::Replicate { to: 4 }.apply_to_code("s", ValueType::Float4), "vec4f(s)");
        assert_eq!(
            CastPlan::ZeroPad { from: 2, to: 4 }.apply_to_code("v", ValueType::Float4),
            "vec4f(v, 0.0, 0.0)"
        );
    }

    #[test]
    fn replicate_then_truncate_roundtrips_a_scalar() {
        let up = plan_force_cast(ValueType::Float, ValueType::Float4, true, true).unwrap();
        let wide = up.apply_to_value([0.7; 4], ValueType::Float4);
        let down = plan_force_cast(ValueType::Float4, ValueType::Float1, true, false).unwrap();
        let back = down.apply_to_value(wide, ValueType::Float1);
        assert_eq!(back[0], 0.7);
    }

    #[test]
    fn zero_pad_does_not_roundtrip() {
        let original = [1.0, 2.0, 3.0, 4.0];
        let down = plan_force_cast(ValueType::Float4, ValueType::Float1, true, false).unwrap();
        let narrow = down.apply_to_value(original, ValueType::Float1);
        let up = plan_force_cast(ValueType::Float1, ValueType::Float4, true, false).unwrap();
        let back = up.apply_to_value(narrow, ValueType::Float4);
        assert_eq!(back, [1.0, 0.0, 0.0, 0.0]);
        assert_ne!(back, original);
    }

    fn float_type() -> impl Strategy<Value = ValueType> {
        prop_oneof![
            Just(ValueType::Float),
            Just(ValueType::Float1),
            Just(ValueType::Float2),
            Just(ValueType::Float3),
            Just(ValueType::Float4),
        ]
    }

    proptest! {
        #[test]
        fn forced_vector_casts_keep_leading_lanes(
            source in float_type(),
            dest in float_type().prop_filter("vector dest", |t| t.num_components() > 1),
            raw in prop::array::uniform4(-1000.0f32..1000.0),
        ) {
            let value = canonical_constant(raw, source);
            let plan = plan_force_cast(source, dest, true, false).unwrap();
            let cast = plan.apply_to_value(value, dest);
            let kept = source.num_components().min(dest.num_components());
            for i in 0..4 {
                let expected = if i < kept { value[i] } else { 0.0 };
                prop_assert_eq!(cast[i], expected);
            }
        }

        #[test]
        fn valid_casts_only_widen_scalars(source in float_type(), dest in float_type()) {
            let (from, to) = (source.num_components(), dest.num_components());
            prop_assert_eq!(plan_valid_cast(source, dest).is_ok(), from == 1 || from >= to);
        }
    }
}
