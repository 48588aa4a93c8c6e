//! Uniform expressions: values a generated shader reads from constant registers or texture slots.
//!
//! Expressions are immutable once built and shared through [`UniformExprRef`]. Two expressions are
//! interchangeable when [`UniformExpression::structural_equals`] holds, which is what the translator
//! deduplicates on.

use std::array;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::context::{ParameterSource, RenderContext};
use crate::types::{TextureRef, ValueType};

pub type UniformExprRef = Arc<UniformExpression>;

/// Divisors with a smaller magnitude are replaced by this value, keeping their sign.
pub const DIVIDE_EPSILON: f32 = 0.00001;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoldedOp {
    Add,
    Sub,
    Mul,
    Div,
    Dot,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UniformExpression {
    Constant {
        value: [f32; 4],
        value_type: ValueType,
    },
    ScalarParameter {
        name: String,
        default_value: f32,
    },
    VectorParameter {
        name: String,
        default_value: [f32; 4],
    },
    TextureParameter {
        name: String,
        default_texture: TextureRef,
    },
    Texture {
        texture: TextureRef,
    },
    GameTime,
    RealTime,
    Sine {
        x: UniformExprRef,
    },
    Cosine {
        x: UniformExprRef,
    },
    SquareRoot {
        x: UniformExprRef,
    },
    Length {
        x: UniformExprRef,
        components: u8,
    },
    Abs {
        x: UniformExprRef,
    },
    Floor {
        x: UniformExprRef,
    },
    Ceil {
        x: UniformExprRef,
    },
    Frac {
        x: UniformExprRef,
    },
    Fmod {
        a: UniformExprRef,
        b: UniformExprRef,
    },
    Min {
        a: UniformExprRef,
        b: UniformExprRef,
    },
    Max {
        a: UniformExprRef,
        b: UniformExprRef,
    },
    Clamp {
        input: UniformExprRef,
        min: UniformExprRef,
        max: UniformExprRef,
    },
    AppendVector {
        a: UniformExprRef,
        b: UniformExprRef,
        a_components: u8,
    },
    /// Marks a value whose fractional part is all that matters downstream.
    Periodic {
        x: UniformExprRef,
    },
    Folded {
        op: FoldedOp,
        a: UniformExprRef,
        b: UniformExprRef,
        components: u8,
    },
}

/// Replace a near-zero divisor with a signed epsilon.
pub fn safe_divisor(b: f32) -> f32 {
    if b.abs() <= DIVIDE_EPSILON {
        if b.is_sign_negative() {
            -DIVIDE_EPSILON
        } else {
            DIVIDE_EPSILON
        }
    } else {
        b
    }
}

/// Normalize a constant's storage: scalars are replicated into all four lanes, unused vector
/// lanes are zero.
pub fn canonical_constant(value: [f32; 4], value_type: ValueType) -> [f32; 4] {
    let n = value_type.num_components();
    if n <= 1 {
        return [value[0]; 4];
    }
    array::from_fn(|i| if i < n { value[i] } else { 0.0 })
}

fn map(v: [f32; 4], f: impl Fn(f32) -> f32) -> [f32; 4] {
    array::from_fn(|i| f(v[i]))
}

fn zip(a: [f32; 4], b: [f32; 4], f: impl Fn(f32, f32) -> f32) -> [f32; 4] {
    array::from_fn(|i| f(a[i], b[i]))
}

fn same(a: &UniformExprRef, b: &UniformExprRef) -> bool {
    Arc::ptr_eq(a, b) || a.structural_equals(b)
}

fn bits_eq(a: &[f32; 4], b: &[f32; 4]) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| x.to_bits() == y.to_bits())
}

impl UniformExpression {
    pub fn constant(value: [f32; 4], value_type: ValueType) -> Self {
        UniformExpression::Constant {
            value: canonical_constant(value, value_type),
            value_type,
        }
    }

    pub fn scalar(value: f32) -> Self {
        Self::constant([value; 4], ValueType::Float)
    }

    /// Child expressions, in declaration order.
    pub fn operands(&self) -> Vec<&UniformExprRef> {
        use UniformExpression as E;
        match self {
            E::Constant { .. }
            | E::ScalarParameter { .. }
            | E::VectorParameter { .. }
            | E::TextureParameter { .. }
            | E::Texture { .. }
            | E::GameTime
            | E::RealTime => Vec::new(),
            E::Sine { x }
            | E::Cosine { x }
            | E::SquareRoot { x }
            | E::Length { x, .. }
            | E::Abs { x }
            | E::Floor { x }
            | E::Ceil { x }
            | E::Frac { x }
            | E::Periodic { x } => vec![x],
            E::Fmod { a, b }
            | E::Min { a, b }
            | E::Max { a, b }
            | E::AppendVector { a, b, .. }
            | E::Folded { a, b, .. } => vec![a, b],
            E::Clamp { input, min, max } => vec![input, min, max],
        }
    }

    /// True iff the value cannot change between draws.
    pub fn is_constant(&self) -> bool {
        match self {
            UniformExpression::Constant { .. } => true,
            UniformExpression::ScalarParameter { .. }
            | UniformExpression::VectorParameter { .. }
            | UniformExpression::TextureParameter { .. }
            | UniformExpression::Texture { .. }
            | UniformExpression::GameTime
            | UniformExpression::RealTime => false,
            _ => self.operands().iter().all(|x| x.is_constant()),
        }
    }

    /// True if any node in the tree is a named parameter.
    pub fn references_parameters(&self) -> bool {
        match self {
            UniformExpression::ScalarParameter { .. }
            | UniformExpression::VectorParameter { .. }
            | UniformExpression::TextureParameter { .. } => true,
            _ => self.operands().iter().any(|x| x.references_parameters()),
        }
    }

    /// The texture this expression binds, for texture-valued expressions.
    pub fn texture(&self) -> Option<&TextureRef> {
        match self {
            UniformExpression::TextureParameter {
                default_texture, ..
            } => Some(default_texture),
            UniformExpression::Texture { texture } => Some(texture),
            _ => None,
        }
    }

    /// Resolve the texture bound for a draw. Parameters fall back to their default texture.
    pub fn resolve_texture(&self, params: &dyn ParameterSource) -> Option<TextureRef> {
        match self {
            UniformExpression::TextureParameter {
                name,
                default_texture,
            } => Some(
                params
                    .lookup_texture(name)
                    .unwrap_or_else(|| default_texture.clone()),
            ),
            UniformExpression::Texture { texture } => Some(texture.clone()),
            _ => None,
        }
    }

    /// Evaluate the expression for one draw.
    pub fn evaluate(&self, ctx: &RenderContext, params: &dyn ParameterSource) -> [f32; 4] {
        use UniformExpression as E;
        let eval = |x: &UniformExprRef| x.evaluate(ctx, params);
        match self {
            E::Constant { value, .. } => *value,
            E::ScalarParameter {
                name,
                default_value,
            } => [params.lookup_scalar(name).unwrap_or(*default_value); 4],
            E::VectorParameter {
                name,
                default_value,
            } => params.lookup_vector(name).unwrap_or(*default_value),
            E::TextureParameter { .. } | E::Texture { .. } => [0.0; 4],
            E::GameTime => [ctx.game_time; 4],
            E::RealTime => [ctx.real_time; 4],
            E::Sine { x } => map(eval(x), f32::sin),
            E::Cosine { x } => map(eval(x), f32::cos),
            E::SquareRoot { x } => map(eval(x), f32::sqrt),
            E::Abs { x } => map(eval(x), f32::abs),
            E::Floor { x } => map(eval(x), f32::floor),
            E::Ceil { x } => map(eval(x), f32::ceil),
            E::Frac { x } => map(eval(x), |v| v - v.floor()),
            E::Periodic { x } => eval(x),
            E::Length { x, components } => {
                let v = eval(x);
                let n = (*components as usize).clamp(1, 4);
                let len = v[..n].iter().map(|c| c * c).sum::<f32>().sqrt();
                [len; 4]
            }
            E::Fmod { a, b } => zip(eval(a), eval(b), |a, b| a % safe_divisor(b)),
            E::Min { a, b } => zip(eval(a), eval(b), f32::min),
            E::Max { a, b } => zip(eval(a), eval(b), f32::max),
            E::Clamp { input, min, max } => {
                let (v, lo, hi) = (eval(input), eval(min), eval(max));
                array::from_fn(|i| v[i].max(lo[i]).min(hi[i]))
            }
            E::AppendVector { a, b, a_components } => {
                let (a, b) = (eval(a), eval(b));
                let n = (*a_components as usize).min(4);
                array::from_fn(|i| if i < n { a[i] } else { b[i - n] })
            }
            E::Folded {
                op,
                a,
                b,
                components,
            } => {
                let (a, b) = (eval(a), eval(b));
                match op {
                    FoldedOp::Add => zip(a, b, |a, b| a + b),
                    FoldedOp::Sub => zip(a, b, |a, b| a - b),
                    FoldedOp::Mul => zip(a, b, |a, b| a * b),
                    FoldedOp::Div => zip(a, b, |a, b| a / safe_divisor(b)),
                    FoldedOp::Dot => {
                        let n = (*components as usize).clamp(1, 4);
                        let d = (0..n).map(|i| a[i] * b[i]).sum::<f32>();
                        [d; 4]
                    }
                }
            }
        }
    }

    /// Same variant with recursively identical operands, names and literal bits.
    pub fn structural_equals(&self, other: &UniformExpression) -> bool {
        use UniformExpression as E;
        match (self, other) {
            (
                E::Constant {
                    value: a,
                    value_type: ta,
                },
                E::Constant {
                    value: b,
                    value_type: tb,
                },
            ) => ta == tb && bits_eq(a, b),
            (
                E::ScalarParameter {
                    name: n1,
                    default_value: d1,
                },
                E::ScalarParameter {
                    name: n2,
                    default_value: d2,
                },
            ) => n1 == n2 && d1.to_bits() == d2.to_bits(),
            (
                E::VectorParameter {
                    name: n1,
                    default_value: d1,
                },
                E::VectorParameter {
                    name: n2,
                    default_value: d2,
                },
            ) => n1 == n2 && bits_eq(d1, d2),
            (
                E::TextureParameter {
                    name: n1,
                    default_texture: t1,
                },
                E::TextureParameter {
                    name: n2,
                    default_texture: t2,
                },
            ) => n1 == n2 && t1 == t2,
            (E::Texture { texture: t1 }, E::Texture { texture: t2 }) => t1 == t2,
            (E::GameTime, E::GameTime) | (E::RealTime, E::RealTime) => true,
            (E::Sine { x: a }, E::Sine { x: b })
            | (E::Cosine { x: a }, E::Cosine { x: b })
            | (E::SquareRoot { x: a }, E::SquareRoot { x: b })
            | (E::Abs { x: a }, E::Abs { x: b })
            | (E::Floor { x: a }, E::Floor { x: b })
            | (E::Ceil { x: a }, E::Ceil { x: b })
            | (E::Frac { x: a }, E::Frac { x: b })
            | (E::Periodic { x: a }, E::Periodic { x: b }) => same(a, b),
            (
                E::Length {
                    x: a,
                    components: c1,
                },
                E::Length {
                    x: b,
                    components: c2,
                },
            ) => c1 == c2 && same(a, b),
            (E::Fmod { a: a1, b: b1 }, E::Fmod { a: a2, b: b2 })
            | (E::Min { a: a1, b: b1 }, E::Min { a: a2, b: b2 })
            | (E::Max { a: a1, b: b1 }, E::Max { a: a2, b: b2 }) => same(a1, a2) && same(b1, b2),
            (
                E::Clamp {
                    input: i1,
                    min: lo1,
                    max: hi1,
                },
                E::Clamp {
                    input: i2,
                    min: lo2,
                    max: hi2,
                },
            ) => same(i1, i2) && same(lo1, lo2) && same(hi1, hi2),
            (
                E::AppendVector {
                    a: a1,
                    b: b1,
                    a_components: n1,
                },
                E::AppendVector {
                    a: a2,
                    b: b2,
                    a_components: n2,
                },
            ) => n1 == n2 && same(a1, a2) && same(b1, b2),
            (
                E::Folded {
                    op: o1,
                    a: a1,
                    b: b1,
                    components: c1,
                },
                E::Folded {
                    op: o2,
                    a: a2,
                    b: b2,
                    components: c2,
                },
            ) => o1 == o2 && c1 == c2 && same(a1, a2) && same(b1, b2),
            _ => false,
        }
    }

    /// Short human-readable form used in logs and summaries.
    pub fn describe(&self) -> String {
        use UniformExpression as E;
        match self {
            E::Constant { value, value_type } => {
                let n = value_type.num_components().max(1);
                let parts: Vec<String> = value[..n].iter().map(|v| format!("{v}")).collect();
                format!("Constant({})", parts.join(", "))
            }
            E::ScalarParameter { name, .. } => format!("ScalarParameter({name})"),
            E::VectorParameter { name, .. } => format!("VectorParameter({name})"),
            E::TextureParameter { name, .. } => format!("TextureParameter({name})"),
            E::Texture { texture } => format!("Texture({})", texture.asset),
            E::GameTime => "GameTime".to_string(),
            E::RealTime => "RealTime".to_string(),
            E::Folded { op, a, b, .. } => format!("{op:?}({}, {})", a.describe(), b.describe()),
            other => {
                let name = match other {
                    E::Sine { .. } => "Sine",
                    E::Cosine { .. } => "Cosine",
                    E::SquareRoot { .. } => "SquareRoot",
                    E::Length { .. } => "Length",
                    E::Abs { .. } => "Abs",
                    E::Floor { .. } => "Floor",
                    E::Ceil { .. } => "Ceil",
                    E::Frac { .. } => "Frac",
                    E::Fmod { .. } => "Fmod",
                    E::Min { .. } => "Min",
                    E::Max { .. } => "Max",
                    E::Clamp { .. } => "Clamp",
                    E::AppendVector { .. } => "AppendVector",
                    _ => "Periodic",
                };
                let args: Vec<String> = other.operands().iter().map(|x| x.describe()).collect();
                format!("{name}({})", args.join(", "))
            }
        }
    }
}

impl PartialEq for UniformExpression {
    fn eq(&self, other: &Self) -> bool {
        self.structural_equals(other)
    }
}

impl Eq for UniformExpression {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uniform::context::{NoOverrides, ParameterOverrides};

    fn arc(e: UniformExpression) -> UniformExprRef {
        Arc::new(e)
    }

    fn scalar_param(name: &str, default_value: f32) -> UniformExpression {
        UniformExpression::ScalarParameter {
            name: name.to_string(),
            default_value,
        }
    }

    #[test]
    fn divide_by_zero_is_finite_and_keeps_sign() {
        let ctx = RenderContext::default();
        for (divisor, expected_sign) in [(0.0_f32, 1.0_f32), (-0.0, -1.0), (1e-9, 1.0), (-1e-9, -1.0)] {
            let e = UniformExpression::Folded {
                op: FoldedOp::Div,
                a: arc(UniformExpression::scalar(2.0)),
                b: arc(UniformExpression::scalar(divisor)),
                components: 1,
            };
            let v = e.evaluate(&ctx, &NoOverrides);
            assert!(v.iter().all(|c| c.is_finite()), "divisor {divisor} gave {v:?}");
            assert_eq!(v[0].signum(), expected_sign, "divisor {divisor}");
        }
    }

    #[test]
    fn fmod_guards_zero_divisor() {
        let e = UniformExpression::Fmod {
            a: arc(UniformExpression::scalar(3.0)),
            b: arc(UniformExpression::scalar(0.0)),
        };
        let v = e.evaluate(&RenderContext::default(), &NoOverrides);
        assert!(v[0].is_finite());
    }

    #[test]
    fn constness_is_bottom_up() {
        let c = arc(UniformExpression::scalar(1.0));
        let t = arc(UniformExpression::GameTime);
        let all_const = UniformExpression::Min {
            a: c.clone(),
            b: c.clone(),
        };
        let mixed = UniformExpression::Min { a: c, b: t };
        assert!(all_const.is_constant());
        assert!(!mixed.is_constant());
        assert!(!UniformExpression::GameTime.is_constant());
    }

    #[test]
    fn periodic_is_identity_at_evaluation_but_not_in_identity() {
        let inner = arc(UniformExpression::scalar(3.25));
        let periodic = UniformExpression::Periodic { x: inner.clone() };
        let ctx = RenderContext::default();
        assert_eq!(periodic.evaluate(&ctx, &NoOverrides), inner.evaluate(&ctx, &NoOverrides));
        assert!(!periodic.structural_equals(&inner));
    }

    #[test]
    fn structural_identity_compares_names_and_defaults() {
        let a = scalar_param("Dissolve", 1.0);
        let b = scalar_param("Dissolve", 1.0);
        let c = scalar_param("Dissolve", 0.5);
        let d = scalar_param("Glow", 1.0);
        assert!(a.structural_equals(&b));
        assert!(b.structural_equals(&a));
        assert!(!a.structural_equals(&c));
        assert!(!a.structural_equals(&d));

        let nested_a = UniformExpression::Sine { x: arc(a) };
        let nested_b = UniformExpression::Sine { x: arc(b) };
        let cosine = UniformExpression::Cosine {
            x: arc(scalar_param("Dissolve", 1.0)),
        };
        assert_eq!(nested_a, nested_b);
        assert_ne!(nested_a, cosine);
    }

    #[test]
    fn constants_compare_by_type_and_bits() {
        let a = UniformExpression::constant([1.0, 2.0, 0.0, 0.0], ValueType::Float2);
        let b = UniformExpression::constant([1.0, 2.0, 9.0, 9.0], ValueType::Float2);
        let c = UniformExpression::constant([1.0, 2.0, 0.0, 0.0], ValueType::Float3);
        assert_eq!(a, b);
        assert_ne!(a, c);
        let nan = UniformExpression::scalar(f32::NAN);
        assert_eq!(nan, nan.clone());
    }

    #[test]
    fn parameters_read_overrides_then_defaults() {
        let ctx = RenderContext::new(2.0, 5.0);
        let mut overrides = ParameterOverrides::new();
        overrides.set_scalar("Dissolve", 0.25);
        assert_eq!(scalar_param("Dissolve", 1.0).evaluate(&ctx, &overrides), [0.25; 4]);
        assert_eq!(scalar_param("Other", 1.0).evaluate(&ctx, &overrides), [1.0; 4]);
        assert_eq!(UniformExpression::RealTime.evaluate(&ctx, &overrides), [5.0; 4]);
    }

    #[test]
    fn append_and_dot_respect_component_counts() {
        let ctx = RenderContext::default();
        let xy = arc(UniformExpression::constant([1.0, 2.0, 0.0, 0.0], ValueType::Float2));
        let z = arc(UniformExpression::scalar(3.0));
        let append = UniformExpression::AppendVector {
            a: xy.clone(),
            b: z,
            a_components: 2,
        };
        assert_eq!(append.evaluate(&ctx, &NoOverrides), [1.0, 2.0, 3.0, 3.0]);

        let dot = UniformExpression::Folded {
            op: FoldedOp::Dot,
            a: xy.clone(),
            b: xy,
            components: 2,
        };
        assert_eq!(dot.evaluate(&ctx, &NoOverrides), [5.0; 4]);
    }

    #[test]
    fn serialization_is_type_tagged() {
        let e = UniformExpression::Folded {
            op: FoldedOp::Mul,
            a: arc(UniformExpression::GameTime),
            b: arc(UniformExpression::scalar(0.5)),
            components: 1,
        };
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["type"], "folded");
        assert_eq!(json["a"]["type"], "game_time");
        let back: UniformExpression = serde_json::from_value(json).unwrap();
        assert_eq!(back, e);
    }
}
