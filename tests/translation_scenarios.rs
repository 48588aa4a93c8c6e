use std::path::PathBuf;

use material_forge::dsl::{Connection, Endpoint, MaterialFunction, MaterialGraph, Metadata, Node};
use material_forge::error::TranslationError;
use material_forge::shader_map::StaticSwitchSet;
use material_forge::types::{MaterialProperty, MaterialSettings, Platform, Quality, ShaderFrequency};
use material_forge::{Material, WgslTranslator};
use proptest::prelude::*;

fn case_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("cases")
        .join(name)
}

fn node(id: &str, node_type: &str, params: serde_json::Value) -> Node {
    Node {
        id: id.to_string(),
        node_type: node_type.to_string(),
        params: params
            .as_object()
            .map(|m| m.clone().into_iter().collect())
            .unwrap_or_default(),
    }
}

fn endpoint(node_id: &str, port_id: &str) -> Endpoint {
    Endpoint {
        node_id: node_id.to_string(),
        port_id: port_id.to_string(),
    }
}

fn link(from: (&str, &str), to: (&str, &str)) -> Connection {
    Connection {
        id: format!("{}.{}->{}.{}", from.0, from.1, to.0, to.1),
        from: endpoint(from.0, from.1),
        to: endpoint(to.0, to.1),
    }
}

fn material(
    nodes: Vec<Node>,
    connections: Vec<Connection>,
    properties: Vec<(MaterialProperty, Endpoint)>,
) -> Material {
    Material::new(MaterialGraph {
        version: "1.0".to_string(),
        metadata: Metadata {
            name: "scenario".to_string(),
            created: None,
            modified: None,
        },
        id: None,
        settings: MaterialSettings::default(),
        nodes,
        connections,
        properties: properties.into_iter().collect(),
        functions: Vec::new(),
    })
}

fn translator() -> WgslTranslator {
    WgslTranslator::new(Platform::Desktop, Quality::High, StaticSwitchSet::new())
}

#[test]
fn dissolve_and_glow_register_one_uniform_each() {
    let material = Material::load_from_path(case_path("dissolve_glow.json")).expect("load case");

    let first = translator().translate(&material);
    assert!(first.succeeded(), "{:?}", first.diagnostics);
    let pixel = first.uniform_expression_set.stage(ShaderFrequency::Pixel);
    assert_eq!(pixel.scalars.len(), 1);
    assert_eq!(pixel.vectors.len(), 1);
    assert!(pixel.scalars[0].describe().contains("Dissolve"));
    assert!(pixel.vectors[0].describe().contains("Glow"));

    let second = translator().translate(&material);
    assert_eq!(second.uniform_expression_set, first.uniform_expression_set);
    assert_eq!(second.shader_text, first.shader_text);
}

#[test]
fn self_referential_function_fails_with_cyclic_reference() {
    let material = Material::load_from_path(case_path("cyclic_function.json")).expect("load case");
    let out = translator().translate(&material);

    assert!(out.shader_text.is_none());
    assert!(
        out.diagnostics
            .iter()
            .any(|d| matches!(d.error, TranslationError::CyclicReference(_))),
        "{:?}",
        out.diagnostics
    );
}

#[test]
fn a_node_feeding_itself_is_reentrant() {
    let material = material(
        vec![
            node("sum", "Add", serde_json::json!({})),
            node("one", "Constant", serde_json::json!({ "value": 1.0 })),
        ],
        vec![link(("sum", "result"), ("sum", "a")), link(("one", "value"), ("sum", "b"))],
        vec![(MaterialProperty::Opacity, endpoint("sum", "result"))],
    );
    let out = translator().translate(&material);

    assert!(out.shader_text.is_none());
    assert_eq!(out.diagnostics.len(), 1, "{:?}", out.diagnostics);
    let d = &out.diagnostics[0];
    assert!(matches!(d.error, TranslationError::CyclicReference(_)));
    assert!(d.error.to_string().contains("Add 'sum'"), "{}", d.error);
    assert_eq!(d.offending_node_id.as_deref(), Some("sum"));
    assert_eq!(d.function_context, None);
}

#[test]
fn a_cycle_through_a_function_input_names_the_call() {
    let mut material_graph = material(
        vec![
            node("sum", "Add", serde_json::json!({})),
            node("one", "Constant", serde_json::json!({ "value": 1.0 })),
            node("call", "FunctionCall", serde_json::json!({ "function": "Passthrough" })),
        ],
        vec![
            link(("call", "result"), ("sum", "a")),
            link(("one", "value"), ("sum", "b")),
            link(("sum", "result"), ("call", "x")),
        ],
        vec![(MaterialProperty::Opacity, endpoint("sum", "result"))],
    )
    .graph()
    .clone();
    material_graph.functions.push(MaterialFunction {
        name: "Passthrough".to_string(),
        nodes: vec![
            node("in", "FunctionInput", serde_json::json!({ "name": "x" })),
            node("out", "FunctionOutput", serde_json::json!({ "name": "result" })),
        ],
        connections: vec![link(("in", "value"), ("out", "value"))],
    });
    let out = translator().translate(&Material::new(material_graph));

    assert!(out.shader_text.is_none());
    assert_eq!(out.diagnostics.len(), 1, "{:?}", out.diagnostics);
    let d = &out.diagnostics[0];
    assert!(matches!(d.error, TranslationError::CyclicReference(_)));
    assert!(d.error.to_string().contains("Add 'sum'"), "{}", d.error);
    assert_eq!(d.function_context.as_deref(), Some("Function Passthrough"));
}

#[test]
fn component_mask_beyond_a_scalar_is_an_error() {
    let material = material(
        vec![
            node("s", "ScalarParameter", serde_json::json!({ "name": "S", "default": 0.5 })),
            node(
                "mask",
                "ComponentMask",
                serde_json::json!({ "r": true, "g": true, "b": false, "a": false }),
            ),
        ],
        vec![link(("s", "value"), ("mask", "value"))],
        vec![(MaterialProperty::EmissiveColor, endpoint("mask", "result"))],
    );
    let out = translator().translate(&material);

    assert_eq!(out.diagnostics.len(), 1, "{:?}", out.diagnostics);
    let d = &out.diagnostics[0];
    assert!(matches!(d.error, TranslationError::TypeMismatch(_)));
    assert!(d.error.to_string().contains("Not enough components"));
    assert_eq!(d.offending_node_id.as_deref(), Some("mask"));
}

#[test]
fn a_parameter_shared_across_properties_uses_one_slot() {
    let material = material(
        vec![node(
            "rough",
            "ScalarParameter",
            serde_json::json!({ "name": "Roughness", "default": 0.5 }),
        )],
        vec![],
        vec![
            (MaterialProperty::Opacity, endpoint("rough", "value")),
            (MaterialProperty::SpecularPower, endpoint("rough", "value")),
        ],
    );
    let out = translator().translate(&material);
    assert!(out.succeeded(), "{:?}", out.diagnostics);
    assert_eq!(
        out.uniform_expression_set
            .stage(ShaderFrequency::Pixel)
            .scalars
            .len(),
        1
    );
}

#[test]
fn static_switches_pick_the_branch_per_key() {
    let material = Material::load_from_path(case_path("textured_switch.json")).expect("load case");

    let dry = translator().translate(&material);
    let wet = WgslTranslator::new(
        Platform::Desktop,
        Quality::High,
        StaticSwitchSet::new().with_bool("Wet", true),
    )
    .translate(&material);

    assert!(dry.succeeded(), "{:?}", dry.diagnostics);
    assert!(wet.succeeded(), "{:?}", wet.diagnostics);
    let dry_text = dry.shader_text.expect("dry text");
    let wet_text = wet.shader_text.expect("wet text");
    assert!(dry_text.contains("0.04"), "{dry_text}");
    assert!(wet_text.contains("0.6"), "{wet_text}");
    assert!(!wet_text.contains("0.04"), "{wet_text}");
    assert_eq!(
        dry.uniform_expression_set
            .stage(ShaderFrequency::Pixel)
            .textures_2d
            .len(),
        2
    );
    assert_eq!(dry.max_texture_dependency_length, 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn translation_is_deterministic(
        a in -100.0f32..100.0,
        b in -100.0f32..100.0,
        name in "[A-Z][a-z]{2,8}",
    ) {
        let material = material(
            vec![
                node("p", "ScalarParameter", serde_json::json!({ "name": name, "default": a })),
                node("c", "Constant", serde_json::json!({ "value": b })),
                node("add", "Add", serde_json::json!({})),
            ],
            vec![link(("p", "value"), ("add", "a")), link(("c", "value"), ("add", "b"))],
            vec![(MaterialProperty::Opacity, endpoint("add", "result"))],
        );

        let first = translator().translate(&material);
        let second = translator().translate(&material);
        prop_assert!(first.succeeded());
        prop_assert_eq!(&first.shader_text, &second.shader_text);
        prop_assert_eq!(&first.uniform_expression_set, &second.uniform_expression_set);
    }
}
