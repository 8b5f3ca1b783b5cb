// Pipeline assembly and per-event processing over a shared store.
use product_store::stage::{
    Parameter, Pipeline, PipelineConfig, RandomDataGeneratorStage, StageError, StageFactory,
};
use product_store::{FieldAccess, InputBundle, Product, Store};
use std::sync::Arc;

const CONFIG: &str = r#"{
    "stages": [
        {"type": "ClearProductsStage", "parameters": {"tags": ["generated"]}},
        {"type": "RandomDataGeneratorStage",
         "parameters": {"product_name": "energy", "min": 5.0, "max": 10.0, "seed": 42}}
    ]
}"#;

fn pipeline() -> Pipeline<Parameter> {
    let config = PipelineConfig::from_json_str(CONFIG).unwrap();
    let factory = StageFactory::with_builtin();
    Pipeline::from_config(Arc::new(Store::new()), &factory, &config).unwrap()
}

#[test]
fn stages_run_in_configured_order() {
    let mut p = pipeline();
    assert_eq!(
        p.stage_names(),
        ["ClearProductsStage", "RandomDataGeneratorStage"]
    );

    let mut input = InputBundle::new();
    input.set("event", 1i64);
    for _ in 0..5 {
        p.process_event(&input).unwrap();
        // The clear stage drops last event's value before the generator
        // writes a new one, so exactly one product survives each event.
        let store = p.store();
        assert_eq!(store.get_names_with_tag(RandomDataGeneratorStage::TAG), ["energy"]);
        let h = store.checkout_read("energy").unwrap();
        let value = h.field("value").and_then(|v| v.as_f64()).unwrap();
        assert!((5.0..=10.0).contains(&value));
    }
}

// Test: products without the cleared tag survive every event.
#[test]
fn untagged_products_survive_clear() {
    let mut p = pipeline();
    p.store().add_or_update(
        "calibration",
        Product::new(Parameter {
            name: "calibration".into(),
            value: 1.5,
        }),
    );
    p.process_event(&InputBundle::new()).unwrap();
    p.process_event(&InputBundle::new()).unwrap();
    let mut names = p.store().get_all_names();
    names.sort();
    assert_eq!(names, ["calibration", "energy"]);
}

#[test]
fn seeded_pipelines_agree() {
    let (mut a, mut b) = (pipeline(), pipeline());
    for _ in 0..3 {
        a.process_event(&InputBundle::new()).unwrap();
        b.process_event(&InputBundle::new()).unwrap();
        assert_eq!(
            a.store().checkout_read("energy").unwrap().value,
            b.store().checkout_read("energy").unwrap().value
        );
    }
}

#[test]
fn bad_stage_configuration_fails_assembly() {
    let factory: StageFactory<Parameter> = StageFactory::with_builtin();
    let unknown = PipelineConfig::from_json_str(r#"{"stages": [{"type": "Nope"}]}"#).unwrap();
    assert!(matches!(
        Pipeline::from_config(Arc::new(Store::new()), &factory, &unknown),
        Err(StageError::UnknownStage(_))
    ));

    let inverted = PipelineConfig::from_json_str(
        r#"{"stages": [{"type": "RandomDataGeneratorStage", "parameters": {"min": 2, "max": 1}}]}"#,
    )
    .unwrap();
    assert!(matches!(
        Pipeline::from_config(Arc::new(Store::new()), &factory, &inverted),
        Err(StageError::InvalidParameter { .. })
    ));
}

#[test]
fn missing_config_file_is_an_io_error() {
    assert!(matches!(
        PipelineConfig::load("/nonexistent/pipeline.json"),
        Err(StageError::Io(_))
    ));
}
