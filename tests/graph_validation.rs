//! Scenario tests for graph construction and validation

mod helpers;

use flowline::{Binding, OperatorRef, Pipeline, Reference, VarKind};
use helpers::{count_template, tokenize_template, train_template, wordcount_pipeline};

#[test]
fn test_duplicate_step_names_rejected() {
    let mut pipeline = Pipeline::new(
        "dup",
        OperatorRef::new("dup", "acme", "v1").unwrap(),
    )
    .unwrap();
    let first = tokenize_template().as_step().unwrap().named("step").unwrap();
    let second = count_template().as_step().unwrap().named("step").unwrap();
    pipeline.add_step(first).unwrap();

    let err = pipeline.add_step(second).unwrap_err();
    assert!(err.to_string().contains("duplicate step name 'step'"));
}

#[test]
fn test_transitive_cycle_rejected() {
    let mut pipeline = Pipeline::new(
        "cyclic",
        OperatorRef::new("cyclic", "acme", "v1").unwrap(),
    )
    .unwrap();
    for name in ["a", "b", "c"] {
        let step = tokenize_template().as_step().unwrap().named(name).unwrap();
        pipeline.add_step(step).unwrap();
    }
    pipeline.step_mut("b").unwrap().after("a").unwrap();
    pipeline.step_mut("c").unwrap().after("b").unwrap();
    pipeline.step_mut("a").unwrap().after("c").unwrap();

    let err = pipeline.validate().unwrap_err();
    let message = err.to_string();
    assert!(message.contains("cycle"));
    for name in ["a", "b", "c"] {
        assert!(message.contains(name), "cycle report should name '{}'", name);
    }
}

#[test]
fn test_reference_derived_cycle_rejected() {
    // No explicit dependencies: the cycle comes entirely from bindings.
    let mut pipeline = Pipeline::new(
        "cyclic",
        OperatorRef::new("cyclic", "acme", "v1").unwrap(),
    )
    .unwrap();
    let mut first = count_template().as_step().unwrap().named("first").unwrap();
    first
        .bind(
            "tokens",
            Binding::From(Reference::step_output("second", VarKind::Artifact, "counts")),
        )
        .unwrap();
    let mut second = count_template().as_step().unwrap().named("second").unwrap();
    second
        .bind(
            "tokens",
            Binding::From(Reference::step_output("first", VarKind::Artifact, "counts")),
        )
        .unwrap();
    pipeline.add_step(first).unwrap();
    pipeline.add_step(second).unwrap();

    assert!(pipeline.validate().unwrap_err().to_string().contains("cycle"));
}

#[test]
fn test_required_input_must_be_bound() {
    let mut pipeline = Pipeline::new(
        "partial",
        OperatorRef::new("partial", "acme", "v1").unwrap(),
    )
    .unwrap();
    let mut train = train_template().as_step().unwrap().named("train").unwrap();
    train.bind_value("rounds", 10).unwrap();
    // `dataset` is required and never bound
    pipeline.add_step(train).unwrap();

    let err = pipeline.validate().unwrap_err();
    assert!(err.to_string().contains("required input 'dataset'"));
    assert!(err.to_string().contains("train"));
}

#[test]
fn test_rebinding_is_rejected() {
    let mut step = train_template().as_step().unwrap().named("train").unwrap();
    step.bind_value("rounds", 10).unwrap();
    let err = step.bind_value("rounds", 20).unwrap_err();
    assert!(format!("{:#}", err).contains("already bound"));
}

#[test]
fn test_literal_must_match_declared_type() {
    let mut step = train_template().as_step().unwrap().named("train").unwrap();
    let err = step.bind_value("rounds", "ten").unwrap_err();
    assert!(format!("{:#}", err).contains("does not match declared type"));
}

#[test]
fn test_artifact_cannot_feed_parameter() {
    let mut step = train_template().as_step().unwrap().named("train").unwrap();
    let err = step
        .bind(
            "rounds",
            Binding::From(Reference::step_output("other", VarKind::Artifact, "model")),
        )
        .unwrap_err();
    assert!(format!("{:#}", err).contains("parameters"));
}

#[test]
fn test_model_output_cannot_feed_dataset_input() {
    let mut pipeline = Pipeline::new(
        "mismatch",
        OperatorRef::new("mismatch", "acme", "v1").unwrap(),
    )
    .unwrap();
    let mut train = train_template().as_step().unwrap().named("train").unwrap();
    train.bind_value("rounds", 1).unwrap();
    train
        .bind(
            "dataset",
            Binding::From(Reference::pipeline_input(VarKind::Artifact, "dataset")),
        )
        .unwrap();
    pipeline.add_step(train).unwrap();

    // count expects a DataSet but train produces a Model
    let mut count = count_template().as_step().unwrap().named("count").unwrap();
    count
        .bind(
            "tokens",
            Binding::From(Reference::step_output("train", VarKind::Artifact, "model")),
        )
        .unwrap();
    pipeline.add_step(count).unwrap();

    let err = pipeline.validate().unwrap_err();
    assert!(format!("{:#}", err).contains("incompatible"));
}

#[test]
fn test_unknown_output_port_rejected() {
    let mut pipeline = Pipeline::new(
        "ports",
        OperatorRef::new("ports", "acme", "v1").unwrap(),
    )
    .unwrap();
    let step = tokenize_template().as_step().unwrap().named("tokenize").unwrap();
    pipeline.add_step(step).unwrap();

    let err = pipeline
        .expose_output("result", "tokenize", "shards")
        .unwrap_err();
    assert!(err.to_string().contains("no output 'shards'"));
    assert!(err.to_string().contains("tokens"));
}

#[test]
fn test_valid_pipeline_passes_all_checks() {
    let pipeline = wordcount_pipeline();
    pipeline.validate().unwrap();

    let order: Vec<&str> = pipeline
        .topo_order()
        .unwrap()
        .iter()
        .filter_map(|s| s.name())
        .collect();
    assert_eq!(order, vec!["tokenize", "count"]);
}

#[test]
fn test_undeclared_pipeline_input_rejected() {
    let mut pipeline = Pipeline::new(
        "declared",
        OperatorRef::new("declared", "acme", "v1").unwrap(),
    )
    .unwrap();
    pipeline
        .declare_input(flowline::Variable::parameter("pattern"))
        .unwrap();

    let mut step = tokenize_template().as_step().unwrap().named("tokenize").unwrap();
    step.bind(
        "pattern",
        Binding::From(Reference::pipeline_input(VarKind::Parameter, "ghost")),
    )
    .unwrap();
    step.bind_value("corpus", "oss://bucket/in").unwrap();
    pipeline.add_step(step).unwrap();

    let err = pipeline.validate().unwrap_err();
    assert!(err.to_string().contains("undeclared pipeline input 'ghost'"));
}

#[test]
fn test_auto_names_are_deterministic() {
    let mut pipeline = Pipeline::new(
        "auto",
        OperatorRef::new("auto", "acme", "v1").unwrap(),
    )
    .unwrap();
    let a = pipeline.add_step(tokenize_template().as_step().unwrap()).unwrap();
    let b = pipeline.add_step(tokenize_template().as_step().unwrap()).unwrap();
    let c = pipeline.add_step(tokenize_template().as_step().unwrap()).unwrap();
    assert_eq!(vec![a, b, c], vec!["tokenize", "tokenize-2", "tokenize-3"]);
}
