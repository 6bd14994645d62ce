//! Test utility functions for flowline

use flowline::{
    Binding, OperatorRef, Pipeline, Reference, SavedTemplate, VarKind,
};

/// Install a subscriber so `RUST_LOG=debug cargo test` shows client traces
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// A leaf operator that splits a corpus into tokens
pub fn tokenize_template() -> SavedTemplate {
    SavedTemplate::from_yaml(
        r#"
apiVersion: core/v1
metadata:
  name: tokenize
  identifier: tokenize
  provider: acme
  version: v1
spec:
  inputs:
    - name: pattern
      type: String
      required: true
    - name: corpus
      metadata:
        kind: DataSet
        location: OssObject
      required: true
  outputs:
    - name: tokens
      metadata:
        kind: DataSet
        location: OssObject
  container:
    image: acme/tokenize:1.0
    command: ["tokenize", "--stdin"]
"#,
    )
    .expect("tokenize template parses")
}

/// A leaf operator that counts tokens
pub fn count_template() -> SavedTemplate {
    SavedTemplate::from_yaml(
        r#"
apiVersion: core/v1
metadata:
  name: count
  identifier: count
  provider: acme
  version: v1
spec:
  inputs:
    - name: top_n
      type: Int
    - name: tokens
      metadata:
        kind: DataSet
        location: OssObject
      required: true
  outputs:
    - name: counts
      metadata:
        kind: DataSet
        location: OssObject
  container:
    image: acme/count:1.0
    command: ["count"]
"#,
    )
    .expect("count template parses")
}

/// A leaf operator that trains a model from a dataset
pub fn train_template() -> SavedTemplate {
    SavedTemplate::from_yaml(
        r#"
apiVersion: core/v1
metadata:
  name: train
  identifier: train
  provider: acme
  version: v1
spec:
  inputs:
    - name: rounds
      type: Int
      required: true
    - name: dataset
      metadata:
        kind: DataSet
        location: OssObject
      required: true
  outputs:
    - name: model
      metadata:
        kind: Model
        location: OssObject
  container:
    image: acme/train:2.3
    command: ["train"]
"#,
    )
    .expect("train template parses")
}

/// tokenize -> count, with pipeline inputs `pattern`/`corpus` and the
/// counts dataset exposed as the pipeline output.
pub fn wordcount_pipeline() -> Pipeline {
    let mut pipeline = Pipeline::new(
        "wordcount",
        OperatorRef::new("wordcount", "acme", "v1").unwrap(),
    )
    .unwrap();

    let mut tokenize = tokenize_template()
        .as_step()
        .unwrap()
        .named("tokenize")
        .unwrap();
    tokenize
        .bind(
            "pattern",
            Binding::From(Reference::pipeline_input(VarKind::Parameter, "pattern")),
        )
        .unwrap();
    tokenize
        .bind(
            "corpus",
            Binding::From(Reference::pipeline_input(VarKind::Artifact, "corpus")),
        )
        .unwrap();
    pipeline.add_step(tokenize).unwrap();

    let mut count = count_template().as_step().unwrap().named("count").unwrap();
    count
        .bind(
            "tokens",
            Binding::From(Reference::step_output("tokenize", VarKind::Artifact, "tokens")),
        )
        .unwrap();
    count.bind_value("top_n", 100).unwrap();
    pipeline.add_step(count).unwrap();

    pipeline.expose_output("counts", "count", "counts").unwrap();
    pipeline
}

/// Arguments satisfying `wordcount_pipeline`'s required inputs
pub fn wordcount_arguments() -> std::collections::BTreeMap<String, serde_yaml::Value> {
    let mut arguments = std::collections::BTreeMap::new();
    arguments.insert("pattern".to_string(), serde_yaml::Value::from(r"\w+"));
    arguments.insert(
        "corpus".to_string(),
        serde_yaml::Value::from("oss://bucket/corpus.txt"),
    );
    arguments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wordcount_pipeline_is_valid() {
        let pipeline = wordcount_pipeline();
        pipeline.validate().unwrap();
        assert_eq!(pipeline.steps().len(), 2);
        assert_eq!(pipeline.outputs().len(), 1);
    }

    #[test]
    fn test_wordcount_inputs_inferred() {
        let pipeline = wordcount_pipeline();
        let inputs = pipeline.inputs().unwrap();
        // parameters first, then artifacts
        assert_eq!(inputs.names(), vec!["pattern", "corpus"]);
        assert!(inputs.get("pattern").unwrap().required);
        assert!(inputs.get("corpus").unwrap().required);
    }
}
