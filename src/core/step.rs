//! Step domain model

use crate::core::ports::IoSpec;
use crate::core::reference::Reference;
use crate::core::variable::{Binding, Direction, Variable};
use anyhow::{bail, Context, Result};
use regex::Regex;
use serde_yaml::Value;
use std::collections::BTreeSet;

/// Names accepted by the remote service for operators, steps and pipelines
pub(crate) fn validate_name(label: &str, name: &str) -> Result<()> {
    let pattern = Regex::new(r"^[a-z][a-z0-9_-]{0,63}$").expect("name pattern is valid");
    if !pattern.is_match(name) {
        bail!(
            "{} name '{}' is invalid: must start with a lowercase letter and contain only \
             lowercase letters, digits, '-' or '_' (at most 64 chars)",
            label,
            name
        );
    }
    Ok(())
}

/// Identity of a registered remote operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorRef {
    pub identifier: String,
    pub provider: String,
    pub version: String,
}

impl OperatorRef {
    pub fn new(
        identifier: impl Into<String>,
        provider: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<Self> {
        let identifier = identifier.into();
        let provider = provider.into();
        let version = version.into();
        validate_name("operator identifier", &identifier)?;
        if provider.is_empty() {
            bail!("operator '{}' has an empty provider", identifier);
        }
        if version.is_empty() {
            bail!("operator '{}' has an empty version", identifier);
        }
        Ok(Self {
            identifier,
            provider,
            version,
        })
    }
}

/// One invocation of a remote operator inside a pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStep {
    op: OperatorRef,
    name: Option<String>,
    inputs: IoSpec,
    outputs: IoSpec,
    depends_on: Vec<String>,
}

impl PipelineStep {
    /// Instantiate a step from an operator's input/output signature.
    pub fn new(op: OperatorRef, inputs: Vec<Variable>, outputs: Vec<Variable>) -> Result<Self> {
        let inputs = IoSpec::from_vars(Direction::Input, inputs)
            .with_context(|| format!("inputs of operator '{}'", op.identifier))?;
        let outputs = IoSpec::from_vars(Direction::Output, outputs)
            .with_context(|| format!("outputs of operator '{}'", op.identifier))?;
        Ok(Self {
            op,
            name: None,
            inputs,
            outputs,
            depends_on: Vec::new(),
        })
    }

    /// Give the step an explicit name. Unnamed steps are auto-named from the
    /// operator identifier when added to a pipeline.
    pub fn named(mut self, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_name("step", &name)?;
        self.name = Some(name);
        Ok(self)
    }

    pub fn op(&self) -> &OperatorRef {
        &self.op
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = Some(name);
    }

    pub fn inputs(&self) -> &IoSpec {
        &self.inputs
    }

    pub fn outputs(&self) -> &IoSpec {
        &self.outputs
    }

    /// Bind an input port to a literal or a reference.
    pub fn bind(&mut self, input: &str, binding: Binding) -> Result<()> {
        let step = self
            .name
            .as_deref()
            .unwrap_or(self.op.identifier.as_str())
            .to_string();
        let Some(var) = self.inputs.get_mut(input) else {
            bail!(
                "step '{}' has no input '{}' (known inputs: {:?})",
                step,
                input,
                self.inputs.names()
            );
        };
        var.bind(binding)
            .with_context(|| format!("binding input '{}' of step '{}'", input, step))
    }

    /// Bind an input port to a literal value.
    pub fn bind_value(&mut self, input: &str, value: impl Into<Value>) -> Result<()> {
        self.bind(input, Binding::Literal(value.into()))
    }

    /// Declare an explicit dependency on another step by name.
    pub fn after(&mut self, step_name: &str) -> Result<()> {
        validate_name("step", step_name)?;
        if !self.depends_on.iter().any(|d| d == step_name) {
            self.depends_on.push(step_name.to_string());
        }
        Ok(())
    }

    pub fn explicit_dependencies(&self) -> &[String] {
        &self.depends_on
    }

    /// A reference to one of this step's outputs, usable as a binding for
    /// a downstream step. The step must be named first.
    pub fn output_ref(&self, output: &str) -> Result<Reference> {
        let Some(name) = self.name.as_deref() else {
            bail!("step for operator '{}' has no name yet", self.op.identifier);
        };
        let Some(var) = self.outputs.get(output) else {
            bail!(
                "step '{}' has no output '{}' (known outputs: {:?})",
                name,
                output,
                self.outputs.names()
            );
        };
        Ok(Reference::step_output(name, var.kind(), var.name.as_str()))
    }

    /// Explicit dependencies plus those derived from input bindings that
    /// reference another step's output.
    pub fn dependencies(&self) -> BTreeSet<String> {
        let mut deps: BTreeSet<String> = self.depends_on.iter().cloned().collect();
        for var in self.inputs.iter() {
            if let Some(Binding::From(reference)) = var.binding() {
                if let Some(step) = reference.producing_step() {
                    deps.insert(step.to_string());
                }
            }
        }
        deps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::variable::{ArtifactMeta, ParamType, VarKind};

    fn split_step() -> PipelineStep {
        PipelineStep::new(
            OperatorRef::new("split", "acme", "v1").unwrap(),
            vec![
                Variable::parameter("ratio").with_type(ParamType::Double),
                Variable::artifact("dataset", ArtifactMeta::dataset()).required(),
            ],
            vec![
                Variable::artifact("train_set", ArtifactMeta::dataset()),
                Variable::artifact("test_set", ArtifactMeta::dataset()),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_bind_unknown_input() {
        let mut step = split_step();
        let err = step.bind_value("nope", 1).unwrap_err();
        assert!(err.to_string().contains("no input 'nope'"));
        assert!(err.to_string().contains("ratio"));
    }

    #[test]
    fn test_bind_rejects_second_assignment() {
        let mut step = split_step();
        step.bind_value("ratio", 0.7).unwrap();
        assert!(step.bind_value("ratio", 0.8).is_err());
    }

    #[test]
    fn test_derived_dependencies() {
        let mut step = split_step();
        step.bind(
            "dataset",
            Binding::From(Reference::step_output("fetch", VarKind::Artifact, "raw")),
        )
        .unwrap();
        step.after("warmup").unwrap();

        let deps = step.dependencies();
        assert_eq!(
            deps.into_iter().collect::<Vec<_>>(),
            vec!["fetch".to_string(), "warmup".to_string()]
        );
    }

    #[test]
    fn test_output_ref_requires_name() {
        let step = split_step();
        assert!(step.output_ref("train_set").is_err());

        let step = split_step().named("split").unwrap();
        let r = step.output_ref("train_set").unwrap();
        assert_eq!(r.to_string(), "{{pipelines.split.outputs.artifacts.train_set}}");
    }

    #[test]
    fn test_step_name_pattern() {
        assert!(split_step().named("Split").is_err());
        assert!(split_step().named("split-2").is_ok());
        assert!(split_step().named("9split").is_err());
    }

    #[test]
    fn test_operator_ref_validation() {
        assert!(OperatorRef::new("", "acme", "v1").is_err());
        assert!(OperatorRef::new("split", "", "v1").is_err());
        assert!(OperatorRef::new("split", "acme", "").is_err());
    }
}
