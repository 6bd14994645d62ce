//! Moustache-style references linking a variable to its producer

use crate::core::variable::VarKind;
use anyhow::{bail, Result};
use std::fmt;

/// Where a referenced value is produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefSource {
    /// A pipeline-level input
    PipelineInput,
    /// The output of a named step
    StepOutput(String),
}

/// A reference to a producing variable, encoded in manifests as
/// `{{inputs.parameters.x}}` or `{{pipelines.step.outputs.artifacts.y}}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub source: RefSource,
    pub kind: VarKind,
    pub name: String,
}

impl Reference {
    /// Reference a pipeline-level input
    pub fn pipeline_input(kind: VarKind, name: impl Into<String>) -> Self {
        Self {
            source: RefSource::PipelineInput,
            kind,
            name: name.into(),
        }
    }

    /// Reference the output of a named step
    pub fn step_output(step: impl Into<String>, kind: VarKind, name: impl Into<String>) -> Self {
        Self {
            source: RefSource::StepOutput(step.into()),
            kind,
            name: name.into(),
        }
    }

    /// The step this reference reads from, if any
    pub fn producing_step(&self) -> Option<&str> {
        match &self.source {
            RefSource::PipelineInput => None,
            RefSource::StepOutput(step) => Some(step),
        }
    }

    /// Parse the manifest encoding back into a structured reference.
    ///
    /// Accepted forms:
    /// - `{{inputs.<category>.<name>}}`
    /// - `{{pipelines.<step>.outputs.<category>.<name>}}`
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        let inner = trimmed
            .strip_prefix("{{")
            .and_then(|s| s.strip_suffix("}}"))
            .map(str::trim);

        let Some(inner) = inner else {
            bail!("malformed reference '{}': expected '{{{{...}}}}'", text);
        };

        let segments: Vec<&str> = inner.split('.').collect();
        match *segments.as_slice() {
            ["inputs", category, name] => Ok(Self {
                source: RefSource::PipelineInput,
                kind: VarKind::from_list_name(category).ok_or_else(|| {
                    anyhow::anyhow!("unknown category '{}' in reference '{}'", category, text)
                })?,
                name: name.to_string(),
            }),
            ["pipelines", step, "outputs", category, name] => Ok(Self {
                source: RefSource::StepOutput(step.to_string()),
                kind: VarKind::from_list_name(category).ok_or_else(|| {
                    anyhow::anyhow!("unknown category '{}' in reference '{}'", category, text)
                })?,
                name: name.to_string(),
            }),
            _ => bail!("malformed reference '{}'", text),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            RefSource::PipelineInput => {
                write!(f, "{{{{inputs.{}.{}}}}}", self.kind.list_name(), self.name)
            }
            RefSource::StepOutput(step) => write!(
                f,
                "{{{{pipelines.{}.outputs.{}.{}}}}}",
                step,
                self.kind.list_name(),
                self.name
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_input_roundtrip() {
        let r = Reference::pipeline_input(VarKind::Parameter, "alpha");
        let text = r.to_string();
        assert_eq!(text, "{{inputs.parameters.alpha}}");
        assert_eq!(Reference::parse(&text).unwrap(), r);
    }

    #[test]
    fn test_step_output_roundtrip() {
        let r = Reference::step_output("split", VarKind::Artifact, "train_set");
        let text = r.to_string();
        assert_eq!(text, "{{pipelines.split.outputs.artifacts.train_set}}");
        assert_eq!(Reference::parse(&text).unwrap(), r);
    }

    #[test]
    fn test_parse_with_whitespace() {
        let r = Reference::parse("{{ inputs.parameters.alpha }}").unwrap();
        assert_eq!(r.name, "alpha");
        assert_eq!(r.source, RefSource::PipelineInput);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Reference::parse("inputs.parameters.alpha").is_err());
        assert!(Reference::parse("{{inputs.alpha}}").is_err());
        assert!(Reference::parse("{{pipelines.a.b.c}}").is_err());
        assert!(Reference::parse("{{inputs.widgets.alpha}}").is_err());
    }

    #[test]
    fn test_parse_error_names_offending_text() {
        let err = Reference::parse("{{inputs.widgets.alpha}}").unwrap_err();
        assert!(err.to_string().contains("widgets"));
    }
}
