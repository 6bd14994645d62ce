//! Schema-typed manifest (de)serialization
//!
//! The canonical YAML document understood by the remote service:
//! `apiVersion` / `metadata` / `spec`, where `spec` carries the pipeline's
//! inputs and outputs, and either a `container` payload (leaf operator) or
//! a `pipelines` list of step documents (composite pipeline). Conversion
//! to and from [`Pipeline`] lives here so the graph code stays free of
//! wire concerns.

use crate::core::pipeline::Pipeline;
use crate::core::ports::IoSpec;
use crate::core::reference::{RefSource, Reference};
use crate::core::step::{validate_name, OperatorRef, PipelineStep};
use crate::core::variable::{
    ArtifactMeta, Binding, Direction, ParamType, VarKind, Variable,
};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// The only schema revision this crate reads or writes
pub const API_VERSION: &str = "core/v1";

/// A full pipeline or operator document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub api_version: String,
    pub metadata: Metadata,
    pub spec: Spec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub name: String,
    pub identifier: String,
    pub provider: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<VarDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<VarDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pipelines: Vec<StepDoc>,
}

/// Execution payload of a leaf operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSpec {
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub envs: BTreeMap<String, String>,
}

/// A serialized variable. Artifacts carry a `metadata` block, parameters
/// do not; that key is what discriminates the two on load, so the artifact
/// variant must be tried first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarDef {
    Artifact(ArtifactDef),
    Parameter(ParameterDef),
}

impl VarDef {
    pub fn name(&self) -> &str {
        match self {
            VarDef::Artifact(a) => &a.name,
            VarDef::Parameter(p) => &p.name,
        }
    }

    pub fn kind(&self) -> VarKind {
        match self {
            VarDef::Artifact(_) => VarKind::Artifact,
            VarDef::Parameter(_) => VarKind::Parameter,
        }
    }

    fn value(&self) -> Option<&serde_yaml::Value> {
        match self {
            VarDef::Artifact(a) => a.value.as_ref(),
            VarDef::Parameter(p) => p.value.as_ref(),
        }
    }

    fn from(&self) -> Option<&str> {
        match self {
            VarDef::Artifact(a) => a.from.as_deref(),
            VarDef::Parameter(p) => p.from.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<ParamType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_yaml::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactDef {
    pub name: String,
    pub metadata: ArtifactMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_yaml::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// One step of a composite pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDoc {
    pub api_version: String,
    pub metadata: Metadata,
    pub spec: StepSpec,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSpec {
    #[serde(default, skip_serializing_if = "Arguments::is_empty")]
    pub arguments: Arguments,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Arguments {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ArgDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<ArgDef>,
}

impl Arguments {
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty() && self.artifacts.is_empty()
    }
}

/// A bound argument of a step: a literal or a reference, never both
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_yaml::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

impl Manifest {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let manifest: Manifest =
            serde_yaml::from_str(text).context("failed to parse manifest YAML")?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("failed to serialize manifest")
    }

    pub fn operator_ref(&self) -> Result<OperatorRef> {
        OperatorRef::new(
            &self.metadata.identifier,
            &self.metadata.provider,
            &self.metadata.version,
        )
    }

    /// Whether the spec describes a composite pipeline rather than a leaf
    pub fn is_composite(&self) -> bool {
        !self.spec.pipelines.is_empty()
    }

    /// The declared input signature as variables
    pub fn input_vars(&self) -> Result<Vec<Variable>> {
        self.spec
            .inputs
            .iter()
            .map(|def| def_to_var(def, Direction::Input))
            .collect()
    }

    /// The declared output signature as variables
    pub fn output_vars(&self) -> Result<Vec<Variable>> {
        self.spec
            .outputs
            .iter()
            .map(|def| def_to_var(def, Direction::Output))
            .collect()
    }

    /// Structural validation: schema revision, name patterns, the
    /// container/pipelines exclusivity rule, value-XOR-from bindings and
    /// the parameters-before-artifacts placement invariant.
    pub fn validate(&self) -> Result<()> {
        if self.api_version != API_VERSION {
            bail!(
                "unsupported apiVersion '{}' (expected '{}')",
                self.api_version,
                API_VERSION
            );
        }
        validate_name("pipeline", &self.metadata.name)?;
        self.operator_ref()?;

        if self.spec.container.is_some() && !self.spec.pipelines.is_empty() {
            bail!(
                "manifest '{}' declares both a container and nested pipelines",
                self.metadata.name
            );
        }

        check_var_list(&self.spec.inputs, "inputs")?;
        check_var_list(&self.spec.outputs, "outputs")?;

        let mut step_names = std::collections::BTreeSet::new();
        for doc in &self.spec.pipelines {
            if doc.api_version != API_VERSION {
                bail!(
                    "step '{}' has unsupported apiVersion '{}'",
                    doc.metadata.name,
                    doc.api_version
                );
            }
            validate_name("step", &doc.metadata.name)?;
            if !step_names.insert(doc.metadata.name.as_str()) {
                bail!("duplicate step name '{}' in manifest", doc.metadata.name);
            }
            check_args(&doc.spec.arguments.parameters, VarKind::Parameter, &doc.metadata.name)?;
            check_args(&doc.spec.arguments.artifacts, VarKind::Artifact, &doc.metadata.name)?;
        }
        Ok(())
    }
}

fn check_var_list(defs: &[VarDef], list: &str) -> Result<()> {
    let mut seen_artifact = false;
    let mut names = std::collections::BTreeSet::new();
    for def in defs {
        if !names.insert(def.name()) {
            bail!("duplicate variable '{}' in {}", def.name(), list);
        }
        match def.kind() {
            VarKind::Artifact => seen_artifact = true,
            VarKind::Parameter if seen_artifact => {
                bail!(
                    "parameter '{}' appears after an artifact in {}: parameters must come first",
                    def.name(),
                    list
                );
            }
            VarKind::Parameter => {}
        }
        if def.value().is_some() && def.from().is_some() {
            bail!("variable '{}' in {} sets both 'value' and 'from'", def.name(), list);
        }
        if let Some(from) = def.from() {
            let reference = Reference::parse(from)
                .with_context(|| format!("variable '{}' in {}", def.name(), list))?;
            if reference.kind != def.kind() {
                bail!(
                    "variable '{}' in {} is {} but references {}",
                    def.name(),
                    list,
                    def.kind().list_name(),
                    reference.kind.list_name()
                );
            }
        }
    }
    Ok(())
}

fn check_args(args: &[ArgDef], kind: VarKind, step: &str) -> Result<()> {
    for arg in args {
        match (&arg.value, &arg.from) {
            (Some(_), Some(_)) => bail!(
                "argument '{}' of step '{}' sets both 'value' and 'from'",
                arg.name,
                step
            ),
            (None, None) => bail!(
                "argument '{}' of step '{}' sets neither 'value' nor 'from'",
                arg.name,
                step
            ),
            (None, Some(from)) => {
                let reference = Reference::parse(from)
                    .with_context(|| format!("argument '{}' of step '{}'", arg.name, step))?;
                if reference.kind != kind {
                    bail!(
                        "argument '{}' of step '{}' sits in the {} list but references {}",
                        arg.name,
                        step,
                        kind.list_name(),
                        reference.kind.list_name()
                    );
                }
            }
            (Some(_), None) => {}
        }
    }
    Ok(())
}

pub(crate) fn def_to_var(def: &VarDef, direction: Direction) -> Result<Variable> {
    let mut var = match def {
        VarDef::Parameter(p) => {
            let mut var = Variable::parameter(p.name.clone());
            if let Some(typ) = p.typ {
                var = var.with_type(typ);
            }
            if p.required {
                var = var.required();
            }
            if let Some(desc) = &p.desc {
                var = var.with_desc(desc.clone());
            }
            var
        }
        VarDef::Artifact(a) => {
            let mut var = Variable::artifact(a.name.clone(), a.metadata);
            if a.required {
                var = var.required();
            }
            if let Some(desc) = &a.desc {
                var = var.with_desc(desc.clone());
            }
            var
        }
    }
    .with_direction(direction);

    if let Some(value) = def.value() {
        var.bind(Binding::Literal(value.clone()))?;
    } else if let Some(from) = def.from() {
        var.bind(Binding::From(Reference::parse(from)?))?;
    }
    Ok(var)
}

pub(crate) fn var_to_def(var: &Variable) -> VarDef {
    let (value, from) = match var.binding() {
        Some(Binding::Literal(v)) => (Some(v.clone()), None),
        Some(Binding::From(r)) => (None, Some(r.to_string())),
        None => (None, None),
    };
    match &var.schema {
        crate::core::variable::VarSchema::Parameter { typ } => VarDef::Parameter(ParameterDef {
            name: var.name.clone(),
            typ: *typ,
            value,
            from,
            required: var.required,
            desc: var.desc.clone(),
        }),
        crate::core::variable::VarSchema::Artifact { meta } => VarDef::Artifact(ArtifactDef {
            name: var.name.clone(),
            metadata: *meta,
            value,
            from,
            required: var.required,
            desc: var.desc.clone(),
        }),
    }
}

fn step_to_doc(step: &PipelineStep) -> Result<StepDoc> {
    let bound_arg = |var: &Variable| -> Option<ArgDef> {
        var.binding().map(|binding| {
            let (value, from) = match binding {
                Binding::Literal(v) => (Some(v.clone()), None),
                Binding::From(r) => (None, Some(r.to_string())),
            };
            ArgDef {
                name: var.name.clone(),
                value,
                from,
            }
        })
    };

    let Some(name) = step.name() else {
        bail!("step for operator '{}' was never named", step.op().identifier);
    };
    Ok(StepDoc {
        api_version: API_VERSION.to_string(),
        metadata: Metadata {
            name: name.to_string(),
            identifier: step.op().identifier.clone(),
            provider: step.op().provider.clone(),
            version: step.op().version.clone(),
            uuid: None,
            annotations: BTreeMap::new(),
        },
        spec: StepSpec {
            arguments: Arguments {
                parameters: step.inputs().parameters().filter_map(bound_arg).collect(),
                artifacts: step.inputs().artifacts().filter_map(bound_arg).collect(),
            },
            dependencies: step.dependencies().into_iter().collect(),
        },
    })
}

impl Pipeline {
    /// Serialize to a manifest, validating first. Steps are emitted in
    /// topological order.
    pub fn to_manifest(&self) -> Result<Manifest> {
        self.validate()?;
        let inputs = self.inputs()?.iter().map(var_to_def).collect();
        let outputs = self.outputs().iter().map(var_to_def).collect();
        let pipelines = self
            .topo_order()?
            .into_iter()
            .map(step_to_doc)
            .collect::<Result<Vec<_>>>()?;
        Ok(Manifest {
            api_version: API_VERSION.to_string(),
            metadata: Metadata {
                name: self.name().to_string(),
                identifier: self.op().identifier.clone(),
                provider: self.op().provider.clone(),
                version: self.op().version.clone(),
                uuid: self.uuid(),
                annotations: self.annotations().clone(),
            },
            spec: Spec {
                inputs,
                outputs,
                container: None,
                pipelines,
            },
        })
    }

    /// Rebuild the step/pipeline object graph from a composite manifest.
    ///
    /// Step documents carry only bound arguments and dependencies, so the
    /// output ports of each step are synthesized from the references that
    /// point at it, with wildcard typing.
    pub fn from_manifest(manifest: &Manifest) -> Result<Pipeline> {
        manifest.validate()?;
        if manifest.spec.container.is_some() {
            bail!(
                "manifest '{}' is a leaf operator, not a composite pipeline",
                manifest.metadata.name
            );
        }

        let mut pipeline =
            Pipeline::new(manifest.metadata.name.as_str(), manifest.operator_ref()?)?;
        pipeline.set_uuid(manifest.metadata.uuid);
        for (key, value) in &manifest.metadata.annotations {
            pipeline.annotate(key.clone(), value.clone())?;
        }

        // Pass 1: which outputs of which steps are referenced anywhere.
        let step_names: std::collections::BTreeSet<&str> = manifest
            .spec
            .pipelines
            .iter()
            .map(|d| d.metadata.name.as_str())
            .collect();
        let mut referenced: BTreeMap<String, BTreeMap<String, VarKind>> = BTreeMap::new();
        let mut note = |from: Option<&str>| -> Result<()> {
            if let Some(text) = from {
                let reference = Reference::parse(text)?;
                if let RefSource::StepOutput(step) = &reference.source {
                    // Unknown producers are left for graph validation to report.
                    if step_names.contains(step.as_str()) {
                        referenced
                            .entry(step.clone())
                            .or_default()
                            .insert(reference.name.clone(), reference.kind);
                    }
                }
            }
            Ok(())
        };
        for doc in &manifest.spec.pipelines {
            for arg in doc
                .spec
                .arguments
                .parameters
                .iter()
                .chain(doc.spec.arguments.artifacts.iter())
            {
                note(arg.from.as_deref())?;
            }
        }
        for def in &manifest.spec.outputs {
            note(def.from())?;
        }

        // Pass 2: rebuild each step with its arguments and dependencies.
        for doc in &manifest.spec.pipelines {
            let op = OperatorRef::new(
                &doc.metadata.identifier,
                &doc.metadata.provider,
                &doc.metadata.version,
            )?;
            let mut inputs = Vec::new();
            for arg in &doc.spec.arguments.parameters {
                inputs.push(Variable::parameter(arg.name.clone()));
            }
            for arg in &doc.spec.arguments.artifacts {
                inputs.push(Variable::artifact(arg.name.clone(), ArtifactMeta::any()));
            }
            let outputs = referenced
                .get(doc.metadata.name.as_str())
                .map(|ports| {
                    ports
                        .iter()
                        .map(|(port, kind)| match kind {
                            VarKind::Parameter => Variable::parameter(port.clone()),
                            VarKind::Artifact => {
                                Variable::artifact(port.clone(), ArtifactMeta::any())
                            }
                        })
                        .collect()
                })
                .unwrap_or_default();

            let mut step =
                PipelineStep::new(op, inputs, outputs)?.named(doc.metadata.name.as_str())?;
            for arg in doc
                .spec
                .arguments
                .parameters
                .iter()
                .chain(doc.spec.arguments.artifacts.iter())
            {
                let binding = match (&arg.value, &arg.from) {
                    (Some(value), None) => Binding::Literal(value.clone()),
                    (None, Some(from)) => Binding::From(Reference::parse(from)?),
                    _ => unreachable!("validated by Manifest::validate"),
                };
                step.bind(&arg.name, binding)
                    .with_context(|| format!("step '{}'", doc.metadata.name))?;
            }
            for dep in &doc.spec.dependencies {
                step.after(dep)?;
            }
            pipeline.add_step(step)?;
        }

        let declared = IoSpec::from_vars(
            Direction::Input,
            manifest.input_vars().context("loading pipeline inputs")?,
        )?;
        pipeline.set_declared_inputs(declared);

        for def in &manifest.spec.outputs {
            let var = def_to_var(def, Direction::Output)?;
            if !var.is_bound() {
                bail!("pipeline output '{}' lacks a 'from' reference", var.name);
            }
            pipeline.push_output_raw(var)?;
        }

        pipeline.validate()?;
        Ok(pipeline)
    }
}
