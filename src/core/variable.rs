//! Typed pipeline variables and their bindings

use crate::core::reference::Reference;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

/// Manifest category of a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarKind {
    Parameter,
    Artifact,
}

impl VarKind {
    /// The list name used inside manifests and references
    pub fn list_name(&self) -> &'static str {
        match self {
            VarKind::Parameter => "parameters",
            VarKind::Artifact => "artifacts",
        }
    }

    pub fn from_list_name(name: &str) -> Option<Self> {
        match name {
            "parameters" => Some(VarKind::Parameter),
            "artifacts" => Some(VarKind::Artifact),
            _ => None,
        }
    }
}

/// Whether a variable is consumed or produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// Declared type of a parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamType {
    String,
    Int,
    Double,
    Bool,
    Map,
}

impl ParamType {
    /// Check a literal YAML value against this declared type
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Int => value.is_i64() || value.is_u64(),
            ParamType::Double => value.is_f64() || value.is_i64() || value.is_u64(),
            ParamType::Bool => value.is_bool(),
            ParamType::Map => value.is_mapping(),
        }
    }
}

/// What an artifact holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactKind {
    DataSet,
    Model,
    Any,
}

/// Where an artifact lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactLocation {
    OssObject,
    TableStore,
    Any,
}

/// Typing metadata carried by every artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub kind: ArtifactKind,
    pub location: ArtifactLocation,
}

impl ArtifactMeta {
    pub fn dataset() -> Self {
        Self {
            kind: ArtifactKind::DataSet,
            location: ArtifactLocation::OssObject,
        }
    }

    pub fn model() -> Self {
        Self {
            kind: ArtifactKind::Model,
            location: ArtifactLocation::OssObject,
        }
    }

    pub fn table() -> Self {
        Self {
            kind: ArtifactKind::DataSet,
            location: ArtifactLocation::TableStore,
        }
    }

    /// Fully wildcard metadata, compatible with anything
    pub fn any() -> Self {
        Self {
            kind: ArtifactKind::Any,
            location: ArtifactLocation::Any,
        }
    }

    /// Compatibility: equal on each axis, or `Any` on either side
    pub fn accepts(&self, other: &ArtifactMeta) -> bool {
        let kind_ok = self.kind == other.kind
            || self.kind == ArtifactKind::Any
            || other.kind == ArtifactKind::Any;
        let location_ok = self.location == other.location
            || self.location == ArtifactLocation::Any
            || other.location == ArtifactLocation::Any;
        kind_ok && location_ok
    }
}

/// The parameter/artifact split, with the typing facet each side carries
#[derive(Debug, Clone, PartialEq)]
pub enum VarSchema {
    Parameter { typ: Option<ParamType> },
    Artifact { meta: ArtifactMeta },
}

/// A variable's assigned value: a literal or a reference, never both
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Literal(Value),
    From(Reference),
}

impl Binding {
    pub fn value(v: impl Into<Value>) -> Self {
        Binding::Literal(v.into())
    }

    pub fn reference(r: Reference) -> Self {
        Binding::From(r)
    }
}

/// A named, typed port on a step or pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub direction: Direction,
    pub schema: VarSchema,
    pub required: bool,
    pub desc: Option<String>,
    binding: Option<Binding>,
}

impl Variable {
    /// An untyped input parameter
    pub fn parameter(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: Direction::Input,
            schema: VarSchema::Parameter { typ: None },
            required: false,
            desc: None,
            binding: None,
        }
    }

    /// An input artifact with the given metadata
    pub fn artifact(name: impl Into<String>, meta: ArtifactMeta) -> Self {
        Self {
            name: name.into(),
            direction: Direction::Input,
            schema: VarSchema::Artifact { meta },
            required: false,
            desc: None,
            binding: None,
        }
    }

    /// Declare the parameter type. No effect on artifacts.
    pub fn with_type(mut self, typ: ParamType) -> Self {
        if let VarSchema::Parameter { typ: slot } = &mut self.schema {
            *slot = Some(typ);
        }
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = Some(desc.into());
        self
    }

    pub(crate) fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn kind(&self) -> VarKind {
        match self.schema {
            VarSchema::Parameter { .. } => VarKind::Parameter,
            VarSchema::Artifact { .. } => VarKind::Artifact,
        }
    }

    pub fn binding(&self) -> Option<&Binding> {
        self.binding.as_ref()
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Assign a value or reference to this variable.
    ///
    /// A variable can be assigned exactly once; literals are checked against
    /// the declared type, references against the category.
    pub fn bind(&mut self, binding: Binding) -> Result<()> {
        if self.binding.is_some() {
            bail!("variable '{}' is already bound", self.name);
        }
        match &binding {
            Binding::Literal(value) => self.check_literal(value)?,
            Binding::From(reference) => {
                if reference.kind != self.kind() {
                    bail!(
                        "variable '{}' is {} but reference '{}' points at {}",
                        self.name,
                        self.kind().list_name(),
                        reference,
                        reference.kind.list_name()
                    );
                }
            }
        }
        self.binding = Some(binding);
        Ok(())
    }

    pub(crate) fn set_binding_unchecked(&mut self, binding: Binding) {
        self.binding = Some(binding);
    }

    /// Check a literal value against the declared schema
    pub fn check_literal(&self, value: &Value) -> Result<()> {
        match &self.schema {
            VarSchema::Parameter { typ: Some(typ) } => {
                if !typ.accepts(value) {
                    bail!(
                        "value for parameter '{}' does not match declared type {:?}",
                        self.name,
                        typ
                    );
                }
            }
            VarSchema::Parameter { typ: None } => {}
            VarSchema::Artifact { .. } => {
                // Artifact literals are location strings, e.g. "oss://bucket/key"
                if !value.is_string() {
                    bail!("value for artifact '{}' must be a location string", self.name);
                }
            }
        }
        Ok(())
    }

    /// Build a pipeline-input variable named `name` from a consuming port.
    pub(crate) fn from_consumer(name: &str, consumer: &Variable) -> Variable {
        Variable {
            name: name.to_string(),
            direction: Direction::Input,
            schema: consumer.schema.clone(),
            required: consumer.required,
            desc: None,
            binding: None,
        }
    }

    /// Merge another consumer's view of the same inferred input. Schemas
    /// narrow to the most specific; genuine conflicts are errors.
    pub(crate) fn merge_consumer(&mut self, other: &Variable) -> Result<()> {
        match (&mut self.schema, &other.schema) {
            (VarSchema::Parameter { typ }, VarSchema::Parameter { typ: other_typ }) => {
                match (*typ, *other_typ) {
                    (None, Some(t)) => *typ = Some(t),
                    (Some(a), Some(b)) if a != b => {
                        bail!("conflicting parameter types {:?} and {:?}", a, b)
                    }
                    _ => {}
                }
            }
            (VarSchema::Artifact { meta }, VarSchema::Artifact { meta: other_meta }) => {
                if !meta.accepts(other_meta) {
                    bail!(
                        "conflicting artifact metadata {:?}/{:?} and {:?}/{:?}",
                        meta.kind,
                        meta.location,
                        other_meta.kind,
                        other_meta.location
                    );
                }
                if meta.kind == ArtifactKind::Any {
                    meta.kind = other_meta.kind;
                }
                if meta.location == ArtifactLocation::Any {
                    meta.location = other_meta.location;
                }
            }
            _ => bail!("conflicting categories: used as both parameter and artifact"),
        }
        self.required |= other.required;
        Ok(())
    }

    /// Check that `producer` can feed this variable: same category, and
    /// compatible types (an unspecified type acts as a wildcard).
    pub fn accepts_source(&self, producer: &Variable) -> Result<()> {
        if self.kind() != producer.kind() {
            bail!(
                "cannot bind {} '{}' to {} '{}'",
                self.kind().list_name(),
                self.name,
                producer.kind().list_name(),
                producer.name
            );
        }
        match (&self.schema, &producer.schema) {
            (VarSchema::Parameter { typ: Some(a) }, VarSchema::Parameter { typ: Some(b) }) => {
                if a != b {
                    bail!(
                        "parameter '{}' has type {:?} but source '{}' produces {:?}",
                        self.name,
                        a,
                        producer.name,
                        b
                    );
                }
            }
            (VarSchema::Artifact { meta: a }, VarSchema::Artifact { meta: b }) => {
                if !a.accepts(b) {
                    bail!(
                        "artifact '{}' ({:?}/{:?}) is incompatible with source '{}' ({:?}/{:?})",
                        self.name,
                        a.kind,
                        a.location,
                        producer.name,
                        b.kind,
                        b.location
                    );
                }
            }
            _ => {}
        }
        Ok(())
    }
}
