//! flowline - build, validate and submit workflow pipeline manifests
//!
//! The crate models pipelines as DAGs of operator steps with typed
//! parameter and artifact ports. Inputs bind to literals or to references
//! on other variables, the graph is validated (unique names, acyclic,
//! type-compatible bindings) and serialized to a YAML manifest, which a
//! thin async client submits to the remote orchestration service for
//! execution.

pub mod client;
pub mod core;
pub mod template;

// Re-export commonly used types
pub use crate::client::{
    ClientConfig, CreateRunRequest, Credentials, FlowClient, FlowService, PipelineFilter,
    PipelineInfo, Run, RunDetail, RunLogger, RunSource, RunStatus, ServiceError,
};
pub use crate::core::manifest::{ContainerSpec, Manifest};
pub use crate::core::pipeline::Pipeline;
pub use crate::core::reference::Reference;
pub use crate::core::step::{OperatorRef, PipelineStep};
pub use crate::core::variable::{ArtifactMeta, Binding, ParamType, VarKind, Variable};
pub use crate::template::SavedTemplate;
