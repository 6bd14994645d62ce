//! Client for the remote orchestration service

pub mod config;
pub mod error;
pub mod http;
pub mod run;

use crate::core::manifest::Manifest;
use async_trait::async_trait;
use std::collections::BTreeMap;

pub use config::{ClientConfig, Credentials};
pub use error::ServiceError;
pub use http::FlowClient;
pub use run::{LogHandler, Run, RunDetail, RunLogger, RunStatus};

/// A pipeline as stored by the service
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineInfo {
    pub pipeline_id: String,
    pub manifest: Manifest,
}

/// Server-side filter for pipeline listings
#[derive(Debug, Clone, Default)]
pub struct PipelineFilter {
    pub identifier: Option<String>,
    pub provider: Option<String>,
    pub version: Option<String>,
}

/// Where the pipeline definition of a run comes from
#[derive(Debug, Clone)]
pub enum RunSource {
    /// A pipeline previously saved to the service
    SavedPipeline(String),
    /// A manifest shipped inline with the run
    Inline(Manifest),
}

/// Request payload for starting a run
#[derive(Debug, Clone)]
pub struct CreateRunRequest {
    pub name: String,
    pub source: RunSource,
    /// Values for the pipeline-level inputs
    pub arguments: BTreeMap<String, serde_yaml::Value>,
}

/// Operations offered by the orchestration service.
///
/// The trait exists so tests can substitute an in-memory implementation
/// for the HTTP-backed [`FlowClient`].
#[async_trait]
pub trait FlowService: Send + Sync {
    /// Register a pipeline manifest; returns the assigned id.
    async fn create_pipeline(&self, manifest: &Manifest) -> Result<String, ServiceError>;

    async fn get_pipeline(&self, pipeline_id: &str) -> Result<PipelineInfo, ServiceError>;

    /// Look a pipeline up by its (identifier, provider, version) triple.
    async fn find_pipeline(
        &self,
        identifier: &str,
        provider: &str,
        version: &str,
    ) -> Result<PipelineInfo, ServiceError>;

    async fn list_pipelines(
        &self,
        filter: &PipelineFilter,
    ) -> Result<Vec<PipelineInfo>, ServiceError>;

    async fn delete_pipeline(&self, pipeline_id: &str) -> Result<(), ServiceError>;

    /// Start a run; returns the assigned run id.
    async fn create_run(&self, request: &CreateRunRequest) -> Result<String, ServiceError>;

    async fn get_run(&self, run_id: &str) -> Result<RunDetail, ServiceError>;

    /// A window of log lines starting at `offset`.
    async fn run_logs(
        &self,
        run_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<String>, ServiceError>;

    async fn terminate_run(&self, run_id: &str) -> Result<(), ServiceError>;
}
