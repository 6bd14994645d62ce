//! Run handles: submission, status polling and log tailing

use crate::client::{CreateRunRequest, FlowService, RunSource, ServiceError};
use crate::core::pipeline::Pipeline;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lifecycle status reported by the service for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Initialized,
    Running,
    Suspended,
    Succeeded,
    Failed,
    Terminated,
    Unknown,
}

impl RunStatus {
    /// Whether the run has finished, one way or another
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::Terminated
        )
    }
}

/// Status snapshot of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunDetail {
    pub run_id: String,
    pub name: String,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Handle to a run living on the service
pub struct Run {
    service: Arc<dyn FlowService>,
    run_id: String,
}

impl Run {
    /// Attach to an existing run by id.
    pub fn attach(service: Arc<dyn FlowService>, run_id: impl Into<String>) -> Self {
        Self {
            service,
            run_id: run_id.into(),
        }
    }

    /// Validate arguments against the pipeline's input signature and start
    /// a run. A saved pipeline is submitted by id, an unsaved one inline.
    pub async fn submit(
        service: Arc<dyn FlowService>,
        pipeline: &Pipeline,
        run_name: &str,
        arguments: BTreeMap<String, serde_yaml::Value>,
    ) -> Result<Run, ServiceError> {
        let inputs = pipeline
            .inputs()
            .map_err(|e| ServiceError::InvalidArgument(e.to_string()))?;

        for (name, value) in &arguments {
            let Some(input) = inputs.get(name) else {
                return Err(ServiceError::InvalidArgument(format!(
                    "pipeline '{}' has no input '{}'",
                    pipeline.name(),
                    name
                )));
            };
            input
                .check_literal(value)
                .map_err(|e| ServiceError::InvalidArgument(e.to_string()))?;
        }
        for input in inputs.iter() {
            if input.required && !input.is_bound() && !arguments.contains_key(&input.name) {
                return Err(ServiceError::InvalidArgument(format!(
                    "required pipeline input '{}' has no argument",
                    input.name
                )));
            }
        }

        let source = match pipeline.pipeline_id() {
            Some(id) => RunSource::SavedPipeline(id.to_string()),
            None => RunSource::Inline(
                pipeline
                    .to_manifest()
                    .map_err(|e| ServiceError::InvalidArgument(e.to_string()))?,
            ),
        };
        let request = CreateRunRequest {
            name: run_name.to_string(),
            source,
            arguments,
        };
        let run_id = service.create_run(&request).await?;
        info!("submitted run '{}' as {}", run_name, run_id);
        Ok(Run { service, run_id })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Fetch the current status snapshot.
    pub async fn detail(&self) -> Result<RunDetail, ServiceError> {
        self.service.get_run(&self.run_id).await
    }

    /// Poll at a fixed interval until the run reaches a terminal status.
    pub async fn wait_for_completion(
        &self,
        poll_interval: Duration,
    ) -> Result<RunDetail, ServiceError> {
        loop {
            let detail = self.service.get_run(&self.run_id).await?;
            if detail.status.is_terminal() {
                if detail.status == RunStatus::Succeeded {
                    info!("run {} finished: {:?}", self.run_id, detail.status);
                } else {
                    warn!(
                        "run {} finished: {:?} ({})",
                        self.run_id,
                        detail.status,
                        detail.message.as_deref().unwrap_or("no message")
                    );
                }
                return Ok(detail);
            }
            debug!("run {} still {:?}", self.run_id, detail.status);
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Ask the service to stop the run.
    pub async fn terminate(&self) -> Result<(), ServiceError> {
        self.service.terminate_run(&self.run_id).await
    }
}

/// Callback receiving tailed log lines
pub type LogHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Tails a run's logs from a background task, forwarding each line to a
/// handler until the run is terminal and the log window drains.
pub struct RunLogger {
    handle: JoinHandle<Result<(), ServiceError>>,
}

impl RunLogger {
    const WINDOW: usize = 200;

    pub fn start(
        service: Arc<dyn FlowService>,
        run_id: String,
        poll_interval: Duration,
        handler: LogHandler,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut offset = 0;
            loop {
                let lines = service.run_logs(&run_id, offset, Self::WINDOW).await?;
                if lines.is_empty() {
                    let detail = service.get_run(&run_id).await?;
                    if detail.status.is_terminal() {
                        debug!("log tail for run {} drained", run_id);
                        break;
                    }
                    tokio::time::sleep(poll_interval).await;
                } else {
                    offset += lines.len();
                    for line in &lines {
                        handler(line);
                    }
                }
            }
            Ok(())
        });
        Self { handle }
    }

    /// Wait for the tail to drain.
    pub async fn join(self) -> Result<(), ServiceError> {
        self.handle
            .await
            .map_err(|e| ServiceError::Internal(format!("log tail task failed: {}", e)))?
    }

    /// Stop tailing without waiting for the run to finish.
    pub fn abort(&self) {
        self.handle.abort();
    }
}
