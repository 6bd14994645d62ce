//! HTTP implementation of the service client

use crate::client::{
    ClientConfig, CreateRunRequest, FlowService, PipelineFilter, PipelineInfo, RunDetail,
    RunSource, ServiceError,
};
use crate::core::manifest::Manifest;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// REST client for the orchestration service.
///
/// Manifests travel as YAML text inside JSON envelopes; everything else is
/// plain JSON.
#[derive(Debug, Clone)]
pub struct FlowClient {
    config: ClientConfig,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct ManifestBody<'a> {
    manifest: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PipelineIdBody {
    pipeline_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PipelineBody {
    pipeline_id: String,
    manifest: String,
}

#[derive(Deserialize)]
struct PipelineListBody {
    pipelines: Vec<PipelineBody>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateRunBody<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pipeline_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    manifest: Option<String>,
    arguments: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunIdBody {
    run_id: String,
}

#[derive(Deserialize)]
struct LogsBody {
    logs: Vec<String>,
}

impl FlowClient {
    pub fn new(config: ClientConfig) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.endpoint.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn with_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.credentials {
            Some(credentials) => request
                .header("x-flow-access-key-id", &credentials.access_key_id)
                .header("x-flow-access-key-secret", &credentials.access_key_secret),
            None => request,
        }
    }

    /// Map non-2xx responses into the error taxonomy; `subject` names the
    /// entity for 404s.
    async fn check(
        response: reqwest::Response,
        subject: &str,
    ) -> Result<reqwest::Response, ServiceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound(subject.to_string()));
        }
        Err(ServiceError::Status {
            status: status.as_u16(),
            message,
        })
    }

    fn parse_manifest(body: PipelineBody) -> Result<PipelineInfo, ServiceError> {
        let manifest =
            Manifest::from_yaml(&body.manifest).map_err(|e| ServiceError::Decode(e.to_string()))?;
        Ok(PipelineInfo {
            pipeline_id: body.pipeline_id,
            manifest,
        })
    }
}

#[async_trait]
impl FlowService for FlowClient {
    async fn create_pipeline(&self, manifest: &Manifest) -> Result<String, ServiceError> {
        let yaml = manifest
            .to_yaml()
            .map_err(|e| ServiceError::InvalidArgument(e.to_string()))?;
        debug!(
            "registering pipeline '{}' ({} bytes)",
            manifest.metadata.name,
            yaml.len()
        );
        let response = self
            .with_auth(self.http.post(self.url("api/v1/pipelines")))
            .json(&ManifestBody { manifest: &yaml })
            .send()
            .await?;
        let body: PipelineIdBody = Self::check(response, "pipeline")
            .await?
            .json()
            .await
            .map_err(|e| ServiceError::Decode(e.to_string()))?;
        Ok(body.pipeline_id)
    }

    async fn get_pipeline(&self, pipeline_id: &str) -> Result<PipelineInfo, ServiceError> {
        let response = self
            .with_auth(
                self.http
                    .get(self.url(&format!("api/v1/pipelines/{}", pipeline_id))),
            )
            .send()
            .await?;
        let body: PipelineBody = Self::check(response, &format!("pipeline '{}'", pipeline_id))
            .await?
            .json()
            .await
            .map_err(|e| ServiceError::Decode(e.to_string()))?;
        Self::parse_manifest(body)
    }

    async fn find_pipeline(
        &self,
        identifier: &str,
        provider: &str,
        version: &str,
    ) -> Result<PipelineInfo, ServiceError> {
        let filter = PipelineFilter {
            identifier: Some(identifier.to_string()),
            provider: Some(provider.to_string()),
            version: Some(version.to_string()),
        };
        let mut matches = self.list_pipelines(&filter).await?;
        match matches.len() {
            0 => Err(ServiceError::NotFound(format!(
                "pipeline '{}/{}@{}'",
                provider, identifier, version
            ))),
            1 => Ok(matches.remove(0)),
            n => Err(ServiceError::Decode(format!(
                "expected one pipeline for '{}/{}@{}', service returned {}",
                provider, identifier, version, n
            ))),
        }
    }

    async fn list_pipelines(
        &self,
        filter: &PipelineFilter,
    ) -> Result<Vec<PipelineInfo>, ServiceError> {
        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(identifier) = &filter.identifier {
            query.push(("identifier", identifier));
        }
        if let Some(provider) = &filter.provider {
            query.push(("provider", provider));
        }
        if let Some(version) = &filter.version {
            query.push(("version", version));
        }
        let response = self
            .with_auth(self.http.get(self.url("api/v1/pipelines")).query(&query))
            .send()
            .await?;
        let body: PipelineListBody = Self::check(response, "pipelines")
            .await?
            .json()
            .await
            .map_err(|e| ServiceError::Decode(e.to_string()))?;
        body.pipelines.into_iter().map(Self::parse_manifest).collect()
    }

    async fn delete_pipeline(&self, pipeline_id: &str) -> Result<(), ServiceError> {
        let response = self
            .with_auth(
                self.http
                    .delete(self.url(&format!("api/v1/pipelines/{}", pipeline_id))),
            )
            .send()
            .await?;
        Self::check(response, &format!("pipeline '{}'", pipeline_id)).await?;
        Ok(())
    }

    async fn create_run(&self, request: &CreateRunRequest) -> Result<String, ServiceError> {
        let mut arguments = serde_json::Map::new();
        for (name, value) in &request.arguments {
            let json = serde_json::to_value(value).map_err(|e| {
                ServiceError::InvalidArgument(format!("argument '{}': {}", name, e))
            })?;
            arguments.insert(name.clone(), json);
        }
        let (pipeline_id, manifest) = match &request.source {
            RunSource::SavedPipeline(id) => (Some(id.as_str()), None),
            RunSource::Inline(manifest) => (
                None,
                Some(
                    manifest
                        .to_yaml()
                        .map_err(|e| ServiceError::InvalidArgument(e.to_string()))?,
                ),
            ),
        };
        debug!("creating run '{}'", request.name);
        let response = self
            .with_auth(self.http.post(self.url("api/v1/runs")))
            .json(&CreateRunBody {
                name: &request.name,
                pipeline_id,
                manifest,
                arguments,
            })
            .send()
            .await?;
        let body: RunIdBody = Self::check(response, "run")
            .await?
            .json()
            .await
            .map_err(|e| ServiceError::Decode(e.to_string()))?;
        Ok(body.run_id)
    }

    async fn get_run(&self, run_id: &str) -> Result<RunDetail, ServiceError> {
        let response = self
            .with_auth(self.http.get(self.url(&format!("api/v1/runs/{}", run_id))))
            .send()
            .await?;
        Self::check(response, &format!("run '{}'", run_id))
            .await?
            .json()
            .await
            .map_err(|e| ServiceError::Decode(e.to_string()))
    }

    async fn run_logs(
        &self,
        run_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<String>, ServiceError> {
        let response = self
            .with_auth(
                self.http
                    .get(self.url(&format!("api/v1/runs/{}/logs", run_id)))
                    .query(&[("offset", offset), ("limit", limit)]),
            )
            .send()
            .await?;
        let body: LogsBody = Self::check(response, &format!("run '{}'", run_id))
            .await?
            .json()
            .await
            .map_err(|e| ServiceError::Decode(e.to_string()))?;
        Ok(body.logs)
    }

    async fn terminate_run(&self, run_id: &str) -> Result<(), ServiceError> {
        let response = self
            .with_auth(
                self.http
                    .put(self.url(&format!("api/v1/runs/{}/termination", run_id))),
            )
            .send()
            .await?;
        Self::check(response, &format!("run '{}'", run_id)).await?;
        Ok(())
    }
}
