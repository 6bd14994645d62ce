//! Remotely persisted pipeline and operator specs

use crate::client::{FlowService, ServiceError};
use crate::core::manifest::Manifest;
use crate::core::pipeline::Pipeline;
use crate::core::step::PipelineStep;
use crate::core::variable::{VarSchema, Variable};
use anyhow::Result;

/// A manifest persisted by the service, addressed either by its remote id
/// or by the (identifier, provider, version) triple.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedTemplate {
    manifest: Manifest,
    pipeline_id: Option<String>,
}

impl SavedTemplate {
    /// Wrap a validated manifest that has not been registered yet.
    pub fn new(manifest: Manifest) -> Result<Self> {
        manifest.validate()?;
        Ok(Self {
            manifest,
            pipeline_id: None,
        })
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        Self::new(Manifest::from_yaml(text)?)
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn pipeline_id(&self) -> Option<&str> {
        self.pipeline_id.as_deref()
    }

    pub fn identifier(&self) -> &str {
        &self.manifest.metadata.identifier
    }

    pub fn provider(&self) -> &str {
        &self.manifest.metadata.provider
    }

    pub fn version(&self) -> &str {
        &self.manifest.metadata.version
    }

    /// Instantiate a step carrying this template's input/output signature.
    /// Bindings on the template (output selections, input defaults) are
    /// stripped; the step starts unbound.
    pub fn as_step(&self) -> Result<PipelineStep> {
        let inputs = self
            .manifest
            .input_vars()?
            .iter()
            .map(signature_var)
            .collect();
        let outputs = self
            .manifest
            .output_vars()?
            .iter()
            .map(signature_var)
            .collect();
        PipelineStep::new(self.manifest.operator_ref()?, inputs, outputs)
    }

    /// Reload a composite template into a full pipeline graph.
    pub fn to_pipeline(&self) -> Result<Pipeline> {
        let mut pipeline = Pipeline::from_manifest(&self.manifest)?;
        if let Some(id) = &self.pipeline_id {
            pipeline.mark_saved(id.clone())?;
        }
        Ok(pipeline)
    }

    /// Fetch a template by its remote id.
    pub async fn get(service: &dyn FlowService, pipeline_id: &str) -> Result<Self, ServiceError> {
        let info = service.get_pipeline(pipeline_id).await?;
        let mut template =
            Self::new(info.manifest).map_err(|e| ServiceError::Decode(e.to_string()))?;
        template.pipeline_id = Some(info.pipeline_id);
        Ok(template)
    }

    /// Fetch a template by (identifier, provider, version).
    pub async fn find(
        service: &dyn FlowService,
        identifier: &str,
        provider: &str,
        version: &str,
    ) -> Result<Self, ServiceError> {
        let info = service.find_pipeline(identifier, provider, version).await?;
        let mut template =
            Self::new(info.manifest).map_err(|e| ServiceError::Decode(e.to_string()))?;
        template.pipeline_id = Some(info.pipeline_id);
        Ok(template)
    }

    /// Upload the manifest, recording and returning the assigned id.
    pub async fn register(&mut self, service: &dyn FlowService) -> Result<String, ServiceError> {
        if let Some(id) = &self.pipeline_id {
            return Err(ServiceError::InvalidArgument(format!(
                "template '{}' is already registered as '{}'",
                self.identifier(),
                id
            )));
        }
        let id = service.create_pipeline(&self.manifest).await?;
        self.pipeline_id = Some(id.clone());
        Ok(id)
    }
}

fn signature_var(var: &Variable) -> Variable {
    let mut fresh = match &var.schema {
        VarSchema::Parameter { typ } => {
            let mut v = Variable::parameter(var.name.clone());
            if let Some(typ) = typ {
                v = v.with_type(*typ);
            }
            v
        }
        VarSchema::Artifact { meta } => Variable::artifact(var.name.clone(), *meta),
    };
    if var.required {
        fresh = fresh.required();
    }
    if let Some(desc) = &var.desc {
        fresh = fresh.with_desc(desc.clone());
    }
    fresh
}
