//! End-to-end generation: session → discover → compile → submit → poll →
//! upload → record.

use std::sync::Arc;
use std::time::Duration;

use atelier_comfyui::api::{ComfyUIApi, ComfyUIApiError};
use atelier_comfyui::discovery::discover_schema;
use atelier_comfyui::output::{
    default_locators, poll_output, OutputQuery, PollOutcome, DEFAULT_MAX_COUNTER,
};
use atelier_comfyui::retry::RetryPolicy;
use atelier_core::binder::ParameterSet;
use atelier_core::compiler::{CompileRequest, CompiledWorkflow};
use atelier_core::diagnostics::Diagnostic;
use atelier_core::error::CoreError;
use atelier_core::naming::{content_type_for, filename_prefix, session_prefix};
use atelier_core::persistence::{
    Artifact, ArtifactStore, NewArtifact, NewSession, SessionStatus, StoreError,
};
use atelier_core::registry::PARAM_FILENAME_PREFIX;
use atelier_core::splice::AdapterSpec;
use atelier_core::templates::WorkflowRegistry;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// One generation job as the caller describes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub template: String,
    #[serde(default)]
    pub parameters: ParameterSet,
    #[serde(default)]
    pub adapters: Vec<AdapterSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Completed {
        session_id: Uuid,
        prompt_id: String,
        artifact: Artifact,
        diagnostics: Vec<Diagnostic>,
    },
    /// Submitted, but no output within the polling budget. Check back later.
    TimedOut { session_id: Uuid, prompt_id: String },
    Cancelled { session_id: Uuid, prompt_id: String },
}

impl GenerationOutcome {
    pub fn session_id(&self) -> Uuid {
        match self {
            Self::Completed { session_id, .. }
            | Self::TimedOut { session_id, .. }
            | Self::Cancelled { session_id, .. } => *session_id,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Compile failed: {0}")]
    Compile(#[from] CoreError),

    #[error("Executor request failed: {0}")]
    Executor(#[from] ComfyUIApiError),

    #[error("Storage failed: {0}")]
    Store(#[from] StoreError),
}

/// Knobs for [`GenerationService`].
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub bucket: String,
    pub poll: RetryPolicy,
    pub discovery_timeout: Duration,
    /// Highest save-node counter tried when looking for output by name.
    pub max_counter: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            bucket: "outputs".to_string(),
            poll: RetryPolicy::default(),
            discovery_timeout: Duration::from_secs(10),
            max_counter: DEFAULT_MAX_COUNTER,
        }
    }
}

pub struct GenerationService {
    api: ComfyUIApi,
    store: Arc<dyn ArtifactStore>,
    templates: Arc<WorkflowRegistry>,
    settings: GenerationSettings,
}

impl GenerationService {
    pub fn new(
        api: ComfyUIApi,
        store: Arc<dyn ArtifactStore>,
        templates: Arc<WorkflowRegistry>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            api,
            store,
            templates,
            settings,
        }
    }

    /// Run one job to completion, timeout or cancellation.
    ///
    /// The session is marked `Failed` before any error is returned.
    pub async fn run(
        &self,
        request: GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome, PipelineError> {
        let session = self
            .store
            .create_session(NewSession {
                template: request.template.clone(),
                parameters: request.parameters.clone(),
                adapters: request.adapters.clone(),
            })
            .await?;

        tracing::info!(
            session_id = %session.id,
            template = %request.template,
            "Generation started",
        );

        match self.execute(session.id, &request, cancel).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::error!(session_id = %session.id, error = %e, "Generation failed");
                if let Err(status_err) = self
                    .store
                    .update_session_status(session.id, SessionStatus::Failed)
                    .await
                {
                    tracing::error!(
                        session_id = %session.id,
                        error = %status_err,
                        "Failed to mark session as failed",
                    );
                }
                Err(e)
            }
        }
    }

    /// Compile a request against the live executor schema without
    /// submitting it.
    pub async fn compile(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<CompiledWorkflow, PipelineError> {
        let template = self.templates.get(&request.template)?;
        let schema = discover_schema(&self.api, self.settings.discovery_timeout, cancel).await;
        let compiled = template.compile(
            &CompileRequest {
                parameters: request.parameters.clone(),
                adapters: request.adapters.clone(),
            },
            &schema,
        )?;
        Ok(compiled)
    }

    async fn execute(
        &self,
        session_id: Uuid,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome, PipelineError> {
        let mut request = request.clone();
        let base = match request.parameters.get(PARAM_FILENAME_PREFIX).and_then(Value::as_str) {
            Some(prefix) => prefix.to_string(),
            None => filename_prefix(&request.template, Utc::now()),
        };
        let prefix = session_prefix(&base, session_id);
        request
            .parameters
            .insert(PARAM_FILENAME_PREFIX.to_string(), Value::from(prefix.clone()));

        let compiled = self.compile(&request, cancel).await?;
        if !compiled.diagnostics.is_empty() {
            tracing::info!(
                %session_id,
                diagnostics = compiled.diagnostics.len(),
                "Compiled with diagnostics",
            );
        }

        let client_id = Uuid::new_v4().to_string();
        let submitted = self.api.submit_workflow(&compiled.payload(), &client_id).await?;
        self.store
            .update_session_status(session_id, SessionStatus::Submitted)
            .await?;
        tracing::info!(
            %session_id,
            prompt_id = %submitted.prompt_id,
            queue_position = submitted.number,
            "Workflow submitted to ComfyUI",
        );

        let query = OutputQuery {
            prompt_id: submitted.prompt_id.clone(),
            filename_prefix: prefix,
        };
        let locators = default_locators(self.settings.max_counter);
        let outcome = poll_output(&self.api, &locators, &query, &self.settings.poll, cancel).await;

        match outcome {
            PollOutcome::Ready(found) => {
                let path = format!("{session_id}/{}", found.file.filename);
                self.store
                    .upload_artifact(&self.settings.bucket, &path, &found.bytes)
                    .await?;

                let artifact = self
                    .store
                    .create_artifact_record(NewArtifact {
                        bucket: self.settings.bucket.clone(),
                        path,
                        content_type: content_type_for(&found.file.filename).to_string(),
                        size: found.bytes.len() as u64,
                        workflow_hash: compiled.workflow_hash.clone(),
                        metadata: provenance(
                            &request,
                            &compiled,
                            &submitted.prompt_id,
                            found.located_by,
                        ),
                    })
                    .await?;
                self.store.link_artifact_to_session(session_id, artifact.id).await?;
                self.store
                    .update_session_status(session_id, SessionStatus::Completed)
                    .await?;

                tracing::info!(
                    %session_id,
                    artifact_id = %artifact.id,
                    bytes = artifact.size,
                    "Generation completed",
                );
                Ok(GenerationOutcome::Completed {
                    session_id,
                    prompt_id: submitted.prompt_id,
                    artifact,
                    diagnostics: compiled.diagnostics,
                })
            }
            PollOutcome::TimedOut { attempts } => {
                self.store
                    .update_session_status(session_id, SessionStatus::TimedOut)
                    .await?;
                tracing::warn!(%session_id, attempts, "Generation timed out, check back later");
                Ok(GenerationOutcome::TimedOut {
                    session_id,
                    prompt_id: submitted.prompt_id,
                })
            }
            PollOutcome::Cancelled => {
                if let Err(e) = self.api.cancel_execution(&submitted.prompt_id).await {
                    tracing::warn!(%session_id, error = %e, "Failed to remove prompt from queue");
                }
                self.store
                    .update_session_status(session_id, SessionStatus::Failed)
                    .await?;
                tracing::info!(%session_id, "Generation cancelled");
                Ok(GenerationOutcome::Cancelled {
                    session_id,
                    prompt_id: submitted.prompt_id,
                })
            }
        }
    }
}

/// Everything needed to reproduce an artifact.
fn provenance(
    request: &GenerationRequest,
    compiled: &CompiledWorkflow,
    prompt_id: &str,
    located_by: &str,
) -> Value {
    json!({
        "template": request.template,
        "prompt_id": prompt_id,
        "parameters": compiled.resolved_parameters,
        "adapters": compiled.applied_adapters,
        "strategy": compiled.strategy,
        "diagnostics": compiled.diagnostics,
        "located_by": located_by,
    })
}
