//! Persistence collaborator interface.
//!
//! The compiler never stores anything itself. Generation sessions and
//! their output artifacts are recorded through [`ArtifactStore`], which a
//! deployment backs with whatever relational and object storage it has.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::binder::ParameterSet;
use crate::splice::AdapterSpec;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Submitted,
    Completed,
    /// Output never showed up within the polling budget.
    TimedOut,
    Failed,
}

impl SessionStatus {
    /// Whether no further transition is expected.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::TimedOut | Self::Failed)
    }
}

/// One generation request and its progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub template: String,
    pub parameters: ParameterSet,
    pub adapters: Vec<AdapterSpec>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for [`ArtifactStore::create_session`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewSession {
    pub template: String,
    pub parameters: ParameterSet,
    pub adapters: Vec<AdapterSpec>,
}

/// A stored output file plus its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    /// Set once the artifact is linked to a session.
    pub session_id: Option<Uuid>,
    pub bucket: String,
    pub path: String,
    pub content_type: String,
    pub size: u64,
    pub workflow_hash: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// Input for [`ArtifactStore::create_artifact_record`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewArtifact {
    pub bucket: String,
    pub path: String,
    pub content_type: String,
    pub size: u64,
    pub workflow_hash: String,
    #[serde(default)]
    pub metadata: Value,
}

/// Every set field must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactFilter {
    pub session_id: Option<Uuid>,
    pub workflow_hash: Option<String>,
}

impl ArtifactFilter {
    pub fn for_session(session_id: Uuid) -> Self {
        Self {
            session_id: Some(session_id),
            ..Default::default()
        }
    }

    pub fn matches(&self, artifact: &Artifact) -> bool {
        self.session_id
            .map_or(true, |wanted| artifact.session_id == Some(wanted))
            && self
                .workflow_hash
                .as_ref()
                .map_or(true, |h| h == &artifact.workflow_hash)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Not found: {entity} {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Invalid object path: {0}")]
    InvalidPath(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn create_session(&self, params: NewSession) -> Result<Session, StoreError>;

    /// Write `bytes` to `path` inside `bucket`, replacing any previous object.
    async fn upload_artifact(
        &self,
        bucket: &str,
        path: &str,
        bytes: &[u8],
    ) -> Result<(), StoreError>;

    async fn create_artifact_record(&self, metadata: NewArtifact) -> Result<Artifact, StoreError>;

    async fn link_artifact_to_session(
        &self,
        session_id: Uuid,
        artifact_id: Uuid,
    ) -> Result<(), StoreError>;

    async fn update_session_status(
        &self,
        session_id: Uuid,
        status: SessionStatus,
    ) -> Result<(), StoreError>;

    async fn list_artifacts(&self, filter: &ArtifactFilter) -> Result<Vec<Artifact>, StoreError>;
}
