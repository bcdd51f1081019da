//! Filesystem-backed [`ArtifactStore`].
//!
//! Objects are written under `{root}/{bucket}/{path}`. Session and
//! artifact records live in memory behind [`RwLock`]s, which is enough for
//! a single worker process and for tests.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use atelier_core::persistence::{
    Artifact, ArtifactFilter, ArtifactStore, NewArtifact, NewSession, Session, SessionStatus,
    StoreError,
};
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

pub struct LocalStore {
    root: PathBuf,
    sessions: RwLock<HashMap<Uuid, Session>>,
    artifacts: RwLock<HashMap<Uuid, Artifact>>,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            sessions: RwLock::new(HashMap::new()),
            artifacts: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of an object. Rejects paths that would escape
    /// the bucket.
    pub fn object_path(&self, bucket: &str, path: &str) -> Result<PathBuf, StoreError> {
        for part in [bucket, path] {
            let relative = Path::new(part);
            let clean = !part.is_empty()
                && relative
                    .components()
                    .all(|c| matches!(c, Component::Normal(_)));
            if !clean {
                return Err(StoreError::InvalidPath(format!("{bucket}/{path}")));
            }
        }
        Ok(self.root.join(bucket).join(path))
    }

    pub async fn session(&self, id: Uuid) -> Option<Session> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// All sessions, oldest first.
    pub async fn sessions(&self) -> Vec<Session> {
        let mut all: Vec<Session> = self.sessions.read().await.values().cloned().collect();
        all.sort_by_key(|s| (s.created_at, s.id));
        all
    }
}

#[async_trait]
impl ArtifactStore for LocalStore {
    async fn create_session(&self, params: NewSession) -> Result<Session, StoreError> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            template: params.template,
            parameters: params.parameters,
            adapters: params.adapters,
            status: SessionStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.sessions.write().await.insert(session.id, session.clone());
        tracing::debug!(session_id = %session.id, template = %session.template, "Session created");
        Ok(session)
    }

    async fn upload_artifact(
        &self,
        bucket: &str,
        path: &str,
        bytes: &[u8],
    ) -> Result<(), StoreError> {
        let target = self.object_path(bucket, path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;
        tracing::debug!(path = %target.display(), bytes = bytes.len(), "Artifact uploaded");
        Ok(())
    }

    async fn create_artifact_record(&self, metadata: NewArtifact) -> Result<Artifact, StoreError> {
        let artifact = Artifact {
            id: Uuid::new_v4(),
            session_id: None,
            bucket: metadata.bucket,
            path: metadata.path,
            content_type: metadata.content_type,
            size: metadata.size,
            workflow_hash: metadata.workflow_hash,
            metadata: metadata.metadata,
            created_at: Utc::now(),
        };
        self.artifacts.write().await.insert(artifact.id, artifact.clone());
        Ok(artifact)
    }

    async fn link_artifact_to_session(
        &self,
        session_id: Uuid,
        artifact_id: Uuid,
    ) -> Result<(), StoreError> {
        if !self.sessions.read().await.contains_key(&session_id) {
            return Err(StoreError::NotFound {
                entity: "session",
                id: session_id,
            });
        }
        let mut artifacts = self.artifacts.write().await;
        let artifact = artifacts.get_mut(&artifact_id).ok_or(StoreError::NotFound {
            entity: "artifact",
            id: artifact_id,
        })?;
        artifact.session_id = Some(session_id);
        Ok(())
    }

    async fn update_session_status(
        &self,
        session_id: Uuid,
        status: SessionStatus,
    ) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&session_id).ok_or(StoreError::NotFound {
            entity: "session",
            id: session_id,
        })?;
        tracing::debug!(
            %session_id,
            from = ?session.status,
            to = ?status,
            "Session status updated",
        );
        session.status = status;
        session.updated_at = Utc::now();
        Ok(())
    }

    async fn list_artifacts(&self, filter: &ArtifactFilter) -> Result<Vec<Artifact>, StoreError> {
        let mut found: Vec<Artifact> = self
            .artifacts
            .read()
            .await
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        found.sort_by_key(|a| (a.created_at, a.id));
        Ok(found)
    }
}
