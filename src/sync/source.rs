//! Where authoritative snapshots come from

use super::error::SyncError;
use crate::workflow::{Snapshot, WorkflowService};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Read-only access to the authoritative snapshot of a workflow
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Must be safe to call repeatedly with no side effects
    async fn fetch(&self, id: &str) -> Result<Snapshot, SyncError>;

    /// Short label for logs
    fn describe(&self) -> String;
}

#[async_trait]
impl<T: SnapshotSource + ?Sized> SnapshotSource for Arc<T> {
    async fn fetch(&self, id: &str) -> Result<Snapshot, SyncError> {
        (**self).fetch(id).await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

#[async_trait]
impl SnapshotSource for WorkflowService {
    async fn fetch(&self, id: &str) -> Result<Snapshot, SyncError> {
        Ok(self.get(id)?)
    }

    fn describe(&self) -> String {
        "local store".to_string()
    }
}

/// Snapshot reads over HTTP: `GET {base}/workflows/{id}/snapshot`
#[derive(Debug, Clone)]
pub struct HttpSnapshotSource {
    base_url: String,
    client: reqwest::Client,
}

impl HttpSnapshotSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    fn snapshot_url(&self, id: &str) -> String {
        format!(
            "{}/workflows/{}/snapshot",
            self.base_url.trim_end_matches('/'),
            id
        )
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch(&self, id: &str) -> Result<Snapshot, SyncError> {
        let url = self.snapshot_url(id);
        tracing::debug!(url = %url, "Fetching snapshot");

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                SyncError::network(format!("timed out reading {}", url))
            } else if e.is_connect() {
                SyncError::network(format!("connection failed: {}", e))
            } else {
                SyncError::network(format!("request failed: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Snapshot>()
            .await
            .map_err(|e| SyncError::decode(e.to_string()))
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}
