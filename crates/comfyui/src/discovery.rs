//! Schema discovery.
//!
//! One `GET /object_info` per call, no retries. Any failure (transport,
//! non-2xx, timeout, cancellation) yields an empty [`SchemaInfo`] so the
//! compile degrades to "no adapters" instead of failing.

use std::time::Duration;

use atelier_core::schema::SchemaInfo;
use tokio_util::sync::CancellationToken;

use crate::api::ComfyUIApi;

/// Ask the executor which node types it has right now.
pub async fn discover_schema(
    api: &ComfyUIApi,
    timeout: Duration,
    cancel: &CancellationToken,
) -> SchemaInfo {
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::warn!(api_url = %api.api_url(), "Schema discovery cancelled");
            return SchemaInfo::default();
        }
        result = tokio::time::timeout(timeout, api.get_object_info()) => result,
    };

    match result {
        Ok(Ok(object_info)) => {
            let schema = SchemaInfo::from_object_info(&object_info);
            tracing::info!(
                api_url = %api.api_url(),
                node_types = schema.len(),
                stack_capacity = ?schema.stack_capacity(),
                chaining = schema.supports_chaining(),
                "Executor schema discovered",
            );
            schema
        }
        Ok(Err(e)) => {
            tracing::warn!(api_url = %api.api_url(), error = %e, "Schema discovery failed");
            SchemaInfo::default()
        }
        Err(_) => {
            tracing::warn!(
                api_url = %api.api_url(),
                timeout_ms = timeout.as_millis() as u64,
                "Schema discovery timed out",
            );
            SchemaInfo::default()
        }
    }
}
