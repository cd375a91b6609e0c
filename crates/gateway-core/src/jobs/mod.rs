//! Async job runtime (C10): uploads to object storage, starts a provider
//! async invocation, polls to completion, fetches and parses the sharded
//! output, and schedules deferred cleanup, per spec.md §4.6.

pub mod error;
pub mod http_backend;

#[cfg(test)]
mod tests;

pub use error::JobError;
pub use http_backend::{HttpAsyncInvokeBackend, HttpObjectStore};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

/// Minimal S3-shaped object store; the real SDK is an external
/// collaborator (spec.md §1).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), JobError>;
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, JobError>;
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), JobError>;
    async fn list_prefix(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, JobError>;

    /// A time-limited download URL for `key`, per spec.md §5's "presigned
    /// URLs expire at 3600s".
    async fn presigned_url(&self, bucket: &str, key: &str, ttl_secs: u64) -> Result<String, JobError>;

    /// Object size in bytes, without fetching the body. Backed by a HEAD
    /// request in [`HttpObjectStore`]; the default falls back to a full
    /// `get` for stores that don't expose metadata directly.
    async fn size(&self, bucket: &str, key: &str) -> Result<u64, JobError> {
        Ok(self.get(bucket, key).await?.len() as u64)
    }
}

#[async_trait]
impl ObjectStore for Arc<dyn ObjectStore> {
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), JobError> {
        (**self).put(bucket, key, bytes).await
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, JobError> {
        (**self).get(bucket, key).await
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), JobError> {
        (**self).delete(bucket, key).await
    }

    async fn list_prefix(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, JobError> {
        (**self).list_prefix(bucket, prefix).await
    }

    async fn presigned_url(&self, bucket: &str, key: &str, ttl_secs: u64) -> Result<String, JobError> {
        (**self).presigned_url(bucket, key, ttl_secs).await
    }

    async fn size(&self, bucket: &str, key: &str) -> Result<u64, JobError> {
        (**self).size(bucket, key).await
    }
}

#[derive(Debug, Clone)]
pub enum AsyncInvokeStatus {
    InProgress,
    Completed { output_s3_uri: String },
    Failed { message: String },
}

/// The provider's async-invocation control plane (`start_async_invoke` /
/// `get_async_invoke`); an external collaborator per spec.md §1.
#[async_trait]
pub trait AsyncInvokeBackend: Send + Sync {
    async fn start_async_invoke(&self, model_id: &str, payload: Value, output_s3_uri: &str) -> Result<String, JobError>;
    async fn get_async_invoke(&self, invocation_arn: &str) -> Result<AsyncInvokeStatus, JobError>;
    async fn stop_async_invoke(&self, invocation_arn: &str) -> Result<(), JobError>;
}

#[async_trait]
impl AsyncInvokeBackend for Arc<dyn AsyncInvokeBackend> {
    async fn start_async_invoke(&self, model_id: &str, payload: Value, output_s3_uri: &str) -> Result<String, JobError> {
        (**self).start_async_invoke(model_id, payload, output_s3_uri).await
    }

    async fn get_async_invoke(&self, invocation_arn: &str) -> Result<AsyncInvokeStatus, JobError> {
        (**self).get_async_invoke(invocation_arn).await
    }

    async fn stop_async_invoke(&self, invocation_arn: &str) -> Result<(), JobError> {
        (**self).stop_async_invoke(invocation_arn).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Started,
    Waiting,
    Completed,
    Failed,
}

/// spec.md §3's `AsyncJob` data model.
#[derive(Debug, Clone)]
pub struct AsyncJob {
    pub id: String,
    pub input_object_key: String,
    pub output_manifest_key: Option<String>,
    pub status: JobStatus,
    pub tracked_objects: HashSet<(String, String)>,
    pub tracked_provider_jobs: HashSet<String>,
}

impl AsyncJob {
    pub fn new(id: impl Into<String>, input_object_key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            input_object_key: input_object_key.into(),
            output_manifest_key: None,
            status: JobStatus::Started,
            tracked_objects: HashSet::new(),
            tracked_provider_jobs: HashSet::new(),
        }
    }
}

/// One independent deferred action; failure of one does not block others
/// (spec.md §4.6).
#[derive(Debug, Clone)]
pub enum CleanupTask {
    DeleteObject { bucket: String, key: String },
    StopProviderJob { invocation_arn: String },
}

const POLL_INTERVAL: Duration = Duration::from_millis(500);

fn strip_s3_prefix(uri: &str) -> Option<(&str, &str)> {
    let rest = uri.strip_prefix("s3://")?;
    rest.split_once('/')
}

/// spec.md §4.6's six-step algorithm. Bucket resolution (region map vs.
/// primary-region default) is the caller's responsibility; `bucket` here
/// is already resolved.
pub async fn run_async_json(
    model_id: &str,
    payload: Value,
    request_id: &str,
    bucket: &str,
    object_store: &dyn ObjectStore,
    invoke_backend: &dyn AsyncInvokeBackend,
) -> (Result<Value, JobError>, Vec<CleanupTask>) {
    let mut job = AsyncJob::new(request_id, format!("{request_id}/input.json"));
    let output_s3_uri = format!("s3://{bucket}/{request_id}");

    let invocation_arn = match invoke_backend.start_async_invoke(model_id, payload, &output_s3_uri).await {
        Ok(arn) => arn,
        Err(e) => return (Err(e), Vec::new()),
    };
    job.tracked_provider_jobs.insert(invocation_arn.clone());
    job.status = JobStatus::Waiting;

    loop {
        match invoke_backend.get_async_invoke(&invocation_arn).await {
            Ok(AsyncInvokeStatus::InProgress) => {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
            Ok(AsyncInvokeStatus::Completed { output_s3_uri }) => {
                job.status = JobStatus::Completed;
                let result = fetch_and_parse_output(bucket, &output_s3_uri, object_store).await;
                let cleanup = build_cleanup_tasks(bucket, &output_s3_uri, &job, object_store).await;
                return (result, cleanup);
            }
            Ok(AsyncInvokeStatus::Failed { message }) => {
                job.status = JobStatus::Failed;
                let cleanup = vec![CleanupTask::StopProviderJob { invocation_arn: invocation_arn.clone() }];
                return (Err(JobError::InvocationFailed(message)), cleanup);
            }
            Err(e) => {
                let cleanup = vec![CleanupTask::StopProviderJob { invocation_arn: invocation_arn.clone() }];
                return (Err(e), cleanup);
            }
        }
    }
}

async fn fetch_and_parse_output(bucket: &str, output_s3_uri: &str, object_store: &dyn ObjectStore) -> Result<Value, JobError> {
    let (_, prefix) = strip_s3_prefix(output_s3_uri).ok_or_else(|| JobError::MalformedOutput("invalid output S3 URI".to_string()))?;
    let key = format!("{prefix}/output.json");
    let bytes = object_store.get(bucket, &key).await?;
    serde_json::from_slice(&bytes).map_err(|e| JobError::MalformedOutput(e.to_string()))
}

async fn build_cleanup_tasks(bucket: &str, output_s3_uri: &str, job: &AsyncJob, object_store: &dyn ObjectStore) -> Vec<CleanupTask> {
    let mut tasks: Vec<CleanupTask> = job
        .tracked_provider_jobs
        .iter()
        .map(|arn| CleanupTask::StopProviderJob { invocation_arn: arn.clone() })
        .collect();

    if let Some((_, prefix)) = strip_s3_prefix(output_s3_uri) {
        if let Ok(keys) = object_store.list_prefix(bucket, prefix).await {
            tasks.extend(keys.into_iter().map(|key| CleanupTask::DeleteObject { bucket: bucket.to_string(), key }));
        }
    }

    tasks
}

/// Runs each cleanup task independently, logging a `background` event per
/// task (spec.md §4.6); the framework invokes this after the response body
/// is fully flushed.
pub async fn run_cleanup(tasks: Vec<CleanupTask>, object_store: &dyn ObjectStore, invoke_backend: &dyn AsyncInvokeBackend) {
    for task in tasks {
        let start = std::time::Instant::now();
        let result: Result<(), JobError> = match &task {
            CleanupTask::DeleteObject { bucket, key } => object_store.delete(bucket, key).await,
            CleanupTask::StopProviderJob { invocation_arn } => invoke_backend.stop_async_invoke(invocation_arn).await,
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        match result {
            Ok(()) => tracing::info!(event = "background", task = ?task, duration_ms, "cleanup task completed"),
            Err(e) => tracing::warn!(event = "background", task = ?task, duration_ms, error = %e, "cleanup task failed"),
        }
    }
}
