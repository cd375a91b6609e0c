use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::*;

struct InMemoryStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl InMemoryStore {
    fn new() -> Self {
        Self { objects: Mutex::new(HashMap::new()) }
    }

    fn seed(&self, bucket: &str, key: &str, bytes: Vec<u8>) {
        self.objects.lock().unwrap().insert((bucket.to_string(), key.to_string()), bytes);
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), JobError> {
        self.objects.lock().unwrap().insert((bucket.to_string(), key.to_string()), bytes);
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, JobError> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| JobError::ObjectStore(format!("no such object {bucket}/{key}")))
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), JobError> {
        self.objects.lock().unwrap().remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn list_prefix(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, JobError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .map(|(_, k)| k.clone())
            .collect())
    }

    async fn presigned_url(&self, bucket: &str, key: &str, ttl_secs: u64) -> Result<String, JobError> {
        Ok(format!("https://{bucket}.example.invalid/{key}?ttl={ttl_secs}"))
    }
}

struct StubInvokeBackend {
    outcome: AsyncInvokeStatus,
}

#[async_trait]
impl AsyncInvokeBackend for StubInvokeBackend {
    async fn start_async_invoke(&self, _model_id: &str, _payload: Value, _output_s3_uri: &str) -> Result<String, JobError> {
        Ok("arn:aws:bedrock:invocation/abc123".to_string())
    }

    async fn get_async_invoke(&self, _invocation_arn: &str) -> Result<AsyncInvokeStatus, JobError> {
        Ok(self.outcome.clone())
    }

    async fn stop_async_invoke(&self, _invocation_arn: &str) -> Result<(), JobError> {
        Ok(())
    }
}

#[tokio::test]
async fn successful_job_fetches_output_and_schedules_cleanup() {
    let store = InMemoryStore::new();
    store.seed("my-bucket", "req-1/output.json", br#"{"ok":true}"#.to_vec());
    store.seed("my-bucket", "req-1/shard-0.jsonl", b"{}".to_vec());

    let backend = StubInvokeBackend { outcome: AsyncInvokeStatus::Completed { output_s3_uri: "s3://my-bucket/req-1".to_string() } };

    let (result, cleanup) = run_async_json("model-x", serde_json::json!({}), "req-1", "my-bucket", &store, &backend).await;

    let value = result.unwrap();
    assert_eq!(value, serde_json::json!({"ok": true}));
    assert!(cleanup.iter().any(|t| matches!(t, CleanupTask::StopProviderJob { .. })));
    assert!(cleanup.iter().any(|t| matches!(t, CleanupTask::DeleteObject { key, .. } if key.contains("output.json"))));
}

#[tokio::test]
async fn failed_invocation_surfaces_error_and_stops_provider_job() {
    let store = InMemoryStore::new();
    let backend = StubInvokeBackend { outcome: AsyncInvokeStatus::Failed { message: "quota exceeded".to_string() } };

    let (result, cleanup) = run_async_json("model-x", serde_json::json!({}), "req-2", "my-bucket", &store, &backend).await;

    assert!(result.is_err());
    assert_eq!(cleanup.len(), 1);
    assert!(matches!(cleanup[0], CleanupTask::StopProviderJob { .. }));
}

#[tokio::test]
async fn cleanup_runs_each_task_independently() {
    let store = InMemoryStore::new();
    store.seed("b", "k1", b"x".to_vec());
    let backend = StubInvokeBackend { outcome: AsyncInvokeStatus::InProgress };

    let tasks = vec![
        CleanupTask::DeleteObject { bucket: "b".to_string(), key: "k1".to_string() },
        CleanupTask::StopProviderJob { invocation_arn: "arn".to_string() },
    ];
    run_cleanup(tasks, &store, &backend).await;

    assert!(store.get("b", "k1").await.is_err());
}
