//! `reqwest`-backed [`ObjectStore`]/[`AsyncInvokeBackend`], the job-runtime
//! counterpart to [`crate::providers::HttpInferenceClient`]: a thin default
//! against a configurable base URL, with the concrete S3/async-invoke SDK
//! left an external collaborator (spec.md §1).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{AsyncInvokeBackend, AsyncInvokeStatus, JobError, ObjectStore};

#[derive(Clone)]
pub struct HttpObjectStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into() }
    }
}

fn transport_error(err: reqwest::Error) -> JobError {
    JobError::ObjectStore(err.to_string())
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), JobError> {
        let url = format!("{}/objects/{bucket}/{key}", self.base_url);
        let response = self.client.put(&url).body(bytes).send().await.map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(JobError::ObjectStore(format!("PUT {url} returned {}", response.status())));
        }
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, JobError> {
        let url = format!("{}/objects/{bucket}/{key}", self.base_url);
        let response = self.client.get(&url).send().await.map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(JobError::ObjectStore(format!("GET {url} returned {}", response.status())));
        }
        Ok(response.bytes().await.map_err(transport_error)?.to_vec())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), JobError> {
        let url = format!("{}/objects/{bucket}/{key}", self.base_url);
        let response = self.client.delete(&url).send().await.map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(JobError::ObjectStore(format!("DELETE {url} returned {}", response.status())));
        }
        Ok(())
    }

    async fn list_prefix(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, JobError> {
        let url = format!("{}/objects/{bucket}?prefix={prefix}", self.base_url);
        let response = self.client.get(&url).send().await.map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(JobError::ObjectStore(format!("LIST {url} returned {}", response.status())));
        }
        response.json::<Vec<String>>().await.map_err(transport_error)
    }

    async fn presigned_url(&self, bucket: &str, key: &str, ttl_secs: u64) -> Result<String, JobError> {
        let url = format!("{}/objects/{bucket}/{key}/presign?ttl={ttl_secs}", self.base_url);
        let response = self.client.get(&url).send().await.map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(JobError::ObjectStore(format!("PRESIGN {url} returned {}", response.status())));
        }
        #[derive(Deserialize)]
        struct PresignResponse {
            url: String,
        }
        Ok(response.json::<PresignResponse>().await.map_err(transport_error)?.url)
    }

    async fn size(&self, bucket: &str, key: &str) -> Result<u64, JobError> {
        let url = format!("{}/objects/{bucket}/{key}", self.base_url);
        let response = self.client.head(&url).send().await.map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(JobError::ObjectStore(format!("HEAD {url} returned {}", response.status())));
        }
        response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| JobError::ObjectStore(format!("HEAD {url} response missing Content-Length")))
    }
}

#[derive(Clone)]
pub struct HttpAsyncInvokeBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAsyncInvokeBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into() }
    }
}

fn invoke_error(err: reqwest::Error) -> JobError {
    JobError::StartFailed(err.to_string())
}

#[derive(Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum WireInvokeStatus {
    #[serde(rename = "in_progress")]
    InProgress,
    Completed { output_s3_uri: String },
    Failed { message: String },
}

#[async_trait]
impl AsyncInvokeBackend for HttpAsyncInvokeBackend {
    async fn start_async_invoke(&self, model_id: &str, payload: Value, output_s3_uri: &str) -> Result<String, JobError> {
        let url = format!("{}/model/{model_id}/async-invoke", self.base_url);
        let body = serde_json::json!({ "payload": payload, "outputS3Uri": output_s3_uri });
        let response = self.client.post(&url).json(&body).send().await.map_err(invoke_error)?;
        if !response.status().is_success() {
            return Err(JobError::StartFailed(format!("POST {url} returned {}", response.status())));
        }
        #[derive(Deserialize)]
        struct StartResponse {
            invocation_arn: String,
        }
        Ok(response.json::<StartResponse>().await.map_err(invoke_error)?.invocation_arn)
    }

    async fn get_async_invoke(&self, invocation_arn: &str) -> Result<AsyncInvokeStatus, JobError> {
        let url = format!("{}/async-invoke/{invocation_arn}", self.base_url);
        let response = self.client.get(&url).send().await.map_err(invoke_error)?;
        if !response.status().is_success() {
            return Err(JobError::InvocationFailed(format!("GET {url} returned {}", response.status())));
        }
        let status: WireInvokeStatus = response.json().await.map_err(|e| JobError::MalformedOutput(e.to_string()))?;
        Ok(match status {
            WireInvokeStatus::InProgress => AsyncInvokeStatus::InProgress,
            WireInvokeStatus::Completed { output_s3_uri } => AsyncInvokeStatus::Completed { output_s3_uri },
            WireInvokeStatus::Failed { message } => AsyncInvokeStatus::Failed { message },
        })
    }

    async fn stop_async_invoke(&self, invocation_arn: &str) -> Result<(), JobError> {
        let url = format!("{}/async-invoke/{invocation_arn}/stop", self.base_url);
        let response = self.client.post(&url).send().await.map_err(invoke_error)?;
        if !response.status().is_success() {
            return Err(JobError::InvocationFailed(format!("POST {url} returned {}", response.status())));
        }
        Ok(())
    }
}
