use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("object store error: {0}")]
    ObjectStore(String),

    #[error("failed to start async invocation: {0}")]
    StartFailed(String),

    #[error("async invocation failed: {0}")]
    InvocationFailed(String),

    #[error("failed to parse job output: {0}")]
    MalformedOutput(String),
}
