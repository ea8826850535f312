use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid file kind: {0}")]
    InvalidFileKind(String),
    #[error("file is {size} bytes, above the {limit} byte upload limit")]
    FileTooLarge { size: u64, limit: u64 },
    #[error("an upload is already in progress")]
    AlreadyInProgress,
    #[error("a question is still awaiting its answer")]
    QueryInProgress,
    #[error("upload failed: {0}")]
    UploadFailed(String),
    #[error("no active session; upload a document first")]
    NoActiveSession,
    #[error("query failed: {0}")]
    QueryFailed(String),
    #[error("status check failed: {0}")]
    Status(String),
    #[error("session storage error: {0}")]
    Storage(String),
    #[error("invalid client configuration: {0}")]
    Config(String),
}

/// Failure of a single round trip to the document service.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build request: {0}")]
    Request(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("server responded with {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed response body: {0}")]
    MalformedBody(String),
}
