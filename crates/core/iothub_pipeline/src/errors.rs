use thiserror::Error;

/// The error attached to an operation that failed
///
/// A caller cannot tell from this layer which sub-operation failed:
/// provider, transport, service status and decoding failures
/// are all reported on the operation the caller submitted.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    AuthProvider(#[from] AuthProviderError),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("twin operation returned status {status_code}")]
    ServiceStatus {
        status_code: u16,
        response_body: Vec<u8>,
    },

    #[error("The {operation} operation completed with no status code")]
    MissingStatusCode { operation: &'static str },

    #[error("The response body is not valid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("The response body is not valid JSON")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Fail to serialize the reported properties patch")]
    InvalidPatch(#[source] serde_json::Error),

    #[error("{stage}: no next stage to handle {operation}")]
    UnhandledOperation {
        stage: String,
        operation: &'static str,
    },

    #[error("Expected a {expected} operation, got a {actual} operation")]
    UnexpectedOperation {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("The pipeline has no stages")]
    EmptyPipeline,

    #[error("The pipeline has been dropped before the {operation} operation completed")]
    PipelineClosed { operation: &'static str },

    #[error("The operation has been dropped before completion")]
    Canceled(#[from] futures::channel::oneshot::Canceled),
}

/// Failure of an authentication provider to deliver a SAS token
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum AuthProviderError {
    #[error("No SAS token is available for {device_id}")]
    NoToken { device_id: String },

    #[error("Fail to generate a SAS token: {0}")]
    TokenGeneration(String),
}
