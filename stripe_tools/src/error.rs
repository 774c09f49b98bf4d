use thiserror::Error;

#[derive(Debug, Error)]
pub enum StripeApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Invalid REST request: {0}")]
    RestRequestError(String),
    #[error("Invalid REST response: {0}")]
    RestResponseError(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Query failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
}

impl StripeApiError {
    /// Whether the failure happened on the far side of the connection (network trouble, 5xx, rate limits), so that
    /// the same request may succeed if retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RestResponseError(_) => true,
            Self::QueryError { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WebhookSignatureError {
    #[error("The signature header is missing or empty")]
    MissingHeader,
    #[error("The signature header is malformed: {0}")]
    MalformedHeader(String),
    #[error("The signature header has no v1 signature")]
    NoSignature,
    #[error("The signature timestamp is outside the tolerance window")]
    TimestampOutOfTolerance,
    #[error("No signature in the header matches the payload")]
    Mismatch,
}
