use thiserror::Error;

/// Rejections raised while validating a raw change-feed payload.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid UUID in field {field}: {source}")]
    InvalidUuid {
        field: &'static str,
        #[source]
        source: uuid::Error,
    },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(#[from] chrono::ParseError),
}
