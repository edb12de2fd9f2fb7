use std::any::Any;

use thiserror::Error;

/// Everything that can go wrong while turning a request into a stored item.
///
/// None of these reach the caller; the handler logs the variant and its
/// message and answers with a generic 500.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Body is not JSON, not a JSON object, or carries an unusable value.
    #[error("malformed payload: {message}")]
    MalformedPayload { message: String },

    /// One of `id`, `year` or `title` is absent, null or empty.
    #[error("missing required field `{field}`")]
    MissingField { field: &'static str },

    /// The write to the table failed.
    #[error("store write failed: {message}")]
    StoreWrite { message: String },

    /// Anything else, including a panic while processing the request.
    #[error("unclassified error: {message}")]
    Unclassified { message: String },
}

impl HandlerError {
    /// Name used for the `error_type` field of the error log event.
    pub fn kind(&self) -> &'static str {
        match self {
            HandlerError::MalformedPayload { .. } => "MalformedPayloadError",
            HandlerError::MissingField { .. } => "MissingFieldError",
            HandlerError::StoreWrite { .. } => "StoreWriteError",
            HandlerError::Unclassified { .. } => "UnclassifiedError",
        }
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "panic while handling request".to_string()
        };
        HandlerError::Unclassified { message }
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::MalformedPayload {
            message: err.to_string(),
        }
    }
}
