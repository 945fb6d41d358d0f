//! Response envelope shared by every endpoint.
//!
//! ```json
//! {
//!   "metadata": { "transactionId": "...", "message": "OK", "error": { "code": 1001 } },
//!   "data": { "id": "..." }
//! }
//! ```
//!
//! `error` is only present outside production; `data` is omitted when there
//! is nothing to return.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Environment;

/// Message of a successful response.
pub const MESSAGE_OK: &str = "OK";
/// Message of a failed response.
pub const MESSAGE_FAILED: &str = "FAILED";

/// Errors that expose a numeric code to API clients.
pub trait ErrorCode {
    /// The code written to `metadata.error.code`.
    fn code(&self) -> u16;
}

/// Error details of a failed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Domain error code
    pub code: u16,
}

/// Envelope metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    /// Correlation id of the request this responds to
    pub transaction_id: String,
    /// `OK` or `FAILED`
    pub message: String,
    /// Error details, never present in production
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

/// The complete response body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Envelope metadata
    pub metadata: ResponseMetadata,
    /// Payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Fluent builder for [`ResponseEnvelope`].
#[derive(Debug, Clone)]
pub struct ResponseBuilder {
    environment: Environment,
    response: ResponseEnvelope,
}

impl ResponseBuilder {
    /// Starts an empty envelope for the given environment.
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            response: ResponseEnvelope::default(),
        }
    }

    /// Sets the transaction id.
    #[must_use]
    pub fn transaction_id(mut self, transaction_id: impl ToString) -> Self {
        self.response.metadata.transaction_id = transaction_id.to_string();
        self
    }

    /// Sets the message.
    #[must_use]
    pub fn message(mut self, message: &str) -> Self {
        self.response.metadata.message = message.to_string();
        self
    }

    /// Records the error code, unless there is no error or this is production.
    #[must_use]
    pub fn error<E: ErrorCode + ?Sized>(mut self, error: Option<&E>) -> Self {
        let Some(error) = error else {
            return self;
        };
        if !self.environment.is_production() {
            self.response.metadata.error = Some(ErrorDetail { code: error.code() });
        }
        self
    }

    /// Sets the payload; `None` and JSON `null` leave it out.
    #[must_use]
    pub fn data(mut self, data: Option<Value>) -> Self {
        if let Some(data) = data.filter(|value| !value.is_null()) {
            self.response.data = Some(data);
        }
        self
    }

    /// Builds the envelope.
    pub fn build(self) -> ResponseEnvelope {
        self.response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CorrelationId;
    use serde_json::json;

    struct Coded(u16);

    impl ErrorCode for Coded {
        fn code(&self) -> u16 {
            self.0
        }
    }

    #[test]
    fn empty_builder_has_empty_metadata_and_no_data() {
        let json = serde_json::to_value(ResponseBuilder::new(Environment::Test).build()).unwrap();
        assert_eq!(
            json,
            json!({ "metadata": { "transactionId": "", "message": "" } })
        );
    }

    #[test]
    fn full_envelope_serializes_with_camel_case_keys() {
        let id = CorrelationId::new();
        let envelope = ResponseBuilder::new(Environment::Development)
            .transaction_id(id)
            .message(MESSAGE_FAILED)
            .error(Some(&Coded(1001)))
            .data(Some(json!({ "id": "abc" })))
            .build();

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            json,
            json!({
                "metadata": {
                    "transactionId": id.to_string(),
                    "message": "FAILED",
                    "error": { "code": 1001 }
                },
                "data": { "id": "abc" }
            })
        );
    }

    #[test]
    fn production_hides_error_details() {
        let envelope = ResponseBuilder::new(Environment::Production)
            .message(MESSAGE_FAILED)
            .error(Some(&Coded(1111)))
            .build();
        assert!(envelope.metadata.error.is_none());
    }

    #[test]
    fn missing_error_is_ignored() {
        let envelope = ResponseBuilder::new(Environment::Development)
            .error::<Coded>(None)
            .build();
        assert!(envelope.metadata.error.is_none());
    }

    #[test]
    fn null_data_is_left_out() {
        let envelope = ResponseBuilder::new(Environment::Test)
            .data(Some(Value::Null))
            .data(None)
            .build();
        assert!(envelope.data.is_none());

        let envelope = ResponseBuilder::new(Environment::Test)
            .data(Some(json!([])))
            .build();
        assert_eq!(envelope.data, Some(json!([])));
    }
}
