//! `/v1` request handlers.

pub mod admin;
pub mod demographics;
pub mod documents;
pub mod health;
pub mod queues;

use serde_json::Value;
use validator::Validate;

use crate::error::ApiError;
use crate::validation::{collect_validation_errors, FieldError};

/// Deserialize a raw JSON body into a typed request, mapping serde
/// failures into the field-path envelope instead of axum's default
/// rejection.
pub(crate) fn parse_body<T: serde::de::DeserializeOwned>(body: &Value) -> Result<T, ApiError> {
    serde_json::from_value(body.clone()).map_err(|e| {
        ApiError::Validation(vec![FieldError {
            field: "body".to_string(),
            message: e.to_string(),
        }])
    })
}

/// Run `validator` rules plus the opaque-payload money check.
pub(crate) fn validate_request<T: Validate>(request: &T, raw: &Value) -> Result<(), ApiError> {
    let mut errors = match request.validate() {
        Ok(()) => Vec::new(),
        Err(e) => collect_validation_errors(&e),
    };
    errors.extend(crate::validation::validate_money_precision(raw));

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}
