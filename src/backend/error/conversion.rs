/**
 * Error Conversion
 *
 * `IntoResponse` for `BackendError` so handlers can return it directly, and
 * the classification of native database errors into domain kinds.
 *
 * # Response Format
 *
 * ```json
 * {
 *   "error": "conversation not found",
 *   "status": 404
 * }
 * ```
 */

use axum::{
    body::Body,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::backend::error::types::BackendError;

/// Postgres SQLSTATE for unique constraint violations
const UNIQUE_VIOLATION: &str = "23505";
/// Postgres SQLSTATE for foreign key violations
const FOREIGN_KEY_VIOLATION: &str = "23503";

impl IntoResponse for BackendError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.message();

        if status.is_server_error() {
            tracing::error!("[Error] {} -> {}", self, status);
        }

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        Response::builder()
            .status(status)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap_or_else(|_| {
                let mut fallback = Response::new(Body::from("Internal Server Error"));
                *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                fallback
            })
    }
}

/// Classify a driver error into a domain error
///
/// `entity` names what was being written, for `AlreadyExists`. Foreign key
/// violations are resolved by constraint name: anything on a `user_id`
/// column means the referenced user is missing, anything on a
/// `conversation_id` column means the conversation is missing.
pub fn classify_sqlx_error(err: sqlx::Error, entity: &'static str) -> BackendError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some(UNIQUE_VIOLATION) => return BackendError::AlreadyExists { entity },
            Some(FOREIGN_KEY_VIOLATION) => {
                let constraint = db_err.constraint().unwrap_or_default();
                if constraint.contains("conversation_id") {
                    return BackendError::ConversationNotFound;
                }
                return BackendError::UserNotFound;
            }
            _ => {}
        }
    }
    tracing::warn!("[Db] {} query failed: {:?}", entity, err);
    BackendError::transient(err.to_string())
}

impl From<sqlx::Error> for BackendError {
    fn from(err: sqlx::Error) -> Self {
        classify_sqlx_error(err, "record")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_into_response_status_and_body() {
        let response = BackendError::ForbiddenAction.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], 403);
        assert!(body["error"].as_str().unwrap().contains("not allowed"));
    }

    #[test]
    fn test_non_database_errors_are_transient() {
        let err = classify_sqlx_error(sqlx::Error::PoolTimedOut, "participant");
        assert!(matches!(err, BackendError::Transient { .. }));
    }
}
