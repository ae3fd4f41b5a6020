//! JSON body extractor whose rejections use the API error format.

use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
};
use tracing::debug;

use super::error::ApiError;

/// Like [`axum::Json`], but a missing content type, malformed JSON or a body
/// of the wrong shape is a 400 `{status, message}` instead of axum's plain text.
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        debug!(error = %rejection.body_text(), "Rejected request body");
        match rejection {
            JsonRejection::MissingJsonContentType(_) => {
                ApiError::bad_request("Expected a JSON body with Content-Type: application/json")
            }
            JsonRejection::JsonSyntaxError(_) => {
                ApiError::bad_request("Request body is not valid JSON")
            }
            JsonRejection::JsonDataError(_) => {
                ApiError::bad_request("Request body has missing or invalid fields")
            }
            _ => ApiError::bad_request("Invalid request body"),
        }
    }
}

impl<T, S> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(ApiJson(value))
    }
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::StatusCode, response::IntoResponse};
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct EmailBody {
        #[allow(dead_code)]
        email: Option<String>,
    }

    async fn extract(
        content_type: Option<&str>,
        body: &'static str,
    ) -> Result<ApiJson<EmailBody>, ApiError> {
        let mut builder = axum::http::Request::builder().method("POST").uri("/");
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        ApiJson::<EmailBody>::from_request(builder.body(Body::from(body)).unwrap(), &()).await
    }

    async fn assert_bad_request(result: Result<ApiJson<EmailBody>, ApiError>) {
        let response = match result {
            Ok(_) => panic!("body should have been rejected"),
            Err(e) => e.into_response(),
        };
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "error");
        assert!(json["message"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_valid_body() {
        assert!(extract(Some("application/json"), r#"{"email":"a@b.c"}"#)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_syntax_error() {
        assert_bad_request(extract(Some("application/json"), "{not json").await).await;
    }

    #[tokio::test]
    async fn test_missing_content_type() {
        assert_bad_request(extract(None, r#"{"email":"a@b.c"}"#).await).await;
        assert_bad_request(extract(Some("text/plain"), r#"{"email":"a@b.c"}"#).await).await;
    }

    #[tokio::test]
    async fn test_wrong_field_type() {
        assert_bad_request(extract(Some("application/json"), r#"{"email":5}"#).await).await;
    }
}
