//! HTTP encoding of render errors.

use axum::Json;
use axum::http::StatusCode;
use axum::http::header::X_CONTENT_TYPE_OPTIONS;
use axum::response::{IntoResponse, Response};
use platen_core::RenderError;

/// Wraps a [`RenderError`] for the wire: every category maps to 422 with
/// the error's JSON encoding as body.
pub struct ErrorResponse(pub RenderError);

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            [(X_CONTENT_TYPE_OPTIONS, "nosniff")],
            Json(self.0),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn encodes_as_422_json() {
        let res = ErrorResponse(RenderError::input("unknown engine")).into_response();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(
            res.headers()["content-type"]
                .to_str()
                .unwrap()
                .starts_with("application/json")
        );

        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "unknown engine");
        assert_eq!(value["category"], "input");
    }
}
