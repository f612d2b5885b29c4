//! Request correlation ids.
//!
//! Every request gets a short random id, stored in the request extensions
//! for handlers to log with and echoed back in the `X-Request-Id` header.

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use uuid::Uuid;

pub const HEADER: &str = "x-request-id";

/// The per-request correlation id.
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

fn generate() -> String {
    // 6 random bytes -> 8 URL-safe characters
    URL_SAFE_NO_PAD.encode(&Uuid::new_v4().as_bytes()[..6])
}

pub async fn middleware(mut req: Request, next: Next) -> Response {
    let id = generate();
    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        res.headers_mut().insert(HEADER, value);
    }
    res
}
