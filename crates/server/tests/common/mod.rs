//! Server test utilities.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use platen_core::ServiceConfig;
use platen_exec::{Executor, MockExecutor};
use platen_refstore::{MemoryStore, ReferenceStore, RetentionPolicy};
use platen_server::{AppState, create_router};
use platen_tex::JobDir;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// A test server with temporary job storage and an in-memory reference
/// store. The compiler is mocked.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    pub async fn new() -> Self {
        Self::build(ServiceConfig::for_testing(), Arc::new(MockExecutor::succeeding())).await
    }

    pub async fn with_executor(executor: Arc<dyn Executor>) -> Self {
        Self::build(ServiceConfig::for_testing(), executor).await
    }

    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut ServiceConfig),
    {
        let mut config = ServiceConfig::for_testing();
        modifier(&mut config);
        Self::build(config, Arc::new(MockExecutor::succeeding())).await
    }

    pub async fn build(mut config: ServiceConfig, executor: Arc<dyn Executor>) -> Self {
        platen_server::metrics::register_metrics();

        let temp_dir = tempfile::tempdir().expect("failed to create temp directory");
        config.job_directory = Some(temp_dir.path().to_path_buf());

        let job_dir = JobDir::new(Some(temp_dir.path())).expect("failed to create job dir");
        let refs: Arc<dyn ReferenceStore> =
            Arc::new(MemoryStore::new(RetentionPolicy::KeepForever));

        let state = AppState::new(config, job_dir, refs, executor);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Drive one request through the router.
    pub async fn request(&self, req: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(req).await.expect("request failed")
    }
}

/// One part of a multipart/form-data body.
#[allow(dead_code)]
pub struct Part {
    pub name: &'static str,
    pub content_type: Option<&'static str>,
    pub body: Vec<u8>,
}

#[allow(dead_code)]
impl Part {
    pub fn file(name: &'static str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            name,
            content_type: None,
            body: body.into(),
        }
    }

    pub fn reference_use(name: &'static str, id: impl Into<Vec<u8>>) -> Self {
        Self {
            name,
            content_type: Some("application/x.texd; ref=use"),
            body: id.into(),
        }
    }

    pub fn reference_store(name: &'static str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            name,
            content_type: Some("application/x.texd; ref=store"),
            body: body.into(),
        }
    }
}

pub const BOUNDARY: &str = "platen-test-boundary";

/// Assemble a multipart/form-data body from parts.
#[allow(dead_code)]
pub fn multipart_body(parts: &[Part]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n", part.name).as_bytes(),
        );
        if let Some(ct) = part.content_type {
            body.extend_from_slice(format!("Content-Type: {ct}\r\n").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(&part.body);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Build a POST /render request with the given query string and parts.
#[allow(dead_code)]
pub fn render_request(query: &str, parts: &[Part]) -> Request<Body> {
    let uri = if query.is_empty() {
        "/render".to_string()
    } else {
        format!("/render?{query}")
    };
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

/// Read the full response body.
#[allow(dead_code)]
pub async fn body_bytes(res: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .expect("failed to read body")
        .to_vec()
}

/// Read the response body as JSON.
#[allow(dead_code)]
pub async fn body_json(res: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(res).await).expect("body is not valid JSON")
}
