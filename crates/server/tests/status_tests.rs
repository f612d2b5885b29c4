//! Tests for the /status and /metrics endpoints.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{Part, TestServer, body_bytes, body_json, render_request};

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn status_reports_service_shape() {
    let server = TestServer::new().await;

    let res = server.request(get("/status")).await;
    assert_eq!(res.status(), StatusCode::OK);

    let json = body_json(res).await;
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(json["mode"], "local");
    assert_eq!(json["default_engine"], "xelatex");
    assert_eq!(
        json["engines"],
        serde_json::json!(["xelatex", "pdflatex", "lualatex"])
    );
    assert_eq!(json["queue"]["length"], 0);
    assert_eq!(json["queue"]["capacity"], 2);
    // local mode: no image list
    assert!(json.get("images").is_none());
}

#[tokio::test]
async fn status_reports_container_mode() {
    let server = TestServer::with_config(|config| {
        config.images = vec!["registry.example.org/tex:5".to_string()];
    })
    .await;

    let json = body_json(server.request(get("/status")).await).await;
    assert_eq!(json["mode"], "container");
    assert_eq!(
        json["images"],
        serde_json::json!(["registry.example.org/tex:5"])
    );
}

#[tokio::test]
async fn metrics_expose_render_counters() {
    let server = TestServer::new().await;

    // process one job so the counters exist
    let res = server
        .request(render_request(
            "",
            &[Part::file(
                "input.tex",
                "\\documentclass{article}\\begin{document}hi\\end{document}",
            )],
        ))
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = server.request(get("/metrics")).await;
    assert_eq!(res.status(), StatusCode::OK);

    let text = String::from_utf8(body_bytes(res).await).unwrap();
    assert!(text.contains("platen_processed_total"));
    assert!(text.contains("platen_job_queue_length"));
    assert!(text.contains("platen_job_queue_ratio"));
    assert!(text.contains("platen_info"));
}
