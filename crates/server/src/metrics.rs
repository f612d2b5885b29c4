//! Prometheus metrics for the render pipeline.

use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec,
    Opts, Registry, TextEncoder, exponential_buckets,
};
use std::sync::{LazyLock, Once};

/// Registry for all platen metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static PROCESSED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("platen_processed_total", "Number of jobs processed, by status"),
        &["status"],
    )
    .expect("metric creation failed")
});

pub static PROCESSED_SUCCESS: LazyLock<IntCounter> =
    LazyLock::new(|| PROCESSED_TOTAL.with_label_values(&["success"]));
pub static PROCESSED_FAILURE: LazyLock<IntCounter> =
    LazyLock::new(|| PROCESSED_TOTAL.with_label_values(&["failure"]));
pub static PROCESSED_REJECTED: LazyLock<IntCounter> =
    LazyLock::new(|| PROCESSED_TOTAL.with_label_values(&["rejected"]));
pub static PROCESSED_ABORTED: LazyLock<IntCounter> =
    LazyLock::new(|| PROCESSED_TOTAL.with_label_values(&["aborted"]));

pub static PROCESSING_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "platen_processing_duration_seconds",
            "Overview of processing time per job",
        )
        .buckets(vec![
            0.05, 0.1, 0.5, // expected range for input errors
            1.0, 1.5, 2.0, 2.5, 3.0, 3.5, 4.0, 4.5, 5.0, // fast jobs
            6.0, 7.0, 8.0, 9.0, 10.0, 20.0, 30.0, 60.0, // slow jobs
        ]),
    )
    .expect("metric creation failed")
});

pub static INPUT_SIZE: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "platen_input_file_size_bytes",
            "Overview of input file sizes by category",
        )
        .buckets(exponential_buckets(512.0, 2.0, 13).expect("metric creation failed")),
        &["type"],
    )
    .expect("metric creation failed")
});

pub static OUTPUT_SIZE: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "platen_output_file_size_bytes",
            "Overview of generated document sizes, success only",
        )
        .buckets(exponential_buckets(2048.0, 2.0, 13).expect("metric creation failed")),
    )
    .expect("metric creation failed")
});

pub static JOB_QUEUE_LENGTH: LazyLock<Gauge> = LazyLock::new(|| {
    Gauge::new(
        "platen_job_queue_length",
        "How many documents are waiting for or under processing",
    )
    .expect("metric creation failed")
});

pub static JOB_QUEUE_RATIO: LazyLock<Gauge> = LazyLock::new(|| {
    Gauge::new(
        "platen_job_queue_ratio",
        "Queue capacity indicator, 0 meaning empty and 1 meaning full",
    )
    .expect("metric creation failed")
});

pub static INFO: LazyLock<GaugeVec> = LazyLock::new(|| {
    GaugeVec::new(
        Opts::new("platen_info", "Various runtime and configuration information")
            .const_label("version", env!("CARGO_PKG_VERSION")),
        &["mode"],
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics. Idempotent, safe to call from tests.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(PROCESSED_TOTAL.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PROCESSING_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(INPUT_SIZE.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(OUTPUT_SIZE.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(JOB_QUEUE_LENGTH.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(JOB_QUEUE_RATIO.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(INFO.clone()))
            .expect("metric registration failed");
    });
}

/// Record per-category input sizes and the output size after a render.
pub fn observe_render(stats: &platen_tex::InputStats) {
    let observe = |category: &str, sizes: &[u64]| {
        let histogram = INPUT_SIZE.with_label_values(&[category]);
        for size in sizes {
            histogram.observe(*size as f64);
        }
    };
    observe("tex", &stats.tex);
    observe("asset", &stats.assets);
    observe("data", &stats.data);
    observe("other", &stats.other);

    if let Some(result) = stats.result {
        OUTPUT_SIZE.observe(result as f64);
    }
}

/// GET /metrics - Prometheus text exposition. Queue gauges are refreshed
/// at scrape time.
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let in_flight = state.scheduler.in_flight() as f64;
    let capacity = state.scheduler.capacity() as f64;
    JOB_QUEUE_LENGTH.set(in_flight);
    JOB_QUEUE_RATIO.set(if capacity > 0.0 { in_flight / capacity } else { 0.0 });
    INFO.with_label_values(&[state.config.mode()]).set(1.0);

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    match encoder.encode(&REGISTRY.gather(), &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("failed to encode metrics: {e}").into_bytes(),
        ),
    }
}
