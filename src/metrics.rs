use std::time::Duration;

use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder, HistogramVec,
    IntCounter, IntCounterVec, TextEncoder,
};

pub static UPSTREAM_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "balancer_upstream_requests_total",
        "Requests dispatched to each upstream",
        &["upstream", "status"]
    )
    .unwrap()
});

pub static UPSTREAM_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "balancer_upstream_duration_seconds",
        "Time until the upstream response headers arrived",
        &["upstream"]
    )
    .unwrap()
});

pub static UNAVAILABLE: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "balancer_unavailable_total",
        "Requests rejected because no upstream was alive"
    )
    .unwrap()
});

pub fn observe(upstream: &str, status: StatusCode, elapsed: Duration) {
    UPSTREAM_REQUESTS
        .with_label_values(&[upstream, status.as_str()])
        .inc();
    UPSTREAM_DURATION
        .with_label_values(&[upstream])
        .observe(elapsed.as_secs_f64());
}

pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", err);
        return (StatusCode::INTERNAL_SERVER_ERROR, Vec::new()).into_response();
    }
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

/// 管理端口上的路由，与代理端口分开
pub fn router() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}
