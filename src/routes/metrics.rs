use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Register descriptions for every metric the service emits.
pub fn describe_metrics() {
    metrics::describe_counter!("upc_jobs_started_total", "Background jobs started");
    metrics::describe_counter!(
        "upc_jobs_completed_total",
        "Background jobs that cached a result"
    );
    metrics::describe_counter!(
        "upc_jobs_failed_total",
        "Background jobs that ended without caching a result"
    );
    metrics::describe_counter!("upc_images_stored_total", "Product images downloaded and stored");
    metrics::describe_gauge!("upc_jobs_in_flight", "Keys currently owned by a running job");
    metrics::describe_histogram!(
        "upc_job_duration_seconds",
        "Wall time of a background job from lookup to cache write"
    );
}

/// Router exposing `GET /metrics` in Prometheus text format.
pub fn metrics_router(handle: Arc<PrometheusHandle>) -> Router {
    Router::new()
        .route("/metrics", get(prometheus_metrics))
        .with_state(handle)
}

async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}
