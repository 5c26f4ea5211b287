use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

/// Record request latency by method and status
pub async fn track_metrics(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let response = next.run(req).await;
    common::telemetry::record_request_duration(
        &method,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}
