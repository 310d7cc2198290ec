use super::AppState;
use actix_web::{web, HttpResponse};
use prometheus::{Encoder, TextEncoder};
use tracing::warn;

/// Liveness plus a store round-trip
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    match state.store.health_check().await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "status": "ok", "store": "up" })),
        Err(e) => {
            warn!(error = %e, "Store health check failed");
            HttpResponse::ServiceUnavailable()
                .json(serde_json::json!({ "status": "degraded", "store": "down" }))
        }
    }
}

/// Prometheus text exposition
pub async fn metrics(state: web::Data<AppState>) -> HttpResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&state.registry.gather(), &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }
    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
