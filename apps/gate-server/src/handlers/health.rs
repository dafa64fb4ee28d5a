//! Health check endpoint.

use actix_web::{HttpResponse, web};
use turnstile_shared::dto::HealthResponse;

use crate::state::AppState;

/// Health check endpoint - returns server status and the counter backend.
///
/// GET /api/health
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store_backend: state.ledger.store_backend().to_string(),
    };

    HttpResponse::Ok().json(response)
}
