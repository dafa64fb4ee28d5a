//! HTTP handlers and route configuration.

mod health;
mod requests;
mod usage;

use actix_web::web;

use crate::middleware::admission::AdmissionMiddleware;

/// Configure all application routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            // Public routes
            .route("/health", web::get().to(health::health_check))
            .route("/usage/{user_id}", web::get().to(usage::get_usage))
            // Gated routes
            .service(
                web::resource("/requests")
                    .wrap(AdmissionMiddleware)
                    .route(web::post().to(requests::handle_request)),
            ),
    );
}
