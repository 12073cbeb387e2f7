// API route configuration

use crate::api::handlers;
use actix_web::web;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Health check (no auth required)
        .route("/health", web::get().to(handlers::health_check))
        .route("/", web::get().to(handlers::health_check))
        // API v1 routes (all require authentication)
        .service(
            web::scope("/api/v1")
                .service(
                    web::resource("/inventory/import")
                        .route(web::post().to(handlers::import_inventory))
                        .default_service(web::route().to(handlers::method_not_allowed)),
                )
                .service(
                    web::resource("/inventory/export")
                        .route(web::get().to(handlers::export_inventory))
                        .default_service(web::route().to(handlers::method_not_allowed)),
                ),
        );
}
