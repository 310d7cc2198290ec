/// HTTP handlers
///
/// - Resources: create, read, capacity, teardown, block
/// - Memberships: join, leave, active roster, participant history
/// - Ledger: entries, leaderboard, stats
/// - Health and Prometheus metrics
pub mod health;
pub mod ledger;
pub mod memberships;
pub mod resources;

use crate::services::Services;
use actix_web::web;
use prometheus::Registry;
use session_store::Store;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub store: Store,
    pub registry: Registry,
}

/// Mount every route
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health::health))
        .route("/metrics", web::get().to(health::metrics))
        .service(
            web::scope("/resources")
                .route("", web::post().to(resources::create_resource))
                .route("/{id}", web::get().to(resources::get_resource))
                .route("/{id}", web::delete().to(resources::teardown_resource))
                .route("/{id}/capacity", web::put().to(resources::set_capacity))
                .route("/{id}/block", web::post().to(resources::block_participant))
                .route("/{id}/join", web::post().to(memberships::join))
                .route(
                    "/{id}/memberships/{membership_id}/leave",
                    web::post().to(memberships::leave),
                )
                .route("/{id}/active", web::get().to(memberships::active_members))
                .route("/{id}/ledger", web::post().to(ledger::record_entry))
                .route("/{id}/ledger", web::get().to(ledger::list_entries))
                .route("/{id}/leaderboard", web::get().to(ledger::leaderboard))
                .route("/{id}/stats", web::get().to(ledger::stats))
                .route("/{id}/stats/reconcile", web::post().to(ledger::reconcile)),
        )
        .route(
            "/participants/{id}/history",
            web::get().to(memberships::history),
        );
}
