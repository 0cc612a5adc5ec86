use axum::Router;

pub mod ads;
pub mod referrals;
pub mod system;
pub mod webhooks;

/// Router for every non-health endpoint.
pub fn router() -> Router {
    Router::new()
        .nest("/referrals", referrals::router())
        .nest("/ads", ads::router())
        .nest("/webhooks", webhooks::router())
}
