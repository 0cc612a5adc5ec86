use std::net::SocketAddr;
use std::sync::Arc;

use referly_api::app::services::{build_services, ApiConfig};
use referly_earnings::{BasisPoints, CommissionSchedule};

#[tokio::main]
async fn main() {
    referly_observability::init();

    let webhook_secret = std::env::var("WEBHOOK_SECRET").unwrap_or_else(|_| {
        tracing::warn!("WEBHOOK_SECRET not set; using insecure dev default");
        "dev-secret".to_string()
    });

    let config = ApiConfig {
        webhook_secret,
        schedule: schedule_from_env(),
    };

    let services = Arc::new(build_services(config).await);
    let app = referly_api::app::build_app(services);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080")
        .await
        .expect("failed to bind 0.0.0.0:8080");

    tracing::info!("listening on {}", listener.local_addr().unwrap());

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}

/// Commission rates are deployment configuration, not code. Refuse to start
/// without them rather than invent percentages.
fn schedule_from_env() -> CommissionSchedule {
    let read = |name: &str| -> BasisPoints {
        let raw = std::env::var(name)
            .unwrap_or_else(|_| panic!("{name} must be set (commission rate in basis points)"));
        let bps: u32 = raw
            .parse()
            .unwrap_or_else(|_| panic!("{name} must be an integer number of basis points"));
        BasisPoints::new(bps)
            .unwrap_or_else(|e| panic!("{name} invalid: {e}"))
    };

    CommissionSchedule::new(read("REFERRAL_TIER1_BPS"), read("REFERRAL_TIER2_BPS"))
}
