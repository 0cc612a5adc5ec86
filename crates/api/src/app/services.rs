use std::sync::Arc;

use sqlx::PgPool;

use referly_earnings::CommissionSchedule;
use referly_infra::store::{
    ensure_schema, AdStore, ClickStore, EarningsStore, InMemoryAdStore, InMemoryClickStore,
    InMemoryEarningsStore, InMemoryProfileStore, PgAdStore, PgClickStore, PgEarningsStore,
    PgProfileStore, ProfileStore,
};
use referly_infra::{AdEventRecorder, ClickRecorder, EarningsLedger, ReferralAttachmentService};

/// Startup configuration for the service layer.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub webhook_secret: String,
    pub schedule: CommissionSchedule,
}

/// Shared per-process services, one instance behind an `Arc` in a router
/// extension. Stateless across requests; everything that must coordinate
/// between requests lives in the stores.
pub struct AppServices {
    pub profiles: Arc<dyn ProfileStore>,
    pub clicks: Arc<dyn ClickStore>,
    pub earnings: Arc<dyn EarningsStore>,
    pub ads: Arc<dyn AdStore>,
    pub attachment: Arc<ReferralAttachmentService>,
    pub click_recorder: Arc<ClickRecorder>,
    pub ledger: Arc<EarningsLedger>,
    pub ad_events: Arc<AdEventRecorder>,
}

impl AppServices {
    /// Wire the coordination services over an arbitrary set of stores.
    pub fn with_stores(
        config: ApiConfig,
        profiles: Arc<dyn ProfileStore>,
        clicks: Arc<dyn ClickStore>,
        earnings: Arc<dyn EarningsStore>,
        ads: Arc<dyn AdStore>,
    ) -> Self {
        let attachment = Arc::new(ReferralAttachmentService::new(profiles.clone()));
        let click_recorder = Arc::new(ClickRecorder::new(profiles.clone(), clicks.clone()));
        let ledger = Arc::new(EarningsLedger::new(
            profiles.clone(),
            earnings.clone(),
            attachment.clone(),
            config.schedule,
            config.webhook_secret,
        ));
        let ad_events = Arc::new(AdEventRecorder::new(ads.clone()));

        Self {
            profiles,
            clicks,
            earnings,
            ads,
            attachment,
            click_recorder,
            ledger,
            ad_events,
        }
    }

    /// In-memory wiring (dev/test).
    pub fn in_memory(config: ApiConfig) -> Self {
        Self::with_stores(
            config,
            Arc::new(InMemoryProfileStore::new()),
            Arc::new(InMemoryClickStore::new()),
            Arc::new(InMemoryEarningsStore::new()),
            Arc::new(InMemoryAdStore::new()),
        )
    }
}

/// Build services for the configured backend.
///
/// `USE_PERSISTENT_STORES=true` selects Postgres (requires `DATABASE_URL`);
/// anything else runs on in-memory stores.
pub async fn build_services(config: ApiConfig) -> AppServices {
    let use_persistent = std::env::var("USE_PERSISTENT_STORES")
        .unwrap_or_else(|_| "false".to_string())
        .parse::<bool>()
        .unwrap_or(false);

    if !use_persistent {
        return AppServices::in_memory(config);
    }

    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set when USE_PERSISTENT_STORES=true");

    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to Postgres");

    ensure_schema(&pool)
        .await
        .expect("Failed to create database schema");

    AppServices::with_stores(
        config,
        Arc::new(PgProfileStore::new(pool.clone())),
        Arc::new(PgClickStore::new(pool.clone())),
        Arc::new(PgEarningsStore::new(pool.clone())),
        Arc::new(PgAdStore::new(pool)),
    )
}
