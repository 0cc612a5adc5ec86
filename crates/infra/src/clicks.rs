//! Server-side half of referral click logging.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use referly_core::ClickId;
use referly_referral::ReferralClick;

use crate::store::{ClickStore, ProfileStore, StoreError};

/// Appends one audit record per logged referral visit.
///
/// Callers on user-facing paths dispatch this without awaiting and swallow
/// the error; the record itself is still written with a resolved referrer
/// where the code is known, and with `None` for unknown or stale codes.
pub struct ClickRecorder {
    profiles: Arc<dyn ProfileStore>,
    clicks: Arc<dyn ClickStore>,
}

impl ClickRecorder {
    pub fn new(profiles: Arc<dyn ProfileStore>, clicks: Arc<dyn ClickStore>) -> Self {
        Self { profiles, clicks }
    }

    pub async fn record(
        &self,
        raw_code: &str,
        ip: IpAddr,
        user_agent: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ClickId, StoreError> {
        let referrer = self
            .profiles
            .resolve_code(raw_code.trim())
            .await?
            .map(|profile| profile.id);

        let click = ReferralClick::new(raw_code.trim(), referrer, ip, user_agent, now);
        let id = click.id;
        self.clicks.append(click).await?;
        Ok(id)
    }
}
