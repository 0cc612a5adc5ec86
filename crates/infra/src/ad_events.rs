//! Deduplicated recording of ad impressions and clicks.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use referly_ads::{dedup_window, AdEvent, AdEventKind};
use referly_core::AdId;

use crate::store::{AdStore, StoreError};

/// Client metadata attached to every recorded ad event.
#[derive(Debug, Clone)]
pub struct ViewerMeta {
    pub ip: IpAddr,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
}

#[derive(Debug, Error)]
pub enum AdRedirectError {
    /// Unknown ad, or an ad with no click-through target.
    #[error("ad or target not found")]
    NotFound,

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Records viewer-triggered ad events and resolves click-through redirects.
pub struct AdEventRecorder {
    ads: Arc<dyn AdStore>,
}

impl AdEventRecorder {
    pub fn new(ads: Arc<dyn AdStore>) -> Self {
        Self { ads }
    }

    /// Record one observed impression or click.
    ///
    /// Events repeating `(ad, kind, ip)` inside the rolling window are
    /// suppressed; so are events for ads that don't exist (the tracking
    /// endpoint answers the same either way, so a viewer can't probe the
    /// catalogue through it). Returns whether the event was counted.
    pub async fn record(
        &self,
        ad_id: AdId,
        kind: AdEventKind,
        meta: ViewerMeta,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let event = AdEvent {
            ad_id,
            kind,
            ip: meta.ip,
            user_agent: meta.user_agent,
            referrer: meta.referrer,
            created_at: now,
        };

        match self.ads.record_event(event, dedup_window()).await {
            Ok(counted) => Ok(counted),
            Err(StoreError::NotFound) => {
                tracing::debug!(%ad_id, %kind, "event for unknown ad dropped");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Resolve a click-through: log the click (always counted, no dedup)
    /// and hand back the ad's target URL.
    pub async fn redirect(
        &self,
        ad_id: AdId,
        meta: ViewerMeta,
        now: DateTime<Utc>,
    ) -> Result<String, AdRedirectError> {
        let ad = self
            .ads
            .get(ad_id)
            .await?
            .ok_or(AdRedirectError::NotFound)?;
        let target = ad.target_url.clone().ok_or(AdRedirectError::NotFound)?;

        let event = AdEvent {
            ad_id,
            kind: AdEventKind::Click,
            ip: meta.ip,
            user_agent: meta.user_agent,
            referrer: meta.referrer,
            created_at: now,
        };
        match self.ads.record_click_through(event).await {
            Ok(()) => {}
            // The ad disappeared between the read and the write; the
            // destination is still valid, send the viewer on.
            Err(StoreError::NotFound) => {
                tracing::debug!(%ad_id, "ad removed mid-redirect; click not counted");
            }
            Err(err) => return Err(err.into()),
        }

        Ok(target)
    }
}
