//! Webhook-driven earnings recording.
//!
//! One inbound notification drives, in order: authenticity verification,
//! payload extraction, best-effort referral attachment, and at-most-once
//! earnings recording. Attachment and recording are deliberately independent
//! idempotent operations rather than one transaction: the provider
//! redelivers the whole notification, and each half re-attempts safely.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

use referly_core::{AccountId, ClickId};
use referly_earnings::{CommissionSchedule, EarningsEvent, OrderId};

use crate::attachment::ReferralAttachmentService;
use crate::store::{EarningsStore, ProfileStore, StoreError};

type HmacSha256 = Hmac<Sha256>;

/// The only event type that carries money.
pub const CHECKOUT_COMPLETED: &str = "checkout.completed";

/// Wire shape of a provider notification.
///
/// Everything except `event_type` is optional at the serde level so that
/// non-purchase events deserialize cleanly; required fields are enforced
/// only once the event type says this is a purchase.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutNotification {
    pub event_type: String,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub buyer_account_id: Option<AccountId>,
    #[serde(default)]
    pub referral_code: Option<String>,
    #[serde(default)]
    pub click_id: Option<ClickId>,
    #[serde(default)]
    pub gross_amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Signature missing/malformed/wrong. Terminal; nothing was processed.
    #[error("webhook signature rejected")]
    Unauthenticated,

    /// The payload is not a usable notification. Terminal.
    #[error("invalid notification: {0}")]
    Validation(String),

    /// The backing store failed; surfaced so the provider redelivers.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// What one delivery amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOutcome {
    /// First sighting of this order: event created, credits applied.
    Recorded { credits: usize },
    /// Replayed delivery; the order was already on file.
    AlreadyRecorded,
    /// Verified but not a completed purchase; nothing to do.
    Ignored,
}

/// Verify the provider's HMAC-SHA256 signature over the raw body.
///
/// The comparison is constant-time (via `Mac::verify_slice`); any shape of
/// failure collapses into the same rejection.
pub fn verify_signature(
    secret: &[u8],
    raw_body: &[u8],
    signature_header: &str,
) -> Result<(), LedgerError> {
    let provided = hex::decode(signature_header.trim()).map_err(|_| LedgerError::Unauthenticated)?;
    let mut mac =
        HmacSha256::new_from_slice(secret).map_err(|_| LedgerError::Unauthenticated)?;
    mac.update(raw_body);
    mac.verify_slice(&provided)
        .map_err(|_| LedgerError::Unauthenticated)
}

/// Webhook-driven, idempotent multi-tier earnings ledger.
pub struct EarningsLedger {
    profiles: Arc<dyn ProfileStore>,
    earnings: Arc<dyn EarningsStore>,
    attachment: Arc<ReferralAttachmentService>,
    schedule: CommissionSchedule,
    webhook_secret: String,
}

impl EarningsLedger {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        earnings: Arc<dyn EarningsStore>,
        attachment: Arc<ReferralAttachmentService>,
        schedule: CommissionSchedule,
        webhook_secret: impl Into<String>,
    ) -> Self {
        Self {
            profiles,
            earnings,
            attachment,
            schedule,
            webhook_secret: webhook_secret.into(),
        }
    }

    /// Entry point for one delivered notification: verify, parse, process.
    pub async fn handle_notification(
        &self,
        raw_body: &[u8],
        signature_header: &str,
        now: DateTime<Utc>,
    ) -> Result<LedgerOutcome, LedgerError> {
        verify_signature(self.webhook_secret.as_bytes(), raw_body, signature_header)?;

        let note: CheckoutNotification = serde_json::from_slice(raw_body)
            .map_err(|e| LedgerError::Validation(e.to_string()))?;

        self.process(note, now).await
    }

    /// Process an already-verified notification.
    pub async fn process(
        &self,
        note: CheckoutNotification,
        now: DateTime<Utc>,
    ) -> Result<LedgerOutcome, LedgerError> {
        if note.event_type != CHECKOUT_COMPLETED {
            tracing::debug!(event_type = %note.event_type, "ignoring non-purchase event");
            return Ok(LedgerOutcome::Ignored);
        }

        let order_id: OrderId = note
            .order_id
            .as_deref()
            .unwrap_or_default()
            .parse()
            .map_err(|_| LedgerError::Validation("missing or empty order_id".into()))?;
        let buyer = note
            .buyer_account_id
            .ok_or_else(|| LedgerError::Validation("missing buyer_account_id".into()))?;
        let gross_amount = note
            .gross_amount
            .ok_or_else(|| LedgerError::Validation("missing gross_amount".into()))?;
        let currency = note
            .currency
            .as_deref()
            .ok_or_else(|| LedgerError::Validation("missing currency".into()))?;

        // Attachment half: same write-once linkage as the sign-in flow, here
        // fed from the code the provider echoed back. Failures are logged and
        // must not keep the recording half from running.
        if let Some(code) = note.referral_code.as_deref() {
            match self.attachment.attach(buyer, Some(code), note.click_id).await {
                Ok(outcome) if outcome.attached => {
                    tracing::info!(%buyer, %order_id, "buyer attached via checkout notification");
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(%buyer, %order_id, error = %err, "checkout-time attachment failed");
                }
            }
        }

        // Recording half. Resolving the referral chain re-reads the profile
        // so an attachment that just landed (this delivery or a concurrent
        // one) is credited.
        let tier1 = match self.profiles.get(buyer).await? {
            Some(profile) => profile.referred_by,
            None => {
                tracing::debug!(%buyer, %order_id, "buyer has no profile; recording without credits");
                None
            }
        };
        let tier2 = match tier1 {
            Some(referrer) => self
                .profiles
                .get(referrer)
                .await?
                .and_then(|profile| profile.referred_by),
            None => None,
        };

        let event = EarningsEvent::new(order_id.clone(), buyer, gross_amount, currency, now)
            .map_err(|e| LedgerError::Validation(e.to_string()))?;
        let credits = self
            .schedule
            .credits_for(event.gross_amount, &event.currency, tier1, tier2);

        if self.earnings.record_order(event, &credits).await? {
            tracing::info!(%order_id, credits = credits.len(), "earnings recorded");
            Ok(LedgerOutcome::Recorded {
                credits: credits.len(),
            })
        } else {
            tracing::debug!(%order_id, "duplicate delivery; order already recorded");
            Ok(LedgerOutcome::AlreadyRecorded)
        }
    }
}
