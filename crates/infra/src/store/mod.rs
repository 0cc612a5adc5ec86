//! Storage abstractions.
//!
//! Each trait method that a correctness invariant depends on (write-once
//! attachment, at-most-once order recording, dedup-windowed ad events,
//! counter increments) is a single atomic operation of the backing store.
//! Implementations must not decompose them into separate check and act
//! steps visible to concurrent callers.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::Duration;
use thiserror::Error;

use referly_ads::{Ad, AdEvent};
use referly_core::{AccountId, AdId, ClickId};
use referly_earnings::{EarningsEvent, OrderId, TierCredit};
use referly_referral::{AccountProfile, ReferralClick, ReferralCode};

pub use memory::{InMemoryAdStore, InMemoryClickStore, InMemoryEarningsStore, InMemoryProfileStore};
pub use postgres::{ensure_schema, PgAdStore, PgClickStore, PgEarningsStore, PgProfileStore};

/// Storage-level error.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be reached or the operation failed
    /// transiently. Retriable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The referral code is already owned by another account.
    #[error("referral code already in use")]
    DuplicateCode,

    /// The referenced row does not exist.
    #[error("not found")]
    NotFound,

    /// A stored value could not be decoded.
    #[error("stored value malformed: {0}")]
    Malformed(String),
}

impl StoreError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}

/// Account referral profiles and the referral-code directory.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Insert a freshly issued profile. Fails with [`StoreError::DuplicateCode`]
    /// when the profile's code is already taken.
    async fn insert(&self, profile: AccountProfile) -> Result<(), StoreError>;

    async fn get(&self, id: AccountId) -> Result<Option<AccountProfile>, StoreError>;

    /// Look up the account currently owning `code`. Rotated-away codes no
    /// longer resolve.
    async fn resolve_code(&self, code: &str) -> Result<Option<AccountProfile>, StoreError>;

    /// Write-once attachment: set `referred_by` (and the attributed click)
    /// only while it is still unset, as one conditional write. Returns
    /// `true` when this call performed the write, `false` when another
    /// writer already had.
    async fn attach_referrer(
        &self,
        account: AccountId,
        referrer: AccountId,
        click: Option<ClickId>,
    ) -> Result<bool, StoreError>;

    /// Substitute the account's referral code. The old code stops resolving
    /// atomically with the new one taking effect.
    async fn rotate_code(&self, account: AccountId, new_code: ReferralCode)
        -> Result<(), StoreError>;
}

/// Append-only referral click log.
#[async_trait]
pub trait ClickStore: Send + Sync {
    async fn append(&self, click: ReferralClick) -> Result<(), StoreError>;
}

/// Recorded orders and per-account earnings balances.
#[async_trait]
pub trait EarningsStore: Send + Sync {
    /// Record one order and apply its tier credits, atomically, if and only
    /// if no event for this `order_id` exists yet. Returns `false` (and
    /// applies nothing) for a replay.
    async fn record_order(
        &self,
        event: EarningsEvent,
        credits: &[TierCredit],
    ) -> Result<bool, StoreError>;

    async fn get_order(&self, order_id: &OrderId) -> Result<Option<EarningsEvent>, StoreError>;

    async fn balance(&self, account: AccountId, currency: &str) -> Result<i64, StoreError>;
}

/// Ads, their running counters, and the ad event log.
#[async_trait]
pub trait AdStore: Send + Sync {
    async fn insert(&self, ad: Ad) -> Result<(), StoreError>;

    async fn get(&self, id: AdId) -> Result<Option<Ad>, StoreError>;

    async fn active_for_placement(&self, placement: &str) -> Result<Vec<Ad>, StoreError>;

    /// Record `event` and bump the matching counter unless an event with the
    /// same `(ad_id, kind, ip)` was recorded within `window` of it. The
    /// window check, insert, and increment happen as one atomic operation.
    /// Returns `true` when the event was counted. Fails with
    /// [`StoreError::NotFound`] for an unknown ad.
    async fn record_event(&self, event: AdEvent, window: Duration) -> Result<bool, StoreError>;

    /// Record a click-through `event` unconditionally (no dedup) and bump
    /// the click counter.
    async fn record_click_through(&self, event: AdEvent) -> Result<(), StoreError>;
}
