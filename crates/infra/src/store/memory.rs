//! In-memory stores for tests and dev.
//!
//! Every conditional operation runs under a single lock acquisition, which
//! is what makes the check-and-act sections atomic here. Poisoned locks are
//! reported as unavailability rather than panicking through request handlers.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Duration;

use referly_ads::{Ad, AdEvent, AdEventKind};
use referly_core::{AccountId, AdId, ClickId};
use referly_earnings::{EarningsEvent, OrderId, TierCredit};
use referly_referral::{AccountProfile, ReferralClick, ReferralCode};

use super::{AdStore, ClickStore, EarningsStore, ProfileStore, StoreError};

fn poisoned() -> StoreError {
    StoreError::unavailable("store lock poisoned")
}

#[derive(Debug, Default)]
struct ProfileState {
    profiles: HashMap<AccountId, AccountProfile>,
    /// Secondary index: current code -> owner. Kept consistent with
    /// `profiles` under the same lock.
    codes: HashMap<String, AccountId>,
}

/// In-memory profile store.
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    state: RwLock<ProfileState>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn insert(&self, profile: AccountProfile) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let code = profile.referral_code.as_str().to_string();
        if state.codes.contains_key(&code) {
            return Err(StoreError::DuplicateCode);
        }
        state.codes.insert(code, profile.id);
        state.profiles.insert(profile.id, profile);
        Ok(())
    }

    async fn get(&self, id: AccountId) -> Result<Option<AccountProfile>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.profiles.get(&id).cloned())
    }

    async fn resolve_code(&self, code: &str) -> Result<Option<AccountProfile>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        let owner = match state.codes.get(code) {
            Some(owner) => *owner,
            None => return Ok(None),
        };
        Ok(state.profiles.get(&owner).cloned())
    }

    async fn attach_referrer(
        &self,
        account: AccountId,
        referrer: AccountId,
        click: Option<ClickId>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let profile = state.profiles.get_mut(&account).ok_or(StoreError::NotFound)?;
        if profile.referred_by.is_some() {
            return Ok(false);
        }
        profile.referred_by = Some(referrer);
        profile.referred_click = click;
        Ok(true)
    }

    async fn rotate_code(
        &self,
        account: AccountId,
        new_code: ReferralCode,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let new = new_code.as_str().to_string();
        if let Some(owner) = state.codes.get(&new) {
            if *owner != account {
                return Err(StoreError::DuplicateCode);
            }
        }
        let old = {
            let profile = state.profiles.get_mut(&account).ok_or(StoreError::NotFound)?;
            let old = profile.referral_code.as_str().to_string();
            profile.referral_code = new_code;
            old
        };
        state.codes.remove(&old);
        state.codes.insert(new, account);
        Ok(())
    }
}

/// In-memory append-only click log.
#[derive(Debug, Default)]
pub struct InMemoryClickStore {
    clicks: RwLock<Vec<ReferralClick>>,
}

impl InMemoryClickStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every logged click (test support).
    pub fn all(&self) -> Vec<ReferralClick> {
        self.clicks.read().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ClickStore for InMemoryClickStore {
    async fn append(&self, click: ReferralClick) -> Result<(), StoreError> {
        let mut clicks = self.clicks.write().map_err(|_| poisoned())?;
        clicks.push(click);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct EarningsState {
    orders: HashMap<OrderId, EarningsEvent>,
    balances: HashMap<(AccountId, String), i64>,
}

/// In-memory earnings ledger storage.
#[derive(Debug, Default)]
pub struct InMemoryEarningsStore {
    state: RwLock<EarningsState>,
}

impl InMemoryEarningsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded orders (test support).
    pub fn order_count(&self) -> usize {
        self.state.read().map(|s| s.orders.len()).unwrap_or(0)
    }
}

#[async_trait]
impl EarningsStore for InMemoryEarningsStore {
    async fn record_order(
        &self,
        event: EarningsEvent,
        credits: &[TierCredit],
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        if state.orders.contains_key(&event.order_id) {
            return Ok(false);
        }
        for credit in credits {
            *state
                .balances
                .entry((credit.account, credit.currency.clone()))
                .or_insert(0) += credit.amount;
        }
        state.orders.insert(event.order_id.clone(), event);
        Ok(true)
    }

    async fn get_order(&self, order_id: &OrderId) -> Result<Option<EarningsEvent>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.orders.get(order_id).cloned())
    }

    async fn balance(&self, account: AccountId, currency: &str) -> Result<i64, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state
            .balances
            .get(&(account, currency.to_string()))
            .copied()
            .unwrap_or(0))
    }
}

#[derive(Debug, Default)]
struct AdState {
    ads: HashMap<AdId, Ad>,
    events: Vec<AdEvent>,
}

/// In-memory ad store.
#[derive(Debug, Default)]
pub struct InMemoryAdStore {
    state: RwLock<AdState>,
}

impl InMemoryAdStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of logged events for one ad (test support).
    pub fn event_count(&self, ad_id: AdId, kind: AdEventKind) -> usize {
        self.state
            .read()
            .map(|s| {
                s.events
                    .iter()
                    .filter(|e| e.ad_id == ad_id && e.kind == kind)
                    .count()
            })
            .unwrap_or(0)
    }
}

impl AdState {
    fn bump(&mut self, ad_id: AdId, kind: AdEventKind) -> Result<(), StoreError> {
        let ad = self.ads.get_mut(&ad_id).ok_or(StoreError::NotFound)?;
        match kind {
            AdEventKind::Impression => ad.impressions += 1,
            AdEventKind::Click => ad.clicks += 1,
        }
        Ok(())
    }
}

#[async_trait]
impl AdStore for InMemoryAdStore {
    async fn insert(&self, ad: Ad) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        state.ads.insert(ad.id, ad);
        Ok(())
    }

    async fn get(&self, id: AdId) -> Result<Option<Ad>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.ads.get(&id).cloned())
    }

    async fn active_for_placement(&self, placement: &str) -> Result<Vec<Ad>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        let mut ads: Vec<Ad> = state
            .ads
            .values()
            .filter(|ad| ad.active && ad.placement == placement)
            .cloned()
            .collect();
        ads.sort_by_key(|ad| ad.created_at);
        Ok(ads)
    }

    async fn record_event(&self, event: AdEvent, window: Duration) -> Result<bool, StoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        if !state.ads.contains_key(&event.ad_id) {
            return Err(StoreError::NotFound);
        }
        let cutoff = event.created_at - window;
        let duplicate = state.events.iter().rev().any(|e| {
            e.ad_id == event.ad_id
                && e.kind == event.kind
                && e.ip == event.ip
                && e.created_at > cutoff
        });
        if duplicate {
            return Ok(false);
        }
        state.bump(event.ad_id, event.kind)?;
        state.events.push(event);
        Ok(true)
    }

    async fn record_click_through(&self, event: AdEvent) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        state.bump(event.ad_id, event.kind)?;
        state.events.push(event);
        Ok(())
    }
}
