//! Idempotent linking of a stored referral code to an account, plus code
//! issuance and rotation against the same directory.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use referly_core::{AccountId, ClickId};
use referly_referral::{AccountProfile, AttachOutcome, ReferralCode};

use crate::store::{ProfileStore, StoreError};

/// How many fresh codes to try before giving up on a collision streak.
/// With an 8-character code over a 32-character alphabet, hitting this in
/// practice means the directory itself is broken.
const CODE_ALLOCATION_ATTEMPTS: usize = 5;

#[derive(Debug, Error)]
pub enum AttachmentError {
    /// No profile exists for the given account.
    #[error("unknown account")]
    UnknownAccount,

    /// Could not allocate a collision-free referral code.
    #[error("could not allocate a unique referral code")]
    CodeAllocation,

    /// The backing store failed; safe to retry.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Service behind the attach/rotate referral operations.
///
/// Stateless per request; the write-once guarantee comes from the store's
/// conditional write, not from anything held here.
pub struct ReferralAttachmentService {
    profiles: Arc<dyn ProfileStore>,
}

impl ReferralAttachmentService {
    pub fn new(profiles: Arc<dyn ProfileStore>) -> Self {
        Self { profiles }
    }

    /// Account-creation hook: mint a profile with a unique referral code and
    /// `referred_by` unset.
    pub async fn issue_profile(
        &self,
        account: AccountId,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> Result<AccountProfile, AttachmentError> {
        for _ in 0..CODE_ALLOCATION_ATTEMPTS {
            // Fresh rng handle per attempt: ThreadRng must not live across
            // the await below.
            let code = ReferralCode::generate(&mut rand::thread_rng());
            let profile = AccountProfile::new(account, display_name, code, now);
            match self.profiles.insert(profile.clone()).await {
                Ok(()) => return Ok(profile),
                Err(StoreError::DuplicateCode) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(AttachmentError::CodeAllocation)
    }

    /// Attach the stored referral code to `account`, at most once ever.
    ///
    /// Every no-op path (already attached, nothing stored, unresolved or
    /// self-referential code, lost race) reports `attached: false`; only
    /// storage trouble is an error, and that error is retriable.
    pub async fn attach(
        &self,
        account: AccountId,
        stored_code: Option<&str>,
        click: Option<ClickId>,
    ) -> Result<AttachOutcome, AttachmentError> {
        let Some(profile) = self.profiles.get(account).await? else {
            tracing::debug!(%account, "attach requested for unknown account");
            return Ok(AttachOutcome::skipped());
        };
        if !profile.attachable() {
            return Ok(AttachOutcome::skipped());
        }

        let Some(raw_code) = stored_code else {
            return Ok(AttachOutcome::skipped());
        };

        let Some(referrer) = self.profiles.resolve_code(raw_code.trim()).await? else {
            tracing::debug!(%account, code = raw_code, "stored referral code did not resolve");
            return Ok(AttachOutcome::skipped());
        };
        if referrer.id == account {
            tracing::debug!(%account, "ignoring self-referral");
            return Ok(AttachOutcome::skipped());
        }

        let won = match self
            .profiles
            .attach_referrer(account, referrer.id, click)
            .await
        {
            Ok(won) => won,
            // The profile vanished between the read and the write; nothing
            // to attach to.
            Err(StoreError::NotFound) => false,
            Err(err) => return Err(err.into()),
        };

        if won {
            tracing::info!(%account, referrer = %referrer.id, "referral attached");
            Ok(AttachOutcome::attached(referrer.referrer_summary()))
        } else {
            Ok(AttachOutcome::skipped())
        }
    }

    /// Issue a fresh referral code for `account`, atomically invalidating
    /// the old one for future lookups.
    pub async fn rotate(&self, account: AccountId) -> Result<ReferralCode, AttachmentError> {
        for _ in 0..CODE_ALLOCATION_ATTEMPTS {
            let code = ReferralCode::generate(&mut rand::thread_rng());
            match self.profiles.rotate_code(account, code.clone()).await {
                Ok(()) => {
                    tracing::info!(%account, "referral code rotated");
                    return Ok(code);
                }
                Err(StoreError::DuplicateCode) => continue,
                Err(StoreError::NotFound) => return Err(AttachmentError::UnknownAccount),
                Err(err) => return Err(err.into()),
            }
        }
        Err(AttachmentError::CodeAllocation)
    }
}
