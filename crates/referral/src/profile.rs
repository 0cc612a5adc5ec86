use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use referly_core::{AccountId, ClickId};

use crate::code::ReferralCode;

/// Referral-relevant slice of an account.
///
/// `referred_by` is write-once: it starts out `None` at account creation and
/// is set at most once, by whichever attachment attempt wins the conditional
/// write at the storage layer. It is never overwritten or cleared afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountProfile {
    pub id: AccountId,
    pub display_name: String,
    pub referral_code: ReferralCode,
    pub referred_by: Option<AccountId>,
    /// The logged click the attachment was attributed to, when known.
    pub referred_click: Option<ClickId>,
    pub created_at: DateTime<Utc>,
}

impl AccountProfile {
    pub fn new(
        id: AccountId,
        display_name: impl Into<String>,
        referral_code: ReferralCode,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            referral_code,
            referred_by: None,
            referred_click: None,
            created_at,
        }
    }

    /// Whether an attachment attempt could still succeed for this account.
    pub fn attachable(&self) -> bool {
        self.referred_by.is_none()
    }

    pub fn referrer_summary(&self) -> ReferrerSummary {
        ReferrerSummary {
            id: self.id,
            name: self.display_name.clone(),
        }
    }
}

/// Minimal description of a referrer, fit for surfacing in a welcome message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferrerSummary {
    pub id: AccountId,
    pub name: String,
}

/// Result of one attachment attempt.
///
/// `attached: false` covers every no-op case (already attached, no stored
/// code, unresolved code, lost race) because the caller reacts the same way
/// to all of them: no welcome message, stored reference may still be cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachOutcome {
    pub attached: bool,
    pub referrer: Option<ReferrerSummary>,
}

impl AttachOutcome {
    pub fn skipped() -> Self {
        Self {
            attached: false,
            referrer: None,
        }
    }

    pub fn attached(referrer: ReferrerSummary) -> Self {
        Self {
            attached: true,
            referrer: Some(referrer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn profile() -> AccountProfile {
        AccountProfile::new(
            AccountId::new(),
            "Asha",
            ReferralCode::from_str("ABCDEFGH").unwrap(),
            Utc::now(),
        )
    }

    #[test]
    fn fresh_profile_is_attachable() {
        let p = profile();
        assert!(p.attachable());
        assert_eq!(p.referred_by, None);
        assert_eq!(p.referred_click, None);
    }

    #[test]
    fn attached_profile_is_not() {
        let mut p = profile();
        p.referred_by = Some(AccountId::new());
        assert!(!p.attachable());
    }
}
