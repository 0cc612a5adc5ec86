use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use referly_core::{AccountId, ClickId};

/// Append-only record of one referral-link visit.
///
/// `code` is kept as the raw string the visitor arrived with: unknown or
/// stale codes are still logged for the attribution audit trail, they just
/// don't resolve to a `referrer`. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralClick {
    pub id: ClickId,
    pub code: String,
    pub referrer: Option<AccountId>,
    pub ip: IpAddr,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ReferralClick {
    pub fn new(
        code: impl Into<String>,
        referrer: Option<AccountId>,
        ip: IpAddr,
        user_agent: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ClickId::new(),
            code: code.into(),
            referrer,
            ip,
            user_agent,
            created_at,
        }
    }
}
