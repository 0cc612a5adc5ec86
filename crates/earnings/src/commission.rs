use serde::{Deserialize, Serialize};

use referly_core::{AccountId, DomainError};

/// A commission rate expressed in basis points (1/100th of a percent).
///
/// Rates are externally configured; the domain only validates that a single
/// rate cannot exceed the whole amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BasisPoints(u32);

impl BasisPoints {
    pub const MAX: u32 = 10_000;

    pub fn new(bps: u32) -> Result<Self, DomainError> {
        if bps > Self::MAX {
            return Err(DomainError::validation(format!(
                "commission rate {bps} exceeds {} basis points",
                Self::MAX
            )));
        }
        Ok(Self(bps))
    }

    pub fn get(&self) -> u32 {
        self.0
    }

    /// Apply this rate to `amount` minor units, rounding down.
    pub fn apply(&self, amount: i64) -> i64 {
        // i128 keeps the multiplication exact for any i64 amount.
        ((amount as i128 * self.0 as i128) / Self::MAX as i128) as i64
    }
}

/// Which referral tier a credit belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommissionTier {
    /// The buyer's direct referrer.
    Tier1,
    /// The referrer of the buyer's referrer.
    Tier2,
}

/// One credit owed to one account for one recorded order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCredit {
    pub account: AccountId,
    pub tier: CommissionTier,
    /// Amount in minor units, same currency as the order.
    pub amount: i64,
    pub currency: String,
}

/// Configured tier-1/tier-2 commission rates.
///
/// The exact percentages are deployment configuration, resolved at startup;
/// nothing in the domain assumes particular values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionSchedule {
    pub tier1: BasisPoints,
    pub tier2: BasisPoints,
}

impl CommissionSchedule {
    pub fn new(tier1: BasisPoints, tier2: BasisPoints) -> Self {
        Self { tier1, tier2 }
    }

    fn rate(&self, tier: CommissionTier) -> BasisPoints {
        match tier {
            CommissionTier::Tier1 => self.tier1,
            CommissionTier::Tier2 => self.tier2,
        }
    }

    /// Derive the credits for one order given the (possibly partial)
    /// referral chain above the buyer.
    ///
    /// Zero-amount credits are dropped: they would only clutter balances
    /// with no-op rows.
    pub fn credits_for(
        &self,
        gross_amount: i64,
        currency: &str,
        tier1: Option<AccountId>,
        tier2: Option<AccountId>,
    ) -> Vec<TierCredit> {
        let chain = [
            (CommissionTier::Tier1, tier1),
            (CommissionTier::Tier2, tier2),
        ];

        chain
            .into_iter()
            .filter_map(|(tier, account)| {
                let account = account?;
                let amount = self.rate(tier).apply(gross_amount);
                if amount == 0 {
                    return None;
                }
                Some(TierCredit {
                    account,
                    tier,
                    amount,
                    currency: currency.to_string(),
                })
            })
            .collect()
    }
}
