use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use referly_core::{AccountId, DomainError};

/// Payment-provider-issued order identifier.
///
/// Opaque and globally unique per purchase; the at-most-once key for
/// earnings recording. We never mint these ourselves.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for OrderId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DomainError::validation("order id must not be empty"));
        }
        Ok(Self(s.to_string()))
    }
}

/// One completed purchase, as recorded in the earnings ledger.
///
/// Immutable once created; at most one exists per `order_id` regardless of
/// how many times the triggering notification is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarningsEvent {
    pub order_id: OrderId,
    pub buyer: AccountId,
    /// Gross amount in minor units (e.g. pence for `"gbp"`).
    pub gross_amount: i64,
    /// Lowercase ISO currency code, as delivered by the provider.
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

impl EarningsEvent {
    pub fn new(
        order_id: OrderId,
        buyer: AccountId,
        gross_amount: i64,
        currency: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if gross_amount < 0 {
            return Err(DomainError::validation("gross amount must not be negative"));
        }
        let currency = currency.into().to_lowercase();
        if currency.is_empty() {
            return Err(DomainError::validation("currency must not be empty"));
        }
        Ok(Self {
            order_id,
            buyer,
            gross_amount,
            currency,
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_id_rejects_empty() {
        assert!("".parse::<OrderId>().is_err());
        assert!("   ".parse::<OrderId>().is_err());
        assert_eq!("ord_1".parse::<OrderId>().unwrap().as_str(), "ord_1");
    }

    #[test]
    fn event_normalizes_currency() {
        let ev = EarningsEvent::new(
            "ord_1".parse().unwrap(),
            AccountId::new(),
            5000,
            "GBP",
            Utc::now(),
        )
        .unwrap();
        assert_eq!(ev.currency, "gbp");
    }

    #[test]
    fn event_rejects_negative_amount() {
        let err = EarningsEvent::new(
            "ord_1".parse().unwrap(),
            AccountId::new(),
            -1,
            "gbp",
            Utc::now(),
        );
        assert!(err.is_err());
    }
}
