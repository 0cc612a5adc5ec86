//! Earnings domain module (orders, commission schedule, tier credits).
//!
//! Pure computation only: given a verified purchase and the configured
//! commission schedule, derive the per-tier credits. The at-most-once
//! recording of an order (and the atomic application of its credits) is a
//! storage-layer concern handled in `referly-infra`.

pub mod commission;
pub mod event;

pub use commission::{BasisPoints, CommissionSchedule, CommissionTier, TierCredit};
pub use event::{EarningsEvent, OrderId};
