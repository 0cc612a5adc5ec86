use core::str::FromStr;
use std::net::IpAddr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use referly_core::{AdId, DomainError};

/// Rolling window inside which repeated events from the same viewer for the
/// same ad collapse into one counted event.
pub fn dedup_window() -> Duration {
    Duration::minutes(30)
}

/// An advertisement placement slot entity.
///
/// `impressions` and `clicks` are monotonically non-decreasing running
/// counters, bumped by the storage layer together with each counted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ad {
    pub id: AdId,
    pub title: String,
    pub placement: String,
    /// Click-through destination. Ads without one render but cannot redirect.
    pub target_url: Option<String>,
    /// Validity window used by the selection policy; open-ended when absent.
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub active: bool,
    pub impressions: i64,
    pub clicks: i64,
    pub created_at: DateTime<Utc>,
}

impl Ad {
    /// Whether the validity window contains `day`.
    ///
    /// A missing bound is open on that side; an ad with neither bound is
    /// always in window.
    pub fn window_contains(&self, day: NaiveDate) -> bool {
        if let Some(start) = self.start_date {
            if day < start {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if day > end {
                return false;
            }
        }
        true
    }
}

/// Kind of a recorded ad interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdEventKind {
    Impression,
    Click,
}

impl AdEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdEventKind::Impression => "impression",
            AdEventKind::Click => "click",
        }
    }
}

impl core::fmt::Display for AdEventKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdEventKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "impression" => Ok(AdEventKind::Impression),
            "click" => Ok(AdEventKind::Click),
            other => Err(DomainError::validation(format!(
                "event type must be impression or click, got {other:?}"
            ))),
        }
    }
}

/// One observed ad interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdEvent {
    pub ad_id: AdId,
    pub kind: AdEventKind,
    pub ip: IpAddr,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub created_at: DateTime<Utc>,
}
