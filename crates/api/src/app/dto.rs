//! Request/response DTOs and JSON mapping helpers.

use serde::{Deserialize, Serialize};

use referly_ads::Ad;
use referly_core::{AccountId, AdId};
use referly_referral::ReferrerSummary;

#[derive(Debug, Deserialize)]
pub struct AttachReferralRequest {
    pub user_id: AccountId,
    /// Code read from the client's durable store; the `referral_ref` cookie
    /// is the fallback when this is absent.
    #[serde(default)]
    pub ref_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AttachReferralResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<ReferrerDto>,
}

#[derive(Debug, Serialize)]
pub struct ReferrerDto {
    pub id: String,
    pub name: String,
}

impl From<ReferrerSummary> for ReferrerDto {
    fn from(summary: ReferrerSummary) -> Self {
        Self {
            id: summary.id.to_string(),
            name: summary.name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LogClickRequest {
    #[serde(rename = "ref")]
    pub ref_code: String,
}

#[derive(Debug, Deserialize)]
pub struct RotateCodeRequest {
    pub account_id: AccountId,
}

#[derive(Debug, Serialize)]
pub struct RotateCodeResponse {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct TrackAdRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "adId")]
    pub ad_id: AdId,
    pub placement: String,
}

#[derive(Debug, Deserialize)]
pub struct RedirectParams {
    pub ad: AdId,
}

#[derive(Debug, Deserialize)]
pub struct ActiveAdsParams {
    pub placement: String,
}

pub fn ad_to_json(ad: &Ad) -> serde_json::Value {
    serde_json::json!({
        "id": ad.id.to_string(),
        "title": ad.title,
        "placement": ad.placement,
        "target_url": ad.target_url,
        "start_date": ad.start_date,
        "end_date": ad.end_date,
        "impressions": ad.impressions,
        "clicks": ad.clicks,
    })
}
