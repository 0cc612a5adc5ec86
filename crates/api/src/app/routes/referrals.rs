use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chrono::Utc;

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::ClientContext;

/// Cookie carrying the redundant copy of the captured referral code. The
/// client writes it with the same 90-day lifetime as its durable store.
pub const REFERRAL_COOKIE: &str = "referral_ref";

pub fn router() -> Router {
    Router::new()
        .route("/attach", post(attach))
        .route("/click", post(log_click))
        .route("/rotate", post(rotate))
}

/// Attach the stored referral code to an account. Safe to call any number
/// of times; only the first resolvable call attaches.
pub async fn attach(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Json(body): Json<dto::AttachReferralRequest>,
) -> axum::response::Response {
    // Body first (the client's durable store), cookie as the degraded
    // fallback when that store was cleared.
    let stored = body
        .ref_code
        .clone()
        .filter(|code| !code.trim().is_empty())
        .or_else(|| cookie_value(&headers, REFERRAL_COOKIE));

    match services
        .attachment
        .attach(body.user_id, stored.as_deref(), None)
        .await
    {
        Ok(outcome) => (
            StatusCode::OK,
            Json(dto::AttachReferralResponse {
                success: outcome.attached,
                referrer: outcome.referrer.map(Into::into),
            }),
        )
            .into_response(),
        // User-facing path: storage trouble degrades to "not attached"
        // instead of an error; the welcome message just doesn't appear.
        Err(err) => {
            tracing::warn!(user = %body.user_id, error = %err, "referral attachment failed");
            (
                StatusCode::OK,
                Json(dto::AttachReferralResponse {
                    success: false,
                    referrer: None,
                }),
            )
                .into_response()
        }
    }
}

/// Log a raw referral click. Recording is dispatched without awaiting; this
/// endpoint never blocks or fails on storage.
pub async fn log_click(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(client): Extension<ClientContext>,
    Json(body): Json<dto::LogClickRequest>,
) -> axum::response::Response {
    let recorder = services.click_recorder.clone();
    let user_agent = client.user_agent().map(|ua| ua.to_string());
    let ip = client.ip();

    tokio::spawn(async move {
        if let Err(err) = recorder
            .record(&body.ref_code, ip, user_agent, Utc::now())
            .await
        {
            tracing::warn!(error = %err, "referral click logging failed");
        }
    });

    (StatusCode::OK, Json(serde_json::json!({ "success": true }))).into_response()
}

/// Issue a fresh referral code, invalidating the old one.
pub async fn rotate(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::RotateCodeRequest>,
) -> axum::response::Response {
    match services.attachment.rotate(body.account_id).await {
        Ok(code) => (
            StatusCode::OK,
            Json(dto::RotateCodeResponse {
                code: code.as_str().to_string(),
            }),
        )
            .into_response(),
        Err(err) => errors::attachment_error_to_response(err),
    }
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        if key.trim() == name {
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        } else {
            None
        }
    })
}
