use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chrono::Utc;

use crate::app::errors;
use crate::app::services::AppServices;

/// Header the payment provider writes its hex HMAC-SHA256 signature to.
pub const SIGNATURE_HEADER: &str = "x-signature";

pub fn router() -> Router {
    Router::new().route("/checkout", post(checkout))
}

/// Payment-provider notification endpoint.
///
/// Answers 200 for anything handled or deliberately ignored (including
/// replays), 400 for signature/payload rejections the provider must not
/// retry, and 500 for storage trouble so that it does.
pub async fn checkout(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
    else {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_signature",
            "missing signature header",
        );
    };

    match services
        .ledger
        .handle_notification(&body, signature, Utc::now())
        .await
    {
        Ok(outcome) => {
            tracing::debug!(?outcome, "checkout notification handled");
            (StatusCode::OK, Json(serde_json::json!({ "ok": true }))).into_response()
        }
        Err(err) => errors::ledger_error_to_response(err),
    }
}
