use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use referly_ads::AdEventKind;
use referly_infra::{AdStore, ViewerMeta};

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::ClientContext;

pub fn router() -> Router {
    Router::new()
        .route("/track", post(track))
        .route("/redirect", get(redirect))
        .route("/active", get(active))
}

fn viewer_meta(client: &ClientContext) -> ViewerMeta {
    ViewerMeta {
        ip: client.ip(),
        user_agent: client.user_agent().map(|ua| ua.to_string()),
        referrer: client.referrer().map(|r| r.to_string()),
    }
}

/// Record an impression or click observed by the client. Replays inside the
/// dedup window (and events for unknown ads) answer ok without counting.
pub async fn track(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(client): Extension<ClientContext>,
    Json(body): Json<dto::TrackAdRequest>,
) -> axum::response::Response {
    let kind: AdEventKind = match body.kind.parse() {
        Ok(kind) => kind,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string())
        }
    };

    match services
        .ad_events
        .record(body.ad_id, kind, viewer_meta(&client), Utc::now())
        .await
    {
        Ok(counted) => {
            tracing::debug!(ad = %body.ad_id, %kind, placement = %body.placement, counted, "ad event");
            (StatusCode::OK, Json(serde_json::json!({ "ok": true }))).into_response()
        }
        // Counter paths surface storage failures so the client can retry.
        Err(err) => errors::store_error_to_response(err),
    }
}

/// Click-through: always counts, then forwards to the ad's target.
pub async fn redirect(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(client): Extension<ClientContext>,
    Query(params): Query<dto::RedirectParams>,
) -> axum::response::Response {
    match services
        .ad_events
        .redirect(params.ad, viewer_meta(&client), Utc::now())
        .await
    {
        Ok(target) => Redirect::temporary(&target).into_response(),
        Err(err) => errors::redirect_error_to_response(err),
    }
}

/// Active ads for a placement; the client applies the selection policy.
pub async fn active(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<dto::ActiveAdsParams>,
) -> axum::response::Response {
    match services.ads.active_for_placement(&params.placement).await {
        Ok(ads) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "ads": ads.iter().map(dto::ad_to_json).collect::<Vec<_>>(),
            })),
        )
            .into_response(),
        Err(err) => errors::store_error_to_response(err),
    }
}
