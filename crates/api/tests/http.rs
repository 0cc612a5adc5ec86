//! HTTP surface tests: signature verification, idempotent endpoints, and
//! response mapping, driven through the real router.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use tower::ServiceExt;

use referly_ads::Ad;
use referly_core::{AccountId, AdId};
use referly_earnings::{BasisPoints, CommissionSchedule};
use referly_infra::store::{
    AdStore, EarningsStore, InMemoryAdStore, InMemoryClickStore, InMemoryEarningsStore,
    InMemoryProfileStore, ProfileStore,
};
use referly_referral::AccountProfile;

use referly_api::app::services::{ApiConfig, AppServices};
use referly_api::app::{build_app, routes::webhooks::SIGNATURE_HEADER};

const SECRET: &str = "whsec_test123secret456";

struct TestApp {
    app: Router,
    services: Arc<AppServices>,
    profiles: Arc<InMemoryProfileStore>,
    earnings: Arc<InMemoryEarningsStore>,
    ads: Arc<InMemoryAdStore>,
    clicks: Arc<InMemoryClickStore>,
}

fn test_app() -> TestApp {
    let profiles = Arc::new(InMemoryProfileStore::new());
    let earnings = Arc::new(InMemoryEarningsStore::new());
    let ads = Arc::new(InMemoryAdStore::new());
    let clicks = Arc::new(InMemoryClickStore::new());

    let config = ApiConfig {
        webhook_secret: SECRET.to_string(),
        schedule: CommissionSchedule::new(
            BasisPoints::new(1000).unwrap(),
            BasisPoints::new(500).unwrap(),
        ),
    };
    let services = Arc::new(AppServices::with_stores(
        config,
        profiles.clone(),
        clicks.clone(),
        earnings.clone(),
        ads.clone(),
    ));

    TestApp {
        app: build_app(services.clone()),
        services,
        profiles,
        earnings,
        ads,
        clicks,
    }
}

fn sign(payload: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

async fn issue(app: &TestApp, name: &str) -> AccountProfile {
    app.services
        .attachment
        .issue_profile(AccountId::new(), name, Utc::now())
        .await
        .unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

async fn response_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_answers_ok() {
    let t = test_app();
    let response = t
        .app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn attach_succeeds_once_then_reports_false() {
    let t = test_app();
    let referrer = issue(&t, "Rae").await;
    let newcomer = issue(&t, "Newcomer").await;

    let body = json!({
        "user_id": newcomer.id,
        "ref_code": referrer.referral_code.as_str(),
    });

    let response = t
        .app
        .clone()
        .oneshot(post_json("/referrals/attach", body.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let payload = response_json(response).await;
    assert_eq!(payload["success"], json!(true));
    assert_eq!(payload["referrer"]["name"], json!("Rae"));

    let response = t
        .app
        .clone()
        .oneshot(post_json("/referrals/attach", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let payload = response_json(response).await;
    assert_eq!(payload["success"], json!(false));
    assert!(payload.get("referrer").is_none());

    let stored = t.profiles.get(newcomer.id).await.unwrap().unwrap();
    assert_eq!(stored.referred_by, Some(referrer.id));
}

#[tokio::test]
async fn attach_falls_back_to_the_cookie() {
    let t = test_app();
    let referrer = issue(&t, "Rae").await;
    let newcomer = issue(&t, "Newcomer").await;

    let request = Request::builder()
        .method("POST")
        .uri("/referrals/attach")
        .header("content-type", "application/json")
        .header(
            "cookie",
            format!("theme=dark; referral_ref={}", referrer.referral_code.as_str()),
        )
        .body(Body::from(
            serde_json::to_vec(&json!({ "user_id": newcomer.id })).unwrap(),
        ))
        .unwrap();

    let response = t.app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let payload = response_json(response).await;
    assert_eq!(payload["success"], json!(true));
}

#[tokio::test]
async fn attach_with_unknown_code_answers_success_false() {
    let t = test_app();
    let newcomer = issue(&t, "Newcomer").await;

    let response = t
        .app
        .oneshot(post_json(
            "/referrals/attach",
            json!({ "user_id": newcomer.id, "ref_code": "ZZZZZZZZ" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let payload = response_json(response).await;
    assert_eq!(payload["success"], json!(false));
}

#[tokio::test]
async fn click_endpoint_answers_immediately_and_logs() {
    let t = test_app();
    let referrer = issue(&t, "Rae").await;

    let response = t
        .app
        .oneshot(post_json(
            "/referrals/click",
            json!({ "ref": referrer.referral_code.as_str() }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let payload = response_json(response).await;
    assert_eq!(payload["success"], json!(true));

    // Recording happens on a detached task; give it a beat.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let logged = t.clicks.all();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].referrer, Some(referrer.id));
}

#[tokio::test]
async fn rotate_invalidates_the_old_code() {
    let t = test_app();
    let account = issue(&t, "Rotator").await;
    let old_code = account.referral_code.as_str().to_string();

    let response = t
        .app
        .clone()
        .oneshot(post_json(
            "/referrals/rotate",
            json!({ "account_id": account.id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let payload = response_json(response).await;
    let new_code = payload["code"].as_str().unwrap().to_string();
    assert_ne!(new_code, old_code);

    assert!(t.profiles.resolve_code(&old_code).await.unwrap().is_none());
    assert!(t.profiles.resolve_code(&new_code).await.unwrap().is_some());

    // Unknown accounts are a 404, not a silent success.
    let response = t
        .app
        .oneshot(post_json(
            "/referrals/rotate",
            json!({ "account_id": AccountId::new() }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

fn checkout_request(body: &serde_json::Value, signature: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhooks/checkout")
        .header("content-type", "application/json")
        .header(SIGNATURE_HEADER, signature)
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

#[tokio::test]
async fn checkout_webhook_records_once_across_redeliveries() {
    let t = test_app();
    let referrer = issue(&t, "Rae").await;
    let buyer = issue(&t, "Buyer").await;

    let body = json!({
        "event_type": "checkout.completed",
        "order_id": "ord_1",
        "buyer_account_id": buyer.id,
        "referral_code": referrer.referral_code.as_str(),
        "gross_amount": 5000,
        "currency": "gbp",
    });
    let signature = sign(&serde_json::to_vec(&body).unwrap());

    for _ in 0..3 {
        let response = t
            .app
            .clone()
            .oneshot(checkout_request(&body, &signature))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(t.earnings.order_count(), 1);
    assert_eq!(t.earnings.balance(referrer.id, "gbp").await.unwrap(), 500);

    let stored = t.profiles.get(buyer.id).await.unwrap().unwrap();
    assert_eq!(stored.referred_by, Some(referrer.id));
}

#[tokio::test]
async fn checkout_webhook_rejects_bad_signatures() {
    let t = test_app();
    let buyer = issue(&t, "Buyer").await;

    let body = json!({
        "event_type": "checkout.completed",
        "order_id": "ord_2",
        "buyer_account_id": buyer.id,
        "gross_amount": 5000,
        "currency": "gbp",
    });

    // Wrong secret.
    let mut mac = Hmac::<Sha256>::new_from_slice(b"wrong-secret").unwrap();
    mac.update(&serde_json::to_vec(&body).unwrap());
    let bad_signature = hex::encode(mac.finalize().into_bytes());

    let response = t
        .app
        .clone()
        .oneshot(checkout_request(&body, &bad_signature))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Missing header entirely.
    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/checkout")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(t.earnings.order_count(), 0);
}

#[tokio::test]
async fn checkout_webhook_ignores_other_event_types() {
    let t = test_app();
    let body = json!({ "event_type": "subscription.renewed" });
    let signature = sign(&serde_json::to_vec(&body).unwrap());

    let response = t
        .app
        .oneshot(checkout_request(&body, &signature))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(t.earnings.order_count(), 0);
}

async fn seed_ad(t: &TestApp, target: Option<&str>) -> Ad {
    let ad = Ad {
        id: AdId::new(),
        title: "banner".to_string(),
        placement: "sidebar".to_string(),
        target_url: target.map(|t| t.to_string()),
        start_date: None,
        end_date: None,
        active: true,
        impressions: 0,
        clicks: 0,
        created_at: Utc::now(),
    };
    t.ads.insert(ad.clone()).await.unwrap();
    ad
}

#[tokio::test]
async fn track_deduplicates_same_viewer_within_window() {
    let t = test_app();
    let ad = seed_ad(&t, None).await;

    let body = json!({
        "type": "impression",
        "adId": ad.id,
        "placement": "sidebar",
    });

    // Same (ad, kind, ip) twice; the second is suppressed but still ok.
    for _ in 0..2 {
        let response = t
            .app
            .clone()
            .oneshot(post_json("/ads/track", body.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let payload = response_json(response).await;
        assert_eq!(payload["ok"], json!(true));
    }

    let stored = t.ads.get(ad.id).await.unwrap().unwrap();
    assert_eq!(stored.impressions, 1);
}

#[tokio::test]
async fn track_rejects_unknown_event_types_and_tolerates_unknown_ads() {
    let t = test_app();

    let response = t
        .app
        .clone()
        .oneshot(post_json(
            "/ads/track",
            json!({ "type": "hover", "adId": AdId::new(), "placement": "sidebar" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = t
        .app
        .oneshot(post_json(
            "/ads/track",
            json!({ "type": "impression", "adId": AdId::new(), "placement": "sidebar" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn redirect_forwards_and_counts_every_click() {
    let t = test_app();
    let ad = seed_ad(&t, Some("https://example.com/landing")).await;

    for _ in 0..2 {
        let response = t
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/ads/redirect?ad={}", ad.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            response.headers().get("location").unwrap(),
            "https://example.com/landing"
        );
    }

    let stored = t.ads.get(ad.id).await.unwrap().unwrap();
    assert_eq!(stored.clicks, 2);
}

#[tokio::test]
async fn redirect_answers_404_for_unknown_or_targetless_ads() {
    let t = test_app();
    let targetless = seed_ad(&t, None).await;

    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/ads/redirect?ad={}", AdId::new()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = t
        .app
        .oneshot(
            Request::builder()
                .uri(format!("/ads/redirect?ad={}", targetless.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn active_ads_lists_only_the_placement() {
    let t = test_app();
    let ad = seed_ad(&t, None).await;

    let response = t
        .app
        .oneshot(
            Request::builder()
                .uri("/ads/active?placement=sidebar")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let payload = response_json(response).await;
    let ads = payload["ads"].as_array().unwrap();
    assert_eq!(ads.len(), 1);
    assert_eq!(ads[0]["id"], json!(ad.id.to_string()));
}
