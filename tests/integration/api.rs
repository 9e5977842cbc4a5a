//! API integration tests.
//!
//! These tests drive the schedule lifecycle through the HTTP router.

use crate::common::{request, send};

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use dca::api::{CorsSettings, WalletIdentity, build_router, create_api_state};
use dca::{DcaJobManager, InMemoryStorage, WalletAddress};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

fn create_router() -> Router {
    let manager = DcaJobManager::new(Arc::new(InMemoryStorage::new()));
    build_router(create_api_state(manager, None), &CorsSettings::default())
}

fn schedule_body(interval: &str) -> Value {
    json!({
        "purchaseIntervalHuman": interval,
        "vincentAppVersion": 12,
        "purchaseAmount": "50",
        "tokenOut": "WETH",
    })
}

async fn create_schedule(router: &Router, wallet: &str, interval: &str) -> Value {
    let (status, json) = send(
        router,
        request(Method::POST, "/schedule", Some(wallet), Some(schedule_body(interval))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    json["data"].clone()
}

/// Test: Health endpoint responds with status ok.
#[tokio::test]
async fn test_health_endpoint() {
    let router = create_router();

    let (status, json) = send(&router, request(Method::GET, "/health", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

/// Test: Create then list returns the wallet's single schedule.
#[tokio::test]
async fn test_create_and_list_schedule() {
    let router = create_router();
    let created = create_schedule(&router, "0xAB", "1 day").await;

    assert!(created["id"].is_string());
    assert_eq!(created["name"], "execute-dca-swap");
    assert_eq!(created["data"]["walletAddress"], "0xAB");
    assert_eq!(created["data"]["purchaseIntervalHuman"], "1 day");
    assert_eq!(created["data"]["purchaseAmount"], "50");
    assert_eq!(created["repeatInterval"], "1 day");
    assert_eq!(created["disabled"], false);

    let (status, json) = send(&router, request(Method::GET, "/schedules", Some("0xAB"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"].as_array().unwrap().len(), 1);
    assert_eq!(json["data"][0]["id"], created["id"]);
    assert_eq!(json["data"][0]["data"]["vincentAppVersion"], 12);
}

/// Test: A string version tag is stored and echoed back as a string.
#[tokio::test]
async fn test_string_app_version_round_trips() {
    let router = create_router();

    let (status, json) = send(
        &router,
        request(
            Method::POST,
            "/schedule",
            Some("0xAB"),
            Some(json!({ "purchaseIntervalHuman": "1 day", "vincentAppVersion": "3" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["data"]["data"]["vincentAppVersion"], "3");

    let (_, json) = send(&router, request(Method::GET, "/schedules", Some("0xAB"), None)).await;
    assert_eq!(json["data"][0]["data"]["vincentAppVersion"], "3");
}

/// Test: The caller's identity overrides any wallet address in the body.
#[tokio::test]
async fn test_body_wallet_address_is_overwritten() {
    let router = create_router();
    let mut body = schedule_body("1 day");
    body["walletAddress"] = json!("0xSOMEONE_ELSE");

    let (status, json) = send(&router, request(Method::POST, "/schedule", Some("0xAB"), Some(body))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["data"]["data"]["walletAddress"], "0xAB");

    let (status, _) = send(
        &router,
        request(Method::GET, "/schedules", Some("0xSOMEONE_ELSE"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// Test: Listing with no schedules is a 404 naming the wallet.
#[tokio::test]
async fn test_list_empty_is_not_found() {
    let router = create_router();

    let (status, json) = send(&router, request(Method::GET, "/schedules", Some("0xAB"), None)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "No DCA schedules found for wallet address 0xAB");
}

/// Test: Every schedule route requires a wallet identity.
#[tokio::test]
async fn test_missing_identity_is_bad_request() {
    let router = create_router();
    let requests = vec![
        request(Method::GET, "/schedules", None, None),
        request(Method::GET, "/purchases", None, None),
        request(Method::POST, "/schedule", None, Some(schedule_body("1 day"))),
        request(Method::PUT, "/schedules/abc", None, Some(schedule_body("1 day"))),
        request(Method::DELETE, "/schedules/abc", None, None),
        request(Method::PUT, "/schedules/abc/enable", None, None),
        request(Method::PUT, "/schedules/abc/disable", None, None),
        request(Method::GET, "/schedules", Some("   "), None),
    ];

    for req in requests {
        let (status, json) = send(&router, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "No wallet address provided");
    }
}

/// Test: An identity inserted by an upstream auth layer is honored.
#[tokio::test]
async fn test_identity_from_request_extension() {
    let router = create_router();
    create_schedule(&router, "0xAB", "1 day").await;

    let mut req = Request::builder()
        .uri("/schedules")
        .body(Body::empty())
        .unwrap();
    req.extensions_mut()
        .insert(WalletIdentity(WalletAddress::new("0xAB").unwrap()));

    let (status, json) = send(&router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"].as_array().unwrap().len(), 1);
}

/// Test: Malformed bodies are rejected with 400.
#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let router = create_router();

    let not_json = Request::builder()
        .method(Method::POST)
        .uri("/schedule")
        .header(dca::api::WALLET_ADDRESS_HEADER, "0xAB")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, json) = send(&router, not_json).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());

    let missing_interval = json!({ "vincentAppVersion": 1 });
    let (status, _) = send(
        &router,
        request(Method::POST, "/schedule", Some("0xAB"), Some(missing_interval)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

/// Test: An unparseable interval is a server error and nothing is stored.
#[tokio::test]
async fn test_invalid_interval_is_server_error() {
    let router = create_router();

    let (status, json) = send(
        &router,
        request(Method::POST, "/schedule", Some("0xAB"), Some(schedule_body("whenever"))),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["error"].as_str().unwrap().contains("whenever"));

    let (status, _) = send(&router, request(Method::GET, "/schedules", Some("0xAB"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// Test: A second schedule for the same wallet is rejected.
#[tokio::test]
async fn test_second_schedule_for_wallet_rejected() {
    let router = create_router();
    create_schedule(&router, "0xAB", "1 day").await;

    let (status, json) = send(
        &router,
        request(Method::POST, "/schedule", Some("0xAB"), Some(schedule_body("1 week"))),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["error"].as_str().unwrap().contains("0xAB"));
}

/// Test: Editing updates the interval and the audit timestamp.
#[tokio::test]
async fn test_edit_schedule() {
    let router = create_router();
    let created = create_schedule(&router, "0xAB", "1 day").await;
    let id = created["id"].as_str().unwrap();

    let (status, json) = send(
        &router,
        request(
            Method::PUT,
            &format!("/schedules/{}", id),
            Some("0xAB"),
            Some(json!({ "purchaseIntervalHuman": "12 hours", "vincentAppVersion": 12 })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    let edited = &json["data"];
    assert_eq!(edited["id"], id);
    assert_eq!(edited["repeatInterval"], "12 hours");
    assert_eq!(edited["data"]["purchaseIntervalHuman"], "12 hours");
    // Full replace: fields omitted from the edit are gone.
    assert!(edited["data"].get("purchaseAmount").is_none());

    let before: chrono::DateTime<chrono::Utc> =
        serde_json::from_value(created["data"]["updatedAt"].clone()).unwrap();
    let after: chrono::DateTime<chrono::Utc> =
        serde_json::from_value(edited["data"]["updatedAt"].clone()).unwrap();
    assert!(after > before);
}

/// Test: Editing another wallet's schedule is a 404.
#[tokio::test]
async fn test_edit_foreign_schedule_not_found() {
    let router = create_router();
    let created = create_schedule(&router, "0xAB", "1 day").await;
    let id = created["id"].as_str().unwrap();

    let (status, json) = send(
        &router,
        request(
            Method::PUT,
            &format!("/schedules/{}", id),
            Some("0xCD"),
            Some(schedule_body("1 week")),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], format!("No DCA schedule found with ID {}", id));
}

/// Test: Disable and enable toggle the schedule.
#[tokio::test]
async fn test_disable_and_enable_schedule() {
    let router = create_router();
    let created = create_schedule(&router, "0xAB", "1 day").await;
    let id = created["id"].as_str().unwrap();

    let (status, json) = send(
        &router,
        request(Method::PUT, &format!("/schedules/{}/disable", id), Some("0xAB"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["disabled"], true);

    // Disabling twice still succeeds.
    let (status, _) = send(
        &router,
        request(Method::PUT, &format!("/schedules/{}/disable", id), Some("0xAB"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(
        &router,
        request(Method::PUT, &format!("/schedules/{}/enable", id), Some("0xAB"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["disabled"], false);
}

/// Test: Disable and enable of unknown schedules are 404s.
#[tokio::test]
async fn test_toggle_unknown_schedule_not_found() {
    let router = create_router();

    let (status, json) = send(
        &router,
        request(Method::PUT, "/schedules/missing/disable", Some("0xAB"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "Job not found");

    let (status, json) = send(
        &router,
        request(Method::PUT, "/schedules/missing/enable", Some("0xAB"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "No DCA schedule found with ID missing");
}

/// Test: Deleting removes the schedule; a foreign delete removes nothing.
#[tokio::test]
async fn test_delete_schedule() {
    let router = create_router();
    let created = create_schedule(&router, "0xAB", "1 day").await;
    let id = created["id"].as_str().unwrap();

    let (status, json) = send(
        &router,
        request(Method::DELETE, &format!("/schedules/{}", id), Some("0xCD"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["deleted"], 0);

    let (status, json) = send(
        &router,
        request(Method::DELETE, &format!("/schedules/{}", id), Some("0xAB"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["deleted"], 1);

    let (status, _) = send(&router, request(Method::GET, "/schedules", Some("0xAB"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &router,
        request(Method::PUT, &format!("/schedules/{}/disable", id), Some("0xAB"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// Test: Purchase history starts empty.
#[tokio::test]
async fn test_purchases_empty() {
    let router = create_router();

    let (status, json) = send(
        &router,
        request(Method::GET, "/purchases?limit=5", Some("0xAB"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"], json!([]));
}

/// Test: CORS allows the configured domain and rejects others.
#[tokio::test]
async fn test_cors_preflight() {
    let manager = DcaJobManager::new(Arc::new(InMemoryStorage::new()));
    let cors = CorsSettings {
        allowed_domain: Some("dca.example.com".to_string()),
        development: false,
    };
    let router = build_router(create_api_state(manager, None), &cors);

    let preflight = |origin: &str| {
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/schedules")
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
            .body(Body::empty())
            .unwrap()
    };

    let response = router
        .clone()
        .oneshot(preflight("https://dca.example.com"))
        .await
        .unwrap();
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "https://dca.example.com"
    );

    let response = router
        .oneshot(preflight("https://evil.example.com"))
        .await
        .unwrap();
    assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}
