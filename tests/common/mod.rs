//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use dca::{Job, JobFilter, JobStore, ScheduleId};
use http_body_util::BodyExt;
use serde_json::Value;
use std::time::Duration;
use tower::ServiceExt;

/// Build a request, optionally carrying a wallet identity and a JSON body.
pub fn request(method: Method, uri: &str, wallet: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(wallet) = wallet {
        builder = builder.header(dca::api::WALLET_ADDRESS_HEADER, wallet);
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Send a request through the router and decode the JSON response.
pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

/// Wait until a stored job satisfies `done`, polling the store.
///
/// # Panics
///
/// Panics if the timeout is reached first.
pub async fn wait_for_job<S: JobStore>(
    store: &S,
    id: &ScheduleId,
    timeout: Duration,
    done: impl Fn(&Job) -> bool,
) -> Job {
    let start = tokio::time::Instant::now();
    loop {
        let jobs = store.query(&JobFilter::by_id(id.clone())).await.unwrap();
        if let Some(job) = jobs.into_iter().next() {
            if done(&job) {
                return job;
            }
        }
        if start.elapsed() > timeout {
            panic!("Timeout waiting for job {}", id);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
