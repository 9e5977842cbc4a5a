//! API request handlers.

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::core::job::{DcaJobInput, Job};
use crate::core::types::ScheduleId;
use crate::manager::{DcaJobManager, ScheduleOptions};
use crate::scheduler::DispatcherHandle;
use crate::storage::{JobStore, PurchaseRecord};

use super::errors::ApiError;
use super::identity::WalletIdentity;
use super::responses::{ApiResponse, CancelResponse, Created, HealthResponse};

/// Shared application state for API handlers.
pub struct ApiState<S: JobStore> {
    pub manager: DcaJobManager<S>,
    pub dispatcher: Option<DispatcherHandle>,
}

impl<S: JobStore> Clone for ApiState<S> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
            dispatcher: self.dispatcher.clone(),
        }
    }
}

/// Query parameters for the purchases endpoint.
#[derive(Debug, Deserialize)]
pub struct ListPurchasesQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

const MAX_PURCHASES: usize = 100;

/// Merge the caller's identity into a request body and parse it.
fn job_input(mut body: Map<String, Value>, identity: &WalletIdentity) -> Result<DcaJobInput, ApiError> {
    body.insert(
        "walletAddress".to_string(),
        Value::String(identity.0.to_string()),
    );
    serde_json::from_value(Value::Object(body))
        .map_err(|e| ApiError::BadRequest(format!("Invalid schedule: {}", e)))
}

/// Health check endpoint.
pub async fn health<S: JobStore + 'static>(State(state): State<ApiState<S>>) -> Json<HealthResponse> {
    let dispatcher = match &state.dispatcher {
        Some(handle) => Some(handle.state().await),
        None => None,
    };
    Json(HealthResponse::new(dispatcher))
}

/// List the caller's purchase history, newest first.
pub async fn list_purchases<S: JobStore + 'static>(
    State(state): State<ApiState<S>>,
    identity: WalletIdentity,
    query: Result<Query<ListPurchasesQuery>, QueryRejection>,
) -> Result<ApiResponse<Vec<PurchaseRecord>>, ApiError> {
    let Query(query) = query?;
    let purchases = state
        .manager
        .list_purchases(&identity.0, query.limit.min(MAX_PURCHASES))
        .await?;
    Ok(ApiResponse::ok(purchases))
}

/// List the caller's schedules.
pub async fn list_schedules<S: JobStore + 'static>(
    State(state): State<ApiState<S>>,
    identity: WalletIdentity,
) -> Result<ApiResponse<Vec<Job>>, ApiError> {
    let jobs = state.manager.list_jobs_by_wallet_address(&identity.0).await?;
    if jobs.is_empty() {
        return Err(ApiError::NotFound(format!(
            "No DCA schedules found for wallet address {}",
            identity.0
        )));
    }
    Ok(ApiResponse::ok(jobs))
}

/// Create the caller's schedule, repeating on `purchaseIntervalHuman`.
pub async fn create_schedule<S: JobStore + 'static>(
    State(state): State<ApiState<S>>,
    identity: WalletIdentity,
    body: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<Created<Job>, ApiError> {
    let Json(body) = body?;
    let input = job_input(body, &identity)?;
    let interval = input.purchase_interval_human.clone();

    let job = state
        .manager
        .create_job(input, ScheduleOptions::Interval(interval))
        .await?;
    Ok(Created(job))
}

/// Replace the data of one of the caller's schedules.
pub async fn edit_schedule<S: JobStore + 'static>(
    State(state): State<ApiState<S>>,
    identity: WalletIdentity,
    schedule_id: Result<Path<String>, PathRejection>,
    body: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<Created<Job>, ApiError> {
    let Path(schedule_id) = schedule_id?;
    let Json(body) = body?;
    let input = job_input(body, &identity)?;

    let job = state
        .manager
        .edit_job(&ScheduleId::from(schedule_id), input)
        .await?;
    Ok(Created(job))
}

/// Delete one of the caller's schedules.
pub async fn delete_schedule<S: JobStore + 'static>(
    State(state): State<ApiState<S>>,
    identity: WalletIdentity,
    schedule_id: Result<Path<String>, PathRejection>,
) -> Result<ApiResponse<CancelResponse>, ApiError> {
    let Path(schedule_id) = schedule_id?;
    let deleted = state
        .manager
        .cancel_job(&ScheduleId::from(schedule_id), &identity.0)
        .await?;
    Ok(ApiResponse::ok(CancelResponse { deleted }))
}

/// Enable one of the caller's schedules.
pub async fn enable_schedule<S: JobStore + 'static>(
    State(state): State<ApiState<S>>,
    identity: WalletIdentity,
    schedule_id: Result<Path<String>, PathRejection>,
) -> Result<ApiResponse<Job>, ApiError> {
    let Path(schedule_id) = schedule_id?;
    let job = state
        .manager
        .enable_job(&ScheduleId::from(schedule_id), &identity.0)
        .await?;
    Ok(ApiResponse::ok(job))
}

/// Disable one of the caller's schedules.
pub async fn disable_schedule<S: JobStore + 'static>(
    State(state): State<ApiState<S>>,
    identity: WalletIdentity,
    schedule_id: Result<Path<String>, PathRejection>,
) -> Result<ApiResponse<Job>, ApiError> {
    let Path(schedule_id) = schedule_id?;
    state
        .manager
        .disable_job(&ScheduleId::from(schedule_id), &identity.0)
        .await?
        .map(ApiResponse::ok)
        .ok_or_else(|| ApiError::NotFound("Job not found".to_string()))
}
