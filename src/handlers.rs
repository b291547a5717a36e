use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::account::NewAccount;
use crate::error::KeygateError;
use crate::health::HealthChecker;
use crate::key_generator::KeyGenerator;
use crate::metrics::MetricsCollector;
use crate::response::{
    AccountResponse, KeyMetricsResponse, MetricsResponse, ReadinessResponse, UsageCountResponse,
};
use crate::service::RateLimitedService;
use crate::validation::RequestValidator;

/// Shared application state
pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub service: RateLimitedService,
    pub health: HealthChecker,
    pub metrics: MetricsCollector,
    /// Guards the request-counter endpoints; they are not mounted without it.
    pub request_secret: Option<String>,
}

impl AppState {
    fn require_request_secret(&self, headers: &HeaderMap) -> Result<(), KeygateError> {
        let expected = self
            .request_secret
            .as_deref()
            .ok_or(KeygateError::NotAuthorized)?;
        RequestValidator::validate_secret(&KeyGenerator::extract_api_key(headers), expected)
    }
}

/// `204` when the caller's key may proceed.
pub async fn authorize(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<StatusCode, KeygateError> {
    let key = KeyGenerator::extract_api_key(&headers);
    state.service.authorize(&key).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `204` when the caller's key belongs to an admin and may proceed.
pub async fn authorize_admin(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<StatusCode, KeygateError> {
    let key = KeyGenerator::extract_api_key(&headers);
    state.service.authorize_admin(&key).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_account(
    State(state): State<SharedState>,
    Path(account_key): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, KeygateError> {
    RequestValidator::validate_key(&account_key)?;

    let caller = KeyGenerator::extract_api_key(&headers);
    let account = state.service.get_account(&caller, &account_key).await?;

    Ok(Json(AccountResponse::current(account)))
}

pub async fn create_account(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(payload): Json<NewAccount>,
) -> Result<impl IntoResponse, KeygateError> {
    RequestValidator::validate_key(&payload.key)?;

    let caller = KeyGenerator::extract_api_key(&headers);
    let account = state.service.create_account(&caller, payload).await?;

    Ok((StatusCode::CREATED, Json(AccountResponse::created(account))))
}

pub async fn delete_account(
    State(state): State<SharedState>,
    Path(account_key): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, KeygateError> {
    RequestValidator::validate_key(&account_key)?;

    let caller = KeyGenerator::extract_api_key(&headers);
    state.service.delete_account(&caller, &account_key).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Usage recorded for `key` over the configured window.
pub async fn get_usage_count(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, KeygateError> {
    state.require_request_secret(&headers)?;
    RequestValidator::validate_key(&key)?;

    let count = state.service.usage_count(&key).await?;
    Ok(Json(UsageCountResponse::new(key, count, state.service.window())))
}

pub async fn record_usage(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, KeygateError> {
    state.require_request_secret(&headers)?;
    RequestValidator::validate_key(&key)?;

    state.service.record_usage(&key).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Health check endpoint
pub async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    let health = state.health.check_health().await;
    let status = if health.status == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(health))
}

/// Readiness check endpoint
pub async fn readiness_check(State(state): State<SharedState>) -> impl IntoResponse {
    let ready = state.health.is_ready().await;
    let body = ReadinessResponse::new(ready, state.service.gate().mode(), state.service.window());
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(body))
}

pub async fn metrics_report(State(state): State<SharedState>) -> impl IntoResponse {
    Json(MetricsResponse {
        metrics: state.metrics.snapshot().await,
    })
}

/// Decision counters for one account. Admin only.
pub async fn key_metrics_report(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, KeygateError> {
    RequestValidator::validate_key(&key)?;

    let caller = KeyGenerator::extract_api_key(&headers);
    let metrics = state.service.key_metrics(&caller, &key).await?;

    Ok(Json(KeyMetricsResponse { key, metrics }))
}
