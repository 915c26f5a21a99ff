use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::responses::ApiResponse;
use super::AppState;
use crate::collector::ServiceHandle;
use crate::errors::{AppError, AppResult, WebError};
use crate::models::{
    ServiceErrorEntry, ServicePhase, ServiceSpec, ServiceSummary, StartAt, StoreSnapshot,
};
use crate::utils::sanitize_name;

/// Body of `POST /api/v1/services`. Fields left out fall back to the
/// configured service of the same name.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StartServiceRequest {
    pub name: String,
    pub index: Option<String>,
    pub runtime: Option<u64>,
    pub refresh: Option<u64>,
    pub rerun: Option<bool>,
    pub scheduled: Option<bool>,
    pub start_at: Option<StartAt>,
}

impl StartServiceRequest {
    /// Overlay this request onto `base`, or onto an empty spec when the
    /// service is not configured.
    pub fn into_spec(self, base: Option<&ServiceSpec>) -> ServiceSpec {
        let mut spec = match base {
            Some(base) => base.clone(),
            None => ServiceSpec::new(self.name.clone(), sanitize_name(&self.name), 0, 0),
        };

        if let Some(index) = self.index {
            spec.index = index;
        }
        if let Some(runtime) = self.runtime {
            spec.runtime_secs = runtime;
        }
        if let Some(refresh) = self.refresh {
            spec.refresh_secs = refresh;
        }
        if let Some(rerun) = self.rerun {
            spec.rerun = rerun;
        }
        if let Some(scheduled) = self.scheduled {
            spec.scheduled = scheduled;
        }
        if let Some(start_at) = self.start_at {
            spec.start_at = Some(start_at);
        }
        spec
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartServiceResponse {
    pub id: Uuid,
    pub name: String,
    pub sanitized_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeResponse {
    pub id: Uuid,
    pub name: String,
    pub phase: ServicePhase,
    pub registered_at: DateTime<Utc>,
    pub elapsed_seconds: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub id: Uuid,
    pub name: String,
    pub cancelled: bool,
}

/// Find a running service by UUID or by (sanitized) name.
async fn resolve_service(state: &AppState, key: &str) -> AppResult<Arc<ServiceHandle>> {
    let found = match Uuid::parse_str(key) {
        Ok(id) => state.registry.get(id).await,
        Err(_) => state.registry.find_by_name(key).await,
    };
    found.ok_or_else(|| AppError::not_found("service", key))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "services": state.registry.len().await,
        "timestamp": Utc::now(),
    }))
}

pub async fn list_services(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<Vec<ServiceSummary>>>> {
    let mut summaries = Vec::new();
    for handle in state.registry.list().await {
        summaries.push(handle.summary().await);
    }
    summaries.sort_by(|a, b| {
        a.registered_at
            .cmp(&b.registered_at)
            .then_with(|| a.sanitized_name.cmp(&b.sanitized_name))
    });

    Ok(Json(ApiResponse::success(summaries)))
}

pub async fn get_service(
    Path(key): Path<String>,
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<ServiceSummary>>> {
    let handle = resolve_service(&state, &key).await?;
    Ok(Json(ApiResponse::success(handle.summary().await)))
}

pub async fn service_runtime(
    Path(key): Path<String>,
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<RuntimeResponse>>> {
    let handle = resolve_service(&state, &key).await?;

    Ok(Json(ApiResponse::success(RuntimeResponse {
        id: handle.id(),
        name: handle.name().to_string(),
        phase: handle.phase().await,
        registered_at: handle.registered_at(),
        elapsed_seconds: handle.elapsed_seconds(),
    })))
}

pub async fn service_errors(
    Path(key): Path<String>,
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<Vec<ServiceErrorEntry>>>> {
    let handle = resolve_service(&state, &key).await?;
    let errors = handle.store().read().await.errors().to_vec();
    Ok(Json(ApiResponse::success(errors)))
}

pub async fn service_store(
    Path(key): Path<String>,
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<StoreSnapshot>>> {
    let handle = resolve_service(&state, &key).await?;
    Ok(Json(ApiResponse::success(handle.store_snapshot().await)))
}

pub async fn cancel_service(
    Path(key): Path<String>,
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<CancelResponse>>> {
    let handle = resolve_service(&state, &key).await?;
    handle.cancel();
    info!(
        service = %handle.sanitized_name(),
        id = %handle.id(),
        "Cancellation requested via API"
    );

    Ok(Json(ApiResponse::success(CancelResponse {
        id: handle.id(),
        name: handle.name().to_string(),
        cancelled: true,
    })))
}

pub async fn start_service(
    State(state): State<AppState>,
    Json(request): Json<StartServiceRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<StartServiceResponse>>)> {
    if request.name.trim().is_empty() {
        return Err(WebError::invalid_request("name", "service name must not be empty").into());
    }

    let worker = state.workers.resolve(&request.name)?;
    let base = state.config.service(&request.name).cloned();
    let spec = request.into_spec(base.as_ref());
    let running = state.scheduler.start(spec.clone(), worker).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success(StartServiceResponse {
            id: running.id,
            sanitized_name: spec.sanitized_name(),
            name: spec.name,
        })),
    ))
}

pub async fn list_workers(State(state): State<AppState>) -> Json<ApiResponse<Vec<String>>> {
    Json(ApiResponse::success(state.workers.names()))
}
