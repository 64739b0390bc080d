//! JSON API for the request lifecycle and messaging subsystem.
//!
//! Endpoints (all JSON, camelCase bodies):
//! - `POST   /api/v1/requests`                — create a request
//! - `GET    /api/v1/requests`                — list, filtered and sorted
//! - `GET    /api/v1/requests/stats`          — crew aggregate counts
//! - `GET    /api/v1/requests/{id}`           — fetch one request
//! - `PUT    /api/v1/requests/{id}`           — partial update per role rules
//! - `DELETE /api/v1/requests/{id}`           — delete
//! - `POST   /api/v1/requests/{id}/messages`  — append a chat message
//!
//! Identity arrives from the upstream auth layer as `x-actor-id` and
//! `x-actor-role` headers; missing or malformed headers map to 401.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::info;

use cabincall_core::domain::actor::{Actor, Role};
use cabincall_core::domain::request::{
    NewRequest, RequestFilter, RequestId, RequestPatch, ServiceRequest,
};
use cabincall_core::domain::stats::RequestStats;
use cabincall_core::{ChatMessage, ServiceError};
use cabincall_db::store::StoreError;
use cabincall_db::{RequestStore, SqlRequestRepository};

#[derive(Clone)]
pub struct ApiState {
    store: Arc<RequestStore<SqlRequestRepository>>,
}

pub fn router(store: RequestStore<SqlRequestRepository>) -> Router {
    Router::new()
        .route("/api/v1/requests", post(create_request))
        .route("/api/v1/requests", get(list_requests))
        .route("/api/v1/requests/stats", get(request_stats))
        .route("/api/v1/requests/{id}", get(get_request))
        .route("/api/v1/requests/{id}", put(update_request))
        .route("/api/v1/requests/{id}", delete(delete_request))
        .route("/api/v1/requests/{id}/messages", post(append_message))
        .layer(CorsLayer::permissive())
        .with_state(ApiState { store: Arc::new(store) })
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn unauthenticated() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: "authentication required".to_string(),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(error: ServiceError) -> Self {
        let status = match &error {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
        };
        Self { status, message: error.to_string() }
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Service(service) => service.into(),
            StoreError::Repository(repository) => {
                tracing::error!(
                    event_name = "api.persistence_failure",
                    error = %repository,
                    "request store persistence failure"
                );
                Self {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    message: "persistence temporarily unavailable".to_string(),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Actor extraction
// ---------------------------------------------------------------------------

pub struct AuthenticatedActor(pub Actor);

impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedActor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get("x-actor-id")
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(ApiError::unauthenticated)?;

        let role = parts
            .headers
            .get("x-actor-role")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<Role>().ok())
            .ok_or_else(ApiError::unauthenticated)?;

        Ok(Self(Actor::new(id, role)))
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub status: Option<String>,
    pub category: Option<String>,
    pub priority: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl ListQuery {
    fn into_filter(self) -> Result<RequestFilter, ServiceError> {
        let mut filter = RequestFilter::default();
        if let Some(status) = self.status.as_deref().filter(|s| !s.is_empty()) {
            filter.status = Some(status.parse()?);
        }
        if let Some(category) = self.category.as_deref().filter(|s| !s.is_empty()) {
            filter.category = Some(category.parse()?);
        }
        if let Some(priority) = self.priority.as_deref().filter(|s| !s.is_empty()) {
            filter.priority = Some(priority.parse()?);
        }
        if let Some(sort_by) = self.sort_by.as_deref().filter(|s| !s.is_empty()) {
            filter.sort_by = sort_by.parse()?;
        }
        if let Some(sort_order) = self.sort_order.as_deref().filter(|s| !s.is_empty()) {
            filter.sort_order = sort_order.parse()?;
        }
        Ok(filter)
    }
}

#[derive(Debug, Deserialize)]
pub struct MessageBody {
    pub message: String,
}

async fn create_request(
    State(state): State<ApiState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Json(body): Json<NewRequest>,
) -> Result<(StatusCode, Json<ServiceRequest>), ApiError> {
    let request = state.store.create(&actor, body).await?;
    info!(
        event_name = "api.request.created",
        request_id = %request.id.0,
        actor_id = %actor.id.0,
        "request created via api"
    );
    Ok((StatusCode::CREATED, Json(request)))
}

async fn list_requests(
    State(state): State<ApiState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ServiceRequest>>, ApiError> {
    let filter = query.into_filter()?;
    let requests = state.store.list(&actor, &filter).await?;
    Ok(Json(requests))
}

async fn get_request(
    State(state): State<ApiState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(id): Path<String>,
) -> Result<Json<ServiceRequest>, ApiError> {
    let request = state.store.get(&actor, &RequestId(id)).await?;
    Ok(Json(request))
}

async fn update_request(
    State(state): State<ApiState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(id): Path<String>,
    Json(patch): Json<RequestPatch>,
) -> Result<Json<ServiceRequest>, ApiError> {
    let request = state.store.update(&actor, &RequestId(id), patch).await?;
    Ok(Json(request))
}

async fn delete_request(
    State(state): State<ApiState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.delete(&actor, &RequestId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn append_message(
    State(state): State<ApiState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(id): Path<String>,
    Json(body): Json<MessageBody>,
) -> Result<Json<ChatMessage>, ApiError> {
    let message = state.store.append_message(&actor, &RequestId(id), &body.message).await?;
    Ok(Json(message))
}

async fn request_stats(
    State(state): State<ApiState>,
    AuthenticatedActor(actor): AuthenticatedActor,
) -> Result<Json<RequestStats>, ApiError> {
    let stats = state.store.stats(&actor).await?;
    Ok(Json(stats))
}
