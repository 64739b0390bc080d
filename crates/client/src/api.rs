//! Transport layer for the synchronization client. The server is reached
//! over HTTP; everything above this module talks to the [`RequestApi`] trait
//! so tests can script the far side.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use cabincall_core::domain::actor::{Actor, Role};
use cabincall_core::domain::message::ChatMessage;
use cabincall_core::domain::request::{
    Category, NewRequest, Priority, RequestFilter, RequestId, RequestPatch, RequestStatus,
    ServiceRequest, SortField, SortOrder,
};
use cabincall_core::domain::stats::RequestStats;

/// Client-side failure taxonomy. `Transport` covers network and timeout
/// failures: transient, retryable by user action, never retried
/// automatically.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("authentication required")]
    Unauthenticated,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found")]
    NotFound,
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("unexpected server response: {0}")]
    Unexpected(u16),
}

impl ApiError {
    /// Read failures degrade gracefully; write failures are surfaced to the
    /// initiating action. Both paths want a short operator-facing string.
    pub fn indicator(&self) -> String {
        self.to_string()
    }
}

#[async_trait]
pub trait RequestApi: Send + Sync {
    async fn create_request(&self, input: NewRequest) -> Result<ServiceRequest, ApiError>;
    async fn list_requests(&self, filter: &RequestFilter)
        -> Result<Vec<ServiceRequest>, ApiError>;
    async fn get_request(&self, id: &RequestId) -> Result<ServiceRequest, ApiError>;
    async fn update_request(
        &self,
        id: &RequestId,
        patch: RequestPatch,
    ) -> Result<ServiceRequest, ApiError>;
    async fn delete_request(&self, id: &RequestId) -> Result<(), ApiError>;
    async fn send_message(&self, id: &RequestId, body: &str) -> Result<ChatMessage, ApiError>;
    async fn stats(&self) -> Result<RequestStats, ApiError>;
}

/// HTTP binding of [`RequestApi`] against the cabincall server. Actor
/// identity travels as headers issued by the upstream auth layer.
pub struct HttpRequestApi {
    base_url: String,
    actor: Actor,
    http: reqwest::Client,
}

impl HttpRequestApi {
    pub fn from_config(
        base_url: impl Into<String>,
        actor: Actor,
        sync: &cabincall_core::config::SyncConfig,
    ) -> Self {
        Self::new(base_url, actor, Duration::from_secs(sync.request_timeout_secs))
    }

    pub fn new(base_url: impl Into<String>, actor: Actor, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { base_url: base_url.into(), actor, http }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }

    fn with_identity(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("x-actor-id", &self.actor.id.0)
            .header("x-actor-role", role_param(self.actor.role))
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|error| ApiError::Transport(error.to_string()));
        }
        Err(error_for_status(status.as_u16(), response).await)
    }
}

async fn error_for_status(status: u16, response: reqwest::Response) -> ApiError {
    let message = response
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|body| body.get("error").and_then(|v| v.as_str()).map(str::to_string))
        .unwrap_or_else(|| format!("http status {status}"));

    match status {
        400 => ApiError::Validation(message),
        401 => ApiError::Unauthenticated,
        403 => ApiError::Forbidden(message),
        404 => ApiError::NotFound,
        other => ApiError::Unexpected(other),
    }
}

fn transport(error: reqwest::Error) -> ApiError {
    ApiError::Transport(error.to_string())
}

#[async_trait]
impl RequestApi for HttpRequestApi {
    async fn create_request(&self, input: NewRequest) -> Result<ServiceRequest, ApiError> {
        let response = self
            .with_identity(self.http.post(self.url("/api/v1/requests")))
            .json(&input)
            .send()
            .await
            .map_err(transport)?;
        Self::decode(response).await
    }

    async fn list_requests(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<ServiceRequest>, ApiError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(status) = filter.status {
            query.push(("status", status_param(status).to_string()));
        }
        if let Some(category) = filter.category {
            query.push(("category", category_param(category).to_string()));
        }
        if let Some(priority) = filter.priority {
            query.push(("priority", priority_param(priority).to_string()));
        }
        query.push(("sortBy", sort_field_param(filter.sort_by).to_string()));
        query.push(("sortOrder", sort_order_param(filter.sort_order).to_string()));

        let response = self
            .with_identity(self.http.get(self.url("/api/v1/requests")))
            .query(&query)
            .send()
            .await
            .map_err(transport)?;
        Self::decode(response).await
    }

    async fn get_request(&self, id: &RequestId) -> Result<ServiceRequest, ApiError> {
        let response = self
            .with_identity(self.http.get(self.url(&format!("/api/v1/requests/{}", id.0))))
            .send()
            .await
            .map_err(transport)?;
        Self::decode(response).await
    }

    async fn update_request(
        &self,
        id: &RequestId,
        patch: RequestPatch,
    ) -> Result<ServiceRequest, ApiError> {
        let response = self
            .with_identity(self.http.put(self.url(&format!("/api/v1/requests/{}", id.0))))
            .json(&patch)
            .send()
            .await
            .map_err(transport)?;
        Self::decode(response).await
    }

    async fn delete_request(&self, id: &RequestId) -> Result<(), ApiError> {
        let response = self
            .with_identity(self.http.delete(self.url(&format!("/api/v1/requests/{}", id.0))))
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(error_for_status(status.as_u16(), response).await)
        }
    }

    async fn send_message(&self, id: &RequestId, body: &str) -> Result<ChatMessage, ApiError> {
        let response = self
            .with_identity(
                self.http.post(self.url(&format!("/api/v1/requests/{}/messages", id.0))),
            )
            .json(&serde_json::json!({ "message": body }))
            .send()
            .await
            .map_err(transport)?;
        Self::decode(response).await
    }

    async fn stats(&self) -> Result<RequestStats, ApiError> {
        let response = self
            .with_identity(self.http.get(self.url("/api/v1/requests/stats")))
            .send()
            .await
            .map_err(transport)?;
        Self::decode(response).await
    }
}

fn role_param(role: Role) -> &'static str {
    match role {
        Role::Passenger => "passenger",
        Role::Crew => "crew",
        Role::Admin => "admin",
    }
}

fn status_param(status: RequestStatus) -> &'static str {
    match status {
        RequestStatus::New => "new",
        RequestStatus::Acknowledged => "acknowledged",
        RequestStatus::InProgress => "in_progress",
        RequestStatus::Resolved => "resolved",
        RequestStatus::Cancelled => "cancelled",
    }
}

fn category_param(category: Category) -> &'static str {
    match category {
        Category::Medical => "medical",
        Category::Comfort => "comfort",
        Category::Security => "security",
        Category::Snacks => "snacks",
        Category::Drinks => "drinks",
        Category::General => "general",
    }
}

fn priority_param(priority: Priority) -> &'static str {
    match priority {
        Priority::Low => "low",
        Priority::Medium => "medium",
        Priority::High => "high",
        Priority::Urgent => "urgent",
    }
}

fn sort_field_param(field: SortField) -> &'static str {
    match field {
        SortField::CreatedAt => "createdAt",
        SortField::UpdatedAt => "updatedAt",
        SortField::Priority => "priority",
    }
}

fn sort_order_param(order: SortOrder) -> &'static str {
    match order {
        SortOrder::Asc => "asc",
        SortOrder::Desc => "desc",
    }
}
