use async_trait::async_trait;
use thiserror::Error;

use cabincall_core::domain::actor::ActorId;
use cabincall_core::domain::message::ChatMessage;
use cabincall_core::domain::request::{RequestFilter, RequestId, ServiceRequest};
use cabincall_core::domain::stats::RequestStats;

pub mod memory;
pub mod request;

pub use memory::InMemoryRequestRepository;
pub use request::SqlRequestRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Persistence contract for the request store. `scope` on [`list`] narrows
/// results to one submitter; the store passes it for passenger callers.
#[async_trait]
pub trait RequestRepository: Send + Sync {
    async fn insert(&self, request: &ServiceRequest) -> Result<(), RepositoryError>;

    /// Hydrates the full aggregate including its chat thread.
    async fn find_by_id(&self, id: &RequestId)
        -> Result<Option<ServiceRequest>, RepositoryError>;

    async fn list(
        &self,
        filter: &RequestFilter,
        scope: Option<&ActorId>,
    ) -> Result<Vec<ServiceRequest>, RepositoryError>;

    /// Overwrites the scalar columns of an existing request. The chat thread
    /// is append-only and only ever grows through [`append_message`].
    async fn update(&self, request: &ServiceRequest) -> Result<(), RepositoryError>;

    async fn delete(&self, id: &RequestId) -> Result<bool, RepositoryError>;

    async fn append_message(
        &self,
        id: &RequestId,
        message: &ChatMessage,
    ) -> Result<(), RepositoryError>;

    async fn stats(&self) -> Result<RequestStats, RepositoryError>;
}
