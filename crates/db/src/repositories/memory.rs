use std::collections::HashMap;

use tokio::sync::RwLock;

use cabincall_core::domain::actor::ActorId;
use cabincall_core::domain::message::ChatMessage;
use cabincall_core::domain::request::{
    Category, Priority, RequestFilter, RequestId, RequestStatus, ServiceRequest, SortField,
    SortOrder,
};
use cabincall_core::domain::stats::{CountBucket, RequestStats};

use super::{RepositoryError, RequestRepository};

/// Test-support repository with the same observable behavior as the SQL
/// implementation, minus durability.
#[derive(Default)]
pub struct InMemoryRequestRepository {
    requests: RwLock<HashMap<String, ServiceRequest>>,
}

#[async_trait::async_trait]
impl RequestRepository for InMemoryRequestRepository {
    async fn insert(&self, request: &ServiceRequest) -> Result<(), RepositoryError> {
        let mut requests = self.requests.write().await;
        requests.insert(request.id.0.clone(), request.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &RequestId,
    ) -> Result<Option<ServiceRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn list(
        &self,
        filter: &RequestFilter,
        scope: Option<&ActorId>,
    ) -> Result<Vec<ServiceRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        let mut matched: Vec<ServiceRequest> = requests
            .values()
            .filter(|request| {
                filter.status.map_or(true, |status| request.status == status)
                    && filter.category.map_or(true, |category| request.category == category)
                    && filter.priority.map_or(true, |priority| request.priority == priority)
                    && scope.map_or(true, |submitter| &request.submitter_id == submitter)
            })
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            let ordering = match filter.sort_by {
                SortField::CreatedAt => a.created_at.cmp(&b.created_at),
                SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                SortField::Priority => a.priority.cmp(&b.priority),
            };
            match filter.sort_order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        Ok(matched)
    }

    async fn update(&self, request: &ServiceRequest) -> Result<(), RepositoryError> {
        let mut requests = self.requests.write().await;
        if let Some(stored) = requests.get_mut(&request.id.0) {
            // Scalar overwrite; the stored thread is authoritative.
            let thread = std::mem::take(&mut stored.chat_messages);
            *stored = request.clone();
            stored.chat_messages = thread;
        }
        Ok(())
    }

    async fn delete(&self, id: &RequestId) -> Result<bool, RepositoryError> {
        let mut requests = self.requests.write().await;
        Ok(requests.remove(&id.0).is_some())
    }

    async fn append_message(
        &self,
        id: &RequestId,
        message: &ChatMessage,
    ) -> Result<(), RepositoryError> {
        let mut requests = self.requests.write().await;
        if let Some(stored) = requests.get_mut(&id.0) {
            stored.chat_messages.push(message.clone());
            stored.updated_at = message.timestamp;
        }
        Ok(())
    }

    async fn stats(&self) -> Result<RequestStats, RepositoryError> {
        let requests = self.requests.read().await;
        let all: Vec<&ServiceRequest> = requests.values().collect();

        let count_by = |bucket: &dyn Fn(&ServiceRequest) -> bool| -> i64 {
            all.iter().filter(|request| bucket(request)).count() as i64
        };

        Ok(RequestStats {
            total: all.len() as i64,
            by_status: RequestStatus::ALL
                .iter()
                .map(|status| CountBucket {
                    key: status.label().to_string(),
                    count: count_by(&|request| request.status == *status),
                })
                .collect(),
            by_category: Category::ALL
                .iter()
                .map(|category| CountBucket {
                    key: category.label().to_string(),
                    count: count_by(&|request| request.category == *category),
                })
                .collect(),
            by_priority: Priority::ALL
                .iter()
                .map(|priority| CountBucket {
                    key: priority.label().to_string(),
                    count: count_by(&|request| request.priority == *priority),
                })
                .collect(),
        })
    }
}
