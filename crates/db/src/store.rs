//! The request store: single source of truth for request state. Every
//! mutation routes through here so policy checks, status-machine side
//! effects, and timestamp derivation cannot be bypassed by a transport.

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use cabincall_core::domain::actor::Actor;
use cabincall_core::domain::message::{ChatMessage, SenderRole};
use cabincall_core::domain::request::{
    NewRequest, RequestFilter, RequestId, RequestPatch, ServiceRequest,
};
use cabincall_core::domain::stats::RequestStats;
use cabincall_core::{policy, ServiceError};

use crate::repositories::{RepositoryError, RequestRepository};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("persistence failure: {0}")]
    Repository(#[from] RepositoryError),
}

pub struct RequestStore<R> {
    repo: R,
}

impl<R: RequestRepository> RequestStore<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub async fn create(
        &self,
        actor: &Actor,
        input: NewRequest,
    ) -> Result<ServiceRequest, StoreError> {
        policy::ensure_can_create(actor)?;
        input.validate()?;

        let request =
            input.into_request(RequestId(Uuid::new_v4().to_string()), actor, Utc::now());
        self.repo.insert(&request).await?;

        info!(
            event_name = "store.request.created",
            request_id = %request.id.0,
            actor_id = %actor.id.0,
            category = request.category.label(),
            "request created"
        );
        Ok(request)
    }

    pub async fn get(&self, actor: &Actor, id: &RequestId) -> Result<ServiceRequest, StoreError> {
        let mut request = self.fetch(id).await?;
        policy::ensure_can_read(actor, &request)?;
        hydrate_legacy_fields(&mut request);
        Ok(request)
    }

    /// Lists requests visible to the caller. Passengers are implicitly scoped
    /// to their own submissions regardless of the filter.
    pub async fn list(
        &self,
        actor: &Actor,
        filter: &RequestFilter,
    ) -> Result<Vec<ServiceRequest>, StoreError> {
        let scope = (!actor.role.is_privileged()).then_some(&actor.id);
        let mut requests = self.repo.list(filter, scope).await?;
        for request in &mut requests {
            hydrate_legacy_fields(request);
        }
        Ok(requests)
    }

    pub async fn update(
        &self,
        actor: &Actor,
        id: &RequestId,
        patch: RequestPatch,
    ) -> Result<ServiceRequest, StoreError> {
        let mut request = self.fetch(id).await?;
        policy::ensure_can_update(actor, &request)?;

        let (patch, dropped) = policy::sanitize_patch(actor.role, patch);
        if !dropped.is_empty() {
            warn!(
                event_name = "store.request.patch_fields_dropped",
                request_id = %request.id.0,
                actor_id = %actor.id.0,
                dropped = ?dropped,
                "unprivileged patch carried restricted fields"
            );
        }
        patch.validate()?;

        // A patch with nothing left to apply (including one emptied by
        // sanitization) is a no-op: no write, no updated_at bump.
        if patch.is_empty() {
            return Ok(request);
        }

        let now = Utc::now();
        if let Some(title) = patch.title {
            request.title = title.trim().to_string();
        }
        if let Some(description) = patch.description {
            request.description = Some(description);
        }
        if let Some(priority) = patch.priority {
            request.priority = priority;
        }
        if let Some(location) = patch.location {
            request.location = Some(location);
        }
        if let Some(items) = patch.items {
            request.items = Some(items);
        }
        if let Some(notes) = patch.notes {
            request.notes = Some(notes);
        }
        if let Some(assigned_to) = patch.assigned_to {
            request.assigned_to = Some(assigned_to);
        }
        if let Some(status) = patch.status {
            let transition = request.apply_status(status, now);
            if transition.off_graph {
                warn!(
                    event_name = "store.request.status_off_graph",
                    request_id = %request.id.0,
                    actor_id = %actor.id.0,
                    from = transition.from.label(),
                    to = transition.to.label(),
                    "status overwrite outside the normal lifecycle"
                );
            }
            if transition.first_resolution {
                info!(
                    event_name = "store.request.resolved",
                    request_id = %request.id.0,
                    actor_id = %actor.id.0,
                    "request resolved for the first time"
                );
            }
        }
        request.updated_at = now;

        self.repo.update(&request).await?;
        Ok(request)
    }

    pub async fn delete(&self, actor: &Actor, id: &RequestId) -> Result<(), StoreError> {
        let request = self.fetch(id).await?;
        policy::ensure_can_delete(actor, &request)?;

        self.repo.delete(id).await?;
        info!(
            event_name = "store.request.deleted",
            request_id = %id.0,
            actor_id = %actor.id.0,
            "request deleted"
        );
        Ok(())
    }

    /// Appends one chat message and returns it (not the full thread), so the
    /// caller can merge it optimistically into its own view.
    pub async fn append_message(
        &self,
        actor: &Actor,
        id: &RequestId,
        body: &str,
    ) -> Result<ChatMessage, StoreError> {
        let mut request = self.fetch(id).await?;
        policy::ensure_can_message(actor, &request)?;

        let message = request.append_message(
            SenderRole::from(actor.role),
            actor.id.clone(),
            body,
            Utc::now(),
        )?;
        self.repo.append_message(id, &message).await?;

        info!(
            event_name = "store.message.appended",
            request_id = %id.0,
            actor_id = %actor.id.0,
            thread_len = request.chat_messages.len(),
            "chat message appended"
        );
        Ok(message)
    }

    pub async fn stats(&self, actor: &Actor) -> Result<RequestStats, StoreError> {
        policy::ensure_can_view_stats(actor)?;
        Ok(self.repo.stats().await?)
    }

    async fn fetch(&self, id: &RequestId) -> Result<ServiceRequest, StoreError> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| StoreError::Service(ServiceError::not_found("request")))
    }
}

/// Compatibility shim for rows persisted before `items`/`notes` became real
/// columns: those encoded both into the description as
/// `items: water, pretzels; notes: no ice`. Parsed on read only; the stored
/// description is left untouched.
fn hydrate_legacy_fields(request: &mut ServiceRequest) {
    if request.items.is_some() || request.notes.is_some() {
        return;
    }
    let Some(description) = request.description.as_deref() else {
        return;
    };
    if let Some((items, notes)) = parse_legacy_description(description) {
        request.items = Some(items);
        request.notes = notes;
    }
}

fn parse_legacy_description(description: &str) -> Option<(Vec<String>, Option<String>)> {
    let trimmed = description.trim();
    let rest = strip_prefix_ignore_case(trimmed, "items:")?;

    let (items_part, notes_part) = match rest.split_once(';') {
        Some((items, notes)) => (items, Some(notes)),
        None => (rest, None),
    };

    let items: Vec<String> = items_part
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect();
    if items.is_empty() {
        return None;
    }

    let notes = notes_part.map(str::trim).and_then(|part| {
        let body = strip_prefix_ignore_case(part, "notes:").unwrap_or(part).trim();
        (!body.is_empty()).then(|| body.to_string())
    });

    Some((items, notes))
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &value[prefix.len()..])
}

#[cfg(test)]
mod tests {
    use super::parse_legacy_description;

    #[test]
    fn legacy_description_splits_items_and_notes() {
        let (items, notes) =
            parse_legacy_description("items: water, pretzels; notes: no ice please")
                .expect("legacy shape");
        assert_eq!(items, ["water", "pretzels"]);
        assert_eq!(notes.as_deref(), Some("no ice please"));
    }

    #[test]
    fn legacy_description_without_notes() {
        let (items, notes) = parse_legacy_description("Items: coffee").expect("legacy shape");
        assert_eq!(items, ["coffee"]);
        assert!(notes.is_none());
    }

    #[test]
    fn plain_descriptions_are_left_alone() {
        assert!(parse_legacy_description("my seat light is broken").is_none());
        assert!(parse_legacy_description("items: ;").is_none());
        assert!(parse_legacy_description("").is_none());
    }
}
