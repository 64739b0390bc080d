//! Local request cache. Holds the last-known-good snapshot of the server
//! list plus any pending local placeholders. A failed refresh never clears
//! the cache; it only records an error indicator alongside the stale data.

use chrono::Utc;
use uuid::Uuid;

use cabincall_core::domain::request::ServiceRequest;

use crate::api::ApiError;
use crate::view::{MessageView, RequestView};

#[derive(Debug, Default)]
pub struct RequestCache {
    entries: Vec<RequestView>,
    last_error: Option<String>,
}

impl RequestCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[RequestView] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&RequestView> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Error indicator from the most recent failed operation, cleared by
    /// the next successful refresh.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Wholesale replacement with a fresh server snapshot. Pending
    /// placeholders are dropped: if the server accepted the create they
    /// appear in the snapshot under their real id, and if it never did
    /// they are gone, which mirrors what the server knows.
    pub fn replace_all(&mut self, requests: &[ServiceRequest]) {
        self.entries = requests.iter().map(RequestView::from_request).collect();
        self.last_error = None;
    }

    /// Records a committed create without waiting for the next poll.
    pub fn insert_committed(&mut self, request: &ServiceRequest) {
        let view = RequestView::from_request(request);
        self.upsert(view);
        self.last_error = None;
    }

    /// Records a create the server never acknowledged. The placeholder is
    /// local-only and visible to the user until a refresh reconciles it.
    pub fn insert_pending(&mut self, title: &str, submitter_id: &str, error: &ApiError) -> String {
        let now = Utc::now();
        let id = format!("local-{}", Uuid::new_v4());
        self.entries.insert(
            0,
            RequestView {
                id: id.clone(),
                title: title.to_string(),
                description: None,
                category: String::new(),
                priority: String::new(),
                status: "Pending".to_string(),
                submitter_id: submitter_id.to_string(),
                assigned_to: None,
                location: None,
                items: Vec::new(),
                notes: None,
                messages: Vec::new(),
                resolved_at: None,
                created_at: now,
                updated_at: now,
                pending: true,
            },
        );
        self.last_error = Some(error.indicator());
        id
    }

    /// Applies a committed update to the matching entry. No-op when the
    /// entry is not cached yet; the next refresh will pick it up.
    pub fn apply_update(&mut self, request: &ServiceRequest) {
        self.upsert(RequestView::from_request(request));
        self.last_error = None;
    }

    /// Appends a committed message to the cached thread. No-op when the
    /// request is not cached.
    pub fn push_message(&mut self, id: &str, message: MessageView) {
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.id == id) {
            entry.updated_at = message.timestamp;
            entry.messages.push(message);
        }
        self.last_error = None;
    }

    pub fn remove(&mut self, id: &str) {
        self.entries.retain(|entry| entry.id != id);
    }

    pub fn record_error(&mut self, error: &ApiError) {
        self.last_error = Some(error.indicator());
    }

    fn upsert(&mut self, view: RequestView) {
        match self.entries.iter_mut().find(|entry| entry.id == view.id) {
            Some(existing) => *existing = view,
            None => self.entries.insert(0, view),
        }
    }
}
