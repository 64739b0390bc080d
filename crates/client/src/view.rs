//! Read models for rendering. Views are plain data derived from the server
//! payloads; a `pending` view exists only in the local cache until the next
//! successful refresh replaces it.

use chrono::{DateTime, Utc};

use cabincall_core::domain::message::{ChatMessage, SenderRole};
use cabincall_core::domain::request::ServiceRequest;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageView {
    pub sender: String,
    pub sender_id: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&ChatMessage> for MessageView {
    fn from(message: &ChatMessage) -> Self {
        let sender = match message.sender {
            SenderRole::Passenger => "passenger",
            SenderRole::Crew => "crew",
        };
        Self {
            sender: sender.to_string(),
            sender_id: message.sender_id.0.clone(),
            body: message.message.clone(),
            timestamp: message.timestamp,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestView {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub priority: String,
    pub status: String,
    pub submitter_id: String,
    pub assigned_to: Option<String>,
    pub location: Option<String>,
    pub items: Vec<String>,
    pub notes: Option<String>,
    pub messages: Vec<MessageView>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// True for a local placeholder that has not been accepted by the
    /// server. Pending entries carry a synthetic id and no thread.
    pub pending: bool,
}

impl RequestView {
    pub fn from_request(request: &ServiceRequest) -> Self {
        Self {
            id: request.id.0.clone(),
            title: request.title.clone(),
            description: request.description.clone(),
            category: request.category.label().to_string(),
            priority: request.priority.label().to_string(),
            status: request.status.label().to_string(),
            submitter_id: request.submitter_id.0.clone(),
            assigned_to: request.assigned_to.as_ref().map(|id| id.0.clone()),
            location: request.location.clone(),
            items: request.items.clone().unwrap_or_default(),
            notes: request.notes.clone(),
            messages: request.chat_messages.iter().map(MessageView::from).collect(),
            resolved_at: request.resolved_at,
            created_at: request.created_at,
            updated_at: request.updated_at,
            pending: false,
        }
    }

    pub fn last_message(&self) -> Option<&MessageView> {
        self.messages.last()
    }
}
