use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::actor::{Actor, ActorId};
use crate::domain::message::{next_message_timestamp, ChatMessage, SenderRole};
use crate::errors::ServiceError;

pub const TITLE_MAX_CHARS: usize = 100;
pub const DESCRIPTION_MAX_CHARS: usize = 500;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Medical,
    Comfort,
    Security,
    Snacks,
    Drinks,
    General,
}

impl Category {
    pub const ALL: [Self; 6] =
        [Self::Medical, Self::Comfort, Self::Security, Self::Snacks, Self::Drinks, Self::General];

    pub fn label(self) -> &'static str {
        match self {
            Self::Medical => "Medical",
            Self::Comfort => "Comfort",
            Self::Security => "Security",
            Self::Snacks => "Snacks",
            Self::Drinks => "Drinks",
            Self::General => "General",
        }
    }
}

impl std::str::FromStr for Category {
    type Err = ServiceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "medical" => Ok(Self::Medical),
            "comfort" => Ok(Self::Comfort),
            "security" => Ok(Self::Security),
            "snacks" => Ok(Self::Snacks),
            "drinks" => Ok(Self::Drinks),
            "general" => Ok(Self::General),
            other => Err(ServiceError::validation(format!("unknown category `{other}`"))),
        }
    }
}

/// Ordered so that sorting by priority ranks urgent work first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub const ALL: [Self; 4] = [Self::Low, Self::Medium, Self::High, Self::Urgent];

    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Urgent => "Urgent",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = ServiceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            other => Err(ServiceError::validation(format!("unknown priority `{other}`"))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    #[default]
    New,
    Acknowledged,
    InProgress,
    Resolved,
    Cancelled,
}

impl RequestStatus {
    pub const ALL: [Self; 5] =
        [Self::New, Self::Acknowledged, Self::InProgress, Self::Resolved, Self::Cancelled];

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Cancelled)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Acknowledged => "Acknowledged",
            Self::InProgress => "In Progress",
            Self::Resolved => "Resolved",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Whether `from -> to` follows the documented lifecycle:
    /// New -> Acknowledged -> InProgress -> Resolved, with Cancelled
    /// reachable from any non-terminal state. Crew may still apply
    /// off-graph overwrites; callers use this only to flag them.
    pub fn is_normal_transition(from: Self, to: Self) -> bool {
        matches!(
            (from, to),
            (Self::New, Self::Acknowledged)
                | (Self::Acknowledged, Self::InProgress)
                | (Self::InProgress, Self::Resolved)
        ) || (!from.is_terminal() && to == Self::Cancelled)
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = ServiceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(Self::New),
            "acknowledged" => Ok(Self::Acknowledged),
            "inprogress" | "in_progress" | "in progress" => Ok(Self::InProgress),
            "resolved" => Ok(Self::Resolved),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(ServiceError::validation(format!("unknown status `{other}`"))),
        }
    }
}

/// Outcome of a status write, consumed by the store for structured logging.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusTransition {
    pub from: RequestStatus,
    pub to: RequestStatus,
    pub off_graph: bool,
    pub first_resolution: bool,
}

/// A passenger-submitted service request and its embedded chat thread.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
    pub id: RequestId,
    pub title: String,
    pub description: Option<String>,
    pub category: Category,
    pub priority: Priority,
    pub status: RequestStatus,
    pub submitter_id: ActorId,
    pub assigned_to: Option<ActorId>,
    pub seat: Option<String>,
    pub flight_number: Option<String>,
    pub location: Option<String>,
    pub items: Option<Vec<String>>,
    pub notes: Option<String>,
    pub chat_messages: Vec<ChatMessage>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceRequest {
    /// Applies a status overwrite. The lifecycle graph is advisory only:
    /// any value is accepted, off-graph writes are merely reported so the
    /// store can log them. Entering `Resolved` stamps `resolved_at` exactly
    /// once; the field is never cleared or overwritten afterwards, so it
    /// records the first resolution time even if the status later regresses.
    pub fn apply_status(&mut self, next: RequestStatus, now: DateTime<Utc>) -> StatusTransition {
        let from = self.status;
        let first_resolution = next == RequestStatus::Resolved && self.resolved_at.is_none();
        if first_resolution {
            self.resolved_at = Some(now);
        }
        self.status = next;

        StatusTransition {
            from,
            to: next,
            off_graph: from != next && !RequestStatus::is_normal_transition(from, next),
            first_resolution,
        }
    }

    /// Appends a chat message to the end of the thread and returns a clone of
    /// it. The thread is append-only: prior messages are never reordered or
    /// mutated, and timestamps are monotonic non-decreasing.
    pub fn append_message(
        &mut self,
        sender: SenderRole,
        sender_id: ActorId,
        body: &str,
        now: DateTime<Utc>,
    ) -> Result<ChatMessage, ServiceError> {
        let message = ChatMessage {
            sender,
            sender_id,
            message: ChatMessage::validate_body(body)?,
            timestamp: next_message_timestamp(&self.chat_messages, now),
        };
        self.chat_messages.push(message.clone());
        Ok(message)
    }
}

/// Creation payload. `title` and `category` are required; everything else is
/// contextual and optional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRequest {
    // Defaulted so an absent title reaches validation as empty rather than
    // failing JSON deserialization with a transport-level error.
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: Option<Category>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub seat: Option<String>,
    #[serde(default)]
    pub flight_number: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub items: Option<Vec<String>>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewRequest {
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.title.trim().is_empty() {
            return Err(ServiceError::validation("title required"));
        }
        if self.title.chars().count() > TITLE_MAX_CHARS {
            return Err(ServiceError::validation(format!(
                "title exceeds {TITLE_MAX_CHARS} characters"
            )));
        }
        if self.category.is_none() {
            return Err(ServiceError::validation("category required"));
        }
        if let Some(description) = &self.description {
            if description.chars().count() > DESCRIPTION_MAX_CHARS {
                return Err(ServiceError::validation(format!(
                    "description exceeds {DESCRIPTION_MAX_CHARS} characters"
                )));
            }
        }
        Ok(())
    }

    /// Materializes the validated input into a persisted-shape request.
    pub fn into_request(
        self,
        id: RequestId,
        submitter: &Actor,
        now: DateTime<Utc>,
    ) -> ServiceRequest {
        ServiceRequest {
            id,
            title: self.title.trim().to_string(),
            description: self.description,
            category: self.category.unwrap_or(Category::General),
            priority: self.priority.unwrap_or_default(),
            status: RequestStatus::New,
            submitter_id: submitter.id.clone(),
            assigned_to: None,
            seat: self.seat,
            flight_number: self.flight_number,
            location: self.location,
            items: self.items,
            notes: self.notes,
            chat_messages: Vec::new(),
            resolved_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update. Which fields are honored depends on the caller's role;
/// see the access policy. Absent fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub items: Option<Vec<String>>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub status: Option<RequestStatus>,
    #[serde(default)]
    pub assigned_to: Option<ActorId>,
}

impl RequestPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err(ServiceError::validation("title required"));
            }
            if title.chars().count() > TITLE_MAX_CHARS {
                return Err(ServiceError::validation(format!(
                    "title exceeds {TITLE_MAX_CHARS} characters"
                )));
            }
        }
        if let Some(description) = &self.description {
            if description.chars().count() > DESCRIPTION_MAX_CHARS {
                return Err(ServiceError::validation(format!(
                    "description exceeds {DESCRIPTION_MAX_CHARS} characters"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Priority,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl std::str::FromStr for SortField {
    type Err = ServiceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "createdat" | "created_at" => Ok(Self::CreatedAt),
            "updatedat" | "updated_at" => Ok(Self::UpdatedAt),
            "priority" => Ok(Self::Priority),
            other => Err(ServiceError::validation(format!("unknown sort field `{other}`"))),
        }
    }
}

impl std::str::FromStr for SortOrder {
    type Err = ServiceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(ServiceError::validation(format!("unknown sort order `{other}`"))),
        }
    }
}

/// List filter. Passenger callers are additionally scoped to their own
/// requests by the store, independent of this filter.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub category: Option<Category>,
    pub priority: Option<Priority>,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
}
