use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::actor::{ActorId, Role};
use crate::errors::ServiceError;

pub const MESSAGE_MAX_CHARS: usize = 1_000;

/// Role tag attributed to a chat message. Admin actors write under the crew
/// tag; the thread only distinguishes the two sides of the conversation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderRole {
    Passenger,
    Crew,
}

impl From<Role> for SenderRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Passenger => Self::Passenger,
            Role::Crew | Role::Admin => Self::Crew,
        }
    }
}

/// One entry in a request's chat thread. Messages have no identity outside
/// their parent request and are never mutated or deleted once appended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub sender: SenderRole,
    pub sender_id: ActorId,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Validates and trims a message body: non-empty after trimming, bounded
    /// length. The returned body is the trimmed form.
    pub fn validate_body(raw: &str) -> Result<String, ServiceError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ServiceError::validation("message required"));
        }
        if trimmed.chars().count() > MESSAGE_MAX_CHARS {
            return Err(ServiceError::validation(format!(
                "message exceeds {MESSAGE_MAX_CHARS} characters"
            )));
        }
        Ok(trimmed.to_string())
    }
}

/// Timestamp for the next append so that thread timestamps never decrease,
/// even across clock regressions. Ties are broken by insertion order.
pub fn next_message_timestamp(
    thread: &[ChatMessage],
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    match thread.last() {
        Some(last) if last.timestamp > now => last.timestamp,
        _ => now,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{next_message_timestamp, ChatMessage, SenderRole, MESSAGE_MAX_CHARS};
    use crate::domain::actor::{ActorId, Role};

    #[test]
    fn whitespace_only_body_is_rejected() {
        let error = ChatMessage::validate_body("   \n\t ").expect_err("blank body");
        assert_eq!(error.to_string(), "validation failed: message required");
    }

    #[test]
    fn body_is_trimmed_and_bounded() {
        assert_eq!(ChatMessage::validate_body("  on the way  ").expect("valid"), "on the way");

        let oversized = "x".repeat(MESSAGE_MAX_CHARS + 1);
        assert!(ChatMessage::validate_body(&oversized).is_err());
    }

    #[test]
    fn admin_messages_carry_the_crew_tag() {
        assert_eq!(SenderRole::from(Role::Admin), SenderRole::Crew);
        assert_eq!(SenderRole::from(Role::Passenger), SenderRole::Passenger);
    }

    #[test]
    fn timestamps_never_regress_within_a_thread() {
        let now = Utc::now();
        let thread = vec![ChatMessage {
            sender: SenderRole::Crew,
            sender_id: ActorId("C1".to_string()),
            message: "on the way".to_string(),
            timestamp: now + Duration::seconds(5),
        }];

        // A clock that lags the previous append is clamped to it.
        assert_eq!(next_message_timestamp(&thread, now), now + Duration::seconds(5));
        // A later clock wins.
        let later = now + Duration::seconds(10);
        assert_eq!(next_message_timestamp(&thread, later), later);
        // Empty threads take the clock as-is.
        assert_eq!(next_message_timestamp(&[], now), now);
    }
}
