use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row};

use cabincall_core::domain::actor::ActorId;
use cabincall_core::domain::message::{ChatMessage, SenderRole};
use cabincall_core::domain::request::{
    Category, Priority, RequestFilter, RequestId, RequestStatus, ServiceRequest, SortField,
    SortOrder,
};
use cabincall_core::domain::stats::{CountBucket, RequestStats};

use super::{RepositoryError, RequestRepository};
use crate::DbPool;

pub struct SqlRequestRepository {
    pool: DbPool,
}

impl SqlRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_thread(&self, id: &RequestId) -> Result<Vec<ChatMessage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT sender_role, sender_id, body, created_at
             FROM request_message WHERE request_id = ? ORDER BY id ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_message).collect()
    }
}

#[async_trait]
impl RequestRepository for SqlRequestRepository {
    async fn insert(&self, request: &ServiceRequest) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO service_request
                 (id, title, description, category, priority, status, submitter_id,
                  assigned_to, seat, flight_number, location, items, notes,
                  resolved_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(&request.title)
        .bind(&request.description)
        .bind(category_token(request.category))
        .bind(priority_token(request.priority))
        .bind(status_token(request.status))
        .bind(&request.submitter_id.0)
        .bind(request.assigned_to.as_ref().map(|id| id.0.clone()))
        .bind(&request.seat)
        .bind(&request.flight_number)
        .bind(&request.location)
        .bind(encode_items(request.items.as_deref())?)
        .bind(&request.notes)
        .bind(request.resolved_at.map(|at| at.to_rfc3339()))
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &RequestId,
    ) -> Result<Option<ServiceRequest>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, title, description, category, priority, status, submitter_id,
                    assigned_to, seat, flight_number, location, items, notes,
                    resolved_at, created_at, updated_at
             FROM service_request WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut request = row_to_request(&row)?;
        request.chat_messages = self.load_thread(id).await?;
        Ok(Some(request))
    }

    async fn list(
        &self,
        filter: &RequestFilter,
        scope: Option<&ActorId>,
    ) -> Result<Vec<ServiceRequest>, RepositoryError> {
        let mut builder = QueryBuilder::new(
            "SELECT id, title, description, category, priority, status, submitter_id,
                    assigned_to, seat, flight_number, location, items, notes,
                    resolved_at, created_at, updated_at
             FROM service_request WHERE 1 = 1",
        );

        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status_token(status));
        }
        if let Some(category) = filter.category {
            builder.push(" AND category = ").push_bind(category_token(category));
        }
        if let Some(priority) = filter.priority {
            builder.push(" AND priority = ").push_bind(priority_token(priority));
        }
        if let Some(submitter) = scope {
            builder.push(" AND submitter_id = ").push_bind(submitter.0.clone());
        }

        builder.push(" ORDER BY ");
        builder.push(sort_expression(filter.sort_by));
        builder.push(match filter.sort_order {
            SortOrder::Asc => " ASC",
            SortOrder::Desc => " DESC",
        });

        let rows = builder.build().fetch_all(&self.pool).await?;

        let mut requests = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut request = row_to_request(row)?;
            request.chat_messages = self.load_thread(&request.id).await?;
            requests.push(request);
        }
        Ok(requests)
    }

    async fn update(&self, request: &ServiceRequest) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE service_request SET
                 title = ?, description = ?, priority = ?, status = ?, assigned_to = ?,
                 location = ?, items = ?, notes = ?, resolved_at = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&request.title)
        .bind(&request.description)
        .bind(priority_token(request.priority))
        .bind(status_token(request.status))
        .bind(request.assigned_to.as_ref().map(|id| id.0.clone()))
        .bind(&request.location)
        .bind(encode_items(request.items.as_deref())?)
        .bind(&request.notes)
        .bind(request.resolved_at.map(|at| at.to_rfc3339()))
        .bind(request.updated_at.to_rfc3339())
        .bind(&request.id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: &RequestId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM service_request WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn append_message(
        &self,
        id: &RequestId,
        message: &ChatMessage,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO request_message (request_id, sender_role, sender_id, body, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id.0)
        .bind(sender_token(message.sender))
        .bind(&message.sender_id.0)
        .bind(&message.message)
        .bind(message.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;

        // Bump updated_at so pollers pick up the new thread tail.
        sqlx::query("UPDATE service_request SET updated_at = ? WHERE id = ?")
            .bind(message.timestamp.to_rfc3339())
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn stats(&self) -> Result<RequestStats, RepositoryError> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM service_request")
            .fetch_one(&self.pool)
            .await?;

        let by_status = grouped_counts(&self.pool, "status").await?;
        let by_category = grouped_counts(&self.pool, "category").await?;
        let by_priority = grouped_counts(&self.pool, "priority").await?;

        Ok(RequestStats {
            total,
            by_status: zero_filled(
                RequestStatus::ALL.iter().map(|s| (status_token(*s), s.label())),
                &by_status,
            ),
            by_category: zero_filled(
                Category::ALL.iter().map(|c| (category_token(*c), c.label())),
                &by_category,
            ),
            by_priority: zero_filled(
                Priority::ALL.iter().map(|p| (priority_token(*p), p.label())),
                &by_priority,
            ),
        })
    }
}

async fn grouped_counts(
    pool: &DbPool,
    column: &str,
) -> Result<Vec<(String, i64)>, RepositoryError> {
    // `column` is one of three hard-coded identifiers, never caller input.
    let rows = sqlx::query(&format!(
        "SELECT {column} AS key, COUNT(*) AS count FROM service_request GROUP BY {column}"
    ))
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok((row.try_get::<String, _>("key")?, row.try_get::<i64, _>("count")?))
        })
        .collect()
}

fn zero_filled<'a>(
    variants: impl Iterator<Item = (&'a str, &'a str)>,
    counts: &[(String, i64)],
) -> Vec<CountBucket> {
    variants
        .map(|(token, label)| CountBucket {
            key: label.to_string(),
            count: counts
                .iter()
                .find(|(key, _)| key == token)
                .map(|(_, count)| *count)
                .unwrap_or(0),
        })
        .collect()
}

fn sort_expression(field: SortField) -> &'static str {
    match field {
        SortField::CreatedAt => "created_at",
        SortField::UpdatedAt => "updated_at",
        SortField::Priority => {
            "CASE priority WHEN 'low' THEN 0 WHEN 'medium' THEN 1 \
             WHEN 'high' THEN 2 WHEN 'urgent' THEN 3 END"
        }
    }
}

pub(crate) fn status_token(status: RequestStatus) -> &'static str {
    match status {
        RequestStatus::New => "new",
        RequestStatus::Acknowledged => "acknowledged",
        RequestStatus::InProgress => "in_progress",
        RequestStatus::Resolved => "resolved",
        RequestStatus::Cancelled => "cancelled",
    }
}

pub(crate) fn category_token(category: Category) -> &'static str {
    match category {
        Category::Medical => "medical",
        Category::Comfort => "comfort",
        Category::Security => "security",
        Category::Snacks => "snacks",
        Category::Drinks => "drinks",
        Category::General => "general",
    }
}

pub(crate) fn priority_token(priority: Priority) -> &'static str {
    match priority {
        Priority::Low => "low",
        Priority::Medium => "medium",
        Priority::High => "high",
        Priority::Urgent => "urgent",
    }
}

fn sender_token(sender: SenderRole) -> &'static str {
    match sender {
        SenderRole::Passenger => "passenger",
        SenderRole::Crew => "crew",
    }
}

fn parse_sender(raw: &str) -> Result<SenderRole, RepositoryError> {
    match raw {
        "passenger" => Ok(SenderRole::Passenger),
        "crew" => Ok(SenderRole::Crew),
        other => Err(RepositoryError::Decode(format!("unknown sender role `{other}`"))),
    }
}

fn parse_datetime(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("bad timestamp `{raw}`: {error}")))
}

fn encode_items(items: Option<&[String]>) -> Result<Option<String>, RepositoryError> {
    items
        .map(|items| {
            serde_json::to_string(items)
                .map_err(|error| RepositoryError::Decode(format!("items encode: {error}")))
        })
        .transpose()
}

fn decode_items(raw: Option<String>) -> Result<Option<Vec<String>>, RepositoryError> {
    raw.map(|raw| {
        serde_json::from_str::<Vec<String>>(&raw)
            .map_err(|error| RepositoryError::Decode(format!("items decode `{raw}`: {error}")))
    })
    .transpose()
}

fn row_to_request(row: &SqliteRow) -> Result<ServiceRequest, RepositoryError> {
    let decode = |field: &str, error: cabincall_core::ServiceError| {
        RepositoryError::Decode(format!("column `{field}`: {error}"))
    };

    let status_raw: String = row.try_get("status")?;
    let category_raw: String = row.try_get("category")?;
    let priority_raw: String = row.try_get("priority")?;
    let resolved_at: Option<String> = row.try_get("resolved_at")?;

    Ok(ServiceRequest {
        id: RequestId(row.try_get("id")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        category: category_raw.parse().map_err(|e| decode("category", e))?,
        priority: priority_raw.parse().map_err(|e| decode("priority", e))?,
        status: status_raw.parse().map_err(|e| decode("status", e))?,
        submitter_id: ActorId(row.try_get("submitter_id")?),
        assigned_to: row.try_get::<Option<String>, _>("assigned_to")?.map(ActorId),
        seat: row.try_get("seat")?,
        flight_number: row.try_get("flight_number")?,
        location: row.try_get("location")?,
        items: decode_items(row.try_get("items")?)?,
        notes: row.try_get("notes")?,
        chat_messages: Vec::new(),
        resolved_at: resolved_at.as_deref().map(parse_datetime).transpose()?,
        created_at: parse_datetime(row.try_get::<String, _>("created_at")?.as_str())?,
        updated_at: parse_datetime(row.try_get::<String, _>("updated_at")?.as_str())?,
    })
}

fn row_to_message(row: &SqliteRow) -> Result<ChatMessage, RepositoryError> {
    let sender_raw: String = row.try_get("sender_role")?;
    Ok(ChatMessage {
        sender: parse_sender(&sender_raw)?,
        sender_id: ActorId(row.try_get("sender_id")?),
        message: row.try_get("body")?,
        timestamp: parse_datetime(row.try_get::<String, _>("created_at")?.as_str())?,
    })
}
