use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use cabincall_db::{connect, ephemeral_config, migrations, RequestStore, SqlRequestRepository};
use cabincall_server::api;

async fn test_router() -> Router {
    let pool = connect(&ephemeral_config()).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrate");
    api::router(RequestStore::new(SqlRequestRepository::new(pool)))
}

fn request(
    method: Method,
    uri: &str,
    actor: Option<(&str, &str)>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((id, role)) = actor {
        builder = builder.header("x-actor-id", id).header("x-actor-role", role);
    }
    match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(req).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}

async fn create_water_request(router: &Router) -> Value {
    let (status, body) = send(
        router,
        request(
            Method::POST,
            "/api/v1/requests",
            Some(("P1", "passenger")),
            Some(json!({ "title": "Need water", "category": "Drinks" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body
}

#[tokio::test]
async fn create_defaults_status_new_and_priority_medium() {
    let router = test_router().await;
    let created = create_water_request(&router).await;

    assert_eq!(created["status"], "New");
    assert_eq!(created["priority"], "Medium");
    assert_eq!(created["submitterId"], "P1");
    assert_eq!(created["chatMessages"], json!([]));
    assert_eq!(created["resolvedAt"], Value::Null);
    assert!(created["id"].as_str().is_some());
}

#[tokio::test]
async fn missing_identity_headers_are_unauthorized() {
    let router = test_router().await;
    let (status, body) =
        send(&router, request(Method::GET, "/api/v1/requests", None, None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn missing_title_is_a_validation_error() {
    let router = test_router().await;
    let (status, body) = send(
        &router,
        request(
            Method::POST,
            "/api/v1/requests",
            Some(("P1", "passenger")),
            Some(json!({ "category": "Snacks" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().expect("error message").contains("title"));
}

#[tokio::test]
async fn unknown_request_is_not_found() {
    let router = test_router().await;
    let (status, _) = send(
        &router,
        request(Method::GET, "/api/v1/requests/nope", Some(("C1", "crew")), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn non_owner_passenger_is_forbidden_not_404() {
    let router = test_router().await;
    let created = create_water_request(&router).await;
    let id = created["id"].as_str().expect("id");

    let (status, _) = send(
        &router,
        request(
            Method::GET,
            &format!("/api/v1/requests/{id}"),
            Some(("P2", "passenger")),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &router,
        request(
            Method::PUT,
            &format!("/api/v1/requests/{id}"),
            Some(("P2", "passenger")),
            Some(json!({ "title": "mine" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn lifecycle_scenario_first_resolution_time_is_sticky() {
    let router = test_router().await;
    let created = create_water_request(&router).await;
    let id = created["id"].as_str().expect("id").to_string();
    let crew = Some(("C1", "crew"));

    let (status, acknowledged) = send(
        &router,
        request(
            Method::PUT,
            &format!("/api/v1/requests/{id}"),
            crew,
            Some(json!({ "status": "Acknowledged" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(acknowledged["status"], "Acknowledged");
    assert_eq!(acknowledged["resolvedAt"], Value::Null);

    let (status, message) = send(
        &router,
        request(
            Method::POST,
            &format!("/api/v1/requests/{id}/messages"),
            crew,
            Some(json!({ "message": "On the way" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(message["sender"], "crew");
    assert_eq!(message["message"], "On the way");

    let (_, resolved) = send(
        &router,
        request(
            Method::PUT,
            &format!("/api/v1/requests/{id}"),
            crew,
            Some(json!({ "status": "Resolved" })),
        ),
    )
    .await;
    let resolved_at = resolved["resolvedAt"].as_str().expect("resolvedAt set").to_string();

    let (_, regressed) = send(
        &router,
        request(
            Method::PUT,
            &format!("/api/v1/requests/{id}"),
            crew,
            Some(json!({ "status": "InProgress" })),
        ),
    )
    .await;
    assert_eq!(regressed["status"], "InProgress");
    assert_eq!(regressed["resolvedAt"], Value::String(resolved_at.clone()));

    // Passenger view includes the crew message after refresh.
    let (status, fetched) = send(
        &router,
        request(
            Method::GET,
            &format!("/api/v1/requests/{id}"),
            Some(("P1", "passenger")),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["chatMessages"].as_array().expect("thread").len(), 1);
}

#[tokio::test]
async fn passenger_put_cannot_change_status() {
    let router = test_router().await;
    let created = create_water_request(&router).await;
    let id = created["id"].as_str().expect("id");

    let (status, updated) = send(
        &router,
        request(
            Method::PUT,
            &format!("/api/v1/requests/{id}"),
            Some(("P1", "passenger")),
            Some(json!({ "title": "Sparkling water", "status": "Resolved" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], "Sparkling water");
    assert_eq!(updated["status"], "New");
    assert_eq!(updated["resolvedAt"], Value::Null);
}

#[tokio::test]
async fn empty_message_is_rejected_and_thread_untouched() {
    let router = test_router().await;
    let created = create_water_request(&router).await;
    let id = created["id"].as_str().expect("id");

    let (status, body) = send(
        &router,
        request(
            Method::POST,
            &format!("/api/v1/requests/{id}/messages"),
            Some(("P1", "passenger")),
            Some(json!({ "message": "   " })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().expect("error").contains("message required"));

    let (_, fetched) = send(
        &router,
        request(
            Method::GET,
            &format!("/api/v1/requests/{id}"),
            Some(("P1", "passenger")),
            None,
        ),
    )
    .await;
    assert_eq!(fetched["chatMessages"], json!([]));
}

#[tokio::test]
async fn passenger_list_is_scoped_and_filterable() {
    let router = test_router().await;
    create_water_request(&router).await;

    let (status, _) = send(
        &router,
        request(
            Method::POST,
            "/api/v1/requests",
            Some(("P2", "passenger")),
            Some(json!({ "title": "Feeling unwell", "category": "Medical", "priority": "Urgent" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, own) = send(
        &router,
        request(Method::GET, "/api/v1/requests", Some(("P1", "passenger")), None),
    )
    .await;
    assert_eq!(own.as_array().expect("list").len(), 1);

    let (_, all) =
        send(&router, request(Method::GET, "/api/v1/requests", Some(("C1", "crew")), None)).await;
    assert_eq!(all.as_array().expect("list").len(), 2);

    let (_, filtered) = send(
        &router,
        request(
            Method::GET,
            "/api/v1/requests?category=medical&sortBy=priority&sortOrder=desc",
            Some(("C1", "crew")),
            None,
        ),
    )
    .await;
    let filtered = filtered.as_array().expect("list");
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0]["category"], "Medical");
}

#[tokio::test]
async fn stats_are_crew_only() {
    let router = test_router().await;
    create_water_request(&router).await;

    let (status, _) = send(
        &router,
        request(Method::GET, "/api/v1/requests/stats", Some(("P1", "passenger")), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, stats) = send(
        &router,
        request(Method::GET, "/api/v1/requests/stats", Some(("C1", "crew")), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total"], 1);
    let by_status = stats["byStatus"].as_array().expect("buckets");
    let new_bucket = by_status.iter().find(|b| b["key"] == "New").expect("New bucket");
    assert_eq!(new_bucket["count"], 1);
}

#[tokio::test]
async fn delete_then_get_is_not_found() {
    let router = test_router().await;
    let created = create_water_request(&router).await;
    let id = created["id"].as_str().expect("id");

    let (status, _) = send(
        &router,
        request(
            Method::DELETE,
            &format!("/api/v1/requests/{id}"),
            Some(("P1", "passenger")),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        &router,
        request(Method::GET, &format!("/api/v1/requests/{id}"), Some(("C1", "crew")), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
