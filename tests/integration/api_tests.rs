//! Request boundary tests: rights and validation are checked before any
//! storage access, so these run against an unreachable database.

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use shelfmark::{create_router, models::principal::Role};

use crate::common::{lazy_state, token};

fn app() -> Router {
    create_router(lazy_state())
}

fn request(method: Method, uri: &str, bearer: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(t) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", t));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn valid_book() -> Value {
    json!({
        "title": "The Left Hand of Darkness",
        "author": "Ursula K. Le Guin",
        "publication_date": "1969-03-01",
        "total_copies": 2
    })
}

#[tokio::test]
async fn test_health_check() {
    let response = app()
        .oneshot(request(Method::GET, "/api/v1/health", None, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_ready_reports_unreachable_database() {
    let response = app()
        .oneshot(request(Method::GET, "/api/v1/ready", None, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["code"], 3);
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let response = app()
        .oneshot(request(Method::GET, "/api/v1/books", None, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["code"], 2);
}

#[tokio::test]
async fn test_forged_token_is_unauthorized() {
    let response = app()
        .oneshot(request(Method::GET, "/api/v1/loans", Some("not.a.token"), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unauthenticated_write_rejected_before_body() {
    let response = app()
        .oneshot(request(
            Method::POST,
            "/api/v1/loans",
            None,
            Some(json!({ "member_id": "nonsense" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_member_cannot_create_book() {
    let member = token(Role::Member, 5);
    let response = app()
        .oneshot(request(Method::POST, "/api/v1/books", Some(&member), Some(valid_book())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_member_cannot_delete_loan() {
    let member = token(Role::Member, 5);
    let response = app()
        .oneshot(request(Method::DELETE, "/api/v1/loans/1", Some(&member), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_member_cannot_read_other_member_loans() {
    let member = token(Role::Member, 5);
    let response = app()
        .oneshot(request(Method::GET, "/api/v1/members/6/loans", Some(&member), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_book_without_copies_is_bad_request() {
    let admin = token(Role::Admin, 1);
    let mut book = valid_book();
    book["total_copies"] = json!(0);

    let response = app()
        .oneshot(request(Method::POST, "/api/v1/books", Some(&admin), Some(book)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["code"], 9);
}

#[tokio::test]
async fn test_checkout_due_before_loan_is_bad_request() {
    let admin = token(Role::Admin, 1);
    let response = app()
        .oneshot(request(
            Method::POST,
            "/api/v1/loans",
            Some(&admin),
            Some(json!({
                "member_id": 1,
                "book_id": 1,
                "loan_date": "2025-03-10",
                "due_date": "2025-03-01"
            })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_open_loan_with_return_date_is_bad_request() {
    let admin = token(Role::Admin, 1);
    let response = app()
        .oneshot(request(
            Method::PUT,
            "/api/v1/loans/1",
            Some(&admin),
            Some(json!({
                "member_id": 1,
                "book_id": 1,
                "loan_date": "2025-03-01",
                "due_date": "2025-03-15",
                "return_date": "2025-03-05",
                "status": "borrowed"
            })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_member_email_is_bad_request() {
    let admin = token(Role::Admin, 1);
    let response = app()
        .oneshot(request(
            Method::POST,
            "/api/v1/members",
            Some(&admin),
            Some(json!({
                "name": "Ada",
                "email": "not-an-email",
                "phone": "555-0101",
                "address": "2 Library Lane"
            })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
