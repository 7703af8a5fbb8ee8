mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use common::{user, Fixture};
use serde_json::{json, Value};
use showtime_booking::controllers;
use showtime_booking::models::UserId;
use tower::ServiceExt;
use uuid::Uuid;

fn app(fx: &Fixture) -> Router {
    controllers::app(fx.state.clone())
}

async fn call(
    fx: &Fixture,
    method: Method,
    uri: &str,
    user_id: Option<UserId>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user_id) = user_id {
        builder = builder.header("x-user-id", user_id.to_string());
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app(fx).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, value)
}

#[tokio::test]
async fn health_check() {
    let fx = Fixture::new().await;
    let (status, body) = call(&fx, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".into()));
}

#[tokio::test]
async fn anonymous_seat_map() {
    let fx = Fixture::new().await;
    let uri = format!("/api/showings/{}/seats", fx.showing.id);

    let (status, body) = call(&fx, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["seats"].as_array().unwrap().len(), 15);
    assert_eq!(body["seats"][0]["seat_number"], "A1");
    assert_eq!(body["seats"][0]["state"], "available");
    assert_eq!(body["bookable"], true);

    let (status, body) =
        call(&fx, Method::GET, &format!("/api/showings/{}/seats", Uuid::new_v4()), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn lock_requires_identity() {
    let fx = Fixture::new().await;
    let body = json!({ "showing_id": fx.showing.id, "seat_id": fx.seat("A1"), "lock": true });

    let (status, reply) = call(&fx, Method::PATCH, "/api/seats/lock", None, Some(body.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply["error"], "unauthorized");

    let request = Request::builder()
        .method(Method::PATCH)
        .uri("/api/seats/lock")
        .header("x-user-id", "not-a-uuid")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app(&fx).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn lock_conflict_and_release_over_http() {
    let fx = Fixture::new().await;
    let (x, y) = (user(), user());
    let seat = fx.seat("B3");
    let lock = json!({ "showing_id": fx.showing.id, "seat_id": seat, "lock": true });
    let unlock = json!({ "showing_id": fx.showing.id, "seat_id": seat, "lock": false });

    let (status, body) = call(&fx, Method::PATCH, "/api/seats/lock", Some(x), Some(lock.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "granted");
    assert_eq!(body["refreshed"], false);
    assert!(body["expires_at"].is_string());

    let (status, body) = call(&fx, Method::PATCH, "/api/seats/lock", Some(x), Some(lock.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["refreshed"], true);

    let (status, body) = call(&fx, Method::PATCH, "/api/seats/lock", Some(y), Some(lock.clone())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "already_locked");
    assert_eq!(body["retryable"], false);
    assert_eq!(body["seats"], json!([seat]));

    let (status, body) = call(&fx, Method::PATCH, "/api/seats/lock", Some(y), Some(unlock.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "not_owner");

    let (status, body) = call(&fx, Method::PATCH, "/api/seats/lock", Some(x), Some(unlock.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "released");

    let (status, body) = call(&fx, Method::PATCH, "/api/seats/lock", Some(x), Some(unlock)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "not_found");
}

#[tokio::test]
async fn booking_lifecycle_over_http() {
    let fx = Fixture::new().await;
    let (x, y) = (user(), user());
    let seats = vec![fx.seat("C1"), fx.seat("C2")];

    let (status, booking) = call(
        &fx,
        Method::POST,
        "/api/bookings",
        Some(x),
        Some(json!({ "showing_id": fx.showing.id, "seat_ids": seats, "total_price": 20.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(booking["status"], "confirmed");
    assert!(booking["booking_number"].as_str().unwrap().starts_with("BK-"));
    let booking_id = booking["id"].as_str().unwrap().to_string();

    let (status, body) = call(
        &fx,
        Method::POST,
        "/api/bookings",
        Some(y),
        Some(json!({ "showing_id": fx.showing.id, "seat_ids": [fx.seat("C2"), fx.seat("C3")], "total_price": 20.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "seat_conflict");
    assert_eq!(body["seats"][0]["seat_id"], json!(fx.seat("C2")));
    assert_eq!(body["seats"][0]["reason"], "booked");

    let (status, body) = call(&fx, Method::GET, "/api/bookings", Some(x), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let uri = format!("/api/bookings/{booking_id}");
    let (status, _) = call(&fx, Method::GET, &uri, Some(y), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = call(&fx, Method::GET, &uri, Some(x), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["seat_ids"].as_array().unwrap().len(), 2);

    let (status, body) = call(
        &fx,
        Method::PATCH,
        "/api/bookings/cancel",
        Some(x),
        Some(json!({ "booking_id": booking_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");
}

#[tokio::test]
async fn booking_validation_errors_are_unprocessable() {
    let fx = Fixture::new().await;
    let x = user();

    let (status, body) = call(
        &fx,
        Method::POST,
        "/api/bookings",
        Some(x),
        Some(json!({ "showing_id": fx.showing.id, "seat_ids": [], "total_price": 5.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_request");

    fx.finish_showing();
    let (status, body) = call(
        &fx,
        Method::POST,
        "/api/bookings",
        Some(x),
        Some(json!({ "showing_id": fx.showing.id, "seat_ids": [fx.seat("A1")], "total_price": 5.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "showing_unavailable");
}

#[tokio::test]
async fn theater_seat_listing() {
    let fx = Fixture::new().await;

    let (status, body) =
        call(&fx, Method::GET, &format!("/api/theaters/{}/seats", fx.theater.id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 15);
    assert_eq!(body[14]["seat_class"], "premium");

    let (status, _) =
        call(&fx, Method::GET, &format!("/api/theaters/{}/seats", Uuid::new_v4()), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_json_gets_the_api_error_shape() {
    let fx = Fixture::new().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/bookings")
        .header("x-user-id", user().to_string())
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"showing_id\": "))
        .unwrap();

    let response = app(&fx).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "invalid_request");
    assert_eq!(body["retryable"], false);
    assert!(body["message"].is_string());

    let (status, body) = call(
        &fx,
        Method::PATCH,
        "/api/seats/lock",
        Some(user()),
        Some(json!({ "showing_id": fx.showing.id, "lock": true })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_request");
}
