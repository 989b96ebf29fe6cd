//! REST API layer: route handlers, DTOs, and router composition.
//!
//! Resource endpoints are mounted under `/api/v1`; health and
//! configuration live at the root.

pub mod dto;
pub mod handlers;
pub mod openapi;

use axum::Router;

use crate::app_state::AppState;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
}

#[cfg(test)]
#[allow(clippy::panic, clippy::indexing_slicing)]
mod tests {
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use chrono::{Duration, TimeZone, Utc};
    use tower::ServiceExt;

    use super::*;
    use crate::clock::{Clock, FixedClock};
    use crate::domain::GuaranteeRules;
    use crate::persistence::{GuaranteeStore, MemoryPlaySource, MemoryStore, PlaySource};

    fn app(days_since_start: i64) -> Router {
        let Some(start) = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).single() else {
            panic!("valid timestamp");
        };
        let clock = FixedClock::new(start + Duration::days(days_since_start));
        let state = AppState::new(
            Arc::new(MemoryStore::new()) as Arc<dyn GuaranteeStore>,
            Arc::new(MemoryPlaySource::new()) as Arc<dyn PlaySource>,
            Arc::new(clock) as Arc<dyn Clock>,
            GuaranteeRules::default(),
            4,
        );
        build_router().with_state(state)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let Ok(response) = app.clone().oneshot(request).await else {
            panic!("router failed");
        };
        let status = response.status();
        let Ok(bytes) = to_bytes(response.into_body(), usize::MAX).await else {
            panic!("body read failed");
        };
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn json_request(
        method: &str,
        uri: &str,
        actor: Option<&str>,
        body: &serde_json::Value,
    ) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(actor) = actor {
            builder = builder.header(handlers::ADMIN_ACTOR_HEADER, actor);
        }
        let Ok(request) = builder.body(Body::from(body.to_string())) else {
            panic!("request build failed");
        };
        request
    }

    fn get(uri: &str) -> Request<Body> {
        let Ok(request) = Request::builder().uri(uri).body(Body::empty()) else {
            panic!("request build failed");
        };
        request
    }

    async fn enroll(app: &Router, purchase: &str) -> String {
        let body = serde_json::json!({
            "user_id": uuid::Uuid::new_v4(),
            "purchase_id": purchase,
        });
        let (status, json) = send(app, json_request("POST", "/api/v1/enrollments", None, &body)).await;
        assert_eq!(status, StatusCode::CREATED);
        json["enrollment"]["id"].as_str().unwrap_or_default().to_string()
    }

    #[tokio::test]
    async fn health_and_rules() {
        let app = app(0);
        let (status, json) = send(&app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");

        let (status, json) = send(&app, get("/config/rules")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["required_streak_days"], 21);
        assert_eq!(json["daily_play_threshold"], 20);
    }

    #[tokio::test]
    async fn decision_requires_admin_header() {
        let app = app(1);
        let id = enroll(&app, "pi_auth").await;
        let uri = format!("/api/v1/enrollments/{id}/approve");
        let (status, json) = send(&app, json_request("POST", &uri, None, &serde_json::json!({}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"]["code"], 1003);
    }

    #[tokio::test]
    async fn deny_without_reason_is_rejected_and_status_unchanged() {
        let app = app(10);
        let id = enroll(&app, "pi_deny").await;
        let uri = format!("/api/v1/enrollments/{id}/deny");
        let (status, json) = send(
            &app,
            json_request("POST", &uri, Some("admin"), &serde_json::json!({ "reason": "" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], 1001);

        let (_, detail) = send(&app, get(&format!("/api/v1/enrollments/{id}"))).await;
        assert_eq!(detail["status"]["enrollment"]["status"], "pending");
    }

    #[tokio::test]
    async fn second_decision_conflicts() {
        let app = app(2);
        let id = enroll(&app, "pi_conflict").await;
        let approve = format!("/api/v1/enrollments/{id}/approve");
        let (status, json) = send(&app, json_request("POST", &approve, Some("a"), &serde_json::json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["enrollment"]["status"], "refunded");

        let deny = format!("/api/v1/enrollments/{id}/deny");
        let (status, json) = send(
            &app,
            json_request("POST", &deny, Some("b"), &serde_json::json!({ "reason": "late" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"]["code"], 2002);

        let (status, audit) = send(&app, get(&format!("/api/v1/enrollments/{id}/audit"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(audit.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn unknown_enrollment_is_404() {
        let app = app(0);
        let uri = format!("/api/v1/enrollments/{}", uuid::Uuid::new_v4());
        let (status, json) = send(&app, get(&uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["code"], 2001);
    }

    #[tokio::test]
    async fn invalid_filter_is_400() {
        let app = app(0);
        let (status, json) = send(&app, get("/api/v1/enrollments?computed_state=bogus")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], 1002);
    }

    #[tokio::test]
    async fn list_filters_by_computed_state() {
        let app = app(3);
        let _ = enroll(&app, "pi_list_a").await;
        let _ = enroll(&app, "pi_list_b").await;
        let (status, json) = send(
            &app,
            get("/api/v1/enrollments?computed_state=unconditional_window&per_page=1"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["pagination"]["total"], 2);
        assert_eq!(json["data"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn aggregation_run_reports_day() {
        let app = app(3);
        let _ = enroll(&app, "pi_agg").await;
        let (status, json) = send(
            &app,
            json_request(
                "POST",
                "/api/v1/aggregation/run",
                Some("ops"),
                &serde_json::json!({ "date": "2025-03-04" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["reports"][0]["day"], "2025-03-04");
        assert_eq!(json["reports"][0]["written"], 1);
    }

    #[tokio::test]
    async fn aggregation_range_beyond_retention_is_400() {
        let app = app(3);
        let (status, json) = send(
            &app,
            json_request(
                "POST",
                "/api/v1/aggregation/run",
                Some("ops"),
                &serde_json::json!({ "date": "2000-01-01", "until": "2100-12-31" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], 1001);
    }
}
