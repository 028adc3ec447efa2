//! API router configuration.

use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main API router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/surveys",
            post(handlers::create_survey).get(handlers::list_surveys),
        )
        .route("/surveys/:id", get(handlers::get_survey))
        .route("/surveys/:id/transitions", post(handlers::perform_transition))
        .route("/surveys/:id/notes", put(handlers::update_notes))
        .route("/surveys/:id/audit", get(handlers::audit_trail))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        create_router(AppState::in_memory())
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        caller: Option<(&str, &str)>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((id, role)) = caller {
            builder = builder
                .header("x-haven-caller-id", id)
                .header("x-haven-caller-role", role);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn create_submitted_survey(app: &Router) -> String {
        let (status, body) = send(
            app,
            "POST",
            "/api/v1/surveys",
            Some(("42", "SURVEYOR")),
            Some(json!({"facility_id": "fac-1"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["id"].as_str().unwrap().to_string();

        let (status, _) = send(
            app,
            "POST",
            &format!("/api/v1/surveys/{id}/transitions"),
            Some(("42", "SURVEYOR")),
            Some(json!({"action": "submit"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        id
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = app();
        let (status, body) = send(&app, "GET", "/api/v1/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn lifecycle_over_http() {
        let app = app();
        let id = create_submitted_survey(&app).await;

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/v1/surveys/{id}/transitions"),
            Some(("7", "VERIFIER")),
            Some(json!({"action": "verify"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "VERIFIED");
        assert_eq!(body["verified_by_id"], "7");

        let (status, trail) = send(
            &app,
            "GET",
            &format!("/api/v1/surveys/{id}/audit"),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let entries = trail.as_array().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0]["action"], "CREATED");
        assert_eq!(entries[1]["action"], "SUBMITTED");
        assert_eq!(entries[2]["action"], "VERIFIED");
        assert_eq!(entries[2]["previous_status"], "SUBMITTED");
        assert_eq!(entries[2]["new_status"], "VERIFIED");
    }

    #[tokio::test]
    async fn missing_caller_headers_are_unauthorized() {
        let app = app();
        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/surveys",
            None,
            Some(json!({"facility_id": "fac-1"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["kind"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn unknown_role_is_unauthorized() {
        let app = app();
        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/surveys",
            Some(("42", "SUPERUSER")),
            Some(json!({"facility_id": "fac-1"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["kind"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn self_verification_is_forbidden() {
        let app = app();
        let id = create_submitted_survey(&app).await;

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/v1/surveys/{id}/transitions"),
            Some(("42", "VERIFIER")),
            Some(json!({"action": "verify"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["kind"], "FORBIDDEN");
    }

    #[tokio::test]
    async fn reject_without_reason_is_unprocessable() {
        let app = app();
        let id = create_submitted_survey(&app).await;

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/v1/surveys/{id}/transitions"),
            Some(("7", "VERIFIER")),
            Some(json!({"action": "reject", "rejection_reason": "   "})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["kind"], "MISSING_REASON");
    }

    #[tokio::test]
    async fn unknown_survey_is_not_found() {
        let app = app();
        let (status, body) = send(
            &app,
            "GET",
            "/api/v1/surveys/no-such-survey",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn replayed_transition_conflicts() {
        let app = app();
        let id = create_submitted_survey(&app).await;

        let (status, _) = send(
            &app,
            "POST",
            &format!("/api/v1/surveys/{id}/transitions"),
            Some(("7", "VERIFIER")),
            Some(json!({"action": "verify"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/v1/surveys/{id}/transitions"),
            Some(("7", "VERIFIER")),
            Some(json!({"action": "verify"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "INVALID_TRANSITION");
    }

    #[tokio::test]
    async fn rejection_flow_over_http() {
        let app = app();
        let id = create_submitted_survey(&app).await;

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/v1/surveys/{id}/transitions"),
            Some(("7", "VERIFIER")),
            Some(json!({"action": "reject", "rejection_reason": "missing bed data"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "REJECTED");
        assert_eq!(body["rejection_reason"], "missing bed data");

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/v1/surveys/{id}/transitions"),
            Some(("42", "SURVEYOR")),
            Some(json!({"action": "resubmit"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "SUBMITTED");
        assert_eq!(body["rejection_reason"], "");
    }

    #[tokio::test]
    async fn audit_trail_pages_are_restartable() {
        let app = app();
        let id = create_submitted_survey(&app).await;

        let (status, first) = send(
            &app,
            "GET",
            &format!("/api/v1/surveys/{id}/audit?limit=1&offset=0"),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first.as_array().unwrap().len(), 1);
        assert_eq!(first[0]["action"], "CREATED");

        let (_, second) = send(
            &app,
            "GET",
            &format!("/api/v1/surveys/{id}/audit?limit=1&offset=1"),
            None,
            None,
        )
        .await;
        assert_eq!(second[0]["action"], "SUBMITTED");
    }
}
