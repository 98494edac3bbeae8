use std::net::SocketAddr;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::{auth, qr, setup, users};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(auth::router())
                .merge(users::router())
                .merge(qr::router())
                .merge(setup::router())
                .route("/health", get(|| async { "ok" })),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::JwtKeys;
    use axum::{
        body::Body,
        extract::FromRef,
        http::{header, Method, Request, StatusCode},
    };
    use crate::users::repo_types::{NewUser, Role, User};
    use sqlx::PgPool;
    use tower::ServiceExt;
    use uuid::Uuid;

    async fn call_with(state: AppState, req: Request<Body>) -> (StatusCode, Vec<u8>) {
        let res = build_app(state)
            .oneshot(req)
            .await
            .expect("router is infallible");
        let status = res.status();
        if status.is_client_error() || status.is_server_error() {
            assert_eq!(
                res.headers()
                    .get(header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok()),
                Some("application/json"),
                "error bodies are json"
            );
        }
        let body = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .expect("read body");
        (status, body.to_vec())
    }

    async fn call(req: Request<Body>) -> (StatusCode, Vec<u8>) {
        call_with(AppState::fake(), req).await
    }

    async fn seed(db: &PgPool, email: &str, role: Role) -> User {
        User::create(
            db,
            NewUser {
                name: "Ada Lovelace",
                email,
                phone: "5551234567",
                password_hash: "not-a-real-hash",
                role,
                is_approved: role == Role::Admin,
            },
        )
        .await
        .expect("seed user")
    }

    fn bearer(state: &AppState, user: &User) -> String {
        let token = JwtKeys::from_ref(state).sign_access(user.id).unwrap();
        format!("Bearer {token}")
    }

    fn error_message(body: &[u8]) -> String {
        let v: serde_json::Value = serde_json::from_slice(body).expect("json error body");
        v["error"].as_str().unwrap_or_default().to_string()
    }

    #[tokio::test]
    async fn health_is_public() {
        let req = Request::get("/api/health").body(Body::empty()).unwrap();
        let (status, body) = call(req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"ok");
    }

    #[tokio::test]
    async fn admin_routes_require_a_token() {
        for (method, uri) in [
            (Method::GET, "/api/qr/scans"),
            (Method::GET, "/api/qr/scans/stats"),
            (Method::POST, "/api/qr/scan"),
            (Method::GET, "/api/users"),
            (Method::GET, "/api/users/stats/overview"),
        ] {
            let req = Request::builder()
                .method(method)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap();
            let (status, body) = call(req).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
            assert_eq!(error_message(&body), "Missing Authorization header");
        }
    }

    #[tokio::test]
    async fn garbage_token_is_rejected() {
        let req = Request::get("/api/qr/my-qr")
            .header(header::AUTHORIZATION, "Bearer not.a.jwt")
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(error_message(&body), "Invalid or expired token");
    }

    #[tokio::test]
    async fn non_bearer_scheme_is_rejected() {
        let req = Request::get("/api/auth/me")
            .header(header::AUTHORIZATION, "Basic YWRtaW46YWRtaW4=")
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(error_message(&body), "Invalid Authorization header");
    }

    #[tokio::test]
    async fn refresh_token_cannot_be_used_as_access_token() {
        let keys = JwtKeys::from_ref(&AppState::fake());
        let refresh = keys.sign_refresh(Uuid::new_v4()).unwrap();
        let req = Request::get("/api/qr/scans/stats")
            .header(header::AUTHORIZATION, format!("Bearer {refresh}"))
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(error_message(&body), "Access token required");
    }

    #[tokio::test]
    async fn refresh_endpoint_rejects_access_tokens() {
        let keys = JwtKeys::from_ref(&AppState::fake());
        let access = keys.sign_access(Uuid::new_v4()).unwrap();
        let req = Request::post("/api/auth/refresh")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(format!(r#"{{"refreshToken":"{access}"}}"#)))
            .unwrap();
        let (status, body) = call(req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(error_message(&body), "not a refresh token");
    }

    #[tokio::test]
    async fn invalid_registration_is_rejected_before_the_database() {
        let req = Request::post("/api/auth/register")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                r#"{"name":"Ada","email":"nope","phone":"5551234567","password":"secret1"}"#,
            ))
            .unwrap();
        let (status, body) = call(req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_message(&body), "Invalid email");
    }

    #[tokio::test]
    async fn malformed_json_body_is_a_json_error() {
        let req = Request::post("/api/auth/register")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{bad json"))
            .unwrap();
        let (status, body) = call(req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(error_message(&body).starts_with("Failed to parse the request body as JSON"));
    }

    #[tokio::test]
    async fn missing_content_type_is_a_json_error() {
        let req = Request::post("/api/auth/login")
            .body(Body::from(r#"{"email":"a@b.co","password":"secret1"}"#))
            .unwrap();
        let (status, body) = call(req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!error_message(&body).is_empty());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn malformed_path_and_query_are_json_errors(db: PgPool) {
        let state = AppState::with_pool(db.clone());
        let admin = seed(&db, "admin@example.com", Role::Admin).await;
        let auth = bearer(&state, &admin);

        let req = Request::post("/api/qr/generate/not-a-uuid")
            .header(header::AUTHORIZATION, &auth)
            .body(Body::empty())
            .unwrap();
        let (status, body) = call_with(state.clone(), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(error_message(&body).starts_with("Invalid URL"));

        let req = Request::get("/api/qr/scans?scanType=exit")
            .header(header::AUTHORIZATION, &auth)
            .body(Body::empty())
            .unwrap();
        let (status, body) = call_with(state.clone(), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(error_message(&body).starts_with("Failed to deserialize query string"));

        let req = Request::post("/api/qr/scan")
            .header(header::AUTHORIZATION, &auth)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{bad json"))
            .unwrap();
        let (status, body) = call_with(state, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(error_message(&body).starts_with("Failed to parse the request body as JSON"));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn other_users_are_forbidden_whether_or_not_they_exist(db: PgPool) {
        let state = AppState::with_pool(db.clone());
        let ada = seed(&db, "ada@example.com", Role::User).await;
        let bob = seed(&db, "bob@example.com", Role::User).await;
        let auth = bearer(&state, &ada);

        for target in [bob.id, Uuid::new_v4()] {
            let req = Request::get(format!("/api/users/{target}"))
                .header(header::AUTHORIZATION, &auth)
                .body(Body::empty())
                .unwrap();
            let (status, body) = call_with(state.clone(), req).await;
            assert_eq!(status, StatusCode::FORBIDDEN);
            assert_eq!(error_message(&body), "Access denied");
        }

        let req = Request::get(format!("/api/users/{}", ada.id))
            .header(header::AUTHORIZATION, &auth)
            .body(Body::empty())
            .unwrap();
        let (status, _) = call_with(state, req).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn registering_a_taken_email_conflicts(db: PgPool) {
        let state = AppState::with_pool(db.clone());
        seed(&db, "ada@example.com", Role::User).await;

        let req = Request::post("/api/auth/register")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                r#"{"name":"Ada","email":"ADA@example.com","phone":"5551234567","password":"secret1"}"#,
            ))
            .unwrap();
        let (status, body) = call_with(state, req).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error_message(&body), "Email already registered");
    }
}
