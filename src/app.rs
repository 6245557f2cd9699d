use std::net::SocketAddr;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::{auth, images};

pub fn build_app(state: AppState) -> Router {
    let max_upload_bytes = state.config.max_upload_bytes;
    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(auth::router())
                .merge(images::router(max_upload_bytes))
                .route("/health", get(|| async { "ok" })),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
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
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn json_req(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut b = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(t) = token {
            b = b.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        b.body(Body::from(body.to_string())).unwrap()
    }

    fn upload_req(token: &str, user_id: &str, title: &str) -> Request<Body> {
        let boundary = "XBOUNDARYX";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.png\"\r\n\
             Content-Type: image/png\r\n\r\nPNGDATA\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\n{title}\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"description\"\r\n\r\nbeach\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"userId\"\r\n\r\n{user_id}\r\n\
             --{b}--\r\n",
            b = boundary,
        );
        Request::builder()
            .method(Method::POST)
            .uri("/api/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::from(body))
            .unwrap()
    }

    async fn auth(app: &Router, action: &str, email: &str, password: &str) -> (StatusCode, Value) {
        call(
            app,
            json_req(
                Method::POST,
                "/api/auth",
                None,
                json!({ "email": email, "password": password, "action": action }),
            ),
        )
        .await
    }

    async fn signed_up(app: &Router, email: &str) -> (String, String) {
        let (status, body) = auth(app, "register", email, "secret1").await;
        assert_eq!(status, StatusCode::OK);
        (
            body["user"]["id"].as_str().unwrap().to_string(),
            body["token"].as_str().unwrap().to_string(),
        )
    }

    #[tokio::test]
    async fn health() {
        let app = build_app(AppState::fake());
        let res = app
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn auth_scenario() {
        let app = build_app(AppState::fake());

        let (status, body) = auth(&app, "register", "a@x.com", "secret1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], 200);
        assert_eq!(body["user"]["email"], "a@x.com");
        assert!(body["user"].get("password_hash").is_none());
        let id = body["user"]["id"].clone();

        let (status, body) = auth(&app, "register", "a@x.com", "other").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "User already exists");
        assert_eq!(body["status"], 409);

        let (status, body) = auth(&app, "login", "a@x.com", "wrong").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid password");

        let (status, body) = auth(&app, "login", "missing@x.com", "secret1").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "User not found");

        let (status, body) = auth(&app, "login", "a@x.com", "secret1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["id"], id);
        assert_eq!(body["user"]["email"], "a@x.com");
        assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
    }

    #[tokio::test]
    async fn auth_rejects_unknown_action_and_bad_json() {
        let app = build_app(AppState::fake());
        let (status, body) = auth(&app, "reset", "a@x.com", "secret1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid action");

        let (status, body) = call(
            &app,
            json_req(
                Method::POST,
                "/api/auth",
                None,
                json!({ "email": "a@x.com", "password": "secret1" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid action");

        let req = Request::post("/api/auth")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = call(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], 400);
    }

    #[tokio::test]
    async fn upload_archive_share_delete_flow() {
        let app = build_app(AppState::fake());
        let (user_id, token) = signed_up(&app, "owner@x.com").await;

        let (status, body) = call(&app, upload_req(&token, &user_id, "Sunset")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], 200);
        let image = body["image"].clone();
        assert_eq!(image["title"], "Sunset");
        assert_eq!(image["description"], "beach");
        assert_eq!(image["ownerId"], user_id.as_str());
        assert_eq!(image["isArchived"], false);
        let id = image["id"].as_str().unwrap().to_string();
        let url = image["url"].as_str().unwrap().to_string();

        let (status, body) =
            call(&app, Request::get("/api/images").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["images"].as_array().unwrap().len(), 1);

        let (status, body) = call(
            &app,
            json_req(
                Method::PUT,
                "/api/images/archive",
                Some(&token),
                json!({ "id": id, "isArchived": true }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isArchived"], true);

        let (_, body) = call(&app, Request::get("/api/images").body(Body::empty()).unwrap()).await;
        assert!(body["images"].as_array().unwrap().is_empty());
        let (_, body) = call(
            &app,
            Request::get("/api/images?archived=true").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(body["images"][0]["id"], id.as_str());

        let (status, body) = call(
            &app,
            json_req(Method::POST, "/api/images/share", None, json!({ "id": id })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["shareUrl"], url.as_str());

        let (status, body) = call(
            &app,
            json_req(Method::DELETE, "/api/images/delete", Some(&token), json!({ "id": id })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Image deleted successfully");

        let (status, _) = call(
            &app,
            json_req(Method::POST, "/api/images/share", None, json!({ "id": id })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn mutations_need_owner_token() {
        let app = build_app(AppState::fake());
        let (owner_id, owner_token) = signed_up(&app, "owner@x.com").await;
        let (_, stranger_token) = signed_up(&app, "stranger@x.com").await;

        let (_, body) = call(&app, upload_req(&owner_token, &owner_id, "mine")).await;
        let id = body["image"]["id"].as_str().unwrap().to_string();

        let (status, body) = call(
            &app,
            json_req(Method::DELETE, "/api/images/delete", None, json!({ "id": id })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status"], 401);

        let (status, _) = call(
            &app,
            json_req(
                Method::PUT,
                "/api/images/archive",
                Some(&stranger_token),
                json!({ "id": id, "isArchived": true }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(
            &app,
            json_req(Method::DELETE, "/api/images/delete", Some(&stranger_token), json!({ "id": id })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // uploading in someone else's name
        let (status, _) = call(&app, upload_req(&stranger_token, &owner_id, "spoof")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (_, body) = call(&app, Request::get("/api/images").body(Body::empty()).unwrap()).await;
        assert_eq!(body["images"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn upload_without_title_is_rejected() {
        let app = build_app(AppState::fake());
        let (user_id, token) = signed_up(&app, "t@x.com").await;

        let (status, body) = call(&app, upload_req(&token, &user_id, "")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Missing required field: title");

        let (_, body) = call(&app, Request::get("/api/images").body(Body::empty()).unwrap()).await;
        assert!(body["images"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_upload_is_bad_gateway() {
        let app = build_app(AppState::fake_with_gateway(
            crate::testing::FakeGateway::failing(),
        ));
        let (user_id, token) = signed_up(&app, "g@x.com").await;

        let (status, body) = call(&app, upload_req(&token, &user_id, "x")).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["message"], "Upload failed");
    }
}
