use axum::{routing::get, routing::post, Router};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::Config;
use crate::sky::Site;
use crate::telescope::TelescopeSession;

use super::api::telescope as telescope_handlers;
use super::api_doc::ApiDoc;
use super::auth::AppState;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/telescope/connect", post(telescope_handlers::connect))
        .route(
            "/api/telescope/disconnect",
            post(telescope_handlers::disconnect),
        )
        .route("/api/telescope/goto", post(telescope_handlers::goto))
        .route("/api/telescope/observe", post(telescope_handlers::observe))
        .route("/api/telescope/stop", post(telescope_handlers::stop))
        .route("/api/telescope/park", post(telescope_handlers::park))
        .route("/api/telescope/focus", post(telescope_handlers::focus))
        .route("/api/telescope/open-arm", post(telescope_handlers::open_arm))
        .route(
            "/api/telescope/auto-init",
            post(telescope_handlers::auto_init),
        )
        .route("/api/telescope/status", get(telescope_handlers::status))
        // OpenAPI / Swagger
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        // Middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(
    config: Config,
    site: Option<Site>,
    session: TelescopeSession,
) -> std::io::Result<()> {
    let bind_addr = config.web.bind.clone();
    let session = Arc::new(Mutex::new(session));

    let state = AppState {
        config: Arc::new(config),
        site,
        session: session.clone(),
    };

    log::info!("Starting server on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    let result = axum::serve(listener, router(state)).await;
    session.lock().await.disconnect();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telescope::{wait_until_connected, SessionOptions};
    use crate::transport::SimulatedTransport;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    const CONFIG: &str = r#"
telescope:
  host: 10.0.0.1
site:
  coordinates: "48.85, 2.35"
api_keys:
  - key: operator-key
    name: operator
    permissions: [control, read_status]
  - key: viewer-key
    name: viewer
    permissions: [read_status]
"#;

    fn state() -> AppState {
        let config = Config::from_yaml(CONFIG).unwrap();
        let site = config.site().unwrap();
        let transport = Arc::new(SimulatedTransport::new(Duration::from_millis(50)));
        let session = TelescopeSession::new(
            transport,
            Arc::new(site.unwrap_or_default()),
            SessionOptions::default(),
        );
        AppState {
            config: Arc::new(config),
            site,
            session: Arc::new(Mutex::new(session)),
        }
    }

    fn request(method: &str, uri: &str, key: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(key) = key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }
        match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn call(state: &AppState, req: Request<Body>) -> (StatusCode, Value) {
        let response = router(state.clone()).oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn requests_need_a_known_key() {
        let state = state();
        let (status, _) = call(&state, request("GET", "/api/telescope/status", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(
            &state,
            request("GET", "/api/telescope/status", Some("bogus"), None),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = call(
            &state,
            request("GET", "/api/telescope/status", Some("viewer-key"), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], json!("disconnected"));
    }

    #[tokio::test]
    async fn viewers_cannot_control() {
        let state = state();
        let (status, _) = call(
            &state,
            request("POST", "/api/telescope/park", Some("viewer-key"), None),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn commands_before_connect_conflict() {
        let state = state();
        let (status, body) = call(
            &state,
            request(
                "POST",
                "/api/telescope/goto",
                Some("operator-key"),
                Some(json!({ "ra": 10.0, "dec": 20.0, "name": "M31" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], json!("not_connected"));
    }

    #[tokio::test]
    async fn connect_uses_configured_host_and_commands_follow() {
        let state = state();
        let mut events = state.session.lock().await.subscribe();

        let (status, body) = call(
            &state,
            request(
                "POST",
                "/api/telescope/connect",
                Some("operator-key"),
                Some(json!({})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["state"], json!("connecting"));
        assert_eq!(body["host"], json!("10.0.0.1"));
        assert_eq!(body["port"], json!(8082));

        wait_until_connected(&mut events).await.unwrap();

        let (status, body) = call(
            &state,
            request(
                "POST",
                "/api/telescope/observe",
                Some("operator-key"),
                Some(json!({ "ra": 83.8, "dec": -5.4, "name": "M 42" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["pose"]["target_name"], json!("M 42"));

        let (status, body) = call(
            &state,
            request(
                "POST",
                "/api/telescope/goto",
                Some("operator-key"),
                Some(json!({ "ra": 400.0, "dec": 20.0 })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("validation_failed"));

        let (status, _) = call(
            &state,
            request(
                "POST",
                "/api/telescope/auto-init",
                Some("operator-key"),
                Some(json!({})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let (status, body) = call(
            &state,
            request("POST", "/api/telescope/disconnect", Some("operator-key"), None),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["state"], json!("disconnected"));
        assert_eq!(body["authenticated"], json!(false));
    }

    #[tokio::test]
    async fn connect_rejects_bad_ports_as_validation_errors() {
        let state = state();
        for port in [json!(-1), json!(80.5), json!(0), json!(70000)] {
            let (status, body) = call(
                &state,
                request(
                    "POST",
                    "/api/telescope/connect",
                    Some("operator-key"),
                    Some(json!({ "port": port })),
                ),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "port {}", port);
            assert_eq!(body["error"], json!("validation_failed"));
        }
        assert_eq!(
            state.session.lock().await.status().state,
            crate::telescope::ConnectionState::Disconnected
        );

        let (status, _) = call(
            &state,
            request(
                "POST",
                "/api/telescope/connect",
                Some("viewer-key"),
                Some(json!({ "port": -1 })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn openapi_document_lists_telescope_routes() {
        let doc = serde_json::to_value(ApiDoc::openapi()).unwrap();
        assert!(doc["paths"]["/api/telescope/goto"].is_object());
        assert!(doc["paths"]["/api/telescope/status"].is_object());
    }
}
