use axum::{
    Json, Router,
    body::Body,
    http::{HeaderValue, Method, Request, StatusCode, header},
    middleware,
    middleware::Next,
    routing::{any, get, post},
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};

use super::AppState;
use super::handlers::{cron, detail, overview, routing, sessions, trends};

fn build_localhost_cors(api_port: u16) -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        format!("http://127.0.0.1:{}", api_port),
        format!("http://localhost:{}", api_port),
    ]
    .iter()
    .filter_map(|o| o.parse().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
}

async fn api_not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "ok": false, "error": "not found" })),
    )
}

pub fn build_api_router(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/api/health", get(overview::health))
        .route("/api/overview", get(overview::get_overview))
        .route("/api/agents", get(overview::get_agents))
        .route("/api/sessions", get(sessions::get_sessions))
        .route("/api/cron", get(cron::get_cron))
        .route("/api/cron/{id}/{action}", post(cron::mutate_cron))
        .route("/api/trends/agent-metrics", get(trends::agent_metrics))
        .route("/api/trends/cron-jobs", get(trends::cron_job_metrics))
        .route("/api/trends/p0", get(trends::alert_events))
        .route("/api/routing", get(routing::get_routing))
        .route("/api/logs", get(super::sse_logs_endpoint))
        // Unknown API paths must not fall through to the dashboard.
        .route("/api/{*rest}", any(api_not_found))
        .route("/detail/{session}", get(detail::session_detail));

    if let Some(dist) = &state.client_dist {
        let spa = ServeDir::new(dist).fallback(ServeFile::new(dist.join("index.html")));
        app = app.fallback_service(spa);
    }

    app.layer(middleware::from_fn(security_headers))
        .layer(build_localhost_cors(state.api_port))
        .with_state(state)
}

async fn security_headers(req: Request<Body>, next: Next) -> axum::response::Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(
            "default-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'",
        ),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::OpsConfig;
    use crate::core::gateway::mock::{MockGateway, agent, job, session};
    use crate::core::model::{CronAction, SessionWindow};
    use crate::core::monitor::Services;
    use crate::core::store::{MetricsStore, test_store};
    use crate::core::store::types::AgentMetricRow;
    use serde_json;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::util::ServiceExt;

    fn state_with(gateway: Arc<MockGateway>, store: Option<MetricsStore>) -> AppState {
        let services = Services::assemble(&OpsConfig::default(), gateway, store);
        let (log_tx, _) = tokio::sync::broadcast::channel(16);
        AppState {
            services,
            log_tx,
            api_port: 3412,
            stale_after_ms: 30_000,
            client_dist: None,
        }
    }

    async fn full_state() -> (AppState, Arc<MockGateway>, TempDir) {
        let gateway = Arc::new(MockGateway::new());
        let (store, dir) = test_store().await;
        (state_with(gateway.clone(), Some(store)), gateway, dir)
    }

    async fn json_request(app: Router, method: Method, path: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method(method)
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body_bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&body_bytes).unwrap_or(serde_json::json!({}));
        (status, json)
    }

    async fn text_request(app: Router, path: &str) -> (StatusCode, String) {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body_bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, String::from_utf8_lossy(&body_bytes).into_owned())
    }

    #[tokio::test]
    async fn security_headers_present_on_responses() {
        let (state, _gateway, _dir) = full_state().await;
        let app = build_api_router(state);

        let req = Request::builder()
            .method(Method::GET)
            .uri("/api/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(resp.headers().get("x-frame-options").unwrap(), "DENY");
        assert!(
            resp.headers()
                .get("content-security-policy")
                .unwrap()
                .to_str()
                .unwrap()
                .contains("default-src 'self'")
        );
    }

    #[tokio::test]
    async fn overview_is_unavailable_until_first_refresh() {
        let (state, gateway, _dir) = full_state().await;
        gateway.set_agents(vec![agent("main"), agent("ops")]);
        gateway.set_sessions(vec![session("agent:main:direct:1", "main", 1_500)]);
        gateway.set_jobs(vec![job("j1", "ops", json!({ "lastStatus": "error" }))]);
        let app = build_api_router(state.clone());

        let (status, body) = json_request(app.clone(), Method::GET, "/api/overview").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["ok"], false);

        state.services.refresher.refresh_primary().await.unwrap();

        let (status, body) = json_request(app, Method::GET, "/api/overview").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cached"], true);
        assert_eq!(body["version"], 1);
        assert_eq!(body["stale"], false);
        let agents = body["agents"].as_array().unwrap();
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[0]["agentId"], "main");
        assert_eq!(agents[0]["tokens24h"], 1_500);
        assert_eq!(agents[1]["cronErrors"], 1);
    }

    #[tokio::test]
    async fn cached_cron_list_hides_payload_message() {
        let (state, gateway, _dir) = full_state().await;
        gateway.set_agents(vec![agent("main")]);
        gateway.set_jobs(vec![job("j1", "main", json!({}))]);
        state.services.refresher.refresh_primary().await.unwrap();
        let app = build_api_router(state);

        let (status, body) = json_request(app, Method::GET, "/api/cron").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cached"], true);
        assert_eq!(body["total"], 1);
        assert!(!body.to_string().contains("secret"));
    }

    #[tokio::test]
    async fn cron_mutation_validates_action() {
        let (state, gateway, _dir) = full_state().await;
        let app = build_api_router(state);

        let (status, body) = json_request(app.clone(), Method::POST, "/api/cron/j1/delete").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid action");
        assert!(gateway.mutations().is_empty());

        let (status, body) = json_request(app, Method::POST, "/api/cron/j1/run").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["result"]["action"], "run");
        assert_eq!(gateway.mutations(), vec![("j1".to_string(), CronAction::Run)]);
    }

    #[tokio::test]
    async fn sessions_fall_back_to_direct_fetch_for_uncollected_window() {
        let (state, gateway, _dir) = full_state().await;
        gateway.set_window_sessions(
            SessionWindow::Week,
            vec![session("agent:main:direct:1", "main", 10)],
        );
        let app = build_api_router(state);

        let (status, body) = json_request(app.clone(), Method::GET, "/api/sessions?window=7d").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cached"], false);
        assert_eq!(body["window"], "7d");
        assert_eq!(body["activeMinutes"], 10080);
        assert_eq!(body["sessions"].as_array().unwrap().len(), 1);
        assert_eq!(body["sessions"][0]["keyKind"], "direct");

        let (_, body) = json_request(app, Method::GET, "/api/sessions?window=1y").await;
        assert_eq!(body["window"], "24h");
        assert_eq!(body["activeMinutes"], 1440);
    }

    #[tokio::test]
    async fn sessions_serve_collected_window_from_cache() {
        let (state, gateway, _dir) = full_state().await;
        gateway.set_window_sessions(
            SessionWindow::Month,
            vec![session("agent:a:direct:1", "a", 1), session("agent:b:direct:2", "b", 2)],
        );
        state
            .services
            .refresher
            .refresh_window(SessionWindow::Month)
            .await
            .unwrap();
        gateway.fail_sessions(SessionWindow::Month, true);
        let app = build_api_router(state);

        let (status, body) = json_request(app, Method::GET, "/api/sessions?window=30d").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cached"], true);
        assert_eq!(body["sessions"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn trends_default_to_seven_days_and_reject_bad_input() {
        let (state, _gateway, _dir) = full_state().await;
        let store = state.services.store.clone().unwrap();
        let now = crate::core::now_ms();
        let sample = AgentMetricRow {
            ts_ms: now - 1_000,
            agent_id: "main".to_string(),
            sessions_active: 1,
            tokens_24h_total: 42,
            cron_jobs: 0,
            cron_errors: 0,
        };
        store.record_tick(&[sample], &[]).await.unwrap();
        let app = build_api_router(state);

        let (status, body) = json_request(app.clone(), Method::GET, "/api/trends/agent-metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["days"], 7);
        assert_eq!(body["rows"][0]["tokens_24h_total"], 42);

        let (status, _) = json_request(app.clone(), Method::GET, "/api/trends/p0?days=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = json_request(app, Method::GET, "/api/trends/cron-jobs?days=abc").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["ok"], false);
    }

    #[tokio::test]
    async fn trends_report_missing_store() {
        let gateway = Arc::new(MockGateway::new());
        let app = build_api_router(state_with(gateway, None));

        let (status, body) = json_request(app, Method::GET, "/api/trends/p0").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["ok"], false);
    }

    #[tokio::test]
    async fn detail_page_only_serves_task_sessions() {
        let (state, gateway, _dir) = full_state().await;
        gateway.set_log("build ok\n<done>");
        let app = build_api_router(state);

        let (status, text) = text_request(app.clone(), "/detail/agent-main").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(text, "invalid session");

        let (status, text) = text_request(app, "/detail/cc-build").await;
        assert_eq!(status, StatusCode::OK);
        assert!(text.contains("&lt;done&gt;"));
    }

    #[tokio::test]
    async fn routing_lists_parsed_bindings() {
        let (state, gateway, _dir) = full_state().await;
        let bound = serde_json::from_value(json!({
            "id": "main",
            "bindings": ["telegram accountId=default peer=group:123"]
        }))
        .unwrap();
        gateway.set_agents(vec![bound, agent("idle")]);
        let app = build_api_router(state);

        let (status, body) = json_request(app, Method::GET, "/api/routing").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        let row = &body["rows"][0];
        assert_eq!(row["channel"], "telegram");
        assert_eq!(row["accountId"], "default");
        assert_eq!(row["peerLabel"], "group/123");
        assert_eq!(row["label"], "telegram @default (group/123) -> main");
        assert_eq!(body["telegramAccounts"], json!(["coding", "default"]));
        assert!(body["channelsError"].is_null());
    }

    #[tokio::test]
    async fn unknown_api_path_is_json_not_found() {
        let (state, _gateway, _dir) = full_state().await;
        let app = build_api_router(state);
        let (status, body) = json_request(app, Method::GET, "/api/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["ok"], false);
    }

    #[tokio::test]
    async fn method_not_allowed_returns_405() {
        let (state, _gateway, _dir) = full_state().await;
        let app = build_api_router(state);
        let (status, _) = json_request(app, Method::PATCH, "/api/overview").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn api_route_contract_has_all_expected_paths() {
        let paths = [
            "/api/health",
            "/api/overview",
            "/api/agents",
            "/api/sessions",
            "/api/cron",
            "/api/cron/j1/run",
            "/api/trends/agent-metrics",
            "/api/trends/cron-jobs",
            "/api/trends/p0",
            "/api/routing",
            "/api/logs",
        ];

        let unique: HashSet<&str> = paths.iter().copied().collect();
        assert_eq!(unique.len(), paths.len(), "Duplicate routes found in route contract");

        let (state, _gateway, _dir) = full_state().await;
        let app = build_api_router(state);
        for path in paths {
            let req = Request::builder()
                .method(Method::PUT)
                .uri(path)
                .body(Body::empty())
                .expect("request should build");
            let resp = app
                .clone()
                .oneshot(req)
                .await
                .expect("router oneshot should succeed");
            assert_eq!(
                resp.status(),
                StatusCode::METHOD_NOT_ALLOWED,
                "Route missing from router: {}",
                path
            );
        }
    }

    #[tokio::test]
    async fn dashboard_assets_fall_back_to_index() {
        let dist = tempfile::tempdir().unwrap();
        std::fs::write(dist.path().join("index.html"), "<div id=app></div>").unwrap();
        let gateway = Arc::new(MockGateway::new());
        let mut state = state_with(gateway, None);
        state.client_dist = Some(dist.path().to_path_buf());
        let app = build_api_router(state);

        let (status, text) = text_request(app.clone(), "/agents/main").await;
        assert_eq!(status, StatusCode::OK);
        assert!(text.contains("id=app"));

        let (status, _) = text_request(app, "/api/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
