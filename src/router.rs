use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::AppState;

/// Build the application router with all routes
pub fn build(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(handlers::healthcheck))
        // Plan routes
        .route("/api/plans", get(handlers::plans::list_plans).post(handlers::plans::create_plan))
        .route("/api/plans/:id", get(handlers::plans::get_plan).delete(handlers::plans::delete_plan))
        // Layout routes
        .route("/api/plans/:id/layouts", get(handlers::plans::list_layouts))
        .route("/api/plans/:id/layouts", post(handlers::layouts::create_layout))
        .route(
            "/api/layouts/:id",
            get(handlers::layouts::get_layout)
                .put(handlers::layouts::update_layout)
                .delete(handlers::layouts::delete_layout),
        )
        .route("/api/layouts/:id/report", get(handlers::layouts::get_report))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::db::Store;

    async fn test_app() -> (Router, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("ipplan.db");
        let store = Store::with_pool_size(db_path.to_str().unwrap(), 1).await.unwrap();
        (build(Arc::new(AppState { store })), dir)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _dir) = test_app().await;
        let (status, body) = send(&app, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_layout_lifecycle() {
        let (app, _dir) = test_app().await;
        let (status, plan) = send(
            &app,
            "POST",
            "/api/plans",
            Some(serde_json::json!({"prefix": "2001:503:ba3e::/48", "mask_len": 64})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let plan_id = plan["id"].as_i64().unwrap();

        let nodes = serde_json::json!([
            {"id": 1, "pid": 0, "name": "root", "sequence": 0, "bit_width": 0},
            {"id": 2, "pid": 1, "name": "east", "sequence": 1, "bit_width": 16},
            {"id": 3, "pid": 1, "name": "west", "sequence": 2, "bit_width": 16}
        ]);
        let (status, layout) = send(
            &app,
            "POST",
            &format!("/api/plans/{}/layouts", plan_id),
            Some(serde_json::json!({"name": "regions", "auto_fill": true, "nodes": nodes})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let layout_id = layout["id"].as_i64().unwrap();
        assert_eq!(layout["nodes"][1]["prefix"], "2001:503:ba3e:1::/64");

        let (status, report) = send(&app, "GET", &format!("/api/layouts/{}/report", layout_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report.as_array().unwrap().len(), 2);
        assert_eq!(report[1]["name"], "west");
        assert_eq!(report[1]["level"], "2");
        assert_eq!(report[1]["usage"], "0%");

        let (status, listed) = send(&app, "GET", &format!("/api/plans/{}/layouts", plan_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let (status, _) = send(&app, "DELETE", &format!("/api/layouts/{}", layout_id), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, body) = send(&app, "GET", &format!("/api/layouts/{}", layout_id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Layout not found");
    }

    #[tokio::test]
    async fn test_update_layout() {
        let (app, _dir) = test_app().await;
        let (_, plan) = send(
            &app,
            "POST",
            "/api/plans",
            Some(serde_json::json!({"prefix": "2001:503:ba3e::/48", "mask_len": 64})),
        )
        .await;
        let nodes = serde_json::json!([
            {"id": 1, "pid": 0, "name": "root", "sequence": 0, "bit_width": 0},
            {"id": 2, "pid": 1, "name": "east", "sequence": 1, "bit_width": 16}
        ]);
        let (_, layout) = send(
            &app,
            "POST",
            &format!("/api/plans/{}/layouts", plan["id"]),
            Some(serde_json::json!({"name": "regions", "auto_fill": true, "nodes": nodes})),
        )
        .await;
        let layout_id = layout["id"].as_i64().unwrap();
        let root_id = layout["nodes"][0]["id"].as_i64().unwrap();

        let mut nodes = layout["nodes"].as_array().unwrap().clone();
        nodes.push(serde_json::json!({"id": 0, "pid": root_id, "name": "west", "sequence": 2, "bit_width": 16}));
        let (status, updated) = send(
            &app,
            "PUT",
            &format!("/api/layouts/{}", layout_id),
            Some(serde_json::json!({"name": "regions-v2", "auto_fill": true, "nodes": nodes})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["name"], "regions-v2");
        assert_eq!(updated["nodes"].as_array().unwrap().len(), 3);
        assert_eq!(updated["nodes"][1]["id"], layout["nodes"][1]["id"]);
        assert_eq!(updated["nodes"][2]["name"], "west");
        assert_eq!(updated["nodes"][2]["pid"], root_id);
        assert_eq!(updated["nodes"][2]["prefix"], "2001:503:ba3e:2::/64");

        let (status, fetched) = send(&app, "GET", &format!("/api/layouts/{}", layout_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["name"], "regions-v2");
        assert_eq!(fetched["nodes"], updated["nodes"]);

        let (status, _) = send(
            &app,
            "PUT",
            "/api/layouts/999",
            Some(serde_json::json!({"name": "ghost", "auto_fill": true, "nodes": []})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let (app, _dir) = test_app().await;
        let (status, _) = send(
            &app,
            "POST",
            "/api/plans",
            Some(serde_json::json!({"prefix": "2001:503:ba3e::1/48", "mask_len": 64})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, plan) = send(
            &app,
            "POST",
            "/api/plans",
            Some(serde_json::json!({"prefix": "2001:503:ba3e::/48", "mask_len": 64})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let plan_id = plan["id"].as_i64().unwrap();

        let (status, _) = send(
            &app,
            "POST",
            "/api/plans",
            Some(serde_json::json!({"prefix": "2001:503:ba3e::/48", "mask_len": 56})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let too_wide = serde_json::json!([
            {"id": 1, "pid": 0, "name": "root", "sequence": 0, "bit_width": 0},
            {"id": 2, "pid": 1, "name": "huge", "sequence": 1, "bit_width": 17}
        ]);
        let (status, _) = send(
            &app,
            "POST",
            &format!("/api/plans/{}/layouts", plan_id),
            Some(serde_json::json!({"name": "huge", "auto_fill": true, "nodes": too_wide})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = send(&app, "GET", "/api/plans/999/layouts", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
