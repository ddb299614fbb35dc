//! HTTP surface tests driven through the router without binding a port.

mod fixtures;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::util::ServiceExt;

use dockhand::{router, AppState, DockhandConfig};
use fixtures::{build_stale_scenario, GitFixture};

fn state_for(fx: &GitFixture) -> Arc<AppState> {
    let mut config = DockhandConfig::default();
    config.repository.path = fx.work.display().to_string();
    AppState::from_config(&config)
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_reports_configuration() {
    let fx = GitFixture::new();
    fx.commit_file("README.md", "hello\n", "initial commit");
    let app = router(state_for(&fx));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["restart_command_configured"], false);
}

#[tokio::test]
async fn git_info_returns_repository_state() {
    let fx = GitFixture::new();
    fx.commit_file("README.md", "hello\n", "initial commit");
    fx.git(&["tag", "v1.0"]);
    fx.commit_file("next.txt", "next\n", "second commit");
    let app = router(state_for(&fx));

    let response = app
        .oneshot(Request::builder().uri("/git/info").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["current_ref"], "main");
    assert!(body["branches"]
        .as_array()
        .unwrap()
        .iter()
        .any(|b| b == "main"));
    assert!(body["tags"].as_array().unwrap().iter().any(|t| t == "v1.0"));
    assert_eq!(body["log"].as_array().unwrap().len(), 2);
    assert!(body["errors"].as_object().unwrap().is_empty());
}

#[tokio::test]
async fn git_info_on_invalid_path_is_a_server_error() {
    let mut config = DockhandConfig::default();
    config.repository.path = "/nonexistent/dockhand-server-test".to_string();
    let app = router(AppState::from_config(&config));

    let response = app
        .oneshot(Request::builder().uri("/git/info").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("not a git repository")
        || body["error"].as_str().unwrap().contains("missing"));
}

#[tokio::test]
async fn checkout_with_empty_ref_is_bad_request() {
    let fx = GitFixture::new();
    fx.commit_file("README.md", "hello\n", "initial commit");
    let app = router(state_for(&fx));

    let response = app
        .oneshot(post_json("/git/checkout", r#"{"ref": ""}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("empty"));
}

#[tokio::test]
async fn checkout_switches_and_reports_output() {
    let fx = GitFixture::new();
    fx.commit_file("README.md", "hello\n", "initial commit");
    fx.git(&["branch", "feature"]);
    let app = router(state_for(&fx));

    let response = app
        .oneshot(post_json("/git/checkout", r#"{"ref": "feature"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["message"], "checkout to 'feature' successful");
    assert_eq!(fx.git(&["rev-parse", "--abbrev-ref", "HEAD"]), "feature");
}

#[tokio::test]
async fn checkout_of_unknown_ref_is_a_server_error_with_stderr() {
    let fx = GitFixture::new();
    fx.commit_file("README.md", "hello\n", "initial commit");
    let app = router(state_for(&fx));

    let response = app
        .oneshot(post_json("/git/checkout", r#"{"ref": "no-such-branch"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert!(!body["stderr"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn deleting_the_active_branch_is_bad_request() {
    let fx = GitFixture::new();
    fx.commit_file("README.md", "hello\n", "initial commit");
    let app = router(state_for(&fx));

    let response = app
        .oneshot(post_json("/git/branch/delete", r#"{"name": "main"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("currently checked-out"));
}

#[tokio::test]
async fn stale_scan_route_reports_verdicts() {
    let fx = GitFixture::new();
    build_stale_scenario(&fx);
    let app = router(state_for(&fx));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/git/branches/stale")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let stale = body["stale_branches"].as_array().unwrap();
    assert_eq!(stale.len(), 2);
    assert_eq!(stale[0]["name"], "feature-x");
    assert_eq!(stale[0]["status"], "safe_to_delete");
    assert_eq!(stale[1]["name"], "feature-y");
    assert_eq!(stale[1]["status"], "has_local_changes");
    assert_eq!(stale[1]["ahead"], 2);
}

#[tokio::test]
async fn delete_safe_route_reports_per_branch_outcomes() {
    let fx = GitFixture::new();
    build_stale_scenario(&fx);
    let app = router(state_for(&fx));

    let response = app
        .oneshot(post_json("/git/branches/delete-safe", "{}"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["name"], "feature-x");
    assert_eq!(results[0]["result"]["success"], true);
}

#[tokio::test]
async fn restart_route_without_configuration_is_a_server_error() {
    let fx = GitFixture::new();
    fx.commit_file("README.md", "hello\n", "initial commit");
    let app = router(state_for(&fx));

    let response = app
        .oneshot(post_json("/service/restart", "{}"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("not configured"));
}

#[tokio::test]
async fn logs_route_returns_recent_records_in_order() {
    let fx = GitFixture::new();
    fx.commit_file("README.md", "hello\n", "initial commit");
    let state = state_for(&fx);
    state.oplog.info("first");
    state.oplog.success("second");
    state.oplog.error("third");
    let app = router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/logs?limit=2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let records = body["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["message"], "second");
    assert_eq!(records[0]["severity"], "success");
    assert_eq!(records[1]["message"], "third");
    assert_eq!(records[1]["severity"], "error");
}
