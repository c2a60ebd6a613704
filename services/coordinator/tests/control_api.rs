//! Integration tests for the HTTP control surface.
//!
//! Drives the full router with mock collaborators:
//! - MockInvoker for checkpoint and restore
//! - MockPodApi for the control plane
//! - MockPeer for the destination coordinator

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use wormhole_coordinator::api;
use wormhole_coordinator::coordinator::{MigrationCoordinator, DEFAULT_RUNTIME_SCHEME};
use wormhole_coordinator::invoker::MockInvoker;
use wormhole_coordinator::peer::MockPeer;
use wormhole_coordinator::pods::{
    BackoffPolicy, MockPodApi, PodCall, PodDefaults, PodLifecycle, PodOperation, PodPhase,
    ReadyPolicy,
};
use wormhole_coordinator::registry::DestinationRegistry;
use wormhole_coordinator::state::AppState;

struct TestApp {
    router: Router,
    checkpointer: Arc<MockInvoker>,
    restorer: Arc<MockInvoker>,
    api: Arc<MockPodApi>,
    peer: Arc<MockPeer>,
}

fn test_policy() -> ReadyPolicy {
    ReadyPolicy {
        timeout: Duration::from_millis(200),
        backoff: BackoffPolicy {
            base: Duration::from_millis(1),
            max: Duration::from_millis(10),
            jitter: 0.0,
        },
    }
}

fn test_app_with(api: MockPodApi, restorer: MockInvoker) -> TestApp {
    let checkpointer = Arc::new(MockInvoker::new());
    let restorer = Arc::new(restorer);
    let api = Arc::new(api);
    let peer = Arc::new(MockPeer::new());

    let coordinator = MigrationCoordinator::new(
        Arc::new(DestinationRegistry::new()),
        checkpointer.clone(),
        PodLifecycle::new(api.clone(), test_policy()),
        peer.clone(),
        PodDefaults::default(),
        DEFAULT_RUNTIME_SCHEME,
    );
    let router = api::create_router(AppState::new(coordinator, restorer.clone()));

    TestApp {
        router,
        checkpointer,
        restorer,
        api,
        peer,
    }
}

fn test_app() -> TestApp {
    test_app_with(
        MockPodApi::new()
            .with_phases(vec![PodPhase::Pending, PodPhase::Running])
            .with_container_id(Some("containerd://abc123")),
        MockInvoker::new(),
    )
}

async fn get(router: &Router, uri: &str) -> (StatusCode, String) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn test_hello() {
    let app = test_app();

    let (status, body) = get(&app.router, "/hello").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Hello!\n");
}

#[tokio::test]
async fn test_healthz_reports_destination() {
    let app = test_app();

    let (status, body) = get(&app.router, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    let health: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["service"], "wormhole");
    assert_eq!(health["destination_configured"], false);

    get(&app.router, "/configure?addr=http://10.0.0.2:8080&host=node-b").await;

    let (_, body) = get(&app.router, "/healthz").await;
    let health: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(health["destination_configured"], true);
}

#[tokio::test]
async fn test_configure_missing_params() {
    let app = test_app();

    let (status, body) = get(&app.router, "/configure?host=node-b").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Url Param 'addr' is missing\n");

    let (_, body) = get(&app.router, "/configure?addr=&host=node-b").await;
    assert_eq!(body, "Url Param 'addr' is missing\n");

    let (_, body) = get(&app.router, "/configure?addr=http://10.0.0.2:8080").await;
    assert_eq!(body, "Url Param 'host' is missing\n");

    let (_, body) = get(&app.router, "/configure").await;
    assert_eq!(body, "Url Param 'addr' is missing\n");

    let (_, body) = get(&app.router, "/healthz").await;
    let health: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(health["destination_configured"], false);
}

#[tokio::test]
async fn test_configure_latest_call_wins() {
    let app = test_app();

    let (_, body) = get(&app.router, "/configure?addr=http://10.0.0.9:8080&host=node-z").await;
    assert_eq!(body, "Destination configured\n");
    get(&app.router, "/configure?addr=http://10.0.0.2:8080&host=node-b").await;

    let (_, body) = get(&app.router, "/migrate?id=container-123").await;
    assert_eq!(body, "Migration complete\n");

    assert_eq!(
        app.peer.notifications(),
        vec![("http://10.0.0.2:8080".to_string(), "abc123".to_string())]
    );
    assert!(app.api.calls().contains(&PodCall::Create {
        namespace: "default".to_string(),
        name: "restored".to_string(),
        node: Some("node-b".to_string()),
    }));
}

#[tokio::test]
async fn test_migrate_before_configure() {
    let app = test_app();

    let (status, body) = get(&app.router, "/migrate?id=container-123").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Destination not configured\n");

    // The destination check comes before the parameter check
    let (_, body) = get(&app.router, "/migrate").await;
    assert_eq!(body, "Destination not configured\n");

    assert!(app.checkpointer.calls().is_empty());
    assert!(app.api.calls().is_empty());
    assert!(app.peer.notifications().is_empty());
}

#[tokio::test]
async fn test_migrate_missing_id() {
    let app = test_app();
    get(&app.router, "/configure?addr=http://10.0.0.2:8080&host=node-b").await;

    let (status, body) = get(&app.router, "/migrate?id=").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Url Param 'id' is missing\n");
    assert!(app.checkpointer.calls().is_empty());
}

#[tokio::test]
async fn test_migrate_full_sequence() {
    let app = test_app();
    get(&app.router, "/configure?addr=http://10.0.0.2:8080&host=node-b").await;

    let (status, body) = get(&app.router, "/migrate?id=container-123").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Migration complete\n");

    assert_eq!(app.checkpointer.calls(), vec!["container-123".to_string()]);

    let calls = app.api.calls();
    assert_eq!(
        calls[0],
        PodCall::Delete {
            namespace: "default".to_string(),
            name: "workload".to_string(),
        }
    );
    assert_eq!(
        calls[1],
        PodCall::Create {
            namespace: "default".to_string(),
            name: "restored".to_string(),
            node: Some("node-b".to_string()),
        }
    );
    assert!(calls[2..]
        .iter()
        .all(|c| matches!(c, PodCall::Get { name, .. } if name == "restored")));

    assert_eq!(
        app.peer.notifications(),
        vec![("http://10.0.0.2:8080".to_string(), "abc123".to_string())]
    );
}

#[tokio::test]
async fn test_migrate_failure_is_reported_not_fatal() {
    let app = test_app_with(
        MockPodApi::new().failing_on(PodOperation::Create),
        MockInvoker::new(),
    );
    get(&app.router, "/configure?addr=http://10.0.0.2:8080&host=node-b").await;

    let (migrate, hello) = tokio::join!(
        get(&app.router, "/migrate?id=container-123"),
        get(&app.router, "/hello"),
    );

    let (status, body) = migrate;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body.contains("destination scheduling failed"));
    assert!(body.contains("Completed steps: checkpoint, delete"));
    assert_eq!(hello, (StatusCode::OK, "Hello!\n".to_string()));

    assert!(app.peer.notifications().is_empty());
    assert_eq!(app.api.count(PodOperation::Get), 0);

    // The coordinator keeps serving after a failed migration
    let (_, body) = get(&app.router, "/configure?addr=http://10.0.0.3:8080&host=node-c").await;
    assert_eq!(body, "Destination configured\n");
}

#[tokio::test]
async fn test_migrate_timeout_status() {
    let app = test_app_with(
        MockPodApi::new().with_phases(vec![PodPhase::Pending]),
        MockInvoker::new(),
    );
    get(&app.router, "/configure?addr=http://10.0.0.2:8080&host=node-b").await;

    let (status, body) = get(&app.router, "/migrate?id=container-123").await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert!(body.contains("never became ready"));
    assert!(app.peer.notifications().is_empty());
}

#[tokio::test]
async fn test_restore_is_best_effort() {
    let app = test_app_with(MockPodApi::new(), MockInvoker::failing());

    let (status, body) = get(&app.router, "/restore?id=xyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Restore complete\n");
    assert_eq!(app.restorer.calls(), vec!["xyz".to_string()]);
}

#[tokio::test]
async fn test_restore_success() {
    let app = test_app();

    let (_, body) = get(&app.router, "/restore?id=xyz").await;
    assert_eq!(body, "Restore complete\n");
    assert_eq!(app.restorer.calls(), vec!["xyz".to_string()]);
    assert!(app.checkpointer.calls().is_empty());
}

#[tokio::test]
async fn test_repeated_params_use_first_value() {
    let app = test_app();

    let (status, body) = get(&app.router, "/restore?id=a&id=b").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Restore complete\n");
    assert_eq!(app.restorer.calls(), vec!["a".to_string()]);

    let (status, body) = get(
        &app.router,
        "/configure?addr=http://10.0.0.2:8080&addr=http://10.0.0.9:8080&host=node-b",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Destination configured\n");

    let (status, body) = get(&app.router, "/migrate?id=container-123&id=other").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Migration complete\n");
    assert_eq!(app.checkpointer.calls(), vec!["container-123".to_string()]);
    assert_eq!(
        app.peer.notifications(),
        vec![("http://10.0.0.2:8080".to_string(), "abc123".to_string())]
    );
}

#[tokio::test]
async fn test_repeated_params_with_empty_first_value() {
    let app = test_app();

    let (status, body) = get(&app.router, "/configure?addr=&addr=http://10.0.0.2:8080&host=node-b").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Url Param 'addr' is missing\n");
}

#[tokio::test]
async fn test_restore_missing_id() {
    let app = test_app();

    let (status, body) = get(&app.router, "/restore").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Url Param 'id' is missing\n");
    assert!(app.restorer.calls().is_empty());
}
