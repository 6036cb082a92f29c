//! End-to-end exercise of the HTTP control surface over a real `Manager`,
//! using `tower::ServiceExt::oneshot` against the router directly (no bound
//! socket needed).

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use gateway_server::api::{create_api_routes, SharedAppState};
use gateway_server::manager::Manager;
use gateway_server::plugin::descriptor::{ModuleDescriptor, NodeKind};
use gateway_server::plugin::loader::register_builtin;
use gateway_server::plugin::Plugin;
use gateway_server::transport::{InMemoryTransport, Transport};

struct NoopDriver;
impl Plugin for NoopDriver {
    fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor {
            name: "fixture.driver".to_string(),
            kind: NodeKind::Driver,
            single: false,
        }
    }
}

struct NoopApp;
impl Plugin for NoopApp {
    fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor {
            name: "fixture.app".to_string(),
            kind: NodeKind::App,
            single: false,
        }
    }
}

fn register_fixtures() {
    register_builtin(
        "fixture.driver",
        ModuleDescriptor {
            name: "fixture.driver".to_string(),
            kind: NodeKind::Driver,
            single: false,
        },
        || Ok(Box::new(NoopDriver)),
    );
    register_builtin(
        "fixture.app",
        ModuleDescriptor {
            name: "fixture.app".to_string(),
            kind: NodeKind::App,
            single: false,
        },
        || Ok(Box::new(NoopApp)),
    );
}

fn app() -> axum::Router {
    register_fixtures();
    let transport: Arc<dyn Transport> = Arc::new(InMemoryTransport::new());
    let manager = Arc::new(Manager::new(transport));
    create_api_routes().with_state(SharedAppState { manager })
}

async fn send_json(
    app: &mut axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&v).unwrap())
        }
        None => Body::empty(),
    };
    let request = builder.body(body).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

#[tokio::test]
async fn plugin_and_node_lifecycle_round_trips_over_http() {
    let mut app = app();

    let (status, _) = send_json(
        &mut app,
        "POST",
        "/api/plugins",
        Some(json!({ "library_path": "builtin://fixture.driver" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send_json(
        &mut app,
        "POST",
        "/api/nodes",
        Some(json!({ "name": "drv1", "plugin": "fixture.driver", "start": true })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send_json(&mut app, "GET", "/api/nodes/drv1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "drv1");
    assert_eq!(body["state"], "Running");

    let (status, _) = send_json(&mut app, "DELETE", "/api/nodes/drv1", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send_json(&mut app, "GET", "/api/nodes/drv1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], gateway_server::GatewayError::NodeNotExist(String::new()).code());
}

#[tokio::test]
async fn subscribe_rejects_unknown_group_before_touching_subscription_registry() {
    let mut app = app();
    send_json(
        &mut app,
        "POST",
        "/api/plugins",
        Some(json!({ "library_path": "builtin://fixture.driver" })),
    )
    .await;
    send_json(
        &mut app,
        "POST",
        "/api/plugins",
        Some(json!({ "library_path": "builtin://fixture.app" })),
    )
    .await;
    send_json(
        &mut app,
        "POST",
        "/api/nodes",
        Some(json!({ "name": "drv", "plugin": "fixture.driver", "start": true })),
    )
    .await;
    send_json(
        &mut app,
        "POST",
        "/api/nodes",
        Some(json!({ "name": "app", "plugin": "fixture.app", "start": true })),
    )
    .await;

    let (status, _) = send_json(
        &mut app,
        "POST",
        "/api/subscriptions",
        Some(json!({ "app": "app", "driver": "drv", "group": "missing-group" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn template_instantiate_rolls_back_on_group_interval_violation() {
    let mut app = app();
    send_json(
        &mut app,
        "POST",
        "/api/plugins",
        Some(json!({ "library_path": "builtin://fixture.driver" })),
    )
    .await;

    let (status, _) = send_json(
        &mut app,
        "POST",
        "/api/templates",
        Some(json!({
            "name": "tmpl",
            "plugin": "fixture.driver",
            "groups": [{ "name": "g", "interval": 10, "tags": [] }],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send_json(
        &mut app,
        "POST",
        "/api/templates/tmpl/instantiate",
        Some(json!({ "node": "from-template" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send_json(&mut app, "GET", "/api/nodes/from-template", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
