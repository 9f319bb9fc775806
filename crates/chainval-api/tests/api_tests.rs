//! Exercises the router in-process.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chainval_api::{create_app, AppState};
use chainval_validate::Validator;
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> Router {
    create_app(AppState::new(Validator::builtin().unwrap()))
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value, Option<String>) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let request_id = response
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body, request_id)
}

fn post(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/validate")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn binding(b: u32) -> Value {
    json!({
        "struct": {
            "fields": {
                "binding": { "u32": b },
                "descriptorType": { "enum": 0 },
                "descriptorCount": { "u32": 1 },
                "stageFlags": { "flags": 1 }
            }
        }
    })
}

#[tokio::test]
async fn test_health() {
    let (status, body, request_id) = send(app(), get("/v1/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["rules"].as_u64().unwrap() > 0);
    assert!(request_id.is_some());
}

#[tokio::test]
async fn test_validate_duplicate_bindings() {
    let request = json!({
        "param": "pCreateInfo",
        "argument": {
            "tag": 32,
            "record": {
                "fields": {
                    "flags": { "flags": 0 },
                    "bindingCount": { "u32": 2 },
                    "pBindings": { "array": [binding(5), binding(5)] }
                }
            }
        }
    });
    let (status, body, _) = send(app(), post(request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["skip_call"], true);
    let diagnostics = body["diagnostics"].as_array().unwrap();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0]["location"], "pCreateInfo->pBindings[1]");
    assert_eq!(
        body["messages"][0]["text"],
        "pBindings[1].binding and pBindings[0].binding are both 5"
    );
    assert!(body["fingerprint"].as_str().unwrap().starts_with("blake3:"));
}

#[tokio::test]
async fn test_validate_empty_chain() {
    let (status, body, _) = send(app(), post(json!({ "chain": true }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["nodes_visited"], 0);
    assert_eq!(body["diagnostics"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_validate_requires_argument() {
    let (status, body, _) = send(app(), post(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("argument"));
}

#[tokio::test]
async fn test_list_types_and_rules() {
    let (status, body, _) = send(app(), get("/v1/registry/types")).await;
    assert_eq!(status, StatusCode::OK);
    let types = body["types"].as_array().unwrap();
    assert!(types
        .iter()
        .any(|t| t["name"] == "VkDescriptorSetLayoutCreateInfo" && t["tag"] == 32));

    let (status, body, _) = send(app(), get("/v1/rules")).await;
    assert_eq!(status, StatusCode::OK);
    let rules = body["rules"].as_array().unwrap();
    let custom = rules
        .iter()
        .find(|r| r["id"] == "VUID-VkSpecializationInfo-offset-00773")
        .unwrap();
    assert_eq!(custom["shape"], "custom");
    assert!(custom.get("expression").is_none());
}

#[tokio::test]
async fn test_metrics_after_validation() {
    let app = app();
    send(app.clone(), post(json!({ "chain": true }))).await;
    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("chainval_validations_total"));
}
