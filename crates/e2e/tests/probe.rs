//! HTTP probe and readiness checks against a local stand-in server.

use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use authflow_e2e::config::ProbeConfig;
use authflow_e2e::probe::RequestOptions;
use authflow_e2e::readiness::wait_until_ready;
use authflow_e2e::{HarnessError, HttpProbe, Prober};

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn actuator() -> Router {
    Router::new()
        .route(
            "/cas/actuator/gauthCredentialRepository/casuser",
            get(|| async { Json(json!([{ "username": "casuser", "scratchCodes": [12345678, 87654321] }])) }),
        )
        .route("/cas/actuator/health", get(|| async { Json(json!({ "status": "UP" })) }))
        .route(
            "/cas/actuator/broken",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        )
        .route("/cas/actuator/html", get(|| async { "<html><body>login</body></html>" }))
        .route("/cas/actuator/echo", post(|body: String| async move { body }))
}

fn probe() -> HttpProbe {
    HttpProbe::new(&ProbeConfig::default()).unwrap()
}

#[tokio::test]
async fn test_get_json() {
    let base = serve(actuator()).await;
    let url = format!("{}/cas/actuator/gauthCredentialRepository/casuser", base);

    let payload = probe().get_json(&url).await.unwrap();
    assert_eq!(
        payload,
        json!([{ "username": "casuser", "scratchCodes": [12345678, 87654321] }])
    );

    let response = probe().do_request(&url, RequestOptions::default()).await.unwrap();
    let raw: Value = serde_json::from_str(&response.body).unwrap();
    assert_eq!(response.json().unwrap(), raw);
    assert_eq!(raw, payload);
}

#[tokio::test]
async fn test_non_success_status_fails() {
    let base = serve(actuator()).await;
    let url = format!("{}/cas/actuator/broken", base);

    match probe().get_json(&url).await {
        Err(HarnessError::Probe { url: failed, reason }) => {
            assert_eq!(failed, url);
            assert!(reason.contains("500"));
        }
        other => panic!("expected probe error, got {:?}", other),
    }

    let response = probe()
        .do_request(&url, RequestOptions::default().tolerate_non_success(true))
        .await
        .unwrap();
    assert_eq!(response.status, 500);
    assert_eq!(response.body, "boom");
}

#[tokio::test]
async fn test_malformed_json_fails() {
    let base = serve(actuator()).await;
    let url = format!("{}/cas/actuator/html", base);

    let err = probe().get_json(&url).await.unwrap_err();
    assert!(matches!(err, HarnessError::Probe { .. }));
    assert!(err.to_string().contains("malformed JSON"));
}

#[tokio::test]
async fn test_post_with_body() {
    let base = serve(actuator()).await;
    let url = format!("{}/cas/actuator/echo", base);

    let options = RequestOptions::default()
        .method(RequestOptions::parse_method("post").unwrap())
        .header("Content-Type", "application/json")
        .body(r#"{"name":"casuser-device"}"#);
    let payload: Value = probe().do_request(&url, options).await.unwrap().json().unwrap();
    assert_eq!(payload["name"], "casuser-device");
}

#[tokio::test]
async fn test_unreachable_host_is_probe_error() {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let err = probe()
        .get_json(&format!("http://127.0.0.1:{}/cas/actuator", port))
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::Probe { .. }));
}

#[tokio::test]
async fn test_wait_until_ready() {
    let base = serve(actuator()).await;

    let attempts = wait_until_ready(
        &format!("{}/cas/actuator/health", base),
        Duration::from_secs(5),
        Duration::from_millis(50),
        false,
    )
    .await
    .unwrap();
    assert_eq!(attempts, 1);

    let err = wait_until_ready(
        &format!("{}/cas/actuator/broken", base),
        Duration::from_millis(300),
        Duration::from_millis(50),
        false,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, HarnessError::WaitTimeout { .. }));
}
