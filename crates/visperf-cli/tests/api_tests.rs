//! HTTP API tests against the router, with a scripted browser

#![allow(clippy::expect_used, clippy::unwrap_used)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use image::{ImageFormat, Rgba, RgbaImage};
use serde_json::{json, Value};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;
use visperf::{
    to_data_uri, CaptureConfig, CaptureFault, EngineConfig, NavigationFailure, ScriptedLauncher,
    TestOrchestrator,
};
use visperf_cli::{router, ServerConfig};

fn png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba(rgba));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

struct Harness {
    _dir: TempDir,
    app: Router,
    orchestrator: TestOrchestrator,
}

fn harness(launcher: &ScriptedLauncher) -> Harness {
    let dir = TempDir::new().unwrap();
    let config = EngineConfig::new()
        .with_baselines_dir(dir.path().join("baselines"))
        .with_capture(
            CaptureConfig::default()
                .with_settle_delay(Duration::ZERO)
                .with_retry_backoff(Duration::from_millis(5)),
        );
    let orchestrator = TestOrchestrator::new(Arc::new(launcher.clone()), config).unwrap();
    let app = router(orchestrator.clone(), &ServerConfig::default());
    Harness {
        _dir: dir,
        app,
        orchestrator,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn post(path: &str, body: &Value) -> Request<Body> {
    Request::post(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(path: &str) -> Request<Body> {
    Request::get(path).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let h = harness(&ScriptedLauncher::new());
    let (status, body) = send(&h.app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_first_run_is_new_then_success() {
    let image = png(6, 6, [0, 0, 0, 255]);
    let h = harness(&ScriptedLauncher::always(image.clone()));

    let (status, body) = send(&h.app, post("/test", &json!({"subject": "card"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "new");
    assert_eq!(body["baselineExists"], true);
    assert_eq!(body["candidateImage"], to_data_uri(&image));

    let (status, body) = send(&h.app, post("/test", &json!({"storyId": "card"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["mismatchedPixels"], 0);
    assert!(body.get("candidateImage").is_none());
}

#[tokio::test]
async fn test_routes_served_under_base_path() {
    let h = harness(&ScriptedLauncher::always(png(2, 2, [1, 2, 3, 255])));
    let (status, body) = send(
        &h.app,
        post("/__visual_perfect_api__/test", &json!({"subject": "card"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "new");

    let (status, body) = send(&h.app, get("/__visual_perfect_api__/baseline/card")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "baseline_exists");
}

#[tokio::test]
async fn test_mismatch_then_accept_then_success() {
    let black = png(4, 4, [0, 0, 0, 255]);
    let white = png(4, 4, [255, 255, 255, 255]);
    let launcher = ScriptedLauncher::new()
        .then_capture(white.clone())
        .then_capture(white.clone());
    let h = harness(&launcher);
    let subject = visperf::Subject::new("card").unwrap();
    h.orchestrator.store().write(&subject, &black).unwrap();

    let (status, body) = send(&h.app, post("/test", &json!({"subject": "card"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "failed");
    assert_eq!(body["mismatchedPixels"], 16);
    assert_eq!(body["message"], "16 pixels differ");
    assert!(body["diffImage"]
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,"));

    let candidate = body["candidateImage"].clone();
    let (status, body) = send(
        &h.app,
        post("/accept", &json!({"subject": "card", "imageBase64": candidate})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "success", "message": "baseline accepted"}));
    assert!(!h.orchestrator.store().diff_path(&subject).exists());

    let (_, body) = send(&h.app, post("/test", &json!({"subject": "card"}))).await;
    assert_eq!(body["status"], "success");
}

#[tokio::test]
async fn test_invalid_subject_is_400() {
    let launcher = ScriptedLauncher::always(png(2, 2, [0, 0, 0, 255]));
    let h = harness(&launcher);

    for subject in ["", "../etc/passwd", "a/b", "card.diff"] {
        let (status, body) = send(&h.app, post("/test", &json!({"subject": subject}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{subject:?}");
        assert_eq!(body["status"], "error");
    }
    // Rejected before any browser was started
    assert_eq!(launcher.launches(), 0);

    let (status, _) = send(&h.app, get("/baseline/..hidden")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_json_is_400() {
    let h = harness(&ScriptedLauncher::new());
    let request = Request::post("/test")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_capture_failure_is_500_after_retry() {
    let refused = CaptureFault::navigation(NavigationFailure::ConnectionRefused, "net::ERR_CONNECTION_REFUSED");
    let launcher = ScriptedLauncher::new()
        .then_fail(refused.clone())
        .then_fail(refused);
    let h = harness(&launcher);

    let (status, body) = send(&h.app, post("/test", &json!({"subject": "card"}))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
    assert!(body["message"].as_str().unwrap().starts_with("capture failed"));
    assert_eq!(launcher.launches(), 2);
    assert_eq!(launcher.closes(), 2);
}

#[tokio::test]
async fn test_accept_without_image_is_400() {
    let h = harness(&ScriptedLauncher::new());
    let (status, body) = send(&h.app, post("/accept", &json!({"subject": "card"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_accept_undecodable_image_is_422() {
    let h = harness(&ScriptedLauncher::new());
    let (status, body) = send(
        &h.app,
        post("/accept", &json!({"subject": "card", "newImage": to_data_uri(b"nope")})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["status"], "error");

    let (_, body) = send(&h.app, get("/baseline/card")).await;
    assert_eq!(body, json!({"status": "no_baseline"}));
}

#[tokio::test]
async fn test_accept_is_idempotent_over_http() {
    let image = png(3, 3, [9, 9, 9, 255]);
    let h = harness(&ScriptedLauncher::new());
    let body = json!({"storyId": "card", "newImage": to_data_uri(&image)});

    for _ in 0..2 {
        let (status, _) = send(&h.app, post("/accept", &body)).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (_, body) = send(&h.app, get("/baseline/card")).await;
    assert_eq!(body["status"], "baseline_exists");
    assert_eq!(body["baselineImage"], to_data_uri(&image));
}
