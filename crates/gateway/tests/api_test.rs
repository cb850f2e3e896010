use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use gateway::{AppState, create_app};
use image::{ImageFormat, Rgb, RgbImage};
use inference::{
    ClassNames, DetectParams, DetectionService, Detector, DetectorOutput, RawDetection, Settings,
};
use serde_json::Value;
use std::io::Cursor;
use std::sync::Arc;
use tower::util::ServiceExt; // for `oneshot`

const BOUNDARY: &str = "XBOUNDARYX";
const MAX_UPLOAD: usize = 1024 * 1024;

/// Stands in for ONNX Runtime: returns a fixed output and checks the image it was given.
struct FakeDetector {
    output: Option<DetectorOutput>,
}

impl Detector for FakeDetector {
    fn detect(
        &self,
        image: &RgbImage,
        _params: &DetectParams,
    ) -> anyhow::Result<Option<DetectorOutput>> {
        assert_eq!(image.dimensions(), (32, 24), "upload should decode to its own size");
        Ok(self.output.clone())
    }
}

fn person_and_unknown() -> DetectorOutput {
    let names: ClassNames = [(0, "person".to_string())].into_iter().collect();
    DetectorOutput {
        boxes: Some(vec![
            RawDetection {
                x1: 1.0,
                y1: 2.0,
                x2: 10.0,
                y2: 20.0,
                confidence: 0.875,
                class_id: 0,
            },
            RawDetection {
                x1: 5.0,
                y1: 5.0,
                x2: 8.0,
                y2: 9.0,
                confidence: 0.5,
                class_id: 5,
            },
        ]),
        names: Some(Arc::new(names)),
    }
}

fn app_with(output: Option<DetectorOutput>, settings: Settings) -> Router {
    let service = DetectionService::new(FakeDetector { output }, settings);
    create_app(AppState::new(service), MAX_UPLOAD)
}

fn png_bytes() -> Vec<u8> {
    let image = RgbImage::from_pixel(32, 24, Rgb([200, 10, 10]));
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png).unwrap();
    bytes.into_inner()
}

fn multipart_request(field: &str, payload: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"upload.png\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(payload);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/api/predict")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_reports_settings_and_is_stable() {
    let settings = Settings {
        model_name: "yolov8s.pt".to_string(),
        device: inference::Device::Cpu("cpu".to_string()),
        ..Settings::test_default()
    };
    let app = app_with(None, settings);

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["model"], "yolov8s.pt");
        assert_eq!(body["device"], "cpu");
    }
}

#[tokio::test]
async fn test_health_device_null_when_auto() {
    let app = app_with(None, Settings::test_default());
    let response = app
        .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let body = json_body(response).await;
    assert!(body["device"].is_null());
}

#[tokio::test]
async fn test_predict_returns_mapped_detections() {
    let app = app_with(Some(person_and_unknown()), Settings::test_default());

    let response = app.oneshot(multipart_request("file", &png_bytes())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["model"], "yolov8n.pt");
    assert_eq!(body["num_detections"], 2);

    let detections = body["detections"].as_array().unwrap();
    assert_eq!(detections.len(), 2);
    assert_eq!(detections[0]["class_id"], 0);
    assert_eq!(detections[0]["class_name"], "person");
    assert_eq!(detections[0]["confidence"], 0.875);
    assert_eq!(detections[0]["bbox"]["x2"], 10.0);
    assert_eq!(detections[1]["class_name"], "5");
}

#[tokio::test]
async fn test_predict_with_no_results_is_empty() {
    let app = app_with(None, Settings::test_default());

    let response = app.oneshot(multipart_request("file", &png_bytes())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["num_detections"], 0);
    assert_eq!(body["detections"], Value::Array(vec![]));
}

#[tokio::test]
async fn test_predict_rejects_invalid_image_and_keeps_serving() {
    let app = app_with(Some(person_and_unknown()), Settings::test_default());

    let response = app
        .clone()
        .oneshot(multipart_request("file", b"this is not an image"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(
        body["detail"].as_str().unwrap().starts_with("Invalid image:"),
        "unexpected detail: {body}"
    );

    // Same app still answers afterwards
    let response = app.oneshot(multipart_request("file", &png_bytes())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_predict_requires_file_field() {
    let app = app_with(None, Settings::test_default());

    let response = app.oneshot(multipart_request("image", &png_bytes())).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert!(body["detail"].as_str().unwrap().contains("file"));
}

#[tokio::test]
async fn test_predict_rejects_non_multipart_body() {
    let app = app_with(None, Settings::test_default());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/predict")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_health_rejects_post() {
    let app = app_with(None, Settings::test_default());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/health")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_root_and_cors() {
    let app = app_with(None, Settings::test_default());

    let request = Request::get("/")
        .header(header::ORIGIN, "https://example.com")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
    let body = json_body(response).await;
    assert_eq!(body["health"], "/api/health");
}
