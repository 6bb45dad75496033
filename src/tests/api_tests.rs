#[cfg(test)]
mod tests {
    use crate::identity::file_id;
    use crate::routes;
    use crate::state::AppState;
    use crate::tests::support::{Fixture, MockGenerator};
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        response::Response,
    };
    use http_body_util::BodyExt; // for .collect()
    use serde_json::{json, Value};
    use std::path::Path;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn setup_test_app(fx: &Fixture) -> (axum::Router, AppState) {
        let state = fx.state(Arc::new(MockGenerator::default()));
        (routes::router(state.clone()), state)
    }

    async fn send(app: &axum::Router, req: Request<Body>) -> Response {
        app.clone().oneshot(req).await.unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn with_json(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_healthz_endpoint() {
        let fx = Fixture::new();
        let (app, _) = setup_test_app(&fx);

        let response = send(&app, get("/healthz")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_readyz_endpoint() {
        let fx = Fixture::new();
        let (app, state) = setup_test_app(&fx);

        let response = send(&app, get("/readyz")).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        crate::config::ensure_dirs(&state.config).unwrap();
        let response = send(&app, get("/readyz")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_version_endpoint() {
        let fx = Fixture::new();
        let (app, _) = setup_test_app(&fx);

        let json = json_body(send(&app, get("/version")).await).await;
        assert_eq!(json["name"], "bildwald");
        assert!(json.get("version").is_some());
        assert!(json.get("build").is_some());
    }

    #[tokio::test]
    async fn test_scan_state_defaults_to_idle() {
        let fx = Fixture::new();
        let (app, _) = setup_test_app(&fx);

        let response = send(&app, get("/scan")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["is_scanning"], false);
        assert_eq!(json["total"], 0);
    }

    #[tokio::test]
    async fn test_start_scan_without_roots() {
        let fx = Fixture::new();
        let mut cfg = fx.config();
        cfg.media.dirs = String::new();
        let state = fx.state_with(cfg, Arc::new(MockGenerator::default()));
        let app = routes::router(state);

        let response = send(&app, Request::builder().method("POST").uri("/scan").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(&app, get("/thumbs")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_start_scan_and_wait() {
        let fx = Fixture::new();
        fx.touch("a.jpg");
        fx.touch("clips/b.mp4");
        let (app, state) = setup_test_app(&fx);

        let response =
            send(&app, Request::builder().method("POST").uri("/scan?wait=true").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["accepted"], true);
        assert_eq!(json["state"]["is_scanning"], false);
        assert_eq!(json["state"]["progress"], 100);
        assert_eq!(json["state"]["generated"], 2);
        assert_eq!(json["state"]["images_count"], 1);
        assert_eq!(json["state"]["videos_count"], 1);

        let metrics = json_body(send(&app, get("/metrics")).await).await;
        assert_eq!(metrics["scans_started"], 1);
        assert_eq!(metrics["scans_completed"], 1);
        assert_eq!(metrics["thumbs_generated"], 2);
        assert!(!state.scanner.is_scanning());
    }

    #[tokio::test]
    async fn test_start_scan_rejected_while_running() {
        let fx = Fixture::new();
        fx.touch("a.jpg");
        let state = fx.state(Arc::new(MockGenerator::slow(std::time::Duration::from_millis(300))));
        let app = routes::router(state.clone());

        let first = send(&app, Request::builder().method("POST").uri("/scan").body(Body::empty()).unwrap()).await;
        assert_eq!(first.status(), StatusCode::ACCEPTED);
        let second = send(&app, Request::builder().method("POST").uri("/scan").body(Body::empty()).unwrap()).await;
        assert_eq!(second.status(), StatusCode::CONFLICT);
        let json = json_body(second).await;
        assert_eq!(json["accepted"], false);
        assert_eq!(json["state"]["is_scanning"], true);

        let busy = send(&app, Request::builder().method("DELETE").uri("/scan/lock").body(Body::empty()).unwrap()).await;
        assert_eq!(busy.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_clear_lock_without_marker() {
        let fx = Fixture::new();
        let (app, _) = setup_test_app(&fx);

        let response =
            send(&app, Request::builder().method("DELETE").uri("/scan/lock").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["removed"], false);
    }

    #[tokio::test]
    async fn test_list_and_serve_thumbnails() {
        let fx = Fixture::new();
        fx.touch("2024/a.jpg");
        fx.touch("2024/b.png");
        let (app, state) = setup_test_app(&fx);
        state.scanner.start_scan().await.unwrap().wait().await.unwrap();

        let json = json_body(send(&app, get("/thumbs?limit=1")).await).await;
        assert_eq!(json["total"], 2);
        assert_eq!(json["has_more"], true);
        let item = &json["thumbs"][0];
        assert_eq!(item["thumb_ready"], true);
        let thumb_url = item["thumb"].as_str().unwrap().to_string();

        let response = send(&app, get(&thumb_url)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "public, max-age=31536000, immutable");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(bytes.starts_with(b"\xFF\xD8"));
    }

    #[tokio::test]
    async fn test_thumbnail_errors() {
        let fx = Fixture::new();
        let (app, _) = setup_test_app(&fx);

        let response = send(&app, get("/thumbs/not-an-id")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(&app, get("/thumbs/0123456789abcdef")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_serve_original_media() {
        let fx = Fixture::new();
        fx.touch("2024/a.jpg");
        let (app, _) = setup_test_app(&fx);
        let id = file_id(&fx.media_root(), Path::new("2024/a.jpg"));

        let response = send(&app, get(&format!("/media/{}", id))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"2024/a.jpg");

        let response = send(&app, get("/media/0123456789abcdef")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_media_dirs_management() {
        let fx = Fixture::new();
        let (app, _) = setup_test_app(&fx);
        let root = fx.media_root().to_string_lossy().to_string();
        let extra = fx.dir.path().join("extra");
        std::fs::create_dir_all(&extra).unwrap();
        let extra = extra.to_string_lossy().to_string();

        let json = json_body(send(&app, get("/media-dirs")).await).await;
        assert_eq!(json["media_dirs"], json!([root]));

        let response = send(&app, with_json("POST", "/media-dirs", json!({ "media_dirs": [root, extra] }))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["media_dirs"], json!([root, extra]));

        let response = send(&app, with_json("DELETE", "/media-dirs", json!({ "media_dir": extra }))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["media_dirs"], json!([root]));

        let response = send(&app, with_json("DELETE", "/media-dirs", json!({ "media_dir": extra }))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(&app, with_json("POST", "/media-dirs", json!({ "media_dirs": [] }))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(&app, with_json("POST", "/media-dirs", json!({ "media_dirs": ["relative/dir"] }))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let missing = fx.dir.path().join("missing").to_string_lossy().to_string();
        let response = send(&app, with_json("POST", "/media-dirs", json!({ "media_dirs": [missing] }))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_metrics_prometheus_format() {
        let fx = Fixture::new();
        let (app, _) = setup_test_app(&fx);

        let response = send(&app, get("/metrics/prometheus")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("# TYPE bildwald_scans_started counter"));
        assert!(text.contains("bildwald_thumbs_failed 0"));
    }

    #[tokio::test]
    async fn test_scan_events_stream() {
        let fx = Fixture::new();
        let (app, _) = setup_test_app(&fx);

        let response = send(&app, get("/scan/events")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/event-stream"));

        let mut body = response.into_body();
        let frame = tokio::time::timeout(std::time::Duration::from_secs(5), body.frame())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let data = frame.into_data().unwrap();
        let text = String::from_utf8(data.to_vec()).unwrap();
        assert!(text.starts_with("data: "));
        assert!(text.contains("\"connected\""));
    }
}
