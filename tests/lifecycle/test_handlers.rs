//! HTTP surface: status codes, bodies and request limits.

use std::sync::atomic::Ordering;
use std::time::Duration;

use actix_web::test;
use file_service_lib::api::FileApiSettings;
use serde_json::Value;

use super::test_helpers::*;

#[actix_rt::test]
async fn test_list_empty() {
    let h = Harness::new();
    let app = create_test_app(&h, test_settings()).await;

    let req = test::TestRequest::get().uri("/api/files").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, serde_json::json!([]));
}

#[actix_rt::test]
async fn test_upload_returns_created_record() {
    let h = Harness::new();
    let app = create_test_app(&h, test_settings()).await;

    let req = multipart_request("/api/files", &[Part::file("hello.txt", b"hello there")]);
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["name"], "hello.txt");
    assert_eq!(body["size"], 11);
    assert_eq!(body["mime_type"], "text/plain");
    assert!(body["id"].is_i64());
    assert!(body["object_key"].as_str().unwrap().ends_with("_hello.txt"));
    assert!(body.get("resume").is_none());

    let key = body["object_key"].as_str().unwrap();
    assert_eq!(h.store.object(key).unwrap().0, b"hello there");

    let req = test::TestRequest::get().uri("/api/files").to_request();
    let listed: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[actix_rt::test]
async fn test_upload_skips_other_fields() {
    let h = Harness::new();
    let app = create_test_app(&h, test_settings()).await;

    let req = multipart_request(
        "/api/files",
        &[
            Part {
                name: "description",
                filename: None,
                content_type: None,
                content: b"ignored",
            },
            Part::file("real.txt", b"content"),
        ],
    );
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["name"], "real.txt");
}

#[actix_rt::test]
async fn test_upload_defaults_content_type() {
    let h = Harness::new();
    let app = create_test_app(&h, test_settings()).await;

    let req = multipart_request(
        "/api/files",
        &[Part {
            name: "file",
            filename: Some("raw"),
            content_type: None,
            content: b"\x00\x01",
        }],
    );
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["mime_type"], "application/octet-stream");
}

#[actix_rt::test]
async fn test_upload_without_file_field_is_bad_request() {
    let h = Harness::new();
    let app = create_test_app(&h, test_settings()).await;

    let req = multipart_request(
        "/api/files",
        &[Part {
            name: "attachment",
            filename: Some("x.txt"),
            content_type: Some("text/plain"),
            content: b"data",
        }],
    );
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "INVALID_INPUT");
    assert_eq!(h.store.object_count(), 0);
    assert_eq!(h.repo.row_count(), 0);
}

#[actix_rt::test]
async fn test_oversized_upload_is_rejected() {
    let h = Harness::new();
    let settings = FileApiSettings {
        max_upload_size: 16,
        ..test_settings()
    };
    let app = create_test_app(&h, settings).await;

    let content = vec![b'a'; 64];
    let req = multipart_request("/api/files", &[Part::file("big.txt", &content)]);
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    assert_eq!(h.store.object_count(), 0);
    assert_eq!(h.repo.row_count(), 0);
}

#[actix_rt::test]
async fn test_store_failure_is_server_error() {
    let h = Harness::new();
    h.store.fail_upload.store(true, Ordering::SeqCst);
    let app = create_test_app(&h, test_settings()).await;

    let req = multipart_request("/api/files", &[Part::file("a.txt", b"data")]);
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 500);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "STORE_WRITE_FAILED");
    assert_eq!(h.repo.row_count(), 0);
}

#[actix_rt::test]
async fn test_slow_store_hits_deadline() {
    let h = Harness::new();
    h.store.upload_delay_ms.store(2_000, Ordering::SeqCst);
    let settings = FileApiSettings {
        request_timeout: Duration::from_millis(50),
        ..test_settings()
    };
    let app = create_test_app(&h, settings).await;

    let req = multipart_request("/api/files", &[Part::file("slow.txt", b"data")]);
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 500);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "DEADLINE_EXCEEDED");
    assert_eq!(h.repo.row_count(), 0);
}

#[actix_rt::test]
async fn test_delete_statuses() {
    let h = Harness::new();
    let record = h.upload("del.txt", b"x").await.unwrap();
    let app = create_test_app(&h, test_settings()).await;

    let req = test::TestRequest::delete().uri("/api/files/abc").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let req = test::TestRequest::delete().uri("/api/files/999").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "NOT_FOUND");
    assert_eq!(body["message"], "File 999 not found");

    let req = test::TestRequest::delete()
        .uri(&format!("/api/files/{}", record.id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 204);
    assert_eq!(h.repo.row_count(), 0);
    assert_eq!(h.store.object_count(), 0);
}

#[actix_rt::test]
async fn test_analyze_statuses() {
    let h = Harness::new();
    let record = h.upload("doc.txt", b"some document").await.unwrap();
    let app = create_test_app(&h, test_settings()).await;

    let req = test::TestRequest::post()
        .uri("/api/files/nope/analyze")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let req = test::TestRequest::post()
        .uri("/api/files/999/analyze")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);

    let req = test::TestRequest::post()
        .uri(&format!("/api/files/{}/analyze", record.id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["id"], record.id);
    assert_eq!(body["resume"], TEST_SUMMARY);
}

#[actix_rt::test]
async fn test_analyze_provider_failure_is_server_error() {
    let h = Harness::new();
    let record = h.upload("doc.txt", b"some document").await.unwrap();
    h.summarizer.fail.store(true, Ordering::SeqCst);
    let app = create_test_app(&h, test_settings()).await;

    let req = test::TestRequest::post()
        .uri(&format!("/api/files/{}/analyze", record.id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 500);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "SUMMARIZATION_FAILED");
}

#[actix_rt::test]
async fn test_upload_and_analyze_route() {
    let h = Harness::new();
    let app = create_test_app(&h, test_settings()).await;

    let req = multipart_request("/api/files/analyze", &[Part::file("one.txt", b"one shot")]);
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["name"], "one.txt");
    assert_eq!(body["resume"], TEST_SUMMARY);
    assert_eq!(h.repo.row_count(), 1);
}

#[actix_rt::test]
async fn test_upload_and_analyze_route_leaves_nothing_on_failure() {
    let h = Harness::new();
    h.summarizer.fail.store(true, Ordering::SeqCst);
    let app = create_test_app(&h, test_settings()).await;

    let req = multipart_request("/api/files/analyze", &[Part::file("one.txt", b"one shot")]);
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 500);

    assert_eq!(h.repo.row_count(), 0);
    assert_eq!(h.store.object_count(), 0);
}
