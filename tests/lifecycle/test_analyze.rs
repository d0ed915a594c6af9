//! Analysis of stored files and one-step upload-and-analyze.

use std::sync::atomic::Ordering;

use bytes::Bytes;
use file_service_lib::db::FileRepository;
use file_service_lib::error::AppError;
use file_service_lib::services::MAX_ANALYSIS_CHARS;

use super::test_helpers::*;

#[actix_rt::test]
async fn test_analyze_saves_summary() {
    let h = Harness::new();
    let record = h.upload("readme.md", b"# Project\nDoes things.").await.unwrap();

    let analyzed = h.service.analyze_file(record.id).await.unwrap();

    assert_eq!(analyzed.resume.as_deref(), Some(TEST_SUMMARY));
    assert_eq!(h.repo.row(record.id).unwrap().resume.as_deref(), Some(TEST_SUMMARY));
    assert_eq!(h.summarizer.inputs(), vec!["# Project\nDoes things.".to_string()]);

    // Only the summary changes.
    assert_eq!(analyzed.object_key, record.object_key);
    assert_eq!(analyzed.size, record.size);
    assert_eq!(
        h.store.object(&record.object_key).unwrap().0,
        b"# Project\nDoes things."
    );
}

#[actix_rt::test]
async fn test_analyze_truncates_long_content() {
    let h = Harness::new();
    let content = "x".repeat(MAX_ANALYSIS_CHARS + 500);
    let record = h.upload("big.txt", content.as_bytes()).await.unwrap();

    h.service.analyze_file(record.id).await.unwrap();

    let inputs = h.summarizer.inputs();
    assert_eq!(inputs[0].chars().count(), MAX_ANALYSIS_CHARS);
}

#[actix_rt::test]
async fn test_analyze_truncates_on_character_boundary() {
    let h = Harness::new();
    let content = "é".repeat(MAX_ANALYSIS_CHARS + 1);
    let record = h.upload("accents.txt", content.as_bytes()).await.unwrap();

    h.service.analyze_file(record.id).await.unwrap();

    let sent = &h.summarizer.inputs()[0];
    assert_eq!(sent.chars().count(), MAX_ANALYSIS_CHARS);
    assert!(sent.chars().all(|c| c == 'é'));
}

#[actix_rt::test]
async fn test_analyze_tolerates_invalid_utf8() {
    let h = Harness::new();
    let record = h.upload("blob.bin", &[b'o', b'k', 0xff, 0xfe]).await.unwrap();

    h.service.analyze_file(record.id).await.unwrap();

    assert_eq!(h.summarizer.inputs()[0], "ok\u{fffd}\u{fffd}");
}

#[actix_rt::test]
async fn test_analyze_unknown_id() {
    let h = Harness::new();

    let err = h.service.analyze_file(404).await.unwrap_err();

    assert!(matches!(err, AppError::RecordNotFound(404)));
    assert!(h.summarizer.inputs().is_empty());
}

#[actix_rt::test]
async fn test_analyze_missing_object() {
    let h = Harness::new();
    let record = h.upload("lost.txt", b"data").await.unwrap();
    h.store.remove_raw(&record.object_key);

    let err = h.service.analyze_file(record.id).await.unwrap_err();

    assert!(matches!(err, AppError::StoreObjectNotFound(_)));
    assert!(h.summarizer.inputs().is_empty());
}

#[actix_rt::test]
async fn test_analyze_store_unavailable() {
    let h = Harness::new();
    let record = h.upload("a.txt", b"data").await.unwrap();
    h.store.fail_download.store(true, Ordering::SeqCst);

    let err = h.service.analyze_file(record.id).await.unwrap_err();

    assert!(matches!(err, AppError::StoreUnavailable(_)));
}

#[actix_rt::test]
async fn test_summary_failure_leaves_record_unchanged() {
    let h = Harness::new();
    let record = h.upload("a.txt", b"data").await.unwrap();
    h.summarizer.fail.store(true, Ordering::SeqCst);

    let err = h.service.analyze_file(record.id).await.unwrap_err();

    assert!(matches!(err, AppError::SummarizationFailed(_)));
    assert_eq!(h.repo.row(record.id).unwrap(), record);
}

#[actix_rt::test]
async fn test_update_failure_is_reported() {
    let h = Harness::new();
    let record = h.upload("a.txt", b"data").await.unwrap();
    h.repo.fail_update.store(true, Ordering::SeqCst);

    let err = h.service.analyze_file(record.id).await.unwrap_err();

    assert!(matches!(err, AppError::PersistenceWriteFailed(_)));
    assert!(h.repo.row(record.id).unwrap().resume.is_none());
}

#[actix_rt::test]
async fn test_reanalyze_overwrites_summary() {
    let h = Harness::new();
    let record = h.upload("a.txt", b"data").await.unwrap();
    h.repo.update_resume(record.id, "stale").await.unwrap();

    let analyzed = h.service.analyze_file(record.id).await.unwrap();

    assert_eq!(analyzed.resume.as_deref(), Some(TEST_SUMMARY));
}

#[actix_rt::test]
async fn test_upload_and_analyze_stores_summary_with_row() {
    let h = Harness::new();

    let record = h
        .service
        .upload_and_analyze(
            "plan.txt".into(),
            Bytes::from_static(b"step one"),
            Some("text/plain".into()),
        )
        .await
        .unwrap();

    assert_eq!(record.resume.as_deref(), Some(TEST_SUMMARY));
    assert_eq!(record.size, 8);
    assert_eq!(h.store.object(&record.object_key).unwrap().0, b"step one");
    assert_eq!(h.summarizer.inputs(), vec!["step one".to_string()]);
}

#[actix_rt::test]
async fn test_upload_and_analyze_rolls_back_on_summary_failure() {
    let h = Harness::new();
    h.summarizer.fail.store(true, Ordering::SeqCst);

    let err = h
        .service
        .upload_and_analyze("plan.txt".into(), Bytes::from_static(b"step one"), None)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::SummarizationFailed(_)));
    assert_eq!(h.store.object_count(), 0);
    assert_eq!(h.repo.row_count(), 0);
}

#[actix_rt::test]
async fn test_upload_and_analyze_rolls_back_on_insert_failure() {
    let h = Harness::new();
    h.repo.fail_create.store(true, Ordering::SeqCst);

    let err = h
        .service
        .upload_and_analyze("plan.txt".into(), Bytes::from_static(b"step one"), None)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::PersistenceWriteFailed(_)));
    assert_eq!(h.store.object_count(), 0);
}
