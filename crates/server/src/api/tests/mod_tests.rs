use super::*;

use serde_json::json;
use shared::protocol::{FieldOp, Precondition};

async fn setup() -> ApiContext {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    ApiContext { storage }
}

#[test]
fn collections_outside_the_allowed_alphabet_are_rejected() {
    assert!(validate_collection("posts-dev").is_ok());
    assert!(validate_collection("posts_prod.v2").is_ok());

    let too_long = "x".repeat(129);
    for bad in ["", "a/b", "with space", "émoji", too_long.as_str()] {
        let err = validate_collection(bad).expect_err("should reject");
        assert_eq!(err.code, ErrorCode::Validation, "{bad:?}");
    }
}

#[test]
fn document_keys_only_need_a_bounded_length() {
    let longest = "é".repeat(128);
    for ok in ["2024/first-post", "hello world", "café-notes", longest.as_str()] {
        assert!(validate_key(ok).is_ok(), "{ok:?}");
    }
    let too_long = "x".repeat(129);
    for bad in ["", too_long.as_str()] {
        let err = validate_key(bad).expect_err("should reject");
        assert_eq!(err.code, ErrorCode::Validation, "{bad:?}");
    }
}

#[tokio::test]
async fn free_form_post_keys_round_trip() {
    let ctx = setup().await;
    for key in ["2024/first-post", "hello world", "café-notes"] {
        let body = json!({ "readCount": 1, "key": key });
        put_document(&ctx, "posts-dev", key, &body)
            .await
            .expect("put");
        let loaded = get_document(&ctx, "posts-dev", key).await.expect("get");
        assert_eq!(loaded, body);
    }
}

#[tokio::test]
async fn missing_document_is_not_found() {
    let ctx = setup().await;
    let err = get_document(&ctx, "posts-dev", "nope")
        .await
        .expect_err("should be missing");
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn put_then_get_returns_body() {
    let ctx = setup().await;
    let body = json!({ "readCount": 3, "visitedBy": ["a"] });
    put_document(&ctx, "posts-dev", "first", &body)
        .await
        .expect("put");

    let loaded = get_document(&ctx, "posts-dev", "first").await.expect("get");
    assert_eq!(loaded, body);
}

#[tokio::test]
async fn put_rejects_non_object_body() {
    let ctx = setup().await;
    let err = put_document(&ctx, "posts-dev", "first", &json!([1, 2]))
        .await
        .expect_err("should reject");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn update_reports_missing_and_precondition_outcomes() {
    let ctx = setup().await;
    let update = DocumentUpdate::new(vec![
        FieldOp::increment("readCount", 1),
        FieldOp::array_union("visitedBy", "v1"),
    ])
    .when(Precondition::ArrayExcludes {
        field: "visitedBy".into(),
        value: json!("v1"),
    });

    let outcome = update_document(&ctx, "posts-dev", "post", &update)
        .await
        .expect("update");
    assert_eq!(outcome, UpdateOutcome::Missing);

    put_document(&ctx, "posts-dev", "post", &json!({ "readCount": 0 }))
        .await
        .expect("put");
    let first = update_document(&ctx, "posts-dev", "post", &update)
        .await
        .expect("update");
    let second = update_document(&ctx, "posts-dev", "post", &update)
        .await
        .expect("update");
    assert_eq!(first, UpdateOutcome::Applied);
    assert_eq!(second, UpdateOutcome::PreconditionFailed);

    let body = get_document(&ctx, "posts-dev", "post").await.expect("get");
    assert_eq!(body["readCount"], json!(1));
}

#[tokio::test]
async fn type_mismatch_is_a_validation_error() {
    let ctx = setup().await;
    put_document(&ctx, "posts-dev", "post", &json!({ "readCount": "three" }))
        .await
        .expect("put");

    let err = update_document(
        &ctx,
        "posts-dev",
        "post",
        &DocumentUpdate::new(vec![FieldOp::increment("readCount", 1)]),
    )
    .await
    .expect_err("should reject");
    assert_eq!(err.code, ErrorCode::Validation);
    assert!(err.message.contains("readCount"), "{}", err.message);
}

#[tokio::test]
async fn empty_update_is_rejected() {
    let ctx = setup().await;
    let err = update_document(&ctx, "posts-dev", "post", &DocumentUpdate::new(Vec::new()))
        .await
        .expect_err("should reject");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn list_keys_is_scoped_to_collection() {
    let ctx = setup().await;
    put_document(&ctx, "posts-dev", "b", &json!({}))
        .await
        .expect("put");
    put_document(&ctx, "posts-dev", "a", &json!({}))
        .await
        .expect("put");
    put_document(&ctx, "posts-prod", "c", &json!({}))
        .await
        .expect("put");

    let keys = list_document_keys(&ctx, "posts-dev").await.expect("list");
    assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn client_address_uses_forwarded_entry_only_behind_trusted_proxy() {
    let peer: SocketAddr = "10.0.0.9:5555".parse().expect("addr");

    assert_eq!(
        client_address(Some("203.0.113.7, 10.0.0.1"), Some(peer), true),
        Some("203.0.113.7".parse().expect("ip"))
    );
    assert_eq!(
        client_address(Some("garbage"), Some(peer), true),
        Some(peer.ip())
    );
    assert_eq!(client_address(None, Some(peer), true), Some(peer.ip()));
    assert_eq!(client_address(None, None, true), None);
}

#[test]
fn client_address_ignores_forwarded_header_by_default() {
    let peer: SocketAddr = "10.0.0.9:5555".parse().expect("addr");

    assert_eq!(
        client_address(Some("203.0.113.7"), Some(peer), false),
        Some(peer.ip())
    );
    assert_eq!(client_address(Some("203.0.113.7"), None, false), None);
}
