use super::*;
use axum::{routing::get, Json, Router};
use tokio::net::TcpListener;

async fn spawn_lookup_server() -> Result<String> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = Router::new()
        .route(
            "/ok",
            get(|| async { Json(serde_json::json!({ "ip": "203.0.113.7" })) }),
        )
        .route(
            "/wrong-shape",
            get(|| async { Json(serde_json::json!({ "address": "203.0.113.7" })) }),
        )
        .route(
            "/bad-ip",
            get(|| async { Json(serde_json::json!({ "ip": "not-an-address" })) }),
        )
        .route(
            "/down",
            get(|| async { axum::http::StatusCode::SERVICE_UNAVAILABLE }),
        );
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

struct FailingLookup;

#[async_trait]
impl AddressLookup for FailingLookup {
    async fn lookup_public_address(&self) -> Result<String> {
        Err(anyhow!("network unreachable"))
    }
}

#[test]
fn hash_is_lowercase_sha256_hex() {
    assert_eq!(
        hash_address("abc").as_str(),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );

    let visitor = hash_address("198.51.100.23");
    assert_eq!(visitor.as_str().len(), 64);
    assert!(visitor
        .as_str()
        .chars()
        .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
}

#[test]
fn hash_is_deterministic_per_address() {
    assert_eq!(hash_address("198.51.100.23"), hash_address("198.51.100.23"));
    assert_eq!(hash_address(" 198.51.100.23\n"), hash_address("198.51.100.23"));
    assert_ne!(hash_address("198.51.100.23"), hash_address("198.51.100.24"));
}

#[tokio::test]
async fn resolver_hashes_looked_up_address() {
    let resolver = IdentityResolver::new(Arc::new(StaticAddressLookup("198.51.100.23".into())));
    let visitor = resolver.resolve().await.expect("identity");
    assert_eq!(visitor, hash_address("198.51.100.23"));
}

#[tokio::test]
async fn resolver_reports_identity_unavailable_on_lookup_failure() {
    let resolver = IdentityResolver::new(Arc::new(FailingLookup));
    let err = resolver.resolve().await.expect_err("should fail");
    assert!(matches!(err, EngagementError::IdentityUnavailable(reason) if reason.contains("unreachable")));
}

#[tokio::test]
async fn resolver_rejects_empty_address() {
    let resolver = IdentityResolver::new(Arc::new(StaticAddressLookup("  ".into())));
    assert!(matches!(
        resolver.resolve().await,
        Err(EngagementError::IdentityUnavailable(_))
    ));
}

#[tokio::test]
async fn http_lookup_reads_ip_field() {
    let base = spawn_lookup_server().await.expect("spawn server");
    let lookup = HttpAddressLookup::new(&format!("{base}/ok")).expect("lookup");
    assert_eq!(
        lookup.lookup_public_address().await.expect("address"),
        "203.0.113.7"
    );
}

#[tokio::test]
async fn http_lookup_rejects_other_shapes_and_statuses() {
    let base = spawn_lookup_server().await.expect("spawn server");
    for path in ["/wrong-shape", "/bad-ip", "/down"] {
        let lookup = HttpAddressLookup::new(&format!("{base}{path}")).expect("lookup");
        let resolver = IdentityResolver::new(Arc::new(lookup));
        assert!(
            matches!(
                resolver.resolve().await,
                Err(EngagementError::IdentityUnavailable(_))
            ),
            "{path} should not yield an identity"
        );
    }
}

#[test]
fn http_lookup_rejects_invalid_url() {
    assert!(HttpAddressLookup::new("not a url").is_err());
}
