use super::*;

use std::collections::HashMap;

#[test]
fn normalizes_plain_file_path_to_sqlite_url() {
    assert_eq!(
        normalize_database_url("./data/test.db"),
        "sqlite://./data/test.db"
    );
}

#[test]
fn empty_database_url_falls_back_to_default() {
    assert_eq!(
        normalize_database_url("   "),
        Settings::default().database_url
    );
}

#[test]
fn keeps_memory_and_foreign_urls() {
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
    assert_eq!(
        normalize_database_url("postgres://localhost/blog"),
        "postgres://localhost/blog"
    );
}

#[test]
fn keeps_windows_absolute_path_with_single_sqlite_colon() {
    assert_eq!(
        normalize_database_url("sqlite:C:\\Users\\alice\\test.db"),
        "sqlite:C:/Users/alice/test.db"
    );
}

#[test]
fn normalizes_windows_plain_path_with_single_sqlite_colon() {
    assert_eq!(
        normalize_database_url("C:\\Users\\alice\\test.db"),
        "sqlite:C:/Users/alice/test.db"
    );
}

#[test]
fn converts_sqlite_double_slash_windows_path() {
    assert_eq!(
        normalize_database_url("sqlite://C:/Users/alice/test.db"),
        "sqlite:C:/Users/alice/test.db"
    );
}

#[test]
fn creates_parent_dir_for_sqlite_url() {
    let temp_root = std::env::temp_dir().join(format!(
        "blog_engagement_server_test_{}",
        std::process::id()
    ));
    let db_path = temp_root.join("data").join("test.db");

    prepare_database_url(db_path.to_string_lossy().as_ref()).expect("prepare db url");
    assert!(temp_root.join("data").exists());

    fs::remove_dir_all(temp_root).expect("cleanup");
}

#[test]
fn file_settings_override_defaults() {
    let mut settings = Settings::default();
    apply_file_settings(
        &mut settings,
        r#"
        bind_addr = "0.0.0.0:9000"
        database_url = "sqlite://./blog.db"
        body_limit_bytes = 1024
        trust_forwarded_for = true
        "#,
    );
    assert_eq!(settings.server_bind, "0.0.0.0:9000");
    assert_eq!(settings.database_url, "sqlite://./blog.db");
    assert_eq!(settings.body_limit_bytes, 1024);
    assert!(settings.trust_forwarded_for);
}

#[test]
fn unreadable_file_settings_are_ignored() {
    let mut settings = Settings::default();
    apply_file_settings(&mut settings, "bind_addr = [");
    assert_eq!(settings, Settings::default());
}

#[test]
fn app_prefixed_env_vars_win() {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("SERVER_BIND", "127.0.0.1:1"),
        ("APP__BIND_ADDR", "127.0.0.1:2"),
        ("DATABASE_URL", "sqlite://./one.db"),
        ("APP__BODY_LIMIT_BYTES", "not-a-number"),
    ]);
    let mut settings = Settings::default();
    apply_env_settings(&mut settings, |name| vars.get(name).map(|v| v.to_string()));

    assert_eq!(settings.server_bind, "127.0.0.1:2");
    assert_eq!(settings.database_url, "sqlite://./one.db");
    assert_eq!(settings.body_limit_bytes, Settings::default().body_limit_bytes);
}

#[tokio::test]
async fn prepared_database_url_creates_openable_sqlite_file() {
    let temp_root = std::env::temp_dir().join(format!(
        "blog_engagement_server_open_test_{}",
        std::process::id()
    ));
    let db_path = temp_root.join("nested").join("server.db");

    let prepared = prepare_database_url(db_path.to_string_lossy().as_ref()).expect("prepare");
    let storage = storage::Storage::new(&prepared).await.expect("open sqlite");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should be created: {}",
        db_path.display()
    );

    fs::remove_dir_all(temp_root).expect("cleanup");
}

#[test]
fn forwarded_header_is_untrusted_unless_enabled() {
    assert!(!Settings::default().trust_forwarded_for);

    let mut settings = Settings::default();
    apply_env_settings(&mut settings, |name| {
        (name == "APP__TRUST_FORWARDED_FOR").then(|| "true".to_string())
    });
    assert!(settings.trust_forwarded_for);

    apply_env_settings(&mut settings, |name| {
        (name == "APP__TRUST_FORWARDED_FOR").then(|| "maybe".to_string())
    });
    assert!(settings.trust_forwarded_for);
}
