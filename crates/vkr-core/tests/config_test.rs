//! Integration test: RendererConfig parsing and validation
//!
//! Run with: cargo test -p vkr-core --test config_test

use vkr_core::config::default_config_path;
use vkr_core::{CoreError, RendererConfig};

#[test]
fn test_empty_document_yields_defaults() {
    let config = RendererConfig::from_toml_str("").expect("empty config parses");
    assert_eq!(config, RendererConfig::default());
    assert!(!config.sync.thread_sync);
    assert_eq!(config.sync.waiter_timeout_ms, 100);
    assert_eq!(config.max_api_version().expect("version"), (1 << 22) | (3 << 12));
}

#[test]
fn test_full_document() {
    let config = RendererConfig::from_toml_str(
        r#"
        max_api_version = "1.2"

        [sync]
        thread_sync = true
        async_fence_callback = true
        waiter_timeout_ms = 5

        [debug]
        log_commands = true

        [extensions]
        deny = ["VK_EXT_private_data"]

        [memory]
        auto_export = true
        "#,
    )
    .expect("valid config");

    assert!(config.sync.async_fence_callback);
    assert_eq!(config.sync.waiter_timeout().as_millis(), 5);
    assert!(config.debug.log_commands);
    assert!(!config.debug.validation);
    assert_eq!(config.extensions.deny, vec!["VK_EXT_private_data".to_string()]);
    assert!(config.memory.auto_export);
    assert_eq!(config.max_api_version().expect("version"), (1 << 22) | (2 << 12));
}

#[test]
fn test_async_callback_requires_thread_sync() {
    let err = RendererConfig::from_toml_str("[sync]\nasync_fence_callback = true\n")
        .expect_err("must be rejected");
    assert!(matches!(err, CoreError::ConfigError(_)));
}

#[test]
fn test_rejects_bad_values() {
    for doc in [
        "[sync]\nwaiter_timeout_ms = 0\n",
        "max_api_version = \"one\"\n",
        "max_api_version = \"0.9\"\n",
        "max_api_version = \"1\"\n",
    ] {
        assert!(RendererConfig::from_toml_str(doc).is_err(), "accepted {doc:?}");
    }
    assert!(matches!(
        RendererConfig::from_toml_str("[sync]\nthread_sync = \"yes\"\n"),
        Err(CoreError::Parse(_))
    ));
}

#[test]
fn test_load_or_default_tolerates_missing_file() {
    let config = RendererConfig::load_or_default("/nonexistent/vkr.toml");
    assert_eq!(config, RendererConfig::default());
}

#[test]
fn test_load_reads_file() {
    let path = std::env::temp_dir().join(format!("vkr-config-test-{}.toml", std::process::id()));
    std::fs::write(&path, "[memory]\nauto_export = true\n").expect("write temp config");
    let config = RendererConfig::load(&path).expect("load");
    std::fs::remove_file(&path).ok();
    assert!(config.memory.auto_export);
}

#[test]
fn test_default_config_path_has_toml_name() {
    let path = default_config_path();
    if std::env::var_os("VKR_CONFIG").is_none() {
        assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("vkr.toml"));
    }
}
