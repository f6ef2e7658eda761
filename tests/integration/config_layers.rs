//! Layered configuration: user file, working copy file, environment, flags

use crate::integration::test_utils::with_isolated_env;
use conservator::config::{
    global_config_path, workspace_config_path, ConfigLoader, ConfigOverrides, ConservatorConfig,
};
use std::path::PathBuf;
use tempfile::TempDir;

fn write(path: &std::path::Path, contents: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

#[test]
fn test_user_file_lives_under_xdg_config_home() {
    let test_dir = TempDir::new().unwrap();
    with_isolated_env(&test_dir, || {
        let path = global_config_path().unwrap();
        assert!(path.starts_with(test_dir.path().join("xdg")));
        assert!(path.ends_with("conservator/config.toml"));
    });
}

#[test]
fn test_precedence_of_every_layer() {
    let test_dir = TempDir::new().unwrap();
    let root = test_dir.path().join("wc");
    with_isolated_env(&test_dir, || {
        write(
            &global_config_path().unwrap(),
            "url = \"https://user.example\"\napi_key = \"user-key\"\nemail = \"user@example.com\"\nmax_retries = 2\n",
        );
        write(
            &workspace_config_path(&root),
            "url = \"https://workspace.example\"\nmax_retries = 3\n",
        );

        let config = ConfigLoader::load(Some(&root)).unwrap();
        assert_eq!(config.url, "https://workspace.example");
        assert_eq!(config.api_key.as_deref(), Some("user-key"));
        assert_eq!(config.email.as_deref(), Some("user@example.com"));
        assert_eq!(config.max_retries, 3);

        std::env::set_var("CONSERVATOR_MAX_RETRIES", "7");
        std::env::set_var("CONSERVATOR_API_KEY", "env-key");
        let config = ConfigLoader::load(Some(&root)).unwrap();
        assert_eq!(config.max_retries, 7);
        assert_eq!(config.api_key.as_deref(), Some("env-key"));

        let overrides = ConfigOverrides {
            api_key: Some("flag-key".to_string()),
            cache_path: Some(PathBuf::from("/tmp/flag-cache")),
            ..ConfigOverrides::default()
        };
        let config = ConfigLoader::load_with(Some(&root), &overrides).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("flag-key"));
        assert_eq!(config.cache_path, PathBuf::from("/tmp/flag-cache"));
        assert_eq!(config.max_retries, 7);
        assert!(config.validate().is_ok());
    });
}

#[test]
fn test_no_files_gives_defaults() {
    let test_dir = TempDir::new().unwrap();
    with_isolated_env(&test_dir, || {
        let config = ConfigLoader::load(None).unwrap();
        assert_eq!(config, ConservatorConfig::default());
        assert!(config.validate().is_err());
    });
}

#[test]
fn test_saved_user_config_is_loaded_back() {
    let test_dir = TempDir::new().unwrap();
    with_isolated_env(&test_dir, || {
        let config = ConservatorConfig {
            api_key: Some("saved-key".to_string()),
            email: Some("me@example.com".to_string()),
            ..ConservatorConfig::default()
        };
        config.save(&global_config_path().unwrap()).unwrap();

        let loaded = ConfigLoader::load(None).unwrap();
        assert_eq!(loaded.api_key.as_deref(), Some("saved-key"));
        assert_eq!(loaded.email.as_deref(), Some("me@example.com"));
    });
}
