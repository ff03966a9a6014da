use tempfile::TempDir;

use super::*;

#[test]
fn defaults_are_valid() {
    let config = Config::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.vector.namespace, DEFAULT_NAMESPACE);
    assert_eq!(config.server.bind, DEFAULT_BIND_ADDRESS);
    assert!(!config.vector.is_configured());
}

#[test]
fn load_without_file_uses_defaults() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = Config::load(dir.path()).expect("Failed to load config");
    assert_eq!(config.generation.port, 11434);
    assert_eq!(config.database_path(), dir.path().join("handbook.db"));
}

#[test]
fn save_and_reload_round_trip() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mut config = Config::load(dir.path()).expect("Failed to load config");
    config.vector.rest_url = Some(Url::parse("https://index.example.com").expect("static url"));
    config.vector.rest_token = Some("secret".to_string());
    config.vector.namespace = "handbook-staging".to_string();
    config.server.admin_token = Some("admin".to_string());
    config.save().expect("Failed to save config");

    let reloaded = Config::load(dir.path()).expect("Failed to reload config");
    assert_eq!(reloaded, config);
    assert!(reloaded.vector.is_configured());
}

#[test]
fn partial_file_fills_in_defaults() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    std::fs::write(
        dir.path().join("config.toml"),
        "[vector]\nnamespace = \"hb\"\n",
    )
    .expect("Failed to write config file");

    let config = Config::load(dir.path()).expect("Failed to load config");
    assert_eq!(config.vector.namespace, "hb");
    assert_eq!(config.generation.model, "llama3.1:8b");
    assert_eq!(config.server.bind, DEFAULT_BIND_ADDRESS);
}

#[test]
fn validate_rejects_bad_values() {
    let mut config = Config::default();
    config.generation.protocol = "ftp".to_string();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidProtocol(_))
    ));

    let mut config = Config::default();
    config.generation.port = 0;
    assert!(matches!(config.validate(), Err(ConfigError::InvalidPort(0))));

    let mut config = Config::default();
    config.generation.model = String::new();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidModel(_))
    ));

    let mut config = Config::default();
    config.vector.namespace = "  ".to_string();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidNamespace(_))
    ));
}

#[test]
fn generation_base_url() {
    let config = GenerationConfig::default();
    let url = config.base_url().expect("Failed to build base url");
    assert_eq!(url.as_str(), "http://localhost:11434/");
}

#[test]
fn blank_token_is_not_configured() {
    let config = VectorConfig {
        rest_url: Some(Url::parse("https://index.example.com").expect("static url")),
        rest_token: Some(String::new()),
        namespace: DEFAULT_NAMESPACE.to_string(),
    };
    assert!(!config.is_configured());
}
