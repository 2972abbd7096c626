use dupeguard::config::{Config, ConfigError};
use dupeguard::quarantine::Layout;
use dupeguard::scanner::PerceptualAlgorithm;
use figment::providers::Serialized;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_config_load_defaults() {
    // Figment directly, so environment variables set by other tests do not leak in.
    let figment = figment::Figment::from(Serialized::defaults(Config::default()));
    let config: Config = figment.extract().unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.layout, Layout::Flat);
    assert_eq!(config.workers, 0);
}

#[test]
fn test_config_load_from_env() {
    std::env::set_var("DUPEGUARD_TEST_ONLY_MIN_SIZE", "1");
    std::env::set_var("DUPEGUARD_TEST_ONLY_PERCEPTUAL__THRESHOLD", "9");

    use figment::{providers::Env, Figment};
    let figment = Figment::from(Serialized::defaults(Config::default()))
        .merge(Env::prefixed("DUPEGUARD_TEST_ONLY_").split("__"));
    let config: Config = figment.extract().unwrap();

    assert_eq!(config.min_size, 1);
    assert_eq!(config.perceptual.threshold, Some(9));

    std::env::remove_var("DUPEGUARD_TEST_ONLY_MIN_SIZE");
    std::env::remove_var("DUPEGUARD_TEST_ONLY_PERCEPTUAL__THRESHOLD");
}

#[test]
fn test_config_load_from_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let toml_content = r#"
min_size = 4096
include_exts = ["jpg", "png"]
follow_symlinks = true
case_sensitive_names = true
quarantine_root = "/srv/quarantine"
layout = "mirror"

[perceptual]
enabled = true
algorithm = "phash"
"#;
    fs::write(&config_path, toml_content).unwrap();

    let config = Config::load(Some(&config_path)).unwrap();

    assert_eq!(config.min_size, 4096);
    assert_eq!(config.include_exts, vec!["jpg", "png"]);
    assert!(config.follow_symlinks);
    assert!(config.name_policy().case_sensitive);
    assert_eq!(config.quarantine_root, std::path::PathBuf::from("/srv/quarantine"));
    assert_eq!(config.layout, Layout::Mirror);
    assert!(config.perceptual.enabled);
    assert_eq!(config.perceptual.algorithm, PerceptualAlgorithm::Phash);
    assert_eq!(config.perceptual.effective_threshold(), 10);
}

#[test]
fn test_config_invalid_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "min_size = \"lots\"").unwrap();

    assert!(matches!(
        Config::load(Some(&config_path)),
        Err(ConfigError::Load(_))
    ));
}

#[test]
fn test_config_save_toml_round_trip() {
    let config = Config {
        min_size: 2,
        exclude_names: vec!["*.part".to_string()],
        ..Config::default()
    };
    let content = toml::to_string_pretty(&config).unwrap();
    assert!(content.contains("min_size = 2"));
    assert!(content.contains("layout = \"flat\""));

    let parsed: Config = toml::from_str(&content).unwrap();
    assert_eq!(parsed, config);
}
