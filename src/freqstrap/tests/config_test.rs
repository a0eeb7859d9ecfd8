//! Configuration loading and validation tests

use freqstrap::bootstrap::ProvisionConfig;
use freqstrap::ProvisionError;
use std::path::Path;

#[test]
fn test_defaults_are_valid() {
    let config = ProvisionConfig::default();
    config.validate().unwrap();
    assert_eq!(config.account.name, "ftuser");
    assert_eq!(config.python.version, "3.11.9");
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.system.keyboard_layout, "us");
    assert!(config.templates_dir.is_none());
}

#[test]
fn test_empty_file_means_defaults() {
    assert_eq!(
        ProvisionConfig::from_toml_str("").unwrap(),
        ProvisionConfig::default()
    );
}

#[test]
fn test_toml_overlays_defaults() {
    let config = ProvisionConfig::from_toml_str(
        r#"
        [account]
        name = "bot"
        extra_groups = ["dialout"]

        [freqtrade]
        exchange = "kraken"
        freqai = false
        pair_whitelist = ["BTC/EUR"]

        [retry]
        max_attempts = 5
        delay_secs = 1
        "#,
    )
    .unwrap();

    assert_eq!(config.account.name, "bot");
    assert_eq!(config.account.extra_groups, vec!["dialout".to_string()]);
    assert_eq!(config.account.shell, "/bin/bash");
    assert_eq!(config.freqtrade.exchange, "kraken");
    assert_eq!(config.freqtrade.freqai, Some(false));
    assert_eq!(config.freqtrade.strategy_name, "SampleStrategy");
    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(config.retry.delay().as_secs(), 1);
    assert_eq!(config.requirements.min_disk_gb, 10);
}

#[test]
fn test_invalid_account_names_are_rejected() {
    for name in ["root", "Bot", "1bot", "bot user", ""] {
        let err = ProvisionConfig::default()
            .with_account_name(name)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Config(_)), "{}", name);
    }
    ProvisionConfig::default()
        .with_account_name("_svc-1")
        .validate()
        .unwrap();
}

#[test]
fn test_invalid_values_are_rejected() {
    assert!(ProvisionConfig::from_toml_str("[retry]\nmax_attempts = 0\n").is_err());
    assert!(ProvisionConfig::from_toml_str("[python]\nversion = \" \"\n").is_err());
    assert!(ProvisionConfig::from_toml_str("[freqtrade]\nstrategy_name = \"my-strategy\"\n").is_err());
    assert!(ProvisionConfig::from_toml_str("[account\n").is_err());
}

#[test]
fn test_strategy_name_must_be_a_free_class_name() {
    for name in ["1Strat", "", "My-Strategy", "FreqaiStarterStrategy"] {
        let toml = format!("[freqtrade]\nstrategy_name = \"{}\"\n", name);
        let err = ProvisionConfig::from_toml_str(&toml).unwrap_err();
        assert!(matches!(err, ProvisionError::Config(_)), "{}", name);
    }
    let config = ProvisionConfig::from_toml_str("[freqtrade]\nstrategy_name = \"_Grid2\"\n").unwrap();
    assert_eq!(config.freqtrade.strategy_name, "_Grid2");
}

#[test]
fn test_from_file_reads_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("freqstrap.toml");
    std::fs::write(&path, "templates_dir = \"/srv/templates\"\n[logging]\nretention_days = 30\n").unwrap();

    let config = ProvisionConfig::from_file(&path).unwrap();
    assert_eq!(config.logging.retention_days, 30);
    assert_eq!(config.templates_dir.as_deref(), Some(Path::new("/srv/templates")));

    let loaded = ProvisionConfig::load(Some(&path)).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_missing_explicit_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ProvisionConfig::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
    assert!(matches!(err, ProvisionError::Config(ref m) if m.contains("absent.toml")));
}

#[test]
fn test_cli_overrides() {
    let config = ProvisionConfig::default()
        .with_account_name("trader")
        .with_log_dir("/var/log/freqstrap");
    assert_eq!(config.account.name, "trader");
    assert_eq!(config.logging.dir, Path::new("/var/log/freqstrap"));
}
