//! Template rendering and override tests

mod common;

use common::{provisioner_with, FakeHost, RecordingReporter};
use freqstrap::bootstrap::context::{build_template_context, pip_requirement};
use freqstrap::bootstrap::layout::Layout;
use freqstrap::bootstrap::{Profile, ProfileSettings, ProvisionConfig, ProvisionStep, TemplateRenderer};
use freqstrap::ProvisionError;
use std::sync::Arc;

fn render(template: &str, profile: Profile, config: &ProvisionConfig) -> String {
    let renderer = TemplateRenderer::from_embedded().unwrap();
    let settings = ProfileSettings::resolve(profile, config);
    let context = build_template_context(config, &Layout::from_config(config), &settings);
    renderer.render_with_context(template, &context).unwrap()
}

#[test]
fn test_config_renders_valid_json_per_profile() {
    let config = ProvisionConfig::default();

    let full: serde_json::Value =
        serde_json::from_str(&render("config/config.json.j2", Profile::Full, &config)).unwrap();
    assert_eq!(full["freqai"]["enabled"], true);
    assert_eq!(full["strategy"], "FreqaiStarterStrategy");
    assert_eq!(full["exchange"]["pair_whitelist"].as_array().unwrap().len(), 6);
    assert_eq!(full["stake_amount"], "unlimited");

    let native: serde_json::Value =
        serde_json::from_str(&render("config/config.json.j2", Profile::Native, &config)).unwrap();
    assert!(native.get("freqai").is_none());
    assert_eq!(native["strategy"], "SampleStrategy");
    assert_eq!(native["exchange"]["secret"], "CHANGE_ME");
    assert_eq!(native["user_data_dir"], "/home/ftuser/freqtrade/user_data");
}

#[test]
fn test_numeric_stake_amount_renders_as_number() {
    let mut config = ProvisionConfig::default();
    config.freqtrade.stake_amount = "25".to_string();
    config.freqtrade.pair_whitelist = Some(vec!["ETH/BTC".to_string()]);

    let json: serde_json::Value =
        serde_json::from_str(&render("config/config.json.j2", Profile::Native, &config)).unwrap();
    assert_eq!(json["stake_amount"].as_f64(), Some(25.0));
    assert_eq!(json["exchange"]["pair_whitelist"][0], "ETH/BTC");
}

#[test]
fn test_service_unit_points_into_virtualenv() {
    let unit = render(
        "systemd/freqtrade.service.j2",
        Profile::Full,
        &ProvisionConfig::default(),
    );
    assert!(unit.contains("User=ftuser"));
    assert!(unit.contains("ExecStart=/home/ftuser/freqtrade/.venv/bin/freqtrade trade"));
    assert!(unit.contains("--strategy FreqaiStarterStrategy --freqaimodel LightGBMRegressor"));
    assert!(unit.contains("EnvironmentFile=-/home/ftuser/.secrets/exchange.env"));

    let native = render(
        "systemd/freqtrade.service.j2",
        Profile::Native,
        &ProvisionConfig::default(),
    );
    assert!(!native.contains("freqaimodel"));
}

#[test]
fn test_pip_requirement_adds_freqai_extra() {
    assert_eq!(pip_requirement("freqtrade", false), "freqtrade");
    assert_eq!(pip_requirement("freqtrade", true), "freqtrade[freqai]");
    assert_eq!(
        pip_requirement("freqtrade==2024.10", true),
        "freqtrade[freqai]==2024.10"
    );
    assert_eq!(
        pip_requirement("freqtrade[all]", true),
        "freqtrade[all]"
    );
}

#[test]
fn test_embedded_templates_are_all_registered() {
    let renderer = TemplateRenderer::from_embedded().unwrap();
    let names = renderer.list_templates();
    assert_eq!(names.len(), 10);
    assert!(names.contains(&"scripts/start.sh.j2".to_string()));
    assert!(names.contains(&"strategies/FreqaiStarterStrategy.py.j2".to_string()));
    assert!(renderer.templates_dir().is_none());
}

#[test]
fn test_override_replaces_embedded_template() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("scripts")).unwrap();
    std::fs::write(
        dir.path().join("scripts/start.sh.j2"),
        "#!/bin/sh\necho custom {{ account }}\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("README.txt"), "ignored").unwrap();

    let renderer = TemplateRenderer::with_overrides(dir.path().to_path_buf()).unwrap();
    assert_eq!(renderer.list_templates().len(), 10);
    assert_eq!(renderer.templates_dir(), Some(dir.path()));

    let config = ProvisionConfig::default();
    let settings = ProfileSettings::resolve(Profile::Native, &config);
    let context = build_template_context(&config, &Layout::from_config(&config), &settings);
    let rendered = renderer
        .render_with_context("scripts/start.sh.j2", &context)
        .unwrap();
    assert_eq!(rendered, "#!/bin/sh\necho custom ftuser\n");
}

#[tokio::test]
async fn test_invalid_json_override_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("config")).unwrap();
    std::fs::write(
        dir.path().join("config/config.json.j2"),
        "{\"bot_name\": {{ account }}\n",
    )
    .unwrap();

    let host = Arc::new(FakeHost::new());
    let mut config = ProvisionConfig::default();
    config.templates_dir = Some(dir.path().to_path_buf());
    let provisioner = provisioner_with(&host, config);

    let err = provisioner
        .run_steps(
            Profile::Native,
            &[ProvisionStep::Configuration],
            &RecordingReporter::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::Template(ref m) if m.contains("invalid JSON")));
    let layout = Layout::from_config(provisioner.config());
    assert!(host.entry(&layout.config_file).is_none());
    assert!(host.mutations().is_empty());
}
