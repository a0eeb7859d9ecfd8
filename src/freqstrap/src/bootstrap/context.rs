/// Substitution context shared by every artifact template.
use super::config::ProvisionConfig;
use super::layout::Layout;
use super::profile::ProfileSettings;
use tera::Context;

/// Sentinel written into every credential field until the operator fills it in.
pub const CREDENTIAL_PLACEHOLDER: &str = "CHANGE_ME";

/// Build the Tera context from config, layout and resolved profile.
pub fn build_template_context(
    config: &ProvisionConfig,
    layout: &Layout,
    settings: &ProfileSettings,
) -> Context {
    let ft = &config.freqtrade;
    let active_strategy = settings.active_strategy(config);
    let mut context = Context::new();

    context.insert("account", &config.account.name);
    context.insert("bot_name", &format!("freqtrade-{}", config.account.name));
    context.insert("profile", settings.profile.name());
    context.insert("service_name", &config.system.service_name);

    context.insert("home_dir", &path_str(&layout.home));
    context.insert("app_dir", &path_str(&layout.app_dir));
    context.insert("user_data_dir", &path_str(&layout.user_data));
    context.insert("venv_dir", &path_str(&layout.venv));
    context.insert("config_file", &path_str(&layout.config_file));
    context.insert("credentials_file", &path_str(&layout.credentials_file));
    context.insert(
        "db_url",
        &format!(
            "sqlite:///{}/tradesv3{}.sqlite",
            path_str(&layout.user_data),
            if ft.dry_run { ".dryrun" } else { "" }
        ),
    );

    context.insert("exchange", &ft.exchange);
    context.insert("stake_currency", &ft.stake_currency);
    context.insert("stake_amount", &stake_amount_value(&ft.stake_amount));
    context.insert("max_open_trades", &ft.max_open_trades);
    context.insert("dry_run", &ft.dry_run);
    context.insert("dry_run_wallet", &ft.dry_run_wallet);
    context.insert("timeframe", &ft.timeframe);
    context.insert("api_port", &ft.api_port);
    context.insert("api_username", &ft.api_username);
    context.insert("credential_placeholder", CREDENTIAL_PLACEHOLDER);

    context.insert("pair_whitelist", &settings.pair_whitelist);
    let corr_pairs: Vec<&String> = settings.pair_whitelist.iter().take(2).collect();
    context.insert("corr_pairs", &corr_pairs);

    context.insert("strategy_name", &ft.strategy_name);
    context.insert("active_strategy", &active_strategy);
    context.insert("freqai_enabled", &settings.freqai);

    let mut timeframes = vec![ft.timeframe.clone()];
    if ft.timeframe != "1h" {
        timeframes.push("1h".to_string());
    }
    context.insert("freqai_timeframes", &timeframes);
    context.insert("download_timeframes", &timeframes);
    context.insert("pip_requirement", &pip_requirement(&ft.package, settings.freqai));

    context
}

/// `stake_amount` is either the string "unlimited" or a number in the config file.
fn stake_amount_value(raw: &str) -> serde_json::Value {
    raw.trim()
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(serde_json::Value::Number)
        .unwrap_or_else(|| serde_json::Value::String(raw.trim().to_string()))
}

/// pip requirement with the FreqAI extra spliced in before any version pin.
pub fn pip_requirement(package: &str, freqai: bool) -> String {
    if !freqai || package.contains('[') {
        return package.to_string();
    }
    match package.find(|c: char| "=<>!~;".contains(c)) {
        Some(idx) => format!("{}[freqai]{}", &package[..idx], &package[idx..]),
        None => format!("{}[freqai]", package),
    }
}

fn path_str(path: &std::path::Path) -> String {
    path.display().to_string()
}
