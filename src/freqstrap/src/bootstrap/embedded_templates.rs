//! Embedded artifact templates - compiled into the binary so freqstrap is a single file.
//!
//! Templates are loaded at compile time via `include_str!` and registered with the
//! TemplateRenderer. A `templates_dir` override may replace any of them by name.

/// Configuration templates
pub static CONFIG_JSON: &str = include_str!("templates/config/config.json.j2");
pub static EXCHANGE_ENV: &str = include_str!("templates/config/exchange.env.j2");

/// Strategy templates
pub static SAMPLE_STRATEGY: &str = include_str!("templates/strategies/SampleStrategy.py.j2");
pub static FREQAI_STRATEGY: &str =
    include_str!("templates/strategies/FreqaiStarterStrategy.py.j2");

/// Helper scripts
pub static START_SH: &str = include_str!("templates/scripts/start.sh.j2");
pub static BACKTEST_SH: &str = include_str!("templates/scripts/backtest.sh.j2");
pub static HYPEROPT_SH: &str = include_str!("templates/scripts/hyperopt.sh.j2");
pub static DOWNLOAD_DATA_SH: &str = include_str!("templates/scripts/download-data.sh.j2");
pub static UPDATE_SH: &str = include_str!("templates/scripts/update.sh.j2");

/// Service unit
pub static SERVICE_UNIT: &str = include_str!("templates/systemd/freqtrade.service.j2");

/// All embedded templates as (name, content) pairs for registration with Tera.
pub const ALL_TEMPLATES: &[(&str, &str)] = &[
    ("config/config.json.j2", CONFIG_JSON),
    ("config/exchange.env.j2", EXCHANGE_ENV),
    ("strategies/SampleStrategy.py.j2", SAMPLE_STRATEGY),
    ("strategies/FreqaiStarterStrategy.py.j2", FREQAI_STRATEGY),
    ("scripts/start.sh.j2", START_SH),
    ("scripts/backtest.sh.j2", BACKTEST_SH),
    ("scripts/hyperopt.sh.j2", HYPEROPT_SH),
    ("scripts/download-data.sh.j2", DOWNLOAD_DATA_SH),
    ("scripts/update.sh.j2", UPDATE_SH),
    ("systemd/freqtrade.service.j2", SERVICE_UNIT),
];
