/// Provisioning configuration
/// Loaded from freqstrap.toml, every field optional and defaulted.
use crate::bootstrap::artifacts::FREQAI_STRATEGY_NAME;
use crate::provisioner::ProvisionError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Immutable settings shared by every step. Built once per run.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ProvisionConfig {
    #[serde(default)]
    pub account: AccountConfig,

    #[serde(default)]
    pub python: PythonConfig,

    #[serde(default)]
    pub freqtrade: FreqtradeConfig,

    #[serde(default)]
    pub system: SystemConfig,

    #[serde(default)]
    pub requirements: RequirementsConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Directory with template overrides (same relative names as the embedded set)
    #[serde(default)]
    pub templates_dir: Option<PathBuf>,
}

impl ProvisionConfig {
    /// Load configuration, searching the usual locations when `explicit` is `None`.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ProvisionError> {
        if let Some(path) = explicit {
            let config = Self::from_file(path)?;
            tracing::info!("Loaded provisioning config from {:?}", path);
            return Ok(config);
        }

        let mut config_paths = vec![PathBuf::from("freqstrap.toml")];
        if let Some(dir) = dirs::config_dir() {
            config_paths.push(dir.join("freqstrap").join("freqstrap.toml"));
        }
        config_paths.push(PathBuf::from("/etc/freqstrap/freqstrap.toml"));

        for path in config_paths {
            if path.exists() {
                let config = Self::from_file(&path)?;
                tracing::info!("Loaded provisioning config from {:?}", path);
                return Ok(config);
            }
        }

        tracing::info!("No freqstrap.toml found, using defaults");
        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> Result<Self, ProvisionError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProvisionError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| ProvisionError::Config(format!("{:?}: {}", path, e)))
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ProvisionError> {
        let config: ProvisionConfig = toml::from_str(content)
            .map_err(|e| ProvisionError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ProvisionError> {
        let name = &self.account.name;
        let valid_name = !name.is_empty()
            && name.len() <= 32
            && name
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
        if !valid_name {
            return Err(ProvisionError::Config(format!(
                "Invalid service account name '{}'",
                name
            )));
        }
        if name == "root" {
            return Err(ProvisionError::Config(
                "The service account must not be root".to_string(),
            ));
        }
        if self.python.version.trim().is_empty() {
            return Err(ProvisionError::Config(
                "python.version must not be empty".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ProvisionError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        let strategy = &self.freqtrade.strategy_name;
        let valid_class = strategy
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && strategy.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_class {
            return Err(ProvisionError::Config(format!(
                "freqtrade.strategy_name '{}' is not a valid Python class name",
                strategy
            )));
        }
        // Same file as the FreqAI starter strategy
        if strategy == FREQAI_STRATEGY_NAME {
            return Err(ProvisionError::Config(format!(
                "freqtrade.strategy_name '{}' is reserved for the FreqAI starter strategy",
                strategy
            )));
        }
        Ok(())
    }

    /// Apply `--account` style overrides from the command line.
    pub fn with_account_name(mut self, name: impl Into<String>) -> Self {
        self.account.name = name.into();
        self
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.logging.dir = dir.into();
        self
    }
}

/// Service account settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountConfig {
    #[serde(default = "default_account_name")]
    pub name: String,

    /// Parent of the account's home directory
    #[serde(default = "default_home_root")]
    pub home_root: PathBuf,

    #[serde(default = "default_shell")]
    pub shell: String,

    /// Supplementary groups, joined only when the group exists on the host
    #[serde(default)]
    pub extra_groups: Vec<String>,
}

fn default_account_name() -> String {
    "ftuser".to_string()
}

fn default_home_root() -> PathBuf {
    PathBuf::from("/home")
}

fn default_shell() -> String {
    "/bin/bash".to_string()
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            name: default_account_name(),
            home_root: default_home_root(),
            shell: default_shell(),
            extra_groups: Vec::new(),
        }
    }
}

/// Python runtime settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PythonConfig {
    /// Version built by pyenv (full profile)
    #[serde(default = "default_python_version")]
    pub version: String,

    #[serde(default = "default_pyenv_repo")]
    pub pyenv_repo: String,

    /// Interpreter used by the native profile
    #[serde(default = "default_system_python")]
    pub system_python: PathBuf,
}

fn default_python_version() -> String {
    "3.11.9".to_string()
}

fn default_pyenv_repo() -> String {
    "https://github.com/pyenv/pyenv.git".to_string()
}

fn default_system_python() -> PathBuf {
    PathBuf::from("/usr/bin/python3")
}

impl Default for PythonConfig {
    fn default() -> Self {
        Self {
            version: default_python_version(),
            pyenv_repo: default_pyenv_repo(),
            system_python: default_system_python(),
        }
    }
}

/// Trading framework settings rendered into the config artifact
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FreqtradeConfig {
    /// pip requirement, e.g. "freqtrade" or "freqtrade==2024.10"
    #[serde(default = "default_package")]
    pub package: String,

    #[serde(default = "default_strategy_name")]
    pub strategy_name: String,

    #[serde(default = "default_exchange")]
    pub exchange: String,

    #[serde(default = "default_stake_currency")]
    pub stake_currency: String,

    /// "unlimited" or a number, kept as a string
    #[serde(default = "default_stake_amount")]
    pub stake_amount: String,

    #[serde(default = "default_max_open_trades")]
    pub max_open_trades: u32,

    #[serde(default = "default_true")]
    pub dry_run: bool,

    #[serde(default = "default_dry_run_wallet")]
    pub dry_run_wallet: u32,

    #[serde(default = "default_timeframe")]
    pub timeframe: String,

    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_api_username")]
    pub api_username: String,

    /// Overrides the profile's pair whitelist
    #[serde(default)]
    pub pair_whitelist: Option<Vec<String>>,

    /// Overrides the profile's FreqAI default
    #[serde(default)]
    pub freqai: Option<bool>,
}

fn default_package() -> String {
    "freqtrade".to_string()
}

fn default_strategy_name() -> String {
    "SampleStrategy".to_string()
}

fn default_exchange() -> String {
    "binance".to_string()
}

fn default_stake_currency() -> String {
    "USDT".to_string()
}

fn default_stake_amount() -> String {
    "unlimited".to_string()
}

fn default_max_open_trades() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

fn default_dry_run_wallet() -> u32 {
    1000
}

fn default_timeframe() -> String {
    "5m".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_api_username() -> String {
    "freqtrader".to_string()
}

impl Default for FreqtradeConfig {
    fn default() -> Self {
        Self {
            package: default_package(),
            strategy_name: default_strategy_name(),
            exchange: default_exchange(),
            stake_currency: default_stake_currency(),
            stake_amount: default_stake_amount(),
            max_open_trades: default_max_open_trades(),
            dry_run: true,
            dry_run_wallet: default_dry_run_wallet(),
            timeframe: default_timeframe(),
            api_port: default_api_port(),
            api_username: default_api_username(),
            pair_whitelist: None,
            freqai: None,
        }
    }
}

/// Host-level settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemConfig {
    #[serde(default = "default_keyboard_layout")]
    pub keyboard_layout: String,

    #[serde(default = "default_service_dir")]
    pub service_dir: PathBuf,

    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Package index younger than this is not refreshed again
    #[serde(default = "default_index_max_age_secs")]
    pub package_index_max_age_secs: u64,
}

fn default_keyboard_layout() -> String {
    "us".to_string()
}

fn default_service_dir() -> PathBuf {
    PathBuf::from("/etc/systemd/system")
}

fn default_service_name() -> String {
    "freqtrade".to_string()
}

fn default_index_max_age_secs() -> u64 {
    6 * 3600
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            keyboard_layout: default_keyboard_layout(),
            service_dir: default_service_dir(),
            service_name: default_service_name(),
            package_index_max_age_secs: default_index_max_age_secs(),
        }
    }
}

/// Preflight thresholds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequirementsConfig {
    #[serde(default = "default_min_disk_gb")]
    pub min_disk_gb: u64,

    #[serde(default = "default_min_ram_mb")]
    pub min_ram_mb: u64,

    #[serde(default = "default_probe_host")]
    pub network_probe_host: String,

    #[serde(default = "default_probe_port")]
    pub network_probe_port: u16,

    #[serde(default = "default_probe_timeout_secs")]
    pub network_probe_timeout_secs: u64,
}

fn default_min_disk_gb() -> u64 {
    10
}

fn default_min_ram_mb() -> u64 {
    2048
}

fn default_probe_host() -> String {
    "pypi.org".to_string()
}

fn default_probe_port() -> u16 {
    443
}

fn default_probe_timeout_secs() -> u64 {
    5
}

impl Default for RequirementsConfig {
    fn default() -> Self {
        Self {
            min_disk_gb: default_min_disk_gb(),
            min_ram_mb: default_min_ram_mb(),
            network_probe_host: default_probe_host(),
            network_probe_port: default_probe_port(),
            network_probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

/// Retry policy for network and package operations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_delay_secs() -> u64 {
    5
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_secs: default_delay_secs(),
        }
    }
}

/// Run log settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

fn default_retention_days() -> u64 {
    7
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            retention_days: default_retention_days(),
        }
    }
}
