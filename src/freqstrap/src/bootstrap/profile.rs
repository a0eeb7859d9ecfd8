//! Provisioning profiles.
//!
//! The install and repair variants share most steps but differ in defaults.
//! They are kept as separate named profiles instead of one merged behaviour.

use super::config::ProvisionConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// pyenv-built Python, every tool group, FreqAI enabled
    Full,
    /// Distribution Python, build and network tools only, FreqAI disabled
    Native,
    /// No system packages; re-apply permissions and fix broken environments
    Repair,
}

impl Profile {
    pub fn name(&self) -> &'static str {
        match self {
            Profile::Full => "full",
            Profile::Native => "native",
            Profile::Repair => "repair",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Profile::Full),
            "native" => Ok(Profile::Native),
            "repair" => Ok(Profile::Repair),
            other => Err(format!(
                "unknown profile '{}' (expected full, native or repair)",
                other
            )),
        }
    }
}

/// How the base Python interpreter is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeKind {
    Pyenv,
    SystemPython,
    /// Use whatever is already installed (pyenv build first)
    Detect,
}

/// A named set of apt packages installed together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageGroup {
    BuildTools,
    NetworkTools,
    DatabaseServers,
    ContainerRuntime,
    NativePython,
}

impl PackageGroup {
    pub fn label(&self) -> &'static str {
        match self {
            PackageGroup::BuildTools => "build tools",
            PackageGroup::NetworkTools => "network tools",
            PackageGroup::DatabaseServers => "database servers",
            PackageGroup::ContainerRuntime => "container runtime",
            PackageGroup::NativePython => "native python",
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            PackageGroup::BuildTools => "build_tools",
            PackageGroup::NetworkTools => "network_tools",
            PackageGroup::DatabaseServers => "database_servers",
            PackageGroup::ContainerRuntime => "container_runtime",
            PackageGroup::NativePython => "native_python",
        }
    }

    pub fn packages(&self) -> &'static [&'static str] {
        match self {
            PackageGroup::BuildTools => &[
                "build-essential",
                "git",
                "curl",
                "wget",
                "ca-certificates",
                "pkg-config",
                "xz-utils",
                "libssl-dev",
                "libffi-dev",
                "zlib1g-dev",
                "libbz2-dev",
                "libreadline-dev",
                "libsqlite3-dev",
                "liblzma-dev",
                "libncurses-dev",
                "tk-dev",
                "libxml2-dev",
                "libxmlsec1-dev",
            ],
            PackageGroup::NetworkTools => &[
                "net-tools",
                "dnsutils",
                "iputils-ping",
                "htop",
                "iotop",
                "ufw",
                "jq",
            ],
            PackageGroup::DatabaseServers => &["postgresql", "redis-server", "sqlite3"],
            PackageGroup::ContainerRuntime => &["docker.io", "docker-compose-v2"],
            PackageGroup::NativePython => {
                &["python3", "python3-venv", "python3-dev", "python3-pip"]
            }
        }
    }

    /// Group the service account joins once this package group is installed.
    pub fn account_group(&self) -> Option<&'static str> {
        match self {
            PackageGroup::ContainerRuntime => Some("docker"),
            _ => None,
        }
    }
}

const FULL_PAIRS: &[&str] = &[
    "BTC/USDT", "ETH/USDT", "BNB/USDT", "SOL/USDT", "XRP/USDT", "ADA/USDT",
];

const NATIVE_PAIRS: &[&str] = &["BTC/USDT", "ETH/USDT"];

/// Profile defaults merged with config overrides.
#[derive(Debug, Clone)]
pub struct ProfileSettings {
    pub profile: Profile,
    pub runtime: RuntimeKind,
    pub package_groups: Vec<PackageGroup>,
    pub freqai: bool,
    pub pair_whitelist: Vec<String>,
    /// Fix drifted permissions and broken environments instead of only warning
    pub repair: bool,
}

impl ProfileSettings {
    pub fn resolve(profile: Profile, config: &ProvisionConfig) -> Self {
        let (runtime, package_groups, freqai, pairs, repair) = match profile {
            Profile::Full => (
                RuntimeKind::Pyenv,
                vec![
                    PackageGroup::BuildTools,
                    PackageGroup::NetworkTools,
                    PackageGroup::DatabaseServers,
                    PackageGroup::ContainerRuntime,
                ],
                true,
                FULL_PAIRS,
                false,
            ),
            Profile::Native => (
                RuntimeKind::SystemPython,
                vec![
                    PackageGroup::BuildTools,
                    PackageGroup::NetworkTools,
                    PackageGroup::NativePython,
                ],
                false,
                NATIVE_PAIRS,
                false,
            ),
            Profile::Repair => (RuntimeKind::Detect, Vec::new(), false, NATIVE_PAIRS, true),
        };

        Self {
            profile,
            runtime,
            package_groups,
            freqai: config.freqtrade.freqai.unwrap_or(freqai),
            pair_whitelist: config
                .freqtrade
                .pair_whitelist
                .clone()
                .unwrap_or_else(|| pairs.iter().map(|p| p.to_string()).collect()),
            repair,
        }
    }

    /// Supplementary groups the service account should belong to.
    pub fn account_groups(&self, config: &ProvisionConfig) -> Vec<String> {
        let mut groups = config.account.extra_groups.clone();
        for group in self.package_groups.iter().filter_map(|g| g.account_group()) {
            if !groups.iter().any(|g| g == group) {
                groups.push(group.to_string());
            }
        }
        groups
    }

    /// Strategy the service starts with.
    pub fn active_strategy(&self, config: &ProvisionConfig) -> String {
        if self.freqai {
            super::artifacts::FREQAI_STRATEGY_NAME.to_string()
        } else {
            config.freqtrade.strategy_name.clone()
        }
    }
}
