/// On-disk layout derived from the configuration.
use super::artifacts::Sensitivity;
use super::config::ProvisionConfig;
use std::path::{Path, PathBuf};

/// A directory freqstrap owns, with the class that decides its mode.
#[derive(Debug, Clone)]
pub struct ManagedDir {
    pub label: &'static str,
    pub path: PathBuf,
    pub sensitivity: Sensitivity,
}

#[derive(Debug, Clone)]
pub struct Layout {
    pub home: PathBuf,
    pub app_dir: PathBuf,
    pub user_data: PathBuf,
    pub strategies: PathBuf,
    pub data: PathBuf,
    pub logs: PathBuf,
    pub venv: PathBuf,
    pub secrets: PathBuf,
    pub config_file: PathBuf,
    pub credentials_file: PathBuf,
    pub pyenv_root: PathBuf,
    pub unit_path: PathBuf,
}

impl Layout {
    pub fn from_config(config: &ProvisionConfig) -> Self {
        let home = config.account.home_root.join(&config.account.name);
        let app_dir = home.join("freqtrade");
        let user_data = app_dir.join("user_data");
        let secrets = home.join(".secrets");

        Self {
            strategies: user_data.join("strategies"),
            data: user_data.join("data"),
            logs: user_data.join("logs"),
            venv: app_dir.join(".venv"),
            config_file: user_data.join("config.json"),
            credentials_file: secrets.join("exchange.env"),
            pyenv_root: home.join(".pyenv"),
            unit_path: config
                .system
                .service_dir
                .join(format!("{}.service", config.system.service_name)),
            home,
            app_dir,
            user_data,
            secrets,
        }
    }

    /// Directories in creation order (parents first).
    pub fn managed_dirs(&self) -> Vec<ManagedDir> {
        vec![
            ManagedDir {
                label: "home",
                path: self.home.clone(),
                sensitivity: Sensitivity::General,
            },
            ManagedDir {
                label: "application",
                path: self.app_dir.clone(),
                sensitivity: Sensitivity::General,
            },
            ManagedDir {
                label: "user data",
                path: self.user_data.clone(),
                sensitivity: Sensitivity::General,
            },
            ManagedDir {
                label: "strategies",
                path: self.strategies.clone(),
                sensitivity: Sensitivity::General,
            },
            ManagedDir {
                label: "market data",
                path: self.data.clone(),
                sensitivity: Sensitivity::General,
            },
            ManagedDir {
                label: "bot logs",
                path: self.logs.clone(),
                sensitivity: Sensitivity::General,
            },
            ManagedDir {
                label: "virtualenv",
                path: self.venv.clone(),
                sensitivity: Sensitivity::General,
            },
            ManagedDir {
                label: "secrets",
                path: self.secrets.clone(),
                sensitivity: Sensitivity::Secret,
            },
        ]
    }

    pub fn venv_bin(&self, name: &str) -> PathBuf {
        self.venv.join("bin").join(name)
    }

    pub fn venv_python(&self) -> PathBuf {
        self.venv_bin("python")
    }

    pub fn freqtrade_bin(&self) -> PathBuf {
        self.venv_bin("freqtrade")
    }

    pub fn pyenv_bin(&self) -> PathBuf {
        self.pyenv_root.join("bin").join("pyenv")
    }

    pub fn pyenv_python(&self, version: &str) -> PathBuf {
        self.pyenv_root
            .join("versions")
            .join(version)
            .join("bin")
            .join("python")
    }

    pub fn script(&self, name: &str) -> PathBuf {
        self.app_dir.join(name)
    }

    pub fn strategy_file(&self, class_name: &str) -> PathBuf {
        self.strategies.join(format!("{}.py", class_name))
    }

    /// Whether `path` lies inside the service account's home.
    pub fn is_under_home(&self, path: &Path) -> bool {
        path.starts_with(&self.home) && path != self.home
    }
}
