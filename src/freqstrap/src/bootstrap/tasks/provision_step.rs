/// ProvisionStep: one named, idempotent unit of a provisioning pipeline
use crate::bootstrap::profile::PackageGroup;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStep {
    Preflight,
    KeyboardLayout,
    RefreshPackageIndex,
    UpgradePackages,
    PackageGroup(PackageGroup),
    ServiceAccount,
    DirectoryTree,
    PythonRuntime,
    VirtualEnv,
    FreqtradeInstall,
    Configuration,
    Strategy,
    HelperScripts,
    ServiceUnit,
    Verify,
}

impl ProvisionStep {
    pub fn display_name(&self) -> String {
        match self {
            ProvisionStep::Preflight => "preflight checks".to_string(),
            ProvisionStep::KeyboardLayout => "keyboard layout".to_string(),
            ProvisionStep::RefreshPackageIndex => "package index refresh".to_string(),
            ProvisionStep::UpgradePackages => "package upgrade".to_string(),
            ProvisionStep::PackageGroup(group) => format!("{} packages", group.label()),
            ProvisionStep::ServiceAccount => "service account".to_string(),
            ProvisionStep::DirectoryTree => "directory tree".to_string(),
            ProvisionStep::PythonRuntime => "python runtime".to_string(),
            ProvisionStep::VirtualEnv => "virtual environment".to_string(),
            ProvisionStep::FreqtradeInstall => "freqtrade install".to_string(),
            ProvisionStep::Configuration => "configuration".to_string(),
            ProvisionStep::Strategy => "strategy".to_string(),
            ProvisionStep::HelperScripts => "helper scripts".to_string(),
            ProvisionStep::ServiceUnit => "service unit".to_string(),
            ProvisionStep::Verify => "verification".to_string(),
        }
    }

    pub fn task_id(&self) -> String {
        match self {
            ProvisionStep::PackageGroup(group) => format!("packages.{}", group.id()),
            other => other.display_name().trim().replace([' ', '-'], "_"),
        }
    }

    /// Whether the step can change the host.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, ProvisionStep::Preflight | ProvisionStep::Verify)
    }
}

impl std::fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display_name())
    }
}
