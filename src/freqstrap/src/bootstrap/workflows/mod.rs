//! Step implementations, grouped by what they provision.

pub mod account;
pub mod app;
pub mod runtime;
pub mod system;

use crate::bootstrap::profile::ProfileSettings;
use crate::bootstrap::tasks::ProvisionStep;

/// System configuration steps for a profile (empty for repair).
pub fn system_steps(settings: &ProfileSettings) -> Vec<ProvisionStep> {
    if settings.repair {
        return Vec::new();
    }
    let mut steps = vec![
        ProvisionStep::KeyboardLayout,
        ProvisionStep::RefreshPackageIndex,
        ProvisionStep::UpgradePackages,
    ];
    steps.extend(
        settings
            .package_groups
            .iter()
            .map(|g| ProvisionStep::PackageGroup(*g)),
    );
    steps
}

/// Ordered pipeline for a profile: preflight first, verification last.
pub fn plan(settings: &ProfileSettings) -> Vec<ProvisionStep> {
    let mut steps = vec![ProvisionStep::Preflight];
    steps.extend(system_steps(settings));
    steps.extend([
        ProvisionStep::ServiceAccount,
        ProvisionStep::DirectoryTree,
        ProvisionStep::PythonRuntime,
        ProvisionStep::VirtualEnv,
        ProvisionStep::FreqtradeInstall,
        ProvisionStep::Configuration,
        ProvisionStep::Strategy,
        ProvisionStep::HelperScripts,
        ProvisionStep::ServiceUnit,
        ProvisionStep::Verify,
    ]);
    steps
}
