//! The deployment pipeline: cleanup, layout, strip, launcher, archive.
//!
//! Stages run strictly in order and the first error aborts the run. A failed
//! run leaves its partial output behind; the next run's [`cleanup`] removes it.

use std::fs;
use std::path::PathBuf;

use tracing::info;

use crate::analyze::{audit_bundle, AuditOutcome};
use crate::archive::create_archive;
use crate::bundle::{self, Bundle, BuildReport};
use crate::copy::remove_if_present;
use crate::error::{DeployError, IoContext, Result};
use crate::launcher::write_launcher;
use crate::plan::Plan;
use crate::strip::Stripper;

/// Everything a successful run produced.
#[derive(Debug)]
pub struct Deployment {
    pub bundle: Bundle,
    pub build: BuildReport,
    pub stripped: usize,
    pub audit: AuditOutcome,
    pub launcher: PathBuf,
    pub archive: PathBuf,
    pub archived_entries: usize,
}

/// Remove the bundle directory and the archive from any previous run.
/// Paths that do not exist are fine. A plan without a deployment directory
/// only loses its archive.
pub fn cleanup(plan: &Plan) -> Result<()> {
    info!("Cleaning up previous output");
    if let Some(dir) = &plan.deployment_dir {
        if dir.exists() {
            fs::remove_dir_all(dir).at(dir)?;
        }
    }
    remove_if_present(&plan.archive_path)
}

/// Run the full pipeline for a Linux plan.
///
/// # Errors
///
/// [`DeployError::UnsupportedPlatform`] for platforms packaged by vendor
/// tools; otherwise the first error from any stage.
pub fn deploy(plan: &Plan) -> Result<Deployment> {
    let platform = plan.platform;
    let (loader, format) = match (platform.loader(), platform.archive_format()) {
        (Some(loader), Some(format)) if platform.is_linux() => (loader, format),
        _ => return Err(DeployError::UnsupportedPlatform(platform.to_string())),
    };

    let bundle_dir = plan.bundle_dir()?;
    cleanup(plan)?;

    info!("Building bundle in {}", bundle_dir.display());
    let (bundle, build) = bundle::build(plan)?;

    info!("Stripping debug symbols with {}", plan.strip_tool);
    let stripped =
        Stripper::new(plan.strip_tool.as_str()).strip_bundle(&bundle, platform.library_extension())?;

    let audit = if plan.audit {
        audit_bundle(&bundle)
    } else {
        AuditOutcome::NotAttempted
    };

    let launcher = write_launcher(&bundle, loader)?;

    info!("Compressing bundle into {}", plan.archive_path.display());
    let archived_entries = create_archive(bundle.root(), &plan.archive_path, format)?;

    Ok(Deployment {
        bundle,
        build,
        stripped,
        audit,
        launcher,
        archive: plan.archive_path.clone(),
        archived_entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFile;
    use crate::plan::Platform;
    use tempfile::TempDir;

    fn empty_plan(root: &std::path::Path, platform: Platform) -> Plan {
        Plan {
            name: "App".to_string(),
            platform,
            target_binary: root.join("build/app"),
            toolkit_dir: root.join("qt"),
            deployment_dir: Some(root.join("dist/app")),
            archive_path: root.join("dist/app.tar.gz"),
            dependencies: Vec::new(),
            platform_plugins: Vec::new(),
            toolkit_plugins: Vec::new(),
            qml_modules: Vec::new(),
            strip_tool: "true".to_string(),
            audit: false,
        }
    }

    #[test]
    fn test_cleanup_removes_previous_output() {
        let temp = TempDir::new().unwrap();
        let plan = empty_plan(temp.path(), Platform::LinuxX64);
        let dir = plan.bundle_dir().unwrap();
        fs::create_dir_all(dir.join("lib")).unwrap();
        fs::write(dir.join("lib/libstale.so"), "x").unwrap();
        fs::write(&plan.archive_path, "partial").unwrap();

        cleanup(&plan).unwrap();

        assert!(!dir.exists());
        assert!(!plan.archive_path.exists());
    }

    #[test]
    fn test_cleanup_without_previous_output() {
        let temp = TempDir::new().unwrap();
        let plan = empty_plan(temp.path(), Platform::LinuxX64);
        cleanup(&plan).unwrap();
    }

    #[test]
    fn test_cleanup_keeps_application_dir_without_deployment_dir() {
        let temp = TempDir::new().unwrap();
        let config = r#"
name = "App"
version = "1.0"

[deployment]
platform = "mac"
qt_dir = "qt"
application_dir = "build"
pkg_name = "dist/app-{version}"
"#;
        let plan = ConfigFile::parse(config)
            .unwrap()
            .into_plan(None, temp.path())
            .unwrap();
        let build = temp.path().join("build");
        fs::create_dir_all(&build).unwrap();
        fs::write(build.join("App.app"), "binary").unwrap();
        fs::create_dir_all(temp.path().join("dist")).unwrap();
        fs::write(&plan.archive_path, "old package").unwrap();

        cleanup(&plan).unwrap();

        assert!(build.join("App.app").exists(), "application build output was removed");
        assert!(!plan.archive_path.exists());
    }

    #[test]
    fn test_linux_plan_without_deployment_dir_is_rejected() {
        let temp = TempDir::new().unwrap();
        let mut plan = empty_plan(temp.path(), Platform::LinuxX64);
        plan.deployment_dir = None;

        let err = deploy(&plan).unwrap_err();
        assert!(matches!(err, DeployError::Config(_)), "got: {err}");
    }

    #[test]
    fn test_vendor_platforms_are_rejected() {
        let temp = TempDir::new().unwrap();
        for platform in [Platform::Mac, Platform::Android, Platform::WindowsX64] {
            let plan = empty_plan(temp.path(), platform);
            let err = deploy(&plan).unwrap_err();
            assert!(matches!(err, DeployError::UnsupportedPlatform(_)), "got: {err}");
        }
    }

    #[test]
    fn test_missing_binary_aborts_before_archive() {
        let temp = TempDir::new().unwrap();
        let plan = empty_plan(temp.path(), Platform::LinuxX64);

        assert!(deploy(&plan).is_err());
        assert!(!plan.archive_path.exists());
    }
}
