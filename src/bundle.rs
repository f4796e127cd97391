//! Bundle directory layout and population.
//!
//! ```text
//! <deployment_dir>/
//!   <target>          launcher script
//!   bin/<target>      the application binary
//!   lib/              one physical file per shared library
//!   platforms/        platform plugins
//!   plugins/          toolkit plugin directories
//!   qml/              QML module directories
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::collapse::{clear_executable_bits, collapse_library_dir, CollapseReport};
use crate::copy::{copy_file, copy_preserving_symlink, make_executable, remove_files_named, replace_dir_tree};
use crate::error::{IoContext, Result};
use crate::paths::locate;
use crate::plan::Plan;

/// Build-time type metadata shipped with QML modules; not needed at run time.
pub const QMLTYPES_FILE: &str = "plugins.qmltypes";

/// Paths inside one bundle directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    root: PathBuf,
    target_name: String,
}

impl Bundle {
    pub fn new(root: impl Into<PathBuf>, target_name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            target_name: target_name.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub fn lib_dir(&self) -> PathBuf {
        self.root.join("lib")
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    pub fn platforms_dir(&self) -> PathBuf {
        self.root.join("platforms")
    }

    pub fn plugins_dir(&self) -> PathBuf {
        self.root.join("plugins")
    }

    pub fn qml_dir(&self) -> PathBuf {
        self.root.join("qml")
    }

    /// The application binary under `bin/`.
    pub fn binary_path(&self) -> PathBuf {
        self.bin_dir().join(&self.target_name)
    }

    /// The launcher script at the bundle root.
    pub fn launcher_path(&self) -> PathBuf {
        self.root.join(&self.target_name)
    }

    /// Create the subdirectories. Existing directories are fine.
    pub fn create_skeleton(&self) -> Result<()> {
        for dir in [
            self.lib_dir(),
            self.platforms_dir(),
            self.bin_dir(),
            self.plugins_dir(),
            self.qml_dir(),
        ] {
            fs::create_dir_all(&dir).at(&dir)?;
        }
        Ok(())
    }
}

/// Counters from one [`build`] run.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub library_files_copied: usize,
    pub plugin_bytes_copied: u64,
    pub qmltypes_removed: usize,
    pub collapse: CollapseReport,
}

/// Create and populate the bundle described by `plan`.
///
/// Library variants are copied with their symlinks intact and then collapsed,
/// so `lib/` ends up with one regular file per library.
pub fn build(plan: &Plan) -> Result<(Bundle, BuildReport)> {
    let bundle = Bundle::new(plan.bundle_dir()?, plan.target_name());
    let mut report = BuildReport::default();

    bundle.create_skeleton()?;

    info!("Copying {} libraries", plan.dependencies.len());
    report.library_files_copied = copy_libraries(plan, &bundle)?;

    report.collapse = collapse_library_dir(&bundle.lib_dir())?;
    clear_executable_bits(&bundle.lib_dir())?;

    for plugin in &plan.platform_plugins {
        let file_name = plan.platform_plugin_file(plugin);
        let src = plan.platform_plugin_source_dir().join(&file_name);
        let dst = bundle.platforms_dir().join(&file_name);
        debug!("Copying platform plugin {}", src.display());
        copy_file(&src, &dst)?;
    }

    let binary = bundle.binary_path();
    copy_file(&plan.target_binary, &binary)?;
    if plan.platform.is_linux() {
        make_executable(&binary)?;
    }

    for module in &plan.qml_modules {
        let src = plan.qml_source_dir().join(module);
        debug!("Copying QML module {}", src.display());
        report.plugin_bytes_copied += replace_dir_tree(&src, &bundle.qml_dir().join(module))?;
    }

    for plugin in &plan.toolkit_plugins {
        let src = plan.plugin_source_dir().join(plugin);
        debug!("Copying plugin directory {}", src.display());
        report.plugin_bytes_copied += replace_dir_tree(&src, &bundle.plugins_dir().join(plugin))?;
    }

    report.qmltypes_removed = remove_files_named(&bundle.qml_dir(), QMLTYPES_FILE)?;

    info!(
        "Bundle populated: {} library files copied, {} removed while collapsing",
        report.library_files_copied,
        report.collapse.removed_count()
    );
    Ok((bundle, report))
}

/// Resolve and copy every dependency into `lib/`. Returns the number of files copied.
fn copy_libraries(plan: &Plan, bundle: &Bundle) -> Result<usize> {
    let lib_dir = bundle.lib_dir();
    let extension = plan.platform.library_extension();
    let mut copied = 0;

    for dep in &plan.dependencies {
        let resolution = locate(&dep.spec, &dep.search_path, &dep.prefix, extension)?;

        if dep.spec.exact_version.is_some() {
            let primary = &resolution.primary;
            copy_file(&primary.path, &lib_dir.join(primary.file_name()))?;
            copied += 1;
            continue;
        }

        for variant in &resolution.variants {
            copy_preserving_symlink(&variant.path, &lib_dir.join(variant.file_name()))?;
            copied += 1;
        }
    }

    Ok(copied)
}
