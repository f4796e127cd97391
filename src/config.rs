//! Deployment configuration file.
//!
//! The file is read once and turned into a [`Plan`]; nothing downstream
//! looks at it again.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{DeployError, IoContext, Result};
use crate::plan::{Dependency, LibrarySpec, Plan, Platform, SearchPath};

const VERSION_PLACEHOLDER: &str = "{version}";

fn default_strip() -> String {
    "strip".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Application name; lowercased to form the binary name.
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    pub deployment: DeploymentSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentSection {
    pub platform: String,
    pub qt_dir: String,
    pub application_dir: String,
    pub pkg_name: String,
    #[serde(default)]
    pub deployment_dir: Option<String>,
    #[serde(default)]
    pub lib_dirs: Vec<String>,
    #[serde(default)]
    pub qt_libs: Vec<String>,
    #[serde(default)]
    pub libs: Vec<String>,
    #[serde(default)]
    pub platform_plugins: Vec<String>,
    #[serde(default)]
    pub qt_plugins: Vec<String>,
    #[serde(default)]
    pub qml_plugins: Vec<String>,
    #[serde(default = "default_strip")]
    pub strip: String,
    #[serde(default)]
    pub audit: bool,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());
        let text = fs::read_to_string(path).at(path)?;
        Self::parse(&text).map_err(|e| match e {
            DeployError::Config(msg) => DeployError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| DeployError::Config(e.to_string()))
    }

    /// Build the plan. `version` overrides the file's version; relative
    /// paths are resolved against `base_dir`.
    pub fn into_plan(self, version: Option<&str>, base_dir: &Path) -> Result<Plan> {
        let version = version.map(str::to_string).or(self.version);
        let version = version.as_deref();
        let d = self.deployment;

        let platform: Platform = d.platform.parse()?;
        let qt_dir = prepare_path(&d.qt_dir, base_dir);
        let application_dir = prepare_path(&d.application_dir, base_dir);
        let pkg_name = prepare_path(&substitute_version(&d.pkg_name, version)?, base_dir);

        // Vendor-tool platforms bundle in place; no directory of ours to clean.
        let deployment_dir = match &d.deployment_dir {
            Some(dir) => Some(prepare_path(&substitute_version(dir, version)?, base_dir)),
            None if platform.archive_format().is_some() => {
                return Err(DeployError::Config(format!(
                    "deployment.deployment_dir is required for platform {platform}"
                )))
            }
            None => None,
        };

        let mut archive_path = OsString::from(pkg_name);
        archive_path.push(platform.package_suffix());

        let target_name = format!("{}{}", self.name.to_lowercase(), platform.target_extension());

        let toolkit_search = SearchPath::new([qt_dir.join("lib")]);
        let lib_search = SearchPath::new(
            non_empty(&d.lib_dirs).map(|dir| prepare_path(dir, base_dir)),
        );

        let mut dependencies = Vec::new();
        for raw in non_empty(&d.qt_libs) {
            dependencies.push(Dependency {
                spec: raw.parse::<LibrarySpec>()?,
                prefix: platform.library_prefix().to_string(),
                search_path: toolkit_search.clone(),
            });
        }
        for raw in non_empty(&d.libs) {
            dependencies.push(Dependency {
                spec: raw.parse::<LibrarySpec>()?,
                prefix: String::new(),
                search_path: lib_search.clone(),
            });
        }

        Ok(Plan {
            name: self.name,
            platform,
            target_binary: application_dir.join(target_name),
            toolkit_dir: qt_dir,
            deployment_dir,
            archive_path: PathBuf::from(archive_path),
            dependencies,
            platform_plugins: non_empty(&d.platform_plugins).map(str::to_string).collect(),
            toolkit_plugins: non_empty(&d.qt_plugins).map(str::to_string).collect(),
            qml_modules: non_empty(&d.qml_plugins).map(str::to_string).collect(),
            strip_tool: d.strip,
            audit: d.audit,
        })
    }
}

fn non_empty(values: &[String]) -> impl Iterator<Item = &str> {
    values.iter().map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Expand a leading `~` and make relative paths absolute against `base_dir`.
fn prepare_path(raw: &str, base_dir: &Path) -> PathBuf {
    let raw = raw.trim();
    let expanded = match raw.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => match dirs::home_dir() {
            Some(home) => home.join(rest.trim_start_matches('/')),
            None => PathBuf::from(raw),
        },
        _ => PathBuf::from(raw),
    };
    if expanded.is_absolute() {
        expanded
    } else {
        base_dir.join(expanded)
    }
}

fn substitute_version(raw: &str, version: Option<&str>) -> Result<String> {
    if !raw.contains(VERSION_PLACEHOLDER) {
        return Ok(raw.to_string());
    }
    match version {
        Some(v) => Ok(raw.replace(VERSION_PLACEHOLDER, v)),
        None => Err(DeployError::Config(format!(
            "'{raw}' uses {VERSION_PLACEHOLDER} but no version is set"
        ))),
    }
}
