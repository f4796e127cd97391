//! The deployment plan: everything a run needs, built once from configuration.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{self, DeployError};

/// A declared library dependency, written `name` or `name:exactVersion`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibrarySpec {
    pub name: String,
    /// `None` resolves to the newest matching file present.
    pub exact_version: Option<String>,
}

impl LibrarySpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exact_version: None,
        }
    }

    pub fn exact(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exact_version: Some(version.into()),
        }
    }
}

impl FromStr for LibrarySpec {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, version) = match s.split_once(':') {
            Some((name, version)) => (name.trim(), Some(version.trim())),
            None => (s, None),
        };
        if name.is_empty() || version.is_some_and(|v| v.contains(':')) {
            return Err(DeployError::InvalidLibrarySpec(s.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            exact_version: version.filter(|v| !v.is_empty()).map(str::to_string),
        })
    }
}

impl fmt::Display for LibrarySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.exact_version {
            Some(version) => write!(f, "{}:{}", self.name, version),
            None => f.write_str(&self.name),
        }
    }
}

/// Candidate directories in priority order. Missing directories are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPath(Vec<PathBuf>);

impl SearchPath {
    pub fn new<I, P>(dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self(dirs.into_iter().map(Into::into).collect())
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.0
    }
}

/// One library to ship, with the filename prefix and directories to find it in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub spec: LibrarySpec,
    /// Prepended to the name, `lib` for toolkit libraries and empty otherwise.
    pub prefix: String,
    pub search_path: SearchPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    Zip,
}

impl ArchiveFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::TarGz => ".tar.gz",
            Self::Zip => ".zip",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    LinuxX86,
    LinuxX64,
    LinuxAarch64,
    WindowsX86,
    WindowsX64,
    Mac,
    Android,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LinuxX86 => "linux_x86",
            Self::LinuxX64 => "linux_x64",
            Self::LinuxAarch64 => "linux_aarch64",
            Self::WindowsX86 => "windows_x86",
            Self::WindowsX64 => "windows_x64",
            Self::Mac => "mac",
            Self::Android => "android",
        }
    }

    pub fn is_linux(self) -> bool {
        matches!(self, Self::LinuxX86 | Self::LinuxX64 | Self::LinuxAarch64)
    }

    pub fn library_prefix(self) -> &'static str {
        if self.is_linux() {
            "lib"
        } else {
            ""
        }
    }

    pub fn library_extension(self) -> &'static str {
        match self {
            Self::LinuxX86 | Self::LinuxX64 | Self::LinuxAarch64 => ".so",
            Self::WindowsX86 | Self::WindowsX64 => ".dll",
            Self::Mac | Self::Android => "",
        }
    }

    pub fn target_extension(self) -> &'static str {
        match self {
            Self::LinuxX86 | Self::LinuxX64 | Self::LinuxAarch64 => "",
            Self::WindowsX86 | Self::WindowsX64 => ".exe",
            Self::Mac => ".app",
            Self::Android => ".apk",
        }
    }

    /// Suffix appended to the package name to form the artifact path.
    pub fn package_suffix(self) -> &'static str {
        match self {
            Self::Mac => ".dmg",
            Self::Android => ".apk",
            _ => self.archive_format().map_or("", ArchiveFormat::extension),
        }
    }

    /// Archive format for platforms whose artifact this crate writes itself.
    pub fn archive_format(self) -> Option<ArchiveFormat> {
        match self {
            Self::LinuxX86 | Self::LinuxX64 | Self::LinuxAarch64 => Some(ArchiveFormat::TarGz),
            Self::WindowsX86 | Self::WindowsX64 => Some(ArchiveFormat::Zip),
            Self::Mac | Self::Android => None,
        }
    }

    /// The dynamic loader the launcher execs the binary through.
    pub fn loader(self) -> Option<&'static str> {
        match self {
            Self::LinuxX86 => Some("/lib/ld-linux.so.2"),
            Self::LinuxX64 => Some("/lib64/ld-linux-x86-64.so.2"),
            Self::LinuxAarch64 => Some("/lib/ld-linux-aarch64.so.1"),
            _ => None,
        }
    }
}

impl FromStr for Platform {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "linux_x86" => Ok(Self::LinuxX86),
            "linux_x64" => Ok(Self::LinuxX64),
            "linux_aarch64" => Ok(Self::LinuxAarch64),
            "windows_x86" => Ok(Self::WindowsX86),
            "windows_x64" => Ok(Self::WindowsX64),
            "mac" => Ok(Self::Mac),
            other if other.starts_with("android") => Ok(Self::Android),
            other => Err(DeployError::Config(format!("unknown platform '{other}'"))),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything one run needs. Built once and passed by reference to each stage.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Application name as declared.
    pub name: String,
    pub platform: Platform,
    /// The compiled application binary.
    pub target_binary: PathBuf,
    /// Root of the toolkit installation; plugins and QML modules come from here.
    pub toolkit_dir: PathBuf,
    /// Bundle output directory, removed and recreated by each run.
    /// `None` for platforms whose bundle is produced in place by vendor tools.
    pub deployment_dir: Option<PathBuf>,
    pub archive_path: PathBuf,
    pub dependencies: Vec<Dependency>,
    pub platform_plugins: Vec<String>,
    pub toolkit_plugins: Vec<String>,
    pub qml_modules: Vec<String>,
    /// Program invoked to strip debug symbols.
    pub strip_tool: String,
    pub audit: bool,
}

impl Plan {
    /// File name of the application binary inside the bundle.
    pub fn target_name(&self) -> String {
        self.target_binary
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name.to_lowercase())
    }

    /// The bundle output directory.
    ///
    /// # Errors
    ///
    /// [`DeployError::Config`] if the plan has no deployment directory.
    pub fn bundle_dir(&self) -> error::Result<&Path> {
        self.deployment_dir
            .as_deref()
            .ok_or_else(|| DeployError::Config(format!("no deployment directory for {}", self.name)))
    }

    pub fn plugin_source_dir(&self) -> PathBuf {
        self.toolkit_dir.join("plugins")
    }

    pub fn platform_plugin_source_dir(&self) -> PathBuf {
        self.plugin_source_dir().join("platforms")
    }

    pub fn qml_source_dir(&self) -> PathBuf {
        self.toolkit_dir.join("qml")
    }

    /// File name of a platform plugin, e.g. `libqxcb.so` for `qxcb`.
    pub fn platform_plugin_file(&self, plugin: &str) -> String {
        format!(
            "{}{}{}",
            self.platform.library_prefix(),
            plugin,
            self.platform.library_extension()
        )
    }
}
