//! Self-locating launcher script.
//!
//! The launcher sits at the bundle root under the application's name. It
//! finds its own directory (following symlinks to itself), points the
//! loader and Qt search paths into the bundle, and execs the real binary
//! through an explicit dynamic loader.

use std::fs;
use std::path::PathBuf;

use tracing::info;

use crate::bundle::Bundle;
use crate::copy::make_executable;
use crate::error::{IoContext, Result};

/// Environment variable, and the bundle-relative directory it points at.
const SEARCH_PATH_VARS: [(&str, Root); 5] = [
    ("LD_LIBRARY_PATH", Root::Lib),
    ("QML_IMPORT_PATH", Root::Qml),
    ("QML2_IMPORT_PATH", Root::Qml),
    ("QT_QPA_PLATFORM_PLUGIN_PATH", Root::Platforms),
    ("QT_PLUGIN_PATH", Root::Plugins),
];

#[derive(Clone, Copy)]
enum Root {
    Lib,
    Qml,
    Platforms,
    Plugins,
}

/// Inputs to [`render_launcher`]. Directories are relative to the bundle root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherTemplate {
    pub loader: String,
    pub binary: String,
    pub lib: String,
    pub qml: String,
    pub platforms: String,
    pub plugins: String,
}

impl LauncherTemplate {
    /// The standard layout: `bin/<target>`, `lib`, `qml`, `platforms`, `plugins`.
    pub fn standard(loader: impl Into<String>, target_name: &str) -> Self {
        Self {
            loader: loader.into(),
            binary: format!("bin/{target_name}"),
            lib: "lib".to_string(),
            qml: "qml".to_string(),
            platforms: "platforms".to_string(),
            plugins: "plugins".to_string(),
        }
    }

    fn root(&self, root: Root) -> &str {
        match root {
            Root::Lib => &self.lib,
            Root::Qml => &self.qml,
            Root::Platforms => &self.platforms,
            Root::Plugins => &self.plugins,
        }
    }
}

/// Render the launcher script text.
pub fn render_launcher(template: &LauncherTemplate) -> String {
    let mut script = String::new();
    script.push_str("#!/usr/bin/env bash\n");
    script.push_str("# Generated by qtbundle\n");
    // Scalar form only; array subscripts are a syntax error in dash.
    script.push_str("if [ -n \"${BASH_SOURCE:-}\" ]; then\n");
    script.push_str("    SELF=\"$BASH_SOURCE\"\n");
    script.push_str("else\n");
    script.push_str("    SELF=\"$0\"\n");
    script.push_str("fi\n");
    script.push_str("HERE=\"$(cd \"$(dirname \"$(readlink -f \"$SELF\")\")\" && pwd)\"\n\n");

    for (var, root) in SEARCH_PATH_VARS {
        script.push_str(&format!(
            "export {var}=\"$HERE\"/{}\n",
            shell_quote(template.root(root))
        ));
    }

    script.push_str(&format!(
        "\nexec {} \"$HERE\"/{} \"$@\"\n",
        shell_quote(&template.loader),
        shell_quote(&template.binary)
    ));
    script
}

/// Write the launcher for `bundle` and make it executable.
pub fn write_launcher(bundle: &Bundle, loader: &str) -> Result<PathBuf> {
    let path = bundle.launcher_path();
    let template = LauncherTemplate::standard(loader, bundle.target_name());
    fs::write(&path, render_launcher(&template)).at(&path)?;
    make_executable(&path)?;
    info!("Wrote launcher {}", path.display());
    Ok(path)
}

/// Quote `s` for a POSIX shell, leaving plain words untouched.
fn shell_quote(s: &str) -> String {
    let plain = !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+:@%,=".contains(c));
    if plain {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\\''"))
    }
}
