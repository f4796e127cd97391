//! Debug-symbol stripping through an external tool.

use std::path::Path;
use std::process::Command;

use tracing::{debug, error};
use walkdir::WalkDir;

use crate::bundle::Bundle;
use crate::error::{DeployError, Result};

/// Runs a strip program (usually `strip`) on bundled files, in place.
#[derive(Debug, Clone)]
pub struct Stripper {
    program: String,
}

impl Stripper {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Strip one file.
    ///
    /// # Errors
    ///
    /// [`DeployError::ToolUnavailable`] if the program cannot be spawned,
    /// [`DeployError::ExternalToolFailure`] on a non-zero exit.
    pub fn strip_file(&self, path: &Path) -> Result<()> {
        debug!("{} {}", self.program, path.display());
        let output = Command::new(&self.program)
            .arg(path)
            .output()
            .map_err(|source| DeployError::ToolUnavailable {
                tool: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("{} failed on {}: {}", self.program, path.display(), stderr.trim());
            return Err(DeployError::ExternalToolFailure {
                tool: self.program.clone(),
                path: path.to_path_buf(),
                status: output.status,
            });
        }
        Ok(())
    }

    /// Strip every file in `lib/` whose name contains `library_extension`,
    /// then the application binary. Returns the number of files stripped.
    pub fn strip_bundle(&self, bundle: &Bundle, library_extension: &str) -> Result<usize> {
        let lib_dir = bundle.lib_dir();
        let mut stripped = 0;

        for entry in WalkDir::new(&lib_dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(&lib_dir).to_path_buf();
                DeployError::fs(path, e.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.file_name().to_string_lossy().contains(library_extension) {
                self.strip_file(entry.path())?;
                stripped += 1;
            }
        }

        self.strip_file(&bundle.binary_path())?;
        Ok(stripped + 1)
    }
}
