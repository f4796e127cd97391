//! Bundle audit using readelf.
//!
//! Uses `readelf -d` instead of `ldd` to read NEEDED entries. readelf reads
//! the ELF headers directly, so it works for bundles built for another
//! architecture, while ldd would run the host dynamic linker.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, warn};

use crate::bundle::Bundle;
use crate::error::{DeployError, IoContext, Result};
use crate::soname::is_variant_of;

/// Extract NEEDED library names from an ELF file using readelf.
///
/// # Errors
///
/// Returns an error if:
/// - The file does not exist
/// - `readelf` is not installed (install binutils)
/// - `readelf` fails for reasons other than "not an ELF file"
///
/// Returns `Ok(Vec::new())` if the file is not an ELF binary (e.g. a script).
#[must_use = "library dependencies should be processed"]
pub fn get_library_dependencies(binary_path: &Path) -> Result<Vec<String>> {
    // Missing input is a filesystem error, not a readelf failure
    if !binary_path.exists() {
        return Err(DeployError::fs(
            binary_path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
        ));
    }

    let output = Command::new("readelf")
        .args(["-d"])
        .arg(binary_path)
        .output()
        .map_err(|source| DeployError::ToolUnavailable {
            tool: "readelf".to_string(),
            source,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        // Scripts and data files in a bundle are legitimately not ELF
        if stderr.contains("Not an ELF file")
            || stderr.contains("not a dynamic executable")
            || stderr.contains("File format not recognized")
        {
            return Ok(Vec::new());
        }
        return Err(DeployError::ExternalToolFailure {
            tool: "readelf".to_string(),
            path: binary_path.to_path_buf(),
            status: output.status,
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(parse_readelf_output(&stdout))
}

/// Parse `readelf -d` output into NEEDED library names.
///
/// ```text
///  0x0000000000000001 (NEEDED)             Shared library: [libQt5Core.so.5]
///  0x0000000000000001 (NEEDED)             Shared library: [libc.so.6]
/// ```
pub fn parse_readelf_output(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.contains("(NEEDED)") && line.contains("Shared library:"))
        .filter_map(|line| {
            let start = line.find('[')?;
            let end = line[start..].find(']')? + start;
            Some(line[start + 1..end].to_string())
        })
        .collect()
}

/// NEEDED names across the bundle, sorted by where they will come from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    pub inspected: usize,
    /// Present in `lib/` under exactly the NEEDED name.
    pub bundled: BTreeSet<String>,
    /// Only a more specific variant is in `lib/`, e.g. `libfoo.so.1.2` for
    /// NEEDED `libfoo.so.1`. The loader looks up the NEEDED name verbatim.
    pub name_mismatch: BTreeSet<String>,
    /// Not shipped; resolved from the host at run time.
    pub host: BTreeSet<String>,
}

impl AuditReport {
    /// Sort `needed` names against the file names shipped in `lib/`.
    pub fn classify<'a>(
        needed: impl IntoIterator<Item = &'a str>,
        shipped: &BTreeSet<String>,
    ) -> Self {
        let mut report = Self::default();
        for name in needed {
            if shipped.contains(name) {
                report.bundled.insert(name.to_string());
            } else if shipped.iter().any(|s| is_variant_of(s, name)) {
                report.name_mismatch.insert(name.to_string());
            } else {
                report.host.insert(name.to_string());
            }
        }
        report
    }
}

/// Result of an optional best-effort step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditOutcome {
    NotAttempted,
    Failed(String),
    Completed(AuditReport),
}

/// Read NEEDED entries of the binary, libraries, and platform plugins.
///
/// Never fails the run: errors are returned as [`AuditOutcome::Failed`].
pub fn audit_bundle(bundle: &Bundle) -> AuditOutcome {
    match try_audit(bundle) {
        Ok(report) => {
            info!(
                "Audit: {} files, {} bundled, {} from host",
                report.inspected,
                report.bundled.len(),
                report.host.len()
            );
            for name in &report.name_mismatch {
                warn!("{name} is needed but only a differently versioned file is bundled");
            }
            debug!("Host libraries: {:?}", report.host);
            AuditOutcome::Completed(report)
        }
        Err(e) => {
            warn!("Bundle audit failed: {e}");
            AuditOutcome::Failed(e.to_string())
        }
    }
}

fn try_audit(bundle: &Bundle) -> Result<AuditReport> {
    let lib_dir = bundle.lib_dir();
    let shipped = regular_files(&lib_dir)?
        .iter()
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect::<BTreeSet<_>>();

    // plugins/ and qml/ are not inspected
    let mut files = vec![bundle.binary_path()];
    files.extend(regular_files(&lib_dir)?);
    files.extend(regular_files(&bundle.platforms_dir())?);

    let mut needed = BTreeSet::new();
    for file in &files {
        needed.extend(get_library_dependencies(file)?);
    }

    let mut report = AuditReport::classify(needed.iter().map(String::as_str), &shipped);
    report.inspected = files.len();
    Ok(report)
}

fn regular_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !dir.is_dir() {
        return Ok(files);
    }
    for entry in fs::read_dir(dir).at(dir)? {
        let entry = entry.at(dir)?;
        if entry.file_type().at(entry.path())?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
