//! Library lookup across prioritized search directories.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{DeployError, IoContext, Result};
use crate::plan::{LibrarySpec, SearchPath};
use crate::soname::{compare_versions, is_variant_of, soname_depth};

/// A library file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    pub path: PathBuf,
    pub is_symlink: bool,
}

impl ResolvedFile {
    pub fn from_path(path: &Path) -> Result<Self> {
        let meta = fs::symlink_metadata(path).at(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            is_symlink: meta.file_type().is_symlink(),
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Recomputed from the file name on every call.
    pub fn soname_depth(&self) -> usize {
        soname_depth(&self.file_name())
    }
}

/// Result of a lookup: the preferred file plus every variant next to it.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub primary: ResolvedFile,
    /// All variants in the winning directory, in ascending version order.
    /// Always contains `primary`.
    pub variants: Vec<ResolvedFile>,
}

/// Find the file(s) for `spec` named `prefix + name + extension`.
///
/// With an exact version only `<candidate>.<version>` is accepted. Without
/// one, the first directory holding any variant of the candidate wins and the
/// greatest regular-file variant is the primary. Missing directories are
/// skipped; later directories are never consulted once one matches.
///
/// # Errors
///
/// [`DeployError::LibraryNotFound`] if no directory yields a match.
pub fn locate(
    spec: &LibrarySpec,
    search_path: &SearchPath,
    prefix: &str,
    extension: &str,
) -> Result<Resolution> {
    let candidate = format!("{prefix}{}{extension}", spec.name);

    for dir in search_path.dirs() {
        if !dir.is_dir() {
            debug!("Skipping missing search directory {}", dir.display());
            continue;
        }

        match &spec.exact_version {
            Some(version) => {
                let path = dir.join(format!("{candidate}.{version}"));
                if path.is_file() {
                    let file = ResolvedFile::from_path(&path)?;
                    debug!("Resolved {} to {}", spec, path.display());
                    return Ok(Resolution {
                        primary: file.clone(),
                        variants: vec![file],
                    });
                }
            }
            None => {
                let variants = list_variants(dir, &candidate)?;
                if let Some(primary) = pick_primary(&variants) {
                    debug!(
                        "Resolved {} to {} ({} variants)",
                        spec,
                        primary.path.display(),
                        variants.len()
                    );
                    return Ok(Resolution {
                        primary: primary.clone(),
                        variants,
                    });
                }
            }
        }
    }

    let library = match &spec.exact_version {
        Some(version) => format!("{candidate}.{version}"),
        None => candidate,
    };
    Err(DeployError::LibraryNotFound {
        library,
        searched: search_path.dirs().to_vec(),
    })
}

fn list_variants(dir: &Path, candidate: &str) -> Result<Vec<ResolvedFile>> {
    let mut variants = Vec::new();
    for entry in fs::read_dir(dir).at(dir)? {
        let entry = entry.at(dir)?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if is_variant_of(&name, candidate) {
            variants.push(ResolvedFile::from_path(&entry.path())?);
        }
    }
    variants.sort_by(|a, b| compare_versions(&a.file_name(), &b.file_name()));
    Ok(variants)
}

/// Greatest regular file, or the greatest variant if all are symlinks.
fn pick_primary(variants: &[ResolvedFile]) -> Option<&ResolvedFile> {
    variants
        .iter()
        .rev()
        .find(|v| !v.is_symlink)
        .or_else(|| variants.last())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::write(path, b"ELF").unwrap();
    }

    #[test]
    fn test_exact_version_skips_directory_without_file() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        fs::create_dir_all(&a).unwrap();
        fs::create_dir_all(&b).unwrap();
        touch(&b.join("libbar.so.3"));

        let spec = LibrarySpec::exact("libbar", "3");
        let found = locate(&spec, &SearchPath::new([&a, &b]), "", ".so").unwrap();
        assert_eq!(found.primary.path, b.join("libbar.so.3"));
        assert_eq!(found.variants.len(), 1);
    }

    #[test]
    fn test_exact_version_not_found_names_library() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        fs::create_dir_all(&a).unwrap();
        fs::create_dir_all(&b).unwrap();
        touch(&b.join("libbar.so.4"));

        let spec = LibrarySpec::exact("libbar", "3");
        let err = locate(&spec, &SearchPath::new([&a, &b]), "", ".so").unwrap_err();
        match err {
            DeployError::LibraryNotFound { library, searched } => {
                assert_eq!(library, "libbar.so.3");
                assert_eq!(searched, vec![a, b]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_directory_is_skipped() {
        let temp = TempDir::new().unwrap();
        let present = temp.path().join("present");
        fs::create_dir_all(&present).unwrap();
        touch(&present.join("libQt5Core.so.5.15.2"));

        let search = SearchPath::new([temp.path().join("absent"), present.clone()]);
        let found = locate(&LibrarySpec::new("Qt5Core"), &search, "lib", ".so").unwrap();
        assert_eq!(found.primary.path, present.join("libQt5Core.so.5.15.2"));
    }

    #[test]
    fn test_unversioned_prefers_greatest_regular_file() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        touch(&dir.join("libfoo.so.1.9"));
        touch(&dir.join("libfoo.so.1.10"));
        symlink("libfoo.so.1.10", dir.join("libfoo.so.1")).unwrap();
        symlink("libfoo.so.1", dir.join("libfoo.so")).unwrap();

        let found = locate(&LibrarySpec::new("foo"), &SearchPath::new([dir]), "lib", ".so").unwrap();
        assert_eq!(found.primary.file_name(), "libfoo.so.1.10");
        assert!(!found.primary.is_symlink);
        let names: Vec<_> = found.variants.iter().map(ResolvedFile::file_name).collect();
        assert_eq!(
            names,
            vec!["libfoo.so", "libfoo.so.1", "libfoo.so.1.9", "libfoo.so.1.10"]
        );
    }

    #[test]
    fn test_unversioned_does_not_absorb_longer_names() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        touch(&dir.join("libfoobar.so.1"));

        let result = locate(&LibrarySpec::new("foo"), &SearchPath::new([dir]), "lib", ".so");
        assert!(matches!(result, Err(DeployError::LibraryNotFound { .. })));
    }

    #[test]
    fn test_first_matching_directory_wins() {
        let temp = TempDir::new().unwrap();
        let first = temp.path().join("first");
        let second = temp.path().join("second");
        fs::create_dir_all(&first).unwrap();
        fs::create_dir_all(&second).unwrap();
        touch(&first.join("libz.so.1.2"));
        touch(&second.join("libz.so.1.3"));

        let search = SearchPath::new([&first, &second]);
        let found = locate(&LibrarySpec::new("libz"), &search, "", ".so").unwrap();
        assert_eq!(found.primary.path, first.join("libz.so.1.2"));
    }

    #[test]
    fn test_soname_depth_is_derived_from_name() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("libfoo.so.1.2");
        touch(&path);
        let file = ResolvedFile::from_path(&path).unwrap();
        assert_eq!(file.soname_depth(), 2);
    }
}
