//! Collapsing shared-library symlink chains.
//!
//! Copying a toolkit's `lib/` leaves several names per library in the bundle:
//!
//! ```text
//! libQt5Core.so        -> libQt5Core.so.5
//! libQt5Core.so.5      -> libQt5Core.so.5.15
//! libQt5Core.so.5.15   -> libQt5Core.so.5.15.2
//! libQt5Core.so.5.15.2    (real bytes)
//! ```
//!
//! Each family is reduced to a single regular file named at soname depth 2
//! (`libQt5Core.so.5.15` above) holding the real payload. Families with no
//! depth-2 name are left alone.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::copy::{clear_executable, remove_if_present};
use crate::error::{DeployError, IoContext, Result};
use crate::soname::{compare_versions, family_key, soname_depth};

/// Depth of the canonical `<major>.<minor>` name a family collapses onto.
pub const CANONICAL_DEPTH: usize = 2;

/// What happened to one library family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FamilyOutcome {
    /// The bytes of `source` now live at `kept`; every other member is gone.
    Collapsed {
        kept: String,
        source: String,
        removed: Vec<String>,
    },
    /// The depth-2 member already held the bytes; its aliases were removed.
    AlreadyCanonical { kept: String, removed: Vec<String> },
    /// No depth-2 name or no regular file in the family.
    Untouched { family: String },
}

#[derive(Debug, Clone, Default)]
pub struct CollapseReport {
    pub families: Vec<FamilyOutcome>,
}

impl CollapseReport {
    /// Number of files deleted across all families.
    pub fn removed_count(&self) -> usize {
        self.families
            .iter()
            .map(|f| match f {
                FamilyOutcome::Collapsed { removed, .. }
                | FamilyOutcome::AlreadyCanonical { removed, .. } => removed.len(),
                FamilyOutcome::Untouched { .. } => 0,
            })
            .sum()
    }
}

#[derive(Debug)]
struct Member {
    name: String,
    is_symlink: bool,
}

/// Collapse every library family in `lib_dir` to one physical file.
///
/// Families are grouped by [`family_key`], so `libfoo` never absorbs
/// `libfoobar`. Members are ordered with [`compare_versions`]; the greatest
/// depth-2 name is the match and the greatest regular file is the source of
/// the bytes.
pub fn collapse_library_dir(lib_dir: &Path) -> Result<CollapseReport> {
    let mut families: BTreeMap<String, Vec<Member>> = BTreeMap::new();

    for entry in fs::read_dir(lib_dir).at(lib_dir)? {
        let entry = entry.at(lib_dir)?;
        let file_type = entry.file_type().at(entry.path())?;
        if file_type.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        // qt.conf and friends have no .so marker
        let Some(key) = family_key(&name) else {
            continue;
        };
        families.entry(key.to_string()).or_default().push(Member {
            is_symlink: file_type.is_symlink(),
            name,
        });
    }

    let mut report = CollapseReport::default();
    for (key, mut members) in families {
        members.sort_by(|a, b| compare_versions(&a.name, &b.name));
        let outcome = collapse_family(lib_dir, &key, &members)?;
        debug!("{key}: {outcome:?}");
        report.families.push(outcome);
    }
    Ok(report)
}

fn collapse_family(lib_dir: &Path, key: &str, members: &[Member]) -> Result<FamilyOutcome> {
    let matched = members
        .iter()
        .rev()
        .find(|m| soname_depth(&m.name) == CANONICAL_DEPTH);
    let target = members.iter().rev().find(|m| !m.is_symlink);

    let (matched, target) = match (matched, target) {
        (Some(matched), Some(target)) => (matched, target),
        _ => {
            return Ok(FamilyOutcome::Untouched {
                family: key.to_string(),
            })
        }
    };

    let others: Vec<String> = members
        .iter()
        .filter(|m| m.name != matched.name)
        .map(|m| m.name.clone())
        .collect();

    if matched.name == target.name {
        // Bytes are already under the canonical name; only aliases go
        for name in &others {
            remove_if_present(&lib_dir.join(name))?;
        }
        return Ok(FamilyOutcome::AlreadyCanonical {
            kept: matched.name.clone(),
            removed: others,
        });
    }

    let match_path = lib_dir.join(&matched.name);
    let target_path = lib_dir.join(&target.name);

    // Payload is staged before any member is removed.
    let mut staged = NamedTempFile::new_in(lib_dir).at(lib_dir)?;
    let mut source = File::open(&target_path).at(&target_path)?;
    io::copy(&mut source, staged.as_file_mut()).at(staged.path())?;
    let perms = fs::metadata(&target_path).at(&target_path)?.permissions();
    fs::set_permissions(staged.path(), perms).at(staged.path())?;

    for member in members {
        remove_if_present(&lib_dir.join(&member.name))?;
    }
    // Same directory, so this is a rename
    staged
        .persist(&match_path)
        .map_err(|e| DeployError::fs(&match_path, e.error))?;

    Ok(FamilyOutcome::Collapsed {
        kept: matched.name.clone(),
        source: target.name.clone(),
        removed: others,
    })
}

/// Clear the executable bits on every regular file in `lib_dir`.
///
/// Returns the number of files visited.
pub fn clear_executable_bits(lib_dir: &Path) -> Result<usize> {
    let mut count = 0;
    for entry in fs::read_dir(lib_dir).at(lib_dir)? {
        let entry = entry.at(lib_dir)?;
        if entry.file_type().at(entry.path())?.is_file() {
            clear_executable(&entry.path())?;
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::{symlink, PermissionsExt};
    use tempfile::TempDir;

    fn listing(dir: &Path) -> Vec<(String, bool)> {
        let mut out: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                let is_link = e.file_type().unwrap().is_symlink();
                (e.file_name().to_string_lossy().into_owned(), is_link)
            })
            .collect();
        out.sort();
        out
    }

    #[test]
    fn test_symlinked_family_collapses_to_depth_two() {
        let temp = TempDir::new().unwrap();
        let lib = temp.path();
        fs::write(lib.join("libfoo.so.1.2"), [7u8; 40]).unwrap();
        symlink("libfoo.so.1.2", lib.join("libfoo.so.1")).unwrap();
        symlink("libfoo.so.1", lib.join("libfoo.so")).unwrap();

        let report = collapse_library_dir(lib).unwrap();

        assert_eq!(listing(lib), vec![("libfoo.so.1.2".to_string(), false)]);
        assert_eq!(fs::read(lib.join("libfoo.so.1.2")).unwrap().len(), 40);
        assert_eq!(report.removed_count(), 2);
    }

    #[test]
    fn test_payload_moves_onto_depth_two_name() {
        let temp = TempDir::new().unwrap();
        let lib = temp.path();
        fs::write(lib.join("libQt5Core.so.5.15.2"), "real bytes").unwrap();
        symlink("libQt5Core.so.5.15.2", lib.join("libQt5Core.so.5.15")).unwrap();
        symlink("libQt5Core.so.5.15", lib.join("libQt5Core.so.5")).unwrap();
        symlink("libQt5Core.so.5", lib.join("libQt5Core.so")).unwrap();

        let report = collapse_library_dir(lib).unwrap();

        assert_eq!(listing(lib), vec![("libQt5Core.so.5.15".to_string(), false)]);
        assert_eq!(
            fs::read_to_string(lib.join("libQt5Core.so.5.15")).unwrap(),
            "real bytes"
        );
        assert_eq!(
            report.families,
            vec![FamilyOutcome::Collapsed {
                kept: "libQt5Core.so.5.15".to_string(),
                source: "libQt5Core.so.5.15.2".to_string(),
                removed: vec![
                    "libQt5Core.so".to_string(),
                    "libQt5Core.so.5".to_string(),
                    "libQt5Core.so.5.15.2".to_string(),
                ],
            }]
        );
    }

    #[test]
    fn test_family_without_depth_two_is_untouched() {
        let temp = TempDir::new().unwrap();
        let lib = temp.path();
        fs::write(lib.join("libbar.so.3"), "bar").unwrap();
        symlink("libbar.so.3", lib.join("libbar.so")).unwrap();
        let before = listing(lib);

        let report = collapse_library_dir(lib).unwrap();

        assert_eq!(listing(lib), before);
        assert_eq!(
            report.families,
            vec![FamilyOutcome::Untouched {
                family: "libbar.so".to_string()
            }]
        );
    }

    #[test]
    fn test_similar_names_are_separate_families() {
        let temp = TempDir::new().unwrap();
        let lib = temp.path();
        fs::write(lib.join("libfoo.so.1.2"), "foo").unwrap();
        symlink("libfoo.so.1.2", lib.join("libfoo.so")).unwrap();
        fs::write(lib.join("libfoobar.so.4"), "foobar").unwrap();

        collapse_library_dir(lib).unwrap();

        assert_eq!(
            listing(lib),
            vec![
                ("libfoo.so.1.2".to_string(), false),
                ("libfoobar.so.4".to_string(), false),
            ]
        );
    }

    #[test]
    fn test_dereferenced_copies_keep_depth_two() {
        let temp = TempDir::new().unwrap();
        let lib = temp.path();
        for name in ["libfoo.so", "libfoo.so.1", "libfoo.so.1.2"] {
            fs::write(lib.join(name), "same").unwrap();
        }

        collapse_library_dir(lib).unwrap();

        assert_eq!(listing(lib), vec![("libfoo.so.1.2".to_string(), false)]);
    }

    #[test]
    fn test_collapse_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let lib = temp.path();
        fs::write(lib.join("libz.so.1.3.1"), "zlib").unwrap();
        symlink("libz.so.1.3.1", lib.join("libz.so.1.3")).unwrap();
        symlink("libz.so.1.3", lib.join("libz.so.1")).unwrap();

        collapse_library_dir(lib).unwrap();
        let first = listing(lib);
        let report = collapse_library_dir(lib).unwrap();

        assert_eq!(listing(lib), first);
        assert_eq!(report.removed_count(), 0);
    }

    #[test]
    fn test_clear_executable_bits() {
        let temp = TempDir::new().unwrap();
        let lib = temp.path();
        let file = lib.join("libfoo.so.1.2");
        fs::write(&file, "x").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o755)).unwrap();
        symlink("libfoo.so.1.2", lib.join("libfoo.so")).unwrap();

        let visited = clear_executable_bits(lib).unwrap();

        assert_eq!(visited, 1);
        let mode = fs::metadata(&file).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0);
    }

    #[test]
    fn test_collapsed_file_keeps_source_permissions() {
        let temp = TempDir::new().unwrap();
        let lib = temp.path();
        let source = lib.join("libfoo.so.1.2.0");
        fs::write(&source, "x").unwrap();
        fs::set_permissions(&source, fs::Permissions::from_mode(0o644)).unwrap();
        symlink("libfoo.so.1.2.0", lib.join("libfoo.so.1.2")).unwrap();

        collapse_library_dir(lib).unwrap();

        let mode = fs::metadata(lib.join("libfoo.so.1.2")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }
}
