//! Packaging a finished bundle into a single archive.
//!
//! Entries are stored relative to the bundle root, in sorted order.
//! Symlinks are stored as symlinks.

use std::fs::{self, File};
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::info;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::copy::remove_if_present;
use crate::error::{DeployError, IoContext, Result};
use crate::plan::ArchiveFormat;

/// Write every entry under `source_dir` into `archive_path`, replacing any
/// existing file there. Returns the number of files and symlinks written.
pub fn create_archive(source_dir: &Path, archive_path: &Path, format: ArchiveFormat) -> Result<usize> {
    remove_if_present(archive_path)?;
    if let Some(parent) = archive_path.parent() {
        fs::create_dir_all(parent).at(parent)?;
    }

    let count = match format {
        ArchiveFormat::TarGz => write_tar_gz(source_dir, archive_path),
        ArchiveFormat::Zip => write_zip(source_dir, archive_path),
    }
    .map_err(|source| DeployError::Archive {
        path: archive_path.to_path_buf(),
        source,
    })?;

    info!("Wrote {} entries to {}", count, archive_path.display());
    Ok(count)
}

/// Relative paths of all files and symlinks in an archive, sorted.
pub fn list_archive(archive_path: &Path, format: ArchiveFormat) -> Result<Vec<String>> {
    let names = match format {
        ArchiveFormat::TarGz => list_tar_gz(archive_path),
        ArchiveFormat::Zip => list_zip(archive_path),
    }
    .map_err(|source| DeployError::Archive {
        path: archive_path.to_path_buf(),
        source,
    })?;
    Ok(names)
}

fn write_tar_gz(source_dir: &Path, archive_path: &Path) -> io::Result<usize> {
    let file = File::create(archive_path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    let mut count = 0;
    for entry in WalkDir::new(source_dir).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let rel = relative_name(source_dir, entry.path())?;
        builder.append_path_with_name(entry.path(), &rel)?;
        if !entry.file_type().is_dir() {
            count += 1;
        }
    }

    builder.into_inner()?.finish()?;
    Ok(count)
}

fn write_zip(source_dir: &Path, archive_path: &Path) -> io::Result<usize> {
    let file = File::create(archive_path)?;
    let mut zip = ZipWriter::new(file);
    let base = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut count = 0;
    for entry in WalkDir::new(source_dir).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let rel = relative_name(source_dir, entry.path())?;
        let meta = fs::symlink_metadata(entry.path())?;
        let options = base.unix_permissions(meta.permissions().mode());

        if meta.file_type().is_symlink() {
            let target = fs::read_link(entry.path())?;
            zip.add_symlink(rel, target.to_string_lossy().into_owned(), options)
                .map_err(io::Error::other)?;
            count += 1;
        } else if meta.is_dir() {
            zip.add_directory(rel, options).map_err(io::Error::other)?;
        } else {
            zip.start_file(rel, options).map_err(io::Error::other)?;
            let mut f = File::open(entry.path())?;
            io::copy(&mut f, &mut zip)?;
            count += 1;
        }
    }

    zip.finish().map_err(io::Error::other)?.flush()?;
    Ok(count)
}

fn list_tar_gz(archive_path: &Path) -> io::Result<Vec<String>> {
    let file = File::open(archive_path)?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    let mut names = Vec::new();
    for entry in archive.entries()? {
        let entry = entry?;
        if entry.header().entry_type().is_dir() {
            continue;
        }
        names.push(entry.path()?.to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

fn list_zip(archive_path: &Path) -> io::Result<Vec<String>> {
    let file = File::open(archive_path)?;
    let archive = ZipArchive::new(file).map_err(io::Error::other)?;
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| !n.ends_with('/'))
        .map(str::to_string)
        .collect();
    names.sort();
    Ok(names)
}

/// Archive entry name for `path`, `/`-separated and relative to `base`.
fn relative_name(base: &Path, path: &Path) -> io::Result<String> {
    let rel = path
        .strip_prefix(base)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    Ok(rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn mock_bundle(root: &Path) {
        fs::create_dir_all(root.join("lib")).unwrap();
        fs::create_dir_all(root.join("bin")).unwrap();
        fs::create_dir_all(root.join("qml/QtQuick.2")).unwrap();
        fs::write(root.join("lib/libfoo.so.1.2"), "foo").unwrap();
        symlink("libfoo.so.1.2", root.join("lib/libfoo.so")).unwrap();
        fs::write(root.join("bin/app"), "app").unwrap();
        fs::write(root.join("qml/QtQuick.2/qmldir"), "module").unwrap();
        fs::write(root.join("app"), "#!/bin/sh\n").unwrap();
    }

    fn expected() -> Vec<String> {
        [
            "app",
            "bin/app",
            "lib/libfoo.so",
            "lib/libfoo.so.1.2",
            "qml/QtQuick.2/qmldir",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }

    #[test]
    fn test_tar_gz_preserves_relative_paths() {
        let temp = TempDir::new().unwrap();
        let bundle = temp.path().join("bundle");
        mock_bundle(&bundle);
        let archive = temp.path().join("out/app.tar.gz");

        let count = create_archive(&bundle, &archive, ArchiveFormat::TarGz).unwrap();

        assert_eq!(count, 5);
        assert_eq!(list_archive(&archive, ArchiveFormat::TarGz).unwrap(), expected());
    }

    #[test]
    fn test_zip_preserves_relative_paths() {
        let temp = TempDir::new().unwrap();
        let bundle = temp.path().join("bundle");
        mock_bundle(&bundle);
        let archive = temp.path().join("app.zip");

        create_archive(&bundle, &archive, ArchiveFormat::Zip).unwrap();

        assert_eq!(list_archive(&archive, ArchiveFormat::Zip).unwrap(), expected());
    }

    #[test]
    fn test_existing_archive_is_replaced() {
        let temp = TempDir::new().unwrap();
        let bundle = temp.path().join("bundle");
        mock_bundle(&bundle);
        let archive = temp.path().join("app.tar.gz");
        fs::write(&archive, "half-written garbage").unwrap();

        create_archive(&bundle, &archive, ArchiveFormat::TarGz).unwrap();

        assert_eq!(list_archive(&archive, ArchiveFormat::TarGz).unwrap(), expected());
    }
}
