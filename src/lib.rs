//! Relocatable Qt application bundles for Linux.
//!
//! Copies an application binary, its shared libraries, platform plugins,
//! toolkit plugins, and QML modules into a self-contained directory,
//! collapses each library's symlink chain to a single file, strips
//! debug symbols, writes a self-locating launcher, and archives the result.
//!
//! ```no_run
//! use std::path::Path;
//! use qtbundle::{deploy, ConfigFile};
//!
//! let plan = ConfigFile::load(Path::new("deploy.toml"))?
//!     .into_plan(None, &std::env::current_dir().unwrap())?;
//! let deployment = deploy(&plan)?;
//! println!("{}", deployment.archive.display());
//! # Ok::<(), qtbundle::DeployError>(())
//! ```

mod analyze;
mod archive;
mod bundle;
mod collapse;
mod config;
mod copy;
mod deploy;
mod error;
mod launcher;
mod paths;
mod plan;
mod soname;
mod strip;

pub use analyze::{audit_bundle, get_library_dependencies, parse_readelf_output, AuditOutcome, AuditReport};
pub use archive::{create_archive, list_archive};
pub use bundle::{build, BuildReport, Bundle, QMLTYPES_FILE};
pub use collapse::{clear_executable_bits, collapse_library_dir, CollapseReport, FamilyOutcome, CANONICAL_DEPTH};
pub use config::{ConfigFile, DeploymentSection};
pub use copy::{copy_dir_recursive, make_executable, remove_files_named, replace_dir_tree};
pub use deploy::{cleanup, deploy, Deployment};
pub use error::{DeployError, Result};
pub use launcher::{render_launcher, write_launcher, LauncherTemplate};
pub use paths::{locate, Resolution, ResolvedFile};
pub use plan::{ArchiveFormat, Dependency, LibrarySpec, Plan, Platform, SearchPath};
pub use soname::{compare_versions, family_key, soname_depth};
pub use strip::Stripper;
