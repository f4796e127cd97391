//! Shared-library file name conventions.
//!
//! A versioned library name looks like `libfoo.so.1.2`: a stem ending in the
//! `.so` marker, followed by zero or more dot-separated version components.

use std::cmp::Ordering;

const SO_MARKER: &str = ".so";

/// Byte offset just past the first `.so` that ends the name or is followed by `.`.
///
/// The `.so` in `libfoo.socket.so.1` that starts `.socket` does not count.
fn marker_end(name: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(pos) = name[from..].find(SO_MARKER) {
        let end = from + pos + SO_MARKER.len();
        match name.as_bytes().get(end) {
            None | Some(b'.') => return Some(end),
            _ => from = from + pos + 1,
        }
    }
    None
}

/// The name all variants of one library share, e.g. `libfoo.so` for `libfoo.so.1.2`.
///
/// Returns `None` for names with no `.so` marker; such files belong to no family.
#[must_use]
pub fn family_key(name: &str) -> Option<&str> {
    marker_end(name).map(|end| &name[..end])
}

/// Number of version components after the `.so` marker.
///
/// `libfoo.so` is 0, `libfoo.so.1` is 1, `libfoo.so.1.2` is 2.
#[must_use]
pub fn soname_depth(name: &str) -> usize {
    match marker_end(name) {
        Some(end) => name[end..].split('.').filter(|c| !c.is_empty()).count(),
        None => 0,
    }
}

/// Whether `name` is `candidate` itself or a versioned variant of it.
#[must_use]
pub fn is_variant_of(name: &str, candidate: &str) -> bool {
    match name.strip_prefix(candidate) {
        Some(rest) => rest.is_empty() || rest.starts_with('.'),
        None => false,
    }
}

/// Version-aware ordering of library file names.
///
/// Names are split on `.`; components are compared numerically when both
/// are integers and lexicographically otherwise. A name that is a prefix of
/// another sorts first, so `libfoo.so` < `libfoo.so.1` < `libfoo.so.1.10`.
#[must_use]
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => {
                let ord = match (l.parse::<u64>(), r.parse::<u64>()) {
                    (Ok(ln), Ok(rn)) => ln.cmp(&rn).then_with(|| l.cmp(r)),
                    _ => l.cmp(r),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}
