//! Path utility functions for normalization and library-relative formatting.

use std::path::{Component, Path, PathBuf};

/// Placeholder stored in the registry in place of the library root.
pub const LIBS_DIR_PLACEHOLDER: &str = "%libsDir%";

/// Normalize a path by processing `.` and `..` components lexically.
/// This does not access the filesystem and does not follow symlinks.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Keep the `..` when there is nothing left to pop
                if !result.pop() {
                    result.push(component);
                }
            }
            _ => {
                result.push(component);
            }
        }
    }
    result
}

/// Calculate the relative path from a symlink location to a target.
///
/// For example, a link at `/app/www/resources/acme/blog` pointing to
/// `/app/vendor/acme/blog/Resources/public` becomes
/// `../../../vendor/acme/blog/Resources/public`.
///
/// Returns `None` if a relative path cannot be computed (e.g., different drive letters on Windows).
pub fn relative_symlink_path(from_link: &Path, to_target: &Path) -> Option<PathBuf> {
    let from_dir = from_link.parent()?;
    let result = pathdiff::diff_paths(to_target, from_dir)?;

    if result.is_absolute() {
        return None;
    }

    Some(result)
}

/// Format a package path for storage in the registry.
///
/// Separators are normalized to `/` and the library root is replaced by
/// [`LIBS_DIR_PLACEHOLDER`], so the registry survives moving the project.
pub fn format_library_path(path: &Path, libs_dir: &Path) -> String {
    let path = path.to_string_lossy().replace('\\', "/");
    let libs_dir = libs_dir.to_string_lossy().replace('\\', "/");
    let libs_dir = libs_dir.trim_end_matches('/');

    if libs_dir.is_empty() {
        return path;
    }
    path.replace(libs_dir, LIBS_DIR_PLACEHOLDER)
}

/// Inverse of [`format_library_path`].
pub fn expand_library_path(formatted: &str, libs_dir: &Path) -> PathBuf {
    match formatted.strip_prefix(LIBS_DIR_PLACEHOLDER) {
        Some(rest) => libs_dir.join(rest.trim_start_matches('/')),
        None => PathBuf::from(formatted),
    }
}
