//! Path containment checks for server instance directories.
//!
//! Every file operation that maps a user-supplied path onto a server
//! directory goes through [`resolve_within`] or [`is_contained`]. Paths are
//! compared after lexical normalization only: symlinks are not resolved, so a
//! link inside a server directory that points elsewhere is not detected.

use crate::registry::RegistryError;
use std::path::{Component, Path, PathBuf};

/// Absolute, lexically normalized form of `path`.
///
/// Relative paths are anchored at the current working directory. `.` is
/// dropped and `..` pops the previous component (never above the root).
pub fn normalize(path: &Path) -> PathBuf {
    let anchored = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("/"))
            .join(path)
    };

    let mut out = PathBuf::new();
    for component in anchored.components() {
        match component {
            Component::Prefix(prefix) => {
                out = PathBuf::from(prefix.as_os_str());
            }
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                // `pop` refuses to remove the root, so `/..` stays `/`
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// True if `candidate` equals `root` or lies beneath it.
pub fn is_contained(candidate: impl AsRef<Path>, root: impl AsRef<Path>) -> bool {
    let candidate = normalize(candidate.as_ref());
    let root = normalize(root.as_ref());
    // component-wise, so `/srv/abc` does not contain `/srv/abcd`
    candidate.starts_with(&root)
}

/// Joins `relative` onto `root` and refuses the result if it escapes `root`.
///
/// An absolute `relative` replaces the root entirely and is refused unless it
/// happens to point inside it.
pub fn resolve_within(root: &Path, relative: &str) -> Result<PathBuf, RegistryError> {
    if relative.contains('\0') {
        return Err(RegistryError::AccessDenied(format!(
            "path contains null byte: {}",
            relative.replace('\0', "\\0")
        )));
    }

    let root = normalize(root);
    let resolved = normalize(&root.join(relative));

    if !resolved.starts_with(&root) {
        return Err(RegistryError::AccessDenied(format!(
            "{} is outside {}",
            relative,
            root.display()
        )));
    }

    Ok(resolved)
}
