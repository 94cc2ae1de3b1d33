// File manager commands for browsing, editing, and managing server files
//
// Every path is relative to the server's own directory and is resolved with
// the path guard first; anything that escapes is refused with AccessDenied.

use crate::commands::server::RegistryState;
use crate::path_guard::{normalize, resolve_within};
use crate::registry::RegistryError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const MAX_EDITABLE_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    /// Relative to the server directory, `/`-separated.
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<u64>, // Unix timestamp
    pub extension: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryContents {
    pub path: String,
    pub parent: Option<String>,
    pub entries: Vec<FileEntry>,
}

/// One decoded archive entry; names ending in `/` are directories.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub name: String,
    pub data: Vec<u8>,
}

struct Guarded {
    root: PathBuf,
    target: PathBuf,
}

impl Guarded {
    fn is_root(&self) -> bool {
        self.target == self.root
    }

    fn relative(&self, path: &Path) -> String {
        relative_to(&self.root, path)
    }
}

async fn guard(state: &RegistryState, server_id: &str, path: &str) -> Result<Guarded, RegistryError> {
    let root = normalize(&state.server_path(server_id).await?);
    let target = resolve_within(&root, path)?;
    Ok(Guarded { root, target })
}

fn relative_to(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .map(|p| {
            p.components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default()
}

fn file_entry(root: &Path, path: &Path, metadata: &fs::Metadata) -> FileEntry {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let modified = metadata.modified().ok().and_then(|t| {
        t.duration_since(std::time::UNIX_EPOCH).ok().map(|d| d.as_secs())
    });

    let extension = if metadata.is_file() {
        path.extension().map(|e| e.to_string_lossy().to_string())
    } else {
        None
    };

    FileEntry {
        name,
        path: relative_to(root, path),
        is_dir: metadata.is_dir(),
        size: metadata.len(),
        modified,
        extension,
    }
}

fn not_found(path: &str) -> RegistryError {
    RegistryError::NotFound(format!("path does not exist: {}", path))
}

/// List contents of a directory
pub async fn list_directory(
    state: &RegistryState,
    server_id: &str,
    path: &str,
) -> Result<DirectoryContents, RegistryError> {
    let guarded = guard(state, server_id, path).await?;
    let dir_path = &guarded.target;

    if !dir_path.exists() {
        return Err(not_found(path));
    }

    if !dir_path.is_dir() {
        return Err(RegistryError::Validation(format!("Path is not a directory: {}", path)));
    }

    let mut entries = Vec::new();

    for entry in fs::read_dir(dir_path)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        let file_name = entry.file_name().to_string_lossy().to_string();

        // Skip hidden files (starting with .)
        if file_name.starts_with('.') {
            continue;
        }

        entries.push(file_entry(&guarded.root, &entry.path(), &metadata));
    }

    // Sort: directories first, then by name
    entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
        (true, false) => std::cmp::Ordering::Less,
        (false, true) => std::cmp::Ordering::Greater,
        _ => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
    });

    let parent = if guarded.is_root() {
        None
    } else {
        dir_path.parent().map(|p| guarded.relative(p))
    };

    Ok(DirectoryContents {
        path: guarded.relative(dir_path),
        parent,
        entries,
    })
}

/// Read file contents as text
pub async fn read_file_text(
    state: &RegistryState,
    server_id: &str,
    path: &str,
) -> Result<String, RegistryError> {
    let file_path = guard(state, server_id, path).await?.target;

    if !file_path.exists() {
        return Err(not_found(path));
    }

    if !file_path.is_file() {
        return Err(RegistryError::Validation(format!("Path is not a file: {}", path)));
    }

    let metadata = fs::metadata(&file_path)?;
    if metadata.len() > MAX_EDITABLE_BYTES {
        return Err(RegistryError::Validation(
            "File is too large to edit (max 5MB)".to_string(),
        ));
    }

    Ok(fs::read_to_string(&file_path)?)
}

/// Write text content to a file
pub async fn write_file_text(
    state: &RegistryState,
    server_id: &str,
    path: &str,
    content: &str,
) -> Result<(), RegistryError> {
    let guarded = guard(state, server_id, path).await?;
    if guarded.is_root() {
        return Err(RegistryError::AccessDenied("cannot overwrite the server directory".into()));
    }

    if let Some(parent) = guarded.target.parent() {
        fs::create_dir_all(parent)?;
    }

    Ok(fs::write(&guarded.target, content)?)
}

/// Create a new file
pub async fn create_file(
    state: &RegistryState,
    server_id: &str,
    path: &str,
    content: Option<String>,
) -> Result<(), RegistryError> {
    let file_path = guard(state, server_id, path).await?.target;

    if file_path.exists() {
        return Err(RegistryError::Validation(format!("File already exists: {}", path)));
    }

    if let Some(parent) = file_path.parent() {
        fs::create_dir_all(parent)?;
    }

    Ok(fs::write(&file_path, content.unwrap_or_default())?)
}

/// Create a new directory
pub async fn create_directory(
    state: &RegistryState,
    server_id: &str,
    path: &str,
) -> Result<(), RegistryError> {
    let dir_path = guard(state, server_id, path).await?.target;

    if dir_path.exists() {
        return Err(RegistryError::Validation(format!("Directory already exists: {}", path)));
    }

    Ok(fs::create_dir_all(&dir_path)?)
}

/// Delete a file or directory
pub async fn delete_path(state: &RegistryState, server_id: &str, path: &str) -> Result<(), RegistryError> {
    let guarded = guard(state, server_id, path).await?;
    if guarded.is_root() {
        return Err(RegistryError::AccessDenied("cannot delete the server directory".into()));
    }

    let target_path = &guarded.target;
    if !target_path.exists() {
        return Err(not_found(path));
    }

    if target_path.is_dir() {
        fs::remove_dir_all(target_path)?;
    } else {
        fs::remove_file(target_path)?;
    }
    Ok(())
}

/// Rename a file or directory; returns the new relative path
pub async fn rename_path(
    state: &RegistryState,
    server_id: &str,
    old_path: &str,
    new_name: &str,
) -> Result<String, RegistryError> {
    let guarded = guard(state, server_id, old_path).await?;
    if guarded.is_root() {
        return Err(RegistryError::AccessDenied("cannot rename the server directory".into()));
    }

    let old = &guarded.target;
    if !old.exists() {
        return Err(not_found(old_path));
    }

    // Validate new name (no path separators allowed)
    if new_name.is_empty()
        || new_name == "."
        || new_name == ".."
        || new_name.contains('/')
        || new_name.contains('\\')
    {
        return Err(RegistryError::Validation(
            "Invalid name: cannot contain path separators".to_string(),
        ));
    }

    let new = old
        .parent()
        .ok_or_else(|| RegistryError::AccessDenied("Cannot rename root".to_string()))?
        .join(new_name);

    if new.exists() {
        return Err(RegistryError::Validation(format!(
            "A file or folder with that name already exists: {}",
            new_name
        )));
    }

    fs::rename(old, &new)?;

    Ok(guarded.relative(&new))
}

/// Move a file or directory into another directory of the same server
pub async fn move_path(
    state: &RegistryState,
    server_id: &str,
    source: &str,
    destination_dir: &str,
) -> Result<String, RegistryError> {
    let (src, dest, root) = transfer_paths(state, server_id, source, destination_dir).await?;
    fs::rename(&src, &dest)?;
    Ok(relative_to(&root, &dest))
}

/// Copy a file or directory into another directory of the same server
pub async fn copy_path(
    state: &RegistryState,
    server_id: &str,
    source: &str,
    destination_dir: &str,
) -> Result<String, RegistryError> {
    let (src, dest, root) = transfer_paths(state, server_id, source, destination_dir).await?;

    if src.is_dir() {
        copy_dir_recursive(&src, &dest)?;
    } else {
        fs::copy(&src, &dest)?;
    }

    Ok(relative_to(&root, &dest))
}

async fn transfer_paths(
    state: &RegistryState,
    server_id: &str,
    source: &str,
    destination_dir: &str,
) -> Result<(PathBuf, PathBuf, PathBuf), RegistryError> {
    let src = guard(state, server_id, source).await?;
    let dest_dir = guard(state, server_id, destination_dir).await?;

    if src.is_root() {
        return Err(RegistryError::AccessDenied("cannot move the server directory".into()));
    }
    if !src.target.exists() {
        return Err(not_found(source));
    }
    if !dest_dir.target.is_dir() {
        return Err(RegistryError::Validation(format!(
            "Destination is not a directory: {}",
            destination_dir
        )));
    }
    if dest_dir.target.starts_with(&src.target) {
        return Err(RegistryError::Validation(
            "Cannot move or copy a folder into itself".to_string(),
        ));
    }

    let file_name = src
        .target
        .file_name()
        .ok_or_else(|| RegistryError::Validation("Invalid source path".to_string()))?;
    let dest = dest_dir.target.join(file_name);

    if dest.exists() {
        return Err(RegistryError::Validation(format!(
            "Destination already exists: {}",
            src.relative(&dest)
        )));
    }

    Ok((src.target, dest, src.root))
}

fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<(), RegistryError> {
    fs::create_dir_all(dest)?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let entry_path = entry.path();
        let dest_path = dest.join(entry.file_name());

        if entry_path.is_dir() {
            copy_dir_recursive(&entry_path, &dest_path)?;
        } else {
            fs::copy(&entry_path, &dest_path)?;
        }
    }

    Ok(())
}

/// Get file info
pub async fn get_file_info(
    state: &RegistryState,
    server_id: &str,
    path: &str,
) -> Result<FileEntry, RegistryError> {
    let guarded = guard(state, server_id, path).await?;

    if !guarded.target.exists() {
        return Err(not_found(path));
    }

    let metadata = fs::metadata(&guarded.target)?;
    Ok(file_entry(&guarded.root, &guarded.target, &metadata))
}

/// Write decoded archive entries into a server directory, one at a time.
///
/// Each entry must stay inside `destination` and is checked before it is
/// written, so `../../evil.sh` aborts the extraction with AccessDenied. Entries written
/// before the offending one are left in place.
pub async fn extract_entries<I>(
    state: &RegistryState,
    server_id: &str,
    destination: &str,
    entries: I,
) -> Result<usize, RegistryError>
where
    I: IntoIterator<Item = ArchiveEntry>,
{
    let guarded = guard(state, server_id, destination).await?;
    fs::create_dir_all(&guarded.target)?;

    let mut written = 0;
    for entry in entries {
        let target = resolve_within(&guarded.target, &entry.name)?;

        if entry.name.ends_with('/') {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, &entry.data)?;
        written += 1;
    }

    tracing::info!("Extracted {} file(s) into server {}", written, server_id);
    Ok(written)
}
