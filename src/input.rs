// Local file input: turns a name typed by the user (or passed on the
// command line) into a validated absolute path for the uploader.

use crate::error::UploadError;
use std::path::{Path, PathBuf};

/// Resolve `file_name` against `base_dir`. Absolute names are used as-is.
/// The result is canonical and points at an existing regular file.
pub fn resolve_path(base_dir: &Path, file_name: &str) -> Result<PathBuf, UploadError> {
    let name = file_name.trim();
    if name.is_empty() {
        return Err(UploadError::FileNotFound {
            path: base_dir.to_path_buf(),
        });
    }

    let candidate = Path::new(name);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base_dir.join(candidate)
    };

    match joined.canonicalize() {
        Ok(path) if path.is_file() => Ok(path),
        _ => Err(UploadError::FileNotFound { path: joined }),
    }
}

/// Default display name for an upload: the file's own name.
pub fn default_display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
