//! Output directory containment and project key validation.
//!
//! Every file a tool writes or the gateway serves is resolved through
//! [`resolve_within`], so a crafted name can never leave its directory.

use std::path::{Path, PathBuf};

/// Error returned when path validation fails.
#[derive(Debug, thiserror::Error)]
pub enum PathValidationError {
    #[error("Path traversal detected in '{path}'")]
    PathTraversal { path: String },

    #[error("Path '{path}' is outside '{root}'")]
    OutsideRoot { path: String, root: String },

    #[error("Invalid file name '{name}'")]
    InvalidName { name: String },

    #[error("Unsupported file type for '{name}' (allowed: {allowed})")]
    UnsupportedExtension { name: String, allowed: String },

    #[error("Invalid project_key '{key}': use lowercase letters, digits, '-' or '_'")]
    InvalidProjectKey { key: String },

    #[error("Failed to canonicalize path '{path}': {reason}")]
    CanonicalizeFailed { path: String, reason: String },
}

/// Check a project key against `^[a-z0-9_-]+$`, returning it trimmed.
pub fn validate_project_key(key: &str) -> Result<String, PathValidationError> {
    let trimmed = key.trim();
    let valid = !trimmed.is_empty()
        && trimmed
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if !valid {
        return Err(PathValidationError::InvalidProjectKey { key: key.into() });
    }
    Ok(trimmed.to_string())
}

/// Resolve `name` as a direct child of `dir`.
///
/// `name` must be a single path component. When `dir` exists, both sides
/// are canonicalized so symlinks cannot redirect the result elsewhere.
pub fn resolve_within(dir: &Path, name: &str) -> Result<PathBuf, PathValidationError> {
    let normalized = name.replace('\\', "/");
    if normalized.is_empty()
        || normalized.contains('/')
        || normalized.contains(':')
        || normalized == "."
        || normalized.contains("..")
    {
        return Err(PathValidationError::PathTraversal { path: name.into() });
    }

    let candidate = dir.join(name);
    if !dir.exists() {
        return Ok(candidate);
    }

    let root = dir
        .canonicalize()
        .map_err(|e| PathValidationError::CanonicalizeFailed {
            path: dir.display().to_string(),
            reason: e.to_string(),
        })?;
    let resolved = if candidate.exists() {
        candidate
            .canonicalize()
            .map_err(|e| PathValidationError::CanonicalizeFailed {
                path: candidate.display().to_string(),
                reason: e.to_string(),
            })?
    } else {
        root.join(name)
    };

    if resolved.parent() != Some(root.as_path()) {
        tracing::warn!(path = %resolved.display(), root = %root.display(), "Rejected escaping path");
        return Err(PathValidationError::OutsideRoot {
            path: name.into(),
            root: root.display().to_string(),
        });
    }
    Ok(resolved)
}
