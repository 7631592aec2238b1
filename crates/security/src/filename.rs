//! File name sanitisation.

use crate::path::PathValidationError;

/// Extensions accepted for image inputs.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

const MAX_DOCUMENT_NAME: usize = 120;

/// Replace every run of characters rejected by `keep` with a single `_`.
fn collapse_disallowed(value: &str, keep: impl Fn(char) -> bool) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_run = false;
    for c in value.chars() {
        if keep(c) {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    out
}

/// Make a model-supplied document name safe and force `extension` onto it.
///
/// Letters, digits, `-`, `_`, `.` and spaces survive; `..` is removed,
/// trailing dots and spaces are stripped, and the stem is capped at 120
/// characters. Returns `None` when nothing usable is left.
pub fn sanitize_document_filename(value: &str, extension: &str) -> Option<String> {
    let cleaned = collapse_disallowed(value.trim(), |c| {
        c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ')
    })
    .replace("..", "");
    let cleaned = cleaned.trim_end_matches(['.', ' ']).trim_start();

    let suffix = format!(".{extension}");
    let stem = if cleaned.to_ascii_lowercase().ends_with(&suffix) {
        &cleaned[..cleaned.len() - suffix.len()]
    } else {
        cleaned
    };
    let stem: String = stem.chars().take(MAX_DOCUMENT_NAME).collect();
    let stem = stem.trim_end_matches(['.', ' ']);
    if stem.is_empty() {
        return None;
    }
    Some(format!("{stem}{suffix}"))
}

/// Reduce an image name to `[A-Za-z0-9._-]`, without `..`.
pub fn sanitize_image_filename(value: &str) -> String {
    let cleaned = collapse_disallowed(value.trim(), |c| {
        c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
    });
    let mut cleaned = cleaned;
    while cleaned.contains("..") {
        cleaned = cleaned.replace("..", ".");
    }
    cleaned.trim_matches('.').to_string()
}

/// Accept only a bare file name with one of `allowed_extensions`.
pub fn validate_input_filename(
    name: &str,
    allowed_extensions: &[&str],
) -> Result<(), PathValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(PathValidationError::InvalidName { name: name.into() });
    }
    if name.contains(['/', '\\', ':']) || name.contains("..") {
        return Err(PathValidationError::PathTraversal { path: name.into() });
    }
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if !allowed_extensions.contains(&extension.as_str()) {
        return Err(PathValidationError::UnsupportedExtension {
            name: name.into(),
            allowed: allowed_extensions.join(", "),
        });
    }
    Ok(())
}
