use super::error::StorageError;

const MAX_PATH_LEN: usize = 512;

/// Checks if a path string contains path traversal patterns.
fn contains_path_traversal(path: &str) -> bool {
    path == ".."
        || path.starts_with("../")
        || path.contains("/../")
        || path.ends_with("/..")
}

/// Validates a relative object path such as `submissions/12/source`.
///
/// Object paths are joined onto a storage root and onto the public artifact
/// base URL, so anything that could escape either is refused.
pub fn validate_object_path(path: &str) -> Result<&str, StorageError> {
    let invalid = |reason| StorageError::InvalidPath {
        path: path.to_string(),
        reason,
    };

    if path.is_empty() {
        return Err(invalid("path cannot be empty"));
    }
    if path.len() > MAX_PATH_LEN {
        return Err(invalid("path exceeds maximum length of 512 characters"));
    }
    if path.contains('\\') {
        return Err(invalid("path must not contain backslashes"));
    }
    if path.starts_with('/') {
        return Err(invalid("path must not start with '/'"));
    }
    if path.ends_with('/') {
        return Err(invalid("path must not end with '/'"));
    }
    if contains_path_traversal(path) {
        return Err(invalid("path must not contain '..' traversal"));
    }

    for segment in path.split('/') {
        if segment.is_empty() {
            return Err(invalid("path must not contain empty segments"));
        }
        if segment.starts_with('.') {
            return Err(invalid("path segments must not start with '.'"));
        }
    }

    if !path
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '_' | '.'))
    {
        return Err(invalid(
            "path contains invalid characters (allowed: a-zA-Z0-9, /, -, _, .)",
        ));
    }

    Ok(path)
}
