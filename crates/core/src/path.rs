//! Slash-delimited path helpers shared by every storage backend.
//!
//! Paths are absolute from the root folder. Leading and trailing slashes are
//! ignored, so `"docs/a"`, `"/docs/a"` and `"/docs/a/"` address the same item.

use crate::errors::ValidationError;

pub const ROOT_PATH: &str = "/";

/// Splits a path into its segments. The root path yields no segments.
pub fn split_path(path: &str) -> Result<Vec<&str>, ValidationError> {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let mut segments = Vec::new();
    for segment in trimmed.split('/') {
        if segment.trim().is_empty() {
            return Err(ValidationError::EmptySegment(path.to_string()));
        }
        if segment == "." || segment == ".." {
            return Err(ValidationError::ReservedSegment(segment.to_string()));
        }
        segments.push(segment);
    }
    Ok(segments)
}

/// Canonical form: a leading slash, no trailing slash, root as `/`.
pub fn normalize_path(path: &str) -> Result<String, ValidationError> {
    let segments = split_path(path)?;
    if segments.is_empty() {
        return Ok(ROOT_PATH.to_string());
    }
    Ok(format!("/{}", segments.join("/")))
}

pub fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() || parent == ROOT_PATH {
        format!("/{name}")
    } else {
        format!("{}/{}", parent.trim_end_matches('/'), name)
    }
}

/// Splits a file path into its folder path and trailing file name.
pub fn split_file_path(path: &str) -> Result<(String, String), ValidationError> {
    let mut segments = split_path(path)?;
    let name = segments.pop().ok_or(ValidationError::EmptyName)?;
    let parent = if segments.is_empty() {
        ROOT_PATH.to_string()
    } else {
        format!("/{}", segments.join("/"))
    };
    Ok((parent, name.to_string()))
}

/// True when `path` equals `ancestor` or lies below it. Segment aware:
/// `/AB/x` is not within `/A`.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    let ancestor = ancestor.trim_end_matches('/');
    if ancestor.is_empty() {
        return true;
    }
    match path.strip_prefix(ancestor) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if name.contains('/') {
        return Err(ValidationError::SlashInName(name.to_string()));
    }
    if name == "." || name == ".." {
        return Err(ValidationError::ReservedSegment(name.to_string()));
    }
    Ok(())
}
