use crate::errors::BridgeError;
use std::path::{Path, PathBuf};

/// Longest sheet name most spreadsheet hosts accept.
pub const MAX_SHEET_NAME_CHARS: usize = 31;

/// Resolve `candidate` against `workspace_root` and ensure it stays inside it.
///
/// Both sides are canonicalized, so symlinks cannot escape. A candidate that does not exist yet
/// (an export target) is checked through its parent directory.
pub fn enforce_within_workspace(
    workspace_root: &Path,
    candidate: &Path,
    field: &'static str,
) -> Result<PathBuf, BridgeError> {
    let reject = |reason: String| BridgeError::PathValidation {
        field: field.to_string(),
        path: candidate.display().to_string(),
        reason,
    };

    let root = workspace_root
        .canonicalize()
        .map_err(|e| reject(format!("workspace root could not be resolved: {e}")))?;
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };

    let canonical = if joined.exists() {
        joined
            .canonicalize()
            .map_err(|e| reject(format!("could not be canonicalized: {e}")))?
    } else {
        let parent = joined
            .parent()
            .ok_or_else(|| reject("must have a parent directory".to_string()))?;
        let file_name = joined
            .file_name()
            .ok_or_else(|| reject("must include a file name".to_string()))?;
        parent
            .canonicalize()
            .map_err(|e| reject(format!("parent directory could not be canonicalized: {e}")))?
            .join(file_name)
    };

    if !canonical.starts_with(&root) {
        return Err(reject(format!(
            "resolves outside the workspace root '{}'",
            root.display()
        )));
    }
    Ok(canonical)
}

/// Sheet name safe for any host: no `[]:*?/\` or control characters, at most 31 characters.
pub fn sanitize_sheet_name(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .map(|ch| match ch {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim().trim_matches('\'');
    if trimmed.is_empty() {
        return "Sheet".to_string();
    }
    trimmed.chars().take(MAX_SHEET_NAME_CHARS).collect()
}
