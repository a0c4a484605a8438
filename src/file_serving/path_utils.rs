use percent_encoding::percent_decode_str;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Instant;

use super::{Resolved, INDEX_FILES};
use crate::log_error;
use crate::logging::LoggingExt;

/// Maps a raw request path onto `base_dir`.
///
/// Returns `Ok(None)` when the path cannot be decoded or would end up outside
/// the canonical base directory, including through symlinks.
pub fn sanitize_path(base_dir: &Path, request_path: &str) -> io::Result<Option<PathBuf>> {
    let start_time = Instant::now();
    log::debug!(
        "Sanitizing path - base: {}, request: {}",
        base_dir.display(),
        request_path
    );

    let canonical_base = base_dir.log_operation("canonicalize", || fs::canonicalize(base_dir))?;

    let path_without_query = request_path.split('?').next().unwrap_or(request_path);

    let decoded_path = match percent_decode_str(path_without_query).decode_utf8() {
        Ok(p) => p,
        Err(e) => {
            log::warn!("Undecodable request path {}: {}", path_without_query, e);
            return Ok(None);
        }
    };
    if decoded_path.contains('\0') {
        log::warn!("Request path contains NUL byte");
        return Ok(None);
    }

    // `..`, `.`, roots and prefixes are dropped, never resolved
    let cleaned_path = Path::new(decoded_path.as_ref())
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect::<PathBuf>();
    log::debug!("Cleaned path: {}", cleaned_path.display());

    let requested_path = canonical_base.join(&cleaned_path);

    match fs::canonicalize(&requested_path) {
        Ok(path) => {
            log::debug!(
                "Path sanitization complete in {:?} - result: {}",
                start_time.elapsed(),
                path.display()
            );

            if path.starts_with(&canonical_base) {
                Ok(Some(path))
            } else {
                log::warn!("Path escapes base directory: {}", path.display());
                Ok(None)
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::debug!("Path not found: {}", requested_path.display());
            Ok(None)
        }
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            log::warn!("Permission denied: {}", requested_path.display());
            Ok(None)
        }
        Err(e) => {
            log_error!(
                e,
                format!("Failed to canonicalize path: {}", requested_path.display())
            );
            Err(e)
        }
    }
}

/// Resolves `request_path` to a file, an index file, a directory listing, or
/// nothing.
pub fn resolve(base_dir: &Path, request_path: &str, listing: bool) -> io::Result<Resolved> {
    let path = match sanitize_path(base_dir, request_path)? {
        Some(p) => p,
        None => return Ok(Resolved::NotFound),
    };

    let metadata = match fs::metadata(&path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Resolved::NotFound),
        Err(e) => return Err(e),
    };

    if metadata.is_file() {
        return Ok(Resolved::File(path));
    }
    if !metadata.is_dir() {
        log::warn!("Path exists but is not a regular file: {}", path.display());
        return Ok(Resolved::NotFound);
    }

    let path_without_query = request_path.split('?').next().unwrap_or(request_path);
    if !path_without_query.ends_with('/') {
        return Ok(Resolved::AddSlash);
    }

    let canonical_base = fs::canonicalize(base_dir)?;
    for index in INDEX_FILES {
        // The index itself may be a symlink, so it is checked like any other path
        match fs::canonicalize(path.join(index)) {
            Ok(candidate) if candidate.starts_with(&canonical_base) && candidate.is_file() => {
                log::debug!("Using index file {}", candidate.display());
                return Ok(Resolved::File(candidate));
            }
            _ => {}
        }
    }

    if listing {
        Ok(Resolved::Listing(path))
    } else {
        log::debug!("No index in {} and listing disabled", path.display());
        Ok(Resolved::NotFound)
    }
}
