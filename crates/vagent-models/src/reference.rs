//! Validation of job references before any work begins.
//!
//! Local file references must resolve under an allowed root and must
//! not contain `..`; URL references must be HTTP(S). Rejected
//! references never create a job.

use crate::job::JobOrigin;

/// Directory roots a `file://` reference may point into.
pub const ALLOWED_LOCAL_ROOTS: [&str; 3] = ["/tmp/", "/shared/", "/data/"];

/// Maximum reference length.
const MAX_REFERENCE_LENGTH: usize = 2048;

/// Result of reference validation.
#[derive(Debug)]
pub enum ReferenceValidation {
    /// Reference is acceptable.
    Valid,
    /// Reference is malformed or unsupported for its origin.
    Invalid(String),
    /// Local path escapes the allowed roots.
    PathNotAllowed(String),
}

impl ReferenceValidation {
    /// Convert to Result for easy error handling.
    pub fn into_result(self) -> Result<(), String> {
        match self {
            Self::Valid => Ok(()),
            Self::Invalid(msg) => Err(msg),
            Self::PathNotAllowed(msg) => Err(msg),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Validate a job reference for its origin.
pub fn validate_reference(origin: JobOrigin, reference: &str) -> ReferenceValidation {
    let reference = reference.trim();

    if reference.is_empty() {
        return ReferenceValidation::Invalid("reference cannot be empty".to_string());
    }
    if reference.len() > MAX_REFERENCE_LENGTH {
        return ReferenceValidation::Invalid(format!(
            "reference exceeds maximum length of {} characters",
            MAX_REFERENCE_LENGTH
        ));
    }

    match origin {
        JobOrigin::Url => validate_url_reference(reference),
        JobOrigin::Upload => {
            if reference.starts_with("file://") || !reference.contains("://") {
                validate_local_path(reference.strip_prefix("file://").unwrap_or(reference))
            } else {
                ReferenceValidation::Invalid(
                    "upload reference must be a local file handle".to_string(),
                )
            }
        }
        // Drive handles and stream ids are opaque to the queue; the
        // downloader resolves them.
        JobOrigin::Drive | JobOrigin::LiveStream => ReferenceValidation::Valid,
    }
}

fn validate_url_reference(reference: &str) -> ReferenceValidation {
    if let Some(path) = reference.strip_prefix("file://") {
        return validate_local_path(path);
    }

    match reference.split_once("://") {
        Some(("http" | "https", rest)) if !rest.is_empty() => ReferenceValidation::Valid,
        Some((scheme, _)) => ReferenceValidation::Invalid(format!(
            "unsupported scheme '{}', only http, https and file are allowed",
            scheme
        )),
        None => ReferenceValidation::Invalid("URL reference must carry a scheme".to_string()),
    }
}

/// Validate a local filesystem path against the allowed roots.
pub fn validate_local_path(path: &str) -> ReferenceValidation {
    // Reject traversal before looking at the prefix; "/tmp/../etc" must
    // never pass.
    if path.split('/').any(|seg| seg == "..") {
        return ReferenceValidation::PathNotAllowed(
            "path traversal ('..') is not allowed".to_string(),
        );
    }

    if ALLOWED_LOCAL_ROOTS.iter().any(|root| path.starts_with(root)) {
        ReferenceValidation::Valid
    } else {
        ReferenceValidation::PathNotAllowed(format!(
            "path must be under one of {:?}",
            ALLOWED_LOCAL_ROOTS
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_http_urls() {
        assert!(validate_reference(JobOrigin::Url, "https://host/v.mp4").is_valid());
        assert!(validate_reference(JobOrigin::Url, "http://host/v.mp4").is_valid());
    }

    #[test]
    fn rejects_other_schemes() {
        assert!(!validate_reference(JobOrigin::Url, "ftp://host/v.mp4").is_valid());
        assert!(!validate_reference(JobOrigin::Url, "javascript:alert(1)").is_valid());
    }

    #[test]
    fn accepts_allowed_local_roots() {
        assert!(validate_reference(JobOrigin::Url, "file:///tmp/v.mp4").is_valid());
        assert!(validate_reference(JobOrigin::Url, "file:///shared/in/v.mp4").is_valid());
        assert!(validate_reference(JobOrigin::Url, "file:///data/v.mp4").is_valid());
    }

    #[test]
    fn rejects_path_traversal() {
        assert!(!validate_reference(JobOrigin::Url, "file:///tmp/../etc/passwd").is_valid());
        assert!(!validate_reference(JobOrigin::Url, "file:///tmp/a/../../etc/shadow").is_valid());
    }

    #[test]
    fn rejects_paths_outside_roots() {
        assert!(!validate_reference(JobOrigin::Url, "file:///etc/passwd").is_valid());
        assert!(!validate_reference(JobOrigin::Url, "file:///home/user/v.mp4").is_valid());
    }

    #[test]
    fn rejects_empty_reference() {
        assert!(!validate_reference(JobOrigin::Url, "").is_valid());
        assert!(!validate_reference(JobOrigin::Upload, "  ").is_valid());
    }

    #[test]
    fn upload_paths_validate_like_files() {
        assert!(validate_reference(JobOrigin::Upload, "/tmp/upload-123.mp4").is_valid());
        assert!(!validate_reference(JobOrigin::Upload, "/etc/passwd").is_valid());
    }

    #[test]
    fn opaque_origins_pass_through() {
        assert!(validate_reference(JobOrigin::Drive, "drive-file-abc").is_valid());
        assert!(validate_reference(JobOrigin::LiveStream, "live-1").is_valid());
    }
}
