//! Error types for lcp-core
//!
//! This module defines error types using thiserror for ergonomic error handling.
//! Errors are grouped by pipeline stage (asset, license, authentication,
//! publication, resource) so callers can tell terminal failures from ones
//! that are worth retrying with a different passphrase.
//!
//! ## Retryable vs terminal
//!
//! - `WrongPassphrase` and `AuthenticationCancelled` are retryable: call
//!   `authenticate` again with another passphrase.
//! - `LicenseInvalid`, `LicenseExpired`, `ManifestInvalid`,
//!   `UnsupportedEncryptionProfile` and `RightsRestricted` are terminal for the
//!   asset.
//! - `Io` is surfaced verbatim and never retried here. Retry policy belongs to
//!   the caller.

use std::fmt;
use thiserror::Error;

/// Result type alias using our LcpError type
pub type Result<T> = std::result::Result<T, LcpError>;

/// Why an authentication attempt stopped without a usable passphrase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The authenticator declined to provide a passphrase
    User,
    /// The caller's cancellation token fired
    Signal,
    /// The configured authentication timeout elapsed
    Timeout,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::User => f.write_str("cancelled by user"),
            CancelReason::Signal => f.write_str("cancellation requested"),
            CancelReason::Timeout => f.write_str("timed out"),
        }
    }
}

/// Main error type for lcp-core
#[derive(Error, Debug)]
pub enum LcpError {
    // ===== Asset / Container Errors =====

    /// The asset path does not exist or cannot be resolved
    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    /// The asset is not a package format we know how to open
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// No entry with this href in the container
    #[error("Entry not found in container: {0}")]
    EntryNotFound(String),

    /// A raw read fell outside the entry's byte range
    #[error("Read of {length} bytes at offset {offset} is outside entry '{href}' ({size} bytes)")]
    OutOfRange {
        href: String,
        offset: u64,
        length: u64,
        size: u64,
    },

    // ===== License Errors =====

    /// License document failed structural, signature or status checks
    #[error("Invalid license: {0}")]
    LicenseInvalid(String),

    /// License status is expired or its rights end has passed
    #[error("License {license_id} has expired")]
    LicenseExpired { license_id: String },

    // ===== Authentication Errors =====

    /// No candidate passphrase unlocked the license
    #[error("Wrong passphrase for license {license_id}")]
    WrongPassphrase { license_id: String },

    /// Authentication stopped before a passphrase was found
    #[error("Authentication cancelled: {0}")]
    AuthenticationCancelled(CancelReason),

    // ===== Publication Errors =====

    /// Manifest (RWPM, OPF, container.xml, encryption.xml) is missing or malformed
    #[error("Invalid manifest: {0}")]
    ManifestInvalid(String),

    /// A resource declares an encryption scheme/algorithm we cannot decrypt
    #[error("Unsupported encryption profile for '{href}': {detail}")]
    UnsupportedEncryptionProfile { href: String, detail: String },

    /// License rights do not allow any access to the publication
    #[error("Publication is restricted: {0}")]
    RightsRestricted(String),

    // ===== Resource Errors =====

    /// Read or seek on a closed resource
    #[error("Resource is closed: {0}")]
    ResourceClosed(String),

    /// The resource is already open elsewhere
    #[error("Resource is already open: {0}")]
    AlreadyOpen(String),

    /// Ciphertext, padding or length check failed for a chunk
    #[error("Decryption failed for '{href}' at plaintext offset {offset}: {reason}")]
    DecryptionFailed {
        href: String,
        offset: u64,
        reason: String,
    },

    // ===== Fetch / Configuration Errors =====

    /// Package download failed or did not match the license link
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    /// Configuration is invalid or incomplete
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    // ===== External Library Errors =====

    /// Standard I/O error, surfaced verbatim
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Database driver error from sqlx
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP client error from reqwest
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<zip::result::ZipError> for LcpError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => LcpError::Io(e),
            other => LcpError::UnsupportedFormat(format!("not a readable ZIP archive: {}", other)),
        }
    }
}

// Helper methods for creating common errors
impl LcpError {
    /// Create a LicenseInvalid error with a message
    pub fn invalid_license<S: Into<String>>(message: S) -> Self {
        LcpError::LicenseInvalid(message.into())
    }

    /// Create a ManifestInvalid error with a message
    pub fn invalid_manifest<S: Into<String>>(message: S) -> Self {
        LcpError::ManifestInvalid(message.into())
    }

    /// Create an UnsupportedEncryptionProfile error
    pub fn unsupported_profile<H: Into<String>, D: Into<String>>(href: H, detail: D) -> Self {
        LcpError::UnsupportedEncryptionProfile {
            href: href.into(),
            detail: detail.into(),
        }
    }

    /// Create a DecryptionFailed error
    pub fn decryption_failed<H: Into<String>, R: Into<String>>(href: H, offset: u64, reason: R) -> Self {
        LcpError::DecryptionFailed {
            href: href.into(),
            offset,
            reason: reason.into(),
        }
    }

    /// Recover a typed error that travelled through an `std::io::Read` adapter
    ///
    /// Readers wrap `LcpError` in `io::Error::other` so they can sit under
    /// decoders; this undoes the wrapping and leaves real I/O errors alone.
    pub fn from_io(err: std::io::Error) -> Self {
        if err.get_ref().map_or(false, |inner| inner.is::<LcpError>()) {
            if let Some(inner) = err.into_inner() {
                if let Ok(lcp) = inner.downcast::<LcpError>() {
                    return *lcp;
                }
            }
            return LcpError::Io(std::io::Error::other("wrapped error lost"));
        }
        LcpError::Io(err)
    }

    /// Wrap into an `std::io::Error` for `Read`/`Seek` implementations
    pub fn into_io(self) -> std::io::Error {
        match self {
            LcpError::Io(e) => e,
            other => std::io::Error::other(other),
        }
    }

    /// Check if the caller may retry with a different passphrase
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LcpError::WrongPassphrase { .. } | LcpError::AuthenticationCancelled(_)
        )
    }

    /// Check if the error makes the asset permanently unusable
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LcpError::LicenseInvalid(_)
                | LcpError::LicenseExpired { .. }
                | LcpError::ManifestInvalid(_)
                | LcpError::UnsupportedEncryptionProfile { .. }
                | LcpError::RightsRestricted(_)
                | LcpError::UnsupportedFormat(_)
        )
    }

    /// Check if error is related to DRM/crypto operations
    pub fn is_crypto_error(&self) -> bool {
        matches!(
            self,
            LcpError::DecryptionFailed { .. }
                | LcpError::WrongPassphrase { .. }
                | LcpError::LicenseInvalid(_)
                | LcpError::UnsupportedEncryptionProfile { .. }
        )
    }

    /// Get user-friendly error message suitable for display
    pub fn user_message(&self) -> String {
        match self {
            LcpError::WrongPassphrase { .. } => {
                "The passphrase is incorrect. Please check it and try again.".to_string()
            }
            LcpError::AuthenticationCancelled(CancelReason::Timeout) => {
                "Unlocking the book took too long. Please try again.".to_string()
            }
            LcpError::AuthenticationCancelled(_) => "Unlocking the book was cancelled.".to_string(),
            LcpError::LicenseExpired { .. } => {
                "The loan for this book has expired.".to_string()
            }
            LcpError::RightsRestricted(reason) => {
                format!("This book cannot be opened right now: {}.", reason)
            }
            LcpError::AssetNotFound(path) => format!("The book file '{}' could not be found.", path),
            _ => self.to_string(),
        }
    }
}
