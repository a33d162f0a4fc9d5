//! use certmgr::error::CertMgrError;

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = CertMgrError> = std::result::Result<T, E>;

/// Represents errors that can occur while managing keys, requests and certificates.
///
/// Every failure aborts the current command; nothing is retried internally.
#[derive(Debug, Error)]
pub enum CertMgrError {
    /// Unknown key algorithm, key size or curve.
    #[error("Unsupported parameter: {0}")]
    UnsupportedParameter(String),

    /// Unknown certificate role.
    #[error("Unsupported certificate type: {0} (valid: ca, server, client)")]
    UnsupportedRole(String),

    /// Validity string outside the `<number><d|m|y>` grammar.
    #[error("Invalid validity string: {0}")]
    InvalidValiditySpec(String),

    /// A key of an algorithm this crate cannot handle.
    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(String),

    /// Key generation or its randomness source failed.
    #[error("Key generation error: {0}")]
    GenerationFailure(String),

    /// A DNS name that cannot be written into a subject alternative name.
    #[error("Invalid DNS name {0:?}: only ASCII names are supported")]
    InvalidDnsName(String),

    /// A signature operation failed.
    #[error("Signing error: {0}")]
    SigningFailure(String),

    /// The randomness source failed while drawing a serial number.
    #[error("Failed to generate serial number: {0}")]
    SerialGenerationFailure(String),

    /// Error during data encoding.
    #[error("Failed to encode data: {0}")]
    EncodingFailure(String),

    /// The store refuses to overwrite an existing artifact.
    #[error("Refusing to overwrite existing file {}", path.display())]
    AlreadyExists { path: PathBuf },

    /// Filesystem error while reading or writing an artifact.
    #[error("I/O error on {}: {source}", path.display())]
    StoreIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file does not hold exactly one PEM block with the expected label.
    #[error("Failed to decode {}: {reason}", path.display())]
    EnvelopeMismatch { path: PathBuf, reason: String },

    #[error("Malformed private key: {0}")]
    MalformedKey(String),

    #[error("Malformed certificate request: {0}")]
    MalformedRequest(String),

    #[error("Malformed certificate: {0}")]
    MalformedCertificate(String),

    #[error("Signature verification failed: {0}")]
    InvalidSignature(String),

    /// Only CA certificates can be self-signed.
    #[error("Cannot self-sign: {0}")]
    InvalidSelfSignRequest(String),

    #[error("Self-signed certificates have no signer, got signer {0:?}")]
    ConflictingSigner(String),

    #[error("Signed certificates must have a signer")]
    MissingSigner,

    #[error("Signer {basename:?} not found: {}", path.display())]
    SignerNotFound { basename: String, path: PathBuf },

    #[error("Signer {basename:?} is unreadable: {source}")]
    SignerUnreadable {
        basename: String,
        #[source]
        source: Box<CertMgrError>,
    },

    #[error("Error opening config file {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Error parsing config file {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl From<der::Error> for CertMgrError {
    /// Converts a `der::Error` into a `CertMgrError`.
    fn from(err: der::Error) -> Self {
        CertMgrError::EncodingFailure(err.to_string())
    }
}

impl From<x509_cert::spki::Error> for CertMgrError {
    fn from(err: x509_cert::spki::Error) -> Self {
        CertMgrError::EncodingFailure(err.to_string())
    }
}
