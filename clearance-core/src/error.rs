//! Error taxonomy for the core, per component. Library code always
//! returns one of these; `anyhow` is reserved for the binary entry point.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("document has no body content")]
    EmptyDocument,
    #[error("unknown clearance tier: {0}")]
    UnknownTier(String),
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("integrity hash mismatch")]
    IntegrityFailure,
    #[error("authentication tag did not verify")]
    AuthTagMismatch,
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("key derivation failed")]
    KeyDerivationFailed,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("document not found")]
    NotFound,
    #[error("requester is not authorized for this document")]
    Unauthorized,
    #[error("registry snapshot is corrupt: {0}")]
    CorruptRegistry(String),
    #[error("persistence I/O error: {0}")]
    Persistence(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The wire-visible error code for a denied or failed access request.
/// Doubles as the audit log's `denialReason`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidSignature,
    ReplayDetected,
    DocumentNotFound,
    ReleasabilityDenied,
    ClearanceDenied,
    CredentialRevoked,
    NoStorageInfo,
    StorageError,
    InternalError,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::InvalidSignature => "INVALID_SIGNATURE",
            ErrorCode::ReplayDetected => "REPLAY_DETECTED",
            ErrorCode::DocumentNotFound => "DOCUMENT_NOT_FOUND",
            ErrorCode::ReleasabilityDenied => "RELEASABILITY_DENIED",
            ErrorCode::ClearanceDenied => "CLEARANCE_DENIED",
            ErrorCode::CredentialRevoked => "CREDENTIAL_REVOKED",
            ErrorCode::NoStorageInfo => "NO_STORAGE_INFO",
            ErrorCode::StorageError => "STORAGE_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("blob store error: {0}")]
    Storage(String),
    #[error("denied: {0}")]
    Denied(ErrorCode),
}

impl EngineError {
    /// Maps any internal fault to the wire error code, per §7's
    /// propagation policy: lower-layer faults never leak detail to the
    /// client, only `INTERNAL_ERROR` or `STORAGE_ERROR`.
    pub fn to_error_code(&self) -> ErrorCode {
        match self {
            EngineError::Denied(code) => *code,
            EngineError::Storage(_) => ErrorCode::StorageError,
            EngineError::Registry(RegistryError::NotFound) => ErrorCode::DocumentNotFound,
            EngineError::Registry(RegistryError::Unauthorized) => ErrorCode::ReleasabilityDenied,
            EngineError::Registry(_) | EngineError::Crypto(_) => ErrorCode::InternalError,
        }
    }
}

/// Transport-only; always converted to `CHECK_FAILED` at the call site
/// per the fail-open revocation policy, never propagated further.
#[derive(Debug, Error)]
pub enum RevocationError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("status list malformed: {0}")]
    MalformedStatusList(String),
}
