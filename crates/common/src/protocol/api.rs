// Request/response bodies for the daemon's HTTP API.
//
// Field names follow the notebook extension's wire format; `notebook_path`
// and `notebook_content` are accepted as aliases for older clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Identity, RepositoryStatus, SignatureMetadata};

// ── Requests ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LockRequest {
    #[serde(alias = "notebook_path")]
    pub path: String,
    #[serde(alias = "notebook_content")]
    pub document: Value,
    pub commit_message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnlockRequest {
    #[serde(alias = "notebook_path")]
    pub path: String,
    #[serde(alias = "notebook_content")]
    pub document: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusRequest {
    #[serde(alias = "notebook_content")]
    pub document: Value,
    #[serde(default, alias = "notebook_path")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommitRequest {
    #[serde(alias = "notebook_path")]
    pub path: String,
    #[serde(alias = "notebook_content")]
    pub document: Value,
    pub commit_message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoveSignatureRequest {
    #[serde(alias = "notebook_path")]
    pub path: String,
    #[serde(alias = "notebook_content")]
    pub document: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepositoryStatusRequest {
    #[serde(alias = "notebook_path")]
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserInfoQuery {
    /// Drop cached identities before resolving.
    #[serde(default)]
    pub refresh: bool,
}

// ── Responses ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LockResponse {
    pub success: bool,
    pub message: String,
    pub metadata: SignatureMetadata,
    pub commit_hash: String,
    pub signed: bool,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnlockResponse {
    pub success: bool,
    pub message: String,
    pub signature_verification_passed: bool,
    pub was_gpg_signed: bool,
    #[serde(default)]
    pub commit_hash: Option<String>,
    pub metadata: SignatureMetadata,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusResponse {
    pub success: bool,
    pub locked: bool,
    pub signature_valid: bool,
    pub message: String,
    #[serde(default)]
    pub metadata: Option<SignatureMetadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommitResponse {
    pub success: bool,
    pub message: String,
    pub commit_hash: String,
    pub signed: bool,
    #[serde(default)]
    pub metadata: Option<SignatureMetadata>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoveSignatureResponse {
    pub success: bool,
    pub message: String,
    pub document: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepositoryStatusResponse {
    pub success: bool,
    pub repository_status: RepositoryStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserInfoResponse {
    pub success: bool,
    #[serde(default)]
    pub user_info: Option<Identity>,
    #[serde(default)]
    pub message: Option<String>,
}

// ── Error codes ────────────────────────────────────────────────────

/// Failure class shared by the HTTP status mapping and CLI exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Caller-fixable: bad input, missing configuration, tampered content.
    Client,
    /// The caller is not the lock owner or cannot prove key possession.
    Authorization,
    /// git/gpg/filesystem trouble on the daemon's side.
    Operational,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationFailed,
    PreconditionFailed,
    ContentModified,
    IdentityMismatch,
    KeyPossessionFailed,
    CommitFailed,
    PersistenceFailed,
    CommitUnsignedRolledBack,
    RollbackFailed,
    InternalError,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::PreconditionFailed => "PRECONDITION_FAILED",
            Self::ContentModified => "CONTENT_MODIFIED",
            Self::IdentityMismatch => "IDENTITY_MISMATCH",
            Self::KeyPossessionFailed => "KEY_POSSESSION_FAILED",
            Self::CommitFailed => "COMMIT_FAILED",
            Self::PersistenceFailed => "PERSISTENCE_FAILED",
            Self::CommitUnsignedRolledBack => "COMMIT_UNSIGNED_ROLLED_BACK",
            Self::RollbackFailed => "ROLLBACK_FAILED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        ALL_ERROR_CODES.iter().copied().find(|code| code.as_str() == raw)
    }

    pub const fn class(self) -> ErrorClass {
        match self {
            Self::ValidationFailed | Self::PreconditionFailed | Self::ContentModified => {
                ErrorClass::Client
            }
            Self::IdentityMismatch | Self::KeyPossessionFailed => ErrorClass::Authorization,
            Self::CommitFailed
            | Self::PersistenceFailed
            | Self::CommitUnsignedRolledBack
            | Self::RollbackFailed
            | Self::InternalError => ErrorClass::Operational,
        }
    }

    pub const fn http_status(self) -> u16 {
        match self.class() {
            ErrorClass::Client => 400,
            ErrorClass::Authorization => 403,
            ErrorClass::Operational => 500,
        }
    }

    pub const fn retryable(self) -> bool {
        matches!(self, Self::CommitFailed | Self::PersistenceFailed | Self::InternalError)
    }

    /// Whether the repository may be left in a state that needs a human.
    pub const fn manual_intervention_required(self) -> bool {
        matches!(self, Self::RollbackFailed)
    }

    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ValidationFailed => "request validation failed",
            Self::PreconditionFailed => "operation preconditions not met",
            Self::ContentModified => "content modified since lock",
            Self::IdentityMismatch => "only the user who locked the notebook can unlock it",
            Self::KeyPossessionFailed => "could not prove possession of the signing key",
            Self::CommitFailed => "git commit failed",
            Self::PersistenceFailed => "failed to save notebook",
            Self::CommitUnsignedRolledBack => "commit was not signed and has been rolled back",
            Self::RollbackFailed => "rollback failed, manual intervention required",
            Self::InternalError => "internal server error",
        }
    }
}

pub const ALL_ERROR_CODES: &[ErrorCode] = &[
    ErrorCode::ValidationFailed,
    ErrorCode::PreconditionFailed,
    ErrorCode::ContentModified,
    ErrorCode::IdentityMismatch,
    ErrorCode::KeyPossessionFailed,
    ErrorCode::CommitFailed,
    ErrorCode::PersistenceFailed,
    ErrorCode::CommitUnsignedRolledBack,
    ErrorCode::RollbackFailed,
    ErrorCode::InternalError,
];
