use gitseal_common::protocol::api::ErrorCode;
use thiserror::Error;

use crate::git::GitError;
use crate::notebook::StoreError;

/// Failure of a lock, unlock, status or commit flow.
///
/// Messages are meant for the caller; the underlying git/gpg diagnostics are
/// kept as `source` and logged, not returned.
#[derive(Debug, Error)]
pub enum SealError {
    /// Input or environment is not ready. Nothing was changed.
    #[error("{0}")]
    Precondition(String),

    #[error("content modified since lock")]
    IntegrityViolation,

    /// A commit was created unsigned and has been rolled back.
    #[error("{0}")]
    SigningPolicyViolation(String),

    #[error("{message}")]
    Authorization { code: ErrorCode, message: String },

    #[error("{message}")]
    CommitFailed {
        message: String,
        #[source]
        source: GitError,
    },

    #[error("{message}")]
    Persistence {
        message: String,
        #[source]
        source: StoreError,
    },

    /// The repository may be in an inconsistent state.
    #[error("{0}")]
    CriticalFailure(String),

    /// A read-only git query failed (spawn failure, timeout, odd output).
    #[error("{context}")]
    Backend {
        context: String,
        #[source]
        source: GitError,
    },
}

impl SealError {
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    pub fn identity_mismatch(message: impl Into<String>) -> Self {
        Self::Authorization { code: ErrorCode::IdentityMismatch, message: message.into() }
    }

    pub fn key_possession(message: impl Into<String>) -> Self {
        Self::Authorization { code: ErrorCode::KeyPossessionFailed, message: message.into() }
    }

    pub fn commit_failed(message: impl Into<String>) -> impl FnOnce(GitError) -> Self {
        let message = message.into();
        move |source| Self::CommitFailed { message, source }
    }

    pub fn persistence(message: impl Into<String>) -> impl FnOnce(StoreError) -> Self {
        let message = message.into();
        move |source| Self::Persistence { message, source }
    }

    pub fn backend(context: impl Into<String>) -> impl FnOnce(GitError) -> Self {
        let context = context.into();
        move |source| Self::Backend { context, source }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Precondition(_) => ErrorCode::PreconditionFailed,
            Self::IntegrityViolation => ErrorCode::ContentModified,
            Self::SigningPolicyViolation(_) => ErrorCode::CommitUnsignedRolledBack,
            Self::Authorization { code, .. } => *code,
            Self::CommitFailed { .. } => ErrorCode::CommitFailed,
            Self::Persistence { .. } => ErrorCode::PersistenceFailed,
            Self::CriticalFailure(_) => ErrorCode::RollbackFailed,
            Self::Backend { .. } => ErrorCode::InternalError,
        }
    }

    pub fn manual_intervention_required(&self) -> bool {
        self.code().manual_intervention_required()
    }

    /// Backend diagnostic for logs, when there is one.
    pub fn diagnostic(&self) -> Option<String> {
        match self {
            Self::CommitFailed { source, .. } | Self::Backend { source, .. } => {
                Some(source.to_string())
            }
            Self::Persistence { source, .. } => Some(source.to_string()),
            _ => None,
        }
    }
}

impl From<crate::command::CommandError> for SealError {
    fn from(error: crate::command::CommandError) -> Self {
        Self::Backend { context: "git/gpg query failed".to_string(), source: error.into() }
    }
}
