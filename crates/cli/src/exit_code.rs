// Consistent exit codes for the gitseal CLI.
//
//   0  = success
//   1  = general error
//   2  = usage or precondition error
//   11 = authorization (not the lock owner, or signing key not held)
//   12 = integrity (content changed since lock)
//   13 = manual intervention required

use std::process;

use gitseal_common::notebook::NotebookError;
use gitseal_common::protocol::api::ErrorCode;
use gitseal_daemon::notebook::StoreError;
use gitseal_daemon::seal::SealError;

/// Named exit codes for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Usage = 2,
    Authorization = 11,
    Integrity = 12,
    ManualIntervention = 13,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(seal) = cause.downcast_ref::<SealError>() {
                return Self::from_error_code(seal.code());
            }
            if let Some(StoreError::Notebook(_)) = cause.downcast_ref::<StoreError>() {
                return Self::Usage;
            }
            if cause.downcast_ref::<NotebookError>().is_some() {
                return Self::Usage;
            }
        }
        Self::Error
    }

    pub fn from_error_code(code: ErrorCode) -> Self {
        match code {
            ErrorCode::ValidationFailed | ErrorCode::PreconditionFailed => Self::Usage,
            ErrorCode::ContentModified => Self::Integrity,
            ErrorCode::IdentityMismatch | ErrorCode::KeyPossessionFailed => Self::Authorization,
            ErrorCode::RollbackFailed => Self::ManualIntervention,
            ErrorCode::CommitFailed
            | ErrorCode::PersistenceFailed
            | ErrorCode::CommitUnsignedRolledBack
            | ErrorCode::InternalError => Self::Error,
        }
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code.code() as u8)
    }
}
