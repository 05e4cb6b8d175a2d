// Read-only lock status. Never persists, commits or takes the repository
// mutex.

use std::path::Path;

use gitseal_common::notebook::Notebook;
use gitseal_common::types::SignatureMetadata;
use tracing::debug;

use crate::command::CommandExecutor;
use crate::git::GitError;
use crate::notebook::content_hash;
use crate::seal::{read_signature, SealError, SealService};

const CONTENT_MODIFIED_SUFFIX: &str = " (Content has been modified since signing)";

#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub locked: bool,
    pub signature_valid: bool,
    pub message: String,
    pub metadata: Option<SignatureMetadata>,
}

impl<E: CommandExecutor> SealService<E> {
    pub fn status(&self, document: &Notebook, path: Option<&Path>) -> Result<StatusReport, SealError> {
        let Some(signature) = read_signature(document)? else {
            return Ok(StatusReport {
                locked: false,
                signature_valid: false,
                message: "No signature found".to_string(),
                metadata: None,
            });
        };
        if !signature.locked {
            return Ok(StatusReport {
                locked: false,
                signature_valid: false,
                message: "Document is not locked".to_string(),
                metadata: Some(signature),
            });
        }

        let (mut signature_valid, mut message) = match path {
            Some(path) => self.check_lock_commit(path, &signature.commit_hash)?,
            None => (
                false,
                "Locked but signature verification skipped (no path provided)".to_string(),
            ),
        };

        let hash = content_hash(document)
            .map_err(|error| SealError::precondition(format!("Invalid notebook: {error}")))?;
        if hash != signature.content_hash {
            message.push_str(CONTENT_MODIFIED_SUFFIX);
            signature_valid = false;
        }

        Ok(StatusReport { locked: true, signature_valid, message, metadata: Some(signature) })
    }

    fn check_lock_commit(&self, path: &Path, commit: &str) -> Result<(bool, String), SealError> {
        let repo = match self.git.open(path) {
            Ok(repo) => repo,
            Err(GitError::NotARepository { .. }) => {
                return Ok((false, "Not in a git repository".to_string()));
            }
            Err(error) => return Err(SealError::backend("failed to open repository")(error)),
        };
        if commit.trim().is_empty() {
            return Ok((false, "No git commit hash found in metadata".to_string()));
        }
        match repo.verify_signature(commit) {
            Ok(true) => Ok((true, "Git commit signature verified".to_string())),
            Ok(false) => Ok((false, "Git signature verification failed".to_string())),
            Err(error) => {
                debug!(commit, %error, "verify-commit did not complete");
                Ok((false, format!("Git signature verification failed: {error}")))
            }
        }
    }
}
