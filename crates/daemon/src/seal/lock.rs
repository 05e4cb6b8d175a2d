// Lock: commit the notebook with a signed commit and record the lock in its
// metadata. Preconditions are checked up front so a refused lock never
// touches the repository; an unsigned commit is rolled back.

use std::path::Path;

use gitseal_common::notebook::Notebook;
use gitseal_common::types::{utc_timestamp, SignatureMetadata};
use tracing::{error, info, warn};

use crate::command::CommandExecutor;
use crate::git::{short_hash, Repo};
use crate::notebook::content_hash;
use crate::seal::{hold, read_signature, KeyDisclosure, SealError, SealService};

#[derive(Debug, Clone, PartialEq)]
pub struct LockOutcome {
    pub metadata: SignatureMetadata,
    pub commit_hash: String,
    pub signed: bool,
    pub message: String,
    pub warnings: Vec<String>,
    /// The notebook carrying `metadata`, for callers that write it back.
    pub document: Notebook,
}

impl<E: CommandExecutor> SealService<E> {
    pub fn lock(
        &self,
        path: &Path,
        document: &Notebook,
        commit_message: &str,
    ) -> Result<LockOutcome, SealError> {
        if commit_message.trim().is_empty() {
            return Err(SealError::precondition("A commit message is required to lock"));
        }
        document
            .validate()
            .map_err(|error| SealError::precondition(format!("Invalid notebook: {error}")))?;
        if read_signature(document)?.is_some_and(|signature| signature.locked) {
            return Err(SealError::precondition("Notebook is already locked"));
        }

        let repo = self.open_repo(path)?;
        let repo_lock = self.repo_locks.for_root(repo.root());
        let _guard = hold(&repo_lock);

        let identity = self.identity.resolve_uncached(Some(repo.root()))?.ok_or_else(|| {
            SealError::precondition(
                "Git user configuration not found. Please configure git user.name and user.email",
            )
        })?;
        self.check_signing_ready(&repo)?;

        let unsigned = document.without_signature();
        let hash = content_hash(&unsigned)
            .map_err(|error| SealError::precondition(format!("Invalid notebook: {error}")))?;
        self.store().save(path, &unsigned).map_err(SealError::persistence("Failed to save notebook"))?;

        let committed = repo
            .stage_and_commit(path, commit_message)
            .map_err(SealError::commit_failed("Failed to commit notebook"))?;
        // A commit whose signature cannot be confirmed is treated as unsigned.
        let info = match repo.commit_info(&committed.commit_id) {
            Ok(Some(info)) if info.signed => info,
            Ok(_) => return Err(self.roll_back_unsigned(&repo, &committed.commit_id)),
            Err(error) => {
                warn!(commit = %committed.commit_id, %error, "could not inspect lock commit");
                return Err(self.roll_back_unsigned(&repo, &committed.commit_id));
            }
        };

        let mut metadata = SignatureMetadata {
            locked: true,
            commit_hash: info.hash.clone(),
            commit_signed: true,
            user_name: non_empty(info.author_name).unwrap_or_else(|| identity.name.clone()),
            user_email: non_empty(info.author_email).unwrap_or_else(|| identity.email.clone()),
            timestamp: non_empty(info.timestamp).unwrap_or_else(utc_timestamp),
            content_hash: hash,
            commit_message: commit_message.to_string(),
            gpg_available: true,
            unlock_timestamp: None,
            unlocked_by_user_name: None,
            unlocked_by_user_email: None,
            unlock_commit_hash: None,
        };

        let signed_document = unsigned
            .with_signature(&metadata)
            .map_err(|error| SealError::precondition(format!("Invalid notebook: {error}")))?;
        self.store()
            .save(path, &signed_document)
            .map_err(SealError::persistence("Failed to save lock metadata"))?;

        let mut warnings = Vec::new();
        match repo.amend_with_file(path, commit_message) {
            Ok(amended) => {
                metadata.commit_hash = amended.commit_id;
                metadata.commit_signed = amended.signed;
                if !amended.signed {
                    warnings.push(
                        "Amended commit is not signed; the lock metadata commit could not be signed"
                            .to_string(),
                    );
                }
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "failed to amend lock commit with metadata");
                warnings.push(
                    "Lock metadata was saved but could not be amended into the lock commit"
                        .to_string(),
                );
            }
        }

        let document = unsigned
            .with_signature(&metadata)
            .map_err(|error| SealError::precondition(format!("Invalid notebook: {error}")))?;
        info!(
            path = %path.display(),
            commit = %metadata.commit_hash,
            signed = metadata.commit_signed,
            user = %identity,
            "notebook locked"
        );
        Ok(LockOutcome {
            message: format!(
                "Notebook locked and signed in commit {}",
                short_hash(&metadata.commit_hash)
            ),
            commit_hash: metadata.commit_hash.clone(),
            signed: metadata.commit_signed,
            metadata,
            warnings,
            document,
        })
    }

    /// Every check that must pass before anything is written.
    fn check_signing_ready(&self, repo: &Repo<'_, E>) -> Result<(), SealError> {
        if !self.gpg.is_backend_available() {
            return Err(SealError::precondition("GPG is not available on this system"));
        }
        if !self.gpg.has_any_signing_key() {
            return Err(SealError::precondition("No GPG secret keys found"));
        }
        let key = self.gpg.configured_signing_key_id(repo.root())?.ok_or_else(|| {
            SealError::precondition(
                "No signing key configured. Set git user.signingkey to lock notebooks",
            )
        })?;
        if !self.gpg.can_sign_with_key(&key) {
            let disclosure = KeyDisclosure::after_identity_check(true);
            return Err(SealError::precondition(format!(
                "Configured signing key {} cannot sign",
                disclosure.render(&key)
            )));
        }
        Ok(())
    }

    /// Undo a commit that came out unsigned, but only if it is still HEAD.
    fn roll_back_unsigned(&self, repo: &Repo<'_, E>, commit_id: &str) -> SealError {
        match repo.head_commit() {
            Ok(Some(head)) if head == commit_id => {}
            Ok(head) => {
                error!(commit = commit_id, ?head, "HEAD moved past unsigned lock commit");
                return SealError::CriticalFailure(format!(
                    "Commit {} was not signed and HEAD has moved; \
                     manual intervention required",
                    short_hash(commit_id)
                ));
            }
            Err(error) => {
                error!(commit = commit_id, %error, "could not read HEAD before rollback");
                return SealError::CriticalFailure(format!(
                    "Commit {} was not signed and could not be rolled back; \
                     manual intervention required",
                    short_hash(commit_id)
                ));
            }
        }

        match repo.rollback_last_commit() {
            Ok(()) => {
                warn!(commit = commit_id, "rolled back unsigned lock commit");
                SealError::SigningPolicyViolation(
                    "Commit was not signed and has been rolled back. Check your GPG setup"
                        .to_string(),
                )
            }
            Err(error) => {
                error!(commit = commit_id, %error, "rollback of unsigned lock commit failed");
                SealError::CriticalFailure(format!(
                    "Commit {} was not signed and rollback failed; manual intervention required",
                    short_hash(commit_id)
                ))
            }
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
