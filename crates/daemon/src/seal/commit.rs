// Plain commits of a notebook, and explicit removal of a lock record.

use std::path::Path;

use gitseal_common::notebook::Notebook;
use gitseal_common::types::{utc_timestamp, SignatureMetadata};
use tracing::{info, warn};

use crate::command::CommandExecutor;
use crate::git::short_hash;
use crate::notebook::content_hash;
use crate::seal::{hold, read_signature, SealError, SealService};

#[derive(Debug, Clone, PartialEq)]
pub struct CommitReport {
    pub commit_hash: String,
    pub signed: bool,
    pub message: String,
    /// Refreshed lock record, when the notebook carries one.
    pub metadata: Option<SignatureMetadata>,
    pub warnings: Vec<String>,
    pub document: Notebook,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignatureRemoval {
    pub message: String,
    pub document: Notebook,
}

impl<E: CommandExecutor> SealService<E> {
    /// Save and commit the notebook as-is. A locked notebook is refused; an
    /// unlocked lock record has its commit fields refreshed and is amended
    /// into the same commit.
    pub fn commit(
        &self,
        path: &Path,
        document: &Notebook,
        commit_message: &str,
    ) -> Result<CommitReport, SealError> {
        if commit_message.trim().is_empty() {
            return Err(SealError::precondition("A commit message is required"));
        }
        document
            .validate()
            .map_err(|error| SealError::precondition(format!("Invalid notebook: {error}")))?;
        let existing = read_signature(document)?;
        if existing.as_ref().is_some_and(|signature| signature.locked) {
            return Err(SealError::precondition(
                "Notebook is locked; unlock it before committing changes",
            ));
        }

        let repo = self.open_repo(path)?;
        let repo_lock = self.repo_locks.for_root(repo.root());
        let _guard = hold(&repo_lock);

        let identity = self.identity.resolve_uncached(Some(repo.root()))?.ok_or_else(|| {
            SealError::precondition(
                "Git user configuration not found. Please configure git user.name and user.email",
            )
        })?;

        self.store().save(path, document).map_err(SealError::persistence("Failed to save notebook"))?;
        let committed = repo
            .stage_and_commit(path, commit_message)
            .map_err(SealError::commit_failed("Failed to commit notebook"))?;

        let mut warnings = Vec::new();
        if committed.signing_fell_back {
            warnings.push("Signing failed; the commit was created without a signature".to_string());
        }
        let mut commit_hash = committed.commit_id;
        let mut signed = committed.signed;
        let mut document = document.clone();

        let metadata = match existing {
            None => None,
            Some(existing) => {
                let info = repo
                    .commit_info(&commit_hash)
                    .map_err(SealError::commit_failed("Failed to inspect commit"))?;
                let hash = content_hash(&document)
                    .map_err(|error| SealError::precondition(format!("Invalid notebook: {error}")))?;
                let mut metadata = match info {
                    Some(info) => SignatureMetadata {
                        commit_hash: info.hash,
                        commit_signed: info.signed,
                        user_name: info.author_name,
                        user_email: info.author_email,
                        timestamp: info.timestamp,
                        content_hash: hash,
                        commit_message: info.message,
                        ..existing
                    },
                    None => SignatureMetadata {
                        commit_hash: commit_hash.clone(),
                        commit_signed: signed,
                        user_name: identity.name.clone(),
                        user_email: identity.email.clone(),
                        timestamp: utc_timestamp(),
                        content_hash: hash,
                        commit_message: commit_message.to_string(),
                        ..existing
                    },
                };
                document = document
                    .with_signature(&metadata)
                    .map_err(|error| SealError::precondition(format!("Invalid notebook: {error}")))?;

                match self.store().save(path, &document) {
                    Err(error) => {
                        warn!(path = %path.display(), %error, "failed to save refreshed lock metadata");
                        warnings.push("Commit succeeded but lock metadata could not be saved".to_string());
                    }
                    Ok(()) => match repo.amend_with_file(path, commit_message) {
                        Ok(amended) => {
                            commit_hash = amended.commit_id;
                            signed = amended.signed;
                            metadata.commit_hash = commit_hash.clone();
                            metadata.commit_signed = signed;
                            document = document.with_signature(&metadata).map_err(|error| {
                                SealError::precondition(format!("Invalid notebook: {error}"))
                            })?;
                        }
                        Err(error) => {
                            warn!(path = %path.display(), %error, "failed to amend commit with metadata");
                            warnings.push(
                                "Lock metadata was saved but could not be amended into the commit"
                                    .to_string(),
                            );
                        }
                    },
                }
                Some(metadata)
            }
        };

        info!(path = %path.display(), commit = %commit_hash, signed, "notebook committed");
        Ok(CommitReport {
            message: format!(
                "Notebook committed successfully {} ({})",
                if signed { "with GPG signature" } else { "without GPG signature" },
                short_hash(&commit_hash)
            ),
            commit_hash,
            signed,
            metadata,
            warnings,
            document,
        })
    }

    /// Drop the lock record from a notebook that is not locked.
    pub fn remove_signature(
        &self,
        path: &Path,
        document: &Notebook,
    ) -> Result<SignatureRemoval, SealError> {
        if read_signature(document)?.is_some_and(|signature| signature.locked) {
            return Err(SealError::precondition(
                "Notebook is locked; unlock it before removing its signature",
            ));
        }
        let cleaned = document.without_signature();
        self.store()
            .save(path, &cleaned)
            .map_err(SealError::persistence("Failed to save notebook"))?;
        info!(path = %path.display(), "lock record removed");
        Ok(SignatureRemoval {
            message: "Signature metadata removed".to_string(),
            document: cleaned,
        })
    }
}
