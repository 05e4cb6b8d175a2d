// Unlock: prove the notebook is unchanged, that the caller is the lock owner,
// and (for signed locks) that the caller still holds the key that signed the
// lock commit. Only then is the lock cleared and committed.

use std::path::Path;

use gitseal_common::notebook::Notebook;
use gitseal_common::types::{utc_timestamp, Identity, SignatureMetadata};
use tracing::{debug, info, warn};

use crate::command::CommandExecutor;
use crate::git::{short_hash, Repo};
use crate::notebook::content_hash;
use crate::seal::{file_name, hold, read_signature, KeyDisclosure, SealError, SealService};

#[derive(Debug, Clone, PartialEq)]
pub struct UnlockOutcome {
    pub metadata: SignatureMetadata,
    pub message: String,
    pub signature_verification_passed: bool,
    pub was_gpg_signed: bool,
    /// The unlock commit, when auto-commit succeeded.
    pub commit_hash: Option<String>,
    pub warnings: Vec<String>,
    pub document: Notebook,
}

impl<E: CommandExecutor> SealService<E> {
    pub fn unlock(&self, path: &Path, document: &Notebook) -> Result<UnlockOutcome, SealError> {
        let signature = read_signature(document)?
            .ok_or_else(|| SealError::precondition("No signature found in notebook"))?;
        if !signature.locked {
            return Err(SealError::precondition("Notebook is not locked"));
        }
        if signature.commit_hash.trim().is_empty() {
            return Err(SealError::precondition(
                "No git commit hash found in signature metadata",
            ));
        }

        let repo = self.open_repo(path)?;
        let repo_lock = self.repo_locks.for_root(repo.root());
        let _guard = hold(&repo_lock);

        self.check_integrity(document, &signature)?;

        let mut warnings = Vec::new();
        let was_gpg_signed = signature.commit_signed;
        let mut signature_verification_passed = true;
        let verdict = if was_gpg_signed {
            match repo.verify_signature(&signature.commit_hash) {
                Ok(true) => "Notebook unlocked successfully after GPG signature verification",
                result => {
                    if let Err(error) = result {
                        warn!(commit = %signature.commit_hash, %error, "verify-commit did not run");
                    }
                    signature_verification_passed = false;
                    warnings.push("GPG signature verification failed".to_string());
                    "Notebook unlocked with warning: GPG signature verification failed"
                }
            }
        } else {
            let exists = repo
                .commit_info(&signature.commit_hash)
                .map_err(SealError::backend("Failed to look up lock commit"))?;
            if exists.is_none() {
                return Err(SealError::precondition(format!(
                    "Git commit {} not found in repository",
                    short_hash(&signature.commit_hash)
                )));
            }
            "Notebook unlocked successfully (was not GPG signed)"
        };
        let mut message = verdict.to_string();

        let identity = self.check_owner(&repo, &signature)?;
        if was_gpg_signed {
            self.check_key_possession(&repo, &signature)?;
        }

        let mut metadata = SignatureMetadata {
            locked: false,
            unlock_timestamp: Some(utc_timestamp()),
            unlocked_by_user_name: Some(identity.name.clone()),
            unlocked_by_user_email: Some(identity.email.clone()),
            unlock_commit_hash: None,
            ..signature
        };
        let unlocked = with_metadata(document, &metadata)?;
        self.store()
            .save(path, &unlocked)
            .map_err(SealError::persistence("Failed to save unlocked notebook"))?;

        let commit_message = format!("Unlocked: {}", file_name(path));
        let mut commit_hash = None;
        match repo.stage_and_commit(path, &commit_message) {
            Ok(committed) => {
                metadata.unlock_commit_hash = Some(committed.commit_id.clone());
                commit_hash = Some(committed.commit_id);
                let amended = self.record_unlock_commit(
                    &repo,
                    path,
                    document,
                    &metadata,
                    &commit_message,
                    &mut warnings,
                );
                if let Some(amended) = amended {
                    metadata.unlock_commit_hash = Some(amended.clone());
                    commit_hash = Some(amended);
                }
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "auto-commit after unlock failed");
                let warning = "Unlock was saved but could not be committed".to_string();
                message = format!("{message} (warning: {warning})");
                warnings.push(warning);
            }
        }

        let document = with_metadata(document, &metadata)?;
        info!(
            path = %path.display(),
            lock_commit = %metadata.commit_hash,
            unlock_commit = ?commit_hash,
            user = %identity,
            "notebook unlocked"
        );
        Ok(UnlockOutcome {
            metadata,
            message,
            signature_verification_passed,
            was_gpg_signed,
            commit_hash,
            warnings,
            document,
        })
    }

    /// The stored hash must match, allowing one retry with the lock record
    /// stripped.
    fn check_integrity(
        &self,
        document: &Notebook,
        signature: &SignatureMetadata,
    ) -> Result<(), SealError> {
        let hash_of = |doc: &Notebook| {
            content_hash(doc)
                .map_err(|error| SealError::precondition(format!("Invalid notebook: {error}")))
        };
        if hash_of(document)? == signature.content_hash {
            return Ok(());
        }
        if hash_of(&document.without_signature())? == signature.content_hash {
            return Ok(());
        }
        Err(SealError::IntegrityViolation)
    }

    fn check_owner(
        &self,
        repo: &Repo<'_, E>,
        signature: &SignatureMetadata,
    ) -> Result<Identity, SealError> {
        let identity = self.identity.resolve_uncached(Some(repo.root()))?.ok_or_else(|| {
            SealError::precondition(
                "Git user configuration not found. Please configure git user.name and user.email",
            )
        })?;
        if !signature.is_owned_by(&identity) {
            return Err(SealError::identity_mismatch(format!(
                "Only the user who locked this notebook can unlock it. Locked by {}, current user is {}",
                signature.owner(),
                identity
            )));
        }
        Ok(identity)
    }

    /// The caller must still hold, and be able to use, the key that signed
    /// the lock commit.
    fn check_key_possession(
        &self,
        repo: &Repo<'_, E>,
        signature: &SignatureMetadata,
    ) -> Result<(), SealError> {
        let disclosure = KeyDisclosure::after_identity_check(true);

        if !self.gpg.is_backend_available() || !self.gpg.has_any_signing_key() {
            return Err(SealError::key_possession(
                "GPG is not available or no secret keys are present",
            ));
        }
        let original = repo
            .signing_key_of_commit(&signature.commit_hash)
            .map_err(SealError::backend("Failed to read lock commit signature"))?
            .ok_or_else(|| {
                SealError::key_possession("Could not determine the key that signed the lock commit")
            })?;
        let configured = self.gpg.configured_signing_key_id(repo.root())?.ok_or_else(|| {
            SealError::key_possession("No signing key configured (git user.signingkey)")
        })?;
        if !self.gpg.configured_key_matches(&configured, &original) {
            return Err(SealError::key_possession(format!(
                "Configured signing key {} does not match key {} that signed the lock",
                disclosure.render(&configured),
                disclosure.render(&original)
            )));
        }
        if !self.gpg.can_sign_with_key(&configured) {
            return Err(SealError::key_possession(format!(
                "Signing key {} is not usable",
                disclosure.render(&configured)
            )));
        }
        match repo.verify_signature(&signature.commit_hash) {
            Ok(true) => {
                debug!(key = %disclosure.render(&original), "key possession verified");
                Ok(())
            }
            Ok(false) | Err(_) => Err(SealError::key_possession(
                "Lock commit signature could not be verified",
            )),
        }
    }

    /// Write the unlock commit hash into the notebook and fold it into the
    /// unlock commit. Returns the amended commit id.
    fn record_unlock_commit(
        &self,
        repo: &Repo<'_, E>,
        path: &Path,
        document: &Notebook,
        metadata: &SignatureMetadata,
        commit_message: &str,
        warnings: &mut Vec<String>,
    ) -> Option<String> {
        let recorded = match with_metadata(document, metadata) {
            Ok(recorded) => recorded,
            Err(error) => {
                warn!(%error, "could not encode unlock metadata");
                warnings.push("Unlock commit hash could not be recorded".to_string());
                return None;
            }
        };
        if let Err(error) = self.store().save(path, &recorded) {
            warn!(path = %path.display(), %error, "failed to save unlock commit hash");
            warnings.push("Unlock commit hash could not be saved".to_string());
            return None;
        }
        match repo.amend_with_file(path, commit_message) {
            Ok(amended) => Some(amended.commit_id),
            Err(error) => {
                warn!(path = %path.display(), %error, "failed to amend unlock commit");
                warnings.push(
                    "Unlock commit hash was saved but could not be amended into the commit"
                        .to_string(),
                );
                None
            }
        }
    }
}

fn with_metadata(document: &Notebook, metadata: &SignatureMetadata) -> Result<Notebook, SealError> {
    document
        .with_signature(metadata)
        .map_err(|error| SealError::precondition(format!("Invalid notebook: {error}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seal::fake::{service, FakeBackend, FakeKey, Workspace};
    use gitseal_common::protocol::api::ErrorCode;
    use serde_json::json;

    fn locked(backend: &FakeBackend, ws: &Workspace) -> Notebook {
        service(backend)
            .lock(&ws.notebook_path, &ws.read_notebook(), "Lock for review")
            .expect("lock should succeed")
            .document
    }

    #[test]
    fn owner_can_unlock_and_unlock_is_committed() {
        let ws = Workspace::new();
        let backend = FakeBackend::signing_ready();
        let document = locked(&backend, &ws);
        let lock_commit = backend.head().unwrap();

        let outcome = service(&backend).unlock(&ws.notebook_path, &document).unwrap();

        assert!(!outcome.metadata.locked);
        assert!(outcome.signature_verification_passed);
        assert!(outcome.was_gpg_signed);
        assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);
        assert_eq!(outcome.metadata.commit_hash, lock_commit);
        assert_eq!(outcome.metadata.unlocked_by_user_email.as_deref(), Some("ada@example.com"));
        assert!(outcome.metadata.unlock_timestamp.is_some());
        assert_eq!(outcome.commit_hash, backend.head());
        assert_eq!(outcome.metadata.unlock_commit_hash, backend.head());
        assert_eq!(backend.head_commit().unwrap().message, "Unlocked: analysis.ipynb");

        let on_disk = ws.read_notebook().signature().unwrap().unwrap();
        assert!(!on_disk.locked);
    }

    #[test]
    fn edited_content_is_an_integrity_violation() {
        let ws = Workspace::new();
        let backend = FakeBackend::signing_ready();
        let mut value = locked(&backend, &ws).into_value();
        value["cells"][1]["source"] = json!("# Findings (revised)");
        let tampered = Notebook::from_value(value).unwrap();

        let error = service(&backend).unlock(&ws.notebook_path, &tampered).unwrap_err();

        assert!(matches!(error, SealError::IntegrityViolation));
        assert_eq!(error.to_string(), "content modified since lock");
        assert!(!backend.ran("verify-commit"));
    }

    #[test]
    fn rerun_outputs_metadata_do_not_break_integrity() {
        let ws = Workspace::new();
        let backend = FakeBackend::signing_ready();
        let mut value = locked(&backend, &ws).into_value();
        value["cells"][0]["execution_count"] = json!(7);
        value["cells"][0]["outputs"][0]["execution_count"] = json!(7);
        value["cells"][0]["outputs"][0]["metadata"] = json!({"scrolled": true});
        let rerun = Notebook::from_value(value).unwrap();

        assert!(service(&backend).unlock(&ws.notebook_path, &rerun).is_ok());
    }

    #[test]
    fn different_identity_is_refused_before_key_checks() {
        let ws = Workspace::new();
        let backend = FakeBackend::signing_ready();
        let document = locked(&backend, &ws);
        backend.become_user("Grace Hopper", "grace@example.com");
        let head = backend.head();

        let error = service(&backend).unlock(&ws.notebook_path, &document).unwrap_err();

        assert_eq!(error.code(), ErrorCode::IdentityMismatch);
        let message = error.to_string();
        assert!(message.contains("Ada Lovelace <ada@example.com>"), "{message}");
        assert!(message.contains("Grace Hopper <grace@example.com>"), "{message}");
        assert!(!message.contains("CCCCDDDD"));
        assert!(!backend.ran("%GK"));
        assert_eq!(backend.head(), head);
    }

    #[test]
    fn long_lived_service_rereads_identity_for_unlock() {
        let ws = Workspace::new();
        let backend = FakeBackend::signing_ready();
        let seal = service(&backend);
        let document = seal
            .lock(&ws.notebook_path, &ws.read_notebook(), "Lock for review")
            .expect("lock should succeed")
            .document;

        backend.become_user("Grace Hopper", "grace@example.com");
        let error = seal.unlock(&ws.notebook_path, &document).unwrap_err();

        assert_eq!(error.code(), ErrorCode::IdentityMismatch);
        assert!(error.to_string().contains("Grace Hopper <grace@example.com>"));
    }

    #[test]
    fn same_name_different_email_is_refused() {
        let ws = Workspace::new();
        let backend = FakeBackend::signing_ready();
        let document = locked(&backend, &ws);
        backend.become_user("Ada Lovelace", "ada@elsewhere.org");

        let error = service(&backend).unlock(&ws.notebook_path, &document).unwrap_err();
        assert_eq!(error.code(), ErrorCode::IdentityMismatch);
    }

    #[test]
    fn removed_key_fails_key_possession_not_identity() {
        let ws = Workspace::new();
        let backend = FakeBackend::signing_ready();
        let document = locked(&backend, &ws);
        backend.with(|state| state.secret_keys.clear());

        let error = service(&backend).unlock(&ws.notebook_path, &document).unwrap_err();

        assert_eq!(error.code(), ErrorCode::KeyPossessionFailed);
        assert!(ws.read_notebook().signature().unwrap().unwrap().locked);
    }

    #[test]
    fn different_configured_key_is_refused() {
        let ws = Workspace::new();
        let backend = FakeBackend::signing_ready();
        let document = locked(&backend, &ws);
        backend.with(|state| {
            state.secret_keys.push(FakeKey {
                key_id: "9999888877776666".into(),
                fingerprint: "0000000000000000000000009999888877776666".into(),
                uid: "Ada Lovelace <ada@work.example.com>".into(),
            });
            state.local_config.insert("user.signingkey".into(), "9999888877776666".into());
        });

        let error = service(&backend).unlock(&ws.notebook_path, &document).unwrap_err();

        assert_eq!(error.code(), ErrorCode::KeyPossessionFailed);
        let message = error.to_string();
        assert!(message.contains("77776666") && message.contains("CCCCDDDD"), "{message}");
    }

    #[test]
    fn key_configured_by_email_matches_its_primary() {
        let ws = Workspace::new();
        let backend = FakeBackend::signing_ready();
        let document = locked(&backend, &ws);
        backend.with(|state| {
            state.local_config.insert("user.signingkey".into(), "ada@example.com".into());
        });

        assert!(service(&backend).unlock(&ws.notebook_path, &document).is_ok());
    }

    #[test]
    fn unusable_key_is_refused() {
        let ws = Workspace::new();
        let backend = FakeBackend::signing_ready();
        let document = locked(&backend, &ws);
        backend.with(|state| state.signing_works = false);

        let error = service(&backend).unlock(&ws.notebook_path, &document).unwrap_err();
        assert_eq!(error.code(), ErrorCode::KeyPossessionFailed);
        assert!(error.to_string().contains("not usable"));
    }

    #[test]
    fn failed_verification_blocks_signed_unlock() {
        let ws = Workspace::new();
        let backend = FakeBackend::signing_ready();
        let document = locked(&backend, &ws);
        backend.with(|state| state.verify_passes = false);

        let error = service(&backend).unlock(&ws.notebook_path, &document).unwrap_err();
        assert_eq!(error.code(), ErrorCode::KeyPossessionFailed);
        assert!(error.to_string().contains("could not be verified"));
    }

    fn unsigned_lock(backend: &FakeBackend, ws: &Workspace) -> Notebook {
        let base = ws.read_notebook();
        let commit = backend.head().unwrap();
        let metadata = SignatureMetadata {
            locked: true,
            commit_hash: commit,
            commit_signed: false,
            user_name: "Ada Lovelace".into(),
            user_email: "ada@example.com".into(),
            timestamp: "2026-01-01T00:00:00Z".into(),
            content_hash: content_hash(&base).unwrap(),
            commit_message: "legacy lock".into(),
            gpg_available: false,
            unlock_timestamp: None,
            unlocked_by_user_name: None,
            unlocked_by_user_email: None,
            unlock_commit_hash: None,
        };
        base.with_signature(&metadata).unwrap()
    }

    #[test]
    fn unsigned_lock_skips_key_checks() {
        let ws = Workspace::new();
        let backend = FakeBackend::signing_ready();
        let document = unsigned_lock(&backend, &ws);
        backend.with(|state| state.secret_keys.clear());

        let outcome = service(&backend).unlock(&ws.notebook_path, &document).unwrap();

        assert!(!outcome.was_gpg_signed);
        assert!(outcome.signature_verification_passed);
        assert_eq!(outcome.message, "Notebook unlocked successfully (was not GPG signed)");
        assert!(!backend.ran("--list-secret-keys"));
    }

    #[test]
    fn unsigned_lock_with_missing_commit_is_refused() {
        let ws = Workspace::new();
        let backend = FakeBackend::signing_ready();
        let mut value = unsigned_lock(&backend, &ws).into_value();
        value["metadata"]["lock-signature"]["commit_hash"] = json!("f".repeat(40));
        let document = Notebook::from_value(value).unwrap();

        let error = service(&backend).unlock(&ws.notebook_path, &document).unwrap_err();
        assert_eq!(error.code(), ErrorCode::PreconditionFailed);
        assert!(error.to_string().contains("not found"));
    }

    #[test]
    fn auto_commit_failure_is_a_warning() {
        let ws = Workspace::new();
        let backend = FakeBackend::signing_ready();
        let document = locked(&backend, &ws);
        backend.with(|state| state.fail_commit = true);

        let outcome = service(&backend).unlock(&ws.notebook_path, &document).unwrap();

        assert!(!outcome.metadata.locked);
        assert_eq!(outcome.commit_hash, None);
        assert_eq!(outcome.metadata.unlock_commit_hash, None);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.message.contains("could not be committed"));
        assert!(!ws.read_notebook().signature().unwrap().unwrap().locked);
    }

    #[test]
    fn unlocking_requires_a_lock() {
        let ws = Workspace::new();
        let backend = FakeBackend::signing_ready();
        let seal = service(&backend);

        let error = seal.unlock(&ws.notebook_path, &ws.read_notebook()).unwrap_err();
        assert_eq!(error.to_string(), "No signature found in notebook");

        let mut value = locked(&backend, &ws).into_value();
        value["metadata"]["lock-signature"]["locked"] = json!(false);
        let error = seal.unlock(&ws.notebook_path, &Notebook::from_value(value).unwrap()).unwrap_err();
        assert_eq!(error.to_string(), "Notebook is not locked");
    }

    #[test]
    fn malformed_lock_record_is_a_precondition_error() {
        let ws = Workspace::new();
        let backend = FakeBackend::signing_ready();
        let mut value = ws.read_notebook().into_value();
        value["metadata"]["lock-signature"] = json!({"locked": true});
        let document = Notebook::from_value(value).unwrap();

        let error = service(&backend).unlock(&ws.notebook_path, &document).unwrap_err();
        assert_eq!(error.code(), ErrorCode::PreconditionFailed);
        assert!(error.to_string().contains("malformed"));
    }
}
