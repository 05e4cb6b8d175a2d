// Lock/unlock protocol for notebooks, with git commit signing as the root of
// trust.
//
// `SealService` owns the leaf services (git, gpg, identity, notebook store)
// and serializes mutating flows per repository. Every flow takes the caller's
// document by reference and returns new values; nothing is mutated in place.

pub mod commit;
pub mod error;
pub mod lock;
pub mod status;
pub mod unlock;

#[cfg(test)]
pub(crate) mod fake;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use gitseal_common::notebook::Notebook;
use gitseal_common::types::{Identity, RepositoryStatus, SignatureMetadata};

use crate::command::{CommandExecutor, CommandTimeouts, ProcessCommandExecutor};
use crate::config::CommandsConfig;
use crate::git::{GitError, GitGateway, Repo};
use crate::identity::IdentityResolver;
use crate::notebook::{FsNotebookStore, NotebookStore};
use crate::signing::{normalize_key_id, GpgProbe};

pub use commit::{CommitReport, SignatureRemoval};
pub use error::SealError;
pub use lock::LockOutcome;
pub use status::StatusReport;
pub use unlock::UnlockOutcome;

pub struct SealService<E = ProcessCommandExecutor> {
    git: GitGateway<E>,
    gpg: GpgProbe<E>,
    identity: IdentityResolver<E>,
    store: Box<dyn NotebookStore>,
    repo_locks: RepoLocks,
}

impl SealService<ProcessCommandExecutor> {
    pub fn new(commands: &CommandsConfig) -> Self {
        Self::with_executor(ProcessCommandExecutor, commands)
    }
}

impl<E: CommandExecutor + Clone> SealService<E> {
    /// All leaves share `executor`, programs and timeouts from `commands`.
    pub fn with_executor(executor: E, commands: &CommandsConfig) -> Self {
        let timeouts = commands.timeouts();
        Self::from_parts(
            GitGateway::with_executor(executor.clone())
                .with_program(&commands.git_program)
                .with_timeouts(timeouts),
            GpgProbe::with_executor(executor.clone())
                .with_programs(&commands.gpg_program, &commands.git_program)
                .with_timeouts(timeouts),
            IdentityResolver::with_executor(executor)
                .with_program(&commands.git_program)
                .with_timeouts(timeouts),
            Box::new(FsNotebookStore),
        )
    }
}

impl<E: CommandExecutor> SealService<E> {
    pub fn from_parts(
        git: GitGateway<E>,
        gpg: GpgProbe<E>,
        identity: IdentityResolver<E>,
        store: Box<dyn NotebookStore>,
    ) -> Self {
        Self { git, gpg, identity, store, repo_locks: RepoLocks::default() }
    }

    pub fn with_store(mut self, store: Box<dyn NotebookStore>) -> Self {
        self.store = store;
        self
    }

    pub fn git(&self) -> &GitGateway<E> {
        &self.git
    }

    pub fn gpg(&self) -> &GpgProbe<E> {
        &self.gpg
    }

    pub fn identity(&self) -> &IdentityResolver<E> {
        &self.identity
    }

    pub fn timeouts(&self) -> CommandTimeouts {
        self.git.timeouts()
    }

    /// Status of the repository containing `path`.
    pub fn repository_status(&self, path: &Path) -> Result<RepositoryStatus, SealError> {
        self.git.repository_status(path).map_err(SealError::backend("failed to read repository status"))
    }

    /// Operator identity from global git config. `refresh` drops cached
    /// identities and repository roots first.
    pub fn current_identity(&self, refresh: bool) -> Result<Option<Identity>, SealError> {
        if refresh {
            self.identity.invalidate();
            self.git.clear_cache();
        }
        Ok(self.identity.current_identity(None)?)
    }

    fn store(&self) -> &dyn NotebookStore {
        self.store.as_ref()
    }

    fn open_repo(&self, path: &Path) -> Result<Repo<'_, E>, SealError> {
        match self.git.open(path) {
            Ok(repo) => Ok(repo),
            Err(GitError::NotARepository { .. }) => {
                Err(SealError::precondition("Notebook is not in a git repository"))
            }
            Err(error) => Err(SealError::backend("failed to open repository")(error)),
        }
    }
}

// ── Shared helpers ─────────────────────────────────────────────────

/// Lock record of a document, with malformed records reported as a
/// precondition failure.
fn read_signature(document: &Notebook) -> Result<Option<SignatureMetadata>, SealError> {
    document
        .signature()
        .map_err(|error| SealError::precondition(format!("lock metadata is malformed: {error}")))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Per-repository mutexes for the mutating flows.
#[derive(Debug, Default)]
pub(crate) struct RepoLocks {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl RepoLocks {
    pub(crate) fn for_root(&self, root: &Path) -> Arc<Mutex<()>> {
        let key = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(key).or_default().clone()
    }
}

pub(crate) fn hold(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
    lock.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The only way key material reaches a caller-facing message. Key IDs are
/// shown (last 8 characters) only once the caller's identity matched the lock
/// owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyDisclosure {
    identity_confirmed: bool,
}

impl KeyDisclosure {
    pub fn after_identity_check(identity_confirmed: bool) -> Self {
        Self { identity_confirmed }
    }

    pub fn render(&self, key: &str) -> String {
        if !self.identity_confirmed {
            return "[redacted]".to_string();
        }
        let normalized = normalize_key_id(key);
        let chars: Vec<char> = normalized.chars().collect();
        chars[chars.len().saturating_sub(8)..].iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disclosure_shows_key_suffix_only_after_identity_confirmed() {
        let key = "0x1111222233334444AAAABBBBCCCCDDDD";
        assert_eq!(KeyDisclosure::after_identity_check(true).render(key), "CCCCDDDD");
        assert_eq!(KeyDisclosure::after_identity_check(false).render(key), "[redacted]");
        assert_eq!(KeyDisclosure::after_identity_check(true).render("abc"), "ABC");
    }

    #[test]
    fn repo_locks_are_shared_per_root() {
        let tmp = tempfile::tempdir().expect("tempdir should be created");
        let locks = RepoLocks::default();
        let a = locks.for_root(tmp.path());
        let b = locks.for_root(&tmp.path().join("."));
        let other = locks.for_root(Path::new("/definitely/not/here"));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &other));
    }

    #[test]
    fn repository_status_outside_repository_is_not_an_error() {
        let backend = fake::FakeBackend::signing_ready();
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let status = fake::service(&backend).repository_status(dir.path()).unwrap();
        assert!(!status.is_repo);
    }

    #[test]
    fn repository_status_reports_signing_config() {
        let ws = fake::Workspace::new();
        let backend = fake::FakeBackend::signing_ready();
        let status = fake::service(&backend).repository_status(&ws.notebook_path).unwrap();
        assert!(status.is_repo);
        assert_eq!(status.current_branch.as_deref(), Some("main"));
        assert!(status.signing_configured);
        assert_eq!(status.signing_key.as_deref(), Some(fake::ADA_KEY));
        assert!(!status.is_dirty);
    }

    #[test]
    fn refresh_rereads_identity() {
        let backend = fake::FakeBackend::signing_ready();
        backend.with(|state| {
            state.global_config.insert("user.name".into(), "Ada".into());
            state.global_config.insert("user.email".into(), "ada@example.com".into());
        });
        let seal = fake::service(&backend);
        assert_eq!(seal.current_identity(false).unwrap().unwrap().name, "Ada");

        backend.with(|state| {
            state.global_config.insert("user.name".into(), "Ada L".into());
        });
        assert_eq!(seal.current_identity(false).unwrap().unwrap().name, "Ada");
        assert_eq!(seal.current_identity(true).unwrap().unwrap().name, "Ada L");
    }

    #[test]
    fn file_name_falls_back_to_display() {
        assert_eq!(file_name(Path::new("/repo/analysis.ipynb")), "analysis.ipynb");
        assert_eq!(file_name(Path::new("/")), "/");
    }
}
