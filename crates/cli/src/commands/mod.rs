// CLI subcommand dispatch.

use std::path::Path;

use anyhow::Context;
use clap::Subcommand;
use gitseal_common::notebook::Notebook;
use gitseal_daemon::config::CommandsConfig;
use gitseal_daemon::notebook::{FsNotebookStore, NotebookStore};
use gitseal_daemon::seal::SealService;

pub mod commit;
pub mod lock;
pub mod remove_signature;
pub mod repo_status;
pub mod status;
pub mod unlock;
pub mod whoami;

#[derive(Subcommand)]
pub enum Command {
    /// Commit a notebook with a signed commit and mark it locked
    Lock(lock::LockArgs),
    /// Verify ownership and key possession, then clear the lock
    Unlock(unlock::UnlockArgs),
    /// Show whether a notebook is locked and its signature verifies
    Status(status::StatusArgs),
    /// Commit a notebook without changing its lock state
    Commit(commit::CommitArgs),
    /// Drop the lock record from an unlocked notebook
    RemoveSignature(remove_signature::RemoveSignatureArgs),
    /// Show repository and signing configuration for a path
    RepoStatus(repo_status::RepoStatusArgs),
    /// Show the git identity locks are recorded under
    Whoami(whoami::WhoamiArgs),
}

impl Command {
    pub fn json_flag(&self) -> bool {
        match self {
            Self::Lock(args) => args.json,
            Self::Unlock(args) => args.json,
            Self::Status(args) => args.json,
            Self::Commit(args) => args.json,
            Self::RemoveSignature(args) => args.json,
            Self::RepoStatus(args) => args.json,
            Self::Whoami(args) => args.json,
        }
    }
}

pub fn run(cmd: Command, session: &Session) -> anyhow::Result<()> {
    match cmd {
        Command::Lock(args) => lock::run(args, session),
        Command::Unlock(args) => unlock::run(args, session),
        Command::Status(args) => status::run(args, session),
        Command::Commit(args) => commit::run(args, session),
        Command::RemoveSignature(args) => remove_signature::run(args, session),
        Command::RepoStatus(args) => repo_status::run(args, session),
        Command::Whoami(args) => whoami::run(args, session),
    }
}

/// The coordinator plus the store used to read and write back notebooks.
pub struct Session {
    seal: SealService,
    store: FsNotebookStore,
}

impl Session {
    pub fn new(commands: &CommandsConfig) -> Self {
        Self { seal: SealService::new(commands), store: FsNotebookStore }
    }

    pub fn seal(&self) -> &SealService {
        &self.seal
    }

    pub fn read_notebook(&self, path: &Path) -> anyhow::Result<Notebook> {
        self.store.load(path).with_context(|| format!("failed to read notebook {}", path.display()))
    }

    pub fn write_notebook(&self, path: &Path, document: &Notebook) -> anyhow::Result<()> {
        self.store
            .save(path, document)
            .with_context(|| format!("failed to write notebook {}", path.display()))
    }
}
