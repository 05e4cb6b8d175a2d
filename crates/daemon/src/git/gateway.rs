use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use gitseal_common::types::{CommitInfo, ConfigSource, RepositoryStatus};
use tracing::{debug, info, warn};

use crate::command::{
    execute_checked, execute_raw, CommandError, CommandExecutor, CommandOptions,
    CommandTimeouts, ProcessCommandExecutor,
};
use crate::git::config::{self, ConfigScope};
use crate::git::discovery::RepoRootCache;
use crate::git::signature::SignatureStatus;

const FIELD_SEPARATOR: char = '\u{1f}';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitError {
    NotARepository { path: PathBuf },
    OutsideRepository { path: PathBuf, root: PathBuf },
    Command(CommandError),
    UnexpectedOutput { command: String, output: String },
}

impl Display for GitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            GitError::NotARepository { path } => {
                write!(f, "`{}` is not inside a git repository", path.display())
            }
            GitError::OutsideRepository { path, root } => write!(
                f,
                "`{}` is outside the repository rooted at `{}`",
                path.display(),
                root.display()
            ),
            GitError::Command(error) => write!(f, "{error}"),
            GitError::UnexpectedOutput { command, output } => {
                write!(f, "unexpected output from `{command}`: {}", output.trim())
            }
        }
    }
}

impl Error for GitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            GitError::Command(error) => Some(error),
            _ => None,
        }
    }
}

impl From<CommandError> for GitError {
    fn from(error: CommandError) -> Self {
        GitError::Command(error)
    }
}

/// Result of creating (or amending) a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub commit_id: String,
    /// Whether git reports the new commit as signed.
    pub signed: bool,
    /// Signing was configured but failed, so the commit was made unsigned.
    pub signing_fell_back: bool,
}

/// Whether and where commit signing is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningConfig {
    pub configured: bool,
    pub key: Option<String>,
    pub source: ConfigSource,
}

#[derive(Debug)]
pub struct GitGateway<E = ProcessCommandExecutor> {
    executor: E,
    program: String,
    timeouts: CommandTimeouts,
    roots: RepoRootCache,
}

impl GitGateway<ProcessCommandExecutor> {
    pub fn new() -> Self {
        Self::with_executor(ProcessCommandExecutor)
    }
}

impl Default for GitGateway<ProcessCommandExecutor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: CommandExecutor> GitGateway<E> {
    pub fn with_executor(executor: E) -> Self {
        Self {
            executor,
            program: "git".to_string(),
            timeouts: CommandTimeouts::default(),
            roots: RepoRootCache::default(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_timeouts(mut self, timeouts: CommandTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn timeouts(&self) -> CommandTimeouts {
        self.timeouts
    }

    pub fn is_inside_repository(&self, path: &Path) -> bool {
        self.roots.lookup(path).is_some()
    }

    pub fn open(&self, path: &Path) -> Result<Repo<'_, E>, GitError> {
        let root = self
            .roots
            .lookup(path)
            .ok_or_else(|| GitError::NotARepository { path: path.to_path_buf() })?;
        Ok(Repo { gateway: self, root })
    }

    pub fn clear_cache(&self) {
        self.roots.clear();
    }

    /// Status for the repository containing `path`; a non-repository path
    /// yields `is_repo: false` rather than an error.
    pub fn repository_status(&self, path: &Path) -> Result<RepositoryStatus, GitError> {
        match self.open(path) {
            Ok(repo) => repo.status(),
            Err(GitError::NotARepository { .. }) => Ok(RepositoryStatus::not_a_repository()),
            Err(error) => Err(error),
        }
    }
}

/// Handle on one discovered repository. All commands run from its root.
#[derive(Debug)]
pub struct Repo<'a, E> {
    gateway: &'a GitGateway<E>,
    root: PathBuf,
}

impl<E: CommandExecutor> Repo<'_, E> {
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `file` relative to the repository root, with `/` separators.
    pub fn relative_path(&self, file: &Path) -> Result<String, GitError> {
        let absolute = std::path::absolute(file)
            .map_err(|_| GitError::NotARepository { path: file.to_path_buf() })?;
        let relative = absolute.strip_prefix(&self.root).map_err(|_| {
            GitError::OutsideRepository { path: file.to_path_buf(), root: self.root.clone() }
        })?;
        let parts: Vec<_> =
            relative.components().map(|part| part.as_os_str().to_string_lossy()).collect();
        Ok(parts.join("/"))
    }

    // ── Writes ─────────────────────────────────────────────────────

    /// Stage `file` and commit it. Signs when signing is configured; if the
    /// signed attempt fails the commit is made once more without signing.
    pub fn stage_and_commit(&self, file: &Path, message: &str) -> Result<CommitOutcome, GitError> {
        self.stage(file)?;
        self.commit(message, false)
    }

    /// Re-stage `file` and amend HEAD, with the same signing policy.
    pub fn amend_with_file(&self, file: &Path, message: &str) -> Result<CommitOutcome, GitError> {
        self.stage(file)?;
        self.commit(message, true)
    }

    /// Drop HEAD, keeping the working tree. A root commit is removed by
    /// deleting the branch ref.
    pub fn rollback_last_commit(&self) -> Result<(), GitError> {
        let has_parent = execute_raw(
            self.executor(),
            self.program(),
            args(["rev-parse", "--verify", "--quiet", "HEAD~1"]),
            &self.root,
            &self.query(),
        )?
        .success;

        if has_parent {
            self.run(args(["reset", "--mixed", "--quiet", "HEAD~1"]), self.write())?;
        } else {
            self.run(args(["update-ref", "-d", "HEAD"]), self.write())?;
        }
        info!(root = %self.root.display(), has_parent, "rolled back last commit");
        Ok(())
    }

    fn stage(&self, file: &Path) -> Result<(), GitError> {
        let relative = self.relative_path(file)?;
        self.run(vec!["add".to_string(), "--".to_string(), relative], self.write())?;
        Ok(())
    }

    fn commit(&self, message: &str, amend: bool) -> Result<CommitOutcome, GitError> {
        let signing = self.signing_config()?;
        let mut signing_fell_back = false;

        if signing.configured {
            let mut signed_args = args(["commit"]);
            if amend {
                signed_args.push("--amend".to_string());
            }
            signed_args.extend(["-S".to_string(), "-m".to_string(), message.to_string()]);

            match self.run(signed_args, self.write()) {
                Ok(_) => return self.finish_commit(false),
                Err(GitError::Command(error)) => {
                    warn!(
                        command = error.command(),
                        diagnostic = error.diagnostic(),
                        "signed commit failed, retrying without signature"
                    );
                    signing_fell_back = true;
                }
                Err(error) => return Err(error),
            }
        }

        let mut unsigned_args = args(["-c", "commit.gpgsign=false", "commit"]);
        if amend {
            unsigned_args.push("--amend".to_string());
        }
        unsigned_args.extend(["-m".to_string(), message.to_string()]);
        self.run(unsigned_args, self.write())?;
        self.finish_commit(signing_fell_back)
    }

    fn finish_commit(&self, signing_fell_back: bool) -> Result<CommitOutcome, GitError> {
        let commit_id = self.head_commit()?.ok_or_else(|| GitError::UnexpectedOutput {
            command: "git rev-parse --verify HEAD".to_string(),
            output: "no HEAD after commit".to_string(),
        })?;
        let signed = self.signature_status(&commit_id)?.counts_as_signed();
        info!(commit = %commit_id, signed, signing_fell_back, "created commit");
        Ok(CommitOutcome { commit_id, signed, signing_fell_back })
    }

    // ── Reads ──────────────────────────────────────────────────────

    pub fn head_commit(&self) -> Result<Option<String>, GitError> {
        let result = execute_raw(
            self.executor(),
            self.program(),
            args(["rev-parse", "--verify", "--quiet", "HEAD"]),
            &self.root,
            &self.query(),
        )?;
        let id = result.stdout.trim();
        Ok((result.success && !id.is_empty()).then(|| id.to_string()))
    }

    pub fn commit_exists(&self, id: &str) -> Result<bool, GitError> {
        let result = execute_raw(
            self.executor(),
            self.program(),
            vec!["cat-file".to_string(), "-e".to_string(), format!("{id}^{{commit}}")],
            &self.root,
            &self.query(),
        )?;
        Ok(result.success)
    }

    /// Commit metadata, or `None` when `id` names no commit.
    pub fn commit_info(&self, id: &str) -> Result<Option<CommitInfo>, GitError> {
        if !self.commit_exists(id)? {
            return Ok(None);
        }
        let output = self.run(
            vec![
                "show".to_string(),
                "-s".to_string(),
                "--format=%H%x1f%an%x1f%ae%x1f%cI%x1f%G?%x1f%B".to_string(),
                id.to_string(),
            ],
            self.gateway.timeouts.query,
        )?;
        parse_commit_info(&output).map(Some).ok_or_else(|| GitError::UnexpectedOutput {
            command: format!("git show -s {id}"),
            output,
        })
    }

    pub fn signature_status(&self, id: &str) -> Result<SignatureStatus, GitError> {
        let output = self.run(
            vec!["show".to_string(), "-s".to_string(), "--format=%G?".to_string(), id.to_string()],
            self.gateway.timeouts.query,
        )?;
        Ok(SignatureStatus::from_show_output(&output))
    }

    /// `git verify-commit`. A failed verification is `Ok(false)`; only spawn
    /// failures and timeouts are errors.
    pub fn verify_signature(&self, id: &str) -> Result<bool, GitError> {
        let result = execute_raw(
            self.executor(),
            self.program(),
            vec!["verify-commit".to_string(), id.to_string()],
            &self.root,
            &CommandOptions::with_timeout(self.gateway.timeouts.verify),
        )?;
        if !result.success {
            debug!(commit = id, diagnostic = result.diagnostic().trim(), "verify-commit failed");
        }
        Ok(result.success)
    }

    /// Key ID that signed `id` (`%GK`), falling back to the fingerprint (`%GF`).
    pub fn signing_key_of_commit(&self, id: &str) -> Result<Option<String>, GitError> {
        let output = self.run(
            vec![
                "show".to_string(),
                "-s".to_string(),
                "--format=%GK%x1f%GF".to_string(),
                id.to_string(),
            ],
            self.gateway.timeouts.query,
        )?;
        let line = output.lines().rev().find(|line| line.contains(FIELD_SEPARATOR)).unwrap_or("");
        let (key, fingerprint) = line.split_once(FIELD_SEPARATOR).unwrap_or(("", ""));
        let chosen = [key.trim(), fingerprint.trim()].into_iter().find(|value| !value.is_empty());
        Ok(chosen.map(str::to_string))
    }

    pub fn config_value(&self, scope: ConfigScope, key: &str) -> Result<Option<String>, GitError> {
        Ok(config::read_value(
            self.executor(),
            self.program(),
            &self.root,
            scope,
            key,
            self.gateway.timeouts.query,
        )?)
    }

    /// `user.signingkey` (local, then global), else `commit.gpgsign` (local,
    /// then global).
    pub fn signing_config(&self) -> Result<SigningConfig, GitError> {
        for scope in [ConfigScope::Local, ConfigScope::Global] {
            if let Some(key) = self.config_value(scope, "user.signingkey")? {
                return Ok(SigningConfig { configured: true, key: Some(key), source: scope.source() });
            }
        }
        for scope in [ConfigScope::Local, ConfigScope::Global] {
            if let Some(raw) = self.config_value(scope, "commit.gpgsign")? {
                // The nearest scope wins, including an explicit `false`.
                if !config::parse_bool(&raw) {
                    break;
                }
                return Ok(SigningConfig { configured: true, key: None, source: scope.source() });
            }
        }
        Ok(SigningConfig { configured: false, key: None, source: ConfigSource::None })
    }

    pub fn status(&self) -> Result<RepositoryStatus, GitError> {
        let branch = self
            .run(args(["rev-parse", "--abbrev-ref", "HEAD"]), self.gateway.timeouts.query)
            .ok()
            .map(|out| out.trim().to_string())
            .filter(|branch| !branch.is_empty());
        let porcelain = self.run(args(["status", "--porcelain"]), self.gateway.timeouts.query)?;
        let (is_dirty, untracked_count) = summarize_porcelain(&porcelain);
        let head_commit_short = self.head_commit()?.map(|id| short_hash(&id));
        let signing = self.signing_config()?;

        Ok(RepositoryStatus {
            is_repo: true,
            repo_root_path: Some(self.root.display().to_string()),
            current_branch: branch,
            is_dirty,
            untracked_count,
            signing_configured: signing.configured,
            signing_key: signing.key,
            config_source: signing.source,
            head_commit_short,
        })
    }

    // ── Plumbing ───────────────────────────────────────────────────

    fn executor(&self) -> &E {
        &self.gateway.executor
    }

    fn program(&self) -> &str {
        &self.gateway.program
    }

    fn query(&self) -> CommandOptions<'static> {
        CommandOptions::with_timeout(self.gateway.timeouts.query)
    }

    fn write(&self) -> Duration {
        self.gateway.timeouts.write
    }

    fn run(&self, args: Vec<String>, timeout: Duration) -> Result<String, GitError> {
        let result = execute_checked(
            self.executor(),
            self.program(),
            args,
            &self.root,
            &CommandOptions::with_timeout(timeout),
        )?;
        Ok(result.stdout)
    }
}

fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    crate::command::args(parts)
}

pub fn short_hash(id: &str) -> String {
    id.chars().take(8).collect()
}

fn parse_commit_info(output: &str) -> Option<CommitInfo> {
    let mut fields = output.splitn(6, FIELD_SEPARATOR);
    let hash = fields.next()?.trim().to_string();
    let author_name = fields.next()?.to_string();
    let author_email = fields.next()?.to_string();
    let timestamp = fields.next()?.to_string();
    let status = SignatureStatus::from_code(fields.next()?);
    let message = fields.next()?.trim_end().to_string();
    if hash.is_empty() {
        return None;
    }
    Some(CommitInfo {
        short_hash: short_hash(&hash),
        hash,
        message,
        author_name,
        author_email,
        timestamp,
        signed: status.counts_as_signed(),
    })
}

/// `(is_dirty, untracked_count)` from `git status --porcelain`.
fn summarize_porcelain(output: &str) -> (bool, usize) {
    let mut dirty = false;
    let mut untracked = 0;
    for line in output.lines().filter(|line| !line.trim().is_empty()) {
        if line.starts_with("??") {
            untracked += 1;
        } else {
            dirty = true;
        }
    }
    (dirty, untracked)
}
