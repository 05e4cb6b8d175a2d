// Operator identity from git config (`user.name` / `user.email`).
//
// The local repository config wins when it sets both values; otherwise the
// global config is used. `current_identity` caches per repository root until
// `invalidate` is called; authorization uses `resolve_uncached`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use gitseal_common::types::Identity;
use tracing::{debug, warn};

use crate::command::{CommandError, CommandExecutor, CommandTimeouts, ProcessCommandExecutor};
use crate::git::config::{self, ConfigScope};

#[derive(Debug)]
pub struct IdentityResolver<E = ProcessCommandExecutor> {
    executor: E,
    git_program: String,
    timeouts: CommandTimeouts,
    /// Keyed by repository root; `None` for "no repository".
    cache: Mutex<HashMap<Option<PathBuf>, Identity>>,
}

impl IdentityResolver<ProcessCommandExecutor> {
    pub fn new() -> Self {
        Self::with_executor(ProcessCommandExecutor)
    }
}

impl Default for IdentityResolver<ProcessCommandExecutor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: CommandExecutor> IdentityResolver<E> {
    pub fn with_executor(executor: E) -> Self {
        Self {
            executor,
            git_program: "git".to_string(),
            timeouts: CommandTimeouts::default(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_program(mut self, git_program: impl Into<String>) -> Self {
        self.git_program = git_program.into();
        self
    }

    pub fn with_timeouts(mut self, timeouts: CommandTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn current_identity(
        &self,
        repo_root: Option<&Path>,
    ) -> Result<Option<Identity>, CommandError> {
        let key = repo_root.map(Path::to_path_buf);
        if let Some(cached) = self.cache().get(&key).cloned() {
            return Ok(Some(cached));
        }
        self.resolve_uncached(repo_root)
    }

    /// Reads git config now, ignoring any cached value. The result replaces
    /// the cache entry for `repo_root`.
    pub fn resolve_uncached(
        &self,
        repo_root: Option<&Path>,
    ) -> Result<Option<Identity>, CommandError> {
        let key = repo_root.map(Path::to_path_buf);
        let identity = match repo_root {
            Some(root) => match self.read_scope(root, ConfigScope::Local)? {
                Some(identity) => Some(identity),
                None => self.read_scope(root, ConfigScope::Global)?,
            },
            None => self.read_scope(&std::env::temp_dir(), ConfigScope::Global)?,
        };

        match &identity {
            Some(identity) => {
                if !identity.is_plausible() {
                    warn!(email = %identity.email, "git user.email does not look like an address");
                }
                self.cache().insert(key, identity.clone());
            }
            None => {
                debug!("git user.name/user.email not configured");
                self.cache().remove(&key);
            }
        }
        Ok(identity)
    }

    pub fn invalidate(&self) {
        self.cache().clear();
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<Option<PathBuf>, Identity>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_scope(&self, cwd: &Path, scope: ConfigScope) -> Result<Option<Identity>, CommandError> {
        let timeout = self.timeouts.query;
        let read =
            |key: &str| config::read_value(&self.executor, &self.git_program, cwd, scope, key, timeout);
        match (read("user.name")?, read("user.email")?) {
            (Some(name), Some(email)) => Ok(Some(Identity { name, email })),
            _ => Ok(None),
        }
    }
}
