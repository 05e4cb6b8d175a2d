// Scoped `git config` reads shared by the gateway, the gpg probe, and the
// identity resolver.

use std::path::Path;
use std::time::Duration;

use gitseal_common::types::ConfigSource;
use tracing::debug;

use crate::command::{execute_raw, CommandError, CommandExecutor, CommandOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigScope {
    Local,
    Global,
}

impl ConfigScope {
    pub const fn flag(self) -> &'static str {
        match self {
            Self::Local => "--local",
            Self::Global => "--global",
        }
    }

    pub const fn source(self) -> ConfigSource {
        match self {
            Self::Local => ConfigSource::Local,
            Self::Global => ConfigSource::Global,
        }
    }
}

/// Read one config value. A missing key, an empty value, or `--local` outside
/// a repository all read as `None`; only spawn failures and timeouts error.
pub fn read_value<E: CommandExecutor + ?Sized>(
    executor: &E,
    git_program: &str,
    cwd: &Path,
    scope: ConfigScope,
    key: &str,
    timeout: Duration,
) -> Result<Option<String>, CommandError> {
    let args = vec!["config".to_string(), scope.flag().to_string(), "--get".to_string(), key.to_string()];
    let result =
        execute_raw(executor, git_program, args, cwd, &CommandOptions::with_timeout(timeout))?;
    if !result.success {
        debug!(key, scope = scope.flag(), code = ?result.code, "git config value not set");
        return Ok(None);
    }
    let value = result.stdout.trim();
    Ok((!value.is_empty()).then(|| value.to_string()))
}

/// First non-empty value of `key`, looking at the local scope before global.
pub fn read_first<E: CommandExecutor + ?Sized>(
    executor: &E,
    git_program: &str,
    cwd: &Path,
    key: &str,
    timeout: Duration,
) -> Result<Option<(String, ConfigScope)>, CommandError> {
    for scope in [ConfigScope::Local, ConfigScope::Global] {
        if let Some(value) = read_value(executor, git_program, cwd, scope, key, timeout)? {
            return Ok(Some((value, scope)));
        }
    }
    Ok(None)
}

/// git's boolean spellings.
pub fn parse_bool(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "on" | "1")
}
