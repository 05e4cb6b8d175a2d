// Core domain types shared across all gitseal crates.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Lock record stored under `metadata["lock-signature"]` in a notebook.
///
/// A record is either absent or complete: unknown fields are rejected and
/// every required field must be present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SignatureMetadata {
    pub locked: bool,
    pub commit_hash: String,
    pub commit_signed: bool,
    pub user_name: String,
    pub user_email: String,
    /// ISO-8601 timestamp of the lock commit.
    pub timestamp: String,
    /// Lowercase hex SHA-256 of the notebook's semantic content.
    pub content_hash: String,
    pub commit_message: String,
    pub gpg_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlock_timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlocked_by_user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlocked_by_user_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlock_commit_hash: Option<String>,
}

impl SignatureMetadata {
    /// Whether `identity` is the one that created this lock.
    pub fn is_owned_by(&self, identity: &Identity) -> bool {
        self.user_name == identity.name && self.user_email == identity.email
    }

    pub fn owner(&self) -> Identity {
        Identity { name: self.user_name.clone(), email: self.user_email.clone() }
    }
}

/// Operator identity as configured in git (`user.name` / `user.email`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Identity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self { name: name.into(), email: email.into() }
    }

    /// Loose email shape check: something before `@`, and a dot in the domain.
    pub fn is_plausible(&self) -> bool {
        if self.name.trim().is_empty() {
            return false;
        }
        match self.email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
            }
            None => false,
        }
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// Summary of a single commit as reported by git.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitInfo {
    pub hash: String,
    /// First 8 characters of `hash`.
    pub short_hash: String,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    /// Committer date, strict ISO-8601.
    pub timestamp: String,
    pub signed: bool,
}

/// Where a git config value was found.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    Local,
    Global,
    None,
}

impl ConfigSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Global => "global",
            Self::None => "none",
        }
    }
}

/// Snapshot of the repository that contains a notebook.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepositoryStatus {
    pub is_repo: bool,
    pub repo_root_path: Option<String>,
    pub current_branch: Option<String>,
    pub is_dirty: bool,
    pub untracked_count: usize,
    pub signing_configured: bool,
    pub signing_key: Option<String>,
    pub config_source: ConfigSource,
    pub head_commit_short: Option<String>,
}

impl RepositoryStatus {
    /// Status reported for a path that is not inside any repository.
    pub fn not_a_repository() -> Self {
        Self {
            is_repo: false,
            repo_root_path: None,
            current_branch: None,
            is_dirty: false,
            untracked_count: 0,
            signing_configured: false,
            signing_key: None,
            config_source: ConfigSource::None,
            head_commit_short: None,
        }
    }
}

/// Current UTC time as an ISO-8601 string with a `Z` suffix.
pub fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
