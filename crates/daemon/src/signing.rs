// gpg capability probing: is the backend there, which secret keys exist,
// which key is configured for git, and can that key actually sign right now.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::command::{
    execute_checked, execute_raw, CommandError, CommandExecutor, CommandOptions,
    CommandTimeouts, ProcessCommandExecutor,
};
use crate::git::config;

const SIGNING_PROBE: &[u8] = b"gitseal signing probe";
const MIN_KEY_ID_LEN: usize = 8;

/// One secret (sub)key from `gpg --list-secret-keys --with-colons`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretKey {
    pub key_id: String,
    pub fingerprint: Option<String>,
    /// Key ID of the primary key this one belongs to (itself for primaries).
    pub primary_key_id: String,
    pub user_ids: Vec<String>,
}

impl SecretKey {
    fn matches_id(&self, spec: &str) -> bool {
        key_ids_match(&self.key_id, spec)
            || self.fingerprint.as_deref().is_some_and(|fpr| key_ids_match(fpr, spec))
    }

    fn matches_user_id(&self, spec: &str) -> bool {
        let needle = spec.trim().trim_start_matches('<').trim_end_matches('>').to_lowercase();
        !needle.is_empty() && self.user_ids.iter().any(|uid| uid.to_lowercase().contains(&needle))
    }
}

#[derive(Debug)]
pub struct GpgProbe<E = ProcessCommandExecutor> {
    executor: E,
    gpg_program: String,
    git_program: String,
    timeouts: CommandTimeouts,
    workdir: PathBuf,
}

impl GpgProbe<ProcessCommandExecutor> {
    pub fn new() -> Self {
        Self::with_executor(ProcessCommandExecutor)
    }
}

impl Default for GpgProbe<ProcessCommandExecutor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: CommandExecutor> GpgProbe<E> {
    pub fn with_executor(executor: E) -> Self {
        Self {
            executor,
            gpg_program: "gpg".to_string(),
            git_program: "git".to_string(),
            timeouts: CommandTimeouts::default(),
            workdir: std::env::temp_dir(),
        }
    }

    pub fn with_programs(mut self, gpg: impl Into<String>, git: impl Into<String>) -> Self {
        self.gpg_program = gpg.into();
        self.git_program = git.into();
        self
    }

    pub fn with_timeouts(mut self, timeouts: CommandTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn is_backend_available(&self) -> bool {
        match self.gpg(args(["--batch", "--list-keys", "--with-colons"])) {
            Ok(_) => true,
            Err(error) => {
                debug!(%error, "gpg backend unavailable");
                false
            }
        }
    }

    pub fn secret_keys(&self) -> Result<Vec<SecretKey>, CommandError> {
        let stdout = self.gpg(args(["--batch", "--list-secret-keys", "--with-colons"]))?;
        Ok(parse_secret_keys(&stdout))
    }

    pub fn has_any_signing_key(&self) -> bool {
        match self.secret_keys() {
            Ok(keys) => !keys.is_empty(),
            Err(error) => {
                warn!(%error, "could not list gpg secret keys");
                false
            }
        }
    }

    /// `user.signingkey` for the repository at `repo_root`, local before global.
    pub fn configured_signing_key_id(
        &self,
        repo_root: &Path,
    ) -> Result<Option<String>, CommandError> {
        let found = config::read_first(
            &self.executor,
            &self.git_program,
            repo_root,
            "user.signingkey",
            self.timeouts.query,
        )?;
        Ok(found.map(|(value, _)| value))
    }

    /// The key must be in the secret keyring and must produce a detached
    /// signature over a fixed probe within the signing deadline.
    pub fn can_sign_with_key(&self, key: &str) -> bool {
        let present = match self.secret_keys() {
            Ok(keys) => keys.iter().any(|k| k.matches_id(key) || k.matches_user_id(key)),
            Err(error) => {
                warn!(%error, "could not list gpg secret keys");
                return false;
            }
        };
        if !present {
            debug!(key, "signing key not found in secret keyring");
            return false;
        }

        let options = CommandOptions::with_timeout(self.timeouts.write).stdin(SIGNING_PROBE);
        let sign_args = vec![
            "--batch".to_string(),
            "--yes".to_string(),
            "--local-user".to_string(),
            key.to_string(),
            "--armor".to_string(),
            "--detach-sign".to_string(),
        ];
        match execute_raw(&self.executor, &self.gpg_program, sign_args, &self.workdir, &options) {
            Ok(result) if result.success && result.stdout.contains("BEGIN PGP SIGNATURE") => true,
            Ok(result) => {
                debug!(key, diagnostic = result.diagnostic().trim(), "signing probe failed");
                false
            }
            Err(error) => {
                warn!(key, %error, "signing probe did not complete");
                false
            }
        }
    }

    /// Whether `configured` names the key that produced `original`. Hex IDs
    /// match on suffix; other specs (emails, user IDs) resolve through the
    /// secret keyring to every key of the matching primary.
    pub fn configured_key_matches(&self, configured: &str, original: &str) -> bool {
        if key_ids_match(configured, original) {
            return true;
        }
        if is_hex_key_id(configured) {
            return false;
        }
        let keys = match self.secret_keys() {
            Ok(keys) => keys,
            Err(error) => {
                warn!(%error, "could not resolve configured signing key");
                return false;
            }
        };
        let primaries: Vec<&str> = keys
            .iter()
            .filter(|key| key.matches_user_id(configured))
            .map(|key| key.primary_key_id.as_str())
            .collect();
        keys.iter()
            .filter(|key| primaries.contains(&key.primary_key_id.as_str()))
            .any(|key| key.matches_id(original))
    }

    fn gpg(&self, args: Vec<String>) -> Result<String, CommandError> {
        let result = execute_checked(
            &self.executor,
            &self.gpg_program,
            args,
            &self.workdir,
            &CommandOptions::with_timeout(self.timeouts.query),
        )?;
        Ok(result.stdout)
    }
}

fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    crate::command::args(parts)
}

/// Canonical form of a key ID: no `0x`, no trailing `!`, no spaces, uppercase.
pub fn normalize_key_id(raw: &str) -> String {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    trimmed
        .trim_end_matches('!')
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

pub fn is_hex_key_id(raw: &str) -> bool {
    let normalized = normalize_key_id(raw);
    !normalized.is_empty() && normalized.chars().all(|c| c.is_ascii_hexdigit())
}

/// Suffix match between key IDs / fingerprints. The shorter side must have
/// at least 8 hex digits.
pub fn key_ids_match(a: &str, b: &str) -> bool {
    if !is_hex_key_id(a) || !is_hex_key_id(b) {
        return false;
    }
    let (a, b) = (normalize_key_id(a), normalize_key_id(b));
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    short.len() >= MIN_KEY_ID_LEN && long.ends_with(&short)
}

fn parse_secret_keys(listing: &str) -> Vec<SecretKey> {
    let mut keys: Vec<SecretKey> = Vec::new();
    let mut primary_index: Option<usize> = None;

    for line in listing.lines() {
        let fields: Vec<&str> = line.split(':').collect();
        let field = |index: usize| fields.get(index).copied().unwrap_or("").trim();
        match field(0) {
            record @ ("sec" | "ssb") => {
                let key_id = field(4).to_string();
                if key_id.is_empty() {
                    continue;
                }
                let primary_key_id = match (record, primary_index) {
                    ("ssb", Some(index)) => keys[index].primary_key_id.clone(),
                    _ => key_id.clone(),
                };
                keys.push(SecretKey {
                    key_id,
                    fingerprint: None,
                    primary_key_id,
                    user_ids: Vec::new(),
                });
                if record == "sec" {
                    primary_index = Some(keys.len() - 1);
                }
            }
            "fpr" => {
                if let Some(last) = keys.last_mut() {
                    if last.fingerprint.is_none() && !field(9).is_empty() {
                        last.fingerprint = Some(field(9).to_string());
                    }
                }
            }
            "uid" => {
                if let (Some(index), uid) = (primary_index, field(9)) {
                    if !uid.is_empty() {
                        keys[index].user_ids.push(uid.to_string());
                    }
                }
            }
            _ => {}
        }
    }

    // Subkeys answer to their primary's user IDs.
    for index in 0..keys.len() {
        if keys[index].primary_key_id != keys[index].key_id {
            let primary = keys[index].primary_key_id.clone();
            let uids = keys.iter().find(|k| k.key_id == primary).map(|k| k.user_ids.clone());
            if let Some(uids) = uids {
                keys[index].user_ids = uids;
            }
        }
    }
    keys
}
