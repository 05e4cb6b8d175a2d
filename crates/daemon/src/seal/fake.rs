//! In-memory git + gpg backend for coordinator tests.
//!
//! Understands exactly the command lines the gateway, probe and identity
//! resolver issue, and keeps a tiny commit graph so HEAD movement, rollback
//! and amend can be asserted on.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_json::json;
use tempfile::TempDir;

use crate::command::{CommandExecutor, CommandOptions, CommandResult};
use crate::config::CommandsConfig;
use crate::seal::SealService;
use crate::signing::key_ids_match;
use gitseal_common::notebook::Notebook;

pub(crate) const ADA_KEY: &str = "AAAABBBBCCCCDDDD";
pub(crate) const ADA_FPR: &str = "1111222233334444AAAABBBBCCCCDDDD";
pub(crate) const COMMIT_TIME: &str = "2026-03-04T05:06:07+00:00";

#[derive(Debug, Clone)]
pub(crate) struct FakeKey {
    pub key_id: String,
    pub fingerprint: String,
    pub uid: String,
}

#[derive(Debug, Clone)]
pub(crate) struct FakeCommit {
    pub id: String,
    pub parent: Option<String>,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub signed_by: Option<FakeKey>,
}

#[derive(Debug, Default)]
pub(crate) struct FakeState {
    pub local_config: HashMap<String, String>,
    pub global_config: HashMap<String, String>,
    pub gpg_available: bool,
    pub secret_keys: Vec<FakeKey>,
    /// `commit -S` and detached signing succeed.
    pub signing_works: bool,
    /// `commit -S` exits 0 but leaves the commit unsigned.
    pub signing_silently_skipped: bool,
    pub verify_passes: bool,
    /// `commit -S` fails even though the detached-sign probe works.
    pub fail_signed_commit: bool,
    pub fail_commit: bool,
    pub fail_amend: bool,
    pub fail_rollback: bool,
    /// `git show` with the full commit-info format fails.
    pub fail_commit_info: bool,
    /// Another commit lands the next time a commit is inspected.
    pub race_commit_on_inspect: bool,
    pub commits: Vec<FakeCommit>,
    pub head: Option<String>,
    pub log: Vec<String>,
    next_id: u64,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBackend {
    /// Identity Ada, one secret key configured as `user.signingkey`, gpg
    /// working, one pre-existing unsigned commit.
    pub fn signing_ready() -> Self {
        let backend = Self::default();
        backend.with(|state| {
            state.local_config.insert("user.name".into(), "Ada Lovelace".into());
            state.local_config.insert("user.email".into(), "ada@example.com".into());
            state.local_config.insert("user.signingkey".into(), ADA_KEY.into());
            state.gpg_available = true;
            state.signing_works = true;
            state.verify_passes = true;
            state.secret_keys.push(FakeKey {
                key_id: ADA_KEY.into(),
                fingerprint: ADA_FPR.into(),
                uid: "Ada Lovelace <ada@example.com>".into(),
            });
            state.create_commit("initial".into(), false, None);
        });
        backend
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut state = self.state.lock().expect("fake state lock poisoned");
        f(&mut state)
    }

    pub fn head(&self) -> Option<String> {
        self.with(|state| state.head.clone())
    }

    pub fn head_commit(&self) -> Option<FakeCommit> {
        self.with(|state| state.head.clone().and_then(|id| state.find(&id).cloned()))
    }

    /// Commits reachable from HEAD.
    pub fn history_len(&self) -> usize {
        self.with(|state| {
            let mut count = 0;
            let mut cursor = state.head.clone();
            while let Some(id) = cursor {
                count += 1;
                cursor = state.find(&id).and_then(|commit| commit.parent.clone());
            }
            count
        })
    }

    pub fn ran(&self, needle: &str) -> bool {
        self.with(|state| state.log.iter().any(|line| line.contains(needle)))
    }

    /// Switch the operator to a different git identity.
    pub fn become_user(&self, name: &str, email: &str) {
        self.with(|state| {
            state.local_config.insert("user.name".into(), name.into());
            state.local_config.insert("user.email".into(), email.into());
        });
    }
}

impl FakeState {
    fn find(&self, id: &str) -> Option<&FakeCommit> {
        self.commits.iter().find(|commit| commit.id == id)
    }

    fn config(&self, scope: &str, key: &str) -> Option<String> {
        match scope {
            "--local" => self.local_config.get(key).cloned(),
            _ => self.global_config.get(key).cloned(),
        }
    }

    fn identity(&self) -> (String, String) {
        let get = |key: &str| {
            self.local_config
                .get(key)
                .or_else(|| self.global_config.get(key))
                .cloned()
                .unwrap_or_default()
        };
        (get("user.name"), get("user.email"))
    }

    fn configured_key(&self) -> Option<FakeKey> {
        let spec = self
            .local_config
            .get("user.signingkey")
            .or_else(|| self.global_config.get("user.signingkey"))?;
        self.key_for(spec)
    }

    fn key_for(&self, spec: &str) -> Option<FakeKey> {
        self.secret_keys
            .iter()
            .find(|key| {
                key_ids_match(&key.key_id, spec)
                    || key_ids_match(&key.fingerprint, spec)
                    || key.uid.contains(spec)
            })
            .cloned()
    }

    fn create_commit(&mut self, message: String, amend: bool, signed_by: Option<FakeKey>) -> String {
        self.next_id += 1;
        let id = format!("{:040x}", 0x5ea1_0000_u64 + self.next_id);
        let parent = if amend {
            self.head.as_deref().and_then(|head| self.find(head)).and_then(|c| c.parent.clone())
        } else {
            self.head.clone()
        };
        let (author_name, author_email) = self.identity();
        self.commits.push(FakeCommit {
            id: id.clone(),
            parent,
            message,
            author_name,
            author_email,
            signed_by,
        });
        self.head = Some(id.clone());
        id
    }

    fn git(&mut self, args: &[String]) -> Result<CommandResult, io::Error> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        match args.as_slice() {
            ["config", scope, "--get", key] => Ok(match self.config(scope, key) {
                Some(value) => ok(&format!("{value}\n")),
                None => fail(1, ""),
            }),
            ["add", "--", _] => Ok(ok("")),
            ["rev-parse", "--verify", "--quiet", "HEAD"] => {
                Ok(self.head.clone().map_or_else(|| fail(1, ""), |id| ok(&format!("{id}\n"))))
            }
            ["rev-parse", "--verify", "--quiet", "HEAD~1"] => {
                let parent = self.head.as_deref().and_then(|h| self.find(h)).and_then(|c| c.parent.clone());
                Ok(parent.map_or_else(|| fail(1, ""), |id| ok(&format!("{id}\n"))))
            }
            ["rev-parse", "--abbrev-ref", "HEAD"] => Ok(ok("main\n")),
            ["status", "--porcelain"] => Ok(ok("")),
            ["reset", "--mixed", "--quiet", "HEAD~1"] => {
                if self.fail_rollback {
                    return Ok(fail(128, "fatal: Unable to create '.git/index.lock': File exists."));
                }
                self.head = self.head.as_deref().and_then(|h| self.find(h)).and_then(|c| c.parent.clone());
                Ok(ok(""))
            }
            ["update-ref", "-d", "HEAD"] => {
                if self.fail_rollback {
                    return Ok(fail(128, "fatal: cannot lock ref 'HEAD'"));
                }
                self.head = None;
                Ok(ok(""))
            }
            ["cat-file", "-e", spec] => {
                let id = spec.trim_end_matches("^{commit}");
                if self.race_commit_on_inspect {
                    self.race_commit_on_inspect = false;
                    self.create_commit("someone else".into(), false, None);
                }
                Ok(if self.find(id).is_some() { ok("") } else { fail(128, "fatal: Not a valid object name") })
            }
            ["verify-commit", id] => Ok(match self.find(id) {
                Some(commit) if commit.signed_by.is_some() && self.verify_passes => {
                    CommandResult { stderr: "gpg: Good signature".into(), ..ok("") }
                }
                Some(_) => fail(1, "error: no signature found"),
                None => fail(128, "fatal: bad object"),
            }),
            ["show", "-s", format, id] => self.show(format, id),
            ["-c", "commit.gpgsign=false", "commit", rest @ ..] => self.commit(rest, false),
            ["commit", rest @ ..] => self.commit(rest, true),
            other => panic!("fake git does not understand {other:?}"),
        }
    }

    fn show(&self, format: &str, id: &str) -> Result<CommandResult, io::Error> {
        let Some(commit) = self.find(id) else {
            return Ok(fail(128, &format!("fatal: bad object {id}")));
        };
        let status = if commit.signed_by.is_some() { "G" } else { "N" };
        if self.fail_commit_info && format.starts_with("--format=%H") {
            return Ok(fail(128, "fatal: unable to read commit object"));
        }
        let out = match format {
            "--format=%G?" => format!("{status}\n"),
            "--format=%GK%x1f%GF" => match &commit.signed_by {
                Some(key) => format!("{}\u{1f}{}\n", key.key_id, key.fingerprint),
                None => "\u{1f}\n".to_string(),
            },
            "--format=%H%x1f%an%x1f%ae%x1f%cI%x1f%G?%x1f%B" => format!(
                "{}\u{1f}{}\u{1f}{}\u{1f}{COMMIT_TIME}\u{1f}{status}\u{1f}{}\n",
                commit.id, commit.author_name, commit.author_email, commit.message
            ),
            other => panic!("fake git show does not understand {other}"),
        };
        Ok(ok(&out))
    }

    fn commit(&mut self, rest: &[&str], signing_allowed: bool) -> Result<CommandResult, io::Error> {
        let amend = rest.contains(&"--amend");
        let sign = signing_allowed && rest.contains(&"-S");
        let message = rest
            .iter()
            .position(|arg| *arg == "-m")
            .and_then(|index| rest.get(index + 1))
            .map(|message| message.to_string())
            .unwrap_or_default();

        if (amend && self.fail_amend) || (!amend && self.fail_commit) {
            return Ok(fail(1, "error: could not write commit"));
        }
        let signed_by = if sign {
            if !self.signing_works || self.fail_signed_commit {
                return Ok(fail(128, "error: gpg failed to sign the data"));
            }
            if self.signing_silently_skipped {
                None
            } else {
                self.configured_key()
            }
        } else {
            None
        };
        self.create_commit(message, amend, signed_by);
        Ok(ok(""))
    }

    fn gpg(&mut self, args: &[String]) -> Result<CommandResult, io::Error> {
        if !self.gpg_available {
            return Err(io::Error::new(io::ErrorKind::NotFound, "gpg: not found"));
        }
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        match args.as_slice() {
            ["--batch", "--list-keys", "--with-colons"] => Ok(ok("")),
            ["--batch", "--list-secret-keys", "--with-colons"] => {
                let listing: String = self
                    .secret_keys
                    .iter()
                    .map(|key| {
                        format!(
                            "sec:u:255:22:{}:1700000000:::u:::scESC:::+:::ed25519:::0:\n\
                             fpr:::::::::{}:\n\
                             uid:u::::1700000000::HASH::{}::::::::::0:\n",
                            key.key_id, key.fingerprint, key.uid
                        )
                    })
                    .collect();
                Ok(ok(&listing))
            }
            ["--batch", "--yes", "--local-user", key, "--armor", "--detach-sign"] => {
                Ok(if self.signing_works && self.key_for(key).is_some() {
                    ok("-----BEGIN PGP SIGNATURE-----\nfake\n-----END PGP SIGNATURE-----\n")
                } else {
                    fail(2, "gpg: signing failed: No secret key")
                })
            }
            other => panic!("fake gpg does not understand {other:?}"),
        }
    }
}

impl CommandExecutor for FakeBackend {
    fn execute(
        &self,
        program: &str,
        args: &[String],
        _cwd: &Path,
        _options: &CommandOptions<'_>,
    ) -> Result<CommandResult, io::Error> {
        let mut state = self.state.lock().expect("fake state lock poisoned");
        state.log.push(format!("{program} {}", args.join(" ")));
        match program {
            "git" => state.git(args),
            "gpg" => state.gpg(args),
            other => Err(io::Error::new(io::ErrorKind::NotFound, format!("{other}: not found"))),
        }
    }
}

fn ok(stdout: &str) -> CommandResult {
    CommandResult { success: true, code: Some(0), stdout: stdout.to_string(), stderr: String::new() }
}

fn fail(code: i32, stderr: &str) -> CommandResult {
    CommandResult {
        success: false,
        code: Some(code),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

/// A temp directory that looks like a repository root, with one notebook.
pub(crate) struct Workspace {
    _dir: TempDir,
    pub root: PathBuf,
    pub notebook_path: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let root = dir.path().to_path_buf();
        fs::create_dir(root.join(".git")).expect(".git should be created");
        let notebook_path = root.join("analysis.ipynb");
        fs::write(&notebook_path, sample_notebook().to_pretty_json().expect("sample encodes"))
            .expect("notebook should be written");
        Self { _dir: dir, root, notebook_path }
    }

    pub fn read_notebook(&self) -> Notebook {
        let raw = fs::read_to_string(&self.notebook_path).expect("notebook should be readable");
        Notebook::from_json_str(&raw).expect("notebook should parse")
    }
}

pub(crate) fn sample_notebook() -> Notebook {
    Notebook::from_value(json!({
        "cells": [
            {
                "cell_type": "code",
                "execution_count": 1,
                "metadata": {},
                "source": ["x = 21\n", "x * 2"],
                "outputs": [{
                    "output_type": "execute_result",
                    "execution_count": 1,
                    "data": {"text/plain": "42"},
                    "metadata": {}
                }]
            },
            {"cell_type": "markdown", "metadata": {}, "source": "# Findings"}
        ],
        "metadata": {"kernelspec": {"name": "python3"}},
        "nbformat": 4,
        "nbformat_minor": 5
    }))
    .expect("sample notebook is an object")
}

pub(crate) fn service(backend: &FakeBackend) -> SealService<FakeBackend> {
    SealService::with_executor(backend.clone(), &CommandsConfig::default())
}
