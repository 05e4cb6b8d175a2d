// Repository discovery: walk up from a path until a directory holds `.git`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Nearest ancestor of `path` (inclusive) that contains a `.git` entry.
/// `.git` may be a directory or, for worktrees and submodules, a file.
pub fn find_repository_root(path: &Path) -> Option<PathBuf> {
    let start = search_start(path)?;
    start.ancestors().find(|dir| dir.join(".git").exists()).map(Path::to_path_buf)
}

/// Directory the upward search begins from: the path itself for directories,
/// its parent otherwise. Relative paths resolve against the process cwd.
pub fn search_start(path: &Path) -> Option<PathBuf> {
    let absolute = std::path::absolute(path).ok()?;
    if absolute.is_dir() {
        Some(absolute)
    } else {
        absolute.parent().map(Path::to_path_buf)
    }
}

/// Remembers roots found per starting directory. Only positive results are
/// cached so a later `git init` is picked up.
#[derive(Debug, Default)]
pub struct RepoRootCache {
    roots: Mutex<HashMap<PathBuf, PathBuf>>,
}

impl RepoRootCache {
    pub fn lookup(&self, path: &Path) -> Option<PathBuf> {
        let start = search_start(path)?;
        if let Some(root) = self.cached(&start) {
            return Some(root);
        }
        let root = start.ancestors().find(|dir| dir.join(".git").exists())?.to_path_buf();
        self.roots().insert(start, root.clone());
        Some(root)
    }

    pub fn clear(&self) {
        self.roots().clear();
    }

    pub fn len(&self) -> usize {
        self.roots().len()
    }

    fn cached(&self, start: &Path) -> Option<PathBuf> {
        let roots = self.roots();
        let root = roots.get(start)?;
        // A deleted repository invalidates its entry.
        root.join(".git").exists().then(|| root.clone())
    }

    fn roots(&self) -> MutexGuard<'_, HashMap<PathBuf, PathBuf>> {
        self.roots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
