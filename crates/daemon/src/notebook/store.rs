// Notebook persistence. Writes go to a sibling temp file that is renamed
// over the target, so readers never observe a half-written notebook.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use gitseal_common::notebook::{Notebook, NotebookError};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to {action} `{}`: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Notebook(#[from] NotebookError),
}

pub trait NotebookStore: Send + Sync {
    fn load(&self, path: &Path) -> Result<Notebook, StoreError>;
    fn save(&self, path: &Path, notebook: &Notebook) -> Result<(), StoreError>;
}

/// Stores notebooks as pretty-printed JSON on the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsNotebookStore;

impl NotebookStore for FsNotebookStore {
    fn load(&self, path: &Path) -> Result<Notebook, StoreError> {
        let raw = fs::read_to_string(path).map_err(|source| StoreError::Io {
            action: "read notebook",
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Notebook::from_json_str(&raw)?)
    }

    fn save(&self, path: &Path, notebook: &Notebook) -> Result<(), StoreError> {
        let contents = notebook.to_pretty_json()?;
        let tmp_path = temp_path_for(path);
        let io_error = |action: &'static str, path: &Path| {
            let path = path.to_path_buf();
            move |source| StoreError::Io { action, path, source }
        };

        let mut file = File::create(&tmp_path).map_err(io_error("create temp file", &tmp_path))?;
        let written = file
            .write_all(contents.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(io_error("write temp file", &tmp_path));
        drop(file);
        if let Err(error) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(error);
        }

        fs::rename(&tmp_path, path).map_err(|source| {
            let _ = fs::remove_file(&tmp_path);
            StoreError::Io { action: "replace notebook", path: path.to_path_buf(), source }
        })
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let nonce = Uuid::new_v4().simple();
    path.with_file_name(format!(".{name}.tmp.{nonce}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn notebook() -> Notebook {
        Notebook::from_value(json!({
            "cells": [{"cell_type": "markdown", "source": "hi", "metadata": {}}],
            "metadata": {},
            "nbformat": 4,
            "nbformat_minor": 5
        }))
        .unwrap()
    }

    #[test]
    fn save_then_load_round_trip() {
        let tmp = tempdir().expect("tempdir should be created");
        let path = tmp.path().join("a.ipynb");
        FsNotebookStore.save(&path, &notebook()).unwrap();
        assert_eq!(FsNotebookStore.load(&path).unwrap(), notebook());
    }

    #[test]
    fn save_writes_pretty_json_and_leaves_no_temp_files() {
        let tmp = tempdir().expect("tempdir should be created");
        let path = tmp.path().join("a.ipynb");
        fs::write(&path, "old").unwrap();
        FsNotebookStore.save(&path, &notebook()).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("{\n  \"cells\""));
        assert!(written.ends_with("}\n"));
        let entries: Vec<_> = fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn save_into_missing_directory_fails_cleanly() {
        let tmp = tempdir().expect("tempdir should be created");
        let path = tmp.path().join("missing").join("a.ipynb");
        let error = FsNotebookStore.save(&path, &notebook()).unwrap_err();
        assert!(matches!(error, StoreError::Io { action: "create temp file", .. }));
    }

    #[test]
    fn load_rejects_non_object_json() {
        let tmp = tempdir().expect("tempdir should be created");
        let path = tmp.path().join("a.ipynb");
        fs::write(&path, "[1,2,3]").unwrap();
        assert!(matches!(
            FsNotebookStore.load(&path),
            Err(StoreError::Notebook(NotebookError::NotAnObject))
        ));
    }
}
