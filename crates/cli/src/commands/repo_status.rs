// `gitseal repo-status`: repository, branch and signing configuration.

use std::path::PathBuf;

use clap::Args;
use gitseal_common::protocol::api::RepositoryStatusResponse;
use gitseal_common::types::{ConfigSource, RepositoryStatus};

use crate::commands::Session;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct RepoStatusArgs {
    /// File or directory inside the repository.
    #[arg(default_value = ".")]
    path: PathBuf,
    /// Force JSON output.
    #[arg(long)]
    pub(crate) json: bool,
}

pub fn run(args: RepoStatusArgs, session: &Session) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let status = session.seal().repository_status(&args.path)?;
    let response = RepositoryStatusResponse { success: true, repository_status: status };
    output::print_output(format, &response, |r| format_human(&r.repository_status))?;
    Ok(())
}

fn format_human(status: &RepositoryStatus) -> String {
    if !status.is_repo {
        return "Not in a git repository".to_string();
    }
    let mut lines = Vec::new();
    lines.push(format!("repository: {}", status.repo_root_path.as_deref().unwrap_or("?")));
    lines.push(format!(
        "branch:     {}{}",
        status.current_branch.as_deref().unwrap_or("(detached)"),
        if status.is_dirty { " (dirty)" } else { "" }
    ));
    if status.untracked_count > 0 {
        lines.push(format!("untracked:  {}", status.untracked_count));
    }
    if let Some(head) = &status.head_commit_short {
        lines.push(format!("head:       {head}"));
    }
    let signing = match (&status.signing_key, status.config_source) {
        (Some(key), ConfigSource::Local) => format!("{key} (local config)"),
        (Some(key), ConfigSource::Global) => format!("{key} (global config)"),
        (Some(key), ConfigSource::None) => key.clone(),
        (None, _) => "not configured".to_string(),
    };
    lines.push(format!("signing:    {signing}"));
    lines.join("\n")
}
