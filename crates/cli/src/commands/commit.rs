// `gitseal commit`: commit a notebook, signing when git is set up to.

use std::path::PathBuf;

use clap::Args;
use gitseal_common::protocol::api::CommitResponse;

use crate::commands::Session;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct CommitArgs {
    /// Notebook to commit.
    path: PathBuf,
    /// Commit message.
    #[arg(short, long)]
    message: String,
    /// Force JSON output.
    #[arg(long)]
    pub(crate) json: bool,
}

pub fn run(args: CommitArgs, session: &Session) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let document = session.read_notebook(&args.path)?;
    let report = session.seal().commit(&args.path, &document, &args.message)?;
    session.write_notebook(&args.path, &report.document)?;

    output::print_warnings(format, &report.warnings);
    let response = CommitResponse {
        success: true,
        message: report.message,
        commit_hash: report.commit_hash,
        signed: report.signed,
        metadata: report.metadata,
        warnings: report.warnings,
    };
    output::print_output(format, &response, |r| r.message.clone())?;
    Ok(())
}
