// `gitseal lock`: commit a notebook with a signed commit and record the lock.

use std::path::PathBuf;

use clap::Args;
use gitseal_common::protocol::api::LockResponse;

use crate::commands::Session;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct LockArgs {
    /// Notebook to lock.
    path: PathBuf,
    /// Message for the lock commit.
    #[arg(short, long)]
    message: String,
    /// Force JSON output.
    #[arg(long)]
    pub(crate) json: bool,
}

pub fn run(args: LockArgs, session: &Session) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let document = session.read_notebook(&args.path)?;
    let outcome = session.seal().lock(&args.path, &document, &args.message)?;
    session.write_notebook(&args.path, &outcome.document)?;

    output::print_warnings(format, &outcome.warnings);
    let response = LockResponse {
        success: true,
        message: outcome.message,
        metadata: outcome.metadata,
        commit_hash: outcome.commit_hash,
        signed: outcome.signed,
        warnings: outcome.warnings,
    };
    output::print_output(format, &response, format_human)?;
    Ok(())
}

fn format_human(response: &LockResponse) -> String {
    let metadata = &response.metadata;
    [
        response.message.clone(),
        format!("  commit:  {}", response.commit_hash),
        format!("  owner:   {} <{}>", metadata.user_name, metadata.user_email),
        format!("  content: {}", metadata.content_hash),
    ]
    .join("\n")
}
