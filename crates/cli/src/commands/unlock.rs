// `gitseal unlock`: clear a lock after integrity, ownership and key checks.

use std::path::PathBuf;

use clap::Args;
use gitseal_common::protocol::api::UnlockResponse;

use crate::commands::Session;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct UnlockArgs {
    /// Notebook to unlock.
    path: PathBuf,
    /// Force JSON output.
    #[arg(long)]
    pub(crate) json: bool,
}

pub fn run(args: UnlockArgs, session: &Session) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let document = session.read_notebook(&args.path)?;
    let outcome = session.seal().unlock(&args.path, &document)?;
    session.write_notebook(&args.path, &outcome.document)?;

    output::print_warnings(format, &outcome.warnings);
    let response = UnlockResponse {
        success: true,
        message: outcome.message,
        signature_verification_passed: outcome.signature_verification_passed,
        was_gpg_signed: outcome.was_gpg_signed,
        commit_hash: outcome.commit_hash,
        metadata: outcome.metadata,
        warnings: outcome.warnings,
    };
    output::print_output(format, &response, format_human)?;
    Ok(())
}

fn format_human(response: &UnlockResponse) -> String {
    let mut lines = vec![response.message.clone()];
    if let Some(commit) = &response.commit_hash {
        lines.push(format!("  unlock commit: {commit}"));
    }
    lines.push(format!("  locked in:     {}", response.metadata.commit_hash));
    lines.join("\n")
}
