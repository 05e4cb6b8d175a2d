// `gitseal status`: report lock state without changing anything.

use std::path::PathBuf;

use clap::Args;
use gitseal_common::protocol::api::StatusResponse;

use crate::commands::Session;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Notebook to inspect.
    path: PathBuf,
    /// Skip verifying the lock commit's signature.
    #[arg(long)]
    no_verify: bool,
    /// Force JSON output.
    #[arg(long)]
    pub(crate) json: bool,
}

pub fn run(args: StatusArgs, session: &Session) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let document = session.read_notebook(&args.path)?;
    let verify_at = (!args.no_verify).then_some(args.path.as_path());
    let report = session.seal().status(&document, verify_at)?;

    let response = StatusResponse {
        success: true,
        locked: report.locked,
        signature_valid: report.signature_valid,
        message: report.message,
        metadata: report.metadata,
    };
    output::print_output(format, &response, format_human)?;
    Ok(())
}

fn format_human(response: &StatusResponse) -> String {
    let state = match (response.locked, response.signature_valid) {
        (true, true) => "locked (signature valid)",
        (true, false) => "locked (signature NOT valid)",
        (false, _) => "unlocked",
    };
    let mut lines = vec![format!("{state}: {}", response.message)];
    if let Some(metadata) = response.metadata.as_ref().filter(|_| response.locked) {
        lines.push(format!("  by:     {} <{}>", metadata.user_name, metadata.user_email));
        lines.push(format!("  since:  {}", metadata.timestamp));
        lines.push(format!("  commit: {}", metadata.commit_hash));
    }
    lines.join("\n")
}
