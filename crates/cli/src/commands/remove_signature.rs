// `gitseal remove-signature`

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use crate::commands::Session;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct RemoveSignatureArgs {
    /// Notebook whose lock record should be dropped. Must not be locked.
    path: PathBuf,
    /// Force JSON output.
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Debug, Serialize)]
struct RemovalResult {
    success: bool,
    message: String,
    path: String,
}

pub fn run(args: RemoveSignatureArgs, session: &Session) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let document = session.read_notebook(&args.path)?;
    let removal = session.seal().remove_signature(&args.path, &document)?;
    let result = RemovalResult {
        success: true,
        message: removal.message,
        path: args.path.display().to_string(),
    };
    output::print_output(format, &result, |r| format!("{}: {}", r.path, r.message))?;
    Ok(())
}
