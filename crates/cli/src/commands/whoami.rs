// `gitseal whoami`

use clap::Args;
use gitseal_common::protocol::api::UserInfoResponse;

use crate::commands::Session;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct WhoamiArgs {
    /// Re-read git config instead of using cached values.
    #[arg(long)]
    refresh: bool,
    /// Force JSON output.
    #[arg(long)]
    pub(crate) json: bool,
}

pub fn run(args: WhoamiArgs, session: &Session) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let response = match session.seal().current_identity(args.refresh)? {
        Some(identity) => UserInfoResponse { success: true, user_info: Some(identity), message: None },
        None => UserInfoResponse {
            success: false,
            user_info: None,
            message: Some("Git user configuration not found".to_string()),
        },
    };
    output::print_output(format, &response, format_human)?;
    Ok(())
}

fn format_human(response: &UserInfoResponse) -> String {
    match &response.user_info {
        Some(identity) => format!("{} <{}>", identity.name, identity.email),
        None => format!(
            "{}. Set it with: git config --global user.name \"Your Name\" && git config --global user.email you@example.com",
            response.message.as_deref().unwrap_or("Git user configuration not found")
        ),
    }
}
