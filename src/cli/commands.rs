use clap::Subcommand;

use super::BackendArgs;

#[derive(Subcommand)]
pub enum AdminCommands {
    /// Give a user admin access
    Grant {
        /// Email address of the user
        #[arg(long)]
        email: String,

        #[command(flatten)]
        backend: BackendArgs,
    },

    /// Take admin access away from a user
    Revoke {
        /// Email address of the user
        #[arg(long)]
        email: String,

        #[command(flatten)]
        backend: BackendArgs,
    },
}
