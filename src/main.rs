use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sitelens::cli::{
    AdminCommands, BackendArgs, ServeArgs, run_admin_grant, run_admin_revoke, run_check,
    run_fix_data, run_serve, run_sweep,
};

#[derive(Parser)]
#[command(name = "sitelens")]
#[command(about = "Photo dashboard for construction sites", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Serve {
        #[command(flatten)]
        backend: BackendArgs,

        #[command(flatten)]
        serve: ServeArgs,
    },

    /// Check the backend answers and print table counts
    Check {
        #[command(flatten)]
        backend: BackendArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Report photos that point at missing sites
    Sweep {
        #[command(flatten)]
        backend: BackendArgs,

        /// Repair the first photo that needs it
        #[arg(long)]
        repair: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Link every unlinked photo to a site and project, grouped by address
    FixData {
        #[command(flatten)]
        backend: BackendArgs,

        /// Show what would change without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("sitelens=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { backend, serve } => run_serve(backend, serve).await?,
        Commands::Check { backend, json } => run_check(backend, json).await?,
        Commands::Sweep {
            backend,
            repair,
            json,
        } => run_sweep(backend, repair, json).await?,
        Commands::FixData {
            backend,
            dry_run,
            yes,
        } => run_fix_data(backend, dry_run, yes).await?,
        Commands::Admin { command } => match command {
            AdminCommands::Grant { email, backend } => run_admin_grant(backend, email).await?,
            AdminCommands::Revoke { email, backend } => run_admin_revoke(backend, email).await?,
        },
    }

    Ok(())
}
