mod admin;
mod args;
mod check;
mod commands;
mod fix_data;
mod serve;
mod sweep;

use std::sync::Arc;

pub use admin::{run_admin_grant, run_admin_revoke};
pub use args::{BackendArgs, ServeArgs};
pub use check::run_check;
pub use commands::AdminCommands;
pub use fix_data::run_fix_data;
pub use serve::run_serve;
pub use sweep::run_sweep;

use crate::backend::{Backend, connect};
use crate::config::BackendKind;

/// Connect to the configured backend. A local database must already exist;
/// only `serve` creates one.
pub fn init_backend(args: &BackendArgs) -> anyhow::Result<Arc<dyn Backend>> {
    let file = args.load_file()?;
    let config = args.resolve(&file)?;

    if config.kind == BackendKind::Local && !config.db_path().exists() {
        anyhow::bail!(
            "Database not found at {}. Run 'sitelens serve' first.",
            config.db_path().display()
        );
    }

    Ok(connect(&config)?)
}

pub fn confirm_action(message: &str, yes: bool) -> anyhow::Result<bool> {
    if yes {
        Ok(true)
    } else {
        Ok(inquire::Confirm::new(message)
            .with_default(false)
            .prompt()?)
    }
}
