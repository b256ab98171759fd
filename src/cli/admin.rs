use super::{BackendArgs, init_backend};
use crate::backend::local::normalize_email;

async fn set_admin_flag(args: BackendArgs, email: &str, is_admin: bool) -> anyhow::Result<()> {
    let backend = init_backend(&args)?;
    let email = normalize_email(email)?;

    let Some(profile) = backend.find_profile_by_email(&email).await? else {
        anyhow::bail!("No user found with email {email}");
    };

    if profile.is_admin == is_admin {
        let state = if is_admin { "already" } else { "not" };
        println!("{email} is {state} an admin.");
        return Ok(());
    }

    backend.set_admin(&profile.id, is_admin).await?;
    tracing::info!(user_id = %profile.id, is_admin, "admin flag changed");

    if is_admin {
        println!("Granted admin access to {email}.");
    } else {
        println!("Revoked admin access from {email}.");
    }
    Ok(())
}

pub async fn run_admin_grant(args: BackendArgs, email: String) -> anyhow::Result<()> {
    set_admin_flag(args, &email, true).await
}

pub async fn run_admin_revoke(args: BackendArgs, email: String) -> anyhow::Result<()> {
    set_admin_flag(args, &email, false).await
}
