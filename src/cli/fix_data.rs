use super::{BackendArgs, confirm_action, init_backend};
use crate::sweep::{AddressGroup, apply_backfill, plan_backfill};

fn print_plan(groups: &[AddressGroup]) {
    let photos: usize = groups.iter().map(|g| g.photos.len()).sum();
    println!(
        "Found {photos} unlinked photos in {} address groups:",
        groups.len()
    );
    for group in groups {
        println!(
            "  {} ({} photos) -> site '{}'",
            group.address.as_deref().unwrap_or("(no address)"),
            group.photos.len(),
            group.site_name()
        );
    }
}

/// Links every unlinked photo to a site and project, grouping by address.
pub async fn run_fix_data(args: BackendArgs, dry_run: bool, yes: bool) -> anyhow::Result<()> {
    let backend = init_backend(&args)?;

    let groups = plan_backfill(backend.as_ref()).await?;
    if groups.is_empty() {
        println!("No unlinked photos found.");
        return Ok(());
    }
    print_plan(&groups);

    if dry_run {
        println!("Dry run: no changes made.");
        return Ok(());
    }
    if !confirm_action("Create sites and projects and link these photos?", yes)? {
        println!("Aborted.");
        return Ok(());
    }

    let report = apply_backfill(backend.as_ref(), &groups).await;

    println!();
    println!("Sites created:    {}", report.sites_created);
    println!("Projects created: {}", report.projects_created);
    println!("Photos linked:    {}", report.photos_linked);
    println!();
    println!(
        "Final counts: {} sites, {} projects, {} photos",
        report.counts.sites, report.counts.projects, report.counts.photos
    );

    if !report.failures.is_empty() {
        for failure in &report.failures {
            eprintln!("Failed: {failure}");
        }
        anyhow::bail!(
            "{} of {} groups failed",
            report.failures.len(),
            report.groups
        );
    }
    Ok(())
}
