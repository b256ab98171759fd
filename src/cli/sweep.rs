use serde::Serialize;

use super::{BackendArgs, init_backend};
use crate::sweep::{RepairLog, SweepReport, repair_one, sweep};

#[derive(Serialize)]
struct SweepOutput<'a> {
    report: &'a SweepReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    repair: Option<&'a RepairLog>,
}

fn print_report(report: &SweepReport) {
    println!("Sites:    {}", report.site_count);
    println!("Projects: {}", report.project_count);
    println!("Photos:   {}", report.photo_count);
    println!("Unlinked: {}", report.unlinked);

    for error in &report.errors {
        println!("Error: {error}");
    }

    if report.orphaned.is_empty() {
        println!("No orphaned photos.");
        return;
    }
    println!();
    println!("Orphaned photos ({}):", report.orphaned.len());
    for photo in &report.orphaned {
        println!(
            "  {}  site_id = {}  project_id = {}",
            photo.id,
            photo.site_id.as_deref().unwrap_or("NULL"),
            photo.project_id.as_deref().unwrap_or("NULL")
        );
    }
}

/// Reports orphaned and unlinked photos, optionally repairing the first one
/// that needs it.
pub async fn run_sweep(args: BackendArgs, repair: bool, json: bool) -> anyhow::Result<()> {
    let backend = init_backend(&args)?;

    let report = sweep(backend.as_ref()).await;
    let log = if repair {
        Some(repair_one(backend.as_ref()).await)
    } else {
        None
    };

    if json {
        let output = SweepOutput {
            report: &report,
            repair: log.as_ref(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_report(&report);
        if let Some(log) = &log {
            println!();
            for line in log.lines() {
                println!("{line}");
            }
        }
    }

    if !report.errors.is_empty() {
        anyhow::bail!("sweep could not load every table");
    }
    if log.as_ref().is_some_and(RepairLog::failed) {
        anyhow::bail!("repair failed");
    }
    Ok(())
}
