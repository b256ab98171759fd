use serde::Serialize;

use super::{BackendArgs, init_backend};
use crate::backend::PhotoFilter;
use crate::sweep::TableCounts;
use crate::types::Photo;

#[derive(Serialize)]
struct PhotoOutput {
    id: String,
    address: Option<String>,
    site_id: Option<String>,
    project_id: Option<String>,
}

impl From<&Photo> for PhotoOutput {
    fn from(photo: &Photo) -> Self {
        Self {
            id: photo.id.clone(),
            address: photo.address.clone(),
            site_id: photo.site_id.clone(),
            project_id: photo.project_id.clone(),
        }
    }
}

#[derive(Serialize)]
struct CheckOutput {
    counts: TableCounts,
    photos: Vec<PhotoOutput>,
}

fn print_check(output: &CheckOutput) {
    println!("Database counts:");
    println!("  Sites:    {}", output.counts.sites);
    println!("  Projects: {}", output.counts.projects);
    println!("  Photos:   {}", output.counts.photos);

    if output.photos.is_empty() {
        return;
    }
    println!();
    println!("Photo details:");
    for (i, photo) in output.photos.iter().enumerate() {
        println!("  Photo {}:", i + 1);
        println!("    ID:         {}", photo.id);
        println!("    Address:    {}", photo.address.as_deref().unwrap_or("NULL"));
        println!("    Site ID:    {}", photo.site_id.as_deref().unwrap_or("NULL"));
        println!("    Project ID: {}", photo.project_id.as_deref().unwrap_or("NULL"));
    }
}

/// Verifies the backend answers and prints what it holds. Unlike the
/// dashboard, any failed query fails the command.
pub async fn run_check(args: BackendArgs, json: bool) -> anyhow::Result<()> {
    let backend = init_backend(&args)?;
    let backend = backend.as_ref();

    let all_photos = PhotoFilter::all();
    let (sites, projects, photos) = futures::join!(
        backend.count_sites(),
        backend.count_projects(None),
        backend.list_photos(&all_photos),
    );
    let photos = photos?;
    let output = CheckOutput {
        counts: TableCounts {
            sites: sites?,
            projects: projects?,
            photos: photos.len() as u64,
        },
        photos: photos.iter().map(PhotoOutput::from).collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_check(&output);
    }

    Ok(())
}
