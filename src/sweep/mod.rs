//! Data consistency checks and repairs.
//!
//! Multi-step writes (site, then project, then photo link) are not atomic,
//! and mobile clients write photo rows directly. Photos can therefore point
//! at sites that do not exist, or at nothing. This module finds those rows
//! and relinks them; it never deletes anything.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::backend::{Backend, PhotoFilter, ProjectFilter};
use crate::error::Result;
use crate::types::*;

pub const REPAIR_RADIUS_METERS: f64 = 100.0;
pub const INITIAL_PROJECT_NAME: &str = "Initial Project";
pub const DEFAULT_PROJECT_NAME: &str = "Default Project";
const UNNAMED_SITE: &str = "Unnamed Site";

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub site_count: usize,
    pub project_count: usize,
    pub photo_count: usize,
    /// Photos whose `site_id` names a site that does not exist.
    pub orphaned: Vec<Photo>,
    /// Photos with no site at all.
    pub unlinked: usize,
    pub errors: Vec<String>,
}

impl SweepReport {
    #[must_use]
    pub fn has_orphans(&self) -> bool {
        !self.orphaned.is_empty()
    }
}

/// Photos with a non-null `site_id` that matches none of `sites`.
#[must_use]
pub fn find_orphans(sites: &[Site], photos: &[Photo]) -> Vec<Photo> {
    let site_ids: HashSet<&str> = sites.iter().map(|s| s.id.as_str()).collect();
    photos
        .iter()
        .filter(|p| {
            p.site_id
                .as_deref()
                .is_some_and(|id| !site_ids.contains(id))
        })
        .cloned()
        .collect()
}

/// Loads every table and reports orphaned and unlinked photos. A table that
/// fails to load is recorded in `errors` and counted as empty.
pub async fn sweep(backend: &dyn Backend) -> SweepReport {
    let mut errors = Vec::new();

    let project_filter = ProjectFilter::default();
    let all_photos = PhotoFilter::all();
    let (sites, projects, photos) = futures::join!(
        backend.list_sites(),
        backend.list_projects(&project_filter),
        backend.list_photos(&all_photos),
    );
    let sites = sites.unwrap_or_else(|e| {
        errors.push(format!("Sites error: {e}"));
        Vec::new()
    });
    let projects = projects.unwrap_or_else(|e| {
        errors.push(format!("Projects error: {e}"));
        Vec::new()
    });
    let photos = photos.unwrap_or_else(|e| {
        errors.push(format!("Photos error: {e}"));
        Vec::new()
    });

    let orphaned = find_orphans(&sites, &photos);
    if !orphaned.is_empty() {
        tracing::warn!(count = orphaned.len(), "photos reference missing sites");
    }

    SweepReport {
        site_count: sites.len(),
        project_count: projects.len(),
        photo_count: photos.len(),
        unlinked: photos.iter().filter(|p| p.site_id.is_none()).count(),
        orphaned,
        errors,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepLevel {
    Info,
    Done,
    Warning,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairStep {
    pub level: StepLevel,
    pub message: String,
}

/// Step-by-step account of a single repair.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RepairLog {
    pub photo_id: Option<String>,
    pub steps: Vec<RepairStep>,
}

impl RepairLog {
    fn push(&mut self, level: StepLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            StepLevel::Warning | StepLevel::Failed => tracing::warn!("{message}"),
            StepLevel::Info | StepLevel::Done => tracing::info!("{message}"),
        }
        self.steps.push(RepairStep { level, message });
    }

    #[must_use]
    pub fn failed(&self) -> bool {
        self.steps.iter().any(|s| s.level == StepLevel::Failed)
    }

    /// Lines in display order.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.steps
            .iter()
            .map(|step| match step.level {
                StepLevel::Info => step.message.clone(),
                StepLevel::Done => format!("✅ {}", step.message),
                StepLevel::Warning => format!("⚠️ Warning: {}", step.message),
                StepLevel::Failed => format!("❌ Error: {}", step.message),
            })
            .collect()
    }
}

/// Site name for a photo: the first comma-separated part of its address.
#[must_use]
pub fn site_name_from_address(address: Option<&str>) -> String {
    address
        .and_then(|a| a.split(',').next())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(UNNAMED_SITE)
        .to_string()
}

/// Lowercase folder label: runs of anything but letters and digits become `_`.
#[must_use]
pub fn folder_name_for(name: &str) -> String {
    let mut folder = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_alphanumeric() {
            folder.extend(c.to_lowercase());
        } else if !folder.ends_with('_') {
            folder.push('_');
        }
    }
    folder.trim_matches('_').to_string()
}

fn needs_repair(photo: &Photo, site_ids: &HashSet<&str>) -> bool {
    let site_ok = photo
        .site_id
        .as_deref()
        .is_some_and(|id| site_ids.contains(id));
    !site_ok || photo.project_id.is_none()
}

/// Fixes the first photo that is missing a valid site or a project.
///
/// Creates a site at the photo's coordinates when needed, then links the
/// photo to the site's first active project, creating one if there is none.
/// Failure to link the project is a warning; any earlier failure stops the
/// repair with a `Failed` step.
pub async fn repair_one(backend: &dyn Backend) -> RepairLog {
    let mut log = RepairLog::default();
    if let Err(e) = repair_first(backend, &mut log).await {
        log.push(StepLevel::Failed, e.to_string());
    }
    log
}

async fn repair_first(backend: &dyn Backend, log: &mut RepairLog) -> Result<()> {
    let sites = backend.list_sites().await?;
    let photos = backend.list_photos(&PhotoFilter::all()).await?;

    let site_ids: HashSet<&str> = sites.iter().map(|s| s.id.as_str()).collect();
    let Some(photo) = photos.iter().find(|p| needs_repair(p, &site_ids)) else {
        log.push(StepLevel::Info, "No photos need repair");
        return Ok(());
    };

    log.photo_id = Some(photo.id.clone());
    log.push(
        StepLevel::Info,
        format!(
            "Found photo: {} at {}",
            photo.file_name,
            photo.address.as_deref().unwrap_or("unknown address")
        ),
    );

    let site_id = match &photo.site_id {
        Some(id) if !site_ids.contains(id.as_str()) => {
            log.push(
                StepLevel::Info,
                format!("Site ID {id} not found - creating new site"),
            );
            None
        }
        other => other.clone(),
    };

    let site_id = match site_id {
        Some(id) => {
            log.push(StepLevel::Info, format!("Site already exists (ID: {id})"));
            id
        }
        None => {
            let name = site_name_from_address(photo.address.as_deref());
            let site = backend
                .create_site(&NewSite {
                    folder_name: folder_name_for(&name),
                    name,
                    latitude: photo.latitude,
                    longitude: photo.longitude,
                    radius_meters: REPAIR_RADIUS_METERS,
                })
                .await?;
            log.push(
                StepLevel::Done,
                format!("Created site: {} (ID: {})", site.name, site.id),
            );

            backend
                .link_photo(&photo.id, &PhotoLink::site(&site.id))
                .await?;
            log.push(StepLevel::Done, "Linked photo to site");
            site.id
        }
    };

    let active = backend
        .list_projects(&ProjectFilter {
            site_id: Some(site_id.clone()),
            status: Some(ProjectStatus::Active),
        })
        .await?;

    let project_id = match active.into_iter().next() {
        Some(project) => {
            log.push(
                StepLevel::Info,
                format!("Project already exists (ID: {})", project.id),
            );
            project.id
        }
        None => {
            let project = backend
                .create_project(&NewProject::active(INITIAL_PROJECT_NAME, &site_id))
                .await?;
            log.push(
                StepLevel::Done,
                format!("Created project: {} (ID: {})", project.name, project.id),
            );
            project.id
        }
    };

    if photo.project_id.as_deref() == Some(project_id.as_str()) {
        return Ok(());
    }
    match backend
        .link_photo(&photo.id, &PhotoLink::project(&project_id))
        .await
    {
        Ok(()) => log.push(StepLevel::Done, "Linked photo to project"),
        Err(e) => log.push(
            StepLevel::Warning,
            format!("Failed to link photo to project: {e}"),
        ),
    }
    Ok(())
}

/// Unlinked photos sharing one address.
#[derive(Debug, Clone, Serialize)]
pub struct AddressGroup {
    pub address: Option<String>,
    pub photos: Vec<Photo>,
}

impl AddressGroup {
    #[must_use]
    pub fn site_name(&self) -> String {
        site_name_from_address(self.address.as_deref())
    }
}

/// Unlinked photos grouped by address, in first-seen order.
pub async fn plan_backfill(backend: &dyn Backend) -> Result<Vec<AddressGroup>> {
    let sites = backend.list_sites().await?;
    let photos = backend.list_photos(&PhotoFilter::all()).await?;
    let site_ids: HashSet<&str> = sites.iter().map(|s| s.id.as_str()).collect();

    let mut groups: Vec<AddressGroup> = Vec::new();
    let mut index: HashMap<Option<String>, usize> = HashMap::new();
    for photo in photos.into_iter().filter(|p| needs_repair(p, &site_ids)) {
        let slot = *index.entry(photo.address.clone()).or_insert_with(|| {
            groups.push(AddressGroup {
                address: photo.address.clone(),
                photos: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].photos.push(photo);
    }
    Ok(groups)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub sites: u64,
    pub projects: u64,
    pub photos: u64,
}

impl TableCounts {
    /// Counts that fail to load are reported as zero.
    pub async fn load(backend: &dyn Backend) -> Self {
        let all_photos = PhotoFilter::all();
        let (sites, projects, photos) = futures::join!(
            backend.count_sites(),
            backend.count_projects(None),
            backend.count_photos(&all_photos),
        );
        Self {
            sites: sites.unwrap_or_default(),
            projects: projects.unwrap_or_default(),
            photos: photos.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BackfillReport {
    pub groups: usize,
    pub sites_created: usize,
    pub projects_created: usize,
    pub photos_linked: usize,
    pub failures: Vec<String>,
    pub counts: TableCounts,
}

/// Links every photo in `groups` to a site and an active project. A group
/// that fails is recorded and skipped; the rest still run.
pub async fn apply_backfill(backend: &dyn Backend, groups: &[AddressGroup]) -> BackfillReport {
    let mut report = BackfillReport {
        groups: groups.len(),
        ..BackfillReport::default()
    };

    for group in groups {
        if let Err(e) = backfill_group(backend, group, &mut report).await {
            let label = group.address.as_deref().unwrap_or("(no address)");
            tracing::error!(address = label, "backfill failed: {e}");
            report.failures.push(format!("{label}: {e}"));
        }
    }

    report.counts = TableCounts::load(backend).await;
    report
}

async fn backfill_group(
    backend: &dyn Backend,
    group: &AddressGroup,
    report: &mut BackfillReport,
) -> Result<()> {
    let Some(first) = group.photos.first() else {
        return Ok(());
    };

    let site = match backend.find_site_at(first.latitude, first.longitude).await? {
        Some(site) => {
            tracing::info!(site_id = %site.id, "site already exists");
            site
        }
        None => {
            let name = group.site_name();
            let site = backend
                .create_site(&NewSite {
                    folder_name: group.address.clone().unwrap_or_else(|| folder_name_for(&name)),
                    name,
                    latitude: first.latitude,
                    longitude: first.longitude,
                    radius_meters: REPAIR_RADIUS_METERS,
                })
                .await?;
            tracing::info!(site_id = %site.id, name = %site.name, "created site");
            report.sites_created += 1;
            site
        }
    };

    let active = backend
        .list_projects(&ProjectFilter {
            site_id: Some(site.id.clone()),
            status: Some(ProjectStatus::Active),
        })
        .await?;
    let project = match active.into_iter().next() {
        Some(project) => project,
        None => {
            let project = backend
                .create_project(&NewProject::active(DEFAULT_PROJECT_NAME, &site.id))
                .await?;
            tracing::info!(project_id = %project.id, "created project");
            report.projects_created += 1;
            project
        }
    };

    for photo in &group.photos {
        match backend
            .link_photo(&photo.id, &PhotoLink::both(&site.id, &project.id))
            .await
        {
            Ok(()) => {
                tracing::info!(photo_id = %photo.id, site_id = %site.id, project_id = %project.id, "linked photo");
                report.photos_linked += 1;
            }
            Err(e) => {
                tracing::error!(photo_id = %photo.id, "failed to link photo: {e}");
                report.failures.push(format!("photo {}: {e}", photo.id));
            }
        }
    }
    Ok(())
}
