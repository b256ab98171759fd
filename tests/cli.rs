//! CLI integration tests for the sitelens binary.
//!
//! Each test uses an isolated temp directory for the database, ensuring tests
//! can run in parallel safely.

#![allow(deprecated)] // Command::cargo_bin deprecation only affects custom build dirs

use assert_cmd::Command;
use assert_fs::TempDir;
use chrono::Utc;
use predicates::prelude::*;
use serde_json::Value;

use sitelens::backend::{Backend, LocalBackend, PhotoFilter};
use sitelens::types::{Credentials, NewPhoto, NewProject, NewSite};

struct TestContext {
    temp_dir: TempDir,
}

impl TestContext {
    fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    fn data_dir_str(&self) -> String {
        self.temp_dir.path().to_string_lossy().to_string()
    }

    fn backend(&self) -> LocalBackend {
        LocalBackend::in_dir(self.temp_dir.path()).expect("failed to open backend")
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("sitelens").expect("failed to find binary");
        cmd.env("NO_COLOR", "1")
            .env_remove("SITELENS_BACKEND")
            .env_remove("SITELENS_DATA_DIR")
            .env_remove("SITELENS_BUCKET")
            .env_remove("SUPABASE_URL")
            .env_remove("SUPABASE_ANON_KEY");
        cmd
    }

    fn run_json(&self, args: &[&str]) -> Value {
        let output = self
            .cmd()
            .args(args)
            .args(["--data-dir", &self.data_dir_str(), "--json"])
            .output()
            .expect("failed to run command");
        assert!(
            output.status.success(),
            "command failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).expect("invalid JSON output")
    }
}

fn photo(site_id: Option<&str>, address: &str) -> NewPhoto {
    NewPhoto {
        file_name: format!("{}-site.jpg", Utc::now().timestamp_millis()),
        site_id: site_id.map(str::to_string),
        project_id: None,
        user_id: None,
        latitude: 51.5072,
        longitude: -0.1276,
        address: Some(address.to_string()),
        captured_at: Utc::now(),
    }
}

async fn is_admin(backend: &LocalBackend, email: &str) -> bool {
    backend
        .find_profile_by_email(email)
        .await
        .unwrap()
        .expect("profile exists")
        .is_admin
}

#[test]
fn test_help_lists_commands() {
    let ctx = TestContext::new();
    ctx.cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("sweep"))
        .stdout(predicate::str::contains("fix-data"));
}

#[test]
fn test_check_requires_existing_database() {
    let ctx = TestContext::new();
    ctx.cmd()
        .args(["check", "--data-dir", &ctx.data_dir_str()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Database not found"));
}

#[test]
fn test_supabase_without_credentials_is_fatal() {
    let ctx = TestContext::new();
    ctx.cmd()
        .args(["check", "--backend", "supabase"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing Supabase URL"));
}

#[test]
fn test_unknown_backend_is_rejected() {
    let ctx = TestContext::new();
    ctx.cmd()
        .args(["check", "--backend", "firebase"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown backend"));
}

#[test]
fn test_config_file_supplies_data_dir() {
    let ctx = TestContext::new();
    let _backend = ctx.backend();
    let config = ctx.temp_dir.path().join("sitelens.toml");
    std::fs::write(
        &config,
        format!("[backend]\ndata_dir = {:?}\n", ctx.data_dir_str()),
    )
    .unwrap();

    ctx.cmd()
        .args(["check", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Sites:    0"));
}

#[tokio::test]
async fn test_check_and_sweep_report_orphans() {
    let ctx = TestContext::new();
    let backend = ctx.backend();
    let site = backend
        .create_site(&NewSite {
            name: "Thames Wharf".into(),
            latitude: 51.5,
            longitude: -0.12,
            radius_meters: 100.0,
            folder_name: "thames_wharf".into(),
        })
        .await
        .unwrap();
    let project = backend
        .create_project(&NewProject::active("Phase 1", &site.id))
        .await
        .unwrap();
    backend
        .insert_photo(&NewPhoto {
            project_id: Some(project.id),
            ..photo(Some(&site.id), "1 Wharf Rd, London")
        })
        .await
        .unwrap();
    backend
        .insert_photo(&photo(Some("99"), "2 Wharf Rd, London"))
        .await
        .unwrap();

    let check = ctx.run_json(&["check"]);
    assert_eq!(check["counts"]["sites"], 1);
    assert_eq!(check["counts"]["photos"], 2);
    assert_eq!(check["photos"].as_array().unwrap().len(), 2);

    let sweep = ctx.run_json(&["sweep"]);
    let orphaned = sweep["report"]["orphaned"].as_array().unwrap();
    assert_eq!(orphaned.len(), 1);
    assert_eq!(orphaned[0]["site_id"], "99");
    assert!(sweep.get("repair").is_none());

    let sweep = ctx.run_json(&["sweep", "--repair"]);
    assert_eq!(sweep["repair"]["photo_id"], orphaned[0]["id"]);

    let sweep = ctx.run_json(&["sweep"]);
    assert!(sweep["report"]["orphaned"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_fix_data_dry_run_then_apply() {
    let ctx = TestContext::new();
    let backend = ctx.backend();
    for address in ["10 Quay St, Leeds", "10 Quay St, Leeds", "4 Mill Ln, York"] {
        backend.insert_photo(&photo(None, address)).await.unwrap();
    }

    ctx.cmd()
        .args(["fix-data", "--dry-run", "--data-dir", &ctx.data_dir_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Found 3 unlinked photos in 2 address groups"))
        .stdout(predicate::str::contains("Dry run"));
    assert_eq!(backend.count_sites().await.unwrap(), 0);

    ctx.cmd()
        .args(["fix-data", "--yes", "--data-dir", &ctx.data_dir_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Photos linked:    3"));

    assert_eq!(backend.count_sites().await.unwrap(), 2);
    let photos = backend.list_photos(&PhotoFilter::all()).await.unwrap();
    assert!(
        photos
            .iter()
            .all(|p| p.site_id.is_some() && p.project_id.is_some())
    );

    ctx.cmd()
        .args(["fix-data", "--data-dir", &ctx.data_dir_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains("No unlinked photos found"));
}

#[tokio::test]
async fn test_admin_grant_and_revoke() {
    let ctx = TestContext::new();
    let backend = ctx.backend();
    for email in ["owner@example.com", "crew@example.com"] {
        backend
            .sign_up(
                &Credentials {
                    email: email.into(),
                    password: "hunter22".into(),
                },
                "",
            )
            .await
            .unwrap();
    }

    assert!(!is_admin(&backend, "crew@example.com").await);

    ctx.cmd()
        .args(["admin", "grant", "--email", "Crew@Example.com"])
        .args(["--data-dir", &ctx.data_dir_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Granted admin access"));
    assert!(is_admin(&backend, "crew@example.com").await);

    ctx.cmd()
        .args(["admin", "revoke", "--email", "crew@example.com"])
        .args(["--data-dir", &ctx.data_dir_str()])
        .assert()
        .success();
    assert!(!is_admin(&backend, "crew@example.com").await);

    ctx.cmd()
        .args(["admin", "grant", "--email", "nobody@example.com"])
        .args(["--data-dir", &ctx.data_dir_str()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No user found"));
}
