use crate::backend::PhotoFilter;
use crate::backend::local::MIN_PASSWORD_LEN;
use crate::server::dto::{ListPhotosParams, SignupRequest};
use crate::server::response::ApiError;
use crate::types::ProjectStatus;

const ALL: &str = "all";
const MAX_NAME_LEN: usize = 200;

/// Filter value from a query string; `all` and empty mean unset.
#[must_use]
pub fn selected(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case(ALL))
        .map(str::to_string)
}

#[must_use]
pub fn photo_filter(params: &ListPhotosParams) -> PhotoFilter {
    PhotoFilter {
        site_id: selected(params.site_id.as_deref()),
        project_id: selected(params.project_id.as_deref()),
        limit: None,
    }
}

/// Project status tab; defaults to Active.
pub fn project_status(status: Option<&str>) -> Result<ProjectStatus, ApiError> {
    match status.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(ProjectStatus::Active),
        Some(s) => ProjectStatus::parse(s)
            .ok_or_else(|| ApiError::bad_request(format!("Unknown project status '{s}'"))),
    }
}

pub fn validate_name(entity: &str, name: &str) -> Result<(), ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request(format!("{entity} name cannot be empty")));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::bad_request(format!(
            "{entity} name cannot exceed {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_signup(req: &SignupRequest) -> Result<(), ApiError> {
    if req.email.trim().is_empty() {
        return Err(ApiError::bad_request("Email is required"));
    }
    if req.password != req.confirm_password {
        return Err(ApiError::bad_request("Passwords do not match"));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Parses an optional manual coordinate from a form field.
pub fn coordinate(field: &str, value: Option<&str>, bound: f64) -> Result<Option<f64>, ApiError> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    let parsed: f64 = value
        .parse()
        .map_err(|_| ApiError::bad_request(format!("{field} must be a number")))?;
    if !parsed.is_finite() || parsed.abs() > bound {
        return Err(ApiError::bad_request(format!(
            "{field} must be between -{bound} and {bound}"
        )));
    }
    Ok(Some(parsed))
}
