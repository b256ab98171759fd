use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a project. Stored as its display string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProjectStatus {
    #[default]
    Active,
    Completed,
}

impl ProjectStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Completed => "Completed",
        }
    }

    /// Parses a status string. Matching is case-insensitive so query strings
    /// like `?status=completed` work.
    pub fn parse(s: &str) -> Option<ProjectStatus> {
        if s.eq_ignore_ascii_case("active") {
            Some(Self::Active)
        } else if s.eq_ignore_ascii_case("completed") {
            Some(Self::Completed)
        } else {
            None
        }
    }

    #[must_use]
    pub const fn is_completed(self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
