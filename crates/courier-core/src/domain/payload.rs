//! Shared payload building blocks: timestamps, metadata, status, field checks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::SchemaError;

/// Free-form metadata carried from request to response.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Metadata key that every envelope uses to carry its correlation id.
pub const REQUEST_ID_KEY: &str = "request_id";

/// `created_at` / `updated_at` stamped on every payload at envelope construction.
///
/// `DateTime<Utc>` serializes as RFC 3339 with an explicit `Z` offset, so the
/// wire never sees a native date/time value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Timestamps {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            updated_at: now,
        }
    }

    pub fn now() -> Self {
        Self::at(Utc::now())
    }
}

impl Default for Timestamps {
    fn default() -> Self {
        Self::now()
    }
}

/// Terminal outcome of a request. There is no partial state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Completed,
    Failed,
}

impl ResponseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseStatus::Completed => "completed",
            ResponseStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

pub(crate) fn require_non_blank(field: &'static str, value: &str) -> Result<(), SchemaError> {
    if value.trim().is_empty() {
        return Err(SchemaError::EmptyField(field));
    }
    Ok(())
}

pub(crate) fn require_in_range(
    field: &'static str,
    value: i64,
    min: i64,
    max: i64,
) -> Result<(), SchemaError> {
    if value < min || value > max {
        return Err(SchemaError::OutOfBounds {
            field,
            min,
            max,
            actual: value,
        });
    }
    Ok(())
}

/// Character-count bound on a text field (blank counts as empty).
pub(crate) fn require_text(field: &'static str, value: &str, max_chars: usize) -> Result<(), SchemaError> {
    require_non_blank(field, value)?;
    let len = value.chars().count();
    if len > max_chars {
        return Err(SchemaError::OutOfBounds {
            field,
            min: 1,
            max: max_chars as i64,
            actual: len as i64,
        });
    }
    Ok(())
}
