//! Canonical work (comic) record.

use super::coerce::{as_number, as_text, as_text_list, as_year, clamp_f64, clamp_i64, slugify};
use super::rules::{CanonicalFields, FieldRule, WORK_RULES};
use super::SchemaRecord;
use crate::config::EntityKind;
use crate::error::{Result, SeedError};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const MIN_RELEASE_YEAR: i64 = 1900;
pub const MAX_RELEASE_YEAR: i64 = 2100;
pub const MAX_RATING: f64 = 10.0;

/// Publication status. Unrecognized values fall back to [`WorkStatus::Ongoing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkStatus {
    #[default]
    Ongoing,
    Completed,
    Hiatus,
    Cancelled,
}

impl WorkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkStatus::Ongoing => "ongoing",
            WorkStatus::Completed => "completed",
            WorkStatus::Hiatus => "hiatus",
            WorkStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "ongoing" | "publishing" | "releasing" | "updating" => Some(WorkStatus::Ongoing),
            "completed" | "complete" | "finished" | "ended" => Some(WorkStatus::Completed),
            "hiatus" | "on hiatus" | "paused" => Some(WorkStatus::Hiatus),
            "cancelled" | "canceled" | "dropped" | "discontinued" => Some(WorkStatus::Cancelled),
            _ => None,
        }
    }
}

/// A validated work ready for relationship resolution. Natural key: slug.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkRecord {
    pub slug: String,
    pub title: String,
    pub alternative_titles: Vec<String>,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    pub status: WorkStatus,
    /// Raw category name; blank or placeholder values resolve to the sentinel.
    pub category: Option<String>,
    pub authors: Vec<String>,
    pub artists: Vec<String>,
    pub genres: Vec<String>,
    pub release_year: Option<i64>,
    pub rating: Option<f64>,
    pub views: i64,
}

impl SchemaRecord for WorkRecord {
    const ENTITY: EntityKind = EntityKind::Works;

    fn rules() -> &'static [FieldRule] {
        WORK_RULES
    }

    fn from_fields(fields: &CanonicalFields, origin: &str) -> Result<Self> {
        let title = fields
            .get("title")
            .and_then(as_text)
            .ok_or_else(|| SeedError::validation(origin, "missing title"))?;

        let slug = fields
            .get("slug")
            .and_then(as_text)
            .map(|s| slugify(&s))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| slugify(&title));
        if slug.is_empty() {
            return Err(SeedError::validation(
                origin,
                format!("cannot derive a slug from title '{}'", title),
            ));
        }

        let status = match fields.get("status").and_then(as_text) {
            None => WorkStatus::default(),
            Some(raw) => WorkStatus::parse(&raw).unwrap_or_else(|| {
                warn!(
                    "{}: unknown status '{}', using '{}'",
                    origin,
                    raw,
                    WorkStatus::default().as_str()
                );
                WorkStatus::default()
            }),
        };

        let release_year = match fields.get("release_year") {
            None => None,
            Some(value) => match as_year(value) {
                Some(year) => Some(clamp_i64(
                    year,
                    MIN_RELEASE_YEAR,
                    MAX_RELEASE_YEAR,
                    "release_year",
                    origin,
                )),
                None => {
                    warn!("{}: unreadable release year {}, dropped", origin, value);
                    None
                }
            },
        };

        let rating = match fields.get("rating") {
            None => None,
            Some(value) => match as_number(value) {
                Some(r) => Some(clamp_f64(r, 0.0, MAX_RATING, "rating", origin)),
                None => {
                    warn!("{}: unreadable rating {}, dropped", origin, value);
                    None
                }
            },
        };

        let views = fields
            .get("views")
            .and_then(as_number)
            .map(|v| clamp_i64(v.trunc() as i64, 0, i64::MAX, "views", origin))
            .unwrap_or(0);

        let mut authors = fields.get("authors").map(as_text_list).unwrap_or_default();
        if authors.is_empty() {
            // Resolves to the placeholder contributor
            authors.push(String::new());
        }

        Ok(Self {
            slug,
            title,
            alternative_titles: fields
                .get("alternative_titles")
                .map(as_text_list)
                .unwrap_or_default(),
            description: fields.get("description").and_then(as_text),
            cover_url: fields.get("cover").and_then(as_text),
            status,
            category: fields.get("category").and_then(as_text),
            authors,
            artists: fields.get("artists").map(as_text_list).unwrap_or_default(),
            genres: fields.get("genres").map(as_text_list).unwrap_or_default(),
            release_year,
            rating,
            views,
        })
    }

    fn natural_key(&self) -> String {
        self.slug.clone()
    }
}
