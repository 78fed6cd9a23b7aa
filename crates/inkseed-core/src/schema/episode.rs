//! Canonical episode (chapter) record.

use super::coerce::{
    as_number, as_text, as_text_list, as_timestamp, clamp_f64, clamp_i64, format_number, slugify,
};
use super::rules::{CanonicalFields, FieldRule, EPISODE_RULES};
use super::SchemaRecord;
use crate::config::EntityKind;
use crate::error::{Result, SeedError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

/// Largest accepted episode number. Keys and default slugs render numbers
/// through an integer, so anything near `i64::MAX` would collide.
pub const MAX_EPISODE_NUMBER: f64 = 1_000_000.0;

/// A validated episode. Natural key: (parent work slug, number).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodeRecord {
    pub parent_slug: String,
    pub number: f64,
    pub title: Option<String>,
    pub slug: String,
    pub image_urls: Vec<String>,
    pub release_date: Option<DateTime<Utc>>,
    pub views: i64,
}

impl EpisodeRecord {
    /// Default slug when the source does not provide one.
    pub fn default_slug(parent_slug: &str, number: f64) -> String {
        slugify(&format!("{}-chapter-{}", parent_slug, format_number(number)))
    }
}

impl SchemaRecord for EpisodeRecord {
    const ENTITY: EntityKind = EntityKind::Episodes;

    fn rules() -> &'static [FieldRule] {
        EPISODE_RULES
    }

    fn from_fields(fields: &CanonicalFields, origin: &str) -> Result<Self> {
        let parent_slug = fields
            .get("parent_slug")
            .and_then(as_text)
            .map(|s| slugify(&s))
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SeedError::validation(origin, "missing parent work slug"))?;

        let raw_number = fields
            .get("number")
            .ok_or_else(|| SeedError::validation(origin, "missing episode number"))?;
        let number = as_number(raw_number).ok_or_else(|| {
            SeedError::validation(origin, format!("unreadable episode number {}", raw_number))
        })?;
        let number = clamp_f64(number, 0.0, MAX_EPISODE_NUMBER, "number", origin);

        let slug = fields
            .get("slug")
            .and_then(as_text)
            .map(|s| slugify(&s))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| Self::default_slug(&parent_slug, number));

        let release_date = match fields.get("release_date") {
            None => None,
            Some(value) => {
                let parsed = as_timestamp(value);
                if parsed.is_none() {
                    warn!("{}: unreadable release date {}, dropped", origin, value);
                }
                parsed
            }
        };

        let views = fields
            .get("views")
            .and_then(as_number)
            .map(|v| clamp_i64(v.trunc() as i64, 0, i64::MAX, "views", origin))
            .unwrap_or(0);

        Ok(Self {
            parent_slug,
            number,
            title: fields.get("title").and_then(as_text),
            slug,
            image_urls: fields.get("images").map(as_text_list).unwrap_or_default(),
            release_date,
            views,
        })
    }

    fn natural_key(&self) -> String {
        format!("{}#{}", self.parent_slug, format_number(self.number))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Result<EpisodeRecord> {
        let fields = CanonicalFields::from_object(value.as_object().unwrap(), EPISODE_RULES);
        EpisodeRecord::from_fields(&fields, "chapters.json#0")
    }

    #[test]
    fn test_legacy_names_and_default_slug() {
        let ep = parse(json!({
            "comicSlug": "Tower of Dawn",
            "chapter": "Chapter 12.5",
            "pages": ["https://cdn/1.jpg", "https://cdn/2.jpg"],
            "publishedAt": "2022-01-02"
        }))
        .unwrap();
        assert_eq!(ep.parent_slug, "tower-of-dawn");
        assert_eq!(ep.number, 12.5);
        assert_eq!(ep.slug, "tower-of-dawn-chapter-12-5");
        assert_eq!(ep.image_urls.len(), 2);
        assert!(ep.release_date.is_some());
        assert_eq!(ep.natural_key(), "tower-of-dawn#12.5");
    }

    #[test]
    fn test_negative_number_clamped() {
        let ep = parse(json!({"parentSlug": "a", "number": -2})).unwrap();
        assert_eq!(ep.number, 0.0);
    }

    #[test]
    fn test_huge_number_clamped() {
        let ep = parse(json!({"parentSlug": "a", "number": 1e20})).unwrap();
        assert_eq!(ep.number, MAX_EPISODE_NUMBER);
        assert_eq!(ep.natural_key(), "a#1000000");
    }

    #[test]
    fn test_rejections() {
        assert!(parse(json!({"number": 1})).is_err());
        assert!(parse(json!({"parentSlug": "a"})).is_err());
        assert!(parse(json!({"parentSlug": "a", "number": "special"})).is_err());
    }
}
