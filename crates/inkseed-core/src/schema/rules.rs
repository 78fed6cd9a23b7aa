//! Declarative legacy-field tables.
//!
//! Each entity has an ordered list of [`FieldRule`]s. For every canonical field
//! the first alias present with a non-null value wins. Rules are evaluated once
//! per record into [`CanonicalFields`], which the typed extractors read.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Maps a set of historical field names onto one canonical field.
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub canonical: &'static str,
    /// Accepted source names, highest priority first.
    pub aliases: &'static [&'static str],
}

impl FieldRule {
    pub const fn new(canonical: &'static str, aliases: &'static [&'static str]) -> Self {
        Self { canonical, aliases }
    }
}

pub const USER_RULES: &[FieldRule] = &[
    FieldRule::new("email", &["email", "emailAddress", "email_address", "mail"]),
    FieldRule::new(
        "name",
        &["name", "username", "userName", "displayName", "display_name", "fullName"],
    ),
    FieldRule::new("role", &["role", "userRole", "user_role", "type"]),
    FieldRule::new("avatar", &["avatar", "avatarUrl", "avatar_url", "image", "photo"]),
    FieldRule::new("bio", &["bio", "about", "description"]),
];

pub const WORK_RULES: &[FieldRule] = &[
    FieldRule::new("title", &["title", "name", "comicTitle", "comic_title"]),
    FieldRule::new("slug", &["slug", "comicSlug", "comic_slug"]),
    FieldRule::new(
        "alternative_titles",
        &["alternativeTitles", "alternative_titles", "altTitles", "otherNames", "other_names"],
    ),
    FieldRule::new("description", &["description", "summary", "synopsis"]),
    FieldRule::new(
        "cover",
        &["cover", "coverImage", "cover_image", "coverUrl", "cover_url", "thumbnail", "image"],
    ),
    FieldRule::new("status", &["status", "publicationStatus", "publication_status"]),
    FieldRule::new("category", &["category", "type", "comicType", "comic_type"]),
    FieldRule::new("authors", &["authors", "author", "writer", "writers"]),
    FieldRule::new("artists", &["artists", "artist", "illustrator"]),
    FieldRule::new("genres", &["genres", "genre", "tags"]),
    FieldRule::new(
        "release_year",
        &["releaseYear", "release_year", "year", "released", "releaseDate", "release_date"],
    ),
    FieldRule::new("rating", &["rating", "score"]),
    FieldRule::new("views", &["views", "viewCount", "view_count"]),
];

pub const EPISODE_RULES: &[FieldRule] = &[
    FieldRule::new(
        "parent_slug",
        &["parentSlug", "parent_slug", "comicSlug", "comic_slug", "workSlug", "comic"],
    ),
    FieldRule::new(
        "number",
        &["number", "chapterNumber", "chapter_number", "chapter", "episode"],
    ),
    FieldRule::new("title", &["title", "name", "chapterTitle", "chapter_title"]),
    FieldRule::new("slug", &["slug", "chapterSlug", "chapter_slug"]),
    FieldRule::new("images", &["images", "pages", "imageUrls", "image_urls"]),
    FieldRule::new(
        "release_date",
        &["releaseDate", "release_date", "publishedAt", "published_at", "date"],
    ),
    FieldRule::new("views", &["views", "viewCount", "view_count"]),
];

/// A record's values keyed by canonical field name.
#[derive(Debug, Clone, Default)]
pub struct CanonicalFields {
    values: Map<String, Value>,
    /// Source field each canonical value came from.
    sources: BTreeMap<&'static str, &'static str>,
}

impl CanonicalFields {
    /// Apply `rules` to a raw JSON object.
    pub fn from_object(raw: &Map<String, Value>, rules: &[FieldRule]) -> Self {
        let mut fields = Self::default();
        for rule in rules {
            let hit = rule
                .aliases
                .iter()
                .find_map(|alias| match raw.get(*alias) {
                    Some(Value::Null) | None => None,
                    Some(value) => Some((*alias, value)),
                });
            if let Some((alias, value)) = hit {
                fields
                    .values
                    .insert(rule.canonical.to_string(), value.clone());
                fields.sources.insert(rule.canonical, alias);
            }
        }
        fields
    }

    pub fn get(&self, canonical: &str) -> Option<&Value> {
        self.values.get(canonical)
    }

    /// The source field name a canonical value was read from.
    pub fn source_of(&self, canonical: &str) -> Option<&str> {
        self.sources.get(canonical).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
