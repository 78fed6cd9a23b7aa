//! Canonical user record.

use super::coerce::{as_text, normalize_email};
use super::rules::{CanonicalFields, FieldRule, USER_RULES};
use super::SchemaRecord;
use crate::config::EntityKind;
use crate::error::{Result, SeedError};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Account role. Unrecognized values fall back to [`UserRole::Reader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Reader,
    Author,
    Moderator,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Reader => "reader",
            UserRole::Author => "author",
            UserRole::Moderator => "moderator",
            UserRole::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "reader" | "user" | "member" => Some(UserRole::Reader),
            "author" | "creator" | "uploader" => Some(UserRole::Author),
            "moderator" | "mod" => Some(UserRole::Moderator),
            "admin" | "administrator" | "superuser" => Some(UserRole::Admin),
            _ => None,
        }
    }
}

/// A validated user ready for persistence. Natural key: lowercased email.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRecord {
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
}

impl SchemaRecord for UserRecord {
    const ENTITY: EntityKind = EntityKind::Users;

    fn rules() -> &'static [FieldRule] {
        USER_RULES
    }

    fn from_fields(fields: &CanonicalFields, origin: &str) -> Result<Self> {
        let raw_email = fields
            .get("email")
            .and_then(as_text)
            .ok_or_else(|| SeedError::validation(origin, "missing email"))?;
        let email = normalize_email(&raw_email)
            .ok_or_else(|| SeedError::validation(origin, format!("invalid email '{}'", raw_email)))?;

        let name = fields.get("name").and_then(as_text).unwrap_or_else(|| {
            email
                .split('@')
                .next()
                .unwrap_or(email.as_str())
                .to_string()
        });

        let role = match fields.get("role").and_then(as_text) {
            None => UserRole::default(),
            Some(raw) => UserRole::parse(&raw).unwrap_or_else(|| {
                warn!("{}: unknown role '{}', using '{}'", origin, raw, UserRole::default().as_str());
                UserRole::default()
            }),
        };

        Ok(Self {
            email,
            name,
            role,
            avatar_url: fields.get("avatar").and_then(as_text),
            bio: fields.get("bio").and_then(as_text),
        })
    }

    fn natural_key(&self) -> String {
        self.email.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Result<UserRecord> {
        let fields = CanonicalFields::from_object(value.as_object().unwrap(), USER_RULES);
        UserRecord::from_fields(&fields, "users.json#0")
    }

    #[test]
    fn test_legacy_field_names() {
        let user = parse(json!({
            "emailAddress": "Reader@Example.com",
            "displayName": "Reader One",
            "avatarUrl": "https://cdn.example.com/a.png",
            "userRole": "ADMIN"
        }))
        .unwrap();
        assert_eq!(user.email, "reader@example.com");
        assert_eq!(user.name, "Reader One");
        assert_eq!(user.role, UserRole::Admin);
        assert_eq!(user.avatar_url.as_deref(), Some("https://cdn.example.com/a.png"));
    }

    #[test]
    fn test_unknown_role_falls_back() {
        let user = parse(json!({"email": "x@y.io", "role": "wizard"})).unwrap();
        assert_eq!(user.role, UserRole::Reader);
        assert_eq!(user.name, "x");
    }

    #[test]
    fn test_missing_or_invalid_email_rejected() {
        assert!(parse(json!({"name": "No Mail"})).is_err());
        assert!(parse(json!({"email": "nobody"})).is_err());
    }
}
