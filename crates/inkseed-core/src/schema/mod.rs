//! Schema validation and normalization.
//!
//! Raw JSON documents are unwrapped into records, each record is mapped onto
//! its canonical field set through a declarative [`FieldRule`] table, and the
//! canonical fields are coerced into a typed record. Malformed records are
//! rejected one at a time; a bad record never aborts the file.

mod coerce;
mod episode;
mod rules;
mod user;
mod work;

pub use coerce::{format_number, slugify};
pub use episode::EpisodeRecord;
pub use rules::{CanonicalFields, FieldRule, EPISODE_RULES, USER_RULES, WORK_RULES};
pub use user::{UserRecord, UserRole};
pub use work::{WorkRecord, WorkStatus, MAX_RATING, MAX_RELEASE_YEAR, MIN_RELEASE_YEAR};

use crate::config::EntityKind;
use crate::error::{Result, SeedError};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A typed, canonical record produced from one raw JSON object.
pub trait SchemaRecord: Sized + Send + Sync + 'static {
    /// Entity this record seeds.
    const ENTITY: EntityKind;

    /// Legacy field table for this entity.
    fn rules() -> &'static [FieldRule];

    /// Coerce canonical fields into the typed record.
    ///
    /// `origin` identifies the record in log lines (`file#index`).
    fn from_fields(fields: &CanonicalFields, origin: &str) -> Result<Self>;

    /// Business key used to match existing rows.
    fn natural_key(&self) -> String;
}

/// A record that passed validation, with its origin for reporting.
#[derive(Debug, Clone)]
pub struct Validated<T> {
    pub origin: String,
    pub record: T,
}

/// A record (or whole document) that failed validation.
#[derive(Debug, Clone)]
pub struct RejectedRecord {
    pub origin: String,
    pub message: String,
}

/// Result of validating all files for one entity.
#[derive(Debug, Clone)]
pub struct ValidationOutcome<T> {
    pub records: Vec<Validated<T>>,
    pub rejected: Vec<RejectedRecord>,
    pub files: usize,
}

impl<T> Default for ValidationOutcome<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            rejected: Vec::new(),
            files: 0,
        }
    }
}

impl<T: SchemaRecord> ValidationOutcome<T> {
    fn reject(&mut self, err: SeedError, origin: String) {
        warn!("Rejected {} record {}: {}", T::ENTITY, origin, err);
        let message = match err {
            SeedError::Validation { message, .. } => message,
            other => other.to_string(),
        };
        self.rejected.push(RejectedRecord { origin, message });
    }
}

/// Validate every record in a parsed document.
///
/// A bare object is treated as a one-element array, unless it wraps the record
/// array under one of the entity's wrapper keys (`data`, `items`, ...).
pub fn validate_document<T: SchemaRecord>(document: Value, source: &str) -> ValidationOutcome<T> {
    let mut outcome = ValidationOutcome::default();
    validate_into(document, source, &mut outcome);
    outcome
}

fn validate_into<T: SchemaRecord>(document: Value, source: &str, outcome: &mut ValidationOutcome<T>) {
    let items = match unwrap_document(document, T::ENTITY) {
        Ok(items) => items,
        Err(message) => {
            outcome.reject(SeedError::validation(source, message), source.to_string());
            return;
        }
    };

    for (index, item) in items.into_iter().enumerate() {
        let origin = format!("{}#{}", source, index);
        let Value::Object(raw) = item else {
            outcome.reject(
                SeedError::validation(&origin, "record is not a JSON object"),
                origin,
            );
            continue;
        };

        let fields = CanonicalFields::from_object(&raw, T::rules());
        match T::from_fields(&fields, &origin) {
            Ok(record) => outcome.records.push(Validated { origin, record }),
            Err(err) => outcome.reject(err, origin),
        }
    }
}

fn unwrap_document(document: Value, entity: EntityKind) -> std::result::Result<Vec<Value>, String> {
    match document {
        Value::Array(items) => Ok(items),
        Value::Object(mut obj) => {
            let wrapper = entity
                .wrapper_keys()
                .iter()
                .find(|key| matches!(obj.get(**key), Some(Value::Array(_))));
            match wrapper {
                Some(key) => match obj.remove(*key) {
                    Some(Value::Array(items)) => Ok(items),
                    _ => Ok(Vec::new()),
                },
                None => Ok(vec![Value::Object(obj)]),
            }
        }
        other => Err(format!(
            "expected a JSON array or object, found {}",
            json_type_name(&other)
        )),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Read and validate every file for one entity.
///
/// An unreadable or unparseable file counts as one rejected record and the
/// remaining files are still processed.
pub fn load_files<T: SchemaRecord>(files: &[PathBuf]) -> ValidationOutcome<T> {
    let mut outcome = ValidationOutcome::default();

    for path in files {
        outcome.files += 1;
        let source = display_name(path);
        match read_document(path) {
            Ok(document) => {
                let before = outcome.records.len();
                validate_into(document, &source, &mut outcome);
                debug!(
                    "{}: {} valid {} record(s)",
                    source,
                    outcome.records.len() - before,
                    T::ENTITY
                );
            }
            Err(err) => outcome.reject(err, source),
        }
    }

    outcome
}

fn read_document(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path).map_err(|e| SeedError::io_with_path(e, path))?;
    let value = serde_json::from_str(&text)?;
    Ok(value)
}

fn display_name(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_bare_object_is_wrapped() {
        let outcome: ValidationOutcome<UserRecord> =
            validate_document(json!({"email": "solo@example.com"}), "one.json");
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].origin, "one.json#0");
    }

    #[test]
    fn test_wrapper_key_is_unwrapped() {
        let outcome: ValidationOutcome<WorkRecord> = validate_document(
            json!({"data": [{"title": "A"}, {"title": "B"}], "page": 1}),
            "page.json",
        );
        assert_eq!(outcome.records.len(), 2);
    }

    #[test]
    fn test_malformed_records_rejected_individually() {
        let outcome: ValidationOutcome<WorkRecord> = validate_document(
            json!([{"title": "Good"}, 7, {"summary": "no title"}, {"name": "Also good"}]),
            "mixed.json",
        );
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.rejected.len(), 2);
        assert_eq!(outcome.rejected[0].origin, "mixed.json#1");
        assert_eq!(outcome.rejected[1].message, "missing title");
    }

    #[test]
    fn test_scalar_document_rejected() {
        let outcome: ValidationOutcome<UserRecord> = validate_document(json!("nope"), "bad.json");
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.rejected.len(), 1);
    }

    #[test]
    fn test_unparseable_file_counts_once_and_continues() {
        let temp = TempDir::new().unwrap();
        let broken = temp.path().join("a.json");
        let good = temp.path().join("b.json");
        std::fs::write(&broken, "{ not json").unwrap();
        std::fs::write(&good, r#"[{"email": "ok@example.com"}]"#).unwrap();

        let outcome: ValidationOutcome<UserRecord> = load_files(&[broken, good]);
        assert_eq!(outcome.files, 2);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.rejected.len(), 1);
    }
}
