//! Knowledge records
//!
//! A record is a troubleshooting entry: what went wrong, how it was fixed,
//! and a few tags saying where. Records are validated, flattened into one
//! canonical text for embedding, and stored with their fields as metadata.

use crate::{KbError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Version of the canonical record schema
pub const SCHEMA_VERSION: u32 = 1;

/// Fields that make up the canonical text, in embedding order
const CANONICAL_FIELDS: [&str; 6] = ["title", "problem", "solution", "machine", "type", "project"];

/// Metadata stored with each vector
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Record as submitted by a caller, before validation (schema v1)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(deny_unknown_fields)]
pub struct RecordInput {
    /// Caller-supplied id; derived from the title when absent
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(example = "pump-seal-leak"))]
    pub id: Option<String>,
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(example = "Pump seal leak"))]
    pub title: Option<String>,
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(example = "Water drips from the pump housing"))]
    pub problem: Option<String>,
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(example = "Replace the mechanical seal"))]
    pub solution: Option<String>,
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(example = "P-100"))]
    pub machine: Option<String>,
    #[serde(default, rename = "type")]
    #[cfg_attr(feature = "openapi", schema(example = "maintenance"))]
    pub record_type: Option<String>,
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(example = "plant-a"))]
    pub project: Option<String>,
}

/// Validated knowledge record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    id: Option<String>,
    pub title: String,
    pub problem: String,
    pub solution: String,
    pub machine: Option<String>,
    pub record_type: Option<String>,
    pub project: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl TryFrom<RecordInput> for Record {
    type Error = KbError;

    fn try_from(input: RecordInput) -> Result<Self> {
        let title = non_blank(input.title);
        let problem = non_blank(input.problem);
        let solution = non_blank(input.solution);

        let missing: Vec<&str> = [("title", &title), ("problem", &problem), ("solution", &solution)]
            .into_iter()
            .filter(|(_, v)| v.is_none())
            .map(|(name, _)| name)
            .collect();

        match (title, problem, solution) {
            (Some(title), Some(problem), Some(solution)) => Ok(Self {
                id: non_blank(input.id),
                title,
                problem,
                solution,
                machine: non_blank(input.machine),
                record_type: non_blank(input.record_type),
                project: non_blank(input.project),
            }),
            _ => Err(KbError::Validation(format!(
                "missing required field(s): {}",
                missing.join(", ")
            ))),
        }
    }
}

impl Record {
    /// Create a record from its required fields
    pub fn new(
        title: impl Into<String>,
        problem: impl Into<String>,
        solution: impl Into<String>,
    ) -> Result<Self> {
        Self::try_from(RecordInput {
            title: Some(title.into()),
            problem: Some(problem.into()),
            solution: Some(solution.into()),
            ..Default::default()
        })
    }

    /// Set the caller-supplied identifier
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = non_blank(Some(id.into()));
        self
    }

    /// Set the machine tag
    pub fn with_machine(mut self, machine: impl Into<String>) -> Self {
        self.machine = non_blank(Some(machine.into()));
        self
    }

    /// Set the record type tag
    pub fn with_type(mut self, record_type: impl Into<String>) -> Self {
        self.record_type = non_blank(Some(record_type.into()));
        self
    }

    /// Set the project tag
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = non_blank(Some(project.into()));
        self
    }

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "title" => Some(&self.title),
            "problem" => Some(&self.problem),
            "solution" => Some(&self.solution),
            "machine" => self.machine.as_deref(),
            "type" => self.record_type.as_deref(),
            "project" => self.project.as_deref(),
            _ => None,
        }
    }

    /// Embedding input: present fields in canonical order, one per line
    pub fn canonical_text(&self) -> String {
        CANONICAL_FIELDS
            .iter()
            .filter_map(|name| self.field(name))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Entry identifier: caller id, else title slug, else content digest
    pub fn resolve_id(&self) -> String {
        if let Some(id) = &self.id {
            return id.clone();
        }

        let slug = slugify(&self.title);
        if !slug.is_empty() {
            return slug;
        }

        let digest = Sha256::digest(self.canonical_text().as_bytes());
        let hex = format!("{digest:x}");
        format!("record-{}", &hex[..16])
    }

    /// Record fields plus id and schema version, as stored in the index
    pub fn metadata(&self, id: &str) -> Metadata {
        let mut metadata: Metadata = CANONICAL_FIELDS
            .iter()
            .filter_map(|name| {
                self.field(name)
                    .map(|v| (name.to_string(), serde_json::Value::from(v)))
            })
            .collect();

        metadata.insert("id".to_string(), serde_json::Value::from(id));
        metadata.insert(
            "schema_version".to_string(),
            serde_json::Value::from(SCHEMA_VERSION),
        );
        metadata
    }
}

/// Rebuild the canonical text from stored metadata
pub fn metadata_text(metadata: &Metadata) -> String {
    CANONICAL_FIELDS
        .iter()
        .filter_map(|name| metadata.get(*name).and_then(|v| v.as_str()))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Lowercase ASCII slug, runs of anything else collapsed to one `-`
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;

    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn full_input() -> RecordInput {
        RecordInput {
            id: None,
            title: Some("T".to_string()),
            problem: Some("p".to_string()),
            solution: Some("s".to_string()),
            machine: Some("m".to_string()),
            record_type: Some("t".to_string()),
            project: Some("prj".to_string()),
        }
    }

    #[test]
    fn test_missing_fields_are_listed() {
        let input = RecordInput {
            title: Some("T".to_string()),
            problem: Some("   ".to_string()),
            ..Default::default()
        };

        let err = Record::try_from(input).unwrap_err();
        match err {
            KbError::Validation(msg) => {
                assert!(msg.contains("problem"));
                assert!(msg.contains("solution"));
                assert!(!msg.contains("title"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_canonical_text_order() {
        let record = Record::try_from(full_input()).unwrap();
        assert_eq!(record.canonical_text(), "T\np\ns\nm\nt\nprj");
    }

    #[test]
    fn test_canonical_text_skips_absent_tags() {
        let record = Record::new(" Pump ", "leaks", "tighten seal")
            .unwrap()
            .with_project("north");
        assert_eq!(record.canonical_text(), "Pump\nleaks\ntighten seal\nnorth");
    }

    #[test]
    fn test_resolve_id_policy() {
        let record = Record::new("Pump Fails: Cold Start!", "p", "s").unwrap();
        assert_eq!(record.resolve_id(), "pump-fails-cold-start");

        let record = record.with_id("  custom-7 ");
        assert_eq!(record.resolve_id(), "custom-7");

        let record = Record::new("???", "p", "s").unwrap();
        let id = record.resolve_id();
        assert!(id.starts_with("record-"));
        assert_eq!(id, record.resolve_id());
    }

    #[test]
    fn test_metadata_contains_all_fields() {
        let record = Record::try_from(full_input()).unwrap();
        let metadata = record.metadata("t");

        for field in CANONICAL_FIELDS {
            assert!(metadata.contains_key(field), "missing {field}");
        }
        assert_eq!(metadata["id"], "t");
        assert_eq!(metadata["schema_version"], SCHEMA_VERSION);
        assert_eq!(metadata["type"], "t");
    }

    #[test]
    fn test_metadata_text_matches_canonical_text() {
        let record = Record::try_from(full_input()).unwrap();
        let metadata = record.metadata(&record.resolve_id());
        assert_eq!(metadata_text(&metadata), record.canonical_text());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let parsed: std::result::Result<RecordInput, _> =
            serde_json::from_str(r#"{"title":"a","problme":"typo","solution":"s"}"#);
        assert!(parsed.is_err());
    }

    proptest! {
        #[test]
        fn canonical_text_is_deterministic(
            title in "[a-zA-Z0-9 ]{1,30}",
            problem in "\\PC{1,60}",
            solution in "\\PC{1,60}",
        ) {
            if let Ok(record) = Record::new(title, problem, solution) {
                prop_assert_eq!(record.canonical_text(), record.clone().canonical_text());
                prop_assert!(!record.canonical_text().is_empty());
                prop_assert_eq!(record.resolve_id(), record.resolve_id());
            }
        }

        #[test]
        fn slug_charset(text in "\\PC{0,40}") {
            let slug = slugify(&text);
            prop_assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
            prop_assert!(!slug.starts_with('-'));
            prop_assert!(!slug.ends_with('-'));
            prop_assert!(!slug.contains("--"));
        }
    }
}
