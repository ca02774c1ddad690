//! Work-item records and the persistence contract.
//!
//! Epics, tickets and stages are each one record: a map of named fields plus
//! free-form body text. Stores must round-trip unknown fields and the body
//! untouched, because the lock flag and the status maps live inside the same
//! record as everything else the user wrote.
//!
//! - `frontmatter`: markdown files with a YAML frontmatter block
//! - `memory`: in-process store that counts reads and writes

pub mod frontmatter;
pub mod memory;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde_yaml::{Mapping, Value};
use std::path::PathBuf;

pub use frontmatter::FrontmatterStore;
pub use memory::MemoryStore;

/// Canonical (snake_case) field keys.
pub mod keys {
    pub const ID: &str = "id";
    pub const STATUS: &str = "status";
    pub const SESSION_ACTIVE: &str = "session_active";
    pub const TICKET: &str = "ticket";
    pub const EPIC: &str = "epic";
    pub const STAGES: &str = "stages";
    pub const STAGE_STATUSES: &str = "stage_statuses";
    pub const TICKETS: &str = "tickets";
    pub const TICKET_STATUSES: &str = "ticket_statuses";
    pub const PR_URL: &str = "pr_url";
}

/// Level of the work-item hierarchy a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Epic,
    Ticket,
    Stage,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Epic => "epic",
            Self::Ticket => "ticket",
            Self::Stage => "stage",
        }
    }

    /// Infer the kind from an id such as `STAGE-001-002-003`.
    pub fn from_id(id: &str) -> Option<Self> {
        let upper = id.to_ascii_uppercase();
        if upper.starts_with("STAGE-") {
            Some(Self::Stage)
        } else if upper.starts_with("TICKET-") {
            Some(Self::Ticket)
        } else if upper.starts_with("EPIC-") {
            Some(Self::Epic)
        } else {
            None
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted work item: frontmatter fields plus body text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub fields: Mapping,
    pub body: String,
}

impl Record {
    pub fn new(fields: Mapping, body: &str) -> Self {
        Self {
            fields,
            body: body.to_string(),
        }
    }

    /// Parse a `---`-delimited YAML frontmatter document.
    pub fn parse(content: &str) -> Result<Self> {
        let rest = content
            .strip_prefix("---\n")
            .or_else(|| content.strip_prefix("---\r\n"))
            .context("Document does not start with a '---' frontmatter delimiter")?;

        let mut offset = 0;
        for line in rest.split_inclusive('\n') {
            if line.trim_end_matches(['\r', '\n']) == "---" {
                let yaml = &rest[..offset];
                let body = &rest[offset + line.len()..];
                let fields = if yaml.trim().is_empty() {
                    Mapping::new()
                } else {
                    serde_yaml::from_str(yaml).context("Failed to parse frontmatter YAML")?
                };
                return Ok(Self::new(fields, body));
            }
            offset += line.len();
        }

        bail!("Frontmatter is missing its closing '---' delimiter")
    }

    /// Render back to a frontmatter document.
    pub fn render(&self) -> Result<String> {
        let yaml = if self.fields.is_empty() {
            String::new()
        } else {
            serde_yaml::to_string(&self.fields).context("Failed to serialize frontmatter")?
        };
        Ok(format!("---\n{}---\n{}", yaml, self.body))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.fields.insert(Value::String(key.to_string()), value);
    }

    pub fn set_str(&mut self, key: &str, value: &str) {
        self.set(key, Value::String(value.to_string()));
    }

    /// Read a `{ id: status }` map field, skipping non-string entries.
    pub fn string_map(&self, key: &str) -> Vec<(String, String)> {
        match self.get(key) {
            Some(Value::Mapping(map)) => map
                .iter()
                .filter_map(|(k, v)| Some((k.as_str()?.to_string(), v.as_str()?.to_string())))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Name of a YAML value's runtime type, for error messages.
pub fn yaml_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged",
    }
}

/// Record-level read/write of epics, tickets and stages by id.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn read(&self, kind: RecordKind, id: &str) -> Result<Record>;

    async fn write(&self, kind: RecordKind, id: &str, record: &Record) -> Result<()>;
}

/// A stage currently sitting in a given status, as seen by the poller.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingStage {
    pub id: String,
    pub file: PathBuf,
    pub status: String,
    pub pr_url: Option<String>,
}

/// Query for stages in a particular status.
#[async_trait]
pub trait PendingStageSource: Send + Sync {
    async fn stages_with_status(&self, status: &str) -> Result<Vec<PendingStage>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAGE_DOC: &str = "---\nid: STAGE-001-001-001\nstatus: Build\ncustom_field:\n  nested: [1, 2]\n---\n# Stage\n\nSome notes.\n---\nNot frontmatter.\n";

    #[test]
    fn test_parse_fields_and_body() {
        let record = Record::parse(STAGE_DOC).unwrap();
        assert_eq!(record.get_str(keys::ID), Some("STAGE-001-001-001"));
        assert_eq!(record.get_str(keys::STATUS), Some("Build"));
        assert_eq!(
            record.body,
            "# Stage\n\nSome notes.\n---\nNot frontmatter.\n"
        );
    }

    #[test]
    fn test_render_preserves_unknown_fields_and_body() {
        let mut record = Record::parse(STAGE_DOC).unwrap();
        record.set(keys::SESSION_ACTIVE, Value::Bool(true));
        let rendered = record.render().unwrap();
        let reparsed = Record::parse(&rendered).unwrap();
        assert_eq!(reparsed.get_bool(keys::SESSION_ACTIVE), Some(true));
        assert!(reparsed.get("custom_field").is_some());
        assert_eq!(reparsed.body, record.body);
    }

    #[test]
    fn test_parse_empty_frontmatter() {
        let record = Record::parse("---\n---\nbody").unwrap();
        assert!(record.fields.is_empty());
        assert_eq!(record.body, "body");
        assert_eq!(record.render().unwrap(), "---\n---\nbody");
    }

    #[test]
    fn test_parse_rejects_missing_delimiters() {
        assert!(Record::parse("no frontmatter").is_err());
        assert!(Record::parse("---\nid: x\n").is_err());
    }

    #[test]
    fn test_string_map_skips_non_strings() {
        let record =
            Record::parse("---\nstage_statuses:\n  STAGE-1: Build\n  STAGE-2: 7\n---\n").unwrap();
        assert_eq!(
            record.string_map(keys::STAGE_STATUSES),
            vec![("STAGE-1".to_string(), "Build".to_string())]
        );
    }

    #[test]
    fn test_record_kind_from_id() {
        assert_eq!(RecordKind::from_id("STAGE-001-001-001"), Some(RecordKind::Stage));
        assert_eq!(RecordKind::from_id("TICKET-001-001"), Some(RecordKind::Ticket));
        assert_eq!(RecordKind::from_id("epic-001"), Some(RecordKind::Epic));
        assert_eq!(RecordKind::from_id("README"), None);
    }

    #[test]
    fn test_yaml_type_name() {
        assert_eq!(yaml_type_name(&Value::Bool(true)), "boolean");
        assert_eq!(yaml_type_name(&Value::Number(3.into())), "number");
        assert_eq!(yaml_type_name(&Value::Null), "null");
    }
}
