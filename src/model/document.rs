use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// `source_type` stamped on every document built from a workspace issue.
pub const ISSUE_SOURCE_TYPE: &str = "zenhub_issue";

/// One corpus record. Field order is the serialized order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RagDocument {
    pub content: String,
    pub metadata: DocumentMetadata,
}

/// Metadata keys recognized in a corpus record.
///
/// Optional keys are omitted when absent rather than written as `null`,
/// so key presence always means the value exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentMetadata {
    pub title: String,
    pub pipeline: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimate: Option<f64>,
    pub labels: BTreeSet<String>,
    pub assignees: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,
    pub source_id: String,
    pub source_type: String,
}

impl RagDocument {
    /// Checks the invariants serde cannot express.
    pub fn check(&self) -> Result<(), String> {
        if self.content.trim().is_empty() {
            return Err("content is empty".into());
        }
        if self.metadata.title.trim().is_empty() {
            return Err("metadata.title is empty".into());
        }
        if self.metadata.source_id.trim().is_empty() {
            return Err("metadata.source_id is empty".into());
        }
        if self.metadata.source_type.trim().is_empty() {
            return Err("metadata.source_type is empty".into());
        }
        if matches!(&self.metadata.dependencies, Some(deps) if deps.is_empty()) {
            return Err("metadata.dependencies is present but empty".into());
        }
        Ok(())
    }
}
