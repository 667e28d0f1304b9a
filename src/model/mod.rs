pub mod document;
pub mod issue;

pub use document::{DocumentMetadata, RagDocument, ISSUE_SOURCE_TYPE};
pub use issue::{Epic, Issue, Label, Pipeline, Sprint, WorkspaceSnapshot, NO_PIPELINE};
