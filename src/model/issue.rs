use std::collections::HashMap;

/// Pipeline name used for issues that are not placed on the board.
pub const NO_PIPELINE: &str = "No Pipeline";

#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub id: String,
    /// Repository issue number, when the upstream reports one.
    pub number: Option<u64>,
    pub title: String,
    pub body: Option<String>,
    /// Pipeline name the issue currently sits in.
    pub pipeline: Option<String>,
    pub epic_id: Option<String>,
    pub sprint_id: Option<String>,
    pub estimate: Option<f64>,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    /// Identifiers of issues this one depends on, in upstream order.
    pub dependencies: Vec<String>,
}

impl Issue {
    pub fn pipeline_name(&self) -> &str {
        self.pipeline.as_deref().unwrap_or(NO_PIPELINE)
    }

    /// Human-readable handle for log lines and error messages.
    pub fn display_ref(&self) -> String {
        match self.number {
            Some(n) if self.id.is_empty() => format!("#{n}"),
            Some(n) => format!("{} (#{n})", self.id),
            None if self.id.is_empty() => "<missing id>".to_string(),
            None => self.id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Epic {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sprint {
    pub id: String,
    pub name: String,
}

/// Everything fetched for one workspace. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceSnapshot {
    pub workspace_id: String,
    pub name: Option<String>,
    /// Issues in the order the API reported them.
    pub issues: Vec<Issue>,
    pub epics: HashMap<String, Epic>,
    pub pipelines: HashMap<String, Pipeline>,
    pub labels: HashMap<String, Label>,
    pub sprints: HashMap<String, Sprint>,
}

impl WorkspaceSnapshot {
    pub fn new(workspace_id: impl Into<String>) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            ..Self::default()
        }
    }

    pub fn epic_title(&self, id: &str) -> Option<&str> {
        self.epics.get(id).map(|e| e.title.as_str())
    }

    pub fn sprint_name(&self, id: &str) -> Option<&str> {
        self.sprints.get(id).map(|s| s.name.as_str())
    }

    pub fn issue(&self, id: &str) -> Option<&Issue> {
        self.issues.iter().find(|i| i.id == id)
    }
}
