//! Turns one issue plus its workspace context into one [`RagDocument`].

use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{DocumentMetadata, Issue, RagDocument, WorkspaceSnapshot, ISSUE_SOURCE_TYPE};

#[derive(Debug, Clone, Copy)]
pub struct AssembleOptions {
    pub include_epics: bool,
    pub include_dependencies: bool,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            include_epics: true,
            include_dependencies: true,
        }
    }
}

/// Resolves epic, sprint and dependency references against the
/// snapshot's side tables.
#[derive(Debug, Clone, Copy)]
pub struct AssemblyContext<'a> {
    snapshot: &'a WorkspaceSnapshot,
}

impl<'a> AssemblyContext<'a> {
    pub fn new(snapshot: &'a WorkspaceSnapshot) -> Self {
        Self { snapshot }
    }

    fn epic_title(&self, issue: &Issue) -> Option<&'a str> {
        let id = issue.epic_id.as_deref()?;
        let title = self.snapshot.epic_title(id);
        if title.is_none() {
            debug!(issue = %issue.id, epic = id, "epic not in snapshot");
        }
        title
    }

    fn sprint_name(&self, issue: &Issue) -> Option<&'a str> {
        let id = issue.sprint_id.as_deref()?;
        let name = self.snapshot.sprint_name(id);
        if name.is_none() {
            debug!(issue = %issue.id, sprint = id, "sprint not in snapshot");
        }
        name
    }

    fn dependency_line(&self, id: &str) -> String {
        match self.snapshot.issue(id) {
            Some(dep) => match dep.number {
                Some(n) => format!("- {id} (#{n}): {}", dep.title),
                None => format!("- {id}: {}", dep.title),
            },
            None => format!("- {id}"),
        }
    }
}

pub fn assemble(
    issue: &Issue,
    context: &AssemblyContext<'_>,
    options: AssembleOptions,
) -> Result<RagDocument> {
    if issue.id.trim().is_empty() {
        return Err(Error::conversion(issue.display_ref(), "missing identifier"));
    }
    if issue.title.trim().is_empty() {
        return Err(Error::conversion(issue.display_ref(), "missing title"));
    }

    let epic = if options.include_epics {
        context.epic_title(issue)
    } else {
        None
    };
    let sprint = context.sprint_name(issue);
    let dependencies = if options.include_dependencies && !issue.dependencies.is_empty() {
        Some(issue.dependencies.clone())
    } else {
        None
    };

    let mut sections: Vec<String> = Vec::with_capacity(5);
    sections.push(issue.title.trim().to_string());
    match issue.body.as_deref().map(str::trim) {
        Some(body) if !body.is_empty() => sections.push(body.to_string()),
        _ => sections.push(synthesize_description(issue)),
    }
    if let Some(epic) = epic {
        sections.push(format!("Epic: {epic}"));
    }
    if let Some(sprint) = sprint {
        sections.push(format!("Sprint: {sprint}"));
    }
    if let Some(deps) = &dependencies {
        let lines: Vec<String> = deps.iter().map(|id| context.dependency_line(id)).collect();
        sections.push(format!("Dependencies:\n{}", lines.join("\n")));
    }

    let metadata = DocumentMetadata {
        title: issue.title.trim().to_string(),
        pipeline: issue.pipeline_name().to_string(),
        epic: epic.map(String::from),
        sprint: sprint.map(String::from),
        estimate: issue.estimate,
        labels: issue.labels.iter().cloned().collect(),
        assignees: issue.assignees.iter().cloned().collect(),
        dependencies,
        source_id: issue.id.clone(),
        source_type: ISSUE_SOURCE_TYPE.to_string(),
    };

    Ok(RagDocument {
        content: sections.join("\n\n"),
        metadata,
    })
}

/// Stand-in body for issues that have none, so every document carries
/// some retrievable text beyond the title.
fn synthesize_description(issue: &Issue) -> String {
    let mut parts = vec![format!(
        "No description provided. Pipeline: {}.",
        issue.pipeline_name()
    )];
    if !issue.labels.is_empty() {
        parts.push(format!("Labels: {}.", issue.labels.join(", ")));
    }
    if let Some(estimate) = issue.estimate {
        parts.push(format!("Estimate: {estimate}."));
    }
    parts.join(" ")
}
