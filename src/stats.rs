//! Aggregate counts over a workspace snapshot or a written corpus.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::corpus::scan_lines;
use crate::error::{Error, Result};
use crate::model::{RagDocument, WorkspaceSnapshot};

pub const UNKNOWN_EPIC: &str = "Unknown Epic";
pub const UNKNOWN_SPRINT: &str = "Unknown Sprint";
pub const NO_ESTIMATE: &str = "No Estimate";

// ---------------------------------------------------------------------------
// Workspace statistics (inspect)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkspaceStats {
    pub total_issues: usize,
    pub pipelines: BTreeMap<String, usize>,
    pub epics: BTreeMap<String, usize>,
    pub labels: BTreeMap<String, usize>,
    pub sprints: BTreeMap<String, usize>,
    pub estimate_distribution: BTreeMap<String, usize>,
    pub dependencies_count: usize,
    pub assigned_issues: usize,
    pub unassigned_issues: usize,
}

pub fn workspace_stats(snapshot: &WorkspaceSnapshot) -> WorkspaceStats {
    let mut stats = WorkspaceStats::default();
    for issue in &snapshot.issues {
        stats.total_issues += 1;
        bump(&mut stats.pipelines, issue.pipeline_name());

        if let Some(id) = &issue.epic_id {
            bump(
                &mut stats.epics,
                snapshot.epic_title(id).unwrap_or(UNKNOWN_EPIC),
            );
        }
        for label in &issue.labels {
            bump(&mut stats.labels, label);
        }
        if let Some(id) = &issue.sprint_id {
            bump(
                &mut stats.sprints,
                snapshot.sprint_name(id).unwrap_or(UNKNOWN_SPRINT),
            );
        }
        match issue.estimate {
            Some(value) => bump(&mut stats.estimate_distribution, &value.to_string()),
            None => bump(&mut stats.estimate_distribution, NO_ESTIMATE),
        }

        stats.dependencies_count += issue.dependencies.len();
        if issue.assignees.is_empty() {
            stats.unassigned_issues += 1;
        } else {
            stats.assigned_issues += 1;
        }
    }
    stats
}

// ---------------------------------------------------------------------------
// Corpus statistics (stats)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DependencyStats {
    pub total: usize,
    pub issues_with_deps: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContentStats {
    pub avg_length: f64,
    pub total_length: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CorpusStats {
    pub total_documents: usize,
    pub pipelines: BTreeMap<String, usize>,
    pub epics: BTreeMap<String, usize>,
    pub labels: BTreeSet<String>,
    pub sprints: BTreeSet<String>,
    pub estimate_ranges: BTreeMap<String, usize>,
    pub dependencies: DependencyStats,
    pub assignees: BTreeSet<String>,
    pub content_stats: ContentStats,
    /// Non-blank lines that did not parse as a document.
    pub skipped_lines: usize,
}

impl CorpusStats {
    pub fn record(&mut self, doc: &RagDocument) {
        let meta = &doc.metadata;
        self.total_documents += 1;
        bump(&mut self.pipelines, &meta.pipeline);
        if let Some(epic) = &meta.epic {
            bump(&mut self.epics, epic);
        }
        self.labels.extend(meta.labels.iter().cloned());
        if let Some(sprint) = &meta.sprint {
            self.sprints.insert(sprint.clone());
        }
        if let Some(estimate) = meta.estimate {
            bump(&mut self.estimate_ranges, &estimate_range(estimate));
        }
        if let Some(deps) = meta.dependencies.as_ref().filter(|d| !d.is_empty()) {
            self.dependencies.total += deps.len();
            self.dependencies.issues_with_deps += 1;
        }
        self.assignees.extend(meta.assignees.iter().cloned());
        self.content_stats.total_length += doc.content.chars().count();
    }

    /// Computes the average; zero for an empty corpus.
    pub fn finish(mut self) -> Self {
        self.content_stats.avg_length = if self.total_documents == 0 {
            0.0
        } else {
            self.content_stats.total_length as f64 / self.total_documents as f64
        };
        self
    }
}

/// Width-1 bucket keyed by the estimate truncated toward zero.
pub fn estimate_range(estimate: f64) -> String {
    // i128 holds every integral f64 below 1.7e38; larger values saturate
    let n = estimate.trunc() as i128;
    format!("{n}-{}", n.saturating_add(1))
}

#[instrument(skip_all, fields(path = %path.display()))]
pub fn corpus_stats(path: &Path) -> Result<CorpusStats> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    corpus_stats_from_reader(BufReader::new(file)).map_err(|e| Error::io(path, e))
}

pub fn corpus_stats_from_reader<R: BufRead>(reader: R) -> std::io::Result<CorpusStats> {
    let mut stats = CorpusStats::default();
    scan_lines(reader, |line_no, line| {
        let Some(line) = line else {
            warn!(line = line_no, "skipping record with invalid UTF-8");
            stats.skipped_lines += 1;
            return;
        };
        if line.trim().is_empty() {
            return;
        }
        match serde_json::from_str::<RagDocument>(line) {
            Ok(doc) => stats.record(&doc),
            Err(e) => {
                warn!(line = line_no, error = %e, "skipping unreadable record");
                stats.skipped_lines += 1;
            }
        }
    })?;
    let stats = stats.finish();
    info!(
        documents = stats.total_documents,
        skipped = stats.skipped_lines,
        "statistics computed"
    );
    Ok(stats)
}

fn bump(map: &mut BTreeMap<String, usize>, key: &str) {
    *map.entry(key.to_string()).or_insert(0) += 1;
}
