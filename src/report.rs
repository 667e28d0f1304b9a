//! Terminal output: progress spinner and summary tables.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use zenhub_rag::corpus::ValidationReport;
use zenhub_rag::stats::{CorpusStats, WorkspaceStats};

// ---------------------------------------------------------------------------
// Spinner
// ---------------------------------------------------------------------------

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

pub struct Spinner {
    bar: ProgressBar,
}

impl Spinner {
    pub fn new(message: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .map(|s| s.tick_strings(TICKS))
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        bar.set_style(style);
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }

    pub fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// A two-column table with a title and a header row.
struct Table {
    title: &'static str,
    header: (&'static str, &'static str),
    rows: Vec<(String, String)>,
}

impl Table {
    fn new(title: &'static str, key: &'static str, value: &'static str) -> Self {
        Self {
            title,
            header: (key, value),
            rows: Vec::new(),
        }
    }

    fn row(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.rows.push((key.into(), value.to_string()));
        self
    }

    fn counts(self, map: &BTreeMap<String, usize>) -> Self {
        map.iter().fold(self, |t, (k, v)| t.row(k.as_str(), v))
    }

    fn render(&self) -> String {
        let left = self
            .rows
            .iter()
            .map(|(k, _)| k.chars().count())
            .chain([self.header.0.len()])
            .max()
            .unwrap_or(0);
        let right = self
            .rows
            .iter()
            .map(|(_, v)| v.chars().count())
            .chain([self.header.1.len()])
            .max()
            .unwrap_or(0);

        let rule = format!("{}-+-{}", "-".repeat(left), "-".repeat(right));
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.title);
        let _ = writeln!(out, "{:<left$} | {:<right$}", self.header.0, self.header.1);
        let _ = writeln!(out, "{rule}");
        if self.rows.is_empty() {
            let _ = writeln!(out, "(none)");
        }
        for (k, v) in &self.rows {
            let _ = writeln!(out, "{k:<left$} | {v:<right$}");
        }
        out
    }

    fn print(&self) {
        println!("{}", self.render());
    }
}

pub fn print_workspace_stats(stats: &WorkspaceStats) {
    println!("Workspace Analysis\n");
    Table::new("Issues Summary", "Metric", "Count")
        .row("Total Issues", stats.total_issues)
        .row("Assigned Issues", stats.assigned_issues)
        .row("Unassigned Issues", stats.unassigned_issues)
        .row("Total Dependencies", stats.dependencies_count)
        .print();
    Table::new("Pipeline Distribution", "Pipeline", "Issues")
        .counts(&stats.pipelines)
        .print();
    Table::new("Epic Distribution", "Epic", "Issues")
        .counts(&stats.epics)
        .print();
    Table::new("Sprint Distribution", "Sprint", "Issues")
        .counts(&stats.sprints)
        .print();
    Table::new("Label Distribution", "Label", "Count")
        .counts(&stats.labels)
        .print();
    Table::new("Estimate Distribution", "Estimate", "Count")
        .counts(&stats.estimate_distribution)
        .print();
}

fn overview_table(stats: &CorpusStats) -> Table {
    let mut table = Table::new("Document Overview", "Metric", "Value")
        .row("Total Documents", stats.total_documents)
        .row(
            "Average Content Length",
            format!("{:.2} characters", stats.content_stats.avg_length),
        )
        .row("Issues with Dependencies", stats.dependencies.issues_with_deps)
        .row("Total Dependencies", stats.dependencies.total)
        .row("Total Labels", stats.labels.len())
        .row("Total Assignees", stats.assignees.len());
    if stats.skipped_lines > 0 {
        table = table.row("Skipped Lines", stats.skipped_lines);
    }
    table
}

pub fn print_corpus_stats(stats: &CorpusStats) {
    overview_table(stats).print();
    Table::new("Pipeline Distribution", "Pipeline", "Issues")
        .counts(&stats.pipelines)
        .print();
    Table::new("Epic Distribution", "Epic", "Issues")
        .counts(&stats.epics)
        .print();
    Table::new("Estimate Distribution", "Range", "Count")
        .counts(&stats.estimate_ranges)
        .print();
}

fn validation_table(report: &ValidationReport) -> Table {
    report
        .errors
        .iter()
        .fold(Table::new("Validation Errors", "Line", "Error"), |t, e| {
            t.row(e.line.to_string(), &e.error)
        })
}

pub fn print_validation(report: &ValidationReport) {
    if report.is_clean() {
        println!("All {} documents are valid!", report.valid);
        return;
    }
    println!("Found {} validation errors\n", report.errors.len());
    validation_table(report).print();
}

pub fn print_help_token() {
    println!("{HELP_TOKEN}");
}

const HELP_TOKEN: &str = "\
Getting Started

Zenhub API Token:
1. Log in to Zenhub (https://app.zenhub.com)
2. Go to Settings -> App Settings
3. Click on \"API Tokens\" in the left sidebar
4. Click \"Create new token\"
5. Give it a name (e.g., \"RAG Converter\")
6. Copy the token immediately (you won't see it again!)

Workspace ID:
The workspace ID can be found in your Zenhub URL:
https://app.zenhub.com/workspaces/WORKSPACE_ID/board

Token sources, in order:
1. --access-token on the command line
2. the ZENHUB_TOKEN environment variable
3. token = \"...\" under [zenhub] in ~/.zenhub-rag/config.toml

Workflow Example:
1. Inspect the workspace:
   zenhub-rag inspect your_workspace_id

2. Convert to a JSONL corpus:
   zenhub-rag convert your_workspace_id --output-dir ./output

3. Filter by pipeline:
   zenhub-rag convert your_workspace_id --pipeline \"Sprint Backlog\" \"In Progress\"

4. Filter by label:
   zenhub-rag convert your_workspace_id --label bug feature

5. Exclude epics or dependencies:
   zenhub-rag convert your_workspace_id --no-epics --no-dependencies

6. Check and summarize the result:
   zenhub-rag validate output/data/your_workspace_id_raw.jsonl
   zenhub-rag stats output/data/your_workspace_id_raw.jsonl -o stats.json";
