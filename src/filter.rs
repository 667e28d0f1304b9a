use std::collections::HashSet;

use crate::model::Issue;

/// Optional pipeline and label restrictions. An empty set means "no
/// restriction" for that dimension.
#[derive(Debug, Clone, Default)]
pub struct FilterSpec {
    pub pipelines: HashSet<String>,
    pub labels: HashSet<String>,
}

impl FilterSpec {
    pub fn new<P, L>(pipelines: P, labels: L) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        L: IntoIterator,
        L::Item: Into<String>,
    {
        Self {
            pipelines: pipelines.into_iter().map(Into::into).collect(),
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.pipelines.is_empty() && self.labels.is_empty()
    }
}

/// OR within a dimension, AND across dimensions. Issues without a
/// pipeline are matched as "No Pipeline".
pub fn include(issue: &Issue, filter: &FilterSpec) -> bool {
    let pipeline_ok =
        filter.pipelines.is_empty() || filter.pipelines.contains(issue.pipeline_name());
    let labels_ok =
        filter.labels.is_empty() || issue.labels.iter().any(|l| filter.labels.contains(l));
    pipeline_ok && labels_ok
}
