//! Orchestrates fetch → filter → assemble for one workspace.

use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::assemble::{assemble, AssembleOptions, AssemblyContext};
use crate::error::{Error, Result};
use crate::filter::{include, FilterSpec};
use crate::model::{RagDocument, WorkspaceSnapshot};
use crate::providers::WorkspaceSource;

/// Fires a [`CancelSignal`]. Cancelling twice is harmless.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled; pends forever if the handle is gone.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

pub struct Converter {
    source: Box<dyn WorkspaceSource>,
}

impl Converter {
    pub fn new(source: Box<dyn WorkspaceSource>) -> Self {
        Self { source }
    }

    /// Unfiltered snapshot, for statistics.
    pub async fn inspect(
        &self,
        workspace_id: &str,
        cancel: &CancelSignal,
    ) -> Result<WorkspaceSnapshot> {
        self.fetch(workspace_id, cancel).await
    }

    /// Documents for every issue that passes `filter`, in snapshot order.
    ///
    /// A single malformed issue aborts the whole run.
    #[instrument(skip_all, fields(workspace_id = %workspace_id, source = self.source.name()))]
    pub async fn convert(
        &self,
        workspace_id: &str,
        filter: &FilterSpec,
        options: AssembleOptions,
        cancel: &CancelSignal,
    ) -> Result<Vec<RagDocument>> {
        let snapshot = self.fetch(workspace_id, cancel).await?;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        build_documents(&snapshot, filter, options)
    }

    async fn fetch(&self, workspace_id: &str, cancel: &CancelSignal) -> Result<WorkspaceSnapshot> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(workspace_id, "fetch cancelled");
                Err(Error::Cancelled)
            }
            res = self.source.fetch(workspace_id) => res,
        }
    }
}

/// The synchronous half of `convert`: filter and assemble a snapshot.
pub fn build_documents(
    snapshot: &WorkspaceSnapshot,
    filter: &FilterSpec,
    options: AssembleOptions,
) -> Result<Vec<RagDocument>> {
    let context = AssemblyContext::new(snapshot);
    let mut documents = Vec::with_capacity(snapshot.issues.len());
    for issue in snapshot.issues.iter().filter(|i| include(i, filter)) {
        let doc = assemble(issue, &context, options)?;
        debug!(issue = %issue.display_ref(), title = %doc.metadata.title, "assembled");
        documents.push(doc);
    }
    info!(
        total = snapshot.issues.len(),
        included = documents.len(),
        excluded = snapshot.issues.len() - documents.len(),
        "conversion finished"
    );
    Ok(documents)
}
