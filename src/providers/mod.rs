pub mod zenhub;

use async_trait::async_trait;

use crate::config::ZenhubConfig;
use crate::error::Result;
use crate::model::WorkspaceSnapshot;

/// Sole point of contact with the upstream workspace API.
#[async_trait]
pub trait WorkspaceSource: Send + Sync {
    fn name(&self) -> &str;

    /// Fetches every issue of the workspace plus its side tables.
    /// Never returns a partial snapshot on success.
    async fn fetch(&self, workspace_id: &str) -> Result<WorkspaceSnapshot>;
}


pub fn create_source(token: String, config: &ZenhubConfig) -> Box<dyn WorkspaceSource> {
    Box::new(zenhub::ZenhubClient::from_config(token, config))
}
