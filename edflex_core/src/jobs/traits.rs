use crate::activity::traits::ActivityManager;
use crate::api::traits::EdflexApi;
use crate::models::SyncKind;
use crate::storage::traits::CategoryStore;
use crate::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    /// Synchronization ran to the end. `summary` is the synchronizer report.
    Completed { summary: serde_json::Value },
    /// Upstream was unreachable; nothing was attempted.
    Skipped { reason: String },
    Failed { error: String },
}

impl JobOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, JobOutcome::Completed { .. })
    }
}

/// A unit of scheduled work. `execute` never fails: errors are logged and reported
/// through the outcome.
#[async_trait]
pub trait SyncJob: Send + Sync {
    fn kind(&self) -> SyncKind;

    fn name(&self) -> &'static str;

    async fn execute(&self) -> JobOutcome;
}

/// Builds the collaborators a job needs. Called at most once per job instance.
#[async_trait]
pub trait SyncComponents: Send + Sync {
    async fn api_client(&self) -> Result<Arc<dyn EdflexApi>>;

    async fn category_store(&self) -> Result<Arc<dyn CategoryStore>>;

    async fn activity_manager(&self) -> Result<Arc<dyn ActivityManager>>;
}
