//! Scheduled and deferred synchronization jobs.
//!
//! Jobs are the failure boundary: they log and swallow every error so a bad run never
//! stops the scheduler.

pub mod categories;
pub mod contents;
pub mod scheduler;
pub mod traits;

pub use categories::SynchronizeCategoriesJob;
pub use contents::{SynchronizeContentsJob, DEFAULT_STALENESS_HOURS};
pub use scheduler::{parse_cron, JobScheduler, JobTrigger};
pub use traits::{JobOutcome, SyncComponents, SyncJob};

use crate::api::traits::EdflexApi;
use crate::models::SyncKind;

/// Probe upstream. Returns the skip outcome when it cannot be reached.
pub(crate) async fn skip_if_unreachable(api: &dyn EdflexApi, kind: SyncKind) -> Option<JobOutcome> {
    let reason = match api.can_connect_to_the_api().await {
        Ok(true) => return None,
        Ok(false) => crate::Error::Connectivity("probe returned false".to_string()).to_string(),
        Err(e) => e.to_string(),
    };
    tracing::warn!(
        %kind,
        reason = %reason,
        "could not connect to Edflex API; skipping {} synchronization",
        kind
    );
    Some(JobOutcome::Skipped { reason })
}

pub(crate) fn failed(kind: SyncKind, error: &crate::Error) -> JobOutcome {
    tracing::error!(
        %kind,
        error = %error,
        "exception during {} synchronization",
        kind
    );
    JobOutcome::Failed {
        error: error.to_string(),
    }
}
