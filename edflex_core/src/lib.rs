//! Edflex core library: synchronization engine, collaborator traits and shared models.

pub mod activity;
pub mod api;
pub mod config;
pub mod error;
pub mod jobs;
pub mod mapper;
pub mod models;
pub mod o11y;
pub mod storage;
pub mod sync;

mod test_support;

pub use activity::{ActivityManager, ContentIdChunks, SqliteActivityManager};
pub use api::models::{
    ApiCatalog, ApiCategory, CatalogList, CategoriesPage, CategoryFilter, RawContent,
};
pub use api::traits::{ContentStream, EdflexApi};
pub use config::EdflexConfig;
pub use error::{Error, Result};
pub use jobs::{
    JobOutcome, JobScheduler, JobTrigger, SyncComponents, SyncJob, SynchronizeCategoriesJob,
    SynchronizeContentsJob,
};
pub use mapper::formatter::{Formatter, LabelFormatter};
pub use mapper::ContentMapper;
pub use models::{
    CatalogId, Category, CategoryTranslation, ImportedActivity, NormalizedContent, SyncKind,
};
pub use storage::{CategoryStore, CategoryTransaction, SqliteCategoryStore};
pub use sync::{CatalogSyncReport, CategorySynchronizer, ContentSyncReport, ContentSynchronizer};
