//! Imported activities: the local records created from upstream contents.

pub mod sqlite;
pub mod traits;

pub use sqlite::SqliteActivityManager;
pub use traits::{ActivityManager, ContentIdChunks};
