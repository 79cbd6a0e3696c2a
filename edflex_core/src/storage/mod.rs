//! Local category and translation storage.

pub mod sqlite;
pub mod traits;

pub use sqlite::{connect_pool, SqliteCategoryStore};
pub use traits::{CategoryStore, CategoryTransaction};
