//! Storage layer for tutor session persistence.
//!
//! Each session is one row holding the serialized [`SessionState`].

mod sqlite;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::session::SessionState;

/// Storage trait for database operations
#[async_trait]
pub trait Storage: Send + Sync {
    /// Get a session by ID.
    async fn get_session(&self, id: &str) -> StorageResult<Option<SessionState>>;
    /// Insert or overwrite a session.
    async fn save_session(&self, state: &SessionState) -> StorageResult<()>;
}
