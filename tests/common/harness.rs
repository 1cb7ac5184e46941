//! Test harness for database and registry lifecycle management.
//!
//! Provides an isolated embedded database and model registry per test using tempfile.

use std::sync::Arc;
use tempfile::TempDir;

use autoembed::db::connection::{init_db, AutoembedDb, DbConfig};
use autoembed::registry::LocalModelRegistry;
use autoembed::repository::SurrealVectorStore;

/// Test harness that manages database lifecycle.
///
/// Each TestHarness creates an isolated database in a temporary directory.
/// The database is automatically cleaned up when the harness is dropped.
pub struct TestHarness {
    /// Database connection wrapped in Arc for store sharing
    pub db: Arc<AutoembedDb>,
    /// Temporary directory (kept alive while harness exists)
    pub temp_dir: TempDir,
}

impl TestHarness {
    /// Create a new test harness with isolated database.
    ///
    /// Panics if database initialization fails (appropriate for tests).
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory for test database");

        let db_path = temp_dir.path().join("test.db");
        let config = DbConfig::Embedded {
            path: Some(db_path),
        };
        let db = init_db(&config, temp_dir.path())
            .await
            .expect("Failed to initialize test database");

        Self {
            db: Arc::new(db),
            temp_dir,
        }
    }

    pub fn temp_path(&self) -> &std::path::Path {
        self.temp_dir.path()
    }

    /// Open (and define) a collection in the harness database.
    pub async fn store(&self, collection: &str) -> Arc<SurrealVectorStore> {
        Arc::new(
            SurrealVectorStore::open(self.db.clone(), collection)
                .await
                .expect("Failed to open vector collection"),
        )
    }

    /// Model registry rooted in the harness directory.
    pub fn registry(&self) -> LocalModelRegistry {
        LocalModelRegistry::new(self.temp_path().join("models"))
    }
}
