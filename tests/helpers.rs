// Shared test helpers for store setup.

use odmap::{Collection, Database, Store};

/// Initializes logging once; later calls are no-ops.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a fresh store and returns a handle to its test collection.
#[allow(dead_code)] // Used by other test files
pub fn test_collection() -> Collection {
    init_logging();
    Store::new().database("testdb").collection("testcollection")
}

/// Creates a fresh store and returns its test database.
#[allow(dead_code)] // Used by other test files
pub fn test_database() -> Database {
    init_logging();
    Store::new().database("testdb")
}
