mod database;
mod lock;
mod queries;
pub mod scanner;

pub use database::Database;
pub use lock::{WriterLock, lock_path};

// Re-export the schema version for callers who need it
pub const SCHEMA_VERSION: &str = "1";
