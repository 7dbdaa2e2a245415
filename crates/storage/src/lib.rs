pub mod error;
pub mod memory;
pub mod schema;
pub mod sqlite;
pub mod store;

pub use error::StorageError;
pub use memory::MemoryRowStore;
pub use sqlite::SqliteRowStore;
pub use store::*;
