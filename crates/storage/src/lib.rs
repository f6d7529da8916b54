pub mod error;
pub mod field_map;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use error::StorageError;
pub use sqlite::{SqliteStorage, DEFAULT_BUSY_TIMEOUT};
pub use traits::*;
