pub mod error;
pub mod field_value;
pub mod hashing;
pub mod ids;
pub mod operations;
pub mod records;

pub use error::CoreError;
pub use field_value::FieldValue;
pub use hashing::ContentHashed;
pub use ids::*;
pub use operations::{EventKey, EventType, OperationEvent};
pub use records::*;
