use serde::{Deserialize, Serialize};

use crate::ids::Accession;

/// Value of a single stored field, used by field-based lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Boolean(bool),
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Integer(n)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Boolean(b)
    }
}

impl From<Option<Accession>> for FieldValue {
    fn from(accession: Option<Accession>) -> Self {
        match accession {
            Some(a) => FieldValue::Integer(a.value()),
            None => FieldValue::Null,
        }
    }
}
