//! Static mapping from logical record fields to storage columns.
//!
//! Lookups by field name go through this table only. `validate` runs when a
//! store is opened and fails if a mapped column is missing from its table or
//! a name appears twice.

use std::collections::HashSet;

use rusqlite::Connection;
use varledger_core::RecordKind;

use crate::error::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMapping {
    pub logical: &'static str,
    pub column: &'static str,
}

const fn map(logical: &'static str, column: &'static str) -> FieldMapping {
    FieldMapping { logical, column }
}

pub const GROUP_FIELDS: &[FieldMapping] = &[
    map("accession", "accession"),
    map("assembly_accession", "asm"),
    map("contig", "contig"),
    map("start", "start"),
    map("variant_class", "type"),
    map("validated", "validated"),
];

pub const MEMBER_FIELDS: &[FieldMapping] = &[
    map("accession", "accession"),
    map("assembly_accession", "asm"),
    map("taxonomy_accession", "tax"),
    map("project_accession", "study"),
    map("contig", "contig"),
    map("start", "start"),
    map("reference_allele", "ref"),
    map("alternate_allele", "alt"),
    map("group_accession", "rs"),
    map("supported_by_evidence", "evidence"),
    map("assembly_match", "asm_match"),
    map("alleles_match", "alleles_match"),
    map("validated", "validated"),
];

const GROUP_TABLES: &[&str] = &["group_active", "group_declustered"];
const MEMBER_TABLES: &[&str] = &["member_active"];

pub fn fields_for(kind: RecordKind) -> &'static [FieldMapping] {
    match kind {
        RecordKind::Group => GROUP_FIELDS,
        RecordKind::Member => MEMBER_FIELDS,
    }
}

pub fn column_for(kind: RecordKind, logical: &str) -> Result<&'static str, StorageError> {
    fields_for(kind)
        .iter()
        .find(|m| m.logical == logical)
        .map(|m| m.column)
        .ok_or_else(|| StorageError::UnknownField {
            kind: kind.as_str(),
            field: logical.to_string(),
        })
}

fn table_columns(conn: &Connection, table: &str) -> Result<HashSet<String>, StorageError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<HashSet<_>, _>>()?;
    if columns.is_empty() {
        return Err(StorageError::FieldMap(format!("table {table} does not exist")));
    }
    Ok(columns)
}

fn check_unique(kind: RecordKind, fields: &[FieldMapping]) -> Result<(), StorageError> {
    let mut logical = HashSet::new();
    let mut columns = HashSet::new();
    for field in fields {
        if !logical.insert(field.logical) {
            return Err(StorageError::FieldMap(format!(
                "{} field {} mapped twice",
                kind.as_str(),
                field.logical
            )));
        }
        if !columns.insert(field.column) {
            return Err(StorageError::FieldMap(format!(
                "{} column {} mapped twice",
                kind.as_str(),
                field.column
            )));
        }
    }
    Ok(())
}

pub fn validate(conn: &Connection) -> Result<(), StorageError> {
    for (kind, tables) in [
        (RecordKind::Group, GROUP_TABLES),
        (RecordKind::Member, MEMBER_TABLES),
    ] {
        let fields = fields_for(kind);
        check_unique(kind, fields)?;
        for table in tables {
            let columns = table_columns(conn, table)?;
            for field in fields {
                if !columns.contains(field.column) {
                    return Err(StorageError::FieldMap(format!(
                        "{}.{} has no column {} in {table}",
                        kind.as_str(),
                        field.logical,
                        field.column
                    )));
                }
            }
        }
    }
    Ok(())
}
