use std::time::Duration;

use rusqlite::{types::Value, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use varledger_core::{
    ids::{Accession, ContentHash},
    operations::{EventKey, EventType, OperationEvent},
    records::{GroupRecord, MemberRecord, RecordKind},
    FieldValue,
};

use crate::error::StorageError;
use crate::field_map::column_for;
use crate::traits::{InsertOutcome, OperationLog, RecordStore};

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    rmp_serde::to_vec(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    rmp_serde::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn to_sql_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Text(s) => Value::Text(s.clone()),
        FieldValue::Integer(n) => Value::Integer(*n),
        FieldValue::Boolean(b) => Value::Integer(*b as i64),
    }
}

fn digest_bytes(key: &EventKey) -> Vec<u8> {
    key.snapshot_digest
        .map(|d| d.as_bytes().to_vec())
        .unwrap_or_default()
}

const GROUP_COLUMNS: &str = "accession, hash, asm, contig, start, type, validated, record";

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    pub fn open_with_timeout(path: &str, busy_timeout: Duration) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn, busy_timeout)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn, DEFAULT_BUSY_TIMEOUT)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    fn query_blobs<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Vec<Vec<u8>>, StorageError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, |row| row.get::<_, Vec<u8>>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn query_records<T: DeserializeOwned, P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Vec<T>, StorageError> {
        self.query_blobs(sql, params)?
            .iter()
            .map(|bytes| decode(bytes))
            .collect()
    }

    fn query_events<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Vec<OperationEvent>, StorageError> {
        self.query_blobs(sql, params)?
            .iter()
            .map(|bytes| OperationEvent::from_msgpack(bytes).map_err(StorageError::from))
            .collect()
    }

    fn count(&self, sql: &str) -> Result<u64, StorageError> {
        let count: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn write_member_row(&self, sql: &str, member: &MemberRecord) -> Result<usize, StorageError> {
        let id = &member.identity;
        let flags = &member.flags;
        let changed = self.conn.execute(
            sql,
            rusqlite::params![
                member.accession.value(),
                member.hash.as_bytes().as_slice(),
                &id.assembly_accession,
                id.taxonomy_accession as i64,
                &id.project_accession,
                &id.contig,
                id.start,
                &id.reference_allele,
                &id.alternate_allele,
                member.group_accession.map(|a| a.value()),
                flags.supported_by_evidence,
                flags.assembly_match,
                flags.alleles_match,
                flags.validated,
                encode(member)?,
            ],
        )?;
        Ok(changed)
    }
}

impl RecordStore for SqliteStorage {
    fn insert_group_if_absent(
        &mut self,
        group: &GroupRecord,
    ) -> Result<InsertOutcome<GroupRecord>, StorageError> {
        let id = &group.identity;
        let inserted = self.conn.execute(
            &format!(
                "INSERT INTO group_active ({GROUP_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(hash) DO NOTHING"
            ),
            rusqlite::params![
                group.accession.value(),
                group.hash.as_bytes().as_slice(),
                &id.assembly_accession,
                &id.contig,
                id.start,
                id.variant_class.as_str(),
                id.validated,
                encode(group)?,
            ],
        )?;
        if inserted == 1 {
            return Ok(InsertOutcome::Inserted);
        }
        match self.find_active_group_by_hash(&group.hash)? {
            Some(existing) => Ok(InsertOutcome::Existing(existing)),
            None => Err(StorageError::NotFound(format!(
                "group hash {} rejected but not present",
                group.hash
            ))),
        }
    }

    fn remove_active_group(
        &mut self,
        hash: &ContentHash,
    ) -> Result<Option<GroupRecord>, StorageError> {
        let existing = self.find_active_group_by_hash(hash)?;
        if existing.is_some() {
            self.conn.execute(
                "DELETE FROM group_active WHERE hash = ?1",
                rusqlite::params![hash.as_bytes().as_slice()],
            )?;
        }
        Ok(existing)
    }

    fn move_group_to_side(
        &mut self,
        accession: Accession,
    ) -> Result<Vec<GroupRecord>, StorageError> {
        let groups = self.find_active_groups_by_accession(accession)?;
        for group in &groups {
            self.conn.execute(
                &format!(
                    "INSERT OR IGNORE INTO group_declustered ({GROUP_COLUMNS})
                     SELECT {GROUP_COLUMNS} FROM group_active WHERE hash = ?1"
                ),
                rusqlite::params![group.hash.as_bytes().as_slice()],
            )?;
            self.conn.execute(
                "DELETE FROM group_active WHERE hash = ?1",
                rusqlite::params![group.hash.as_bytes().as_slice()],
            )?;
            tracing::debug!(accession = %accession, hash = %group.hash, "group moved to declustered store");
        }
        Ok(groups)
    }

    fn find_active_group_by_hash(
        &self,
        hash: &ContentHash,
    ) -> Result<Option<GroupRecord>, StorageError> {
        let bytes: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT record FROM group_active WHERE hash = ?1",
                rusqlite::params![hash.as_bytes().as_slice()],
                |row| row.get(0),
            )
            .optional()?;
        bytes.map(|b| decode(&b)).transpose()
    }

    fn find_active_group_by_accession(
        &self,
        accession: Accession,
    ) -> Result<Option<GroupRecord>, StorageError> {
        Ok(self
            .find_active_groups_by_accession(accession)?
            .into_iter()
            .next())
    }

    fn find_active_groups_by_accession(
        &self,
        accession: Accession,
    ) -> Result<Vec<GroupRecord>, StorageError> {
        self.query_records(
            "SELECT record FROM group_active WHERE accession = ?1 ORDER BY rowid",
            rusqlite::params![accession.value()],
        )
    }

    fn find_declustered_groups(
        &self,
        accession: Accession,
    ) -> Result<Vec<GroupRecord>, StorageError> {
        self.query_records(
            "SELECT record FROM group_declustered WHERE accession = ?1 ORDER BY declustered_at, hash",
            rusqlite::params![accession.value()],
        )
    }

    fn find_groups_by_field(
        &self,
        field: &str,
        value: &FieldValue,
    ) -> Result<Vec<GroupRecord>, StorageError> {
        let column = column_for(RecordKind::Group, field)?;
        self.query_records(
            &format!("SELECT record FROM group_active WHERE {column} IS ?1 ORDER BY rowid"),
            rusqlite::params![to_sql_value(value)],
        )
    }

    fn insert_member_if_absent(
        &mut self,
        member: &MemberRecord,
    ) -> Result<InsertOutcome<MemberRecord>, StorageError> {
        let inserted = self.write_member_row(
            "INSERT INTO member_active (accession, hash, asm, tax, study, contig, start, ref, alt, rs, evidence, asm_match, alleles_match, validated, record)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT DO NOTHING",
            member,
        )?;
        if inserted == 1 {
            return Ok(InsertOutcome::Inserted);
        }
        if let Some(existing) = self.find_active_member_by_hash(&member.hash)? {
            return Ok(InsertOutcome::Existing(existing));
        }
        match self.find_active_member_by_accession(member.accession)? {
            Some(existing) => Ok(InsertOutcome::Existing(existing)),
            None => Err(StorageError::NotFound(format!(
                "member {} rejected but not present",
                member.accession
            ))),
        }
    }

    fn upsert_active_member(&mut self, member: &MemberRecord) -> Result<bool, StorageError> {
        if self.find_active_member_by_accession(member.accession)?.as_ref() == Some(member) {
            return Ok(false);
        }
        let updated = self.write_member_row(
            "UPDATE member_active SET asm = ?3, tax = ?4, study = ?5, contig = ?6, start = ?7, ref = ?8, alt = ?9,
                rs = ?10, evidence = ?11, asm_match = ?12, alleles_match = ?13, validated = ?14, record = ?15,
                updated_at = CAST(unixepoch('now','subsec') * 1000 AS INTEGER)
             WHERE accession = ?1 AND hash = ?2",
            member,
        )?;
        if updated == 0 {
            return Err(StorageError::NotFound(format!(
                "member {} with hash {}",
                member.accession, member.hash
            )));
        }
        Ok(true)
    }

    fn remove_active_member(
        &mut self,
        accession: Accession,
    ) -> Result<Option<MemberRecord>, StorageError> {
        let existing = self.find_active_member_by_accession(accession)?;
        if existing.is_some() {
            self.conn.execute(
                "DELETE FROM member_active WHERE accession = ?1",
                rusqlite::params![accession.value()],
            )?;
        }
        Ok(existing)
    }

    fn find_active_member_by_hash(
        &self,
        hash: &ContentHash,
    ) -> Result<Option<MemberRecord>, StorageError> {
        let bytes: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT record FROM member_active WHERE hash = ?1",
                rusqlite::params![hash.as_bytes().as_slice()],
                |row| row.get(0),
            )
            .optional()?;
        bytes.map(|b| decode(&b)).transpose()
    }

    fn find_active_member_by_accession(
        &self,
        accession: Accession,
    ) -> Result<Option<MemberRecord>, StorageError> {
        let bytes: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT record FROM member_active WHERE accession = ?1",
                rusqlite::params![accession.value()],
                |row| row.get(0),
            )
            .optional()?;
        bytes.map(|b| decode(&b)).transpose()
    }

    fn find_members_by_group_accession(
        &self,
        accession: Accession,
    ) -> Result<Vec<MemberRecord>, StorageError> {
        self.query_records(
            "SELECT record FROM member_active WHERE rs = ?1 ORDER BY rowid",
            rusqlite::params![accession.value()],
        )
    }

    fn find_members_by_group_accessions(
        &self,
        accessions: &[Accession],
    ) -> Result<Vec<MemberRecord>, StorageError> {
        if accessions.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; accessions.len()].join(", ");
        self.query_records(
            &format!("SELECT record FROM member_active WHERE rs IN ({placeholders}) ORDER BY rowid"),
            rusqlite::params_from_iter(accessions.iter().map(|a| a.value())),
        )
    }

    fn find_members_by_field(
        &self,
        field: &str,
        value: &FieldValue,
    ) -> Result<Vec<MemberRecord>, StorageError> {
        let column = column_for(RecordKind::Member, field)?;
        self.query_records(
            &format!("SELECT record FROM member_active WHERE {column} IS ?1 ORDER BY rowid"),
            rusqlite::params![to_sql_value(value)],
        )
    }

    fn active_group_count(&self) -> Result<u64, StorageError> {
        self.count("SELECT COUNT(*) FROM group_active")
    }

    fn declustered_group_count(&self) -> Result<u64, StorageError> {
        self.count("SELECT COUNT(*) FROM group_declustered")
    }

    fn active_member_count(&self) -> Result<u64, StorageError> {
        self.count("SELECT COUNT(*) FROM member_active")
    }
}

impl OperationLog for SqliteStorage {
    fn exists(&self, key: &EventKey) -> Result<bool, StorageError> {
        let found: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM operations
               WHERE kind = ?1 AND event_type = ?2 AND accession = ?3
                 AND COALESCE(merged_into, -1) = ?4 AND snapshot_digest = ?5)",
            rusqlite::params![
                key.kind.as_str(),
                key.event_type.as_str(),
                key.accession.value(),
                key.merged_into.map(|a| a.value()).unwrap_or(-1),
                digest_bytes(key),
            ],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    fn append(&mut self, event: &OperationEvent) -> Result<(), StorageError> {
        event.validate()?;
        let key = event.key()?;
        let result = self.conn.execute(
            "INSERT INTO operations (op_id, kind, event_type, accession, merged_into, snapshot_digest, asm, reason, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                event.op_id.as_bytes().as_slice(),
                event.kind.as_str(),
                event.event_type.as_str(),
                event.accession.value(),
                event.merged_into.map(|a| a.value()),
                digest_bytes(&key),
                event.assembly_accession(),
                &event.reason,
                event.to_msgpack()?,
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StorageError::DuplicateEvent {
                    accession: event.accession.to_string(),
                })
            }
            Err(e) => Err(StorageError::Sqlite(e)),
        }
    }

    fn events_for_accession(
        &self,
        kind: RecordKind,
        accession: Accession,
    ) -> Result<Vec<OperationEvent>, StorageError> {
        self.query_events(
            "SELECT payload FROM operations WHERE kind = ?1 AND accession = ?2 ORDER BY rowid",
            rusqlite::params![kind.as_str(), accession.value()],
        )
    }

    fn events_by_type(
        &self,
        kind: RecordKind,
        event_type: EventType,
    ) -> Result<Vec<OperationEvent>, StorageError> {
        self.query_events(
            "SELECT payload FROM operations WHERE kind = ?1 AND event_type = ?2 ORDER BY rowid",
            rusqlite::params![kind.as_str(), event_type.as_str()],
        )
    }

    fn events_by_assembly(
        &self,
        kind: RecordKind,
        assembly: &str,
        event_type: Option<EventType>,
    ) -> Result<Vec<OperationEvent>, StorageError> {
        match event_type {
            Some(event_type) => self.query_events(
                "SELECT payload FROM operations WHERE kind = ?1 AND asm = ?2 AND event_type = ?3 ORDER BY rowid",
                rusqlite::params![kind.as_str(), assembly, event_type.as_str()],
            ),
            None => self.query_events(
                "SELECT payload FROM operations WHERE kind = ?1 AND asm = ?2 ORDER BY rowid",
                rusqlite::params![kind.as_str(), assembly],
            ),
        }
    }

    fn merge_targets(
        &self,
        kind: RecordKind,
        accession: Accession,
    ) -> Result<Vec<Accession>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT merged_into FROM operations
             WHERE kind = ?1 AND accession = ?2 AND event_type = 'MERGED' AND merged_into IS NOT NULL
             GROUP BY merged_into ORDER BY MIN(rowid)",
        )?;
        let targets = stmt
            .query_map(rusqlite::params![kind.as_str(), accession.value()], |row| {
                row.get::<_, i64>(0)
            })?
            .map(|r| r.map(Accession::new))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(targets)
    }

    fn event_count(&self) -> Result<u64, StorageError> {
        self.count("SELECT COUNT(*) FROM operations")
    }
}
