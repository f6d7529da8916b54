use varledger_core::{
    ids::{Accession, ContentHash},
    operations::{EventKey, EventType, OperationEvent},
    records::{GroupRecord, MemberRecord, RecordKind},
    FieldValue,
};

use crate::error::StorageError;

/// Result of an insert-if-absent on a uniqueness index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome<T> {
    Inserted,
    /// Another row already holds the key; it is returned unchanged.
    Existing(T),
}

impl<T> InsertOutcome<T> {
    pub fn is_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted)
    }
}

/// Active and declustered records, keyed by accession and content hash.
///
/// Every write is idempotent: writing a record identical to the stored one
/// reports no change.
pub trait RecordStore {
    /// Compare-and-swap on the group hash index. Only one caller can win a hash.
    fn insert_group_if_absent(
        &mut self,
        group: &GroupRecord,
    ) -> Result<InsertOutcome<GroupRecord>, StorageError>;

    /// Removes the active group with this hash. Used when a group is merged away.
    fn remove_active_group(&mut self, hash: &ContentHash)
    -> Result<Option<GroupRecord>, StorageError>;

    /// Moves every active group with this accession to the declustered table.
    /// Returns the groups that were moved.
    fn move_group_to_side(&mut self, accession: Accession)
    -> Result<Vec<GroupRecord>, StorageError>;

    fn find_active_group_by_hash(
        &self,
        hash: &ContentHash,
    ) -> Result<Option<GroupRecord>, StorageError>;

    /// First active group with this accession, in insertion order.
    fn find_active_group_by_accession(
        &self,
        accession: Accession,
    ) -> Result<Option<GroupRecord>, StorageError>;

    /// A group accession can be active under several hashes (one per mapped position).
    fn find_active_groups_by_accession(
        &self,
        accession: Accession,
    ) -> Result<Vec<GroupRecord>, StorageError>;

    fn find_declustered_groups(
        &self,
        accession: Accession,
    ) -> Result<Vec<GroupRecord>, StorageError>;

    fn find_groups_by_field(
        &self,
        field: &str,
        value: &FieldValue,
    ) -> Result<Vec<GroupRecord>, StorageError>;

    /// Insert unless the accession or the hash is already taken.
    fn insert_member_if_absent(
        &mut self,
        member: &MemberRecord,
    ) -> Result<InsertOutcome<MemberRecord>, StorageError>;

    /// Replace the stored member with the same accession and hash.
    /// Returns false when the stored row was already identical.
    fn upsert_active_member(&mut self, member: &MemberRecord) -> Result<bool, StorageError>;

    fn remove_active_member(
        &mut self,
        accession: Accession,
    ) -> Result<Option<MemberRecord>, StorageError>;

    fn find_active_member_by_hash(
        &self,
        hash: &ContentHash,
    ) -> Result<Option<MemberRecord>, StorageError>;

    fn find_active_member_by_accession(
        &self,
        accession: Accession,
    ) -> Result<Option<MemberRecord>, StorageError>;

    fn find_members_by_group_accession(
        &self,
        accession: Accession,
    ) -> Result<Vec<MemberRecord>, StorageError>;

    fn find_members_by_group_accessions(
        &self,
        accessions: &[Accession],
    ) -> Result<Vec<MemberRecord>, StorageError>;

    fn find_members_by_field(
        &self,
        field: &str,
        value: &FieldValue,
    ) -> Result<Vec<MemberRecord>, StorageError>;

    fn active_group_count(&self) -> Result<u64, StorageError>;

    fn declustered_group_count(&self) -> Result<u64, StorageError>;

    fn active_member_count(&self) -> Result<u64, StorageError>;
}

/// Append-only event log, one logical collection per record kind.
pub trait OperationLog {
    fn exists(&self, key: &EventKey) -> Result<bool, StorageError>;

    /// Fails with `DuplicateEvent` if an event with the same key is already stored.
    fn append(&mut self, event: &OperationEvent) -> Result<(), StorageError>;

    fn events_for_accession(
        &self,
        kind: RecordKind,
        accession: Accession,
    ) -> Result<Vec<OperationEvent>, StorageError>;

    fn events_by_type(
        &self,
        kind: RecordKind,
        event_type: EventType,
    ) -> Result<Vec<OperationEvent>, StorageError>;

    /// Events whose first snapshot belongs to `assembly`, optionally of one type.
    fn events_by_assembly(
        &self,
        kind: RecordKind,
        assembly: &str,
        event_type: Option<EventType>,
    ) -> Result<Vec<OperationEvent>, StorageError>;

    /// Distinct targets of MERGE events for this accession, oldest first.
    fn merge_targets(
        &self,
        kind: RecordKind,
        accession: Accession,
    ) -> Result<Vec<Accession>, StorageError>;

    fn event_count(&self) -> Result<u64, StorageError>;
}
