use std::collections::HashSet;

use varledger_core::{
    ids::Accession,
    operations::{EventType, OperationEvent},
    records::{GroupRecord, InactiveSnapshot, MemberRecord, RecordKind},
};
use varledger_storage::{OperationLog, RecordStore};

use crate::{Engine, EngineError};

/// Where a historical group accession lives now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupResolution {
    Active(GroupRecord),
    /// Followed MERGE events link by link. `chain` excludes the starting accession.
    MergedInto {
        chain: Vec<Accession>,
        current: Accession,
    },
    Declustered(GroupRecord),
    Deprecated,
    Unknown,
}

impl Engine {
    pub fn get_group(&self, accession: Accession) -> Result<Option<GroupRecord>, EngineError> {
        Ok(self.storage.find_active_group_by_accession(accession)?)
    }

    /// Every active position of a group accession.
    pub fn get_group_positions(&self, accession: Accession) -> Result<Vec<GroupRecord>, EngineError> {
        Ok(self.storage.find_active_groups_by_accession(accession)?)
    }

    pub fn get_member(&self, accession: Accession) -> Result<Option<MemberRecord>, EngineError> {
        Ok(self.storage.find_active_member_by_accession(accession)?)
    }

    pub fn get_declustered_group(
        &self,
        accession: Accession,
    ) -> Result<Option<GroupRecord>, EngineError> {
        Ok(self.storage.find_declustered_groups(accession)?.into_iter().next())
    }

    pub fn members_of_groups(
        &self,
        accessions: &[Accession],
    ) -> Result<Vec<MemberRecord>, EngineError> {
        Ok(self.storage.find_members_by_group_accessions(accessions)?)
    }

    /// Resolves a group accession through the log. When an accession was merged
    /// into several targets, the oldest merge is followed.
    pub fn resolve_group(&self, accession: Accession) -> Result<GroupResolution, EngineError> {
        if let Some(active) = self.storage.find_active_group_by_accession(accession)? {
            return Ok(GroupResolution::Active(active));
        }
        if let Some(side) = self.get_declustered_group(accession)? {
            return Ok(GroupResolution::Declustered(side));
        }

        let mut chain = Vec::new();
        let mut visited = HashSet::from([accession]);
        let mut current = accession;
        while let Some(&next) = self.storage.merge_targets(RecordKind::Group, current)?.first() {
            if !visited.insert(next) {
                break;
            }
            chain.push(next);
            current = next;
            if self.storage.find_active_group_by_accession(current)?.is_some() {
                break;
            }
        }
        if !chain.is_empty() {
            return Ok(GroupResolution::MergedInto { chain, current });
        }

        let deprecated = self
            .storage
            .events_for_accession(RecordKind::Group, accession)?
            .iter()
            .any(|e| e.event_type == EventType::Deprecate);
        if deprecated {
            return Ok(GroupResolution::Deprecated);
        }
        Ok(GroupResolution::Unknown)
    }

    /// Every snapshot ever captured for an accession, oldest first.
    pub fn get_inactive(
        &self,
        kind: RecordKind,
        accession: Accession,
    ) -> Result<Vec<InactiveSnapshot>, EngineError> {
        let snapshots: Vec<InactiveSnapshot> = self
            .storage
            .events_for_accession(kind, accession)?
            .into_iter()
            .flat_map(|e| e.inactive)
            .collect();
        if snapshots.is_empty() {
            return Err(EngineError::NotInactive(accession));
        }
        Ok(snapshots)
    }

    pub fn events_for(
        &self,
        kind: RecordKind,
        accession: Accession,
    ) -> Result<Vec<OperationEvent>, EngineError> {
        Ok(self.storage.events_for_accession(kind, accession)?)
    }

    pub fn events_by_type(
        &self,
        kind: RecordKind,
        event_type: EventType,
    ) -> Result<Vec<OperationEvent>, EngineError> {
        Ok(self.storage.events_by_type(kind, event_type)?)
    }

    pub fn events_by_assembly(
        &self,
        kind: RecordKind,
        assembly: &str,
        event_type: Option<EventType>,
    ) -> Result<Vec<OperationEvent>, EngineError> {
        Ok(self.storage.events_by_assembly(kind, assembly, event_type)?)
    }
}
