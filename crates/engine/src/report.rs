use varledger_core::ids::Accession;

use crate::error::EngineError;

/// Counters returned by one reconciliation call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub groups_written: u64,
    pub members_written: u64,
    pub members_updated: u64,
    pub operations_written: u64,
    pub groups_declustered: u64,
    pub failed_units: Vec<UnitFailure>,
}

impl ReconcileReport {
    pub fn absorb(&mut self, other: ReconcileReport) {
        self.groups_written += other.groups_written;
        self.members_written += other.members_written;
        self.members_updated += other.members_updated;
        self.operations_written += other.operations_written;
        self.groups_declustered += other.groups_declustered;
        self.failed_units.extend(other.failed_units);
    }

    pub fn is_clean(&self) -> bool {
        self.failed_units.is_empty()
    }

    /// True when the call changed nothing.
    pub fn is_noop(&self) -> bool {
        self.groups_written == 0
            && self.members_written == 0
            && self.members_updated == 0
            && self.operations_written == 0
            && self.groups_declustered == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    InvalidHash,
    NotClustered,
}

impl FailureKind {
    pub fn from_error(error: &EngineError) -> Option<Self> {
        match error {
            EngineError::InvalidHash(_) => Some(Self::InvalidHash),
            EngineError::NotClustered(_) => Some(Self::NotClustered),
            _ => None,
        }
    }
}

/// A rejected unit. None of its writes were kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFailure {
    /// Position of the unit in the call.
    pub index: usize,
    pub group_accession: Accession,
    pub member_accessions: Vec<Accession>,
    pub kind: FailureKind,
}
