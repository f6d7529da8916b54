use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::*;
use crate::records::{InactiveSnapshot, Record, RecordKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    Update,
    Merge,
    Deprecate,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Update => "UPDATED",
            Self::Merge => "MERGED",
            Self::Deprecate => "DEPRECATED",
        }
    }
}

/// Immutable history entry. Written once, never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationEvent {
    pub op_id: OpId,
    pub kind: RecordKind,
    pub event_type: EventType,
    pub accession: Accession,
    pub merged_into: Option<Accession>,
    pub reason: String,
    pub inactive: Vec<InactiveSnapshot>,
}

/// Identity of a transition in the log: re-observing the same key is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub kind: RecordKind,
    pub event_type: EventType,
    pub accession: Accession,
    pub merged_into: Option<Accession>,
    /// Digest of the first inactive snapshot. Always `None` for MERGE, which
    /// is keyed by its loser/winner pair alone.
    pub snapshot_digest: Option<ContentHash>,
}

impl OperationEvent {
    fn with_snapshot(
        event_type: EventType,
        before: Record,
        merged_into: Option<Accession>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            op_id: OpId::new(),
            kind: before.kind(),
            event_type,
            accession: before.accession(),
            merged_into,
            reason: reason.into(),
            inactive: vec![InactiveSnapshot::of(before)],
        }
    }

    /// `before` keeps its accession; `merged_into` names the surviving accession.
    pub fn merge(before: impl Into<Record>, merged_into: Accession, reason: impl Into<String>) -> Self {
        Self::with_snapshot(EventType::Merge, before.into(), Some(merged_into), reason)
    }

    pub fn update(before: impl Into<Record>, reason: impl Into<String>) -> Self {
        Self::with_snapshot(EventType::Update, before.into(), None, reason)
    }

    pub fn deprecate(before: impl Into<Record>, reason: impl Into<String>) -> Self {
        Self::with_snapshot(EventType::Deprecate, before.into(), None, reason)
    }

    pub fn key(&self) -> Result<EventKey, CoreError> {
        let snapshot_digest = match (self.event_type, self.inactive.first()) {
            (EventType::Merge, _) | (_, None) => None,
            (_, Some(snapshot)) => Some(snapshot.digest()?),
        };
        Ok(EventKey {
            kind: self.kind,
            event_type: self.event_type,
            accession: self.accession,
            merged_into: self.merged_into,
            snapshot_digest,
        })
    }

    /// Assembly of the first snapshot. Used as the reference-context tag.
    pub fn assembly_accession(&self) -> Option<&str> {
        self.inactive.first().map(|s| s.record.assembly_accession())
    }

    /// Structural checks applied before an event is accepted into the log.
    pub fn validate(&self) -> Result<(), CoreError> {
        match (self.event_type, self.merged_into) {
            (EventType::Merge, None) => {
                return Err(CoreError::InvalidOperation(format!(
                    "merge event for {} has no target",
                    self.accession
                )));
            }
            (EventType::Update | EventType::Deprecate, Some(target)) => {
                return Err(CoreError::InvalidOperation(format!(
                    "{} event for {} must not name a target ({target})",
                    self.event_type.as_str(),
                    self.accession
                )));
            }
            _ => {}
        }
        for snapshot in &self.inactive {
            if snapshot.record.kind() != self.kind {
                return Err(CoreError::InvalidOperation(format!(
                    "{} event for {} carries a {} snapshot",
                    self.kind.as_str(),
                    self.accession,
                    snapshot.record.kind().as_str()
                )));
            }
            if snapshot.record.accession() != self.accession {
                return Err(CoreError::InvalidOperation(format!(
                    "snapshot of {} attached to event for {}",
                    snapshot.record.accession(),
                    self.accession
                )));
            }
        }
        Ok(())
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, CoreError> {
        rmp_serde::to_vec(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, CoreError> {
        rmp_serde::from_slice(bytes).map_err(|e| CoreError::Serialization(e.to_string()))
    }
}
