pub mod config;
pub mod decluster;
pub mod error;
pub mod export;
pub mod history;
pub mod report;

pub use config::{EngineConfig, ReconcileConfig, StorageConfig};
pub use decluster::{decluster, decluster_if_needed, decluster_reasons, DeclusterReason};
pub use error::EngineError;
pub use history::GroupResolution;
pub use report::{FailureKind, ReconcileReport, UnitFailure};

use std::collections::{BTreeSet, HashMap};

use varledger_core::{
    ids::Accession,
    operations::{EventType, OperationEvent},
    records::{GroupRecord, MemberRecord, RecordKind},
    CoreError,
};
use varledger_storage::{InsertOutcome, OperationLog, RecordStore, SqliteStorage, StorageError};

use crate::config::render_reason;

const GROUP_PREFIX: &str = "rs";
const MEMBER_PREFIX: &str = "ss";

/// One group with its members and the transitions decided for them upstream.
#[derive(Debug, Clone)]
pub struct BatchUnit {
    pub group: GroupRecord,
    pub members: Vec<MemberRecord>,
    pub events: Vec<OperationEvent>,
}

impl BatchUnit {
    pub fn new(group: GroupRecord, members: Vec<MemberRecord>) -> Self {
        Self {
            group,
            members,
            events: Vec::new(),
        }
    }

    pub fn with_events(mut self, events: Vec<OperationEvent>) -> Self {
        self.events = events;
        self
    }

    fn has_pending_update(&self, member: Accession) -> bool {
        self.events.iter().any(|e| {
            e.kind == RecordKind::Member && e.event_type == EventType::Update && e.accession == member
        })
    }
}

/// Decisions visible to later units of the same call.
#[derive(Debug, Default)]
struct CallState {
    /// Group accession that lost a hash, and the accession that holds it.
    merged: HashMap<Accession, Accession>,
    /// Groups that lost a member link and may have to be retired.
    retire_candidates: BTreeSet<Accession>,
}

impl CallState {
    /// Current holder for a group accession that lost its hash, checking this
    /// unit's decisions before the call's.
    fn merged_into(&self, committed: &CallState, accession: Accession) -> Option<Accession> {
        self.merged
            .get(&accession)
            .or_else(|| committed.merged.get(&accession))
            .copied()
    }

    fn absorb(&mut self, unit: CallState) {
        self.merged.extend(unit.merged);
        self.retire_candidates.extend(unit.retire_candidates);
    }
}

pub struct Engine {
    storage: SqliteStorage,
    config: ReconcileConfig,
}

impl Engine {
    pub fn new(storage: SqliteStorage) -> Self {
        Self::with_config(storage, ReconcileConfig::default())
    }

    pub fn with_config(storage: SqliteStorage, config: ReconcileConfig) -> Self {
        Self { storage, config }
    }

    pub fn open(config: &EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let storage = match &config.storage.path {
            Some(path) => {
                let path = path.to_str().ok_or_else(|| {
                    EngineError::Config(format!("storage.path is not UTF-8: {}", path.display()))
                })?;
                SqliteStorage::open_with_timeout(path, config.storage.busy_timeout())?
            }
            None => SqliteStorage::open_in_memory()?,
        };
        tracing::debug!(path = ?config.storage.path, "ledger opened");
        Ok(Self::with_config(storage, config.reconcile.clone()))
    }

    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut SqliteStorage {
        &mut self.storage
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    fn exec_batch(&self, sql: &str) -> Result<(), EngineError> {
        self.storage
            .conn()
            .execute_batch(sql)
            .map_err(|e| EngineError::from(StorageError::Sqlite(e)))
    }

    /// Runs `f` inside `BEGIN IMMEDIATE`. Any error rolls back everything `f` wrote.
    fn in_transaction<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        self.exec_batch("BEGIN IMMEDIATE")?;
        match f(self) {
            Ok(value) => {
                self.exec_batch("COMMIT")?;
                Ok(value)
            }
            Err(e) => {
                let _ = self.exec_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// Applies a batch in order. Each unit either lands completely or not at all.
    ///
    /// A unit rejected for an invalid hash or a decluster of an unlinked member
    /// is reported in `failed_units` and the rest of the batch proceeds. Any
    /// other error rolls back the whole call.
    pub fn reconcile(&mut self, units: Vec<BatchUnit>) -> Result<ReconcileReport, EngineError> {
        let report = self.in_transaction(|engine| {
            let mut report = ReconcileReport::default();
            let mut state = CallState::default();

            for (index, unit) in units.iter().enumerate() {
                engine.exec_batch("SAVEPOINT reconcile_unit")?;
                let mut unit_state = CallState::default();
                let mut unit_report = ReconcileReport::default();

                match engine.apply_unit(unit, &state, &mut unit_state, &mut unit_report) {
                    Ok(()) => {
                        engine.exec_batch("RELEASE reconcile_unit")?;
                        state.absorb(unit_state);
                        report.absorb(unit_report);
                    }
                    Err(e) => {
                        let Some(kind) = FailureKind::from_error(&e) else {
                            return Err(e);
                        };
                        engine.exec_batch("ROLLBACK TO reconcile_unit")?;
                        engine.exec_batch("RELEASE reconcile_unit")?;
                        tracing::warn!(
                            index,
                            group = %unit.group.accession,
                            error = %e,
                            "batch unit rejected"
                        );
                        report.failed_units.push(UnitFailure {
                            index,
                            group_accession: unit.group.accession,
                            member_accessions: unit.members.iter().map(|m| m.accession).collect(),
                            kind,
                        });
                    }
                }
            }

            report.groups_declustered += engine.retire_groups(&state.retire_candidates)?;
            Ok(report)
        })?;

        tracing::info!(
            groups_written = report.groups_written,
            members_written = report.members_written,
            members_updated = report.members_updated,
            operations_written = report.operations_written,
            groups_declustered = report.groups_declustered,
            failed_units = report.failed_units.len(),
            "reconciliation committed"
        );
        Ok(report)
    }

    /// `state` collects this unit's decisions; `committed` holds those of
    /// earlier units in the call.
    fn apply_unit(
        &mut self,
        unit: &BatchUnit,
        committed: &CallState,
        state: &mut CallState,
        report: &mut ReconcileReport,
    ) -> Result<(), EngineError> {
        if self.config.verify_hashes {
            verify_unit(unit)?;
        }

        let winner = self.claim_group_hash(&unit.group, report)?;
        if winner != unit.group.accession {
            state.merged.insert(unit.group.accession, winner);
        }

        for member in &unit.members {
            let member =
                self.canonical_member(member, unit.group.accession, winner, committed, state, report)?;
            self.resolve_member(&member, unit, state, report)?;
        }

        for event in &unit.events {
            self.apply_event(event, state, report)?;
        }
        Ok(())
    }

    /// First writer of a hash wins. A later accession with the same hash is merged into it.
    fn claim_group_hash(
        &mut self,
        group: &GroupRecord,
        report: &mut ReconcileReport,
    ) -> Result<Accession, EngineError> {
        // Declustered is terminal: a retired position is not brought back.
        let retired = self
            .storage
            .find_declustered_groups(group.accession)?
            .iter()
            .any(|side| side.hash == group.hash);
        if retired {
            return Ok(group.accession);
        }

        match self.storage.insert_group_if_absent(group)? {
            InsertOutcome::Inserted => {
                report.groups_written += 1;
                Ok(group.accession)
            }
            InsertOutcome::Existing(winner) if winner.accession == group.accession => {
                Ok(group.accession)
            }
            InsertOutcome::Existing(winner) => {
                let reason = render_reason(
                    &self.config.merge_reason,
                    GROUP_PREFIX,
                    group.accession,
                    Some(winner.accession),
                );
                let event = OperationEvent::merge(group.clone(), winner.accession, reason);
                if self.record_event(&event, report)? {
                    tracing::debug!(from = %group.accession, into = %winner.accession, hash = %group.hash, "group merged");
                }
                Ok(winner.accession)
            }
        }
    }

    /// Points a member at the group that currently holds its group's hash.
    fn canonical_member(
        &mut self,
        member: &MemberRecord,
        unit_group: Accession,
        unit_winner: Accession,
        committed: &CallState,
        state: &CallState,
        report: &mut ReconcileReport,
    ) -> Result<MemberRecord, EngineError> {
        let Some(linked) = member.group_accession else {
            return Ok(member.clone());
        };
        let target = if linked == unit_group {
            unit_winner
        } else {
            state.merged_into(committed, linked).unwrap_or(linked)
        };
        if target == linked {
            return Ok(member.clone());
        }

        let reason = render_reason(&self.config.rewrite_reason, GROUP_PREFIX, linked, Some(target));
        self.record_event(&OperationEvent::update(member.clone(), reason), report)?;
        tracing::debug!(member = %member.accession, from = %linked, into = %target, "member relinked");
        Ok(member.relinked(Some(target)))
    }

    fn resolve_member(
        &mut self,
        member: &MemberRecord,
        unit: &BatchUnit,
        state: &mut CallState,
        report: &mut ReconcileReport,
    ) -> Result<(), EngineError> {
        if let Some(existing) = self.storage.find_active_member_by_accession(member.accession)? {
            return self.reconcile_same_accession(member, existing, unit, state, report);
        }
        match self.storage.insert_member_if_absent(member)? {
            InsertOutcome::Inserted => {
                report.members_written += 1;
                Ok(())
            }
            InsertOutcome::Existing(existing) if existing.accession == member.accession => {
                self.reconcile_same_accession(member, existing, unit, state, report)
            }
            InsertOutcome::Existing(existing) => self.merge_member(member, existing.accession, report),
        }
    }

    fn reconcile_same_accession(
        &mut self,
        member: &MemberRecord,
        existing: MemberRecord,
        unit: &BatchUnit,
        state: &mut CallState,
        report: &mut ReconcileReport,
    ) -> Result<(), EngineError> {
        // Stored content stays canonical; the incoming content is redundant.
        if existing.hash != member.hash {
            return self.merge_member(member, existing.accession, report);
        }
        if existing == *member {
            return Ok(());
        }

        self.storage.upsert_active_member(member)?;
        report.members_updated += 1;
        if !unit.has_pending_update(member.accession) {
            let reason = render_reason(&self.config.update_reason, MEMBER_PREFIX, member.accession, None);
            self.record_event(&OperationEvent::update(existing.clone(), reason), report)?;
        }
        if let (Some(previous), None) = (existing.group_accession, member.group_accession) {
            state.retire_candidates.insert(previous);
        }
        Ok(())
    }

    fn merge_member(
        &mut self,
        member: &MemberRecord,
        into: Accession,
        report: &mut ReconcileReport,
    ) -> Result<(), EngineError> {
        let reason = render_reason(&self.config.redundant_reason, MEMBER_PREFIX, member.accession, Some(into));
        let event = OperationEvent::merge(member.clone(), into, reason);
        if self.record_event(&event, report)? {
            tracing::debug!(from = %member.accession, into = %into, "member merged");
        }
        Ok(())
    }

    /// Logs `event` unless the same transition is already recorded.
    /// Returns false when it was.
    fn record_event(
        &mut self,
        event: &OperationEvent,
        report: &mut ReconcileReport,
    ) -> Result<bool, EngineError> {
        if self.storage.exists(&event.key()?)? {
            return Ok(false);
        }
        match self.storage.append(event) {
            Ok(()) => {
                report.operations_written += 1;
                Ok(true)
            }
            // A concurrent writer logged it between the check and the append.
            Err(StorageError::DuplicateEvent { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    // ========================================================================
    // Pre-computed events
    // ========================================================================

    fn apply_event(
        &mut self,
        event: &OperationEvent,
        state: &mut CallState,
        report: &mut ReconcileReport,
    ) -> Result<(), EngineError> {
        event.validate()?;
        match (event.kind, event.event_type) {
            (RecordKind::Member, EventType::Update) => self.apply_decluster(event, state, report),
            (RecordKind::Member, EventType::Merge | EventType::Deprecate) => {
                self.record_event(event, report)?;
                if event.merged_into == Some(event.accession) {
                    return Ok(());
                }
                if let Some(removed) = self.storage.remove_active_member(event.accession)? {
                    tracing::debug!(member = %event.accession, event = event.event_type.as_str(), "member retired");
                    if let Some(group) = removed.group_accession {
                        state.retire_candidates.insert(group);
                    }
                }
                Ok(())
            }
            (RecordKind::Group, EventType::Merge) => self.apply_group_merge(event, state, report),
            (RecordKind::Group, EventType::Deprecate) => {
                self.record_event(event, report)?;
                self.remove_snapshot_groups(event)?;
                Ok(())
            }
            (RecordKind::Group, EventType::Update) => {
                self.record_event(event, report)?;
                Ok(())
            }
        }
    }

    fn apply_decluster(
        &mut self,
        event: &OperationEvent,
        state: &mut CallState,
        report: &mut ReconcileReport,
    ) -> Result<(), EngineError> {
        let snapshot = event
            .inactive
            .first()
            .and_then(|s| s.record.as_member())
            .ok_or(EngineError::NotClustered(event.accession))?;
        let group = snapshot
            .group_accession
            .ok_or(EngineError::NotClustered(snapshot.accession))?;

        self.record_event(event, report)?;
        if let Some(active) = self.storage.find_active_member_by_accession(snapshot.accession)? {
            if active.group_accession == Some(group) {
                self.storage.upsert_active_member(&active.relinked(None))?;
                report.members_updated += 1;
            }
        }
        state.retire_candidates.insert(group);
        tracing::debug!(member = %snapshot.accession, group = %group, "member declustered");
        Ok(())
    }

    fn apply_group_merge(
        &mut self,
        event: &OperationEvent,
        state: &mut CallState,
        report: &mut ReconcileReport,
    ) -> Result<(), EngineError> {
        let loser = event.accession;
        let winner = event.merged_into.ok_or_else(|| {
            CoreError::InvalidOperation(format!("merge event for {loser} has no target"))
        })?;
        self.record_event(event, report)?;
        if loser == winner {
            return Ok(());
        }

        self.remove_snapshot_groups(event)?;
        if self.storage.find_active_groups_by_accession(loser)?.is_empty() {
            let reason = render_reason(&self.config.rewrite_reason, GROUP_PREFIX, loser, Some(winner));
            for member in self.storage.find_members_by_group_accession(loser)? {
                self.record_event(&OperationEvent::update(member.clone(), reason.clone()), report)?;
                self.storage.upsert_active_member(&member.relinked(Some(winner)))?;
                report.members_updated += 1;
            }
        }
        state.merged.insert(loser, winner);
        tracing::debug!(from = %loser, into = %winner, "group merge applied");
        Ok(())
    }

    /// Removes the active groups captured in the event's snapshots, if they
    /// still belong to the event's accession.
    fn remove_snapshot_groups(&mut self, event: &OperationEvent) -> Result<(), EngineError> {
        for snapshot in &event.inactive {
            let Some(group) = snapshot.record.as_group() else {
                continue;
            };
            let held_by_event = self
                .storage
                .find_active_group_by_hash(&group.hash)?
                .is_some_and(|active| active.accession == event.accession);
            if held_by_event {
                self.storage.remove_active_group(&group.hash)?;
            }
        }
        Ok(())
    }

    /// Moves candidate groups with no linked members to the declustered store.
    fn retire_groups(&mut self, candidates: &BTreeSet<Accession>) -> Result<u64, EngineError> {
        let mut retired = 0;
        for &accession in candidates {
            if !self.storage.find_members_by_group_accession(accession)?.is_empty() {
                continue;
            }
            let moved = self.storage.move_group_to_side(accession)?;
            if !moved.is_empty() {
                tracing::debug!(group = %accession, positions = moved.len(), "group retired");
            }
            retired += moved.len() as u64;
        }
        Ok(retired)
    }

    // ========================================================================
    // Deprecation
    // ========================================================================

    /// Removes every active position of a group and logs one DEPRECATE per position.
    pub fn deprecate_group(
        &mut self,
        accession: Accession,
        reason: &str,
    ) -> Result<ReconcileReport, EngineError> {
        self.in_transaction(|engine| {
            let mut report = ReconcileReport::default();
            for group in engine.storage.find_active_groups_by_accession(accession)? {
                engine.storage.remove_active_group(&group.hash)?;
                engine.record_event(&OperationEvent::deprecate(group, reason), &mut report)?;
            }
            tracing::debug!(group = %accession, removed = report.operations_written, "group deprecated");
            Ok(report)
        })
    }
}

fn verify_unit(unit: &BatchUnit) -> Result<(), EngineError> {
    if !unit.group.hash_matches() {
        return Err(EngineError::InvalidHash(format!(
            "group {GROUP_PREFIX}{} carries hash {} that does not match its identity",
            unit.group.accession, unit.group.hash
        )));
    }
    for member in &unit.members {
        if !member.hash_matches() {
            return Err(EngineError::InvalidHash(format!(
                "member {MEMBER_PREFIX}{} carries hash {} that does not match its identity",
                member.accession, member.hash
            )));
        }
    }
    for event in &unit.events {
        for snapshot in &event.inactive {
            if !snapshot.record.hash_matches() {
                return Err(EngineError::InvalidHash(format!(
                    "snapshot of {} in {} event does not match its hash",
                    snapshot.snapshot_of,
                    event.event_type.as_str()
                )));
            }
        }
    }
    Ok(())
}
