use varledger_engine::{BatchUnit, Engine, EngineError, ReconcileConfig, ReconcileReport};
use varledger_storage::{OperationLog, RecordStore, SqliteStorage, StorageError};

use crate::init_tracing;

/// Row counts across every store, for before/after comparisons.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerCounts {
    pub active_groups: u64,
    pub declustered_groups: u64,
    pub active_members: u64,
    pub events: u64,
}

impl LedgerCounts {
    pub fn of(storage: &SqliteStorage) -> Result<Self, StorageError> {
        Ok(Self {
            active_groups: storage.active_group_count()?,
            declustered_groups: storage.declustered_group_count()?,
            active_members: storage.active_member_count()?,
            events: storage.event_count()?,
        })
    }
}

/// An engine over a fresh in-memory ledger.
pub struct TestLedger {
    pub engine: Engine,
}

impl TestLedger {
    pub fn new() -> Result<Self, EngineError> {
        Self::with_config(ReconcileConfig::default())
    }

    pub fn with_config(config: ReconcileConfig) -> Result<Self, EngineError> {
        init_tracing();
        Ok(Self {
            engine: Engine::with_config(SqliteStorage::open_in_memory()?, config),
        })
    }

    pub fn reconcile(&mut self, units: Vec<BatchUnit>) -> Result<ReconcileReport, EngineError> {
        self.engine.reconcile(units)
    }

    pub fn storage(&self) -> &SqliteStorage {
        self.engine.storage()
    }

    pub fn counts(&self) -> Result<LedgerCounts, StorageError> {
        LedgerCounts::of(self.engine.storage())
    }
}
