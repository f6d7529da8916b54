use std::path::{Path, PathBuf};

use tempfile::TempDir;
use varledger_engine::{Engine, EngineConfig, EngineError, StorageConfig};

use crate::init_tracing;

const CLUSTER_BUSY_TIMEOUT_MS: u64 = 10_000;

/// Several engines sharing one on-disk ledger, as parallel ingestion jobs would.
pub struct TestCluster {
    _dir: TempDir,
    path: PathBuf,
    busy_timeout_ms: u64,
    nodes: Vec<Engine>,
}

impl TestCluster {
    pub fn new(nodes: usize) -> Result<Self, EngineError> {
        Self::with_busy_timeout(nodes, CLUSTER_BUSY_TIMEOUT_MS)
    }

    /// Nodes give up on a locked ledger after `busy_timeout_ms`.
    pub fn with_busy_timeout(nodes: usize, busy_timeout_ms: u64) -> Result<Self, EngineError> {
        init_tracing();
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("ledger.db");
        let mut cluster = Self {
            _dir: dir,
            path,
            busy_timeout_ms,
            nodes: Vec::with_capacity(nodes),
        };
        for _ in 0..nodes {
            let node = cluster.open_node()?;
            cluster.nodes.push(node);
        }
        Ok(cluster)
    }

    pub fn config(&self) -> EngineConfig {
        EngineConfig {
            storage: StorageConfig {
                path: Some(self.path.clone()),
                busy_timeout_ms: self.busy_timeout_ms,
            },
            ..EngineConfig::default()
        }
    }

    /// Opens another connection to the shared ledger.
    pub fn open_node(&self) -> Result<Engine, EngineError> {
        Engine::open(&self.config())
    }

    pub fn node(&self, index: usize) -> &Engine {
        &self.nodes[index]
    }

    pub fn node_mut(&mut self, index: usize) -> &mut Engine {
        &mut self.nodes[index]
    }

    /// Hands the engines out, e.g. to move them onto threads. The database stays
    /// alive for as long as the cluster does.
    pub fn take_nodes(&mut self) -> Vec<Engine> {
        std::mem::take(&mut self.nodes)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
