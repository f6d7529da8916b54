mod cluster;
mod fixtures;
mod ledger;

pub use cluster::TestCluster;
pub use fixtures::*;
pub use ledger::{LedgerCounts, TestLedger};

use tracing_subscriber::EnvFilter;

/// Installs a test-friendly subscriber once per process. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "varledger_engine=debug,varledger_storage=debug".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
