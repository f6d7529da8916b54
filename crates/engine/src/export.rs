//! Flat manifests for downstream reporting.

use std::collections::HashSet;
use std::io::Write;

use varledger_core::{operations::EventType, records::RecordKind};
use varledger_storage::OperationLog;

use crate::{Engine, EngineError};

impl Engine {
    /// Writes `<prefix><from>\t<prefix><into>` for each distinct merge whose
    /// snapshot belongs to `assembly`. Merges of an accession into itself are skipped.
    /// Returns the number of lines written.
    pub fn write_merge_manifest<W: Write>(
        &self,
        kind: RecordKind,
        assembly: &str,
        writer: &mut W,
    ) -> Result<usize, EngineError> {
        let prefix = kind.accession_prefix();
        let mut seen = HashSet::new();
        for event in self
            .storage
            .events_by_assembly(kind, assembly, Some(EventType::Merge))?
        {
            let Some(into) = event.merged_into else {
                continue;
            };
            if into == event.accession || !seen.insert((event.accession, into)) {
                continue;
            }
            writeln!(writer, "{prefix}{}\t{prefix}{into}", event.accession)?;
        }
        tracing::debug!(kind = kind.as_str(), assembly, lines = seen.len(), "merge manifest written");
        Ok(seen.len())
    }

    /// Writes one deprecated accession per line.
    pub fn write_deprecation_manifest<W: Write>(
        &self,
        kind: RecordKind,
        assembly: &str,
        writer: &mut W,
    ) -> Result<usize, EngineError> {
        let prefix = kind.accession_prefix();
        let mut seen = HashSet::new();
        for event in self
            .storage
            .events_by_assembly(kind, assembly, Some(EventType::Deprecate))?
        {
            if seen.insert(event.accession) {
                writeln!(writer, "{prefix}{}", event.accession)?;
            }
        }
        Ok(seen.len())
    }
}
