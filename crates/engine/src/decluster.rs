//! Decides whether a member must lose its group link.
//!
//! Nothing here touches storage. The reconciliation engine persists the
//! returned member and logs the event.

use varledger_core::{
    records::MemberRecord, CoreError, OperationEvent,
};

pub const DECLUSTER_REASON: &str = "Declustered";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclusterReason {
    AllelesMismatch,
    AssemblyMismatch,
}

impl DeclusterReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AllelesMismatch => "alleles do not match the reference",
            Self::AssemblyMismatch => "reference allele does not match the assembly",
        }
    }
}

pub fn decluster_reasons(member: &MemberRecord) -> Vec<DeclusterReason> {
    let mut reasons = Vec::new();
    if !member.flags.alleles_match {
        reasons.push(DeclusterReason::AllelesMismatch);
    }
    if !member.flags.assembly_match {
        reasons.push(DeclusterReason::AssemblyMismatch);
    }
    reasons
}

/// Clears the group link. The event's snapshot is `member` as given, link included.
pub fn decluster(member: &MemberRecord) -> Result<(MemberRecord, OperationEvent), CoreError> {
    decluster_with_reason(member, DECLUSTER_REASON)
}

pub fn decluster_with_reason(
    member: &MemberRecord,
    reason: impl Into<String>,
) -> Result<(MemberRecord, OperationEvent), CoreError> {
    if member.group_accession.is_none() {
        return Err(CoreError::NotClustered {
            accession: member.accession,
        });
    }
    let updated = MemberRecord::new(
        member.accession,
        member.identity.clone(),
        None,
        member.flags,
    );
    let event = OperationEvent::update(member.clone(), reason);
    Ok((updated, event))
}

/// Declusters only when at least one flag calls for it.
pub fn decluster_if_needed(
    member: &MemberRecord,
) -> Result<Option<(MemberRecord, OperationEvent)>, CoreError> {
    let reasons = decluster_reasons(member);
    if reasons.is_empty() {
        return Ok(None);
    }
    let detail = reasons
        .iter()
        .map(|r| r.as_str())
        .collect::<Vec<_>>()
        .join("; ");
    decluster_with_reason(member, format!("{DECLUSTER_REASON}: {detail}")).map(Some)
}
