use varledger_core::{
    ids::Accession,
    operations::{EventType, OperationEvent},
    records::{Record, RecordKind},
};
use varledger_engine::{decluster, decluster_if_needed, BatchUnit, FailureKind, GroupResolution};
use varledger_harness::{group, member, MemberBuilder, TestLedger};
use varledger_storage::RecordStore;

#[test]
fn declustering_the_only_member_retires_the_group() -> Result<(), Box<dyn std::error::Error>> {
    let mut ledger = TestLedger::new()?;
    let flagged = MemberBuilder::new(15, 100).linked(12).alleles_mismatch().build();
    ledger.reconcile(vec![BatchUnit::new(group(12, 100), vec![flagged.clone()])])?;

    let (updated, event) = decluster_if_needed(&flagged)?.ok_or("member should be declustered")?;
    let report = ledger.reconcile(vec![
        BatchUnit::new(group(12, 100), vec![updated]).with_events(vec![event]),
    ])?;

    assert_eq!(report.members_updated, 1);
    assert_eq!(report.operations_written, 1);
    assert_eq!(report.groups_declustered, 1);

    let member = ledger.engine.get_member(Accession::new(15))?.ok_or("member 15 missing")?;
    assert_eq!(member.group_accession, None);

    let events = ledger.engine.events_for(RecordKind::Member, Accession::new(15))?;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::Update);
    assert!(events[0].reason.starts_with("Declustered"));
    assert_eq!(events[0].inactive[0].record, Record::Member(flagged));

    assert!(ledger.engine.get_group(Accession::new(12))?.is_none());
    assert!(ledger.engine.get_declustered_group(Accession::new(12))?.is_some());
    assert!(matches!(
        ledger.engine.resolve_group(Accession::new(12))?,
        GroupResolution::Declustered(_)
    ));
    Ok(())
}

#[test]
fn decluster_in_the_same_call_as_first_sighting() -> Result<(), Box<dyn std::error::Error>> {
    let mut ledger = TestLedger::new()?;
    let flagged = MemberBuilder::new(15, 100).linked(12).alleles_mismatch().build();
    let (updated, event) = decluster(&flagged)?;

    let report = ledger.reconcile(vec![
        BatchUnit::new(group(12, 100), vec![updated]).with_events(vec![event]),
    ])?;

    assert_eq!(report.groups_written, 1);
    assert_eq!(report.members_written, 1);
    assert_eq!(report.groups_declustered, 1);
    assert_eq!(ledger.storage().active_group_count()?, 0);
    assert_eq!(ledger.storage().declustered_group_count()?, 1);
    Ok(())
}

#[test]
fn group_with_remaining_members_stays_active() -> Result<(), Box<dyn std::error::Error>> {
    let mut ledger = TestLedger::new()?;
    let flagged = MemberBuilder::new(15, 100).linked(12).alleles_mismatch().build();
    let healthy = MemberBuilder::new(16, 100).alleles("A", "C").linked(12).build();
    ledger.reconcile(vec![BatchUnit::new(group(12, 100), vec![flagged.clone(), healthy])])?;

    let (updated, event) = decluster(&flagged)?;
    let report = ledger.reconcile(vec![
        BatchUnit::new(group(12, 100), vec![updated]).with_events(vec![event]),
    ])?;

    assert_eq!(report.groups_declustered, 0);
    assert!(ledger.engine.get_group(Accession::new(12))?.is_some());
    assert_eq!(ledger.engine.members_of_groups(&[Accession::new(12)])?.len(), 1);
    Ok(())
}

#[test]
fn decluster_of_unlinked_member_rejects_only_its_unit() -> Result<(), Box<dyn std::error::Error>> {
    let mut ledger = TestLedger::new()?;
    let unlinked = MemberBuilder::new(17, 300).build();
    let bogus = OperationEvent::update(unlinked.clone(), "Declustered");

    let report = ledger.reconcile(vec![
        BatchUnit::new(group(12, 100), vec![member(15, 100, 12)]),
        BatchUnit::new(group(20, 300), vec![unlinked]).with_events(vec![bogus]),
    ])?;

    assert_eq!(report.failed_units.len(), 1);
    let failure = &report.failed_units[0];
    assert_eq!(failure.index, 1);
    assert_eq!(failure.group_accession, Accession::new(20));
    assert_eq!(failure.kind, FailureKind::NotClustered);

    // Nothing from the rejected unit was kept.
    assert!(ledger.engine.get_group(Accession::new(20))?.is_none());
    assert!(ledger.engine.get_member(Accession::new(17))?.is_none());
    assert!(ledger.engine.get_group(Accession::new(12))?.is_some());
    assert!(ledger.engine.get_member(Accession::new(15))?.is_some());
    assert_eq!(report.groups_written, 1);
    assert_eq!(report.members_written, 1);
    Ok(())
}

#[test]
fn replaying_a_decluster_is_a_no_op() -> Result<(), Box<dyn std::error::Error>> {
    let mut ledger = TestLedger::new()?;
    let flagged = MemberBuilder::new(15, 100).linked(12).alleles_mismatch().build();
    ledger.reconcile(vec![BatchUnit::new(group(12, 100), vec![flagged.clone()])])?;

    let (updated, event) = decluster(&flagged)?;
    let unit = BatchUnit::new(group(12, 100), vec![updated]).with_events(vec![event]);
    ledger.reconcile(vec![unit.clone()])?;
    let before = ledger.counts()?;

    let replay = ledger.reconcile(vec![unit])?;
    assert_eq!(replay.operations_written, 0);
    assert_eq!(replay.members_updated, 0);
    assert_eq!(replay.groups_declustered, 0);
    assert_eq!(ledger.counts()?, before);
    Ok(())
}

#[test]
fn merging_away_the_last_member_retires_the_group() -> Result<(), Box<dyn std::error::Error>> {
    let mut ledger = TestLedger::new()?;
    let only = member(15, 100, 12);
    ledger.reconcile(vec![
        BatchUnit::new(group(12, 100), vec![only.clone()]),
        BatchUnit::new(group(20, 300), vec![member(16, 300, 20)]),
    ])?;

    let report = ledger.reconcile(vec![BatchUnit::new(group(20, 300), vec![]).with_events(vec![
        OperationEvent::merge(only, Accession::new(16), "Identical to ss16"),
    ])])?;

    assert_eq!(report.operations_written, 1);
    assert_eq!(report.groups_declustered, 1);
    assert!(ledger.engine.get_member(Accession::new(15))?.is_none());
    assert!(ledger.engine.get_group(Accession::new(12))?.is_none());
    assert!(ledger.engine.get_declustered_group(Accession::new(12))?.is_some());
    assert!(ledger.engine.get_group(Accession::new(20))?.is_some());
    Ok(())
}
