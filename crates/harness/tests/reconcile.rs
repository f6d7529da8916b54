use varledger_core::{
    ids::Accession,
    operations::EventType,
    records::{Record, RecordKind},
};
use varledger_engine::BatchUnit;
use varledger_harness::{group, member, MemberBuilder, TestLedger};
use varledger_storage::{OperationLog, RecordStore};

// ============================================================================
// Member dedup
// ============================================================================

fn identical_members_batch() -> Vec<BatchUnit> {
    vec![BatchUnit::new(
        group(12, 100),
        vec![member(15, 100, 12), member(16, 100, 12)],
    )]
}

#[test]
fn identical_members_collapse_into_first_accession() -> Result<(), Box<dyn std::error::Error>> {
    let mut ledger = TestLedger::new()?;
    let report = ledger.reconcile(identical_members_batch())?;

    assert_eq!(report.groups_written, 1);
    assert_eq!(report.members_written, 1);
    assert_eq!(report.operations_written, 1);
    assert!(report.is_clean());

    assert_eq!(ledger.storage().active_member_count()?, 1);
    assert!(ledger.engine.get_member(Accession::new(15))?.is_some());
    assert!(ledger.engine.get_member(Accession::new(16))?.is_none());

    let merges = ledger.engine.events_by_type(RecordKind::Member, EventType::Merge)?;
    assert_eq!(merges.len(), 1);
    assert_eq!(merges[0].accession, Accession::new(16));
    assert_eq!(merges[0].merged_into, Some(Accession::new(15)));
    assert_eq!(merges[0].inactive.len(), 1);
    assert_eq!(merges[0].inactive[0].snapshot_of, Accession::new(16));
    Ok(())
}

#[test]
fn resubmitting_a_batch_changes_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let mut ledger = TestLedger::new()?;
    ledger.reconcile(identical_members_batch())?;
    let before = ledger.counts()?;

    let report = ledger.reconcile(identical_members_batch())?;
    assert!(report.is_noop());
    assert_eq!(ledger.counts()?, before);
    Ok(())
}

#[test]
fn new_content_under_known_accession_is_redundant() -> Result<(), Box<dyn std::error::Error>> {
    let mut ledger = TestLedger::new()?;
    ledger.reconcile(vec![BatchUnit::new(group(12, 100), vec![member(15, 100, 12)])])?;

    let moved = MemberBuilder::new(15, 100).alleles("A", "G").linked(12).build();
    let report = ledger.reconcile(vec![BatchUnit::new(group(12, 100), vec![moved.clone()])])?;

    assert_eq!(report.members_written, 0);
    assert_eq!(report.operations_written, 1);
    assert_eq!(ledger.storage().active_member_count()?, 1);

    let kept = ledger.engine.get_member(Accession::new(15))?.ok_or("member 15 missing")?;
    assert_eq!(kept.identity.alternate_allele, "T");

    let events = ledger.engine.events_for(RecordKind::Member, Accession::new(15))?;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::Merge);
    assert_eq!(events[0].merged_into, Some(Accession::new(15)));
    assert_eq!(events[0].inactive[0].record, Record::Member(moved));
    Ok(())
}

#[test]
fn flag_change_updates_member_in_place() -> Result<(), Box<dyn std::error::Error>> {
    let mut ledger = TestLedger::new()?;
    let original = member(15, 100, 12);
    ledger.reconcile(vec![BatchUnit::new(group(12, 100), vec![original.clone()])])?;

    let validated = MemberBuilder::new(15, 100).linked(12).validated().build();
    let report = ledger.reconcile(vec![BatchUnit::new(group(12, 100), vec![validated.clone()])])?;

    assert_eq!(report.members_updated, 1);
    assert_eq!(report.operations_written, 1);
    assert_eq!(ledger.engine.get_member(Accession::new(15))?, Some(validated.clone()));

    let events = ledger.engine.events_for(RecordKind::Member, Accession::new(15))?;
    assert_eq!(events[0].event_type, EventType::Update);
    assert_eq!(events[0].inactive[0].record, Record::Member(original));

    // Same update again is a no-op.
    let again = ledger.reconcile(vec![BatchUnit::new(group(12, 100), vec![validated])])?;
    assert!(again.is_noop());
    Ok(())
}

#[test]
fn redundant_member_with_new_flags_is_not_merged_twice() -> Result<(), Box<dyn std::error::Error>> {
    let mut ledger = TestLedger::new()?;
    ledger.reconcile(identical_members_batch())?;

    let flagged = MemberBuilder::new(16, 100).linked(12).validated().build();
    let report = ledger.reconcile(vec![BatchUnit::new(group(12, 100), vec![flagged])])?;

    assert!(report.is_noop());
    let merges = ledger.engine.events_for(RecordKind::Member, Accession::new(16))?;
    assert_eq!(merges.len(), 1);
    assert_eq!(merges[0].merged_into, Some(Accession::new(15)));
    Ok(())
}

// ============================================================================
// Group merges
// ============================================================================

#[test]
fn three_groups_sharing_a_hash_merge_into_the_first() -> Result<(), Box<dyn std::error::Error>> {
    let mut ledger = TestLedger::new()?;
    let units = vec![
        BatchUnit::new(group(12, 100), vec![]),
        BatchUnit::new(group(13, 100), vec![]),
        BatchUnit::new(group(14, 100), vec![]),
    ];
    let report = ledger.reconcile(units.clone())?;

    assert_eq!(report.groups_written, 1);
    assert_eq!(report.operations_written, 2);
    assert_eq!(ledger.storage().active_group_count()?, 1);

    let hash = group(12, 100).hash;
    let active = ledger.storage().find_active_group_by_hash(&hash)?.ok_or("no active group")?;
    assert_eq!(active.accession, Accession::new(12));

    let merges = ledger.engine.events_by_type(RecordKind::Group, EventType::Merge)?;
    let pairs: Vec<(Accession, Option<Accession>)> =
        merges.iter().map(|e| (e.accession, e.merged_into)).collect();
    assert_eq!(
        pairs,
        vec![
            (Accession::new(13), Some(Accession::new(12))),
            (Accession::new(14), Some(Accession::new(12))),
        ]
    );

    let replay = ledger.reconcile(units)?;
    assert!(replay.is_noop());
    assert_eq!(ledger.storage().event_count()?, 2);
    Ok(())
}

#[test]
fn first_writer_wins_over_lower_accession() -> Result<(), Box<dyn std::error::Error>> {
    let mut ledger = TestLedger::new()?;
    ledger.reconcile(vec![BatchUnit::new(group(20, 100), vec![])])?;
    ledger.reconcile(vec![BatchUnit::new(group(12, 100), vec![])])?;

    assert_eq!(ledger.engine.get_group(Accession::new(20))?.map(|g| g.accession), Some(Accession::new(20)));
    assert!(ledger.engine.get_group(Accession::new(12))?.is_none());
    assert_eq!(
        ledger.storage().merge_targets(RecordKind::Group, Accession::new(12))?,
        vec![Accession::new(20)]
    );
    Ok(())
}

#[test]
fn members_of_a_losing_group_follow_the_winner() -> Result<(), Box<dyn std::error::Error>> {
    let mut ledger = TestLedger::new()?;
    let follower = member(16, 101, 13);
    let report = ledger.reconcile(vec![
        BatchUnit::new(group(12, 100), vec![member(15, 100, 12)]),
        BatchUnit::new(group(13, 100), vec![follower.clone()]),
    ])?;

    assert_eq!(report.members_written, 2);
    let relinked = ledger.engine.get_member(Accession::new(16))?.ok_or("member 16 missing")?;
    assert_eq!(relinked.group_accession, Some(Accession::new(12)));

    let updates = ledger.engine.events_for(RecordKind::Member, Accession::new(16))?;
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].event_type, EventType::Update);
    assert_eq!(updates[0].reason, "Original rs13 was merged into rs12");
    assert_eq!(updates[0].inactive[0].record, Record::Member(follower));

    let members = ledger.engine.members_of_groups(&[Accession::new(12)])?;
    assert_eq!(members.len(), 2);
    Ok(())
}

#[test]
fn later_units_see_earlier_merges() -> Result<(), Box<dyn std::error::Error>> {
    let mut ledger = TestLedger::new()?;
    ledger.reconcile(vec![
        BatchUnit::new(group(12, 100), vec![]),
        BatchUnit::new(group(13, 100), vec![]),
        BatchUnit::new(group(30, 300), vec![member(17, 300, 13)]),
    ])?;

    let relinked = ledger.engine.get_member(Accession::new(17))?.ok_or("member 17 missing")?;
    assert_eq!(relinked.group_accession, Some(Accession::new(12)));
    Ok(())
}

#[test]
fn rejected_unit_does_not_leak_its_merges() -> Result<(), Box<dyn std::error::Error>> {
    let mut ledger = TestLedger::new()?;
    let mut tampered = member(16, 101, 13);
    tampered.identity.start = 999;

    let report = ledger.reconcile(vec![
        BatchUnit::new(group(12, 100), vec![]),
        BatchUnit::new(group(13, 100), vec![tampered]),
        BatchUnit::new(group(30, 300), vec![member(17, 300, 13)]),
    ])?;

    assert_eq!(report.failed_units.len(), 1);
    assert_eq!(report.failed_units[0].member_accessions, vec![Accession::new(16)]);
    assert!(ledger.engine.events_for(RecordKind::Group, Accession::new(13))?.is_empty());

    // Unit 2 never happened, so 13 was not merged when unit 3 ran.
    let kept = ledger.engine.get_member(Accession::new(17))?.ok_or("member 17 missing")?;
    assert_eq!(kept.group_accession, Some(Accession::new(13)));
    Ok(())
}

#[test]
fn one_accession_at_two_positions_merges_into_both_winners() -> Result<(), Box<dyn std::error::Error>> {
    let mut ledger = TestLedger::new()?;
    let report = ledger.reconcile(vec![
        BatchUnit::new(group(1, 100), vec![]),
        BatchUnit::new(group(2, 200), vec![]),
        BatchUnit::new(group(3, 100), vec![member(31, 100, 3)]),
        BatchUnit::new(group(3, 200), vec![member(32, 200, 3)]),
    ])?;

    // One MERGE per loser/winner pair, plus one relink per member.
    assert_eq!(report.operations_written, 4);
    assert_eq!(
        ledger.storage().merge_targets(RecordKind::Group, Accession::new(3))?,
        vec![Accession::new(1), Accession::new(2)]
    );
    assert!(ledger.engine.get_group(Accession::new(3))?.is_none());

    let first = ledger.engine.get_member(Accession::new(31))?.ok_or("member 31 missing")?;
    let second = ledger.engine.get_member(Accession::new(32))?.ok_or("member 32 missing")?;
    assert_eq!(first.group_accession, Some(Accession::new(1)));
    assert_eq!(second.group_accession, Some(Accession::new(2)));
    Ok(())
}

#[test]
fn at_most_one_active_group_per_hash_across_calls() -> Result<(), Box<dyn std::error::Error>> {
    let mut ledger = TestLedger::new()?;
    for accession in 40..45 {
        ledger.reconcile(vec![
            BatchUnit::new(group(accession, 100), vec![]),
            BatchUnit::new(group(accession + 100, 200), vec![]),
        ])?;
    }
    assert_eq!(ledger.storage().active_group_count()?, 2);
    assert_eq!(ledger.storage().event_count()?, 8);
    Ok(())
}

#[test]
fn loser_at_two_positions_of_one_winner_merges_once() -> Result<(), Box<dyn std::error::Error>> {
    let mut ledger = TestLedger::new()?;
    let report = ledger.reconcile(vec![
        BatchUnit::new(group(1, 100), vec![]),
        BatchUnit::new(group(1, 200), vec![]),
        BatchUnit::new(group(3, 100), vec![member(31, 100, 3)]),
        BatchUnit::new(group(3, 200), vec![member(32, 200, 3)]),
    ])?;

    // One MERGE for the pair, plus one relink per member.
    assert_eq!(report.operations_written, 3);
    let merges = ledger.engine.events_by_type(RecordKind::Group, EventType::Merge)?;
    assert_eq!(merges.len(), 1);
    assert_eq!((merges[0].accession, merges[0].merged_into), (Accession::new(3), Some(Accession::new(1))));

    for accession in [31, 32] {
        let relinked = ledger.engine.get_member(Accession::new(accession))?.ok_or("member missing")?;
        assert_eq!(relinked.group_accession, Some(Accession::new(1)));
    }
    Ok(())
}
