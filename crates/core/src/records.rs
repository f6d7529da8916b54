use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::hashing::{digest, ContentHashed, IdentityHasher};
use crate::ids::{Accession, ContentHash};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    Group,
    Member,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Member => "member",
        }
    }

    /// Prefix used when printing accessions of this kind ("rs12", "ss15").
    pub fn accession_prefix(&self) -> &'static str {
        match self {
            Self::Group => "rs",
            Self::Member => "ss",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariantClass {
    Snv,
    Mnv,
    Insertion,
    Deletion,
    Indel,
    TandemRepeat,
    SequenceAlteration,
    NoSequenceAlteration,
}

impl VariantClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Snv => "SNV",
            Self::Mnv => "MNV",
            Self::Insertion => "INS",
            Self::Deletion => "DEL",
            Self::Indel => "INDEL",
            Self::TandemRepeat => "TANDEM_REPEAT",
            Self::SequenceAlteration => "SEQUENCE_ALTERATION",
            Self::NoSequenceAlteration => "NO_SEQUENCE_ALTERATION",
        }
    }
}

/// Identity fields of a clustered (group) variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupIdentity {
    pub assembly_accession: String,
    pub contig: String,
    pub start: i64,
    pub variant_class: VariantClass,
    pub validated: bool,
}

impl ContentHashed for GroupIdentity {
    const DOMAIN: &'static str = "group/v1";

    fn write_identity(&self, hasher: &mut IdentityHasher) {
        hasher
            .text(&self.assembly_accession)
            .text(&self.contig)
            .integer(self.start)
            .text(self.variant_class.as_str())
            .boolean(self.validated);
    }
}

/// Identity fields of a submitted (member) variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberIdentity {
    pub assembly_accession: String,
    pub taxonomy_accession: u32,
    pub project_accession: String,
    pub contig: String,
    pub start: i64,
    pub reference_allele: String,
    pub alternate_allele: String,
}

impl ContentHashed for MemberIdentity {
    const DOMAIN: &'static str = "member/v1";

    fn write_identity(&self, hasher: &mut IdentityHasher) {
        hasher
            .text(&self.assembly_accession)
            .integer(self.taxonomy_accession as i64)
            .text(&self.project_accession)
            .text(&self.contig)
            .integer(self.start)
            .text(&self.reference_allele)
            .text(&self.alternate_allele);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberFlags {
    pub supported_by_evidence: bool,
    pub assembly_match: bool,
    pub alleles_match: bool,
    pub validated: bool,
}

impl Default for MemberFlags {
    fn default() -> Self {
        Self {
            supported_by_evidence: true,
            assembly_match: true,
            alleles_match: true,
            validated: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub accession: Accession,
    pub hash: ContentHash,
    pub identity: GroupIdentity,
}

impl GroupRecord {
    pub fn new(accession: Accession, identity: GroupIdentity) -> Self {
        let hash = identity.content_hash();
        Self {
            accession,
            hash,
            identity,
        }
    }

    pub fn hash_matches(&self) -> bool {
        self.identity.content_hash() == self.hash
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub accession: Accession,
    pub hash: ContentHash,
    pub identity: MemberIdentity,
    pub group_accession: Option<Accession>,
    pub flags: MemberFlags,
}

impl MemberRecord {
    pub fn new(
        accession: Accession,
        identity: MemberIdentity,
        group_accession: Option<Accession>,
        flags: MemberFlags,
    ) -> Self {
        let hash = identity.content_hash();
        Self {
            accession,
            hash,
            identity,
            group_accession,
            flags,
        }
    }

    pub fn hash_matches(&self) -> bool {
        self.identity.content_hash() == self.hash
    }

    /// Copy of this member linked to another group. Identity and hash are kept.
    pub fn relinked(&self, group_accession: Option<Accession>) -> Self {
        Self {
            group_accession,
            ..self.clone()
        }
    }
}

/// A record of either kind, as stored in snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Record {
    Group(GroupRecord),
    Member(MemberRecord),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Group(_) => RecordKind::Group,
            Self::Member(_) => RecordKind::Member,
        }
    }

    pub fn accession(&self) -> Accession {
        match self {
            Self::Group(g) => g.accession,
            Self::Member(m) => m.accession,
        }
    }

    pub fn hash(&self) -> ContentHash {
        match self {
            Self::Group(g) => g.hash,
            Self::Member(m) => m.hash,
        }
    }

    pub fn hash_matches(&self) -> bool {
        match self {
            Self::Group(g) => g.hash_matches(),
            Self::Member(m) => m.hash_matches(),
        }
    }

    pub fn assembly_accession(&self) -> &str {
        match self {
            Self::Group(g) => &g.identity.assembly_accession,
            Self::Member(m) => &m.identity.assembly_accession,
        }
    }

    pub fn as_member(&self) -> Option<&MemberRecord> {
        match self {
            Self::Member(m) => Some(m),
            Self::Group(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<&GroupRecord> {
        match self {
            Self::Group(g) => Some(g),
            Self::Member(_) => None,
        }
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, CoreError> {
        rmp_serde::to_vec(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }
}

impl From<GroupRecord> for Record {
    fn from(g: GroupRecord) -> Self {
        Self::Group(g)
    }
}

impl From<MemberRecord> for Record {
    fn from(m: MemberRecord) -> Self {
        Self::Member(m)
    }
}

/// Pre-change state of a record captured by an operation event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InactiveSnapshot {
    /// Accession of the active record this snapshot was taken from.
    pub snapshot_of: Accession,
    pub record: Record,
}

impl InactiveSnapshot {
    pub fn of(record: impl Into<Record>) -> Self {
        let record = record.into();
        Self {
            snapshot_of: record.accession(),
            record,
        }
    }

    /// Digest over every field of the snapshot, group link and flags included.
    pub fn digest(&self) -> Result<ContentHash, CoreError> {
        Ok(digest(&self.record.to_msgpack()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> MemberIdentity {
        MemberIdentity {
            assembly_accession: "GCA_000001405.15".into(),
            taxonomy_accession: 9606,
            project_accession: "PRJEB1".into(),
            contig: "CM000663.2".into(),
            start: 100,
            reference_allele: "A".into(),
            alternate_allele: "T".into(),
        }
    }

    #[test]
    fn member_hash_ignores_link_and_flags() {
        let a = MemberRecord::new(Accession::new(1), identity(), Some(Accession::new(7)), MemberFlags::default());
        let b = MemberRecord::new(
            Accession::new(2),
            identity(),
            None,
            MemberFlags {
                alleles_match: false,
                ..MemberFlags::default()
            },
        );
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn member_hash_tracks_identity() {
        let a = MemberRecord::new(Accession::new(1), identity(), None, MemberFlags::default());
        let mut other = identity();
        other.alternate_allele = "G".into();
        let b = MemberRecord::new(Accession::new(1), other, None, MemberFlags::default());
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn stale_hash_is_detected() {
        let mut m = MemberRecord::new(Accession::new(1), identity(), None, MemberFlags::default());
        assert!(m.hash_matches());
        m.identity.start = 101;
        assert!(!m.hash_matches());
    }

    #[test]
    fn snapshot_digest_sees_group_link() {
        let m = MemberRecord::new(Accession::new(1), identity(), Some(Accession::new(7)), MemberFlags::default());
        let linked = InactiveSnapshot::of(m.clone()).digest().unwrap();
        let unlinked = InactiveSnapshot::of(m.relinked(None)).digest().unwrap();
        assert_ne!(linked, unlinked);
        assert_eq!(linked, InactiveSnapshot::of(m).digest().unwrap());
    }

    #[test]
    fn group_and_member_hash_never_collide() {
        let g = GroupRecord::new(
            Accession::new(1),
            GroupIdentity {
                assembly_accession: "a".into(),
                contig: "c".into(),
                start: 1,
                variant_class: VariantClass::Snv,
                validated: false,
            },
        );
        let m = MemberRecord::new(Accession::new(1), identity(), None, MemberFlags::default());
        assert_ne!(g.hash, m.hash);
    }
}
