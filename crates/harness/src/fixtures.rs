use varledger_core::{
    ids::Accession,
    records::{GroupIdentity, GroupRecord, MemberFlags, MemberIdentity, MemberRecord, VariantClass},
};

pub const ASSEMBLY: &str = "GCA_000001405.15";
pub const CONTIG: &str = "CM000663.2";

/// SNV group on the default assembly and contig.
pub fn group(accession: i64, start: i64) -> GroupRecord {
    group_on(accession, ASSEMBLY, start)
}

pub fn group_on(accession: i64, assembly: &str, start: i64) -> GroupRecord {
    GroupRecord::new(
        Accession::new(accession),
        GroupIdentity {
            assembly_accession: assembly.into(),
            contig: CONTIG.into(),
            start,
            variant_class: VariantClass::Snv,
            validated: false,
        },
    )
}

/// Member at `start` (A>T) linked to `group`.
pub fn member(accession: i64, start: i64, group: i64) -> MemberRecord {
    MemberBuilder::new(accession, start).linked(group).build()
}

pub struct MemberBuilder {
    accession: Accession,
    identity: MemberIdentity,
    group: Option<Accession>,
    flags: MemberFlags,
}

impl MemberBuilder {
    pub fn new(accession: i64, start: i64) -> Self {
        Self {
            accession: Accession::new(accession),
            identity: MemberIdentity {
                assembly_accession: ASSEMBLY.into(),
                taxonomy_accession: 9606,
                project_accession: "PRJEB1".into(),
                contig: CONTIG.into(),
                start,
                reference_allele: "A".into(),
                alternate_allele: "T".into(),
            },
            group: None,
            flags: MemberFlags::default(),
        }
    }

    pub fn linked(mut self, group: i64) -> Self {
        self.group = Some(Accession::new(group));
        self
    }

    pub fn project(mut self, project: &str) -> Self {
        self.identity.project_accession = project.into();
        self
    }

    pub fn assembly(mut self, assembly: &str) -> Self {
        self.identity.assembly_accession = assembly.into();
        self
    }

    pub fn alleles(mut self, reference: &str, alternate: &str) -> Self {
        self.identity.reference_allele = reference.into();
        self.identity.alternate_allele = alternate.into();
        self
    }

    pub fn alleles_mismatch(mut self) -> Self {
        self.flags.alleles_match = false;
        self
    }

    pub fn validated(mut self) -> Self {
        self.flags.validated = true;
        self
    }

    pub fn build(self) -> MemberRecord {
        MemberRecord::new(self.accession, self.identity, self.group, self.flags)
    }
}
