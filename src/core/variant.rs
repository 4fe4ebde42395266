use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::region::GenomeRegion;

/// A candidate variant: a reference allele and an alternative allele at a
/// genomic position.
///
/// Alleles are stored normalized — no shared leading or trailing bases — so a
/// pure insertion has an empty ref allele, a pure deletion an empty alt
/// allele, and an SNV has both of length one. The region spans exactly the
/// reference allele.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variant {
    region: GenomeRegion,
    ref_allele: String,
    alt_allele: String,
}

impl Variant {
    pub fn new(
        contig: impl Into<String>,
        start: u64,
        ref_allele: impl Into<String>,
        alt_allele: impl Into<String>,
    ) -> Self {
        let ref_allele = ref_allele.into();
        let region = GenomeRegion::new(contig, start, start + ref_allele.len() as u64);
        Self {
            region,
            ref_allele,
            alt_allele: alt_allele.into(),
        }
    }

    pub fn region(&self) -> &GenomeRegion {
        &self.region
    }

    pub fn ref_allele(&self) -> &str {
        &self.ref_allele
    }

    pub fn alt_allele(&self) -> &str {
        &self.alt_allele
    }

    pub fn is_snv(&self) -> bool {
        self.ref_allele.len() == 1 && self.alt_allele.len() == 1
    }

    pub fn is_insertion(&self) -> bool {
        self.ref_allele.len() < self.alt_allele.len()
    }

    pub fn is_deletion(&self) -> bool {
        self.ref_allele.len() > self.alt_allele.len()
    }

    pub fn is_mnv(&self) -> bool {
        self.ref_allele.len() == self.alt_allele.len() && self.ref_allele.len() > 1
    }
}

impl Ord for Variant {
    fn cmp(&self, other: &Self) -> Ordering {
        (&self.region, &self.ref_allele, &self.alt_allele).cmp(&(
            &other.region,
            &other.ref_allele,
            &other.alt_allele,
        ))
    }
}

impl PartialOrd for Variant {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} {}>{}",
            self.region.contig,
            self.region.start,
            if self.ref_allele.is_empty() {
                "-"
            } else {
                &self.ref_allele
            },
            if self.alt_allele.is_empty() {
                "-"
            } else {
                &self.alt_allele
            }
        )
    }
}
