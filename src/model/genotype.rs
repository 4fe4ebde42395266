use std::fmt;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::utils::errors::VarforgeError;

/// One chromosomal copy: a contiguous reference-spanning sequence of bases.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Haplotype {
    sequence: String,
}

impl Haplotype {
    pub fn new(sequence: impl Into<String>) -> Self {
        Self {
            sequence: sequence.into(),
        }
    }

    pub fn sequence(&self) -> &str {
        &self.sequence
    }
}

impl fmt::Display for Haplotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sequence)
    }
}

/// A fixed-size multiset of haplotypes; its cardinality is the ploidy.
///
/// Haplotypes are kept sorted, so equal copies sit next to each other and two
/// genotypes over the same multiset compare equal regardless of construction
/// order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Genotype {
    haplotypes: Vec<Haplotype>,
}

impl Genotype {
    pub fn new(mut haplotypes: Vec<Haplotype>) -> Result<Self> {
        if haplotypes.is_empty() {
            return Err(VarforgeError::EmptyGenotype.into());
        }
        haplotypes.sort_unstable();
        Ok(Self { haplotypes })
    }

    pub fn ploidy(&self) -> usize {
        self.haplotypes.len()
    }

    pub fn haplotypes(&self) -> &[Haplotype] {
        &self.haplotypes
    }

    /// Number of distinct haplotypes.
    pub fn zygosity(&self) -> usize {
        1 + self
            .haplotypes
            .windows(2)
            .filter(|pair| pair[0] != pair[1])
            .count()
    }

    pub fn is_homozygous(&self) -> bool {
        self.zygosity() == 1
    }

    /// Multiplicity of `haplotype` within the genotype.
    pub fn count(&self, haplotype: &Haplotype) -> usize {
        self.haplotypes.iter().filter(|h| *h == haplotype).count()
    }

    /// The distinct haplotypes, in sorted order.
    pub fn unique(&self) -> Vec<&Haplotype> {
        let mut unique: Vec<&Haplotype> = Vec::with_capacity(self.zygosity());
        for haplotype in &self.haplotypes {
            if unique.last() != Some(&haplotype) {
                unique.push(haplotype);
            }
        }
        unique
    }
}
