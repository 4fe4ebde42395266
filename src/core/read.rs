use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::core::region::GenomeRegion;
use crate::utils::configuration::MAX_BASE_QUALITY;

/// A sequencing read aligned to the reference.
///
/// Holds only what candidate generation needs: the called bases, per-base
/// phred qualities and the mapped reference region. CIGAR-level detail stays
/// with the alignment layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignedRead {
    name: String,
    sequence: String,
    qualities: Vec<u8>,
    region: GenomeRegion,
}

impl AlignedRead {
    pub fn new(
        name: impl Into<String>,
        sequence: impl Into<String>,
        qualities: Vec<u8>,
        region: GenomeRegion,
    ) -> Result<Self> {
        let name = name.into();
        let sequence = sequence.into();
        if sequence.len() != qualities.len() {
            bail!(
                "read '{name}' has {} bases but {} quality scores",
                sequence.len(),
                qualities.len()
            );
        }
        if let Some(q) = qualities.iter().find(|&&q| q > MAX_BASE_QUALITY) {
            bail!("read '{name}' has base quality {q} above the phred maximum");
        }
        Ok(Self {
            name,
            sequence,
            qualities,
            region,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sequence(&self) -> &str {
        &self.sequence
    }

    pub fn qualities(&self) -> &[u8] {
        &self.qualities
    }

    pub fn mapped_region(&self) -> &GenomeRegion {
        &self.region
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}
