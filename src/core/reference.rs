use ahash::AHashMap;
use anyhow::{anyhow, bail, Result};

use crate::core::region::GenomeRegion;

/// Read-only access to reference sequence.
///
/// Implementations may be backed by an indexed FASTA reader or anything else;
/// the caller core only ever borrows one and issues blocking lookups.
/// Returned sequence may contain 'N' bases — the candidate generator checks
/// for them explicitly.
pub trait ReferenceGenome {
    /// Length of a contig in bases, or `None` for an unknown contig.
    fn contig_size(&self, contig: &str) -> Option<u64>;

    /// Fetch the bases covered by `region`.
    fn fetch(&self, region: &GenomeRegion) -> Result<String>;
}

/// Reference genome held entirely in memory, keyed by contig name.
///
/// Intended for small references and tests; production pipelines would plug
/// in an indexed FASTA implementation of [`ReferenceGenome`] instead.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReference {
    contigs: AHashMap<String, String>,
}

impl InMemoryReference {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contig(mut self, name: impl Into<String>, sequence: impl Into<String>) -> Self {
        self.contigs.insert(name.into(), sequence.into());
        self
    }

    pub fn add_contig(&mut self, name: impl Into<String>, sequence: impl Into<String>) {
        self.contigs.insert(name.into(), sequence.into());
    }
}

impl ReferenceGenome for InMemoryReference {
    fn contig_size(&self, contig: &str) -> Option<u64> {
        self.contigs.get(contig).map(|s| s.len() as u64)
    }

    fn fetch(&self, region: &GenomeRegion) -> Result<String> {
        let sequence = self
            .contigs
            .get(&region.contig)
            .ok_or_else(|| anyhow!("contig '{}' not in reference", region.contig))?;
        let (start, end) = (region.start as usize, region.end as usize);
        if end > sequence.len() || start > end {
            bail!(
                "region {region} outside contig '{}' (length {})",
                region.contig,
                sequence.len()
            );
        }
        Ok(sequence[start..end].to_string())
    }
}
