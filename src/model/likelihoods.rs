use ahash::AHashMap;
use anyhow::{anyhow, Result};

use crate::model::genotype::Haplotype;
use crate::utils::errors::VarforgeError;

/// Per-sample cache of haplotype likelihood vectors.
///
/// For each `(sample, haplotype)` pair it stores `ln P(read | haplotype)` for
/// every read of that sample, index-aligned across haplotypes: entry `r` of
/// every vector refers to the same read. Inserting a vector whose length
/// disagrees with the sample's established read count is a hard failure.
#[derive(Debug, Clone, Default)]
pub struct HaplotypeLikelihoods {
    samples: AHashMap<String, AHashMap<Haplotype, Vec<f64>>>,
}

impl HaplotypeLikelihoods {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        sample: &str,
        haplotype: Haplotype,
        log_likelihoods: Vec<f64>,
    ) -> Result<()> {
        let vectors = self.samples.entry(sample.to_owned()).or_default();
        if let Some(existing) = vectors.values().next() {
            if existing.len() != log_likelihoods.len() {
                return Err(VarforgeError::DimensionMismatch {
                    sample: sample.to_owned(),
                    expected: existing.len(),
                    actual: log_likelihoods.len(),
                }
                .into());
            }
        }
        vectors.insert(haplotype, log_likelihoods);
        Ok(())
    }

    pub fn get(&self, sample: &str, haplotype: &Haplotype) -> Result<&[f64]> {
        self.samples
            .get(sample)
            .and_then(|vectors| vectors.get(haplotype))
            .map(Vec::as_slice)
            .ok_or_else(|| {
                anyhow!("no likelihoods cached for haplotype '{haplotype}' of sample '{sample}'")
            })
    }

    /// Number of reads the sample's vectors cover, if any are cached.
    pub fn read_count(&self, sample: &str) -> Option<usize> {
        self.samples
            .get(sample)
            .and_then(|vectors| vectors.values().next())
            .map(Vec::len)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_and_returns_vectors() {
        let mut cache = HaplotypeLikelihoods::new();
        cache
            .insert("s1", Haplotype::new("ACGT"), vec![-1.0, -2.0])
            .unwrap();
        assert_eq!(
            cache.get("s1", &Haplotype::new("ACGT")).unwrap(),
            &[-1.0, -2.0]
        );
        assert_eq!(cache.read_count("s1"), Some(2));
        assert_eq!(cache.read_count("s2"), None);
    }

    #[test]
    fn missing_entries_are_errors() {
        let cache = HaplotypeLikelihoods::new();
        assert!(cache.get("s1", &Haplotype::new("ACGT")).is_err());
    }

    #[test]
    fn rejects_mismatched_vector_lengths() {
        let mut cache = HaplotypeLikelihoods::new();
        cache
            .insert("s1", Haplotype::new("ACGT"), vec![-1.0, -2.0, -3.0])
            .unwrap();
        let err = cache
            .insert("s1", Haplotype::new("ACCT"), vec![-1.0])
            .unwrap_err();
        assert_eq!(
            err.downcast::<VarforgeError>().unwrap(),
            VarforgeError::DimensionMismatch {
                sample: "s1".into(),
                expected: 3,
                actual: 1
            }
        );
        // a different sample may have a different read count
        cache
            .insert("s2", Haplotype::new("ACGT"), vec![-1.0])
            .unwrap();
    }
}
