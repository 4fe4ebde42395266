//! Fixed-ploidy genotype likelihood model.
//!
//! For a genotype G of ploidy p, a read is assumed to have been sampled from
//! one of the genotype's haplotype copies uniformly at random:
//!
//! ```text
//! ln P(read  | G) = logsumexp over copies h of ln P(read | h)  -  ln p
//! ln P(reads | G) = sum over reads of ln P(read | G)
//! ```
//!
//! The per-ploidy methods below are pure fast paths; each one reduces to the
//! same sum the general polyploid form computes. Equal copies are grouped, so
//! a copy carried n times contributes `ln n + ln P(read | h)` to the
//! logsumexp, and a homozygous genotype collapses to a plain sum with no
//! ploidy penalty at all.

use anyhow::{ensure, Result};

use crate::model::genotype::Genotype;
use crate::model::likelihoods::HaplotypeLikelihoods;
use crate::model::math::{ln_int, log_sum_exp, log_sum_exp2, log_sum_exp3};
use crate::utils::errors::VarforgeError;

/// Computes `ln P(reads | genotype)` for genotypes of one fixed ploidy,
/// reading per-haplotype likelihood vectors from a shared cache.
#[derive(Debug)]
pub struct FixedPloidyModel<'c> {
    ploidy: usize,
    likelihoods: &'c HaplotypeLikelihoods,
}

impl<'c> FixedPloidyModel<'c> {
    pub fn new(ploidy: usize, likelihoods: &'c HaplotypeLikelihoods) -> Result<Self> {
        if ploidy == 0 {
            return Err(VarforgeError::EmptyGenotype.into());
        }
        Ok(Self {
            ploidy,
            likelihoods,
        })
    }

    pub fn ploidy(&self) -> usize {
        self.ploidy
    }

    pub fn log_likelihood(&self, sample: &str, genotype: &Genotype) -> Result<f64> {
        ensure!(
            genotype.ploidy() == self.ploidy,
            "genotype ploidy {} does not match model ploidy {}",
            genotype.ploidy(),
            self.ploidy
        );
        match self.ploidy {
            1 => self.haploid(sample, genotype),
            2 => self.diploid(sample, genotype),
            3 => self.triploid(sample, genotype),
            _ => self.polyploid(sample, genotype),
        }
    }

    fn haploid(&self, sample: &str, genotype: &Genotype) -> Result<f64> {
        let likelihoods = self.likelihoods.get(sample, &genotype.haplotypes()[0])?;
        Ok(likelihoods.iter().sum())
    }

    fn diploid(&self, sample: &str, genotype: &Genotype) -> Result<f64> {
        let haplotypes = genotype.haplotypes();
        let first = self.likelihoods.get(sample, &haplotypes[0])?;
        if genotype.is_homozygous() {
            return Ok(first.iter().sum());
        }
        let second = self.likelihoods.get(sample, &haplotypes[1])?;
        debug_assert_eq!(first.len(), second.len());
        let total: f64 = first
            .iter()
            .zip(second)
            .map(|(&a, &b)| log_sum_exp2(a, b))
            .sum();
        Ok(total - first.len() as f64 * ln_int(2))
    }

    fn triploid(&self, sample: &str, genotype: &Genotype) -> Result<f64> {
        let haplotypes = genotype.haplotypes();
        let first = self.likelihoods.get(sample, &haplotypes[0])?;
        if genotype.is_homozygous() {
            return Ok(first.iter().sum());
        }

        if genotype.zygosity() == 3 {
            let second = self.likelihoods.get(sample, &haplotypes[1])?;
            let third = self.likelihoods.get(sample, &haplotypes[2])?;
            let total: f64 = first
                .iter()
                .zip(second)
                .zip(third)
                .map(|((&a, &b), &c)| log_sum_exp3(a, b, c))
                .sum();
            return Ok(total - first.len() as f64 * ln_int(3));
        }

        // zygosity 2: one haplotype twice, the other once. Haplotypes are
        // sorted, so the duplicate pair is adjacent.
        let (duplicated, singleton) = if haplotypes[0] == haplotypes[1] {
            (&haplotypes[0], &haplotypes[2])
        } else {
            (&haplotypes[1], &haplotypes[0])
        };
        let ln2 = ln_int(2);
        let doubled = self.likelihoods.get(sample, duplicated)?;
        let single = self.likelihoods.get(sample, singleton)?;
        let total: f64 = doubled
            .iter()
            .zip(single)
            .map(|(&d, &s)| log_sum_exp2(ln2 + d, s))
            .sum();
        Ok(total - doubled.len() as f64 * ln_int(3))
    }

    fn polyploid(&self, sample: &str, genotype: &Genotype) -> Result<f64> {
        let zygosity = genotype.zygosity();
        let haplotypes = genotype.haplotypes();
        let first = self.likelihoods.get(sample, &haplotypes[0])?;
        if zygosity == 1 {
            return Ok(first.iter().sum());
        }

        let ln_ploidy = ln_int(self.ploidy);

        if zygosity == 2 {
            let unique = genotype.unique();
            let first_count = genotype.count(unique[0]);
            let second_count = self.ploidy - first_count;
            let first = self.likelihoods.get(sample, unique[0])?;
            let second = self.likelihoods.get(sample, unique[1])?;
            let (ln_first, ln_second) = (ln_int(first_count), ln_int(second_count));
            let total: f64 = first
                .iter()
                .zip(second)
                .map(|(&a, &b)| log_sum_exp2(ln_first + a, ln_second + b))
                .sum();
            return Ok(total - first.len() as f64 * ln_ploidy);
        }

        if zygosity == self.ploidy {
            let vectors = haplotypes
                .iter()
                .map(|haplotype| self.likelihoods.get(sample, haplotype))
                .collect::<Result<Vec<_>>>()?;
            let mut buffer = vec![0.0; self.ploidy];
            let mut total = 0.0;
            for read in 0..first.len() {
                for (slot, vector) in buffer.iter_mut().zip(&vectors) {
                    *slot = vector[read];
                }
                total += log_sum_exp(&buffer) - ln_ploidy;
            }
            return Ok(total);
        }

        // intermediate zygosity: group equal copies and weight by count
        let unique = genotype.unique();
        let weighted: Vec<(f64, &[f64])> = unique
            .iter()
            .map(|haplotype| {
                self.likelihoods
                    .get(sample, haplotype)
                    .map(|vector| (ln_int(genotype.count(haplotype)), vector))
            })
            .collect::<Result<Vec<_>>>()?;
        let mut buffer = vec![0.0; zygosity];
        let mut total = 0.0;
        for read in 0..first.len() {
            for (slot, (weight, vector)) in buffer.iter_mut().zip(&weighted) {
                *slot = weight + vector[read];
            }
            total += log_sum_exp(&buffer) - ln_ploidy;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::genotype::Haplotype;

    fn close(a: f64, b: f64) {
        assert!(
            (a - b).abs() <= 1e-12 * a.abs().max(b.abs()).max(1.0),
            "{a} != {b}"
        );
    }

    fn cache(entries: &[(&str, &[f64])]) -> HaplotypeLikelihoods {
        let mut cache = HaplotypeLikelihoods::new();
        for (sequence, values) in entries {
            cache
                .insert("s", Haplotype::new(*sequence), values.to_vec())
                .unwrap();
        }
        cache
    }

    fn genotype(sequences: &[&str]) -> Genotype {
        Genotype::new(sequences.iter().map(|s| Haplotype::new(*s)).collect()).unwrap()
    }

    #[test]
    fn haploid_is_a_plain_sum() {
        let cache = cache(&[("A", &[-1.0, -2.0, -0.5])]);
        let model = FixedPloidyModel::new(1, &cache).unwrap();
        close(
            model.log_likelihood("s", &genotype(&["A"])).unwrap(),
            -3.5,
        );
    }

    #[test]
    fn homozygous_has_no_ploidy_penalty() {
        let cache = cache(&[("A", &[-1.0, -2.0])]);
        for ploidy in 2..=5 {
            let model = FixedPloidyModel::new(ploidy, &cache).unwrap();
            let hom = genotype(&vec!["A"; ploidy]);
            close(model.log_likelihood("s", &hom).unwrap(), -3.0);
        }
    }

    #[test]
    fn diploid_heterozygote_matches_the_mixture_form() {
        let cache = cache(&[("A", &[-1.0, -2.0, -3.0]), ("C", &[-2.0, -1.0, -4.0])]);
        let model = FixedPloidyModel::new(2, &cache).unwrap();
        let expected = log_sum_exp2(-1.0, -2.0) + log_sum_exp2(-2.0, -1.0)
            + log_sum_exp2(-3.0, -4.0)
            - 3.0 * ln_int(2);
        close(
            model.log_likelihood("s", &genotype(&["A", "C"])).unwrap(),
            expected,
        );
    }

    #[test]
    fn triploid_duplicate_weights_the_doubled_haplotype() {
        let cache = cache(&[("A", &[-1.0, -2.0]), ("C", &[-2.5, -0.5])]);
        let model = FixedPloidyModel::new(3, &cache).unwrap();
        // A twice, C once: each read mixes 2*P(r|A) + P(r|C) over 3 copies
        let expected = log_sum_exp2(ln_int(2) + -1.0, -2.5)
            + log_sum_exp2(ln_int(2) + -2.0, -0.5)
            - 2.0 * ln_int(3);
        close(
            model
                .log_likelihood("s", &genotype(&["A", "A", "C"]))
                .unwrap(),
            expected,
        );
        // and symmetrically with C doubled
        let expected = log_sum_exp2(-1.0, ln_int(2) + -2.5)
            + log_sum_exp2(-2.0, ln_int(2) + -0.5)
            - 2.0 * ln_int(3);
        close(
            model
                .log_likelihood("s", &genotype(&["A", "C", "C"]))
                .unwrap(),
            expected,
        );
    }

    #[test]
    fn triploid_three_way_heterozygote() {
        let cache = cache(&[("A", &[-1.0]), ("C", &[-2.0]), ("G", &[-0.5])]);
        let model = FixedPloidyModel::new(3, &cache).unwrap();
        let expected = log_sum_exp3(-1.0, -2.0, -0.5) - ln_int(3);
        close(
            model
                .log_likelihood("s", &genotype(&["A", "C", "G"]))
                .unwrap(),
            expected,
        );
    }

    #[test]
    fn rejects_ploidy_mismatch_and_zero_ploidy() {
        let cache = cache(&[("A", &[-1.0])]);
        assert!(FixedPloidyModel::new(0, &cache).is_err());
        let model = FixedPloidyModel::new(2, &cache).unwrap();
        assert!(model.log_likelihood("s", &genotype(&["A"])).is_err());
    }

    #[test]
    fn unknown_haplotype_lookup_fails() {
        let cache = cache(&[("A", &[-1.0])]);
        let model = FixedPloidyModel::new(2, &cache).unwrap();
        assert!(model
            .log_likelihood("s", &genotype(&["A", "T"]))
            .is_err());
    }
}
