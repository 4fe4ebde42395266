//! Candidate variant generation by local re-assembly.
//!
//! Reads are accumulated into one de Bruijn graph per configured k-mer size.
//! Candidate generation assembles each graph against the reference window
//! covering every added read; if no default k resolves the window, a ladder
//! of larger fallback sizes is tried with freshly built graphs.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::assembly::graph::{Assembler, AssemblyVariant};
use crate::core::{AlignedRead, GenomeRegion, ReferenceGenome, Variant};
use crate::utils::configuration::{AssemblyConfig, IndelAnchoring};

/// Number of fallback k-mer sizes tried after every default size fails.
const NUM_FALLBACK_KMER_SIZES: usize = 6;
/// Spacing between consecutive fallback sizes.
const FALLBACK_KMER_STEP: usize = 10;

/// A source of candidate variants for a region.
///
/// Other sources in a full pipeline (VCF extraction, downloads) share this
/// interface; re-assembly is the one that actually needs the reads.
pub trait CandidateSource {
    /// Whether this source does anything with reads at all.
    fn requires_reads(&self) -> bool {
        false
    }

    fn add_read(&mut self, _read: &AlignedRead) -> Result<()> {
        Ok(())
    }

    fn add_reads(&mut self, reads: &[AlignedRead]) -> Result<()> {
        for read in reads {
            self.add_read(read)?;
        }
        Ok(())
    }

    /// Hint at how many more reads will be added.
    fn reserve(&mut self, _additional: usize) {}

    /// Drop all accumulated state between assembly regions.
    fn clear(&mut self) {}

    /// Candidates overlapping `region`, sorted and deduplicated.
    fn generate_candidates(&mut self, region: &GenomeRegion) -> Result<Vec<Variant>>;
}

/// Which rung of the k-mer ladder an assembly attempt ran on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssemblyPhase {
    Default,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssemblyOutcome {
    Success,
    Failure,
}

/// One assembly attempt at a specific k, as recorded during the most recent
/// [`AssemblerCandidateGenerator::generate_candidates`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyAttempt {
    pub phase: AssemblyPhase,
    pub k: usize,
    pub outcome: AssemblyOutcome,
}

/// Generates candidate variants by re-assembling reads around a region.
pub struct AssemblerCandidateGenerator<'r, R: ReferenceGenome> {
    reference: &'r R,
    default_kmer_sizes: Vec<usize>,
    fallback_kmer_sizes: Vec<usize>,
    assemblers: Vec<Assembler>,
    region_assembled: Option<GenomeRegion>,
    sequence_buffer: Vec<String>,
    attempts: Vec<AssemblyAttempt>,
    min_base_quality: u8,
    min_supporting_reads: u32,
    max_variant_size: usize,
    indel_anchoring: IndelAnchoring,
}

impl<'r, R: ReferenceGenome> AssemblerCandidateGenerator<'r, R> {
    pub fn new(reference: &'r R, config: &AssemblyConfig) -> Result<Self> {
        config.validate()?;

        let mut default_kmer_sizes = config.kmer_sizes.clone();
        default_kmer_sizes.sort_unstable();
        default_kmer_sizes.dedup();

        let assemblers = default_kmer_sizes
            .iter()
            .map(|&k| Assembler::new(k))
            .collect::<Result<Vec<_>>>()?;

        let fallback_kmer_sizes = match default_kmer_sizes.last() {
            Some(&largest) => (1..=NUM_FALLBACK_KMER_SIZES)
                .map(|step| largest + step * FALLBACK_KMER_STEP)
                .collect(),
            None => Vec::new(),
        };

        Ok(Self {
            reference,
            default_kmer_sizes,
            fallback_kmer_sizes,
            assemblers,
            region_assembled: None,
            sequence_buffer: Vec::new(),
            attempts: Vec::new(),
            min_base_quality: config.min_base_quality,
            min_supporting_reads: config.min_supporting_reads,
            max_variant_size: config.max_variant_size,
            indel_anchoring: config.indel_anchoring,
        })
    }

    /// The deduplicated, ascending default k-mer sizes in use.
    pub fn kmer_sizes(&self) -> &[usize] {
        &self.default_kmer_sizes
    }

    /// Union of the mapped regions of every added read, if any.
    pub fn region_assembled(&self) -> Option<&GenomeRegion> {
        self.region_assembled.as_ref()
    }

    /// The assembly attempts made by the most recent candidate generation.
    pub fn attempts(&self) -> &[AssemblyAttempt] {
        &self.attempts
    }

    fn assembly_window(&self, assembled: &GenomeRegion, k: usize) -> Result<GenomeRegion> {
        let contig_size = self
            .reference
            .contig_size(&assembled.contig)
            .ok_or_else(|| anyhow!("contig '{}' not in reference", assembled.contig))?;
        let mut window = assembled.expand(k as u64);
        window.end = window.end.min(contig_size);
        Ok(window)
    }

    /// Re-insert every buffered read into the assembler at `index`, which an
    /// assembly pass has just drained. Keeps repeated candidate generation
    /// over the same accumulated reads reproducible.
    fn refeed(&mut self, index: usize) -> Result<()> {
        let assembler = &mut self.assemblers[index];
        for sequence in &self.sequence_buffer {
            if sequence.len() >= assembler.kmer_size() {
                assembler.insert_read(sequence.as_bytes())?;
            }
        }
        Ok(())
    }

    fn record_attempt(&mut self, phase: AssemblyPhase, k: usize, success: bool) {
        let outcome = if success {
            AssemblyOutcome::Success
        } else {
            AssemblyOutcome::Failure
        };
        debug!(phase = ?phase, k, outcome = ?outcome, "assembly attempt finished");
        self.attempts.push(AssemblyAttempt { phase, k, outcome });
    }

    fn finalize(mut variants: Vec<Variant>, region: &GenomeRegion) -> Vec<Variant> {
        variants.retain(|variant| variant.region().overlaps(region));
        variants.sort_unstable();
        variants.dedup();
        variants
    }
}

impl<'r, R: ReferenceGenome> CandidateSource for AssemblerCandidateGenerator<'r, R> {
    fn requires_reads(&self) -> bool {
        true
    }

    fn add_read(&mut self, read: &AlignedRead) -> Result<()> {
        let sequence = if all_bases_good_quality(read, self.min_base_quality) {
            read.sequence().to_owned()
        } else {
            mask_low_quality_bases(read, self.min_base_quality)
        };

        for assembler in &mut self.assemblers {
            if sequence.len() >= assembler.kmer_size() {
                assembler.insert_read(sequence.as_bytes())?;
            }
        }

        self.region_assembled = match self.region_assembled.take() {
            Some(assembled) => Some(assembled.encompassing(read.mapped_region())?),
            None => Some(read.mapped_region().clone()),
        };
        self.sequence_buffer.push(sequence);
        Ok(())
    }

    fn reserve(&mut self, additional: usize) {
        self.sequence_buffer.reserve(additional);
    }

    fn clear(&mut self) {
        for assembler in &mut self.assemblers {
            assembler.clear();
        }
        self.region_assembled = None;
        self.sequence_buffer.clear();
        self.attempts.clear();
    }

    fn generate_candidates(&mut self, region: &GenomeRegion) -> Result<Vec<Variant>> {
        self.attempts.clear();
        let Some(assembled) = self.region_assembled.clone() else {
            return Ok(Vec::new());
        };

        let mut result = Vec::new();
        let mut failed_defaults = 0;

        for index in 0..self.assemblers.len() {
            let k = self.assemblers[index].kmer_size();
            debug!(phase = ?AssemblyPhase::Default, k, "attempting local re-assembly");
            let window = self.assembly_window(&assembled, k)?;
            let window_sequence = self
                .reference
                .fetch(&window)
                .with_context(|| format!("fetching reference for {window}"))?;
            if window_sequence.as_bytes().contains(&b'N') {
                debug!(window = %window, "reference window contains ambiguous bases, stopping");
                return Ok(Self::finalize(result, region));
            }

            self.assemblers[index].insert_reference(window_sequence.as_bytes())?;
            let success = try_assemble_region(
                &mut self.assemblers[index],
                &window,
                &window_sequence,
                self.min_supporting_reads,
                self.max_variant_size,
                self.indel_anchoring,
                &mut result,
            )?;
            self.record_attempt(AssemblyPhase::Default, k, success);
            if !success {
                failed_defaults += 1;
            }
            self.refeed(index)?;
        }

        if !self.assemblers.is_empty() && failed_defaults == self.assemblers.len() {
            for k in self.fallback_kmer_sizes.clone() {
                debug!(phase = ?AssemblyPhase::Fallback, k, "attempting local re-assembly");
                let window = self.assembly_window(&assembled, k)?;
                let window_sequence = self
                    .reference
                    .fetch(&window)
                    .with_context(|| format!("fetching reference for {window}"))?;
                if window_sequence.as_bytes().contains(&b'N') {
                    debug!(window = %window, "reference window contains ambiguous bases, stopping");
                    return Ok(Self::finalize(result, region));
                }

                let mut assembler = Assembler::with_reference(k, window_sequence.as_bytes())?;
                for sequence in &self.sequence_buffer {
                    if sequence.len() >= k {
                        assembler.insert_read(sequence.as_bytes())?;
                    }
                }
                let success = try_assemble_region(
                    &mut assembler,
                    &window,
                    &window_sequence,
                    self.min_supporting_reads,
                    self.max_variant_size,
                    self.indel_anchoring,
                    &mut result,
                )?;
                self.record_attempt(AssemblyPhase::Fallback, k, success);
                if success {
                    break;
                }
            }
        }

        Ok(Self::finalize(result, region))
    }
}

fn all_bases_good_quality(read: &AlignedRead, min_quality: u8) -> bool {
    read.qualities().iter().all(|&quality| quality >= min_quality)
}

fn mask_low_quality_bases(read: &AlignedRead, min_quality: u8) -> String {
    read.sequence()
        .bytes()
        .zip(read.qualities())
        .map(|(base, &quality)| if quality >= min_quality { base as char } else { 'N' })
        .collect()
}

/// One assembly pass: clean the graph, prune it, turn its bubbles into
/// genomic variants appended to `out`.
///
/// Returns `false` (with `out` untouched) when this k could not resolve the
/// window. The assembler is drained either way; the caller re-feeds it.
fn try_assemble_region(
    assembler: &mut Assembler,
    window: &GenomeRegion,
    window_sequence: &str,
    min_supporting_reads: u32,
    max_variant_size: usize,
    anchoring: IndelAnchoring,
    out: &mut Vec<Variant>,
) -> Result<bool> {
    assembler.remove_trivial_nonreference_cycles();
    if !assembler.prune(min_supporting_reads) {
        assembler.clear();
        return Ok(false);
    }

    let mut variants = assembler.extract_variants()?;
    assembler.clear();

    for variant in &mut variants {
        trim_shared_bases(variant);
    }
    let variants = split_mnvs(variants);

    let first_new = out.len();
    for variant in variants {
        if variant.ref_allele.is_empty() && variant.alt_allele.is_empty() {
            continue;
        }
        if variant.ref_allele.len() > max_variant_size
            || variant.alt_allele.len() > max_variant_size
        {
            continue;
        }
        out.push(map_to_genomic(variant, window, window_sequence, anchoring));
    }

    let mut appended = out.split_off(first_new);
    appended.sort_unstable();
    appended.dedup();
    out.extend(appended);
    Ok(true)
}

/// Strip the bases shared between the alleles: common suffix first, then
/// common prefix, shifting the offset right by the prefix length. Stripping
/// the suffix first places repeat-mediated indels at their leftmost position.
fn trim_shared_bases(variant: &mut AssemblyVariant) {
    let shared_suffix = variant
        .ref_allele
        .bytes()
        .rev()
        .zip(variant.alt_allele.bytes().rev())
        .take_while(|(r, a)| r == a)
        .count();
    variant
        .ref_allele
        .truncate(variant.ref_allele.len() - shared_suffix);
    variant
        .alt_allele
        .truncate(variant.alt_allele.len() - shared_suffix);

    let shared_prefix = variant
        .ref_allele
        .bytes()
        .zip(variant.alt_allele.bytes())
        .take_while(|(r, a)| r == a)
        .count();
    variant.ref_allele.drain(..shared_prefix);
    variant.alt_allele.drain(..shared_prefix);
    variant.offset += shared_prefix;
}

fn is_mnv(variant: &AssemblyVariant) -> bool {
    variant.ref_allele.len() == variant.alt_allele.len() && variant.ref_allele.len() > 1
}

/// Break multi-nucleotide variants into their constituent SNVs, dropping the
/// positions where the alleles agree.
fn split_mnvs(variants: Vec<AssemblyVariant>) -> Vec<AssemblyVariant> {
    let mut out = Vec::with_capacity(variants.len());
    for variant in variants {
        if !is_mnv(&variant) {
            out.push(variant);
            continue;
        }
        for (index, (r, a)) in variant
            .ref_allele
            .bytes()
            .zip(variant.alt_allele.bytes())
            .enumerate()
        {
            if r != a {
                out.push(AssemblyVariant {
                    offset: variant.offset + index,
                    ref_allele: (r as char).to_string(),
                    alt_allele: (a as char).to_string(),
                });
            }
        }
    }
    out
}

fn map_to_genomic(
    variant: AssemblyVariant,
    window: &GenomeRegion,
    window_sequence: &str,
    anchoring: IndelAnchoring,
) -> Variant {
    let AssemblyVariant {
        mut offset,
        mut ref_allele,
        mut alt_allele,
    } = variant;

    if anchoring == IndelAnchoring::LeftAnchored
        && (ref_allele.is_empty() || alt_allele.is_empty())
        && offset > 0
    {
        if let Some(&base) = window_sequence.as_bytes().get(offset - 1) {
            ref_allele.insert(0, base as char);
            alt_allele.insert(0, base as char);
            offset -= 1;
        }
    }

    Variant::new(
        window.contig.clone(),
        window.start + offset as u64,
        ref_allele,
        alt_allele,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assembly_variant(offset: usize, r: &str, a: &str) -> AssemblyVariant {
        AssemblyVariant {
            offset,
            ref_allele: r.into(),
            alt_allele: a.into(),
        }
    }

    #[test]
    fn masks_only_low_quality_bases() {
        let read = AlignedRead::new(
            "r1",
            "ACGTACGT",
            vec![30, 30, 10, 30, 30, 19, 30, 30],
            GenomeRegion::new("1", 0, 8),
        )
        .unwrap();
        assert!(!all_bases_good_quality(&read, 20));
        assert_eq!(mask_low_quality_bases(&read, 20), "ACNTANGT");

        let clean = AlignedRead::new("r2", "ACGT", vec![20; 4], GenomeRegion::new("1", 0, 4))
            .unwrap();
        assert!(all_bases_good_quality(&clean, 20));
    }

    #[test]
    fn trim_strips_suffix_before_prefix() {
        // repeat-mediated insertion: both orders of trimming are valid, the
        // suffix-first order keeps the leftmost placement
        let mut variant = assembly_variant(9, "ACGTACGTA", "ACGTAAACGTA");
        trim_shared_bases(&mut variant);
        assert_eq!(
            (variant.offset, variant.ref_allele.as_str(), variant.alt_allele.as_str()),
            (13, "", "AA")
        );

        let mut snv = assembly_variant(2, "CCTGGATTC", "CCTGCATTC");
        trim_shared_bases(&mut snv);
        assert_eq!(
            (snv.offset, snv.ref_allele.as_str(), snv.alt_allele.as_str()),
            (6, "G", "C")
        );
    }

    #[test]
    fn trim_leaves_normalized_variants_alone() {
        let mut variant = assembly_variant(5, "A", "G");
        trim_shared_bases(&mut variant);
        assert_eq!(variant, assembly_variant(5, "A", "G"));
    }

    #[test]
    fn mnvs_split_into_mismatching_positions_only() {
        let split = split_mnvs(vec![assembly_variant(10, "TACG", "CACT")]);
        assert_eq!(
            split,
            vec![assembly_variant(10, "T", "C"), assembly_variant(13, "G", "T")]
        );

        // non-MNVs pass through untouched
        let passthrough = split_mnvs(vec![assembly_variant(3, "A", "")]);
        assert_eq!(passthrough, vec![assembly_variant(3, "A", "")]);
    }

    #[test]
    fn left_anchoring_pulls_in_the_preceding_base() {
        let window = GenomeRegion::new("1", 91, 117);
        let window_sequence = "ATTACAGGCACGTACGTACTTGGATC";

        let insertion = map_to_genomic(
            assembly_variant(13, "", "AA"),
            &window,
            window_sequence,
            IndelAnchoring::LeftAnchored,
        );
        assert_eq!(insertion, Variant::new("1", 103, "T", "TAA"));

        let raw = map_to_genomic(
            assembly_variant(13, "", "AA"),
            &window,
            window_sequence,
            IndelAnchoring::Raw,
        );
        assert_eq!(raw, Variant::new("1", 104, "", "AA"));

        // SNVs are never anchored
        let snv = map_to_genomic(
            assembly_variant(13, "A", "G"),
            &window,
            window_sequence,
            IndelAnchoring::LeftAnchored,
        );
        assert_eq!(snv, Variant::new("1", 104, "A", "G"));
    }
}
