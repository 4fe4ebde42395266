use std::path::Path;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Top-level configuration for the caller core.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VarforgeConfig {
    /// Local re-assembly candidate generation.
    pub assembly: AssemblyConfig,
    /// Genotype likelihood model settings.
    pub model: ModelConfig,
}

/// Settings for the assembler candidate generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyConfig {
    /// Default k-mer sizes tried for every region, smallest first.
    /// An empty list disables re-assembly entirely.
    pub kmer_sizes: Vec<usize>,
    /// Bases below this phred quality are masked to 'N' before insertion.
    pub min_base_quality: u8,
    /// Non-reference graph edges seen in fewer reads than this are pruned.
    pub min_supporting_reads: u32,
    /// Candidates whose ref or alt allele exceeds this length are discarded.
    pub max_variant_size: usize,
    /// How insertions and deletions are reported.
    pub indel_anchoring: IndelAnchoring,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            kmer_sizes: vec![10, 25],
            min_base_quality: 20,
            min_supporting_reads: 2,
            max_variant_size: 2000,
            indel_anchoring: IndelAnchoring::Raw,
        }
    }
}

/// Indel reporting convention.
///
/// The assembler naturally produces unanchored alleles (a pure insertion has
/// an empty ref allele, a pure deletion an empty alt allele). VCF writers
/// usually want the event anchored on the preceding reference base instead;
/// both forms are supported so the output layer can choose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndelAnchoring {
    /// Empty-allele form straight out of the assembler.
    Raw,
    /// Prepend the preceding reference base and shift the position left.
    LeftAnchored,
}

/// Settings for the fixed-ploidy genotype likelihood model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Number of haplotype copies per sample genotype.
    pub ploidy: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self { ploidy: 2 }
    }
}

/// Maximum phred base quality a read is allowed to carry.
pub const MAX_BASE_QUALITY: u8 = 93;

impl VarforgeConfig {
    /// Load configuration from a TOML file, then apply `VARFORGE_*`
    /// environment overrides (e.g. `VARFORGE_ASSEMBLY__MIN_BASE_QUALITY=25`).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config: Self = Config::builder()
            .add_source(File::from(path))
            .add_source(Environment::with_prefix("VARFORGE").separator("__"))
            .build()
            .with_context(|| format!("loading configuration from {}", path.display()))?
            .try_deserialize()
            .context("deserializing configuration")?;
        config.validate()?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Environment-only configuration on top of the built-in defaults.
    pub fn from_env() -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(Environment::with_prefix("VARFORGE").separator("__"))
            .build()
            .context("building configuration from environment")?
            .try_deserialize()
            .context("deserializing configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.assembly.validate()?;
        if self.model.ploidy == 0 {
            bail!("model.ploidy must be at least 1");
        }
        Ok(())
    }
}

impl AssemblyConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(&k) = self
            .kmer_sizes
            .iter()
            .find(|&&k| k < crate::assembly::MIN_KMER_SIZE)
        {
            bail!(
                "assembly.kmer_sizes contains {k}, below the minimum of {}",
                crate::assembly::MIN_KMER_SIZE
            );
        }
        if self.min_base_quality > MAX_BASE_QUALITY {
            bail!(
                "assembly.min_base_quality {} exceeds the phred maximum of {MAX_BASE_QUALITY}",
                self.min_base_quality
            );
        }
        if self.max_variant_size == 0 {
            bail!("assembly.max_variant_size must be at least 1");
        }
        Ok(())
    }
}
