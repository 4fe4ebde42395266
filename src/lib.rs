//! # VarForge - Variant Caller Core
//!
//! Core components for a small-variant caller: candidate variant discovery by
//! local re-assembly of aligned reads into k-mer de Bruijn graphs, and a
//! fixed-ploidy genotype likelihood model with ploidy-specialized numerics.
//! Read, reference and VCF I/O live outside this crate; it consumes aligned
//! reads and a reference handle and produces candidate variants and
//! log-likelihoods.

pub mod assembly;
pub mod core;
pub mod model;
pub mod utils;

// Re-export commonly used types at crate level
pub use crate::assembly::{
    Assembler, AssemblerCandidateGenerator, AssemblyAttempt, AssemblyOutcome, AssemblyPhase,
    CandidateSource,
};
pub use crate::core::{AlignedRead, GenomeRegion, InMemoryReference, ReferenceGenome, Variant};
pub use crate::model::{FixedPloidyModel, Genotype, Haplotype, HaplotypeLikelihoods};
pub use crate::utils::configuration::{
    AssemblyConfig, IndelAnchoring, ModelConfig, VarforgeConfig,
};
pub use crate::utils::errors::VarforgeError;

/// Result type used throughout the crate
pub type Result<T> = anyhow::Result<T>;

/// Error type used throughout the crate
pub type Error = anyhow::Error;
