pub mod generator;
pub mod graph;

pub use generator::{
    AssemblerCandidateGenerator, AssemblyAttempt, AssemblyOutcome, AssemblyPhase, CandidateSource,
};
pub use graph::{Assembler, AssemblyVariant, MIN_KMER_SIZE};
