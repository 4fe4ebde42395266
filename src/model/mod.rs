pub mod fixed_ploidy;
pub mod genotype;
pub mod likelihoods;
pub mod math;

pub use fixed_ploidy::FixedPloidyModel;
pub use genotype::{Genotype, Haplotype};
pub use likelihoods::HaplotypeLikelihoods;
