pub mod read;
pub mod reference;
pub mod region;
pub mod variant;

// Re-export the glue types the two core components exchange
pub use read::AlignedRead;
pub use reference::{InMemoryReference, ReferenceGenome};
pub use region::GenomeRegion;
pub use variant::Variant;
