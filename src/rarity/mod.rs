pub mod bucket;
pub mod engine;
pub mod error;
pub mod population;
pub mod ranking;
pub mod sports;

#[cfg(test)]
pub mod test_support;

pub use engine::{RarityEngine, RarityPolicy};
pub use error::RarityError;
pub use population::{Partition, PartitionKind, Population};
