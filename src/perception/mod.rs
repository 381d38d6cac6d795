pub mod classifier;
pub mod filters;
pub mod label;
pub mod memory;
pub mod scanner;
pub mod selector;
pub mod traits;
pub mod types;

pub use traits::{MutationWatch, Page};
pub use types::{Candidate, ControlKind, NodeId, ProcessedSet};
