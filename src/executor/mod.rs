pub mod expand;
pub mod mutation;
pub mod outcome;
pub mod polling;

pub use expand::ExpansionExecutor;
pub use outcome::{Evidence, ExpandOutcome};
