pub mod expander;
pub mod loop_control;
pub mod state;
pub mod status;

pub use expander::Expander;
pub use state::{Counters, RunOutcome, RunPhase, RunReport};
pub use status::{StatusBus, StatusMessage, StatusPhase};
