pub mod config;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod perception;

use std::sync::Arc;

pub use config::ExpanderConfig;
pub use engine::{Expander, RunOutcome, RunReport, StatusMessage, StatusPhase};
pub use errors::{ExpanderError, ExpanderResult, PageError};
pub use perception::{NodeId, Page};

/// Installs the global tracing subscriber. `RUST_LOG` (also read from a
/// `.env` file) overrides the default `info` filter.
pub fn init_tracing() {
    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

/// Builds an expander for `page` from `config.toml` when one can be found,
/// or from the built-in defaults.
pub fn expander_for(page: Arc<dyn Page>) -> ExpanderResult<Expander> {
    let config = config::load_or_default();
    tracing::info!(
        idle_limit = config.limits.idle_limit,
        safety_limit = config.limits.safety_limit,
        "creating expander"
    );
    Expander::new(page, config)
}
