//! Background jobs driven by [`PeriodicTask`].

mod periodic;
mod prune;
mod warm;

pub use periodic::{PeriodicJob, PeriodicTask};
pub use prune::RetentionPruner;
pub use warm::{CacheWarmer, FINALITY_PATH, WarmError, WarmOutcome};
