pub mod aggregation;
pub mod locks;
pub mod processor;

pub use aggregation::AggregationEngine;
pub use locks::SessionLocks;
pub use processor::{Outcome, PresenceProcessor};
