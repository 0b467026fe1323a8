//! Waitlist priority registry.
//!
//! Entries are partitioned by (program, start date). Within a partition the
//! positions of waiting entries always form the dense permutation 1..N,
//! ordered by priority tier then arrival; the whole partition is resorted and
//! rewritten on every mutation.

pub mod domain;
pub mod registry;

pub use domain::{PriorityTier, TierCounts, WaitlistEntry, WaitlistStatistics, WaitlistStatus};
pub use registry::WaitlistRegistry;
