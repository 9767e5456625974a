//! Rate limiting logic and state management.

mod clock;
mod entry;
mod janitor;
mod key;
mod limiter;
mod policy;
mod store;
mod verdict;

pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use entry::{EntryState, LimitEntry};
pub use janitor::{Janitor, JanitorHandle, DEFAULT_RETENTION, DEFAULT_SWEEP_INTERVAL};
pub use key::EntryKey;
pub use limiter::{EntrySnapshot, LimiterStats, RateLimiter};
pub use policy::{parse_policies, Policy, PolicySet, PolicyTable, DEFAULT_POLICY};
pub use store::{MemoryStore, WindowStore};
pub use verdict::{Verdict, VerdictBody};
