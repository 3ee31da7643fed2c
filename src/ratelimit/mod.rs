//! Rate limiting logic and state management.

mod backend;
mod key;
mod limiter;
mod policy;

pub use backend::LimiterBackend;
pub use key::ClientKey;
pub use limiter::{spawn_sweeper, Decision, Limit, SlidingWindowLimiter};
pub use policy::{CategoryConfig, CategoryPolicy, FailMode, PolicyConfig, PolicyTable};
