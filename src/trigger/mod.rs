//! External triggers
//!
//! Outside systems can poke a running simulation: each trigger is a JSON
//! object that is queued on the scheduler as "happening now" and later
//! filtered and applied by the fleet's lifecycle actions.
//!
//! - [`TriggerHandle`]: the in-process entry point, safe to share across threads
//! - [`TriggerListener`]: an HTTP listener taking triggers as `POST /` requests

pub mod handle;
pub mod listener;

pub use handle::*;
pub use listener::*;
