//! Output of device updates
//!
//! The simulation hands every device change to an [`OutputSink`]. Sinks queue
//! updates and write them in batches under a [`FlushPolicy`].

pub mod sink;

pub use sink::*;
