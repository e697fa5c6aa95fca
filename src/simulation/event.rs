//! Events and the world they act on
//!
//! An event is a time, an action and a payload. Actions are plain function
//! pointers over a [`World`], so events carry no captured state and can be
//! queued from any thread.

use std::fmt;

use crate::simulation::{Dispatch, FlushError, HandlerError, Timed};

/// Data carried by an event
pub trait EventPayload: Send + fmt::Debug + 'static {
    /// Short name used in logs
    fn kind(&self) -> &'static str;

    /// The self-rescheduling chain this event belongs to, if any
    ///
    /// A chain that keeps failing is put to sleep by the scheduler.
    fn chain(&self) -> Option<u64> {
        None
    }
}

/// State mutated by event actions, plus its output collaborator
pub trait World {
    /// Payload type of events acting on this world
    type Payload: EventPayload;

    /// Hand queued output over if the flush criterion is met
    fn flush_if_ready(&mut self, _now: f64) -> Result<usize, FlushError> {
        Ok(0)
    }

    /// Hand all queued output over
    fn flush_now(&mut self, _now: f64) -> Result<usize, FlushError> {
        Ok(0)
    }

    /// Called once when the run catches up with real time
    fn enter_interactive(&mut self) {}
}

/// Action run when an event fires
pub type Action<W> = fn(&mut W, &mut Dispatch<'_, W>, <W as World>::Payload) -> Result<(), HandlerError>;

/// A scheduled action
pub struct Event<W: World> {
    /// Epoch seconds at which the action runs
    pub time: f64,
    /// What to run
    pub action: Action<W>,
    /// Argument for the action
    pub payload: W::Payload,
}

impl<W: World> Event<W> {
    /// Create an event
    pub fn new(time: f64, action: Action<W>, payload: W::Payload) -> Self {
        Self { time, action, payload }
    }
}

impl<W: World> fmt::Debug for Event<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("time", &self.time)
            .field("payload", &self.payload)
            .finish()
    }
}

impl<W: World> Timed for Event<W> {
    fn time(&self) -> f64 {
        self.time
    }

    fn set_time(&mut self, t: f64) {
        self.time = t;
    }
}
