//! Discrete-event scheduler
//!
//! The scheduler repeatedly takes the earliest event off the queue, moves the
//! virtual clock to its time and runs its action against the world. Bounded
//! runs stop at the end time or when the queue drains. Live runs never drain:
//! once they catch up with the wall clock they pace themselves against it and
//! idle until an event falls due or another thread injects one.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

use crate::simulation::clock::{format_time, ClockReader, VirtualClock, WallClock};
use crate::simulation::{
    Action, Event, EventPayload, EventQueue, HandlerError, RunStatistics, SimulationResult, World,
};

/// Default longest idle wait
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Consecutive failures after which a chain goes dormant
pub const DEFAULT_MAX_CHAIN_FAILURES: u32 = 3;

/// Attempts made to flush output when the run ends
pub const FINAL_FLUSH_ATTEMPTS: u32 = 3;

/// What the scheduler is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SchedulerState {
    /// Built but `run` has not been called yet
    NotStarted = 3,
    /// Dispatching events
    Running = 0,
    /// Live and waiting for an event to fall due or arrive
    IdleWaiting = 1,
    /// Finished; further insertions are refused
    Terminated = 2,
}

impl SchedulerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SchedulerState::Running,
            1 => SchedulerState::IdleWaiting,
            3 => SchedulerState::NotStarted,
            _ => SchedulerState::Terminated,
        }
    }
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchedulerState::NotStarted => "not started",
            SchedulerState::Running => "running",
            SchedulerState::IdleWaiting => "idle",
            SchedulerState::Terminated => "terminated",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug)]
struct Control {
    state: AtomicU8,
    stop: AtomicBool,
}

impl Control {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(SchedulerState::NotStarted as u8),
            stop: AtomicBool::new(false),
        }
    }

    fn state(&self) -> SchedulerState {
        SchedulerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: SchedulerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

fn schedule_checked<W: World>(
    clock: &VirtualClock,
    queue: &EventQueue<Event<W>>,
    time: f64,
    action: Action<W>,
    payload: W::Payload,
) -> Result<bool, HandlerError> {
    let current = clock.now();
    if !(time >= current) {
        return Err(HandlerError::ScheduleInPast { attempted: time, current });
    }
    if let Some(end) = clock.end_time() {
        if time >= end {
            return Ok(false);
        }
    }
    Ok(queue.insert(Event::new(time, action, payload)))
}

/// Context handed to an action while it runs
///
/// Gives the action the current time and lets it schedule follow-up events.
pub struct Dispatch<'a, W: World> {
    clock: &'a VirtualClock,
    queue: &'a EventQueue<Event<W>>,
    control: &'a Control,
}

impl<W: World> Dispatch<'_, W> {
    /// Current virtual time
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// End of the timeline, if bounded
    pub fn end_time(&self) -> Option<f64> {
        self.clock.end_time()
    }

    /// Whether the run is live
    pub fn is_live(&self) -> bool {
        self.clock.is_live()
    }

    /// Current real time
    pub fn wall_now(&self) -> f64 {
        self.clock.wall_now()
    }

    /// Schedule an action at virtual time `time`
    ///
    /// Returns `Ok(false)` when the event would fall at or after the end
    /// time and is therefore not queued. Scheduling before the current
    /// time is an error.
    pub fn schedule_at(
        &mut self,
        time: f64,
        action: Action<W>,
        payload: W::Payload,
    ) -> Result<bool, HandlerError> {
        schedule_checked(self.clock, self.queue, time, action, payload)
    }

    /// Schedule an action `delay` seconds from now
    pub fn schedule_in(
        &mut self,
        delay: f64,
        action: Action<W>,
        payload: W::Payload,
    ) -> Result<bool, HandlerError> {
        let time = self.clock.now() + delay;
        self.schedule_at(time, action, payload)
    }

    /// Ask the scheduler to stop after this event
    pub fn request_stop(&self) {
        self.control.request_stop();
    }
}

impl<W: World> fmt::Debug for Dispatch<'_, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch").field("now", &self.clock.now()).finish()
    }
}

/// Cloneable handle for talking to a scheduler from other threads
pub struct SchedulerHandle<W: World> {
    queue: Arc<EventQueue<Event<W>>>,
    control: Arc<Control>,
    clock: ClockReader,
    wall: Arc<dyn WallClock>,
    live: bool,
}

impl<W: World> Clone for SchedulerHandle<W> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            control: Arc::clone(&self.control),
            clock: self.clock.clone(),
            wall: Arc::clone(&self.wall),
            live: self.live,
        }
    }
}

impl<W: World> fmt::Debug for SchedulerHandle<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("state", &self.control.state())
            .field("live", &self.live)
            .finish()
    }
}

impl<W: World> SchedulerHandle<W> {
    /// Ask the scheduler to stop and wake it if idle
    pub fn stop(&self) {
        self.control.request_stop();
        self.queue.wake();
    }

    /// Current scheduler state
    pub fn state(&self) -> SchedulerState {
        self.control.state()
    }

    /// Current virtual time
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// Queue an event as is
    pub fn insert(&self, event: Event<W>) -> bool {
        self.queue.insert(event)
    }

    /// Queue an action to run as soon as possible
    ///
    /// Live runs stamp the event with the later of wall-clock and virtual
    /// time; bounded runs use virtual time. Either way the event never lands
    /// before the last dispatched event. Returns `false` once the scheduler
    /// has terminated.
    pub fn inject_now(&self, action: Action<W>, payload: W::Payload) -> bool {
        let virtual_now = self.clock.now();
        let time = if self.live {
            self.wall.now().max(virtual_now)
        } else {
            virtual_now
        };
        self.queue.insert_not_before_frontier(Event::new(time, action, payload))
    }

    /// Number of pending events
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

/// Drives events through a world in time order
pub struct Scheduler<W: World> {
    clock: VirtualClock,
    queue: Arc<EventQueue<Event<W>>>,
    control: Arc<Control>,
    poll_interval: Duration,
    max_chain_failures: u32,
    chain_failures: HashMap<u64, u32>,
    dormant: HashSet<u64>,
    interactive: bool,
    statistics: RunStatistics,
}

impl<W: World> fmt::Debug for Scheduler<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("clock", &self.clock)
            .field("queue", &self.queue)
            .field("state", &self.control.state())
            .field("poll_interval", &self.poll_interval)
            .field("dormant", &self.dormant.len())
            .finish()
    }
}

impl<W: World> Scheduler<W> {
    /// Create a scheduler over a configured clock
    pub fn new(clock: VirtualClock) -> Self {
        Self {
            clock,
            queue: Arc::new(EventQueue::new()),
            control: Arc::new(Control::new()),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_chain_failures: DEFAULT_MAX_CHAIN_FAILURES,
            chain_failures: HashMap::new(),
            dormant: HashSet::new(),
            interactive: false,
            statistics: RunStatistics::new(),
        }
    }

    /// Set the longest idle wait
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.poll_interval = interval;
        }
        self
    }

    /// Set how many consecutive failures put a chain to sleep
    pub fn with_max_chain_failures(mut self, failures: u32) -> Self {
        self.max_chain_failures = failures.max(1);
        self
    }

    /// The virtual clock
    pub fn clock(&self) -> &VirtualClock {
        &self.clock
    }

    /// Current state
    pub fn state(&self) -> SchedulerState {
        self.control.state()
    }

    /// Number of pending events
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Statistics gathered so far
    pub fn statistics(&self) -> &RunStatistics {
        &self.statistics
    }

    /// A handle for other threads
    pub fn handle(&self) -> SchedulerHandle<W> {
        SchedulerHandle {
            queue: Arc::clone(&self.queue),
            control: Arc::clone(&self.control),
            clock: self.clock.reader(),
            wall: self.clock.wall_clock(),
            live: self.clock.is_live(),
        }
    }

    /// Schedule an action before or between runs
    ///
    /// Same rules as [`Dispatch::schedule_at`].
    pub fn schedule_at(
        &self,
        time: f64,
        action: Action<W>,
        payload: W::Payload,
    ) -> Result<bool, HandlerError> {
        schedule_checked(&self.clock, &self.queue, time, action, payload)
    }

    /// Run until the end time, the queue drains (bounded runs) or a stop
    /// is requested
    ///
    /// Handler and flush failures are logged and counted. Ordering
    /// violations abort the run, after a final flush attempt.
    #[instrument(skip_all, fields(run_id = %self.statistics.run_id))]
    pub fn run(&mut self, world: &mut W) -> SimulationResult<RunStatistics> {
        let started = Instant::now();
        self.statistics.start_virtual_time = self.clock.now();
        self.control.set_state(SchedulerState::Running);

        info!(
            start = %format_time(self.clock.now()),
            end = ?self.clock.end_time().map(format_time),
            live = self.clock.is_live(),
            pending = self.queue.len(),
            "Scheduler started"
        );

        let outcome = self.run_loop(world);
        if let Err(e) = &outcome {
            error!(error = %e, category = e.category(), "Scheduler aborted");
        }

        self.control.set_state(SchedulerState::Terminated);
        self.queue.close();
        self.final_flush(world);

        self.statistics.final_virtual_time = self.clock.now();
        self.statistics.events_pending = self.queue.len();
        self.statistics.elapsed = started.elapsed();

        info!(
            end = %format_time(self.clock.now()),
            summary = %self.statistics,
            "Scheduler terminated"
        );

        outcome.map(|()| self.statistics.clone())
    }

    fn run_loop(&mut self, world: &mut W) -> SimulationResult<()> {
        loop {
            if self.control.stop_requested() {
                info!("Stop requested");
                return Ok(());
            }

            let end = self.clock.end_time();
            if let Some(end) = end {
                if self.clock.now() >= end {
                    debug!("Reached end time");
                    return Ok(());
                }
            }

            let (next, generation) = self.queue.peek_with_generation();
            let next = match next {
                Some(t) => t,
                None if !self.clock.is_live() => {
                    info!("Event queue drained");
                    return Ok(());
                }
                None => {
                    self.idle(world, generation, self.poll_interval);
                    continue;
                }
            };

            if let Some(end) = end {
                if next >= end {
                    self.clock.advance_to(end)?;
                    debug!(next = %format_time(next), "Next event is past the end time");
                    return Ok(());
                }
            }

            if self.clock.is_live() {
                let wall = self.clock.wall_now();
                if next > wall {
                    let wait = (next - wall).min(self.poll_interval.as_secs_f64());
                    let wait = Duration::from_secs_f64(wait);
                    self.idle(world, generation, wait);
                    continue;
                }
            }

            self.control.set_state(SchedulerState::Running);
            let event = self.queue.pop_earliest()?;
            self.clock.advance_to(event.time)?;
            self.dispatch(world, event);
            self.flush_if_ready(world);
        }
    }

    fn idle(&mut self, world: &mut W, generation: u64, wait: Duration) {
        if !self.interactive {
            self.interactive = true;
            info!(now = %format_time(self.clock.now()), "Caught up with real time");
            world.enter_interactive();
        }
        self.control.set_state(SchedulerState::IdleWaiting);
        self.flush_if_ready(world);
        self.queue.wait_for_change(generation, wait);
    }

    fn dispatch(&mut self, world: &mut W, event: Event<W>) {
        let Event { time, action, payload } = event;
        let kind = payload.kind();
        let chain = payload.chain();

        if let Some(chain) = chain {
            if self.dormant.contains(&chain) {
                self.statistics.events_discarded += 1;
                debug!(chain, kind, "Discarding event of dormant chain");
                return;
            }
        }

        let mut ctx = Dispatch {
            clock: &self.clock,
            queue: self.queue.as_ref(),
            control: self.control.as_ref(),
        };
        let result = action(world, &mut ctx, payload);
        self.statistics.events_processed += 1;

        match result {
            Ok(()) => {
                if let Some(chain) = chain {
                    self.chain_failures.remove(&chain);
                }
            }
            Err(e) => {
                self.statistics.handler_errors += 1;
                warn!(time = %format_time(time), kind, error = %e, "Event handler failed");
                if let Some(chain) = chain {
                    let failures = self.chain_failures.entry(chain).or_insert(0);
                    *failures += 1;
                    if *failures >= self.max_chain_failures {
                        self.chain_failures.remove(&chain);
                        self.dormant.insert(chain);
                        self.statistics.dormant_chains += 1;
                        warn!(chain, kind, "Chain failed repeatedly and is now dormant");
                    }
                }
            }
        }
    }

    fn flush_if_ready(&mut self, world: &mut W) {
        match world.flush_if_ready(self.clock.now()) {
            Ok(flushed) => self.statistics.items_flushed += flushed,
            Err(e) => {
                self.statistics.missed_flushes += 1;
                warn!(error = %e, "Flush failed; updates stay queued");
            }
        }
    }

    fn final_flush(&mut self, world: &mut W) {
        for attempt in 1..=FINAL_FLUSH_ATTEMPTS {
            match world.flush_now(self.clock.now()) {
                Ok(flushed) => {
                    self.statistics.items_flushed += flushed;
                    return;
                }
                Err(e) => {
                    self.statistics.missed_flushes += 1;
                    warn!(attempt, error = %e, "Final flush failed");
                }
            }
        }
        error!("Giving up on final flush; queued updates are lost");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::clock::ManualClock;
    use crate::simulation::FlushError;
    use crate::types::TimeSpec;

    #[derive(Debug)]
    enum Note {
        Record(&'static str),
        Repeat(u32),
        Fail(u64),
    }

    impl EventPayload for Note {
        fn kind(&self) -> &'static str {
            match self {
                Note::Record(_) => "record",
                Note::Repeat(_) => "repeat",
                Note::Fail(_) => "fail",
            }
        }

        fn chain(&self) -> Option<u64> {
            match self {
                Note::Fail(chain) => Some(*chain),
                _ => None,
            }
        }
    }

    #[derive(Debug, Default)]
    struct Journal {
        seen: Vec<(f64, String)>,
        flushes: usize,
        failing_flushes: usize,
    }

    impl World for Journal {
        type Payload = Note;

        fn flush_now(&mut self, _now: f64) -> Result<usize, FlushError> {
            if self.failing_flushes > 0 {
                self.failing_flushes -= 1;
                return Err(FlushError::Rejected("unavailable".into()));
            }
            self.flushes += 1;
            Ok(0)
        }
    }

    fn record(world: &mut Journal, ctx: &mut Dispatch<'_, Journal>, note: Note) -> Result<(), HandlerError> {
        if let Note::Record(tag) = note {
            world.seen.push((ctx.now(), tag.to_string()));
        }
        Ok(())
    }

    fn repeat(world: &mut Journal, ctx: &mut Dispatch<'_, Journal>, note: Note) -> Result<(), HandlerError> {
        if let Note::Repeat(n) = note {
            world.seen.push((ctx.now(), format!("repeat {}", n)));
            ctx.schedule_in(10.0, repeat, Note::Repeat(n + 1))?;
        }
        Ok(())
    }

    fn fail(world: &mut Journal, ctx: &mut Dispatch<'_, Journal>, note: Note) -> Result<(), HandlerError> {
        world.seen.push((ctx.now(), "fail".to_string()));
        ctx.schedule_in(1.0, fail, note)?;
        Err(HandlerError::failed("always"))
    }

    fn bounded(start: f64, end: f64) -> Scheduler<Journal> {
        let mut clock = VirtualClock::with_wall_clock(Arc::new(ManualClock::new(0.0)));
        clock.set_start(TimeSpec::At(start));
        clock.set_end(Some(TimeSpec::At(end)));
        Scheduler::new(clock)
    }

    #[test]
    fn test_dispatches_in_time_then_insertion_order() {
        let mut scheduler = bounded(0.0, 1000.0);
        scheduler.schedule_at(20.0, record, Note::Record("b")).unwrap();
        scheduler.schedule_at(10.0, record, Note::Record("a")).unwrap();
        scheduler.schedule_at(20.0, record, Note::Record("c")).unwrap();

        let mut journal = Journal::default();
        let stats = scheduler.run(&mut journal).unwrap();

        let tags: Vec<_> = journal.seen.iter().map(|(_, t)| t.as_str()).collect();
        assert_eq!(tags, vec!["a", "b", "c"]);
        assert_eq!(journal.seen[0].0, 10.0);
        assert_eq!(stats.events_processed, 3);
        assert_eq!(scheduler.state(), SchedulerState::Terminated);
        // Drained bounded runs stop at the last event
        assert_eq!(scheduler.clock().now(), 20.0);
    }

    #[test]
    fn test_stops_at_end_time() {
        let mut scheduler = bounded(0.0, 35.0);
        scheduler.schedule_at(0.0, repeat, Note::Repeat(0)).unwrap();

        let mut journal = Journal::default();
        scheduler.run(&mut journal).unwrap();

        let times: Vec<f64> = journal.seen.iter().map(|(t, _)| *t).collect();
        assert_eq!(times, vec![0.0, 10.0, 20.0, 30.0]);
        assert_eq!(scheduler.clock().now(), 30.0);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_event_at_end_time_is_not_dispatched() {
        let mut scheduler = bounded(0.0, 50.0);
        assert!(scheduler.schedule_at(10.0, record, Note::Record("in")).unwrap());
        assert!(!scheduler.schedule_at(50.0, record, Note::Record("out")).unwrap());

        let mut journal = Journal::default();
        scheduler.run(&mut journal).unwrap();
        assert_eq!(journal.seen.len(), 1);
    }

    #[test]
    fn test_schedule_in_past_rejected() {
        let scheduler = bounded(100.0, 200.0);
        let error = scheduler.schedule_at(50.0, record, Note::Record("late")).unwrap_err();
        assert!(matches!(error, HandlerError::ScheduleInPast { .. }));
    }

    #[test]
    fn test_failing_chain_goes_dormant() {
        let mut scheduler = bounded(0.0, 100.0);
        scheduler.schedule_at(0.0, fail, Note::Fail(7)).unwrap();
        scheduler.schedule_at(50.0, record, Note::Record("still running")).unwrap();

        let mut journal = Journal::default();
        let stats = scheduler.run(&mut journal).unwrap();

        let failures = journal.seen.iter().filter(|(_, t)| t == "fail").count();
        assert_eq!(failures, 3);
        assert_eq!(stats.handler_errors, 3);
        assert_eq!(stats.dormant_chains, 1);
        assert_eq!(stats.events_discarded, 1);
        assert!(journal.seen.iter().any(|(_, t)| t == "still running"));
    }

    #[test]
    fn test_final_flush_retries() {
        let mut scheduler = bounded(0.0, 10.0);
        let mut journal = Journal { failing_flushes: 2, ..Journal::default() };
        let stats = scheduler.run(&mut journal).unwrap();
        assert_eq!(journal.flushes, 1);
        assert_eq!(stats.missed_flushes, 2);
    }

    #[test]
    fn test_handle_refused_after_termination() {
        let mut scheduler = bounded(0.0, 10.0);
        let handle = scheduler.handle();
        scheduler.run(&mut Journal::default()).unwrap();

        assert_eq!(handle.state(), SchedulerState::Terminated);
        assert!(!handle.inject_now(record, Note::Record("too late")));
    }

    #[test]
    fn test_state_before_run_is_not_started() {
        let mut scheduler = bounded(0.0, 10.0);
        let handle = scheduler.handle();
        assert_eq!(handle.state(), SchedulerState::NotStarted);
        assert_eq!(handle.state().to_string(), "not started");

        scheduler.run(&mut Journal::default()).unwrap();
        assert_eq!(handle.state(), SchedulerState::Terminated);
    }

    #[test]
    fn test_live_run_paces_against_far_future_event() {
        let wall = ManualClock::new(1000.0);
        let mut clock = VirtualClock::with_wall_clock(Arc::new(wall));
        clock.set_start(TimeSpec::At(1000.0));
        clock.set_end(None);
        let mut scheduler: Scheduler<Journal> =
            Scheduler::new(clock).with_poll_interval(Duration::from_millis(10));
        assert!(scheduler.schedule_at(1e20, record, Note::Record("never")).unwrap());
        let handle = scheduler.handle();

        let runner = std::thread::spawn(move || {
            let mut journal = Journal::default();
            let stats = scheduler.run(&mut journal).unwrap();
            (journal, stats)
        });

        let deadline = Instant::now() + Duration::from_secs(10);
        while handle.state() != SchedulerState::IdleWaiting {
            assert!(Instant::now() < deadline, "scheduler never went idle");
            std::thread::sleep(Duration::from_millis(5));
        }
        // Several pacing rounds against the far event
        std::thread::sleep(Duration::from_millis(50));
        handle.stop();

        let (journal, stats) = runner.join().unwrap();
        assert!(journal.seen.is_empty());
        assert_eq!(stats.events_processed, 0);
        assert_eq!(stats.events_pending, 1);
    }

    #[test]
    fn test_start_after_end_terminates_immediately() {
        let mut clock = VirtualClock::with_wall_clock(Arc::new(ManualClock::new(0.0)));
        clock.set_start(TimeSpec::At(100.0));
        clock.set_end(Some(TimeSpec::At(100.0)));
        let mut scheduler: Scheduler<Journal> = Scheduler::new(clock);

        let stats = scheduler.run(&mut Journal::default()).unwrap();
        assert_eq!(stats.events_processed, 0);
    }
}
