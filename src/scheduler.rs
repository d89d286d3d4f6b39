//! Tracked-object table and the tick loop over it.
//!
//! The scheduler holds no timer. Callers drive it directly with [`Scheduler::tick`]
//! or through a [`SchedulerWorker`], which owns a scheduler on its own thread
//! and processes commands strictly in arrival order.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use log::{debug, info, warn};

use crate::catalog::CatalogEntry;
use crate::config::EngineConfig;
use crate::conjunction::{refine_tca, screen, screen_projected, sort_events, ConjunctionEvent};
use crate::error::{invalid_param, EngineError, Result};
use crate::frames::Geodetic;
use crate::propagator::{propagate_state, AltitudeBounds, PropagationModel, Sgp4Model, TrackedObjectState};
use crate::visibility::{predict_passes, AccessInterval, AccessWindow, GroundStation, TrajectorySample};

/// Upper bound on snapshots a single projection may produce.
pub const MAX_PROJECTION_STEPS: usize = 100_000;

/// Identifies one tracked set. Every `initialize` starts a new generation and
/// invalidates handles from earlier ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedSetHandle {
    pub generation: u64,
    pub tracked: usize,
    pub rejected: Vec<u32>,  // catalog numbers the model refused
}

/// States of every object that propagated cleanly at one instant, ordered by
/// catalog number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub generation: u64,
    pub timestamp: DateTime<Utc>,
    pub states: Vec<TrackedObjectState>,
    pub dropped: usize,
}

struct Tracked<C> {
    entry: CatalogEntry,
    context: C,
}

pub struct Scheduler<M: PropagationModel = Sgp4Model> {
    model: M,
    bounds: AltitudeBounds,
    objects: BTreeMap<u32, Tracked<M::Context>>,
    generation: u64,
    rejected: Vec<u32>,
}

impl Scheduler<Sgp4Model> {
    pub fn new(config: &EngineConfig) -> Self {
        Scheduler::with_model(Sgp4Model, config)
    }
}

impl<M: PropagationModel> Scheduler<M> {
    pub fn with_model(model: M, config: &EngineConfig) -> Self {
        Scheduler {
            model,
            bounds: AltitudeBounds::from(config),
            objects: BTreeMap::new(),
            generation: 0,
            rejected: Vec::new(),
        }
    }

    /// Replace the tracked set. Element sets the model rejects are skipped
    /// and listed in the handle; when a catalog number repeats, the newest
    /// epoch wins.
    pub fn initialize<I>(&mut self, entries: I) -> TrackedSetHandle
    where
        I: IntoIterator,
        I::Item: Into<CatalogEntry>,
    {
        let mut objects: BTreeMap<u32, Tracked<M::Context>> = BTreeMap::new();
        let mut rejected = Vec::new();

        for entry in entries.into_iter().map(Into::into) {
            let catalog_number = entry.catalog_number();
            if let Some(existing) = objects.get(&catalog_number) {
                if !entry.set.supersedes(&existing.entry.set) {
                    debug!("[scheduler] {catalog_number}: keeping newer element set already loaded");
                    continue;
                }
            }
            match self.model.prepare(&entry.set) {
                Ok(context) => {
                    objects.insert(catalog_number, Tracked { entry, context });
                }
                Err(e) => {
                    warn!("[scheduler] {catalog_number}: skipped, {e}");
                    rejected.push(catalog_number);
                }
            }
        }

        self.objects = objects;
        self.rejected = rejected;
        self.generation += 1;
        info!("[scheduler] generation {}: tracking {} objects, {} rejected", self.generation, self.objects.len(), self.rejected.len());
        self.handle()
    }

    pub fn handle(&self) -> TrackedSetHandle {
        TrackedSetHandle { generation: self.generation, tracked: self.objects.len(), rejected: self.rejected.clone() }
    }

    pub fn tracked_count(&self) -> usize {
        self.objects.len()
    }

    pub fn is_tracked(&self, catalog_number: u32) -> bool {
        self.objects.contains_key(&catalog_number)
    }

    pub fn entry(&self, catalog_number: u32) -> Option<&CatalogEntry> {
        self.objects.get(&catalog_number).map(|o| &o.entry)
    }

    /// Swap in a newer element set for an object already tracked. Returns
    /// `Ok(false)` when the set is not newer than the loaded one. A set the
    /// model rejects leaves the old one in place.
    pub fn supersede(&mut self, entry: CatalogEntry) -> Result<bool> {
        let catalog_number = entry.catalog_number();
        let tracked = self.objects.get_mut(&catalog_number).ok_or(EngineError::UnknownObject(catalog_number))?;

        if !entry.set.supersedes(&tracked.entry.set) {
            debug!("[scheduler] {catalog_number}: ignoring element set not newer than {}", tracked.entry.set.epoch);
            return Ok(false);
        }

        let context = self.model.prepare(&entry.set)?;
        debug!("[scheduler] {catalog_number}: epoch {} -> {}", tracked.entry.set.epoch, entry.set.epoch);
        *tracked = Tracked { entry, context };
        Ok(true)
    }

    pub fn tick(&self, handle: &TrackedSetHandle, t: DateTime<Utc>) -> Result<Snapshot> {
        if handle.generation != self.generation {
            return Err(EngineError::StaleHandle { given: handle.generation, current: self.generation });
        }
        Ok(self.snapshot_at(t))
    }

    pub(crate) fn snapshot_at(&self, t: DateTime<Utc>) -> Snapshot {
        let states: Vec<TrackedObjectState> = self.objects.values()
            .filter_map(|o| propagate_state(&self.model, &o.context, &o.entry, t, &self.bounds))
            .collect();
        let dropped = self.objects.len() - states.len();

        debug!("[scheduler] tick {t}: {} states, {dropped} dropped", states.len());
        Snapshot { generation: self.generation, timestamp: t, states, dropped }
    }

    /// State of one object, `Ok(None)` when its propagation is degenerate at `t`.
    pub fn state_at(&self, catalog_number: u32, t: DateTime<Utc>) -> Result<Option<TrackedObjectState>> {
        let o = self.objects.get(&catalog_number).ok_or(EngineError::UnknownObject(catalog_number))?;
        Ok(propagate_state(&self.model, &o.context, &o.entry, t, &self.bounds))
    }

    fn pair_at(&self, a: u32, b: u32, t: DateTime<Utc>) -> Option<(TrackedObjectState, TrackedObjectState)> {
        match (self.state_at(a, t), self.state_at(b, t)) {
            (Ok(Some(sa)), Ok(Some(sb))) => Some((sa, sb)),
            _ => None,
        }
    }

    /// Geodetic track of one object over [start, end], sampled every `step`.
    pub fn trajectory(&self, catalog_number: u32, start: DateTime<Utc>, end: DateTime<Utc>, step: Duration) -> Result<Vec<TrajectorySample>> {
        if step <= Duration::zero() {
            return Err(invalid_param!("trajectory step must be positive"));
        }
        if !self.is_tracked(catalog_number) {
            return Err(EngineError::UnknownObject(catalog_number));
        }

        let mut samples = Vec::new();
        let mut t = start;
        while t <= end {
            if let Some(s) = self.state_at(catalog_number, t)? {
                samples.push(TrajectorySample { timestamp: s.timestamp, geodetic: s.geodetic });
            }
            match t.checked_add_signed(step) {
                Some(next) => t = next,
                None => break,
            }
        }
        Ok(samples)
    }

    /// Access intervals of one tracked object over a station; see
    /// [`predict_passes`] for the sampling caveat.
    pub fn passes(&self, catalog_number: u32, station: &GroundStation, window: &AccessWindow, step: Duration) -> Result<Vec<AccessInterval>> {
        if step <= Duration::zero() {
            return Err(invalid_param!("pass step must be positive"));
        }
        if !self.is_tracked(catalog_number) {
            return Err(EngineError::UnknownObject(catalog_number));
        }
        let position_at = |t: DateTime<Utc>| -> Option<Geodetic> {
            self.state_at(catalog_number, t).ok().flatten().map(|s| s.geodetic)
        };
        Ok(predict_passes(catalog_number, position_at, station, window, step))
    }

    /// Passes of every tracked object over `station`, ordered by AOS.
    pub fn next_passes(&self, station: &GroundStation, window: &AccessWindow, step: Duration) -> Result<Vec<AccessInterval>> {
        let mut passes = Vec::new();
        for &catalog_number in self.objects.keys() {
            passes.extend(self.passes(catalog_number, station, window, step)?);
        }
        passes.sort_by(|a, b| a.aos.cmp(&b.aos).then_with(|| a.catalog_number.cmp(&b.catalog_number)));

        info!("[scheduler] {} passes over {} from {} objects", passes.len(), station.id, self.objects.len());
        Ok(passes)
    }

    /// `steps + 1` snapshots from `start`, `step` apart. At most
    /// [`MAX_PROJECTION_STEPS`] steps.
    pub fn project(&self, start: DateTime<Utc>, step: Duration, steps: usize) -> Result<Vec<Snapshot>> {
        if step <= Duration::zero() {
            return Err(invalid_param!("projection step must be positive"));
        }
        if steps > MAX_PROJECTION_STEPS {
            return Err(invalid_param!("projection of {steps} steps exceeds the limit of {MAX_PROJECTION_STEPS}"));
        }

        let mut snapshots = Vec::with_capacity(steps + 1);
        let mut t = start;
        for i in 0..=steps {
            if i > 0 {
                t = t.checked_add_signed(step)
                    .ok_or_else(|| invalid_param!("projection runs past the representable time range"))?;
            }
            snapshots.push(self.snapshot_at(t));
        }
        Ok(snapshots)
    }

    pub fn refine_conjunction(&self, event: &ConjunctionEvent, window_s: f64) -> ConjunctionEvent {
        let (a, b) = event.pair_key();
        refine_tca(event, window_s, |t| self.pair_at(a, b, t))
    }

    /// Screen one snapshot and refine every flagged pair within
    /// `tca_window_s` either side of the snapshot time.
    pub fn screen_snapshot(&self, snapshot: &Snapshot, threshold_km: f64, tca_window_s: f64) -> Vec<ConjunctionEvent> {
        let mut events: Vec<ConjunctionEvent> = screen(&snapshot.states, threshold_km)
            .iter()
            .map(|e| self.refine_conjunction(e, tca_window_s))
            .collect();
        sort_events(&mut events);
        events
    }

    /// Screen a future window: project snapshots every `step`, keep each
    /// pair's closest sampled approach and, when `refine` is set, search for
    /// the true TCA within one step either side.
    pub fn screen_window(
        &self,
        start: DateTime<Utc>,
        duration: Duration,
        step: Duration,
        threshold_km: f64,
        refine: bool,
    ) -> Result<Vec<ConjunctionEvent>> {
        if step <= Duration::zero() || duration < Duration::zero() {
            return Err(invalid_param!("screening window needs a positive step and non-negative duration"));
        }

        let step_us = step.num_microseconds().filter(|us| *us > 0)
            .ok_or_else(|| invalid_param!("screening step {step} is outside the supported range"))?;
        let duration_us = duration.num_microseconds()
            .ok_or_else(|| invalid_param!("screening duration {duration} is outside the supported range"))?;
        let steps = duration_us / step_us + i64::from(duration_us % step_us != 0);
        let steps = usize::try_from(steps).map_err(|_| invalid_param!("screening needs {steps} steps"))?;
        let snapshots = self.project(start, step, steps)?;
        let mut events = screen_projected(&snapshots, threshold_km);

        if refine {
            let window_s = step_us as f64 / 1.0e6;
            events = events.iter().map(|e| self.refine_conjunction(e, window_s)).collect();
            sort_events(&mut events);
        }

        info!("[scheduler] screened {} snapshots: {} conjunctions under {threshold_km} km", snapshots.len(), events.len());
        Ok(events)
    }
}

// ---------- Worker ----------

#[derive(Debug)]
pub enum Command {
    Initialize(Vec<CatalogEntry>),
    Supersede(CatalogEntry),
    Tick(DateTime<Utc>),
    Stop,
}

#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Initialized(TrackedSetHandle),
    Superseded { catalog_number: u32, accepted: bool },
    Snapshot(Snapshot),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriveStats {
    pub sent: usize,
    pub skipped: usize,
}

/// A scheduler running on a dedicated thread. Commands go in on one channel,
/// events come back on another; nothing is shared but the count of ticks
/// still in flight.
pub struct SchedulerWorker {
    commands: Sender<Command>,
    events: Receiver<WorkerEvent>,
    in_flight: Arc<AtomicUsize>,
    thread: Option<thread::JoinHandle<()>>,
}

impl SchedulerWorker {
    pub fn spawn(config: &EngineConfig) -> Result<Self> {
        let config = config.clone();
        Self::spawn_with(move || Scheduler::new(&config))
    }

    /// The scheduler is built on the worker thread, so its model context
    /// never has to cross threads.
    pub fn spawn_with<M, F>(make: F) -> Result<Self>
    where
        M: PropagationModel + 'static,
        F: FnOnce() -> Scheduler<M> + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();
        let (event_tx, event_rx) = mpsc::channel::<WorkerEvent>();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let worker_in_flight = Arc::clone(&in_flight);

        let thread = thread::Builder::new()
            .name("perigee-scheduler".to_string())
            .spawn(move || {
                let mut scheduler = make();
                info!("[worker] started");

                while let Ok(command) = cmd_rx.recv() {
                    let (event, was_tick) = match command {
                        Command::Initialize(entries) => (WorkerEvent::Initialized(scheduler.initialize(entries)), false),
                        Command::Supersede(entry) => {
                            let catalog_number = entry.catalog_number();
                            let accepted = scheduler.supersede(entry).unwrap_or_else(|e| {
                                warn!("[worker] supersede {catalog_number}: {e}");
                                false
                            });
                            (WorkerEvent::Superseded { catalog_number, accepted }, false)
                        }
                        Command::Tick(t) => (WorkerEvent::Snapshot(scheduler.snapshot_at(t)), true),
                        Command::Stop => break,
                    };

                    let sent = event_tx.send(event);
                    if was_tick {
                        worker_in_flight.fetch_sub(1, Ordering::SeqCst);
                    }
                    if sent.is_err() {
                        break;
                    }
                }
                info!("[worker] stopped");
            })?;

        Ok(SchedulerWorker { commands: cmd_tx, events: event_rx, in_flight, thread: Some(thread) })
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| EngineError::WorkerStopped)
    }

    pub fn initialize(&self, entries: Vec<CatalogEntry>) -> Result<()> {
        self.send(Command::Initialize(entries))
    }

    pub fn supersede(&self, entry: CatalogEntry) -> Result<()> {
        self.send(Command::Supersede(entry))
    }

    /// Queue a tick unconditionally.
    pub fn tick(&self, t: DateTime<Utc>) -> Result<()> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.send(Command::Tick(t)).map_err(|e| {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            e
        })
    }

    /// Queue a tick unless one is still being computed. Returns whether it was sent.
    pub fn try_tick(&self, t: DateTime<Utc>) -> Result<bool> {
        if self.is_busy() {
            return Ok(false);
        }
        self.tick(t)?;
        Ok(true)
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    pub fn recv(&self) -> Result<WorkerEvent> {
        self.events.recv().map_err(|_| EngineError::WorkerStopped)
    }

    /// `Ok(None)` on timeout. A caller models a deadline by discarding
    /// whatever arrives after it.
    pub fn recv_timeout(&self, timeout: std::time::Duration) -> Result<Option<WorkerEvent>> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(EngineError::WorkerStopped),
        }
    }

    pub fn try_recv(&self) -> Result<Option<WorkerEvent>> {
        match self.events.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(EngineError::WorkerStopped),
        }
    }

    /// Caller-side cadence loop: one tick attempt per instant in `times`,
    /// `cadence` apart in wall-clock time. An attempt is skipped while the
    /// previous tick is still running. Waits for the last tick before returning.
    pub fn drive<I, F>(&self, cadence: std::time::Duration, times: I, mut on_event: F) -> Result<DriveStats>
    where
        I: IntoIterator<Item = DateTime<Utc>>,
        F: FnMut(WorkerEvent),
    {
        let mut stats = DriveStats::default();

        for t in times {
            let started = Instant::now();
            if self.try_tick(t)? {
                stats.sent += 1;
            } else {
                debug!("[worker] tick {t} skipped, previous still running");
                stats.skipped += 1;
            }

            loop {
                let remaining = cadence.saturating_sub(started.elapsed());
                if remaining.is_zero() { break; }
                match self.recv_timeout(remaining)? {
                    Some(event) => on_event(event),
                    None => break,
                }
            }
        }

        while self.is_busy() {
            if let Some(event) = self.recv_timeout(std::time::Duration::from_millis(10))? {
                on_event(event);
            }
        }
        while let Some(event) = self.try_recv()? {
            on_event(event);
        }

        Ok(stats)
    }

    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> Result<()> {
        let _ = self.commands.send(Command::Stop);
        match self.thread.take() {
            Some(handle) => handle.join().map_err(|_| EngineError::WorkerStopped),
            None => Ok(()),
        }
    }
}

impl Drop for SchedulerWorker {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("[worker] {e}");
        }
    }
}
