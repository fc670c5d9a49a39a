//! Radio monitor loop
//!
//! Attaches to the game, samples it once per tick, feeds the samples to
//! the state machine and dispatches transitions to the playback
//! controller. Never exits on a transient error; only the stop channel
//! ends it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::events::RadioEvent;
use crate::memory::{Attach, MemoryError, ReadMemory};
use crate::playback::PlaybackController;
use crate::sampler::RadioSampler;
use crate::state::{RadioState, RadioStateMachine};

/// How often the monitor wakes up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    /// Between samples while attached
    pub sample: Duration,
    /// Between attach attempts while the game is not running
    pub attach_retry: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            sample: Duration::from_secs(1),
            attach_retry: Duration::from_secs(5),
        }
    }
}

/// What one tick observed
#[derive(Debug, Clone, Default)]
pub struct TickOutcome {
    /// A session was open when the sample was taken
    pub attached: bool,
    /// Transition produced by this tick
    pub event: Option<RadioEvent>,
    /// Read error that dropped the session
    pub fault: Option<MemoryError>,
}

/// Drives attach → sample → transition → dispatch
pub struct RadioMonitor<A: Attach> {
    attacher: A,
    process_name: String,
    session: Option<A::Session>,
    sampler: RadioSampler,
    machine: RadioStateMachine,
    radio_state: RadioState,
    playback: Arc<PlaybackController>,
    intervals: PollIntervals,
    /// Backend call for the latest transition. Each dispatch waits for
    /// the previous one, so the player sees transitions in order.
    pending_dispatch: Option<JoinHandle<()>>,
    /// "Waiting for the game" is only logged at info once per absence
    announced_waiting: bool,
}

impl<A: Attach> RadioMonitor<A> {
    pub fn new(
        attacher: A,
        process_name: impl Into<String>,
        sampler: RadioSampler,
        radio_state: RadioState,
        playback: Arc<PlaybackController>,
        intervals: PollIntervals,
    ) -> Self {
        let machine = RadioStateMachine::new(sampler.layout().user_radio_station);
        Self {
            attacher,
            process_name: process_name.into(),
            session: None,
            sampler,
            machine,
            radio_state,
            playback,
            intervals,
            pending_dispatch: None,
            announced_waiting: false,
        }
    }

    #[cfg(test)]
    fn is_attached(&self) -> bool {
        self.session.is_some()
    }

    /// Run one iteration: attach if needed, sample, evaluate, dispatch
    pub async fn tick(&mut self) -> TickOutcome {
        if self.session.is_none() {
            self.try_attach();
        }

        let attached = self.session.is_some();
        let outcome = self
            .sampler
            .sample(self.session.as_ref().map(|s| s as &dyn ReadMemory));

        if let Some(e) = &outcome.fault {
            warn!(process = %self.process_name, error = %e, "memory read failed, dropping session");
            self.session = None;
        }

        let event = self.machine.evaluate(&outcome.sample);
        if let Some(event) = &event {
            info!(to = %self.machine.state(), %event, "user radio state changed");

            // Publish before the backend call; navigation reads this flag
            self.radio_state.set_active(event.is_activation());
            self.dispatch(event.clone());
        }

        TickOutcome {
            attached,
            event,
            fault: outcome.fault,
        }
    }

    /// Hand the event to the playback controller without blocking sampling
    fn dispatch(&mut self, event: RadioEvent) {
        let previous = self.pending_dispatch.take();
        let playback = Arc::clone(&self.playback);

        self.pending_dispatch = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            playback.apply(&event).await;
        }));
    }

    /// Wait for the in-flight backend call, if any
    async fn finish_dispatch(&mut self) {
        if let Some(pending) = self.pending_dispatch.take() {
            if let Err(e) = pending.await {
                warn!(error = %e, "playback dispatch task failed");
            }
        }
    }

    fn try_attach(&mut self) {
        match self.attacher.attach(&self.process_name) {
            Ok(session) => {
                info!(
                    process = %self.process_name,
                    base = %format!("{:#x}", session.base_address()),
                    "attached to game process"
                );
                self.session = Some(session);
                self.announced_waiting = false;
            }
            Err(MemoryError::ProcessNotFound(_)) => {
                if self.announced_waiting {
                    debug!(process = %self.process_name, "game process still not running");
                } else {
                    info!(process = %self.process_name, "waiting for game process");
                    self.announced_waiting = true;
                }
            }
            Err(e) => {
                warn!(process = %self.process_name, error = %e, "failed to attach to game process");
            }
        }
    }

    /// Delay before the next tick
    fn next_delay(&self, outcome: &TickOutcome) -> Duration {
        if outcome.attached {
            self.intervals.sample
        } else {
            self.intervals.attach_retry
        }
    }

    /// Poll until `stop` turns true or its sender goes away
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        info!(
            process = %self.process_name,
            version = %self.sampler.layout().version,
            "radio monitor started"
        );

        let mut transitions = 0u64;
        let mut faults = 0u64;
        loop {
            if *stop.borrow() {
                break;
            }

            let outcome = self.tick().await;
            if outcome.event.is_some() {
                transitions += 1;
            }
            if outcome.fault.is_some() {
                faults += 1;
            }
            let delay = self.next_delay(&outcome);

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }

        // In-flight backend calls finish; main bounds the wait
        self.finish_dispatch().await;

        self.machine.reset();
        self.radio_state.reset();
        self.session = None;
        info!(transitions, read_faults = faults, "radio monitor stopped");
    }
}
