//! The resource manager owning the single shared engine instance.
//!
//! # Lifecycle
//!
//! ```text
//!            acquire()               launch ok
//!   Empty ─────────────▶ Launching ─────────────▶ Ready ◀──────┐
//!     ▲                      │                      │          │ acquire()
//!     │    launch failed     │       consumers == 0 │          │ (timer cancelled)
//!     ├──────────────────────┘                      ▼          │
//!     │            idle timeout expired          Draining ─────┘
//!     └──────────────────────────────────────────────┘
//! ```
//!
//! Callers arriving while a launch is in flight subscribe to that launch's
//! outcome instead of starting another one. The idle timer is tagged with an
//! epoch; any later `acquire()` bumps the epoch, so a timer that lost the race
//! finds a stale epoch and does nothing.
//!
//! An instance holds the engine slot for as long as it is alive, including
//! while it is being closed. A relaunch waits for the slot, so two instances
//! never coexist.

use futures::FutureExt;
use log::{debug, info, warn};
use quire_traits::{Engine, EngineError, EngineLauncher};
use std::fmt;
use std::ops::Deref;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{OwnedMutexGuard, watch};
use tokio::task::JoinHandle;

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

type LaunchOutcome = Option<Result<Arc<dyn Engine>, EngineError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Empty,
    Launching,
    Ready,
    Draining,
}

/// A point-in-time view of the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStatus {
    pub phase: EnginePhase,
    /// Leases held plus callers waiting on a launch.
    pub consumers: usize,
    /// Launch attempts started since the manager was created.
    pub launches: u64,
}

impl EngineStatus {
    pub fn is_active(&self) -> bool {
        self.consumers > 0
    }
}

struct Live {
    engine: Arc<dyn Engine>,
    _slot: OwnedMutexGuard<()>,
}

enum Phase {
    Empty,
    Launching(watch::Receiver<LaunchOutcome>),
    Ready(Live),
    Draining { live: Live, timer: JoinHandle<()> },
}

impl Phase {
    fn kind(&self) -> EnginePhase {
        match self {
            Phase::Empty => EnginePhase::Empty,
            Phase::Launching(_) => EnginePhase::Launching,
            Phase::Ready(_) => EnginePhase::Ready,
            Phase::Draining { .. } => EnginePhase::Draining,
        }
    }
}

struct State {
    phase: Phase,
    consumers: usize,
    epoch: u64,
    launches: u64,
    runtime: Option<Handle>,
}

struct Inner {
    launcher: Arc<dyn EngineLauncher>,
    idle_timeout: Duration,
    slot: Arc<tokio::sync::Mutex<()>>,
    state: Mutex<State>,
}

enum Step {
    Ready(Arc<dyn Engine>),
    Wait(watch::Receiver<LaunchOutcome>),
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(self: &Arc<Self>) {
        let mut state = self.lock();
        state.consumers = state.consumers.saturating_sub(1);
        if state.consumers > 0 {
            return;
        }
        match std::mem::replace(&mut state.phase, Phase::Empty) {
            Phase::Ready(live) => self.start_draining(&mut state, live),
            // A launch finishing with nobody left waiting drains on its own.
            other => state.phase = other,
        }
    }

    fn start_draining(self: &Arc<Self>, state: &mut State, live: Live) {
        state.epoch += 1;
        let epoch = state.epoch;
        let Some(runtime) = state.runtime.clone() else {
            warn!("No runtime available for the idle timer; dropping rendering engine now");
            state.phase = Phase::Empty;
            return;
        };
        debug!(
            "Rendering engine idle; closing in {:?} unless reacquired",
            self.idle_timeout
        );
        let inner = Arc::clone(self);
        let idle_timeout = self.idle_timeout;
        let timer = runtime.spawn(async move {
            tokio::time::sleep(idle_timeout).await;
            inner.expire(epoch).await;
        });
        state.phase = Phase::Draining { live, timer };
    }

    async fn expire(self: Arc<Self>, epoch: u64) {
        let live = {
            let mut state = self.lock();
            if state.epoch != epoch || state.consumers > 0 {
                return;
            }
            match std::mem::replace(&mut state.phase, Phase::Empty) {
                Phase::Draining { live, .. } => live,
                other => {
                    state.phase = other;
                    return;
                }
            }
        };
        info!(
            "Closing rendering engine after {:?} without demand",
            self.idle_timeout
        );
        close_live(live).await;
    }

    async fn launch(self: Arc<Self>, outcome_tx: watch::Sender<LaunchOutcome>) {
        let slot = Arc::clone(&self.slot).lock_owned().await;
        info!("Launching rendering engine");
        let outcome = AssertUnwindSafe(self.launcher.launch())
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(EngineError::launch("engine launcher panicked")));

        {
            let mut state = self.lock();
            match &outcome {
                Ok(engine) => {
                    let live = Live {
                        engine: Arc::clone(engine),
                        _slot: slot,
                    };
                    if state.consumers == 0 {
                        self.start_draining(&mut state, live);
                    } else {
                        state.phase = Phase::Ready(live);
                    }
                }
                Err(err) => {
                    warn!("Rendering engine failed to launch: {}", err);
                    state.phase = Phase::Empty;
                }
            }
        }

        outcome_tx.send_replace(Some(outcome));
    }
}

async fn close_live(live: Live) {
    if let Err(err) = live.engine.close().await {
        warn!("Failed to close rendering engine: {}", err);
    }
    // Dropping `live` frees the slot for the next launch.
    drop(live);
}

/// Owner of the single shared rendering engine instance.
///
/// Cheap to clone; clones share the same instance.
#[derive(Clone)]
pub struct SharedEngine {
    inner: Arc<Inner>,
}

impl SharedEngine {
    pub fn new(launcher: Arc<dyn EngineLauncher>, idle_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                launcher,
                idle_timeout,
                slot: Arc::new(tokio::sync::Mutex::new(())),
                state: Mutex::new(State {
                    phase: Phase::Empty,
                    consumers: 0,
                    epoch: 0,
                    launches: 0,
                    runtime: None,
                }),
            }),
        }
    }

    pub fn with_defaults(launcher: Arc<dyn EngineLauncher>) -> Self {
        Self::new(launcher, DEFAULT_IDLE_TIMEOUT)
    }

    pub fn idle_timeout(&self) -> Duration {
        self.inner.idle_timeout
    }

    pub fn status(&self) -> EngineStatus {
        let state = self.inner.lock();
        EngineStatus {
            phase: state.phase.kind(),
            consumers: state.consumers,
            launches: state.launches,
        }
    }

    /// Lease the live engine instance, launching it if necessary.
    ///
    /// Concurrent callers during a launch share its outcome: on failure every
    /// one of them gets the same error and the manager returns to `Empty`, so
    /// the next call starts a fresh attempt.
    pub async fn acquire(&self) -> Result<EngineLease, EngineError> {
        let step = {
            let mut state = self.inner.lock();
            if state.runtime.is_none() {
                state.runtime = Handle::try_current().ok();
            }
            state.consumers += 1;
            match std::mem::replace(&mut state.phase, Phase::Empty) {
                Phase::Ready(live) => {
                    let engine = Arc::clone(&live.engine);
                    state.phase = Phase::Ready(live);
                    Step::Ready(engine)
                }
                Phase::Draining { live, timer } => {
                    timer.abort();
                    state.epoch += 1;
                    debug!("Rendering engine reacquired; idle teardown cancelled");
                    let engine = Arc::clone(&live.engine);
                    state.phase = Phase::Ready(live);
                    Step::Ready(engine)
                }
                Phase::Launching(outcome_rx) => {
                    let waiter = outcome_rx.clone();
                    state.phase = Phase::Launching(outcome_rx);
                    Step::Wait(waiter)
                }
                Phase::Empty => {
                    let (outcome_tx, outcome_rx) = watch::channel(None);
                    state.launches += 1;
                    state.phase = Phase::Launching(outcome_rx.clone());
                    tokio::spawn(Arc::clone(&self.inner).launch(outcome_tx));
                    Step::Wait(outcome_rx)
                }
            }
        };

        // From here on the demand is released on every exit path, including
        // this future being dropped mid-launch.
        let demand = Demand {
            inner: Arc::clone(&self.inner),
        };

        let engine = match step {
            Step::Ready(engine) => engine,
            Step::Wait(mut outcome_rx) => {
                let outcome = outcome_rx
                    .wait_for(Option::is_some)
                    .await
                    .map_err(|_| EngineError::launch("engine launch was abandoned"))?
                    .clone();
                match outcome {
                    Some(Ok(engine)) => engine,
                    Some(Err(err)) => return Err(err),
                    None => return Err(EngineError::launch("engine launch was abandoned")),
                }
            }
        };

        Ok(EngineLease {
            engine,
            _demand: demand,
        })
    }

    /// Close a live instance right away, regardless of demand. Used on
    /// process shutdown.
    pub async fn shutdown(&self) {
        let live = {
            let mut state = self.inner.lock();
            let live = match std::mem::replace(&mut state.phase, Phase::Empty) {
                Phase::Ready(live) => Some(live),
                Phase::Draining { live, timer } => {
                    timer.abort();
                    Some(live)
                }
                other => {
                    state.phase = other;
                    None
                }
            };
            if live.is_some() {
                state.epoch += 1;
            }
            live
        };
        if let Some(live) = live {
            info!("Shutting down rendering engine");
            close_live(live).await;
        }
    }
}

impl fmt::Debug for SharedEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedEngine")
            .field("idle_timeout", &self.inner.idle_timeout)
            .field("status", &self.status())
            .finish()
    }
}

struct Demand {
    inner: Arc<Inner>,
}

impl Drop for Demand {
    fn drop(&mut self) {
        self.inner.release();
    }
}

/// Shared access to the live engine instance.
///
/// Dropping the lease (or calling [`release`](Self::release)) gives the
/// demand back; the last lease out starts the idle timer.
pub struct EngineLease {
    engine: Arc<dyn Engine>,
    _demand: Demand,
}

impl EngineLease {
    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    pub fn release(self) {}
}

impl Deref for EngineLease {
    type Target = dyn Engine;

    fn deref(&self) -> &Self::Target {
        self.engine.as_ref()
    }
}

impl fmt::Debug for EngineLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineLease").finish_non_exhaustive()
    }
}
