//! Single-flight execution of background builds.
//!
//! One long-lived worker thread runs jobs handed over through a mailbox of
//! capacity one. Submissions are never queued: while a job is in flight, or
//! within the cooldown after a successful one, `submit` returns
//! [`Submission::Skipped`] immediately. Every submission is watched by a
//! deadline; when it expires the job is abandoned, its worker retired, and the
//! gate reopens.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::constants::{DEFAULT_BUILD_TIMEOUT_SECS, DEFAULT_COOLDOWN_SECS};
use crate::error::{Result, SpriteError};

/// A unit of background work.
pub type Job<T> = Box<dyn FnOnce() -> Result<T> + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Minimum spacing between the end of a successful build and the next start.
    pub cooldown_secs: u64,
    /// Hard deadline for one build.
    pub timeout_secs: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            timeout_secs: DEFAULT_BUILD_TIMEOUT_SECS,
        }
    }
}

impl GateConfig {
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Why a submission was turned away without running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Busy,
    TooSoon { remaining: Duration },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => f.write_str("skipped, busy"),
            Self::TooSoon { remaining } => {
                write!(f, "skipped, too soon ({}s remaining)", remaining.as_secs())
            }
        }
    }
}

#[derive(Debug)]
pub enum Submission<T> {
    Accepted(BuildTicket<T>),
    Skipped(SkipReason),
}

impl<T> Submission<T> {
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

/// Handle on an accepted job's eventual outcome.
#[derive(Debug)]
pub struct BuildTicket<T> {
    rx: Receiver<Result<T>>,
}

impl<T> BuildTicket<T> {
    /// Block until the job finishes, fails, or hits the gate deadline.
    pub fn wait(self) -> Result<T> {
        self.rx.recv().unwrap_or_else(|_| {
            Err(SpriteError::WorkerCrashed {
                reason: "build outcome was never reported".into(),
            })
        })
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`, returning `None`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T>> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(SpriteError::WorkerCrashed {
                reason: "build outcome was never reported".into(),
            })),
        }
    }
}

struct Envelope<T> {
    job: Job<T>,
    reply: Sender<Result<T>>,
}

#[derive(Debug, Default)]
struct GateState {
    busy: bool,
    last_run_at: Option<Instant>,
}

struct Shared<T> {
    state: Mutex<GateState>,
    worker: Mutex<Option<Sender<Envelope<T>>>>,
}

fn lock<S>(mutex: &Mutex<S>) -> MutexGuard<'_, S> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct WorkerGate<T: Send + 'static> {
    shared: Arc<Shared<T>>,
    cooldown: Duration,
    timeout: Duration,
}

impl<T: Send + 'static> WorkerGate<T> {
    #[must_use]
    pub fn new(cooldown: Duration, timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(GateState::default()),
                worker: Mutex::new(None),
            }),
            cooldown,
            timeout,
        }
    }

    #[must_use]
    pub fn from_config(config: &GateConfig) -> Self {
        Self::new(config.cooldown(), config.timeout())
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        lock(&self.shared.state).busy
    }

    #[must_use]
    pub fn last_run_at(&self) -> Option<Instant> {
        lock(&self.shared.state).last_run_at
    }

    /// Forget the last successful run so the cooldown no longer applies.
    pub fn clear_cooldown(&self) {
        lock(&self.shared.state).last_run_at = None;
    }

    /// Hand `job` to the worker, or report why it was skipped.
    pub fn submit(&self, job: Job<T>) -> Result<Submission<T>> {
        {
            let mut state = lock(&self.shared.state);
            if let Some(last) = state.last_run_at {
                let elapsed = last.elapsed();
                if elapsed < self.cooldown {
                    let remaining = self.cooldown - elapsed;
                    debug!(remaining_ms = remaining.as_millis() as u64, "build skipped, cooling down");
                    return Ok(Submission::Skipped(SkipReason::TooSoon { remaining }));
                }
            }
            if state.busy {
                debug!("build skipped, worker busy");
                return Ok(Submission::Skipped(SkipReason::Busy));
            }
            state.busy = true;
        }

        match self.dispatch(job) {
            Ok(Some(ticket)) => Ok(Submission::Accepted(ticket)),
            Ok(None) => {
                lock(&self.shared.state).busy = false;
                Ok(Submission::Skipped(SkipReason::Busy))
            }
            Err(err) => {
                lock(&self.shared.state).busy = false;
                Err(err)
            }
        }
    }

    fn dispatch(&self, job: Job<T>) -> Result<Option<BuildTicket<T>>> {
        let (reply_tx, reply_rx) = bounded(1);
        let mut envelope = Envelope {
            job,
            reply: reply_tx,
        };

        let mut worker = lock(&self.shared.worker);
        // One retry covers a worker that exited since the last build.
        for _ in 0..2 {
            let tx = match worker.as_ref() {
                Some(tx) => tx.clone(),
                None => {
                    let tx = spawn_worker()?;
                    *worker = Some(tx.clone());
                    tx
                }
            };
            match tx.try_send(envelope) {
                Ok(()) => {
                    drop(worker);
                    return Ok(Some(self.watch(reply_rx)?));
                }
                Err(TrySendError::Full(_)) => {
                    warn!("build mailbox full");
                    return Ok(None);
                }
                Err(TrySendError::Disconnected(returned)) => {
                    warn!("build worker gone, respawning");
                    *worker = None;
                    envelope = returned;
                }
            }
        }
        Err(SpriteError::WorkerCrashed {
            reason: "build worker could not be started".into(),
        })
    }

    /// Arm the deadline for one in-flight job.
    fn watch(&self, reply_rx: Receiver<Result<T>>) -> Result<BuildTicket<T>> {
        let (outcome_tx, outcome_rx) = bounded(1);
        let shared = Arc::clone(&self.shared);
        let timeout = self.timeout;

        thread::Builder::new()
            .name("spritevault-watchdog".into())
            .spawn(move || {
                let outcome = match reply_rx.recv_timeout(timeout) {
                    Ok(outcome) => {
                        let mut state = lock(&shared.state);
                        state.busy = false;
                        if outcome.is_ok() {
                            state.last_run_at = Some(Instant::now());
                        }
                        outcome
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        error!(timeout_secs = timeout.as_secs(), "build timed out, abandoning worker");
                        lock(&shared.worker).take();
                        lock(&shared.state).busy = false;
                        Err(SpriteError::Timeout { after: timeout })
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        error!("build worker exited without reporting");
                        lock(&shared.worker).take();
                        lock(&shared.state).busy = false;
                        Err(SpriteError::WorkerCrashed {
                            reason: "worker exited without reporting".into(),
                        })
                    }
                };
                if let Err(err) = &outcome {
                    warn!(%err, "build failed");
                }
                // The ticket may have been dropped by a fire-and-forget caller.
                let _ = outcome_tx.send(outcome);
            })
            .map_err(|err| SpriteError::WorkerCrashed {
                reason: format!("failed to spawn watchdog: {err}"),
            })?;

        Ok(BuildTicket { rx: outcome_rx })
    }
}

fn spawn_worker<T: Send + 'static>() -> Result<Sender<Envelope<T>>> {
    let (tx, rx) = bounded::<Envelope<T>>(1);
    thread::Builder::new()
        .name("spritevault-build".into())
        .spawn(move || worker_loop(rx))
        .map_err(|err| SpriteError::WorkerCrashed {
            reason: format!("failed to spawn build worker: {err}"),
        })?;
    debug!("spawned build worker");
    Ok(tx)
}

fn worker_loop<T>(rx: Receiver<Envelope<T>>) {
    for Envelope { job, reply } in rx {
        let outcome = match catch_unwind(AssertUnwindSafe(job)) {
            Ok(outcome) => outcome,
            Err(panic) => {
                let reason = panic_payload(&panic);
                error!(%reason, "build job panicked");
                Err(SpriteError::WorkerCrashed { reason })
            }
        };
        // The receiver is gone when the watchdog already gave up on this job.
        if reply.send(outcome).is_err() {
            warn!("discarding result of abandoned build");
        }
    }
    debug!("build worker retired");
}

fn panic_payload(payload: &Box<dyn Any + Send + 'static>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown".to_string()
    }
}
