// gate-acceptor-runner/src/scheduler.rs
// ============================================================================
// Module: Run Scheduler
// Description: Triggers runs once or on a fixed interval.
// Purpose: Own the dispatcher task and its lifecycle state.
// Dependencies: tokio, async-trait
// ============================================================================

//! ## Overview
//! The scheduler is a single cooperative task. In periodic mode the callback
//! runs immediately and then on every tick; ticks missed while a callback is
//! still running are delayed, so callbacks never overlap. Stop requests and
//! external cancellation are both watch channels observed by the loop.
//!
//! ## State
//! `Idle -> Running -> Stopping -> Stopped`, stored in an atomic so `state()`
//! never blocks.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use gate_acceptor_core::EventLog;
use gate_acceptor_core::LogEvent;
use gate_acceptor_core::LogLevel;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio::time::interval;
use tokio::time::timeout;

use crate::signal::CancelSignal;
use crate::signal::cancelled;

// ============================================================================
// SECTION: Types
// ============================================================================

/// How runs are triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleMode {
    /// A single run.
    RunOnce,
    /// A run now and then every interval.
    Periodic(Duration),
}

/// Scheduler lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Created, not started.
    Idle,
    /// Dispatcher running.
    Running,
    /// Stop requested, dispatcher finishing.
    Stopping,
    /// Dispatcher exited.
    Stopped,
}

impl SchedulerState {
    /// Encodes the state for atomic storage.
    const fn to_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Running => 1,
            Self::Stopping => 2,
            Self::Stopped => 3,
        }
    }

    /// Decodes an atomic state value.
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Scheduler failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// `start` was called on a scheduler that is not idle.
    #[error("scheduler already started")]
    AlreadyStarted,
    /// Periodic mode was given a zero interval.
    #[error("periodic interval must be non-zero")]
    ZeroInterval,
    /// The dispatcher did not exit before the deadline.
    #[error("scheduler shutdown deadline exceeded")]
    DeadlineExceeded,
    /// The run callback failed.
    #[error("scheduled run failed: {0}")]
    Callback(String),
    /// The dispatcher task panicked or was aborted.
    #[error("scheduler task failed: {0}")]
    Dispatcher(String),
}

/// Work triggered by the scheduler.
#[async_trait]
pub trait ScheduledRun: Send + Sync {
    /// Performs one run.
    ///
    /// # Errors
    ///
    /// Returns a message describing why the run could not complete.
    async fn run(&self) -> Result<(), String>;
}

// ============================================================================
// SECTION: Scheduler
// ============================================================================

/// Run trigger with an explicit lifecycle.
pub struct Scheduler {
    /// Trigger mode.
    mode: ScheduleMode,
    /// Work performed on each trigger.
    callback: Arc<dyn ScheduledRun>,
    /// Destination for callback failures.
    log: Arc<dyn EventLog>,
    /// Encoded [`SchedulerState`].
    state: Arc<AtomicU8>,
    /// Stop request channel.
    stop: watch::Sender<bool>,
    /// External cancellation, if any.
    cancel: Option<CancelSignal>,
    /// Dispatcher task handle.
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Creates an idle scheduler.
    #[must_use]
    pub fn new(mode: ScheduleMode, callback: Arc<dyn ScheduledRun>, log: Arc<dyn EventLog>) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            mode,
            callback,
            log,
            state: Arc::new(AtomicU8::new(SchedulerState::Idle.to_u8())),
            stop,
            cancel: None,
            handle: Mutex::new(None),
        }
    }

    /// Stops the loop when the given signal fires.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Returns the trigger mode.
    #[must_use]
    pub const fn mode(&self) -> ScheduleMode {
        self.mode
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        SchedulerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Runs the callback once on the current task.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Callback`] when the callback fails.
    pub async fn run_once(&self) -> Result<(), SchedulerError> {
        self.callback.run().await.map_err(SchedulerError::Callback)
    }

    /// Spawns the dispatcher task.
    ///
    /// In `RunOnce` mode the task runs the callback once and exits, logging a
    /// failure; use [`Scheduler::run_once`] to observe the error instead.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::ZeroInterval`] for a zero periodic interval
    /// and [`SchedulerError::AlreadyStarted`] unless the scheduler is idle.
    pub fn start(&self) -> Result<(), SchedulerError> {
        if self.mode == ScheduleMode::Periodic(Duration::ZERO) {
            return Err(SchedulerError::ZeroInterval);
        }
        self.state
            .compare_exchange(
                SchedulerState::Idle.to_u8(),
                SchedulerState::Running.to_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map_err(|_| SchedulerError::AlreadyStarted)?;

        let stop = self.stop.subscribe();
        let worker = Dispatcher {
            mode: self.mode,
            callback: Arc::clone(&self.callback),
            log: Arc::clone(&self.log),
            state: Arc::clone(&self.state),
        };
        let handle = tokio::spawn(worker.run(stop, self.cancel.clone()));
        *self.handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// Requests the loop to stop; idempotent and a no-op when idle.
    pub fn stop(&self) {
        let moved = self.state.compare_exchange(
            SchedulerState::Running.to_u8(),
            SchedulerState::Stopping.to_u8(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        if moved.is_ok() {
            self.stop.send_replace(true);
        }
    }

    /// Waits for the dispatcher task to exit.
    ///
    /// Returns immediately when the scheduler was never started.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::DeadlineExceeded`] when the task is still
    /// running at the deadline; the task keeps running and a later call may
    /// wait again. Returns [`SchedulerError::Dispatcher`] when the task
    /// panicked.
    pub async fn wait_for_shutdown(&self, deadline: Duration) -> Result<(), SchedulerError> {
        let handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(mut handle) = handle else {
            return Ok(());
        };
        match timeout(deadline, &mut handle).await {
            Ok(joined) => {
                self.state.store(SchedulerState::Stopped.to_u8(), Ordering::SeqCst);
                joined.map_err(|err| SchedulerError::Dispatcher(err.to_string()))
            }
            Err(_) => {
                *self.handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
                Err(SchedulerError::DeadlineExceeded)
            }
        }
    }
}

// ============================================================================
// SECTION: Dispatcher
// ============================================================================

/// State moved into the dispatcher task.
struct Dispatcher {
    /// Trigger mode.
    mode: ScheduleMode,
    /// Work performed on each trigger.
    callback: Arc<dyn ScheduledRun>,
    /// Destination for callback failures.
    log: Arc<dyn EventLog>,
    /// Shared encoded state.
    state: Arc<AtomicU8>,
}

impl Dispatcher {
    /// Runs the trigger loop until stopped, cancelled, or done.
    async fn run(self, stop: watch::Receiver<bool>, cancel: Option<CancelSignal>) {
        let cancel = async move {
            match cancel {
                Some(signal) => cancelled(signal).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(cancel);

        match self.mode {
            ScheduleMode::RunOnce => {
                tokio::select! {
                    biased;
                    () = cancelled(stop.clone()) => {}
                    () = &mut cancel => {}
                    () = self.trigger() => {}
                }
            }
            ScheduleMode::Periodic(period) => {
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        biased;
                        () = cancelled(stop.clone()) => break,
                        () = &mut cancel => break,
                        _ = ticker.tick() => self.trigger().await,
                    }
                }
            }
        }
        self.state.store(SchedulerState::Stopped.to_u8(), Ordering::SeqCst);
    }

    /// Runs the callback once, logging failures.
    async fn trigger(&self) {
        if let Err(err) = self.callback.run().await {
            self.log.emit(LogEvent::new(LogLevel::Error, "scheduler_callback_failed", err));
        }
    }
}
