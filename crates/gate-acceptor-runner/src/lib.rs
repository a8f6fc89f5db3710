// gate-acceptor-runner/src/lib.rs
// ============================================================================
// Module: Gate Acceptor Runner
// Description: Process execution, parallel runs, scheduling, and report sinks.
// Purpose: Drive the core pipeline against real test binaries.
// Dependencies: gate-acceptor-core, gate-acceptor-config, tokio, tempfile
// ============================================================================

//! ## Overview
//! The runner owns everything with side effects. [`ProcessExecutor`] spawns a
//! child per unit and parses its event stream, [`TestRunner`] fans units out
//! over a bounded worker pool and collects results in dispatch order, and
//! [`Scheduler`] triggers runs once or periodically. Reports are written by the
//! sinks in [`sinks`], and operational events go through the logs in
//! [`events`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod events;
pub mod executor;
pub mod runner;
pub mod scheduler;
pub mod signal;
pub mod sinks;
pub mod store;
pub mod tail;


// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use events::FileEventLog;
pub use events::MemoryEventLog;
pub use events::StderrEventLog;
pub use events::TeeEventLog;
pub use executor::CommandTemplate;
pub use executor::ExecError;
pub use executor::ExecutorSettings;
pub use executor::ProcessExecutor;
pub use executor::UnitContext;
pub use executor::UnitExecutor;
pub use runner::RunOutcome;
pub use runner::RunnerError;
pub use runner::RunnerSettings;
pub use runner::TestRunner;
pub use scheduler::ScheduleMode;
pub use scheduler::ScheduledRun;
pub use scheduler::Scheduler;
pub use scheduler::SchedulerError;
pub use scheduler::SchedulerState;
pub use signal::CancelSignal;
pub use signal::cancel_channel;
pub use sinks::MemorySink;
pub use sinks::PerTestFileSink;
pub use sinks::RawEventSink;
pub use sinks::SinkSet;
pub use sinks::SummarySink;
pub use store::FileRawOutputStore;
pub use store::MemoryRawOutputStore;
pub use tail::TailBuffer;
