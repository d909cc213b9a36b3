//! Job controller — the single recurring schedule driving the dispatch pipeline.
//!
//! State lives behind one async mutex. `start`, `stop` and the self-stop path
//! hold it for the state transition only; cycles and audit writes run outside
//! the lock, and audit writes are time-bounded. The scheduler is running
//! exactly when a schedule handle is registered, so the two cannot disagree.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use courier_common::error::AppError;
use courier_common::types::{AuditOperation, AuditRecord, NewAuditRecord};

use crate::audit::AuditLog;
use crate::pipeline::{CycleDecision, DispatchPipeline};
use crate::trigger::{Trigger, TriggerError};

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("failed to register schedule {schedule:?}: {reason}")]
    ScheduleRegistration { schedule: String, reason: String },
}

impl From<ControllerError> for AppError {
    fn from(err: ControllerError) -> Self {
        AppError::Scheduler(err.to_string())
    }
}

/// Snapshot of the controller state for status queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub schedule: Option<String>,
    /// Identifies the active trigger registration.
    pub registration: Option<u64>,
    pub started_at: Option<DateTime<Utc>>,
}

struct ScheduleHandle {
    registration: u64,
    schedule: String,
    started_at: DateTime<Utc>,
    stop_tx: watch::Sender<bool>,
    // Dropping the handle detaches the task; an in-flight cycle still finishes.
    _task: JoinHandle<()>,
}

#[derive(Default)]
struct SchedulerState {
    handle: Option<ScheduleHandle>,
    last_registration: u64,
}

impl SchedulerState {
    fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

struct ControllerInner {
    state: Mutex<SchedulerState>,
    pipeline: DispatchPipeline,
    default_schedule: String,
}

/// Cheap to clone; all clones control the same schedule.
#[derive(Clone)]
pub struct JobController {
    inner: Arc<ControllerInner>,
}

impl JobController {
    pub fn new(pipeline: DispatchPipeline, default_schedule: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                state: Mutex::new(SchedulerState::default()),
                pipeline,
                default_schedule: default_schedule.into(),
            }),
        }
    }

    pub fn default_schedule(&self) -> &str {
        &self.inner.default_schedule
    }

    /// Start with the configured default schedule.
    pub async fn start_default(&self) -> Result<(), ControllerError> {
        let schedule = self.inner.default_schedule.clone();
        self.start(&schedule).await
    }

    /// Register the recurring trigger. Starting a running controller is a no-op.
    pub async fn start(&self, schedule: &str) -> Result<(), ControllerError> {
        let mut state = self.inner.state.lock().await;

        if let Some(handle) = &state.handle {
            tracing::info!(schedule = %handle.schedule, "Dispatcher already running");
            let description = format!("Dispatcher already running with schedule {}", handle.schedule);
            drop(state);
            self.inner
                .record(NewAuditRecord::control(AuditOperation::Start, true, description))
                .await;
            return Ok(());
        }

        let armed = Trigger::parse(schedule)
            .map_err(|e: TriggerError| e.to_string())
            .and_then(|trigger| {
                tokio::runtime::Handle::try_current()
                    .map(|runtime| (trigger, runtime))
                    .map_err(|e| format!("no async runtime to host the schedule: {}", e))
            });

        let (trigger, runtime) = match armed {
            Ok(armed) => armed,
            Err(reason) => {
                let err = ControllerError::ScheduleRegistration {
                    schedule: schedule.to_string(),
                    reason,
                };
                tracing::error!(error = %err, "Failed to start dispatcher");
                drop(state);
                self.inner
                    .record(NewAuditRecord::control(
                        AuditOperation::Start,
                        false,
                        format!("Failed to start dispatcher: {}", err),
                    ))
                    .await;
                return Err(err);
            }
        };

        state.last_registration += 1;
        let registration = state.last_registration;
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = runtime.spawn(run_schedule(
            Arc::clone(&self.inner),
            trigger,
            registration,
            stop_rx,
        ));

        state.handle = Some(ScheduleHandle {
            registration,
            schedule: schedule.to_string(),
            started_at: Utc::now(),
            stop_tx,
            _task: task,
        });

        drop(state);

        tracing::info!(schedule, registration, "Dispatcher started");
        self.inner
            .record(NewAuditRecord::control(
                AuditOperation::Start,
                true,
                format!("Dispatcher started with schedule {}", schedule),
            ))
            .await;
        Ok(())
    }

    /// Unregister the trigger. A cycle already in progress runs to completion.
    pub async fn stop(&self) {
        let mut state = self.inner.state.lock().await;

        let Some(handle) = state.handle.take() else {
            tracing::info!("Dispatcher is already stopped");
            drop(state);
            self.inner
                .record(NewAuditRecord::control(
                    AuditOperation::Stop,
                    true,
                    "Dispatcher already stopped",
                ))
                .await;
            return;
        };

        // The task may already have exited; nothing to signal then.
        let _ = handle.stop_tx.send(true);
        drop(state);

        let description = format!("Dispatcher stopped at {}", Utc::now().to_rfc3339());
        tracing::info!(registration = handle.registration, "{}", description);
        self.inner
            .record(NewAuditRecord::control(AuditOperation::Stop, true, description))
            .await;
    }

    pub async fn is_running(&self) -> bool {
        self.inner.state.lock().await.is_running()
    }

    pub async fn status(&self) -> SchedulerStatus {
        let state = self.inner.state.lock().await;
        match &state.handle {
            Some(handle) => SchedulerStatus {
                running: true,
                schedule: Some(handle.schedule.clone()),
                registration: Some(handle.registration),
                started_at: Some(handle.started_at),
            },
            None => SchedulerStatus {
                running: false,
                schedule: None,
                registration: None,
                started_at: None,
            },
        }
    }

    /// Most recent audit records first.
    pub async fn audit_log(&self, limit: i64) -> Result<Vec<AuditRecord>, AppError> {
        self.inner.pipeline.audit().recent(limit).await
    }
}

impl ControllerInner {
    async fn record(&self, record: NewAuditRecord) {
        self.pipeline.record(record).await;
    }

    /// Stop on behalf of the schedule task itself. Only the registration that
    /// asks is stopped; a newer registration is left alone.
    async fn self_stop(&self, registration: u64, reason: &str) {
        let mut state = self.state.lock().await;

        let owns_schedule = state
            .handle
            .as_ref()
            .is_some_and(|h| h.registration == registration);
        if !owns_schedule {
            tracing::debug!(registration, "Schedule already replaced, skipping self-stop");
            return;
        }

        state.handle = None;
        drop(state);

        let description = format!("Dispatcher stopped {} at {}", reason, Utc::now().to_rfc3339());
        tracing::info!(registration, "{}", description);
        self.record(NewAuditRecord::control(AuditOperation::Stop, true, description))
            .await;
    }
}

async fn run_schedule(
    inner: Arc<ControllerInner>,
    trigger: Trigger,
    registration: u64,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        let Some(delay) = trigger.next_delay() else {
            tracing::warn!(registration, "Schedule has no further firings");
            inner.self_stop(registration, "after its schedule expired").await;
            break;
        };

        // Only `true` is ever sent, and a dropped sender also means stop.
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = stop_rx.changed() => break,
        }

        if *stop_rx.borrow() {
            break;
        }

        let report = inner.pipeline.run_cycle().await;
        if report.decision == CycleDecision::SelfStop {
            inner.self_stop(registration, "after draining queue").await;
            break;
        }
    }

    tracing::debug!(registration, "Schedule task exited");
}
