// Planning Events
// Progress reporting for a planning pass

use crate::runners::RunnerType;

use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::mpsc;

/// Sender for planning progress events
pub type PlanSender = mpsc::UnboundedSender<PlanEvent>;

/// Receiver for planning progress events
pub type PlanReceiver = mpsc::UnboundedReceiver<PlanEvent>;

/// Create a new progress channel
pub fn plan_channel() -> (PlanSender, PlanReceiver) {
    mpsc::unbounded_channel()
}

/// Events emitted while a plan is built
#[derive(Debug, Clone, PartialEq)]
pub enum PlanEvent {
    PlanningStarted {
        pipeline_name: String,
        total_jobs: usize,
    },

    RunnerSelected {
        runner: RunnerType,
        is_fallback: bool,
        reason: String,
    },

    /// Verdict for one step
    StepPlanned {
        job_id: String,
        step_index: usize,
        step_name: String,
        should_execute: bool,
        reason: String,
    },

    JobPlanned {
        job_id: String,
        executing: usize,
        skipped: usize,
    },

    Warning {
        message: String,
        job_id: Option<String>,
    },

    PlanningCompleted {
        pipeline_name: String,
        executing_steps: usize,
        duration: Duration,
    },
}

impl PlanEvent {
    pub fn warning(message: impl Into<String>, job_id: Option<String>) -> Self {
        Self::Warning {
            message: message.into(),
            job_id,
        }
    }
}

/// Receives planning events; sending never fails the planning pass
pub trait PlanReporter: Send + Sync {
    fn report(&self, event: PlanEvent);
}

impl PlanReporter for PlanSender {
    fn report(&self, event: PlanEvent) {
        let _ = self.send(event);
    }
}

impl PlanReporter for Option<PlanSender> {
    fn report(&self, event: PlanEvent) {
        if let Some(sender) = self {
            let _ = sender.send(event);
        }
    }
}

/// Reporter that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl NullReporter {
    /// Shared instance
    pub fn shared() -> Arc<dyn PlanReporter> {
        static INSTANCE: OnceLock<Arc<NullReporter>> = OnceLock::new();
        INSTANCE.get_or_init(|| Arc::new(NullReporter)).clone()
    }
}

impl PlanReporter for NullReporter {
    fn report(&self, _event: PlanEvent) {}
}
