//! Scheduler: drives the forwarding pipeline on a recurring trigger.
//!
//! Lifecycle is Idle → Running → Stopped. The loop computes the next fire
//! time only after a cycle returns, so ticks that fall inside a running cycle
//! are skipped and cycles never overlap. `stop()` waits for an in-flight
//! cycle to finish rather than aborting it.

pub mod trigger;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::mail::MailService;
use crate::pipeline::ForwardPipeline;
use crate::store::TargetResolver;

pub use trigger::{Trigger, TriggerSchedule};

/// Scheduler lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerState::Idle => write!(f, "idle"),
            SchedulerState::Running => write!(f, "running"),
            SchedulerState::Stopped => write!(f, "stopped"),
        }
    }
}

enum Lifecycle {
    Idle,
    Running {
        shutdown: watch::Sender<bool>,
        handle: JoinHandle<()>,
    },
    Stopped,
}

impl Lifecycle {
    fn state(&self) -> SchedulerState {
        match self {
            Lifecycle::Idle => SchedulerState::Idle,
            Lifecycle::Running { .. } => SchedulerState::Running,
            Lifecycle::Stopped => SchedulerState::Stopped,
        }
    }
}

pub struct ForwardScheduler {
    trigger: String,
    pipeline: Arc<ForwardPipeline>,
    lifecycle: Mutex<Lifecycle>,
}

impl ForwardScheduler {
    /// The pipeline's keyword filter is built from `config.allowed_keywords`.
    pub fn new(
        config: SchedulerConfig,
        mail: Arc<dyn MailService>,
        targets: Arc<dyn TargetResolver>,
    ) -> Self {
        let SchedulerConfig {
            trigger,
            allowed_keywords,
        } = config;
        Self {
            trigger,
            pipeline: Arc::new(ForwardPipeline::new(mail, targets, allowed_keywords)),
            lifecycle: Mutex::new(Lifecycle::Idle),
        }
    }

    pub fn pipeline(&self) -> &ForwardPipeline {
        &self.pipeline
    }

    pub async fn state(&self) -> SchedulerState {
        self.lifecycle.lock().await.state()
    }

    /// Parse the trigger and spawn the loop. Only valid from Idle.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if !matches!(*lifecycle, Lifecycle::Idle) {
            return Err(SchedulerError::InvalidTransition {
                state: lifecycle.state().to_string(),
                target: SchedulerState::Running.to_string(),
            });
        }

        let trigger = Trigger::parse(&self.trigger)?;
        info!(trigger = %trigger, "Forward scheduler started");

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(trigger, Arc::clone(&self.pipeline), shutdown_rx));
        *lifecycle = Lifecycle::Running { shutdown, handle };
        Ok(())
    }

    /// Signal the loop and wait for any in-flight cycle. No-op unless Running.
    pub async fn stop(&self) -> Result<(), SchedulerError> {
        let mut lifecycle = self.lifecycle.lock().await;
        let Lifecycle::Running { .. } = *lifecycle else {
            return Ok(());
        };

        if let Lifecycle::Running { shutdown, handle } =
            std::mem::replace(&mut *lifecycle, Lifecycle::Stopped)
        {
            let _ = shutdown.send(true);
            handle
                .await
                .map_err(|e| SchedulerError::Join(e.to_string()))?;
        }

        info!("Forward scheduler stopped");
        Ok(())
    }
}

/// Sleep until the next fire time, run one cycle, repeat until signalled.
async fn run_loop<S: TriggerSchedule + 'static>(
    schedule: S,
    pipeline: Arc<ForwardPipeline>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let now = Utc::now();
        let Some(next) = schedule.next_after(now) else {
            info!("Trigger schedule exhausted; scheduler loop exiting");
            return;
        };
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        debug!(next = %next, "Next forward cycle scheduled");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }

        if *shutdown.borrow() {
            debug!("Scheduler loop received stop signal");
            return;
        }

        pipeline.run_once().await;
    }
}
