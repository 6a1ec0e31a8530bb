//! One polling cycle: fetch → parse → filter → resolve → forward → mark read.
//!
//! Every per-message failure is logged and contained to that message. A panic
//! anywhere inside one message's processing, or inside the fetch, is caught
//! here and never reaches the scheduler task.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::mail::{MailService, Message};
use crate::pipeline::rules::KeywordFilter;
use crate::store::TargetResolver;

/// Which branch one message took through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Subject carried no valid routing instruction.
    NoInstruction,
    /// Keyword not in the allow-list.
    KeywordFiltered,
    /// Target name could not be resolved.
    Unresolved,
    /// Send failed; the message stays unread.
    ForwardFailed,
    /// Forward sent. `marked_read` is false when the mark-read call failed.
    Forwarded { marked_read: bool },
}

/// Tally of one cycle, logged when anything was fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub fetched: usize,
    pub forwarded: usize,
    pub mark_read_failed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub panicked: usize,
}

impl CycleSummary {
    fn record(&mut self, outcome: &MessageOutcome) {
        match outcome {
            MessageOutcome::NoInstruction | MessageOutcome::KeywordFiltered => self.skipped += 1,
            MessageOutcome::Unresolved | MessageOutcome::ForwardFailed => self.failed += 1,
            MessageOutcome::Forwarded { marked_read } => {
                self.forwarded += 1;
                if !marked_read {
                    self.mark_read_failed += 1;
                }
            }
        }
    }
}

/// The forwarding pipeline. Holds no state across cycles.
pub struct ForwardPipeline {
    mail: Arc<dyn MailService>,
    targets: Arc<dyn TargetResolver>,
    filter: KeywordFilter,
}

impl ForwardPipeline {
    pub fn new(
        mail: Arc<dyn MailService>,
        targets: Arc<dyn TargetResolver>,
        allowed_keywords: Vec<String>,
    ) -> Self {
        Self {
            mail,
            targets,
            filter: KeywordFilter::new(allowed_keywords),
        }
    }

    pub fn filter(&self) -> &KeywordFilter {
        &self.filter
    }

    /// Run one polling cycle. Never fails; outcomes are logged.
    pub async fn run_once(&self) {
        self.run_cycle().await;
    }

    /// Run one polling cycle and return its tally. `None` when the fetch failed.
    pub async fn run_cycle(&self) -> Option<CycleSummary> {
        let messages = match AssertUnwindSafe(self.mail.fetch_unread())
            .catch_unwind()
            .await
        {
            Ok(Ok(messages)) => messages,
            Ok(Err(e)) => {
                error!(error = %e, "Failed to fetch unread messages");
                return None;
            }
            Err(panic) => {
                error!(panic = %panic_message(&*panic), "Fetching unread messages panicked");
                return None;
            }
        };

        let mut summary = CycleSummary {
            fetched: messages.len(),
            ..CycleSummary::default()
        };
        if messages.is_empty() {
            debug!("No unread messages");
            return Some(summary);
        }

        for message in &messages {
            match AssertUnwindSafe(self.process_message(message))
                .catch_unwind()
                .await
            {
                Ok(outcome) => summary.record(&outcome),
                Err(panic) => {
                    error!(
                        id = %message.id,
                        panic = %panic_message(&*panic),
                        "Processing message panicked"
                    );
                    summary.panicked += 1;
                }
            }
        }

        info!(
            fetched = summary.fetched,
            forwarded = summary.forwarded,
            skipped = summary.skipped,
            failed = summary.failed,
            panicked = summary.panicked,
            "Forward cycle complete"
        );
        Some(summary)
    }

    /// Route a single message.
    pub async fn process_message(&self, message: &Message) -> MessageOutcome {
        let instruction = self.mail.parse_subject(&message.subject);
        if !instruction.valid {
            debug!(id = %message.id, subject = %message.subject, "No routing instruction");
            return MessageOutcome::NoInstruction;
        }

        if !self.filter.allows(&instruction.keyword) {
            debug!(id = %message.id, keyword = %instruction.keyword, "Keyword filtered");
            return MessageOutcome::KeywordFiltered;
        }

        let email = match self.targets.resolve(&instruction.target_name).await {
            Ok(email) => email,
            Err(e) => {
                error!(
                    id = %message.id,
                    target = %instruction.target_name,
                    error = %e,
                    "Failed to resolve forward target"
                );
                return MessageOutcome::Unresolved;
            }
        };

        if let Err(e) = self.mail.send_forward(message, &email).await {
            error!(id = %message.id, to = %email, error = %e, "Failed to forward message");
            return MessageOutcome::ForwardFailed;
        }

        let marked_read = match self.mail.mark_read(&message.id).await {
            Ok(()) => true,
            Err(e) => {
                error!(id = %message.id, error = %e, "Failed to mark message read");
                false
            }
        };

        info!(
            id = %message.id,
            keyword = %instruction.keyword,
            target = %instruction.target_name,
            to = %email,
            "Message forwarded"
        );
        if !marked_read {
            warn!(id = %message.id, "Forwarded message left unread; it may be forwarded again");
        }
        MessageOutcome::Forwarded { marked_read }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
