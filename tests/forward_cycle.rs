//! Integration tests for the scheduler driving the forwarding pipeline.
//!
//! Each test wires stub collaborators into a real `ForwardPipeline` and
//! `ForwardScheduler` running on a short `@every` trigger.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, sleep};

use mail_forward::config::SchedulerConfig;
use mail_forward::error::{MailError, TargetError};
use mail_forward::mail::{MailService, Message};
use mail_forward::pipeline::ForwardPipeline;
use mail_forward::scheduler::{ForwardScheduler, SchedulerState};
use mail_forward::store::{LibSqlTargetStore, TargetResolver};

/// Maximum time any wait in these tests is allowed to take.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Mailbox whose unread set shrinks as messages are marked read.
#[derive(Default)]
struct Mailbox {
    unread: Mutex<BTreeMap<String, Message>>,
    forwards: Mutex<Vec<(String, String)>>,
    fetches: AtomicUsize,
    /// Fail (or panic) the first N fetches.
    failing_fetches: usize,
    panic_on_fail: bool,
    /// Per-fetch delay, to make cycles long.
    fetch_delay: Duration,
    in_fetch: AtomicUsize,
    max_concurrent: AtomicUsize,
    fetch_started: AtomicBool,
    fetch_finished: AtomicBool,
}

impl Mailbox {
    fn with_subjects(subjects: &[&str]) -> Self {
        let mailbox = Self::default();
        {
            let mut unread = mailbox.unread.lock().unwrap();
            for (i, subject) in subjects.iter().enumerate() {
                let id = format!("{:03}", i + 1);
                unread.insert(
                    id.clone(),
                    Message {
                        id,
                        subject: subject.to_string(),
                        from: "sender@example.com".into(),
                        ..Message::default()
                    },
                );
            }
        }
        mailbox
    }

    fn forwards(&self) -> Vec<(String, String)> {
        self.forwards.lock().unwrap().clone()
    }

    fn unread_ids(&self) -> Vec<String> {
        self.unread.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl MailService for Mailbox {
    async fn fetch_unread(&self) -> Result<Vec<Message>, MailError> {
        let n = self.fetches.fetch_add(1, Ordering::SeqCst);
        if n < self.failing_fetches {
            if self.panic_on_fail {
                panic!("fetch {n} exploded");
            }
            return Err(MailError::Connection {
                host: "imap.example.com:993".into(),
                reason: "connection refused".into(),
            });
        }

        let concurrent = self.in_fetch.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(concurrent, Ordering::SeqCst);
        self.fetch_started.store(true, Ordering::SeqCst);
        if !self.fetch_delay.is_zero() {
            sleep(self.fetch_delay).await;
        }
        self.in_fetch.fetch_sub(1, Ordering::SeqCst);
        self.fetch_finished.store(true, Ordering::SeqCst);

        Ok(self.unread.lock().unwrap().values().cloned().collect())
    }

    async fn send_forward(&self, original: &Message, to_email: &str) -> Result<(), MailError> {
        self.forwards
            .lock()
            .unwrap()
            .push((original.id.clone(), to_email.to_string()));
        Ok(())
    }

    async fn mark_read(&self, message_id: &str) -> Result<(), MailError> {
        self.unread.lock().unwrap().remove(message_id);
        Ok(())
    }
}

struct Directory(HashMap<String, String>);

#[async_trait]
impl TargetResolver for Directory {
    async fn resolve(&self, name: &str) -> Result<String, TargetError> {
        self.0.get(name).cloned().ok_or_else(|| TargetError::NotFound {
            name: name.to_string(),
        })
    }
}

fn directory(pairs: &[(&str, &str)]) -> Arc<Directory> {
    Arc::new(Directory(
        pairs
            .iter()
            .map(|(n, e)| (n.to_string(), e.to_string()))
            .collect(),
    ))
}

fn scheduler(
    trigger: &str,
    mailbox: &Arc<Mailbox>,
    targets: Arc<dyn TargetResolver>,
    keywords: &[&str],
) -> ForwardScheduler {
    ForwardScheduler::new(
        SchedulerConfig {
            trigger: trigger.to_string(),
            allowed_keywords: keywords.iter().map(|k| k.to_string()).collect(),
        },
        mailbox.clone(),
        targets,
    )
}

/// Poll `condition` until it holds or the test timeout elapses.
async fn wait_for(condition: impl Fn() -> bool) {
    let deadline = Instant::now() + TEST_TIMEOUT;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within {TEST_TIMEOUT:?}");
        sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn scheduled_cycles_forward_each_message_once() {
    let mailbox = Arc::new(Mailbox::with_subjects(&[
        "URGENT - Project",
        "Invalid",
        "INFO - Weekly",
    ]));
    let targets = directory(&[
        ("Project", "project@example.com"),
        ("Weekly", "weekly@example.com"),
    ]);
    let s = scheduler("@every 20ms", &mailbox, targets, &["URGENT", "INFO"]);

    s.start().await.unwrap();
    wait_for(|| mailbox.fetches.load(Ordering::SeqCst) >= 3).await;
    s.stop().await.unwrap();

    assert_eq!(
        mailbox.forwards(),
        vec![
            ("001".to_string(), "project@example.com".to_string()),
            ("003".to_string(), "weekly@example.com".to_string()),
        ]
    );
    assert_eq!(mailbox.unread_ids(), vec!["002"]);
    assert_eq!(s.state().await, SchedulerState::Stopped);
}

#[tokio::test]
async fn unresolved_message_is_retried_on_later_cycles() {
    let mailbox = Arc::new(Mailbox::with_subjects(&["URGENT - ghost", "URGENT - a"]));
    let s = scheduler(
        "@every 20ms",
        &mailbox,
        directory(&[("a", "a@example.com")]),
        &["URGENT"],
    );

    s.start().await.unwrap();
    wait_for(|| mailbox.fetches.load(Ordering::SeqCst) >= 3).await;
    s.stop().await.unwrap();

    assert_eq!(
        mailbox.forwards(),
        vec![("002".to_string(), "a@example.com".to_string())]
    );
    assert_eq!(mailbox.unread_ids(), vec!["001"]);
}

#[tokio::test]
async fn fetch_failures_do_not_stop_the_loop() {
    let mailbox = Arc::new(Mailbox {
        failing_fetches: 2,
        ..Mailbox::with_subjects(&["URGENT - a"])
    });
    let s = scheduler(
        "@every 20ms",
        &mailbox,
        directory(&[("a", "a@example.com")]),
        &["URGENT"],
    );

    s.start().await.unwrap();
    wait_for(|| !mailbox.forwards().is_empty()).await;
    s.stop().await.unwrap();

    assert!(mailbox.fetches.load(Ordering::SeqCst) >= 3);
    assert_eq!(mailbox.forwards().len(), 1);
}

#[tokio::test]
async fn fetch_panics_do_not_reach_the_scheduler() {
    let mailbox = Arc::new(Mailbox {
        failing_fetches: 2,
        panic_on_fail: true,
        ..Mailbox::with_subjects(&["URGENT - a"])
    });
    let s = scheduler(
        "@every 20ms",
        &mailbox,
        directory(&[("a", "a@example.com")]),
        &["URGENT"],
    );

    s.start().await.unwrap();
    wait_for(|| !mailbox.forwards().is_empty()).await;
    s.stop().await.unwrap();

    assert_eq!(mailbox.forwards().len(), 1);
}

#[tokio::test]
async fn stop_waits_for_in_flight_cycle() {
    let mailbox = Arc::new(Mailbox {
        fetch_delay: Duration::from_millis(300),
        ..Mailbox::with_subjects(&["URGENT - a"])
    });
    let s = scheduler(
        "@every 10ms",
        &mailbox,
        directory(&[("a", "a@example.com")]),
        &["URGENT"],
    );

    s.start().await.unwrap();
    wait_for(|| mailbox.fetch_started.load(Ordering::SeqCst)).await;
    assert!(!mailbox.fetch_finished.load(Ordering::SeqCst));

    s.stop().await.unwrap();

    // The in-flight cycle ran to completion, forward and mark-read included.
    assert!(mailbox.fetch_finished.load(Ordering::SeqCst));
    assert_eq!(mailbox.forwards().len(), 1);
    assert!(mailbox.unread_ids().is_empty());
}

#[tokio::test]
async fn cycles_never_overlap() {
    let mailbox = Arc::new(Mailbox {
        fetch_delay: Duration::from_millis(50),
        ..Mailbox::default()
    });
    let s = scheduler("@every 5ms", &mailbox, directory(&[]), &["URGENT"]);

    s.start().await.unwrap();
    wait_for(|| mailbox.fetches.load(Ordering::SeqCst) >= 4).await;
    s.stop().await.unwrap();

    assert_eq!(mailbox.max_concurrent.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn no_cycle_runs_after_stop() {
    let mailbox = Arc::new(Mailbox::default());
    let s = scheduler("@every 10ms", &mailbox, directory(&[]), &["URGENT"]);

    s.start().await.unwrap();
    wait_for(|| mailbox.fetches.load(Ordering::SeqCst) >= 1).await;
    s.stop().await.unwrap();

    let after_stop = mailbox.fetches.load(Ordering::SeqCst);
    sleep(Duration::from_millis(50)).await;
    assert_eq!(mailbox.fetches.load(Ordering::SeqCst), after_stop);
}

#[tokio::test]
async fn pipeline_resolves_through_libsql_store() {
    let store = Arc::new(LibSqlTargetStore::new_memory().await.unwrap());
    store
        .upsert_target("Project", "project@example.com")
        .await
        .unwrap();

    let mailbox = Arc::new(Mailbox::with_subjects(&["URGENT - Project", "URGENT - Nobody"]));
    let pipeline = ForwardPipeline::new(mailbox.clone(), store, vec!["URGENT".to_string()]);

    pipeline.run_once().await;

    assert_eq!(
        mailbox.forwards(),
        vec![("001".to_string(), "project@example.com".to_string())]
    );
    assert_eq!(mailbox.unread_ids(), vec!["002"]);
}

#[tokio::test]
async fn scheduler_forwards_only_configured_keywords() {
    let mailbox = Arc::new(Mailbox::with_subjects(&["URGENT - Project", "INFO - Project"]));
    let targets = directory(&[("Project", "project@example.com")]);
    let s = scheduler("@every 20ms", &mailbox, targets, &["URGENT"]);

    s.start().await.unwrap();
    wait_for(|| mailbox.fetches.load(Ordering::SeqCst) >= 2).await;
    s.stop().await.unwrap();

    assert_eq!(
        mailbox.forwards(),
        vec![("001".to_string(), "project@example.com".to_string())]
    );
    assert_eq!(mailbox.unread_ids(), vec!["002"]);
}
