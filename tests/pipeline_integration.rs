//! Integration tests for the spawned pipeline.
//!
//! Each test runs every stage against an in-memory store, a scripted
//! transport, and a stub MX resolver, then shuts the pipeline down.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::timeout;

use lead_pipeline::channels::{InboundChannel, InboundEmail, MessageTransport, OutboundEmail};
use lead_pipeline::config::PipelineConfig;
use lead_pipeline::error::{ChannelError, PipelineError, ValidationError};
use lead_pipeline::leads::{EmailVerified, LeadRecord, ProcessingStatus, ResponseStatus};
use lead_pipeline::pipeline::{InboundTaskHandler, Pipeline, PipelineDeps};
use lead_pipeline::store::MemoryLeadStore;
use lead_pipeline::validation::{EmailValidator, MxResolver};

/// Maximum time any test is allowed to wait for the pipeline.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Every domain except `nomx.io` has mail exchangers.
struct StubResolver;

#[async_trait]
impl MxResolver for StubResolver {
    async fn has_mx(&self, domain: &str) -> Result<bool, ValidationError> {
        Ok(domain != "nomx.io")
    }
}

/// Fails the first N sends to each scripted recipient; records every send.
#[derive(Default)]
struct ScriptedTransport {
    failures: Mutex<HashMap<String, u32>>,
    sent: Mutex<Vec<OutboundEmail>>,
}

impl ScriptedTransport {
    fn failing(recipient: &str, times: u32) -> Self {
        let transport = Self::default();
        transport
            .failures
            .lock()
            .unwrap()
            .insert(recipient.to_string(), times);
        transport
    }

    fn sends_to(&self, recipient: &str) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.to == recipient)
            .count()
    }
}

#[async_trait]
impl MessageTransport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send(&self, email: &OutboundEmail) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push(email.clone());
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(&email.to) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Err(ChannelError::SendFailed {
                    name: "scripted".into(),
                    reason: "421 try again later".into(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Inbox holding one campaign task and one unrelated message.
struct OneTaskInbox {
    unread: Mutex<Vec<InboundEmail>>,
}

impl OneTaskInbox {
    fn new() -> Self {
        let email = |id: &str, subject: &str| InboundEmail {
            message_id: id.into(),
            from: "ops@acme.io".into(),
            subject: subject.into(),
            body: "Load the spring list".into(),
            received_at: Utc::now(),
        };
        Self {
            unread: Mutex::new(vec![
                email("task-1", "New Campaign Task: spring"),
                email("other-1", "Lunch on Friday"),
            ]),
        }
    }
}

#[async_trait]
impl InboundChannel for OneTaskInbox {
    fn name(&self) -> &str {
        "one-task"
    }

    async fn fetch_unread_matching(
        &self,
        subject_filter: &str,
    ) -> Result<Vec<InboundEmail>, ChannelError> {
        let mut unread = self.unread.lock().unwrap();
        let (matching, rest): (Vec<_>, Vec<_>) = unread
            .drain(..)
            .partition(|m| m.subject.contains(subject_filter));
        *unread = rest;
        Ok(matching)
    }
}

#[derive(Default)]
struct RecordingHandler {
    handled: Mutex<Vec<String>>,
}

#[async_trait]
impl InboundTaskHandler for RecordingHandler {
    async fn handle(&self, email: &InboundEmail) -> Result<(), PipelineError> {
        self.handled.lock().unwrap().push(email.message_id.clone());
        Ok(())
    }
}

fn fast_config() -> PipelineConfig {
    PipelineConfig {
        verification_poll_interval: Duration::from_millis(5),
        outreach_poll_interval: Duration::from_millis(5),
        retry_delay: Duration::from_millis(5),
        supervisor_interval: Duration::from_millis(25),
        ..PipelineConfig::default()
    }
}

fn lead(email: &str, company: &str) -> LeadRecord {
    LeadRecord::new(0)
        .with_email(email)
        .with_company(company)
        .with_industry("Retail")
        .with_contact_number("555-0100")
}

fn start(store: &Arc<MemoryLeadStore>, transport: &Arc<ScriptedTransport>) -> Pipeline {
    let deps = PipelineDeps::new(
        store.clone(),
        transport.clone(),
        Arc::new(EmailValidator::new(Arc::new(StubResolver))),
    );
    Pipeline::spawn(fast_config(), None, deps)
}

/// Poll the store until every listed lead reached a terminal or `Verified(N)` state.
async fn wait_until_settled(store: &MemoryLeadStore, indices: &[usize]) {
    timeout(TEST_TIMEOUT, async {
        loop {
            let mut settled = true;
            for &index in indices {
                let record = store.get(index).await.unwrap();
                let done = match record.processing_status {
                    Some(status) if status.is_terminal() => true,
                    Some(ProcessingStatus::Verified) => {
                        record.email_verified == Some(EmailVerified::No)
                    }
                    _ => false,
                };
                settled &= done;
            }
            if settled {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("pipeline did not settle in time");
}

#[tokio::test]
async fn leads_are_verified_and_contacted() {
    let store = Arc::new(MemoryLeadStore::new());
    store.insert(lead("jane@acme.io", "Acme")).await;
    store.insert(lead("sam@acme.io", "Test Company")).await;
    store.insert(lead("bad-email", "Globex")).await;
    store.insert(lead("kim@mailinator.com", "Initech")).await;
    store.insert(lead("lee@nomx.io", "Umbrella")).await;

    let transport = Arc::new(ScriptedTransport::default());
    let pipeline = start(&store, &transport);
    wait_until_settled(&store, &[0, 1, 2, 3, 4]).await;
    pipeline.shutdown().await;

    let good = store.get(0).await.unwrap();
    assert_eq!(good.email_verified, Some(EmailVerified::Yes));
    assert_eq!(good.processing_status, Some(ProcessingStatus::Completed));
    assert_eq!(good.response_status, Some(ResponseStatus::PendingResponse));
    assert!(good.verification_date.is_some());
    assert!(good.outreach_date.is_some());

    for index in 1..=4 {
        let rejected = store.get(index).await.unwrap();
        assert_eq!(rejected.email_verified, Some(EmailVerified::No), "lead {index}");
        assert_eq!(rejected.processing_status, Some(ProcessingStatus::Verified));
        assert!(rejected.outreach_date.is_none());
    }

    let sent = transport.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "jane@acme.io");
    assert_eq!(sent[0].subject, "Special Offer for Your Business");
    assert_eq!(sent[0].body, "Your custom sales message here...");
}

#[tokio::test]
async fn status_moves_forward_only() {
    let store = Arc::new(MemoryLeadStore::new());
    store.insert(lead("jane@acme.io", "Acme")).await;

    let transport = Arc::new(ScriptedTransport::default());
    let pipeline = start(&store, &transport);
    wait_until_settled(&store, &[0]).await;
    pipeline.shutdown().await;

    let statuses: Vec<_> = store
        .history(0)
        .await
        .into_iter()
        .filter_map(|u| u.processing_status)
        .collect();
    assert_eq!(
        statuses,
        vec![
            ProcessingStatus::Verifying,
            ProcessingStatus::Verified,
            ProcessingStatus::Outreach,
            ProcessingStatus::Completed,
        ]
    );
}

#[tokio::test]
async fn two_failures_then_success_completes() {
    let store = Arc::new(MemoryLeadStore::new());
    store.insert(lead("jane@acme.io", "Acme")).await;

    let transport = Arc::new(ScriptedTransport::failing("jane@acme.io", 2));
    let pipeline = start(&store, &transport);
    wait_until_settled(&store, &[0]).await;
    pipeline.shutdown().await;

    let record = store.get(0).await.unwrap();
    assert_eq!(record.processing_status, Some(ProcessingStatus::Completed));
    assert_eq!(record.response_status, Some(ResponseStatus::PendingResponse));
    assert_eq!(transport.sends_to("jane@acme.io"), 3);
}

#[tokio::test]
async fn three_failures_mark_error() {
    let store = Arc::new(MemoryLeadStore::new());
    store.insert(lead("jane@acme.io", "Acme")).await;

    let transport = Arc::new(ScriptedTransport::failing("jane@acme.io", u32::MAX));
    let pipeline = start(&store, &transport);
    wait_until_settled(&store, &[0]).await;
    pipeline.shutdown().await;

    let record = store.get(0).await.unwrap();
    assert_eq!(record.processing_status, Some(ProcessingStatus::Error));
    assert_eq!(
        record.notes.as_deref(),
        Some("Outreach failed: delivery failed after 3 attempts")
    );
    assert_eq!(transport.sends_to("jane@acme.io"), 3);
}

#[tokio::test]
async fn leads_added_later_are_discovered() {
    let store = Arc::new(MemoryLeadStore::new());
    store.insert(lead("jane@acme.io", "Acme")).await;

    let transport = Arc::new(ScriptedTransport::default());
    let pipeline = start(&store, &transport);
    wait_until_settled(&store, &[0]).await;

    store.insert(lead("sam@acme.io", "Globex")).await;
    wait_until_settled(&store, &[1]).await;
    pipeline.shutdown().await;

    assert_eq!(transport.sends_to("jane@acme.io"), 1);
    assert_eq!(transport.sends_to("sam@acme.io"), 1);
}

#[tokio::test]
async fn inbound_tasks_are_handed_over_once() {
    let store = Arc::new(MemoryLeadStore::new());
    let handler = Arc::new(RecordingHandler::default());
    let deps = PipelineDeps::new(
        store.clone(),
        Arc::new(ScriptedTransport::default()),
        Arc::new(EmailValidator::new(Arc::new(StubResolver))),
    )
    .with_inbound(Arc::new(OneTaskInbox::new()))
    .with_task_handler(handler.clone());
    let pipeline = Pipeline::spawn(fast_config(), None, deps);

    timeout(TEST_TIMEOUT, async {
        while handler.handled.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("inbound task was not handled");

    // Let a few more supervisor cycles run.
    tokio::time::sleep(Duration::from_millis(100)).await;
    pipeline.shutdown().await;

    assert_eq!(*handler.handled.lock().unwrap(), vec!["task-1".to_string()]);
}

#[tokio::test]
async fn shutdown_is_prompt_with_long_intervals() {
    let store = Arc::new(MemoryLeadStore::new());
    let transport = Arc::new(ScriptedTransport::default());
    let config = PipelineConfig {
        verification_poll_interval: Duration::from_secs(60),
        outreach_poll_interval: Duration::from_secs(60),
        supervisor_interval: Duration::from_secs(3600),
        ..PipelineConfig::default()
    };
    let deps = PipelineDeps::new(
        store.clone(),
        transport,
        Arc::new(EmailValidator::new(Arc::new(StubResolver))),
    );
    let pipeline = Pipeline::spawn(config, None, deps);
    let token = pipeline.shutdown_token();

    tokio::time::sleep(Duration::from_millis(20)).await;
    timeout(TEST_TIMEOUT, pipeline.shutdown())
        .await
        .expect("shutdown hung");
    assert!(token.is_cancelled());
}
