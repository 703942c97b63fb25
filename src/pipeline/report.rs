//! Daily campaign report — aggregation and cron-scheduled delivery.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::channels::{MessageTransport, OutboundEmail};
use crate::config::ReportConfig;
use crate::error::PipelineError;
use crate::leads::{EmailVerified, LeadRecord, ResponseStatus};
use crate::pipeline::MIN_TICK;
use crate::store::LeadStore;

/// Subject line of the report email.
pub const REPORT_SUBJECT: &str = "Daily Campaign Report";

/// Counts for the three tracked reply categories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseTally {
    pub interested: usize,
    pub not_interested: usize,
    pub no_response: usize,
}

/// Aggregate view over every lead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CampaignReport {
    pub total_leads: usize,
    /// Leads with `Email Verified = Y`.
    pub verified: usize,
    pub responses: ResponseTally,
}

impl CampaignReport {
    pub fn render(&self) -> String {
        format!(
            "Sales Campaign Report:\n\
             Total Leads: {}\n\
             Verified Leads: {}\n\
             Responses:\n\
             - Interested: {}\n\
             - Not Interested: {}\n\
             - No Response: {}",
            self.total_leads,
            self.verified,
            self.responses.interested,
            self.responses.not_interested,
            self.responses.no_response,
        )
    }
}

/// Tally `records`. Response values outside the three tracked categories,
/// `Pending Response` included, are not counted.
pub fn generate_report(records: &[LeadRecord]) -> CampaignReport {
    let mut report = CampaignReport {
        total_leads: records.len(),
        ..CampaignReport::default()
    };

    for record in records {
        if record.email_verified == Some(EmailVerified::Yes) {
            report.verified += 1;
        }
        match record.response_status {
            Some(ResponseStatus::Interested) => report.responses.interested += 1,
            Some(ResponseStatus::NotInterested) => report.responses.not_interested += 1,
            Some(ResponseStatus::NoResponse) => report.responses.no_response += 1,
            _ => {}
        }
    }
    report
}

/// Sends the report whenever the cron schedule comes due.
pub struct ReportScheduler {
    store: Arc<dyn LeadStore>,
    transport: Arc<dyn MessageTransport>,
    recipient: String,
    schedule: cron::Schedule,
    tick_interval: Duration,
    next_due: Option<DateTime<Local>>,
}

impl ReportScheduler {
    pub fn new(
        store: Arc<dyn LeadStore>,
        transport: Arc<dyn MessageTransport>,
        config: ReportConfig,
    ) -> Self {
        Self::starting_at(store, transport, config, Local::now())
    }

    /// Scheduler whose first firing is the first schedule time after `now`.
    pub fn starting_at(
        store: Arc<dyn LeadStore>,
        transport: Arc<dyn MessageTransport>,
        config: ReportConfig,
        now: DateTime<Local>,
    ) -> Self {
        let next_due = config.schedule.after(&now).next();
        Self {
            store,
            transport,
            recipient: config.recipient,
            schedule: config.schedule,
            tick_interval: config.tick_interval.max(MIN_TICK),
            next_due,
        }
    }

    pub fn next_due(&self) -> Option<DateTime<Local>> {
        self.next_due
    }

    /// Whether the report should go out at `now`. Advances to the next
    /// firing, so missed firings collapse into one.
    pub fn due_fire(&mut self, now: DateTime<Local>) -> bool {
        match self.next_due {
            Some(due) if due <= now => {
                self.next_due = self.schedule.after(&now).next();
                true
            }
            _ => false,
        }
    }

    /// Build the report from the store and deliver it.
    pub async fn send_report(&self) -> Result<CampaignReport, PipelineError> {
        let records = self
            .store
            .fetch_all()
            .await
            .map_err(|e| PipelineError::Report(e.to_string()))?;
        let report = generate_report(&records);

        let email = OutboundEmail::new(&self.recipient, REPORT_SUBJECT, report.render());
        self.transport
            .send(&email)
            .await
            .map_err(|e| PipelineError::Report(e.to_string()))?;

        info!(
            recipient = %self.recipient,
            total_leads = report.total_leads,
            verified = report.verified,
            "Campaign report sent"
        );
        Ok(report)
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            recipient = %self.recipient,
            next_due = ?self.next_due,
            "Report scheduler started"
        );

        let mut tick = tokio::time::interval(self.tick_interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick.tick() => {
                    if self.due_fire(Local::now())
                        && let Err(e) = self.send_report().await
                    {
                        error!(error = %e, "Failed to send report");
                    }
                }
            }
        }

        info!("Report scheduler shutting down");
    }
}

/// Spawn the report tick.
pub fn spawn_report_scheduler(
    scheduler: ReportScheduler,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(scheduler.run(shutdown))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::TimeZone;

    use super::*;
    use crate::config::parse_schedule;
    use crate::error::ChannelError;
    use crate::store::MemoryLeadStore;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<OutboundEmail>>,
    }

    #[async_trait]
    impl MessageTransport for RecordingTransport {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, email: &OutboundEmail) -> Result<(), ChannelError> {
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    fn lead(verified: Option<EmailVerified>, response: Option<ResponseStatus>) -> LeadRecord {
        let mut record = LeadRecord::new(0);
        record.email_verified = verified;
        record.response_status = response;
        record
    }

    fn config() -> ReportConfig {
        ReportConfig {
            recipient: "manager@acme.io".into(),
            schedule: parse_schedule("0 0 16 * * *").unwrap(),
            tick_interval: Duration::from_secs(60),
        }
    }

    #[test]
    fn tally_counts_tracked_categories_only() {
        let records = vec![
            lead(Some(EmailVerified::Yes), Some(ResponseStatus::Interested)),
            lead(Some(EmailVerified::Yes), Some(ResponseStatus::PendingResponse)),
            lead(Some(EmailVerified::No), None),
            lead(None, Some(ResponseStatus::Other("Call back".into()))),
            lead(Some(EmailVerified::Yes), Some(ResponseStatus::NoResponse)),
            lead(None, Some(ResponseStatus::NotInterested)),
        ];
        let report = generate_report(&records);

        assert_eq!(report.total_leads, 6);
        assert_eq!(report.verified, 3);
        assert_eq!(
            report.responses,
            ResponseTally {
                interested: 1,
                not_interested: 1,
                no_response: 1,
            }
        );
        let buckets = report.responses.interested
            + report.responses.not_interested
            + report.responses.no_response;
        assert!(buckets <= report.total_leads);
    }

    #[test]
    fn empty_report() {
        assert_eq!(generate_report(&[]), CampaignReport::default());
    }

    #[test]
    fn render_has_fixed_sections() {
        let report = CampaignReport {
            total_leads: 10,
            verified: 7,
            responses: ResponseTally {
                interested: 2,
                not_interested: 1,
                no_response: 3,
            },
        };
        assert_eq!(
            report.render(),
            "Sales Campaign Report:\n\
             Total Leads: 10\n\
             Verified Leads: 7\n\
             Responses:\n\
             - Interested: 2\n\
             - Not Interested: 1\n\
             - No Response: 3"
        );
    }

    #[test]
    fn fires_once_per_schedule_slot() {
        let start = Local.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap();
        let mut scheduler = ReportScheduler::starting_at(
            Arc::new(MemoryLeadStore::new()),
            Arc::new(RecordingTransport::default()),
            config(),
            start,
        );
        assert_eq!(
            scheduler.next_due(),
            Some(Local.with_ymd_and_hms(2026, 3, 10, 16, 0, 0).unwrap())
        );

        assert!(!scheduler.due_fire(Local.with_ymd_and_hms(2026, 3, 10, 15, 59, 0).unwrap()));
        assert!(scheduler.due_fire(Local.with_ymd_and_hms(2026, 3, 10, 16, 0, 30).unwrap()));
        assert!(!scheduler.due_fire(Local.with_ymd_and_hms(2026, 3, 10, 16, 1, 30).unwrap()));
        assert_eq!(
            scheduler.next_due(),
            Some(Local.with_ymd_and_hms(2026, 3, 11, 16, 0, 0).unwrap())
        );
    }

    #[test]
    fn missed_days_collapse_into_one_firing() {
        let start = Local.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap();
        let mut scheduler = ReportScheduler::starting_at(
            Arc::new(MemoryLeadStore::new()),
            Arc::new(RecordingTransport::default()),
            config(),
            start,
        );

        let late = Local.with_ymd_and_hms(2026, 3, 13, 10, 0, 0).unwrap();
        assert!(scheduler.due_fire(late));
        assert!(!scheduler.due_fire(late));
    }

    #[tokio::test]
    async fn zero_tick_runs_until_cancelled() {
        let scheduler = ReportScheduler::new(
            Arc::new(MemoryLeadStore::new()),
            Arc::new(RecordingTransport::default()),
            ReportConfig {
                tick_interval: Duration::ZERO,
                ..config()
            },
        );
        let shutdown = CancellationToken::new();
        let handle = spawn_report_scheduler(scheduler, shutdown.clone());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());
        shutdown.cancel();
        assert!(handle.await.is_ok());
    }

    #[tokio::test]
    async fn send_report_delivers_rendered_body() {
        let store = Arc::new(MemoryLeadStore::new());
        store
            .insert(lead(Some(EmailVerified::Yes), Some(ResponseStatus::Interested)))
            .await;
        store.insert(lead(Some(EmailVerified::No), None)).await;
        let transport = Arc::new(RecordingTransport::default());
        let scheduler = ReportScheduler::new(store, transport.clone(), config());

        let report = scheduler.send_report().await.unwrap();
        assert_eq!(report.total_leads, 2);
        assert_eq!(report.verified, 1);

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "manager@acme.io");
        assert_eq!(sent[0].subject, "Daily Campaign Report");
        assert!(sent[0].body.contains("Total Leads: 2"));
        assert!(sent[0].body.contains("- Interested: 1"));
    }
}
