//! Wires the stages together and owns their lifecycle.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::channels::{InboundChannel, MessageTransport};
use crate::config::{PipelineConfig, ReportConfig};
use crate::pipeline::outreach::{OutreachWorker, spawn_outreach_worker};
use crate::pipeline::queue::TaskQueue;
use crate::pipeline::report::{ReportScheduler, spawn_report_scheduler};
use crate::pipeline::rules::LeadRules;
use crate::pipeline::supervisor::{
    InboundTaskHandler, NoopTaskHandler, Supervisor, spawn_supervisor,
};
use crate::pipeline::verification::{VerificationWorker, spawn_verification_worker};
use crate::store::LeadStore;
use crate::validation::AddressValidator;

/// External collaborators shared by the stages.
pub struct PipelineDeps {
    pub store: Arc<dyn LeadStore>,
    pub transport: Arc<dyn MessageTransport>,
    pub validator: Arc<dyn AddressValidator>,
    /// Inbound task mailbox; `None` disables polling.
    pub inbound: Option<Arc<dyn InboundChannel>>,
    pub task_handler: Arc<dyn InboundTaskHandler>,
}

impl PipelineDeps {
    pub fn new(
        store: Arc<dyn LeadStore>,
        transport: Arc<dyn MessageTransport>,
        validator: Arc<dyn AddressValidator>,
    ) -> Self {
        Self {
            store,
            transport,
            validator,
            inbound: None,
            task_handler: Arc::new(NoopTaskHandler),
        }
    }

    pub fn with_inbound(mut self, inbound: Arc<dyn InboundChannel>) -> Self {
        self.inbound = Some(inbound);
        self
    }

    pub fn with_task_handler(mut self, handler: Arc<dyn InboundTaskHandler>) -> Self {
        self.task_handler = handler;
        self
    }
}

/// A running pipeline: one task per stage plus the optional report tick.
pub struct Pipeline {
    queue: Arc<TaskQueue>,
    shutdown: CancellationToken,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl Pipeline {
    /// Spawn every stage. Must be called inside a tokio runtime.
    pub fn spawn(config: PipelineConfig, report: Option<ReportConfig>, deps: PipelineDeps) -> Self {
        let queue = Arc::new(TaskQueue::new());
        let shutdown = CancellationToken::new();
        let mut handles = Vec::new();

        let mut supervisor = Supervisor::new(
            Arc::clone(&deps.store),
            Arc::clone(&queue),
            config.supervisor_interval,
            config.inbound_subject_filter.clone(),
        );
        if let Some(inbound) = deps.inbound {
            supervisor = supervisor.with_inbound(inbound, Arc::clone(&deps.task_handler));
        }
        handles.push(("supervisor", spawn_supervisor(supervisor, shutdown.clone())));

        let verification = VerificationWorker::new(
            Arc::clone(&deps.store),
            Arc::clone(&deps.validator),
            LeadRules::from_config(&config),
            Arc::clone(&queue),
            config.verification_poll_interval,
        );
        handles.push((
            "verification",
            spawn_verification_worker(verification, shutdown.clone()),
        ));

        let outreach = OutreachWorker::new(
            Arc::clone(&deps.store),
            Arc::clone(&deps.transport),
            Arc::clone(&queue),
            &config,
        );
        handles.push(("outreach", spawn_outreach_worker(outreach, shutdown.clone())));

        match report {
            Some(report) => {
                let scheduler = ReportScheduler::new(
                    Arc::clone(&deps.store),
                    Arc::clone(&deps.transport),
                    report,
                );
                handles.push(("report", spawn_report_scheduler(scheduler, shutdown.clone())));
            }
            None => info!("No report recipient configured, daily report disabled"),
        }

        info!(tasks = handles.len(), "Pipeline started");
        Self {
            queue,
            shutdown,
            handles,
        }
    }

    /// The queue the stages share (for observability).
    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancel every stage and wait for all of them to finish.
    pub async fn shutdown(self) {
        info!("Stopping pipeline");
        self.shutdown.cancel();

        let (names, handles): (Vec<_>, Vec<_>) = self.handles.into_iter().unzip();
        for (name, result) in names.into_iter().zip(futures::future::join_all(handles).await) {
            if let Err(e) = result {
                error!(task = name, error = %e, "Pipeline task ended abnormally");
            }
        }

        info!(
            verification_pending = self.queue.verification_len(),
            outreach_pending = self.queue.outreach_len(),
            "Pipeline stopped"
        );
    }
}
