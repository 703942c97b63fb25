use std::sync::Arc;

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use lead_pipeline::channels::{ImapMailbox, InboundChannel, MessageTransport, SmtpMailer};
use lead_pipeline::config::AppConfig;
use lead_pipeline::pipeline::{Pipeline, PipelineDeps};
use lead_pipeline::store::{LeadStore, LibSqlLeadStore};
use lead_pipeline::validation::{AddressValidator, DnsMxResolver, EmailValidator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let config = AppConfig::from_env()?;
    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("📇 Lead Pipeline v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Store: {}", config.store_path.display());
    eprintln!("   SMTP: {}:{}", config.smtp.host, config.smtp.port);
    match config.mailbox {
        Some(ref mailbox) => eprintln!("   IMAP: {}:{}", mailbox.imap_host, mailbox.imap_port),
        None => eprintln!("   IMAP: disabled"),
    }
    match config.report {
        Some(ref report) => eprintln!("   Report: {} ({})", report.recipient, report.schedule),
        None => eprintln!("   Report: disabled"),
    }

    // ── Collaborators ────────────────────────────────────────────────────
    let store: Arc<dyn LeadStore> = Arc::new(LibSqlLeadStore::new_local(&config.store_path).await?);
    let transport: Arc<dyn MessageTransport> = Arc::new(SmtpMailer::new(config.smtp.clone()));
    let validator: Arc<dyn AddressValidator> =
        Arc::new(EmailValidator::new(Arc::new(DnsMxResolver::from_system_conf()?)));

    let mut deps = PipelineDeps::new(store, transport, validator);
    if let Some(mailbox) = config.mailbox.clone() {
        let inbound: Arc<dyn InboundChannel> = Arc::new(ImapMailbox::new(mailbox));
        deps = deps.with_inbound(inbound);
    }

    // ── Run until signalled ──────────────────────────────────────────────
    let pipeline = Pipeline::spawn(config.pipeline, config.report, deps);

    shutdown_signal().await?;
    pipeline.shutdown().await;

    info!("Shutdown complete");
    Ok(())
}

/// Stderr logging, plus a daily rolling file when `log_dir` is set.
///
/// The returned guard flushes the file writer on drop.
fn init_tracing(log_dir: Option<&std::path::Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = fmt::layer().with_target(false).with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "lead-pipeline.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            None
        }
    }
}

/// Wait for Ctrl-C or SIGTERM.
#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => info!(signal = "SIGINT", "Signal received"),
        _ = sigterm.recv() => info!(signal = "SIGTERM", "Signal received"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!(signal = "ctrl-c", "Signal received");
    Ok(())
}
