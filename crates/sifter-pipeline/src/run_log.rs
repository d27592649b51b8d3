use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use sifter_core::types::{EventEnvelope, JobEvent};

/// Plain-text run log.
///
/// Reads every job's events from an `EventBus` tap and appends one line per
/// event to `{log_dir}/sifter_{timestamp}.log`. Each line is flushed as it is
/// written, so the file stays intact if the process dies mid-run.
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    /// One log file per process run.
    pub fn new(log_dir: &Path) -> Self {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        Self {
            path: log_dir.join(format!("sifter_{}.log", timestamp)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write events until cancellation or until the tap closes.
    pub async fn run(
        self,
        mut events: mpsc::UnboundedReceiver<EventEnvelope>,
        cancel: CancellationToken,
    ) {
        if let Some(dir) = self.path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                error!(error = %e, "Failed to create log directory");
                return;
            }
        }

        let file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                error!(error = %e, path = %self.path.display(), "Failed to open run log");
                return;
            }
        };

        info!(path = %self.path.display(), "Run log started");
        let mut writer = tokio::io::BufWriter::new(file);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    // Keep what was already published
                    while let Ok(envelope) = events.try_recv() {
                        if writer.write_all(format_line(&envelope).as_bytes()).await.is_err() {
                            break;
                        }
                    }
                    debug!("Run log cancelled");
                    break;
                }
                next = events.recv() => {
                    let Some(envelope) = next else {
                        debug!("Event tap closed, run log stopping");
                        break;
                    };
                    let line = format_line(&envelope);
                    if let Err(e) = writer.write_all(line.as_bytes()).await {
                        error!(error = %e, "Failed to write run log line");
                        break;
                    }
                    if let Err(e) = writer.flush().await {
                        error!(error = %e, "Failed to flush run log");
                    }
                }
            }
        }

        writer.flush().await.ok();
        debug!(path = %self.path.display(), "Run log finished");
    }
}

/// `<timestamp> [<job id>] #<seq> <type> <detail>`, newline-terminated.
pub fn format_line(envelope: &EventEnvelope) -> String {
    let detail = match &envelope.event {
        JobEvent::Started | JobEvent::Complete => String::new(),
        JobEvent::Progress { node, detail, step } => {
            format!(" step={} node={} {}", step, node, detail)
        }
        JobEvent::Results { items } => {
            let names: Vec<String> = items
                .iter()
                .map(|c| match c.accession_id {
                    Some(ref acc) => format!("{} ({}, {})", c.name, c.organism, acc),
                    None => format!("{} ({})", c.name, c.organism),
                })
                .collect();
            format!(" {} candidates: {}", items.len(), names.join("; "))
        }
        JobEvent::Error { message } => format!(" {}", message),
    };
    format!(
        "{} [{}] #{} {}{}\n",
        envelope.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
        envelope.job_id,
        envelope.seq,
        envelope.event.kind(),
        detail
    )
}
