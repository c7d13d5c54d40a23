use crossbeam_channel::{select, tick, Receiver};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::client::DashboardClient;
use crate::classifier::{ModelKind, PredictorSlot};
use crate::error::ErrorCounter;
use crate::types::{ConnectionRecord, PipelineStats};

/// Minimum spacing between model-switch polls.
pub const MIN_SWITCH_POLL: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub enum DashboardEvent {
    /// Push the current stats snapshot.
    Stats,
    Connection(Box<ConnectionRecord>),
}

pub struct Publisher {
    client: DashboardClient,
    slot: Arc<PredictorSlot>,
    stats: Arc<PipelineStats>,
    errors: Arc<ErrorCounter>,
    model_dir: PathBuf,
}

impl Publisher {
    pub fn new(
        client: DashboardClient,
        slot: Arc<PredictorSlot>,
        stats: Arc<PipelineStats>,
        errors: Arc<ErrorCounter>,
        model_dir: PathBuf,
    ) -> Self {
        Self { client, slot, stats, errors, model_dir }
    }

    pub fn push_stats(&self) {
        let identity = self.slot.identity();
        let snapshot = self.stats.snapshot(self.errors.count(), identity.as_ref());
        if let Err(e) = self.client.send_stats(&snapshot) {
            warn!(error = %e, "Error sending stats to dashboard");
        }
    }

    fn push_connection(&self, conn: &ConnectionRecord) {
        if let Err(e) = self.client.send_connection(conn) {
            warn!(key = %conn.key, error = %e, "Error sending connection to dashboard");
        }
    }

    fn handle(&self, event: DashboardEvent) {
        match event {
            DashboardEvent::Stats => self.push_stats(),
            DashboardEvent::Connection(conn) => self.push_connection(&conn),
        }
    }

    /// Polls for a requested model variant and swaps it in. Any failure
    /// leaves the current model in place.
    pub fn check_model_switch(&self) {
        let requested = match self.client.poll_model_switch() {
            Ok(Some(name)) => name,
            Ok(None) => return,
            Err(e) => {
                debug!(error = %e, "Model switch poll failed");
                return;
            }
        };

        match ModelKind::parse(&requested) {
            Some(kind) => {
                info!(model_type = %kind, "Model switch requested");
                match self.slot.switch_to(kind, &self.model_dir) {
                    Ok(()) => {
                        info!(model_type = %kind, "Model switch complete");
                        self.push_stats();
                    }
                    Err(e) => error!(error = %format!("{e:#}"), "Error switching model"),
                }
            }
            None => warn!(model_type = %requested, "Unknown model type requested"),
        }

        if let Err(e) = self.client.clear_model_switch() {
            debug!(error = %e, "Failed to clear model switch request");
        }
    }
}

/// Dashboard thread body. Serves events until every sender is gone, polling
/// for model switches in between.
pub fn publisher_loop(events_rx: Receiver<DashboardEvent>, publisher: Publisher, poll_interval: Duration) {
    let poll_tick = tick(poll_interval.max(MIN_SWITCH_POLL));

    loop {
        select! {
            recv(events_rx) -> msg => match msg {
                Ok(event) => publisher.handle(event),
                Err(_) => break,
            },
            recv(poll_tick) -> _ => publisher.check_model_switch(),
        }
    }
    debug!("Dashboard publisher exiting");
}
