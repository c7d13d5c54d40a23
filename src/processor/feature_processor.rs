use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use tracing::info;

use super::engine::{self, EngineConfig};
use crate::capture::ParsedPacket;
use crate::dashboard::DashboardEvent;
use crate::error::{CollectorError, ErrorCounter, Result};
use crate::types::{ConnectionRecord, PipelineStats};

/// Owns the engine thread and the packet queue feeding it.
pub struct FeatureProcessor {
    running: Arc<AtomicBool>,
    processing_thread: Option<JoinHandle<()>>,
    packet_tx: Sender<ParsedPacket>,
    packet_rx: Receiver<ParsedPacket>,
    config: EngineConfig,
}

impl FeatureProcessor {
    pub fn new(config: EngineConfig) -> Self {
        let (packet_tx, packet_rx) = unbounded();
        Self {
            running: Arc::new(AtomicBool::new(false)),
            processing_thread: None,
            packet_tx,
            packet_rx,
            config,
        }
    }

    pub fn get_sender(&self) -> Sender<ParsedPacket> {
        self.packet_tx.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Starts the engine thread. Completed records go to `record_tx`; the
    /// sender is dropped when the thread ends, which closes the pipeline
    /// downstream.
    pub fn start_processor(
        &mut self,
        record_tx: Sender<ConnectionRecord>,
        events_tx: Option<Sender<DashboardEvent>>,
        stats: Arc<PipelineStats>,
        errors: Arc<ErrorCounter>,
    ) -> Result<()> {
        if self.running.swap(true, Ordering::Relaxed) {
            return Err(CollectorError::AlreadyRunning("processor"));
        }

        let processing = {
            let running = self.running.clone();
            let rx = self.packet_rx.clone();
            let config = self.config.clone();
            thread::spawn(move || engine::processing_loop(running, rx, record_tx, events_tx, stats, errors, config))
        };

        self.processing_thread = Some(processing);
        info!(
            window_secs = self.config.window.as_secs(),
            history = self.config.history_capacity,
            "Feature processor started"
        );
        Ok(())
    }

    /// Stops the engine and waits for its final flush.
    pub fn stop_processor(&mut self) -> Result<()> {
        if !self.running.swap(false, Ordering::Relaxed) {
            return Err(CollectorError::NotRunning("processor"));
        }
        if let Some(h) = self.processing_thread.take() {
            let _ = h.join();
        }
        info!("Feature processor stopped");
        Ok(())
    }
}
