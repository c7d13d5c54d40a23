pub mod capture;
pub mod classifier;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod output;
pub mod processor;
pub mod types;

use anyhow::{anyhow, Context};
use crossbeam_channel::{bounded, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use capture::PacketSniffer;
use classifier::{spawn_classifier, Predictor, PredictorSlot};
use dashboard::{publisher_loop, DashboardClient, DashboardEvent, Publisher};
use output::{record_loop, RecordWriter};
use processor::FeatureProcessor;
use types::{ConnectionRecord, PipelineStats};

pub use config::CollectorConfig;
pub use error::{CollectorError, ErrorCounter, FlowError};
pub use output::RunSummary;

// Dashboard events beyond this are dropped
const DASHBOARD_QUEUE: usize = 1024;
const WAIT_POLL: Duration = Duration::from_millis(100);

/// Loads the configured model. Any failure leaves the slot empty, which
/// labels every connection normal.
pub fn load_predictor(config: &CollectorConfig) -> PredictorSlot {
    if !config.use_ml {
        info!("ML predictions disabled");
        return PredictorSlot::new();
    }

    let path = config.model_path();
    match Predictor::load(&path) {
        Ok(predictor) => {
            let id = predictor.identity();
            info!(
                model = %id.name,
                model_type = %id.kind,
                accuracy = format_args!("{:.1}%", id.accuracy * 100.0),
                "All ML components loaded"
            );
            PredictorSlot::with_predictor(predictor)
        }
        Err(e) => {
            warn!(error = %format!("{e:#}"), "Running without ML predictions");
            PredictorSlot::new()
        }
    }
}

/// Starts the engine, then the capture feeding it. If the capture cannot
/// start, the engine is stopped again so its thread and record sender go away.
fn start_pipeline(
    sniffer: &mut PacketSniffer,
    processor: &mut FeatureProcessor,
    record_tx: Sender<ConnectionRecord>,
    events_tx: Option<Sender<DashboardEvent>>,
    stats: Arc<PipelineStats>,
    errors: Arc<ErrorCounter>,
) -> error::Result<()> {
    processor.start_processor(record_tx, events_tx, stats, errors)?;
    if let Err(e) = sniffer.start_sniffer() {
        let _ = processor.stop_processor();
        return Err(e);
    }
    Ok(())
}

/// Captures until `running` is cleared, the timeout passes or the capture
/// ends, then flushes every open connection and returns the run summary.
/// Only failing to open the capture or the output file is fatal.
pub fn run(config: &CollectorConfig, running: Arc<AtomicBool>) -> anyhow::Result<RunSummary> {
    config.validate()?;

    let errors = Arc::new(ErrorCounter::new());
    let stats = Arc::new(PipelineStats::new());
    let slot = Arc::new(load_predictor(config));

    let mut writer = RecordWriter::create(&config.output)
        .with_context(|| format!("open output file {}", config.output.display()))?;

    let (events_tx, publisher_thread) = match &config.dashboard_url {
        Some(url) => {
            let client = DashboardClient::new(url, config.dashboard_timeout())?;
            let publisher = Publisher::new(
                client,
                slot.clone(),
                stats.clone(),
                errors.clone(),
                config.model_dir.clone(),
            );
            let (tx, rx) = bounded(DASHBOARD_QUEUE);
            let poll = config.switch_poll();
            let handle = thread::spawn(move || publisher_loop(rx, publisher, poll));
            let _ = tx.try_send(DashboardEvent::Stats);
            info!(url = %url, "Dashboard integration enabled");
            (Some(tx), Some(handle))
        }
        None => (None, None),
    };

    let classifier = spawn_classifier(slot.clone());
    let mut processor = FeatureProcessor::new(config.engine());
    let mut sniffer = PacketSniffer::new_with_sender(processor.get_sender(), errors.clone());

    sniffer
        .init_sniffer(config.interface.as_deref(), &config.filter)
        .context("packet capture typically requires root privileges")?;
    start_pipeline(
        &mut sniffer,
        &mut processor,
        classifier.tx,
        events_tx.clone(),
        stats.clone(),
        errors.clone(),
    )?;

    let recorder = {
        let rx = classifier.rx;
        let stats = stats.clone();
        let events_tx = events_tx.clone();
        thread::spawn(move || record_loop(rx, &mut writer, &stats, events_tx.as_ref()))
    };

    info!(
        interface = config.interface.as_deref().unwrap_or("<default>"),
        output = %config.output.display(),
        window_secs = config.window_secs,
        timeout_secs = ?config.timeout_secs,
        "Capture started, press Ctrl+C to stop"
    );

    let deadline = config.timeout().map(|t| Instant::now() + t);
    while running.load(Ordering::Relaxed) {
        if !sniffer.is_running() {
            warn!("Capture ended");
            break;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            info!("Capture timeout reached");
            break;
        }
        thread::sleep(WAIT_POLL);
    }

    info!("Stopping capture");
    sniffer.stop_sniffer()?;
    processor.stop_processor()?;
    let _ = classifier.thread.join();

    let rows = recorder
        .join()
        .map_err(|_| anyhow!("output thread panicked"))??;
    info!(rows, output = %config.output.display(), "Wrote connection records");

    if let Some(tx) = events_tx {
        let _ = tx.send(DashboardEvent::Stats);
    }
    if let Some(handle) = publisher_thread {
        let _ = handle.join();
    }

    let summary = RunSummary::collect(&stats, errors.count(), slot.identity());
    summary.log();
    Ok(summary)
}
