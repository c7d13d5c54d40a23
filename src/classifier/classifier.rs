use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::predictor::PredictorSlot;
use super::traffic_source;
use crate::processor::Label;
use crate::types::ConnectionRecord;

pub struct ClassifierHandles {
    pub tx: Sender<ConnectionRecord>,
    pub rx: Receiver<ConnectionRecord>,
    pub thread: JoinHandle<()>,
}

/// Fills in class, confidence and traffic source on a fresh record.
pub fn classify_record(slot: &PredictorSlot, conn: ConnectionRecord) -> ConnectionRecord {
    let t0 = Instant::now();
    let prediction = slot.predict(&conn.record);
    let record = conn.record.with_prediction(prediction.class, prediction.confidence);

    let (source, source_confidence) = traffic_source::classify(&record);
    let record = record.with_traffic_source(source, source_confidence);

    debug!(
        key = %conn.key,
        class = record.class.as_str(),
        source = %source,
        micros = t0.elapsed().as_micros() as u64,
        "Connection classified"
    );

    if record.class == Label::Anomaly {
        warn!(
            key = %conn.key,
            service = record.service,
            duration = format_args!("{:.2}s", record.duration),
            confidence = format_args!("{:.1}%", record.confidence * 100.0),
            "Potential intrusion detected"
        );
    }

    ConnectionRecord { key: conn.key, record }
}

/// Runs prediction and traffic-source scoring off the engine thread. The
/// thread exits once every input sender is gone and the queue is empty.
pub fn spawn_classifier(slot: Arc<PredictorSlot>) -> ClassifierHandles {
    let (tx_in, rx_in) = unbounded::<ConnectionRecord>();
    let (tx_out, rx_out) = unbounded::<ConnectionRecord>();

    let thread = thread::spawn(move || {
        info!(ml = slot.is_active(), "Classifier thread ready, waiting for connections");

        while let Ok(conn) = rx_in.recv() {
            if tx_out.send(classify_record(&slot, conn)).is_err() {
                // Output side is gone, nothing left to do
                break;
            }
        }

        info!("Classifier thread exiting (channel closed)");
    });

    ClassifierHandles { tx: tx_in, rx: rx_out, thread }
}
