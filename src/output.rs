//! CSV sink for finished records and the end-of-run summary.

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::Ordering;
use tracing::info;

use crate::classifier::ModelIdentity;
use crate::dashboard::DashboardEvent;
use crate::error::{CollectorError, Result};
use crate::processor::{FeatureRecord, CSV_COLUMNS};
use crate::types::{ConnectionRecord, PipelineStats};

const FLUSH_EVERY: u64 = 100;

/// Writes records in `CSV_COLUMNS` order, header first.
pub struct RecordWriter<W: Write> {
    writer: csv::Writer<W>,
    rows: u64,
}

impl RecordWriter<File> {
    pub fn create(path: &Path) -> Result<Self> {
        Self::new(File::create(path)?)
    }
}

impl<W: Write> RecordWriter<W> {
    pub fn new(inner: W) -> Result<Self> {
        let mut writer = csv::Writer::from_writer(inner);
        writer.write_record(CSV_COLUMNS)?;
        Ok(Self { writer, rows: 0 })
    }

    pub fn write(&mut self, record: &FeatureRecord) -> Result<()> {
        self.writer.write_record(record.csv_row())?;
        self.rows += 1;
        if self.rows % FLUSH_EVERY == 0 {
            self.writer.flush()?;
        }
        Ok(())
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| CollectorError::Io(std::io::Error::new(e.error().kind(), e.error().to_string())))
    }
}

/// Consumes classified records until the channel closes: tallies them,
/// writes them out and forwards them to the dashboard. Returns rows written.
pub fn record_loop<W: Write>(
    rx: Receiver<ConnectionRecord>,
    writer: &mut RecordWriter<W>,
    stats: &PipelineStats,
    events_tx: Option<&Sender<DashboardEvent>>,
) -> Result<u64> {
    for conn in rx.iter() {
        stats.count_record(&conn.record);
        writer.write(&conn.record)?;
        if let Some(tx) = events_tx {
            let _ = tx.try_send(DashboardEvent::Connection(Box::new(conn)));
        }
    }
    writer.flush()?;
    Ok(writer.rows())
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub packets: u64,
    pub completed: u64,
    pub active: u64,
    pub errors: u64,
    pub normal: u64,
    pub anomaly: u64,
    pub human: u64,
    pub bot: u64,
    pub ai: u64,
    pub model: Option<ModelIdentity>,
}

impl RunSummary {
    pub fn collect(stats: &PipelineStats, errors: u64, model: Option<ModelIdentity>) -> Self {
        Self {
            started_at: stats.started_at,
            finished_at: Utc::now(),
            packets: stats.total_packets.load(Ordering::Relaxed),
            completed: stats.completed_connections.load(Ordering::Relaxed),
            active: stats.active_connections.load(Ordering::Relaxed),
            errors,
            normal: stats.normal.load(Ordering::Relaxed),
            anomaly: stats.anomaly.load(Ordering::Relaxed),
            human: stats.human.load(Ordering::Relaxed),
            bot: stats.bot.load(Ordering::Relaxed),
            ai: stats.ai.load(Ordering::Relaxed),
            model,
        }
    }

    pub fn log(&self) {
        let elapsed = self.finished_at - self.started_at;
        info!(
            duration_secs = elapsed.num_seconds(),
            packets = self.packets,
            completed = self.completed,
            active = self.active,
            errors = self.errors,
            "Capture summary"
        );
        info!(
            normal = self.normal,
            anomaly = self.anomaly,
            human = self.human,
            bot = self.bot,
            ai = self.ai,
            "Connection breakdown"
        );
        match &self.model {
            Some(m) => info!(
                model = %m.name,
                model_type = %m.kind,
                accuracy = format_args!("{:.1}%", m.accuracy * 100.0),
                "Model used"
            ),
            None => info!("Model used: none"),
        }
    }
}
