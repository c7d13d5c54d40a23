pub mod feature_processor;
mod engine;
mod features;
mod flow;
mod history;
mod service;
mod tracker;

pub use engine::{processing_loop, EngineConfig, FlowEngine};
pub use feature_processor::FeatureProcessor;
pub use features::{
    feature_columns, FeatureComputer, FeatureRecord, FieldValue, Label, TrafficSource, CSV_COLUMNS, DEFAULT_WINDOW,
    FEATURE_COUNT,
};
pub use flow::{
    ConnFlag, ConnectionKey, ConnectionState, Protocol, TcpFlags, REAP_INTERVAL_US, STALE_FLOW_US,
};
pub use history::{HistoryEntry, HistoryIndex, WindowMatches, DEFAULT_HISTORY_CAPACITY};
pub use service::{service_for_port, OTHER_SERVICE};
pub use tracker::{CompletedFlow, CompletionReason, FlowTracker, TrackerStats};
