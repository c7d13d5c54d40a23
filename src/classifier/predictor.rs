use anyhow::{anyhow, bail, Context, Result};
use ndarray::{Array2, CowArray};
use ort::{Environment, GraphOptimizationLevel, LoggingLevel, Session, SessionBuilder, Value};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::processor::{feature_columns, FeatureRecord, FieldValue, Label, FEATURE_COUNT};

pub const XGBOOST_MODEL_FILE: &str = "hids_model.onnx";
pub const NEURAL_NETWORK_MODEL_FILE: &str = "complete_nn_ids_model.json";
pub const SCALER_FILE: &str = "scaler.json";
pub const LABEL_ENCODERS_FILE: &str = "label_encoders.json";

pub const XGBOOST_DEFAULT_ACCURACY: f64 = 0.92;
pub const NEURAL_NETWORK_DEFAULT_ACCURACY: f64 = 0.95;
pub const NN_ATTACK_THRESHOLD: f32 = 0.5;

const CATEGORICAL_FIELDS: [&str; 3] = ["protocol_type", "service", "flag"];

/// Raw model output. A model may yield class scores, a bare label, or both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawOutput {
    pub label: Option<i64>,
    pub scores: Option<Vec<f32>>,
}

/// A loaded inference graph. Takes one already scaled feature row.
pub trait Inference: Send + Sync {
    fn run(&self, input: &[f32]) -> Result<RawOutput>;
}

pub struct OnnxSession {
    _environment: Arc<Environment>,
    session: Mutex<Session>,
}

impl OnnxSession {
    pub fn load(path: &Path) -> Result<Self> {
        let environment = Arc::new(
            Environment::builder()
                .with_name("kdd-collector")
                .with_log_level(LoggingLevel::Warning)
                .build()
                .context("Failed to create ONNX environment")?,
        );

        let session = SessionBuilder::new(&environment)?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(1)?
            .with_model_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        Ok(Self { _environment: environment, session: Mutex::new(session) })
    }
}

impl Inference for OnnxSession {
    fn run(&self, input: &[f32]) -> Result<RawOutput> {
        let array = Array2::from_shape_vec((1, input.len()), input.to_vec())
            .context("Failed to create input array")?;
        let cow = CowArray::from(array.into_dyn());

        let session = self.session.lock();
        let tensor = Value::from_array(session.allocator(), &cow).context("Failed to create input tensor")?;
        let outputs = session.run(vec![tensor]).context("Failed to run model")?;

        let label = outputs
            .iter()
            .find_map(|o| o.try_extract::<i64>().ok())
            .and_then(|t| t.view().iter().next().copied());
        let scores = outputs
            .iter()
            .find_map(|o| o.try_extract::<f32>().ok())
            .map(|t| t.view().iter().copied().collect::<Vec<f32>>());

        if label.is_none() && scores.is_none() {
            bail!("Model produced neither a label nor scores");
        }
        Ok(RawOutput { label, scores })
    }
}

/// Standard scaler parameters, `(x - mean) / scale` per column.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Scaler {
    pub mean: Vec<f32>,
    pub scale: Vec<f32>,
}

impl Scaler {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
    }

    pub fn transform(&self, row: &mut [f32]) -> Result<()> {
        if self.mean.len() != row.len() || self.scale.len() != row.len() {
            bail!(
                "Scaler expects {} features, got {}",
                self.mean.len(),
                row.len()
            );
        }
        for ((x, mean), scale) in row.iter_mut().zip(&self.mean).zip(&self.scale) {
            // Zero-variance columns are only centred
            let scale = if *scale == 0.0 { 1.0 } else { *scale };
            *x = (*x - mean) / scale;
        }
        Ok(())
    }
}

/// Categorical encodings: the position of a value in its field's class list.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct EncodingTable {
    classes: HashMap<String, Vec<String>>,
}

impl EncodingTable {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
    }

    /// Encoders fitted on the values most captures contain.
    pub fn common_values() -> Self {
        let mut classes = HashMap::new();
        for (field, values) in [
            ("protocol_type", &["icmp", "tcp", "udp"][..]),
            ("service", &["ftp", "http", "other", "smtp"][..]),
            ("flag", &["OTH", "REJ", "RSTO", "S0", "S1", "SF"][..]),
        ] {
            classes.insert(field.to_string(), values.iter().map(|v| v.to_string()).collect());
        }
        Self { classes }
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.classes.contains_key(field)
    }

    /// Unknown values and unknown fields encode to 0.
    pub fn encode(&self, field: &str, value: &str) -> f32 {
        self.classes
            .get(field)
            .and_then(|values| values.iter().position(|v| v == value))
            .map(|idx| idx as f32)
            .unwrap_or(0.0)
    }
}

/// Lays a record out as model input. Categorical columns go through
/// `encoders`, columns the record does not have become 0.0.
pub fn vectorize(record: &FeatureRecord, feature_names: Option<&[String]>, encoders: &EncodingTable) -> Vec<f32> {
    let to_input = |name: &str| match record.value(name) {
        Some(FieldValue::Int(v)) => v as f32,
        Some(FieldValue::Float(v)) => v as f32,
        Some(FieldValue::Text(v)) if CATEGORICAL_FIELDS.contains(&name) => encoders.encode(name, v),
        Some(FieldValue::Text(_)) | None => 0.0,
    };

    match feature_names {
        Some(names) => names.iter().map(|n| to_input(n)).collect(),
        None => feature_columns().iter().map(|n| to_input(n)).collect(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    Xgboost,
    NeuralNetwork,
}

impl ModelKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "xgboost" => Some(ModelKind::Xgboost),
            "neural-network" => Some(ModelKind::NeuralNetwork),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Xgboost => "xgboost",
            ModelKind::NeuralNetwork => "neural-network",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            ModelKind::Xgboost => XGBOOST_MODEL_FILE,
            ModelKind::NeuralNetwork => NEURAL_NETWORK_MODEL_FILE,
        }
    }

    fn default_accuracy(&self) -> f64 {
        match self {
            ModelKind::Xgboost => XGBOOST_DEFAULT_ACCURACY,
            ModelKind::NeuralNetwork => NEURAL_NETWORK_DEFAULT_ACCURACY,
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelIdentity {
    pub name: String,
    pub kind: ModelKind,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub class: Label,
    pub confidence: f64,
}

impl Default for Prediction {
    fn default() -> Self {
        Self { class: Label::Normal, confidence: 0.5 }
    }
}

#[derive(Debug, Deserialize)]
struct NeuralNetworkBundle {
    model_path: PathBuf,
    scaler: Scaler,
    #[serde(default)]
    feature_names: Option<Vec<String>>,
    #[serde(default)]
    label_encoders: Option<EncodingTable>,
    #[serde(default)]
    model_accuracy: Option<f64>,
}

pub struct Predictor {
    identity: ModelIdentity,
    backend: Box<dyn Inference>,
    scaler: Option<Scaler>,
    encoders: EncodingTable,
    feature_names: Option<Vec<String>>,
}

impl fmt::Debug for Predictor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predictor")
            .field("identity", &self.identity)
            .field("scaled", &self.scaler.is_some())
            .field("feature_names", &self.feature_names.as_ref().map(|n| n.len()))
            .finish()
    }
}

impl Predictor {
    pub fn new(
        identity: ModelIdentity,
        backend: Box<dyn Inference>,
        scaler: Option<Scaler>,
        encoders: EncodingTable,
        feature_names: Option<Vec<String>>,
    ) -> Self {
        let width = feature_names.as_ref().map_or(FEATURE_COUNT, |n| n.len());
        if width != FEATURE_COUNT {
            warn!(expected = FEATURE_COUNT, got = width, model = %identity.name, "Feature count mismatch");
        }
        Self { identity, backend, scaler, encoders, feature_names }
    }

    /// Loads a model file. `.json` files are neural-network bundles, anything
    /// else is an ONNX classifier with `scaler.json` and `label_encoders.json`
    /// next to it.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("Model file '{}' not found", path.display());
        }
        let is_bundle = path.extension().is_some_and(|ext| ext == "json");
        if is_bundle {
            Self::load_neural_network(path)
        } else {
            Self::load_xgboost(path)
        }
    }

    fn load_xgboost(path: &Path) -> Result<Self> {
        let dir = parent_dir(path);
        let scaler = Scaler::from_file(&dir.join(SCALER_FILE)).context("Scaler file not found")?;
        let encoders =
            EncodingTable::from_file(&dir.join(LABEL_ENCODERS_FILE)).context("Label encoders file not found")?;
        let backend = OnnxSession::load(path)?;

        let identity = ModelIdentity {
            name: file_name(path),
            kind: ModelKind::Xgboost,
            accuracy: ModelKind::Xgboost.default_accuracy(),
        };
        Ok(Self::new(identity, Box::new(backend), Some(scaler), encoders, None))
    }

    fn load_neural_network(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let bundle: NeuralNetworkBundle =
            serde_json::from_str(&raw).with_context(|| format!("parse model bundle {}", path.display()))?;

        let dir = parent_dir(path);
        let encoders = match bundle.label_encoders {
            Some(enc) => enc,
            None => {
                let sibling = dir.join(LABEL_ENCODERS_FILE);
                if sibling.exists() {
                    EncodingTable::from_file(&sibling)?
                } else {
                    warn!("No label encoders found, using encoders fitted on common values");
                    EncodingTable::common_values()
                }
            }
        };

        let graph = if bundle.model_path.is_absolute() { bundle.model_path } else { dir.join(bundle.model_path) };
        let backend = OnnxSession::load(&graph)?;

        let identity = ModelIdentity {
            name: file_name(path),
            kind: ModelKind::NeuralNetwork,
            accuracy: bundle
                .model_accuracy
                .unwrap_or_else(|| ModelKind::NeuralNetwork.default_accuracy()),
        };
        Ok(Self::new(identity, Box::new(backend), Some(bundle.scaler), encoders, bundle.feature_names))
    }

    pub fn identity(&self) -> &ModelIdentity {
        &self.identity
    }

    pub fn predict(&self, record: &FeatureRecord) -> Result<Prediction> {
        let mut row = vectorize(record, self.feature_names.as_deref(), &self.encoders);
        if let Some(scaler) = &self.scaler {
            scaler.transform(&mut row)?;
        }
        let output = self.backend.run(&row)?;
        self.interpret(output)
    }

    fn interpret(&self, output: RawOutput) -> Result<Prediction> {
        match self.identity.kind {
            ModelKind::NeuralNetwork => {
                let p = output
                    .scores
                    .as_ref()
                    .and_then(|s| s.first().copied())
                    .ok_or_else(|| anyhow!("No probability output from neural network"))?;
                let (class, confidence) = if p > NN_ATTACK_THRESHOLD {
                    (Label::Anomaly, p)
                } else {
                    (Label::Normal, 1.0 - p)
                };
                Ok(Prediction { class, confidence: confidence as f64 })
            }
            ModelKind::Xgboost => match output.scores.as_deref() {
                Some(probs) if probs.len() >= 2 => {
                    let (idx, max) = probs
                        .iter()
                        .enumerate()
                        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
                        .map(|(idx, p)| (idx, *p))
                        .ok_or_else(|| anyhow!("Empty probability vector"))?;
                    Ok(Prediction { class: Label::from_prediction(idx as u8), confidence: max as f64 })
                }
                _ => {
                    let label = output.label.ok_or_else(|| anyhow!("No label output from classifier"))?;
                    Ok(Prediction {
                        class: Label::from_prediction((label == 1) as u8),
                        confidence: self.identity.accuracy,
                    })
                }
            },
        }
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// The live predictor. Readers clone the `Arc` once per flow, so a switch
/// never mixes two models within one prediction.
#[derive(Debug, Default)]
pub struct PredictorSlot {
    current: RwLock<Option<Arc<Predictor>>>,
    disabled: AtomicBool,
}

impl PredictorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_predictor(predictor: Predictor) -> Self {
        let slot = Self::new();
        slot.install(predictor);
        slot
    }

    pub fn install(&self, predictor: Predictor) {
        info!(model = %predictor.identity.name, kind = %predictor.identity.kind, "Model installed");
        *self.current.write() = Some(Arc::new(predictor));
    }

    pub fn is_active(&self) -> bool {
        !self.disabled.load(Ordering::Relaxed) && self.current.read().is_some()
    }

    pub fn identity(&self) -> Option<ModelIdentity> {
        self.current.read().as_ref().map(|p| p.identity.clone())
    }

    /// Never fails. Without a usable model every record is normal at 0.5;
    /// the first inference error disables prediction for the rest of the run.
    pub fn predict(&self, record: &FeatureRecord) -> Prediction {
        if self.disabled.load(Ordering::Relaxed) {
            return Prediction::default();
        }
        let Some(predictor) = self.current.read().clone() else {
            return Prediction::default();
        };

        match predictor.predict(record) {
            Ok(p) => p,
            Err(e) => {
                if !self.disabled.swap(true, Ordering::Relaxed) {
                    error!(error = %format!("{e:#}"), "Prediction failed, disabling predictions for this run");
                }
                Prediction::default()
            }
        }
    }

    /// Loads the model for `kind` from `model_dir` and swaps it in. On failure
    /// the previous model stays installed.
    pub fn switch_to(&self, kind: ModelKind, model_dir: &Path) -> Result<()> {
        if self.disabled.load(Ordering::Relaxed) {
            debug!(%kind, "Predictions disabled, ignoring model switch");
            return Ok(());
        }
        if self.identity().is_some_and(|id| id.kind == kind) {
            debug!(%kind, "Model already active");
            return Ok(());
        }

        let path = model_dir.join(kind.file_name());
        info!(%kind, path = %path.display(), "Switching model");
        let predictor = Predictor::load(&path).with_context(|| format!("switch to {kind}"))?;
        self.install(predictor);
        Ok(())
    }
}

/// Model files in `dir`, sorted. Scaler and encoder files are not models.
pub fn list_models(dir: &Path) -> Result<Vec<String>> {
    let mut models: Vec<String> = fs::read_dir(dir)
        .with_context(|| format!("read {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.ends_with(".onnx") || name.ends_with(".json"))
        .filter(|name| name != SCALER_FILE && name != LABEL_ENCODERS_FILE)
        .collect();
    models.sort();
    Ok(models)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::{
        CompletedFlow, CompletionReason, ConnectionKey, ConnectionState, FeatureComputer, HistoryIndex, Protocol,
        TcpFlags,
    };
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::AtomicUsize;

    struct Stub {
        output: RawOutput,
        fail: bool,
        calls: Arc<AtomicUsize>,
        seen: Arc<Mutex<Vec<f32>>>,
    }

    impl Stub {
        fn scores(scores: Vec<f32>) -> Self {
            Self {
                output: RawOutput { label: None, scores: Some(scores) },
                fail: false,
                calls: Arc::new(AtomicUsize::new(0)),
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl Inference for Stub {
        fn run(&self, input: &[f32]) -> Result<RawOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen.lock() = input.to_vec();
            if self.fail {
                bail!("stub failure");
            }
            Ok(self.output.clone())
        }
    }

    fn identity(kind: ModelKind) -> ModelIdentity {
        ModelIdentity { name: kind.file_name().to_string(), kind, accuracy: kind.default_accuracy() }
    }

    fn predictor(kind: ModelKind, stub: Stub) -> Predictor {
        Predictor::new(identity(kind), Box::new(stub), None, EncodingTable::common_values(), None)
    }

    fn record() -> FeatureRecord {
        let key = ConnectionKey::new(
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            50000,
            80,
            Protocol::Tcp,
        );
        let mut state = ConnectionState::new(&key, 0);
        state.update(0, 120, Some(TcpFlags::SYN | TcpFlags::FIN), false);
        let flow = CompletedFlow { key, state, completed_at: 1_500_000, reason: CompletionReason::Flags };
        FeatureComputer::default().build(&flow, &HistoryIndex::new(4))
    }

    #[test]
    fn test_encoding_table_unknown_is_zero() {
        let enc = EncodingTable::common_values();
        assert_eq!(enc.encode("protocol_type", "udp"), 2.0);
        assert_eq!(enc.encode("flag", "SF"), 5.0);
        assert_eq!(enc.encode("service", "http"), 1.0);
        assert_eq!(enc.encode("service", "IRC"), 0.0);
        assert_eq!(enc.encode("nope", "tcp"), 0.0);
    }

    #[test]
    fn test_encoding_table_parses_class_lists() {
        let enc: EncodingTable = serde_json::from_str(r#"{"flag": ["REJ", "SF"]}"#).unwrap();
        assert!(enc.has_field("flag"));
        assert!(!enc.has_field("service"));
        assert_eq!(enc.encode("flag", "SF"), 1.0);
    }

    #[test]
    fn test_vectorize_default_layout() {
        let row = vectorize(&record(), None, &EncodingTable::common_values());
        assert_eq!(row.len(), FEATURE_COUNT);
        assert_eq!(row[0], 1.5);
        assert_eq!(row[1], 1.0); // tcp
        assert_eq!(row[2], 1.0); // http
        assert_eq!(row[3], 5.0); // SF
        assert_eq!(row[4], 120.0);
    }

    #[test]
    fn test_vectorize_follows_feature_names() {
        let names = vec!["src_bytes".to_string(), "bogus".to_string(), "flag".to_string()];
        let row = vectorize(&record(), Some(names.as_slice()), &EncodingTable::common_values());
        assert_eq!(row, vec![120.0, 0.0, 5.0]);
    }

    #[test]
    fn test_scaler_transform() {
        let scaler = Scaler { mean: vec![1.0, 2.0], scale: vec![2.0, 0.0] };
        let mut row = [5.0, 3.0];
        scaler.transform(&mut row).unwrap();
        assert_eq!(row, [2.0, 1.0]);
        assert!(scaler.transform(&mut [1.0]).is_err());
    }

    #[test]
    fn test_neural_network_threshold() {
        let p = predictor(ModelKind::NeuralNetwork, Stub::scores(vec![0.8]));
        let out = p.predict(&record()).unwrap();
        assert_eq!(out.class, Label::Anomaly);
        assert!((out.confidence - 0.8).abs() < 1e-6);

        let p = predictor(ModelKind::NeuralNetwork, Stub::scores(vec![0.5]));
        let out = p.predict(&record()).unwrap();
        assert_eq!(out.class, Label::Normal);
        assert!((out.confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_xgboost_argmax_and_label_fallback() {
        let p = predictor(ModelKind::Xgboost, Stub::scores(vec![0.1, 0.9]));
        let out = p.predict(&record()).unwrap();
        assert_eq!(out.class, Label::Anomaly);
        assert!((out.confidence - 0.9).abs() < 1e-6);

        let mut stub = Stub::scores(vec![]);
        stub.output = RawOutput { label: Some(0), scores: None };
        let out = predictor(ModelKind::Xgboost, stub).predict(&record()).unwrap();
        assert_eq!(out.class, Label::Normal);
        assert_eq!(out.confidence, XGBOOST_DEFAULT_ACCURACY);
    }

    #[test]
    fn test_scaler_applied_before_inference() {
        let stub = Stub::scores(vec![0.9, 0.1]);
        let seen = stub.seen.clone();
        let scaler = Scaler { mean: vec![1.0; FEATURE_COUNT], scale: vec![1.0; FEATURE_COUNT] };
        let p = Predictor::new(
            identity(ModelKind::Xgboost),
            Box::new(stub),
            Some(scaler),
            EncodingTable::common_values(),
            None,
        );
        p.predict(&record()).unwrap();
        assert_eq!(seen.lock()[4], 119.0);
    }

    #[test]
    fn test_empty_slot_defaults_to_normal() {
        let slot = PredictorSlot::new();
        assert!(!slot.is_active());
        assert_eq!(slot.predict(&record()), Prediction::default());
        assert!(slot.identity().is_none());
    }

    #[test]
    fn test_failure_disables_slot() {
        let mut stub = Stub::scores(vec![0.9]);
        stub.fail = true;
        let calls = stub.calls.clone();
        let slot = PredictorSlot::with_predictor(predictor(ModelKind::NeuralNetwork, stub));

        assert_eq!(slot.predict(&record()), Prediction::default());
        assert_eq!(slot.predict(&record()), Prediction::default());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!slot.is_active());

        // Switch requests are ignored once disabled
        assert!(slot.switch_to(ModelKind::Xgboost, Path::new("/nonexistent")).is_ok());
        assert_eq!(slot.identity().unwrap().kind, ModelKind::NeuralNetwork);
    }

    #[test]
    fn test_failed_switch_keeps_previous_model() {
        let slot = PredictorSlot::with_predictor(predictor(ModelKind::NeuralNetwork, Stub::scores(vec![0.9])));
        assert!(slot.switch_to(ModelKind::Xgboost, Path::new("/nonexistent")).is_err());
        assert_eq!(slot.identity().unwrap().kind, ModelKind::NeuralNetwork);
        assert_eq!(slot.predict(&record()).class, Label::Anomaly);
    }

    #[test]
    fn test_model_kind_names() {
        assert_eq!(ModelKind::parse("xgboost"), Some(ModelKind::Xgboost));
        assert_eq!(ModelKind::parse("neural-network"), Some(ModelKind::NeuralNetwork));
        assert_eq!(ModelKind::parse("svm"), None);
        assert_eq!(ModelKind::NeuralNetwork.file_name(), NEURAL_NETWORK_MODEL_FILE);
    }

    #[test]
    fn test_list_models_skips_support_files() {
        let dir = std::env::temp_dir().join(format!("kdd-collector-models-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        for name in ["hids_model.onnx", "scaler.json", "label_encoders.json", "complete_nn_ids_model.json", "notes.txt"] {
            fs::write(dir.join(name), b"{}").unwrap();
        }

        let models = list_models(&dir).unwrap();
        fs::remove_dir_all(&dir).unwrap();
        assert_eq!(models, vec!["complete_nn_ids_model.json", "hids_model.onnx"]);
    }
}
