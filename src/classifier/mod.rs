pub mod classifier;
pub mod predictor;
pub mod traffic_source;

pub use classifier::{classify_record, spawn_classifier, ClassifierHandles};
pub use predictor::{
    list_models, vectorize, EncodingTable, Inference, ModelIdentity, ModelKind, OnnxSession, Prediction, Predictor,
    PredictorSlot, RawOutput, Scaler,
};
