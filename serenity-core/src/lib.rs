pub mod backend;
pub mod config;
pub mod error;
pub mod inference;
pub mod models;
pub mod onnx_expression;
pub mod session;

pub use backend::{BackendError, ChatBackend, HttpBackend};
pub use config::SerenityConfig;
pub use error::SerenityError;
pub use inference::{
    FaceExpressions, FaceRegion, Frame, FrameSource, InferenceAdapter, InferenceError,
    ModelLoadError,
};
pub use models::{ChatMessage, EmotionSample, Expression, ExpressionScores, Sender};
pub use onnx_expression::OnnxExpressionAdapter;
pub use session::SessionState;
