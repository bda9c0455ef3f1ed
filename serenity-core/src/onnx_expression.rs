//! ONNX expression backend — local inference via a FER+ classifier
//!
//! Uses the `ort` crate for ONNX Runtime. The model takes a single
//! `1x1xNxN` grayscale tensor and produces 8 logits in FER+ order.
//! The whole frame is scored as one face region, so frames should already
//! be face crops (or the face should dominate the frame).

use async_trait::async_trait;
use image::imageops::{self, FilterType};
use image::GrayImage;
use ort::session::Session;
use ort::value::Tensor;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};

use crate::inference::{
    FaceExpressions, FaceRegion, Frame, InferenceAdapter, InferenceError, ModelLoadError,
};
use crate::models::{Expression, ExpressionScores};

pub const DEFAULT_MODEL_FILE: &str = "emotion-ferplus-8.onnx";

/// FER+ output order. `None` entries are folded, see [`scores_from_logits`].
const FERPLUS_LABELS: [Option<Expression>; 8] = [
    Some(Expression::Neutral),
    Some(Expression::Happy),
    Some(Expression::Surprised),
    Some(Expression::Sad),
    Some(Expression::Angry),
    Some(Expression::Disgusted),
    Some(Expression::Fearful),
    None, // contempt
];

/// Local ONNX facial expression adapter.
pub struct OnnxExpressionAdapter {
    model_path: PathBuf,
    input_size: u32,
    session: OnceLock<Arc<Mutex<Session>>>,
}

impl std::fmt::Debug for OnnxExpressionAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxExpressionAdapter")
            .field("model_path", &self.model_path)
            .field("input_size", &self.input_size)
            .field("loaded", &self.session.get().is_some())
            .finish()
    }
}

impl OnnxExpressionAdapter {
    /// Create an adapter. Nothing is loaded until `load_models`.
    pub fn new(model_path: PathBuf, input_size: u32) -> Self {
        Self {
            model_path,
            input_size: input_size.max(1),
            session: OnceLock::new(),
        }
    }
}

#[async_trait]
impl InferenceAdapter for OnnxExpressionAdapter {
    async fn load_models(&self) -> Result<(), ModelLoadError> {
        if self.session.get().is_some() {
            return Ok(());
        }
        if !self.model_path.exists() {
            return Err(ModelLoadError::ModelNotFound {
                path: self.model_path.display().to_string(),
            });
        }

        let model_path = self.model_path.clone();
        let session = tokio::task::spawn_blocking(move || {
            Session::builder()
                .and_then(|b| b.with_intra_threads(1))
                .and_then(|b| b.commit_from_file(&model_path))
                .map_err(|e| ModelLoadError::Runtime(e.to_string()))
        })
        .await
        .map_err(|e| ModelLoadError::Runtime(format!("spawn_blocking join error: {e}")))??;

        // A concurrent load may have won; either session is equivalent.
        let _ = self.session.set(Arc::new(Mutex::new(session)));
        tracing::info!(path = %self.model_path.display(), "Expression model loaded");
        Ok(())
    }

    async fn detect_expressions(
        &self,
        frame: &Frame,
    ) -> Result<Vec<FaceExpressions>, InferenceError> {
        let session = Arc::clone(self.session.get().ok_or(InferenceError::NotLoaded)?);
        let input_size = self.input_size;
        let frame = frame.clone();

        // ONNX inference is CPU-bound — run on the blocking thread pool.
        tokio::task::spawn_blocking(move || {
            let mut session_guard = session
                .lock()
                .map_err(|e| InferenceError::Failed(format!("session lock poisoned: {e}")))?;
            let scores = classify_sync(&mut session_guard, &frame, input_size)?;
            Ok(vec![FaceExpressions {
                region: FaceRegion::whole(&frame),
                scores,
            }])
        })
        .await
        .map_err(|e| InferenceError::Failed(format!("spawn_blocking join error: {e}")))?
    }

    fn name(&self) -> &str {
        "onnx-ferplus"
    }
}

/// Run the classifier synchronously.
fn classify_sync(
    session: &mut Session,
    frame: &Frame,
    input_size: u32,
) -> Result<ExpressionScores, InferenceError> {
    let pixels = preprocess(frame, input_size)?;
    let side = input_size as i64;
    let shape = vec![1i64, 1, side, side];

    let input = Tensor::from_array((shape, pixels))
        .map_err(|e| InferenceError::Failed(e.to_string()))?;

    let outputs = session
        .run(ort::inputs![input])
        .map_err(|e| InferenceError::Failed(e.to_string()))?;

    // try_extract_tensor returns (&Shape, &[f32])
    let (_shape, logits) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(|e| InferenceError::Failed(e.to_string()))?;

    scores_from_logits(logits)
}

/// Resize the frame to `size x size` and widen luma to raw `f32` pixel values.
pub fn preprocess(frame: &Frame, size: u32) -> Result<Vec<f32>, InferenceError> {
    let image = GrayImage::from_raw(frame.width, frame.height, frame.luma.to_vec())
        .ok_or_else(|| InferenceError::InvalidFrame("buffer does not match dimensions".into()))?;

    let resized = if image.width() == size && image.height() == size {
        image
    } else {
        imageops::resize(&image, size, size, FilterType::Triangle)
    };

    Ok(resized.into_raw().into_iter().map(f32::from).collect())
}

/// Softmax FER+ logits into per-label probabilities.
///
/// `contempt` has no counterpart in [`Expression`] and is added to
/// `disgusted`.
pub fn scores_from_logits(logits: &[f32]) -> Result<ExpressionScores, InferenceError> {
    if logits.len() != FERPLUS_LABELS.len() {
        return Err(InferenceError::Failed(format!(
            "expected {} logits, got {}",
            FERPLUS_LABELS.len(),
            logits.len()
        )));
    }

    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        return Err(InferenceError::Failed("degenerate logits".into()));
    }

    let mut scores = ExpressionScores::new();
    for (label, p) in FERPLUS_LABELS.iter().zip(exps) {
        let label = label.unwrap_or(Expression::Disgusted);
        *scores.entry(label).or_insert(0.0) += p / total;
    }
    Ok(scores)
}

/// Resolve the default model directory.
pub fn default_model_dir() -> PathBuf {
    let data_home = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".local/share")
        });
    data_home.join("serenity/models")
}

/// Resolve the model path. An empty config value means the default location.
pub fn resolve_model_path(onnx_model_path: &str) -> PathBuf {
    if onnx_model_path.is_empty() {
        default_model_dir().join(DEFAULT_MODEL_FILE)
    } else {
        PathBuf::from(onnx_model_path)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::dominant_expression;

    #[tokio::test]
    async fn test_missing_model_returns_not_found() {
        let adapter = OnnxExpressionAdapter::new(PathBuf::from("/nonexistent/fer.onnx"), 64);
        match adapter.load_models().await {
            Err(ModelLoadError::ModelNotFound { path }) => {
                assert!(path.contains("nonexistent"), "path was: {path}");
            }
            other => panic!("Expected ModelNotFound, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_detect_before_load_is_an_error() {
        let adapter = OnnxExpressionAdapter::new(PathBuf::from("/nonexistent/fer.onnx"), 64);
        let frame = Frame::new(2, 2, vec![0; 4]).unwrap();
        assert!(matches!(
            adapter.detect_expressions(&frame).await,
            Err(InferenceError::NotLoaded)
        ));
    }

    #[test]
    fn test_softmax_sums_to_one_and_picks_max() {
        let logits = [0.0, 5.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0];
        let scores = scores_from_logits(&logits).unwrap();
        let total: f32 = scores.values().sum();
        assert!((total - 1.0).abs() < 1e-5, "total was {total}");
        assert_eq!(dominant_expression(&scores).unwrap().0, Expression::Happy);
        assert_eq!(scores.len(), Expression::ALL.len());
    }

    #[test]
    fn test_contempt_folds_into_disgusted() {
        let logits = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 10.0];
        let scores = scores_from_logits(&logits).unwrap();
        assert_eq!(dominant_expression(&scores).unwrap().0, Expression::Disgusted);
    }

    #[test]
    fn test_wrong_logit_count_is_rejected() {
        assert!(scores_from_logits(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_preprocess_resizes_to_square() {
        let frame = Frame::new(8, 4, vec![128; 32]).unwrap();
        let pixels = preprocess(&frame, 4).unwrap();
        assert_eq!(pixels.len(), 16);
        assert!(pixels.iter().all(|&p| (p - 128.0).abs() < 1.0));
    }

    #[test]
    fn test_resolve_model_path() {
        assert!(resolve_model_path("")
            .to_string_lossy()
            .ends_with("serenity/models/emotion-ferplus-8.onnx"));
        assert_eq!(
            resolve_model_path("/opt/fer.onnx"),
            PathBuf::from("/opt/fer.onnx")
        );
    }
}
