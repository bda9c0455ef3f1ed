//! Capability traits for the sampling pipeline.
//!
//! - [`FrameSource`] — camera (or replay) frames on demand
//! - [`InferenceAdapter`] — facial expression scoring over a frame
//!
//! Any pretrained-model backend can sit behind [`InferenceAdapter`] without the
//! sampler knowing about it.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::models::ExpressionScores;

// ============================================================================
// Frames
// ============================================================================

/// A single grayscale frame. Cloning is cheap (shared pixel buffer).
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Row-major 8-bit luma, `width * height` bytes.
    pub luma: Arc<[u8]>,
}

impl Frame {
    pub fn new(width: u32, height: u32, luma: Vec<u8>) -> Result<Self, InferenceError> {
        let expected = width as usize * height as usize;
        if luma.len() != expected || expected == 0 {
            return Err(InferenceError::InvalidFrame(format!(
                "{}x{} frame needs {} bytes, got {}",
                width,
                height,
                expected,
                luma.len()
            )));
        }
        Ok(Self {
            width,
            height,
            luma: luma.into(),
        })
    }
}

/// Pixel rectangle of a detected face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceRegion {
    pub fn whole(frame: &Frame) -> Self {
        Self {
            x: 0,
            y: 0,
            width: frame.width,
            height: frame.height,
        }
    }
}

/// Expression scores for one detected face.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceExpressions {
    pub region: FaceRegion,
    pub scores: ExpressionScores,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("Model not found at {path}")]
    ModelNotFound { path: String },

    #[error("Failed to initialise model runtime: {0}")]
    Runtime(String),
}

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Models not loaded")]
    NotLoaded,

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Inference failed: {0}")]
    Failed(String),
}

// ============================================================================
// Traits
// ============================================================================

/// Supplies frames on demand. Implementations own the underlying device.
pub trait FrameSource: Send + Sync {
    /// Whether the source is currently producing valid frames.
    fn is_ready(&self) -> bool;

    /// The most recent frame, or `None` if none is available right now.
    fn current_frame(&self) -> Option<Frame>;

    /// Release the underlying device. Called once on session teardown.
    fn release(&self);
}

/// Facial expression inference over a frame.
#[async_trait]
pub trait InferenceAdapter: Send + Sync {
    /// Load model assets. Must succeed before `detect_expressions` is used.
    async fn load_models(&self) -> Result<(), ModelLoadError>;

    /// Detect faces and score their expressions. An empty vec means no face.
    async fn detect_expressions(&self, frame: &Frame)
        -> Result<Vec<FaceExpressions>, InferenceError>;

    /// Adapter name for logging.
    fn name(&self) -> &str;
}
