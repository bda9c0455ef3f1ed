pub mod auth;
pub mod chat;
pub mod emotion;
pub mod mood;

pub use auth::{AuthResponse, GoogleLoginRequest, LoginRequest, SignupRequest};
pub use chat::{ChatMessage, Sender};
pub use emotion::{dominant_expression, EmotionSample, Expression, ExpressionScores};
pub use mood::{MoodPoint, MoodSummary};
