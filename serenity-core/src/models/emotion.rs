use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Facial expression labels, declared in canonical order.
///
/// The declaration order is load-bearing: `Ord` follows it, and ties in
/// [`dominant_expression`] resolve to the label that comes first here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expression {
    Neutral,
    Happy,
    Sad,
    Angry,
    Fearful,
    Disgusted,
    Surprised,
}

impl Expression {
    pub const ALL: [Expression; 7] = [
        Expression::Neutral,
        Expression::Happy,
        Expression::Sad,
        Expression::Angry,
        Expression::Fearful,
        Expression::Disgusted,
        Expression::Surprised,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Expression::Neutral => "neutral",
            Expression::Happy => "happy",
            Expression::Sad => "sad",
            Expression::Angry => "angry",
            Expression::Fearful => "fearful",
            Expression::Disgusted => "disgusted",
            Expression::Surprised => "surprised",
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Expression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Expression::ALL
            .into_iter()
            .find(|e| e.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown expression label: {s}"))
    }
}

/// Per-face score mapping, iterated in canonical label order.
pub type ExpressionScores = BTreeMap<Expression, f32>;

/// Reduce a score mapping to its dominant label and score.
///
/// The strictly greatest score wins. Equal maxima resolve to the earliest
/// label in canonical order. NaN scores are ignored; returns `None` when no
/// finite-comparable score remains.
pub fn dominant_expression(scores: &ExpressionScores) -> Option<(Expression, f32)> {
    scores
        .iter()
        .filter(|(_, score)| !score.is_nan())
        .fold(None, |best, (&label, &score)| match best {
            Some((_, best_score)) if score <= best_score => best,
            _ => Some((label, score)),
        })
}

/// The latest published dominant emotion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionSample {
    pub label: Expression,
    /// Clamped to `[0, 1]`.
    pub confidence: f32,
    pub captured_at: DateTime<Utc>,
}

impl EmotionSample {
    pub fn new(label: Expression, confidence: f32) -> Self {
        Self::at(label, confidence, Utc::now())
    }

    pub fn at(label: Expression, confidence: f32, captured_at: DateTime<Utc>) -> Self {
        Self {
            label,
            confidence: confidence.clamp(0.0, 1.0),
            captured_at,
        }
    }

    /// Build a sample from a score mapping, or `None` if it has no usable score.
    pub fn from_scores(scores: &ExpressionScores) -> Option<Self> {
        dominant_expression(scores).map(|(label, score)| Self::new(label, score))
    }
}
