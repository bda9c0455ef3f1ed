use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// One sentiment reading from the mood-history endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodPoint {
    /// Sentiment polarity in `[-1, 1]`.
    pub score: f32,
    #[serde(alias = "time", deserialize_with = "utc_or_naive")]
    pub timestamp: DateTime<Utc>,
}

impl MoodPoint {
    /// Bar height as a percentage, mapping `[-1, 1]` onto `[10, 100]`.
    pub fn chart_height(&self) -> f32 {
        (self.score.clamp(-1.0, 1.0) + 1.0) / 2.0 * 90.0 + 10.0
    }
}

// The backend emits naive UTC timestamps without an offset.
fn utc_or_naive<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}

/// Aggregate view over a mood history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoodSummary {
    pub bars: Vec<f32>,
    /// Mean mood on a 0-10 scale; `None` for an empty history.
    pub average: Option<f32>,
}

impl MoodSummary {
    pub fn from_points(points: &[MoodPoint]) -> Self {
        let bars = points.iter().map(MoodPoint::chart_height).collect();
        let average = if points.is_empty() {
            None
        } else {
            let mean = points.iter().map(|p| p.score).sum::<f32>() / points.len() as f32;
            Some((mean + 1.0) / 2.0 * 10.0)
        };
        Self { bars, average }
    }
}
