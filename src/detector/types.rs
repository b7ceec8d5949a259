//! Change detection types

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a yes-token move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// A named time horizon with its own alert threshold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    /// Name as configured, e.g. "5m"
    pub name: String,
    /// Horizon length
    pub duration: Duration,
    /// Minimum absolute move on both tokens to alert
    pub threshold: Decimal,
}

impl Bucket {
    pub fn new(name: impl Into<String>, duration: Duration, threshold: Decimal) -> Self {
        Self {
            name: name.into(),
            duration,
            threshold,
        }
    }

    /// Build a bucket from a horizon name like "30m", "6h" or "1w"
    pub fn parse(name: &str, threshold: Decimal) -> Option<Self> {
        parse_horizon(name).map(|duration| Self::new(name, duration, threshold))
    }
}

/// Parse "<n><unit>" with unit in s, m, h, d, w
pub fn parse_horizon(name: &str) -> Option<Duration> {
    let name = name.trim();
    let unit = name.chars().last()?;
    let count: i64 = name[..name.len() - unit.len_utf8()].parse().ok()?;
    if count <= 0 {
        return None;
    }
    match unit {
        's' => Duration::try_seconds(count),
        'm' => Duration::try_minutes(count),
        'h' => Duration::try_hours(count),
        'd' => Duration::try_days(count),
        'w' => Duration::try_weeks(count),
        _ => None,
    }
}

/// Last price an alert fired at for one (market, bucket)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    pub yes: Decimal,
    pub no: Decimal,
    /// Sample time of the triggering price
    pub set_at: DateTime<Utc>,
}

/// A detected price move, consumed by the dispatcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub condition_id: String,
    pub question: String,
    pub bucket: String,
    pub old_yes: Decimal,
    pub old_no: Decimal,
    pub new_yes: Decimal,
    pub new_no: Decimal,
    pub direction: Direction,
    /// Sample time of the new price
    pub observed_at: DateTime<Utc>,
}

impl AlertEvent {
    /// Signed yes-token change
    pub fn yes_delta(&self) -> Decimal {
        self.new_yes - self.old_yes
    }
}
