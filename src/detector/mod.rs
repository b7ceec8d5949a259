//! Change detection module
//!
//! Compares each tracked market's latest yes/no prices against a per-bucket
//! reference and raises an alert when both tokens moved past the threshold
//! in opposite directions.

mod change;
mod types;

pub use change::{classify_move, ChangeDetector};
pub use types::{parse_horizon, AlertEvent, Bucket, Direction, Watermark};
