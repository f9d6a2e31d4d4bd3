//! Persistent state for the notification batcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Detection;

/// The pending digest queue for one `(user, severity)` key, stored in the
/// key-value store so multiple server instances share a single queue.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BatchState {
    /// Detections collected since the last flush.
    pub detections: Vec<Detection>,
    /// When the current window opened (first enqueue after a flush).
    pub window_start_time: DateTime<Utc>,
    /// When the scheduled flush is due.
    pub due_at: DateTime<Utc>,
}
