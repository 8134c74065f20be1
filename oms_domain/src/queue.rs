use serde::{Deserialize, Serialize};

use crate::{AccountId, CommandId, PositionId, QueueItemId};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Queued,
    Processing,
    Done,
    Failed,
}

/// One `command_queue` row (spec.md §3 `QueueItem`). `attempts` increments
/// on every claim; the queue worker marks the row `Failed` (with backoff,
/// re-queued as `Queued`) until `attempts` reaches the configured max, at
/// which point it is marked dead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: QueueItemId,
    pub account_id: AccountId,
    pub pool_id: String,
    pub command_id: CommandId,
    pub status: QueueStatus,
    pub attempts: i32,
    pub available_at: chrono::DateTime<chrono::Utc>,
    pub locked_by: Option<String>,
    pub locked_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// At most one live lock per `position_id` (spec.md §3 `PositionCloseLocks`,
/// §4.5 `close_position`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseLock {
    pub account_id: AccountId,
    pub position_id: PositionId,
    pub request_id: Option<String>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_status_serializes_snake_case() {
        let json = serde_json::to_string(&QueueStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
    }
}
