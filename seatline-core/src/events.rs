use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::models::Hold;

/// Published for each row the expiry sweeper releases, so an order system can
/// drop its pending order.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct HoldReleasedEvent {
    pub hold_id: Uuid,
    pub group_token: Uuid,
    pub event_id: String,
    pub seat_code: String,
    pub user_id: String,
    pub expired_at: i64,
    pub released_at: i64,
}

impl HoldReleasedEvent {
    pub fn from_hold(hold: &Hold, released_at: i64) -> Self {
        Self {
            hold_id: hold.id,
            group_token: hold.group_token,
            event_id: hold.event_id.clone(),
            seat_code: hold.seat_code.clone(),
            user_id: hold.user_id.clone(),
            expired_at: hold.expires_at.timestamp(),
            released_at,
        }
    }
}

/// Hook invoked after a sweep commits. Implementations own delivery; the
/// sweeper does not retry.
#[async_trait]
pub trait ReleaseNotifier: Send + Sync {
    async fn holds_released(&self, events: &[HoldReleasedEvent]);
}

/// Default hook: records the release in the log and nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

#[async_trait]
impl ReleaseNotifier for LoggingNotifier {
    async fn holds_released(&self, events: &[HoldReleasedEvent]) {
        for event in events {
            tracing::info!(
                group_token = %event.group_token,
                seat_code = %event.seat_code,
                "Hold expired and released"
            );
        }
    }
}
