use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Default seat price when a seat definition omits one (250.00).
pub const DEFAULT_PRICE_CENTS: i64 = 25_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A seat of an event. Identity is `(event_id, seat_code)`; `id` is the storage key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub id: Uuid,
    pub event_id: String,
    pub seat_code: String,
    pub section: Option<String>,
    pub row_label: Option<String>,
    pub seat_number: i32,
    pub price_cents: i64,
}

/// Seat definition as submitted to `add_seats`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewSeat {
    pub seat_code: String,
    pub section: Option<String>,
    pub row_label: Option<String>,
    pub seat_number: Option<i32>,
    pub price_cents: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HoldStatus {
    Hold,
    Allocated,
    Released,
}

impl HoldStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HoldStatus::Hold => "HOLD",
            HoldStatus::Allocated => "ALLOCATED",
            HoldStatus::Released => "RELEASED",
        }
    }
}

impl fmt::Display for HoldStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HoldStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HOLD" => Ok(HoldStatus::Hold),
            "ALLOCATED" => Ok(HoldStatus::Allocated),
            "RELEASED" => Ok(HoldStatus::Released),
            other => Err(format!("unknown hold status: {}", other)),
        }
    }
}

/// One row of the hold ledger: a claim by one user on one seat.
///
/// Rows are never deleted. A row moves HOLD -> ALLOCATED or HOLD -> RELEASED
/// and then stays put.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hold {
    pub id: Uuid,
    pub seat_id: Uuid,
    pub event_id: String,
    pub seat_code: String,
    pub user_id: String,
    pub group_token: Uuid,
    pub status: HoldStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub allocated_at: Option<DateTime<Utc>>,
    pub order_id: Option<String>,
    pub idempotency_key: Option<String>,
}

impl Hold {
    /// A HOLD row whose expiry is at or before `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == HoldStatus::Hold && self.expires_at <= now
    }

    /// Whether this row blocks other reservations of the same seat at `now`.
    /// ALLOCATED is always live, HOLD only until it expires.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            HoldStatus::Allocated => true,
            HoldStatus::Hold => self.expires_at > now,
            HoldStatus::Released => false,
        }
    }
}

/// Result of a reserve call. Replays of the same idempotency key return the
/// same token, expiry and seat list with `replayed` set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub group_token: Uuid,
    pub expires_at: DateTime<Utc>,
    pub seat_codes: Vec<String>,
    pub replayed: bool,
}

impl Reservation {
    pub(crate) fn from_group(holds: &[Hold], replayed: bool) -> Option<Self> {
        let first = holds.first()?;
        let mut seat_codes: Vec<String> = holds.iter().map(|h| h.seat_code.clone()).collect();
        seat_codes.sort();
        Some(Self {
            group_token: first.group_token,
            expires_at: first.expires_at,
            seat_codes,
            replayed,
        })
    }
}

/// Effective status of a seat as shown to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatState {
    Available,
    Hold,
    Allocated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatStatusView {
    pub seat_id: Uuid,
    pub seat_code: String,
    pub section: Option<String>,
    pub row_label: Option<String>,
    pub seat_number: i32,
    pub price_cents: i64,
    pub status: SeatState,
    pub group_token: Option<Uuid>,
    pub user_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub order_id: Option<String>,
    pub allocated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn hold(status: HoldStatus, expires_at: DateTime<Utc>) -> Hold {
        Hold {
            id: Uuid::new_v4(),
            seat_id: Uuid::new_v4(),
            event_id: "evt-1".to_string(),
            seat_code: "A1".to_string(),
            user_id: "user-1".to_string(),
            group_token: Uuid::new_v4(),
            status,
            created_at: expires_at - Duration::seconds(90),
            expires_at,
            allocated_at: None,
            order_id: None,
            idempotency_key: None,
        }
    }

    #[test]
    fn test_liveness_rules() {
        let now = Utc::now();
        let past = now - Duration::seconds(1);

        assert!(hold(HoldStatus::Hold, now + Duration::seconds(1)).is_live(now));
        assert!(!hold(HoldStatus::Hold, past).is_live(now));
        // Expiry instant itself counts as expired
        assert!(!hold(HoldStatus::Hold, now).is_live(now));
        assert!(hold(HoldStatus::Hold, now).is_expired(now));

        assert!(hold(HoldStatus::Allocated, past).is_live(now));
        assert!(!hold(HoldStatus::Allocated, past).is_expired(now));
        assert!(!hold(HoldStatus::Released, now + Duration::seconds(30)).is_live(now));
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in [HoldStatus::Hold, HoldStatus::Allocated, HoldStatus::Released] {
            assert_eq!(status.as_str().parse::<HoldStatus>().unwrap(), status);
        }
        assert!("PENDING".parse::<HoldStatus>().is_err());
    }

    #[test]
    fn test_reservation_seat_codes_sorted() {
        let now = Utc::now();
        let mut a = hold(HoldStatus::Hold, now);
        a.seat_code = "B2".to_string();
        let mut b = a.clone();
        b.seat_code = "A1".to_string();

        let reservation = Reservation::from_group(&[a, b], false).unwrap();
        assert_eq!(reservation.seat_codes, vec!["A1", "B2"]);
        assert!(Reservation::from_group(&[], true).is_none());
    }
}
