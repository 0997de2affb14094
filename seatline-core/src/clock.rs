use chrono::{DateTime, Duration, FixedOffset, Utc};
use chrono_tz::Tz;
use std::sync::Mutex;

/// Time source for every expiry decision. Instants are kept in UTC; the zone
/// only affects how timestamps are rendered to callers.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn time_zone(&self) -> Tz;

    fn localize(&self, at: DateTime<Utc>) -> DateTime<FixedOffset> {
        at.with_timezone(&self.time_zone()).fixed_offset()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Parse an IANA zone name such as `Asia/Kolkata`.
    pub fn from_zone_name(name: &str) -> Result<Self, String> {
        let tz: Tz = name
            .parse()
            .map_err(|_| format!("unknown time zone: {}", name))?;
        Ok(Self::new(tz))
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new(Tz::UTC)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn time_zone(&self) -> Tz {
        self.tz
    }
}

/// Clock that only moves when told to. Used by tests to step past hold expiry.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    tz: Tz,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self::with_zone(start, Tz::UTC)
    }

    pub fn with_zone(start: DateTime<Utc>, tz: Tz) -> Self {
        Self {
            now: Mutex::new(start),
            tz,
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn time_zone(&self) -> Tz {
        self.tz
    }
}
