use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Countdown {
    pub target: String,
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
    pub finished: bool,
}

/// Time left until `target`, all zeros once it has passed.
pub fn remaining(target: DateTime<FixedOffset>, now: DateTime<Utc>) -> Countdown {
    let left = target.with_timezone(&Utc) - now;
    let total = left.num_seconds();
    if total <= 0 {
        return Countdown {
            target: target.to_rfc3339(),
            days: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
            finished: true,
        };
    }
    Countdown {
        target: target.to_rfc3339(),
        days: total / 86_400,
        hours: (total % 86_400) / 3_600,
        minutes: (total % 3_600) / 60,
        seconds: total % 60,
        finished: false,
    }
}
