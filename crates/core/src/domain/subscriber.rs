use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriberId(pub String);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub name: String,
    pub signup_at: Option<DateTime<Utc>>,
    pub city: Option<String>,
    pub state: Option<String>,
}

impl Subscriber {
    /// Whole days since signup as of `now`. Missing or future signups count
    /// as zero tenure.
    pub fn tenure_days(&self, now: DateTime<Utc>) -> i64 {
        self.signup_at.map(|signup| (now - signup).num_days().max(0)).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{Subscriber, SubscriberId};

    #[test]
    fn tenure_defaults_to_zero_without_signup() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let mut subscriber = Subscriber {
            id: SubscriberId("sub-1".to_string()),
            name: "Casual User".to_string(),
            signup_at: None,
            city: None,
            state: None,
        };
        assert_eq!(subscriber.tenure_days(now), 0);

        subscriber.signup_at = Some(now - Duration::hours(36));
        assert_eq!(subscriber.tenure_days(now), 1);

        subscriber.signup_at = Some(now + Duration::days(3));
        assert_eq!(subscriber.tenure_days(now), 0);
    }
}
