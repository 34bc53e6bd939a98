use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::subscriber::SubscriberId;

/// One day of consumption telemetry. Days without a record had no
/// recorded consumption; they are never zero-filled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub subscriber_id: SubscriberId,
    pub date: NaiveDate,
    pub data_used_gb: f64,
    pub peak_gb: Option<f64>,
    pub off_peak_gb: Option<f64>,
    pub upload_gb: Option<f64>,
    pub average_speed_mbps: Option<f64>,
}

impl UsageRecord {
    pub fn new(subscriber_id: SubscriberId, date: NaiveDate, data_used_gb: f64) -> Self {
        Self {
            subscriber_id,
            date,
            data_used_gb,
            peak_gb: None,
            off_peak_gb: None,
            upload_gb: None,
            average_speed_mbps: None,
        }
    }
}
