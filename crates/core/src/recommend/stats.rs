//! Summary statistics over a window of daily usage telemetry

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::domain::usage::UsageRecord;

/// Days used to project a daily mean onto a billing month
pub const DAYS_PER_MONTH: f64 = 30.0;

/// Below this many records the weekday/weekend split is not trusted
pub const MIN_RECORDS_FOR_WEEKLY_SPLIT: usize = 8;

/// Derived, per-request statistics for one subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageStatistics {
    /// Records that fell inside the window
    pub record_count: usize,
    pub mean_daily_gb: f64,
    pub max_daily_gb: f64,
    /// Sample standard deviation (n - 1)
    pub std_daily_gb: f64,
    /// `mean_daily_gb * 30`, regardless of how many days were observed
    pub estimated_monthly_gb: f64,
    pub weekday_avg_gb: f64,
    pub weekend_avg_gb: f64,
    /// 1.0 = perfectly uniform usage, 0.0 when std >= mean or mean = 0
    pub consistency: f64,
}

impl UsageStatistics {
    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    /// Coefficient of variation, 0 when the mean is 0.
    pub fn volatility(&self) -> f64 {
        if self.mean_daily_gb > 0.0 {
            self.std_daily_gb / self.mean_daily_gb
        } else {
            0.0
        }
    }

    pub fn peak_monthly_gb(&self) -> f64 {
        self.max_daily_gb * DAYS_PER_MONTH
    }
}

/// Reduces usage records into [`UsageStatistics`] over a trailing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageStatisticsCalculator {
    window_days: u32,
}

impl UsageStatisticsCalculator {
    pub fn new(window_days: u32) -> Self {
        Self { window_days: window_days.max(1) }
    }

    pub fn window_days(&self) -> u32 {
        self.window_days
    }

    /// Calculate statistics for the `window_days` calendar days ending at the
    /// most recent record. Input order does not matter.
    pub fn calculate(&self, records: &[UsageRecord]) -> UsageStatistics {
        let window = self.window(records);
        if window.is_empty() {
            return UsageStatistics::default();
        }

        let values: Vec<f64> = window.iter().map(|(_, gb)| *gb).collect();
        let mean = mean(&values);
        let max = values.iter().copied().fold(f64::MIN, f64::max);
        let std = sample_std(&values, mean);

        let (weekday_avg, weekend_avg) = if values.len() < MIN_RECORDS_FOR_WEEKLY_SPLIT {
            (mean, mean)
        } else {
            let (weekend, weekday): (Vec<_>, Vec<_>) =
                window.iter().partition(|(date, _)| is_weekend(*date));
            let weekday: Vec<f64> = weekday.into_iter().map(|(_, gb)| gb).collect();
            let weekend: Vec<f64> = weekend.into_iter().map(|(_, gb)| gb).collect();
            (mean_or(&weekday, mean), mean_or(&weekend, mean))
        };

        UsageStatistics {
            record_count: values.len(),
            mean_daily_gb: mean,
            max_daily_gb: max,
            std_daily_gb: std,
            estimated_monthly_gb: mean * DAYS_PER_MONTH,
            weekday_avg_gb: weekday_avg,
            weekend_avg_gb: weekend_avg,
            consistency: consistency(mean, std),
        }
    }

    fn window(&self, records: &[UsageRecord]) -> Vec<(NaiveDate, f64)> {
        let mut readings: Vec<(NaiveDate, f64)> = records
            .iter()
            .filter(|record| record.data_used_gb.is_finite())
            .map(|record| (record.date, record.data_used_gb))
            .collect();
        readings.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.total_cmp(&b.1)));

        let Some(&(latest, _)) = readings.last() else {
            return readings;
        };
        let cutoff = latest - Duration::days(i64::from(self.window_days) - 1);
        readings.retain(|(date, _)| *date >= cutoff);
        readings
    }
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn mean_or(values: &[f64], fallback: f64) -> f64 {
    if values.is_empty() {
        fallback
    } else {
        mean(values)
    }
}

fn sample_std(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let sum_sq: f64 = values.iter().map(|value| (value - mean).powi(2)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

fn consistency(mean: f64, std: f64) -> f64 {
    if mean <= 0.0 {
        return 0.0;
    }
    (1.0 - std / mean).clamp(0.0, 1.0)
}
