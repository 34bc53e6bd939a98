//! Feature engineering shared by scoring, training and inference

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::stats::UsageStatistics;
use crate::domain::plan::{Plan, PlanCategory};
use crate::domain::subscriber::Subscriber;
use crate::domain::subscription::{Subscription, TrainingRow};

/// Keeps `weekend / weekday` finite when weekday usage is zero
pub const RATIO_EPSILON: f64 = 0.001;

/// Numeric classifier inputs, in the order the preprocessor expects them.
pub const NUMERIC_FEATURES: [&str; 9] = [
    "avg_daily_usage",
    "max_daily_usage",
    "usage_std",
    "estimated_monthly_usage",
    "weekday_avg",
    "weekend_avg",
    "usage_consistency",
    "weekend_weekday_ratio",
    "days_since_signup",
];

/// Categorical classifier inputs, in the order the preprocessor expects them.
pub const CATEGORICAL_FEATURES: [&str; 3] = ["city", "state", "usage_category"];

/// Column layout a trained artifact was fitted against.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub numeric: Vec<String>,
    pub categorical: Vec<String>,
}

impl FeatureSchema {
    pub fn current() -> Self {
        Self {
            numeric: NUMERIC_FEATURES.iter().map(|name| name.to_string()).collect(),
            categorical: CATEGORICAL_FEATURES.iter().map(|name| name.to_string()).collect(),
        }
    }
}

/// Monthly usage bucket used as a categorical training feature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageCategory {
    Light,
    Moderate,
    Heavy,
    Extreme,
}

impl UsageCategory {
    pub fn from_monthly_gb(monthly_gb: f64) -> Self {
        if monthly_gb < 50.0 {
            Self::Light
        } else if monthly_gb < 200.0 {
            Self::Moderate
        } else if monthly_gb < 500.0 {
            Self::Heavy
        } else {
            Self::Extreme
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Moderate => "moderate",
            Self::Heavy => "heavy",
            Self::Extreme => "extreme",
        }
    }
}

impl fmt::Display for UsageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Numeric(f64),
    Categorical(String),
}

/// Features that only exist when a target plan is known (training and
/// evaluation). `None` marks an undefined ratio.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanFeatures {
    pub usage_to_limit_ratio: Option<f64>,
    pub price_per_gb: Option<f64>,
    pub speed_efficiency: Option<f64>,
    pub subscription_duration_days: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub usage: UsageStatistics,
    pub days_since_signup: i64,
    pub city: Option<String>,
    pub state: Option<String>,
    pub weekend_weekday_ratio: f64,
    pub usage_category: UsageCategory,
    pub target_plan: Option<PlanFeatures>,
    /// Category of the plan actually chosen; training rows only
    pub label: Option<PlanCategory>,
}

/// Classifier inputs in schema order. `None` is a missing value that the
/// preprocessor imputes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawFeatures {
    pub numeric: Vec<Option<f64>>,
    pub categorical: Vec<Option<String>>,
}

impl FeatureVector {
    /// Flat name -> value view. Undefined ratios are omitted.
    pub fn entries(&self) -> BTreeMap<&'static str, FeatureValue> {
        let mut entries = BTreeMap::new();
        let usage = &self.usage;

        entries.insert("avg_daily_usage", FeatureValue::Numeric(usage.mean_daily_gb));
        entries.insert("max_daily_usage", FeatureValue::Numeric(usage.max_daily_gb));
        entries.insert("usage_std", FeatureValue::Numeric(usage.std_daily_gb));
        entries.insert("estimated_monthly_usage", FeatureValue::Numeric(usage.estimated_monthly_gb));
        entries.insert("weekday_avg", FeatureValue::Numeric(usage.weekday_avg_gb));
        entries.insert("weekend_avg", FeatureValue::Numeric(usage.weekend_avg_gb));
        entries.insert("usage_consistency", FeatureValue::Numeric(usage.consistency));
        entries.insert("weekend_weekday_ratio", FeatureValue::Numeric(self.weekend_weekday_ratio));
        entries.insert("days_since_signup", FeatureValue::Numeric(self.days_since_signup as f64));
        entries.insert(
            "usage_category",
            FeatureValue::Categorical(self.usage_category.as_str().to_string()),
        );

        if let Some(city) = &self.city {
            entries.insert("city", FeatureValue::Categorical(city.clone()));
        }
        if let Some(state) = &self.state {
            entries.insert("state", FeatureValue::Categorical(state.clone()));
        }

        if let Some(plan) = &self.target_plan {
            if let Some(ratio) = plan.usage_to_limit_ratio {
                entries.insert("usage_to_limit_ratio", FeatureValue::Numeric(ratio));
            }
            if let Some(price_per_gb) = plan.price_per_gb {
                entries.insert("price_per_gb", FeatureValue::Numeric(price_per_gb));
            }
            if let Some(efficiency) = plan.speed_efficiency {
                entries.insert("speed_efficiency", FeatureValue::Numeric(efficiency));
            }
            if let Some(duration) = plan.subscription_duration_days {
                entries.insert("subscription_duration", FeatureValue::Numeric(duration as f64));
            }
        }

        if let Some(label) = self.label {
            entries.insert("plan_category", FeatureValue::Categorical(label.as_str().to_string()));
        }

        entries
    }

    /// Inputs for the classifier in [`NUMERIC_FEATURES`] /
    /// [`CATEGORICAL_FEATURES`] order.
    ///
    /// A subscriber with no telemetry has *missing* usage features rather
    /// than zero usage, so the trainer imputes them from the population.
    pub fn raw_features(&self) -> RawFeatures {
        let observed = !self.usage.is_empty();
        let usage = |value: f64| (observed && value.is_finite()).then_some(value);

        RawFeatures {
            numeric: vec![
                usage(self.usage.mean_daily_gb),
                usage(self.usage.max_daily_gb),
                usage(self.usage.std_daily_gb),
                usage(self.usage.estimated_monthly_gb),
                usage(self.usage.weekday_avg_gb),
                usage(self.usage.weekend_avg_gb),
                usage(self.usage.consistency),
                usage(self.weekend_weekday_ratio),
                Some(self.days_since_signup as f64),
            ],
            categorical: vec![
                non_blank(self.city.as_deref()),
                non_blank(self.state.as_deref()),
                observed.then(|| self.usage_category.as_str().to_string()),
            ],
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|value| !value.is_empty()).map(str::to_string)
}

/// Builds [`FeatureVector`]s relative to a fixed "now".
#[derive(Debug, Clone, Copy)]
pub struct FeatureEngineer {
    now: DateTime<Utc>,
}

impl FeatureEngineer {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    pub fn now() -> Self {
        Self::new(Utc::now())
    }

    /// Inference-time features. An unknown subscriber contributes zero
    /// tenure and no locality.
    pub fn for_subscriber(
        &self,
        subscriber: Option<&Subscriber>,
        usage: &UsageStatistics,
    ) -> FeatureVector {
        FeatureVector {
            usage: *usage,
            days_since_signup: subscriber.map(|s| s.tenure_days(self.now)).unwrap_or(0),
            city: subscriber.and_then(|s| s.city.clone()),
            state: subscriber.and_then(|s| s.state.clone()),
            weekend_weekday_ratio: usage.weekend_avg_gb / (usage.weekday_avg_gb + RATIO_EPSILON),
            usage_category: UsageCategory::from_monthly_gb(usage.estimated_monthly_gb),
            target_plan: None,
            label: None,
        }
    }

    /// Training-time features: subscriber features plus the chosen plan's
    /// ratios and its category as the label. The label is `None` when the
    /// plan could not be resolved.
    pub fn for_training(&self, row: &TrainingRow, usage: &UsageStatistics) -> FeatureVector {
        let mut features = self.for_subscriber(Some(&row.subscriber), usage);
        if let Some(plan) = &row.plan {
            features.target_plan = Some(self.plan_features(plan, usage, Some(&row.subscription)));
            features.label = Some(plan.category);
        }
        features
    }

    pub fn plan_features(
        &self,
        plan: &Plan,
        usage: &UsageStatistics,
        subscription: Option<&Subscription>,
    ) -> PlanFeatures {
        let usage_to_limit_ratio = plan
            .allowance
            .effective_cap_gb()
            .filter(|cap| *cap > 0.0)
            .map(|cap| usage.estimated_monthly_gb / cap);

        PlanFeatures {
            usage_to_limit_ratio,
            price_per_gb: plan.price_per_gb(),
            speed_efficiency: plan.speed_efficiency(),
            subscription_duration_days: subscription.and_then(Subscription::duration_days),
        }
    }
}
