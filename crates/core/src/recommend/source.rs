//! Data the engine reads from the portal's store

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::RwLock;

use crate::domain::plan::Plan;
use crate::domain::subscriber::{Subscriber, SubscriberId};
use crate::domain::subscription::TrainingRow;
use crate::domain::usage::UsageRecord;
use crate::errors::ApplicationError;

#[async_trait]
pub trait RecommendationSource: Send + Sync {
    /// Usage records from the last `days` days. Order is irrelevant.
    async fn fetch_usage(
        &self,
        subscriber_id: &SubscriberId,
        days: u32,
    ) -> Result<Vec<UsageRecord>, ApplicationError>;

    /// The full catalog. Its order is the tie-break order for ranking.
    async fn fetch_all_plans(&self) -> Result<Vec<Plan>, ApplicationError>;

    async fn fetch_subscriber(
        &self,
        subscriber_id: &SubscriberId,
    ) -> Result<Option<Subscriber>, ApplicationError>;

    /// Every subscription joined with its subscriber and, when resolvable,
    /// its plan.
    async fn fetch_training_rows(&self) -> Result<Vec<TrainingRow>, ApplicationError>;
}

#[derive(Debug, Default)]
struct SourceState {
    plans: Vec<Plan>,
    subscribers: HashMap<SubscriberId, Subscriber>,
    usage: HashMap<SubscriberId, Vec<UsageRecord>>,
    training_rows: Vec<TrainingRow>,
}

/// Process-local source for tests and demos. `fetch_usage` ignores the day
/// bound so fixed fixture dates never age out.
#[derive(Debug, Default)]
pub struct InMemoryRecommendationSource {
    state: RwLock<SourceState>,
}

impl InMemoryRecommendationSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_plans(&self, plans: Vec<Plan>) {
        self.state.write().await.plans = plans;
    }

    pub async fn insert_subscriber(&self, subscriber: Subscriber) {
        self.state.write().await.subscribers.insert(subscriber.id.clone(), subscriber);
    }

    pub async fn push_usage(&self, records: impl IntoIterator<Item = UsageRecord>) {
        let mut state = self.state.write().await;
        for record in records {
            state.usage.entry(record.subscriber_id.clone()).or_default().push(record);
        }
    }

    pub async fn push_training_row(&self, row: TrainingRow) {
        self.state.write().await.training_rows.push(row);
    }
}

#[async_trait]
impl RecommendationSource for InMemoryRecommendationSource {
    async fn fetch_usage(
        &self,
        subscriber_id: &SubscriberId,
        _days: u32,
    ) -> Result<Vec<UsageRecord>, ApplicationError> {
        Ok(self.state.read().await.usage.get(subscriber_id).cloned().unwrap_or_default())
    }

    async fn fetch_all_plans(&self) -> Result<Vec<Plan>, ApplicationError> {
        Ok(self.state.read().await.plans.clone())
    }

    async fn fetch_subscriber(
        &self,
        subscriber_id: &SubscriberId,
    ) -> Result<Option<Subscriber>, ApplicationError> {
        Ok(self.state.read().await.subscribers.get(subscriber_id).cloned())
    }

    async fn fetch_training_rows(&self) -> Result<Vec<TrainingRow>, ApplicationError> {
        Ok(self.state.read().await.training_rows.clone())
    }
}

/// Earliest date inside a `days`-day lookback ending today, inclusive of
/// both ends.
pub fn lookback_start(days: u32) -> chrono::NaiveDate {
    Utc::now().date_naive() - Duration::days(i64::from(days.saturating_sub(1)))
}
