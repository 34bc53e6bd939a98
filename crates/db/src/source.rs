//! SQLite-backed [`RecommendationSource`].

use async_trait::async_trait;

use planwise_core::domain::plan::Plan;
use planwise_core::domain::subscriber::{Subscriber, SubscriberId};
use planwise_core::domain::subscription::TrainingRow;
use planwise_core::domain::usage::UsageRecord;
use planwise_core::errors::ApplicationError;
use planwise_core::recommend::source::{lookback_start, RecommendationSource};

use crate::repositories::{
    PlanRepository, SqlPlanRepository, SqlSubscriberRepository, SqlSubscriptionRepository,
    SqlUsageRepository, SubscriberRepository, SubscriptionRepository, UsageRepository,
};
use crate::DbPool;

pub struct SqlRecommendationSource {
    plans: SqlPlanRepository,
    subscribers: SqlSubscriberRepository,
    subscriptions: SqlSubscriptionRepository,
    usage: SqlUsageRepository,
}

impl SqlRecommendationSource {
    pub fn new(pool: DbPool) -> Self {
        Self {
            plans: SqlPlanRepository::new(pool.clone()),
            subscribers: SqlSubscriberRepository::new(pool.clone()),
            subscriptions: SqlSubscriptionRepository::new(pool.clone()),
            usage: SqlUsageRepository::new(pool),
        }
    }
}

#[async_trait]
impl RecommendationSource for SqlRecommendationSource {
    async fn fetch_usage(
        &self,
        subscriber_id: &SubscriberId,
        days: u32,
    ) -> Result<Vec<UsageRecord>, ApplicationError> {
        Ok(self.usage.list_since(subscriber_id, lookback_start(days)).await?)
    }

    async fn fetch_all_plans(&self) -> Result<Vec<Plan>, ApplicationError> {
        Ok(self.plans.list_all().await?)
    }

    async fn fetch_subscriber(
        &self,
        subscriber_id: &SubscriberId,
    ) -> Result<Option<Subscriber>, ApplicationError> {
        Ok(self.subscribers.find_by_id(subscriber_id).await?)
    }

    async fn fetch_training_rows(&self) -> Result<Vec<TrainingRow>, ApplicationError> {
        Ok(self.subscriptions.list_training_rows().await?)
    }
}
