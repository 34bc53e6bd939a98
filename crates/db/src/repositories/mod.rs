use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite};
use thiserror::Error;

use planwise_core::domain::plan::{Plan, PlanId};
use planwise_core::domain::subscriber::{Subscriber, SubscriberId};
use planwise_core::domain::subscription::{Subscription, TrainingRow};
use planwise_core::domain::usage::UsageRecord;
use planwise_core::errors::ApplicationError;

pub mod plan;
pub mod subscriber;
pub mod subscription;
pub mod usage;

pub use plan::SqlPlanRepository;
pub use subscriber::SqlSubscriberRepository;
pub use subscription::SqlSubscriptionRepository;
pub use usage::SqlUsageRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        ApplicationError::Persistence(value.to_string())
    }
}

#[async_trait]
pub trait PlanRepository: Send + Sync {
    /// Catalog ordered by price, then id.
    async fn list_all(&self) -> Result<Vec<Plan>, RepositoryError>;
    async fn find_by_id(&self, id: &PlanId) -> Result<Option<Plan>, RepositoryError>;
    async fn save(&self, plan: Plan) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait SubscriberRepository: Send + Sync {
    async fn find_by_id(&self, id: &SubscriberId) -> Result<Option<Subscriber>, RepositoryError>;
    async fn list(&self) -> Result<Vec<Subscriber>, RepositoryError>;
    async fn save(&self, subscriber: Subscriber) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn save(&self, subscription: Subscription) -> Result<(), RepositoryError>;
    async fn list_for_subscriber(
        &self,
        subscriber_id: &SubscriberId,
    ) -> Result<Vec<Subscription>, RepositoryError>;
    /// Every subscription joined with its subscriber and, when it still
    /// exists, its plan.
    async fn list_training_rows(&self) -> Result<Vec<TrainingRow>, RepositoryError>;
}

#[async_trait]
pub trait UsageRepository: Send + Sync {
    /// Inserts records, skipping any day already recorded for the
    /// subscriber. Returns the number of rows written.
    async fn save_batch(&self, records: &[UsageRecord]) -> Result<u64, RepositoryError>;
    async fn list_since(
        &self,
        subscriber_id: &SubscriberId,
        since: NaiveDate,
    ) -> Result<Vec<UsageRecord>, RepositoryError>;
}

pub(crate) fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name).map_err(|e| RepositoryError::Decode(e.to_string()))
}

pub(crate) fn parse_date(value: &str, field: &str) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| RepositoryError::Decode(format!("{field} `{value}`: {e}")))
}

pub(crate) fn parse_optional_date(
    value: Option<String>,
    field: &str,
) -> Result<Option<NaiveDate>, RepositoryError> {
    value.filter(|raw| !raw.trim().is_empty()).map(|raw| parse_date(&raw, field)).transpose()
}
