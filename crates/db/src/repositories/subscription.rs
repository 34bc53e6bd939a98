use std::str::FromStr;

use sqlx::sqlite::SqliteRow;

use planwise_core::domain::plan::PlanId;
use planwise_core::domain::subscriber::SubscriberId;
use planwise_core::domain::subscription::{
    Subscription, SubscriptionId, SubscriptionStatus, TrainingRow,
};

use super::plan::row_to_plan;
use super::subscriber::row_to_subscriber;
use super::{column, parse_optional_date, RepositoryError, SubscriptionRepository};
use crate::DbPool;

pub struct SqlSubscriptionRepository {
    pool: DbPool,
}

impl SqlSubscriptionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_subscription(
    row: &SqliteRow,
    id_column: &str,
    plan_column: &str,
) -> Result<Subscription, RepositoryError> {
    let status_raw: String = column(row, "status")?;
    let status = SubscriptionStatus::from_str(&status_raw)
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let plan_id: Option<String> = column(row, plan_column)?;

    Ok(Subscription {
        id: SubscriptionId(column(row, id_column)?),
        subscriber_id: SubscriberId(column(row, "subscriber_id")?),
        plan_id: plan_id.map(PlanId),
        start_date: parse_optional_date(column(row, "start_date")?, "start_date")?,
        end_date: parse_optional_date(column(row, "end_date")?, "end_date")?,
        status,
    })
}

#[async_trait::async_trait]
impl SubscriptionRepository for SqlSubscriptionRepository {
    async fn save(&self, subscription: Subscription) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO subscriptions (id, subscriber_id, plan_id, start_date, end_date, status)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                plan_id = excluded.plan_id,
                start_date = excluded.start_date,
                end_date = excluded.end_date,
                status = excluded.status",
        )
        .bind(&subscription.id.0)
        .bind(&subscription.subscriber_id.0)
        .bind(subscription.plan_id.as_ref().map(|id| id.0.as_str()))
        .bind(subscription.start_date.map(|date| date.to_string()))
        .bind(subscription.end_date.map(|date| date.to_string()))
        .bind(subscription.status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_for_subscriber(
        &self,
        subscriber_id: &SubscriberId,
    ) -> Result<Vec<Subscription>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, subscriber_id, plan_id, start_date, end_date, status
             FROM subscriptions
             WHERE subscriber_id = ?
             ORDER BY start_date ASC, id ASC",
        )
        .bind(&subscriber_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| row_to_subscription(row, "id", "plan_id")).collect()
    }

    async fn list_training_rows(&self) -> Result<Vec<TrainingRow>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT s.id AS subscription_id, s.subscriber_id, s.plan_id AS subscription_plan_id,
                    s.start_date, s.end_date, s.status,
                    u.name, u.signup_at, u.city, u.state,
                    p.id AS plan_id, p.name AS plan_name,
                    p.download_mbps AS plan_download_mbps, p.upload_mbps AS plan_upload_mbps,
                    p.data_limit_gb AS plan_data_limit_gb, p.is_unlimited AS plan_is_unlimited,
                    p.price AS plan_price, p.validity_days AS plan_validity_days,
                    p.category AS plan_category
             FROM subscriptions s
             JOIN subscribers u ON u.id = s.subscriber_id
             LEFT JOIN plans p ON p.id = s.plan_id
             ORDER BY s.subscriber_id ASC, s.id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<TrainingRow, RepositoryError> {
                let joined_plan: Option<String> = column(row, "plan_id")?;
                let plan = match joined_plan {
                    Some(_) => Some(row_to_plan(row, "plan_")?),
                    None => None,
                };
                Ok(TrainingRow {
                    subscriber: row_to_subscriber(row, "subscriber_id")?,
                    subscription: row_to_subscription(
                        row,
                        "subscription_id",
                        "subscription_plan_id",
                    )?,
                    plan,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use planwise_core::domain::plan::{DataAllowance, Plan, PlanCategory, PlanId};
    use planwise_core::domain::subscriber::{Subscriber, SubscriberId};
    use planwise_core::domain::subscription::{Subscription, SubscriptionId, SubscriptionStatus};

    use super::SqlSubscriptionRepository;
    use crate::repositories::{
        PlanRepository, SqlPlanRepository, SqlSubscriberRepository, SubscriberRepository,
        SubscriptionRepository,
    };
    use crate::{connect_with_settings, migrations};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    async fn seeded_pool() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        SqlPlanRepository::new(pool.clone())
            .save(Plan {
                id: PlanId("family-connect".to_string()),
                name: "Family Connect".to_string(),
                download_mbps: 100.0,
                upload_mbps: Some(20.0),
                allowance: DataAllowance::Capped { gb: 200.0 },
                price: Decimal::new(699, 0),
                validity_days: 30,
                category: PlanCategory::Standard,
            })
            .await
            .expect("save plan");
        SqlSubscriberRepository::new(pool.clone())
            .save(Subscriber {
                id: SubscriberId("sub-001".to_string()),
                name: "Family User 1".to_string(),
                signup_at: None,
                city: Some("Delhi".to_string()),
                state: Some("Delhi".to_string()),
            })
            .await
            .expect("save subscriber");
        pool
    }

    fn subscription(id: &str, plan: Option<&str>, status: SubscriptionStatus) -> Subscription {
        Subscription {
            id: SubscriptionId(id.to_string()),
            subscriber_id: SubscriberId("sub-001".to_string()),
            plan_id: plan.map(|plan| PlanId(plan.to_string())),
            start_date: Some(date(2025, 1, 1)),
            end_date: Some(date(2025, 1, 31)),
            status,
        }
    }

    #[tokio::test]
    async fn training_rows_join_plan_when_present() {
        let pool = seeded_pool().await;
        let repo = SqlSubscriptionRepository::new(pool);
        repo.save(subscription("s-1", Some("family-connect"), SubscriptionStatus::Expired))
            .await
            .expect("save s-1");
        repo.save(subscription("s-2", None, SubscriptionStatus::Active)).await.expect("save s-2");

        let rows = repo.list_training_rows().await.expect("training rows");
        assert_eq!(rows.len(), 2);

        let with_plan = &rows[0];
        assert_eq!(with_plan.subscription.id.0, "s-1");
        assert_eq!(with_plan.subscriber.city.as_deref(), Some("Delhi"));
        assert_eq!(
            with_plan.plan.as_ref().map(|plan| plan.category),
            Some(PlanCategory::Standard)
        );
        assert_eq!(with_plan.subscription.duration_days(), Some(30));

        assert!(rows[1].plan.is_none());
        assert_eq!(rows[1].subscription.status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn list_for_subscriber_orders_by_start_date() {
        let pool = seeded_pool().await;
        let repo = SqlSubscriptionRepository::new(pool);

        let mut later = subscription("s-b", Some("family-connect"), SubscriptionStatus::Active);
        later.start_date = Some(date(2025, 3, 1));
        later.end_date = None;
        repo.save(later).await.expect("save later");
        repo.save(subscription("s-a", Some("family-connect"), SubscriptionStatus::Cancelled))
            .await
            .expect("save earlier");

        let ids: Vec<String> = repo
            .list_for_subscriber(&SubscriberId("sub-001".to_string()))
            .await
            .expect("list")
            .into_iter()
            .map(|subscription| subscription.id.0)
            .collect();
        assert_eq!(ids, vec!["s-a", "s-b"]);
    }
}
