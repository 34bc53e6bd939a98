use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;

use planwise_core::domain::subscriber::SubscriberId;
use planwise_core::domain::usage::UsageRecord;

use super::{column, parse_date, RepositoryError, UsageRepository};
use crate::DbPool;

pub struct SqlUsageRepository {
    pool: DbPool,
}

impl SqlUsageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_usage(row: &SqliteRow) -> Result<UsageRecord, RepositoryError> {
    let usage_date: String = column(row, "usage_date")?;

    Ok(UsageRecord {
        subscriber_id: SubscriberId(column(row, "subscriber_id")?),
        date: parse_date(&usage_date, "usage_date")?,
        data_used_gb: column(row, "data_used_gb")?,
        peak_gb: column(row, "peak_gb")?,
        off_peak_gb: column(row, "off_peak_gb")?,
        upload_gb: column(row, "upload_gb")?,
        average_speed_mbps: column(row, "average_speed_mbps")?,
    })
}

#[async_trait::async_trait]
impl UsageRepository for SqlUsageRepository {
    async fn save_batch(&self, records: &[UsageRecord]) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for record in records {
            let result = sqlx::query(
                "INSERT INTO usage_records
                    (subscriber_id, usage_date, data_used_gb, peak_gb, off_peak_gb,
                     upload_gb, average_speed_mbps)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(subscriber_id, usage_date) DO NOTHING",
            )
            .bind(&record.subscriber_id.0)
            .bind(record.date.to_string())
            .bind(record.data_used_gb)
            .bind(record.peak_gb)
            .bind(record.off_peak_gb)
            .bind(record.upload_gb)
            .bind(record.average_speed_mbps)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }

    async fn list_since(
        &self,
        subscriber_id: &SubscriberId,
        since: NaiveDate,
    ) -> Result<Vec<UsageRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT subscriber_id, usage_date, data_used_gb, peak_gb, off_peak_gb,
                    upload_gb, average_speed_mbps
             FROM usage_records
             WHERE subscriber_id = ? AND usage_date >= ?
             ORDER BY usage_date ASC",
        )
        .bind(&subscriber_id.0)
        .bind(since.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_usage).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use planwise_core::domain::subscriber::{Subscriber, SubscriberId};
    use planwise_core::domain::usage::UsageRecord;

    use super::SqlUsageRepository;
    use crate::repositories::{SqlSubscriberRepository, SubscriberRepository, UsageRepository};
    use crate::{connect_with_settings, migrations};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, d).expect("valid date")
    }

    #[tokio::test]
    async fn save_batch_skips_duplicate_days_and_filters_by_window() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let subscriber_id = SubscriberId("sub-001".to_string());
        SqlSubscriberRepository::new(pool.clone())
            .save(Subscriber {
                id: subscriber_id.clone(),
                name: "Gamer User 5".to_string(),
                signup_at: None,
                city: None,
                state: None,
            })
            .await
            .expect("save subscriber");

        let repo = SqlUsageRepository::new(pool);
        let mut peak = UsageRecord::new(subscriber_id.clone(), day(3), 7.5);
        peak.peak_gb = Some(5.0);
        let records = vec![
            UsageRecord::new(subscriber_id.clone(), day(1), 4.0),
            UsageRecord::new(subscriber_id.clone(), day(2), 6.0),
            peak,
        ];

        assert_eq!(repo.save_batch(&records).await.expect("first batch"), 3);
        assert_eq!(repo.save_batch(&records[..1]).await.expect("duplicate batch"), 0);

        let recent = repo.list_since(&subscriber_id, day(2)).await.expect("list");
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].date, day(2));
        assert_eq!(recent[1].peak_gb, Some(5.0));
    }
}
