use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;

use planwise_core::domain::subscriber::{Subscriber, SubscriberId};

use super::{column, RepositoryError, SubscriberRepository};
use crate::DbPool;

pub struct SqlSubscriberRepository {
    pool: DbPool,
}

impl SqlSubscriberRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Accepts RFC 3339 timestamps and bare dates, which read as midnight UTC.
pub(crate) fn parse_signup(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    let trimmed = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| RepositoryError::Decode(format!("signup_at `{value}` is not a timestamp")))
}

pub(crate) fn row_to_subscriber(
    row: &SqliteRow,
    id_column: &str,
) -> Result<Subscriber, RepositoryError> {
    let signup_raw: Option<String> = column(row, "signup_at")?;
    let signup_at = signup_raw
        .filter(|raw| !raw.trim().is_empty())
        .map(|raw| parse_signup(&raw))
        .transpose()?;

    Ok(Subscriber {
        id: SubscriberId(column(row, id_column)?),
        name: column(row, "name")?,
        signup_at,
        city: column(row, "city")?,
        state: column(row, "state")?,
    })
}

#[async_trait::async_trait]
impl SubscriberRepository for SqlSubscriberRepository {
    async fn find_by_id(&self, id: &SubscriberId) -> Result<Option<Subscriber>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, signup_at, city, state FROM subscribers WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(|row| row_to_subscriber(row, "id")).transpose()
    }

    async fn list(&self) -> Result<Vec<Subscriber>, RepositoryError> {
        let rows =
            sqlx::query("SELECT id, name, signup_at, city, state FROM subscribers ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        rows.iter().map(|row| row_to_subscriber(row, "id")).collect()
    }

    async fn save(&self, subscriber: Subscriber) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO subscribers (id, name, signup_at, city, state)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                signup_at = excluded.signup_at,
                city = excluded.city,
                state = excluded.state",
        )
        .bind(&subscriber.id.0)
        .bind(&subscriber.name)
        .bind(subscriber.signup_at.map(|at| at.to_rfc3339()))
        .bind(&subscriber.city)
        .bind(&subscriber.state)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
