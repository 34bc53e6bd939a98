use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;

use planwise_core::domain::plan::{DataAllowance, Plan, PlanCategory, PlanId};

use super::{column, PlanRepository, RepositoryError};
use crate::DbPool;

const PLAN_COLUMNS: &str = "id, name, download_mbps, upload_mbps, data_limit_gb, is_unlimited,
                            price, validity_days, category";

pub struct SqlPlanRepository {
    pool: DbPool,
}

impl SqlPlanRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Decodes a plan whose columns carry `prefix`, so joined queries can alias
/// them as `plan_id`, `plan_name`, and so on.
pub(crate) fn row_to_plan(row: &SqliteRow, prefix: &str) -> Result<Plan, RepositoryError> {
    let col = |name: &str| format!("{prefix}{name}");

    let id: String = column(row, &col("id"))?;
    let data_limit_gb: Option<f64> = column(row, &col("data_limit_gb"))?;
    let is_unlimited: bool = column(row, &col("is_unlimited"))?;
    let allowance = if is_unlimited {
        DataAllowance::Unlimited { fair_use_gb: data_limit_gb }
    } else {
        let gb = data_limit_gb.ok_or_else(|| {
            RepositoryError::Decode(format!("plan `{id}` is capped but has no data limit"))
        })?;
        DataAllowance::Capped { gb }
    };

    let price_raw: String = column(row, &col("price"))?;
    let price = Decimal::from_str(price_raw.trim())
        .map_err(|e| RepositoryError::Decode(format!("plan `{id}` price `{price_raw}`: {e}")))?;

    let category_raw: String = column(row, &col("category"))?;
    let category = PlanCategory::from_str(&category_raw)
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let validity_days: i64 = column(row, &col("validity_days"))?;

    Ok(Plan {
        id: PlanId(id),
        name: column(row, &col("name"))?,
        download_mbps: column(row, &col("download_mbps"))?,
        upload_mbps: column(row, &col("upload_mbps"))?,
        allowance,
        price,
        validity_days: u32::try_from(validity_days).unwrap_or(0),
        category,
    })
}

#[async_trait::async_trait]
impl PlanRepository for SqlPlanRepository {
    async fn list_all(&self) -> Result<Vec<Plan>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {PLAN_COLUMNS} FROM plans ORDER BY CAST(price AS REAL) ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut plans = Vec::with_capacity(rows.len());
        for row in &rows {
            match row_to_plan(row, "") {
                Ok(plan) => plans.push(plan),
                Err(RepositoryError::Decode(reason)) => {
                    tracing::warn!(
                        event_name = "recommendation.plan_skipped",
                        reason = %reason,
                        "skipping undecodable catalog row"
                    );
                }
                Err(error) => return Err(error),
            }
        }
        Ok(plans)
    }

    async fn find_by_id(&self, id: &PlanId) -> Result<Option<Plan>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {PLAN_COLUMNS} FROM plans WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(|row| row_to_plan(row, "")).transpose()
    }

    async fn save(&self, plan: Plan) -> Result<(), RepositoryError> {
        let (data_limit_gb, is_unlimited) = match plan.allowance {
            DataAllowance::Capped { gb } => (Some(gb), false),
            DataAllowance::Unlimited { fair_use_gb } => (fair_use_gb, true),
        };

        sqlx::query(
            "INSERT INTO plans
                (id, name, download_mbps, upload_mbps, data_limit_gb, is_unlimited,
                 price, validity_days, category)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                download_mbps = excluded.download_mbps,
                upload_mbps = excluded.upload_mbps,
                data_limit_gb = excluded.data_limit_gb,
                is_unlimited = excluded.is_unlimited,
                price = excluded.price,
                validity_days = excluded.validity_days,
                category = excluded.category",
        )
        .bind(&plan.id.0)
        .bind(&plan.name)
        .bind(plan.download_mbps)
        .bind(plan.upload_mbps)
        .bind(data_limit_gb)
        .bind(is_unlimited)
        .bind(plan.price.to_string())
        .bind(i64::from(plan.validity_days))
        .bind(plan.category.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use planwise_core::domain::plan::{DataAllowance, Plan, PlanCategory, PlanId};

    use super::SqlPlanRepository;
    use crate::repositories::PlanRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn plan(id: &str, price: i64, allowance: DataAllowance) -> Plan {
        Plan {
            id: PlanId(id.to_string()),
            name: format!("Plan {id}"),
            download_mbps: 100.0,
            upload_mbps: Some(20.0),
            allowance,
            price: Decimal::new(price, 0),
            validity_days: 30,
            category: PlanCategory::Standard,
        }
    }

    #[tokio::test]
    async fn list_all_orders_by_numeric_price_then_id() {
        let repo = SqlPlanRepository::new(setup().await);
        repo.save(plan("c", 1299, DataAllowance::Capped { gb: 300.0 })).await.expect("save c");
        repo.save(plan("b", 299, DataAllowance::Capped { gb: 50.0 })).await.expect("save b");
        repo.save(plan("a", 299, DataAllowance::Capped { gb: 60.0 })).await.expect("save a");

        let ids: Vec<String> =
            repo.list_all().await.expect("list").into_iter().map(|plan| plan.id.0).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn list_all_skips_rows_that_do_not_decode() {
        let pool = setup().await;
        let repo = SqlPlanRepository::new(pool.clone());
        repo.save(plan("basic", 299, DataAllowance::Capped { gb: 50.0 })).await.expect("save");
        sqlx::query(
            "INSERT INTO plans (id, name, download_mbps, data_limit_gb, is_unlimited, price, category)
             VALUES ('legacy', 'Legacy Gold', 40, NULL, 0, '399', 'gold'),
                    ('no-cap', 'No Cap', 40, NULL, 0, '499', 'standard')",
        )
        .execute(&pool)
        .await
        .expect("insert malformed rows");

        let ids: Vec<String> =
            repo.list_all().await.expect("list").into_iter().map(|plan| plan.id.0).collect();
        assert_eq!(ids, vec!["basic"]);
    }

    #[tokio::test]
    async fn unlimited_allowance_survives_storage() {
        let repo = SqlPlanRepository::new(setup().await);
        let unlimited = plan("pro", 1499, DataAllowance::Unlimited { fair_use_gb: Some(1000.0) });
        let open = plan("open", 1999, DataAllowance::Unlimited { fair_use_gb: None });
        repo.save(unlimited.clone()).await.expect("save pro");
        repo.save(open.clone()).await.expect("save open");

        assert_eq!(repo.find_by_id(&unlimited.id).await.expect("find"), Some(unlimited));
        assert_eq!(repo.find_by_id(&open.id).await.expect("find"), Some(open));
        assert_eq!(repo.find_by_id(&PlanId("missing".to_string())).await.expect("find"), None);
    }

    #[tokio::test]
    async fn save_updates_existing_plan() {
        let repo = SqlPlanRepository::new(setup().await);
        let mut basic = plan("basic", 299, DataAllowance::Capped { gb: 50.0 });
        repo.save(basic.clone()).await.expect("save");

        basic.price = Decimal::new(34950, 2);
        repo.save(basic.clone()).await.expect("update");

        let found = repo.find_by_id(&basic.id).await.expect("find").expect("plan exists");
        assert_eq!(found.price, Decimal::new(34950, 2));
    }
}
