use std::sync::Arc;

use planwise_core::config::AppConfig;
use planwise_core::recommend::{FsArtifactStore, RecommendationService};
use planwise_db::{connect_with_config, migrations, DbPool, SqlRecommendationSource};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub service: Arc<RecommendationService>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let service = Arc::new(RecommendationService::new(
        Arc::new(SqlRecommendationSource::new(db_pool.clone())),
        Arc::new(FsArtifactStore::new(config.model.artifact_dir.clone())),
        config.engine_settings(),
    ));
    info!(
        event_name = "system.bootstrap.service_ready",
        correlation_id = "bootstrap",
        model_enabled = config.model.enabled,
        slot = %config.model.slot,
        artifact_dir = %config.model.artifact_dir.display(),
        "recommendation service ready"
    );

    Ok(Application { config, db_pool, service })
}

#[cfg(test)]
mod tests {
    use planwise_core::config::{AppConfig, ConfigOverrides, LoadOptions};
    use planwise_core::domain::subscriber::SubscriberId;
    use planwise_core::recommend::RecommendationPath;

    use crate::bootstrap::{bootstrap_with_config, BootstrapError};

    fn config_with_database(url: &str) -> AppConfig {
        AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(url.to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect("config should load")
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_when_database_cannot_open() {
        let config = config_with_database("sqlite:///planwise-missing-dir/nested/planwise.db");

        let result = bootstrap_with_config(config).await;

        assert!(matches!(result, Err(BootstrapError::DatabaseConnect(_))));
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_serves_cold_start() {
        let app = bootstrap_with_config(config_with_database("sqlite::memory:"))
            .await
            .expect("bootstrap should succeed with an in-memory database");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('plans', 'subscribers', 'subscriptions', 'usage_records')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("expected portal tables after bootstrap");
        assert_eq!(table_count, 4);

        let recommendation = app
            .service
            .recommend(&SubscriberId("sub-001".to_string()), None)
            .await
            .expect("empty catalog still yields a recommendation");
        assert_eq!(recommendation.path, RecommendationPath::ColdStart);
        assert!(recommendation.plans.is_empty());

        app.db_pool.close().await;
    }
}
