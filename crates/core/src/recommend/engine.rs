//! Recommendation service: picks a scoring path per request and runs training

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::artifact::{ActiveArtifact, ArtifactError, ArtifactStore};
use super::classifier::ModelArtifact;
use super::features::{FeatureEngineer, FeatureVector};
use super::heuristic::{cold_start, HeuristicRecommender, HeuristicWeights};
use super::model::{ModelBasedRecommender, ModelBonusWeights, RankedPlans};
use super::source::RecommendationSource;
use super::stats::UsageStatisticsCalculator;
use super::trainer::{ModelTrainer, TrainingError, TrainingReport, TrainingSet, TrainingSettings};
use super::types::{FallbackReason, Recommendation, RecommendationPath};
use super::{
    DEFAULT_MODEL_SLOT, DEFAULT_RECOMMENDATION_COUNT, HEURISTIC_WINDOW_DAYS, MODEL_WINDOW_DAYS,
};
use crate::domain::plan::Plan;
use crate::domain::subscriber::SubscriberId;
use crate::errors::ApplicationError;

/// Everything the service needs besides its collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub default_count: usize,
    pub heuristic_window_days: u32,
    pub model_window_days: u32,
    /// When false the model path is never attempted
    pub model_enabled: bool,
    pub slot: String,
    pub heuristic: HeuristicWeights,
    pub bonuses: ModelBonusWeights,
    pub training: TrainingSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_count: DEFAULT_RECOMMENDATION_COUNT,
            heuristic_window_days: HEURISTIC_WINDOW_DAYS,
            model_window_days: MODEL_WINDOW_DAYS,
            model_enabled: true,
            slot: DEFAULT_MODEL_SLOT.to_string(),
            heuristic: HeuristicWeights::default(),
            bonuses: ModelBonusWeights::default(),
            training: TrainingSettings::default(),
        }
    }
}

/// What `GET /model` and `planwise models` report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub slot: String,
    pub enabled: bool,
    pub active: Option<ActiveArtifact>,
    pub accuracy: Option<f64>,
    pub versions: Vec<String>,
}

type CachedArtifact = (ActiveArtifact, Arc<ModelArtifact>);

pub struct RecommendationService {
    source: Arc<dyn RecommendationSource>,
    store: Arc<dyn ArtifactStore>,
    settings: EngineSettings,
    heuristic: HeuristicRecommender,
    model: ModelBasedRecommender,
    trainer: ModelTrainer,
    cached: RwLock<Option<CachedArtifact>>,
}

impl RecommendationService {
    pub fn new(
        source: Arc<dyn RecommendationSource>,
        store: Arc<dyn ArtifactStore>,
        settings: EngineSettings,
    ) -> Self {
        let heuristic = HeuristicRecommender::with_weights(settings.heuristic);
        let model = ModelBasedRecommender::new(settings.bonuses, heuristic.clone());
        let trainer = ModelTrainer::new(settings.training);
        Self { source, store, settings, heuristic, model, trainer, cached: RwLock::new(None) }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Rank plans for one subscriber. Missing data and model problems never
    /// fail the request; only collaborator I/O errors do.
    pub async fn recommend(
        &self,
        subscriber_id: &SubscriberId,
        count: Option<usize>,
    ) -> Result<Recommendation, ApplicationError> {
        let count = count.unwrap_or(self.settings.default_count);
        let plans = self.catalog().await?;

        let lookback = self.settings.heuristic_window_days.max(self.settings.model_window_days);
        let usage = self.source.fetch_usage(subscriber_id, lookback).await?;
        let subscriber = self.source.fetch_subscriber(subscriber_id).await?;

        let engineer = FeatureEngineer::now();
        let heuristic_stats =
            UsageStatisticsCalculator::new(self.settings.heuristic_window_days).calculate(&usage);
        let heuristic_features = engineer.for_subscriber(subscriber.as_ref(), &heuristic_stats);

        let ranked = if self.heuristic.is_cold_start(&heuristic_stats) {
            RankedPlans { path: RecommendationPath::ColdStart, plans: cold_start(&plans, count) }
        } else if !self.settings.model_enabled {
            self.heuristic_only(&plans, &heuristic_features, count)
        } else {
            match self.active_artifact().await {
                Ok(None) => self.heuristic_only(&plans, &heuristic_features, count),
                Err(error) => {
                    tracing::warn!(
                        event_name = "recommendation.fallback",
                        subscriber_id = %subscriber_id,
                        error = %error,
                        "model artifact unavailable; ranking with heuristic"
                    );
                    RankedPlans {
                        path: RecommendationPath::HeuristicFallback {
                            reason: FallbackReason::ArtifactUnavailable {
                                detail: error.to_string(),
                            },
                        },
                        plans: self.heuristic.recommend(&plans, &heuristic_features, count),
                    }
                }
                Ok(Some(artifact)) => match subscriber.as_ref() {
                    None => {
                        tracing::info!(
                            event_name = "recommendation.fallback",
                            subscriber_id = %subscriber_id,
                            "subscriber unknown; ranking with heuristic"
                        );
                        RankedPlans {
                            path: RecommendationPath::HeuristicFallback {
                                reason: FallbackReason::SubscriberUnknown,
                            },
                            plans: self.heuristic.recommend(&plans, &heuristic_features, count),
                        }
                    }
                    Some(known) => {
                        let model_stats =
                            UsageStatisticsCalculator::new(self.settings.model_window_days)
                                .calculate(&usage);
                        let model_features = engineer.for_subscriber(Some(known), &model_stats);
                        self.model.recommend(
                            &artifact,
                            &plans,
                            &model_features,
                            &heuristic_features,
                            count,
                        )
                    }
                },
            }
        };

        tracing::info!(
            event_name = "recommendation.generated",
            subscriber_id = %subscriber_id,
            path = ranked.path.as_str(),
            requested = count,
            returned = ranked.plans.len(),
            "recommendation generated"
        );

        Ok(Recommendation {
            subscriber_id: subscriber_id.clone(),
            path: ranked.path,
            plans: ranked.plans,
            generated_at: Utc::now(),
        })
    }

    /// Train and activate a new artifact. Every failure is reported in the
    /// returned report and leaves the active artifact untouched.
    pub async fn train(&self) -> TrainingReport {
        let started = Utc::now();
        tracing::info!(
            event_name = "model.training.started",
            slot = %self.settings.slot,
            "training started"
        );

        match self.run_training().await {
            Ok((artifact, dropped)) => {
                let report = TrainingReport::succeeded(&artifact, dropped);
                tracing::info!(
                    event_name = "model.training.completed",
                    version = %artifact.version,
                    accuracy = artifact.accuracy,
                    training_rows = artifact.training_rows,
                    holdout_rows = artifact.holdout_rows,
                    dropped_rows = dropped,
                    "training completed"
                );
                report
            }
            Err((reason, dropped)) => {
                tracing::warn!(
                    event_name = "model.training.failed",
                    reason = %reason,
                    dropped_rows = dropped,
                    "training failed; active artifact unchanged"
                );
                TrainingReport::failed(reason, dropped, started)
            }
        }
    }

    async fn run_training(&self) -> Result<(ModelArtifact, usize), (String, usize)> {
        let rows = self.source.fetch_training_rows().await.map_err(|error| (error.to_string(), 0))?;
        if rows.is_empty() {
            return Err((TrainingError::NoExamples.to_string(), 0));
        }

        let calculator = UsageStatisticsCalculator::new(self.settings.model_window_days);
        let mut usage = HashMap::new();
        for row in &rows {
            let id = &row.subscriber.id;
            if usage.contains_key(id) {
                continue;
            }
            let records = self
                .source
                .fetch_usage(id, self.settings.model_window_days)
                .await
                .map_err(|error| (error.to_string(), 0))?;
            usage.insert(id.clone(), calculator.calculate(&records));
        }

        let now = Utc::now();
        let set = TrainingSet::build(&rows, &usage, &FeatureEngineer::new(now));
        let dropped = set.dropped;

        let version = new_version(now);
        let artifact = self
            .trainer
            .train(&set.examples, version, now)
            .map_err(|error| (error.to_string(), dropped))?;

        let active = self
            .store
            .save(&self.settings.slot, &artifact)
            .await
            .map_err(|error| (TrainingError::Store(error.to_string()).to_string(), dropped))?;

        *self.cached.write().await = Some((active, Arc::new(artifact.clone())));
        Ok((artifact, dropped))
    }

    pub async fn model_status(&self) -> Result<ModelStatus, ApplicationError> {
        let slot = &self.settings.slot;
        let active = self.store.active_version(slot).await?;
        let versions = self.store.versions(slot).await?;
        let accuracy = match &active {
            Some(_) => self.active_artifact().await.ok().flatten().map(|artifact| artifact.accuracy),
            None => None,
        };

        Ok(ModelStatus {
            slot: slot.clone(),
            enabled: self.settings.model_enabled,
            active,
            accuracy,
            versions,
        })
    }

    /// Roll the slot to an existing version.
    pub async fn activate(&self, version: &str) -> Result<ActiveArtifact, ApplicationError> {
        let active = self.store.activate(&self.settings.slot, version).await?;
        *self.cached.write().await = None;
        Ok(active)
    }

    async fn catalog(&self) -> Result<Vec<Plan>, ApplicationError> {
        let plans = self.source.fetch_all_plans().await?;
        Ok(plans
            .into_iter()
            .filter(|plan| match plan.validate() {
                Ok(()) => true,
                Err(error) => {
                    tracing::warn!(
                        event_name = "recommendation.plan_skipped",
                        plan_id = %plan.id,
                        error = %error,
                        "skipping invalid catalog plan"
                    );
                    false
                }
            })
            .collect())
    }

    fn heuristic_only(
        &self,
        plans: &[Plan],
        features: &FeatureVector,
        count: usize,
    ) -> RankedPlans {
        RankedPlans {
            path: RecommendationPath::Heuristic,
            plans: self.heuristic.recommend(plans, features, count),
        }
    }

    /// The active artifact, re-reading the pointer on every call and loading
    /// the version only when it changed.
    async fn active_artifact(
        &self,
    ) -> Result<Option<Arc<ModelArtifact>>, ArtifactError> {
        let Some(active) = self.store.active_version(&self.settings.slot).await? else {
            return Ok(None);
        };

        if let Some((cached, artifact)) = self.cached.read().await.as_ref() {
            if cached.version == active.version && cached.digest == active.digest {
                return Ok(Some(Arc::clone(artifact)));
            }
        }

        let artifact = Arc::new(self.store.load_active(&self.settings.slot, &active).await?);
        tracing::info!(
            event_name = "model.artifact.loaded",
            version = %active.version,
            "model artifact loaded"
        );
        *self.cached.write().await = Some((active, Arc::clone(&artifact)));
        Ok(Some(artifact))
    }
}

fn new_version(at: chrono::DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", at.format("%Y%m%dT%H%M%SZ"), &suffix[..8])
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate};
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::plan::{DataAllowance, PlanCategory, PlanId};
    use crate::domain::subscriber::Subscriber;
    use crate::domain::subscription::{Subscription, SubscriptionId, SubscriptionStatus, TrainingRow};
    use crate::domain::usage::UsageRecord;
    use crate::recommend::artifact::InMemoryArtifactStore;
    use crate::recommend::source::InMemoryRecommendationSource;
    use crate::recommend::trainer::TrainingStatus;

    fn plan(id: &str, category: PlanCategory, cap: f64, price: i64, speed: f64) -> Plan {
        Plan {
            id: PlanId(id.to_string()),
            name: id.to_string(),
            download_mbps: speed,
            upload_mbps: None,
            allowance: DataAllowance::Capped { gb: cap },
            price: Decimal::new(price, 0),
            validity_days: 30,
            category,
        }
    }

    fn catalog() -> Vec<Plan> {
        vec![
            plan("plan-basic", PlanCategory::Basic, 50.0, 299, 30.0),
            plan("plan-standard", PlanCategory::Standard, 150.0, 599, 75.0),
            plan("plan-elite", PlanCategory::Elite, 1000.0, 1999, 500.0),
        ]
    }

    fn subscriber(id: &str, city: &str) -> Subscriber {
        Subscriber {
            id: SubscriberId(id.to_string()),
            name: id.to_string(),
            signup_at: Some(Utc::now() - Duration::days(300)),
            city: Some(city.to_string()),
            state: Some("Rajasthan".to_string()),
        }
    }

    fn usage(id: &str, daily: f64, days: i64) -> Vec<UsageRecord> {
        let start = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();
        (0..days)
            .map(|i| {
                let gb = if i % 3 == 0 { daily * 1.2 } else { daily };
                UsageRecord::new(SubscriberId(id.to_string()), start + Duration::days(i), gb)
            })
            .collect()
    }

    fn history(subscriber: &Subscriber, plan: &Plan, n: usize) -> TrainingRow {
        TrainingRow {
            subscriber: subscriber.clone(),
            subscription: Subscription {
                id: SubscriptionId(format!("subn-{}-{n}", subscriber.id)),
                subscriber_id: subscriber.id.clone(),
                plan_id: Some(plan.id.clone()),
                start_date: NaiveDate::from_ymd_opt(2025, 1, 1),
                end_date: NaiveDate::from_ymd_opt(2025, 1, 31),
                status: SubscriptionStatus::Expired,
            },
            plan: Some(plan.clone()),
        }
    }

    async fn seeded_source() -> Arc<InMemoryRecommendationSource> {
        let source = Arc::new(InMemoryRecommendationSource::new());
        let plans = catalog();
        source.set_plans(plans.clone()).await;

        for i in 0..8 {
            let light = subscriber(&format!("light-{i}"), "Jaipur");
            source.push_usage(usage(&light.id.0, 0.5 + 0.1 * i as f64, 40)).await;
            source.push_training_row(history(&light, &plans[0], i)).await;
            source.insert_subscriber(light).await;

            let heavy = subscriber(&format!("heavy-{i}"), "Mumbai");
            source.push_usage(usage(&heavy.id.0, 20.0 + i as f64, 40)).await;
            source.push_training_row(history(&heavy, &plans[2], i)).await;
            source.insert_subscriber(heavy).await;
        }
        source
    }

    fn service(
        source: Arc<InMemoryRecommendationSource>,
        store: Arc<InMemoryArtifactStore>,
    ) -> RecommendationService {
        RecommendationService::new(source, store, EngineSettings::default())
    }

    #[tokio::test]
    async fn absent_artifact_matches_heuristic_ranking() {
        let source = seeded_source().await;
        let service = service(source.clone(), Arc::new(InMemoryArtifactStore::new()));
        let id = SubscriberId("heavy-3".to_string());

        let recommendation = service.recommend(&id, Some(3)).await.expect("recommend");

        let records = source.fetch_usage(&id, 60).await.expect("usage");
        let stats = UsageStatisticsCalculator::new(HEURISTIC_WINDOW_DAYS).calculate(&records);
        let subscriber = source.fetch_subscriber(&id).await.expect("subscriber");
        let features = FeatureEngineer::now().for_subscriber(subscriber.as_ref(), &stats);
        let expected = HeuristicRecommender::new().recommend(&catalog(), &features, 3);

        assert_eq!(recommendation.path, RecommendationPath::Heuristic);
        assert_eq!(recommendation.plans, expected);
    }

    #[tokio::test]
    async fn no_usage_is_a_cold_start_with_cheapest_first() {
        let source = seeded_source().await;
        let service = service(source, Arc::new(InMemoryArtifactStore::new()));

        let recommendation =
            service.recommend(&SubscriberId("newcomer".to_string()), Some(2)).await.expect("recommend");

        assert_eq!(recommendation.path, RecommendationPath::ColdStart);
        assert_eq!(recommendation.plan_ids(), vec!["plan-basic", "plan-standard"]);
    }

    #[tokio::test]
    async fn default_count_applies_when_unspecified() {
        let source = seeded_source().await;
        let service = service(source, Arc::new(InMemoryArtifactStore::new()));

        let recommendation =
            service.recommend(&SubscriberId("light-1".to_string()), None).await.expect("recommend");
        assert_eq!(recommendation.plans.len(), 3);
    }

    #[tokio::test]
    async fn training_on_empty_history_fails_and_leaves_slot_unchanged() {
        let source = Arc::new(InMemoryRecommendationSource::new());
        source.set_plans(catalog()).await;
        let store = Arc::new(InMemoryArtifactStore::new());
        let service = service(source, store.clone());

        let report = service.train().await;

        assert_eq!(report.status, TrainingStatus::Failed);
        assert_eq!(report.reason.as_deref(), Some("no training rows were available"));
        assert!(store.active_version(DEFAULT_MODEL_SLOT).await.expect("active").is_none());
    }

    #[tokio::test]
    async fn failed_retrain_keeps_previous_artifact_active() {
        let source = seeded_source().await;
        let store = Arc::new(InMemoryArtifactStore::new());
        let trained = service(source, store.clone());
        let first = trained.train().await;
        assert!(first.is_success(), "{:?}", first.reason);

        let empty = service(Arc::new(InMemoryRecommendationSource::new()), store.clone());
        let second = empty.train().await;
        assert!(!second.is_success());

        let active = store.active_version(DEFAULT_MODEL_SLOT).await.expect("active");
        assert_eq!(active.map(|a| a.version), first.version);
    }

    #[tokio::test]
    async fn trained_model_drives_recommendations() {
        let source = seeded_source().await;
        let store = Arc::new(InMemoryArtifactStore::new());
        let service = service(source, store);

        let report = service.train().await;
        assert!(report.is_success(), "{:?}", report.reason);
        assert_eq!(report.training_rows + report.holdout_rows, 16);

        let recommendation =
            service.recommend(&SubscriberId("heavy-5".to_string()), Some(1)).await.expect("recommend");

        match &recommendation.path {
            RecommendationPath::Model { version, predicted_category } => {
                assert_eq!(Some(version), report.version.as_ref());
                assert_eq!(*predicted_category, PlanCategory::Elite);
            }
            other => panic!("expected model path, got {other:?}"),
        }
        assert_eq!(recommendation.plan_ids(), vec!["plan-elite"]);
    }

    #[tokio::test]
    async fn unknown_subscriber_with_usage_falls_back() {
        let source = seeded_source().await;
        source.push_usage(usage("ghost", 3.0, 20)).await;
        let store = Arc::new(InMemoryArtifactStore::new());
        let service = service(source, store);
        assert!(service.train().await.is_success());

        let recommendation =
            service.recommend(&SubscriberId("ghost".to_string()), Some(2)).await.expect("recommend");

        assert_eq!(
            recommendation.path,
            RecommendationPath::HeuristicFallback { reason: FallbackReason::SubscriberUnknown }
        );
        assert_eq!(recommendation.plans.len(), 2);
    }

    #[tokio::test]
    async fn corrupt_artifact_degrades_to_heuristic() {
        let source = seeded_source().await;
        let store = Arc::new(InMemoryArtifactStore::new());
        let service = service(source, store.clone());
        let report = service.train().await;
        let version = report.version.expect("version");

        store.overwrite_raw(DEFAULT_MODEL_SLOT, &version, b"{}".to_vec()).await;
        let fresh = RecommendationService::new(
            seeded_source().await,
            store,
            EngineSettings::default(),
        );

        let recommendation =
            fresh.recommend(&SubscriberId("light-2".to_string()), Some(3)).await.expect("recommend");

        assert!(matches!(
            recommendation.path,
            RecommendationPath::HeuristicFallback {
                reason: FallbackReason::ArtifactUnavailable { .. }
            }
        ));
        assert_eq!(recommendation.plans.len(), 3);
    }

    #[tokio::test]
    async fn disabled_model_always_uses_heuristic() {
        let source = seeded_source().await;
        let store = Arc::new(InMemoryArtifactStore::new());
        let settings = EngineSettings { model_enabled: false, ..EngineSettings::default() };
        let service = RecommendationService::new(source, store, settings);
        assert!(service.train().await.is_success());

        let recommendation =
            service.recommend(&SubscriberId("heavy-1".to_string()), Some(3)).await.expect("recommend");
        assert_eq!(recommendation.path, RecommendationPath::Heuristic);
    }

    #[tokio::test]
    async fn rollback_is_visible_on_next_request() {
        let source = seeded_source().await;
        let store = Arc::new(InMemoryArtifactStore::new());
        let service = service(source, store);

        let first = service.train().await.version.expect("first version");
        let second = service.train().await.version.expect("second version");
        assert_ne!(first, second);

        service.activate(&first).await.expect("activate");
        let status = service.model_status().await.expect("status");
        assert_eq!(status.active.map(|a| a.version), Some(first.clone()));
        assert_eq!(status.versions.len(), 2);

        let recommendation =
            service.recommend(&SubscriberId("heavy-2".to_string()), Some(1)).await.expect("recommend");
        assert!(matches!(
            recommendation.path,
            RecommendationPath::Model { ref version, .. } if *version == first
        ));
    }

    #[tokio::test]
    async fn invalid_catalog_plans_are_skipped() {
        let source = seeded_source().await;
        let mut plans = catalog();
        plans.push(plan("plan-free", PlanCategory::Basic, 10.0, 0, 10.0));
        source.set_plans(plans).await;
        let service = service(source, Arc::new(InMemoryArtifactStore::new()));

        let recommendation =
            service.recommend(&SubscriberId("newcomer".to_string()), Some(10)).await.expect("recommend");
        assert_eq!(recommendation.plans.len(), 3);
    }
}
