//! Scoring driven by the classifier's predicted plan category

use serde::{Deserialize, Serialize};

use super::classifier::ModelArtifact;
use super::features::FeatureVector;
use super::heuristic::HeuristicRecommender;
use super::stats::UsageStatistics;
use super::types::{rank, ComponentScores, FallbackReason, RecommendationPath, ScoredPlan};
use crate::domain::plan::{Plan, PlanCategory};

/// Bonus points awarded on the model path
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelBonusWeights {
    /// Plan category equals the predicted category (default: 40)
    pub category_match: f64,
    /// Cap covers usage with the buffer applied (default: 30)
    pub capacity_buffered: f64,
    /// Cap covers usage without the buffer (default: 20)
    pub capacity_covered: f64,
    /// Scaled by cap/usage for undersized plans (default: 10)
    pub capacity_partial: f64,
    /// Multiplier on monthly usage for the buffered bonus (default: 1.2)
    pub capacity_buffer: f64,
    /// Price per GB below which a plan is good value (default: 5)
    pub good_value_ppu: f64,
    pub good_value_bonus: f64,
    /// Price per GB below which a plan is fair value (default: 10)
    pub fair_value_ppu: f64,
    pub fair_value_bonus: f64,
    /// Awarded when download Mbps >= multiplier x max daily GB (default: 10)
    pub speed_bonus: f64,
    pub speed_multiplier: f64,
}

impl Default for ModelBonusWeights {
    fn default() -> Self {
        super::DEFAULT_MODEL_BONUSES
    }
}

/// Plans ranked for one request plus the path that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedPlans {
    pub path: RecommendationPath,
    pub plans: Vec<ScoredPlan>,
}

#[derive(Debug, Clone, Default)]
pub struct ModelBasedRecommender {
    bonuses: ModelBonusWeights,
    heuristic: HeuristicRecommender,
}

impl ModelBasedRecommender {
    pub fn new(bonuses: ModelBonusWeights, heuristic: HeuristicRecommender) -> Self {
        Self { bonuses, heuristic }
    }

    pub fn bonuses(&self) -> &ModelBonusWeights {
        &self.bonuses
    }

    /// Predict with `artifact` and rank on the model path. Inference errors
    /// rank with the heuristic over `fallback` instead; the caller always
    /// gets a ranking.
    pub fn recommend(
        &self,
        artifact: &ModelArtifact,
        plans: &[Plan],
        features: &FeatureVector,
        fallback: &FeatureVector,
        count: usize,
    ) -> RankedPlans {
        match artifact.predict_category(features) {
            Ok(predicted) => RankedPlans {
                path: RecommendationPath::Model {
                    version: artifact.version.clone(),
                    predicted_category: predicted,
                },
                plans: self.rank_for_category(plans, &features.usage, predicted, count),
            },
            Err(error) => {
                tracing::warn!(
                    event_name = "recommendation.inference_failed",
                    model_version = %artifact.version,
                    error = %error,
                    "model inference failed; ranking with heuristic"
                );
                RankedPlans {
                    path: RecommendationPath::HeuristicFallback {
                        reason: FallbackReason::InferenceFailed { detail: error.to_string() },
                    },
                    plans: self.heuristic.recommend(plans, fallback, count),
                }
            }
        }
    }

    /// Score every plan against a known predicted category.
    pub fn rank_for_category(
        &self,
        plans: &[Plan],
        usage: &UsageStatistics,
        predicted: PlanCategory,
        count: usize,
    ) -> Vec<ScoredPlan> {
        let scored = plans
            .iter()
            .map(|plan| {
                let components = ComponentScores {
                    category: self.category_bonus(plan, predicted),
                    capacity: self.capacity_bonus(plan, usage.estimated_monthly_gb),
                    price: self.price_bonus(plan),
                    speed: self.speed_bonus(plan, usage.max_daily_gb),
                };
                let score =
                    components.category + components.capacity + components.price + components.speed;
                ScoredPlan { plan: plan.clone(), score, components }
            })
            .collect();

        rank(scored, count)
    }

    pub fn category_bonus(&self, plan: &Plan, predicted: PlanCategory) -> f64 {
        if plan.category == predicted {
            self.bonuses.category_match
        } else {
            0.0
        }
    }

    /// 0 when there is no projected usage.
    pub fn capacity_bonus(&self, plan: &Plan, monthly_gb: f64) -> f64 {
        if !(monthly_gb > 0.0) {
            return 0.0;
        }
        let Some(cap) = plan.allowance.effective_cap_gb() else {
            return self.bonuses.capacity_buffered;
        };

        if cap >= monthly_gb * self.bonuses.capacity_buffer {
            self.bonuses.capacity_buffered
        } else if cap >= monthly_gb {
            self.bonuses.capacity_covered
        } else {
            self.bonuses.capacity_partial * (cap / monthly_gb)
        }
    }

    pub fn price_bonus(&self, plan: &Plan) -> f64 {
        match plan.price_per_gb() {
            Some(ppu) if ppu < self.bonuses.good_value_ppu => self.bonuses.good_value_bonus,
            Some(ppu) if ppu < self.bonuses.fair_value_ppu => self.bonuses.fair_value_bonus,
            _ => 0.0,
        }
    }

    pub fn speed_bonus(&self, plan: &Plan, max_daily_gb: f64) -> f64 {
        if plan.download_mbps >= max_daily_gb * self.bonuses.speed_multiplier {
            self.bonuses.speed_bonus
        } else {
            0.0
        }
    }
}
