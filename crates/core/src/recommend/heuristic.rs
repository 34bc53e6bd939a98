//! Rule-based plan scoring against projected bandwidth need

use serde::{Deserialize, Serialize};

use super::features::FeatureVector;
use super::stats::UsageStatistics;
use super::types::{rank, ComponentScores, ScoredPlan};
use crate::domain::plan::Plan;

/// Weights and thresholds for the heuristic scorer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicWeights {
    /// Weight for capacity fit (default: 0.5)
    pub capacity: f64,
    /// Weight for price per GB relative to the cheapest plan (default: 0.3)
    pub price: f64,
    /// Weight for speed adequacy (default: 0.2)
    pub speed: f64,
    /// Growth applied to monthly usage before volatility (default: 1.2)
    pub base_growth: f64,
    /// Extra growth per unit of std/mean (default: 0.1)
    pub volatility_growth: f64,
    /// Headroom over the peak day projected to a month (default: 1.1)
    pub peak_headroom: f64,
    /// Penalty per unit of relative oversizing (default: 0.1)
    pub overshoot_penalty: f64,
    /// Credit per unit of coverage for undersized plans (default: 0.5)
    pub undershoot_credit: f64,
    /// Required Mbps per GB of mean daily usage (default: 8)
    pub mbps_per_daily_gb: f64,
    /// Floor for the required speed in Mbps (default: 25)
    pub min_required_mbps: f64,
}

impl Default for HeuristicWeights {
    fn default() -> Self {
        super::DEFAULT_HEURISTIC_WEIGHTS
    }
}

/// Pure scorer ranking a catalog against a subscriber's usage statistics.
#[derive(Debug, Clone, Default)]
pub struct HeuristicRecommender {
    weights: HeuristicWeights,
}

impl HeuristicRecommender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights(weights: HeuristicWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &HeuristicWeights {
        &self.weights
    }

    /// Monthly GB a plan should cover, with growth and peak headroom.
    pub fn target_capacity(&self, usage: &UsageStatistics) -> f64 {
        let growth = self.weights.base_growth + usage.volatility() * self.weights.volatility_growth;
        (usage.estimated_monthly_gb * growth).max(usage.peak_monthly_gb() * self.weights.peak_headroom)
    }

    /// No usable history or no positive projected need.
    pub fn is_cold_start(&self, usage: &UsageStatistics) -> bool {
        let target = self.target_capacity(usage);
        usage.is_empty() || !(target.is_finite() && target > 0.0)
    }

    /// Expects `target > 0`. Plans without any cap fully cover any need. A
    /// covering plan never scores below `undershoot_credit`, the ceiling of
    /// any undersized plan.
    pub fn capacity_score(&self, plan: &Plan, target: f64) -> f64 {
        let Some(cap) = plan.allowance.effective_cap_gb() else {
            return 1.0;
        };

        if cap >= target {
            let overshoot = (cap - target) / target;
            (1.0 - overshoot * self.weights.overshoot_penalty).max(self.weights.undershoot_credit)
        } else {
            self.weights.undershoot_credit * (cap / target)
        }
    }

    /// `cheapest_ppu / plan_ppu`; 0 when either is undefined.
    pub fn price_score(&self, plan: &Plan, cheapest_ppu: Option<f64>) -> f64 {
        match (cheapest_ppu, plan.price_per_gb()) {
            (Some(cheapest), Some(ppu)) if ppu > 0.0 => cheapest / ppu,
            _ => 0.0,
        }
    }

    pub fn speed_score(&self, plan: &Plan, usage: &UsageStatistics) -> f64 {
        let required = (usage.mean_daily_gb * self.weights.mbps_per_daily_gb)
            .max(self.weights.min_required_mbps);
        if required <= 0.0 {
            return 1.0;
        }
        (plan.download_mbps / required).min(1.0)
    }

    /// Rank `plans` for the subscriber described by `features`, best first.
    /// Ties keep catalog order.
    pub fn recommend(
        &self,
        plans: &[Plan],
        features: &FeatureVector,
        count: usize,
    ) -> Vec<ScoredPlan> {
        let usage = &features.usage;
        if self.is_cold_start(usage) {
            return cold_start(plans, count);
        }

        let target = self.target_capacity(usage);
        let cheapest_ppu = cheapest_price_per_gb(plans);

        let scored = plans
            .iter()
            .map(|plan| {
                let components = ComponentScores {
                    capacity: self.capacity_score(plan, target),
                    price: self.price_score(plan, cheapest_ppu),
                    speed: self.speed_score(plan, usage),
                    category: 0.0,
                };
                ScoredPlan { plan: plan.clone(), score: self.total(&components), components }
            })
            .collect();

        rank(scored, count)
    }

    fn total(&self, components: &ComponentScores) -> f64 {
        components.capacity * self.weights.capacity
            + components.price * self.weights.price
            + components.speed * self.weights.speed
    }
}

/// The `count` cheapest plans, ascending by price. Equal prices keep
/// catalog order. Scores are 0.
pub fn cold_start(plans: &[Plan], count: usize) -> Vec<ScoredPlan> {
    let mut by_price: Vec<&Plan> = plans.iter().collect();
    by_price.sort_by(|a, b| a.price.cmp(&b.price));

    by_price
        .into_iter()
        .take(count)
        .map(|plan| ScoredPlan {
            plan: plan.clone(),
            score: 0.0,
            components: ComponentScores::default(),
        })
        .collect()
}

fn cheapest_price_per_gb(plans: &[Plan]) -> Option<f64> {
    plans
        .iter()
        .filter_map(Plan::price_per_gb)
        .filter(|ppu| ppu.is_finite() && *ppu > 0.0)
        .min_by(|a, b| a.total_cmp(b))
}
