//! Types returned by the recommendation engine

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::plan::{Plan, PlanCategory};
use crate::domain::subscriber::SubscriberId;

/// Individual score components for one plan. Heuristic components are in
/// [0, 1]; model-path components are bonus points.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    pub capacity: f64,
    pub price: f64,
    pub speed: f64,
    /// Category-match bonus; always 0 on the heuristic path
    pub category: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredPlan {
    pub plan: Plan,
    pub score: f64,
    pub components: ComponentScores,
}

/// Why a request that could have used the model ended up on the heuristic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FallbackReason {
    SubscriberUnknown,
    ArtifactUnavailable { detail: String },
    InferenceFailed { detail: String },
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SubscriberUnknown => f.write_str("subscriber unknown"),
            Self::ArtifactUnavailable { detail } => write!(f, "artifact unavailable: {detail}"),
            Self::InferenceFailed { detail } => write!(f, "inference failed: {detail}"),
        }
    }
}

/// Which scoring path produced a recommendation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "path", rename_all = "snake_case")]
pub enum RecommendationPath {
    /// No usage history; cheapest plans first
    ColdStart,
    /// No model artifact is active
    Heuristic,
    Model { version: String, predicted_category: PlanCategory },
    /// A model is active but could not be used for this request
    HeuristicFallback { reason: FallbackReason },
}

impl RecommendationPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ColdStart => "cold_start",
            Self::Heuristic => "heuristic",
            Self::Model { .. } => "model",
            Self::HeuristicFallback { .. } => "heuristic_fallback",
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::HeuristicFallback { .. })
    }
}

/// Ranked plans for one subscriber, best first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub subscriber_id: SubscriberId,
    pub path: RecommendationPath,
    pub plans: Vec<ScoredPlan>,
    pub generated_at: DateTime<Utc>,
}

impl Recommendation {
    pub fn plan_ids(&self) -> Vec<&str> {
        self.plans.iter().map(|scored| scored.plan.id.0.as_str()).collect()
    }
}

/// Stable descending sort by score, then truncate. Equal scores keep the
/// order of `scored`, which is catalog order.
pub(crate) fn rank(mut scored: Vec<ScoredPlan>, count: usize) -> Vec<ScoredPlan> {
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(count);
    scored
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::plan::{DataAllowance, PlanId};

    fn scored(id: &str, score: f64) -> ScoredPlan {
        ScoredPlan {
            plan: Plan {
                id: PlanId(id.to_string()),
                name: id.to_string(),
                download_mbps: 50.0,
                upload_mbps: None,
                allowance: DataAllowance::Capped { gb: 100.0 },
                price: Decimal::new(100, 0),
                validity_days: 30,
                category: PlanCategory::Basic,
            },
            score,
            components: ComponentScores::default(),
        }
    }

    #[test]
    fn rank_is_stable_for_equal_scores() {
        let ranked = rank(
            vec![scored("a", 0.5), scored("b", 0.9), scored("c", 0.5), scored("d", 0.5)],
            3,
        );
        let ids: Vec<_> = ranked.iter().map(|s| s.plan.id.0.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn path_serializes_with_tag() {
        let path = RecommendationPath::HeuristicFallback {
            reason: FallbackReason::ArtifactUnavailable { detail: "digest mismatch".to_string() },
        };
        let json = serde_json::to_value(&path).expect("serialize path");

        assert_eq!(json["path"], "heuristic_fallback");
        assert_eq!(json["reason"]["kind"], "artifact_unavailable");
        assert!(path.is_degraded());
        assert!(!RecommendationPath::Heuristic.is_degraded());
    }
}
