//! Plan recommendation engine
//!
//! Usage records flow through [`UsageStatisticsCalculator`] and
//! [`FeatureEngineer`] into either the [`HeuristicRecommender`] or, when a
//! trained artifact is active, the [`ModelBasedRecommender`].
//! [`RecommendationService`] chooses the path per request.

pub mod artifact;
pub mod classifier;
pub mod engine;
pub mod features;
pub mod heuristic;
pub mod model;
pub mod source;
pub mod stats;
pub mod trainer;
pub mod types;

pub use artifact::{
    ActiveArtifact, ArtifactError, ArtifactStore, FsArtifactStore, InMemoryArtifactStore,
};
pub use classifier::{InferenceError, ModelArtifact, ARTIFACT_FORMAT_VERSION};
pub use engine::{EngineSettings, ModelStatus, RecommendationService};
pub use features::{
    FeatureEngineer, FeatureSchema, FeatureValue, FeatureVector, UsageCategory,
    CATEGORICAL_FEATURES, NUMERIC_FEATURES,
};
pub use heuristic::{HeuristicRecommender, HeuristicWeights};
pub use model::{ModelBasedRecommender, ModelBonusWeights};
pub use source::{InMemoryRecommendationSource, RecommendationSource};
pub use stats::{UsageStatistics, UsageStatisticsCalculator};
pub use trainer::{
    ModelTrainer, TrainingError, TrainingReport, TrainingSettings, TrainingStatus,
};
pub use types::{ComponentScores, FallbackReason, Recommendation, RecommendationPath, ScoredPlan};

/// Plans returned when the caller does not ask for a count
pub const DEFAULT_RECOMMENDATION_COUNT: usize = 3;

/// Usage window for heuristic scoring
pub const HEURISTIC_WINDOW_DAYS: u32 = 60;

/// Usage window for model features, at inference and in training
pub const MODEL_WINDOW_DAYS: u32 = 90;

/// Artifact slot the service reads and writes
pub const DEFAULT_MODEL_SLOT: &str = "plan-recommendation";

/// Default heuristic weights
pub const DEFAULT_HEURISTIC_WEIGHTS: HeuristicWeights = HeuristicWeights {
    capacity: 0.5,
    price: 0.3,
    speed: 0.2,
    base_growth: 1.2,
    volatility_growth: 0.1,
    peak_headroom: 1.1,
    overshoot_penalty: 0.1,
    undershoot_credit: 0.5,
    mbps_per_daily_gb: 8.0,
    min_required_mbps: 25.0,
};

/// Default model-path bonuses
pub const DEFAULT_MODEL_BONUSES: ModelBonusWeights = ModelBonusWeights {
    category_match: 40.0,
    capacity_buffered: 30.0,
    capacity_covered: 20.0,
    capacity_partial: 10.0,
    capacity_buffer: 1.2,
    good_value_ppu: 5.0,
    good_value_bonus: 20.0,
    fair_value_ppu: 10.0,
    fair_value_bonus: 10.0,
    speed_bonus: 10.0,
    speed_multiplier: 10.0,
};
