pub mod config;
pub mod domain;
pub mod errors;
pub mod recommend;

pub use domain::plan::{DataAllowance, Plan, PlanCategory, PlanId};
pub use domain::subscriber::{Subscriber, SubscriberId};
pub use domain::subscription::{Subscription, SubscriptionId, SubscriptionStatus, TrainingRow};
pub use domain::usage::UsageRecord;
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use recommend::{
    Recommendation, RecommendationPath, RecommendationService, RecommendationSource, ScoredPlan,
    TrainingReport,
};
