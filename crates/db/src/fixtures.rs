//! Deterministic demo portal data: the ten-plan catalog, subscribers drawn
//! from ten usage profiles, their subscription histories and recent usage.

use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use planwise_core::domain::plan::{DataAllowance, Plan, PlanCategory, PlanId};
use planwise_core::domain::subscriber::{Subscriber, SubscriberId};
use planwise_core::domain::subscription::{Subscription, SubscriptionId, SubscriptionStatus};
use planwise_core::domain::usage::UsageRecord;

use crate::connection::DbPool;
use crate::repositories::{
    PlanRepository, RepositoryError, SqlPlanRepository, SqlSubscriberRepository,
    SqlSubscriptionRepository, SqlUsageRepository, SubscriberRepository, SubscriptionRepository,
    UsageRepository,
};

pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_SUBSCRIBER_COUNT: usize = 30;
pub const USAGE_HISTORY_DAYS: i64 = 60;

const WEEKEND_FACTOR: f64 = 1.4;
const SPIKE_PROBABILITY: f64 = 0.08;
const UNCAPPED_DAILY_CEILING_GB: f64 = 800.0;

struct DemoPlan {
    id: &'static str,
    name: &'static str,
    download_mbps: f64,
    upload_mbps: f64,
    data_limit_gb: f64,
    price: i64,
    category: PlanCategory,
    unlimited: bool,
}

const DEMO_PLANS: &[DemoPlan] = &[
    DemoPlan {
        id: "basic-starter",
        name: "Basic Starter",
        download_mbps: 25.0,
        upload_mbps: 5.0,
        data_limit_gb: 50.0,
        price: 299,
        category: PlanCategory::Basic,
        unlimited: false,
    },
    DemoPlan {
        id: "home-essential",
        name: "Home Essential",
        download_mbps: 50.0,
        upload_mbps: 10.0,
        data_limit_gb: 100.0,
        price: 499,
        category: PlanCategory::Basic,
        unlimited: false,
    },
    DemoPlan {
        id: "family-connect",
        name: "Family Connect",
        download_mbps: 100.0,
        upload_mbps: 20.0,
        data_limit_gb: 200.0,
        price: 699,
        category: PlanCategory::Standard,
        unlimited: false,
    },
    DemoPlan {
        id: "power-user",
        name: "Power User",
        download_mbps: 300.0,
        upload_mbps: 50.0,
        data_limit_gb: 500.0,
        price: 999,
        category: PlanCategory::Premium,
        unlimited: false,
    },
    DemoPlan {
        id: "pro-unlimited",
        name: "Pro Unlimited",
        download_mbps: 500.0,
        upload_mbps: 100.0,
        data_limit_gb: 1000.0,
        price: 1499,
        category: PlanCategory::Premium,
        unlimited: true,
    },
    DemoPlan {
        id: "unlimited-elite",
        name: "Unlimited Elite",
        download_mbps: 1000.0,
        upload_mbps: 200.0,
        data_limit_gb: 2000.0,
        price: 1999,
        category: PlanCategory::Elite,
        unlimited: true,
    },
    DemoPlan {
        id: "student-special",
        name: "Student Special",
        download_mbps: 50.0,
        upload_mbps: 10.0,
        data_limit_gb: 75.0,
        price: 399,
        category: PlanCategory::Basic,
        unlimited: false,
    },
    DemoPlan {
        id: "business-basic",
        name: "Business Basic",
        download_mbps: 200.0,
        upload_mbps: 40.0,
        data_limit_gb: 300.0,
        price: 1299,
        category: PlanCategory::Premium,
        unlimited: false,
    },
    DemoPlan {
        id: "enterprise",
        name: "Enterprise",
        download_mbps: 1500.0,
        upload_mbps: 300.0,
        data_limit_gb: 5000.0,
        price: 2999,
        category: PlanCategory::Elite,
        unlimited: true,
    },
    DemoPlan {
        id: "gaming-pro",
        name: "Gaming Pro",
        download_mbps: 800.0,
        upload_mbps: 150.0,
        data_limit_gb: 1500.0,
        price: 1799,
        category: PlanCategory::Premium,
        unlimited: false,
    },
];

const LOCALITIES: &[(&str, &str)] = &[
    ("Mumbai", "Maharashtra"),
    ("Delhi", "Delhi"),
    ("Bangalore", "Karnataka"),
    ("Chennai", "Tamil Nadu"),
    ("Kolkata", "West Bengal"),
    ("Hyderabad", "Telangana"),
    ("Pune", "Maharashtra"),
    ("Ahmedabad", "Gujarat"),
    ("Jaipur", "Rajasthan"),
    ("Lucknow", "Uttar Pradesh"),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum UsageLevel {
    Light,
    Moderate,
    Heavy,
}

impl UsageLevel {
    fn daily_range(self) -> (f64, f64) {
        match self {
            Self::Light => (0.5, 2.0),
            Self::Moderate => (2.0, 6.0),
            Self::Heavy => (6.0, 15.0),
        }
    }

    fn suits(self, data_limit_gb: f64) -> bool {
        match self {
            Self::Light => data_limit_gb <= 200.0,
            Self::Moderate => (100.0..=1000.0).contains(&data_limit_gb),
            Self::Heavy => data_limit_gb >= 300.0,
        }
    }
}

struct Profile {
    label: &'static str,
    level: UsageLevel,
    intensity: f64,
}

const PROFILES: &[Profile] = &[
    Profile { label: "Professional", level: UsageLevel::Heavy, intensity: 0.8 },
    Profile { label: "Family", level: UsageLevel::Moderate, intensity: 0.7 },
    Profile { label: "Student", level: UsageLevel::Moderate, intensity: 0.9 },
    Profile { label: "Senior", level: UsageLevel::Light, intensity: 0.3 },
    Profile { label: "Gamer", level: UsageLevel::Heavy, intensity: 0.85 },
    Profile { label: "Remote Worker", level: UsageLevel::Heavy, intensity: 0.75 },
    Profile { label: "Casual User", level: UsageLevel::Light, intensity: 0.4 },
    Profile { label: "Streamer", level: UsageLevel::Heavy, intensity: 0.9 },
    Profile { label: "Small Business", level: UsageLevel::Heavy, intensity: 0.6 },
    Profile { label: "Tech Enthusiast", level: UsageLevel::Heavy, intensity: 0.95 },
];

#[derive(Clone, Copy, Debug)]
pub struct SeedOptions {
    pub seed: u64,
    pub subscribers: usize,
    /// Last day of generated usage.
    pub today: NaiveDate,
}

impl Default for SeedOptions {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            subscribers: DEFAULT_SUBSCRIBER_COUNT,
            today: Utc::now().date_naive(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DemoData {
    pub plans: Vec<Plan>,
    pub subscribers: Vec<Subscriber>,
    pub subscriptions: Vec<Subscription>,
    pub usage: Vec<UsageRecord>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SeedResult {
    pub plans: usize,
    pub subscribers: usize,
    pub subscriptions: usize,
    pub usage_records_written: u64,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

pub struct DemoDataset;

impl DemoDataset {
    pub fn plans() -> Vec<Plan> {
        DEMO_PLANS.iter().map(to_plan).collect()
    }

    /// Same options always produce the same data.
    pub fn generate(options: &SeedOptions) -> DemoData {
        let mut rng = StdRng::seed_from_u64(options.seed);
        let plans = Self::plans();
        let mut data = DemoData { plans: plans.clone(), ..DemoData::default() };

        for index in 0..options.subscribers {
            let profile = &PROFILES[index % PROFILES.len()];
            let (city, state) = LOCALITIES[index % LOCALITIES.len()];
            let subscriber_id = SubscriberId(format!("sub-{:03}", index + 1));

            let signup_days_ago = rng.gen_range(120..730);
            let signup_date = options.today - Duration::days(signup_days_ago);
            data.subscribers.push(Subscriber {
                id: subscriber_id.clone(),
                name: format!("{} User {}", profile.label, index + 1),
                signup_at: signup_date.and_hms_opt(9, 0, 0).map(|naive| naive.and_utc()),
                city: Some(city.to_string()),
                state: Some(state.to_string()),
            });

            let suitable: Vec<&Plan> = plans
                .iter()
                .filter(|plan| {
                    DEMO_PLANS
                        .iter()
                        .find(|demo| demo.id == plan.id.0)
                        .is_some_and(|demo| profile.level.suits(demo.data_limit_gb))
                })
                .collect();

            let history = rng.gen_range(1..=3);
            let mut start = signup_date + Duration::days(rng.gen_range(1..7));
            let mut current_plan = None;
            for sequence in 0..history {
                let Some(plan) = suitable.choose(&mut rng).copied() else {
                    break;
                };
                let is_current = sequence + 1 == history;
                let (status, start_date) = if is_current {
                    let started = options.today - Duration::days(rng.gen_range(0..25));
                    (SubscriptionStatus::Active, started)
                } else if rng.gen::<f64>() < 0.1 {
                    (SubscriptionStatus::Cancelled, start)
                } else {
                    (SubscriptionStatus::Expired, start)
                };
                let end_date = start_date + Duration::days(i64::from(plan.validity_days));

                data.subscriptions.push(Subscription {
                    id: SubscriptionId(format!("{}-s{}", subscriber_id.0, sequence + 1)),
                    subscriber_id: subscriber_id.clone(),
                    plan_id: Some(plan.id.clone()),
                    start_date: Some(start_date),
                    end_date: Some(end_date),
                    status,
                });

                start = end_date + Duration::days(rng.gen_range(1..30));
                if is_current {
                    current_plan = Some(plan);
                }
            }

            if let Some(plan) = current_plan {
                let records = usage_history(&mut rng, &subscriber_id, profile, plan, options.today);
                data.usage.extend(records);
            }
        }

        data
    }

    pub async fn load(pool: &DbPool, options: &SeedOptions) -> Result<SeedResult, RepositoryError> {
        let data = Self::generate(options);

        let plans = SqlPlanRepository::new(pool.clone());
        for plan in &data.plans {
            plans.save(plan.clone()).await?;
        }

        let subscribers = SqlSubscriberRepository::new(pool.clone());
        for subscriber in &data.subscribers {
            subscribers.save(subscriber.clone()).await?;
        }

        let subscriptions = SqlSubscriptionRepository::new(pool.clone());
        for subscription in &data.subscriptions {
            subscriptions.save(subscription.clone()).await?;
        }

        let usage_records_written =
            SqlUsageRepository::new(pool.clone()).save_batch(&data.usage).await?;

        let result = SeedResult {
            plans: data.plans.len(),
            subscribers: data.subscribers.len(),
            subscriptions: data.subscriptions.len(),
            usage_records_written,
        };
        info!(
            event_name = "db.seed.completed",
            seed = options.seed,
            plans = result.plans,
            subscribers = result.subscribers,
            subscriptions = result.subscriptions,
            usage_records_written = result.usage_records_written,
            "demo dataset loaded"
        );
        Ok(result)
    }

    /// Checks the catalog is complete and every seeded subscriber has an
    /// active subscription, usage and only resolvable plan references.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let quoted_plans = sql_array_from_ids(DEMO_PLANS.iter().map(|plan| plan.id));
        let plan_count: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(1) FROM plans WHERE id IN {quoted_plans}"))
                .fetch_one(pool)
                .await?;
        checks.push(("catalog", plan_count == DEMO_PLANS.len() as i64));

        let subscriber_count: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM subscribers WHERE id LIKE 'sub-%'")
                .fetch_one(pool)
                .await?;
        checks.push(("subscribers", subscriber_count > 0));

        let without_active: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM subscribers u
             WHERE u.id LIKE 'sub-%'
               AND NOT EXISTS (
                   SELECT 1 FROM subscriptions s
                   WHERE s.subscriber_id = u.id AND s.status = 'active'
               )",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("active-subscriptions", without_active == 0));

        let without_usage: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM subscribers u
             WHERE u.id LIKE 'sub-%'
               AND NOT EXISTS (SELECT 1 FROM usage_records r WHERE r.subscriber_id = u.id)",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("usage-history", without_usage == 0));

        let dangling_plans: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM subscriptions s
             WHERE s.plan_id IS NOT NULL
               AND NOT EXISTS (SELECT 1 FROM plans p WHERE p.id = s.plan_id)",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("plan-references", dangling_plans == 0));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes seeded subscribers (with their subscriptions and usage) and the
    /// demo catalog.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM subscribers WHERE id LIKE 'sub-%'").execute(&mut *tx).await?;
        let quoted_plans = sql_array_from_ids(DEMO_PLANS.iter().map(|plan| plan.id));
        sqlx::query(&format!("DELETE FROM plans WHERE id IN {quoted_plans}"))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

fn to_plan(demo: &DemoPlan) -> Plan {
    let allowance = if demo.unlimited {
        DataAllowance::Unlimited { fair_use_gb: Some(demo.data_limit_gb) }
    } else {
        DataAllowance::Capped { gb: demo.data_limit_gb }
    };

    Plan {
        id: PlanId(demo.id.to_string()),
        name: demo.name.to_string(),
        download_mbps: demo.download_mbps,
        upload_mbps: Some(demo.upload_mbps),
        allowance,
        price: Decimal::new(demo.price, 0),
        validity_days: 30,
        category: demo.category,
    }
}

fn usage_history(
    rng: &mut StdRng,
    subscriber_id: &SubscriberId,
    profile: &Profile,
    plan: &Plan,
    today: NaiveDate,
) -> Vec<UsageRecord> {
    let (low, high) = profile.level.daily_range();
    let base_daily = rng.gen_range(low..high) * profile.intensity;
    let daily_ceiling = plan
        .allowance
        .effective_cap_gb()
        .map(|cap| cap * 0.8)
        .unwrap_or(UNCAPPED_DAILY_CEILING_GB);

    (0..USAGE_HISTORY_DAYS)
        .rev()
        .map(|days_ago| {
            let date = today - Duration::days(days_ago);
            let weekend = matches!(date.weekday(), Weekday::Sat | Weekday::Sun);
            let weekend_factor = if weekend { WEEKEND_FACTOR } else { 1.0 };
            let month_factor = if (10..=20).contains(&date.day()) { 1.2 } else { 0.9 };
            let spike_factor =
                if rng.gen::<f64>() < SPIKE_PROBABILITY { rng.gen_range(2.0..4.0) } else { 1.0 };
            let noise = rng.gen_range(-0.3..0.3) * base_daily;

            let daily = (base_daily * weekend_factor * month_factor * spike_factor + noise)
                .clamp(0.1, daily_ceiling);
            let peak = daily * rng.gen_range(0.6..0.8);

            UsageRecord {
                subscriber_id: subscriber_id.clone(),
                date,
                data_used_gb: round2(daily),
                peak_gb: Some(round2(peak)),
                off_peak_gb: Some(round2(daily - peak)),
                upload_gb: Some(round2(daily * rng.gen_range(0.1..0.3))),
                average_speed_mbps: Some(round2(plan.download_mbps * rng.gen_range(0.7..0.95))),
            }
        })
        .collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn sql_array_from_ids<'a>(ids: impl IntoIterator<Item = &'a str>) -> String {
    let quoted = ids.into_iter().map(|id| format!("'{id}'")).collect::<Vec<_>>().join(", ");
    format!("({quoted})")
}
