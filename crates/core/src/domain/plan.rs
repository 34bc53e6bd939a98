use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlanId(pub String);

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Marketing tier a plan is sold under. This is also the label the
/// classifier learns to predict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanCategory {
    Basic,
    Standard,
    Premium,
    Elite,
}

impl PlanCategory {
    pub const ALL: [PlanCategory; 4] =
        [PlanCategory::Basic, PlanCategory::Standard, PlanCategory::Premium, PlanCategory::Elite];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Standard => "standard",
            Self::Premium => "premium",
            Self::Elite => "elite",
        }
    }
}

impl fmt::Display for PlanCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanCategory {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "standard" => Ok(Self::Standard),
            "premium" => Ok(Self::Premium),
            "elite" => Ok(Self::Elite),
            other => Err(DomainError::InvariantViolation(format!(
                "unknown plan category `{other}` (expected basic|standard|premium|elite)"
            ))),
        }
    }
}

/// How much data a plan includes per validity period.
///
/// Unlimited plans may still advertise a nominal fair-use figure; when they
/// do, scoring treats it as the cap.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataAllowance {
    Capped { gb: f64 },
    Unlimited { fair_use_gb: Option<f64> },
}

impl DataAllowance {
    /// Cap used in arithmetic, if the plan has one.
    pub fn effective_cap_gb(&self) -> Option<f64> {
        match *self {
            Self::Capped { gb } => Some(gb),
            Self::Unlimited { fair_use_gb } => fair_use_gb.filter(|gb| *gb > 0.0),
        }
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, Self::Unlimited { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
    pub download_mbps: f64,
    pub upload_mbps: Option<f64>,
    pub allowance: DataAllowance,
    pub price: Decimal,
    pub validity_days: u32,
    pub category: PlanCategory,
}

impl Plan {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.price <= Decimal::ZERO {
            return Err(DomainError::InvariantViolation(format!(
                "plan `{}` must have a positive price",
                self.id
            )));
        }

        if let DataAllowance::Capped { gb } = self.allowance {
            if !(gb.is_finite() && gb > 0.0) {
                return Err(DomainError::InvariantViolation(format!(
                    "plan `{}` must have a positive data cap unless unlimited",
                    self.id
                )));
            }
        }

        if !(self.download_mbps.is_finite() && self.download_mbps >= 0.0) {
            return Err(DomainError::InvariantViolation(format!(
                "plan `{}` has an invalid download speed",
                self.id
            )));
        }

        Ok(())
    }

    /// Upload speed, falling back to a tenth of the download speed.
    pub fn upload_mbps(&self) -> f64 {
        self.upload_mbps.unwrap_or(self.download_mbps / 10.0)
    }

    pub fn price_f64(&self) -> f64 {
        self.price.to_f64().unwrap_or(0.0)
    }

    /// Price per GB of included data. Undefined for unlimited plans
    /// without a nominal cap.
    pub fn price_per_gb(&self) -> Option<f64> {
        let cap = self.allowance.effective_cap_gb()?;
        (cap > 0.0).then(|| self.price_f64() / cap)
    }

    /// Download Mbps bought per currency unit.
    pub fn speed_efficiency(&self) -> Option<f64> {
        let price = self.price_f64();
        (price > 0.0).then(|| self.download_mbps / price)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{DataAllowance, Plan, PlanCategory, PlanId};

    fn plan(allowance: DataAllowance, price: i64) -> Plan {
        Plan {
            id: PlanId("plan-home".to_string()),
            name: "Home Essential".to_string(),
            download_mbps: 50.0,
            upload_mbps: None,
            allowance,
            price: Decimal::new(price, 0),
            validity_days: 30,
            category: PlanCategory::Basic,
        }
    }

    #[test]
    fn upload_defaults_to_a_tenth_of_download() {
        assert_eq!(plan(DataAllowance::Capped { gb: 100.0 }, 499).upload_mbps(), 5.0);
    }

    #[test]
    fn price_per_gb_is_undefined_for_uncapped_unlimited_plans() {
        let capped = plan(DataAllowance::Capped { gb: 100.0 }, 500);
        assert_eq!(capped.price_per_gb(), Some(5.0));

        let nominal = plan(DataAllowance::Unlimited { fair_use_gb: Some(1000.0) }, 1500);
        assert_eq!(nominal.price_per_gb(), Some(1.5));

        let open = plan(DataAllowance::Unlimited { fair_use_gb: None }, 1500);
        assert_eq!(open.price_per_gb(), None);
    }

    #[test]
    fn validate_rejects_non_positive_price_and_cap() {
        assert!(plan(DataAllowance::Capped { gb: 100.0 }, 0).validate().is_err());
        assert!(plan(DataAllowance::Capped { gb: 0.0 }, 100).validate().is_err());
        assert!(plan(DataAllowance::Unlimited { fair_use_gb: None }, 100).validate().is_ok());
    }

    #[test]
    fn category_parses_case_insensitively() {
        assert_eq!(" Premium ".parse::<PlanCategory>().ok(), Some(PlanCategory::Premium));
        assert!("gold".parse::<PlanCategory>().is_err());
    }
}
