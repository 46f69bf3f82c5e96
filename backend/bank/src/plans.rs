//! # Plans
//!
//! Static tier catalog. Never persisted, only read when an account is created
//! or switches tiers.
//!
//! | Plan             | Surveys/day | Min withdrawal | Payout    |
//! |------------------|-------------|----------------|-----------|
//! | Free Account     | 20          | Ksh 4500       | 40 - 50   |
//! | Business Basic   | Unlimited   | Ksh 3000       | 200 - 300 |
//! | Business Premium | Unlimited   | Ksh 2500       | 200 - 300 |
//! | Business Expert  | Unlimited   | Ksh 2000       | 200 - 300 |
use std::{fmt, ops::RangeInclusive, str::FromStr};

use serde::{Deserialize, Serialize};

/// Quota used by paid tiers to mean "no daily limit".
pub const UNLIMITED: u32 = 9999;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Plan {
    #[default]
    #[serde(rename = "Free Account")]
    Free,
    #[serde(rename = "Business Basic")]
    BusinessBasic,
    #[serde(rename = "Business Premium")]
    BusinessPremium,
    #[serde(rename = "Business Expert")]
    BusinessExpert,
}

/// Display attributes shown on the plan selection page.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanDetails {
    pub name: &'static str,
    pub surveys_per_day: u32,
    pub available_surveys: i64,
    pub min_withdrawal: f64,
    pub earnings_per_survey: &'static str,
    pub price: &'static str,
    pub earnings_per_month: Option<u32>,
    pub daily_income: Option<u32>,
    pub recommended: bool,
    pub unlimited: bool,
}

impl Plan {
    pub const ALL: [Plan; 4] = [
        Plan::Free,
        Plan::BusinessBasic,
        Plan::BusinessPremium,
        Plan::BusinessExpert,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Plan::Free => "Free Account",
            Plan::BusinessBasic => "Business Basic",
            Plan::BusinessPremium => "Business Premium",
            Plan::BusinessExpert => "Business Expert",
        }
    }

    pub fn is_free(self) -> bool {
        self == Plan::Free
    }

    pub fn surveys_per_day(self) -> u32 {
        match self {
            Plan::Free => 20,
            _ => UNLIMITED,
        }
    }

    /// Survey credits granted on registration or tier switch.
    pub fn available_surveys(self) -> i64 {
        match self {
            Plan::Free => 20,
            _ => UNLIMITED as i64,
        }
    }

    pub fn min_withdrawal(self) -> f64 {
        match self {
            Plan::Free => 4500.0,
            Plan::BusinessBasic => 3000.0,
            Plan::BusinessPremium => 2500.0,
            Plan::BusinessExpert => 2000.0,
        }
    }

    /// Range a per-question payout is drawn from.
    pub fn payout_range(self) -> RangeInclusive<u32> {
        match self {
            Plan::Free => 40..=50,
            _ => 200..=300,
        }
    }

    pub fn details(self) -> PlanDetails {
        let range = self.payout_range();

        let (price, earnings_per_month, daily_income) = match self {
            Plan::Free => ("Free", None, None),
            Plan::BusinessBasic => ("400 Ksh", Some(8000), Some(300)),
            Plan::BusinessPremium => ("800 Ksh", Some(15000), Some(600)),
            Plan::BusinessExpert => ("1600 Ksh", Some(30000), Some(1200)),
        };

        PlanDetails {
            name: self.name(),
            surveys_per_day: self.surveys_per_day(),
            available_surveys: self.available_surveys(),
            min_withdrawal: self.min_withdrawal(),
            earnings_per_survey: if *range.start() == 40 {
                "Ksh 40 - 50"
            } else {
                "Ksh 200 - 300"
            },
            price,
            earnings_per_month,
            daily_income,
            recommended: self == Plan::BusinessPremium,
            unlimited: self.surveys_per_day() == UNLIMITED,
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown plan: {0}")]
pub struct UnknownPlan(pub String);

impl FromStr for Plan {
    type Err = UnknownPlan;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Plan::ALL
            .into_iter()
            .find(|plan| plan.name() == s)
            .ok_or_else(|| UnknownPlan(s.to_string()))
    }
}

pub fn catalog() -> Vec<PlanDetails> {
    Plan::ALL.into_iter().map(Plan::details).collect()
}
