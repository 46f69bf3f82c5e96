//! # Accounts
//!
//! One document per user in the `users` collection. Mutated by survey
//! completion, withdrawals, profile edits and the referral trigger. Never
//! deleted.
//!
//! ## Daily counters
//! `surveysCompletedToday` only means something for `lastSurveyDate`. When the
//! stored date differs from today the counter is reset to zero and the date is
//! moved forward before anything reads it.
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::plans::Plan;

pub const USERS: &str = "users";

pub const NAME: &str = "name";
pub const EDUCATION: &str = "education";
pub const ACCOUNT_TYPE: &str = "accountType";
pub const SURVEYS_PER_DAY: &str = "surveysPerDay";
pub const AVAILABLE_SURVEYS: &str = "availableSurveys";
pub const BALANCE: &str = "balance";
pub const LOYALTY_POINTS: &str = "loyaltyPoints";
pub const REFERRAL_CODE: &str = "referralCode";
pub const REFERRAL_POINTS: &str = "referralPoints";
pub const REFERRED_BY: &str = "referredBy";
pub const TRANSACTIONS: &str = "transactions";
pub const SURVEYS_COMPLETED_TODAY: &str = "surveysCompletedToday";
pub const LAST_SURVEY_DATE: &str = "lastSurveyDate";
pub const COMPLETED_SURVEYS: &str = "completedSurveys";
pub const PLAN_SELECTED: &str = "planSelected";
pub const AVATAR: &str = "avatar";
pub const EMAIL: &str = "email";

pub const EDUCATION_LEVELS: [&str; 4] = [
    "Bachelors Degree",
    "High School",
    "Masters Degree",
    "PhD",
];

pub const LOYALTY_REDEEM_POINTS: i64 = 100;
pub const LOYALTY_REDEEM_VALUE: f64 = 50.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub education: String,
    #[serde(default)]
    pub account_type: Plan,
    #[serde(default = "default_quota")]
    pub surveys_per_day: u32,
    #[serde(default)]
    pub available_surveys: i64,
    #[serde(default)]
    pub balance: f64,
    #[serde(default)]
    pub loyalty_points: i64,
    #[serde(default)]
    pub referral_code: String,
    #[serde(default)]
    pub referral_points: i64,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub surveys_completed_today: u32,
    pub last_survey_date: Option<NaiveDate>,
    #[serde(default)]
    pub completed_surveys: Vec<String>,
    #[serde(default)]
    pub referred_by: Option<String>,
    #[serde(default)]
    pub plan_selected: bool,
    #[serde(default)]
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub avatar: Option<String>,
}

fn default_quota() -> u32 {
    Plan::Free.surveys_per_day()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Withdrawal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: f64,
    #[serde(default)]
    pub deduction: f64,
    pub method: String,
    pub date: DateTime<Utc>,
}

/// Why an account may or may not start a survey right now.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Eligibility {
    pub can_take_survey: bool,
    pub daily_limit_reached: bool,
    pub needs_upgrade: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Achievement {
    #[serde(rename = "Survey Master")]
    SurveyMaster,
    #[serde(rename = "Top Referrer")]
    TopReferrer,
}

impl Account {
    pub fn new(
        name: String,
        email: String,
        education: String,
        plan: Plan,
        referral_code: String,
        referred_by: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            name,
            email,
            education,
            account_type: plan,
            surveys_per_day: plan.surveys_per_day(),
            available_surveys: plan.available_surveys(),
            balance: 0.0,
            loyalty_points: 0,
            referral_code,
            referral_points: 0,
            transactions: Vec::new(),
            surveys_completed_today: 0,
            last_survey_date: Some(now.date_naive()),
            completed_surveys: Vec::new(),
            referred_by,
            plan_selected: true,
            is_admin: false,
            created_at: now,
            avatar: None,
        }
    }

    pub fn plan(&self) -> Plan {
        self.account_type
    }

    /// Zeroes the daily counter when `today` is a new day. Returns whether
    /// anything changed so the caller knows to persist it.
    pub fn reset_daily(&mut self, today: NaiveDate) -> bool {
        if self.last_survey_date == Some(today) {
            return false;
        }

        self.surveys_completed_today = 0;
        self.last_survey_date = Some(today);
        true
    }

    pub fn eligibility(&self) -> Eligibility {
        let daily_limit_reached = self.surveys_completed_today >= self.surveys_per_day;
        let needs_upgrade = self.plan().is_free() && self.available_surveys <= 0;

        Eligibility {
            can_take_survey: !daily_limit_reached && !needs_upgrade,
            daily_limit_reached,
            needs_upgrade,
        }
    }

    pub fn has_completed(&self, survey_id: &str) -> bool {
        self.completed_surveys.iter().any(|id| id == survey_id)
    }

    /// Denominator for the daily progress ring. The free tier always shows 20.
    pub fn daily_limit(&self) -> u32 {
        if self.plan().is_free() {
            Plan::Free.surveys_per_day()
        } else {
            self.surveys_per_day
        }
    }

    pub fn daily_progress(&self) -> u32 {
        let limit = self.daily_limit().max(1) as f64;
        (self.surveys_completed_today as f64 / limit * 100.0).round() as u32
    }

    pub fn withdrawal_progress(&self) -> f64 {
        (self.balance / self.plan().min_withdrawal() * 100.0).min(100.0)
    }

    pub fn withdrawal_shortfall(&self) -> f64 {
        (self.plan().min_withdrawal() - self.balance).max(0.0)
    }

    pub fn achievements(&self) -> Vec<Achievement> {
        let mut achievements = Vec::new();

        if self.completed_surveys.len() >= 10 {
            achievements.push(Achievement::SurveyMaster);
        }
        if self.referral_points >= 200 {
            achievements.push(Achievement::TopReferrer);
        }

        achievements
    }
}

/// Rounds a currency amount to cents.
pub fn round_currency(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
