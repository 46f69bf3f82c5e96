//! # Accounts
//!
//! Registration, login, plan selection and the profile page. Every member
//! route goes through [`Member`], which loads the account and applies the
//! daily rollover before the handler sees it.
use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};
use bank::{
    accounts::{
        ACCOUNT_TYPE, AVAILABLE_SURVEYS, Account, Achievement, BALANCE, EDUCATION,
        EDUCATION_LEVELS, EMAIL, LAST_SURVEY_DATE, LOYALTY_POINTS, LOYALTY_REDEEM_POINTS,
        LOYALTY_REDEEM_VALUE, NAME, PLAN_SELECTED, REFERRAL_CODE, SURVEYS_COMPLETED_TODAY,
        SURVEYS_PER_DAY, USERS,
    },
    plans::Plan,
    store::{Database, FieldUpdate, StoreError},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::{
    auth::{AuthError, SessionToken, SignedIn},
    error::AppError,
    state::State,
    utils::{is_valid_email, random_referral_code, today},
};

pub const PLAN_SELECTION: &str = "/plan-selection";

const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Registration {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub education: String,
    pub accept_terms: bool,
    pub plan: Option<Plan>,
    /// The `ref` query parameter of the referral link.
    pub referral_code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Login {
    pub email: String,
    pub password: String,
    pub plan: Option<Plan>,
}

#[derive(Debug, Deserialize)]
pub struct PlanChoice {
    pub plan: Plan,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProfileEdit {
    pub name: Option<String>,
    pub education: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUp {
    #[serde(flatten)]
    pub session: SessionToken,
    pub account: Account,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    #[serde(flatten)]
    pub account: Account,
    pub min_withdrawal: f64,
    pub withdrawal_progress: f64,
    pub withdrawal_shortfall: f64,
    pub achievements: Vec<Achievement>,
}

impl From<Account> for ProfileView {
    fn from(account: Account) -> Self {
        Self {
            min_withdrawal: account.plan().min_withdrawal(),
            withdrawal_progress: account.withdrawal_progress(),
            withdrawal_shortfall: account.withdrawal_shortfall(),
            achievements: account.achievements(),
            account,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Notice {
    pub message: String,
}

impl Notice {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

fn check_credentials(email: &str, password: &str) -> Result<(), AppError> {
    if !is_valid_email(email.trim()) {
        return Err(AppError::validation("Please enter a valid email address"));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::validation(
            "Password must be at least 6 characters long",
        ));
    }
    Ok(())
}

fn check_registration(registration: &Registration) -> Result<Plan, AppError> {
    if registration.first_name.trim().is_empty() || registration.last_name.trim().is_empty() {
        return Err(AppError::validation("First name and last name are required"));
    }
    check_credentials(&registration.email, &registration.password)?;
    if !registration.accept_terms {
        return Err(AppError::validation(
            "You must accept the terms and conditions",
        ));
    }

    registration
        .plan
        .ok_or_else(|| AppError::validation("Please select a plan first"))
}

async fn unique_referral_code(db: &Database) -> Result<String, StoreError> {
    loop {
        let code = random_referral_code();
        let taken = db
            .find::<Account>(USERS, REFERRAL_CODE, &json!(code))
            .await?;

        if taken.is_empty() {
            return Ok(code);
        }
    }
}

async fn resolve_referrer(db: &Database, code: Option<&str>) -> Result<Option<String>, StoreError> {
    let Some(code) = code.map(str::trim).filter(|code| !code.is_empty()) else {
        return Ok(None);
    };

    let referrer = db
        .find::<Account>(USERS, REFERRAL_CODE, &json!(code))
        .await?
        .into_iter()
        .next()
        .map(|(uid, _)| uid);

    if referrer.is_none() {
        warn!("Referral code {code} does not match any account");
    }
    Ok(referrer)
}

pub async fn register(state: &State, registration: Registration) -> Result<SignedUp, AppError> {
    let plan = check_registration(&registration)?;
    let email = registration.email.trim().to_lowercase();

    let existing = state
        .db
        .find::<Account>(USERS, EMAIL, &json!(email))
        .await?;
    if !existing.is_empty() {
        return Err(AuthError::EmailAlreadyInUse.into());
    }

    let session = state.auth.sign_up(&email, &registration.password).await?;

    if let Err(e) = state.auth.send_email_verification(&session.uid).await {
        warn!("Could not send verification email to {email}: {e}");
    }

    let referred_by = resolve_referrer(&state.db, registration.referral_code.as_deref()).await?;
    let referral_code = unique_referral_code(&state.db).await?;

    let account = Account::new(
        format!(
            "{} {}",
            registration.first_name.trim(),
            registration.last_name.trim()
        ),
        email,
        registration.education,
        plan,
        referral_code,
        referred_by,
        Utc::now(),
    );
    state.db.set(USERS, &session.uid, &account).await?;

    info!("Created {} account for {}", plan, account.email);

    Ok(SignedUp {
        session,
        account,
        message: "Registered successfully! Please verify your email.",
    })
}

pub async fn login(state: &State, login: Login) -> Result<SessionToken, AppError> {
    check_credentials(&login.email, &login.password)?;

    let session = state.auth.sign_in(&login.email, &login.password).await?;

    if let Some(plan) = login.plan {
        let updates = [
            FieldUpdate::set(ACCOUNT_TYPE, json!(plan)),
            FieldUpdate::set(SURVEYS_PER_DAY, json!(plan.surveys_per_day())),
            FieldUpdate::set(AVAILABLE_SURVEYS, json!(plan.available_surveys())),
            FieldUpdate::set(PLAN_SELECTED, json!(true)),
        ];

        match state.db.update(USERS, &session.uid, &updates).await {
            Ok(()) => info!("Applied {plan} to {} on login", session.uid),
            Err(StoreError::NotFound { .. }) => {
                warn!("No account for {} to apply {plan} to", session.uid)
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(session)
}

/// Reads an account and rolls its daily counter over when the date changed.
/// A failed rollover write is logged and the reset values are still returned.
pub async fn load_account(db: &Database, uid: &str) -> Result<Option<Account>, AppError> {
    let Some(mut account) = db.get::<Account>(USERS, uid).await? else {
        return Ok(None);
    };

    let today = today();
    if account.reset_daily(today) {
        let updates = [
            FieldUpdate::set(SURVEYS_COMPLETED_TODAY, json!(0)),
            FieldUpdate::set(LAST_SURVEY_DATE, json!(today)),
        ];

        if let Err(e) = db.update(USERS, uid, &updates).await {
            warn!("Error resetting daily count for {uid}: {e}");
        }
    }

    Ok(Some(account))
}

pub async fn select_plan(state: &State, uid: &str, plan: Plan) -> Result<Account, AppError> {
    let account = state
        .db
        .get::<Account>(USERS, uid)
        .await?
        .ok_or_else(|| AppError::not_found("User data not found. Please contact support."))?;

    let mut updates = vec![FieldUpdate::set(PLAN_SELECTED, json!(true))];
    if account.plan() != plan {
        updates.extend([
            FieldUpdate::set(ACCOUNT_TYPE, json!(plan)),
            FieldUpdate::set(SURVEYS_PER_DAY, json!(plan.surveys_per_day())),
            FieldUpdate::set(AVAILABLE_SURVEYS, json!(plan.available_surveys())),
        ]);
        info!("{uid} switched from {} to {plan}", account.plan());
    }

    state.db.update(USERS, uid, &updates).await?;

    load_account(&state.db, uid)
        .await?
        .ok_or_else(|| AppError::not_found("User data not found. Please contact support."))
}

pub async fn edit_profile(state: &State, uid: &str, edit: ProfileEdit) -> Result<Notice, AppError> {
    let mut updates = Vec::new();

    if let Some(name) = edit.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::validation("Name is required"));
        }
        updates.push(FieldUpdate::set(NAME, json!(name)));
    }

    if let Some(education) = edit.education {
        if !EDUCATION_LEVELS.contains(&education.as_str()) {
            return Err(AppError::validation("Please select a valid education level"));
        }
        updates.push(FieldUpdate::set(EDUCATION, json!(education)));
    }

    if !updates.is_empty() {
        state.db.update(USERS, uid, &updates).await?;
    }

    Ok(Notice::new("Profile updated successfully!"))
}

/// The point check is repeated inside the store update, so concurrent
/// redemptions can't spend the same points twice.
pub async fn redeem_points(state: &State, member: &Member) -> Result<Notice, AppError> {
    let not_enough = || AppError::validation("Need at least 100 loyalty points to redeem!");

    if member.account.loyalty_points < LOYALTY_REDEEM_POINTS {
        return Err(not_enough());
    }

    let updates = [
        FieldUpdate::at_least(LOYALTY_POINTS, LOYALTY_REDEEM_POINTS),
        FieldUpdate::increment(LOYALTY_POINTS, -LOYALTY_REDEEM_POINTS),
        FieldUpdate::increment(BALANCE, LOYALTY_REDEEM_VALUE as i64),
    ];

    match state.db.update(USERS, &member.uid, &updates).await {
        Ok(()) => {}
        Err(StoreError::Precondition { .. }) => return Err(not_enough()),
        Err(e) => return Err(e.into()),
    }

    info!("{} redeemed {LOYALTY_REDEEM_POINTS} loyalty points", member.uid);
    Ok(Notice::new("Redeemed 100 points for Ksh 50!"))
}

/// A signed-in user with an account and a selected plan. Anyone else is sent
/// to plan selection.
#[derive(Clone, Debug)]
pub struct Member {
    pub uid: String,
    pub account: Account,
}

impl FromRequestParts<Arc<State>> for Member {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<State>) -> Result<Self, Self::Rejection> {
        let SignedIn { user, .. } = SignedIn::from_request_parts(parts, state).await?;

        match load_account(&state.db, &user.uid).await? {
            Some(account) if account.plan_selected => Ok(Member {
                uid: user.uid,
                account,
            }),
            _ => Err(AppError::Redirect(PLAN_SELECTION)),
        }
    }
}
