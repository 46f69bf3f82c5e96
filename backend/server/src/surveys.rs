//! # Catalog
//!
//! Home page, survey listing and the admin dashboard. Listings never carry
//! questions, so correct answers only leave the server through admin routes.
use bank::{
    accounts::{Account, Eligibility},
    store::Database,
    surveys::{SURVEYS, SortOption, Survey, categories, filter_and_sort},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{accounts::Member, error::AppError};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CatalogQuery {
    pub category: Option<String>,
    pub sort: Option<SortOption>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyCard {
    pub id: String,
    pub topic: String,
    pub category: String,
    pub reward: Option<f64>,
    pub estimated_time: Option<u32>,
    pub difficulty: Option<String>,
    pub question_count: usize,
    pub completed: bool,
}

impl SurveyCard {
    pub fn new(id: String, survey: &Survey, account: &Account) -> Self {
        Self {
            completed: account.has_completed(&id),
            id,
            topic: survey.topic.clone(),
            category: survey.category().to_string(),
            reward: survey.reward,
            estimated_time: survey.estimated_time,
            difficulty: survey.difficulty.clone(),
            question_count: survey.questions.len(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    pub categories: Vec<String>,
    pub surveys: Vec<SurveyCard>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeView {
    pub account: Account,
    #[serde(flatten)]
    pub eligibility: Eligibility,
    pub daily_limit: u32,
    pub daily_progress: u32,
    pub notices: Vec<String>,
    #[serde(flatten)]
    pub catalog: Catalog,
}

#[derive(Debug, Serialize)]
pub struct AdminSurvey {
    pub id: String,
    #[serde(flatten)]
    pub survey: Survey,
}

pub async fn catalog(db: &Database, account: &Account, query: CatalogQuery) -> Result<Catalog, AppError> {
    let surveys = db.list::<Survey>(SURVEYS).await?;
    let categories = categories(surveys.iter().map(|(_, survey)| survey));

    let category = query
        .category
        .as_deref()
        .unwrap_or(bank::surveys::ALL_CATEGORIES);
    let surveys = filter_and_sort(surveys, category, query.sort.unwrap_or_default())
        .into_iter()
        .map(|(id, survey)| SurveyCard::new(id, &survey, account))
        .collect();

    Ok(Catalog {
        categories,
        surveys,
    })
}

pub async fn home(db: &Database, member: Member, query: CatalogQuery) -> Result<HomeView, AppError> {
    let account = member.account;
    let eligibility = account.eligibility();

    let mut notices = Vec::new();
    if eligibility.daily_limit_reached {
        notices.push("You have reached your daily survey limit!".to_string());
    } else if eligibility.needs_upgrade {
        notices.push("Upgrade to a paid plan to continue earning!".to_string());
    }
    let greeting = if account.name.is_empty() {
        &account.email
    } else {
        &account.name
    };
    notices.push(format!("Welcome back, {greeting}!"));

    let catalog = catalog(db, &account, query).await?;

    Ok(HomeView {
        eligibility,
        daily_limit: account.daily_limit(),
        daily_progress: account.daily_progress(),
        notices,
        catalog,
        account,
    })
}

pub async fn survey(db: &Database, id: &str) -> Result<Survey, AppError> {
    db.get::<Survey>(SURVEYS, id)
        .await?
        .ok_or_else(|| AppError::not_found("Survey not found"))
}

pub async fn detail(db: &Database, account: &Account, id: &str) -> Result<SurveyCard, AppError> {
    let survey = survey(db, id).await?;

    Ok(SurveyCard::new(id.to_string(), &survey, account))
}

fn require_admin(member: &Member) -> Result<(), AppError> {
    if member.account.is_admin {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

pub async fn admin_list(db: &Database, member: &Member) -> Result<Vec<AdminSurvey>, AppError> {
    require_admin(member)?;

    Ok(db
        .list::<Survey>(SURVEYS)
        .await?
        .into_iter()
        .map(|(id, survey)| AdminSurvey { id, survey })
        .collect())
}

pub async fn admin_add(db: &Database, member: &Member, mut survey: Survey) -> Result<String, AppError> {
    require_admin(member)?;

    survey
        .check_new()
        .map_err(|e| AppError::validation(e.to_string()))?;
    survey.topic = survey.topic.trim().to_string();
    survey.created_at.get_or_insert_with(Utc::now);

    let id = db.add(SURVEYS, &survey).await?;
    info!("{} added survey {id} ({})", member.uid, survey.topic);

    Ok(id)
}

pub async fn admin_delete(db: &Database, member: &Member, id: &str) -> Result<(), AppError> {
    require_admin(member)?;

    if !db.delete(SURVEYS, id).await? {
        return Err(AppError::not_found("Survey not found"));
    }

    info!("{} deleted survey {id}", member.uid);
    Ok(())
}
