//! # Surveys
//!
//! Documents in the `surveys` collection. Written by the seeder and the admin
//! dashboard, read-only everywhere else.
//!
//! ## Listing
//! The catalog is fetched in bulk and filtered/sorted in memory:
//! - Category filter: `All` or an exact match, missing categories count as `General`
//! - Sort: `newest` (missing `createdAt` counts as newest), `reward` (high to low), `time` (short to long)
use std::{cmp::Ordering, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SURVEYS: &str = "surveys";

pub const TOPIC: &str = "topic";
pub const QUESTIONS: &str = "questions";

pub const ALL_CATEGORIES: &str = "All";
pub const DEFAULT_CATEGORY: &str = "General";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Survey {
    pub topic: String,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Question {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub options: Vec<SurveyOption>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyOption {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
    /// Seeded for correct options. Crediting draws from the plan range instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payout: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SurveyShapeError {
    #[error("No questions available")]
    NoQuestions,
    #[error("Error: Invalid question data.")]
    InvalidQuestion,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum NewSurveyError {
    #[error("Survey topic is required")]
    MissingTopic,
    #[error("Question text is required")]
    MissingQuestionText,
    #[error("At least two options are required")]
    TooFewOptions,
    #[error("At least one question with a correct option is required")]
    NoCorrectOption,
}

impl Survey {
    pub fn new(topic: impl Into<String>, questions: Vec<Question>) -> Self {
        Self {
            topic: topic.into(),
            questions,
            category: None,
            reward: None,
            estimated_time: None,
            difficulty: None,
            created_at: None,
        }
    }

    pub fn category(&self) -> &str {
        self.category.as_deref().unwrap_or(DEFAULT_CATEGORY)
    }

    /// Checks a survey can be run one question at a time.
    pub fn check_runnable(&self) -> Result<(), SurveyShapeError> {
        if self.questions.is_empty() {
            return Err(SurveyShapeError::NoQuestions);
        }

        if self
            .questions
            .iter()
            .any(|question| question.text.is_empty() || question.options.is_empty())
        {
            return Err(SurveyShapeError::InvalidQuestion);
        }

        Ok(())
    }

    /// Admin dashboard rules for a new survey.
    pub fn check_new(&self) -> Result<(), NewSurveyError> {
        if self.topic.trim().is_empty() {
            return Err(NewSurveyError::MissingTopic);
        }

        for question in &self.questions {
            if question.text.trim().is_empty() {
                return Err(NewSurveyError::MissingQuestionText);
            }
            if question.options.len() < 2 {
                return Err(NewSurveyError::TooFewOptions);
            }
        }

        if !self
            .questions
            .iter()
            .any(|question| question.options.iter().any(|option| option.is_correct))
        {
            return Err(NewSurveyError::NoCorrectOption);
        }

        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOption {
    #[default]
    Newest,
    Reward,
    Time,
}

impl FromStr for SortOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newest" => Ok(SortOption::Newest),
            "reward" => Ok(SortOption::Reward),
            "time" => Ok(SortOption::Time),
            other => Err(format!("Unknown sort option: {other}")),
        }
    }
}

/// `All` followed by every distinct category in catalog order.
pub fn categories<'a>(surveys: impl IntoIterator<Item = &'a Survey>) -> Vec<String> {
    let mut categories = vec![ALL_CATEGORIES.to_string()];

    for survey in surveys {
        let category = survey.category();
        if !categories.iter().any(|known| known == category) {
            categories.push(category.to_string());
        }
    }

    categories
}

pub fn filter_and_sort(
    mut surveys: Vec<(String, Survey)>,
    category: &str,
    sort: SortOption,
) -> Vec<(String, Survey)> {
    if category != ALL_CATEGORIES {
        surveys.retain(|(_, survey)| survey.category() == category);
    }

    match sort {
        SortOption::Newest => surveys.sort_by(|(_, a), (_, b)| newest_first(a, b)),
        SortOption::Reward => surveys.sort_by(|(_, a), (_, b)| {
            b.reward
                .unwrap_or(0.0)
                .partial_cmp(&a.reward.unwrap_or(0.0))
                .unwrap_or(Ordering::Equal)
        }),
        SortOption::Time => {
            surveys.sort_by_key(|(_, survey)| survey.estimated_time.unwrap_or(0));
        }
    }

    surveys
}

fn newest_first(a: &Survey, b: &Survey) -> Ordering {
    match (a.created_at, b.created_at) {
        (Some(a), Some(b)) => b.cmp(&a),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
