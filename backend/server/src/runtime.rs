//! # Survey Runtime
//!
//! Walks one member through one survey, a question at a time.
//!
//! ## Flow
//! 1. `start` checks the survey shape and the member's eligibility, then opens
//!    a run at question 0
//! 2. Each `answer` draws a payout from the plan range and credits it when the
//!    chosen option is correct
//! 3. After the feedback delay the run advances, or completes with three
//!    separate updates (daily counter, completed set, free-tier credit)
//!
//! ## Failures
//! Each remote update stands alone. A failure is reported back in `errors` and
//! never undoes an earlier update or stops the run from advancing.
//!
//! Runs live in memory only. Answering is not re-gated against the quota, so
//! a run opened before the limit was hit still finishes.
use std::collections::HashMap;

use bank::{
    accounts::{AVAILABLE_SURVEYS, BALANCE, COMPLETED_SURVEYS, SURVEYS_COMPLETED_TODAY, USERS},
    plans::Plan,
    store::{Database, FieldUpdate},
    surveys::{Question, SURVEYS, Survey},
};
use parking_lot::Mutex;
use rand::{Rng, thread_rng};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::{
    accounts::{Member, load_account},
    error::AppError,
    state::State,
    surveys,
};

type RunKey = (String, String);

#[derive(Clone, Debug)]
struct SurveyRun {
    topic: String,
    questions: Vec<Question>,
    index: usize,
    total_earned: u64,
    /// Set while an answer is being scored so a second click can't double-credit.
    answering: bool,
}

/// Every open run, keyed by member and survey.
#[derive(Debug, Default)]
pub struct SurveyRuns {
    runs: Mutex<HashMap<RunKey, SurveyRun>>,
}

impl SurveyRuns {
    fn open(&self, key: RunKey, run: SurveyRun) {
        self.runs.lock().insert(key, run);
    }

    /// Claims the current question for scoring.
    fn claim(&self, key: &RunKey) -> Result<SurveyRun, AppError> {
        let mut runs = self.runs.lock();
        let run = runs
            .get_mut(key)
            .ok_or_else(|| AppError::not_found("No survey in progress"))?;

        if run.answering {
            return Err(AppError::Unavailable(
                "Answer already being processed".to_string(),
            ));
        }
        run.answering = true;

        Ok(run.clone())
    }

    fn release(&self, key: &RunKey) {
        if let Some(run) = self.runs.lock().get_mut(key) {
            run.answering = false;
        }
    }

    /// Moves to the next question, returning the updated run.
    fn advance(&self, key: &RunKey, earned: u64) -> Option<SurveyRun> {
        let mut runs = self.runs.lock();
        let run = runs.get_mut(key)?;

        run.total_earned += earned;
        run.index += 1;
        run.answering = false;

        Some(run.clone())
    }

    fn close(&self, key: &RunKey) -> Option<SurveyRun> {
        self.runs.lock().remove(key)
    }

    pub fn is_open(&self, uid: &str, survey_id: &str) -> bool {
        self.runs
            .lock()
            .contains_key(&(uid.to_string(), survey_id.to_string()))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub survey_id: String,
    pub topic: String,
    /// Zero-based.
    pub index: usize,
    pub total: usize,
    pub text: String,
    pub options: Vec<String>,
    pub total_earned: u64,
}

impl QuestionView {
    fn new(survey_id: &str, run: &SurveyRun) -> Self {
        let question = &run.questions[run.index];

        Self {
            survey_id: survey_id.to_string(),
            topic: run.topic.clone(),
            index: run.index,
            total: run.questions.len(),
            text: question.text.clone(),
            options: question.options.iter().map(|option| option.text.clone()).collect(),
            total_earned: run.total_earned,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextSurvey {
    pub id: String,
    pub topic: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_earned: u64,
    pub survey_topic: String,
    pub next_survey: Option<NextSurvey>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOutcome {
    pub correct: bool,
    pub feedback: &'static str,
    /// Drawn for every answer, credited only when `correct`.
    pub payout: u32,
    pub errors: Vec<String>,
    pub next: Option<QuestionView>,
    pub summary: Option<Summary>,
}

pub fn draw_payout<R: Rng + ?Sized>(plan: Plan, rng: &mut R) -> u32 {
    rng.gen_range(plan.payout_range())
}

pub async fn start(state: &State, member: &Member, survey_id: &str) -> Result<QuestionView, AppError> {
    let survey = surveys::survey(&state.db, survey_id).await?;
    survey.check_runnable()?;

    if member.account.has_completed(survey_id) {
        return Err(AppError::Unavailable(
            "You have already completed this survey".to_string(),
        ));
    }

    let eligibility = member.account.eligibility();
    if eligibility.daily_limit_reached {
        return Err(AppError::Unavailable(
            "You have reached your daily survey limit!".to_string(),
        ));
    }
    if eligibility.needs_upgrade {
        return Err(AppError::Unavailable(
            "Upgrade to a paid plan to continue earning!".to_string(),
        ));
    }

    let run = SurveyRun {
        topic: survey.topic,
        questions: survey.questions,
        index: 0,
        total_earned: 0,
        answering: false,
    };
    let view = QuestionView::new(survey_id, &run);

    state
        .runs
        .open((member.uid.clone(), survey_id.to_string()), run);
    info!("{} started survey {survey_id}", member.uid);

    Ok(view)
}

pub async fn answer(
    state: &State,
    member: &Member,
    survey_id: &str,
    option_index: u32,
) -> Result<AnswerOutcome, AppError> {
    let key = (member.uid.clone(), survey_id.to_string());
    let run = state.runs.claim(&key)?;

    let question = &run.questions[run.index];
    let Some(option) = question.options.get(option_index as usize) else {
        state.runs.release(&key);
        return Err(AppError::validation("Invalid option"));
    };
    let correct = option.is_correct;

    let plan = member.account.plan();
    let payout = draw_payout(plan, &mut thread_rng());
    let mut errors = Vec::new();

    if correct {
        if let Err(e) = state
            .db
            .update(USERS, &member.uid, &[FieldUpdate::increment(BALANCE, payout as i64)])
            .await
        {
            warn!("Error updating balance for {}: {e}", member.uid);
            errors.push(format!("Error updating balance: {e}"));
        }
    }

    tokio::time::sleep(state.config.feedback_delay).await;

    let earned = if correct { payout as u64 } else { 0 };
    let feedback = if correct { "Correct!" } else { "Incorrect!" };

    if run.index + 1 < run.questions.len() {
        let next = state
            .runs
            .advance(&key, earned)
            .map(|run| QuestionView::new(survey_id, &run));

        return Ok(AnswerOutcome {
            correct,
            feedback,
            payout,
            errors,
            next,
            summary: None,
        });
    }

    let total_earned = state
        .runs
        .close(&key)
        .map_or(run.total_earned, |closed| closed.total_earned)
        + earned;

    complete(&state.db, &member.uid, survey_id, plan, &mut errors).await;

    let next_survey = match suggest_next(&state.db, &member.uid).await {
        Ok(next) => next,
        Err(e) => {
            warn!("Could not suggest a survey to {}: {e}", member.uid);
            None
        }
    };

    info!("{} completed survey {survey_id}, earned {total_earned}", member.uid);

    Ok(AnswerOutcome {
        correct,
        feedback,
        payout,
        errors,
        next: None,
        summary: Some(Summary {
            total_earned,
            survey_topic: run.topic,
            next_survey,
        }),
    })
}

/// The three completion writes, in order, each on its own.
async fn complete(db: &Database, uid: &str, survey_id: &str, plan: Plan, errors: &mut Vec<String>) {
    if let Err(e) = db
        .update(USERS, uid, &[FieldUpdate::increment(SURVEYS_COMPLETED_TODAY, 1)])
        .await
    {
        warn!("Error updating daily count for {uid}: {e}");
        errors.push(format!("Error updating survey status: {e}"));
    }

    if let Err(e) = db
        .update(USERS, uid, &[FieldUpdate::array_union(COMPLETED_SURVEYS, json!(survey_id))])
        .await
    {
        warn!("Error updating completed surveys for {uid}: {e}");
        errors.push(format!("Error updating survey status: {e}"));
    }

    if plan.is_free() {
        if let Err(e) = db
            .update(USERS, uid, &[FieldUpdate::increment(AVAILABLE_SURVEYS, -1)])
            .await
        {
            warn!("Error updating available surveys for {uid}: {e}");
            errors.push(format!("Error updating available surveys: {e}"));
        }
    }
}

/// First survey the member hasn't completed, if they can still take one.
async fn suggest_next(db: &Database, uid: &str) -> Result<Option<NextSurvey>, AppError> {
    let Some(account) = load_account(db, uid).await? else {
        return Ok(None);
    };
    if !account.eligibility().can_take_survey {
        return Ok(None);
    }

    Ok(db
        .list::<Survey>(SURVEYS)
        .await?
        .into_iter()
        .find(|(id, _)| !account.has_completed(id))
        .map(|(id, survey)| NextSurvey {
            id,
            topic: survey.topic,
        }))
}
