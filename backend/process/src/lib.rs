//! # Survey Seeding
//!
//! Pushes the bundled catalog from [`bank::seed`] into the `surveys`
//! collection.
//!
//! ## Matching
//! Surveys are matched by exact `topic`. A match gets its `questions`
//! replaced and keeps its id, category and `createdAt`. Anything else is added
//! under a fresh id with `createdAt` stamped now.
//!
//! Topics are looked up one at a time, so a topic that appears twice in the
//! catalog is added once and then overwritten by the later entry.
//!
//! ## Re-running
//! Seeding again adds nothing new. Every topic is found and its questions are
//! rewritten with freshly drawn payout seeds.
use bank::{
    store::{Database, FieldUpdate, StoreError},
    surveys::{QUESTIONS, SURVEYS, Survey, TOPIC},
};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub added: usize,
    pub updated: usize,
}

pub fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);

    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
    ) {
        pb.set_style(style.progress_chars("=> "));
    }

    pb
}

/// Adds or updates one survey, returning whether it was new.
async fn seed_survey(db: &Database, mut survey: Survey) -> Result<bool, StoreError> {
    let existing = db
        .find::<Survey>(SURVEYS, TOPIC, &json!(survey.topic))
        .await?;

    if let Some((id, _)) = existing.into_iter().next() {
        db.update(
            SURVEYS,
            &id,
            &[FieldUpdate::set(QUESTIONS, json!(survey.questions))],
        )
        .await?;
        return Ok(false);
    }

    survey.created_at = Some(Utc::now());
    db.add(SURVEYS, &survey).await?;
    Ok(true)
}

pub async fn seed_surveys(
    db: &Database,
    surveys: Vec<Survey>,
    pb: &ProgressBar,
) -> Result<SeedReport, StoreError> {
    let mut report = SeedReport::default();

    for survey in surveys {
        pb.set_message(survey.topic.clone());

        if seed_survey(db, survey).await? {
            report.added += 1;
        } else {
            report.updated += 1;
        }

        pb.inc(1);
    }

    pb.finish_with_message("Done");
    Ok(report)
}
