//! # Referrals
//!
//! ## Trigger
//! A background task reads the change feed. Whenever an update to `users/{id}`
//! grows `completedSurveys` and the account has a `referredBy`, the referrer
//! gets 40 referral points. The feed queue is unbounded, so a busy trigger
//! falls behind instead of skipping writes. Changes are not deduplicated, so a
//! re-delivered change would award twice.
//!
//! ## Sharing
//! Links are built server-side so every client encodes them the same way.
use bank::{
    accounts::{Account, COMPLETED_SURVEYS, REFERRAL_POINTS, REFERRED_BY, USERS},
    store::{Database, Document, DocumentChange, FieldUpdate},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::{
    error::AppError,
    utils::{encode_uri_component, is_valid_email, is_valid_phone},
};

pub const REFERRAL_REWARD: i64 = 40;

const SHARE_TITLE: &str = "Join Mwananchi Surveys!";
const EMAIL_SUBJECT: &str = "Join Mwananchi Surveys and Earn Money!";
/// Would end the address part of a `mailto:` link.
const MAILTO_RESERVED: &[char] = &['?', '&', '#', '%', ','];

fn completed_count(document: &Document) -> usize {
    document
        .get(COMPLETED_SURVEYS)
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}

/// The referrer owed points for this change, if any.
pub fn referral_award(change: &DocumentChange) -> Option<String> {
    if change.collection != USERS {
        return None;
    }

    let (Some(before), Some(after)) = (&change.before, &change.after) else {
        return None;
    };
    if completed_count(after) <= completed_count(before) {
        return None;
    }

    after
        .get(REFERRED_BY)
        .and_then(Value::as_str)
        .filter(|referrer| !referrer.is_empty())
        .map(str::to_string)
}

pub fn spawn_trigger(db: Database) -> JoinHandle<()> {
    let mut changes = db.changes();

    tokio::spawn(async move {
        while let Some(change) = changes.recv().await {
            let Some(referrer) = referral_award(&change) else {
                continue;
            };

            match db
                .update(
                    USERS,
                    &referrer,
                    &[FieldUpdate::increment(REFERRAL_POINTS, REFERRAL_REWARD)],
                )
                .await
            {
                Ok(()) => info!(
                    "Awarded {REFERRAL_REWARD} referral points to {referrer} for {}",
                    change.id
                ),
                Err(e) => error!("Error awarding referral points to {referrer}: {e}"),
            }
        }
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ShareQuery {
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SharePayload {
    pub title: &'static str,
    pub text: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareTargets {
    pub native: SharePayload,
    pub whatsapp: String,
    pub telegram: String,
    pub email: Option<String>,
    pub sms: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralInfo {
    pub referral_code: String,
    pub referral_link: String,
    pub referral_points: i64,
    pub loyalty_points: i64,
    pub share_message: String,
    pub share: ShareTargets,
}

pub fn referral_link(base_url: &str, code: &str) -> String {
    format!("{base_url}?ref={code}")
}

pub fn share_message(code: &str, link: &str) -> String {
    format!(
        "Join Mwananchi Surveys and earn money by completing surveys! Use my referral code: {code}\nSign up here: {link}"
    )
}

pub fn referral_info(
    base_url: &str,
    account: &Account,
    query: ShareQuery,
) -> Result<ReferralInfo, AppError> {
    let code = &account.referral_code;
    let link = referral_link(base_url, code);
    let message = share_message(code, &link);
    let encoded = encode_uri_component(&message);

    let email = query
        .email
        .map(|to| {
            if !is_valid_email(&to) || to.contains(MAILTO_RESERVED) {
                return Err(AppError::validation("Please enter a valid email address."));
            }
            Ok(format!(
                "mailto:{to}?subject={}&body={encoded}",
                encode_uri_component(EMAIL_SUBJECT)
            ))
        })
        .transpose()?;

    let sms = query
        .phone
        .map(|to| {
            if !is_valid_phone(&to) {
                return Err(AppError::validation(
                    "Please enter a valid phone number (e.g., +254123456789).",
                ));
            }
            Ok(format!("sms:{to}?body={encoded}"))
        })
        .transpose()?;

    Ok(ReferralInfo {
        share: ShareTargets {
            native: SharePayload {
                title: SHARE_TITLE,
                text: message.clone(),
                url: link.clone(),
            },
            whatsapp: format!("https://wa.me/?text={encoded}"),
            telegram: format!("https://t.me/share/url?url={link}&text={encoded}"),
            email,
            sms,
        },
        referral_code: code.clone(),
        referral_link: link,
        referral_points: account.referral_points,
        loyalty_points: account.loyalty_points,
        share_message: message,
    })
}
