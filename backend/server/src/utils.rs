use std::sync::LazyLock;

use axum::body::Bytes;
use bank::{get_answer_from_bytes, payloads::Answer};
use chrono::{NaiveDate, Utc};
use rand::{Rng, thread_rng};
use regex::Regex;

use crate::error::AppError;

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern"));

static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[1-9]\d{1,14}$").expect("phone pattern"));

const REFERRAL_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
pub const REFERRAL_CODE_LENGTH: usize = 7;

pub fn get_answer(body: Bytes) -> Result<Answer, AppError> {
    get_answer_from_bytes(body).map_err(|_| AppError::MalformedPayload)
}

/// Calendar day used for the daily quota.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL.is_match(email)
}

pub fn is_valid_phone(phone: &str) -> bool {
    PHONE.is_match(phone)
}

pub fn random_referral_code() -> String {
    let mut rng = thread_rng();

    (0..REFERRAL_CODE_LENGTH)
        .map(|_| REFERRAL_ALPHABET[rng.gen_range(0..REFERRAL_ALPHABET.len())] as char)
        .collect()
}

/// Percent-encodes everything except `A-Z a-z 0-9 - _ . ! ~ * ' ( )`, the
/// same set a browser's `encodeURIComponent` leaves alone.
pub fn encode_uri_component(input: &str) -> String {
    let mut encoded = String::with_capacity(input.len());

    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'!'
            | b'~'
            | b'*'
            | b'\''
            | b'('
            | b')' => encoded.push(byte as char),
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }

    encoded
}
