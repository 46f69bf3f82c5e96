//! Cash-out of the whole balance, less a 10% fee.
use std::{fmt, str::FromStr};

use bank::accounts::{
    Account, BALANCE, TRANSACTIONS, Transaction, TransactionKind, USERS, round_currency,
};
use bank::store::FieldUpdate;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::{accounts::Member, error::AppError, state::State};

pub const WITHDRAWAL_FEE: f64 = 0.10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaymentMethod {
    MpesaTill,
    GooglePayment,
}

impl PaymentMethod {
    pub fn name(self) -> &'static str {
        match self {
            PaymentMethod::MpesaTill => "M-PESA Till",
            PaymentMethod::GooglePayment => "Google Payment",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PaymentMethod {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [PaymentMethod::MpesaTill, PaymentMethod::GooglePayment]
            .into_iter()
            .find(|method| method.name() == s)
            .ok_or_else(|| AppError::validation(format!("Unsupported payment method: {s}")))
    }
}

#[derive(Debug, Deserialize)]
pub struct WithdrawalRequest {
    pub method: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalReceipt {
    pub message: String,
    pub transaction: Transaction,
    pub balance: f64,
}

/// Amount paid out and fee kept, both rounded to cents.
pub fn split(balance: f64) -> (f64, f64) {
    let deduction = round_currency(balance * WITHDRAWAL_FEE);
    let amount = round_currency(balance - deduction);
    (amount, deduction)
}

fn check_minimum(account: &Account) -> Result<f64, AppError> {
    let balance = account.balance;
    let min_withdrawal = account.plan().min_withdrawal();

    if balance < min_withdrawal {
        return Err(AppError::validation(format!(
            "Your balance (Ksh {balance}) is below the minimum withdrawal amount of Ksh {min_withdrawal} for your plan."
        )));
    }
    Ok(balance)
}

/// Stand-in for the payment provider's verification step. Always passes.
async fn verify_payment(state: &State, method: PaymentMethod) -> bool {
    tokio::time::sleep(state.config.verification_delay).await;
    info!("Verified {method} payment details");
    true
}

pub async fn withdraw(
    state: &State,
    member: &Member,
    request: WithdrawalRequest,
) -> Result<WithdrawalReceipt, AppError> {
    let method: PaymentMethod = request.method.parse()?;
    check_minimum(&member.account)?;

    if !verify_payment(state, method).await {
        return Err(AppError::validation(
            "Payment verification failed. Please try again.",
        ));
    }

    // Credits may have landed during verification.
    let account = state
        .db
        .get::<Account>(USERS, &member.uid)
        .await?
        .ok_or_else(|| AppError::not_found("User data not found. Please contact support."))?;
    let balance = check_minimum(&account)?;

    let (amount, deduction) = split(balance);
    let transaction = Transaction {
        kind: TransactionKind::Withdrawal,
        amount,
        deduction,
        method: method.name().to_string(),
        date: Utc::now(),
    };

    state
        .db
        .update(
            USERS,
            &member.uid,
            &[
                FieldUpdate::set(BALANCE, json!(amount)),
                FieldUpdate::array_append(TRANSACTIONS, json!(transaction)),
            ],
        )
        .await?;

    info!("{} withdrew Ksh {amount} via {method}", member.uid);

    Ok(WithdrawalReceipt {
        message: format!(
            "Successfully withdrawn Ksh {amount} via {method}! A 10% fee of Ksh {deduction} was deducted."
        ),
        transaction,
        balance: amount,
    })
}
