//! Backend of a survey rewards platform.
//!
//! Members pick a plan, answer short multiple-choice surveys for cash credited
//! per correct answer, invite friends for referral points and withdraw once
//! their balance clears the plan minimum.
//!
//!
//!
//! # Layout
//! - `bank`: models, the document store and its change feed, the seed catalog
//! - `server`: this crate, the HTTP surface and the referral trigger
//! - `process`: seeds the bundled survey catalog into the store
//! - `tester`: writes an answer payload to disk for poking the answer route
//!
//!
//!
//! # Requests
//!
//! Every route but `/plans`, `/auth/register`, `/auth/login` and `/avatars/{uid}`
//! needs `Authorization: Bearer <token>` from register or login.
//!
//! Member routes also need an account with a selected plan. Anyone without one
//! gets a `303` to `/plan-selection`.
//!
//! Answers are protobuf [`bank::payloads::Answer`] bodies, everything else is JSON.
//!
//! Sign-up and login failures carry an `x-auth-code` header such as
//! `auth/wrong-password` next to the readable message.
//!
//!
//!
//! # Consistency
//!
//! Balances, counters and referral points only move through atomic increments
//! in the store, so concurrent credits from two tabs both land. Redeeming
//! points carries a guard in the same update, so the points can't go negative.
//!
//! Withdrawal is the exception: it reads the balance and then sets it. The read
//! happens after payment verification, so only a credit that lands between
//! that read and the write is lost.
//!
//! The referral trigger runs off the change feed, after the write that caused
//! it. A member's profile may show the referrer's points a moment late.
//!
//!
//!
//! # Setup
//!
//! Run against an in-memory store.
//! ```sh
//! STORE_BACKEND=memory RUST_LOG=info cargo run --bin server
//! ```
//!
//! Seed the catalog.
//! ```sh
//! cargo run --bin process -- --redis-url redis://localhost:6379
//! ```
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{delete, get, post},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod accounts;
pub mod auth;
pub mod config;
pub mod error;
pub mod referrals;
pub mod routes;
pub mod runtime;
pub mod state;
pub mod storage;
pub mod surveys;
pub mod utils;
pub mod withdraw;

use routes::{
    admin_add_survey_handler, admin_delete_survey_handler, admin_surveys_handler,
    answer_handler, avatar_handler, avatar_upload_handler, catalog_handler,
    edit_profile_handler, home_handler, login_handler, logout_handler, plans_handler,
    profile_handler, profile_stream_handler, redeem_handler, referrals_handler,
    register_handler, select_plan_handler, send_verification_handler, session_handler,
    start_survey_handler, survey_handler, verify_email_handler, withdraw_handler,
};
use state::State;
use storage::MAX_AVATAR_BYTES;

pub fn app(state: Arc<State>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    // Above the avatar cap so the handler reports oversize uploads itself.
    let avatar_limit = DefaultBodyLimit::max(MAX_AVATAR_BYTES * 2);

    Router::new()
        .route("/plans", get(plans_handler))
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/auth/verification/send", post(send_verification_handler))
        .route("/auth/verification", post(verify_email_handler))
        .route("/session", get(session_handler))
        .route("/plan", post(select_plan_handler))
        .route("/home", get(home_handler))
        .route("/surveys", get(catalog_handler))
        .route("/surveys/{id}", get(survey_handler))
        .route("/surveys/{id}/start", post(start_survey_handler))
        .route("/surveys/{id}/answer", post(answer_handler))
        .route("/profile", get(profile_handler).patch(edit_profile_handler))
        .route("/profile/stream", get(profile_stream_handler))
        .route(
            "/profile/avatar",
            post(avatar_upload_handler).layer(avatar_limit),
        )
        .route("/avatars/{uid}", get(avatar_handler))
        .route("/withdraw", post(withdraw_handler))
        .route("/redeem", post(redeem_handler))
        .route("/referrals", get(referrals_handler))
        .route(
            "/admin/surveys",
            get(admin_surveys_handler).post(admin_add_survey_handler),
        )
        .route("/admin/surveys/{id}", delete(admin_delete_survey_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = State::new().await;

    info!("Starting referral trigger...");
    let trigger = referrals::spawn_trigger(state.db.clone());

    info!("Starting server...");
    let app = app(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await
        .unwrap();

    trigger.abort();
    println!("Server shutting down...");
}

async fn shutdown_signal(state: Arc<State>) {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    // Open SSE connections would otherwise hold the server up forever.
    state.shutdown();
}
