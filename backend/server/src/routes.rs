use std::{convert::Infallible, sync::Arc};

use axum::{
    Json,
    body::Bytes,
    extract::{self, Path, Query},
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use bank::{
    accounts::{AVATAR, Account, USERS},
    plans,
    store::FieldUpdate,
    surveys::Survey,
};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;

use crate::{
    accounts::{self, Login, Member, Notice, PlanChoice, ProfileEdit, ProfileView, Registration},
    auth::SignedIn,
    error::AppError,
    referrals::{self, ShareQuery},
    runtime,
    state::State,
    surveys::{self, CatalogQuery},
    utils::get_answer,
    withdraw::{self, WithdrawalRequest},
};

#[derive(Deserialize)]
pub struct VerificationCode {
    code: String,
}

pub async fn plans_handler() -> impl IntoResponse {
    Json(plans::catalog())
}

pub async fn register_handler(
    extract::State(state): extract::State<Arc<State>>,
    Json(registration): Json<Registration>,
) -> Result<impl IntoResponse, AppError> {
    let signed_up = accounts::register(&state, registration).await?;

    Ok((StatusCode::CREATED, Json(signed_up)))
}

pub async fn login_handler(
    extract::State(state): extract::State<Arc<State>>,
    Json(login): Json<Login>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(accounts::login(&state, login).await?))
}

pub async fn logout_handler(
    extract::State(state): extract::State<Arc<State>>,
    signed_in: SignedIn,
) -> Result<impl IntoResponse, AppError> {
    state.auth.sign_out(&signed_in.token).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn session_handler(signed_in: SignedIn) -> impl IntoResponse {
    Json(signed_in.user)
}

pub async fn send_verification_handler(
    extract::State(state): extract::State<Arc<State>>,
    signed_in: SignedIn,
) -> Result<impl IntoResponse, AppError> {
    state.auth.send_email_verification(&signed_in.user.uid).await?;

    Ok(Json(Notice::new("Verification email sent!")))
}

pub async fn verify_email_handler(
    extract::State(state): extract::State<Arc<State>>,
    signed_in: SignedIn,
    Json(payload): Json<VerificationCode>,
) -> Result<impl IntoResponse, AppError> {
    state
        .auth
        .verify_email(&signed_in.user.uid, &payload.code)
        .await?;

    Ok(Json(Notice::new("Email verified!")))
}

pub async fn select_plan_handler(
    extract::State(state): extract::State<Arc<State>>,
    signed_in: SignedIn,
    Json(choice): Json<PlanChoice>,
) -> Result<impl IntoResponse, AppError> {
    let account = accounts::select_plan(&state, &signed_in.user.uid, choice.plan).await?;

    Ok(Json(account))
}

pub async fn home_handler(
    extract::State(state): extract::State<Arc<State>>,
    member: Member,
    Query(query): Query<CatalogQuery>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(surveys::home(&state.db, member, query).await?))
}

pub async fn catalog_handler(
    extract::State(state): extract::State<Arc<State>>,
    member: Member,
    Query(query): Query<CatalogQuery>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(surveys::catalog(&state.db, &member.account, query).await?))
}

pub async fn survey_handler(
    extract::State(state): extract::State<Arc<State>>,
    member: Member,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(surveys::detail(&state.db, &member.account, &id).await?))
}

pub async fn start_survey_handler(
    extract::State(state): extract::State<Arc<State>>,
    member: Member,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(runtime::start(&state, &member, &id).await?))
}

pub async fn answer_handler(
    extract::State(state): extract::State<Arc<State>>,
    member: Member,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let answer = get_answer(body)?;

    Ok(Json(
        runtime::answer(&state, &member, &id, answer.option_index).await?,
    ))
}

pub async fn profile_handler(member: Member) -> impl IntoResponse {
    Json(ProfileView::from(member.account))
}

pub async fn edit_profile_handler(
    extract::State(state): extract::State<Arc<State>>,
    member: Member,
    Json(edit): Json<ProfileEdit>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(accounts::edit_profile(&state, &member.uid, edit).await?))
}

/// Live profile as server-sent events, one `profile` event per snapshot.
/// The stream ends when the server starts shutting down.
pub async fn profile_stream_handler(
    extract::State(state): extract::State<Arc<State>>,
    member: Member,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let snapshots = state.db.subscribe::<Account>(USERS, &member.uid).await?;

    let events = snapshots.map(|snapshot| {
        let event = match snapshot {
            Ok(account) => Event::default()
                .event("profile")
                .json_data(ProfileView::from(account))
                .unwrap_or_else(|e| Event::default().event("error").data(e.to_string())),
            Err(e) => Event::default().event("error").data(e.to_string()),
        };

        Ok(event)
    });
    let events = events.take_until(state.on_shutdown());

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

pub async fn avatar_upload_handler(
    extract::State(state): extract::State<Arc<State>>,
    member: Member,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    state.avatars.put(&member.uid, content_type, &body).await?;

    let url = format!("{}/avatars/{}", state.config.public_url, member.uid);
    state
        .db
        .update(USERS, &member.uid, &[FieldUpdate::set(AVATAR, json!(url))])
        .await?;

    Ok(Json(Notice::new("Avatar updated successfully!")))
}

pub async fn avatar_handler(
    extract::State(state): extract::State<Arc<State>>,
    Path(uid): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let (content_type, bytes) = state
        .avatars
        .get(&uid)
        .await?
        .ok_or_else(|| AppError::not_found("Avatar not found"))?;

    Ok(([(CONTENT_TYPE, content_type)], bytes))
}

pub async fn withdraw_handler(
    extract::State(state): extract::State<Arc<State>>,
    member: Member,
    Json(request): Json<WithdrawalRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(withdraw::withdraw(&state, &member, request).await?))
}

pub async fn redeem_handler(
    extract::State(state): extract::State<Arc<State>>,
    member: Member,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(accounts::redeem_points(&state, &member).await?))
}

pub async fn referrals_handler(
    extract::State(state): extract::State<Arc<State>>,
    member: Member,
    Query(query): Query<ShareQuery>,
) -> Result<impl IntoResponse, AppError> {
    let info = referrals::referral_info(&state.config.referral_base_url, &member.account, query)?;

    Ok(Json(info))
}

pub async fn admin_surveys_handler(
    extract::State(state): extract::State<Arc<State>>,
    member: Member,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(surveys::admin_list(&state.db, &member).await?))
}

pub async fn admin_add_survey_handler(
    extract::State(state): extract::State<Arc<State>>,
    member: Member,
    Json(survey): Json<Survey>,
) -> Result<impl IntoResponse, AppError> {
    let id = surveys::admin_add(&state.db, &member, survey).await?;

    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

pub async fn admin_delete_survey_handler(
    extract::State(state): extract::State<Arc<State>>,
    member: Member,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    surveys::admin_delete(&state.db, &member, &id).await?;

    Ok(StatusCode::NO_CONTENT)
}
