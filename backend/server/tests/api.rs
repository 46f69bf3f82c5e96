use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{
        Request, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE, LOCATION},
    },
};
use bank::{
    accounts::{
        AVAILABLE_SURVEYS, Account, BALANCE, LAST_SURVEY_DATE, SURVEYS_COMPLETED_TODAY, USERS,
    },
    payloads::Answer,
    store::{Database, FieldUpdate},
    surveys::{Question, SURVEYS, Survey, SurveyOption},
};
use futures::StreamExt;
use prost::Message;
use serde_json::{Value, json};
use server::{
    app,
    config::{Config, StoreBackend},
    referrals::spawn_trigger,
    state::State,
};
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    state: Arc<State>,
    router: Router,
    _avatars: TempDir,
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        request = request.header(AUTHORIZATION, format!("Bearer {token}"));
    }

    request.body(Body::from(body.to_string())).unwrap()
}

struct Signup {
    uid: String,
    token: String,
}

impl TestApp {
    fn new() -> Self {
        let avatars = TempDir::new().unwrap();
        let config = Config {
            store_backend: StoreBackend::Memory,
            avatar_dir: avatars.path().to_path_buf(),
            feedback_delay: Duration::ZERO,
            verification_delay: Duration::ZERO,
            ..Config::default()
        };
        let state = State::with_database(config, Database::memory());

        Self {
            router: app(state.clone()),
            state,
            _avatars: avatars,
        }
    }

    fn db(&self) -> &Database {
        &self.state.db
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();

        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, body)
    }

    async fn json(&self, method: &str, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(json_request(method, uri, token, body)).await
    }

    /// Response header from a JSON request, for checks the body can't carry.
    async fn header(&self, uri: &str, body: Value, name: &str) -> Option<String> {
        let response = self
            .router
            .clone()
            .oneshot(json_request("POST", uri, None, body))
            .await
            .unwrap();

        response
            .headers()
            .get(name)
            .map(|value| value.to_str().unwrap().to_string())
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut request = Request::builder().uri(uri);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        self.send(request.body(Body::empty()).unwrap()).await
    }

    async fn answer(&self, token: &str, survey_id: &str, option_index: u32) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(format!("/surveys/{survey_id}/answer"))
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(CONTENT_TYPE, "application/x-protobuf")
            .body(Body::from(Answer { option_index }.encode_to_vec()))
            .unwrap();

        self.send(request).await
    }

    async fn register(&self, email: &str, plan: &str, referral_code: Option<&str>) -> Signup {
        let (status, body) = self
            .json(
                "POST",
                "/auth/register",
                None,
                json!({
                    "firstName": "Jane",
                    "lastName": "Doe",
                    "email": email,
                    "password": "secret1",
                    "education": "PhD",
                    "acceptTerms": true,
                    "plan": plan,
                    "referralCode": referral_code,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");

        Signup {
            uid: body["uid"].as_str().unwrap().to_string(),
            token: body["token"].as_str().unwrap().to_string(),
        }
    }

    async fn account(&self, uid: &str) -> Account {
        self.db().get(USERS, uid).await.unwrap().unwrap()
    }

    async fn update(&self, uid: &str, updates: &[FieldUpdate]) {
        self.db().update(USERS, uid, updates).await.unwrap();
    }

    async fn add_survey(&self, topic: &str, questions: usize) -> String {
        let questions = (0..questions)
            .map(|i| Question {
                text: format!("Question {i}"),
                options: vec![
                    SurveyOption {
                        text: "Right".into(),
                        is_correct: true,
                        payout: Some(75),
                    },
                    SurveyOption {
                        text: "Wrong".into(),
                        is_correct: false,
                        payout: None,
                    },
                ],
            })
            .collect();

        self.db().add(SURVEYS, &Survey::new(topic, questions)).await.unwrap()
    }
}

#[tokio::test]
async fn plans_are_public() {
    let app = TestApp::new();
    let (status, body) = app.get("/plans", None).await;

    assert_eq!(status, StatusCode::OK);
    let plans = body.as_array().unwrap();
    assert_eq!(plans.len(), 4);
    assert_eq!(plans[0]["name"], "Free Account");
    assert_eq!(plans[2]["recommended"], true);
    assert_eq!(plans[3]["minWithdrawal"], 2000.0);
}

#[tokio::test]
async fn member_routes_need_a_session() {
    let app = TestApp::new();

    let (status, _) = app.get("/home", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/home", Some("not-a-token")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn accounts_without_a_plan_are_redirected() {
    let app = TestApp::new();
    let session = app.state.auth.sign_up("orphan@example.com", "secret1").await.unwrap();

    let request = Request::builder()
        .uri("/home")
        .header(AUTHORIZATION, format!("Bearer {}", session.token))
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[LOCATION], "/plan-selection");

    let (status, body) = app
        .json("POST", "/plan", Some(&session.token), json!({ "plan": "Business Basic" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "User data not found. Please contact support.");
}

#[tokio::test]
async fn registration_reports_validation_and_provider_errors() {
    let app = TestApp::new();

    let (status, body) = app
        .json(
            "POST",
            "/auth/register",
            None,
            json!({ "firstName": "Jane", "lastName": "Doe", "email": "jane@example.com", "password": "secret1", "acceptTerms": true }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Please select a plan first");

    app.register("jane@example.com", "Free Account", None).await;
    let (status, body) = app
        .json(
            "POST",
            "/auth/register",
            None,
            json!({ "firstName": "Jane", "lastName": "Doe", "email": "jane@example.com", "password": "secret1", "acceptTerms": true, "plan": "Free Account" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body, "This email is already registered.");

    let code = app
        .header(
            "/auth/register",
            json!({ "firstName": "Jane", "lastName": "Doe", "email": "jane@example.com", "password": "secret1", "acceptTerms": true, "plan": "Free Account" }),
            "x-auth-code",
        )
        .await;
    assert_eq!(code.as_deref(), Some("auth/email-already-in-use"));
}

#[tokio::test]
async fn login_and_logout() {
    let app = TestApp::new();
    let signup = app.register("jane@example.com", "Free Account", None).await;

    let (status, body) = app
        .json("POST", "/auth/login", None, json!({ "email": "jane@example.com", "password": "wrong-one" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, "Incorrect password.");

    let code = app
        .header(
            "/auth/login",
            json!({ "email": "nobody@example.com", "password": "secret1" }),
            "x-auth-code",
        )
        .await;
    assert_eq!(code.as_deref(), Some("auth/user-not-found"));

    let (status, body) = app
        .json(
            "POST",
            "/auth/login",
            None,
            json!({ "email": "jane@example.com", "password": "secret1", "plan": "Business Premium" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["uid"], signup.uid.as_str());
    let token = body["token"].as_str().unwrap().to_string();
    assert_eq!(app.account(&signup.uid).await.surveys_per_day, 9999);

    let (status, body) = app.get("/session", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "jane@example.com");

    let (status, _) = app.json("POST", "/auth/logout", Some(&token), Value::Null).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.get("/session", Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn free_member_completes_one_question_survey() {
    let app = TestApp::new();
    let signup = app.register("jane@example.com", "Free Account", None).await;
    let survey_id = app.add_survey("Coffee", 1).await;

    let (status, body) = app
        .json("POST", &format!("/surveys/{survey_id}/start"), Some(&signup.token), Value::Null)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["options"], json!(["Right", "Wrong"]));
    assert_eq!(body["total"], 1);

    let (status, body) = app.answer(&signup.token, &survey_id, 0).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["feedback"], "Correct!");
    assert!(body["errors"].as_array().unwrap().is_empty());

    let payout = body["payout"].as_f64().unwrap();
    assert!((40.0..=50.0).contains(&payout));
    assert_eq!(body["summary"]["totalEarned"].as_f64(), Some(payout));
    assert_eq!(body["summary"]["surveyTopic"], "Coffee");
    assert_eq!(body["summary"]["nextSurvey"], Value::Null);
    assert!(!app.state.runs.is_open(&signup.uid, &survey_id));

    let account = app.account(&signup.uid).await;
    assert_eq!(account.balance, payout);
    assert_eq!(account.surveys_completed_today, 1);
    assert_eq!(account.available_surveys, 19);
    assert_eq!(account.completed_surveys, vec![survey_id.clone()]);

    let (status, body) = app
        .json("POST", &format!("/surveys/{survey_id}/start"), Some(&signup.token), Value::Null)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body, "You have already completed this survey");
}

#[tokio::test]
async fn wrong_answers_earn_nothing_and_runs_advance() {
    let app = TestApp::new();
    let signup = app.register("jane@example.com", "Business Basic", None).await;
    let survey_id = app.add_survey("Banking", 2).await;
    let other_id = app.add_survey("Transport", 1).await;

    app.json("POST", &format!("/surveys/{survey_id}/start"), Some(&signup.token), Value::Null)
        .await;

    let (status, body) = app.answer(&signup.token, &survey_id, 1).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["feedback"], "Incorrect!");
    assert_eq!(body["next"]["index"], 1);
    assert_eq!(body["next"]["totalEarned"], 0);
    assert_eq!(app.account(&signup.uid).await.balance, 0.0);

    let (_, body) = app.answer(&signup.token, &survey_id, 0).await;
    let payout = body["payout"].as_f64().unwrap();
    assert!((200.0..=300.0).contains(&payout));
    assert_eq!(body["summary"]["nextSurvey"]["id"], other_id.as_str());

    let account = app.account(&signup.uid).await;
    assert_eq!(account.balance, payout);
    // Paid tiers keep their credits.
    assert_eq!(account.available_surveys, 9999);
}

#[tokio::test]
async fn answers_need_an_open_run_and_a_valid_payload() {
    let app = TestApp::new();
    let signup = app.register("jane@example.com", "Free Account", None).await;
    let survey_id = app.add_survey("Coffee", 1).await;

    let (status, body) = app.answer(&signup.token, &survey_id, 0).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "No survey in progress");

    app.json("POST", &format!("/surveys/{survey_id}/start"), Some(&signup.token), Value::Null)
        .await;

    let (status, _) = app.answer(&signup.token, &survey_id, 7).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method("POST")
        .uri(format!("/surveys/{survey_id}/answer"))
        .header(AUTHORIZATION, format!("Bearer {}", signup.token))
        .body(Body::from(vec![0xff, 0xff, 0xff]))
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Malformed payload");
}

#[tokio::test]
async fn start_is_gated_by_quota_and_credits() {
    let app = TestApp::new();
    let signup = app.register("jane@example.com", "Free Account", None).await;
    let survey_id = app.add_survey("Coffee", 1).await;
    let start = format!("/surveys/{survey_id}/start");

    app.update(&signup.uid, &[FieldUpdate::set(SURVEYS_COMPLETED_TODAY, json!(20))]).await;
    let (status, body) = app.json("POST", &start, Some(&signup.token), Value::Null).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body, "You have reached your daily survey limit!");

    app.update(
        &signup.uid,
        &[
            FieldUpdate::set(SURVEYS_COMPLETED_TODAY, json!(0)),
            FieldUpdate::set(AVAILABLE_SURVEYS, json!(0)),
        ],
    )
    .await;
    let (status, body) = app.json("POST", &start, Some(&signup.token), Value::Null).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body, "Upgrade to a paid plan to continue earning!");
}

#[tokio::test]
async fn invalid_surveys_cannot_start() {
    let app = TestApp::new();
    let signup = app.register("jane@example.com", "Free Account", None).await;
    let empty = app.db().add(SURVEYS, &Survey::new("Empty", Vec::new())).await.unwrap();

    let (status, body) = app
        .json("POST", &format!("/surveys/{empty}/start"), Some(&signup.token), Value::Null)
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body, "No questions available");

    let (status, body) = app
        .json("POST", "/surveys/missing/start", Some(&signup.token), Value::Null)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "Survey not found");
}

#[tokio::test]
async fn home_rolls_the_day_over() {
    let app = TestApp::new();
    let signup = app.register("jane@example.com", "Free Account", None).await;
    app.add_survey("Coffee", 1).await;

    app.update(
        &signup.uid,
        &[
            FieldUpdate::set(SURVEYS_COMPLETED_TODAY, json!(20)),
            FieldUpdate::set(LAST_SURVEY_DATE, json!("2020-01-01")),
        ],
    )
    .await;

    let (status, body) = app.get("/home", Some(&signup.token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["account"]["surveysCompletedToday"], 0);
    assert_eq!(body["canTakeSurvey"], true);
    assert_eq!(body["dailyProgress"], 0);
    assert_eq!(body["surveys"].as_array().unwrap().len(), 1);
    assert_eq!(body["categories"], json!(["All", "General"]));

    assert_eq!(app.account(&signup.uid).await.surveys_completed_today, 0);
}

#[tokio::test]
async fn referrer_earns_points_when_invitee_completes() {
    let app = TestApp::new();
    let trigger = spawn_trigger(app.state.db.clone());

    let referrer = app.register("boss@example.com", "Free Account", None).await;
    let code = app.account(&referrer.uid).await.referral_code;
    let invitee = app.register("jane@example.com", "Free Account", Some(&code)).await;
    assert_eq!(app.account(&invitee.uid).await.referred_by, Some(referrer.uid.clone()));

    let survey_id = app.add_survey("Coffee", 1).await;
    app.json("POST", &format!("/surveys/{survey_id}/start"), Some(&invitee.token), Value::Null)
        .await;
    app.answer(&invitee.token, &survey_id, 1).await;

    let mut points = 0;
    for _ in 0..50 {
        points = app.account(&referrer.uid).await.referral_points;
        if points > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(points, 40);

    // A balance change alone awards nothing more.
    app.update(&invitee.uid, &[FieldUpdate::increment(BALANCE, 5)]).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(app.account(&referrer.uid).await.referral_points, 40);

    let (status, body) = app.get("/referrals", Some(&referrer.token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["referralPoints"], 40);
    assert_eq!(
        body["referralLink"],
        format!("https://mwananchisurveys.com/register?ref={code}")
    );

    trigger.abort();
}

#[tokio::test]
async fn withdrawal_below_and_above_minimum() {
    let app = TestApp::new();
    let signup = app.register("jane@example.com", "Free Account", None).await;

    app.update(&signup.uid, &[FieldUpdate::set(BALANCE, json!(1000.0))]).await;
    let (status, body) = app
        .json("POST", "/withdraw", Some(&signup.token), json!({ "method": "M-PESA Till" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        "Your balance (Ksh 1000) is below the minimum withdrawal amount of Ksh 4500 for your plan."
    );
    assert_eq!(app.account(&signup.uid).await.balance, 1000.0);

    app.update(&signup.uid, &[FieldUpdate::set(BALANCE, json!(5000.0))]).await;
    let (status, body) = app
        .json("POST", "/withdraw", Some(&signup.token), json!({ "method": "M-PESA Till" }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(
        body["message"],
        "Successfully withdrawn Ksh 4500 via M-PESA Till! A 10% fee of Ksh 500 was deducted."
    );

    let account = app.account(&signup.uid).await;
    assert_eq!(account.balance, 4500.0);
    assert_eq!(account.transactions.len(), 1);
    assert_eq!(account.transactions[0].deduction, 500.0);
}

#[tokio::test]
async fn profile_edit_and_redeem() {
    let app = TestApp::new();
    let signup = app.register("jane@example.com", "Business Basic", None).await;

    let (status, body) = app
        .json("PATCH", "/profile", Some(&signup.token), json!({ "name": "Jane Smith" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Profile updated successfully!");

    let (status, body) = app.json("POST", "/redeem", Some(&signup.token), Value::Null).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Need at least 100 loyalty points to redeem!");

    let (status, body) = app.get("/profile", Some(&signup.token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Jane Smith");
    assert_eq!(body["minWithdrawal"], 3000.0);
    assert_eq!(body["withdrawalShortfall"], 3000.0);
    assert_eq!(body["achievements"], json!([]));
}

#[tokio::test]
async fn avatars_are_validated_and_served() {
    let app = TestApp::new();
    let signup = app.register("jane@example.com", "Free Account", None).await;

    let upload = |content_type: &'static str, bytes: Vec<u8>| {
        Request::builder()
            .method("POST")
            .uri("/profile/avatar")
            .header(AUTHORIZATION, format!("Bearer {}", signup.token))
            .header(CONTENT_TYPE, content_type)
            .body(Body::from(bytes))
            .unwrap()
    };

    let (status, body) = app.send(upload("text/plain", b"hello".to_vec())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Only image files are allowed");

    let (status, body) = app
        .send(upload("image/png", vec![0; 2 * 1024 * 1024 + 1]))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "File size must be less than 2MB");

    let (status, _) = app.send(upload("image/png", b"png bytes".to_vec())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        app.account(&signup.uid).await.avatar,
        Some(format!("http://localhost:1111/avatars/{}", signup.uid))
    );

    let request = Request::builder()
        .uri(format!("/avatars/{}", signup.uid))
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "image/png");
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"png bytes");
}

#[tokio::test]
async fn admin_dashboard() {
    let app = TestApp::new();
    let signup = app.register("ada@example.com", "Free Account", None).await;

    let (status, body) = app.get("/admin/surveys", Some(&signup.token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, "Unauthorized access");

    app.update(&signup.uid, &[FieldUpdate::set("isAdmin", json!(true))]).await;

    let (status, body) = app
        .json(
            "POST",
            "/admin/surveys",
            Some(&signup.token),
            json!({ "topic": "Tea", "questions": [{ "text": "Milk?", "options": [{ "text": "Yes", "isCorrect": true }] }] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "At least two options are required");

    let (status, body) = app
        .json(
            "POST",
            "/admin/surveys",
            Some(&signup.token),
            json!({
                "topic": "Tea",
                "questions": [{
                    "text": "Milk?",
                    "options": [{ "text": "Yes", "isCorrect": true }, { "text": "No", "isCorrect": false }]
                }]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["id"].as_str().unwrap().to_string();

    let (_, body) = app.get("/admin/surveys", Some(&signup.token)).await;
    assert_eq!(body[0]["topic"], "Tea");
    assert_eq!(body[0]["questions"][0]["options"][0]["isCorrect"], true);

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/admin/surveys/{id}"))
        .header(AUTHORIZATION, format!("Bearer {}", signup.token))
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn profile_stream_is_event_stream() {
    let app = TestApp::new();
    let signup = app.register("jane@example.com", "Free Account", None).await;

    let request = Request::builder()
        .uri("/profile/stream")
        .header(AUTHORIZATION, format!("Bearer {}", signup.token))
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "text/event-stream");
}

#[tokio::test]
async fn profile_stream_ends_on_shutdown() {
    let app = TestApp::new();
    let signup = app.register("jane@example.com", "Free Account", None).await;

    let request = Request::builder()
        .uri("/profile/stream")
        .header(AUTHORIZATION, format!("Bearer {}", signup.token))
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body().into_data_stream();
    let first = body.next().await.unwrap().unwrap();
    assert!(String::from_utf8_lossy(&first).contains("event: profile"));

    app.state.shutdown();

    let rest = tokio::time::timeout(Duration::from_secs(1), body.count()).await;
    assert!(rest.is_ok(), "stream stayed open after shutdown");
}
