//! Workflow checks against the in-memory calculator app
//!
//! These exercise sessions, actions, outcomes and the scenario runner without
//! a browser, so they run in every `cargo test`.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;

use calc_e2e::actions::{self, registration_form, FieldMap};
use calc_e2e::calculation::OperationKind;
use calc_e2e::contract::{self, CALCULATIONS_TABLE, DELETE_CALCULATION, LOGOUT_BUTTON};
use calc_e2e::outcome::{self, ActionResult, BannerSnapshot, OutcomeKind, TextMatch};
use calc_e2e::runner::{RunnerConfig, ScenarioRunner};
use calc_e2e::scenario::{run_scenario, ScenarioState};
use calc_e2e::session::{self, bootstrap_authenticated, bootstrap_session};
use calc_e2e::testing::{FakeCalculatorApp, FAKE_BASE_URL};
use calc_e2e::{catalog, BrowserPage, E2eError, IdentityGenerator, Scenario, Step, Timeouts};

fn quick() -> Timeouts {
    Timeouts {
        banner_ms: 300,
        navigation_ms: 300,
        element_ms: 300,
        table_ms: 300,
    }
}

fn fake_runner(app: &FakeCalculatorApp) -> ScenarioRunner<FakeCalculatorApp> {
    ScenarioRunner::new(
        app.clone(),
        RunnerConfig {
            base_url: FAKE_BASE_URL.to_string(),
            timeouts: quick(),
            seed: Some(2024),
            ..RunnerConfig::default()
        },
    )
}

#[tokio::test]
async fn bootstrap_lands_on_dashboard() {
    let app = FakeCalculatorApp::new();
    let page = app.open_page();
    let mut rng = StdRng::seed_from_u64(11);

    let (session, identity) = bootstrap_authenticated(&page, FAKE_BASE_URL, &mut rng, "calctest_", &quick())
        .await
        .unwrap();

    assert!(app.has_account(&identity.username));
    assert_eq!(session.identity(), &identity);
    assert!(page.url().await.unwrap().ends_with("/dashboard"));

    outcome::expect_text_contains(
        &page,
        contract::USER_WELCOME,
        &TextMatch::exact(identity.username.clone()),
        Duration::from_millis(300),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn duplicate_username_stops_before_login() {
    let app = FakeCalculatorApp::new();
    let page = app.open_page();
    let mut identities = IdentityGenerator::from_seed(5);
    let first = identities.generate("duplicate_");

    let registered = session::register(&page, FAKE_BASE_URL, &first, &quick()).await.unwrap();
    assert_eq!(registered.kind(), Some(OutcomeKind::Success));

    let second = identities.sibling(&first);
    let err = bootstrap_session(&page, FAKE_BASE_URL, second, &quick())
        .await
        .err()
        .unwrap();
    match err {
        E2eError::RegistrationFailed(message) => assert!(message.contains("already exists")),
        other => panic!("unexpected error {:?}", other),
    }
    assert!(page.url().await.unwrap().ends_with("/register"));
    assert_eq!(app.account_count(), 1);
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let app = FakeCalculatorApp::new();
    let page = app.open_page();
    let identity = IdentityGenerator::from_seed(9).generate("wrongpass_");

    session::register(&page, FAKE_BASE_URL, &identity, &quick()).await.unwrap();
    let result = session::login(&page, FAKE_BASE_URL, &identity.username, "WrongPassword123!", &quick())
        .await
        .unwrap();

    assert_eq!(result, ActionResult::Error("Invalid username or password".to_string()));
    assert!(page.url().await.unwrap().ends_with("/login"));
}

#[tokio::test]
async fn missing_field_fails_before_typing() {
    let app = FakeCalculatorApp::new();
    let page = app.open_page();
    let identity = IdentityGenerator::from_seed(3).generate("testuser_");

    actions::navigate(&page, FAKE_BASE_URL, contract::LOGIN_PATH).await.unwrap();
    let err = actions::fill_form(&page, &registration_form(&identity)).await.unwrap_err();
    assert!(matches!(err, E2eError::FieldNotFound(_)));

    // Nothing was typed, not even the fields that exist on the login form
    assert_eq!(page.text_content("#username").await.unwrap(), Some(String::new()));
}

#[tokio::test]
async fn unarmed_logout_dialog_is_dismissed() {
    let app = FakeCalculatorApp::new();
    let page = app.open_page();
    let mut rng = StdRng::seed_from_u64(21);
    let (session, _) = bootstrap_authenticated(&page, FAKE_BASE_URL, &mut rng, "dashtest_", &quick())
        .await
        .unwrap();

    actions::click(&page, LOGOUT_BUTTON).await.unwrap();
    assert!(page.url().await.unwrap().ends_with("/dashboard"));

    session.logout().await.unwrap();
    assert!(page.url().await.unwrap().ends_with("/login"));
}

#[tokio::test]
async fn division_by_zero_shows_error_banner() {
    let app = FakeCalculatorApp::new();
    let page = app.open_page();
    let mut rng = StdRng::seed_from_u64(33);
    let (_, identity) = bootstrap_authenticated(&page, FAKE_BASE_URL, &mut rng, "calctest_", &quick())
        .await
        .unwrap();

    let before = BannerSnapshot::capture(&page).await.unwrap();
    actions::perform_calculation(&page, OperationKind::Division, "10,0").await.unwrap();
    let message = outcome::expect_outcome(&page, OutcomeKind::Error, None, &before, Duration::from_millis(300))
        .await
        .unwrap();

    assert!(message.contains("divide by zero"));
    assert!(app.history(&identity.username).is_empty());
}

#[tokio::test]
async fn every_builtin_scenario_passes_against_fake_app() {
    let app = FakeCalculatorApp::new();
    let scenarios = catalog::builtin();

    let suite = fake_runner(&app).run_all(&scenarios).await;

    for result in suite.failures() {
        eprintln!("{} failed: {:?}", result.name, result.error);
    }
    assert!(suite.success());
    assert_eq!(suite.passed, scenarios.len());
    assert_eq!(app.pages_opened(), scenarios.len());
    assert_eq!(app.pages_closed(), scenarios.len());
}

#[tokio::test]
async fn failing_step_stops_scenario_and_closes_page() {
    let app = FakeCalculatorApp::new();
    let scenario = Scenario::new("expects-success-on-bad-login")
        .step(Step::Navigate {
            path: contract::LOGIN_PATH.to_string(),
        })
        .step(Step::FillForm {
            fields: FieldMap::new()
                .field(contract::USERNAME, "{{username}}")
                .field(contract::PASSWORD, "{{password}}"),
        })
        .step(Step::Submit { form: None })
        .step(Step::ExpectOutcome {
            kind: OutcomeKind::Success,
            contains: None,
            timeout_ms: None,
        })
        .step(Step::Log {
            message: "never reached".to_string(),
        });

    let page = app.open_page();
    let result = run_scenario(page, &scenario, FAKE_BASE_URL, &quick(), 77).await;

    assert!(!result.success);
    assert_eq!(result.steps.len(), 4);
    assert!(!result.steps[3].success);
    assert!(result.error.unwrap().contains("expected success banner"));
    assert_eq!(result.final_state, ScenarioState::OutcomeObserved);
    assert!(result.final_state.is_terminal());
    assert_eq!(app.pages_closed(), 1);
}

#[tokio::test]
async fn leftover_banner_is_not_credited_to_next_action() {
    let app = FakeCalculatorApp::new();
    let page = app.open_page();
    let mut rng = StdRng::seed_from_u64(45);
    let (_, identity) = bootstrap_authenticated(&page, FAKE_BASE_URL, &mut rng, "histtest_", &quick())
        .await
        .unwrap();

    let before = BannerSnapshot::capture(&page).await.unwrap();
    actions::perform_calculation(&page, OperationKind::Subtraction, "8,2").await.unwrap();
    outcome::expect_outcome(&page, OutcomeKind::Success, None, &before, Duration::from_millis(300))
        .await
        .unwrap();

    // The calculation banner is still up; the unconfirmed delete does nothing
    let before = BannerSnapshot::capture(&page).await.unwrap();
    actions::click(&page, DELETE_CALCULATION).await.unwrap();
    let err = outcome::expect_outcome(&page, OutcomeKind::Success, None, &before, Duration::from_millis(300))
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(app.history(&identity.username).len(), 1);
}

#[tokio::test]
async fn unconfirmed_delete_fails_the_scenario() {
    let app = FakeCalculatorApp::new();
    let scenario = Scenario::new("delete-without-dialog")
        .prefix("histtest_")
        .step(Step::Authenticate)
        .step(Step::Calculate {
            operation: OperationKind::Subtraction,
            operands: "8,2".to_string(),
        })
        .step(Step::ExpectOutcome {
            kind: OutcomeKind::Success,
            contains: None,
            timeout_ms: None,
        })
        .step(Step::Click {
            selector: DELETE_CALCULATION.to_string(),
        })
        .step(Step::ExpectOutcome {
            kind: OutcomeKind::Success,
            contains: None,
            timeout_ms: Some(200),
        });

    let result = run_scenario(app.open_page(), &scenario, FAKE_BASE_URL, &quick(), 8).await;

    assert!(!result.success);
    assert_eq!(result.steps.len(), 5);
    assert!(result.steps[2].success);
    assert!(!result.steps[4].success);
    assert_eq!(result.final_state, ScenarioState::TimedOut);
    assert_eq!(app.history(&result.username.unwrap()).len(), 1);
}

#[tokio::test]
async fn missing_table_value_names_the_first_absent_needle() {
    let app = FakeCalculatorApp::new();
    let page = app.open_page();
    let mut rng = StdRng::seed_from_u64(52);
    bootstrap_authenticated(&page, FAKE_BASE_URL, &mut rng, "histtest_", &quick())
        .await
        .unwrap();

    let before = BannerSnapshot::capture(&page).await.unwrap();
    actions::perform_calculation(&page, OperationKind::Addition, "15,3").await.unwrap();
    outcome::expect_outcome(&page, OutcomeKind::Success, None, &before, Duration::from_millis(300))
        .await
        .unwrap();

    let err = outcome::expect_table_contains(
        &page,
        CALCULATIONS_TABLE,
        &[TextMatch::ignore_case("addition"), TextMatch::exact("99"), TextMatch::exact("77")],
        Duration::from_millis(200),
    )
    .await
    .unwrap_err();

    match err {
        E2eError::ContentMismatch { scope, missing } => {
            assert_eq!(scope, CALCULATIONS_TABLE);
            assert_eq!(missing, "99");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn missing_redirect_reports_where_the_page_stayed() {
    let app = FakeCalculatorApp::new();
    let page = app.open_page();
    actions::navigate(&page, FAKE_BASE_URL, contract::LOGIN_PATH).await.unwrap();

    let dashboard = regex::Regex::new(".*/dashboard").unwrap();
    let err = outcome::expect_redirect(&page, &dashboard, Duration::from_millis(200))
        .await
        .unwrap_err();

    match err {
        E2eError::RedirectTimeout { pattern, url, timeout_ms } => {
            assert_eq!(pattern, ".*/dashboard");
            assert!(url.ends_with("/login"));
            assert_eq!(timeout_ms, 200);
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn rejected_login_fails_bootstrap() {
    let app = FakeCalculatorApp::new();
    app.disable_logins();
    let page = app.open_page();
    let identity = IdentityGenerator::from_seed(61).generate("logintest_");

    let err = bootstrap_session(&page, FAKE_BASE_URL, identity.clone(), &quick())
        .await
        .err()
        .unwrap();

    match err {
        E2eError::LoginFailed(message) => assert!(message.contains("temporarily disabled")),
        other => panic!("unexpected error {:?}", other),
    }
    assert!(app.has_account(&identity.username));
    assert!(page.url().await.unwrap().ends_with("/login"));
}

#[tokio::test]
async fn login_without_dashboard_redirect_fails_bootstrap() {
    let app = FakeCalculatorApp::new();
    app.stall_login_redirect();
    let page = app.open_page();
    let identity = IdentityGenerator::from_seed(62).generate("logintest_");

    let err = bootstrap_session(&page, FAKE_BASE_URL, identity, &quick())
        .await
        .err()
        .unwrap();

    match err {
        E2eError::LoginFailed(message) => assert!(message.contains("dashboard")),
        other => panic!("unexpected error {:?}", other),
    }
    assert!(page.url().await.unwrap().ends_with("/login"));
}

#[tokio::test]
async fn missing_banner_times_out() {
    let app = FakeCalculatorApp::new();
    let scenario = Scenario::new("no-banner-on-home")
        .step(Step::Navigate {
            path: contract::HOME_PATH.to_string(),
        })
        .step(Step::ExpectOutcome {
            kind: OutcomeKind::Success,
            contains: None,
            timeout_ms: Some(200),
        });

    let result = run_scenario(app.open_page(), &scenario, FAKE_BASE_URL, &quick(), 1).await;

    assert!(!result.success);
    assert_eq!(result.final_state, ScenarioState::TimedOut);
    assert!(result.final_state.is_terminal());
}

#[tokio::test]
async fn yaml_scenarios_run_like_builtin_ones() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("history.yaml"),
        r##"
name: yaml-history
tags: [history]
identity_prefix: yaml_
steps:
  - action: authenticate
  - action: calculate
    operation: multiplication
    operands: "2.5, 4"
  - action: expect_outcome
    kind: success
    contains: "10"
  - action: expect_table_contains
    values:
      - needle: MULTIPLICATION
        case_insensitive: true
      - "2.5, 4"
  - action: confirm_dialog
    then_click: ".delete-calc"
  - action: expect_count
    selector: "#calculationsTable .delete-calc"
    count: 0
  - action: logout
"##,
    )
    .unwrap();
    std::fs::write(dir.path().join("notes.txt"), "not a scenario").unwrap();

    let scenarios = Scenario::load_all(dir.path()).unwrap();
    assert_eq!(scenarios.len(), 1);

    let app = FakeCalculatorApp::new();
    let suite = fake_runner(&app).run_all(&scenarios).await;
    assert!(suite.success(), "{:?}", suite.results[0].error);

    let username = suite.results[0].username.clone().unwrap();
    assert!(username.starts_with("yaml_"));
    assert!(app.history(&username).is_empty());
}
