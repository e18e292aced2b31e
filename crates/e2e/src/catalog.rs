//! Built-in scenarios for the calculator app
//!
//! One scenario per user-visible behaviour: page availability, registration,
//! login, dashboard access, arithmetic, history and responsive layouts. Each
//! one generates its own identity, so they can run in any order and in
//! parallel against the same server.

use crate::actions::FieldMap;
use crate::calculation::OperationKind;
use crate::contract::{
    self, id_selector, CALCULATIONS_TABLE, CALCULATION_FORM, DASHBOARD_URL_PATTERN, DELETE_CALCULATION,
    LOGIN_URL_PATTERN, SUBMIT_BUTTON, USER_WELCOME,
};
use crate::outcome::{OutcomeKind, TextMatch};
use crate::scenario::{Scenario, Step};

/// `(operation, operands, expected result)` for the arithmetic scenarios.
pub const ARITHMETIC_CASES: [(OperationKind, &str, &str); 4] = [
    (OperationKind::Addition, "10,5", "15"),
    (OperationKind::Subtraction, "20,8", "12"),
    (OperationKind::Multiplication, "6,7", "42"),
    (OperationKind::Division, "100,4", "25"),
];

fn navigate(path: &str) -> Step {
    Step::Navigate {
        path: path.to_string(),
    }
}

fn visible(ids: &[&str]) -> Step {
    Step::ExpectVisible {
        selectors: ids.iter().map(|s| s.to_string()).collect(),
        timeout_ms: None,
    }
}

fn success(contains: Option<TextMatch>) -> Step {
    Step::ExpectOutcome {
        kind: OutcomeKind::Success,
        contains,
        timeout_ms: None,
    }
}

fn error(contains: Option<TextMatch>) -> Step {
    Step::ExpectOutcome {
        kind: OutcomeKind::Error,
        contains,
        timeout_ms: None,
    }
}

fn redirect(pattern: &str, timeout_ms: Option<u64>) -> Step {
    Step::ExpectRedirect {
        pattern: pattern.to_string(),
        timeout_ms,
    }
}

fn calculate(operation: OperationKind, operands: &str) -> Step {
    Step::Calculate {
        operation,
        operands: operands.to_string(),
    }
}

fn submit() -> Step {
    Step::Submit { form: None }
}

/// Registration form for the current identity with some fields overridden.
fn registration(overrides: &[(&str, &str)]) -> Step {
    let mut fields = FieldMap::new()
        .field(contract::USERNAME, "{{username}}")
        .field(contract::EMAIL, "{{email}}")
        .field(contract::FIRST_NAME, "{{first_name}}")
        .field(contract::LAST_NAME, "{{last_name}}")
        .field(contract::PASSWORD, "{{password}}")
        .field(contract::CONFIRM_PASSWORD, "{{password}}");
    for (id, value) in overrides {
        fields = fields.field(*id, *value);
    }
    Step::FillForm { fields }
}

fn login(password: &str) -> Step {
    Step::FillForm {
        fields: FieldMap::new()
            .field(contract::USERNAME, "{{username}}")
            .field(contract::PASSWORD, password),
    }
}

fn page_scenarios() -> Vec<Scenario> {
    vec![
        Scenario::new("home-page-loads")
            .describe("The landing page renders")
            .tag("smoke")
            .step(navigate(contract::HOME_PATH))
            .step(Step::ExpectUrl {
                pattern: ".*/$".to_string(),
            })
            .step(visible(&["body"])),
        Scenario::new("registration-page-loads")
            .describe("The registration form exposes every field")
            .tag("smoke")
            .tag("registration")
            .step(navigate(contract::REGISTER_PATH))
            .step(visible(&[
                "#username",
                "#email",
                "#first_name",
                "#last_name",
                "#password",
                "#confirm_password",
                SUBMIT_BUTTON,
            ])),
        Scenario::new("login-page-loads")
            .describe("The login form exposes credentials and remember-me")
            .tag("smoke")
            .tag("login")
            .step(navigate(contract::LOGIN_PATH))
            .step(visible(&["#username", "#password", "#remember", SUBMIT_BUTTON])),
    ]
}

fn registration_scenarios() -> Vec<Scenario> {
    vec![
        Scenario::new("registration-succeeds")
            .describe("A new account is created and the browser moves on to login")
            .tag("registration")
            .step(navigate(contract::REGISTER_PATH))
            .step(registration(&[]))
            .step(submit())
            .step(success(Some(TextMatch::exact("Registration successful"))))
            .step(redirect(LOGIN_URL_PATTERN, None)),
        Scenario::new("registration-password-mismatch")
            .describe("Registration is rejected when the confirmation differs")
            .tag("registration")
            .step(navigate(contract::REGISTER_PATH))
            .step(registration(&[(contract::CONFIRM_PASSWORD, "Different{{password}}")]))
            .step(submit())
            .step(error(Some(TextMatch::ignore_case("do not match")))),
        Scenario::new("registration-duplicate-username")
            .describe("A username can only be registered once")
            .tag("registration")
            .prefix("duplicate_")
            .step(Step::Register)
            .step(Step::RenewIdentity { keep_username: true })
            .step(navigate(contract::REGISTER_PATH))
            .step(registration(&[]))
            .step(submit())
            .step(error(None)),
        Scenario::new("registration-invalid-email")
            .describe("A malformed email address is rejected")
            .tag("registration")
            .step(navigate(contract::REGISTER_PATH))
            .step(registration(&[(contract::EMAIL, "not-a-valid-email")]))
            .step(submit())
            .step(error(None)),
    ]
}

fn login_scenarios() -> Vec<Scenario> {
    vec![
        Scenario::new("login-succeeds")
            .describe("A registered user reaches a personalised dashboard")
            .tag("login")
            .prefix("logintest_")
            .step(Step::Register)
            .step(navigate(contract::LOGIN_PATH))
            .step(login("{{password}}"))
            .step(submit())
            .step(success(None))
            .step(redirect(DASHBOARD_URL_PATTERN, None))
            .step(Step::ExpectText {
                selector: USER_WELCOME.to_string(),
                contains: TextMatch::exact("{{username}}"),
                timeout_ms: None,
            }),
        Scenario::new("login-wrong-password")
            .describe("A wrong password is rejected and the user stays on login")
            .tag("login")
            .prefix("wrongpass_")
            .step(Step::Register)
            .step(navigate(contract::LOGIN_PATH))
            .step(login("Wrong{{password}}"))
            .step(submit())
            .step(error(None))
            .step(Step::ExpectUrl {
                pattern: LOGIN_URL_PATTERN.to_string(),
            }),
        Scenario::new("login-unknown-user")
            .describe("Credentials for an account that was never registered are rejected")
            .tag("login")
            .prefix("ghost_")
            .step(navigate(contract::LOGIN_PATH))
            .step(login("{{password}}"))
            .step(submit())
            .step(error(None)),
    ]
}

fn dashboard_scenarios() -> Vec<Scenario> {
    vec![
        Scenario::new("dashboard-authenticated")
            .describe("A logged-in user sees the greeting, calculator and history")
            .tag("dashboard")
            .prefix("dashtest_")
            .step(Step::Authenticate)
            .step(visible(&[USER_WELCOME, CALCULATION_FORM, CALCULATIONS_TABLE])),
        Scenario::new("dashboard-requires-login")
            .describe("Anonymous visitors are sent to the login page")
            .tag("dashboard")
            .step(navigate(contract::DASHBOARD_PATH))
            .step(redirect(LOGIN_URL_PATTERN, Some(5_000))),
        Scenario::new("logout")
            .describe("Confirming the logout dialog ends the session")
            .tag("dashboard")
            .prefix("dashtest_")
            .step(Step::Authenticate)
            .step(Step::Logout),
    ]
}

fn calculation_scenarios() -> Vec<Scenario> {
    let mut scenarios: Vec<Scenario> = ARITHMETIC_CASES
        .iter()
        .map(|(operation, operands, expected)| {
            Scenario::new(format!("calculation-{}", operation))
                .describe(format!("{} of {} shows up in history as {}", operation, operands, expected))
                .tag("calculations")
                .prefix("calctest_")
                .step(Step::Authenticate)
                .step(calculate(*operation, operands))
                .step(success(None))
                .step(Step::ExpectTableContains {
                    table: CALCULATIONS_TABLE.to_string(),
                    values: vec![TextMatch::exact(*expected)],
                    timeout_ms: None,
                })
        })
        .collect();

    scenarios.push(
        Scenario::new("calculation-single-operand")
            .describe("A calculation needs at least two numbers")
            .tag("calculations")
            .prefix("calctest_")
            .step(Step::Authenticate)
            .step(calculate(OperationKind::Addition, "5"))
            .step(error(None)),
    );
    scenarios
}

fn history_scenarios() -> Vec<Scenario> {
    let rows = format!("{} {}", CALCULATIONS_TABLE, DELETE_CALCULATION);
    vec![
        Scenario::new("history-records-calculation")
            .describe("A new calculation is listed with its type, inputs and result")
            .tag("history")
            .prefix("histtest_")
            .step(Step::Authenticate)
            .step(calculate(OperationKind::Addition, "15,3"))
            .step(success(None))
            .step(Step::ExpectTableContains {
                table: CALCULATIONS_TABLE.to_string(),
                values: vec![
                    TextMatch::ignore_case("addition"),
                    TextMatch::exact("15"),
                    TextMatch::exact("3"),
                    TextMatch::exact("18"),
                ],
                timeout_ms: None,
            }),
        Scenario::new("history-delete")
            .describe("Deleting the only calculation empties the history")
            .tag("history")
            .prefix("histtest_")
            .step(Step::Authenticate)
            .step(calculate(OperationKind::Subtraction, "8,2"))
            .step(success(None))
            .step(Step::ExpectCount {
                selector: rows.clone(),
                count: 1,
                timeout_ms: None,
            })
            .step(Step::ConfirmDialog {
                then_click: DELETE_CALCULATION.to_string(),
            })
            .step(success(None))
            .step(Step::ExpectCount {
                selector: rows.clone(),
                count: 0,
                timeout_ms: None,
            }),
        Scenario::new("history-empty")
            .describe("A fresh account has no calculation rows")
            .tag("history")
            .prefix("histtest_")
            .step(Step::Authenticate)
            .step(Step::ExpectCount {
                selector: rows,
                count: 0,
                timeout_ms: None,
            }),
    ]
}

fn responsive_scenarios() -> Vec<Scenario> {
    vec![
        Scenario::new("mobile-login")
            .describe("The login form is usable on a phone-sized screen")
            .tag("responsive")
            .viewport(375, 667)
            .step(navigate(contract::LOGIN_PATH))
            .step(visible(&["#username", "#password", SUBMIT_BUTTON])),
        Scenario::new("tablet-dashboard")
            .describe("The dashboard is usable on a tablet-sized screen")
            .tag("responsive")
            .prefix("tablet_")
            .viewport(768, 1024)
            .step(Step::Authenticate)
            .step(visible(&[CALCULATION_FORM, CALCULATIONS_TABLE, id_selector(contract::CALC_TYPE).as_str()])),
    ]
}

/// Every built-in scenario.
pub fn builtin() -> Vec<Scenario> {
    let mut scenarios = Vec::new();
    scenarios.extend(page_scenarios());
    scenarios.extend(registration_scenarios());
    scenarios.extend(login_scenarios());
    scenarios.extend(dashboard_scenarios());
    scenarios.extend(calculation_scenarios());
    scenarios.extend(history_scenarios());
    scenarios.extend(responsive_scenarios());
    scenarios
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_builtin_scenarios_are_valid() {
        for scenario in builtin() {
            scenario.validate().unwrap();
        }
    }

    #[test]
    fn test_builtin_names_are_unique() {
        let scenarios = builtin();
        let names: HashSet<_> = scenarios.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names.len(), scenarios.len());
    }

    #[test]
    fn test_arithmetic_cases_agree_with_calculator() {
        for (operation, operands, expected) in ARITHMETIC_CASES {
            let operands = crate::calculation::parse_operands(operands).unwrap();
            let record = crate::calculation::CalculationRecord::new(operation, operands).unwrap();
            assert_eq!(record.result_text(), expected);
        }
    }

    #[test]
    fn test_every_scenario_is_tagged() {
        assert!(builtin().iter().all(|s| !s.tags.is_empty()));
        assert_eq!(Scenario::filter_by_tag(&builtin(), "calculations").len(), 5);
    }
}
