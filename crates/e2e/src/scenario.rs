//! Declarative scenarios and their execution
//!
//! A scenario is a linear list of steps run against one fresh browser
//! context with one freshly generated identity. Step values may reference the
//! identity with `{{username}}`, `{{email}}`, `{{first_name}}`,
//! `{{last_name}}` and `{{password}}`.

use std::path::Path;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::actions::{self, FieldMap};
use crate::calculation::OperationKind;
use crate::contract::CALCULATIONS_TABLE;
use crate::error::{E2eError, E2eResult};
use crate::identity::{IdentityGenerator, SyntheticIdentity};
use crate::outcome::{self, ActionResult, BannerSnapshot, OutcomeKind, TextMatch};
use crate::page::{BrowserPage, Viewport};
use crate::session::{self, Session};
use crate::wait::Timeouts;

/// A complete scenario, built in code or parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique name for this scenario
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Tags for filtering
    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub viewport: Viewport,

    /// Username prefix for the generated identity
    #[serde(default = "default_identity_prefix")]
    pub identity_prefix: String,

    /// Steps to execute in order
    pub steps: Vec<Step>,
}

fn default_identity_prefix() -> String {
    "testuser_".to_string()
}

fn default_table() -> String {
    CALCULATIONS_TABLE.to_string()
}

/// A single step in a scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Navigate to a path relative to the base URL
    Navigate { path: String },

    /// Register the current identity; anything but a success banner fails
    Register,

    /// Register and log in the current identity, ending on the dashboard
    Authenticate,

    /// Replace the current identity, optionally keeping its username
    RenewIdentity {
        #[serde(default)]
        keep_username: bool,
    },

    /// Fill form fields by element id
    FillForm { fields: FieldMap },

    /// Choose an option of a select by element id
    Select { field: String, value: String },

    /// Tick a checkbox by element id
    Check { field: String },

    /// Click the submit button, optionally scoped to a form id
    Submit {
        #[serde(default)]
        form: Option<String>,
    },

    /// Click the first element matching a selector
    Click { selector: String },

    /// Accept the confirmation dialog opened by clicking `then_click`
    ConfirmDialog { then_click: String },

    /// Submit the dashboard calculation form
    Calculate {
        operation: OperationKind,
        operands: String,
    },

    /// Log out of the session opened by `authenticate`
    Logout,

    ExpectOutcome {
        kind: OutcomeKind,
        #[serde(default)]
        contains: Option<TextMatch>,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    ExpectRedirect {
        pattern: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Check the current URL without waiting
    ExpectUrl { pattern: String },

    ExpectVisible {
        selectors: Vec<String>,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    ExpectText {
        selector: String,
        contains: TextMatch,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    ExpectTableContains {
        #[serde(default = "default_table")]
        table: String,
        values: Vec<TextMatch>,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    ExpectCount {
        selector: String,
        count: usize,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Log a message (for debugging)
    Log { message: String },
}

impl Step {
    pub fn name(&self) -> String {
        match self {
            Step::Navigate { path } => format!("navigate:{}", path),
            Step::Register => "register".to_string(),
            Step::Authenticate => "authenticate".to_string(),
            Step::RenewIdentity { keep_username } => {
                format!("renew_identity:keep_username={}", keep_username)
            }
            Step::FillForm { fields } => format!("fill_form:{}", fields.len()),
            Step::Select { field, value } => format!("select:#{}={}", field, value),
            Step::Check { field } => format!("check:#{}", field),
            Step::Submit { form } => format!("submit:{}", form.as_deref().unwrap_or("page")),
            Step::Click { selector } => format!("click:{}", selector),
            Step::ConfirmDialog { then_click } => format!("confirm_dialog:{}", then_click),
            Step::Calculate { operation, operands } => format!("calculate:{}({})", operation, operands),
            Step::Logout => "logout".to_string(),
            Step::ExpectOutcome { kind, .. } => format!("expect_outcome:{}", kind),
            Step::ExpectRedirect { pattern, .. } => format!("expect_redirect:{}", pattern),
            Step::ExpectUrl { pattern } => format!("expect_url:{}", pattern),
            Step::ExpectVisible { selectors, .. } => format!("expect_visible:{}", selectors.join(",")),
            Step::ExpectText { selector, .. } => format!("expect_text:{}", selector),
            Step::ExpectTableContains { table, .. } => format!("expect_table_contains:{}", table),
            Step::ExpectCount { selector, count, .. } => format!("expect_count:{}={}", selector, count),
            Step::Log { message } => format!("log:{}", message.chars().take(30).collect::<String>()),
        }
    }

    /// Steps whose effect shows up as a success or error banner.
    fn triggers_outcome(&self) -> bool {
        matches!(
            self,
            Step::Submit { .. } | Step::Click { .. } | Step::ConfirmDialog { .. } | Step::Calculate { .. }
        )
    }

    fn is_expectation(&self) -> bool {
        matches!(
            self,
            Step::ExpectOutcome { .. }
                | Step::ExpectRedirect { .. }
                | Step::ExpectUrl { .. }
                | Step::ExpectVisible { .. }
                | Step::ExpectText { .. }
                | Step::ExpectTableContains { .. }
                | Step::ExpectCount { .. }
        )
    }

    fn patterns(&self) -> Option<&str> {
        match self {
            Step::ExpectRedirect { pattern, .. } | Step::ExpectUrl { pattern } => Some(pattern),
            _ => None,
        }
    }
}

/// Where a scenario stands with respect to its current action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioState {
    NotStarted,
    Navigated,
    FormFilled,
    Submitted,
    OutcomeObserved,
    TimedOut,
}

impl ScenarioState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScenarioState::OutcomeObserved | ScenarioState::TimedOut)
    }

    /// State after `step` completed successfully.
    pub fn after(self, step: &Step) -> Self {
        match step {
            Step::Navigate { .. } => ScenarioState::Navigated,
            Step::FillForm { .. } | Step::Select { .. } | Step::Check { .. } => ScenarioState::FormFilled,
            Step::Submit { .. }
            | Step::Click { .. }
            | Step::ConfirmDialog { .. }
            | Step::Calculate { .. } => ScenarioState::Submitted,
            Step::Register
            | Step::Authenticate
            | Step::Logout
            | Step::ExpectOutcome { .. }
            | Step::ExpectRedirect { .. }
            | Step::ExpectUrl { .. }
            | Step::ExpectVisible { .. }
            | Step::ExpectText { .. }
            | Step::ExpectTableContains { .. }
            | Step::ExpectCount { .. } => ScenarioState::OutcomeObserved,
            Step::RenewIdentity { .. } | Step::Log { .. } => self,
        }
    }
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            tags: Vec::new(),
            viewport: Viewport::default(),
            identity_prefix: default_identity_prefix(),
            steps: Vec::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = Viewport { width, height };
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.identity_prefix = prefix.into();
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.steps.extend(steps);
        self
    }

    /// Reject scenarios that could only fail at run time.
    pub fn validate(&self) -> E2eResult<()> {
        if self.name.trim().is_empty() {
            return Err(E2eError::ScenarioParse("scenario without a name".to_string()));
        }
        if self.steps.is_empty() {
            return Err(E2eError::ScenarioParse(format!("{}: no steps", self.name)));
        }
        for step in &self.steps {
            if let Some(pattern) = step.patterns() {
                Regex::new(pattern).map_err(|e| {
                    E2eError::ScenarioParse(format!("{}: bad pattern {:?}: {}", self.name, pattern, e))
                })?;
            }
        }

        // Each logout consumes the session of the authenticate before it
        let mut session_open = false;
        for (index, step) in self.steps.iter().enumerate() {
            match step {
                Step::Authenticate => session_open = true,
                Step::Logout if !session_open => {
                    return Err(E2eError::ScenarioParse(format!(
                        "{}: logout at step {} without an open session",
                        self.name,
                        index + 1
                    )));
                }
                Step::Logout => session_open = false,
                _ => {}
            }
        }
        Ok(())
    }

    /// Parse a scenario from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let scenario: Self = serde_yaml::from_str(yaml)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::ScenarioParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all scenarios from a directory
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut scenarios = Vec::new();

        let mut paths: Vec<_> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        for path in paths {
            scenarios.push(Self::from_file(&path)?);
        }

        debug!("Loaded {} scenario(s) from {}", scenarios.len(), dir.display());
        Ok(scenarios)
    }

    /// Filter scenarios by tag
    pub fn filter_by_tag<'a>(scenarios: &'a [Self], tag: &str) -> Vec<&'a Self> {
        scenarios
            .iter()
            .filter(|s| s.tags.iter().any(|t| t == tag))
            .collect()
    }
}

/// Result of executing a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    pub step_name: String,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    /// Identity seed; rerunning with it regenerates the same identities
    pub seed: u64,
    pub username: Option<String>,
    pub final_state: ScenarioState,
    pub steps: Vec<StepResult>,
    pub error: Option<String>,
}

impl ScenarioResult {
    /// A scenario that never got a browser context.
    pub fn not_started(scenario: &Scenario, seed: u64, error: &E2eError) -> Self {
        Self {
            name: scenario.name.clone(),
            success: false,
            duration_ms: 0,
            seed,
            username: None,
            final_state: ScenarioState::NotStarted,
            steps: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

fn bound(timeout_ms: Option<u64>, default: Duration) -> Duration {
    timeout_ms.map(Duration::from_millis).unwrap_or(default)
}

struct ScenarioContext<'a, P: BrowserPage> {
    page: &'a P,
    base_url: &'a str,
    timeouts: Timeouts,
    prefix: &'a str,
    generator: IdentityGenerator,
    identity: SyntheticIdentity,
    session: Option<Session<'a, P>>,
    /// Banners on screen before the latest submit, click or confirm
    banners: BannerSnapshot,
    state: ScenarioState,
}

impl<'a, P: BrowserPage> ScenarioContext<'a, P> {
    fn expand(&self, m: &TextMatch) -> TextMatch {
        m.map_needle(|needle| self.identity.expand(needle))
    }

    async fn run(&mut self, steps: &[Step]) -> (Vec<StepResult>, Option<E2eError>) {
        let mut results = Vec::with_capacity(steps.len());

        for step in steps {
            let start = Instant::now();
            let step_name = step.name();
            debug!("Executing step: {}", step_name);

            let outcome = self.execute(step).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            match outcome {
                Ok(()) => {
                    self.state = self.state.after(step);
                    results.push(StepResult {
                        success: true,
                        step_name,
                        duration_ms,
                        error: None,
                    });
                }
                Err(e) => {
                    if e.is_timeout() {
                        self.state = ScenarioState::TimedOut;
                    } else if step.is_expectation() && e.is_assertion_failure() {
                        // The page answered, just not as expected
                        self.state = ScenarioState::OutcomeObserved;
                    }
                    results.push(StepResult {
                        success: false,
                        step_name,
                        duration_ms,
                        error: Some(e.to_string()),
                    });
                    // Stop on first failure
                    return (results, Some(e));
                }
            }
        }

        (results, None)
    }

    async fn execute(&mut self, step: &Step) -> E2eResult<()> {
        let page = self.page;
        let timeouts = self.timeouts;

        if step.triggers_outcome() {
            self.banners = BannerSnapshot::capture(page).await?;
        }

        match step {
            Step::Navigate { path } => {
                self.banners = BannerSnapshot::empty();
                actions::navigate(page, self.base_url, path).await
            }
            Step::Register => {
                match session::register(page, self.base_url, &self.identity, &timeouts).await? {
                    ActionResult::Success(_) => Ok(()),
                    ActionResult::Error(message) => Err(E2eError::RegistrationFailed(message)),
                    ActionResult::Timeout => {
                        Err(E2eError::timeout("registration outcome banner", timeouts.banner()))
                    }
                }
            }
            Step::Authenticate => {
                let session =
                    session::bootstrap_session(page, self.base_url, self.identity.clone(), &timeouts)
                        .await?;
                self.session = Some(session);
                Ok(())
            }
            Step::RenewIdentity { keep_username } => {
                self.identity = if *keep_username {
                    self.generator.sibling(&self.identity)
                } else {
                    self.generator.generate(self.prefix)
                };
                debug!("Identity is now {}", self.identity.username);
                Ok(())
            }
            Step::FillForm { fields } => {
                actions::fill_form(page, &fields.expand(&self.identity)).await
            }
            Step::Select { field, value } => actions::select(page, field, value).await,
            Step::Check { field } => actions::check(page, field).await,
            Step::Submit { form } => actions::submit(page, form.as_deref()).await,
            Step::Click { selector } => actions::click(page, selector).await,
            Step::ConfirmDialog { then_click } => {
                actions::confirm_dialog(page)
                    .await?
                    .then_click(then_click)
                    .await
            }
            Step::Calculate {
                operation,
                operands,
            } => actions::perform_calculation(page, *operation, operands).await,
            Step::Logout => match self.session.take() {
                Some(session) => session.logout().await,
                None => Err(E2eError::ScenarioParse(
                    "logout without an authenticated session".to_string(),
                )),
            },
            Step::ExpectOutcome {
                kind,
                contains,
                timeout_ms,
            } => {
                let contains = contains.as_ref().map(|m| self.expand(m));
                outcome::expect_outcome(
                    page,
                    *kind,
                    contains.as_ref(),
                    &self.banners,
                    bound(*timeout_ms, timeouts.banner()),
                )
                .await
                .map(|_| ())
            }
            Step::ExpectRedirect {
                pattern,
                timeout_ms,
            } => {
                let pattern = Regex::new(pattern)?;
                outcome::expect_redirect(page, &pattern, bound(*timeout_ms, timeouts.navigation()))
                    .await
                    .map(|_| ())
            }
            Step::ExpectUrl { pattern } => {
                outcome::expect_current_url(page, &Regex::new(pattern)?).await
            }
            Step::ExpectVisible {
                selectors,
                timeout_ms,
            } => {
                let timeout = bound(*timeout_ms, timeouts.element());
                for selector in selectors {
                    outcome::expect_visible(page, selector, timeout).await?;
                }
                Ok(())
            }
            Step::ExpectText {
                selector,
                contains,
                timeout_ms,
            } => {
                let contains = self.expand(contains);
                outcome::expect_text_contains(
                    page,
                    selector,
                    &contains,
                    bound(*timeout_ms, timeouts.element()),
                )
                .await
            }
            Step::ExpectTableContains {
                table,
                values,
                timeout_ms,
            } => {
                let values: Vec<TextMatch> = values.iter().map(|v| self.expand(v)).collect();
                outcome::expect_table_contains(page, table, &values, bound(*timeout_ms, timeouts.table()))
                    .await
            }
            Step::ExpectCount {
                selector,
                count,
                timeout_ms,
            } => {
                outcome::expect_count(page, selector, *count, bound(*timeout_ms, timeouts.element()))
                    .await
            }
            Step::Log { message } => {
                info!("[SCENARIO LOG] {}", self.identity.expand(message));
                Ok(())
            }
        }
    }
}

/// Run `scenario` on `page` and close the page afterwards, pass or fail.
pub async fn run_scenario<P: BrowserPage>(
    page: P,
    scenario: &Scenario,
    base_url: &str,
    timeouts: &Timeouts,
    seed: u64,
) -> ScenarioResult {
    let start = Instant::now();
    debug!("Running scenario: {}", scenario.name);

    let mut generator = IdentityGenerator::from_seed(seed);
    let identity = generator.generate(&scenario.identity_prefix);
    let username = identity.username.clone();

    let (steps, error, final_state) = match page.set_viewport(scenario.viewport).await {
        Ok(()) => {
            let mut context = ScenarioContext {
                page: &page,
                base_url,
                timeouts: *timeouts,
                prefix: &scenario.identity_prefix,
                generator,
                identity,
                session: None,
                banners: BannerSnapshot::empty(),
                state: ScenarioState::NotStarted,
            };
            let (steps, error) = context.run(&scenario.steps).await;
            (steps, error, context.state)
        }
        Err(e) => (Vec::new(), Some(e), ScenarioState::NotStarted),
    };

    if let Err(e) = page.close().await {
        warn!("Failed to close browser context for {}: {}", scenario.name, e);
    }

    ScenarioResult {
        name: scenario.name.clone(),
        success: error.is_none(),
        duration_ms: start.elapsed().as_millis() as u64,
        seed,
        username: Some(username),
        final_state,
        steps,
        error: error.map(|e| e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_scenario() {
        let yaml = r#"
name: wrong-password
description: Login with the wrong password is rejected
tags:
  - login
identity_prefix: wrongpass_
steps:
  - action: register
  - action: navigate
    path: /login
  - action: fill_form
    fields:
      username: "{{username}}"
      password: "Wrong{{password}}"
  - action: submit
  - action: expect_outcome
    kind: error
  - action: expect_url
    pattern: ".*/login"
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        assert_eq!(scenario.name, "wrong-password");
        assert_eq!(scenario.identity_prefix, "wrongpass_");
        assert_eq!(scenario.steps.len(), 6);
        assert_eq!(scenario.viewport, Viewport::default());
        assert!(matches!(
            scenario.steps[4],
            Step::ExpectOutcome {
                kind: OutcomeKind::Error,
                contains: None,
                timeout_ms: None
            }
        ));
    }

    #[test]
    fn test_parse_table_and_viewport() {
        let yaml = r#"
name: history-row
viewport:
  width: 768
  height: 1024
steps:
  - action: authenticate
  - action: calculate
    operation: addition
    operands: "15,3"
  - action: expect_table_contains
    values:
      - needle: Addition
        case_insensitive: true
      - "18"
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        assert_eq!(scenario.viewport.width, 768);
        match &scenario.steps[2] {
            Step::ExpectTableContains { table, values, .. } => {
                assert_eq!(table, "#calculationsTable");
                assert_eq!(values[0], TextMatch::ignore_case("Addition"));
                assert_eq!(values[1], TextMatch::exact("18"));
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_rejects_bad_pattern() {
        let yaml = r#"
name: broken
steps:
  - action: expect_redirect
    pattern: "(unclosed"
"#;
        let err = Scenario::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, E2eError::ScenarioParse(_)));
    }

    #[test]
    fn test_rejects_logout_without_session() {
        let scenario = Scenario::new("early-logout")
            .step(Step::Logout)
            .step(Step::Authenticate);
        assert!(scenario.validate().is_err());

        let scenario = Scenario::new("logout").step(Step::Authenticate).step(Step::Logout);
        assert!(scenario.validate().is_ok());
    }

    #[test]
    fn test_each_logout_needs_its_own_session() {
        let scenario = Scenario::new("double-logout")
            .step(Step::Authenticate)
            .step(Step::Logout)
            .step(Step::Logout);
        match scenario.validate() {
            Err(E2eError::ScenarioParse(message)) => assert!(message.contains("step 3")),
            other => panic!("unexpected {:?}", other),
        }

        let scenario = Scenario::new("relogin")
            .step(Step::Authenticate)
            .step(Step::Logout)
            .step(Step::Authenticate)
            .step(Step::Logout);
        assert!(scenario.validate().is_ok());
    }

    #[test]
    fn test_rejects_empty_scenario() {
        assert!(Scenario::new("empty").validate().is_err());
    }

    #[test]
    fn test_state_machine() {
        let state = ScenarioState::NotStarted
            .after(&Step::Navigate { path: "/register".into() });
        assert_eq!(state, ScenarioState::Navigated);

        let state = state.after(&Step::FillForm { fields: FieldMap::new() });
        assert_eq!(state, ScenarioState::FormFilled);

        let state = state.after(&Step::Submit { form: None });
        assert_eq!(state, ScenarioState::Submitted);
        assert!(!state.is_terminal());

        let state = state.after(&Step::ExpectOutcome {
            kind: OutcomeKind::Success,
            contains: None,
            timeout_ms: None,
        });
        assert_eq!(state, ScenarioState::OutcomeObserved);
        assert!(state.is_terminal());
        assert!(ScenarioState::TimedOut.is_terminal());

        assert_eq!(
            state.after(&Step::Log { message: "noop".into() }),
            ScenarioState::OutcomeObserved
        );
    }

    #[test]
    fn test_filter_by_tag() {
        let scenarios = vec![
            Scenario::new("a").tag("login"),
            Scenario::new("b").tag("calculations"),
            Scenario::new("c").tag("login").tag("smoke"),
        ];
        let login: Vec<&str> = Scenario::filter_by_tag(&scenarios, "login")
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(login, vec!["a", "c"]);
    }
}
