//! In-memory calculator app implementing the page seam
//!
//! `FakeCalculatorApp` plays the server: it owns the account store and the
//! per-user calculation history. Each `FakePage` is one isolated browser
//! context (its own login state) against that shared store. The DOM contract
//! mirrors the real app closely enough to run the built-in scenarios without
//! a browser.
//!
//! Like the real app, success banners appear first and the follow-up
//! navigation lands a moment later; here that moment is the next URL read.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};

use crate::calculation::{format_number, parse_operands, CalculationRecord, OperationKind};
use crate::contract::{
    self, id_selector, submit_selector, CALCULATIONS_TABLE, DELETE_CALCULATION, ERROR_ALERT,
    ERROR_MESSAGE, LOGOUT_BUTTON, SUBMIT_BUTTON, SUCCESS_ALERT, SUCCESS_MESSAGE, USER_WELCOME,
};
use crate::error::{E2eError, E2eResult};
use crate::page::{BrowserPage, DialogAction, PageFactory, Viewport};

pub const FAKE_BASE_URL: &str = "http://calculator.test";

const REGISTER_FIELDS: &[&str] = &[
    contract::USERNAME,
    contract::EMAIL,
    contract::FIRST_NAME,
    contract::LAST_NAME,
    contract::PASSWORD,
    contract::CONFIRM_PASSWORD,
];

const LOGIN_FIELDS: &[&str] = &[contract::USERNAME, contract::PASSWORD];

#[derive(Debug)]
struct Account {
    email: String,
    password: String,
}

#[derive(Debug, Default)]
struct AppState {
    accounts: HashMap<String, Account>,
    history: HashMap<String, Vec<CalculationRecord>>,
    pages_opened: usize,
    pages_closed: usize,
    logins_disabled: bool,
    login_redirect_stalled: bool,
}

/// Shared server-side state for a set of fake pages.
#[derive(Debug, Clone, Default)]
pub struct FakeCalculatorApp {
    state: Arc<Mutex<AppState>>,
}

impl FakeCalculatorApp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_url(&self) -> &'static str {
        FAKE_BASE_URL
    }

    pub fn open_page(&self) -> FakePage {
        self.state.lock().pages_opened += 1;
        FakePage {
            app: Arc::clone(&self.state),
            state: Mutex::new(PageState::default()),
        }
    }

    pub fn has_account(&self, username: &str) -> bool {
        self.state.lock().accounts.contains_key(username)
    }

    pub fn account_count(&self) -> usize {
        self.state.lock().accounts.len()
    }

    pub fn history(&self, username: &str) -> Vec<CalculationRecord> {
        self.state
            .lock()
            .history
            .get(username)
            .cloned()
            .unwrap_or_default()
    }

    pub fn pages_opened(&self) -> usize {
        self.state.lock().pages_opened
    }

    pub fn pages_closed(&self) -> usize {
        self.state.lock().pages_closed
    }

    /// Reject every login, even with the right password.
    pub fn disable_logins(&self) {
        self.state.lock().logins_disabled = true;
    }

    /// Accept logins but never move on to the dashboard.
    pub fn stall_login_redirect(&self) {
        self.state.lock().login_redirect_stalled = true;
    }
}

#[async_trait]
impl PageFactory for FakeCalculatorApp {
    type Page = FakePage;

    async fn new_page(&self, viewport: Viewport) -> E2eResult<FakePage> {
        let page = self.open_page();
        page.state.lock().viewport = viewport;
        Ok(page)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    Blank,
    Home,
    Register,
    Login,
    Dashboard,
    NotFound,
}

#[derive(Debug)]
struct PageState {
    screen: Screen,
    path: String,
    inputs: HashMap<String, String>,
    checked: HashSet<String>,
    success: Option<String>,
    error: Option<String>,
    signed_in: Option<String>,
    pending_redirect: Option<&'static str>,
    armed_dialog: Option<DialogAction>,
    viewport: Viewport,
    closed: bool,
}

impl Default for PageState {
    fn default() -> Self {
        Self {
            screen: Screen::Blank,
            path: "about:blank".to_string(),
            inputs: HashMap::new(),
            checked: HashSet::new(),
            success: None,
            error: None,
            signed_in: None,
            pending_redirect: None,
            armed_dialog: None,
            viewport: Viewport::default(),
            closed: false,
        }
    }
}

impl PageState {
    fn load(&mut self, path: &str) {
        self.inputs.clear();
        self.checked.clear();
        self.success = None;
        self.error = None;
        self.pending_redirect = None;

        let (screen, path) = match path {
            "/" | "" => (Screen::Home, "/"),
            contract::REGISTER_PATH => (Screen::Register, path),
            contract::LOGIN_PATH => (Screen::Login, path),
            contract::DASHBOARD_PATH if self.signed_in.is_some() => (Screen::Dashboard, path),
            contract::DASHBOARD_PATH => (Screen::Login, contract::LOGIN_PATH),
            _ => (Screen::NotFound, path),
        };
        self.screen = screen;
        self.path = path.to_string();
    }

    fn apply_pending_redirect(&mut self) {
        if let Some(path) = self.pending_redirect.take() {
            self.load(path);
        }
    }

    fn has_banners(&self) -> bool {
        matches!(self.screen, Screen::Register | Screen::Login | Screen::Dashboard)
    }

    fn fillable(&self) -> Vec<String> {
        let ids: &[&str] = match self.screen {
            Screen::Register => REGISTER_FIELDS,
            Screen::Login => LOGIN_FIELDS,
            Screen::Dashboard => &[contract::CALC_INPUTS],
            _ => &[],
        };
        ids.iter().map(|id| id_selector(id)).collect()
    }

    fn static_elements(&self) -> Vec<String> {
        let mut elements = vec!["body".to_string()];
        elements.extend(self.fillable());
        if self.has_banners() {
            elements.extend(
                [SUCCESS_ALERT, SUCCESS_MESSAGE, ERROR_ALERT, ERROR_MESSAGE]
                    .iter()
                    .map(|s| s.to_string()),
            );
        }
        match self.screen {
            Screen::Register => elements.push(SUBMIT_BUTTON.to_string()),
            Screen::Login => {
                elements.push(id_selector(contract::REMEMBER));
                elements.push(SUBMIT_BUTTON.to_string());
            }
            Screen::Dashboard => {
                elements.extend(
                    [
                        USER_WELCOME,
                        contract::CALCULATION_FORM,
                        CALCULATIONS_TABLE,
                        LOGOUT_BUTTON,
                        SUBMIT_BUTTON,
                    ]
                    .iter()
                    .map(|s| s.to_string()),
                );
                elements.push(id_selector(contract::CALC_TYPE));
                elements.push(submit_selector(Some(contract::CALCULATION_FORM)));
            }
            _ => {}
        }
        elements
    }

    fn flash(&mut self, result: Result<String, String>) {
        match result {
            Ok(message) => {
                self.success = Some(message);
                self.error = None;
            }
            Err(message) => {
                self.success = None;
                self.error = Some(message);
            }
        }
    }

    fn input(&self, id: &str) -> String {
        self.inputs
            .get(&id_selector(id))
            .cloned()
            .unwrap_or_default()
    }
}

fn is_delete_selector(selector: &str) -> bool {
    selector == DELETE_CALCULATION || selector == format!("{CALCULATIONS_TABLE} {DELETE_CALCULATION}")
}

fn valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.contains('@') && domain.split('.').filter(|p| !p.is_empty()).count() >= 2
        }
        None => false,
    }
}

/// One isolated browser context against a [`FakeCalculatorApp`].
#[derive(Debug)]
pub struct FakePage {
    app: Arc<Mutex<AppState>>,
    state: Mutex<PageState>,
}

impl FakePage {
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn viewport(&self) -> Viewport {
        self.state.lock().viewport
    }

    pub fn is_checked(&self, selector: &str) -> bool {
        self.state.lock().checked.contains(selector)
    }

    fn live(&self) -> E2eResult<MutexGuard<'_, PageState>> {
        let state = self.state.lock();
        if state.closed {
            return Err(E2eError::Bridge("page has been closed".to_string()));
        }
        Ok(state)
    }

    fn rows(&self, state: &PageState) -> Vec<CalculationRecord> {
        match (&state.screen, &state.signed_in) {
            (Screen::Dashboard, Some(user)) => self.app.lock().history.get(user).cloned().unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    fn count_in(&self, state: &PageState, selector: &str) -> usize {
        if is_delete_selector(selector) {
            return self.rows(state).len();
        }
        usize::from(state.static_elements().iter().any(|e| e == selector))
    }

    fn render_table(&self, state: &PageState) -> String {
        let rows = self.rows(state);
        if rows.is_empty() {
            return "Type Inputs Result Actions No calculations found".to_string();
        }
        let body: Vec<String> = rows
            .iter()
            .map(|row| format!("{} Delete", row.cells().join(" ")))
            .collect();
        format!("Type Inputs Result Actions {}", body.join(" "))
    }

    fn submit_registration(&self, state: &mut PageState) {
        let username = state.input(contract::USERNAME);
        let email = state.input(contract::EMAIL);
        let password = state.input(contract::PASSWORD);
        let confirm = state.input(contract::CONFIRM_PASSWORD);

        let outcome = if REGISTER_FIELDS.iter().any(|id| state.input(id).trim().is_empty()) {
            Err("All fields are required".to_string())
        } else if !valid_email(&email) {
            Err("Please enter a valid email address".to_string())
        } else if password != confirm {
            Err("Passwords do not match".to_string())
        } else if password.len() < 8 {
            Err("Password must be at least 8 characters".to_string())
        } else {
            let mut app = self.app.lock();
            if app.accounts.contains_key(&username) {
                Err("Username already exists".to_string())
            } else if app.accounts.values().any(|a| a.email == email) {
                Err("Email already registered".to_string())
            } else {
                app.accounts.insert(username, Account { email, password });
                Ok("Registration successful! Redirecting to login...".to_string())
            }
        };

        if outcome.is_ok() {
            state.pending_redirect = Some(contract::LOGIN_PATH);
        }
        state.flash(outcome);
    }

    fn submit_login(&self, state: &mut PageState) {
        let username = state.input(contract::USERNAME);
        let password = state.input(contract::PASSWORD);

        let (authenticated, disabled, stalled) = {
            let app = self.app.lock();
            let authenticated = app
                .accounts
                .get(&username)
                .map(|account| account.password == password)
                .unwrap_or(false);
            (authenticated, app.logins_disabled, app.login_redirect_stalled)
        };

        if disabled {
            state.flash(Err("Login is temporarily disabled".to_string()));
        } else if authenticated {
            state.signed_in = Some(username);
            if !stalled {
                state.pending_redirect = Some(contract::DASHBOARD_PATH);
            }
            state.flash(Ok("Login successful! Redirecting...".to_string()));
        } else {
            state.flash(Err("Invalid username or password".to_string()));
        }
    }

    fn submit_calculation(&self, state: &mut PageState) {
        let Some(user) = state.signed_in.clone() else {
            state.flash(Err("Not authenticated".to_string()));
            return;
        };
        let operation = OperationKind::parse(&state.input(contract::CALC_TYPE)).unwrap_or(OperationKind::Addition);

        let outcome = match parse_operands(&state.input(contract::CALC_INPUTS)) {
            None => Err("Please enter valid comma-separated numbers".to_string()),
            Some(operands) if operands.len() < 2 => Err("At least two numbers are required".to_string()),
            Some(operands) => match CalculationRecord::new(operation, operands) {
                None => Err("Cannot divide by zero".to_string()),
                Some(record) => {
                    let message = format!("Calculation complete: {}", format_number(record.result));
                    self.app.lock().history.entry(user).or_default().push(record);
                    Ok(message)
                }
            },
        };
        state.flash(outcome);
    }

    fn delete_first_row(&self, state: &mut PageState) {
        let Some(user) = state.signed_in.clone() else {
            return;
        };
        let removed = {
            let mut app = self.app.lock();
            match app.history.get_mut(&user) {
                Some(rows) if !rows.is_empty() => {
                    rows.remove(0);
                    true
                }
                _ => false,
            }
        };
        if removed {
            state.flash(Ok("Calculation deleted successfully".to_string()));
        }
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn goto(&self, url: &str) -> E2eResult<()> {
        let mut state = self.live()?;
        let path = match url.strip_prefix(FAKE_BASE_URL) {
            Some(path) => path.to_string(),
            None => return Err(E2eError::Bridge(format!("net::ERR_NAME_NOT_RESOLVED at {url}"))),
        };
        state.load(&path);
        Ok(())
    }

    async fn url(&self) -> E2eResult<String> {
        let mut state = self.live()?;
        state.apply_pending_redirect();
        if state.screen == Screen::Blank {
            return Ok(state.path.clone());
        }
        Ok(format!("{FAKE_BASE_URL}{}", state.path))
    }

    async fn count(&self, selector: &str) -> E2eResult<usize> {
        let state = self.live()?;
        Ok(self.count_in(&state, selector))
    }

    async fn fill(&self, selector: &str, value: &str) -> E2eResult<()> {
        let mut state = self.live()?;
        if !state.fillable().iter().any(|s| s == selector) {
            return Err(E2eError::Bridge(format!("no fillable element matches {selector}")));
        }
        state.inputs.insert(selector.to_string(), value.to_string());
        Ok(())
    }

    async fn click(&self, selector: &str) -> E2eResult<()> {
        let mut state = self.live()?;
        if self.count_in(&state, selector) == 0 {
            return Err(E2eError::Bridge(format!("no element matches {selector}")));
        }

        let calc_submit = submit_selector(Some(contract::CALCULATION_FORM));
        match state.screen {
            Screen::Register if selector == SUBMIT_BUTTON => self.submit_registration(&mut state),
            Screen::Login if selector == SUBMIT_BUTTON => self.submit_login(&mut state),
            Screen::Dashboard if selector == SUBMIT_BUTTON || selector == calc_submit => {
                self.submit_calculation(&mut state)
            }
            Screen::Dashboard if selector == LOGOUT_BUTTON => {
                // Unhandled dialogs are dismissed.
                if state.armed_dialog.take() == Some(DialogAction::Accept) {
                    state.signed_in = None;
                    state.pending_redirect = Some(contract::LOGIN_PATH);
                }
            }
            Screen::Dashboard if is_delete_selector(selector) => {
                if state.armed_dialog.take() == Some(DialogAction::Accept) {
                    self.delete_first_row(&mut state);
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn select_option(&self, selector: &str, value: &str) -> E2eResult<()> {
        let mut state = self.live()?;
        if state.screen != Screen::Dashboard || selector != id_selector(contract::CALC_TYPE) {
            return Err(E2eError::Bridge(format!("no select matches {selector}")));
        }
        let operation = OperationKind::parse(value)
            .ok_or_else(|| E2eError::Bridge(format!("no option {value:?} in {selector}")))?;
        state.inputs.insert(selector.to_string(), operation.as_str().to_string());
        Ok(())
    }

    async fn check(&self, selector: &str) -> E2eResult<()> {
        let mut state = self.live()?;
        if state.screen != Screen::Login || selector != id_selector(contract::REMEMBER) {
            return Err(E2eError::Bridge(format!("no checkbox matches {selector}")));
        }
        state.checked.insert(selector.to_string());
        Ok(())
    }

    async fn is_visible(&self, selector: &str) -> E2eResult<bool> {
        let state = self.live()?;
        if self.count_in(&state, selector) == 0 {
            return Ok(false);
        }
        Ok(match selector {
            SUCCESS_ALERT | SUCCESS_MESSAGE => state.success.is_some(),
            ERROR_ALERT | ERROR_MESSAGE => state.error.is_some(),
            _ => true,
        })
    }

    async fn text_content(&self, selector: &str) -> E2eResult<Option<String>> {
        let state = self.live()?;
        if self.count_in(&state, selector) == 0 {
            return Ok(None);
        }
        let text = match selector {
            SUCCESS_ALERT | SUCCESS_MESSAGE => state.success.clone().unwrap_or_default(),
            ERROR_ALERT | ERROR_MESSAGE => state.error.clone().unwrap_or_default(),
            USER_WELCOME => format!("Welcome, {}!", state.signed_in.clone().unwrap_or_default()),
            CALCULATIONS_TABLE => self.render_table(&state),
            "body" => format!("Calculator {}", state.path),
            _ if is_delete_selector(selector) => "Delete".to_string(),
            other => state.inputs.get(other).cloned().unwrap_or_default(),
        };
        Ok(Some(text))
    }

    async fn arm_dialog(&self, action: DialogAction) -> E2eResult<()> {
        self.live()?.armed_dialog = Some(action);
        Ok(())
    }

    async fn set_viewport(&self, viewport: Viewport) -> E2eResult<()> {
        self.live()?.viewport = viewport;
        Ok(())
    }

    async fn close(&self) -> E2eResult<()> {
        let mut state = self.live()?;
        state.closed = true;
        self.app.lock().pages_closed += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dashboard_requires_login() {
        let app = FakeCalculatorApp::new();
        let page = app.open_page();

        page.goto(&format!("{FAKE_BASE_URL}/dashboard")).await.unwrap();
        assert_eq!(page.url().await.unwrap(), format!("{FAKE_BASE_URL}/login"));
    }

    #[tokio::test]
    async fn test_closed_page_rejects_calls() {
        let app = FakeCalculatorApp::new();
        let page = app.open_page();
        page.close().await.unwrap();

        assert!(page.is_closed());
        assert!(page.goto(FAKE_BASE_URL).await.is_err());
        assert_eq!(app.pages_closed(), 1);
    }

    #[test]
    fn test_email_validation() {
        assert!(valid_email("ada.lovelace12@example.com"));
        assert!(!valid_email("not-a-valid-email"));
        assert!(!valid_email("@example.com"));
        assert!(!valid_email("ada@localhost"));
    }
}
