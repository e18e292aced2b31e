//! Page contract of the calculator app
//!
//! Paths and stable element ids the harness depends on. Layout and styling
//! can change freely on the server side; renaming anything here is a contract
//! break and surfaces as `FieldNotFound`.

pub const HOME_PATH: &str = "/";
pub const REGISTER_PATH: &str = "/register";
pub const LOGIN_PATH: &str = "/login";
pub const DASHBOARD_PATH: &str = "/dashboard";

/// URL patterns used for redirect checks.
pub const LOGIN_URL_PATTERN: &str = ".*/login";
pub const DASHBOARD_URL_PATTERN: &str = ".*/dashboard";

// Registration and login fields
pub const USERNAME: &str = "username";
pub const EMAIL: &str = "email";
pub const FIRST_NAME: &str = "first_name";
pub const LAST_NAME: &str = "last_name";
pub const PASSWORD: &str = "password";
pub const CONFIRM_PASSWORD: &str = "confirm_password";
pub const REMEMBER: &str = "remember";

// Outcome banners
pub const SUCCESS_ALERT: &str = "#successAlert";
pub const SUCCESS_MESSAGE: &str = "#successMessage";
pub const ERROR_ALERT: &str = "#errorAlert";
pub const ERROR_MESSAGE: &str = "#errorMessage";

// Dashboard
pub const USER_WELCOME: &str = "#userWelcome";
pub const CALCULATION_FORM: &str = "#calculationForm";
pub const CALC_TYPE: &str = "calcType";
pub const CALC_INPUTS: &str = "calcInputs";
pub const CALCULATIONS_TABLE: &str = "#calculationsTable";
pub const DELETE_CALCULATION: &str = ".delete-calc";
pub const LOGOUT_BUTTON: &str = "#logoutBtn";

pub const SUBMIT_BUTTON: &str = "button[type='submit']";

/// Selector for an element addressed by its stable id.
pub fn id_selector(field_id: &str) -> String {
    if field_id.starts_with('#') {
        field_id.to_string()
    } else {
        format!("#{field_id}")
    }
}

/// Submit control, optionally scoped to one form.
pub fn submit_selector(form_scope: Option<&str>) -> String {
    match form_scope {
        Some(scope) => format!("{} {}", id_selector(scope), SUBMIT_BUTTON),
        None => SUBMIT_BUTTON.to_string(),
    }
}

/// Join a server base URL and a path without doubling slashes.
pub fn page_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}
