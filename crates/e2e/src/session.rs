//! Session bootstrapping: register, then log in
//!
//! Almost every dashboard scenario needs a logged-in browser context. The
//! bootstrapper creates a real account on the server under test (the server
//! is disposable) and refuses to continue to login when registration was
//! rejected.

use rand::Rng;
use regex::Regex;
use tracing::{debug, info};

use crate::actions::{self, login_form, registration_form};
use crate::contract::{self, DASHBOARD_URL_PATTERN, LOGIN_URL_PATTERN};
use crate::error::{E2eError, E2eResult};
use crate::identity::{generate_identity, SyntheticIdentity};
use crate::outcome::{expect_redirect, observe_outcome, ActionResult, BannerSnapshot};
use crate::page::BrowserPage;
use crate::wait::Timeouts;

/// An authenticated browser context bound to one identity.
///
/// Borrows the page: the scenario that opened the context keeps ownership
/// and is the one that closes it.
pub struct Session<'a, P: BrowserPage + ?Sized> {
    page: &'a P,
    identity: SyntheticIdentity,
    base_url: String,
    timeouts: Timeouts,
}

impl<'a, P: BrowserPage + ?Sized> Session<'a, P> {
    pub fn page(&self) -> &'a P {
        self.page
    }

    pub fn identity(&self) -> &SyntheticIdentity {
        &self.identity
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Confirm the logout dialog and wait to land on the login page.
    pub async fn logout(self) -> E2eResult<()> {
        actions::confirm_dialog(self.page)
            .await?
            .then_click(contract::LOGOUT_BUTTON)
            .await?;

        let pattern = Regex::new(LOGIN_URL_PATTERN)?;
        expect_redirect(self.page, &pattern, self.timeouts.navigation()).await?;
        info!("Logged out {}", self.identity.username);
        Ok(())
    }
}

/// Open the registration page, submit `identity` and report the banner.
pub async fn register<P: BrowserPage + ?Sized>(
    page: &P,
    base_url: &str,
    identity: &SyntheticIdentity,
    timeouts: &Timeouts,
) -> E2eResult<ActionResult> {
    actions::navigate(page, base_url, contract::REGISTER_PATH).await?;
    actions::fill_form(page, &registration_form(identity)).await?;
    let before = BannerSnapshot::capture(page).await?;
    actions::submit(page, None).await?;

    let result = observe_outcome(page, &before, timeouts.banner()).await?;
    debug!("Registration of {}: {}", identity.username, result);
    Ok(result)
}

/// Open the login page, submit credentials and report the banner.
pub async fn login<P: BrowserPage + ?Sized>(
    page: &P,
    base_url: &str,
    username: &str,
    password: &str,
    timeouts: &Timeouts,
) -> E2eResult<ActionResult> {
    actions::navigate(page, base_url, contract::LOGIN_PATH).await?;
    actions::fill_form(page, &login_form(username, password)).await?;
    let before = BannerSnapshot::capture(page).await?;
    actions::submit(page, None).await?;

    let result = observe_outcome(page, &before, timeouts.banner()).await?;
    debug!("Login of {}: {}", username, result);
    Ok(result)
}

/// Register `identity`, log in with it, and wait for the dashboard.
pub async fn bootstrap_session<'a, P: BrowserPage + ?Sized>(
    page: &'a P,
    base_url: &str,
    identity: SyntheticIdentity,
    timeouts: &Timeouts,
) -> E2eResult<Session<'a, P>> {
    match register(page, base_url, &identity, timeouts).await? {
        ActionResult::Success(_) => {}
        ActionResult::Error(message) => return Err(E2eError::RegistrationFailed(message)),
        ActionResult::Timeout => {
            return Err(E2eError::timeout("registration outcome banner", timeouts.banner()));
        }
    }

    match login(page, base_url, &identity.username, &identity.password, timeouts).await? {
        ActionResult::Success(_) => {}
        ActionResult::Error(message) => return Err(E2eError::LoginFailed(message)),
        ActionResult::Timeout => {
            return Err(E2eError::LoginFailed(format!(
                "no outcome banner within {} ms",
                timeouts.banner_ms
            )));
        }
    }

    let dashboard = Regex::new(DASHBOARD_URL_PATTERN)?;
    expect_redirect(page, &dashboard, timeouts.navigation())
        .await
        .map_err(|e| E2eError::LoginFailed(e.to_string()))?;

    info!("Authenticated as {}", identity.username);
    Ok(Session {
        page,
        identity,
        base_url: base_url.to_string(),
        timeouts: *timeouts,
    })
}

/// Generate a fresh identity and bootstrap a session with it.
pub async fn bootstrap_authenticated<'a, P, R>(
    page: &'a P,
    base_url: &str,
    rng: &mut R,
    prefix: &str,
    timeouts: &Timeouts,
) -> E2eResult<(Session<'a, P>, SyntheticIdentity)>
where
    P: BrowserPage + ?Sized,
    R: Rng + ?Sized,
{
    let identity = generate_identity(rng, prefix);
    let session = bootstrap_session(page, base_url, identity.clone(), timeouts).await?;
    Ok((session, identity))
}
