//! Calculator E2E Workflow Harness
//!
//! This crate drives the calculator web app through a real browser and
//! verifies its user-facing workflows:
//! - Generates unique synthetic identities per scenario
//! - Registers and logs in to obtain authenticated sessions
//! - Fills forms, submits calculations and confirms dialogs by DOM id
//! - Waits for success/error banners, redirects and history updates with
//!   bounded polling instead of fixed sleeps
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Scenario Runner (Rust)                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScenarioRunner<F: PageFactory>                             │
//! │    ├── run_all(scenarios) -> SuiteResult                    │
//! │    └── run_one(scenario, seed) -> ScenarioResult            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Scenario (built-in catalog or YAML)                        │
//! │    └── steps: register | authenticate | fill_form | submit  │
//! │               calculate | confirm_dialog | logout           │
//! │               expect_outcome | expect_redirect | ...        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  session  ── actions ── outcome ── wait                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  BrowserPage                                                │
//! │    ├── PlaywrightPage (node bridge, JSON lines)             │
//! │    └── FakePage (in-memory app, offline tests)              │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod actions;
pub mod calculation;
pub mod catalog;
pub mod contract;
pub mod error;
pub mod identity;
pub mod outcome;
pub mod page;
pub mod playwright;
pub mod runner;
pub mod scenario;
pub mod server;
pub mod session;
pub mod testing;
pub mod wait;

pub use error::{E2eError, E2eResult};
pub use identity::{generate_identity, IdentityGenerator, SyntheticIdentity};
pub use outcome::{ActionResult, OutcomeKind, TextMatch};
pub use page::{BrowserPage, PageFactory, Viewport};
pub use playwright::{Browser, PlaywrightConfig, PlaywrightDriver};
pub use runner::{RunnerConfig, ScenarioRunner, SuiteResult};
pub use scenario::{Scenario, ScenarioResult, Step};
pub use session::{bootstrap_authenticated, bootstrap_session, Session};
pub use wait::Timeouts;
