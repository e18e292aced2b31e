//! Page actions
//!
//! Logical actions ("submit the registration form", "run a calculation")
//! expressed as id-addressed fill/select/click sequences. Actions return once
//! the browser has performed the input; they never wait for the server's
//! reaction. That is the job of [`crate::outcome`].

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::calculation::OperationKind;
use crate::contract::{self, id_selector, page_url, submit_selector};
use crate::error::{E2eError, E2eResult};
use crate::identity::SyntheticIdentity;
use crate::page::{BrowserPage, DialogAction};

/// Ordered field id to value pairs for one form. Fields are filled in the
/// order they were written, in code and in YAML alike.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    fields: Vec<(String, String)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing an earlier value for the same id.
    pub fn field(mut self, id: impl Into<String>, value: impl Into<String>) -> Self {
        let id = id.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == id) {
            Some(entry) => entry.1 = value,
            None => self.fields.push((id, value)),
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.iter().find(|(k, _)| *k == id).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Expand identity placeholders in every value.
    pub fn expand(&self, identity: &SyntheticIdentity) -> Self {
        Self {
            fields: self
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), identity.expand(v)))
                .collect(),
        }
    }
}

impl Serialize for FieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (id, value) in &self.fields {
            map.serialize_entry(id, value)?;
        }
        map.end()
    }
}

struct FieldMapVisitor;

impl<'de> Visitor<'de> for FieldMapVisitor {
    type Value = FieldMap;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of field ids to values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<FieldMap, A::Error> {
        let mut fields = FieldMap::new();
        while let Some((id, value)) = access.next_entry::<String, String>()? {
            fields = fields.field(id, value);
        }
        Ok(fields)
    }
}

impl<'de> Deserialize<'de> for FieldMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(FieldMapVisitor)
    }
}

/// All six registration fields, confirmation matching the password.
pub fn registration_form(identity: &SyntheticIdentity) -> FieldMap {
    FieldMap::new()
        .field(contract::USERNAME, &identity.username)
        .field(contract::EMAIL, &identity.email)
        .field(contract::FIRST_NAME, &identity.first_name)
        .field(contract::LAST_NAME, &identity.last_name)
        .field(contract::PASSWORD, &identity.password)
        .field(contract::CONFIRM_PASSWORD, &identity.password)
}

pub fn login_form(username: &str, password: &str) -> FieldMap {
    FieldMap::new()
        .field(contract::USERNAME, username)
        .field(contract::PASSWORD, password)
}

pub async fn navigate<P: BrowserPage + ?Sized>(page: &P, base_url: &str, path: &str) -> E2eResult<()> {
    let url = page_url(base_url, path);
    debug!("Navigating to {}", url);
    page.goto(&url).await
}

async fn require_present<P: BrowserPage + ?Sized>(page: &P, selector: &str) -> E2eResult<()> {
    if page.count(selector).await? == 0 {
        return Err(E2eError::FieldNotFound(selector.to_string()));
    }
    Ok(())
}

/// Fill every field by id. All ids are checked before anything is written,
/// so a contract mismatch leaves the form untouched.
pub async fn fill_form<P: BrowserPage + ?Sized>(page: &P, fields: &FieldMap) -> E2eResult<()> {
    for (id, _) in fields.iter() {
        require_present(page, &id_selector(id)).await?;
    }

    for (id, value) in fields.iter() {
        page.fill(&id_selector(id), value).await?;
    }

    debug!("Filled {} field(s)", fields.len());
    Ok(())
}

/// Click the submit control, scoped to a form id when given.
pub async fn submit<P: BrowserPage + ?Sized>(page: &P, form_scope: Option<&str>) -> E2eResult<()> {
    let selector = submit_selector(form_scope);
    require_present(page, &selector).await?;
    page.click(&selector).await
}

pub async fn select<P: BrowserPage + ?Sized>(page: &P, field_id: &str, option_value: &str) -> E2eResult<()> {
    let selector = id_selector(field_id);
    require_present(page, &selector).await?;
    page.select_option(&selector, option_value).await
}

pub async fn check<P: BrowserPage + ?Sized>(page: &P, field_id: &str) -> E2eResult<()> {
    let selector = id_selector(field_id);
    require_present(page, &selector).await?;
    page.check(&selector).await
}

/// Click the first element matching `selector`.
pub async fn click<P: BrowserPage + ?Sized>(page: &P, selector: &str) -> E2eResult<()> {
    require_present(page, selector).await?;
    page.click(selector).await
}

/// A dialog handler that has been registered but not yet triggered.
///
/// The only way to reach the guarded click is through
/// [`ArmedDialog::then_click`], so the handler is always in place before the
/// dialog can open.
#[must_use = "an armed dialog does nothing until the triggering click"]
pub struct ArmedDialog<'a, P: BrowserPage + ?Sized> {
    page: &'a P,
}

impl<'a, P: BrowserPage + ?Sized> ArmedDialog<'a, P> {
    pub async fn then_click(self, selector: &str) -> E2eResult<()> {
        click(self.page, selector).await
    }
}

/// Arm a one-shot accept for the next native confirmation dialog.
pub async fn confirm_dialog<P: BrowserPage + ?Sized>(page: &P) -> E2eResult<ArmedDialog<'_, P>> {
    page.arm_dialog(DialogAction::Accept).await?;
    Ok(ArmedDialog { page })
}

/// Choose an operation, enter the raw operand text and submit the
/// calculation form.
pub async fn perform_calculation<P: BrowserPage + ?Sized>(
    page: &P,
    operation: OperationKind,
    operands: &str,
) -> E2eResult<()> {
    select(page, contract::CALC_TYPE, operation.as_str()).await?;
    fill_form(page, &FieldMap::new().field(contract::CALC_INPUTS, operands)).await?;
    submit(page, Some(contract::CALCULATION_FORM)).await
}
