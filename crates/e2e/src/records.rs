//! Domain records built from page state and probe payloads

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{HarnessError, HarnessResult};

/// Secret material a scenario submits to the login UI
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Password { username: String, password: String },
    ScratchCode(String),
}

impl Credential {
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credential::Password {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn scratch_code(code: impl Into<String>) -> Self {
        Credential::ScratchCode(code.into())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"******")
                .finish(),
            Credential::ScratchCode(_) => f.debug_tuple("ScratchCode").field(&"******").finish(),
        }
    }
}

/// Terminal state of a submitted login form
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginOutcome {
    #[default]
    Authenticated,
    ChallengeRequired,
    Rejected,
}

impl fmt::Display for LoginOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoginOutcome::Authenticated => "authenticated",
            LoginOutcome::ChallengeRequired => "challenge_required",
            LoginOutcome::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// What a scenario observed about authentication
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationResult {
    pub session_cookie: bool,

    /// Released attributes; value order is not significant
    pub attributes: BTreeMap<String, Vec<String>>,

    pub outcome: Option<LoginOutcome>,
}

impl AuthenticationResult {
    /// Merge attributes found in a SAML/CAS state dump. Looks for an
    /// `Attributes` or `attributes` object at the top level.
    pub fn absorb_attributes(&mut self, payload: &Value) -> usize {
        let Some(attributes) = payload
            .get("Attributes")
            .or_else(|| payload.get("attributes"))
            .and_then(Value::as_object)
        else {
            return 0;
        };

        for (name, value) in attributes {
            let mut values: Vec<String> = match value {
                Value::Array(items) => items.iter().map(crate::probe::scalar_text).collect(),
                Value::Null => Vec::new(),
                other => vec![crate::probe::scalar_text(other)],
            };
            values.sort();
            self.attributes.insert(name.clone(), values);
        }
        attributes.len()
    }
}

/// A device registered to skip repeated multifactor challenges
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedDeviceRecord {
    pub id: String,
    pub name: String,
    pub record_date: Option<String>,
    pub principal: Option<String>,
}

impl TrustedDeviceRecord {
    /// Validate one registry entry; `id` and `name` must be non-null.
    pub fn from_json(url: &str, entry: &Value) -> HarnessResult<Self> {
        let field = |key: &str| -> Option<String> {
            entry
                .get(key)
                .filter(|v| !v.is_null())
                .map(crate::probe::scalar_text)
        };

        let invalid = |missing: &str| {
            HarnessError::probe(url, format!("trusted device record has null {}", missing))
        };
        let id = field("id").ok_or_else(|| invalid("id"))?;
        let name = field("name").ok_or_else(|| invalid("name"))?;

        Ok(Self {
            id,
            name,
            record_date: field("recordDate"),
            principal: field("principal"),
        })
    }

    /// Validate a registry listing (a JSON array of entries). The first
    /// `required` entries must be well formed; later malformed entries are
    /// skipped.
    pub fn list_from_json(url: &str, payload: &Value, required: usize) -> HarnessResult<Vec<Self>> {
        let entries = payload
            .as_array()
            .ok_or_else(|| HarnessError::probe(url, "trusted device listing is not an array"))?;

        let mut records = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            match Self::from_json(url, entry) {
                Ok(record) => records.push(record),
                Err(e) if index < required => return Err(e),
                Err(e) => warn!("Skipping trusted device entry {}: {}", index, e),
            }
        }
        Ok(records)
    }
}
