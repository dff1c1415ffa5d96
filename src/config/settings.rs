//! User configuration record
//!
//! The record is flat and closed: exactly five fields, serialized with the
//! same names on disk and over the bridge. Parsing from untrusted JSON is
//! field-by-field so one bad value never costs the others.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// The single authoritative settings record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    /// Mute shell audio while unfocused
    pub automute: bool,
    /// Bring the shell to the foreground when a session starts
    pub autofocus: bool,
    /// Send synthetic input when the idle warning shows up
    pub idleguard: bool,
    /// Identity string override; empty means platform default
    pub user_agent: String,
    /// Gate for presence reporting
    pub presence_enabled: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            automute: false,
            autofocus: false,
            idleguard: false,
            user_agent: String::new(),
            presence_enabled: false,
        }
    }
}

/// Names of the configuration fields, the only keys `update` accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigField {
    Automute,
    Autofocus,
    Idleguard,
    UserAgent,
    PresenceEnabled,
}

impl ConfigField {
    pub const ALL: [ConfigField; 5] = [
        ConfigField::Automute,
        ConfigField::Autofocus,
        ConfigField::Idleguard,
        ConfigField::UserAgent,
        ConfigField::PresenceEnabled,
    ];

    /// Key used in the settings file and in bridge snapshots
    pub fn key(self) -> &'static str {
        match self {
            ConfigField::Automute => "automute",
            ConfigField::Autofocus => "autofocus",
            ConfigField::Idleguard => "idleguard",
            ConfigField::UserAgent => "userAgent",
            ConfigField::PresenceEnabled => "presenceEnabled",
        }
    }

    fn expects_string(self) -> bool {
        matches!(self, ConfigField::UserAgent)
    }
}

impl fmt::Display for ConfigField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A value whose JSON type does not match the field it was meant for
#[derive(Debug, Clone, PartialEq)]
pub struct TypeMismatch {
    pub field: ConfigField,
    pub value: Value,
}

impl fmt::Display for TypeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let expected = if self.field.expects_string() { "string" } else { "boolean" };
        write!(f, "{} expects a {expected}, got {}", self.field, self.value)
    }
}

impl std::error::Error for TypeMismatch {}

impl Configuration {
    /// Set one field from an untyped value, rejecting the wrong JSON type
    pub fn set(&mut self, field: ConfigField, value: &Value) -> Result<(), TypeMismatch> {
        let mismatch = || TypeMismatch { field, value: value.clone() };
        match field {
            ConfigField::UserAgent => {
                self.user_agent = value.as_str().ok_or_else(mismatch)?.to_string();
            }
            ConfigField::Automute => self.automute = value.as_bool().ok_or_else(mismatch)?,
            ConfigField::Autofocus => self.autofocus = value.as_bool().ok_or_else(mismatch)?,
            ConfigField::Idleguard => self.idleguard = value.as_bool().ok_or_else(mismatch)?,
            ConfigField::PresenceEnabled => {
                self.presence_enabled = value.as_bool().ok_or_else(mismatch)?
            }
        }
        Ok(())
    }

    /// Build a record from a parsed JSON object.
    ///
    /// Every field is checked on its own; missing or mistyped fields keep
    /// their default and are reported back. Unknown keys are ignored.
    pub fn from_object(object: &Map<String, Value>) -> (Self, Vec<ConfigField>) {
        let mut config = Self::default();
        let mut replaced = Vec::new();

        for field in ConfigField::ALL {
            match object.get(field.key()) {
                Some(value) => {
                    if config.set(field, value).is_err() {
                        replaced.push(field);
                    }
                }
                None => replaced.push(field),
            }
        }

        (config, replaced)
    }

    /// The user agent override, `None` when the platform default applies
    pub fn user_agent_override(&self) -> Option<&str> {
        if self.user_agent.is_empty() {
            None
        } else {
            Some(&self.user_agent)
        }
    }
}
