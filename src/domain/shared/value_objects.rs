//! Shared value objects used across multiple bounded contexts

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::CallError;

/// Call identifier assigned by the telephony carrier
///
/// Opaque: never parsed, only compared and echoed back to the carrier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Agent identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Phone number in E.164 form (`+` followed by up to 15 digits)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Normalize loosely formatted input and validate it as E.164
    ///
    /// Separators (spaces, dashes, dots, parentheses) are stripped. A leading
    /// `00` is read as an international prefix. Bare numbers without `+` are
    /// assumed to be North American.
    pub fn parse(raw: &str) -> Result<Self, CallError> {
        let cleaned: String = raw
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
            .collect();

        let normalized = if let Some(rest) = cleaned.strip_prefix('+') {
            format!("+{}", rest)
        } else if let Some(rest) = cleaned.strip_prefix("00") {
            format!("+{}", rest)
        } else if cleaned.len() == 10 {
            format!("+1{}", cleaned)
        } else if cleaned.starts_with('1') {
            format!("+{}", cleaned)
        } else {
            format!("+1{}", cleaned)
        };

        if Self::is_e164(&normalized) {
            Ok(Self(normalized))
        } else {
            Err(CallError::InvalidPhoneNumber(raw.to_string()))
        }
    }

    fn is_e164(candidate: &str) -> bool {
        let Some(digits) = candidate.strip_prefix('+') else {
            return false;
        };
        (2..=15).contains(&digits.len())
            && digits.chars().all(|c| c.is_ascii_digit())
            && !digits.starts_with('0')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = CallError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PhoneNumber> for String {
    fn from(number: PhoneNumber) -> Self {
        number.0
    }
}
