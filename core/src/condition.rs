//! Status conditions reported for each upstream
//!
//! A [`Condition`] is a plain value: a type name, a status, a machine readable
//! reason and a human readable message. Validation steps produce them in order and
//! wrap each one in a [`GradatedCondition`] that records whether a failure of that
//! step withholds the provider entirely or only degrades it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const TYPE_BIND_SECRET_VALID: &str = "BindSecretValid";
pub const TYPE_TLS_CONFIGURATION_VALID: &str = "TLSConfigurationValid";
pub const TYPE_LDAP_CONNECTION_VALID: &str = "LDAPConnectionValid";
pub const TYPE_SEARCH_BASE_FOUND: &str = "SearchBaseFound";

pub const REASON_SUCCESS: &str = "Success";
pub const REASON_SECRET_NOT_FOUND: &str = "SecretNotFound";
pub const REASON_SECRET_WRONG_TYPE: &str = "SecretWrongType";
pub const REASON_SECRET_MISSING_KEYS: &str = "SecretMissingKeys";
pub const REASON_INVALID_TLS_CONFIG: &str = "InvalidTLSConfig";
pub const REASON_LDAP_CONNECTION_ERROR: &str = "LDAPConnectionError";
pub const REASON_USING_CONFIGURATION_FROM_SPEC: &str = "UsingConfigurationFromSpec";
pub const REASON_ERROR_FETCHING_SEARCH_BASE: &str = "ErrorFetchingSearchBase";

/// Tri-state condition status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionStatus::True => write!(f, "True"),
            ConditionStatus::False => write!(f, "False"),
            ConditionStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// A single named status entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type, unique within one upstream's status
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    /// Generation of the upstream spec this condition was computed for
    #[serde(default)]
    pub observed_generation: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl Condition {
    /// Create a condition without generation or timestamp
    pub fn new(
        condition_type: &str,
        status: ConditionStatus,
        reason: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            condition_type: condition_type.to_string(),
            status,
            reason: reason.to_string(),
            message: message.into(),
            observed_generation: 0,
            last_transition_time: None,
        }
    }

    /// Shorthand for a `True` condition
    pub fn success(condition_type: &str, reason: &str, message: impl Into<String>) -> Self {
        Self::new(condition_type, ConditionStatus::True, reason, message)
    }

    /// Shorthand for a `False` condition
    pub fn failure(condition_type: &str, reason: &str, message: impl Into<String>) -> Self {
        Self::new(condition_type, ConditionStatus::False, reason, message)
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// A condition plus whether its failure is fatal for publication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradatedCondition {
    condition: Condition,
    fatal: bool,
}

impl GradatedCondition {
    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    /// A failing condition that blocks publication
    pub fn is_fatal_failure(&self) -> bool {
        self.fatal && !self.condition.is_true()
    }

    /// A failing condition that only degrades publication
    pub fn is_warning(&self) -> bool {
        !self.fatal && !self.condition.is_true()
    }
}

/// Ordered list of gradated conditions produced by one validation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GradatedConditions {
    items: Vec<GradatedCondition>,
}

impl GradatedConditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a condition; its fatality is fixed from here on
    pub fn append(&mut self, condition: Condition, fatal: bool) {
        self.items.push(GradatedCondition { condition, fatal });
    }

    pub fn iter(&self) -> impl Iterator<Item = &GradatedCondition> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Conditions in the order they were appended
    pub fn conditions(&self) -> Vec<&Condition> {
        self.items.iter().map(|g| &g.condition).collect()
    }

    pub fn into_conditions(self) -> Vec<Condition> {
        self.items.into_iter().map(|g| g.condition).collect()
    }

    /// Find the condition of a given type
    pub fn get(&self, condition_type: &str) -> Option<&Condition> {
        self.items
            .iter()
            .map(|g| &g.condition)
            .find(|c| c.condition_type == condition_type)
    }

    pub fn has_fatal_failure(&self) -> bool {
        self.items.iter().any(GradatedCondition::is_fatal_failure)
    }

    pub fn has_warning(&self) -> bool {
        self.items.iter().any(GradatedCondition::is_warning)
    }
}
