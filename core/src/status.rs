//! Upstream status reporting

use crate::condition::{Condition, ConditionStatus, GradatedConditions};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Summary phase of an upstream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    Pending,
    Ready,
    Error,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Pending => write!(f, "Pending"),
            Phase::Ready => write!(f, "Ready"),
            Phase::Error => write!(f, "Error"),
        }
    }
}

/// Status written back for an upstream after a sync pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamStatus {
    pub phase: Phase,
    pub conditions: Vec<Condition>,
}

/// Merge freshly computed conditions into `existing`.
///
/// Each new condition is stamped with `observed_generation`. The transition time
/// of an existing condition only moves when its status changes. Conditions of
/// other types are kept, and the result is sorted by type. Returns true when any
/// of the new conditions is False.
pub fn merge_conditions(
    existing: &mut Vec<Condition>,
    new_conditions: &[Condition],
    observed_generation: i64,
    now: DateTime<Utc>,
) -> bool {
    let mut had_error = false;

    for condition in new_conditions {
        let mut condition = condition.clone();
        condition.observed_generation = observed_generation;
        condition.last_transition_time = Some(now);
        if condition.status == ConditionStatus::False {
            had_error = true;
        }

        match existing
            .iter_mut()
            .find(|c| c.condition_type == condition.condition_type)
        {
            None => {
                tracing::debug!(
                    "Adding condition {} ({}): {}",
                    condition.condition_type,
                    condition.status,
                    condition.message
                );
                existing.push(condition);
            }
            Some(old) => {
                if old.status != condition.status {
                    tracing::debug!(
                        "Condition {} changed from {} to {}",
                        condition.condition_type,
                        old.status,
                        condition.status
                    );
                    old.status = condition.status;
                    old.last_transition_time = condition.last_transition_time;
                }
                old.reason = condition.reason;
                old.message = condition.message;
                old.observed_generation = condition.observed_generation;
            }
        }
    }

    existing.sort_by(|a, b| a.condition_type.cmp(&b.condition_type));
    had_error
}

/// Build the status for an upstream from one validation pass
pub fn build_status(
    previous: &[Condition],
    conditions: &GradatedConditions,
    observed_generation: i64,
    now: DateTime<Utc>,
) -> UpstreamStatus {
    let mut merged = previous.to_vec();
    let new_conditions: Vec<Condition> = conditions.conditions().into_iter().cloned().collect();
    let had_error = merge_conditions(&mut merged, &new_conditions, observed_generation, now);

    UpstreamStatus {
        phase: if had_error { Phase::Error } else { Phase::Ready },
        conditions: merged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{
        REASON_LDAP_CONNECTION_ERROR, REASON_SUCCESS, TYPE_BIND_SECRET_VALID,
        TYPE_LDAP_CONNECTION_VALID, TYPE_TLS_CONFIGURATION_VALID,
    };
    use chrono::Duration;

    #[test]
    fn test_merge_sorts_and_stamps_generation() {
        let now = Utc::now();
        let mut existing = Vec::new();
        let had_error = merge_conditions(
            &mut existing,
            &[
                Condition::success(
                    TYPE_TLS_CONFIGURATION_VALID,
                    REASON_SUCCESS,
                    "loaded TLS configuration",
                ),
                Condition::success(TYPE_BIND_SECRET_VALID, REASON_SUCCESS, "loaded bind secret"),
            ],
            7,
            now,
        );

        assert!(!had_error);
        let types: Vec<&str> = existing.iter().map(|c| c.condition_type.as_str()).collect();
        assert_eq!(types, vec![TYPE_BIND_SECRET_VALID, TYPE_TLS_CONFIGURATION_VALID]);
        assert!(existing.iter().all(|c| c.observed_generation == 7));
        assert!(existing.iter().all(|c| c.last_transition_time == Some(now)));
    }

    #[test]
    fn test_transition_time_moves_only_on_status_change() {
        let earlier = Utc::now() - Duration::hours(1);
        let now = Utc::now();
        let mut existing = Vec::new();
        merge_conditions(
            &mut existing,
            &[
                Condition::success(TYPE_BIND_SECRET_VALID, REASON_SUCCESS, "loaded bind secret"),
                Condition::success(TYPE_LDAP_CONNECTION_VALID, REASON_SUCCESS, "ok"),
            ],
            1,
            earlier,
        );

        let had_error = merge_conditions(
            &mut existing,
            &[
                Condition::success(TYPE_BIND_SECRET_VALID, REASON_SUCCESS, "loaded bind secret"),
                Condition::failure(
                    TYPE_LDAP_CONNECTION_VALID,
                    REASON_LDAP_CONNECTION_ERROR,
                    "down",
                ),
            ],
            2,
            now,
        );

        assert!(had_error);
        assert_eq!(existing[0].last_transition_time, Some(earlier));
        assert_eq!(existing[0].observed_generation, 2);
        assert_eq!(existing[1].last_transition_time, Some(now));
        assert_eq!(existing[1].message, "down");
    }

    #[test]
    fn test_build_status_keeps_other_types() {
        let previous = vec![Condition::success("AdditionalValidation", REASON_SUCCESS, "ok")];
        let mut conditions = GradatedConditions::new();
        conditions.append(
            Condition::failure(TYPE_LDAP_CONNECTION_VALID, REASON_LDAP_CONNECTION_ERROR, "down"),
            false,
        );

        let status = build_status(&previous, &conditions, 3, Utc::now());
        assert_eq!(status.phase, Phase::Error);
        assert_eq!(status.conditions.len(), 2);
        assert_eq!(status.conditions[0].condition_type, "AdditionalValidation");
    }
}
